use anyhow::{bail, Context};
use braid::expr::{BinKind, ExprArena, ExprId, ExprKind, MethodRef, Type, UnKind, Value};
use braid::graph::{LGraph, VertexId};
use braid::ir::Opcode;
use braid::lower::{lower_graph, LowerContext};
use braid::service::{extract_spec, extract_spec_into, ExtractError, Service, SpecRecord};
use braid::visualization;
use include_dir::{include_dir, Dir};

// Embed the spec-file bundle at compile time
static FIXTURES: Dir = include_dir!("$CARGO_MANIFEST_DIR/tests/fixtures");

fn quote_lambda(
    exprs: &mut ExprArena,
    params: Vec<ExprId>,
    body: ExprId,
) -> (ExprId, ExprId) {
    let lam = exprs.alloc(ExprKind::Lambda { params, body }, Type::Unit);
    let quoted = exprs.alloc(
        ExprKind::Unary {
            op: UnKind::Quote,
            operand: lam,
        },
        Type::Unit,
    );
    (lam, quoted)
}

/// A two-vertex composition: an inventory vertex with a pricing lambda and
/// a routing lambda, and a notifier vertex with a formatting lambda.
fn build_composition() -> (LGraph, VertexId, VertexId, ExprId, ExprId) {
    let mut exprs = ExprArena::new();

    // (order) => order.Quantity * order.UnitPrice + 40
    let order = exprs.alloc(
        ExprKind::Parameter {
            name: "order".into(),
        },
        Type::Object("Order".into()),
    );
    let quantity = exprs.alloc(
        ExprKind::Member {
            target: Some(order),
            owner: None,
            name: "Quantity".into(),
        },
        Type::Int,
    );
    let unit_price = exprs.alloc(
        ExprKind::Member {
            target: Some(order),
            owner: None,
            name: "UnitPrice".into(),
        },
        Type::Int,
    );
    let subtotal = exprs.alloc(
        ExprKind::Binary {
            op: BinKind::Multiply,
            left: quantity,
            right: unit_price,
        },
        Type::Int,
    );
    let shipping = exprs.alloc(
        ExprKind::Constant {
            value: Value::Int(40),
        },
        Type::Int,
    );
    let total = exprs.alloc(
        ExprKind::Binary {
            op: BinKind::Add,
            left: subtotal,
            right: shipping,
        },
        Type::Int,
    );
    let (pricing, pricing_quoted) = quote_lambda(&mut exprs, vec![order], total);

    // (h: symbol) => h.Notify(total) routes to another vertex.
    let handle = exprs.alloc(ExprKind::Parameter { name: "h".into() }, Type::Symbol);
    let payload = exprs.alloc(
        ExprKind::Constant {
            value: Value::Int(1),
        },
        Type::Int,
    );
    let routed = exprs.alloc(
        ExprKind::Call {
            target: Some(handle),
            method: MethodRef::new("Notifier", "Notify"),
            args: vec![payload],
        },
        Type::Unit,
    );
    let (_, routing_quoted) = quote_lambda(&mut exprs, vec![handle], routed);

    let inventory_origin = exprs.alloc(
        ExprKind::Call {
            target: None,
            method: MethodRef::new("braid.runtime", "compose"),
            args: vec![pricing_quoted, routing_quoted],
        },
        Type::Unit,
    );

    // (total) => total > 100 ? total : -total
    let amount = exprs.alloc(
        ExprKind::Parameter {
            name: "total".into(),
        },
        Type::Int,
    );
    let hundred = exprs.alloc(
        ExprKind::Constant {
            value: Value::Int(100),
        },
        Type::Int,
    );
    let over = exprs.alloc(
        ExprKind::Binary {
            op: BinKind::GreaterThan,
            left: amount,
            right: hundred,
        },
        Type::Bool,
    );
    let negated = exprs.alloc(
        ExprKind::Unary {
            op: UnKind::Negate,
            operand: amount,
        },
        Type::Int,
    );
    let clamped = exprs.alloc(
        ExprKind::Conditional {
            test: over,
            then_branch: amount,
            else_branch: negated,
        },
        Type::Int,
    );
    let (formatting, formatting_quoted) = quote_lambda(&mut exprs, vec![amount], clamped);

    let notifier_origin = exprs.alloc(
        ExprKind::Call {
            target: None,
            method: MethodRef::new("braid.runtime", "compose"),
            args: vec![formatting_quoted],
        },
        Type::Unit,
    );

    let mut graph = LGraph::new();
    let inventory = VertexId(0);
    let notifier = VertexId(1);
    graph.add_vertex(inventory, Some(inventory_origin));
    graph.add_vertex(notifier, Some(notifier_origin));
    graph.exprs = exprs;

    (graph, inventory, notifier, pricing, formatting)
}

#[test]
fn test_lower_composition_end_to_end() -> anyhow::Result<()> {
    let (mut graph, inventory, notifier, pricing, formatting) = build_composition();
    lower_graph(&mut graph, &LowerContext::new())?;

    let inventory_vertex = graph
        .vertex(inventory)
        .context("inventory vertex missing")?;
    // The routing lambda is owned by the notifier vertex and must not
    // appear here.
    assert_eq!(inventory_vertex.lowered.len(), 1);
    let pricing_body = &inventory_vertex.lowered[&pricing];
    let ops: Vec<_> = pricing_body.instrs.iter().map(|i| i.op).collect();
    assert_eq!(
        ops,
        vec![
            Opcode::MemberRead,
            Opcode::MemberRead,
            Opcode::Multiply,
            Opcode::Add
        ]
    );

    let notifier_vertex = graph.vertex(notifier).context("notifier vertex missing")?;
    let formatting_body = &notifier_vertex.lowered[&formatting];
    let ops: Vec<_> = formatting_body.instrs.iter().map(|i| i.op).collect();
    assert_eq!(
        ops,
        vec![Opcode::GreaterThan, Opcode::Negate, Opcode::Conditional]
    );

    Ok(())
}

#[test]
fn test_lowered_graph_round_trips_through_json() -> anyhow::Result<()> {
    let (mut graph, ..) = build_composition();
    lower_graph(&mut graph, &LowerContext::new())?;

    let json = serde_json::to_string_pretty(&graph)?;
    let restored: LGraph = serde_json::from_str(&json)?;
    assert_eq!(graph, restored);
    Ok(())
}

#[test]
fn test_lowering_twice_is_deterministic() -> anyhow::Result<()> {
    let (graph, ..) = build_composition();
    let mut first = graph.clone();
    let mut second = graph;
    lower_graph(&mut first, &LowerContext::new())?;
    lower_graph(&mut second, &LowerContext::new())?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_dot_rendering_covers_vertices() -> anyhow::Result<()> {
    let (mut graph, ..) = build_composition();
    lower_graph(&mut graph, &LowerContext::new())?;

    let dot = visualization::render_dot(&graph);
    if !dot.starts_with("digraph") {
        bail!("not a digraph: {}", dot);
    }
    assert!(dot.contains("cluster_v0"));
    assert!(dot.contains("cluster_v1"));
    assert!(dot.contains("MemberRead"));
    Ok(())
}

#[test]
fn test_extract_spec_is_idempotent() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let spec = SpecRecord::new("inventory.yaml")
        .with_references(vec!["common-types.yaml".to_string()]);

    extract_spec_into(&spec, &FIXTURES, dir.path())?;
    let main = dir.path().join("inventory.yaml");
    let referenced = dir.path().join("common-types.yaml");
    assert!(main.exists());
    assert!(referenced.exists());

    // A second pass leaves the files alone.
    let before = std::fs::read_to_string(&main)?;
    extract_spec_into(&spec, &FIXTURES, dir.path())?;
    assert_eq!(std::fs::read_to_string(&main)?, before);
    Ok(())
}

#[test]
fn test_extract_spec_keeps_existing_files() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let sentinel = "locally edited\n";
    std::fs::write(dir.path().join("inventory.yaml"), sentinel)?;

    let spec = SpecRecord::new("inventory.yaml")
        .with_references(vec!["common-types.yaml".to_string()]);
    extract_spec_into(&spec, &FIXTURES, dir.path())?;

    assert_eq!(
        std::fs::read_to_string(dir.path().join("inventory.yaml"))?,
        sentinel
    );
    assert!(dir.path().join("common-types.yaml").exists());
    Ok(())
}

#[test]
fn test_extract_spec_missing_resource() {
    let dir = tempfile::tempdir().unwrap();
    let spec = SpecRecord::new("no-such-file.yaml");
    let err = extract_spec_into(&spec, &FIXTURES, dir.path()).unwrap_err();
    match err {
        ExtractError::ResourceNotFound(name) => assert_eq!(name, "no-such-file.yaml"),
        other => panic!("expected missing resource, got {:?}", other),
    }
}

#[test]
fn test_extract_spec_skips_when_directory_set() -> anyhow::Result<()> {
    let mut service = Service::new("shop.inventory", "http://inventory.internal", "Inventory")
        .with_spec(SpecRecord {
            directory: "/already/materialised".to_string(),
            main_file: "no-such-file.yaml".to_string(),
            referenced_files: vec![],
        });

    // The missing resource is never consulted because the directory is set.
    let spec = extract_spec(&mut service, &FIXTURES)?;
    assert_eq!(spec.directory, "/already/materialised");
    Ok(())
}
