use anyhow::Context;
use braid::expr::Value;
use braid::graph::LGraph;
use braid::lower::{lower_graph, LowerContext};
use braid::visualization;
use clap::Parser;
use ecow::EcoString;
use serde::Deserialize;
use std::fs;

#[derive(Parser)]
#[command(name = "braid-lower")]
#[command(about = "Lowers composition graphs for braid.", long_about = None)]
struct Args {
    /// Composition graph produced by the frontend
    graph: String,
    /// Lowered output file
    output: String,
    /// Statics table (JSON list of {owner, name, value}) for closed member access
    #[arg(long)]
    statics: Option<String>,
    /// Write a Graphviz rendering of the lowered graph
    #[arg(long)]
    dot: Option<String>,
    /// Write an SVG rendering (requires `dot` on PATH)
    #[arg(long)]
    svg: Option<String>,
}

#[derive(Deserialize)]
struct StaticBinding {
    owner: EcoString,
    name: EcoString,
    value: Value,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("Lowering failed: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    let content = fs::read_to_string(&args.graph)
        .with_context(|| format!("unable to read {}", args.graph))?;
    let mut graph: LGraph =
        serde_json::from_str(&content).context("malformed composition graph")?;

    let mut ctx = LowerContext::new();
    if let Some(path) = &args.statics {
        let statics = fs::read_to_string(path)
            .with_context(|| format!("unable to read {}", path))?;
        let bindings: Vec<StaticBinding> =
            serde_json::from_str(&statics).context("malformed statics table")?;
        for binding in bindings {
            ctx.statics
                .insert((binding.owner, binding.name), binding.value);
        }
    }

    lower_graph(&mut graph, &ctx)?;

    let json = serde_json::to_string_pretty(&graph).context("failed to serialize graph")?;
    fs::write(&args.output, json)
        .with_context(|| format!("failed to write {}", args.output))?;
    println!("Successfully lowered to {}", args.output);

    if let Some(path) = &args.dot {
        fs::write(path, visualization::render_dot(&graph))
            .with_context(|| format!("failed to write {}", path))?;
    }
    if let Some(path) = &args.svg {
        let svg = visualization::render_svg(&graph).context("SVG rendering failed")?;
        fs::write(path, svg).with_context(|| format!("failed to write {}", path))?;
    }
    Ok(())
}
