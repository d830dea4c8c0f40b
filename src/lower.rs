//! Lowering of typed expression trees into per-lambda three-address
//! instruction lists attached to the logical graph.


mod eval;

use crate::expr::{
    render, BinKind, Expr, ExprArena, ExprId, ExprKind, MemberBinding, MethodRef, Type, UnKind,
    Value,
};
use crate::graph::{LGraph, VertexId};
use crate::ir::{Instr, InstrId, IrBody, Opcode, Var, VarId};
use ecow::EcoString;
use log::debug;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum LowerError {
    #[error("unsupported expression kind `{kind}`: {node}")]
    UnsupportedExpression { kind: &'static str, node: String },

    #[error("malformed expression node ({detail}): {node}")]
    MalformedNode { detail: String, node: String },
}

/// Caller-supplied context for the pass.
///
/// `statics` resolves static and closed-over member reads during partial
/// evaluation, keyed by `(owner, member)`. Frontends that pre-fold such
/// nodes into constants can leave it empty.
#[derive(Debug, Clone, Default)]
pub struct LowerContext {
    pub statics: HashMap<(EcoString, EcoString), Value>,
}

impl LowerContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_static(
        mut self,
        owner: impl Into<EcoString>,
        name: impl Into<EcoString>,
        value: Value,
    ) -> Self {
        self.statics.insert((owner.into(), name.into()), value);
        self
    }
}

/// Lowers every vertex of the graph that carries an originating call
/// expression. Quoted lambda arguments of that call are lowered in place
/// and their instruction lists attached to the vertex; lambdas whose first
/// parameters are vertex handles (Symbol-typed) and whose body is a call
/// belong to another vertex and are skipped.
///
/// On error the graph's partially filled `lowered` maps are invalid.
pub fn lower_graph(graph: &mut LGraph, ctx: &LowerContext) -> Result<(), LowerError> {
    let ids: Vec<VertexId> = graph.vertices.keys().copied().collect();
    for vid in ids {
        let Some(origin) = graph.vertices[&vid].origin else {
            continue;
        };
        let lowered = lower_vertex(&graph.exprs, ctx, vid, origin)?;
        if let Some(vertex) = graph.vertices.get_mut(&vid) {
            vertex.lowered = lowered;
        }
    }
    Ok(())
}

fn lower_vertex(
    exprs: &ExprArena,
    ctx: &LowerContext,
    vid: VertexId,
    origin: ExprId,
) -> Result<BTreeMap<ExprId, IrBody>, LowerError> {
    let mut lowered = BTreeMap::new();

    let Some(origin_node) = exprs.get(origin) else {
        return Err(LowerError::MalformedNode {
            detail: format!("vertex {} origin is not in the arena", vid.0),
            node: format!("<missing node {}>", origin.0),
        });
    };
    let ExprKind::Call { args, .. } = &origin_node.kind else {
        debug!("vertex {}: origin is not a call, nothing to lower", vid.0);
        return Ok(lowered);
    };

    let mut lowerer = Lowerer::new(exprs, ctx);
    for &arg in args {
        let Some(lambda) = quoted_lambda(exprs, arg) else {
            continue;
        };
        if lowered.contains_key(&lambda) {
            continue;
        }
        if is_routing_lambda(exprs, lambda) {
            debug!("vertex {}: skipping routing lambda {}", vid.0, lambda.0);
            continue;
        }
        let body = lowerer.lower_lambda(lambda)?;
        debug!(
            "vertex {}: lowered lambda {} to {} instructions",
            vid.0,
            lambda.0,
            body.instrs.len()
        );
        lowered.insert(lambda, body);
    }
    Ok(lowered)
}

/// The lambda under a `Quote` wrapper, if `arg` is one.
fn quoted_lambda(exprs: &ExprArena, arg: ExprId) -> Option<ExprId> {
    let node = exprs.get(arg)?;
    let ExprKind::Unary {
        op: UnKind::Quote,
        operand,
    } = node.kind
    else {
        return None;
    };
    match exprs.get(operand)?.kind {
        ExprKind::Lambda { .. } => Some(operand),
        _ => None,
    }
}

/// A lambda expressing cross-vertex routing rather than local computation:
/// at least one Symbol-typed parameter (a vertex handle) and a call body.
/// Its lowering is owned by the vertex the handle refers to.
fn is_routing_lambda(exprs: &ExprArena, lambda: ExprId) -> bool {
    let Some(node) = exprs.get(lambda) else {
        return false;
    };
    let ExprKind::Lambda { params, body } = &node.kind else {
        return false;
    };
    let has_symbol_param = params
        .iter()
        .any(|p| exprs.get(*p).is_some_and(|n| n.ty.is_symbol()));
    let body_is_call = exprs
        .get(*body)
        .is_some_and(|n| matches!(n.kind, ExprKind::Call { .. }));
    has_symbol_param && body_is_call
}

/// Per-lambda lowering state: the instruction and variable arenas under
/// construction, plus the identity-keyed caches. All caches are cleared
/// when a lambda completes.
pub struct Lowerer<'a> {
    exprs: &'a ExprArena,
    ctx: &'a LowerContext,
    vars: Vec<Var>,
    instrs: Vec<Instr>,
    /// Expression node -> emitted instruction, for subexpression sharing.
    node_instrs: HashMap<ExprId, InstrId>,
    /// Constant node -> its deduplicated variable.
    consts: HashMap<ExprId, VarId>,
    /// Parameter node -> its variable, one per lambda scope.
    params: HashMap<ExprId, VarId>,
}

impl<'a> Lowerer<'a> {
    pub fn new(exprs: &'a ExprArena, ctx: &'a LowerContext) -> Self {
        Self {
            exprs,
            ctx,
            vars: Vec::new(),
            instrs: Vec::new(),
            node_instrs: HashMap::new(),
            consts: HashMap::new(),
            params: HashMap::new(),
        }
    }

    /// Lowers a single lambda: registers its parameters, visits the body,
    /// and returns the finished instruction list. The per-lambda caches are
    /// reset before returning, so the lowerer can be reused.
    pub fn lower_lambda(&mut self, lambda: ExprId) -> Result<IrBody, LowerError> {
        let node = self.node(lambda)?.clone();
        let ExprKind::Lambda { params, body } = &node.kind else {
            return Err(self.malformed(lambda, "expected a lambda"));
        };
        for &param in params {
            let param_node = self.node(param)?;
            if !matches!(param_node.kind, ExprKind::Parameter { .. }) {
                return Err(self.malformed(param, "lambda parameter list holds a non-parameter"));
            }
            self.visit(param)?;
        }
        self.visit(*body)?;

        self.node_instrs.clear();
        self.consts.clear();
        self.params.clear();
        Ok(IrBody {
            vars: std::mem::take(&mut self.vars),
            instrs: std::mem::take(&mut self.instrs),
        })
    }

    /// Visits one expression node, returning the variable holding its value.
    pub fn visit(&mut self, id: ExprId) -> Result<VarId, LowerError> {
        // Subexpression sharing: a node already lowered in this lambda
        // resolves to its instruction's first destination.
        if let Some(&iid) = self.node_instrs.get(&id) {
            return Ok(self.instrs[iid.0 as usize].dsts[0]);
        }

        let node = self.node(id)?.clone();
        match &node.kind {
            ExprKind::Parameter { name } => {
                if let Some(&var) = self.params.get(&id) {
                    return Ok(var);
                }
                let var = self.alloc_var(Var::Param {
                    name: name.clone(),
                    ty: node.ty.clone(),
                });
                self.params.insert(id, var);
                Ok(var)
            }

            ExprKind::Constant { value } => {
                Ok(self.const_for(id, node.ty.clone(), value.clone()))
            }

            ExprKind::Binary { op, left, right } => {
                let l = self.visit(*left)?;
                let r = self.visit(*right)?;
                Ok(self.emit(id, bin_opcode(*op), vec![l, r], None, node.ty.clone()))
            }

            ExprKind::Unary { op, operand } => self.visit_unary(id, *op, *operand, &node),

            ExprKind::Conditional {
                test,
                then_branch,
                else_branch,
            } => {
                let a = self.visit(*test)?;
                let b = self.visit(*then_branch)?;
                let c = self.visit(*else_branch)?;
                Ok(self.emit(id, Opcode::Conditional, vec![a, b, c], None, node.ty.clone()))
            }

            ExprKind::Member {
                target: Some(target),
                name,
                ..
            } => {
                let host = self.visit(*target)?;
                let name_const = self.str_const(name.clone());
                Ok(self.emit(
                    id,
                    Opcode::MemberRead,
                    vec![host, name_const],
                    None,
                    node.ty.clone(),
                ))
            }

            // Static or closed-over member access is a compile-time constant.
            ExprKind::Member { target: None, .. } => {
                match eval::eval_closed(self.exprs, self.ctx, id) {
                    Ok(value) => Ok(self.const_for(id, node.ty.clone(), value)),
                    Err(_) => Err(self.unsupported(id, "Member")),
                }
            }

            ExprKind::Call {
                target,
                method,
                args,
            } => {
                let mut srcs = Vec::with_capacity(args.len() + 1);
                if let Some(target) = target {
                    srcs.push(self.visit(*target)?);
                }
                for &arg in args {
                    srcs.push(self.visit(arg)?);
                }
                Ok(self.emit(id, Opcode::Call, srcs, Some(method.clone()), node.ty.clone()))
            }

            ExprKind::New {
                args,
                members: None,
            } => {
                let mut srcs = Vec::with_capacity(args.len());
                for &arg in args {
                    srcs.push(self.visit(arg)?);
                }
                Ok(self.emit(id, Opcode::New, srcs, None, node.ty.clone()))
            }

            // Object-initialiser short form: construct first, then visit and
            // write each member in declaration order.
            ExprKind::New {
                members: Some(members),
                ..
            } => {
                let obj = self.emit(id, Opcode::New, Vec::new(), None, node.ty.clone());
                for (member, arg) in members {
                    let val = self.visit(*arg)?;
                    self.emit_member_write(obj, member.clone(), val);
                }
                Ok(obj)
            }

            ExprKind::NewArrayInit { items } => {
                let mut srcs = Vec::with_capacity(items.len());
                for &item in items {
                    srcs.push(self.visit(item)?);
                }
                Ok(self.emit(id, Opcode::NewArrayInit, srcs, None, node.ty.clone()))
            }

            ExprKind::NewArrayBounds { dims } => {
                let mut srcs = Vec::with_capacity(dims.len());
                for &dim in dims {
                    srcs.push(self.visit(dim)?);
                }
                Ok(self.emit(id, Opcode::NewArrayBounds, srcs, None, node.ty.clone()))
            }

            ExprKind::MemberInit { new, bindings } => {
                let new_node = self.node(*new)?;
                if !matches!(new_node.kind, ExprKind::New { .. }) {
                    return Err(self.malformed(id, "member initialiser over a non-new expression"));
                }
                let obj = self.visit(*new)?;
                for binding in bindings {
                    match binding {
                        MemberBinding::Assign { member, value } => {
                            let val = self.visit(*value)?;
                            self.emit_member_write(obj, member.clone(), val);
                        }
                        MemberBinding::MemberMember { .. } => {
                            return Err(self.unsupported(id, "MemberMemberBinding"));
                        }
                        MemberBinding::MemberList { .. } => {
                            return Err(self.unsupported(id, "MemberListBinding"));
                        }
                    }
                }
                self.share_result(id, obj);
                Ok(obj)
            }

            ExprKind::ListInit { new, inits } => {
                let new_node = self.node(*new)?;
                if !matches!(new_node.kind, ExprKind::New { .. }) {
                    return Err(self.malformed(id, "list initialiser over a non-new expression"));
                }
                let obj = self.visit(*new)?;
                if inits.iter().any(|init| !init.is_empty()) {
                    return Err(self.unsupported(id, "ListInit"));
                }
                self.share_result(id, obj);
                Ok(obj)
            }

            ExprKind::Lambda { params, body } => {
                for &param in params {
                    let param_node = self.node(param)?;
                    if !matches!(param_node.kind, ExprKind::Parameter { .. }) {
                        return Err(
                            self.malformed(param, "lambda parameter list holds a non-parameter")
                        );
                    }
                    self.visit(param)?;
                }
                self.visit(*body)
            }

            ExprKind::Index { object, name, args } => {
                let host = match object {
                    Some(object) => self.visit(*object)?,
                    None => self.alloc_var(Var::Const {
                        ty: Type::Object(EcoString::from("object")),
                        value: Value::Null,
                    }),
                };
                let name_const =
                    self.str_const(name.clone().unwrap_or_else(EcoString::new));
                let mut srcs = vec![host, name_const];
                for &arg in args {
                    srcs.push(self.visit(arg)?);
                }
                Ok(self.emit(id, Opcode::Index, srcs, None, node.ty.clone()))
            }

            ExprKind::Block { .. }
            | ExprKind::Switch { .. }
            | ExprKind::Loop { .. }
            | ExprKind::TryCatch { .. }
            | ExprKind::Goto
            | ExprKind::LabelTarget
            | ExprKind::Invoke { .. }
            | ExprKind::TypeIs { .. }
            | ExprKind::Dynamic
            | ExprKind::DebugInfo
            | ExprKind::Default
            | ExprKind::ElementInit { .. } => Err(self.unsupported(id, node.kind.name())),
        }
    }

    fn visit_unary(
        &mut self,
        id: ExprId,
        op: UnKind,
        operand: ExprId,
        node: &Expr,
    ) -> Result<VarId, LowerError> {
        // Quotes are transparent here; the driver is what gives them meaning.
        if op == UnKind::Quote {
            return self.visit(operand);
        }
        let opcode = match op {
            UnKind::Negate | UnKind::NegateChecked => Opcode::Negate,
            // Identity, kept as a single-operand Add.
            UnKind::UnaryPlus => Opcode::Add,
            UnKind::Not => Opcode::Not,
            UnKind::OnesComplement => Opcode::OnesComplement,
            UnKind::Convert | UnKind::ConvertChecked | UnKind::TypeAs => Opcode::Convert,
            UnKind::Increment => Opcode::Increment,
            UnKind::Decrement => Opcode::Decrement,
            UnKind::PreIncrementAssign => Opcode::PreIncrementAssign,
            UnKind::PreDecrementAssign => Opcode::PreDecrementAssign,
            UnKind::PostIncrementAssign => Opcode::PostIncrementAssign,
            UnKind::PostDecrementAssign => Opcode::PostDecrementAssign,
            UnKind::Quote => unreachable!("handled above"),
            UnKind::ArrayLength
            | UnKind::Throw
            | UnKind::Unbox
            | UnKind::IsTrue
            | UnKind::IsFalse => return Err(self.unsupported(id, op.name())),
        };
        let v = self.visit(operand)?;
        Ok(self.emit(id, opcode, vec![v], None, node.ty.clone()))
    }

    fn node(&self, id: ExprId) -> Result<&Expr, LowerError> {
        self.exprs.get(id).ok_or_else(|| LowerError::MalformedNode {
            detail: "node is not in the arena".to_string(),
            node: format!("<missing node {}>", id.0),
        })
    }

    fn alloc_var(&mut self, var: Var) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(var);
        id
    }

    /// Emits an instruction with a fresh result temp as its only
    /// destination and records it for subexpression sharing.
    fn emit(
        &mut self,
        node: ExprId,
        op: Opcode,
        srcs: Vec<VarId>,
        method: Option<MethodRef>,
        ty: Type,
    ) -> VarId {
        let iid = InstrId(self.instrs.len() as u32);
        let dst = self.alloc_var(Var::Temp { ty, def: iid });
        self.instrs.push(Instr {
            op,
            srcs,
            dsts: vec![dst],
            method,
        });
        self.node_instrs.insert(node, iid);
        dst
    }

    /// Non-indexed member write: destinations are the host object and the
    /// member-name constant, the single source is the written value.
    fn emit_member_write(&mut self, obj: VarId, member: EcoString, val: VarId) {
        let name_const = self.str_const(member);
        self.instrs.push(Instr {
            op: Opcode::MemberWrite,
            srcs: vec![val],
            dsts: vec![obj, name_const],
            method: None,
        });
    }

    /// Registers `id` as sharing the instruction that defined `result`, so
    /// composite forms (member/list initialisers) participate in CSE.
    fn share_result(&mut self, id: ExprId, result: VarId) {
        if let Var::Temp { def, .. } = self.vars[result.0 as usize] {
            self.node_instrs.insert(id, def);
        }
    }

    /// Constant variable for a node, deduplicated by node identity.
    fn const_for(&mut self, node: ExprId, ty: Type, value: Value) -> VarId {
        if let Some(&var) = self.consts.get(&node) {
            return var;
        }
        let var = self.alloc_var(Var::Const { ty, value });
        self.consts.insert(node, var);
        var
    }

    /// Synthesized string constant (member and indexer names).
    fn str_const(&mut self, s: EcoString) -> VarId {
        self.alloc_var(Var::Const {
            ty: Type::Str,
            value: Value::Str(s),
        })
    }

    fn unsupported(&self, id: ExprId, kind: &'static str) -> LowerError {
        LowerError::UnsupportedExpression {
            kind,
            node: render(self.exprs, id),
        }
    }

    fn malformed(&self, id: ExprId, detail: &str) -> LowerError {
        LowerError::MalformedNode {
            detail: detail.to_string(),
            node: render(self.exprs, id),
        }
    }
}

fn bin_opcode(op: BinKind) -> Opcode {
    match op {
        BinKind::Add => Opcode::Add,
        BinKind::Subtract => Opcode::Subtract,
        BinKind::Multiply => Opcode::Multiply,
        BinKind::Divide => Opcode::Divide,
        BinKind::Modulo => Opcode::Modulo,
        BinKind::Power => Opcode::Power,
        BinKind::And => Opcode::And,
        BinKind::Or => Opcode::Or,
        BinKind::ExclusiveOr => Opcode::ExclusiveOr,
        BinKind::LeftShift => Opcode::LeftShift,
        BinKind::RightShift => Opcode::RightShift,
        BinKind::AndAlso => Opcode::AndAlso,
        BinKind::OrElse => Opcode::OrElse,
        BinKind::Equal => Opcode::Equal,
        BinKind::NotEqual => Opcode::NotEqual,
        BinKind::LessThan => Opcode::LessThan,
        BinKind::LessThanOrEqual => Opcode::LessThanOrEqual,
        BinKind::GreaterThan => Opcode::GreaterThan,
        BinKind::GreaterThanOrEqual => Opcode::GreaterThanOrEqual,
        BinKind::ArrayIndex => Opcode::ArrayIndex,
        BinKind::Assign => Opcode::Assign,
        BinKind::AddAssign => Opcode::AddAssign,
        BinKind::SubtractAssign => Opcode::SubtractAssign,
        BinKind::MultiplyAssign => Opcode::MultiplyAssign,
        BinKind::DivideAssign => Opcode::DivideAssign,
        BinKind::ModuloAssign => Opcode::ModuloAssign,
        BinKind::PowerAssign => Opcode::PowerAssign,
        BinKind::AndAssign => Opcode::AndAssign,
        BinKind::OrAssign => Opcode::OrAssign,
        BinKind::ExclusiveOrAssign => Opcode::ExclusiveOrAssign,
        BinKind::LeftShiftAssign => Opcode::LeftShiftAssign,
        BinKind::RightShiftAssign => Opcode::RightShiftAssign,
    }
}
