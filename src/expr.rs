use ecow::EcoString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Index of a node in an [`ExprArena`].
///
/// Two occurrences of the same `ExprId` are the *same* node, not two
/// structurally equal copies. The lowering pass keys its caches on this.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ExprId(pub u32);

/// Append-only arena holding one composition's expression trees.
///
/// The frontend allocates nodes here and hands the arena over inside the
/// logical graph; children are referenced by `ExprId`, so shared
/// sub-expressions are shared nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExprArena {
    nodes: Vec<Expr>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, kind: ExprKind, ty: Type) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(Expr { kind, ty });
        id
    }

    pub fn get(&self, id: ExprId) -> Option<&Expr> {
        self.nodes.get(id.0 as usize)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Type {
    Int,
    Float,
    Bool,
    Str,
    Unit,
    Object(EcoString),
    Array(Box<Type>),
    /// Marker for a lambda parameter that is a handle to another vertex.
    Symbol,
}

impl Type {
    pub fn is_symbol(&self) -> bool {
        matches!(self, Type::Symbol)
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Bool => write!(f, "bool"),
            Type::Str => write!(f, "string"),
            Type::Unit => write!(f, "unit"),
            Type::Object(name) => write!(f, "{}", name),
            Type::Array(t) => write!(f, "{}[]", t),
            Type::Symbol => write!(f, "symbol"),
        }
    }
}

/// Constant payload carried by `ExprKind::Constant` nodes, either written
/// by the user or produced by partial evaluation of a closed sub-expression.
///
/// `Record` is how the frontend encodes a closed-over object; the partial
/// evaluator reads its fields by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(EcoString),
    Null,
    Record(BTreeMap<EcoString, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::Null => "null",
            Value::Record(_) => "record",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Str(s) => write!(f, "{:?}", s.as_str()),
            Value::Null => write!(f, "null"),
            Value::Record(fields) => {
                let items: Vec<_> = fields
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect();
                write!(f, "{{{}}}", items.join(", "))
            }
        }
    }
}

/// Reflected method handle recorded on call instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodRef {
    pub owner: EcoString,
    pub name: EcoString,
}

impl MethodRef {
    pub fn new(owner: impl Into<EcoString>, name: impl Into<EcoString>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for MethodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinKind {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    And,
    Or,
    ExclusiveOr,
    LeftShift,
    RightShift,
    AndAlso,
    OrElse,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    ArrayIndex,
    Assign,
    AddAssign,
    SubtractAssign,
    MultiplyAssign,
    DivideAssign,
    ModuloAssign,
    PowerAssign,
    AndAssign,
    OrAssign,
    ExclusiveOrAssign,
    LeftShiftAssign,
    RightShiftAssign,
}

impl std::fmt::Display for BinKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinKind::Add => "+",
            BinKind::Subtract => "-",
            BinKind::Multiply => "*",
            BinKind::Divide => "/",
            BinKind::Modulo => "%",
            BinKind::Power => "**",
            BinKind::And => "&",
            BinKind::Or => "|",
            BinKind::ExclusiveOr => "^",
            BinKind::LeftShift => "<<",
            BinKind::RightShift => ">>",
            BinKind::AndAlso => "&&",
            BinKind::OrElse => "||",
            BinKind::Equal => "==",
            BinKind::NotEqual => "!=",
            BinKind::LessThan => "<",
            BinKind::LessThanOrEqual => "<=",
            BinKind::GreaterThan => ">",
            BinKind::GreaterThanOrEqual => ">=",
            BinKind::ArrayIndex => "[]",
            BinKind::Assign => "=",
            BinKind::AddAssign => "+=",
            BinKind::SubtractAssign => "-=",
            BinKind::MultiplyAssign => "*=",
            BinKind::DivideAssign => "/=",
            BinKind::ModuloAssign => "%=",
            BinKind::PowerAssign => "**=",
            BinKind::AndAssign => "&=",
            BinKind::OrAssign => "|=",
            BinKind::ExclusiveOrAssign => "^=",
            BinKind::LeftShiftAssign => "<<=",
            BinKind::RightShiftAssign => ">>=",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnKind {
    Negate,
    NegateChecked,
    UnaryPlus,
    Not,
    OnesComplement,
    Convert,
    ConvertChecked,
    TypeAs,
    Quote,
    Increment,
    Decrement,
    PreIncrementAssign,
    PreDecrementAssign,
    PostIncrementAssign,
    PostDecrementAssign,
    // Frontend kinds with no lowering; the pass rejects them.
    ArrayLength,
    Throw,
    Unbox,
    IsTrue,
    IsFalse,
}

impl UnKind {
    pub fn name(&self) -> &'static str {
        match self {
            UnKind::Negate => "Negate",
            UnKind::NegateChecked => "NegateChecked",
            UnKind::UnaryPlus => "UnaryPlus",
            UnKind::Not => "Not",
            UnKind::OnesComplement => "OnesComplement",
            UnKind::Convert => "Convert",
            UnKind::ConvertChecked => "ConvertChecked",
            UnKind::TypeAs => "TypeAs",
            UnKind::Quote => "Quote",
            UnKind::Increment => "Increment",
            UnKind::Decrement => "Decrement",
            UnKind::PreIncrementAssign => "PreIncrementAssign",
            UnKind::PreDecrementAssign => "PreDecrementAssign",
            UnKind::PostIncrementAssign => "PostIncrementAssign",
            UnKind::PostDecrementAssign => "PostDecrementAssign",
            UnKind::ArrayLength => "ArrayLength",
            UnKind::Throw => "Throw",
            UnKind::Unbox => "Unbox",
            UnKind::IsTrue => "IsTrue",
            UnKind::IsFalse => "IsFalse",
        }
    }
}

/// A member-initialiser binding inside a `MemberInit` node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MemberBinding {
    Assign {
        member: EcoString,
        value: ExprId,
    },
    MemberMember {
        member: EcoString,
        bindings: Vec<MemberBinding>,
    },
    MemberList {
        member: EcoString,
        inits: Vec<Vec<ExprId>>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    /// A bound lambda parameter.
    Parameter { name: EcoString },
    Constant {
        value: Value,
    },
    Binary {
        op: BinKind,
        left: ExprId,
        right: ExprId,
    },
    Unary {
        op: UnKind,
        operand: ExprId,
    },
    Conditional {
        test: ExprId,
        then_branch: ExprId,
        else_branch: ExprId,
    },
    /// Member access. `target` is absent for static or closed-over members;
    /// `owner` names the declaring type in that case.
    Member {
        target: Option<ExprId>,
        owner: Option<EcoString>,
        name: EcoString,
    },
    Call {
        target: Option<ExprId>,
        method: MethodRef,
        args: Vec<ExprId>,
    },
    /// Object construction. `members` present means the object-initialiser
    /// short form: one member name per constructor-free argument.
    New {
        args: Vec<ExprId>,
        members: Option<Vec<(EcoString, ExprId)>>,
    },
    NewArrayInit {
        items: Vec<ExprId>,
    },
    NewArrayBounds {
        dims: Vec<ExprId>,
    },
    MemberInit {
        new: ExprId,
        bindings: Vec<MemberBinding>,
    },
    ListInit {
        new: ExprId,
        inits: Vec<Vec<ExprId>>,
    },
    Lambda {
        params: Vec<ExprId>,
        body: ExprId,
    },
    /// Indexer access; `name` is the indexer's member name when it has one.
    Index {
        object: Option<ExprId>,
        name: Option<EcoString>,
        args: Vec<ExprId>,
    },

    // Frontend kinds the pass does not lower. Carried so the driver can
    // reject them with a precise diagnostic instead of failing to parse.
    Block { exprs: Vec<ExprId> },
    Switch { subject: ExprId },
    Loop { body: ExprId },
    TryCatch { body: ExprId },
    Goto,
    LabelTarget,
    Invoke { target: ExprId, args: Vec<ExprId> },
    TypeIs { operand: ExprId, test_ty: Type },
    Dynamic,
    DebugInfo,
    Default,
    ElementInit { args: Vec<ExprId> },
}

impl ExprKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Parameter { .. } => "Parameter",
            ExprKind::Constant { .. } => "Constant",
            ExprKind::Binary { .. } => "Binary",
            ExprKind::Unary { .. } => "Unary",
            ExprKind::Conditional { .. } => "Conditional",
            ExprKind::Member { .. } => "Member",
            ExprKind::Call { .. } => "Call",
            ExprKind::New { .. } => "New",
            ExprKind::NewArrayInit { .. } => "NewArrayInit",
            ExprKind::NewArrayBounds { .. } => "NewArrayBounds",
            ExprKind::MemberInit { .. } => "MemberInit",
            ExprKind::ListInit { .. } => "ListInit",
            ExprKind::Lambda { .. } => "Lambda",
            ExprKind::Index { .. } => "Index",
            ExprKind::Block { .. } => "Block",
            ExprKind::Switch { .. } => "Switch",
            ExprKind::Loop { .. } => "Loop",
            ExprKind::TryCatch { .. } => "TryCatch",
            ExprKind::Goto => "Goto",
            ExprKind::LabelTarget => "LabelTarget",
            ExprKind::Invoke { .. } => "Invoke",
            ExprKind::TypeIs { .. } => "TypeIs",
            ExprKind::Dynamic => "Dynamic",
            ExprKind::DebugInfo => "DebugInfo",
            ExprKind::Default => "Default",
            ExprKind::ElementInit { .. } => "ElementInit",
        }
    }
}

/// Compact textual rendering of a node, used in diagnostics.
pub fn render(arena: &ExprArena, id: ExprId) -> String {
    let Some(node) = arena.get(id) else {
        return format!("<missing node {}>", id.0);
    };
    match &node.kind {
        ExprKind::Parameter { name } => name.to_string(),
        ExprKind::Constant { value } => value.to_string(),
        ExprKind::Binary { op, left, right } => match op {
            BinKind::ArrayIndex => {
                format!("{}[{}]", render(arena, *left), render(arena, *right))
            }
            _ => format!("({} {} {})", render(arena, *left), op, render(arena, *right)),
        },
        ExprKind::Unary { op, operand } => {
            let inner = render(arena, *operand);
            match op {
                UnKind::Negate | UnKind::NegateChecked => format!("-{}", inner),
                UnKind::UnaryPlus => format!("+{}", inner),
                UnKind::Not => format!("!{}", inner),
                UnKind::OnesComplement => format!("~{}", inner),
                UnKind::Quote => format!("quote({})", inner),
                UnKind::Increment | UnKind::PreIncrementAssign => format!("++{}", inner),
                UnKind::Decrement | UnKind::PreDecrementAssign => format!("--{}", inner),
                UnKind::PostIncrementAssign => format!("{}++", inner),
                UnKind::PostDecrementAssign => format!("{}--", inner),
                UnKind::Convert | UnKind::ConvertChecked | UnKind::TypeAs => {
                    format!("({})({})", node.ty, inner)
                }
                _ => format!("{}({})", op.name(), inner),
            }
        }
        ExprKind::Conditional {
            test,
            then_branch,
            else_branch,
        } => format!(
            "({} ? {} : {})",
            render(arena, *test),
            render(arena, *then_branch),
            render(arena, *else_branch)
        ),
        ExprKind::Member {
            target,
            owner,
            name,
        } => match (target, owner) {
            (Some(t), _) => format!("{}.{}", render(arena, *t), name),
            (None, Some(owner)) => format!("{}.{}", owner, name),
            (None, None) => format!(".{}", name),
        },
        ExprKind::Call {
            target,
            method,
            args,
        } => {
            let args: Vec<_> = args.iter().map(|a| render(arena, *a)).collect();
            match target {
                Some(t) => format!("{}.{}({})", render(arena, *t), method.name, args.join(", ")),
                None => format!("{}({})", method, args.join(", ")),
            }
        }
        ExprKind::New { args, members } => match members {
            Some(members) => {
                let inits: Vec<_> = members
                    .iter()
                    .map(|(name, arg)| format!("{} = {}", name, render(arena, *arg)))
                    .collect();
                format!("new {} {{ {} }}", node.ty, inits.join(", "))
            }
            None => {
                let args: Vec<_> = args.iter().map(|a| render(arena, *a)).collect();
                format!("new {}({})", node.ty, args.join(", "))
            }
        },
        ExprKind::NewArrayInit { items } => {
            let items: Vec<_> = items.iter().map(|i| render(arena, *i)).collect();
            format!("new[] {{{}}}", items.join(", "))
        }
        ExprKind::NewArrayBounds { dims } => {
            let dims: Vec<_> = dims.iter().map(|d| render(arena, *d)).collect();
            format!("new {}[{}]", node.ty, dims.join(", "))
        }
        ExprKind::MemberInit { new, bindings } => {
            let inits: Vec<_> = bindings
                .iter()
                .map(|b| match b {
                    MemberBinding::Assign { member, value } => {
                        format!("{} = {}", member, render(arena, *value))
                    }
                    MemberBinding::MemberMember { member, .. } => format!("{} = {{..}}", member),
                    MemberBinding::MemberList { member, .. } => format!("{} = [..]", member),
                })
                .collect();
            format!("{} {{ {} }}", render(arena, *new), inits.join(", "))
        }
        ExprKind::ListInit { new, .. } => format!("{} {{ .. }}", render(arena, *new)),
        ExprKind::Lambda { params, body } => {
            let params: Vec<_> = params.iter().map(|p| render(arena, *p)).collect();
            format!("({}) => {}", params.join(", "), render(arena, *body))
        }
        ExprKind::Index { object, name, args } => {
            let args: Vec<_> = args.iter().map(|a| render(arena, *a)).collect();
            let obj = match object {
                Some(o) => render(arena, *o),
                None => String::new(),
            };
            match name {
                Some(name) => format!("{}.{}[{}]", obj, name, args.join(", ")),
                None => format!("{}[{}]", obj, args.join(", ")),
            }
        }
        ExprKind::Block { .. } => "{ .. }".to_string(),
        ExprKind::Switch { subject } => format!("switch ({})", render(arena, *subject)),
        ExprKind::Loop { .. } => "loop { .. }".to_string(),
        ExprKind::TryCatch { .. } => "try { .. }".to_string(),
        ExprKind::Goto => "goto".to_string(),
        ExprKind::LabelTarget => "label".to_string(),
        ExprKind::Invoke { target, args } => {
            let args: Vec<_> = args.iter().map(|a| render(arena, *a)).collect();
            format!("{}({})", render(arena, *target), args.join(", "))
        }
        ExprKind::TypeIs { operand, test_ty } => {
            format!("({} is {})", render(arena, *operand), test_ty)
        }
        ExprKind::Dynamic => "dynamic".to_string(),
        ExprKind::DebugInfo => "debuginfo".to_string(),
        ExprKind::Default => format!("default({})", node.ty),
        ExprKind::ElementInit { .. } => "elementinit".to_string(),
    }
}
