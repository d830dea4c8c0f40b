use crate::expr::{MethodRef, Type, Value};
use ecow::EcoString;
use serde::{Deserialize, Serialize};

/// Index of a variable in an [`IrBody`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct VarId(pub u32);

/// Index of an instruction in an [`IrBody`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct InstrId(pub u32);

/// The closed set of three-address operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Negate,
    Increment,
    Decrement,
    OnesComplement,
    // Bitwise
    And,
    Or,
    ExclusiveOr,
    Not,
    LeftShift,
    RightShift,
    // Short-circuit boolean
    AndAlso,
    OrElse,
    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    // Assignment
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
    PreIncrementAssign,
    PreDecrementAssign,
    PostIncrementAssign,
    PostDecrementAssign,
    // Everything else
    Conditional,
    Convert,
    ArrayIndex,
    Index,
    Call,
    New,
    NewArrayInit,
    NewArrayBounds,
    MemberRead,
    MemberWrite,
}

/// A variable referenced by instructions: a lambda parameter, an immutable
/// constant, or a temporary holding one instruction's result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Var {
    Param {
        name: EcoString,
        ty: Type,
    },
    Const {
        ty: Type,
        value: Value,
    },
    /// `def` is the single instruction whose first destination is this temp.
    Temp {
        ty: Type,
        def: InstrId,
    },
}

impl Var {
    pub fn ty(&self) -> &Type {
        match self {
            Var::Param { ty, .. } | Var::Const { ty, .. } | Var::Temp { ty, .. } => ty,
        }
    }
}

/// A three-address instruction. `method` is populated only for `Call`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instr {
    pub op: Opcode,
    pub srcs: Vec<VarId>,
    pub dsts: Vec<VarId>,
    pub method: Option<MethodRef>,
}

/// One lowered lambda: the instruction list plus the variable arena its
/// operand indices point into. Instructions and variables reference each
/// other by index, so the temp/defining-instruction cycle needs no pointers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IrBody {
    pub vars: Vec<Var>,
    pub instrs: Vec<Instr>,
}

impl IrBody {
    pub fn var(&self, id: VarId) -> &Var {
        &self.vars[id.0 as usize]
    }

    pub fn instr(&self, id: InstrId) -> &Instr {
        &self.instrs[id.0 as usize]
    }

    /// Human-readable operand name: parameter name, constant value, or `tN`.
    pub fn var_name(&self, id: VarId) -> String {
        match self.var(id) {
            Var::Param { name, .. } => name.to_string(),
            Var::Const { value, .. } => value.to_string(),
            Var::Temp { .. } => format!("t{}", id.0),
        }
    }

    /// Renders the instruction list, one `dsts = Op(srcs)` line per entry.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for instr in &self.instrs {
            let srcs: Vec<_> = instr.srcs.iter().map(|s| self.var_name(*s)).collect();
            let dsts: Vec<_> = instr.dsts.iter().map(|d| self.var_name(*d)).collect();
            if !dsts.is_empty() {
                out.push_str(&dsts.join(", "));
                out.push_str(" = ");
            }
            out.push_str(&format!("{:?}({})", instr.op, srcs.join(", ")));
            if let Some(method) = &instr.method {
                out.push_str(&format!(" [{}]", method));
            }
            out.push('\n');
        }
        out
    }
}
