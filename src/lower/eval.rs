//! Partial evaluation of closed sub-expressions.
//!
//! Static and closed-over member reads are compile-time constants; this is
//! the structural interpreter the pass uses to fold them. It evaluates only
//! closed trees (no parameters in scope) and reports everything else as an
//! error, which the pass surfaces as an unsupported expression. Nothing in
//! here panics.

use crate::expr::{BinKind, ExprArena, ExprId, ExprKind, Type, UnKind, Value};
use crate::lower::LowerContext;
use ecow::EcoString;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub(crate) enum EvalError {
    #[error("cannot evaluate expression kind `{0}` at compile time")]
    NotConstant(&'static str),

    #[error("type error: expected {expected}, got {got}")]
    TypeMismatch {
        expected: &'static str,
        got: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow")]
    Overflow,

    #[error("member `{0}` not found")]
    UnknownMember(EcoString),

    #[error("no static value registered for `{owner}.{name}`")]
    UnknownStatic { owner: EcoString, name: EcoString },

    #[error("expression node is not in the arena")]
    MissingNode,
}

pub(crate) fn eval_closed(
    arena: &ExprArena,
    ctx: &LowerContext,
    id: ExprId,
) -> Result<Value, EvalError> {
    let node = arena.get(id).ok_or(EvalError::MissingNode)?;
    match &node.kind {
        ExprKind::Constant { value } => Ok(value.clone()),

        ExprKind::Member {
            target: Some(target),
            name,
            ..
        } => match eval_closed(arena, ctx, *target)? {
            Value::Record(fields) => fields
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnknownMember(name.clone())),
            other => Err(EvalError::TypeMismatch {
                expected: "record",
                got: other.type_name(),
            }),
        },

        ExprKind::Member {
            target: None,
            owner,
            name,
        } => {
            let owner = owner.clone().unwrap_or_default();
            ctx.statics
                .get(&(owner.clone(), name.clone()))
                .cloned()
                .ok_or(EvalError::UnknownStatic {
                    owner,
                    name: name.clone(),
                })
        }

        ExprKind::Unary { op, operand } => {
            let v = eval_closed(arena, ctx, *operand)?;
            eval_unary(*op, v, &node.ty)
        }

        ExprKind::Binary { op, left, right } => {
            // Short-circuit forms must not evaluate the right operand eagerly.
            match op {
                BinKind::AndAlso => {
                    if !as_bool(eval_closed(arena, ctx, *left)?)? {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(as_bool(eval_closed(arena, ctx, *right)?)?))
                }
                BinKind::OrElse => {
                    if as_bool(eval_closed(arena, ctx, *left)?)? {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(as_bool(eval_closed(arena, ctx, *right)?)?))
                }
                _ => {
                    let l = eval_closed(arena, ctx, *left)?;
                    let r = eval_closed(arena, ctx, *right)?;
                    eval_binary(*op, l, r)
                }
            }
        }

        ExprKind::Conditional {
            test,
            then_branch,
            else_branch,
        } => {
            if as_bool(eval_closed(arena, ctx, *test)?)? {
                eval_closed(arena, ctx, *then_branch)
            } else {
                eval_closed(arena, ctx, *else_branch)
            }
        }

        other => Err(EvalError::NotConstant(other.name())),
    }
}

fn eval_unary(op: UnKind, v: Value, ty: &Type) -> Result<Value, EvalError> {
    match op {
        UnKind::Quote => Ok(v),
        UnKind::UnaryPlus => match v {
            Value::Int(_) | Value::Float(_) => Ok(v),
            other => Err(EvalError::TypeMismatch {
                expected: "number",
                got: other.type_name(),
            }),
        },
        UnKind::Negate | UnKind::NegateChecked => match v {
            Value::Int(i) => i.checked_neg().map(Value::Int).ok_or(EvalError::Overflow),
            Value::Float(x) => Ok(Value::Float(-x)),
            other => Err(EvalError::TypeMismatch {
                expected: "number",
                got: other.type_name(),
            }),
        },
        UnKind::Not => match v {
            Value::Bool(b) => Ok(Value::Bool(!b)),
            Value::Int(i) => Ok(Value::Int(!i)),
            other => Err(EvalError::TypeMismatch {
                expected: "bool or int",
                got: other.type_name(),
            }),
        },
        UnKind::OnesComplement => Ok(Value::Int(!as_int(v)?)),
        UnKind::Increment => as_int(v)?
            .checked_add(1)
            .map(Value::Int)
            .ok_or(EvalError::Overflow),
        UnKind::Decrement => as_int(v)?
            .checked_sub(1)
            .map(Value::Int)
            .ok_or(EvalError::Overflow),
        UnKind::Convert | UnKind::ConvertChecked | UnKind::TypeAs => Ok(convert(v, ty)),
        UnKind::PreIncrementAssign
        | UnKind::PreDecrementAssign
        | UnKind::PostIncrementAssign
        | UnKind::PostDecrementAssign => Err(EvalError::NotConstant("assignment")),
        UnKind::ArrayLength
        | UnKind::Throw
        | UnKind::Unbox
        | UnKind::IsTrue
        | UnKind::IsFalse => Err(EvalError::NotConstant(op.name())),
    }
}

/// Numeric widening/narrowing; anything else passes through untouched and
/// is left to downstream consumers.
fn convert(v: Value, ty: &Type) -> Value {
    match (v, ty) {
        (Value::Int(i), Type::Float) => Value::Float(i as f64),
        (Value::Float(x), Type::Int) => Value::Int(x as i64),
        (v, _) => v,
    }
}

fn eval_binary(op: BinKind, l: Value, r: Value) -> Result<Value, EvalError> {
    use BinKind::*;
    match op {
        Add => match (l, r) {
            (Value::Int(a), Value::Int(b)) => {
                a.checked_add(b).map(Value::Int).ok_or(EvalError::Overflow)
            }
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Value::Str(a), Value::Str(b)) => {
                let mut s = String::from(a.as_str());
                s.push_str(b.as_str());
                Ok(Value::Str(EcoString::from(s)))
            }
            (l, _) => Err(EvalError::TypeMismatch {
                expected: "int, float, or string",
                got: l.type_name(),
            }),
        },
        Subtract => arith(l, r, i64::checked_sub, |a, b| a - b),
        Multiply => arith(l, r, i64::checked_mul, |a, b| a * b),
        Divide => match (&l, &r) {
            (_, Value::Int(0)) => Err(EvalError::DivisionByZero),
            _ => arith(l, r, i64::checked_div, |a, b| a / b),
        },
        Modulo => match (&l, &r) {
            (_, Value::Int(0)) => Err(EvalError::DivisionByZero),
            _ => arith(l, r, i64::checked_rem, |a, b| a % b),
        },
        Power => match (l, r) {
            (Value::Int(a), Value::Int(b)) => {
                let exp = u32::try_from(b).map_err(|_| EvalError::Overflow)?;
                a.checked_pow(exp).map(Value::Int).ok_or(EvalError::Overflow)
            }
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a.powf(b))),
            (l, _) => Err(EvalError::TypeMismatch {
                expected: "number",
                got: l.type_name(),
            }),
        },
        And => bitwise_or_bool(l, r, |a, b| a & b, |a, b| a & b),
        Or => bitwise_or_bool(l, r, |a, b| a | b, |a, b| a | b),
        ExclusiveOr => bitwise_or_bool(l, r, |a, b| a ^ b, |a, b| a ^ b),
        LeftShift => shift(l, r, i64::checked_shl),
        RightShift => shift(l, r, i64::checked_shr),
        Equal => Ok(Value::Bool(l == r)),
        NotEqual => Ok(Value::Bool(l != r)),
        LessThan => compare(l, r, |o| o.is_lt()),
        LessThanOrEqual => compare(l, r, |o| o.is_le()),
        GreaterThan => compare(l, r, |o| o.is_gt()),
        GreaterThanOrEqual => compare(l, r, |o| o.is_ge()),
        // Short-circuit forms are handled by the caller.
        AndAlso | OrElse => Err(EvalError::NotConstant("short-circuit")),
        ArrayIndex => Err(EvalError::NotConstant("ArrayIndex")),
        Assign | AddAssign | SubtractAssign | MultiplyAssign | DivideAssign | ModuloAssign
        | PowerAssign | AndAssign | OrAssign | ExclusiveOrAssign | LeftShiftAssign
        | RightShiftAssign => Err(EvalError::NotConstant("assignment")),
    }
}

fn arith(
    l: Value,
    r: Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => {
            int_op(a, b).map(Value::Int).ok_or(EvalError::Overflow)
        }
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(a, b))),
        (l, _) => Err(EvalError::TypeMismatch {
            expected: "number",
            got: l.type_name(),
        }),
    }
}

fn bitwise_or_bool(
    l: Value,
    r: Value,
    int_op: fn(i64, i64) -> i64,
    bool_op: fn(bool, bool) -> bool,
) -> Result<Value, EvalError> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(a, b))),
        (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(bool_op(a, b))),
        (l, _) => Err(EvalError::TypeMismatch {
            expected: "int or bool",
            got: l.type_name(),
        }),
    }
}

fn shift(l: Value, r: Value, op: fn(i64, u32) -> Option<i64>) -> Result<Value, EvalError> {
    let a = as_int(l)?;
    let b = u32::try_from(as_int(r)?).map_err(|_| EvalError::Overflow)?;
    op(a, b).map(Value::Int).ok_or(EvalError::Overflow)
}

fn compare(
    l: Value,
    r: Value,
    check: fn(std::cmp::Ordering) -> bool,
) -> Result<Value, EvalError> {
    let ord = match (&l, &r) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        (Value::Float(a), Value::Float(b)) => {
            a.partial_cmp(b).ok_or(EvalError::NotConstant("NaN comparison"))?
        }
        _ => {
            return Err(EvalError::TypeMismatch {
                expected: "comparable values of one type",
                got: l.type_name(),
            })
        }
    };
    Ok(Value::Bool(check(ord)))
}

fn as_int(v: Value) -> Result<i64, EvalError> {
    match v {
        Value::Int(i) => Ok(i),
        other => Err(EvalError::TypeMismatch {
            expected: "int",
            got: other.type_name(),
        }),
    }
}

fn as_bool(v: Value) -> Result<bool, EvalError> {
    match v {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::TypeMismatch {
            expected: "bool",
            got: other.type_name(),
        }),
    }
}
