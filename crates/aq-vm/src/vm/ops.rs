//! Value operation helpers
//!
//! Binary operations promote mixed numeric operands to the wider type in the
//! order byte < long < double < uint64. Byte results that leave the int8 range
//! come back as long instead of wrapping.

use crate::error::VmError;
use crate::opcode::{CmpOp, OpCode};
use crate::value::{convert_numeric, tag, ArrayRef, Value};
use std::cmp::Ordering;

/// Binary arithmetic and bitwise operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    pub(crate) fn from_opcode(opcode: OpCode) -> Option<Self> {
        let op = match opcode {
            OpCode::Add => BinaryOp::Add,
            OpCode::Sub => BinaryOp::Sub,
            OpCode::Mul => BinaryOp::Mul,
            OpCode::Div => BinaryOp::Div,
            OpCode::Rem => BinaryOp::Rem,
            OpCode::Shl => BinaryOp::Shl,
            OpCode::Shr => BinaryOp::Shr,
            OpCode::And => BinaryOp::And,
            OpCode::Or => BinaryOp::Or,
            OpCode::Xor => BinaryOp::Xor,
            _ => return None,
        };
        Some(op)
    }

    fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "addition",
            BinaryOp::Sub => "subtraction",
            BinaryOp::Mul => "multiplication",
            BinaryOp::Div => "division",
            BinaryOp::Rem => "remainder",
            BinaryOp::Shl => "shift left",
            BinaryOp::Shr => "shift right",
            BinaryOp::And => "bitwise and",
            BinaryOp::Or => "bitwise or",
            BinaryOp::Xor => "bitwise xor",
        }
    }
}

/// Implementation of value operations for the VM
pub(crate) struct ValueOperations;

impl ValueOperations {
    /// Apply `op`. A string built by repetition may hold at most `max_len`
    /// bytes.
    pub(crate) fn binary(
        op: BinaryOp,
        left: &Value,
        right: &Value,
        max_len: usize,
    ) -> Result<Value, VmError> {
        match (left, right) {
            (l, r) if l.is_numeric() && r.is_numeric() => Self::numeric(op, l, r),

            (Value::Str(a), Value::Str(b)) if op == BinaryOp::Add => {
                Ok(Value::Str(format!("{}{}", a, b)))
            }
            (Value::Str(s), n) | (n, Value::Str(s)) if op == BinaryOp::Mul && n.is_numeric() => {
                let count = Self::integer(n).ok_or_else(|| mismatch(op, left, right))?;
                let count = u64::try_from(count).map_err(|_| mismatch(op, left, right))?;
                let requested = (s.len() as u64).saturating_mul(count);
                if requested > max_len as u64 {
                    return Err(VmError::AllocationLimit {
                        what: "string",
                        requested,
                        limit: max_len,
                    });
                }
                let count = usize::try_from(count).map_err(|_| mismatch(op, left, right))?;
                Ok(Value::Str(s.repeat(count)))
            }

            (Value::Array(a), n) if op == BinaryOp::Add && n.is_numeric() => {
                let n = Self::integer(n).ok_or_else(|| mismatch(op, left, right))?;
                Ok(Value::Array(shift(*a, n)))
            }
            (n, Value::Array(a)) if op == BinaryOp::Add && n.is_numeric() => {
                let n = Self::integer(n).ok_or_else(|| mismatch(op, left, right))?;
                Ok(Value::Array(shift(*a, n)))
            }
            (Value::Array(a), n) if op == BinaryOp::Sub && n.is_numeric() => {
                let n = Self::integer(n).ok_or_else(|| mismatch(op, left, right))?;
                Ok(Value::Array(shift(*a, n.wrapping_neg())))
            }
            (Value::Array(a), Value::Array(b)) if op == BinaryOp::Sub && a.storage == b.storage => {
                Ok(Value::Long(a.offset.wrapping_sub(b.offset)))
            }

            _ => Err(mismatch(op, left, right)),
        }
    }

    pub(crate) fn neg_value(value: &Value) -> Result<Value, VmError> {
        match value {
            Value::Byte(v) => Ok(narrow(-(*v as i64))),
            Value::Long(v) => Ok(Value::Long(v.wrapping_neg())),
            Value::Double(v) => Ok(Value::Double(-v)),
            Value::U64(v) => Ok(Value::U64(v.wrapping_neg())),
            other => Err(VmError::type_error(
                "negation",
                "number",
                other.type_name(),
            )),
        }
    }

    /// Evaluate a comparison
    pub(crate) fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, VmError> {
        let ordering = match (left, right) {
            (Value::Double(_), r) | (r, Value::Double(_)) if r.is_numeric() => {
                let a = Self::float(left);
                let b = Self::float(right);
                a.partial_cmp(&b)
            }
            (l, r) if l.is_numeric() && r.is_numeric() => {
                Self::integer(l).zip(Self::integer(r)).map(|(a, b)| a.cmp(&b))
            }
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Array(a), Value::Array(b)) => match op {
                CmpOp::Eq => return Ok(a == b),
                CmpOp::Ne => return Ok(a != b),
                _ => {
                    return Err(VmError::type_error(
                        format!("comparison {}", op.symbol()),
                        "number or string",
                        "array",
                    ))
                }
            },
            _ => {
                return Err(VmError::type_error(
                    format!("comparison {}", op.symbol()),
                    "matching operand types",
                    format!("{} {} {}", left.type_name(), op.symbol(), right.type_name()),
                ))
            }
        };

        // NaN compares unequal to everything
        Ok(match ordering {
            Some(ordering) => op.holds(ordering),
            None => op == CmpOp::Ne,
        })
    }

    // ===== Numeric kernels =====

    fn numeric(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, VmError> {
        let wider = match (tag::rank(left.tag()), tag::rank(right.tag())) {
            (Some(a), Some(b)) if a >= b => left.tag(),
            _ => right.tag(),
        };
        let promote = |v: &Value| convert_numeric(v, wider).map(|(v, _)| v);
        let (l, r) = match (promote(left), promote(right)) {
            (Some(l), Some(r)) => (l, r),
            _ => return Err(mismatch(op, left, right)),
        };

        match (l, r) {
            (Value::Byte(a), Value::Byte(b)) => {
                Self::long(op, a as i64, b as i64).map(|v| match v {
                    Value::Long(v) => narrow(v),
                    other => other,
                })
            }
            (Value::Long(a), Value::Long(b)) => Self::long(op, a, b),
            (Value::U64(a), Value::U64(b)) => Self::unsigned(op, a, b),
            (Value::Double(a), Value::Double(b)) => Self::double(op, a, b),
            _ => Err(mismatch(op, left, right)),
        }
    }

    fn long(op: BinaryOp, a: i64, b: i64) -> Result<Value, VmError> {
        let v = match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            BinaryOp::Div => {
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                if a.checked_rem(b) != Some(0) {
                    return Ok(Value::Double(a as f64 / b as f64));
                }
                a.wrapping_div(b)
            }
            BinaryOp::Rem => {
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                a.wrapping_rem(b)
            }
            BinaryOp::Shl => a.wrapping_shl(b as u32),
            BinaryOp::Shr => a.wrapping_shr(b as u32),
            BinaryOp::And => a & b,
            BinaryOp::Or => a | b,
            BinaryOp::Xor => a ^ b,
        };
        Ok(Value::Long(v))
    }

    fn unsigned(op: BinaryOp, a: u64, b: u64) -> Result<Value, VmError> {
        let v = match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Sub => a.wrapping_sub(b),
            BinaryOp::Mul => a.wrapping_mul(b),
            BinaryOp::Div => {
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                if a % b != 0 {
                    return Ok(Value::Double(a as f64 / b as f64));
                }
                a / b
            }
            BinaryOp::Rem => {
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                a % b
            }
            BinaryOp::Shl => a.wrapping_shl(b as u32),
            BinaryOp::Shr => a.wrapping_shr(b as u32),
            BinaryOp::And => a & b,
            BinaryOp::Or => a | b,
            BinaryOp::Xor => a ^ b,
        };
        Ok(Value::U64(v))
    }

    fn double(op: BinaryOp, a: f64, b: f64) -> Result<Value, VmError> {
        let v = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Rem => a % b,
            _ => {
                return Err(VmError::type_error(
                    op.name(),
                    "integer",
                    "double",
                ))
            }
        };
        Ok(Value::Double(v))
    }

    /// Integer view of an integer-typed value
    fn integer(value: &Value) -> Option<i128> {
        match value {
            Value::Byte(v) => Some(*v as i128),
            Value::Long(v) => Some(*v as i128),
            Value::U64(v) => Some(*v as i128),
            _ => None,
        }
    }

    fn float(value: &Value) -> f64 {
        match value {
            Value::Byte(v) => *v as f64,
            Value::Long(v) => *v as f64,
            Value::U64(v) => *v as f64,
            Value::Double(v) => *v,
            _ => f64::NAN,
        }
    }
}

/// Byte when it fits, long otherwise
fn narrow(v: i64) -> Value {
    match i8::try_from(v) {
        Ok(b) => Value::Byte(b),
        Err(_) => Value::Long(v),
    }
}

fn shift(array: ArrayRef, by: i128) -> ArrayRef {
    ArrayRef {
        storage: array.storage,
        offset: array.offset.wrapping_add(by as i64),
    }
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> VmError {
    VmError::type_error(
        op.name(),
        "compatible operands",
        format!("{} and {}", left.type_name(), right.type_name()),
    )
}
