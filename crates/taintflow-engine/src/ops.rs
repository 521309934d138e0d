//! # Primitive Operations
//!
//! Value semantics of the host's arithmetic, logic and conversion
//! instructions. Taint never depends on the result; these functions only
//! compute the primary value the engine writes next to the merged tag.
//!
//! ## Semantics
//!
//! | Rule | Behaviour |
//! |------|-----------|
//! | Promotion | `byte`/`char`/`short`/`int` widen to `int`; mixed operands widen to `long`, `float`, then `double` |
//! | Integer overflow | wraps |
//! | Integer `/` and `%` by zero | `Arithmetic("/ by zero")` |
//! | Shifts | result has the left operand's type; distance masked to 5 (`int`) or 6 (`long`) bits |
//! | Float to integer | saturating, NaN becomes 0 |
//! | `boolean` | only `and`, `or`, `xor` and `not` |

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use taintflow_store::{PrimitiveKind, Value};

/// Two-operand instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `&`
    And,
    /// `|`
    Or,
    /// `^`
    Xor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `>>>`
    Ushr,
    /// Three-way compare; NaN compares as less.
    CmpL,
    /// Three-way compare; NaN compares as greater.
    CmpG,
}

/// One-operand instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Bitwise or logical complement.
    Not,
}

#[derive(Debug, Clone, Copy)]
enum Num {
    I(i32),
    J(i64),
    F(f32),
    D(f64),
}

impl Num {
    fn widen(value: Value, operation: &'static str) -> Result<Self> {
        match value {
            Value::Byte(v) => Ok(Num::I(i32::from(v))),
            Value::Char(v) => Ok(Num::I(i32::from(v))),
            Value::Short(v) => Ok(Num::I(i32::from(v))),
            Value::Int(v) => Ok(Num::I(v)),
            Value::Long(v) => Ok(Num::J(v)),
            Value::Float(v) => Ok(Num::F(v)),
            Value::Double(v) => Ok(Num::D(v)),
            other => Err(mismatch(operation, "numeric", other)),
        }
    }

    const fn rank(self) -> u8 {
        match self {
            Num::I(_) => 0,
            Num::J(_) => 1,
            Num::F(_) => 2,
            Num::D(_) => 3,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn to_i32(self) -> i32 {
        match self {
            Num::I(v) => v,
            Num::J(v) => v as i32,
            Num::F(v) => v as i32,
            Num::D(v) => v as i32,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn to_i64(self) -> i64 {
        match self {
            Num::I(v) => i64::from(v),
            Num::J(v) => v,
            Num::F(v) => v as i64,
            Num::D(v) => v as i64,
        }
    }

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    fn to_f32(self) -> f32 {
        match self {
            Num::I(v) => v as f32,
            Num::J(v) => v as f32,
            Num::F(v) => v,
            Num::D(v) => v as f32,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn to_f64(self) -> f64 {
        match self {
            Num::I(v) => f64::from(v),
            Num::J(v) => v as f64,
            Num::F(v) => f64::from(v),
            Num::D(v) => v,
        }
    }

    fn promote(a: Num, b: Num) -> (Num, Num) {
        match a.rank().max(b.rank()) {
            0 => (a, b),
            1 => (Num::J(a.to_i64()), Num::J(b.to_i64())),
            2 => (Num::F(a.to_f32()), Num::F(b.to_f32())),
            _ => (Num::D(a.to_f64()), Num::D(b.to_f64())),
        }
    }
}

fn type_name(value: Value) -> String {
    match value.kind() {
        Some(kind) => format!("{kind:?}").to_lowercase(),
        None => "reference".to_string(),
    }
}

fn mismatch(operation: &'static str, expected: &'static str, found: Value) -> EngineError {
    EngineError::TypeMismatch {
        operation,
        expected,
        found: type_name(found),
    }
}

fn div_by_zero() -> EngineError {
    EngineError::Arithmetic("/ by zero".to_string())
}

/// Applies a two-operand instruction.
///
/// # Errors
///
/// `TypeMismatch` for operand types the instruction does not accept, and
/// `Arithmetic` for integer division or remainder by zero.
///
/// # Example
///
/// ```rust
/// use taintflow_engine::{apply_binary, BinaryOp};
/// use taintflow_store::Value;
///
/// let v = apply_binary(BinaryOp::Add, Value::Int(i32::MAX), Value::Int(1))?;
/// assert_eq!(v, Value::Int(i32::MIN));
/// # Ok::<(), taintflow_engine::EngineError>(())
/// ```
pub fn apply_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    if let (Value::Boolean(a), Value::Boolean(b)) = (lhs, rhs) {
        return match op {
            BinaryOp::And => Ok(Value::Boolean(a & b)),
            BinaryOp::Or => Ok(Value::Boolean(a | b)),
            BinaryOp::Xor => Ok(Value::Boolean(a ^ b)),
            _ => Err(mismatch("binary op", "numeric", lhs)),
        };
    }

    match op {
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr => shift(op, lhs, rhs),
        BinaryOp::CmpL | BinaryOp::CmpG => compare(op, lhs, rhs),
        _ => {
            let (a, b) = Num::promote(Num::widen(lhs, "binary op")?, Num::widen(rhs, "binary op")?);
            match (a, b) {
                (Num::I(a), Num::I(b)) => int_op(op, a, b).map(Value::Int),
                (Num::J(a), Num::J(b)) => long_op(op, a, b).map(Value::Long),
                (Num::F(a), Num::F(b)) => float_op(op, f64::from(a), f64::from(b))
                    .map(|v| Value::Float(narrow_f32(v))),
                (a, b) => float_op(op, a.to_f64(), b.to_f64()).map(Value::Double),
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn narrow_f32(v: f64) -> f32 {
    v as f32
}

fn int_op(op: BinaryOp, a: i32, b: i32) -> Result<i32> {
    match op {
        BinaryOp::Add => Ok(a.wrapping_add(b)),
        BinaryOp::Sub => Ok(a.wrapping_sub(b)),
        BinaryOp::Mul => Ok(a.wrapping_mul(b)),
        BinaryOp::Div if b == 0 => Err(div_by_zero()),
        BinaryOp::Div => Ok(a.wrapping_div(b)),
        BinaryOp::Rem if b == 0 => Err(div_by_zero()),
        BinaryOp::Rem => Ok(a.wrapping_rem(b)),
        BinaryOp::And => Ok(a & b),
        BinaryOp::Or => Ok(a | b),
        BinaryOp::Xor => Ok(a ^ b),
        _ => Err(mismatch("int op", "arithmetic op", Value::Int(a))),
    }
}

fn long_op(op: BinaryOp, a: i64, b: i64) -> Result<i64> {
    match op {
        BinaryOp::Add => Ok(a.wrapping_add(b)),
        BinaryOp::Sub => Ok(a.wrapping_sub(b)),
        BinaryOp::Mul => Ok(a.wrapping_mul(b)),
        BinaryOp::Div if b == 0 => Err(div_by_zero()),
        BinaryOp::Div => Ok(a.wrapping_div(b)),
        BinaryOp::Rem if b == 0 => Err(div_by_zero()),
        BinaryOp::Rem => Ok(a.wrapping_rem(b)),
        BinaryOp::And => Ok(a & b),
        BinaryOp::Or => Ok(a | b),
        BinaryOp::Xor => Ok(a ^ b),
        _ => Err(mismatch("long op", "arithmetic op", Value::Long(a))),
    }
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> Result<f64> {
    match op {
        BinaryOp::Add => Ok(a + b),
        BinaryOp::Sub => Ok(a - b),
        BinaryOp::Mul => Ok(a * b),
        BinaryOp::Div => Ok(a / b),
        BinaryOp::Rem => Ok(a % b),
        _ => Err(mismatch("floating op", "integral", Value::Double(a))),
    }
}

fn shift(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    let distance = match Num::widen(rhs, "shift")? {
        Num::I(v) => i64::from(v),
        Num::J(v) => v,
        _ => return Err(mismatch("shift", "integral", rhs)),
    };
    match Num::widen(lhs, "shift")? {
        Num::I(v) => {
            let s = (distance & 0x1f) as u32;
            Ok(Value::Int(match op {
                BinaryOp::Shl => v.wrapping_shl(s),
                BinaryOp::Shr => v >> s,
                _ => ((v as u32) >> s) as i32,
            }))
        }
        Num::J(v) => {
            let s = (distance & 0x3f) as u32;
            Ok(Value::Long(match op {
                BinaryOp::Shl => v.wrapping_shl(s),
                BinaryOp::Shr => v >> s,
                _ => ((v as u64) >> s) as i64,
            }))
        }
        _ => Err(mismatch("shift", "integral", lhs)),
    }
}

fn compare(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value> {
    let (a, b) = Num::promote(Num::widen(lhs, "compare")?, Num::widen(rhs, "compare")?);
    let ordering = match (a, b) {
        (Num::I(a), Num::I(b)) => Some(a.cmp(&b)),
        (Num::J(a), Num::J(b)) => Some(a.cmp(&b)),
        (a, b) => a.to_f64().partial_cmp(&b.to_f64()),
    };
    Ok(Value::Int(match ordering {
        Some(Ordering::Less) => -1,
        Some(Ordering::Equal) => 0,
        Some(Ordering::Greater) => 1,
        None if op == BinaryOp::CmpL => -1,
        None => 1,
    }))
}

/// Applies a one-operand instruction.
///
/// # Errors
///
/// `TypeMismatch` for `Not` on floating values and for references.
pub fn apply_unary(op: UnaryOp, operand: Value) -> Result<Value> {
    if let Value::Boolean(b) = operand {
        return match op {
            UnaryOp::Not => Ok(Value::Boolean(!b)),
            UnaryOp::Neg => Err(mismatch("neg", "numeric", operand)),
        };
    }
    match (op, Num::widen(operand, "unary op")?) {
        (UnaryOp::Neg, Num::I(v)) => Ok(Value::Int(v.wrapping_neg())),
        (UnaryOp::Neg, Num::J(v)) => Ok(Value::Long(v.wrapping_neg())),
        (UnaryOp::Neg, Num::F(v)) => Ok(Value::Float(-v)),
        (UnaryOp::Neg, Num::D(v)) => Ok(Value::Double(-v)),
        (UnaryOp::Not, Num::I(v)) => Ok(Value::Int(!v)),
        (UnaryOp::Not, Num::J(v)) => Ok(Value::Long(!v)),
        (UnaryOp::Not, _) => Err(mismatch("not", "integral", operand)),
    }
}

/// Converts a primitive value to another primitive kind.
///
/// Narrowing integer conversions truncate; floating to `byte`, `char` or
/// `short` first saturates to `int` and then truncates.
///
/// # Errors
///
/// `TypeMismatch` for references and for conversions into or out of
/// `boolean` other than the identity conversion.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn convert_value(value: Value, to: PrimitiveKind) -> Result<Value> {
    if value.kind() == Some(to) {
        return Ok(value);
    }
    if to == PrimitiveKind::Boolean {
        return Err(mismatch("convert", "boolean", value));
    }
    let n = Num::widen(value, "convert")?;
    Ok(match to {
        PrimitiveKind::Byte => Value::Byte(n.to_i32() as i8),
        PrimitiveKind::Char => Value::Char(n.to_i32() as u16),
        PrimitiveKind::Short => Value::Short(n.to_i32() as i16),
        PrimitiveKind::Int => Value::Int(n.to_i32()),
        PrimitiveKind::Long => Value::Long(n.to_i64()),
        PrimitiveKind::Float => Value::Float(n.to_f32()),
        PrimitiveKind::Double | PrimitiveKind::Boolean => Value::Double(n.to_f64()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------
    // Integer arithmetic
    // ------------------------------------------------------------------

    #[test]
    fn test_int_overflow_wraps() {
        assert_eq!(
            apply_binary(BinaryOp::Mul, Value::Int(0x4000_0000), Value::Int(4)).unwrap(),
            Value::Int(0)
        );
        assert_eq!(
            apply_binary(BinaryOp::Div, Value::Int(i32::MIN), Value::Int(-1)).unwrap(),
            Value::Int(i32::MIN)
        );
    }

    #[test]
    fn test_division_by_zero() {
        let err = apply_binary(BinaryOp::Div, Value::Int(1), Value::Int(0)).unwrap_err();
        assert_eq!(err, EngineError::Arithmetic("/ by zero".into()));
        assert!(apply_binary(BinaryOp::Rem, Value::Long(1), Value::Long(0)).is_err());
        assert_eq!(
            apply_binary(BinaryOp::Div, Value::Double(1.0), Value::Double(0.0)).unwrap(),
            Value::Double(f64::INFINITY)
        );
    }

    #[test]
    fn test_small_ints_promote() {
        assert_eq!(
            apply_binary(BinaryOp::Add, Value::Byte(100), Value::Byte(100)).unwrap(),
            Value::Int(200)
        );
        assert_eq!(
            apply_binary(BinaryOp::Add, Value::Char(u16::from(b'a')), Value::Int(1)).unwrap(),
            Value::Int(98)
        );
        assert_eq!(
            apply_binary(BinaryOp::Add, Value::Int(1), Value::Long(2)).unwrap(),
            Value::Long(3)
        );
        assert_eq!(
            apply_binary(BinaryOp::Mul, Value::Int(3), Value::Float(0.5)).unwrap(),
            Value::Float(1.5)
        );
    }

    // ------------------------------------------------------------------
    // Shifts and comparisons
    // ------------------------------------------------------------------

    #[test]
    fn test_shift_distance_masked() {
        assert_eq!(
            apply_binary(BinaryOp::Shl, Value::Int(1), Value::Int(33)).unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            apply_binary(BinaryOp::Shl, Value::Long(1), Value::Int(33)).unwrap(),
            Value::Long(1 << 33)
        );
        assert_eq!(
            apply_binary(BinaryOp::Ushr, Value::Int(-1), Value::Int(28)).unwrap(),
            Value::Int(0xf)
        );
        assert_eq!(
            apply_binary(BinaryOp::Shr, Value::Int(-16), Value::Int(2)).unwrap(),
            Value::Int(-4)
        );
    }

    #[test]
    fn test_compare_nan_bias() {
        let nan = Value::Double(f64::NAN);
        assert_eq!(apply_binary(BinaryOp::CmpL, nan, Value::Double(0.0)).unwrap(), Value::Int(-1));
        assert_eq!(apply_binary(BinaryOp::CmpG, nan, Value::Double(0.0)).unwrap(), Value::Int(1));
        assert_eq!(apply_binary(BinaryOp::CmpL, Value::Long(5), Value::Long(5)).unwrap(), Value::Int(0));
    }

    #[test]
    fn test_boolean_logic_only() {
        let t = Value::Boolean(true);
        let f = Value::Boolean(false);
        assert_eq!(apply_binary(BinaryOp::Xor, t, f).unwrap(), t);
        assert!(apply_binary(BinaryOp::Add, t, f).is_err());
        assert_eq!(apply_unary(UnaryOp::Not, t).unwrap(), f);
    }

    #[test]
    fn test_references_rejected() {
        let err = apply_binary(BinaryOp::Add, Value::NULL, Value::Int(1)).unwrap_err();
        assert!(matches!(err, EngineError::TypeMismatch { .. }));
        assert!(apply_unary(UnaryOp::Neg, Value::NULL).is_err());
    }

    // ------------------------------------------------------------------
    // Conversions
    // ------------------------------------------------------------------

    #[test]
    fn test_narrowing_conversions() {
        assert_eq!(convert_value(Value::Int(0x1ff), PrimitiveKind::Byte).unwrap(), Value::Byte(-1));
        assert_eq!(convert_value(Value::Int(-1), PrimitiveKind::Char).unwrap(), Value::Char(0xffff));
        assert_eq!(
            convert_value(Value::Long(0x1_0000_0002), PrimitiveKind::Int).unwrap(),
            Value::Int(2)
        );
    }

    #[test]
    fn test_float_to_int_saturates() {
        assert_eq!(
            convert_value(Value::Double(1e20), PrimitiveKind::Int).unwrap(),
            Value::Int(i32::MAX)
        );
        assert_eq!(
            convert_value(Value::Float(f32::NAN), PrimitiveKind::Long).unwrap(),
            Value::Long(0)
        );
        // f2i then i2b: 300.0 -> 300 -> 44
        assert_eq!(
            convert_value(Value::Float(300.0), PrimitiveKind::Byte).unwrap(),
            Value::Byte(44)
        );
    }

    #[test]
    fn test_boolean_conversion_rejected() {
        assert!(convert_value(Value::Int(1), PrimitiveKind::Boolean).is_err());
        assert!(convert_value(Value::Boolean(true), PrimitiveKind::Int).is_err());
        assert_eq!(
            convert_value(Value::Boolean(true), PrimitiveKind::Boolean).unwrap(),
            Value::Boolean(true)
        );
    }
}
