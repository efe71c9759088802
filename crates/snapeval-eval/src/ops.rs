//! Language-level arithmetic on primitive values.
//!
//! Integral arithmetic wraps and faults on a zero divisor; floating point
//! follows IEEE 754 and never faults. Shift distances are masked to the
//! width of the promoted left operand.

use snapeval_parser::types::Primitive;

use crate::error::{Fault, Result};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    UShr,
    And,
    Or,
    Xor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

fn mismatch(value: &Value, to: Primitive) -> Fault {
    Fault::internal(format!("cannot convert {} to {}", value, to.name()))
}

/// Primitive conversion, widening or narrowing, as a cast performs it.
pub fn convert(value: &Value, to: Primitive) -> Result<Value> {
    if to == Primitive::Boolean {
        return match value {
            Value::Boolean(b) => Ok(Value::Boolean(*b)),
            other => Err(mismatch(other, to)),
        };
    }
    Ok(match *value {
        Value::Float(x) => from_f32(x, to),
        Value::Double(x) => from_f64(x, to),
        other => match other.as_long() {
            Some(x) => from_i64(x, to),
            None => return Err(mismatch(&other, to)),
        },
    })
}

fn from_i64(x: i64, to: Primitive) -> Value {
    match to {
        Primitive::Byte => Value::Byte(x as i8),
        Primitive::Short => Value::Short(x as i16),
        Primitive::Char => Value::Char(x as u16),
        Primitive::Int => Value::Int(x as i32),
        Primitive::Long => Value::Long(x),
        Primitive::Float => Value::Float(x as f32),
        Primitive::Double => Value::Double(x as f64),
        Primitive::Boolean => Value::Boolean(x != 0),
    }
}

// float-to-integral conversions saturate and map NaN to zero; narrower
// integral targets go through int first
fn from_f64(x: f64, to: Primitive) -> Value {
    match to {
        Primitive::Byte => Value::Byte(x as i32 as i8),
        Primitive::Short => Value::Short(x as i32 as i16),
        Primitive::Char => Value::Char(x as i32 as u16),
        Primitive::Int => Value::Int(x as i32),
        Primitive::Long => Value::Long(x as i64),
        Primitive::Float => Value::Float(x as f32),
        Primitive::Double => Value::Double(x),
        Primitive::Boolean => Value::Boolean(x != 0.0),
    }
}

fn from_f32(x: f32, to: Primitive) -> Value {
    match to {
        Primitive::Byte => Value::Byte(x as i32 as i8),
        Primitive::Short => Value::Short(x as i32 as i16),
        Primitive::Char => Value::Char(x as i32 as u16),
        Primitive::Int => Value::Int(x as i32),
        Primitive::Long => Value::Long(x as i64),
        Primitive::Float => Value::Float(x),
        Primitive::Double => Value::Double(x as f64),
        Primitive::Boolean => Value::Boolean(x != 0.0),
    }
}

fn int_op(op: ArithOp, a: i32, b: i32) -> Result<i32> {
    Ok(match op {
        ArithOp::Add => a.wrapping_add(b),
        ArithOp::Sub => a.wrapping_sub(b),
        ArithOp::Mul => a.wrapping_mul(b),
        ArithOp::Div if b == 0 => return Err(Fault::DivideByZero),
        ArithOp::Div => a.wrapping_div(b),
        ArithOp::Rem if b == 0 => return Err(Fault::DivideByZero),
        ArithOp::Rem => a.wrapping_rem(b),
        ArithOp::Shl => a.wrapping_shl(b as u32),
        ArithOp::Shr => a.wrapping_shr(b as u32),
        ArithOp::UShr => (a as u32).wrapping_shr(b as u32) as i32,
        ArithOp::And => a & b,
        ArithOp::Or => a | b,
        ArithOp::Xor => a ^ b,
    })
}

fn long_op(op: ArithOp, a: i64, b: i64) -> Result<i64> {
    Ok(match op {
        ArithOp::Add => a.wrapping_add(b),
        ArithOp::Sub => a.wrapping_sub(b),
        ArithOp::Mul => a.wrapping_mul(b),
        ArithOp::Div if b == 0 => return Err(Fault::DivideByZero),
        ArithOp::Div => a.wrapping_div(b),
        ArithOp::Rem if b == 0 => return Err(Fault::DivideByZero),
        ArithOp::Rem => a.wrapping_rem(b),
        ArithOp::Shl => a.wrapping_shl(b as u32),
        ArithOp::Shr => a.wrapping_shr(b as u32),
        ArithOp::UShr => (a as u64).wrapping_shr(b as u32) as i64,
        ArithOp::And => a & b,
        ArithOp::Or => a | b,
        ArithOp::Xor => a ^ b,
    })
}

fn float_op(op: ArithOp, a: f64, b: f64) -> Result<f64> {
    Ok(match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::Rem => a % b,
        other => return Err(Fault::internal(format!("{:?} on floating point operands", other))),
    })
}

fn bool_op(op: ArithOp, a: bool, b: bool) -> Result<bool> {
    Ok(match op {
        ArithOp::And => a & b,
        ArithOp::Or => a | b,
        ArithOp::Xor => a ^ b,
        other => return Err(Fault::internal(format!("{:?} on boolean operands", other))),
    })
}

fn is_shift(op: ArithOp) -> bool {
    matches!(op, ArithOp::Shl | ArithOp::Shr | ArithOp::UShr)
}

/// Apply a binary arithmetic, bitwise or shift operator at type `p`.
///
/// Operands are converted to `p` first, except the right operand of a
/// shift, which only needs to be integral.
pub fn arithmetic(op: ArithOp, p: Primitive, lhs: &Value, rhs: &Value) -> Result<Value> {
    let distance = |v: &Value| v.as_long().ok_or_else(|| mismatch(v, Primitive::Int));
    match p {
        Primitive::Boolean => {
            let (a, b) = (lhs.as_bool(), rhs.as_bool());
            match (a, b) {
                (Some(a), Some(b)) => Ok(Value::Boolean(bool_op(op, a, b)?)),
                _ => Err(Fault::internal(format!("{:?} on non-boolean operands", op))),
            }
        }
        Primitive::Long => {
            let Value::Long(a) = convert(lhs, Primitive::Long)? else {
                return Err(mismatch(lhs, p));
            };
            let b = if is_shift(op) {
                distance(rhs)?
            } else {
                convert(rhs, Primitive::Long)?.as_long().ok_or_else(|| mismatch(rhs, p))?
            };
            Ok(Value::Long(long_op(op, a, b)?))
        }
        Primitive::Float => match (convert(lhs, p)?, convert(rhs, p)?) {
            (Value::Float(a), Value::Float(b)) => {
                // f32 arithmetic is exact when carried out in f64 and rounded once
                Ok(Value::Float(float_op(op, a as f64, b as f64)? as f32))
            }
            _ => Err(mismatch(lhs, p)),
        },
        Primitive::Double => match (convert(lhs, p)?, convert(rhs, p)?) {
            (Value::Double(a), Value::Double(b)) => Ok(Value::Double(float_op(op, a, b)?)),
            _ => Err(mismatch(lhs, p)),
        },
        _ => {
            let Value::Int(a) = convert(lhs, Primitive::Int)? else {
                return Err(mismatch(lhs, p));
            };
            let b = if is_shift(op) {
                distance(rhs)? as i32
            } else {
                match convert(rhs, Primitive::Int)? {
                    Value::Int(b) => b,
                    other => return Err(mismatch(&other, p)),
                }
            };
            Ok(Value::Int(int_op(op, a, b)?))
        }
    }
}

/// Compare two primitives at type `p`. NaN compares unequal to everything,
/// itself included.
pub fn compare(op: CompareOp, p: Primitive, lhs: &Value, rhs: &Value) -> Result<bool> {
    fn apply<T: PartialOrd>(op: CompareOp, a: T, b: T) -> bool {
        match op {
            CompareOp::Lt => a < b,
            CompareOp::Le => a <= b,
            CompareOp::Gt => a > b,
            CompareOp::Ge => a >= b,
            CompareOp::Eq => a == b,
            CompareOp::Ne => a != b,
        }
    }
    match (convert(lhs, p)?, convert(rhs, p)?) {
        (Value::Boolean(a), Value::Boolean(b)) if matches!(op, CompareOp::Eq | CompareOp::Ne) => Ok(apply(op, a, b)),
        (Value::Float(a), Value::Float(b)) => Ok(apply(op, a, b)),
        (Value::Double(a), Value::Double(b)) => Ok(apply(op, a, b)),
        (a, b) => match (a.as_long(), b.as_long()) {
            (Some(a), Some(b)) => Ok(apply(op, a, b)),
            _ => Err(Fault::internal(format!("{:?} on {} and {}", op, lhs, rhs))),
        },
    }
}

pub fn negate(p: Primitive, value: &Value) -> Result<Value> {
    Ok(match convert(value, p)? {
        Value::Int(x) => Value::Int(x.wrapping_neg()),
        Value::Long(x) => Value::Long(x.wrapping_neg()),
        Value::Float(x) => Value::Float(-x),
        Value::Double(x) => Value::Double(-x),
        other => return Err(Fault::internal(format!("cannot negate {}", other))),
    })
}

pub fn bit_not(p: Primitive, value: &Value) -> Result<Value> {
    Ok(match convert(value, p)? {
        Value::Int(x) => Value::Int(!x),
        Value::Long(x) => Value::Long(!x),
        other => return Err(Fault::internal(format!("cannot complement {}", other))),
    })
}

/// `value + 1` or `value - 1` at the value's own type, narrowing back.
pub fn step(value: &Value, delta: i32) -> Result<Value> {
    let Some(p) = value.primitive() else {
        return Err(Fault::internal(format!("cannot increment {}", value)));
    };
    let promoted = match p {
        Primitive::Long | Primitive::Float | Primitive::Double => p,
        _ => Primitive::Int,
    };
    let stepped = arithmetic(ArithOp::Add, promoted, value, &Value::Int(delta))?;
    convert(&stepped, p)
}

pub fn char_string(c: u16) -> String {
    String::from_utf16_lossy(&[c])
}

/// Text of a primitive as string conversion renders it.
pub fn primitive_string(value: &Value) -> Option<String> {
    Some(match *value {
        Value::Boolean(b) => b.to_string(),
        Value::Char(c) => char_string(c),
        Value::Float(x) => format_floating(x as f64, x.to_string(), format!("{:e}", x)),
        Value::Double(x) => format_floating(x, x.to_string(), format!("{:e}", x)),
        other => other.as_long()?.to_string(),
    })
}

// plain notation within [1e-3, 1e7), computerized scientific notation
// outside it, always with a fractional part
fn format_floating(x: f64, plain: String, scientific: String) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let magnitude = x.abs();
    if magnitude == 0.0 || (1e-3..1e7).contains(&magnitude) {
        return if plain.contains('.') { plain } else { format!("{}.0", plain) };
    }
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    if mantissa.contains('.') {
        format!("{}E{}", mantissa, exponent)
    } else {
        format!("{}.0E{}", mantissa, exponent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_division_by_zero_faults() {
        let r = arithmetic(ArithOp::Div, Primitive::Int, &Value::Int(5), &Value::Int(0));
        assert_eq!(r, Err(Fault::DivideByZero));
        let r = arithmetic(ArithOp::Rem, Primitive::Long, &Value::Long(5), &Value::Long(0));
        assert_eq!(r, Err(Fault::DivideByZero));
    }

    #[test]
    fn test_floating_division_by_zero_is_ieee() {
        let r = arithmetic(ArithOp::Div, Primitive::Double, &Value::Double(5.0), &Value::Double(0.0)).unwrap();
        assert_eq!(r, Value::Double(f64::INFINITY));
        let r = arithmetic(ArithOp::Div, Primitive::Float, &Value::Float(0.0), &Value::Float(0.0)).unwrap();
        assert!(matches!(r, Value::Float(x) if x.is_nan()));
    }

    #[test]
    fn test_overflow_wraps() {
        let r = arithmetic(ArithOp::Add, Primitive::Int, &Value::Int(i32::MAX), &Value::Int(1)).unwrap();
        assert_eq!(r, Value::Int(i32::MIN));
        let r = arithmetic(ArithOp::Div, Primitive::Int, &Value::Int(i32::MIN), &Value::Int(-1)).unwrap();
        assert_eq!(r, Value::Int(i32::MIN));
    }

    #[test]
    fn test_shift_distance_is_masked() {
        let r = arithmetic(ArithOp::Shl, Primitive::Int, &Value::Int(1), &Value::Int(33)).unwrap();
        assert_eq!(r, Value::Int(2));
        let r = arithmetic(ArithOp::UShr, Primitive::Int, &Value::Int(-1), &Value::Int(28)).unwrap();
        assert_eq!(r, Value::Int(15));
        let r = arithmetic(ArithOp::Shr, Primitive::Long, &Value::Long(-8), &Value::Int(1)).unwrap();
        assert_eq!(r, Value::Long(-4));
    }

    #[test]
    fn test_narrowing_casts() {
        assert_eq!(convert(&Value::Int(300), Primitive::Byte).unwrap(), Value::Byte(44));
        assert_eq!(convert(&Value::Double(1e20), Primitive::Int).unwrap(), Value::Int(i32::MAX));
        assert_eq!(convert(&Value::Double(f64::NAN), Primitive::Long).unwrap(), Value::Long(0));
        assert_eq!(convert(&Value::Int(-1), Primitive::Char).unwrap(), Value::Char(0xffff));
        assert_eq!(convert(&Value::Char(65), Primitive::Int).unwrap(), Value::Int(65));
        assert!(convert(&Value::Boolean(true), Primitive::Int).is_err());
    }

    #[test]
    fn test_nan_comparisons() {
        let nan = Value::Double(f64::NAN);
        assert!(!compare(CompareOp::Eq, Primitive::Double, &nan, &nan).unwrap());
        assert!(compare(CompareOp::Ne, Primitive::Double, &nan, &nan).unwrap());
        assert!(!compare(CompareOp::Lt, Primitive::Double, &nan, &Value::Double(1.0)).unwrap());
        assert!(compare(CompareOp::Lt, Primitive::Int, &Value::Char(1), &Value::Int(2)).unwrap());
    }

    #[test]
    fn test_step_narrows() {
        assert_eq!(step(&Value::Byte(127), 1).unwrap(), Value::Byte(-128));
        assert_eq!(step(&Value::Double(0.5), -1).unwrap(), Value::Double(-0.5));
    }

    #[test]
    fn test_string_conversion_of_floating_point() {
        assert_eq!(primitive_string(&Value::Double(1.0)).unwrap(), "1.0");
        assert_eq!(primitive_string(&Value::Double(0.1)).unwrap(), "0.1");
        assert_eq!(primitive_string(&Value::Double(1e10)).unwrap(), "1.0E10");
        assert_eq!(primitive_string(&Value::Double(1.5e-5)).unwrap(), "1.5E-5");
        assert_eq!(primitive_string(&Value::Double(f64::NEG_INFINITY)).unwrap(), "-Infinity");
        assert_eq!(primitive_string(&Value::Float(2.5)).unwrap(), "2.5");
        assert_eq!(primitive_string(&Value::Double(-0.0)).unwrap(), "-0.0");
    }
}
