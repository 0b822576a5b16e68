//! Structural equality over JSON values.
//!
//! Numbers compare by numeric value (`3 == 3.0`) and booleans count as 1 and
//! 0 against numbers (`True == 1`), the way Python's `==` treats them. Floats
//! are compared exactly. Python values JSON would blur, such as tuples or dicts
//! with non-string keys, never reach this point: the harness reports them as
//! unserializable.

use serde_json::{Number, Value};

/// Deep value equality between a returned value and the expected one
pub fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => numbers_equal(a, b),
        (Value::Bool(flag), Value::Number(n)) | (Value::Number(n), Value::Bool(flag)) => {
            numbers_equal(&Number::from(u8::from(*flag)), n)
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a
                    .iter()
                    .all(|(key, x)| b.get(key).is_some_and(|y| values_equal(x, y)))
        }
        _ => actual == expected,
    }
}

fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}
