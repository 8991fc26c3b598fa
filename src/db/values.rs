//! JSON value helpers shared by the storage implementations
//!
//! Rows travel through the crate as `serde_json` objects. These helpers give those values
//! the comparison and grouping semantics SQL would give them.

use std::cmp::Ordering;

use serde_json::Value;

use crate::graphql::filters::FilterOp;

// ============================================================================
// Comparison
// ============================================================================

/// Equality that treats `1` and `1.0` as the same number.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// SQL-like ordering. `None` when the values are not comparable (either side null or the
/// types differ).
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Ordering for sorting rows: nulls first, then by [`compare_values`].
pub fn sort_order(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}

/// Evaluate one filter operator against a column value.
pub fn matches(op: FilterOp, column: &Value, operand: &Value) -> bool {
    match op {
        FilterOp::IsNull => column.is_null() == operand.as_bool().unwrap_or(true),
        _ if column.is_null() => false,
        FilterOp::In => list(operand).iter().any(|v| values_equal(column, v)),
        FilterOp::NotIn => !list(operand).iter().any(|v| values_equal(column, v)),
        FilterOp::Eq => values_equal(column, operand),
        FilterOp::NotEq => !operand.is_null() && !values_equal(column, operand),
        FilterOp::Gt => compare_values(column, operand) == Some(Ordering::Greater),
        FilterOp::Gte => matches!(
            compare_values(column, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        FilterOp::Lt => compare_values(column, operand) == Some(Ordering::Less),
        FilterOp::Lte => matches!(
            compare_values(column, operand),
            Some(Ordering::Less | Ordering::Equal)
        ),
        FilterOp::Like => match (column.as_str(), operand.as_str()) {
            (Some(haystack), Some(needle)) => haystack.contains(needle),
            _ => false,
        },
        FilterOp::LikeNoCase => match (column.as_str(), operand.as_str()) {
            (Some(haystack), Some(needle)) => haystack
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => false,
        },
    }
}

fn list(value: &Value) -> &[Value] {
    match value {
        Value::Array(items) => items,
        other => std::slice::from_ref(other),
    }
}

// ============================================================================
// Grouping
// ============================================================================

/// Key used to match child rows to parent rows. Numbers are normalized so an integer
/// column joins against a float-typed one.
pub fn join_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Some(i.to_string()),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Some((f as i64).to_string())
            }
            _ => Some(n.to_string()),
        },
        Value::String(s) => Some(format!("s:{s}")),
        other => Some(other.to_string()),
    }
}
