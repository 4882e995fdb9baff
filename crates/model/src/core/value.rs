//! Ordering and encoding helpers over loosely typed JSON values.

use serde_json::Value;
use std::cmp::Ordering;

/// Rank used to order values of different JSON types.
/// `null < bool < number < string < array < object`
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// A total ordering over JSON values.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y.iter()) {
                let ord = compare_values(left, right);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            // serde_json maps iterate in key order
            for ((lk, lv), (rk, rv)) in x.iter().zip(y.iter()) {
                let ord = lk.cmp(rk).then_with(|| compare_values(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Encodes one value the way it appears inside a canonical key.
///
/// Strings keep their quotes, so `"0"` and `0` encode differently.
pub fn encode_component(value: &Value) -> String {
    // Display on serde_json::Value emits compact JSON and cannot fail.
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_orders_across_types() {
        let mut values = vec![
            json!({"a": 1}),
            json!("b"),
            json!([1]),
            json!(2),
            json!(true),
            json!(null),
        ];
        values.sort_by(compare_values);
        assert_eq!(
            values,
            vec![
                json!(null),
                json!(true),
                json!(2),
                json!("b"),
                json!([1]),
                json!({"a": 1})
            ]
        );
    }

    #[test]
    fn test_orders_numbers_numerically() {
        assert_eq!(compare_values(&json!(9), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!(1.5), &json!(1)), Ordering::Greater);
        assert_eq!(compare_values(&json!(-3), &json!(-3)), Ordering::Equal);
    }

    #[test]
    fn test_orders_arrays_lexicographically() {
        assert_eq!(
            compare_values(&json!([1, "a"]), &json!([1, "b"])),
            Ordering::Less
        );
        assert_eq!(compare_values(&json!([1]), &json!([1, 0])), Ordering::Less);
    }

    #[test]
    fn test_encode_component_keeps_types_apart() {
        assert_eq!(encode_component(&json!(null)), "null");
        assert_eq!(encode_component(&json!(0)), "0");
        assert_eq!(encode_component(&json!("")), "\"\"");
        assert_eq!(encode_component(&json!("0")), "\"0\"");
    }
}
