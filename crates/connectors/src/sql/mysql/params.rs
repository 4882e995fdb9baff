use mysql_async::{Params, Value as MySqlValue};
use serde_json::Value;

pub struct MySqlParam(MySqlValue);

impl MySqlParam {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => MySqlParam(MySqlValue::NULL),
            Value::Bool(b) => MySqlParam(MySqlValue::Int(i64::from(*b))),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    MySqlParam(MySqlValue::Int(i))
                } else if let Some(u) = n.as_u64() {
                    MySqlParam(MySqlValue::UInt(u))
                } else {
                    MySqlParam(MySqlValue::Double(n.as_f64().unwrap_or_default()))
                }
            }
            Value::String(s) => MySqlParam(MySqlValue::Bytes(s.clone().into_bytes())),
            Value::Array(_) | Value::Object(_) => {
                MySqlParam(MySqlValue::Bytes(value.to_string().into_bytes()))
            }
        }
    }
}

pub struct MySqlParamStore {
    pub params: Vec<MySqlParam>,
}

impl MySqlParamStore {
    pub fn from_values(values: &[Value]) -> Self {
        let params = values.iter().map(MySqlParam::from_value).collect();
        MySqlParamStore { params }
    }

    pub fn params(&self) -> Params {
        if self.params.is_empty() {
            return Params::Empty;
        }
        Params::Positional(self.params.iter().map(|p| p.0.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_values_map_to_mysql_values() {
        let store = MySqlParamStore::from_values(&[
            json!(null),
            json!(true),
            json!(-4),
            json!(u64::MAX),
            json!(2.5),
            json!("Alice"),
            json!({"a": 1}),
        ]);

        let Params::Positional(values) = store.params() else {
            panic!("expected positional params");
        };
        assert_eq!(
            values,
            vec![
                MySqlValue::NULL,
                MySqlValue::Int(1),
                MySqlValue::Int(-4),
                MySqlValue::UInt(u64::MAX),
                MySqlValue::Double(2.5),
                MySqlValue::Bytes(b"Alice".to_vec()),
                MySqlValue::Bytes(br#"{"a":1}"#.to_vec()),
            ]
        );
    }

    #[test]
    fn test_no_values_means_no_params() {
        assert!(matches!(MySqlParamStore::from_values(&[]).params(), Params::Empty));
    }
}
