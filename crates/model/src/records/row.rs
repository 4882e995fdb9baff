use serde_json::{Map, Value};

/// A single result row or mutation payload, keyed by column name.
pub type Row = Map<String, Value>;

static NULL: Value = Value::Null;

/// Reads a column, treating an absent column as NULL.
pub fn get_or_null<'a>(row: &'a Row, column: &str) -> &'a Value {
    row.get(column).unwrap_or(&NULL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_column_reads_as_null() {
        let row: Row = serde_json::from_value(json!({"id": 1})).unwrap();
        assert_eq!(get_or_null(&row, "id"), &json!(1));
        assert_eq!(get_or_null(&row, "name"), &Value::Null);
    }
}
