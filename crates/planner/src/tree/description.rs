//! The declarative input format, as deserialized from JSON.

use crate::error::QueryError;
use model::core::pk::PrimaryKey;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Either a single value or a list of them.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

/// An entry of `select`: `"name"`, `"table.name"` or `{"name": "alias"}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FieldEntry {
    Name(String),
    Renamed(BTreeMap<String, String>),
}

/// The value of `join` / `leftJoin`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JoinEntry {
    /// `[["a.x", "b.y"], ...]`
    Pairs(Vec<Vec<String>>),
    /// `["a.x", "b.y"]`
    Pair(Vec<String>),
    /// `"a.x = b.y AND a.z = b.w"`
    Expression(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableDescription {
    pub table: String,
    #[serde(rename = "as")]
    pub alias: Option<String>,
    #[serde(default)]
    pub pk: PrimaryKey,
    pub select: Option<OneOrMany<FieldEntry>>,
    pub join: Option<JoinEntry>,
    #[serde(rename = "leftJoin")]
    pub left_join: Option<JoinEntry>,
    #[serde(default)]
    pub members: Vec<TableDescription>,
    #[serde(default)]
    pub collections: Vec<TableDescription>,
    #[serde(rename = "where")]
    pub conditions: Option<OneOrMany<String>>,
    #[serde(alias = "orderBy")]
    pub order: Option<OneOrMany<String>>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub process: BTreeMap<String, String>,
    pub insert: Option<OneOrMany<String>>,
    pub update: Option<OneOrMany<String>>,
    pub delete: Option<OneOrMany<String>>,
}

/// What a description asks for, decided by the keyword it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl TableDescription {
    pub fn kind(&self) -> Result<DescriptionKind, QueryError> {
        let present: Vec<DescriptionKind> = [
            (self.select.is_some(), DescriptionKind::Select),
            (self.insert.is_some(), DescriptionKind::Insert),
            (self.update.is_some(), DescriptionKind::Update),
            (self.delete.is_some(), DescriptionKind::Delete),
        ]
        .into_iter()
        .filter_map(|(present, kind)| present.then_some(kind))
        .collect();

        match present.as_slice() {
            [kind] => Ok(*kind),
            [] => Err(QueryError::Parse(format!(
                "no select, insert, update or delete given for '{}'",
                self.table
            ))),
            _ => Err(QueryError::Parse(format!(
                "more than one of select, insert, update and delete given for '{}'",
                self.table
            ))),
        }
    }
}

/// A parsed top-level description.
#[derive(Debug, Clone)]
pub enum Description {
    One(Box<TableDescription>),
    Many(Vec<TableDescription>),
}

impl Description {
    pub fn from_value(value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(QueryError::EmptyList);
                }
                let items = items
                    .iter()
                    .map(TableDescription::deserialize)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Description::Many(items))
            }
            Value::Object(_) => Ok(Description::One(Box::new(
                TableDescription::deserialize(value)?,
            ))),
            other => Err(QueryError::Parse(format!("unexpected description {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_entry_shapes() {
        let desc: TableDescription = serde_json::from_value(json!({
            "table": "users",
            "select": ["id", {"age": "years"}, "users.name"]
        }))
        .unwrap();
        let fields = desc.select.unwrap().into_vec();
        assert_eq!(fields.len(), 3);
        assert!(matches!(&fields[1], FieldEntry::Renamed(map) if map["age"] == "years"));
    }

    #[test]
    fn test_join_entry_shapes() {
        let pair: JoinEntry = serde_json::from_value(json!(["a.x", "b.y"])).unwrap();
        assert!(matches!(pair, JoinEntry::Pair(ref v) if v.len() == 2));

        let pairs: JoinEntry = serde_json::from_value(json!([["a.x", "b.y"]])).unwrap();
        assert!(matches!(pairs, JoinEntry::Pairs(ref v) if v.len() == 1));

        let expr: JoinEntry = serde_json::from_value(json!("a.x = b.y")).unwrap();
        assert!(matches!(expr, JoinEntry::Expression(_)));
    }

    #[test]
    fn test_null_pk_reads_as_absent() {
        let desc: TableDescription = serde_json::from_value(json!({
            "table": "users", "select": "name", "pk": null
        }))
        .unwrap();
        assert_eq!(desc.pk.fields(), ["id"]);
    }

    #[test]
    fn test_order_by_is_a_synonym() {
        let desc: TableDescription = serde_json::from_value(json!({
            "table": "users", "select": "id", "orderBy": "-id"
        }))
        .unwrap();
        assert!(desc.order.is_some());
    }

    #[test]
    fn test_kind_dispatch() {
        let desc: TableDescription =
            serde_json::from_value(json!({"table": "users", "insert": ["name"]})).unwrap();
        assert_eq!(desc.kind().unwrap(), DescriptionKind::Insert);

        let desc: TableDescription = serde_json::from_value(json!({"table": "users"})).unwrap();
        assert!(desc.kind().is_err());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = Description::from_value(&json!({"table": "users", "selct": "id"})).unwrap_err();
        assert!(matches!(err, QueryError::Parse(_)));
    }

    #[test]
    fn test_empty_list_is_rejected() {
        assert!(matches!(
            Description::from_value(&json!([])),
            Err(QueryError::EmptyList)
        ));
    }
}
