//! Primary-key handling shared by the query tree, the formula engine and
//! the mutation compilers.

use crate::{core::value, records::row::Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{cmp::Ordering, fmt};
use thiserror::Error;

/// Separator between encoded key components. It cannot occur in the JSON
/// encoding of a component, so distinct tuples never collide.
pub const KEY_SEPARATOR: char = '\u{0}';

pub const DEFAULT_PK_FIELD: &str = "id";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PkError {
    #[error("Missing primary key field '{field}'.")]
    MissingKey { field: String },
}

/// The ordered list of fields forming a primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PkFields", into = "Vec<String>")]
pub struct PrimaryKey {
    fields: Vec<String>,
}

/// The shapes a primary key may be written in.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PkFields {
    /// `null`, read the same as an absent key.
    Unset,
    Single(String),
    Composite(Vec<String>),
}

impl From<PkFields> for PrimaryKey {
    fn from(entry: PkFields) -> Self {
        match entry {
            PkFields::Unset => PrimaryKey::default(),
            PkFields::Single(field) => PrimaryKey::single(field),
            PkFields::Composite(fields) => PrimaryKey::new(fields),
        }
    }
}

impl From<PrimaryKey> for Vec<String> {
    fn from(pk: PrimaryKey) -> Self {
        pk.fields
    }
}

impl Default for PrimaryKey {
    fn default() -> Self {
        PrimaryKey::single(DEFAULT_PK_FIELD)
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fields.join(", "))
    }
}

impl PrimaryKey {
    pub fn new(fields: Vec<String>) -> Self {
        PrimaryKey { fields }
    }

    pub fn single(field: impl Into<String>) -> Self {
        PrimaryKey {
            fields: vec![field.into()],
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn is_pk(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    /// True when every key field is present on the object. Null counts as present.
    pub fn has_pk(&self, obj: &Row) -> bool {
        self.fields.iter().all(|f| obj.contains_key(f))
    }

    /// True when every key field is present and non-null.
    pub fn is_complete(&self, obj: &Row) -> bool {
        self.fields
            .iter()
            .all(|f| obj.get(f).is_some_and(|v| !v.is_null()))
    }

    pub fn values<'a>(&self, obj: &'a Row) -> Result<Vec<&'a Value>, PkError> {
        self.fields
            .iter()
            .map(|field| {
                obj.get(field).ok_or_else(|| PkError::MissingKey {
                    field: field.clone(),
                })
            })
            .collect()
    }

    /// The key of an object: the bare value for single keys, an array for
    /// composite ones.
    pub fn value(&self, obj: &Row) -> Result<Value, PkError> {
        let mut values = self.values(obj)?;
        if values.len() == 1 {
            return Ok(values.remove(0).clone());
        }
        Ok(Value::Array(values.into_iter().cloned().collect()))
    }

    /// Canonical string form of the object's key, independent of the order
    /// of fields in the object.
    pub fn key(&self, obj: &Row) -> Result<String, PkError> {
        Ok(canonical_key(self.values(obj)?))
    }

    /// Compares two objects by their key values. Missing fields compare as null.
    pub fn compare(&self, a: &Row, b: &Row) -> Ordering {
        for field in &self.fields {
            let left = a.get(field).unwrap_or(&Value::Null);
            let right = b.get(field).unwrap_or(&Value::Null);
            let ord = value::compare_values(left, right);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Returns a comparator usable with `sort_by`.
    pub fn sorter(&self) -> impl Fn(&Row, &Row) -> Ordering + '_ {
        move |a, b| self.compare(a, b)
    }

    pub fn sort(&self, objs: &mut [Row]) {
        objs.sort_by(self.sorter());
    }
}

/// Joins the JSON encodings of the components with [`KEY_SEPARATOR`].
pub fn canonical_key<'a, I>(values: I) -> String
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut key = String::new();
    for (i, v) in values.into_iter().enumerate() {
        if i > 0 {
            key.push(KEY_SEPARATOR);
        }
        key.push_str(&value::encode_component(v));
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_default_pk_is_id() {
        assert_eq!(PrimaryKey::default().fields(), ["id"]);
    }

    #[test]
    fn test_deserializes_single_and_composite() {
        let single: PrimaryKey = serde_json::from_value(json!("code")).unwrap();
        assert_eq!(single.fields(), ["code"]);

        let composite: PrimaryKey = serde_json::from_value(json!(["a", "b"])).unwrap();
        assert_eq!(composite.fields(), ["a", "b"]);
        assert_eq!(composite.len(), 2);

        assert!(serde_json::from_value::<PrimaryKey>(json!(3)).is_err());
    }

    #[test]
    fn test_null_pk_defaults_to_id() {
        let pk: PrimaryKey = serde_json::from_value(Value::Null).unwrap();
        assert_eq!(pk, PrimaryKey::default());
    }

    #[test]
    fn test_value_is_scalar_for_single_keys() {
        let pk = PrimaryKey::default();
        let obj = row(json!({"id": 7, "name": "x"}));
        assert_eq!(pk.value(&obj).unwrap(), json!(7));

        let pk = PrimaryKey::new(vec!["id".into(), "name".into()]);
        assert_eq!(pk.value(&obj).unwrap(), json!([7, "x"]));
    }

    #[test]
    fn test_key_ignores_field_order() {
        let pk = PrimaryKey::new(vec!["a".into(), "b".into()]);
        let first = row(json!({"a": 1, "b": "x", "c": 0}));
        let second = row(json!({"c": 9, "b": "x", "a": 1}));
        assert_eq!(pk.key(&first).unwrap(), pk.key(&second).unwrap());
    }

    #[test]
    fn test_key_distinguishes_null_zero_and_empty() {
        let pk = PrimaryKey::default();
        let keys: Vec<String> = [json!(null), json!(0), json!(""), json!("0"), json!(false)]
            .into_iter()
            .map(|v| pk.key(&row(json!({ "id": v }))).unwrap())
            .collect();
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_composite_keys_do_not_collide_on_concatenation() {
        let pk = PrimaryKey::new(vec!["a".into(), "b".into()]);
        let first = pk.key(&row(json!({"a": "x,", "b": "y"}))).unwrap();
        let second = pk.key(&row(json!({"a": "x", "b": ",y"}))).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let pk = PrimaryKey::new(vec!["id".into(), "lang".into()]);
        let err = pk.key(&row(json!({"id": 1}))).unwrap_err();
        assert_eq!(
            err,
            PkError::MissingKey {
                field: "lang".into()
            }
        );
    }

    #[test]
    fn test_has_pk_accepts_null_but_is_complete_does_not() {
        let pk = PrimaryKey::default();
        let obj = row(json!({"id": null}));
        assert!(pk.has_pk(&obj));
        assert!(!pk.is_complete(&obj));
        assert!(!pk.has_pk(&row(json!({"name": "x"}))));
        assert!(pk.is_complete(&row(json!({"id": 0}))));
    }

    #[test]
    fn test_is_pk() {
        let pk = PrimaryKey::new(vec!["id".into(), "lang".into()]);
        assert!(pk.is_pk("lang"));
        assert!(!pk.is_pk("name"));
    }

    #[test]
    fn test_sort_by_composite_key() {
        let pk = PrimaryKey::new(vec!["a".into(), "b".into()]);
        let mut objs = vec![
            row(json!({"a": 2, "b": 1})),
            row(json!({"a": 1, "b": 2})),
            row(json!({"a": 1, "b": 1})),
            row(json!({"a": null, "b": 5})),
        ];
        pk.sort(&mut objs);
        let keys: Vec<Value> = objs.iter().map(|o| pk.value(o).unwrap()).collect();
        assert_eq!(
            keys,
            vec![json!([null, 5]), json!([1, 1]), json!([1, 2]), json!([2, 1])]
        );
    }

    #[test]
    fn test_serializes_as_field_list() {
        let pk = PrimaryKey::single("id");
        assert_eq!(serde_json::to_value(&pk).unwrap(), json!(["id"]));
    }
}
