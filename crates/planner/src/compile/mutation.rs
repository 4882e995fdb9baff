//! INSERT, UPDATE and DELETE statements for mutation nodes.
//!
//! Payload values are always bound as parameters. The node's field list is a
//! closed allow-list: any other key in a payload is rejected before SQL is
//! produced.

use crate::{
    compile::{check_column, check_table},
    driver::UpdateStatement,
    error::QueryError,
    query::{
        Statement,
        ast::{common::TableRef, expr::Expr},
        builder::{delete::DeleteBuilder, insert::InsertBuilder, update::UpdateBuilder},
        dialect::Dialect,
    },
    tree::{MutationKind, MutationNode},
};
use model::{
    catalog::Catalog,
    records::row::{Row, get_or_null},
};
use serde_json::Value;
use tracing::debug;

/// One multi-row INSERT for all objects.
pub fn compile_insert(
    node: &MutationNode,
    objs: &[Row],
    dialect: &dyn Dialect,
    catalog: &Catalog,
) -> Result<Statement, QueryError> {
    check_table(catalog, &node.table)?;
    for obj in objs {
        check_allowed(node, obj, MutationKind::Insert, false)?;
    }

    let columns: Vec<&str> = node
        .fields
        .iter()
        .filter(|field| objs.iter().any(|obj| obj.contains_key(field.as_str())))
        .map(String::as_str)
        .collect();
    if columns.is_empty() {
        return Err(QueryError::NothingToWrite(node.table.clone()));
    }
    for column in &columns {
        check_column(catalog, &node.table, column)?;
    }

    let mut builder = InsertBuilder::new(TableRef::new(&node.table))
        .columns(&columns)
        .returning(dialect.supports_returning());
    for obj in objs {
        let row = columns
            .iter()
            .map(|column| Expr::Value(get_or_null(obj, column).clone()))
            .collect();
        builder = builder.values(row);
    }

    let statement = Statement::render(&builder.build(), dialect);
    debug!(sql = %statement.sql, rows = objs.len(), "Compiled insert");
    Ok(statement)
}

/// A single-row UPDATE keyed by the node's primary key.
pub fn compile_update(
    node: &MutationNode,
    obj: &Row,
    dialect: &dyn Dialect,
    catalog: &Catalog,
) -> Result<UpdateStatement, QueryError> {
    check_table(catalog, &node.table)?;
    check_allowed(node, obj, MutationKind::Update, true)?;
    if !node.pk.is_complete(obj) {
        return Err(QueryError::MissingPrimaryKey {
            table: node.table.clone(),
            pk: node.pk.to_string(),
        });
    }

    let mut builder = UpdateBuilder::new(TableRef::new(&node.table));
    let mut assigned = 0;
    for field in &node.fields {
        if node.pk.is_pk(field) {
            continue;
        }
        if let Some(value) = obj.get(field) {
            check_column(catalog, &node.table, field)?;
            builder = builder.set(field, value.clone());
            assigned += 1;
        }
    }
    if assigned == 0 {
        return Err(QueryError::NothingToWrite(node.table.clone()));
    }

    let mut key = Vec::with_capacity(node.pk.len());
    for field in node.pk.fields() {
        check_column(catalog, &node.table, field)?;
        let value = get_or_null(obj, field).clone();
        builder = builder.where_eq(field, value.clone());
        key.push((field.clone(), value));
    }

    let statement = Statement::render(&builder.returning(dialect.supports_returning()).build(), dialect);
    debug!(sql = %statement.sql, "Compiled update");
    Ok(UpdateStatement {
        statement,
        table: node.table.clone(),
        key,
    })
}

/// A DELETE matching every key given in the object.
pub fn compile_delete(
    node: &MutationNode,
    obj: &Row,
    dialect: &dyn Dialect,
    catalog: &Catalog,
) -> Result<Statement, QueryError> {
    check_table(catalog, &node.table)?;
    if obj.is_empty() {
        return Err(QueryError::EmptyDeletion(node.table.clone()));
    }

    let mut builder = DeleteBuilder::new(TableRef::new(&node.table));
    for (field, value) in obj {
        if !node.allows(field) {
            return Err(QueryError::KeyNotAllowed(field.clone()));
        }
        if value.is_null() {
            return Err(QueryError::NullDeletionKey(field.clone()));
        }
        check_column(catalog, &node.table, field)?;
        builder = builder.where_eq(field, value.clone());
    }

    let statement = Statement::render(&builder.build(), dialect);
    debug!(sql = %statement.sql, "Compiled delete");
    Ok(statement)
}

fn check_allowed(
    node: &MutationNode,
    obj: &Row,
    kind: MutationKind,
    allow_pk: bool,
) -> Result<(), QueryError> {
    for field in obj.keys() {
        if node.allows(field) || (allow_pk && node.pk.is_pk(field)) {
            continue;
        }
        return Err(QueryError::FieldNotAllowed {
            field: field.clone(),
            operation: kind.operation(),
            table: node.table.clone(),
        });
    }
    Ok(())
}

/// Splits a payload that may be one object or a list of objects.
pub fn payload_objects(payload: &Value) -> Result<Vec<Row>, QueryError> {
    match payload {
        Value::Object(obj) => Ok(vec![obj.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(obj) => Ok(obj.clone()),
                other => Err(QueryError::Parse(format!("expected an object, got {other}"))),
            })
            .collect(),
        other => Err(QueryError::Parse(format!("expected an object, got {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::dialect::{MySql, Postgres};
    use model::core::pk::PrimaryKey;
    use serde_json::json;

    fn catalog() -> Catalog {
        Catalog::new()
            .with_table("users", ["id", "name", "age"])
            .with_table("translations", ["id", "lang", "text"])
    }

    fn node(fields: &[&str]) -> MutationNode {
        MutationNode {
            table: "users".into(),
            pk: PrimaryKey::default(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn objects(value: Value) -> Vec<Row> {
        payload_objects(&value).unwrap()
    }

    #[test]
    fn test_insert_batches_rows_in_allow_list_order() {
        let objs = objects(json!([{"age": 30, "name": "Alice"}, {"name": "Bob"}]));
        let statement =
            compile_insert(&node(&["name", "age"]), &objs, &Postgres, &catalog()).unwrap();
        assert_eq!(
            statement.sql,
            r#"INSERT INTO "users" ("name", "age") VALUES ($1, $2), ($3, $4) RETURNING *"#
        );
        assert_eq!(
            statement.params,
            vec![json!("Alice"), json!(30), json!("Bob"), Value::Null]
        );
    }

    #[test]
    fn test_insert_without_returning_on_mysql() {
        let objs = objects(json!({"name": "Carl"}));
        let statement = compile_insert(&node(&["name"]), &objs, &MySql, &catalog()).unwrap();
        assert_eq!(statement.sql, "INSERT INTO `users` (`name`) VALUES (?)");
    }

    #[test]
    fn test_insert_rejects_unlisted_field() {
        let objs = objects(json!({"name": "Carl", "age": 3}));
        let err = compile_insert(&node(&["name"]), &objs, &MySql, &catalog()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "A field 'age' is not defined in insertion query for 'users'."
        );
    }

    #[test]
    fn test_insert_checks_columns() {
        let objs = objects(json!({"nickname": "C"}));
        let err = compile_insert(&node(&["nickname"]), &objs, &MySql, &catalog()).unwrap_err();
        assert!(matches!(err, QueryError::UnknownColumn { column, .. } if column == "nickname"));
    }

    #[test]
    fn test_update_sets_present_fields_and_keys_on_pk() {
        let obj = objects(json!({"id": 3, "age": 40, "name": "Carl"})).remove(0);
        let update =
            compile_update(&node(&["name", "age"]), &obj, &Postgres, &catalog()).unwrap();
        assert_eq!(
            update.statement.sql,
            r#"UPDATE "users" SET "name" = $1, "age" = $2 WHERE ("id" = $3) RETURNING *"#
        );
        assert_eq!(update.key, vec![("id".to_string(), json!(3))]);
        assert_eq!(update.table, "users");
    }

    #[test]
    fn test_update_with_composite_key() {
        let node = MutationNode {
            table: "translations".into(),
            pk: PrimaryKey::new(vec!["id".into(), "lang".into()]),
            fields: vec!["text".into()],
        };
        let obj = objects(json!({"id": 1, "lang": "en", "text": "hi"})).remove(0);
        let update = compile_update(&node, &obj, &MySql, &catalog()).unwrap();
        assert_eq!(
            update.statement.sql,
            "UPDATE `translations` SET `text` = ? WHERE ((`id` = ?) AND (`lang` = ?))"
        );
        assert_eq!(update.statement.params, vec![json!("hi"), json!(1), json!("en")]);
    }

    #[test]
    fn test_update_checks_fields_before_pk() {
        let obj = objects(json!({"nickname": "x"})).remove(0);
        let err = compile_update(&node(&["name"]), &obj, &MySql, &catalog()).unwrap_err();
        assert!(matches!(err, QueryError::FieldNotAllowed { operation: "update", .. }));

        let obj = objects(json!({"name": "x"})).remove(0);
        let err = compile_update(&node(&["name"]), &obj, &MySql, &catalog()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "There is no pk (id) in an object given for update of 'users'."
        );
    }

    #[test]
    fn test_update_rejects_null_key() {
        let obj = objects(json!({"id": null, "name": "X"})).remove(0);
        let err = compile_update(&node(&["name"]), &obj, &MySql, &catalog()).unwrap_err();
        assert!(matches!(err, QueryError::MissingPrimaryKey { .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn test_update_with_only_keys_has_nothing_to_write() {
        let obj = objects(json!({"id": 1})).remove(0);
        let err = compile_update(&node(&["name"]), &obj, &MySql, &catalog()).unwrap_err();
        assert!(matches!(err, QueryError::NothingToWrite(_)));
    }

    #[test]
    fn test_delete_by_given_keys() {
        let obj = objects(json!({"id": 7})).remove(0);
        let statement = compile_delete(&node(&["id"]), &obj, &Postgres, &catalog()).unwrap();
        assert_eq!(statement.sql, r#"DELETE FROM "users" WHERE ("id" = $1)"#);
        assert_eq!(statement.params, vec![json!(7)]);
    }

    #[test]
    fn test_delete_rejections() {
        let obj = objects(json!({"name": "x"})).remove(0);
        let err = compile_delete(&node(&["id"]), &obj, &MySql, &catalog()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "A key 'name' is not allowed as specifying the deletion."
        );

        let err = compile_delete(&node(&["id"]), &Row::new(), &MySql, &catalog()).unwrap_err();
        assert!(matches!(err, QueryError::EmptyDeletion(_)));
    }

    #[test]
    fn test_delete_rejects_null_key() {
        let obj = objects(json!({"id": null})).remove(0);
        let err = compile_delete(&node(&["id"]), &obj, &MySql, &catalog()).unwrap_err();
        assert_eq!(err.to_string(), "A key 'id' given for deletion is null.");
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn test_payload_must_hold_objects() {
        assert!(payload_objects(&json!([1, 2])).is_err());
        assert_eq!(payload_objects(&json!([{}, {}])).unwrap().len(), 2);
    }
}
