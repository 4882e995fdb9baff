//! The `Query`: a parsed description plus everything derived from it.

use crate::{
    compile::{
        compile_delete, compile_insert, compile_select, compile_update,
        mutation::payload_objects,
    },
    driver::{Driver, InsertResult, UpdateStatement},
    error::QueryError,
    formula::Formula,
    query::{Statement, dialect::Dialect},
    scope::{filter_target, vars},
    tree::{MutationKind, MutationNode, QueryTree, parse::parse},
};
use futures::future::try_join_all;
use model::{
    catalog::Catalog,
    core::pk::canonical_key,
    records::row::{Row, get_or_null},
};
use serde_json::Value;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{OnceLock, RwLock},
};
use tracing::debug;

pub struct Query {
    tree: QueryTree,
    fingerprint: String,
    /// Compiled SELECTs keyed by dialect name.
    sql_cache: RwLock<HashMap<String, Statement>>,
    formula: OnceLock<Formula>,
}

impl Clone for Query {
    /// Copies the tree; caches start empty.
    fn clone(&self) -> Self {
        Query::from_tree(self.tree.clone(), self.fingerprint.clone())
    }
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("fingerprint", &self.fingerprint)
            .field("nodes", &self.tree.len())
            .finish()
    }
}

impl Query {
    pub fn parse(description: &Value) -> Result<Query, QueryError> {
        let tree = parse(description)?;
        let fingerprint = format!("{:x}", md5::compute(description.to_string()));
        debug!(%fingerprint, "Parsed query\n{}", tree.dump());
        Ok(Query::from_tree(tree, fingerprint))
    }

    pub fn from_json(text: &str) -> Result<Query, QueryError> {
        let description: Value = serde_json::from_str(text)?;
        Query::parse(&description)
    }

    fn from_tree(tree: QueryTree, fingerprint: String) -> Query {
        Query {
            tree,
            fingerprint,
            sql_cache: RwLock::new(HashMap::new()),
            formula: OnceLock::new(),
        }
    }

    /// A new query over a modified copy of this one's tree.
    fn derive(&self, variant: &str, change: impl FnOnce(&mut QueryTree)) -> Query {
        let mut tree = self.tree.clone();
        change(&mut tree);
        let fingerprint = format!(
            "{:x}",
            md5::compute(format!("{}|{}", self.fingerprint, variant))
        );
        Query::from_tree(tree, fingerprint)
    }

    pub fn tree(&self) -> &QueryTree {
        &self.tree
    }

    /// Digest of the description, distinct for every derived variant.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn formula(&self) -> Result<&Formula, QueryError> {
        if let Some(formula) = self.formula.get() {
            return Ok(formula);
        }
        let formula = Formula::from_tree(&self.tree)?;
        Ok(self.formula.get_or_init(|| formula))
    }

    pub fn select_sql(&self, driver: &dyn Driver) -> Result<Statement, QueryError> {
        self.select_sql_with(driver.dialect(), driver.catalog())
    }

    pub fn select_sql_with(
        &self,
        dialect: &dyn Dialect,
        catalog: &Catalog,
    ) -> Result<Statement, QueryError> {
        let name = dialect.name();
        if let Ok(cache) = self.sql_cache.read() {
            if let Some(statement) = cache.get(&name) {
                return Ok(statement.clone());
            }
        }
        let statement = compile_select(&self.tree, dialect, catalog)?;
        if let Ok(mut cache) = self.sql_cache.write() {
            cache.insert(name, statement.clone());
        }
        Ok(statement)
    }

    /// Runs the SELECT and rebuilds nested objects from its rows.
    pub async fn select(&self, driver: &dyn Driver) -> Result<Vec<Value>, QueryError> {
        let statement = self.select_sql(driver)?;
        let formula = self.formula()?;
        let rows = driver
            .run_select(&statement)
            .await
            .map_err(QueryError::Backend)?;
        debug!(rows = rows.len(), "Materializing rows");
        Ok(formula.process(&rows)?)
    }

    /// A copy of this query with an extra condition, attached to the
    /// earliest table in the join chain that can see all of its variables.
    pub fn with_filter(&self, condition: &str) -> Result<Query, QueryError> {
        if self.tree.chain().is_empty() {
            return Err(QueryError::WrongQueryKind {
                expected: "a select",
            });
        }
        let target = filter_target(&self.tree, &vars(condition))?;
        Ok(self.derive(&format!("where:{condition}"), |tree| {
            tree.add_where(target, condition);
        }))
    }

    /// A copy of this query projecting only the primary keys of every table.
    pub fn select_pks(&self) -> Query {
        self.derive("pks", QueryTree::project_primary_keys)
    }

    /// Distinct primary keys of every table the query touches, in the order
    /// first seen. Composite keys are arrays. NULL keys are kept.
    pub async fn all_pks(
        &self,
        driver: &dyn Driver,
    ) -> Result<BTreeMap<String, Vec<Value>>, QueryError> {
        let query = self.select_pks();
        let statement = query.select_sql(driver)?;
        let rows = driver
            .run_select(&statement)
            .await
            .map_err(QueryError::Backend)?;
        Ok(query.collect_pks(&rows))
    }

    fn collect_pks(&self, rows: &[Row]) -> BTreeMap<String, Vec<Value>> {
        let tree = &self.tree;
        let mut result: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        let mut seen: HashMap<String, HashSet<String>> = HashMap::new();

        for id in tree.chain() {
            let Some(select) = tree.select(id) else {
                continue;
            };
            let columns: Vec<String> = tree
                .key_markers(id)
                .into_iter()
                .map(|marker| tree.row_key(marker))
                .collect();
            if columns.is_empty() {
                continue;
            }
            let values = result.entry(select.table.clone()).or_default();
            let keys = seen.entry(select.table.clone()).or_default();
            for row in rows {
                let parts: Vec<&Value> = columns.iter().map(|c| get_or_null(row, c)).collect();
                if !keys.insert(canonical_key(parts.iter().copied())) {
                    continue;
                }
                values.push(match parts.as_slice() {
                    [single] => (*single).clone(),
                    parts => Value::Array(parts.iter().map(|v| (*v).clone()).collect()),
                });
            }
        }
        result
    }

    fn mutation_node(&self, expected: MutationKind) -> Result<&MutationNode, QueryError> {
        match self.tree.mutation() {
            Some((kind, node)) if kind == expected => Ok(node),
            _ => Err(QueryError::WrongQueryKind {
                expected: expected.article(),
            }),
        }
    }

    pub fn create_sql(
        &self,
        payload: &Value,
        dialect: &dyn Dialect,
        catalog: &Catalog,
    ) -> Result<Statement, QueryError> {
        let node = self.mutation_node(MutationKind::Insert)?;
        compile_insert(node, &payload_objects(payload)?, dialect, catalog)
    }

    /// Inserts one object or a list of objects with a single statement.
    pub async fn create(
        &self,
        driver: &dyn Driver,
        payload: &Value,
    ) -> Result<InsertResult, QueryError> {
        let statement = self.create_sql(payload, driver.dialect(), driver.catalog())?;
        debug!(sql = %statement.sql, params = ?statement.params, "Running insert");
        driver
            .run_insert(&statement)
            .await
            .map_err(QueryError::Backend)
    }

    pub fn update_sql(
        &self,
        payload: &Value,
        dialect: &dyn Dialect,
        catalog: &Catalog,
    ) -> Result<Vec<UpdateStatement>, QueryError> {
        let node = self.mutation_node(MutationKind::Update)?;
        payload_objects(payload)?
            .iter()
            .map(|obj| compile_update(node, obj, dialect, catalog))
            .collect()
    }

    /// Updates every object by its primary key. The returned rows are
    /// grouped per object, in payload order.
    pub async fn update(
        &self,
        driver: &dyn Driver,
        payload: &Value,
    ) -> Result<Vec<Vec<Row>>, QueryError> {
        let statements = self.update_sql(payload, driver.dialect(), driver.catalog())?;
        debug!(statements = statements.len(), "Running updates");
        try_join_all(statements.iter().map(|update| driver.run_update(update)))
            .await
            .map_err(QueryError::Backend)
    }

    pub fn delete_sql(
        &self,
        payload: &Value,
        dialect: &dyn Dialect,
        catalog: &Catalog,
    ) -> Result<Vec<Statement>, QueryError> {
        let node = self.mutation_node(MutationKind::Delete)?;
        payload_objects(payload)?
            .iter()
            .map(|obj| compile_delete(node, obj, dialect, catalog))
            .collect()
    }

    /// Deletes by each object's keys and returns the total of affected rows.
    pub async fn delete(&self, driver: &dyn Driver, payload: &Value) -> Result<u64, QueryError> {
        let statements = self.delete_sql(payload, driver.dialect(), driver.catalog())?;
        debug!(statements = statements.len(), "Running deletes");
        let counts = try_join_all(statements.iter().map(|statement| driver.run_delete(statement)))
            .await
            .map_err(QueryError::Backend)?;
        Ok(counts.into_iter().sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::dialect::{MySql, Postgres};
    use serde_json::json;

    fn catalog() -> Catalog {
        Catalog::new()
            .with_table("users", ["id", "name", "age"])
            .with_table("tools", ["id", "name", "ownerId"])
    }

    fn users_with_tools() -> Query {
        Query::parse(&json!({
            "table": "users", "select": ["id", "name", "age"],
            "members": [{"table": "tools", "select": ["id", "name"], "join": ["users.id", "tools.ownerId"]}]
        }))
        .unwrap()
    }

    #[test]
    fn test_sql_is_cached_per_dialect() {
        let query = Query::parse(&json!({"table": "users", "select": "name"})).unwrap();
        let mysql = query.select_sql_with(&MySql, &catalog()).unwrap();
        let again = query.select_sql_with(&MySql, &Catalog::new()).unwrap();
        assert_eq!(mysql, again);
        let pg = query.select_sql_with(&Postgres, &catalog()).unwrap();
        assert_ne!(mysql.sql, pg.sql);
    }

    #[test]
    fn test_with_filter_leaves_original_untouched() {
        let query = users_with_tools();
        let filtered = query
            .with_filter("users.age > 2 and users.tools.name = 'axe'")
            .unwrap();
        let sql = filtered.select_sql_with(&MySql, &catalog()).unwrap().sql;
        assert!(sql.ends_with(" WHERE (`users1`.`age` > 2 and `tools5`.`name` = 'axe')"));
        let original = query.select_sql_with(&MySql, &catalog()).unwrap().sql;
        assert!(!original.contains("WHERE"));
        assert_ne!(query.fingerprint(), filtered.fingerprint());
    }

    #[test]
    fn test_with_filter_on_unknown_variable() {
        let err = users_with_tools().with_filter("users.height > 1").unwrap_err();
        assert!(matches!(err, QueryError::UnresolvedVariables(_)));
    }

    #[test]
    fn test_select_pks_projects_markers_only() {
        let pks = users_with_tools().select_pks();
        let sql = pks.select_sql_with(&MySql, &catalog()).unwrap().sql;
        assert!(sql.starts_with(
            "SELECT `users1`.`id` AS `PK[users1[0]]`, `tools5`.`id` AS `PK[tools5[0]]` FROM"
        ));
    }

    #[test]
    fn test_collect_pks_dedups_in_first_seen_order() {
        let pks = users_with_tools().select_pks();
        let rows: Vec<Row> = [
            json!({"PK[users1[0]]": 2, "PK[tools5[0]]": 7}),
            json!({"PK[users1[0]]": 1, "PK[tools5[0]]": 7}),
            json!({"PK[users1[0]]": 2, "PK[tools5[0]]": null}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect();
        let result = pks.collect_pks(&rows);
        assert_eq!(result["users"], vec![json!(2), json!(1)]);
        assert_eq!(result["tools"], vec![json!(7), Value::Null]);
    }

    #[test]
    fn test_wrong_query_kind() {
        let query = Query::parse(&json!({"table": "users", "select": "id"})).unwrap();
        let err = query
            .create_sql(&json!({"name": "x"}), &MySql, &catalog())
            .unwrap_err();
        assert_eq!(err.to_string(), "Query is not an insert query.");

        let insert = Query::parse(&json!({"table": "users", "insert": "name"})).unwrap();
        assert!(insert.with_filter("id > 1").is_err());
        assert!(insert.formula().is_err());
    }

    #[test]
    fn test_mutations_only_run_as_their_own_kind() {
        let delete = Query::parse(&json!({"table": "users", "delete": ["id"]})).unwrap();
        assert_eq!(delete.tree().mutation().map(|(kind, _)| kind), Some(MutationKind::Delete));

        let err = delete
            .update_sql(&json!({"id": 1, "name": "x"}), &MySql, &catalog())
            .unwrap_err();
        assert_eq!(err.to_string(), "Query is not an update query.");

        let update = Query::parse(&json!({"table": "users", "update": ["name"]})).unwrap();
        let err = update.delete_sql(&json!({"id": 1}), &MySql, &catalog()).unwrap_err();
        assert_eq!(err.to_string(), "Query is not a delete query.");
    }

    #[test]
    fn test_from_json_reports_parse_errors() {
        let err = Query::from_json("{not json").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Parse);
        let err = Query::from_json("[]").unwrap_err();
        assert!(matches!(err, QueryError::EmptyList));
    }
}
