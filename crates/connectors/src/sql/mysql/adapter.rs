use crate::sql::{
    base::{
        error::{ConnectorError, DbError},
        row::DbRow,
    },
    mysql::params::MySqlParamStore,
};
use async_trait::async_trait;
use model::{catalog::Catalog, records::row::Row};
use mysql_async::{Opts, Pool, prelude::Queryable};
use planner::{
    driver::{Driver, InsertResult, UpdateStatement},
    error::BackendError,
    query::{
        Statement,
        ast::{common::TableRef, expr::Expr},
        builder::select::SelectBuilder,
        dialect::{self, Dialect},
    },
};
use tracing::{debug, info};

const QUERY_CATALOG_SQL: &str = include_str!("sql/catalog.sql");

#[derive(Clone)]
pub struct MySqlAdapter {
    pool: Pool,
    dialect: dialect::MySql,
    catalog: Catalog,
}

impl MySqlAdapter {
    pub async fn connect(url: &str) -> Result<Self, ConnectorError> {
        let opts = Opts::from_url(url).map_err(|e| ConnectorError::InvalidUrl(e.to_string()))?;
        let pool = Pool::new(opts);

        let mut conn = pool.get_conn().await?;
        let pairs: Vec<(String, String)> = conn.query(QUERY_CATALOG_SQL).await?;
        let catalog = Catalog::from_columns(pairs);
        info!(tables = catalog.tables().count(), "Loaded MySQL catalog");

        Ok(MySqlAdapter {
            pool,
            dialect: dialect::MySql,
            catalog,
        })
    }

    async fn query_rows(&self, statement: &Statement) -> Result<Vec<Row>, DbError> {
        debug!(sql = %statement.sql, params = statement.params.len(), "MySQL query");
        let params = MySqlParamStore::from_values(&statement.params).params();
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<mysql_async::Row> = conn.exec(statement.sql.as_str(), params).await?;
        rows.iter()
            .map(|row| DbRow::MySqlRow(row).to_json_row())
            .collect()
    }

    async fn execute(&self, statement: &Statement) -> Result<u64, DbError> {
        debug!(sql = %statement.sql, params = statement.params.len(), "MySQL execute");
        let params = MySqlParamStore::from_values(&statement.params).params();
        let mut conn = self.pool.get_conn().await?;
        conn.exec_drop(statement.sql.as_str(), params).await?;
        Ok(conn.affected_rows())
    }

    /// MySQL has no `RETURNING`, so an updated row is read back by its key.
    fn reselect(&self, update: &UpdateStatement) -> Statement {
        let mut builder = SelectBuilder::new()
            .select(vec![Expr::Wildcard])
            .from(TableRef::new(&update.table), None);
        for (column, value) in &update.key {
            let condition = Expr::eq(Expr::column(column), Expr::Value(value.clone()));
            builder = builder.where_clause(condition);
        }
        Statement::render(&builder.build(), &self.dialect)
    }
}

#[async_trait]
impl Driver for MySqlAdapter {
    fn dialect(&self) -> &dyn Dialect {
        &self.dialect
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    async fn run_select(&self, statement: &Statement) -> Result<Vec<Row>, BackendError> {
        Ok(self.query_rows(statement).await?)
    }

    async fn run_insert(&self, statement: &Statement) -> Result<InsertResult, BackendError> {
        self.execute(statement).await?;
        Ok(InsertResult::Done)
    }

    async fn run_update(&self, update: &UpdateStatement) -> Result<Vec<Row>, BackendError> {
        self.execute(&update.statement).await?;
        Ok(self.query_rows(&self.reselect(update)).await?)
    }

    async fn run_delete(&self, statement: &Statement) -> Result<u64, BackendError> {
        Ok(self.execute(statement).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_reselect_by_composite_key() {
        // Pool::new does not connect until a connection is requested.
        let adapter = MySqlAdapter {
            pool: Pool::new(Opts::from_url("mysql://root@localhost/app").unwrap()),
            dialect: dialect::MySql,
            catalog: Catalog::new(),
        };
        let update = UpdateStatement {
            statement: Statement {
                sql: String::new(),
                params: Vec::new(),
            },
            table: "translations".to_string(),
            key: vec![("key".to_string(), json!("hi")), ("lang".to_string(), json!("en"))],
        };

        let statement = adapter.reselect(&update);

        assert_eq!(
            statement.sql,
            "SELECT * FROM `translations` WHERE ((`key` = ?)) AND ((`lang` = ?))"
        );
        assert_eq!(statement.params, vec![json!("hi"), json!("en")]);
    }
}
