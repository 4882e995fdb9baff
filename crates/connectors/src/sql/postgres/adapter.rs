use crate::sql::{
    base::{
        error::{ConnectorError, DbError},
        row::DbRow,
    },
    postgres::{params::PgParamStore, utils::connect_client},
};
use async_trait::async_trait;
use model::{catalog::Catalog, records::row::Row};
use planner::{
    driver::{Driver, InsertResult, UpdateStatement},
    error::BackendError,
    query::{
        Statement,
        dialect::{self, Dialect},
    },
};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_postgres::Client;
use tracing::{debug, info};

const QUERY_CATALOG_SQL: &str = include_str!("sql/catalog.sql");

#[derive(Clone)]
pub struct PgAdapter {
    client: Arc<RwLock<Client>>,
    dialect: dialect::Postgres,
    catalog: Catalog,
}

impl PgAdapter {
    pub async fn connect(url: &str) -> Result<Self, ConnectorError> {
        let client = connect_client(url).await?;
        let catalog = load_catalog(&client).await?;
        info!(tables = catalog.tables().count(), "Loaded Postgres catalog");

        Ok(PgAdapter {
            client: Arc::new(RwLock::new(client)),
            dialect: dialect::Postgres,
            catalog,
        })
    }

    async fn query_rows(&self, statement: &Statement) -> Result<Vec<Row>, DbError> {
        debug!(sql = %statement.sql, params = statement.params.len(), "Postgres query");
        let bindings = PgParamStore::from_values(&statement.params);
        let client = self.client.read().await;
        let rows = client.query(&statement.sql, &bindings.as_refs()).await?;
        rows.iter()
            .map(|row| DbRow::PostgresRow(row).to_json_row())
            .collect()
    }

    async fn execute(&self, statement: &Statement) -> Result<u64, DbError> {
        debug!(sql = %statement.sql, params = statement.params.len(), "Postgres execute");
        let bindings = PgParamStore::from_values(&statement.params);
        let client = self.client.read().await;
        Ok(client.execute(&statement.sql, &bindings.as_refs()).await?)
    }
}

async fn load_catalog(client: &Client) -> Result<Catalog, DbError> {
    let rows = client.query(QUERY_CATALOG_SQL, &[]).await?;
    let mut pairs = Vec::with_capacity(rows.len());
    for row in &rows {
        pairs.push((row.try_get::<_, String>(0)?, row.try_get::<_, String>(1)?));
    }
    Ok(Catalog::from_columns(pairs))
}

#[async_trait]
impl Driver for PgAdapter {
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
        // inserts are compiled with RETURNING *
        Ok(InsertResult::Rows(self.query_rows(statement).await?))
    }

    async fn run_update(&self, update: &UpdateStatement) -> Result<Vec<Row>, BackendError> {
        Ok(self.query_rows(&update.statement).await?)
    }

    async fn run_delete(&self, statement: &Statement) -> Result<u64, BackendError> {
        Ok(self.execute(statement).await?)
    }
}
