use crate::{
    config::{ConnectionConfig, DatabaseKind},
    error::AdapterError,
    sql::{mysql::adapter::MySqlAdapter, postgres::adapter::PgAdapter},
};
use planner::driver::Driver;
use tracing::info;

/// A connected backend, chosen by the URL scheme.
#[derive(Clone)]
pub enum Adapter {
    Postgres(PgAdapter),
    MySql(MySqlAdapter),
}

impl Adapter {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, AdapterError> {
        info!(kind = %config.kind, "Connecting to database");
        let adapter = match config.kind {
            DatabaseKind::Postgres => Adapter::Postgres(PgAdapter::connect(&config.url).await?),
            DatabaseKind::MySql => Adapter::MySql(MySqlAdapter::connect(&config.url).await?),
        };
        Ok(adapter)
    }

    pub async fn from_url(url: &str) -> Result<Self, AdapterError> {
        Self::connect(&ConnectionConfig::from_url(url)?).await
    }

    pub fn as_driver(&self) -> &dyn Driver {
        match self {
            Adapter::Postgres(adapter) => adapter,
            Adapter::MySql(adapter) => adapter,
        }
    }
}
