//! The contract a database backend fulfils for the query engine.

use crate::{
    error::BackendError,
    query::{Statement, dialect::Dialect},
};
use async_trait::async_trait;
use model::{catalog::Catalog, records::row::Row};
use serde_json::Value;

/// What an INSERT produced.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertResult {
    /// The backend only reported success.
    Done,
    /// The inserted rows, for backends with `RETURNING`.
    Rows(Vec<Row>),
}

/// A single-row UPDATE together with the key that identifies the row, so
/// backends without `RETURNING` can read it back.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub statement: Statement,
    pub table: String,
    pub key: Vec<(String, Value)>,
}

#[async_trait]
pub trait Driver: Send + Sync {
    fn dialect(&self) -> &dyn Dialect;

    /// Tables and columns of the connected database, loaded once.
    fn catalog(&self) -> &Catalog;

    async fn run_select(&self, statement: &Statement) -> Result<Vec<Row>, BackendError>;

    async fn run_insert(&self, statement: &Statement) -> Result<InsertResult, BackendError>;

    /// Runs one UPDATE and returns the updated rows.
    async fn run_update(&self, update: &UpdateStatement) -> Result<Vec<Row>, BackendError>;

    /// Runs one DELETE and returns the number of affected rows.
    async fn run_delete(&self, statement: &Statement) -> Result<u64, BackendError>;
}
