//! Turns a parsed [`QueryTree`](crate::tree::QueryTree) into SQL statements,
//! validating table and column names against a [`Catalog`] on the way.

use crate::error::QueryError;
use model::catalog::Catalog;

pub mod mutation;
pub mod select;

pub use mutation::{compile_delete, compile_insert, compile_update};
pub use select::compile_select;

pub(crate) fn check_table(catalog: &Catalog, table: &str) -> Result<(), QueryError> {
    if catalog.has_table(table) {
        Ok(())
    } else {
        Err(QueryError::UnknownTable(table.to_string()))
    }
}

pub(crate) fn check_column(catalog: &Catalog, table: &str, column: &str) -> Result<(), QueryError> {
    check_table(catalog, table)?;
    if catalog.has_column(table, column) {
        Ok(())
    } else {
        Err(QueryError::UnknownColumn {
            table: table.to_string(),
            column: column.to_string(),
        })
    }
}
