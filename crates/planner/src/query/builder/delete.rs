//! Provides a fluent builder for constructing `Delete` ASTs.

use crate::query::ast::{
    common::TableRef,
    delete::Delete,
    expr::Expr,
};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct DeleteBuilder {
    table: TableRef,
    filters: Vec<Expr>,
}

impl DeleteBuilder {
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            filters: Vec::new(),
        }
    }

    pub fn where_eq(mut self, column: &str, value: Value) -> Self {
        self.filters.push(Expr::eq(Expr::column(column), Expr::Value(value)));
        self
    }

    pub fn build(self) -> Delete {
        Delete {
            table: self.table,
            where_clause: Expr::and_all(self.filters),
        }
    }
}
