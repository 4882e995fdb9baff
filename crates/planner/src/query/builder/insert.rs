//! Provides a fluent builder for constructing `Insert` ASTs.

use crate::query::ast::{common::TableRef, expr::Expr, insert::Insert};

#[derive(Debug, Clone)]
pub struct InsertBuilder {
    ast: Insert,
}

impl InsertBuilder {
    pub fn new(table: TableRef) -> Self {
        Self {
            ast: Insert {
                table,
                columns: Vec::new(),
                values: Vec::new(),
                returning: false,
            },
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.ast.columns = columns.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Adds a row of values to the insert statement.
    /// This can be called multiple times for a batch insert.
    pub fn values(mut self, values: Vec<Expr>) -> Self {
        self.ast.values.push(values);
        self
    }

    pub fn returning(mut self, returning: bool) -> Self {
        self.ast.returning = returning;
        self
    }

    pub fn build(self) -> Insert {
        self.ast
    }
}
