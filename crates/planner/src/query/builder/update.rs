//! Provides a fluent builder for constructing `Update` ASTs.

use crate::query::ast::{
    common::TableRef,
    expr::Expr,
    update::{Assignment, Update},
};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct UpdateBuilder {
    ast: Update,
    filters: Vec<Expr>,
}

impl UpdateBuilder {
    pub fn new(table: TableRef) -> Self {
        Self {
            ast: Update {
                table,
                assignments: Vec::new(),
                where_clause: None,
                returning: false,
            },
            filters: Vec::new(),
        }
    }

    /// Adds `column = <param>` to the SET list.
    pub fn set(mut self, column: &str, value: Value) -> Self {
        self.ast.assignments.push(Assignment {
            column: column.to_string(),
            value: Expr::Value(value),
        });
        self
    }

    /// Adds `column = <param>` to the WHERE clause.
    pub fn where_eq(mut self, column: &str, value: Value) -> Self {
        self.filters.push(Expr::eq(Expr::column(column), Expr::Value(value)));
        self
    }

    pub fn returning(mut self, returning: bool) -> Self {
        self.ast.returning = returning;
        self
    }

    pub fn build(mut self) -> Update {
        self.ast.where_clause = Expr::and_all(self.filters);
        self.ast
    }
}
