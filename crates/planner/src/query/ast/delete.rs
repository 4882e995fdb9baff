use crate::query::ast::{common::TableRef, expr::Expr};

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: TableRef,
    pub where_clause: Option<Expr>,
}
