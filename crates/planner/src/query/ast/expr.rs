//! Defines the AST for SQL expressions.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A column or table identifier, e.g., `users` or `users.id`.
    Identifier(Ident),

    /// A bound value, rendered as a placeholder.
    Value(Value),

    /// A binary operation, e.g., `column = 'value'` or `a AND b`.
    BinaryOp(Box<BinaryOp>),

    /// An aliased expression, e.g. `users1.id AS id`
    Alias { expr: Box<Expr>, alias: String },

    /// A user-written condition whose column references were resolved.
    Condition(Vec<ConditionPart>),

    /// `*`
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub qualifier: Option<String>, // e.g., the 'users1' in 'users1.id'
    pub name: String,              // e.g., the 'id' in 'users1.id'
}

impl Ident {
    pub fn qualified(qualifier: &str, name: &str) -> Self {
        Ident {
            qualifier: Some(qualifier.to_string()),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOp {
    pub left: Expr,
    pub op: BinaryOperator,
    pub right: Expr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryOperator {
    Eq,
    And,
}

/// A fragment of a resolved condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionPart {
    /// Passed through verbatim.
    Text(String),
    /// A column reference, quoted on render.
    Column(Ident),
}

impl Expr {
    /// An unqualified column, e.g. `id`.
    pub fn column(name: &str) -> Expr {
        Expr::Identifier(Ident {
            qualifier: None,
            name: name.to_string(),
        })
    }

    pub fn eq(left: Expr, right: Expr) -> Expr {
        Expr::BinaryOp(Box::new(BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        }))
    }

    /// Folds the expressions into a left-nested `AND` chain.
    pub fn and_all(exprs: Vec<Expr>) -> Option<Expr> {
        exprs.into_iter().reduce(|left, right| {
            Expr::BinaryOp(Box::new(BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            }))
        })
    }
}
