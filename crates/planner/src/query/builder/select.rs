//! Provides a type-safe, fluent builder for constructing `Select` ASTs.

// --- Typestate Marker Structs ---
// These zero-sized structs represent the state of the builder.
// They ensure that methods are called in the correct SQL order at compile time.

use crate::query::ast::{
    common::{JoinKind, OrderDir, TableRef},
    expr::Expr,
    select::{FromClause, JoinClause, OrderByExpr, Select},
};

/// The initial state of the builder before any clauses have been added.
#[derive(Debug, Default, Clone)]
pub struct InitialState;

/// The state after the `SELECT` clause has been added.
#[derive(Debug, Default, Clone)]
pub struct SelectState;

/// The state after the `FROM` clause has been added.
#[derive(Debug, Default, Clone)]
pub struct FromState;

#[derive(Debug, Clone)]
pub struct SelectBuilder<State> {
    ast: Select,
    state: State,
}

impl Default for SelectBuilder<InitialState> {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectBuilder<InitialState> {
    pub fn new() -> Self {
        Self {
            ast: Select::default(),
            state: InitialState,
        }
    }

    /// Adds a `SELECT` clause with a list of columns.
    pub fn select(mut self, columns: Vec<Expr>) -> SelectBuilder<SelectState> {
        self.ast.columns = columns;
        SelectBuilder {
            ast: self.ast,
            state: SelectState,
        }
    }
}

impl SelectBuilder<SelectState> {
    /// Adds a `FROM` clause specifying the head table of the chain.
    pub fn from(mut self, table: TableRef, alias: Option<&str>) -> SelectBuilder<FromState> {
        self.ast.from = Some(FromClause {
            table,
            alias: alias.map(String::from),
        });
        SelectBuilder {
            ast: self.ast,
            state: FromState,
        }
    }
}

impl SelectBuilder<FromState> {
    /// Adds a `JOIN` clause. `on` is `None` only for cross joins.
    pub fn join(
        mut self,
        kind: JoinKind,
        table: TableRef,
        alias: Option<&str>,
        on: Option<Expr>,
    ) -> Self {
        self.ast.joins.push(JoinClause {
            kind,
            table,
            alias: alias.map(String::from),
            on,
        });
        self
    }

    /// Adds a condition; all conditions are joined with `AND`.
    pub fn where_clause(mut self, condition: Expr) -> Self {
        self.ast.conditions.push(condition);
        self
    }

    pub fn order_by(mut self, expr: Expr, direction: Option<OrderDir>) -> Self {
        self.ast.order_by.push(OrderByExpr { expr, direction });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.ast.limit = Some(limit);
        self
    }

    /// Finalizes and returns the constructed `Select` AST.
    pub fn build(self) -> Select {
        self.ast
    }
}

#[cfg(test)]
mod tests {
    use crate::query::{
        ast::{
            common::{JoinKind, OrderDir, TableRef},
            expr::{Expr, Ident},
        },
        builder::select::SelectBuilder,
    };

    fn qual_ident(qualifier: &str, name: &str) -> Expr {
        Expr::Identifier(Ident::qualified(qualifier, name))
    }

    #[test]
    fn test_build_simple_select() {
        let ast = SelectBuilder::new()
            .select(vec![qual_ident("users1", "id")])
            .from(TableRef::new("users"), Some("users1"))
            .build();

        assert_eq!(ast.columns, vec![qual_ident("users1", "id")]);
        assert_eq!(ast.from.unwrap().alias.as_deref(), Some("users1"));
        assert!(ast.conditions.is_empty());
    }

    #[test]
    fn test_build_with_join_order_and_limit() {
        let ast = SelectBuilder::new()
            .select(vec![qual_ident("u", "name")])
            .from(TableRef::new("users"), Some("u"))
            .join(
                JoinKind::Left,
                TableRef::new("todos"),
                Some("t"),
                Some(Expr::eq(qual_ident("u", "id"), qual_ident("t", "creatorId"))),
            )
            .join(JoinKind::Cross, TableRef::new("projects"), Some("p"), None)
            .order_by(qual_ident("t", "title"), Some(OrderDir::Desc))
            .limit(5)
            .build();

        assert_eq!(ast.joins.len(), 2);
        assert!(ast.joins[1].on.is_none());
        assert_eq!(ast.order_by[0].direction, Some(OrderDir::Desc));
        assert_eq!(ast.limit, Some(5));
    }
}
