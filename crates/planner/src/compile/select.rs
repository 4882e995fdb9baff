//! Compiles the chain of a query tree into one SELECT statement.

use crate::{
    compile::{check_column, check_table},
    error::QueryError,
    query::{
        Statement,
        ast::{
            common::{OrderDir, TableRef},
            expr::{Expr, Ident},
            select::Select,
        },
        builder::select::SelectBuilder,
        dialect::Dialect,
    },
    scope::resolve_condition,
    tree::{FieldRole, NodeId, NodeKind, Projection, QueryTree},
};
use model::catalog::Catalog;
use std::collections::HashMap;
use tracing::debug;

pub fn compile_select(
    tree: &QueryTree,
    dialect: &dyn Dialect,
    catalog: &Catalog,
) -> Result<Statement, QueryError> {
    let ast = select_ast(tree, catalog)?;
    let statement = Statement::render(&ast, dialect);
    debug!(sql = %statement.sql, dialect = %dialect.name(), "Compiled select");
    Ok(statement)
}

/// Validates the tree against the catalog and builds the SELECT AST.
pub fn select_ast(tree: &QueryTree, catalog: &Catalog) -> Result<Select, QueryError> {
    let chain = tree.chain();
    let Some(&head) = chain.first() else {
        return Err(QueryError::WrongQueryKind {
            expected: "a select",
        });
    };

    let mut limit = None;
    for id in &chain {
        let Some(limit_id) = tree.select(*id).and_then(|s| s.limit) else {
            continue;
        };
        if limit.is_some() {
            return Err(QueryError::TooManyLimits);
        }
        if let NodeKind::Limit(node) = &tree.node(limit_id).kind {
            limit = Some(node.limit);
        }
    }

    for id in &chain {
        check_table(catalog, table_of(tree, *id)?)?;
    }

    let columns = projected_columns(tree, &chain, catalog)?;

    let head_table = table_of(tree, head)?;
    let mut builder = SelectBuilder::new()
        .select(columns)
        .from(TableRef::new(head_table), Some(&tree.qualified(head)));

    for id in chain.iter().skip(1) {
        let name = tree.name(*id).unwrap_or_default().to_string();
        let join_id = tree
            .select(*id)
            .and_then(|s| s.join)
            .ok_or(QueryError::MissingJoin(name))?;
        let NodeKind::Join(join) = &tree.node(join_id).kind else {
            continue;
        };
        let mut links = Vec::new();
        for (left, right) in &join.links {
            links.push(Expr::eq(
                column_expr(tree, *left, catalog)?,
                column_expr(tree, *right, catalog)?,
            ));
        }
        builder = builder.join(
            join.kind,
            TableRef::new(table_of(tree, *id)?),
            Some(&tree.qualified(*id)),
            Expr::and_all(links),
        );
    }

    for id in &chain {
        let Some(select) = tree.select(*id) else {
            continue;
        };
        for where_id in &select.wheres {
            if let NodeKind::Where(node) = &tree.node(*where_id).kind {
                let parts = resolve_condition(tree, *id, &node.condition)?;
                builder = builder.where_clause(Expr::Condition(parts));
            }
        }
    }

    for id in &chain {
        let Some(order_id) = tree.select(*id).and_then(|s| s.order) else {
            continue;
        };
        let NodeKind::Order(order) = &tree.node(order_id).kind else {
            continue;
        };
        for field_id in &order.fields {
            let direction = match tree.field(*field_id).map(|f| f.role) {
                Some(FieldRole::Order { reverse: true }) => Some(OrderDir::Desc),
                _ => None,
            };
            builder = builder.order_by(column_expr(tree, *field_id, catalog)?, direction);
        }
    }

    if let Some(limit) = limit {
        builder = builder.limit(limit);
    }

    Ok(builder.build())
}

fn table_of(tree: &QueryTree, id: NodeId) -> Result<&str, QueryError> {
    tree.select(id)
        .map(|s| s.table.as_str())
        .ok_or_else(|| QueryError::Parse(format!("node #{} is not a select", tree.node(id).reference)))
}

/// The qualified column of a field node, checked against the catalog.
fn column_ident(tree: &QueryTree, field_id: NodeId, catalog: &Catalog) -> Result<Ident, QueryError> {
    let field = tree
        .field(field_id)
        .ok_or_else(|| QueryError::Parse("expected a field".into()))?;
    let table_id = tree.field_table(field_id)?;
    check_column(catalog, table_of(tree, table_id)?, &field.field)?;
    Ok(Ident::qualified(&tree.qualified(table_id), &field.field))
}

fn column_expr(tree: &QueryTree, field_id: NodeId, catalog: &Catalog) -> Result<Expr, QueryError> {
    column_ident(tree, field_id, catalog).map(Expr::Identifier)
}

fn display_column(ident: &Ident) -> String {
    match &ident.qualifier {
        Some(q) => format!("\"{q}\".\"{}\"", ident.name),
        None => format!("\"{}\"", ident.name),
    }
}

fn projected_columns(
    tree: &QueryTree,
    chain: &[NodeId],
    catalog: &Catalog,
) -> Result<Vec<Expr>, QueryError> {
    let key_only = tree.projection() == Projection::PrimaryKeys;
    let mut columns = Vec::new();
    let mut seen: HashMap<String, Ident> = HashMap::new();

    for id in chain {
        let Some(select) = tree.select(*id) else {
            continue;
        };
        for field_id in &select.fields {
            let is_marker = matches!(
                tree.field(*field_id).map(|f| f.role),
                Some(FieldRole::Key { .. })
            );
            if key_only && !is_marker {
                continue;
            }
            let ident = column_ident(tree, *field_id, catalog)?;
            let alias = tree.row_key(*field_id);
            if let Some(existing) = seen.get(&alias) {
                if existing != &ident {
                    return Err(QueryError::ContradictingAliases {
                        alias,
                        first: display_column(existing),
                        second: display_column(&ident),
                    });
                }
                continue;
            }
            seen.insert(alias.clone(), ident.clone());
            columns.push(Expr::Alias {
                expr: Box::new(Expr::Identifier(ident)),
                alias,
            });
        }
    }
    Ok(columns)
}
