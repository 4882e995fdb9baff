use crate::query::{
    dialect::Dialect,
    renderer::{Render, Renderer},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod ast;
pub mod builder;
pub mod dialect;
pub mod renderer;

/// Rendered SQL plus its bind parameters in placeholder order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn render<T: Render>(node: &T, dialect: &dyn Dialect) -> Self {
        let mut renderer = Renderer::new(dialect);
        node.render(&mut renderer);
        let (sql, params) = renderer.finish();
        Statement { sql, params }
    }
}
