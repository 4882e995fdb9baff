//! Reconstruction plans for turning flat result rows into nested objects.
//!
//! A [`Formula`] mirrors the Select tree: each level names the row columns it
//! reads, the columns holding its primary key, and the nested formulas of its
//! members (single objects) and collections (arrays).

use crate::{
    error::QueryError,
    tree::{FieldRole, NodeId, NodeKind, ProcessRule, QueryTree},
};
use model::{core::pk::PkError, records::row::Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub mod replay;

pub use replay::Replay;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    /// Output field to row column.
    pub flat: BTreeMap<String, String>,
    /// Row columns holding this level's key, in key order.
    #[serde(default)]
    pub pk: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub objects: BTreeMap<String, Formula>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub arrays: BTreeMap<String, Formula>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub process: BTreeMap<String, ProcessRule>,
}

impl Formula {
    pub fn from_tree(tree: &QueryTree) -> Result<Formula, QueryError> {
        let root = tree.root();
        match &tree.node(root).kind {
            NodeKind::Select(_) => Self::from_select(tree, root),
            NodeKind::Container => {
                let mut merged = Formula::default();
                for item in &tree.node(root).children {
                    merged.merge(Self::from_select(tree, *item)?);
                }
                Ok(merged)
            }
            _ => Err(QueryError::WrongQueryKind {
                expected: "a select",
            }),
        }
    }

    fn from_select(tree: &QueryTree, id: NodeId) -> Result<Formula, QueryError> {
        let select = tree
            .select(id)
            .ok_or_else(|| QueryError::Parse("formula of a non-select node".into()))?;

        let mut formula = Formula {
            process: select.process.clone(),
            ..Formula::default()
        };
        for field_id in &select.fields {
            let Some(field) = tree.field(*field_id) else {
                continue;
            };
            if field.role == FieldRole::Select {
                formula
                    .flat
                    .insert(field.alias.clone(), tree.row_key(*field_id));
            }
        }
        for index in 0..select.pk.len() {
            let field_id = tree.key_field(id, index).ok_or_else(|| {
                QueryError::Key(PkError::MissingKey {
                    field: select.pk.fields()[index].clone(),
                })
            })?;
            formula.pk.push(tree.row_key(field_id));
        }
        for member in &select.members {
            let name = tree.name(*member).unwrap_or_default().to_string();
            formula.objects.insert(name, Self::from_select(tree, *member)?);
        }
        for collection in &select.collections {
            let name = tree.name(*collection).unwrap_or_default().to_string();
            formula
                .arrays
                .insert(name, Self::from_select(tree, *collection)?);
        }
        Ok(formula)
    }

    /// Folds a list item into a combined formula.
    fn merge(&mut self, other: Formula) {
        self.flat.extend(other.flat);
        self.pk.extend(other.pk);
        self.objects.extend(other.objects);
        self.arrays.extend(other.arrays);
        self.process.extend(other.process);
    }

    /// Rebuilds nested objects from the rows of one statement.
    pub fn process(&self, rows: &[Row]) -> Result<Vec<Value>, PkError> {
        let mut replay = Replay::new(self);
        replay.feed(rows)?;
        Ok(replay.into_values())
    }
}
