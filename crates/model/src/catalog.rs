//! The set of tables and columns a backend exposes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Table name to column names, loaded once per backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from `(table, column)` pairs, as returned by
    /// `information_schema.columns`.
    pub fn from_columns<I, T, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (T, C)>,
        T: Into<String>,
        C: Into<String>,
    {
        let mut catalog = Catalog::new();
        for (table, column) in pairs {
            catalog.add_column(table, column);
        }
        catalog
    }

    pub fn with_table<I, C>(mut self, table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<String>,
    {
        let entry = self.tables.entry(table.to_string()).or_default();
        entry.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn add_column(&mut self, table: impl Into<String>, column: impl Into<String>) {
        self.tables
            .entry(table.into())
            .or_default()
            .insert(column.into());
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|columns| columns.contains(column))
    }

    pub fn columns(&self, table: &str) -> Option<&BTreeSet<String>> {
        self.tables.get(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
