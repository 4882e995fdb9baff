#![allow(dead_code)]

use async_trait::async_trait;
use model::{catalog::Catalog, records::row::Row};
use planner::{
    driver::{Driver, InsertResult, UpdateStatement},
    error::BackendError,
    query::{
        Statement,
        dialect::{Dialect, MySql, Postgres},
    },
};
use serde_json::Value;
use std::sync::Mutex;

pub fn catalog() -> Catalog {
    Catalog::new()
        .with_table("users", ["id", "name", "age"])
        .with_table("projects", ["id", "creatorId", "name"])
        .with_table("todos", ["id", "title", "creatorId", "projectId", "ownerId"])
        .with_table("comments", ["id", "userId", "todoId", "comment"])
        .with_table("tools", ["id", "ownerId", "name"])
        .with_table("translations", ["id", "lang", "text"])
}

pub fn rows(value: Value) -> Vec<Row> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| item.as_object().cloned().expect("row must be an object"))
            .collect(),
        other => panic!("expected a list of rows, got {other}"),
    }
}

/// In-memory backend: returns canned rows and records every statement.
pub struct MockDriver {
    dialect: Box<dyn Dialect>,
    catalog: Catalog,
    rows: Vec<Row>,
    fail_with: Option<String>,
    pub executed: Mutex<Vec<Statement>>,
}

impl MockDriver {
    pub fn mysql(rows: Vec<Row>) -> Self {
        Self::new(Box::new(MySql), rows)
    }

    pub fn postgres(rows: Vec<Row>) -> Self {
        Self::new(Box::new(Postgres), rows)
    }

    fn new(dialect: Box<dyn Dialect>, rows: Vec<Row>) -> Self {
        MockDriver {
            dialect,
            catalog: catalog(),
            rows,
            fail_with: None,
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        MockDriver {
            fail_with: Some(message.to_string()),
            ..Self::mysql(Vec::new())
        }
    }

    pub fn executed(&self) -> Vec<Statement> {
        self.executed.lock().unwrap().clone()
    }

    fn record(&self, statement: &Statement) -> Result<(), BackendError> {
        self.executed.lock().unwrap().push(statement.clone());
        match &self.fail_with {
            Some(message) => Err(message.clone().into()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Driver for MockDriver {
    fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    async fn run_select(&self, statement: &Statement) -> Result<Vec<Row>, BackendError> {
        self.record(statement)?;
        Ok(self.rows.clone())
    }

    async fn run_insert(&self, statement: &Statement) -> Result<InsertResult, BackendError> {
        self.record(statement)?;
        if self.dialect.supports_returning() {
            Ok(InsertResult::Rows(self.rows.clone()))
        } else {
            Ok(InsertResult::Done)
        }
    }

    async fn run_update(&self, update: &UpdateStatement) -> Result<Vec<Row>, BackendError> {
        self.record(&update.statement)?;
        let mut row = Row::new();
        for (field, value) in &update.key {
            row.insert(field.clone(), value.clone());
        }
        Ok(vec![row])
    }

    async fn run_delete(&self, statement: &Statement) -> Result<u64, BackendError> {
        self.record(statement)?;
        Ok(1)
    }
}
