//! Defines the `Dialect` trait for database-specific SQL syntax.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How identifiers are wrapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStyle {
    /// `` `name` ``
    Backtick,
    /// `"name"`
    DoubleQuote,
    /// `[name]`
    Bracket,
}

impl QuoteStyle {
    /// Wraps `ident`, doubling any embedded closing quote character.
    pub fn quote(&self, ident: &str) -> String {
        let (open, close) = match self {
            QuoteStyle::Backtick => ('`', '`'),
            QuoteStyle::DoubleQuote => ('"', '"'),
            QuoteStyle::Bracket => ('[', ']'),
        };
        let mut quoted = String::with_capacity(ident.len() + 2);
        quoted.push(open);
        for c in ident.chars() {
            if c == close {
                quoted.push(close);
            }
            quoted.push(c);
        }
        quoted.push(close);
        quoted
    }
}

/// How bind parameters are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderStyle {
    /// `?`
    Question,
    /// `$1`, `$2`, ...
    Dollar,
}

impl PlaceholderStyle {
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            PlaceholderStyle::Question => "?".into(),
            PlaceholderStyle::Dollar => format!("${}", index + 1),
        }
    }
}

pub trait Dialect: Send + Sync {
    /// Wraps an identifier (like a table or column name) in the correct
    /// quotation marks for the dialect.
    ///
    /// - PostgreSQL uses double quotes: `"my_column"`
    /// - MySQL and SQLite use backticks: `` `my_column` ``
    fn quote_identifier(&self, ident: &str) -> String;

    /// Returns the placeholder for a parameterized query.
    ///
    /// - PostgreSQL uses `$1`, `$2`, etc.
    /// - MySQL and SQLite use `?`
    fn get_placeholder(&self, index: usize) -> String;

    /// Returns the name of the dialect (e.g., "PostgreSQL", "MySQL").
    fn name(&self) -> String;

    /// Whether `INSERT`/`UPDATE` may end with `RETURNING *`.
    fn supports_returning(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct Postgres;

impl Dialect for Postgres {
    fn quote_identifier(&self, ident: &str) -> String {
        QuoteStyle::DoubleQuote.quote(ident)
    }

    fn get_placeholder(&self, index: usize) -> String {
        // PostgreSQL uses $1, $2, etc.
        PlaceholderStyle::Dollar.placeholder(index)
    }

    fn name(&self) -> String {
        "PostgreSQL".into()
    }

    fn supports_returning(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone)]
pub struct MySql;

impl Dialect for MySql {
    fn quote_identifier(&self, ident: &str) -> String {
        QuoteStyle::Backtick.quote(ident)
    }

    fn get_placeholder(&self, _index: usize) -> String {
        // MySQL uses ?
        PlaceholderStyle::Question.placeholder(0)
    }

    fn name(&self) -> String {
        "MySQL".into()
    }
}

#[derive(Debug, Clone)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn quote_identifier(&self, ident: &str) -> String {
        QuoteStyle::Backtick.quote(ident)
    }

    fn get_placeholder(&self, _index: usize) -> String {
        PlaceholderStyle::Question.placeholder(0)
    }

    fn name(&self) -> String {
        "SQLite".into()
    }
}

/// A dialect assembled from a quote style and a placeholder style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericDialect {
    pub quote: QuoteStyle,
    pub placeholder: PlaceholderStyle,
    #[serde(default)]
    pub returning: bool,
}

impl Dialect for GenericDialect {
    fn quote_identifier(&self, ident: &str) -> String {
        self.quote.quote(ident)
    }

    fn get_placeholder(&self, index: usize) -> String {
        self.placeholder.placeholder(index)
    }

    fn name(&self) -> String {
        format!("Generic({:?}, {:?})", self.quote, self.placeholder)
    }

    fn supports_returning(&self) -> bool {
        self.returning
    }
}

/// Dialects selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialectKind {
    Postgres,
    MySql,
    Sqlite,
}

impl DialectKind {
    pub fn dialect(&self) -> Box<dyn Dialect> {
        match self {
            DialectKind::Postgres => Box::new(Postgres),
            DialectKind::MySql => Box::new(MySql),
            DialectKind::Sqlite => Box::new(Sqlite),
        }
    }
}

impl FromStr for DialectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pg" | "postgres" | "postgresql" => Ok(DialectKind::Postgres),
            "mysql" | "mariadb" => Ok(DialectKind::MySql),
            "sqlite" | "sqlite3" => Ok(DialectKind::Sqlite),
            other => Err(format!("Unknown dialect: {other}")),
        }
    }
}
