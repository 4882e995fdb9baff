//! Where to connect, derived from a database URL.

use crate::error::AdapterError;
use planner::query::dialect::DialectKind;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Postgres,
    MySql,
}

impl DatabaseKind {
    pub fn dialect(&self) -> DialectKind {
        match self {
            DatabaseKind::Postgres => DialectKind::Postgres,
            DatabaseKind::MySql => DialectKind::MySql,
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseKind::Postgres => write!(f, "postgres"),
            DatabaseKind::MySql => write!(f, "mysql"),
        }
    }
}

impl FromStr for DatabaseKind {
    type Err = AdapterError;

    /// Accepts a URL scheme.
    fn from_str(scheme: &str) -> Result<Self, Self::Err> {
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DatabaseKind::Postgres),
            "mysql" | "mariadb" => Ok(DatabaseKind::MySql),
            other => Err(AdapterError::UnsupportedScheme(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub url: String,
    pub kind: DatabaseKind,
}

impl ConnectionConfig {
    pub fn from_url(url: &str) -> Result<Self, AdapterError> {
        let (scheme, _) = url
            .split_once("://")
            .ok_or_else(|| AdapterError::UnsupportedScheme(url.to_string()))?;
        let kind = scheme.parse()?;
        // mysql_async only understands the mysql scheme
        let url = match kind {
            DatabaseKind::MySql => format!("mysql://{}", &url[scheme.len() + 3..]),
            DatabaseKind::Postgres => url.to_string(),
        };
        Ok(ConnectionConfig { url, kind })
    }

    pub fn from_env() -> Result<Self, AdapterError> {
        let url = std::env::var(DATABASE_URL_ENV)
            .map_err(|_| AdapterError::MissingProperty(DATABASE_URL_ENV.to_string()))?;
        Self::from_url(&url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_scheme() {
        let config = ConnectionConfig::from_url("postgresql://u:p@localhost/app").unwrap();
        assert_eq!(config.kind, DatabaseKind::Postgres);
        assert_eq!(config.url, "postgresql://u:p@localhost/app");

        let config = ConnectionConfig::from_url("mariadb://root@db:3306/app").unwrap();
        assert_eq!(config.kind, DatabaseKind::MySql);
        assert_eq!(config.url, "mysql://root@db:3306/app");
        assert_eq!(config.kind.dialect(), DialectKind::MySql);
    }

    #[test]
    fn test_unsupported_urls() {
        assert!(matches!(
            ConnectionConfig::from_url("sqlite://file.db"),
            Err(AdapterError::UnsupportedScheme(s)) if s == "sqlite"
        ));
        assert!(ConnectionConfig::from_url("localhost:5432").is_err());
    }
}
