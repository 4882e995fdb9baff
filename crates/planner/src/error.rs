use model::core::pk::PkError;
use thiserror::Error;

/// Failure raised by a backend, passed through unchanged.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// Broad classification of a [`QueryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Validation,
    ScopeResolution,
    Key,
    Backend,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Unable to parse query: {0}")]
    Parse(String),

    #[error("Cannot construct query from empty array.")]
    EmptyList,

    #[error("Cross joins not supported.")]
    CrossJoin,

    #[error("Invalid limit {0}.")]
    InvalidLimit(i64),

    #[error("Unknown processing rule '{rule}' for field '{field}'.")]
    UnknownProcessRule { field: String, rule: String },

    #[error("A root table '{0}' cannot declare a join.")]
    RootJoin(String),

    #[error("No such table '{0}'.")]
    UnknownTable(String),

    #[error("A table '{table}' has no column '{column}'.")]
    UnknownColumn { table: String, column: String },

    #[error("Type of join not defined for '{0}'.")]
    MissingJoin(String),

    #[error("Cannot find a table named '{0}' in the query.")]
    UnknownTableReference(String),

    #[error("Too many limits declared.")]
    TooManyLimits,

    #[error("Contradicting aliases for \"{alias}\": {first} and {second}.")]
    ContradictingAliases {
        alias: String,
        first: String,
        second: String,
    },

    #[error("A field '{field}' is not defined in {operation} query for '{table}'.")]
    FieldNotAllowed {
        field: String,
        operation: &'static str,
        table: String,
    },

    #[error("A key '{0}' is not allowed as specifying the deletion.")]
    KeyNotAllowed(String),

    #[error("A key '{0}' given for deletion is null.")]
    NullDeletionKey(String),

    #[error("No keys given for deletion from '{0}'.")]
    EmptyDeletion(String),

    #[error("Nothing to write to '{0}'.")]
    NothingToWrite(String),

    #[error("There is no pk ({pk}) in an object given for update of '{table}'.")]
    MissingPrimaryKey { table: String, pk: String },

    #[error("Query is not {expected} query.")]
    WrongQueryKind { expected: &'static str },

    #[error("Cannot resolve variables {}.", .0.join(", "))]
    UnresolvedVariables(Vec<String>),

    #[error(transparent)]
    Key(#[from] PkError),

    #[error("Backend error: {0}")]
    Backend(#[source] BackendError),
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueryError::Parse(_)
            | QueryError::EmptyList
            | QueryError::CrossJoin
            | QueryError::InvalidLimit(_)
            | QueryError::UnknownProcessRule { .. }
            | QueryError::RootJoin(_) => ErrorKind::Parse,
            QueryError::UnknownTable(_)
            | QueryError::UnknownColumn { .. }
            | QueryError::MissingJoin(_)
            | QueryError::UnknownTableReference(_)
            | QueryError::TooManyLimits
            | QueryError::ContradictingAliases { .. }
            | QueryError::FieldNotAllowed { .. }
            | QueryError::KeyNotAllowed(_)
            | QueryError::NullDeletionKey(_)
            | QueryError::EmptyDeletion(_)
            | QueryError::NothingToWrite(_)
            | QueryError::MissingPrimaryKey { .. }
            | QueryError::WrongQueryKind { .. } => ErrorKind::Validation,
            QueryError::UnresolvedVariables(_) => ErrorKind::ScopeResolution,
            QueryError::Key(_) => ErrorKind::Key,
            QueryError::Backend(_) => ErrorKind::Backend,
        }
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            QueryError::UnknownColumn {
                table: "users".into(),
                column: "foo".into()
            }
            .to_string(),
            "A table 'users' has no column 'foo'."
        );
        assert_eq!(
            QueryError::UnresolvedVariables(vec!["a.b".into(), "c.d".into()]).to_string(),
            "Cannot resolve variables a.b, c.d."
        );
        assert_eq!(QueryError::InvalidLimit(0).to_string(), "Invalid limit 0.");
    }

    #[test]
    fn test_kinds() {
        assert_eq!(QueryError::CrossJoin.kind(), ErrorKind::Parse);
        assert_eq!(QueryError::TooManyLimits.kind(), ErrorKind::Validation);
        assert_eq!(
            QueryError::UnresolvedVariables(vec![]).kind(),
            ErrorKind::ScopeResolution
        );
        let backend: BackendError = "connection reset".into();
        assert_eq!(QueryError::Backend(backend).kind(), ErrorKind::Backend);
    }
}
