//! Error types for table declarations, reconciliation and record access.

use std::fmt;

use thiserror::Error;

use crate::value::Params;

/// Why a value could not be coerced to a column's native type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionKind {
    /// The value has the right shape but unparseable content (e.g. `"abc"` as a number).
    Format,
    /// The value's type has no conversion to the column type at all.
    InvalidCast,
    /// The value does not fit in the column's native type.
    Overflow,
}

impl fmt::Display for ConversionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionKind::Format => write!(f, "invalid format"),
            ConversionKind::InvalidCast => write!(f, "invalid cast"),
            ConversionKind::Overflow => write!(f, "overflow"),
        }
    }
}

/// Main error type for database operations.
#[derive(Error, Debug)]
pub enum SqliteError {
    /// The backing connection could not be opened
    #[error("Unable to open database at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    /// The backing connection refused to close
    #[error("Unable to close database at {path}: {source}")]
    Close {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    /// A value could not be converted to the column's type
    #[error("Error converting value for column \"{column}\" in table '{table}' ({kind}). Value: \"{value}\"")]
    ValueConversion {
        table: String,
        column: String,
        /// Offending value, truncated to 50 characters.
        value: String,
        kind: ConversionKind,
    },

    /// Table not registered with the database
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// Column not declared on the table
    #[error("Column not found: {column} (table '{table}')")]
    ColumnNotFound { table: String, column: String },

    /// Table already registered with the database
    #[error("Table '{0}' already exists")]
    TableAlreadyExists(String),

    /// Column added after the table was registered
    #[error("Unable to add column to table '{table}': table already registered")]
    SchemaFrozen { table: String },

    /// Metadata probe or corrective DDL failed
    #[error("Schema reconciliation failed for table '{table}': {source}\n  Statement: {statement}")]
    SchemaReconciliation {
        table: String,
        statement: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Any other statement failure
    #[error("Error during SQL execution: {source}\n  SQL: {sql}")]
    SqlExecution {
        sql: String,
        params: Params,
        #[source]
        source: rusqlite::Error,
    },

    /// Positional values do not line up with the table's user columns
    #[error("Column count mismatch. Table \"{table}\" requires {expected} column(s), got {got}")]
    ColumnCountMismatch {
        table: String,
        expected: usize,
        got: usize,
    },

    /// The engine assigns the identity column; callers may not write it
    #[error("Column '{column}' of table '{table}' is assigned by the database and cannot be written")]
    IdentityAssignment { table: String, column: String },

    /// A table declares more than one identity column
    #[error("Table '{0}' already has an identity column")]
    DuplicateIdentity(String),

    /// Update attempted without any values
    #[error("No values to write to table '{0}'")]
    EmptyRecord(String),
}

impl SqliteError {
    /// Create a SqlExecution error, keeping the statement and its parameters for debugging
    pub fn execution(sql: impl Into<String>, params: &Params, source: rusqlite::Error) -> Self {
        SqliteError::SqlExecution {
            sql: sql.into(),
            params: params.clone(),
            source,
        }
    }

    /// Create a SchemaReconciliation error
    pub fn reconciliation(
        table: impl Into<String>,
        statement: impl Into<String>,
        source: rusqlite::Error,
    ) -> Self {
        SqliteError::SchemaReconciliation {
            table: table.into(),
            statement: statement.into(),
            source,
        }
    }

    /// Create a ColumnNotFound error
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        SqliteError::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for database operations.
pub type Result<T> = std::result::Result<T, SqliteError>;
