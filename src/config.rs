//! Database configuration.

use serde::{Deserialize, Serialize};

use crate::schema::{Schema, TableSchema};

/// Path SQLite interprets as a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// SQLite database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Path to the SQLite database file
    pub db_path: String,
    /// Skip reconciliation and assume the backing file already has every
    /// declared table and column. Registration gets cheaper; a missing
    /// table or column surfaces later as an execution error.
    pub trust_backing_database: bool,
    /// Tables registered when the database is opened
    pub schema: Schema,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            db_path: MEMORY_PATH.to_string(),
            trust_backing_database: false,
            schema: Schema::new(),
        }
    }
}

impl SqliteConfig {
    /// Create a new SQLite config with path and schema
    pub fn new(db_path: impl Into<String>, schema: Schema) -> Self {
        Self {
            db_path: db_path.into(),
            schema,
            ..Self::default()
        }
    }

    pub fn with_trust_backing_database(mut self, trust: bool) -> Self {
        self.trust_backing_database = trust;
        self
    }

    pub fn with_table(mut self, table: TableSchema) -> Self {
        self.schema = self.schema.add_table(table);
        self
    }
}
