//! Table declarations and DDL generation.

use serde::{Deserialize, Serialize};

use crate::column::{Column, IMPLICIT_IDENTITY_COLUMN_NAME};
use crate::error::{Result, SqliteError};

/// A set of table declarations, usually loaded from configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub tables: Vec<TableSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self { tables: Vec::new() }
    }
    pub fn add_table(mut self, table: TableSchema) -> Self {
        self.tables.push(table);
        self
    }
}

/// Declaration of one table: its name, ordered columns and identity policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    name: String,
    #[serde(default)]
    columns: Vec<Column>,
    /// Rely on SQLite's `ROWID` instead of an explicit `id` column.
    #[serde(default)]
    implicit_identity: bool,
    #[serde(skip)]
    frozen: bool,
}

impl TableSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            implicit_identity: false,
            frozen: false,
        }
    }

    /// Builder form of [`TableSchema::add_column`] for declarations that have
    /// not been registered yet.
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    pub fn with_implicit_identity(mut self, implicit: bool) -> Self {
        self.implicit_identity = implicit;
        self
    }

    /// Append a column. Fails once the table has been registered with a
    /// database, or when it would be a second identity column.
    pub fn add_column(&mut self, column: Column) -> Result<()> {
        if self.frozen {
            return Err(SqliteError::SchemaFrozen {
                table: self.name.clone(),
            });
        }
        if column.is_identity() && self.columns.iter().any(Column::is_identity) {
            return Err(SqliteError::DuplicateIdentity(self.name.clone()));
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Every column except the identity column, in declaration order.
    pub fn user_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.is_identity())
    }

    pub fn uses_implicit_identity(&self) -> bool {
        self.implicit_identity
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub(crate) fn freeze(&mut self) {
        self.frozen = true;
    }

    pub(crate) fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Name of the column rows are addressed by.
    pub fn identity_column_name(&self) -> &str {
        if self.implicit_identity {
            return IMPLICIT_IDENTITY_COLUMN_NAME;
        }
        match self.columns.iter().find(|c| c.is_identity()) {
            Some(column) => column.name(),
            None => IMPLICIT_IDENTITY_COLUMN_NAME,
        }
    }

    /// Case-insensitive lookup. A miss is an error.
    pub fn column(&self, name: &str) -> Result<&Column> {
        self.find_column(name)
            .ok_or_else(|| SqliteError::column_not_found(&self.name, name))
    }

    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.matches(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.find_column(name).is_some()
    }

    /// Make sure exactly one explicit identity column exists and comes first.
    /// Tables relying on the implicit row identity keep none.
    pub fn ensure_identity_column(&mut self) {
        if self.implicit_identity {
            self.columns.retain(|c| !c.is_identity());
            return;
        }
        let mut identity = None;
        self.columns.retain(|c| {
            if !c.is_identity() {
                return true;
            }
            if identity.is_none() {
                identity = Some(c.clone());
            }
            false
        });
        self.columns.insert(0, identity.unwrap_or_else(Column::identity));
    }

    /// `CREATE TABLE` statement for the whole declaration.
    pub fn create_ddl(&self) -> String {
        let mut fragments = Vec::with_capacity(self.columns.len() + 1);
        if !self.implicit_identity {
            fragments.push(Column::identity().ddl());
        }
        fragments.extend(self.user_columns().map(Column::ddl));
        format!("CREATE TABLE {} ({})", self.name, fragments.join(", "))
    }

    /// `ALTER TABLE ... ADD COLUMN` statement for one column.
    pub fn add_column_ddl(&self, column: &Column) -> String {
        format!("ALTER TABLE {} ADD COLUMN {}", self.name, column.ddl())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnKind, IDENTITY_COLUMN_NAME};

    fn cars() -> TableSchema {
        TableSchema::new("cars")
            .with_column(Column::text("name"))
            .with_column(Column::number("price"))
    }

    #[test]
    fn test_identity_inserted_first() {
        let mut table = cars();
        table.ensure_identity_column();
        assert_eq!(table.columns()[0].name(), IDENTITY_COLUMN_NAME);
        assert_eq!(table.columns().len(), 3);

        // Running it again changes nothing
        table.ensure_identity_column();
        assert_eq!(table.columns().len(), 3);
    }

    #[test]
    fn test_declared_identity_moved_first() {
        let mut table = TableSchema::new("posts")
            .with_column(Column::text("title"))
            .with_column(Column::identity());
        table.ensure_identity_column();
        assert!(table.columns()[0].is_identity());
        assert_eq!(table.columns().len(), 2);
    }

    #[test]
    fn test_implicit_identity_adds_nothing() {
        let mut table = TableSchema::new("friends")
            .with_column(Column::text("first_name"))
            .with_implicit_identity(true);
        table.ensure_identity_column();
        assert_eq!(table.columns().len(), 1);
        assert_eq!(table.identity_column_name(), IMPLICIT_IDENTITY_COLUMN_NAME);
        assert_eq!(table.create_ddl(), "CREATE TABLE friends (first_name TEXT)");
    }

    #[test]
    fn test_implicit_identity_drops_declared_identity() {
        let mut table = TableSchema::new("friends")
            .with_column(Column::identity())
            .with_column(Column::text("first_name"))
            .with_implicit_identity(true);
        assert_eq!(table.identity_column_name(), IMPLICIT_IDENTITY_COLUMN_NAME);

        table.ensure_identity_column();
        let names: Vec<_> = table.columns().iter().map(Column::name).collect();
        assert_eq!(names, ["first_name"]);
        assert_eq!(table.create_ddl(), "CREATE TABLE friends (first_name TEXT)");
    }

    #[test]
    fn test_single_identity_column() {
        let mut table = TableSchema::new("posts")
            .with_column(Column::identity())
            .with_column(Column::text("name"))
            .with_column(Column::identity());
        table.ensure_identity_column();
        let names: Vec<_> = table.columns().iter().map(Column::name).collect();
        assert_eq!(names, [IDENTITY_COLUMN_NAME, "name"]);

        let err = table.add_column(Column::identity()).unwrap_err();
        assert!(matches!(err, SqliteError::DuplicateIdentity(_)));
        assert_eq!(table.columns().len(), 2);
    }

    #[test]
    fn test_create_ddl_identity_first() {
        let mut table = cars();
        table.ensure_identity_column();
        assert_eq!(
            table.create_ddl(),
            "CREATE TABLE cars (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, price INT)"
        );
    }

    #[test]
    fn test_add_column_ddl() {
        let table = cars();
        assert_eq!(
            table.add_column_ddl(&Column::date("sold")),
            "ALTER TABLE cars ADD COLUMN sold TEXT"
        );
    }

    #[test]
    fn test_frozen_schema_rejects_columns() {
        let mut table = cars();
        table.add_column(Column::number("doors")).unwrap();
        table.freeze();
        let err = table.add_column(Column::number("wheels")).unwrap_err();
        assert!(matches!(err, SqliteError::SchemaFrozen { .. }));
    }

    #[test]
    fn test_column_lookup_is_case_insensitive() {
        let table = cars();
        assert_eq!(table.column("NAME").unwrap().kind(), ColumnKind::Text);
        assert!(table.has_column("Price"));
        assert!(table.find_column("color").is_none());
        assert!(matches!(
            table.column("color"),
            Err(SqliteError::ColumnNotFound { .. })
        ));
    }
}
