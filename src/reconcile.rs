//! Additive schema reconciliation.
//!
//! Several independent declarations may share one database file, so the
//! reconciler only ever creates missing tables and adds missing columns. It
//! never drops, renames or retypes anything, and a column is considered
//! present when a column of the same name exists, whatever its type.

use tracing::{debug, info};

use crate::error::{Result, SqliteError};
use crate::schema::TableSchema;
use crate::sqlite::{Database, TransactionMode};
use crate::value::Params;

const TABLE_EXISTS_SQL: &str = "SELECT name FROM sqlite_master WHERE type = 'table' AND name = @name";
const COLUMN_EXISTS_SQL: &str = "SELECT name FROM pragma_table_info(@table) WHERE name = @name";

/// One corrective statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdlStatement {
    CreateTable { sql: String },
    AddColumn { column: String, sql: String },
}

impl DdlStatement {
    pub fn sql(&self) -> &str {
        match self {
            DdlStatement::CreateTable { sql } | DdlStatement::AddColumn { sql, .. } => sql,
        }
    }
}

/// Statements needed to make the live schema a superset of one declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationPlan {
    pub table: String,
    pub statements: Vec<DdlStatement>,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn creates_table(&self) -> bool {
        self.statements
            .iter()
            .any(|s| matches!(s, DdlStatement::CreateTable { .. }))
    }

    pub fn added_columns(&self) -> impl Iterator<Item = &str> {
        self.statements.iter().filter_map(|s| match s {
            DdlStatement::AddColumn { column, .. } => Some(column.as_str()),
            DdlStatement::CreateTable { .. } => None,
        })
    }
}

pub struct SchemaReconciler<'db> {
    db: &'db Database,
}

impl<'db> SchemaReconciler<'db> {
    pub fn new(db: &'db Database) -> Self {
        Self { db }
    }

    /// Plan and apply in one step.
    pub fn reconcile(&self, table: &TableSchema) -> Result<ReconciliationPlan> {
        let plan = self.plan(table)?;
        self.apply(&plan)?;
        Ok(plan)
    }

    /// Probe the live metadata and work out what is missing. Nothing is changed.
    pub fn plan(&self, table: &TableSchema) -> Result<ReconciliationPlan> {
        let mut statements = Vec::new();

        if !self.table_exists(table)? {
            statements.push(DdlStatement::CreateTable {
                sql: table.create_ddl(),
            });
        } else {
            for column in table.columns() {
                if !self.column_exists(table, column.name())? {
                    statements.push(DdlStatement::AddColumn {
                        column: column.name().to_string(),
                        sql: table.add_column_ddl(column),
                    });
                }
            }
        }

        Ok(ReconciliationPlan {
            table: table.name().to_string(),
            statements,
        })
    }

    /// Run every planned statement in one transaction. On failure the
    /// transaction is rolled back and nothing from this plan is kept.
    pub fn apply(&self, plan: &ReconciliationPlan) -> Result<()> {
        if plan.is_empty() {
            debug!("table {} already matches its declaration", plan.table);
            return Ok(());
        }

        self.db
            .begin_transaction(TransactionMode::Deferred)
            .map_err(|err| self.wrap(plan, "BEGIN", err))?;

        for statement in &plan.statements {
            info!("reconciling table {}: {}", plan.table, statement.sql());
            if let Err(source) = self.db.run(statement.sql(), &Params::new()) {
                self.db.rollback_quietly();
                return Err(SqliteError::reconciliation(&plan.table, statement.sql(), source));
            }
        }

        self.db
            .commit()
            .map_err(|err| self.wrap(plan, "COMMIT", err))
    }

    fn table_exists(&self, table: &TableSchema) -> Result<bool> {
        let params = Params::new().with_value("name", table.name());
        self.db
            .probe(TABLE_EXISTS_SQL, &params)
            .map_err(|source| SqliteError::reconciliation(table.name(), TABLE_EXISTS_SQL, source))
    }

    fn column_exists(&self, table: &TableSchema, column: &str) -> Result<bool> {
        let params = Params::new()
            .with_value("table", table.name())
            .with_value("name", column);
        self.db
            .probe(COLUMN_EXISTS_SQL, &params)
            .map_err(|source| SqliteError::reconciliation(table.name(), COLUMN_EXISTS_SQL, source))
    }

    fn wrap(&self, plan: &ReconciliationPlan, statement: &str, err: SqliteError) -> SqliteError {
        match err {
            SqliteError::SqlExecution { source, .. } => {
                SqliteError::reconciliation(&plan.table, statement, source)
            }
            other => other,
        }
    }
}
