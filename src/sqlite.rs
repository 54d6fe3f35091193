use std::collections::HashMap;
use std::path::Path;

use rusqlite::types::FromSql;
use rusqlite::{Connection, Statement};
use tracing::{debug, info, warn};

use crate::config::{SqliteConfig, MEMORY_PATH};
use crate::error::{Result, SqliteError};
use crate::reconcile::SchemaReconciler;
use crate::result_set::TypedResultSet;
use crate::schema::TableSchema;
use crate::table::Table;
use crate::value::{Params, SqlQuery, Value};

/// Hook invoked with every statement right before it runs.
pub type SqlLogger = Box<dyn Fn(&str, &Params) + Send>;

/// How `BEGIN` acquires its locks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    #[default]
    Deferred,
    Immediate,
    Exclusive,
}

impl TransactionMode {
    fn begin_sql(self) -> &'static str {
        match self {
            TransactionMode::Deferred => "BEGIN DEFERRED",
            TransactionMode::Immediate => "BEGIN IMMEDIATE",
            TransactionMode::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// A single SQLite connection plus the tables registered against it.
///
/// Every call runs synchronously on the caller's thread. The handle is `Send`
/// but not `Sync`; callers sharing one database across threads serialize
/// access themselves.
pub struct Database {
    conn: Connection,
    path: String,
    tables: Vec<TableSchema>,
    trust_backing_database: bool,
    sql_logger: Option<SqlLogger>,
}

impl Database {
    /// Open the configured database and register every table it declares.
    pub fn open(config: SqliteConfig) -> Result<Self> {
        let mut db = Self::open_path(&config.db_path)?;
        db.trust_backing_database = config.trust_backing_database;
        for table in config.schema.tables {
            db.add_table(table)?;
        }
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open_path(MEMORY_PATH)
    }

    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let shown = path.as_ref().display().to_string();
        let conn = Connection::open(path.as_ref()).map_err(|source| SqliteError::Open {
            path: shown.clone(),
            source,
        })?;
        info!("opened sqlite database at {}", shown);
        Ok(Self {
            conn,
            path: shown,
            tables: Vec::new(),
            trust_backing_database: false,
            sql_logger: None,
        })
    }

    /// Close the connection, surfacing any error the engine reports.
    pub fn close(self) -> Result<()> {
        let path = self.path;
        self.conn
            .close()
            .map_err(|(_, source)| SqliteError::Close {
                path: path.clone(),
                source,
            })?;
        debug!("closed sqlite database at {}", path);
        Ok(())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Skip reconciliation for tables registered from now on. Tables that
    /// were already registered keep the checks they went through.
    pub fn set_trust_backing_database(&mut self, trust: bool) {
        if !self.tables.is_empty() && trust != self.trust_backing_database {
            warn!(
                "trust mode changed after {} table(s) were registered; only later tables are affected",
                self.tables.len()
            );
        }
        self.trust_backing_database = trust;
    }

    pub fn trust_backing_database(&self) -> bool {
        self.trust_backing_database
    }

    pub fn set_sql_logger<F>(&mut self, logger: F)
    where
        F: Fn(&str, &Params) + Send + 'static,
    {
        self.sql_logger = Some(Box::new(logger));
    }

    pub fn clear_sql_logger(&mut self) {
        self.sql_logger = None;
    }

    /// Register a table. Unless the database is trusted, the backing file is
    /// brought up to date first: missing tables are created and missing
    /// columns added. Nothing is ever dropped or altered.
    pub fn add_table(&mut self, mut table: TableSchema) -> Result<()> {
        if self.has_table(table.name()) {
            return Err(SqliteError::TableAlreadyExists(table.name().to_string()));
        }

        table.ensure_identity_column();

        if self.trust_backing_database {
            debug!("trusting backing database for table {}", table.name());
        } else {
            SchemaReconciler::new(self).reconcile(&table)?;
        }

        table.freeze();
        self.tables.push(table);
        Ok(())
    }

    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t.matches(name))
    }

    /// Case-insensitive table lookup. A miss is an error.
    pub fn table(&self, name: &str) -> Result<Table<'_>> {
        self.find_table(name)
            .ok_or_else(|| SqliteError::TableNotFound(name.to_string()))
    }

    pub fn find_table(&self, name: &str) -> Option<Table<'_>> {
        self.tables
            .iter()
            .find(|t| t.matches(name))
            .map(|schema| Table::new(self, schema))
    }

    /// Typed read over every column of a registered table. `filter` defaults
    /// to `true` and `sort` to the table's identity column.
    pub fn typed_query(
        &self,
        table: &str,
        filter: Option<&str>,
        sort: Option<&str>,
        params: &Params,
    ) -> Result<TypedResultSet<'_>> {
        self.table(table)?.query(filter, sort, params)
    }

    /// Run a statement that returns no rows. Returns the number of rows changed.
    pub fn execute(&self, sql: &str, params: &Params) -> Result<usize> {
        self.run(sql, params)
            .map_err(|source| SqliteError::execution(sql, params, source))
    }

    /// Run a query and collect every row as raw engine values keyed by column name.
    pub fn query(&self, query: &SqlQuery) -> Result<Vec<HashMap<String, Value>>> {
        let fail = |source: rusqlite::Error| {
            SqliteError::execution(query.statement.as_str(), &query.params, source)
        };

        let mut stmt = self
            .prepare_bound(&query.statement, &query.params)
            .map_err(fail)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut result = Vec::new();
        let mut rows = stmt.raw_query();
        while let Some(row) = rows.next().map_err(fail)? {
            let mut map = HashMap::with_capacity(names.len());
            for (index, name) in names.iter().enumerate() {
                let raw = row.get_ref(index).map_err(fail)?;
                map.insert(name.clone(), Value::from(raw));
            }
            result.push(map);
        }
        Ok(result)
    }

    /// Whether a query produces at least one row.
    pub fn has_rows(&self, sql: &str, params: &Params) -> Result<bool> {
        self.probe(sql, params)
            .map_err(|source| SqliteError::execution(sql, params, source))
    }

    /// First column of the first row. No row, or a NULL, yields `T::default()`.
    pub fn scalar<T: FromSql + Default>(&self, sql: &str, params: &Params) -> Result<T> {
        let fail = |source: rusqlite::Error| SqliteError::execution(sql, params, source);

        let mut stmt = self.prepare_bound(sql, params).map_err(fail)?;
        let mut rows = stmt.raw_query();
        let value = match rows.next().map_err(fail)? {
            Some(row) => row.get::<_, Option<T>>(0).map_err(fail)?,
            None => None,
        };
        Ok(value.unwrap_or_default())
    }

    pub fn begin_transaction(&self, mode: TransactionMode) -> Result<()> {
        self.execute(mode.begin_sql(), &Params::new()).map(|_| ())
    }

    pub fn commit(&self) -> Result<()> {
        self.execute("COMMIT", &Params::new()).map(|_| ())
    }

    pub fn rollback(&self) -> Result<()> {
        self.execute("ROLLBACK", &Params::new()).map(|_| ())
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    pub fn transaction<R, F>(&self, mode: TransactionMode, f: F) -> Result<R>
    where
        F: FnOnce(&Self) -> Result<R>,
    {
        self.begin_transaction(mode)?;
        match f(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                self.rollback_quietly();
                Err(err)
            }
        }
    }

    pub(crate) fn rollback_quietly(&self) {
        if let Err(err) = self.run("ROLLBACK", &Params::new()) {
            warn!("rollback failed: {}", err);
        }
    }

    pub(crate) fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Prepare a statement and bind every parameter it references.
    pub(crate) fn prepare_bound(&self, sql: &str, params: &Params) -> rusqlite::Result<Statement<'_>> {
        if let Some(logger) = &self.sql_logger {
            logger(sql, params);
        }
        debug!("executing: {}", sql);

        let mut stmt = self.conn.prepare(sql)?;
        for (name, value) in params.iter() {
            if let Some(index) = parameter_index(&stmt, name)? {
                stmt.raw_bind_parameter(index, value)?;
            }
        }
        Ok(stmt)
    }

    pub(crate) fn run(&self, sql: &str, params: &Params) -> rusqlite::Result<usize> {
        let mut stmt = self.prepare_bound(sql, params)?;
        stmt.raw_execute()
    }

    pub(crate) fn probe(&self, sql: &str, params: &Params) -> rusqlite::Result<bool> {
        let mut stmt = self.prepare_bound(sql, params)?;
        let mut rows = stmt.raw_query();
        let found = rows.next()?.is_some();
        Ok(found)
    }
}

/// Find a named parameter, accepting keys with or without their prefix.
/// Parameters the statement does not mention are skipped.
fn parameter_index(stmt: &Statement<'_>, name: &str) -> rusqlite::Result<Option<usize>> {
    if name.starts_with(['@', ':', '$']) {
        return stmt.parameter_index(name);
    }
    for prefix in ['@', ':', '$'] {
        if let Some(index) = stmt.parameter_index(&format!("{}{}", prefix, name))? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_named_parameters_with_and_without_prefix() {
        let db = Database::open_in_memory().unwrap();
        db.execute("CREATE TABLE t (a INT, b TEXT)", &Params::new())
            .unwrap();
        let params = Params::new()
            .with_value("a", 5)
            .with_value("@b", "five")
            .with_value("unused", 1);
        db.execute("INSERT INTO t (a, b) VALUES (@a, @b)", &params)
            .unwrap();

        let b: String = db
            .scalar("SELECT b FROM t WHERE a = :a", &Params::new().with_value("a", 5))
            .unwrap();
        assert_eq!(b, "five");
    }

    #[test]
    fn test_scalar_defaults_on_null_or_no_row() {
        let db = Database::open_in_memory().unwrap();
        let none: i64 = db.scalar("SELECT NULL", &Params::new()).unwrap();
        assert_eq!(none, 0);
        let empty: String = db
            .scalar("SELECT 'x' WHERE 1 = 0", &Params::new())
            .unwrap();
        assert_eq!(empty, "");
    }

    #[test]
    fn test_execution_error_keeps_sql_and_params() {
        let db = Database::open_in_memory().unwrap();
        let params = Params::new().with_value("x", 1);
        match db.execute("INSERT INTO missing VALUES (@x)", &params) {
            Err(SqliteError::SqlExecution { sql, params: kept, .. }) => {
                assert_eq!(sql, "INSERT INTO missing VALUES (@x)");
                assert_eq!(kept, params);
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_query_returns_raw_rows() {
        let db = Database::open_in_memory().unwrap();
        let rows = db
            .query(&SqlQuery::new("SELECT 1 AS one, 'two' AS two, NULL AS three"))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["one"], Value::Integer(1));
        assert_eq!(rows[0]["two"], Value::Text("two".to_string()));
        assert_eq!(rows[0]["three"], Value::Null);
    }

    #[test]
    fn test_sql_logger_sees_statements() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut db = Database::open_in_memory().unwrap();
        let sink = seen.clone();
        db.set_sql_logger(move |sql, _| sink.lock().unwrap().push(sql.to_string()));

        db.execute("CREATE TABLE t (a INT)", &Params::new()).unwrap();
        assert_eq!(seen.lock().unwrap().as_slice(), ["CREATE TABLE t (a INT)"]);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        db.execute("CREATE TABLE t (a INT)", &Params::new()).unwrap();

        let result: Result<()> = db.transaction(TransactionMode::Immediate, |db| {
            db.execute("INSERT INTO t VALUES (1)", &Params::new())?;
            db.execute("INSERT INTO nowhere VALUES (1)", &Params::new())?;
            Ok(())
        });
        assert!(result.is_err());

        let count: i64 = db.scalar("SELECT COUNT(*) FROM t", &Params::new()).unwrap();
        assert_eq!(count, 0);
    }
}
