//! CRUD over one registered table.

use crate::column::Column;
use crate::error::{Result, SqliteError};
use crate::record::{build_insert, build_update, Record};
use crate::result_set::TypedResultSet;
use crate::schema::TableSchema;
use crate::sqlite::Database;
use crate::value::{Params, Value};

const LAST_SEQUENCE_SQL: &str = "SELECT seq FROM sqlite_sequence WHERE name = @name";

/// A registered table borrowed together with the database it lives in.
#[derive(Clone, Copy)]
pub struct Table<'db> {
    db: &'db Database,
    schema: &'db TableSchema,
}

impl<'db> Table<'db> {
    pub(crate) fn new(db: &'db Database, schema: &'db TableSchema) -> Self {
        Self { db, schema }
    }

    pub fn name(&self) -> &'db str {
        self.schema.name()
    }

    pub fn schema(&self) -> &'db TableSchema {
        self.schema
    }

    pub fn column(&self, name: &str) -> Result<&'db Column> {
        self.schema.column(name)
    }

    pub fn find_column(&self, name: &str) -> Option<&'db Column> {
        self.schema.find_column(name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.schema.has_column(name)
    }

    pub fn user_columns(&self) -> impl Iterator<Item = &'db Column> {
        self.schema.user_columns()
    }

    /// Insert one record and return its identity.
    pub fn add_record(&self, record: &Record) -> Result<i64> {
        let sql = build_insert(self.schema, record)?;
        self.db.execute(&sql, &Params::new())?;
        self.last_insert_id()
    }

    /// Insert positional values, one per user column in declaration order.
    pub fn add_record_values<I, V>(&self, values: I) -> Result<i64>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        let columns: Vec<&Column> = self.user_columns().collect();
        if columns.len() != values.len() {
            return Err(SqliteError::ColumnCountMismatch {
                table: self.name().to_string(),
                expected: columns.len(),
                got: values.len(),
            });
        }

        let record: Record = columns
            .into_iter()
            .map(Column::name)
            .zip(values)
            .collect();
        self.add_record(&record)
    }

    pub fn update_record(&self, record: &Record, id: i64) -> Result<usize> {
        let (filter, params) = self.identity_filter(id);
        self.update_record_where(record, &filter, &params)
    }

    /// Update every row matching `where_clause`. The clause is trusted SQL;
    /// only the record's values are escaped.
    pub fn update_record_where(
        &self,
        record: &Record,
        where_clause: &str,
        params: &Params,
    ) -> Result<usize> {
        let sql = build_update(self.schema, record, where_clause)?;
        self.db.execute(&sql, params)
    }

    pub fn update_value(&self, column: &str, value: impl Into<Value>, id: i64) -> Result<usize> {
        self.update_record(&Record::new().with_value(column, value), id)
    }

    pub fn delete_record(&self, id: i64) -> Result<usize> {
        let (filter, params) = self.identity_filter(id);
        let sql = format!("DELETE FROM {} WHERE {}", self.name(), filter);
        self.db.execute(&sql, &params)
    }

    pub fn get_record(&self, id: i64) -> Result<Option<Record>> {
        let (filter, params) = self.identity_filter(id);
        self.query(Some(&filter), None, &params)?.first()
    }

    pub fn record_count(&self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.name());
        self.db.scalar(&sql, &Params::new())
    }

    /// Most recent identity assigned in this table. Implicit-identity tables
    /// have no autoincrement bookkeeping and report the connection's last
    /// inserted row id instead.
    pub fn last_insert_id(&self) -> Result<i64> {
        if self.schema.uses_implicit_identity() {
            return Ok(self.db.last_insert_rowid());
        }
        let params = Params::new().with_value("name", self.name());
        self.db.scalar(LAST_SEQUENCE_SQL, &params)
    }

    /// Select every column, decoded per the declaration. `filter` defaults to
    /// `true` and `sort` to the identity column; both are trusted SQL.
    pub fn query(
        &self,
        filter: Option<&str>,
        sort: Option<&str>,
        params: &Params,
    ) -> Result<TypedResultSet<'db>> {
        let projection = if self.schema.uses_implicit_identity() {
            "ROWID, *"
        } else {
            "*"
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {}",
            projection,
            self.name(),
            filter.unwrap_or("true"),
            sort.unwrap_or(self.schema.identity_column_name())
        );
        let stmt = self
            .db
            .prepare_bound(&sql, params)
            .map_err(|source| SqliteError::execution(sql.as_str(), params, source))?;
        Ok(TypedResultSet::new(self.schema, stmt, sql, params.clone()))
    }

    fn identity_filter(&self, id: i64) -> (String, Params) {
        let column = self.schema.identity_column_name();
        (
            format!("{0} = @{0}", column),
            Params::new().with_value(column, id),
        )
    }
}
