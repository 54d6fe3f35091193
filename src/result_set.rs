//! Typed materialization of query results.

use rusqlite::{Row, Rows, Statement};

use crate::column::IMPLICIT_IDENTITY_COLUMN_NAME;
use crate::error::{Result, SqliteError};
use crate::record::Record;
use crate::schema::TableSchema;
use crate::value::Params;

/// A prepared read over one table. Rows are decoded lazily, in a single
/// forward pass; once [`TypedResultSet::records`] has been consumed a second
/// call yields nothing.
pub struct TypedResultSet<'db> {
    schema: &'db TableSchema,
    stmt: Statement<'db>,
    sql: String,
    params: Params,
    consumed: bool,
}

impl<'db> TypedResultSet<'db> {
    pub(crate) fn new(
        schema: &'db TableSchema,
        stmt: Statement<'db>,
        sql: String,
        params: Params,
    ) -> Self {
        Self {
            schema,
            stmt,
            sql,
            params,
            consumed: false,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn records(&mut self) -> TypedRecords<'_> {
        let rows = if self.consumed {
            None
        } else {
            self.consumed = true;
            Some(self.stmt.raw_query())
        };
        TypedRecords {
            schema: self.schema,
            rows,
            sql: &self.sql,
            params: &self.params,
        }
    }

    /// Decode every row. A single bad row fails the whole read.
    pub fn collect_records(mut self) -> Result<Vec<Record>> {
        self.records().collect()
    }

    pub fn first(mut self) -> Result<Option<Record>> {
        self.records().next().transpose()
    }
}

/// Iterator over decoded rows. Stops after the first error.
pub struct TypedRecords<'s> {
    schema: &'s TableSchema,
    rows: Option<Rows<'s>>,
    sql: &'s str,
    params: &'s Params,
}

impl TypedRecords<'_> {
    fn decode(schema: &TableSchema, row: &Row<'_>) -> rusqlite::Result<Result<Record>> {
        let mut record = Record::new();
        if schema.uses_implicit_identity() {
            record.set(IMPLICIT_IDENTITY_COLUMN_NAME, row.get::<_, i64>(0)?);
        }
        for column in schema.columns() {
            let raw = row.get_ref(column.name())?;
            match column.from_raw(schema.name(), raw) {
                Ok(value) => record.set(column.name(), value),
                Err(err) => return Ok(Err(err)),
            }
        }
        Ok(Ok(record))
    }
}

impl Iterator for TypedRecords<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let rows = self.rows.as_mut()?;
        let step = match rows.next() {
            Ok(Some(row)) => Some(Self::decode(self.schema, row)),
            Ok(None) => None,
            Err(source) => Some(Err(source)),
        };

        let item = match step {
            None => None,
            Some(Ok(decoded)) => Some(decoded),
            Some(Err(source)) => Some(Err(SqliteError::execution(self.sql, self.params, source))),
        };
        if !matches!(item, Some(Ok(_))) {
            self.rows = None;
        }
        item
    }
}
