//! Records and the write path that turns them into literal SQL.

use crate::column::Column;
use crate::error::{Result, SqliteError};
use crate::schema::TableSchema;
use crate::value::Value;

/// One row's worth of named values. Names are unique, compared case-insensitively.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Set a field, replacing any existing field of the same name.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
            Some(field) => field.1 = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            let name: String = name.into();
            record.set(&name, value);
        }
        record
    }
}

/// Resolve every field to its declared column, then encode the values.
/// All names are checked before any value is converted.
fn encode_fields<'s>(
    schema: &'s TableSchema,
    record: &Record,
) -> Result<Vec<(&'s Column, String)>> {
    let columns = record
        .iter()
        .map(|(name, _)| {
            let column = schema.column(name)?;
            if column.is_identity() {
                return Err(SqliteError::IdentityAssignment {
                    table: schema.name().to_string(),
                    column: column.name().to_string(),
                });
            }
            Ok(column)
        })
        .collect::<Result<Vec<_>>>()?;

    columns
        .into_iter()
        .zip(record.iter())
        .map(|(column, (_, value))| Ok((column, column.to_literal(schema.name(), value)?)))
        .collect()
}

/// Literal `INSERT` statement for one record.
pub fn build_insert(schema: &TableSchema, record: &Record) -> Result<String> {
    let fields = encode_fields(schema, record)?;
    if fields.is_empty() {
        return Ok(format!("INSERT INTO {} DEFAULT VALUES", schema.name()));
    }
    let names = fields
        .iter()
        .map(|(column, _)| column.name())
        .collect::<Vec<_>>()
        .join(", ");
    let values = fields
        .iter()
        .map(|(_, literal)| literal.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        schema.name(),
        names,
        values
    ))
}

/// Literal `UPDATE` statement. `where_clause` is trusted SQL and may carry
/// named parameters bound by the caller.
pub fn build_update(schema: &TableSchema, record: &Record, where_clause: &str) -> Result<String> {
    let fields = encode_fields(schema, record)?;
    if fields.is_empty() {
        return Err(SqliteError::EmptyRecord(schema.name().to_string()));
    }
    let assignments = fields
        .iter()
        .map(|(column, literal)| format!("{} = {}", column.name(), literal))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!(
        "UPDATE {} SET {} WHERE {}",
        schema.name(),
        assignments,
        where_clause
    ))
}
