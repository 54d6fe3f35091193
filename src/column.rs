//! Column declarations and the per-kind value codec.
//!
//! A [`Column`] turns native [`Value`]s into SQL literal fragments on the way
//! in, and raw engine cells back into its native type on the way out.

use std::fmt;
use std::num::IntErrorKind;

use chrono::{Datelike, NaiveDateTime};
use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};

use crate::error::{ConversionKind, Result, SqliteError};
use crate::value::{parse_datetime, Value, ENGINE_DATETIME_FORMAT, LITERAL_DATETIME_FORMAT};

/// Name of the explicit identity column every non-implicit table carries.
pub const IDENTITY_COLUMN_NAME: &str = "id";
/// Name of SQLite's built-in row identity.
pub const IMPLICIT_IDENTITY_COLUMN_NAME: &str = "ROWID";
/// Literal written for absent values.
pub const NULL_LITERAL: &str = "null";

/// The closed set of column kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Text,
    Number,
    Date,
    Identity,
}

impl ColumnKind {
    /// Storage type used in DDL.
    pub fn data_type(self) -> DataType {
        match self {
            ColumnKind::Text | ColumnKind::Date => DataType::Text,
            ColumnKind::Number => DataType::Int,
            ColumnKind::Identity => DataType::Integer,
        }
    }

    /// Native type values of this kind are read back as.
    pub fn native_type(self) -> NativeType {
        match self {
            ColumnKind::Text => NativeType::String,
            ColumnKind::Number | ColumnKind::Identity => NativeType::Integer,
            ColumnKind::Date => NativeType::DateTime,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Integer,
    Int,
    Text,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => write!(f, "INTEGER"),
            DataType::Int => write!(f, "INT"),
            DataType::Text => write!(f, "TEXT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeType {
    String,
    Integer,
    DateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnConstraint {
    PrimaryKey,
    Autoincrement,
    NotNull,
    Unique,
    /// Any other constraint fragment, written verbatim.
    Custom(String),
}

impl fmt::Display for ColumnConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnConstraint::PrimaryKey => write!(f, "PRIMARY KEY"),
            ColumnConstraint::Autoincrement => write!(f, "AUTOINCREMENT"),
            ColumnConstraint::NotNull => write!(f, "NOT NULL"),
            ColumnConstraint::Unique => write!(f, "UNIQUE"),
            ColumnConstraint::Custom(sql) => write!(f, "{}", sql),
        }
    }
}

/// Serialized form of a column, as it appears in configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub kind: ColumnKind,
    #[serde(default)]
    pub constraints: Vec<ColumnConstraint>,
}

impl From<ColumnDefinition> for Column {
    fn from(def: ColumnDefinition) -> Self {
        let column = Column::new(def.name, def.kind);
        if column.kind == ColumnKind::Identity {
            return column;
        }
        def.constraints
            .into_iter()
            .fold(column, |column, constraint| column.with_constraint(constraint))
    }
}

/// A typed column. Immutable once built into a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ColumnDefinition")]
pub struct Column {
    name: String,
    kind: ColumnKind,
    constraints: Vec<ColumnConstraint>,
}

impl Column {
    /// Build a column of any kind. Identity columns always get the fixed
    /// identity name and `PRIMARY KEY AUTOINCREMENT`, whatever name is passed.
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Identity => Self::identity(),
            _ => Self {
                name: name.into(),
                kind,
                constraints: Vec::new(),
            },
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Text)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Number)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, ColumnKind::Date)
    }

    pub fn identity() -> Self {
        Self {
            name: IDENTITY_COLUMN_NAME.to_string(),
            kind: ColumnKind::Identity,
            constraints: vec![ColumnConstraint::PrimaryKey, ColumnConstraint::Autoincrement],
        }
    }

    pub fn with_constraint(mut self, constraint: ColumnConstraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ColumnKind {
        self.kind
    }

    pub fn constraints(&self) -> &[ColumnConstraint] {
        &self.constraints
    }

    pub fn is_identity(&self) -> bool {
        self.kind == ColumnKind::Identity
    }

    pub(crate) fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Column fragment for `CREATE TABLE` and `ADD COLUMN`.
    pub fn ddl(&self) -> String {
        let constraints = self
            .constraints
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} {} {}", self.name, self.kind.data_type(), constraints)
            .trim_end()
            .to_string()
    }

    /// Convert a native value to an escaped SQL literal for this column.
    pub fn to_literal(&self, table: &str, value: &Value) -> Result<String> {
        if value.is_null() {
            return Ok(NULL_LITERAL.to_string());
        }
        let literal = match self.kind {
            ColumnKind::Text => coerce_text(value).map(|text| quote(&text)),
            ColumnKind::Number | ColumnKind::Identity => coerce_integer(value).map(|v| v.to_string()),
            ColumnKind::Date => coerce_datetime(value)
                .map(|dt| format!("datetime('{}')", dt.format(LITERAL_DATETIME_FORMAT))),
        };
        literal.map_err(|kind| self.conversion_error(table, value, kind))
    }

    /// Convert a raw engine cell to this column's native type.
    ///
    /// NULL cells become `0` for integer columns and the default timestamp
    /// for date columns; text columns keep them as [`Value::Null`].
    pub fn from_raw(&self, table: &str, raw: ValueRef<'_>) -> Result<Value> {
        let decoded = match (self.kind.native_type(), raw) {
            (NativeType::String, ValueRef::Null) => Ok(Value::Null),
            (NativeType::Integer, ValueRef::Null) => Ok(Value::Integer(0)),
            (NativeType::DateTime, ValueRef::Null) => Ok(Value::DateTime(NaiveDateTime::default())),
            (NativeType::String, ValueRef::Text(bytes)) => std::str::from_utf8(bytes)
                .map(|text| Value::Text(text.to_string()))
                .map_err(|_| ConversionKind::Format),
            (NativeType::String, ValueRef::Integer(v)) => Ok(Value::Text(v.to_string())),
            (NativeType::String, ValueRef::Real(v)) => Ok(Value::Text(v.to_string())),
            (NativeType::Integer, raw) => coerce_integer(&Value::from(raw)).map(Value::Integer),
            (NativeType::DateTime, ValueRef::Text(_)) => {
                coerce_datetime(&Value::from(raw)).map(Value::DateTime)
            }
            _ => Err(ConversionKind::InvalidCast),
        };
        decoded.map_err(|kind| self.conversion_error(table, &Value::from(raw), kind))
    }

    fn conversion_error(&self, table: &str, value: &Value, kind: ConversionKind) -> SqliteError {
        SqliteError::ValueConversion {
            table: table.to_string(),
            column: self.name.clone(),
            value: value.truncated(),
            kind,
        }
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn coerce_text(value: &Value) -> std::result::Result<String, ConversionKind> {
    match value {
        Value::Text(v) if v.contains('\0') => Err(ConversionKind::Format),
        Value::Text(v) => Ok(v.clone()),
        Value::Integer(v) => Ok(v.to_string()),
        Value::Real(v) => Ok(v.to_string()),
        Value::Boolean(v) => Ok(v.to_string()),
        Value::DateTime(v) => Ok(v.format(ENGINE_DATETIME_FORMAT).to_string()),
        Value::Null | Value::Blob(_) => Err(ConversionKind::InvalidCast),
    }
}

fn coerce_integer(value: &Value) -> std::result::Result<i64, ConversionKind> {
    match value {
        Value::Integer(v) => Ok(*v),
        Value::Boolean(v) => Ok(i64::from(*v)),
        Value::Real(v) => real_to_integer(*v),
        Value::Text(v) => v.trim().parse::<i64>().map_err(|e| match e.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => ConversionKind::Overflow,
            _ => ConversionKind::Format,
        }),
        Value::Null | Value::Blob(_) | Value::DateTime(_) => Err(ConversionKind::InvalidCast),
    }
}

fn real_to_integer(v: f64) -> std::result::Result<i64, ConversionKind> {
    // Halves go to the even neighbour: 2.5 -> 2, 3.5 -> 4.
    let rounded = v.round_ties_even();
    if rounded.is_nan() || rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
        return Err(ConversionKind::Overflow);
    }
    Ok(rounded as i64)
}

fn coerce_datetime(value: &Value) -> std::result::Result<NaiveDateTime, ConversionKind> {
    let parsed = match value {
        Value::DateTime(v) => *v,
        Value::Text(v) => parse_datetime(v).ok_or(ConversionKind::Format)?,
        _ => return Err(ConversionKind::InvalidCast),
    };
    // SQLite's date functions only understand four-digit years.
    if !(0..=9999).contains(&parsed.year()) {
        return Err(ConversionKind::Overflow);
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_date() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(1971, 9, 3)
            .unwrap()
            .and_hms_opt(19, 5, 0)
            .unwrap()
    }

    #[test]
    fn test_text_literal_escapes_quotes() {
        let column = Column::text("name");
        assert_eq!(
            column.to_literal("people", &Value::from("O'Brien")).unwrap(),
            "'O''Brien'"
        );
        assert_eq!(column.to_literal("people", &Value::from(42)).unwrap(), "'42'");
        assert_eq!(column.to_literal("people", &Value::Null).unwrap(), "null");
    }

    #[test]
    fn test_text_rejects_blobs() {
        let err = Column::text("name")
            .to_literal("people", &Value::Blob(vec![1, 2, 3]))
            .unwrap_err();
        assert!(matches!(
            err,
            SqliteError::ValueConversion { kind: ConversionKind::InvalidCast, .. }
        ));
    }

    #[test]
    fn test_text_rejects_nul() {
        let err = Column::text("name")
            .to_literal("people", &Value::from("abc\0def"))
            .unwrap_err();
        assert!(matches!(
            err,
            SqliteError::ValueConversion { kind: ConversionKind::Format, .. }
        ));
    }

    #[test]
    fn test_number_literal() {
        let column = Column::number("price");
        assert_eq!(column.to_literal("cars", &Value::from(100000)).unwrap(), "100000");
        assert_eq!(column.to_literal("cars", &Value::from(" 12 ")).unwrap(), "12");
        assert_eq!(column.to_literal("cars", &Value::from(2.6)).unwrap(), "3");
        assert_eq!(column.to_literal("cars", &Value::from(2.5)).unwrap(), "2");
        assert_eq!(column.to_literal("cars", &Value::from(3.5)).unwrap(), "4");
        assert_eq!(column.to_literal("cars", &Value::from(-2.5)).unwrap(), "-2");
        assert_eq!(column.to_literal("cars", &Value::from(true)).unwrap(), "1");
        assert_eq!(column.to_literal("cars", &Value::Null).unwrap(), "null");
    }

    #[test]
    fn test_number_conversion_failures() {
        let column = Column::number("price");
        match column.to_literal("cars", &Value::from("blah")).unwrap_err() {
            SqliteError::ValueConversion { column, value, kind, .. } => {
                assert_eq!(column, "price");
                assert_eq!(value, "blah");
                assert_eq!(kind, ConversionKind::Format);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = column
            .to_literal("cars", &Value::from("99999999999999999999"))
            .unwrap_err();
        assert!(matches!(
            err,
            SqliteError::ValueConversion { kind: ConversionKind::Overflow, .. }
        ));

        let err = column.to_literal("cars", &Value::from(f64::INFINITY)).unwrap_err();
        assert!(matches!(
            err,
            SqliteError::ValueConversion { kind: ConversionKind::Overflow, .. }
        ));

        let err = column
            .to_literal("cars", &Value::from(sample_date()))
            .unwrap_err();
        assert!(matches!(
            err,
            SqliteError::ValueConversion { kind: ConversionKind::InvalidCast, .. }
        ));
    }

    #[test]
    fn test_conversion_error_truncates_value() {
        let long = "z".repeat(120);
        match Column::number("price")
            .to_literal("cars", &Value::from(long))
            .unwrap_err()
        {
            SqliteError::ValueConversion { value, .. } => {
                assert_eq!(value, format!("{}...", "z".repeat(50)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_date_literal_uses_24_hour_clock() {
        let column = Column::date("created");
        assert_eq!(
            column.to_literal("posts", &Value::from(sample_date())).unwrap(),
            "datetime('1971-09-03T19:05:00')"
        );
        assert_eq!(
            column.to_literal("posts", &Value::from("1971-09-03")).unwrap(),
            "datetime('1971-09-03T00:00:00')"
        );
        assert!(column.to_literal("posts", &Value::from(5)).is_err());
    }

    #[test]
    fn test_date_outside_engine_range() {
        let column = Column::date("created");
        let far = NaiveDate::from_ymd_opt(10000, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let err = column.to_literal("posts", &Value::from(far)).unwrap_err();
        assert!(matches!(
            err,
            SqliteError::ValueConversion { kind: ConversionKind::Overflow, .. }
        ));

        let before = NaiveDate::from_ymd_opt(-1, 12, 31)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert!(column.to_literal("posts", &Value::from(before)).is_err());

        let last = NaiveDate::from_ymd_opt(9999, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        assert_eq!(
            column.to_literal("posts", &Value::from(last)).unwrap(),
            "datetime('9999-12-31T23:59:59')"
        );
    }

    #[test]
    fn test_from_raw_nulls_default_per_kind() {
        assert_eq!(
            Column::number("price").from_raw("cars", ValueRef::Null).unwrap(),
            Value::Integer(0)
        );
        assert_eq!(
            Column::date("created").from_raw("posts", ValueRef::Null).unwrap(),
            Value::DateTime(NaiveDateTime::default())
        );
        assert_eq!(
            Column::text("name").from_raw("cars", ValueRef::Null).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_from_raw_reads_engine_dates() {
        let value = Column::date("created")
            .from_raw("posts", ValueRef::Text(b"1971-09-03 19:05:00"))
            .unwrap();
        assert_eq!(value, Value::DateTime(sample_date()));
    }

    #[test]
    fn test_from_raw_rejects_garbage_numbers() {
        let err = Column::number("price")
            .from_raw("cars", ValueRef::Text(b"lots"))
            .unwrap_err();
        assert!(matches!(err, SqliteError::ValueConversion { .. }));
    }

    #[test]
    fn test_identity_is_normalized() {
        let column = Column::new("whatever", ColumnKind::Identity);
        assert_eq!(column.name(), IDENTITY_COLUMN_NAME);
        assert_eq!(column.ddl(), "id INTEGER PRIMARY KEY AUTOINCREMENT");
    }

    #[test]
    fn test_ddl_with_constraints() {
        let column = Column::text("email")
            .with_constraint(ColumnConstraint::Unique)
            .with_constraint(ColumnConstraint::NotNull);
        assert_eq!(column.ddl(), "email TEXT UNIQUE NOT NULL");
        assert_eq!(Column::number("age").ddl(), "age INT");
    }
}
