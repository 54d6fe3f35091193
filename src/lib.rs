//! Typed tables over SQLite.
//!
//! # Intention
//!
//! - Declare tables and typed columns in code and keep the backing database
//!   in step with those declarations: missing tables and columns are created,
//!   nothing is ever dropped.
//! - Read and write rows as typed records, with every value escaped through
//!   its column's codec.
//!
//! # Architectural Boundaries
//!
//! - Only SQLite/database code belongs here.
//! - One connection per [`Database`]; no pooling, no query DSL, no migrations
//!   with versions or rollback.
//!
//! ```no_run
//! use rust_sqlite_tables::{Column, Database, Record, TableSchema};
//!
//! # fn main() -> rust_sqlite_tables::Result<()> {
//! let mut db = Database::open_in_memory()?;
//! db.add_table(
//!     TableSchema::new("cars")
//!         .with_column(Column::text("name"))
//!         .with_column(Column::number("price")),
//! )?;
//!
//! let cars = db.table("cars")?;
//! let id = cars.add_record(&Record::new().with_value("name", "Porsche").with_value("price", 100000))?;
//! assert_eq!(cars.get_record(id)?.unwrap().get("name").unwrap().as_str(), Some("Porsche"));
//! # Ok(())
//! # }
//! ```

pub mod column;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod record;
pub mod result_set;
pub mod schema;
pub mod sqlite;
pub mod table;
pub mod value;

pub use column::{
    Column, ColumnConstraint, ColumnKind, DataType, NativeType, IDENTITY_COLUMN_NAME,
    IMPLICIT_IDENTITY_COLUMN_NAME,
};
pub use config::SqliteConfig;
pub use error::{ConversionKind, Result, SqliteError};
pub use reconcile::{DdlStatement, ReconciliationPlan, SchemaReconciler};
pub use record::Record;
pub use result_set::{TypedRecords, TypedResultSet};
pub use schema::{Schema, TableSchema};
pub use sqlite::{Database, TransactionMode};
pub use table::Table;
pub use value::{Params, SqlQuery, Value};
