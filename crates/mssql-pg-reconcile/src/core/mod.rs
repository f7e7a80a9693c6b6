//! Core data model: typed values, rows, pages, keys, and name resolution.

pub mod compare;
pub mod row;
pub mod schema;
pub mod value;

pub use compare::values_equal;
pub use row::{Row, RowKey, RowPage};
pub use schema::{Dialect, SchemaMapper, TableSpec};
pub use value::SqlValue;
