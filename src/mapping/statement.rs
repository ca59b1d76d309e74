//! Collaborator interfaces of the database driver.
//!
//! The engine never talks to a wire protocol. It only writes positional
//! values into a [`StatementHandle`] and, for the null-handling probe, reads
//! product identifiers through [`ConnectionMetadata`].

use crate::core::{Result, SqlType, Value};

/// Product identifiers reported by a connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionMetadata {
    pub database_product_name: String,
    pub driver_name: String,
}

impl ConnectionMetadata {
    pub fn new(database_product_name: impl Into<String>, driver_name: impl Into<String>) -> Self {
        Self {
            database_product_name: database_product_name.into(),
            driver_name: driver_name.into(),
        }
    }
}

/// A prepared command accepting positional values. Positions are 1-based.
pub trait StatementHandle: Send {
    fn set_value(&mut self, index: usize, value: &Value, sql_type: Option<SqlType>) -> Result<()>;

    /// Typed SQL NULL.
    fn set_null(&mut self, index: usize, sql_type: SqlType) -> Result<()>;

    /// Untyped "set object to null", for drivers that reject typed NULLs
    /// without a concrete type.
    fn set_object_null(&mut self, index: usize) -> Result<()>;

    /// May fail when the driver does not expose metadata.
    fn connection_metadata(&self) -> Result<ConnectionMetadata>;
}
