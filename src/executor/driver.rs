//! Database driver seam. The mapper hands SQL to a [`Driver`] and binds
//! values through the returned statement; wire protocols live elsewhere.

use crate::core::{Result, Value};
use crate::mapping::StatementHandle;
use crate::result::QueryResult;
use async_trait::async_trait;
use std::fmt;

#[async_trait]
pub trait Driver: Send + Sync + fmt::Debug {
    async fn prepare(&self, sql: &str) -> Result<Box<dyn PreparedStatement>>;
}

#[async_trait]
pub trait PreparedStatement: Send {
    /// Positional parameter writer of this statement.
    fn parameters(&mut self) -> &mut dyn StatementHandle;

    async fn query(&mut self) -> Result<QueryResult>;

    /// Returns the number of affected rows.
    async fn execute(&mut self) -> Result<u64>;

    /// Output parameter values after execution, one per declared binding.
    fn output_values(&self) -> Vec<Value> {
        Vec::new()
    }
}
