// ============================================================================
// sqlmapper Library
// ============================================================================

//! SQL mapping core: property access over application types, positional
//! parameter binding, pluggable result caching and result object
//! construction.
//!
//! ```ignore
//! let config = SqlMapConfig::builder()
//!     .bean::<Account>("Account")
//!     .json(&std::fs::read_to_string("accounts.json")?)?
//!     .build()?;
//! let client = SqlMapClient::new(config, driver);
//!
//! let mut session = client.session();
//! let account = session
//!     .query_for_object("Accounts.find", ParameterObject::from(&Value::Integer(7)))
//!     .await?;
//! ```

pub mod beans;
pub mod cache;
pub mod config;
pub mod core;
pub mod executor;
pub mod mapping;
pub mod result;

pub use beans::{Bean, ClassBuilder, ClassInfo, DynBean, ParameterObject, ParameterTarget};
pub use cache::{CacheController, CacheKey, CacheModel, CacheModelConfig, ControllerFactory};
pub use config::{SqlMapConfig, SqlMapDefinition};
pub use core::{DataType, MapperError, Result, SqlType, Value};
pub use executor::{Driver, PreparedStatement, Session, SqlMapClient};
pub use mapping::{
    ParameterMap, ParameterMapping, ResultFactoryContext, ResultObject, ResultObjectFactory,
    ResultType, StatementHandle,
};
pub use result::QueryResult;
