//! Mapping configuration: JSON definitions resolved into shared, immutable
//! statements, maps and cache models.

pub mod definition;
pub mod sql_map;
pub mod statement;

pub use definition::{
    CacheModelDefinition, FlushIntervalDefinition, ParameterDefinition, ParameterMapDefinition,
    ResultMapDefinition, ResultMappingDefinition, SqlMapDefinition, StatementDefinition,
    StatementKind,
};
pub use sql_map::{SqlMapConfig, SqlMapConfigBuilder};
pub use statement::MappedStatement;
