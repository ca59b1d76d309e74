use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Could not set property '{property}' to value '{value}' of class {class}: expected {expected}")]
    TypeMismatch {
        property: String,
        value: String,
        expected: String,
        class: String,
    },

    #[error("Binding error: {0}")]
    Binding(String),

    #[error("Cache backend error: {0}")]
    CacheBackend(String),

    #[error("Cache backend timed out after {0:?}")]
    CacheTimeout(Duration),

    #[error("Vendor probe failed: {0}")]
    VendorProbe(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

pub type Result<T> = std::result::Result<T, MapperError>;

impl MapperError {
    /// Errors raised while loading mappings; never recovered.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Errors a cache model swallows and turns into a miss or a no-op.
    pub fn is_cache_backend(&self) -> bool {
        matches!(
            self,
            Self::CacheBackend(_) | Self::CacheTimeout(_) | Self::Serialization(_)
        )
    }
}

impl<T> From<std::sync::PoisonError<T>> for MapperError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}

impl From<serde_json::Error> for MapperError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(format!("Malformed mapping definition: {}", err))
    }
}

impl From<rmp_serde::encode::Error> for MapperError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for MapperError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
