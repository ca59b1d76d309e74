//! Serialized form of a mapping file.

use crate::cache::Properties;
use crate::core::{MapperError, Result};
use crate::mapping::ParameterMode;
use serde::Deserialize;
use std::time::Duration;

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParameterDefinition {
    pub property: String,
    #[serde(default)]
    pub jdbc_type: Option<String>,
    #[serde(default)]
    pub null_value: Option<String>,
    #[serde(default)]
    pub type_handler: Option<String>,
    #[serde(default)]
    pub mode: ParameterMode,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParameterMapDefinition {
    pub id: String,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct FlushIntervalDefinition {
    #[serde(default)]
    pub hours: u64,
    #[serde(default)]
    pub minutes: u64,
    #[serde(default)]
    pub seconds: u64,
    #[serde(default)]
    pub milliseconds: u64,
}

impl FlushIntervalDefinition {
    pub fn total(&self) -> Result<Duration> {
        let millis = self
            .hours
            .checked_mul(3_600_000)
            .and_then(|h| self.minutes.checked_mul(60_000).and_then(|m| h.checked_add(m)))
            .and_then(|t| self.seconds.checked_mul(1_000).and_then(|s| t.checked_add(s)))
            .and_then(|t| t.checked_add(self.milliseconds))
            .ok_or_else(|| MapperError::Configuration("Flush interval is too large".to_string()))?;

        if millis < 1 {
            return Err(MapperError::Configuration(
                "A flush interval must specify one or more of milliseconds, seconds, minutes or hours."
                    .to_string(),
            ));
        }
        Ok(Duration::from_millis(millis))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CacheModelDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub controller_type: String,
    #[serde(default = "default_true")]
    pub read_only: bool,
    #[serde(default)]
    pub serialize: bool,
    #[serde(default)]
    pub flush_interval: Option<FlushIntervalDefinition>,
    #[serde(default)]
    pub flush_on_execute: Vec<String>,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Procedure,
}

impl StatementKind {
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Select | Self::Procedure)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatementDefinition {
    pub id: String,
    pub kind: StatementKind,
    pub sql: String,
    #[serde(default)]
    pub parameter_map: Option<String>,
    #[serde(default)]
    pub parameter_class: Option<String>,
    #[serde(default)]
    pub result_map: Option<String>,
    #[serde(default)]
    pub result_class: Option<String>,
    #[serde(default)]
    pub cache_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultMappingDefinition {
    pub property: String,
    pub column: String,
    #[serde(default)]
    pub select: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultMapDefinition {
    pub id: String,
    pub class: String,
    #[serde(default)]
    pub results: Vec<ResultMappingDefinition>,
}

/// One mapping file. Ids are qualified with `namespace` when it is set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SqlMapDefinition {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default = "default_true")]
    pub cache_models_enabled: bool,
    #[serde(default)]
    pub parameter_maps: Vec<ParameterMapDefinition>,
    #[serde(default)]
    pub result_maps: Vec<ResultMapDefinition>,
    #[serde(default)]
    pub cache_models: Vec<CacheModelDefinition>,
    #[serde(default)]
    pub statements: Vec<StatementDefinition>,
}

impl SqlMapDefinition {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// `namespace.id` unless `id` is already qualified.
    pub fn qualify(&self, id: &str) -> String {
        match &self.namespace {
            Some(ns) if !id.contains('.') => format!("{}.{}", ns, id),
            _ => id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_interval_total() {
        let interval = FlushIntervalDefinition {
            hours: 1,
            minutes: 2,
            seconds: 3,
            milliseconds: 4,
        };
        assert_eq!(interval.total().unwrap(), Duration::from_millis(3_723_004));
        let err = FlushIntervalDefinition::default().total().unwrap_err();
        assert!(err.to_string().contains("one or more of milliseconds"));
    }

    #[test]
    fn test_parse_defaults() {
        let json = r#"{
            "namespace": "Orders",
            "cache_models": [{ "id": "orderCache", "type": "LRU" }],
            "statements": [{ "id": "find", "kind": "select", "sql": "SELECT 1" }]
        }"#;
        let def = SqlMapDefinition::from_json(json).unwrap();
        assert!(def.cache_models_enabled);
        assert!(def.cache_models[0].read_only);
        assert!(!def.cache_models[0].serialize);
        assert_eq!(def.statements[0].kind, StatementKind::Select);
        assert_eq!(def.qualify("find"), "Orders.find");
        assert_eq!(def.qualify("Other.find"), "Other.find");
    }

    #[test]
    fn test_malformed_json_is_configuration_error() {
        let err = SqlMapDefinition::from_json("{ \"statements\": 3 }").unwrap_err();
        assert!(err.is_configuration());
    }
}
