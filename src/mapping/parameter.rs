use super::null_probe::{NullValueProbe, NullWrite};
use super::statement::StatementHandle;
use super::type_handler::{StandardTypeHandler, TypeHandler};
use crate::beans::{ParameterObject, ParameterTarget};
use crate::cache::CacheKey;
use crate::core::{DataType, MapperError, Result, SqlType, Value};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ParameterMode {
    #[default]
    In,
    Out,
    InOut,
}

impl ParameterMode {
    pub fn is_input_allowed(&self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }

    pub fn is_output_allowed(&self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }
}

/// One property-to-placeholder binding.
#[derive(Debug, Clone)]
pub struct ParameterMapping {
    property: String,
    sql_type: Option<SqlType>,
    null_value: Option<String>,
    type_handler: Arc<dyn TypeHandler>,
    mode: ParameterMode,
}

impl ParameterMapping {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            sql_type: None,
            null_value: None,
            type_handler: Arc::new(StandardTypeHandler::new(DataType::Any)),
            mode: ParameterMode::In,
        }
    }

    pub fn sql_type(mut self, sql_type: SqlType) -> Self {
        self.sql_type = Some(sql_type);
        self
    }

    /// Literal that stands for SQL NULL, compared through the type handler.
    pub fn null_value(mut self, literal: impl Into<String>) -> Self {
        self.null_value = Some(literal.into());
        self
    }

    pub fn type_handler(mut self, handler: Arc<dyn TypeHandler>) -> Self {
        self.type_handler = handler;
        self
    }

    pub fn mode(mut self, mode: ParameterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn property(&self) -> &str {
        &self.property
    }

    pub fn declared_sql_type(&self) -> Option<SqlType> {
        self.sql_type
    }

    pub fn declared_null_value(&self) -> Option<&str> {
        self.null_value.as_deref()
    }

    pub fn handler(&self) -> &Arc<dyn TypeHandler> {
        &self.type_handler
    }

    pub fn parameter_mode(&self) -> ParameterMode {
        self.mode
    }
}

/// Ordered bindings for one statement's input.
///
/// Position is declaration order; value `i` is written at placeholder
/// `i + 1`.
pub struct ParameterMap {
    id: String,
    parameter_class: Option<String>,
    mappings: Vec<ParameterMapping>,
    index: HashMap<String, usize>,
    null_probe: Arc<NullValueProbe>,
}

impl ParameterMap {
    pub fn new(id: impl Into<String>, mappings: Vec<ParameterMapping>) -> Self {
        let index = mappings
            .iter()
            .enumerate()
            .map(|(i, m)| (m.property.clone(), i))
            .collect();

        Self {
            id: id.into(),
            parameter_class: None,
            mappings,
            index,
            null_probe: Arc::new(NullValueProbe::default()),
        }
    }

    pub fn with_parameter_class(mut self, class: impl Into<String>) -> Self {
        self.parameter_class = Some(class.into());
        self
    }

    /// Shares one probe decision across every map built by a configuration.
    pub fn with_null_probe(mut self, probe: Arc<NullValueProbe>) -> Self {
        self.null_probe = probe;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parameter_class(&self) -> Option<&str> {
        self.parameter_class.as_deref()
    }

    pub fn mappings(&self) -> &[ParameterMapping] {
        &self.mappings
    }

    pub fn parameter_index(&self, property: &str) -> Option<usize> {
        self.index.get(property).copied()
    }

    pub fn parameter_count(&self) -> usize {
        self.mappings.len()
    }

    /// Extracts one value per binding, in declaration order.
    pub fn values_of(&self, input: ParameterObject<'_>) -> Result<Vec<Value>> {
        self.mappings
            .iter()
            .enumerate()
            .map(|(position, mapping)| {
                if mapping.mode.is_input_allowed() {
                    input.value_of(&mapping.property, position)
                } else {
                    Ok(Value::Null)
                }
            })
            .collect()
    }

    /// Writes `values` (as returned by [`values_of`](Self::values_of)) into
    /// the statement, skipping output-only bindings.
    pub fn bind(&self, stmt: &mut dyn StatementHandle, values: &[Value]) -> Result<()> {
        if values.len() != self.mappings.len() {
            return Err(MapperError::Binding(format!(
                "Parameter map '{}' declares {} parameters but {} values were supplied",
                self.id,
                self.mappings.len(),
                values.len()
            )));
        }

        for (position, (mapping, value)) in self.mappings.iter().zip(values).enumerate() {
            if mapping.mode.is_input_allowed() {
                self.bind_one(stmt, mapping, value, position + 1)
                    .map_err(|e| self.annotate(mapping, e))?;
            }
        }
        Ok(())
    }

    fn bind_one(
        &self,
        stmt: &mut dyn StatementHandle,
        mapping: &ParameterMapping,
        value: &Value,
        index: usize,
    ) -> Result<()> {
        let handler = &mapping.type_handler;
        let null = Value::Null;

        let value = match &mapping.null_value {
            Some(sentinel) if handler.equals(value, sentinel) => &null,
            _ => value,
        };

        if !value.is_null() {
            return handler.set_parameter(stmt, index, value, mapping.sql_type);
        }

        if handler.is_custom() {
            return handler.set_parameter(stmt, index, value, mapping.sql_type);
        }

        if let Some(sql_type) = mapping.sql_type {
            return stmt.set_null(index, sql_type);
        }

        match self.null_probe.resolve(stmt) {
            NullWrite::SetObjectNull => stmt.set_object_null(index),
            NullWrite::TypedNull(sql_type) => stmt.set_null(index, sql_type),
        }
    }

    fn annotate(&self, mapping: &ParameterMapping, err: MapperError) -> MapperError {
        match err {
            MapperError::Binding(msg) => MapperError::Binding(format!(
                "{} (parameter map '{}', property '{}')",
                msg, self.id, mapping.property
            )),
            other => other,
        }
    }

    /// Key identifying one execution of `statement_id` with these values.
    pub fn cache_key(&self, statement_id: &str, values: &[Value]) -> CacheKey {
        let mut key = CacheKey::new();
        key.update_str(statement_id);
        self.extend_key(&mut key, values);
        key
    }

    /// Appends the bound values to a key started by the caller.
    pub fn extend_key(&self, key: &mut CacheKey, values: &[Value]) {
        for value in values {
            key.update_value(value);
        }
    }

    pub fn cache_key_for(&self, statement_id: &str, input: ParameterObject<'_>) -> Result<CacheKey> {
        let values = self.values_of(input)?;
        Ok(self.cache_key(statement_id, &values))
    }

    /// Copies output values back into the input object.
    pub fn refresh_values(&self, target: &mut ParameterTarget<'_>, values: &[Value]) -> Result<()> {
        for (position, (mapping, value)) in self.mappings.iter().zip(values).enumerate() {
            if mapping.mode.is_output_allowed() {
                target.write(&mapping.property, position, value.clone())?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ParameterMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterMap")
            .field("id", &self.id)
            .field("parameter_class", &self.parameter_class)
            .field("mappings", &self.mappings)
            .finish()
    }
}
