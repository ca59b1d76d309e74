use super::statement::StatementHandle;
use crate::core::{DataType, MapperError, Result, SqlType, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Writes one parameter value and understands the literal form of its type.
pub trait TypeHandler: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn set_parameter(
        &self,
        stmt: &mut dyn StatementHandle,
        index: usize,
        value: &Value,
        sql_type: Option<SqlType>,
    ) -> Result<()>;

    /// Parses a configuration literal (e.g. a null sentinel) into a value.
    fn value_of(&self, literal: &str) -> Result<Value>;

    /// True when `value` is the value `literal` denotes for this type.
    fn equals(&self, value: &Value, literal: &str) -> bool {
        if value.is_null() {
            return false;
        }
        match self.value_of(literal) {
            Ok(parsed) => parsed == *value,
            Err(_) => false,
        }
    }

    /// Custom handlers are handed nulls and own their null semantics.
    fn is_custom(&self) -> bool {
        false
    }
}

/// Built-in handler for one value kind.
#[derive(Debug, Clone, Copy)]
pub struct StandardTypeHandler {
    data_type: DataType,
}

impl StandardTypeHandler {
    pub const fn new(data_type: DataType) -> Self {
        Self { data_type }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }
}

impl TypeHandler for StandardTypeHandler {
    fn name(&self) -> &str {
        match self.data_type {
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Text => "text",
            DataType::Boolean => "boolean",
            DataType::Any => "object",
        }
    }

    fn set_parameter(
        &self,
        stmt: &mut dyn StatementHandle,
        index: usize,
        value: &Value,
        sql_type: Option<SqlType>,
    ) -> Result<()> {
        if !self.data_type.is_compatible(value) {
            return Err(MapperError::Binding(format!(
                "Parameter {} expects {} but the value '{}' is {}",
                index,
                self.data_type,
                value.render(),
                value.type_name()
            )));
        }
        stmt.set_value(index, value, sql_type)
    }

    fn value_of(&self, literal: &str) -> Result<Value> {
        let parse_error = |reason: String| {
            MapperError::Configuration(format!(
                "Cannot read '{}' as a {} literal: {}",
                literal, self.data_type, reason
            ))
        };
        match self.data_type {
            DataType::Integer => literal
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|e| parse_error(e.to_string())),
            DataType::Float => literal
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|e| parse_error(e.to_string())),
            DataType::Boolean => literal
                .trim()
                .parse::<bool>()
                .map(Value::Boolean)
                .map_err(|e| parse_error(e.to_string())),
            DataType::Text | DataType::Any => Ok(Value::Text(literal.to_string())),
        }
    }

    fn equals(&self, value: &Value, literal: &str) -> bool {
        match self.data_type {
            DataType::Any => !value.is_null() && value.to_string() == literal,
            DataType::Float => match (value.as_f64(), self.value_of(literal)) {
                (Some(number), Ok(Value::Float(sentinel))) => number == sentinel,
                _ => false,
            },
            _ => !value.is_null() && self.value_of(literal).is_ok_and(|v| v == *value),
        }
    }
}

/// Positional writer handed to a [`TypeHandlerCallback`].
pub struct ParameterSetter<'a> {
    stmt: &'a mut dyn StatementHandle,
    index: usize,
    sql_type: Option<SqlType>,
}

impl<'a> ParameterSetter<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn sql_type(&self) -> Option<SqlType> {
        self.sql_type
    }

    pub fn set_value(&mut self, value: &Value) -> Result<()> {
        self.stmt.set_value(self.index, value, self.sql_type)
    }

    pub fn set_null(&mut self, sql_type: SqlType) -> Result<()> {
        self.stmt.set_null(self.index, sql_type)
    }
}

/// User-supplied conversion for a parameter, registered by name.
pub trait TypeHandlerCallback: Send + Sync + fmt::Debug {
    fn set_parameter(&self, setter: &mut ParameterSetter<'_>, value: &Value) -> Result<()>;

    fn value_of(&self, literal: &str) -> Value;
}

#[derive(Debug, Clone)]
pub struct CustomTypeHandler {
    name: String,
    callback: Arc<dyn TypeHandlerCallback>,
}

impl CustomTypeHandler {
    pub fn new(name: impl Into<String>, callback: Arc<dyn TypeHandlerCallback>) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }
}

impl TypeHandler for CustomTypeHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_parameter(
        &self,
        stmt: &mut dyn StatementHandle,
        index: usize,
        value: &Value,
        sql_type: Option<SqlType>,
    ) -> Result<()> {
        let mut setter = ParameterSetter {
            stmt,
            index,
            sql_type,
        };
        self.callback.set_parameter(&mut setter, value)
    }

    fn value_of(&self, literal: &str) -> Result<Value> {
        Ok(self.callback.value_of(literal))
    }

    fn is_custom(&self) -> bool {
        true
    }
}

/// Standard handlers by value kind plus custom handlers by name.
#[derive(Debug, Clone)]
pub struct TypeHandlerRegistry {
    standard: HashMap<DataType, Arc<dyn TypeHandler>>,
    custom: HashMap<String, Arc<dyn TypeHandler>>,
}

impl TypeHandlerRegistry {
    pub fn new() -> Self {
        let standard = [
            DataType::Integer,
            DataType::Float,
            DataType::Text,
            DataType::Boolean,
            DataType::Any,
        ]
        .into_iter()
        .map(|dt| {
            let handler: Arc<dyn TypeHandler> = Arc::new(StandardTypeHandler::new(dt));
            (dt, handler)
        })
        .collect();

        Self {
            standard,
            custom: HashMap::new(),
        }
    }

    pub fn register_callback(
        &mut self,
        name: impl Into<String>,
        callback: Arc<dyn TypeHandlerCallback>,
    ) -> &mut Self {
        let name = name.into();
        let handler: Arc<dyn TypeHandler> = Arc::new(CustomTypeHandler::new(name.clone(), callback));
        self.custom.insert(name, handler);
        self
    }

    pub fn custom(&self, name: &str) -> Result<Arc<dyn TypeHandler>> {
        self.custom.get(name).cloned().ok_or_else(|| {
            MapperError::Configuration(format!("Unknown type handler '{}'", name))
        })
    }

    pub fn standard(&self, data_type: DataType) -> Arc<dyn TypeHandler> {
        match self.standard.get(&data_type) {
            Some(handler) => Arc::clone(handler),
            None => Arc::new(StandardTypeHandler::new(data_type)),
        }
    }

    /// Handler for a binding, preferring the declared property type over the
    /// column type.
    pub fn resolve(&self, property_type: Option<DataType>, sql_type: Option<SqlType>) -> Arc<dyn TypeHandler> {
        let data_type = property_type
            .or_else(|| sql_type.map(|t| t.data_type()))
            .unwrap_or(DataType::Any);
        self.standard(data_type)
    }
}

impl Default for TypeHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_sentinel_equality() {
        let handler = StandardTypeHandler::new(DataType::Integer);
        assert!(handler.equals(&Value::Integer(-9999), "-9999"));
        assert!(!handler.equals(&Value::Integer(1), "-9999"));
        assert!(!handler.equals(&Value::Null, "-9999"));
        assert!(!handler.equals(&Value::Integer(1), "not a number"));
    }

    #[test]
    fn test_float_sentinel_matches_whole_numbers() {
        let handler = StandardTypeHandler::new(DataType::Float);
        assert!(handler.equals(&Value::Float(-1.0), "-1"));
        assert!(handler.equals(&Value::Integer(-1), "-1.0"));
        assert!(!handler.equals(&Value::Float(-0.5), "-1"));
    }

    #[test]
    fn test_object_handler_compares_literal_text() {
        let handler = StandardTypeHandler::new(DataType::Any);
        assert!(handler.equals(&Value::Integer(-1), "-1"));
        assert!(handler.equals(&Value::from("N/A"), "N/A"));
    }

    #[test]
    fn test_value_of_rejects_bad_literal() {
        let handler = StandardTypeHandler::new(DataType::Boolean);
        assert_eq!(handler.value_of("true").unwrap(), Value::Boolean(true));
        assert!(handler.value_of("yes").unwrap_err().is_configuration());
    }

    #[test]
    fn test_registry_resolution() {
        let registry = TypeHandlerRegistry::new();
        assert_eq!(registry.resolve(None, Some(SqlType::Varchar)).name(), "text");
        assert_eq!(registry.resolve(Some(DataType::Integer), Some(SqlType::Varchar)).name(), "integer");
        assert_eq!(registry.resolve(None, None).name(), "object");
        assert!(registry.custom("missing").is_err());
    }
}
