use super::{Bean, DynBean};
use crate::core::{MapperError, Result, Value};
use std::collections::HashMap;

/// Input object of a statement: a bean, a keyed container, a positional
/// array or a single scalar.
#[derive(Debug, Clone, Copy)]
pub enum ParameterObject<'a> {
    None,
    Scalar(&'a Value),
    Map(&'a HashMap<String, Value>),
    Array(&'a [Value]),
    Bean(&'a dyn DynBean),
}

impl<'a> ParameterObject<'a> {
    pub fn bean<T: Bean>(bean: &'a T) -> Self {
        Self::Bean(bean)
    }

    /// Reads the value bound to `name`, declared at `position` (0-based).
    ///
    /// A scalar input binds itself to every position; missing map keys and
    /// array slots read as `Null`.
    pub fn value_of(&self, name: &str, position: usize) -> Result<Value> {
        match self {
            Self::None => Ok(Value::Null),
            Self::Scalar(value) => Ok((*value).clone()),
            Self::Map(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
            Self::Array(values) => Ok(values.get(position).cloned().unwrap_or(Value::Null)),
            Self::Bean(bean) => bean.get_property(name),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Scalar(_) => "scalar",
            Self::Map(_) => "map",
            Self::Array(_) => "array",
            Self::Bean(_) => "bean",
        }
    }
}

impl<'a> From<&'a HashMap<String, Value>> for ParameterObject<'a> {
    fn from(map: &'a HashMap<String, Value>) -> Self {
        Self::Map(map)
    }
}

impl<'a> From<&'a [Value]> for ParameterObject<'a> {
    fn from(values: &'a [Value]) -> Self {
        Self::Array(values)
    }
}

impl<'a> From<&'a Vec<Value>> for ParameterObject<'a> {
    fn from(values: &'a Vec<Value>) -> Self {
        Self::Array(values.as_slice())
    }
}

impl<'a> From<&'a Value> for ParameterObject<'a> {
    fn from(value: &'a Value) -> Self {
        Self::Scalar(value)
    }
}

/// Writable view of an input object, used to copy output parameters back.
#[derive(Debug)]
pub enum ParameterTarget<'a> {
    Map(&'a mut HashMap<String, Value>),
    Array(&'a mut Vec<Value>),
    Bean(&'a mut dyn DynBean),
}

impl<'a> ParameterTarget<'a> {
    pub fn bean<T: Bean>(bean: &'a mut T) -> Self {
        Self::Bean(bean)
    }

    /// Read view of the same object.
    pub fn as_object(&self) -> ParameterObject<'_> {
        match self {
            Self::Map(map) => ParameterObject::Map(map),
            Self::Array(values) => ParameterObject::Array(values.as_slice()),
            Self::Bean(bean) => ParameterObject::Bean(&**bean),
        }
    }

    pub fn write(&mut self, name: &str, position: usize, value: Value) -> Result<()> {
        match self {
            Self::Map(map) => {
                map.insert(name.to_string(), value);
                Ok(())
            }
            Self::Array(values) => {
                let slot = values.get_mut(position).ok_or_else(|| {
                    MapperError::Binding(format!(
                        "Output parameter '{}' at position {} is outside the parameter array",
                        name,
                        position + 1
                    ))
                })?;
                *slot = value;
                Ok(())
            }
            Self::Bean(bean) => bean.set_property(name, value),
        }
    }
}
