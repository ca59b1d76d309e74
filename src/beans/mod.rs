//! Property access over application data types.
//!
//! A type opts in by implementing [`Bean`] and declaring its readable and
//! writable properties once through a [`ClassBuilder`]. The resulting
//! [`ClassInfo`] is built lazily, validated (overloaded setters must not be
//! ambiguous) and cached for the lifetime of the process.

pub mod class_info;
pub mod probe;

pub use class_info::{ClassBuilder, ClassInfo, ClassMeta, ClassRef, PropertyDescriptor};
pub use probe::{ParameterObject, ParameterTarget};

use crate::core::{DataType, PropertyType, Result, Value};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A data type whose properties can be read and written by name.
pub trait Bean: Any + Send + Sync + Clone + fmt::Debug + Default {
    /// Registers getters and setters. Called once per type.
    fn declare(class: &mut ClassBuilder<Self>);

    fn class_name() -> &'static str {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// Object-safe view of a [`Bean`] instance.
pub trait DynBean: Send + Sync + fmt::Debug {
    fn class_name(&self) -> &'static str;
    fn get_property(&self, name: &str) -> Result<Value>;
    fn set_property(&mut self, name: &str, value: Value) -> Result<()>;
    fn describe(&self) -> Result<ClassRef>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn clone_bean(&self) -> Box<dyn DynBean>;
}

impl<T: Bean> DynBean for T {
    fn class_name(&self) -> &'static str {
        <T as Bean>::class_name()
    }

    fn get_property(&self, name: &str) -> Result<Value> {
        ClassInfo::<T>::of()?.get(self, name)
    }

    fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        ClassInfo::<T>::of()?.set(self, name, value)
    }

    fn describe(&self) -> Result<ClassRef> {
        let info: ClassRef = ClassInfo::<T>::of()?;
        Ok(info)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_bean(&self) -> Box<dyn DynBean> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn DynBean> {
    fn clone(&self) -> Self {
        self.clone_bean()
    }
}

impl dyn DynBean {
    pub fn downcast_ref<T: Bean>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Bean>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

/// Rust types that can back a bean property.
pub trait PropertyValue: Sized + Send + Sync + 'static {
    fn property_type() -> PropertyType;
    fn to_value(&self) -> Value;
    /// Returns the value back when it does not fit `Self`.
    fn from_value(value: Value) -> std::result::Result<Self, Value>;
}

impl PropertyValue for i64 {
    fn property_type() -> PropertyType {
        PropertyType::primitive(DataType::Integer)
    }

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Integer(i) => Ok(i),
            other => Err(other),
        }
    }
}

impl PropertyValue for i32 {
    fn property_type() -> PropertyType {
        PropertyType::primitive(DataType::Integer)
    }

    fn to_value(&self) -> Value {
        Value::Integer(i64::from(*self))
    }

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Integer(i) => i32::try_from(i).map_err(|_| Value::Integer(i)),
            other => Err(other),
        }
    }
}

impl PropertyValue for f64 {
    fn property_type() -> PropertyType {
        PropertyType::primitive(DataType::Float)
    }

    fn to_value(&self) -> Value {
        Value::Float(*self)
    }

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Float(f) => Ok(f),
            Value::Integer(i) => Ok(i as f64),
            other => Err(other),
        }
    }
}

impl PropertyValue for bool {
    fn property_type() -> PropertyType {
        PropertyType::primitive(DataType::Boolean)
    }

    fn to_value(&self) -> Value {
        Value::Boolean(*self)
    }

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Boolean(b) => Ok(b),
            other => Err(other),
        }
    }
}

impl PropertyValue for String {
    fn property_type() -> PropertyType {
        PropertyType::primitive(DataType::Text)
    }

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(other),
        }
    }
}

impl PropertyValue for Value {
    fn property_type() -> PropertyType {
        PropertyType::any()
    }

    fn to_value(&self) -> Value {
        self.clone()
    }

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        Ok(value)
    }
}

impl<V: PropertyValue> PropertyValue for Option<V> {
    fn property_type() -> PropertyType {
        PropertyType::nullable(V::property_type().data_type)
    }

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, PropertyValue::to_value)
    }

    fn from_value(value: Value) -> std::result::Result<Self, Value> {
        match value {
            Value::Null => Ok(None),
            other => V::from_value(other).map(Some),
        }
    }
}

/// Looks up the cached class description of `T`, building it on first use.
pub fn class_ref<T: Bean>() -> Result<ClassRef> {
    let info: Arc<ClassInfo<T>> = ClassInfo::<T>::of()?;
    Ok(info)
}
