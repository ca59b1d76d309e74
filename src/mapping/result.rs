//! Result object construction and row materialization.
//!
//! Every statement execution runs inside a frame of a
//! [`ResultFactoryContext`]. The frame names the statement and the
//! [`ResultObjectFactory`] (if any) that should build its result objects.
//! Nested sub-selects push their own frame on the same context.

use crate::beans::{ClassRef, DynBean};
use crate::core::{MapperError, Result, Value};
use crate::result::QueryResult;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::debug;

/// Requested shape of a result object.
#[derive(Clone)]
pub enum ResultType {
    /// Ordered collection.
    List,
    /// Any collection; built as a list.
    Collection,
    /// Unique set.
    Set,
    Map,
    Bean(ClassRef),
    Scalar,
}

impl ResultType {
    pub fn name(&self) -> &str {
        match self {
            Self::List => "list",
            Self::Collection => "collection",
            Self::Set => "set",
            Self::Map => "map",
            Self::Bean(class) => class.name(),
            Self::Scalar => "scalar",
        }
    }
}

impl fmt::Debug for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResultType({})", self.name())
    }
}

#[derive(Debug, Clone)]
pub enum ResultObject {
    List(Vec<ResultObject>),
    Set(HashSet<Value>),
    Map(HashMap<String, Value>),
    Bean(Box<dyn DynBean>),
    Scalar(Value),
}

impl ResultObject {
    /// Assigns `value` to `property`. Collections append, scalars are
    /// replaced.
    pub fn set(&mut self, property: &str, value: Value) -> Result<()> {
        match self {
            Self::List(items) => items.push(Self::Scalar(value)),
            Self::Set(items) => {
                items.insert(value);
            }
            Self::Map(map) => {
                map.insert(property.to_string(), value);
            }
            Self::Bean(bean) => bean.set_property(property, value)?,
            Self::Scalar(slot) => *slot = value,
        }
        Ok(())
    }

    pub fn get(&self, property: &str) -> Result<Value> {
        match self {
            Self::Map(map) => Ok(map.get(property).cloned().unwrap_or(Value::Null)),
            Self::Bean(bean) => bean.get_property(property),
            Self::Scalar(value) => Ok(value.clone()),
            Self::List(_) | Self::Set(_) => Err(MapperError::Binding(format!(
                "Cannot read property '{}' of a collection result",
                property
            ))),
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_bean(&self) -> Option<&dyn DynBean> {
        match self {
            Self::Bean(bean) => Some(bean.as_ref()),
            _ => None,
        }
    }

    pub fn into_bean<T: crate::beans::Bean>(self) -> Option<T> {
        match self {
            Self::Bean(bean) => bean.downcast_ref::<T>().cloned(),
            _ => None,
        }
    }
}

/// Pluggable construction of result objects.
pub trait ResultObjectFactory: Send + Sync + fmt::Debug {
    /// Returns `None` to defer to built-in construction.
    fn create_instance(&self, statement_id: &str, result_type: &ResultType) -> Option<ResultObject>;
}

#[derive(Debug, Clone)]
struct Frame {
    statement_id: String,
    factory: Option<Arc<dyn ResultObjectFactory>>,
}

/// Per-execution stack of factory frames.
///
/// One context belongs to one session; it is never shared between
/// concurrently running statements.
#[derive(Debug, Default)]
pub struct ResultFactoryContext {
    frames: Vec<Frame>,
}

impl ResultFactoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, factory: Option<Arc<dyn ResultObjectFactory>>, statement_id: &str) {
        self.frames.push(Frame {
            statement_id: statement_id.to_string(),
            factory,
        });
    }

    /// Popping an empty stack does nothing.
    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn current_factory(&self) -> Option<Arc<dyn ResultObjectFactory>> {
        self.frames.last().and_then(|f| f.factory.clone())
    }

    pub fn current_statement_id(&self) -> Option<&str> {
        self.frames.last().map(|f| f.statement_id.as_str())
    }

    /// Pushes a frame that is popped when the returned scope is dropped,
    /// including on early return and unwinding.
    pub fn enter(
        &mut self,
        factory: Option<Arc<dyn ResultObjectFactory>>,
        statement_id: &str,
    ) -> FactoryScope<'_> {
        self.push(factory, statement_id);
        FactoryScope { context: self }
    }

    pub fn create(&self, result_type: &ResultType) -> ResultObject {
        if let Some(frame) = self.frames.last() {
            if let Some(factory) = &frame.factory {
                if let Some(object) = factory.create_instance(&frame.statement_id, result_type) {
                    return object;
                }
                debug!(
                    statement = %frame.statement_id,
                    result_type = result_type.name(),
                    "Result factory declined, using built-in construction"
                );
            }
        }
        Self::build(result_type)
    }

    fn build(result_type: &ResultType) -> ResultObject {
        match result_type {
            ResultType::List | ResultType::Collection => ResultObject::List(Vec::new()),
            ResultType::Set => ResultObject::Set(HashSet::new()),
            ResultType::Map => ResultObject::Map(HashMap::new()),
            ResultType::Bean(class) => ResultObject::Bean(class.instantiate()),
            ResultType::Scalar => ResultObject::Scalar(Value::Null),
        }
    }
}

/// Guard for one frame of a [`ResultFactoryContext`].
pub struct FactoryScope<'a> {
    context: &'a mut ResultFactoryContext,
}

impl Deref for FactoryScope<'_> {
    type Target = ResultFactoryContext;

    fn deref(&self) -> &Self::Target {
        self.context
    }
}

impl DerefMut for FactoryScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.context
    }
}

impl Drop for FactoryScope<'_> {
    fn drop(&mut self) {
        self.context.pop();
    }
}

/// Maps one column to one property, or runs a nested statement for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMapping {
    pub property: String,
    pub column: String,
    pub select: Option<String>,
}

impl ResultMapping {
    pub fn new(property: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            column: column.into(),
            select: None,
        }
    }

    /// The column value becomes the parameter of `statement_id`.
    pub fn with_select(mut self, statement_id: impl Into<String>) -> Self {
        self.select = Some(statement_id.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ResultMap {
    id: String,
    result_type: ResultType,
    mappings: Vec<ResultMapping>,
}

impl ResultMap {
    pub fn new(id: impl Into<String>, result_type: ResultType, mappings: Vec<ResultMapping>) -> Self {
        Self {
            id: id.into(),
            result_type,
            mappings,
        }
    }

    /// Maps every column onto the property of the same name.
    pub fn implicit(id: impl Into<String>, result_type: ResultType) -> Self {
        Self::new(id, result_type, Vec::new())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn result_type(&self) -> &ResultType {
        &self.result_type
    }

    pub fn mappings(&self) -> &[ResultMapping] {
        &self.mappings
    }

    pub fn nested_selects(&self) -> impl Iterator<Item = &ResultMapping> {
        self.mappings.iter().filter(|m| m.select.is_some())
    }

    /// Builds the object for `row` through the context's active factory and
    /// fills every plain (non-select) mapping.
    pub fn materialize(
        &self,
        context: &ResultFactoryContext,
        result: &QueryResult,
        row: usize,
    ) -> Result<ResultObject> {
        let values = result.rows.get(row).ok_or_else(|| {
            MapperError::Execution(format!(
                "Result map '{}' asked for row {} of {}",
                self.id,
                row,
                result.row_count()
            ))
        })?;

        let mut object = context.create(&self.result_type);

        if let ResultObject::Scalar(slot) = &mut object {
            let value = match self.mappings.first() {
                Some(mapping) => self.column_value(result, values, &mapping.column)?,
                None => values.first().cloned().unwrap_or(Value::Null),
            };
            *slot = value;
            return Ok(object);
        }

        if self.mappings.is_empty() {
            for (column, value) in result.columns.iter().zip(values) {
                object.set(column, value.clone())?;
            }
            return Ok(object);
        }

        for mapping in self.mappings.iter().filter(|m| m.select.is_none()) {
            let value = self.column_value(result, values, &mapping.column)?;
            object.set(&mapping.property, value)?;
        }
        Ok(object)
    }

    /// Raw column value of `row` feeding a nested select.
    pub fn select_parameter(&self, result: &QueryResult, row: usize, mapping: &ResultMapping) -> Result<Value> {
        let values = result.rows.get(row).ok_or_else(|| {
            MapperError::Execution(format!("Result map '{}' has no row {}", self.id, row))
        })?;
        self.column_value(result, values, &mapping.column)
    }

    fn column_value(&self, result: &QueryResult, values: &[Value], column: &str) -> Result<Value> {
        let index = result.column_index(column).ok_or_else(|| {
            MapperError::Binding(format!(
                "Result map '{}' references column '{}' which is not in the result set",
                self.id, column
            ))
        })?;
        Ok(values.get(index).cloned().unwrap_or(Value::Null))
    }
}
