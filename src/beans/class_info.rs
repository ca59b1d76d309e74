use super::{Bean, DynBean, PropertyValue};
use crate::core::{MapperError, PropertyType, Result, Value};
use lazy_static::lazy_static;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::debug;

type Getter<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;
type Setter<T> = Arc<dyn Fn(&mut T, Value) -> std::result::Result<(), Value> + Send + Sync>;

lazy_static! {
    static ref CLASS_INFO_CACHE: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>> =
        RwLock::new(HashMap::new());
}

/// Name and declared types of one property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub getter_type: Option<PropertyType>,
    pub setter_type: Option<PropertyType>,
}

impl PropertyDescriptor {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            getter_type: None,
            setter_type: None,
        }
    }

    pub fn is_readable(&self) -> bool {
        self.getter_type.is_some()
    }

    pub fn is_writable(&self) -> bool {
        self.setter_type.is_some()
    }
}

struct SetterDecl<T> {
    property_type: PropertyType,
    setter: Setter<T>,
}

/// Collects the accessors a [`Bean`] declares.
///
/// Several setters may be registered under one name; they are resolved when
/// the class is built.
pub struct ClassBuilder<T> {
    class_name: &'static str,
    getters: BTreeMap<String, (PropertyType, Getter<T>)>,
    setters: BTreeMap<String, Vec<SetterDecl<T>>>,
    duplicate_getters: Vec<String>,
}

impl<T: Bean> ClassBuilder<T> {
    fn new(class_name: &'static str) -> Self {
        Self {
            class_name,
            getters: BTreeMap::new(),
            setters: BTreeMap::new(),
            duplicate_getters: Vec::new(),
        }
    }

    pub fn getter<V, F>(&mut self, name: &str, get: F) -> &mut Self
    where
        V: PropertyValue,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.raw_getter(name, V::property_type(), move |bean| get(bean).to_value())
    }

    pub fn setter<V, F>(&mut self, name: &str, set: F) -> &mut Self
    where
        V: PropertyValue,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.raw_setter(name, V::property_type(), move |bean, value| {
            set(bean, V::from_value(value)?);
            Ok(())
        })
    }

    /// Registers a getter and a setter of the same type.
    pub fn property<V, G, S>(&mut self, name: &str, get: G, set: S) -> &mut Self
    where
        V: PropertyValue,
        G: Fn(&T) -> V + Send + Sync + 'static,
        S: Fn(&mut T, V) + Send + Sync + 'static,
    {
        self.getter(name, get).setter(name, set)
    }

    pub fn raw_getter<F>(&mut self, name: &str, property_type: PropertyType, get: F) -> &mut Self
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        let previous = self
            .getters
            .insert(name.to_string(), (property_type, Arc::new(get)));
        if previous.is_some() {
            self.duplicate_getters.push(name.to_string());
        }
        self
    }

    /// Registers a setter that receives values already coerced to
    /// `property_type`; returning `Err` hands back a value it cannot store.
    pub fn raw_setter<F>(&mut self, name: &str, property_type: PropertyType, set: F) -> &mut Self
    where
        F: Fn(&mut T, Value) -> std::result::Result<(), Value> + Send + Sync + 'static,
    {
        self.setters
            .entry(name.to_string())
            .or_default()
            .push(SetterDecl {
                property_type,
                setter: Arc::new(set),
            });
        self
    }

    fn build(self) -> Result<ClassInfo<T>> {
        let ClassBuilder {
            class_name,
            getters,
            setters,
            duplicate_getters,
        } = self;

        if let Some(name) = duplicate_getters.first() {
            return Err(MapperError::Configuration(format!(
                "Duplicate getter for property '{}' in class {}",
                name, class_name
            )));
        }

        let mut properties: BTreeMap<String, PropertyDescriptor> = BTreeMap::new();
        for (name, (getter_type, _)) in &getters {
            properties
                .entry(name.clone())
                .or_insert_with(|| PropertyDescriptor::new(name))
                .getter_type = Some(*getter_type);
        }

        let mut resolved = HashMap::with_capacity(setters.len());
        for (name, candidates) in setters {
            let getter_type = getters.get(&name).map(|(t, _)| *t);
            let chosen = resolve_setter(class_name, &name, candidates, getter_type)?;
            properties
                .entry(name.clone())
                .or_insert_with(|| PropertyDescriptor::new(&name))
                .setter_type = Some(chosen.property_type);
            resolved.insert(name, chosen);
        }

        Ok(ClassInfo {
            class_name,
            properties,
            getters: getters.into_iter().map(|(n, (_, g))| (n, g)).collect(),
            setters: resolved,
        })
    }
}

/// Picks one setter among overloads sharing a property name.
///
/// The candidates' argument types must be pairwise related (one assignable
/// to the other). Among them the getter's type wins, else the most specific.
fn resolve_setter<T>(
    class_name: &str,
    name: &str,
    mut candidates: Vec<SetterDecl<T>>,
    getter_type: Option<PropertyType>,
) -> Result<SetterDecl<T>> {
    if candidates.len() == 1 {
        return Ok(candidates.remove(0));
    }

    for (i, a) in candidates.iter().enumerate() {
        for b in &candidates[i + 1..] {
            let related = a.property_type.is_assignable_from(&b.property_type)
                || b.property_type.is_assignable_from(&a.property_type);
            if !related {
                return Err(MapperError::Configuration(format!(
                    "Illegal overloaded setter method with ambiguous type for property '{}' in class {}",
                    name, class_name
                )));
            }
        }
    }

    let position = getter_type
        .and_then(|expected| {
            candidates
                .iter()
                .position(|c| c.property_type == expected)
        })
        .unwrap_or_else(|| {
            let mut best = 0;
            for (i, candidate) in candidates.iter().enumerate().skip(1) {
                if candidates[best]
                    .property_type
                    .is_assignable_from(&candidate.property_type)
                {
                    best = i;
                }
            }
            best
        });

    Ok(candidates.swap_remove(position))
}

/// Validated, cached property table of one [`Bean`] type.
pub struct ClassInfo<T> {
    class_name: &'static str,
    properties: BTreeMap<String, PropertyDescriptor>,
    getters: HashMap<String, Getter<T>>,
    setters: HashMap<String, SetterDecl<T>>,
}

impl<T: Bean> ClassInfo<T> {
    /// Returns the shared table for `T`, building it on first use.
    ///
    /// Concurrent first calls may each build a table; only the first one
    /// inserted is kept and returned to every caller.
    pub fn of() -> Result<Arc<Self>> {
        let type_id = TypeId::of::<T>();

        let cached = CLASS_INFO_CACHE.read()?.get(&type_id).cloned();
        if let Some(entry) = cached {
            return Self::downcast(entry);
        }

        let built: Arc<dyn Any + Send + Sync> = Arc::new(Self::build()?);
        let shared = CLASS_INFO_CACHE
            .write()?
            .entry(type_id)
            .or_insert(built)
            .clone();
        Self::downcast(shared)
    }

    fn build() -> Result<Self> {
        let mut builder = ClassBuilder::new(<T as Bean>::class_name());
        T::declare(&mut builder);
        let info = builder.build()?;
        debug!(
            class = info.class_name,
            properties = info.properties.len(),
            "Resolved class properties"
        );
        Ok(info)
    }

    fn downcast(entry: Arc<dyn Any + Send + Sync>) -> Result<Arc<Self>> {
        entry.downcast::<Self>().map_err(|_| {
            MapperError::Configuration(format!(
                "Cached class info for {} has an unexpected type",
                <T as Bean>::class_name()
            ))
        })
    }

    pub fn get(&self, bean: &T, name: &str) -> Result<Value> {
        let getter = self.getters.get(name).ok_or_else(|| {
            MapperError::Binding(format!(
                "There is no READABLE property named '{}' in class '{}'",
                name, self.class_name
            ))
        })?;
        Ok(getter(bean))
    }

    /// Assigns `value`, coercing it to the declared setter type first.
    pub fn set(&self, bean: &mut T, name: &str, value: Value) -> Result<()> {
        let decl = self.setters.get(name).ok_or_else(|| {
            MapperError::Binding(format!(
                "There is no WRITEABLE property named '{}' in class '{}'",
                name, self.class_name
            ))
        })?;

        let mismatch = |rejected: Value| MapperError::TypeMismatch {
            property: name.to_string(),
            value: rejected.render(),
            expected: decl.property_type.to_string(),
            class: self.class_name.to_string(),
        };

        let coerced = decl.property_type.coerce(value).map_err(mismatch)?;
        (decl.setter)(bean, coerced).map_err(mismatch)
    }

    pub fn getter_type(&self, name: &str) -> Option<PropertyType> {
        self.properties.get(name).and_then(|p| p.getter_type)
    }

    pub fn setter_type(&self, name: &str) -> Option<PropertyType> {
        self.properties.get(name).and_then(|p| p.setter_type)
    }
}

/// Type-erased view of a [`ClassInfo`], used where the concrete bean type
/// is only known from configuration.
pub trait ClassMeta: Send + Sync {
    fn name(&self) -> &str;
    fn bean_type_id(&self) -> TypeId;
    fn property(&self, name: &str) -> Option<&PropertyDescriptor>;
    fn properties(&self) -> Vec<&PropertyDescriptor>;
    fn instantiate(&self) -> Box<dyn DynBean>;

    fn readable_property_names(&self) -> Vec<&str> {
        self.properties()
            .into_iter()
            .filter(|p| p.is_readable())
            .map(|p| p.name.as_str())
            .collect()
    }

    fn writable_property_names(&self) -> Vec<&str> {
        self.properties()
            .into_iter()
            .filter(|p| p.is_writable())
            .map(|p| p.name.as_str())
            .collect()
    }
}

pub type ClassRef = Arc<dyn ClassMeta>;

impl<T: Bean> ClassMeta for ClassInfo<T> {
    fn name(&self) -> &str {
        self.class_name
    }

    fn bean_type_id(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(name)
    }

    fn properties(&self) -> Vec<&PropertyDescriptor> {
        self.properties.values().collect()
    }

    fn instantiate(&self) -> Box<dyn DynBean> {
        Box::new(T::default())
    }
}

impl fmt::Debug for dyn ClassMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassMeta").field("name", &self.name()).finish()
    }
}
