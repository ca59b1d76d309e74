use super::definition::{
    CacheModelDefinition, ParameterMapDefinition, ResultMapDefinition, SqlMapDefinition,
    StatementDefinition, StatementKind,
};
use super::statement::MappedStatement;
use crate::beans::{Bean, ClassRef, class_ref};
use crate::cache::{CacheModel, CacheModelConfig, ControllerFactory};
use crate::core::{DataType, MapperError, Result, SqlType};
use crate::mapping::{
    NullValueProbe, ParameterMap, ParameterMapping, ResultMap, ResultMapping, ResultObjectFactory,
    ResultType, TypeHandler, TypeHandlerCallback, TypeHandlerRegistry, VendorQuirks,
};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

lazy_static::lazy_static! {
    /// `#property#` or `#property:SQLTYPE#` inside statement SQL.
    static ref INLINE_PARAMETER: Regex = Regex::new(r"#(\w+)(?::(\w+))?#").unwrap();
}

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

type ClassResolver = fn() -> Result<ClassRef>;

/// Every resolved statement, map and cache model of an application.
pub struct SqlMapConfig {
    statements: HashMap<String, Arc<MappedStatement>>,
    parameter_maps: HashMap<String, Arc<ParameterMap>>,
    result_maps: HashMap<String, Arc<ResultMap>>,
    cache_models: HashMap<String, Arc<CacheModel>>,
    flush_triggers: HashMap<String, Vec<Arc<CacheModel>>>,
    result_factory: Option<Arc<dyn ResultObjectFactory>>,
    null_probe: Arc<NullValueProbe>,
    cache_models_enabled: bool,
}

impl SqlMapConfig {
    pub fn builder() -> SqlMapConfigBuilder {
        SqlMapConfigBuilder::new()
    }

    pub fn statement(&self, id: &str) -> Result<Arc<MappedStatement>> {
        self.statements.get(id).cloned().ok_or_else(|| {
            MapperError::Configuration(format!("There is no statement named {} in this SqlMap.", id))
        })
    }

    pub fn parameter_map(&self, id: &str) -> Option<Arc<ParameterMap>> {
        self.parameter_maps.get(id).cloned()
    }

    pub fn result_map(&self, id: &str) -> Option<Arc<ResultMap>> {
        self.result_maps.get(id).cloned()
    }

    pub fn cache_model(&self, id: &str) -> Option<Arc<CacheModel>> {
        self.cache_models.get(id).cloned()
    }

    pub fn cache_models(&self) -> impl Iterator<Item = &Arc<CacheModel>> {
        self.cache_models.values()
    }

    pub fn statement_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.statements.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Models flushed whenever `statement_id` executes.
    pub fn flush_triggers(&self, statement_id: &str) -> &[Arc<CacheModel>] {
        self.flush_triggers
            .get(statement_id)
            .map_or(&[], Vec::as_slice)
    }

    pub fn result_factory(&self) -> Option<Arc<dyn ResultObjectFactory>> {
        self.result_factory.clone()
    }

    pub fn null_probe(&self) -> &Arc<NullValueProbe> {
        &self.null_probe
    }

    pub fn cache_models_enabled(&self) -> bool {
        self.cache_models_enabled
    }
}

impl fmt::Debug for SqlMapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlMapConfig")
            .field("statements", &self.statement_ids())
            .field("cache_models", &self.cache_models.keys().collect::<Vec<_>>())
            .field("cache_models_enabled", &self.cache_models_enabled)
            .finish()
    }
}

/// Collects definitions and registrations, then resolves them in one pass.
pub struct SqlMapConfigBuilder {
    definitions: Vec<SqlMapDefinition>,
    classes: HashMap<String, ClassResolver>,
    type_handlers: TypeHandlerRegistry,
    controllers: ControllerFactory,
    result_factory: Option<Arc<dyn ResultObjectFactory>>,
    vendor_quirks: VendorQuirks,
    cache_models_enabled: bool,
    lenient_classes: bool,
}

impl SqlMapConfigBuilder {
    pub fn new() -> Self {
        Self {
            definitions: Vec::new(),
            classes: HashMap::new(),
            type_handlers: TypeHandlerRegistry::new(),
            controllers: ControllerFactory::new(),
            result_factory: None,
            vendor_quirks: VendorQuirks::default(),
            cache_models_enabled: true,
            lenient_classes: false,
        }
    }

    pub fn definition(mut self, definition: SqlMapDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn json(self, json: &str) -> Result<Self> {
        Ok(self.definition(SqlMapDefinition::from_json(json)?))
    }

    /// Makes `T` available to definitions under `alias`. Its property
    /// table is validated when the configuration is built.
    pub fn bean<T: Bean>(mut self, alias: &str) -> Self {
        self.classes.insert(alias.to_string(), class_ref::<T>);
        self
    }

    pub fn type_handler(mut self, name: &str, callback: Arc<dyn TypeHandlerCallback>) -> Self {
        self.type_handlers.register_callback(name, callback);
        self
    }

    pub fn controllers(mut self, controllers: ControllerFactory) -> Self {
        self.controllers = controllers;
        self
    }

    pub fn result_object_factory(mut self, factory: Arc<dyn ResultObjectFactory>) -> Self {
        self.result_factory = Some(factory);
        self
    }

    pub fn vendor_quirks(mut self, quirks: VendorQuirks) -> Self {
        self.vendor_quirks = quirks;
        self
    }

    /// Turns every cache model off without touching the definitions.
    pub fn cache_models_enabled(mut self, enabled: bool) -> Self {
        self.cache_models_enabled = enabled;
        self
    }

    /// Resolves unregistered class aliases as maps instead of failing.
    /// Meant for checking definitions outside the application.
    pub fn lenient_classes(mut self, lenient: bool) -> Self {
        self.lenient_classes = lenient;
        self
    }

    pub fn build(self) -> Result<SqlMapConfig> {
        let mut resolver = Resolver {
            classes: HashMap::new(),
            class_resolvers: &self.classes,
            lenient: self.lenient_classes,
            type_handlers: &self.type_handlers,
            null_probe: Arc::new(NullValueProbe::new(self.vendor_quirks.clone())),
            instance_tag: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
        };

        let cache_models_enabled =
            self.cache_models_enabled && self.definitions.iter().all(|d| d.cache_models_enabled);

        let mut parameter_maps = HashMap::new();
        let mut result_maps = HashMap::new();
        let mut cache_models = HashMap::new();
        let mut model_definitions = Vec::new();

        for def in &self.definitions {
            for pm in &def.parameter_maps {
                let id = def.qualify(&pm.id);
                let map = resolver.parameter_map(&id, pm)?;
                insert_unique(&mut parameter_maps, id, Arc::new(map), "parameter map")?;
            }
            for rm in &def.result_maps {
                let id = def.qualify(&rm.id);
                let map = resolver.result_map(def, &id, rm)?;
                insert_unique(&mut result_maps, id, Arc::new(map), "result map")?;
            }
            for cm in &def.cache_models {
                let id = def.qualify(&cm.id);
                let model = cache_model(def, &id, cm, &self.controllers)?;
                insert_unique(&mut cache_models, id.clone(), Arc::new(model), "cache model")?;
                model_definitions.push((def, id));
            }
        }

        let mut statements = HashMap::new();
        for def in &self.definitions {
            for sd in &def.statements {
                let id = def.qualify(&sd.id);
                let statement =
                    resolver.statement(def, &id, sd, &parameter_maps, &result_maps, &cache_models)?;
                insert_unique(&mut statements, id, Arc::new(statement), "statement")?;
            }
        }

        for map in result_maps.values() {
            for mapping in map.nested_selects() {
                if let Some(select) = &mapping.select {
                    if !statements.contains_key(select) {
                        return Err(MapperError::Configuration(format!(
                            "Result map '{}' property '{}' selects unknown statement '{}'",
                            map.id(),
                            mapping.property,
                            select
                        )));
                    }
                }
            }
        }

        let mut flush_triggers: HashMap<String, Vec<Arc<CacheModel>>> = HashMap::new();
        for (def, model_id) in model_definitions {
            let Some(model) = cache_models.get(&model_id) else {
                continue;
            };
            for statement_id in model.flush_on_execute() {
                let statement_id = def.qualify(statement_id);
                if !statements.contains_key(&statement_id) {
                    return Err(MapperError::Configuration(format!(
                        "Cache model '{}' flushes on unknown statement '{}'",
                        model_id, statement_id
                    )));
                }
                flush_triggers
                    .entry(statement_id)
                    .or_default()
                    .push(Arc::clone(model));
            }
        }

        info!(
            statements = statements.len(),
            cache_models = cache_models.len(),
            cache_models_enabled,
            "SqlMap configuration loaded"
        );

        Ok(SqlMapConfig {
            statements,
            parameter_maps,
            result_maps,
            cache_models,
            flush_triggers,
            result_factory: self.result_factory,
            null_probe: resolver.null_probe,
            cache_models_enabled,
        })
    }
}

impl Default for SqlMapConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_unique<T>(map: &mut HashMap<String, T>, id: String, value: T, what: &str) -> Result<()> {
    if map.contains_key(&id) {
        return Err(MapperError::Configuration(format!(
            "Duplicate {} id '{}'",
            what, id
        )));
    }
    map.insert(id, value);
    Ok(())
}

fn cache_model(
    def: &SqlMapDefinition,
    id: &str,
    cm: &CacheModelDefinition,
    controllers: &ControllerFactory,
) -> Result<CacheModel> {
    let mut config = CacheModelConfig::new(id, &cm.controller_type)
        .read_only(cm.read_only)
        .serialize(cm.serialize);
    if let Some(interval) = &cm.flush_interval {
        let total = interval
            .total()
            .map_err(|e| MapperError::Configuration(format!("Cache model '{}': {}", id, e)))?;
        config = config.flush_interval(total);
    }
    for statement_id in &cm.flush_on_execute {
        config = config.flush_on_execute(&def.qualify(statement_id));
    }
    config.properties = cm.properties.clone();
    CacheModel::from_config(config, controllers)
}

struct Resolver<'a> {
    classes: HashMap<String, ClassRef>,
    class_resolvers: &'a HashMap<String, ClassResolver>,
    lenient: bool,
    type_handlers: &'a TypeHandlerRegistry,
    null_probe: Arc<NullValueProbe>,
    instance_tag: u64,
}

impl Resolver<'_> {
    /// `None` only for an unknown alias in lenient mode.
    fn class(&mut self, alias: &str) -> Result<Option<ClassRef>> {
        if let Some(class) = self.classes.get(alias) {
            return Ok(Some(Arc::clone(class)));
        }
        let Some(resolve) = self.class_resolvers.get(alias) else {
            if self.lenient {
                warn!(alias = %alias, "Unregistered class alias, treating it as a map");
                return Ok(None);
            }
            return Err(MapperError::Configuration(format!(
                "Unknown class alias '{}'",
                alias
            )));
        };
        let class = resolve()?;
        self.classes.insert(alias.to_string(), Arc::clone(&class));
        Ok(Some(class))
    }

    fn result_type(&mut self, name: &str) -> Result<ResultType> {
        match name.to_ascii_lowercase().as_str() {
            "list" => Ok(ResultType::List),
            "collection" => Ok(ResultType::Collection),
            "set" => Ok(ResultType::Set),
            "map" => Ok(ResultType::Map),
            "scalar" | "value" => Ok(ResultType::Scalar),
            _ => Ok(self.class(name)?.map_or(ResultType::Map, ResultType::Bean)),
        }
    }

    fn handler(
        &self,
        class: Option<&ClassRef>,
        property: &str,
        sql_type: Option<SqlType>,
        handler_name: Option<&str>,
    ) -> Result<Arc<dyn TypeHandler>> {
        if let Some(name) = handler_name {
            return self.type_handlers.custom(name);
        }
        let property_type: Option<DataType> = class
            .and_then(|c| c.property(property))
            .and_then(|p| p.getter_type.or(p.setter_type))
            .map(|t| t.data_type);
        Ok(self.type_handlers.resolve(property_type, sql_type))
    }

    fn mapping(
        &self,
        map_id: &str,
        class: Option<&ClassRef>,
        property: &str,
        jdbc_type: Option<&str>,
        null_value: Option<&str>,
        handler_name: Option<&str>,
    ) -> Result<ParameterMapping> {
        let sql_type = jdbc_type.map(SqlType::from_str).transpose()?;
        let handler = self.handler(class, property, sql_type, handler_name)?;

        let mut mapping = ParameterMapping::new(property).type_handler(Arc::clone(&handler));
        if let Some(sql_type) = sql_type {
            mapping = mapping.sql_type(sql_type);
        }
        if let Some(literal) = null_value {
            handler.value_of(literal).map_err(|e| {
                MapperError::Configuration(format!(
                    "Parameter map '{}' property '{}': bad null value: {}",
                    map_id, property, e
                ))
            })?;
            mapping = mapping.null_value(literal);
        }
        Ok(mapping)
    }

    fn parameter_map(&mut self, id: &str, pm: &ParameterMapDefinition) -> Result<ParameterMap> {
        let class = match pm.class.as_deref() {
            Some(alias) => self.class(alias)?,
            None => None,
        };

        let mut mappings = Vec::with_capacity(pm.parameters.len());
        for p in &pm.parameters {
            let mapping = self
                .mapping(
                    id,
                    class.as_ref(),
                    &p.property,
                    p.jdbc_type.as_deref(),
                    p.null_value.as_deref(),
                    p.type_handler.as_deref(),
                )?
                .mode(p.mode);
            mappings.push(mapping);
        }

        let mut map = ParameterMap::new(id, mappings).with_null_probe(Arc::clone(&self.null_probe));
        if let Some(alias) = &pm.class {
            map = map.with_parameter_class(alias.as_str());
        }
        Ok(map)
    }

    /// Builds the parameter map implied by `#name#` markers and rewrites
    /// them to `?`.
    fn inline_parameters(
        &mut self,
        statement_id: &str,
        sql: &str,
        parameter_class: Option<&str>,
    ) -> Result<(String, ParameterMap)> {
        let class = match parameter_class {
            Some(alias) => self.class(alias)?,
            None => None,
        };
        let map_id = format!("{}-InlineParameterMap", statement_id);

        let mut mappings = Vec::new();
        for caps in INLINE_PARAMETER.captures_iter(sql) {
            let property = &caps[1];
            let jdbc_type = caps.get(2).map(|m| m.as_str());
            mappings.push(self.mapping(&map_id, class.as_ref(), property, jdbc_type, None, None)?);
        }
        let rewritten = INLINE_PARAMETER.replace_all(sql, "?").into_owned();

        let mut map = ParameterMap::new(map_id, mappings).with_null_probe(Arc::clone(&self.null_probe));
        if let Some(alias) = parameter_class {
            map = map.with_parameter_class(alias);
        }
        Ok((rewritten, map))
    }

    fn result_map(
        &mut self,
        def: &SqlMapDefinition,
        id: &str,
        rm: &ResultMapDefinition,
    ) -> Result<ResultMap> {
        let result_type = self.result_type(&rm.class)?;
        let mappings = rm
            .results
            .iter()
            .map(|r| {
                let mapping = ResultMapping::new(&r.property, &r.column);
                match &r.select {
                    Some(select) => mapping.with_select(def.qualify(select)),
                    None => mapping,
                }
            })
            .collect();
        Ok(ResultMap::new(id, result_type, mappings))
    }

    fn statement(
        &mut self,
        def: &SqlMapDefinition,
        id: &str,
        sd: &StatementDefinition,
        parameter_maps: &HashMap<String, Arc<ParameterMap>>,
        result_maps: &HashMap<String, Arc<ResultMap>>,
        cache_models: &HashMap<String, Arc<CacheModel>>,
    ) -> Result<MappedStatement> {
        let (sql, parameter_map) = match &sd.parameter_map {
            Some(map_id) => {
                let map_id = def.qualify(map_id);
                let map = parameter_maps.get(&map_id).cloned().ok_or_else(|| {
                    MapperError::Configuration(format!(
                        "Statement '{}' references unknown parameter map '{}'",
                        id, map_id
                    ))
                })?;
                (sd.sql.clone(), map)
            }
            None => {
                let (sql, map) = self.inline_parameters(id, &sd.sql, sd.parameter_class.as_deref())?;
                (sql, Arc::new(map))
            }
        };

        let result_map = match (&sd.result_map, &sd.result_class) {
            (Some(map_id), _) => {
                let map_id = def.qualify(map_id);
                Some(result_maps.get(&map_id).cloned().ok_or_else(|| {
                    MapperError::Configuration(format!(
                        "Statement '{}' references unknown result map '{}'",
                        id, map_id
                    ))
                })?)
            }
            (None, Some(class)) => {
                let result_type = self.result_type(class)?;
                Some(Arc::new(ResultMap::implicit(format!("{}-AutoResultMap", id), result_type)))
            }
            (None, None) if sd.kind.is_query() => Some(Arc::new(ResultMap::implicit(
                format!("{}-AutoResultMap", id),
                ResultType::Map,
            ))),
            (None, None) => None,
        };

        let cache_model = match &sd.cache_model {
            Some(model_id) => {
                if sd.kind != StatementKind::Select {
                    return Err(MapperError::Configuration(format!(
                        "Statement '{}' is not a select and cannot use cache model '{}'",
                        id, model_id
                    )));
                }
                let model_id = def.qualify(model_id);
                Some(cache_models.get(&model_id).cloned().ok_or_else(|| {
                    MapperError::Configuration(format!(
                        "Statement '{}' references unknown cache model '{}'",
                        id, model_id
                    ))
                })?)
            }
            None => None,
        };

        debug!(statement = %id, parameters = parameter_map.parameter_count(), "Resolved statement");

        Ok(MappedStatement {
            id: id.to_string(),
            kind: sd.kind,
            sql,
            parameter_map,
            result_map,
            cache_model,
            instance_tag: self.instance_tag,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beans::ClassBuilder;

    #[derive(Debug, Clone, Default)]
    struct Order {
        id: i64,
        note: Option<String>,
    }

    impl Bean for Order {
        fn declare(class: &mut ClassBuilder<Self>) {
            class
                .property("id", |o: &Self| o.id, |o, v| o.id = v)
                .property("note", |o: &Self| o.note.clone(), |o, v| o.note = v);
        }
    }

    const ORDERS: &str = r#"{
        "namespace": "Orders",
        "parameter_maps": [{
            "id": "byNote",
            "class": "Order",
            "parameters": [
                { "property": "note", "jdbc_type": "VARCHAR", "null_value": "N/A" },
                { "property": "id" }
            ]
        }],
        "result_maps": [{
            "id": "order",
            "class": "Order",
            "results": [{ "property": "id", "column": "ID" }]
        }],
        "cache_models": [{
            "id": "orderCache",
            "type": "LRU",
            "flush_interval": { "hours": 24 },
            "flush_on_execute": ["insert"],
            "properties": { "size": "50" }
        }],
        "statements": [
            { "id": "find", "kind": "select", "sql": "SELECT * FROM orders WHERE id = #id:INTEGER#",
              "parameter_class": "Order", "result_map": "order", "cache_model": "orderCache" },
            { "id": "byNote", "kind": "select", "sql": "SELECT * FROM orders WHERE note = ? AND id > ?",
              "parameter_map": "byNote", "result_class": "map" },
            { "id": "insert", "kind": "insert", "sql": "INSERT INTO orders (id) VALUES (#id#)" }
        ]
    }"#;

    fn build(json: &str) -> Result<SqlMapConfig> {
        SqlMapConfig::builder().bean::<Order>("Order").json(json)?.build()
    }

    #[test]
    fn test_resolves_namespaced_statements() {
        let config = build(ORDERS).unwrap();
        assert_eq!(
            config.statement_ids(),
            vec!["Orders.byNote", "Orders.find", "Orders.insert"]
        );

        let find = config.statement("Orders.find").unwrap();
        assert_eq!(find.sql, "SELECT * FROM orders WHERE id = ?");
        assert_eq!(find.parameter_map.parameter_count(), 1);
        assert_eq!(find.parameter_map.mappings()[0].declared_sql_type(), Some(SqlType::Integer));
        assert_eq!(find.parameter_map.mappings()[0].handler().name(), "integer");
        assert_eq!(find.cache_model.as_ref().unwrap().controller_name(), "LRU");

        let triggers = config.flush_triggers("Orders.insert");
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].id(), "Orders.orderCache");
        assert!(config.flush_triggers("Orders.find").is_empty());
    }

    #[test]
    fn test_parameter_map_uses_bean_property_types() {
        let config = build(ORDERS).unwrap();
        let map = config.parameter_map("Orders.byNote").unwrap();
        assert_eq!(map.parameter_index("id"), Some(1));
        assert_eq!(map.mappings()[0].handler().name(), "text");
        assert_eq!(map.mappings()[0].declared_null_value(), Some("N/A"));
    }

    #[test]
    fn test_unknown_references_fail_fast() {
        let unknown_statement = ORDERS.replace("\"flush_on_execute\": [\"insert\"]", "\"flush_on_execute\": [\"nope\"]");
        let err = build(&unknown_statement).unwrap_err();
        assert!(err.to_string().contains("Orders.nope"));

        let unknown_class = ORDERS.replace("\"class\": \"Order\",\n            \"results\"", "\"class\": \"Missing\",\n            \"results\"");
        let err = build(&unknown_class).unwrap_err();
        assert!(err.to_string().contains("Missing"));

        let bad_interval = ORDERS.replace("{ \"hours\": 24 }", "{ }");
        let err = build(&bad_interval).unwrap_err();
        assert!(err.to_string().contains("Orders.orderCache"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let err = SqlMapConfig::builder()
            .bean::<Order>("Order")
            .json(ORDERS)
            .unwrap()
            .json(ORDERS)
            .unwrap()
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_lenient_classes_fall_back_to_maps() {
        let config = SqlMapConfig::builder()
            .lenient_classes(true)
            .json(ORDERS)
            .unwrap()
            .build()
            .unwrap();
        let map = config.result_map("Orders.order").unwrap();
        assert!(matches!(map.result_type(), ResultType::Map));
    }

    #[test]
    fn test_global_cache_switch() {
        let config = SqlMapConfig::builder()
            .bean::<Order>("Order")
            .json(ORDERS)
            .unwrap()
            .cache_models_enabled(false)
            .build()
            .unwrap();
        assert!(!config.cache_models_enabled());
    }
}
