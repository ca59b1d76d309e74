use super::driver::Driver;
use crate::beans::{ParameterObject, ParameterTarget};
use crate::config::{MappedStatement, SqlMapConfig};
use crate::core::{MapperError, Result, Value};
use crate::mapping::{ResultFactoryContext, ResultObject};
use crate::result::QueryResult;
use std::sync::Arc;
use tracing::debug;

/// Entry point of the mapper: configuration plus driver.
///
/// Cheap to clone. Every [`Session`] taken from it owns its own result
/// factory context, so sessions may run concurrently.
#[derive(Debug, Clone)]
pub struct SqlMapClient {
    config: Arc<SqlMapConfig>,
    driver: Arc<dyn Driver>,
}

impl SqlMapClient {
    pub fn new(config: SqlMapConfig, driver: Arc<dyn Driver>) -> Self {
        Self {
            config: Arc::new(config),
            driver,
        }
    }

    pub fn config(&self) -> &Arc<SqlMapConfig> {
        &self.config
    }

    pub fn session(&self) -> Session {
        Session {
            client: self.clone(),
            context: ResultFactoryContext::new(),
        }
    }

    pub async fn query_for_list(
        &self,
        statement_id: &str,
        param: ParameterObject<'_>,
    ) -> Result<Vec<ResultObject>> {
        self.session().query_for_list(statement_id, param).await
    }

    pub async fn query_for_object(
        &self,
        statement_id: &str,
        param: ParameterObject<'_>,
    ) -> Result<Option<ResultObject>> {
        self.session().query_for_object(statement_id, param).await
    }

    pub async fn update(&self, statement_id: &str, param: ParameterObject<'_>) -> Result<u64> {
        self.session().update(statement_id, param).await
    }

    /// Flushes every cache model.
    pub async fn flush_data_cache(&self) {
        for model in self.config.cache_models() {
            model.flush().await;
        }
    }

    pub async fn flush_cache_model(&self, model_id: &str) -> Result<()> {
        let model = self.config.cache_model(model_id).ok_or_else(|| {
            MapperError::Configuration(format!("There is no cache model named {}", model_id))
        })?;
        model.flush().await;
        Ok(())
    }

    /// Rows of one execution, through the statement's cache model when it
    /// has one.
    async fn fetch_rows(
        &self,
        statement: &MappedStatement,
        values: &[Value],
        skip: usize,
        max: Option<usize>,
    ) -> Result<Arc<QueryResult>> {
        let cache = statement
            .cache_model
            .as_ref()
            .filter(|_| self.config.cache_models_enabled())
            .map(|model| (model, statement.cache_key(values, skip, max)));

        if let Some((model, key)) = &cache {
            if let Some(rows) = model.get(key).await {
                debug!(statement = %statement.id, model = model.id(), "Cache hit");
                return Ok(rows);
            }
        }

        let mut prepared = self.driver.prepare(&statement.sql).await?;
        statement.parameter_map.bind(prepared.parameters(), values)?;
        let rows = Arc::new(prepared.query().await?.page(skip, max));

        if let Some((model, key)) = &cache {
            model.put(key, Arc::clone(&rows)).await;
        }
        self.flush_triggered(&statement.id).await;
        Ok(rows)
    }

    async fn flush_triggered(&self, statement_id: &str) {
        for model in self.config.flush_triggers(statement_id) {
            debug!(statement = %statement_id, model = model.id(), "Statement flushes cache model");
            model.flush().await;
        }
    }

    async fn materialize(
        &self,
        context: &mut ResultFactoryContext,
        statement: &MappedStatement,
        rows: &QueryResult,
    ) -> Result<Vec<ResultObject>> {
        let Some(result_map) = &statement.result_map else {
            return Ok(Vec::new());
        };

        let mut objects = Vec::with_capacity(rows.row_count());
        for row in 0..rows.row_count() {
            let mut object = result_map.materialize(context, rows, row)?;
            for mapping in result_map.nested_selects() {
                let Some(select) = &mapping.select else {
                    continue;
                };
                let parameter = result_map.select_parameter(rows, row, mapping)?;
                let value = self.nested_value(context, select, &parameter).await?;
                object.set(&mapping.property, value)?;
            }
            objects.push(object);
        }
        Ok(objects)
    }

    /// First column of the first row of a nested select, run in a nested
    /// frame of the caller's context.
    async fn nested_value(
        &self,
        context: &mut ResultFactoryContext,
        statement_id: &str,
        parameter: &Value,
    ) -> Result<Value> {
        let nested = self.config.statement(statement_id)?;
        let _scope = context.enter(self.config.result_factory(), &nested.id);
        let values = nested.parameter_map.values_of(ParameterObject::Scalar(parameter))?;
        let rows = self.fetch_rows(&nested, &values, 0, None).await?;
        Ok(rows.first_value().cloned().unwrap_or(Value::Null))
    }
}

/// One logical caller of the mapper.
#[derive(Debug)]
pub struct Session {
    client: SqlMapClient,
    context: ResultFactoryContext,
}

impl Session {
    pub fn context(&self) -> &ResultFactoryContext {
        &self.context
    }

    pub async fn query_for_list(
        &mut self,
        statement_id: &str,
        param: ParameterObject<'_>,
    ) -> Result<Vec<ResultObject>> {
        self.query_with_rows(statement_id, param, 0, None).await
    }

    /// At most one result; more than one is an error.
    pub async fn query_for_object(
        &mut self,
        statement_id: &str,
        param: ParameterObject<'_>,
    ) -> Result<Option<ResultObject>> {
        let mut objects = self.query_for_list(statement_id, param).await?;
        if objects.len() > 1 {
            return Err(MapperError::Execution(format!(
                "Statement '{}' returned {} results where at most one was expected",
                statement_id,
                objects.len()
            )));
        }
        Ok(objects.pop())
    }

    /// Skips `skip` rows and keeps at most `max`.
    pub async fn query_with_rows(
        &mut self,
        statement_id: &str,
        param: ParameterObject<'_>,
        skip: usize,
        max: Option<usize>,
    ) -> Result<Vec<ResultObject>> {
        let client = &self.client;
        let statement = client.config.statement(statement_id)?;
        let mut scope = self.context.enter(client.config.result_factory(), &statement.id);

        let values = statement.parameter_map.values_of(param)?;
        let rows = client.fetch_rows(&statement, &values, skip, max).await?;
        client.materialize(&mut scope, &statement, &rows).await
    }

    /// Runs an insert, update or delete and returns the affected row count.
    pub async fn update(&mut self, statement_id: &str, param: ParameterObject<'_>) -> Result<u64> {
        let client = &self.client;
        let statement = client.config.statement(statement_id)?;
        let _scope = self.context.enter(client.config.result_factory(), &statement.id);

        let values = statement.parameter_map.values_of(param)?;
        let mut prepared = client.driver.prepare(&statement.sql).await?;
        statement.parameter_map.bind(prepared.parameters(), &values)?;
        let affected = prepared.execute().await?;

        client.flush_triggered(&statement.id).await;
        Ok(affected)
    }

    /// Runs a procedure, copies its output parameters back into `target` and
    /// returns its result rows.
    pub async fn call_procedure(
        &mut self,
        statement_id: &str,
        target: &mut ParameterTarget<'_>,
    ) -> Result<Vec<ResultObject>> {
        let client = &self.client;
        let statement = client.config.statement(statement_id)?;
        let mut scope = self.context.enter(client.config.result_factory(), &statement.id);

        let values = statement.parameter_map.values_of(target.as_object())?;
        let mut prepared = client.driver.prepare(&statement.sql).await?;
        statement.parameter_map.bind(prepared.parameters(), &values)?;
        let rows = prepared.query().await?;
        let outputs = prepared.output_values();
        statement.parameter_map.refresh_values(target, &outputs)?;

        client.flush_triggered(&statement.id).await;
        client.materialize(&mut scope, &statement, &rows).await
    }
}
