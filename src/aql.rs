use serde_json::{json, Map, Value};

use crate::cursor::{Cursor, CursorKind};
use crate::error::{fail, Operation, Result};
use crate::executor::Executor;
use crate::request::{Method, Request};

/// Knobs for [`Aql::execute`].
#[derive(Debug, Clone, Default)]
pub struct AqlOptions {
    /// Ask the server for the total result count.
    pub count: bool,
    /// Documents per batch.
    pub batch_size: Option<u64>,
    /// Server-side cursor time-to-live in seconds.
    pub ttl: Option<u64>,
    /// Allow serving the result from the query cache.
    pub cache: Option<bool>,
    /// Memory limit in bytes, 0 meaning unbounded.
    pub memory_limit: Option<u64>,
    /// Extra entries for the `options` sub-object, e.g. `fullCount`.
    pub extra: Option<Value>,
}

/// AQL facade: query execution, inspection and user function management.
pub struct Aql<E> {
    executor: E,
}

impl<E: Executor> Aql<E> {
    pub(crate) fn new(executor: E) -> Self {
        Aql { executor }
    }

    fn query_body(query: &str, bind_vars: Option<Value>, options: &AqlOptions) -> Value {
        let mut data = Map::new();
        data.insert("query".to_string(), json!(query));
        if let Some(bind_vars) = bind_vars {
            data.insert("bindVars".to_string(), bind_vars);
        }
        if options.count {
            data.insert("count".to_string(), json!(true));
        }
        if let Some(size) = options.batch_size {
            data.insert("batchSize".to_string(), json!(size));
        }
        if let Some(ttl) = options.ttl {
            data.insert("ttl".to_string(), json!(ttl));
        }
        if let Some(cache) = options.cache {
            data.insert("cache".to_string(), json!(cache));
        }
        if let Some(limit) = options.memory_limit {
            data.insert("memoryLimit".to_string(), json!(limit));
        }
        if let Some(extra) = &options.extra {
            data.insert("options".to_string(), extra.clone());
        }
        Value::Object(data)
    }

    /// Run a query and return a cursor over its results.
    pub fn execute(
        &self,
        query: &str,
        bind_vars: Option<Value>,
        options: AqlOptions,
    ) -> Result<E::Output<Cursor>> {
        let data = Self::query_body(query, bind_vars, &options);
        let request = Request::new(Method::Post, "/_api/cursor").json(data);
        let conn = self.executor.connection().clone();
        self.executor.execute(request, move |resp| {
            if !resp.is_success {
                return fail(Operation::AqlQueryExecute, &resp);
            }
            Ok(Cursor::from_response(conn, CursorKind::Cursor, &resp))
        })
    }

    /// Inspect the execution plan without running the query.
    pub fn explain(
        &self,
        query: &str,
        bind_vars: Option<Value>,
        all_plans: bool,
        max_plans: Option<u64>,
    ) -> Result<E::Output<Value>> {
        let mut data = Map::new();
        data.insert("query".to_string(), json!(query));
        if let Some(bind_vars) = bind_vars {
            data.insert("bindVars".to_string(), bind_vars);
        }
        let mut options = Map::new();
        options.insert("allPlans".to_string(), json!(all_plans));
        if let Some(max) = max_plans {
            options.insert("maxNumberOfPlans".to_string(), json!(max));
        }
        data.insert("options".to_string(), Value::Object(options));

        let request = Request::new(Method::Post, "/_api/explain").json(Value::Object(data));
        let all = all_plans;
        self.executor.execute(request, move |resp| {
            if !resp.is_success {
                return fail(Operation::AqlQueryExplain, &resp);
            }
            if all {
                Ok(resp.body_field("plans"))
            } else {
                Ok(resp.body_field("plan"))
            }
        })
    }

    /// Parse the query and return its collections and bind parameters.
    pub fn validate(&self, query: &str) -> Result<E::Output<Value>> {
        let request =
            Request::new(Method::Post, "/_api/query").json(json!({ "query": query }));
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::AqlQueryValidate, &resp);
            }
            Ok(resp.body_or_null())
        })
    }

    /// List the registered AQL user functions.
    pub fn functions(&self) -> Result<E::Output<Vec<Value>>> {
        let request = Request::new(Method::Get, "/_api/aqlfunction");
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::AqlFunctionList, &resp);
            }
            // Older servers return a bare array, newer ones wrap it.
            let body = resp.body_or_null();
            let list = match &body {
                Value::Array(list) => list.clone(),
                _ => resp
                    .body_field("result")
                    .as_array()
                    .cloned()
                    .unwrap_or_default(),
            };
            Ok(list)
        })
    }

    /// Register an AQL user function under its fully qualified name, e.g.
    /// `myfunctions::temperature::celsius_to_fahrenheit`.
    pub fn create_function(&self, name: &str, code: &str) -> Result<E::Output<bool>> {
        let request = Request::new(Method::Post, "/_api/aqlfunction")
            .json(json!({ "name": name, "code": code }));
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::AqlFunctionCreate, &resp);
            }
            Ok(true)
        })
    }

    /// Delete a user function, or a whole namespace with `group`.
    pub fn delete_function(
        &self,
        name: &str,
        group: bool,
        ignore_missing: bool,
    ) -> Result<E::Output<bool>> {
        let request = Request::new(Method::Delete, format!("/_api/aqlfunction/{name}"))
            .param("group", group);
        self.executor.execute(request, move |resp| {
            if !resp.is_success {
                if resp.status_code == 404 && ignore_missing {
                    return Ok(false);
                }
                return fail(Operation::AqlFunctionDelete, &resp);
            }
            Ok(true)
        })
    }
}
