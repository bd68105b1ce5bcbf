use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::aql::Aql;
use crate::collection::Collection;
use crate::error::{errno, fail, Operation, Result};
use crate::executor::{
    AsyncExecutor, BatchExecutor, ClusterTestExecutor, DefaultExecutor, Executor,
};
use crate::graph::{EdgeDefinition, Graph};
use crate::request::{Method, Request};
use crate::transaction::{TransactionCollections, TransactionExecutor, TransactionOptions};

/// Knobs for [`Database::create_collection`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateCollectionOptions {
    /// Create an edge collection instead of a document collection.
    pub edge: bool,
    /// Block until writes are synced to disk by default.
    pub sync: bool,
    /// Create a system collection (name must start with `_`).
    pub system: bool,
}

/// API wrapper for one database, generic over the execution context.
///
/// This is the entry point to everything else: collections, graphs, AQL and
/// the alternative execution contexts (async, batch, transaction).
pub struct Database<E> {
    executor: E,
}

/// Database wrapper that executes requests inline.
pub type StandardDatabase = Database<DefaultExecutor>;
/// Database wrapper that queues requests on the server's task queue.
pub type AsyncDatabase = Database<AsyncExecutor>;
/// Database wrapper that buffers requests for one multipart commit.
pub type BatchDatabase = Database<Arc<BatchExecutor>>;
/// Database wrapper that buffers statements for one server-side transaction.
pub type TransactionDatabase = Database<Arc<TransactionExecutor>>;
/// Database wrapper that stamps cluster shard routing headers on every call.
pub type ClusterTestDatabase = Database<ClusterTestExecutor>;

impl<E: Executor + Clone> Clone for Database<E> {
    fn clone(&self) -> Self {
        Database {
            executor: self.executor.clone(),
        }
    }
}

impl<E: Executor> std::fmt::Debug for Database<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}

impl<E: Executor> Database<E> {
    pub(crate) fn with_executor(executor: E) -> Self {
        Database { executor }
    }

    pub fn name(&self) -> &str {
        self.executor.connection().db_name()
    }

    pub fn username(&self) -> &str {
        self.executor.connection().username()
    }

    /// Check that the server is reachable and the credentials are accepted.
    pub fn ping(&self) -> Result<u16> {
        self.executor.connection().ping()
    }

    /// Server version string, e.g. `3.12.0`.
    pub fn version(&self) -> Result<E::Output<String>> {
        let request = Request::new(Method::Get, "/_api/version");
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::ServerVersion, &resp);
            }
            Ok(resp
                .body_field("version")
                .as_str()
                .unwrap_or_default()
                .to_string())
        })
    }

    /// Server status details (host, engine, uptime and friends).
    pub fn status(&self) -> Result<E::Output<Value>> {
        let request = Request::new(Method::Get, "/_admin/status");
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::ServerStatus, &resp);
            }
            Ok(resp.body_or_null())
        })
    }

    pub fn collection(&self, name: impl Into<String>) -> Collection<E>
    where
        E: Clone,
    {
        Collection::new(name, self.executor.clone())
    }

    pub fn aql(&self) -> Aql<E>
    where
        E: Clone,
    {
        Aql::new(self.executor.clone())
    }

    pub fn graph(&self, name: impl Into<String>) -> Graph<E>
    where
        E: Clone,
    {
        Graph::new(name, self.executor.clone())
    }

    /// List the collections in the database, system ones included.
    pub fn collections(&self) -> Result<E::Output<Vec<Value>>> {
        let request = Request::new(Method::Get, "/_api/collection");
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::CollectionList, &resp);
            }
            Ok(resp
                .body_field("result")
                .as_array()
                .cloned()
                .unwrap_or_default())
        })
    }

    pub fn has_collection(&self, name: &str) -> Result<E::Output<bool>> {
        let request = Request::new(Method::Get, format!("/_api/collection/{name}"));
        self.executor.execute(request, |resp| {
            if resp.error_code == Some(errno::DATA_SOURCE_NOT_FOUND) {
                return Ok(false);
            }
            if !resp.is_success {
                return fail(Operation::CollectionProperties, &resp);
            }
            Ok(true)
        })
    }

    pub fn create_collection(
        &self,
        name: &str,
        options: CreateCollectionOptions,
    ) -> Result<E::Output<Value>> {
        // Collection type 3 is an edge collection, 2 a document collection.
        let collection_type = if options.edge { 3 } else { 2 };
        let request = Request::new(Method::Post, "/_api/collection").json(json!({
            "name": name,
            "type": collection_type,
            "waitForSync": options.sync,
            "isSystem": options.system,
        }));
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::CollectionCreate, &resp);
            }
            Ok(resp.body_or_null())
        })
    }

    /// Drop a collection. `Ok(false)` when it does not exist and
    /// `ignore_missing` is set.
    pub fn delete_collection(
        &self,
        name: &str,
        ignore_missing: bool,
    ) -> Result<E::Output<bool>> {
        let request = Request::new(Method::Delete, format!("/_api/collection/{name}"));
        self.executor.execute(request, move |resp| {
            if resp.error_code == Some(errno::DATA_SOURCE_NOT_FOUND) && ignore_missing {
                return Ok(false);
            }
            if !resp.is_success {
                return fail(Operation::CollectionDelete, &resp);
            }
            Ok(true)
        })
    }

    /// List the named graphs in the database.
    pub fn graphs(&self) -> Result<E::Output<Vec<Value>>> {
        let request = Request::new(Method::Get, "/_api/gharial");
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::GraphList, &resp);
            }
            Ok(resp
                .body_field("graphs")
                .as_array()
                .cloned()
                .unwrap_or_default())
        })
    }

    pub fn create_graph(
        &self,
        name: &str,
        edge_definitions: &[EdgeDefinition],
        orphan_collections: &[String],
    ) -> Result<E::Output<Value>> {
        let definitions: Vec<Value> = edge_definitions
            .iter()
            .map(EdgeDefinition::to_json)
            .collect();
        let mut data = Map::new();
        data.insert("name".to_string(), json!(name));
        data.insert("edgeDefinitions".to_string(), json!(definitions));
        if !orphan_collections.is_empty() {
            data.insert("orphanCollections".to_string(), json!(orphan_collections));
        }
        let request = Request::new(Method::Post, "/_api/gharial").json(Value::Object(data));
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::GraphCreate, &resp);
            }
            Ok(resp.body_field("graph"))
        })
    }

    /// Drop a named graph. `Ok(false)` when it does not exist and
    /// `ignore_missing` is set; with `drop_collections` the member
    /// collections are dropped as well.
    pub fn delete_graph(
        &self,
        name: &str,
        ignore_missing: bool,
        drop_collections: bool,
    ) -> Result<E::Output<bool>> {
        let request = Request::new(Method::Delete, format!("/_api/gharial/{name}"))
            .param("dropCollections", drop_collections);
        self.executor.execute(request, move |resp| {
            let missing = resp.error_code == Some(errno::GRAPH_NOT_FOUND)
                || resp.status_code == 404;
            if missing && ignore_missing {
                return Ok(false);
            }
            if !resp.is_success {
                return fail(Operation::GraphDelete, &resp);
            }
            Ok(true)
        })
    }

    /// Names of all databases on the server; only valid against `_system`.
    pub fn databases(&self) -> Result<E::Output<Vec<String>>> {
        let request = Request::new(Method::Get, "/_api/database");
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::DatabaseList, &resp);
            }
            Ok(resp
                .body_field("result")
                .as_array()
                .map(|list| {
                    list.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    /// Create a database; only valid against `_system`. `users` entries are
    /// `{"username": ..., "password": ..., "active": ...}` objects.
    pub fn create_database(
        &self,
        name: &str,
        users: Option<Vec<Value>>,
    ) -> Result<E::Output<bool>> {
        let mut data = Map::new();
        data.insert("name".to_string(), json!(name));
        if let Some(users) = users {
            data.insert("users".to_string(), json!(users));
        }
        let request = Request::new(Method::Post, "/_api/database").json(Value::Object(data));
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::DatabaseCreate, &resp);
            }
            Ok(true)
        })
    }

    /// Drop a database; only valid against `_system`.
    pub fn delete_database(&self, name: &str, ignore_missing: bool) -> Result<E::Output<bool>> {
        let request = Request::new(Method::Delete, format!("/_api/database/{name}"));
        self.executor.execute(request, move |resp| {
            if resp.status_code == 404 && ignore_missing {
                return Ok(false);
            }
            if !resp.is_success {
                return fail(Operation::DatabaseDelete, &resp);
            }
            Ok(true)
        })
    }

    /// List async job ids by state, `"pending"` or `"done"`.
    pub fn async_jobs(&self, status: &str, count: Option<u64>) -> Result<E::Output<Vec<String>>> {
        let request = Request::new(Method::Get, format!("/_api/job/{status}"))
            .opt_param("count", count);
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::AsyncJobList, &resp);
            }
            let list = resp
                .body_or_null()
                .as_array()
                .map(|list| {
                    list.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            Ok(list)
        })
    }

    /// List the users known to the server; only valid against `_system`.
    pub fn users(&self) -> Result<E::Output<Vec<Value>>> {
        let request = Request::new(Method::Get, "/_api/user");
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::UserList, &resp);
            }
            Ok(resp
                .body_field("result")
                .as_array()
                .cloned()
                .unwrap_or_default())
        })
    }

    pub fn create_user(
        &self,
        username: &str,
        password: &str,
        active: bool,
        extra: Option<Value>,
    ) -> Result<E::Output<Value>> {
        let mut data = Map::new();
        data.insert("user".to_string(), json!(username));
        data.insert("passwd".to_string(), json!(password));
        data.insert("active".to_string(), json!(active));
        if let Some(extra) = extra {
            data.insert("extra".to_string(), extra);
        }
        let request = Request::new(Method::Post, "/_api/user").json(Value::Object(data));
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::UserCreate, &resp);
            }
            Ok(resp.body_or_null())
        })
    }

    /// Partially update a user; fields left `None` are unchanged.
    pub fn update_user(
        &self,
        username: &str,
        password: Option<&str>,
        active: Option<bool>,
    ) -> Result<E::Output<Value>> {
        let mut data = Map::new();
        if let Some(password) = password {
            data.insert("passwd".to_string(), json!(password));
        }
        if let Some(active) = active {
            data.insert("active".to_string(), json!(active));
        }
        let request = Request::new(Method::Patch, format!("/_api/user/{username}"))
            .json(Value::Object(data));
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::UserUpdate, &resp);
            }
            Ok(resp.body_or_null())
        })
    }

    /// Delete a user. `Ok(false)` when it does not exist and
    /// `ignore_missing` is set.
    pub fn delete_user(&self, username: &str, ignore_missing: bool) -> Result<E::Output<bool>> {
        let request = Request::new(Method::Delete, format!("/_api/user/{username}"));
        self.executor.execute(request, move |resp| {
            if resp.status_code == 404 && ignore_missing {
                return Ok(false);
            }
            if !resp.is_success {
                return fail(Operation::UserDelete, &resp);
            }
            Ok(true)
        })
    }

    /// A user's access level for a database: `rw`, `ro` or `none`.
    pub fn permission(&self, username: &str, database: &str) -> Result<E::Output<String>> {
        let request = Request::new(
            Method::Get,
            format!("/_api/user/{username}/database/{database}"),
        );
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::PermissionGet, &resp);
            }
            Ok(resp
                .body_field("result")
                .as_str()
                .unwrap_or_default()
                .to_string())
        })
    }

    pub fn update_permission(
        &self,
        username: &str,
        database: &str,
        grant: &str,
    ) -> Result<E::Output<bool>> {
        let request = Request::new(
            Method::Put,
            format!("/_api/user/{username}/database/{database}"),
        )
        .json(json!({ "grant": grant }));
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::PermissionUpdate, &resp);
            }
            Ok(true)
        })
    }

    /// Delete all stored async job results, or only those older than the
    /// given unix timestamp.
    pub fn clear_async_jobs(&self, threshold: Option<u64>) -> Result<E::Output<bool>> {
        let request = match threshold {
            Some(threshold) => Request::new(Method::Delete, "/_api/job/expired")
                .param("stamp", threshold),
            None => Request::new(Method::Delete, "/_api/job/all"),
        };
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::AsyncJobClear, &resp);
            }
            Ok(true)
        })
    }
}

impl StandardDatabase {
    /// Switch to the async execution context. With `return_result` every
    /// call yields an [`crate::AsyncJob`] handle for polling the outcome;
    /// without it calls are fire-and-forget.
    pub fn begin_async_execution(&self, return_result: bool) -> AsyncDatabase {
        let conn = self.executor.connection().clone();
        Database::with_executor(AsyncExecutor::new(conn, return_result))
    }

    /// Switch to the batch execution context. Calls queue locally until
    /// [`BatchDatabase::commit`].
    pub fn begin_batch_execution(&self, return_result: bool) -> BatchDatabase {
        let conn = self.executor.connection().clone();
        Database::with_executor(Arc::new(BatchExecutor::new(conn, return_result)))
    }

    /// Switch to the cluster round-trip test context: calls run inline but
    /// carry shard routing headers targeting the given shard.
    pub fn begin_cluster_testing(
        &self,
        shard_id: &str,
        transaction_id: &str,
        timeout: Option<u64>,
        synchronous: bool,
    ) -> ClusterTestDatabase {
        let conn = self.executor.connection().clone();
        Database::with_executor(ClusterTestExecutor::new(
            conn,
            shard_id,
            transaction_id,
            timeout,
            synchronous,
        ))
    }

    /// Switch to the transaction execution context. Calls queue as
    /// Javascript statements until [`TransactionDatabase::commit`].
    pub fn begin_transaction(
        &self,
        collections: TransactionCollections,
        options: TransactionOptions,
    ) -> TransactionDatabase {
        let conn = self.executor.connection().clone();
        Database::with_executor(Arc::new(TransactionExecutor::new(
            conn,
            collections,
            options,
        )))
    }
}

impl BatchDatabase {
    /// Flush the queued requests as one multipart call and resolve every
    /// job. Returns the number of requests executed.
    pub fn commit(&self) -> Result<usize> {
        self.executor.commit()
    }

    /// Number of requests waiting for commit.
    pub fn queued(&self) -> usize {
        self.executor.queued()
    }

    /// Discard the queue without sending anything.
    pub fn clear(&self) -> usize {
        self.executor.clear()
    }
}

impl TransactionDatabase {
    /// Execute the buffered statements atomically on the server. Returns
    /// the value of the transaction's `result` variable.
    pub fn commit(&self) -> Result<Value> {
        self.executor.commit()
    }

    /// Queue a raw Javascript statement alongside the API calls.
    pub fn execute_js(&self, statement: impl Into<String>) -> Result<()> {
        self.executor.execute_js(statement)
    }

    /// Bind values visible to the statements as `params`.
    pub fn set_params(&self, params: Value) -> Result<()> {
        self.executor.set_params(params)
    }

    /// Number of buffered statements.
    pub fn queued(&self) -> usize {
        self.executor.queued()
    }
}
