use std::sync::Mutex;

use log::debug;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::connection::Connection;
use crate::error::{server_error, ArangoError, Operation, Result};
use crate::executor::Executor;
use crate::request::{Method, Request};
use crate::response::Response;

/// Collections a transaction declares up front, by access mode. ArangoDB
/// acquires the locks before the transaction body runs.
#[derive(Debug, Clone, Default)]
pub struct TransactionCollections {
    pub read: Vec<String>,
    pub write: Vec<String>,
    pub exclusive: Vec<String>,
}

impl TransactionCollections {
    pub fn read(mut self, name: impl Into<String>) -> Self {
        self.read.push(name.into());
        self
    }

    pub fn write(mut self, name: impl Into<String>) -> Self {
        self.write.push(name.into());
        self
    }

    pub fn exclusive(mut self, name: impl Into<String>) -> Self {
        self.exclusive.push(name.into());
        self
    }

    fn to_json(&self) -> Value {
        let mut map = Map::new();
        if !self.read.is_empty() {
            map.insert("read".to_string(), json!(self.read));
        }
        if !self.write.is_empty() {
            map.insert("write".to_string(), json!(self.write));
        }
        if !self.exclusive.is_empty() {
            map.insert("exclusive".to_string(), json!(self.exclusive));
        }
        Value::Object(map)
    }
}

/// Knobs for `/_api/transaction`; all optional.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionOptions {
    /// Seconds to wait for collection locks; 0 means wait forever.
    pub lock_timeout: Option<u64>,
    /// Block until the transaction is synced to disk.
    pub wait_for_sync: Option<bool>,
    /// Transaction size limit in bytes (RocksDB engine only).
    pub max_transaction_size: Option<u64>,
}

// Every queued statement references collections through this handle.
const ACTION_PREAMBLE: &str = "var db = require('internal').db";

struct TransactionState {
    actions: Vec<String>,
    params: Option<Value>,
}

/// Transaction context: API calls are translated to Javascript statements
/// and buffered; [`TransactionExecutor::commit`] wraps them in one function
/// and ships it to `/_api/transaction`, where the server runs everything
/// atomically.
///
/// Only operations with a Javascript equivalent can run here; anything else
/// is rejected at queue time. No values come back per call (`Output<T>` is
/// unit) since nothing has executed yet. `commit` drains the buffer and
/// re-seeds it, so the same context can run further transactions.
pub struct TransactionExecutor {
    conn: Connection,
    id: Uuid,
    collections: TransactionCollections,
    options: TransactionOptions,
    state: Mutex<TransactionState>,
}

impl TransactionExecutor {
    pub fn new(
        conn: Connection,
        collections: TransactionCollections,
        options: TransactionOptions,
    ) -> Self {
        TransactionExecutor {
            conn,
            id: Uuid::new_v4(),
            collections,
            options,
            state: Mutex::new(TransactionState {
                actions: vec![ACTION_PREAMBLE.to_string()],
                params: None,
            }),
        }
    }

    /// Local transaction id; never sent to the server.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Number of buffered statements, excluding the db handle preamble.
    pub fn queued(&self) -> usize {
        self.state.lock().unwrap().actions.len() - 1
    }

    /// Queue a raw Javascript statement.
    pub fn execute_js(&self, statement: impl Into<String>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.actions.push(statement.into());
        Ok(())
    }

    /// Bind values visible to the statements as the `params` argument of the
    /// transaction function.
    pub fn set_params(&self, params: Value) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.params = Some(params);
        Ok(())
    }

    /// Wrap the buffered statements in one function and execute it server
    /// side. Returns the value of the last `result =` assignment, or `null`.
    ///
    /// The buffer is re-seeded whether or not the server accepts the
    /// transaction, so the context is immediately usable for the next one.
    pub fn commit(&self) -> Result<Value> {
        let (actions, params) = {
            let mut state = self.state.lock().unwrap();
            let actions =
                std::mem::replace(&mut state.actions, vec![ACTION_PREAMBLE.to_string()]);
            (actions, state.params.take())
        };
        let action = format!(
            "function (params) {{ var result; {}; return result; }}",
            actions.join("; ")
        );
        debug!("committing transaction {} ({} statements)", self.id, actions.len() - 1);

        let mut data = Map::new();
        data.insert("collections".to_string(), self.collections.to_json());
        data.insert("action".to_string(), json!(action));
        if let Some(timeout) = self.options.lock_timeout {
            data.insert("lockTimeout".to_string(), json!(timeout));
        }
        if let Some(sync) = self.options.wait_for_sync {
            data.insert("waitForSync".to_string(), json!(sync));
        }
        if let Some(size) = self.options.max_transaction_size {
            data.insert("maxTransactionSize".to_string(), json!(size));
        }
        if let Some(params) = params {
            data.insert("params".to_string(), params);
        }

        let request = Request::new(Method::Post, "/_api/transaction").json(Value::Object(data));
        let resp = self.conn.send_request(&request)?;
        if !resp.is_success {
            return Err(server_error(Operation::TransactionCommit, &resp));
        }
        Ok(resp.body_field("result"))
    }
}

impl Executor for TransactionExecutor {
    type Output<T: Send + 'static> = ();

    fn connection(&self) -> &Connection {
        &self.conn
    }

    fn execute<T, H>(&self, request: Request, _handler: H) -> Result<()>
    where
        T: Send + 'static,
        H: FnOnce(Response) -> Result<T> + Send + 'static,
    {
        let statement = request.command.ok_or_else(|| {
            ArangoError::TransactionState(format!(
                "{} {} is not supported in a transaction",
                request.method, request.endpoint
            ))
        })?;
        self.execute_js(statement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClient;
    use std::sync::Arc;

    fn executor(mock: &Arc<MockClient>) -> TransactionExecutor {
        let conn = Connection::new("http://localhost:8529", "test", "root", "pw", mock.clone());
        TransactionExecutor::new(
            conn,
            TransactionCollections::default().write("users"),
            TransactionOptions {
                lock_timeout: Some(5),
                wait_for_sync: Some(true),
                max_transaction_size: None,
            },
        )
    }

    #[test]
    fn commit_wraps_statements_in_one_function() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(200, serde_json::json!({"result": {"inserted": 1}}));
        let txn = executor(&mock);

        txn.execute_js("db.users.insert({\"_key\": \"1\"})").unwrap();
        txn.execute_js("result = db.users.count()").unwrap();
        assert_eq!(txn.queued(), 2);

        let result = txn.commit().expect("commit should succeed");
        assert_eq!(result["inserted"], 1);

        let sent = mock.take_requests();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].url.ends_with("/_db/test/_api/transaction"));
        let body: Value = serde_json::from_str(sent[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["collections"]["write"], serde_json::json!(["users"]));
        assert_eq!(body["lockTimeout"], 5);
        assert_eq!(body["waitForSync"], true);
        let action = body["action"].as_str().unwrap();
        assert!(action.starts_with("function (params) {"));
        assert!(action.contains("var db = require('internal').db"));
        assert!(action.contains("db.users.insert({\"_key\": \"1\"})"));
        assert!(action.contains("return result;"));
    }

    #[test]
    fn params_travel_with_the_commit() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(200, serde_json::json!({"result": null}));
        let txn = executor(&mock);
        txn.set_params(serde_json::json!({"key": "1"})).unwrap();
        txn.execute_js("db.users.remove(params.key)").unwrap();
        txn.commit().unwrap();

        let sent = mock.take_requests();
        let body: Value = serde_json::from_str(sent[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["params"]["key"], "1");
    }

    #[test]
    fn requests_without_js_equivalent_are_rejected() {
        let mock = Arc::new(MockClient::new());
        let txn = executor(&mock);
        let err = txn
            .execute::<Value, _>(Request::new(Method::Get, "/_api/version"), |resp| {
                Ok(resp.body_or_null())
            })
            .expect_err("no command, must fail");
        assert!(matches!(err, ArangoError::TransactionState(_)));
        assert_eq!(txn.queued(), 0);
    }

    #[test]
    fn context_is_reusable_after_commit() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(200, serde_json::json!({"result": 1}));
        mock.push_json(200, serde_json::json!({"result": 2}));
        let txn = executor(&mock);

        txn.execute_js("result = db.users.count()").unwrap();
        assert_eq!(txn.commit().unwrap(), serde_json::json!(1));
        assert_eq!(txn.queued(), 0);

        // The buffer is re-seeded; a second transaction runs on its own.
        txn.execute_js("db.users.truncate()").unwrap();
        txn.execute_js("result = db.users.count()").unwrap();
        assert_eq!(txn.queued(), 2);
        assert_eq!(txn.commit().unwrap(), serde_json::json!(2));

        let sent = mock.take_requests();
        assert_eq!(sent.len(), 2);
        let first: Value = serde_json::from_str(sent[0].body.as_deref().unwrap()).unwrap();
        let second: Value = serde_json::from_str(sent[1].body.as_deref().unwrap()).unwrap();
        assert!(first["action"].as_str().unwrap().contains("var db = require('internal').db"));
        let action = second["action"].as_str().unwrap();
        assert!(action.contains("var db = require('internal').db"));
        assert!(action.contains("db.users.truncate()"));
        // Statements from the first commit do not leak into the second.
        assert_eq!(action.matches("db.users.count()").count(), 1);
    }

    #[test]
    fn server_rejection_surfaces_as_commit_failure() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(
            404,
            serde_json::json!({
                "error": true,
                "errorNum": 1203,
                "errorMessage": "collection or view not found"
            }),
        );
        let txn = executor(&mock);
        txn.execute_js("db.missing.count()").unwrap();
        let err = txn.commit().expect_err("commit must fail");
        let server = err.as_server().expect("server error expected");
        assert_eq!(server.operation, Operation::TransactionCommit);
        assert_eq!(server.error_code, Some(1203));
    }
}
