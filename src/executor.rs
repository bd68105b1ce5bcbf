use std::sync::{Arc, Mutex};

use log::debug;

use crate::connection::Connection;
use crate::error::{server_error, ArangoError, Operation, Result, ServerError};
use crate::job::{AsyncJob, BatchJob, BatchSlot};
use crate::multipart;
use crate::request::{Method, Request};
use crate::response::Response;

/// An execution context. Every API wrapper method builds a [`Request`] and a
/// response decoder, then hands both to `execute`; the context decides when
/// and how the request is physically sent and what shape the caller gets
/// back (`Output<T>`): the decoded value directly, a job handle, or nothing
/// until commit.
pub trait Executor {
    /// Per-context return shape for an operation decoding to `T`.
    type Output<T: Send + 'static>;

    /// The connection this context sends over.
    fn connection(&self) -> &Connection;

    fn execute<T, H>(&self, request: Request, handler: H) -> Result<Self::Output<T>>
    where
        T: Send + 'static,
        H: FnOnce(Response) -> Result<T> + Send + 'static;
}

impl<E: Executor> Executor for Arc<E> {
    type Output<T: Send + 'static> = E::Output<T>;

    fn connection(&self) -> &Connection {
        (**self).connection()
    }

    fn execute<T, H>(&self, request: Request, handler: H) -> Result<Self::Output<T>>
    where
        T: Send + 'static,
        H: FnOnce(Response) -> Result<T> + Send + 'static,
    {
        (**self).execute(request, handler)
    }
}

/// Default context: send now, decode now, return the value.
#[derive(Debug, Clone)]
pub struct DefaultExecutor {
    conn: Connection,
}

impl DefaultExecutor {
    pub fn new(conn: Connection) -> Self {
        DefaultExecutor { conn }
    }
}

impl Executor for DefaultExecutor {
    type Output<T: Send + 'static> = T;

    fn connection(&self) -> &Connection {
        &self.conn
    }

    fn execute<T, H>(&self, request: Request, handler: H) -> Result<T>
    where
        T: Send + 'static,
        H: FnOnce(Response) -> Result<T> + Send + 'static,
    {
        let resp = self.conn.send_request(&request)?;
        handler(resp)
    }
}

/// Async context: the request is queued on the server's background task
/// queue and an [`AsyncJob`] handle comes back instead of a value.
///
/// With `return_result` the server stores the result for later retrieval
/// (`x-arango-async: store`); without it the request is fire-and-forget
/// (`x-arango-async: true`) and `execute` returns `None`.
#[derive(Debug, Clone)]
pub struct AsyncExecutor {
    conn: Connection,
    return_result: bool,
}

impl AsyncExecutor {
    pub fn new(conn: Connection, return_result: bool) -> Self {
        AsyncExecutor {
            conn,
            return_result,
        }
    }
}

impl Executor for AsyncExecutor {
    type Output<T: Send + 'static> = Option<AsyncJob<T>>;

    fn connection(&self) -> &Connection {
        &self.conn
    }

    fn execute<T, H>(&self, mut request: Request, handler: H) -> Result<Option<AsyncJob<T>>>
    where
        T: Send + 'static,
        H: FnOnce(Response) -> Result<T> + Send + 'static,
    {
        let marker = if self.return_result { "store" } else { "true" };
        request.set_header("x-arango-async", marker);

        let resp = self.conn.send_request(&request)?;
        if !resp.is_success {
            return Err(server_error(Operation::AsyncExecute, &resp));
        }
        if !self.return_result {
            return Ok(None);
        }
        let job_id = resp
            .header("x-arango-async-id")
            .map(str::to_string)
            .ok_or_else(|| {
                ArangoError::from(ServerError::with_message(
                    Operation::AsyncExecute,
                    &resp,
                    Some("missing x-arango-async-id header"),
                ))
            })?;
        Ok(Some(AsyncJob::new(
            self.conn.clone(),
            job_id,
            Box::new(handler),
        )))
    }
}

/// Cluster round-trip test context: behaves like the default context but
/// stamps every request with the shard routing headers, so calls can be
/// aimed at a specific shard to check reachability and latency.
#[derive(Debug, Clone)]
pub struct ClusterTestExecutor {
    conn: Connection,
    shard_id: String,
    transaction_id: String,
    timeout: Option<u64>,
    synchronous: bool,
}

impl ClusterTestExecutor {
    pub fn new(
        conn: Connection,
        shard_id: impl Into<String>,
        transaction_id: impl Into<String>,
        timeout: Option<u64>,
        synchronous: bool,
    ) -> Self {
        ClusterTestExecutor {
            conn,
            shard_id: shard_id.into(),
            transaction_id: transaction_id.into(),
            timeout,
            synchronous,
        }
    }
}

impl Executor for ClusterTestExecutor {
    type Output<T: Send + 'static> = T;

    fn connection(&self) -> &Connection {
        &self.conn
    }

    fn execute<T, H>(&self, mut request: Request, handler: H) -> Result<T>
    where
        T: Send + 'static,
        H: FnOnce(Response) -> Result<T> + Send + 'static,
    {
        request.set_header("X-Shard-ID", &self.shard_id);
        request.set_header("X-Client-Transaction-ID", &self.transaction_id);
        if let Some(timeout) = self.timeout {
            request.set_header("X-Timeout", &timeout.to_string());
        }
        if self.synchronous {
            request.set_header("X-Synchronous-Mode", "true");
        }
        let resp = self.conn.send_request(&request)?;
        handler(resp)
    }
}

type Resolver = Box<dyn FnOnce(Response) + Send>;

struct QueuedRequest {
    request: Request,
    resolver: Resolver,
}

struct BatchQueue {
    committed: bool,
    queue: Vec<QueuedRequest>,
}

/// Batch context: requests accumulate in memory and are flushed as one
/// multipart call to `/_api/batch` on [`BatchExecutor::commit`]. Each
/// `execute` returns a [`BatchJob`] stub immediately; the captured decoders
/// run at commit time against the positionally matched sub-responses.
pub struct BatchExecutor {
    conn: Connection,
    return_result: bool,
    state: Mutex<BatchQueue>,
}

impl BatchExecutor {
    pub fn new(conn: Connection, return_result: bool) -> Self {
        BatchExecutor {
            conn,
            return_result,
            state: Mutex::new(BatchQueue {
                committed: false,
                queue: Vec::new(),
            }),
        }
    }

    /// Number of requests waiting for commit.
    pub fn queued(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub fn is_committed(&self) -> bool {
        self.state.lock().unwrap().committed
    }

    /// Discard the queue without sending anything. Any jobs handed out so
    /// far stay pending forever. Returns the number of discarded requests.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        let discarded = state.queue.len();
        state.queue.clear();
        discarded
    }

    /// Flush the queue as one multipart request and resolve every job.
    ///
    /// An HTTP failure of the combined call surfaces here as one batch
    /// execute error and leaves the jobs pending; failures of individual
    /// sub-requests surface only through each job's `result()`. Returns the
    /// number of requests executed.
    pub fn commit(&self) -> Result<usize> {
        let queued = {
            let mut state = self.state.lock().unwrap();
            if state.committed {
                return Err(ArangoError::BatchState("batch already committed".to_string()));
            }
            state.committed = true;
            std::mem::take(&mut state.queue)
        };
        if queued.is_empty() {
            return Ok(0);
        }

        let requests: Vec<Request> = queued.iter().map(|q| q.request.clone()).collect();
        let body = multipart::serialize_batch(&requests);
        debug!("committing batch of {} requests", queued.len());

        let request = Request::new(Method::Post, "/_api/batch")
            .header("content-type", multipart::content_type())
            .raw(body);
        let resp = self.conn.send_request(&request)?;
        if !resp.is_success {
            return Err(server_error(Operation::BatchExecute, &resp));
        }

        let parts = multipart::parse_batch(&resp.raw_body)?;
        if parts.len() != queued.len() {
            return Err(ArangoError::BatchState(format!(
                "batch response has {} parts, expected {}",
                parts.len(),
                queued.len()
            )));
        }

        let count = queued.len();
        for (queued, part) in queued.into_iter().zip(parts) {
            let url = self.conn.request_url(&queued.request);
            let sub_response = Response::from_raw(
                queued.request.method,
                url,
                part.status_code,
                part.status_text,
                Default::default(),
                part.body,
            );
            (queued.resolver)(sub_response);
        }
        Ok(count)
    }
}

impl Executor for BatchExecutor {
    type Output<T: Send + 'static> = Option<BatchJob<T>>;

    fn connection(&self) -> &Connection {
        &self.conn
    }

    fn execute<T, H>(&self, request: Request, handler: H) -> Result<Option<BatchJob<T>>>
    where
        T: Send + 'static,
        H: FnOnce(Response) -> Result<T> + Send + 'static,
    {
        let mut state = self.state.lock().unwrap();
        if state.committed {
            return Err(ArangoError::BatchState("batch already committed".to_string()));
        }

        if !self.return_result {
            state.queue.push(QueuedRequest {
                request,
                resolver: Box::new(|_| {}),
            });
            return Ok(None);
        }

        let (job, slot) = BatchJob::new();
        let resolver: Resolver = Box::new(move |resp| {
            let result = handler(resp);
            *slot.lock().unwrap() = BatchSlot::Done(Some(result));
        });
        state.queue.push(QueuedRequest { request, resolver });
        Ok(Some(job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::errno;
    use crate::job::JobStatus;
    use crate::testing::MockClient;
    use serde_json::{json, Value};

    fn connection(mock: &Arc<MockClient>) -> Connection {
        Connection::new("http://localhost:8529", "test", "root", "pw", mock.clone())
    }

    fn version_request() -> Request {
        Request::new(Method::Get, "/_api/version")
    }

    fn version_handler(resp: Response) -> Result<String> {
        if !resp.is_success {
            return Err(server_error(Operation::ServerVersion, &resp));
        }
        Ok(resp
            .body_field("version")
            .as_str()
            .unwrap_or_default()
            .to_string())
    }

    #[test]
    fn default_executor_decodes_inline() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(200, json!({"server": "arango", "version": "3.12.0"}));
        let exec = DefaultExecutor::new(connection(&mock));
        let version = exec
            .execute(version_request(), version_handler)
            .expect("execute should succeed");
        assert_eq!(version, "3.12.0");
    }

    #[test]
    fn cluster_test_executor_stamps_the_routing_headers() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(200, json!({"server": "arango", "version": "3.12.0"}));
        let exec = ClusterTestExecutor::new(connection(&mock), "s1001", "trx-7", Some(30), true);
        let version = exec
            .execute(version_request(), version_handler)
            .expect("execute should succeed");
        assert_eq!(version, "3.12.0");

        let sent = mock.take_requests();
        let has = |name: &str, value: &str| {
            sent[0].headers.iter().any(|(k, v)| k == name && v == value)
        };
        assert!(has("X-Shard-ID", "s1001"));
        assert!(has("X-Client-Transaction-ID", "trx-7"));
        assert!(has("X-Timeout", "30"));
        assert!(has("X-Synchronous-Mode", "true"));
    }

    #[test]
    fn async_executor_returns_a_job_without_decoding() {
        let mock = Arc::new(MockClient::new());
        mock.push_with_headers(202, json!({}), &[("x-arango-async-id", "265413")]);
        let exec = AsyncExecutor::new(connection(&mock), true);

        let job = exec
            .execute(version_request(), version_handler)
            .expect("execute should succeed")
            .expect("job expected when return_result is set");
        assert_eq!(job.id(), "265413");

        let sent = mock.take_requests();
        assert!(sent[0]
            .headers
            .iter()
            .any(|(k, v)| k == "x-arango-async" && v == "store"));
    }

    #[test]
    fn async_executor_fire_and_forget_returns_none() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(202, json!({}));
        let exec = AsyncExecutor::new(connection(&mock), false);
        let job = exec
            .execute(version_request(), version_handler)
            .expect("execute should succeed");
        assert!(job.is_none());

        let sent = mock.take_requests();
        assert!(sent[0]
            .headers
            .iter()
            .any(|(k, v)| k == "x-arango-async" && v == "true"));
    }

    #[test]
    fn async_job_result_runs_the_captured_decoder() {
        let mock = Arc::new(MockClient::new());
        mock.push_with_headers(202, json!({}), &[("x-arango-async-id", "9")]);
        // status poll: still pending, then done
        mock.push_json(204, json!(null));
        mock.push_json(200, json!({})); // status done
        // result fetch carries the async id header back
        mock.push_with_headers(
            200,
            json!({"server": "arango", "version": "3.12.0"}),
            &[("x-arango-async-id", "9")],
        );
        // second result fetch: the server already deleted the result
        mock.push_json(404, json!({"error": true, "errorNum": 404}));

        let exec = AsyncExecutor::new(connection(&mock), true);
        let job = exec
            .execute(version_request(), version_handler)
            .unwrap()
            .unwrap();

        assert_eq!(job.status().unwrap(), JobStatus::Pending);
        assert_eq!(job.status().unwrap(), JobStatus::Done);
        assert_eq!(job.result().unwrap(), "3.12.0");

        let err = job.result().expect_err("second fetch must fail");
        let server = err.as_server().expect("server error expected");
        assert_eq!(server.operation, Operation::AsyncJobResult);
        assert!(server.message.contains("job 9 not found"));
    }

    fn batch_reply(parts: &[(u16, &str, &str)]) -> String {
        let mut raw = String::new();
        for (index, (code, text, body)) in parts.iter().enumerate() {
            raw.push_str(&format!(
                "--XXXsubpartXXX\r\nContent-Type: application/x-arango-batchpart\r\nContent-Id: {}\r\n\r\n",
                index + 1
            ));
            raw.push_str(&format!("HTTP/1.1 {code} {text}\r\n"));
            raw.push_str("Content-Type: application/json; charset=utf-8\r\n\r\n");
            raw.push_str(body);
            raw.push_str("\r\n");
        }
        raw.push_str("--XXXsubpartXXX--\r\n\r\n");
        raw
    }

    fn document_handler(resp: Response) -> Result<Value> {
        if resp.error_code == Some(errno::DOCUMENT_NOT_FOUND) {
            return Err(server_error(Operation::DocumentGet, &resp));
        }
        if !resp.is_success {
            return Err(server_error(Operation::DocumentGet, &resp));
        }
        Ok(resp.body_or_null())
    }

    #[test]
    fn batch_commit_resolves_jobs_positionally() {
        let mock = Arc::new(MockClient::new());
        mock.push_raw(
            200,
            &batch_reply(&[
                (201, "Created", r#"{"_id":"users/1","_key":"1","_rev":"a"}"#),
                (
                    404,
                    "Not Found",
                    r#"{"error":true,"errorNum":1202,"errorMessage":"document not found"}"#,
                ),
                (200, "OK", r#"{"_id":"users/2","_key":"2","_rev":"b"}"#),
            ]),
        );
        let exec = BatchExecutor::new(connection(&mock), true);

        let job1 = exec
            .execute(
                Request::new(Method::Post, "/_api/document/users").json(json!({"_key": "1"})),
                document_handler,
            )
            .unwrap()
            .unwrap();
        let job2 = exec
            .execute(
                Request::new(Method::Get, "/_api/document/users/missing"),
                document_handler,
            )
            .unwrap()
            .unwrap();
        let job3 = exec
            .execute(
                Request::new(Method::Get, "/_api/document/users/2"),
                document_handler,
            )
            .unwrap()
            .unwrap();

        assert_eq!(exec.queued(), 3);
        assert_eq!(job1.status(), JobStatus::Pending);

        let executed = exec.commit().expect("commit should succeed");
        assert_eq!(executed, 3);

        assert_eq!(job1.result().unwrap()["_key"], "1");
        let err = job2.result().expect_err("missing document is the job's failure");
        assert_eq!(err.as_server().unwrap().error_code, Some(1202));
        assert_eq!(job3.result().unwrap()["_key"], "2");

        // The one wire call was the multipart POST.
        let sent = mock.take_requests();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].url.ends_with("/_db/test/_api/batch"));
        let body = sent[0].body.as_deref().unwrap_or("");
        assert!(body.contains("POST /_api/document/users HTTP/1.1"));
        assert!(body.contains("GET /_api/document/users/missing HTTP/1.1"));
    }

    #[test]
    fn batch_rejects_use_after_commit() {
        let mock = Arc::new(MockClient::new());
        let exec = BatchExecutor::new(connection(&mock), true);
        assert_eq!(exec.commit().expect("empty commit is a no-op"), 0);

        let err = exec
            .execute(version_request(), version_handler)
            .expect_err("execute after commit must fail");
        assert!(matches!(err, ArangoError::BatchState(_)));
        let err = exec.commit().expect_err("second commit must fail");
        assert!(matches!(err, ArangoError::BatchState(_)));
    }

    #[test]
    fn batch_http_failure_leaves_jobs_pending() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(
            500,
            json!({"error": true, "errorNum": 4, "errorMessage": "out of memory"}),
        );
        let exec = BatchExecutor::new(connection(&mock), true);
        let job = exec
            .execute(version_request(), version_handler)
            .unwrap()
            .unwrap();

        let err = exec.commit().expect_err("commit must fail");
        assert_eq!(
            err.as_server().map(|e| e.operation),
            Some(Operation::BatchExecute)
        );
        assert_eq!(job.status(), JobStatus::Pending);
    }
}
