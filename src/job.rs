use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::connection::Connection;
use crate::error::{server_error, ArangoError, Operation, Result, ServerError};
use crate::request::{Method, Request};
use crate::response::Response;

pub(crate) type Handler<T> = Box<dyn FnOnce(Response) -> Result<T> + Send>;

/// Status of an async or batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Still queued (async: on the server; batch: commit not called yet).
    Pending,
    /// Finished; the result (success or failure) can be read.
    Done,
}

/// Handle for a request executed on the server's background task queue.
///
/// Holds the server-minted job id and the response decoder captured at
/// submission time. The decoder runs lazily inside [`AsyncJob::result`]; a
/// decode failure becomes the job's result rather than surfacing anywhere
/// else. The server deletes a stored result after its first successful fetch,
/// so `result()` consumes the handle's decoder and a second fetch reports the
/// job as missing.
pub struct AsyncJob<T> {
    conn: Connection,
    id: String,
    handler: Mutex<Option<Handler<T>>>,
}

impl<T> std::fmt::Debug for AsyncJob<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncJob")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<T> AsyncJob<T> {
    pub(crate) fn new(conn: Connection, id: String, handler: Handler<T>) -> Self {
        AsyncJob {
            conn,
            id,
            handler: Mutex::new(Some(handler)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Poll the server for the job status.
    pub fn status(&self) -> Result<JobStatus> {
        let request = Request::new(Method::Get, format!("/_api/job/{}", self.id));
        let resp = self.conn.send_request(&request)?;
        if resp.status_code == 204 {
            Ok(JobStatus::Pending)
        } else if resp.is_success {
            Ok(JobStatus::Done)
        } else if self.reports_missing(&resp) {
            Err(ServerError::with_message(
                Operation::AsyncJobStatus,
                &resp,
                Some(&format!("job {} not found", self.id)),
            )
            .into())
        } else {
            Err(server_error(Operation::AsyncJobStatus, &resp))
        }
    }

    /// Fetch the job result from the server and run the captured decoder.
    ///
    /// Both the decoded value and any domain error the decoder produces
    /// surface here, mirroring future semantics: `result()` is the single
    /// place the outcome is observed.
    pub fn result(&self) -> Result<T> {
        let request = Request::new(Method::Put, format!("/_api/job/{}", self.id));
        let resp = self.conn.send_request(&request)?;

        if resp.header("x-arango-async-id").is_some() {
            let handler = self.handler.lock().unwrap().take().ok_or_else(|| {
                ArangoError::AsyncJobState(format!("result of job {} already retrieved", self.id))
            })?;
            return handler(resp);
        }

        if resp.status_code == 204 {
            Err(ServerError::with_message(
                Operation::AsyncJobResult,
                &resp,
                Some(&format!("job {} not done", self.id)),
            )
            .into())
        } else if self.reports_missing(&resp) {
            Err(ServerError::with_message(
                Operation::AsyncJobResult,
                &resp,
                Some(&format!("job {} not found", self.id)),
            )
            .into())
        } else {
            Err(server_error(Operation::AsyncJobResult, &resp))
        }
    }

    /// Ask the server to drop the job while it is still queued.
    pub fn cancel(&self, ignore_missing: bool) -> Result<bool> {
        let request = Request::new(Method::Put, format!("/_api/job/{}/cancel", self.id));
        let resp = self.conn.send_request(&request)?;
        if resp.is_success {
            Ok(true)
        } else if self.reports_missing(&resp) {
            if ignore_missing {
                return Ok(false);
            }
            Err(ServerError::with_message(
                Operation::AsyncJobCancel,
                &resp,
                Some(&format!("job {} not found", self.id)),
            )
            .into())
        } else {
            Err(server_error(Operation::AsyncJobCancel, &resp))
        }
    }

    /// Delete the stored job result from the server.
    pub fn clear(&self, ignore_missing: bool) -> Result<bool> {
        let request = Request::new(Method::Delete, format!("/_api/job/{}", self.id));
        let resp = self.conn.send_request(&request)?;
        if resp.is_success {
            Ok(true)
        } else if self.reports_missing(&resp) {
            if ignore_missing {
                return Ok(false);
            }
            Err(ServerError::with_message(
                Operation::AsyncJobClear,
                &resp,
                Some(&format!("job {} not found", self.id)),
            )
            .into())
        } else {
            Err(server_error(Operation::AsyncJobClear, &resp))
        }
    }

    fn reports_missing(&self, resp: &Response) -> bool {
        resp.status_code == 404 || resp.error_code == Some(404)
    }
}

pub(crate) enum BatchSlot<T> {
    Pending,
    Done(Option<Result<T>>),
}

/// Handle for a request queued in a batch context.
///
/// Materializes its outcome when the owning batch commits: the captured
/// decoder runs against the matching multipart sub-response and the result
/// (success or typed failure) is stored on the job, observed once via
/// [`BatchJob::result`].
pub struct BatchJob<T> {
    id: Uuid,
    slot: Arc<Mutex<BatchSlot<T>>>,
}

impl<T> std::fmt::Debug for BatchJob<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchJob")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish()
    }
}

impl<T> BatchJob<T> {
    pub(crate) fn new() -> (Self, Arc<Mutex<BatchSlot<T>>>) {
        let slot = Arc::new(Mutex::new(BatchSlot::Pending));
        let job = BatchJob {
            id: Uuid::new_v4(),
            slot: slot.clone(),
        };
        (job, slot)
    }

    /// Local job id; never sent to the server.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn status(&self) -> JobStatus {
        match *self.slot.lock().unwrap() {
            BatchSlot::Pending => JobStatus::Pending,
            BatchSlot::Done(_) => JobStatus::Done,
        }
    }

    /// Take the stored result. Errors if the batch was not committed yet or
    /// if the result was already taken.
    pub fn result(&self) -> Result<T> {
        let mut slot = self.slot.lock().unwrap();
        match &mut *slot {
            BatchSlot::Pending => Err(ArangoError::BatchState(
                "result not available yet".to_string(),
            )),
            BatchSlot::Done(result) => result.take().ok_or_else(|| {
                ArangoError::BatchState("result already retrieved".to_string())
            })?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_job_result_is_observed_once() {
        let (job, slot) = BatchJob::<i32>::new();
        assert_eq!(job.status(), JobStatus::Pending);
        assert!(format!("{job:?}").contains("Pending"));
        assert!(matches!(job.result(), Err(ArangoError::BatchState(_))));

        *slot.lock().unwrap() = BatchSlot::Done(Some(Ok(7)));
        assert_eq!(job.status(), JobStatus::Done);
        assert_eq!(job.result().unwrap(), 7);
        assert!(matches!(job.result(), Err(ArangoError::BatchState(_))));
    }

    #[test]
    fn batch_job_stores_failures_as_results() {
        let (job, slot) = BatchJob::<i32>::new();
        *slot.lock().unwrap() = BatchSlot::Done(Some(Err(ArangoError::DocumentParse(
            "field \"_key\" or \"_id\" required".to_string(),
        ))));
        assert_eq!(job.status(), JobStatus::Done);
        assert!(matches!(job.result(), Err(ArangoError::DocumentParse(_))));
    }
}
