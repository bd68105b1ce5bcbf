use thiserror::Error;

use crate::request::Method;
use crate::response::Response;

pub type Result<T> = std::result::Result<T, ArangoError>;

/// Well-known ArangoDB error numbers the driver inspects.
pub mod errno {
    /// Conflict between two concurrent write operations.
    pub const CONFLICT: i64 = 1200;
    /// Document with the given identifier does not exist.
    pub const DOCUMENT_NOT_FOUND: i64 = 1202;
    /// Collection or view does not exist.
    pub const DATA_SOURCE_NOT_FOUND: i64 = 1203;
    /// Name already taken by another collection or view.
    pub const DUPLICATE_NAME: i64 = 1207;
    /// Unique constraint violated.
    pub const UNIQUE_CONSTRAINT_VIOLATED: i64 = 1210;
    /// Index with the given identifier does not exist.
    pub const INDEX_NOT_FOUND: i64 = 1212;
    /// Cursor with the given identifier does not exist.
    pub const CURSOR_NOT_FOUND: i64 = 1600;
    /// Graph with the given name does not exist.
    pub const GRAPH_NOT_FOUND: i64 = 1924;
}

/// The REST operation family a server-side failure belongs to.
///
/// Every server-reported failure is tagged with one of these so callers can
/// discriminate failure modes by matching instead of parsing status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Operation {
    DocumentInsert,
    DocumentGet,
    DocumentIn,
    DocumentUpdate,
    DocumentReplace,
    DocumentDelete,
    DocumentRevision,
    DocumentCount,
    DocumentAll,
    CollectionList,
    CollectionProperties,
    CollectionCreate,
    CollectionDelete,
    CollectionRename,
    CollectionTruncate,
    CollectionChecksum,
    CollectionExport,
    CursorNext,
    CursorClose,
    IndexList,
    IndexCreate,
    IndexDelete,
    GraphList,
    GraphProperties,
    GraphCreate,
    GraphDelete,
    VertexCollectionList,
    VertexCollectionCreate,
    VertexCollectionDelete,
    EdgeDefinitionList,
    EdgeDefinitionCreate,
    EdgeDefinitionReplace,
    EdgeDefinitionDelete,
    AqlQueryExecute,
    AqlQueryExplain,
    AqlQueryValidate,
    AqlFunctionList,
    AqlFunctionCreate,
    AqlFunctionDelete,
    DatabaseList,
    DatabaseCreate,
    DatabaseDelete,
    TransactionCommit,
    AsyncExecute,
    AsyncJobList,
    AsyncJobClear,
    AsyncJobStatus,
    AsyncJobResult,
    AsyncJobCancel,
    BatchExecute,
    ServerConnection,
    ServerVersion,
    ServerStatus,
    UserList,
    UserCreate,
    UserUpdate,
    UserDelete,
    PermissionGet,
    PermissionUpdate,
}

/// A failure reported by the ArangoDB server, carrying the HTTP status, the
/// ArangoDB error number and the operation family that produced it.
///
/// The message format is fixed: `[HTTP {status}][ERR {num}] {message}` when
/// the server supplied an errorNum, `[HTTP {status}] {message}` otherwise.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ServerError {
    pub operation: Operation,
    pub http_code: u16,
    pub error_code: Option<i64>,
    pub message: String,
    pub method: Method,
    pub url: String,
}

impl ServerError {
    pub(crate) fn new(operation: Operation, resp: &Response) -> Self {
        Self::with_message(operation, resp, None)
    }

    pub(crate) fn with_message(
        operation: Operation,
        resp: &Response,
        message: Option<&str>,
    ) -> Self {
        let base = message
            .map(str::to_string)
            .or_else(|| resp.error_message.clone())
            .unwrap_or_else(|| resp.status_text.clone());
        let message = match resp.error_code {
            Some(code) => format!("[HTTP {}][ERR {}] {}", resp.status_code, code, base),
            None => format!("[HTTP {}] {}", resp.status_code, base),
        };
        ServerError {
            operation,
            http_code: resp.status_code,
            error_code: resp.error_code,
            message,
            method: resp.method,
            url: resp.url.clone(),
        }
    }

    /// True when the server reported the target as missing (HTTP 404 or one
    /// of the "not found" error numbers).
    pub fn is_not_found(&self) -> bool {
        self.http_code == 404
            || matches!(
                self.error_code,
                Some(errno::DOCUMENT_NOT_FOUND)
                    | Some(errno::DATA_SOURCE_NOT_FOUND)
                    | Some(errno::CURSOR_NOT_FOUND)
                    | Some(errno::GRAPH_NOT_FOUND)
            )
    }
}

/// Driver error type. The two branches of the taxonomy are client-side
/// validation failures (no network round trip happened) and server-reported
/// failures (`Server`), plus transport errors from the HTTP layer.
///
/// Nothing is retried automatically; every failure surfaces here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArangoError {
    /// Malformed document reference detected before any network call.
    #[error("{0}")]
    DocumentParse(String),

    /// Invalid use of a batch context (already committed, result not ready).
    #[error("{0}")]
    BatchState(String),

    /// Invalid use of a cursor (e.g. fetching without a cursor id).
    #[error("{0}")]
    CursorState(String),

    /// Invalid use of a transaction context (e.g. a request with no
    /// Javascript equivalent).
    #[error("{0}")]
    TransactionState(String),

    /// Async job misuse detected locally (e.g. result consumed twice).
    #[error("{0}")]
    AsyncJobState(String),

    /// The HTTP layer failed before a response was produced.
    #[error("cannot reach {url}: {reason}")]
    Transport { url: String, reason: String },

    /// Failure reported by the ArangoDB server.
    #[error(transparent)]
    Server(#[from] ServerError),
}

impl ArangoError {
    /// The server-side error, if this is one.
    pub fn as_server(&self) -> Option<&ServerError> {
        match self {
            ArangoError::Server(err) => Some(err),
            _ => None,
        }
    }

    /// True when this is a revision conflict (HTTP 412), the distinguished
    /// family for optimistic-concurrency retry loops.
    pub fn is_revision_conflict(&self) -> bool {
        matches!(
            self,
            ArangoError::Server(ServerError {
                operation: Operation::DocumentRevision,
                ..
            })
        )
    }
}

/// Build the error for a failed response, promoting HTTP 412 to the
/// revision-conflict family regardless of the calling operation.
pub(crate) fn server_error(operation: Operation, resp: &Response) -> ArangoError {
    if resp.status_code == 412 {
        ServerError::new(Operation::DocumentRevision, resp).into()
    } else {
        ServerError::new(operation, resp).into()
    }
}

/// Shorthand used by response handlers: failure with request context dropped
/// (the response already carries method and url).
pub(crate) fn fail<T>(operation: Operation, resp: &Response) -> Result<T> {
    Err(server_error(operation, resp))
}
