use std::collections::VecDeque;

use log::trace;
use serde_json::Value;

use crate::connection::Connection;
use crate::error::{server_error, ArangoError, Operation, Result};
use crate::request::{Method, Request};
use crate::response::Response;

/// Which server-side cursor API a [`Cursor`] talks to. Both share the fetch
/// and close protocol, only the endpoint prefix differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKind {
    /// AQL query cursor (`/_api/cursor`).
    Cursor,
    /// Collection export cursor (`/_api/export`).
    Export,
}

impl CursorKind {
    fn endpoint(&self, id: &str) -> String {
        match self {
            CursorKind::Cursor => format!("/_api/cursor/{id}"),
            CursorKind::Export => format!("/_api/export/{id}"),
        }
    }
}

/// Client-side view of a server-side result cursor.
///
/// Holds the current batch locally; [`Cursor::next_document`] pops from it
/// and fetches the next batch from the server when the local one runs dry
/// and the server reports more. A cursor that arrived fully in the first
/// batch has no server-side id and never makes another round trip.
///
/// Dropping a cursor does not close it on the server; call [`Cursor::close`]
/// or let the server's TTL expire it.
#[derive(Debug)]
pub struct Cursor {
    conn: Connection,
    kind: CursorKind,
    id: Option<String>,
    batch: VecDeque<Value>,
    has_more: bool,
    count: Option<u64>,
    cached: bool,
    stats: Option<Value>,
    warnings: Vec<Value>,
}

impl Cursor {
    pub(crate) fn from_response(conn: Connection, kind: CursorKind, resp: &Response) -> Self {
        let mut cursor = Cursor {
            conn,
            kind,
            id: None,
            batch: VecDeque::new(),
            has_more: false,
            count: None,
            cached: false,
            stats: None,
            warnings: Vec::new(),
        };
        cursor.update(resp);
        cursor
    }

    fn update(&mut self, resp: &Response) {
        let body = resp.body_or_null();
        if let Some(id) = body.get("id").and_then(Value::as_str) {
            self.id = Some(id.to_string());
        }
        if let Some(result) = body.get("result").and_then(Value::as_array) {
            self.batch.extend(result.iter().cloned());
        }
        self.has_more = body
            .get("hasMore")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if let Some(count) = body.get("count").and_then(Value::as_u64) {
            self.count = Some(count);
        }
        if let Some(cached) = body.get("cached").and_then(Value::as_bool) {
            self.cached = cached;
        }
        if let Some(extra) = body.get("extra") {
            if let Some(stats) = extra.get("stats") {
                self.stats = Some(stats.clone());
            }
            if let Some(warnings) = extra.get("warnings").and_then(Value::as_array) {
                self.warnings = warnings.clone();
            }
        }
    }

    /// Server-side cursor id, absent once exhausted or fully local.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn kind(&self) -> CursorKind {
        self.kind
    }

    /// Total result count, present only when the query asked for it. Named
    /// apart from `Iterator::count`, which would otherwise shadow it.
    pub fn result_count(&self) -> Option<u64> {
        self.count
    }

    /// Whether the result came from the query cache.
    pub fn cached(&self) -> bool {
        self.cached
    }

    /// Execution statistics from the last batch, if the server sent any.
    pub fn stats(&self) -> Option<&Value> {
        self.stats.as_ref()
    }

    pub fn warnings(&self) -> &[Value] {
        &self.warnings
    }

    /// Documents still buffered locally.
    pub fn batch_len(&self) -> usize {
        self.batch.len()
    }

    pub fn has_more(&self) -> bool {
        !self.batch.is_empty() || self.has_more
    }

    /// Pop the next document, fetching batches from the server as needed.
    /// `Ok(None)` means the cursor is exhausted.
    pub fn next_document(&mut self) -> Result<Option<Value>> {
        loop {
            if let Some(doc) = self.batch.pop_front() {
                return Ok(Some(doc));
            }
            if !self.has_more {
                return Ok(None);
            }
            self.fetch()?;
        }
    }

    /// Fetch the next batch from the server into the local buffer.
    pub fn fetch(&mut self) -> Result<()> {
        let id = self.id.clone().ok_or_else(|| {
            ArangoError::CursorState("cursor has no server-side id".to_string())
        })?;
        trace!("fetching next batch for cursor {id}");
        let request = Request::new(Method::Put, self.kind.endpoint(&id));
        let resp = self.conn.send_request(&request)?;
        if !resp.is_success {
            return Err(server_error(Operation::CursorNext, &resp));
        }
        self.update(&resp);
        if !self.has_more {
            self.id = None;
        }
        Ok(())
    }

    /// Delete the cursor on the server. Returns `Ok(false)` when there is
    /// nothing to close (no server-side id), or when the server no longer
    /// knows the cursor and `ignore_missing` is set.
    pub fn close(&mut self, ignore_missing: bool) -> Result<bool> {
        let id = match self.id.clone() {
            Some(id) => id,
            None => return Ok(false),
        };
        let request = Request::new(Method::Delete, self.kind.endpoint(&id));
        let resp = self.conn.send_request(&request)?;
        if resp.is_success {
            self.id = None;
            return Ok(true);
        }
        if resp.status_code == 404 && ignore_missing {
            self.id = None;
            return Ok(false);
        }
        Err(server_error(Operation::CursorClose, &resp))
    }
}

impl Iterator for Cursor {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_document().transpose()
    }
}
