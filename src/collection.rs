use serde_json::{json, Value};

use crate::cursor::{Cursor, CursorKind};
use crate::document::{self, DocumentSelector};
use crate::error::{errno, fail, server_error, Operation, Result};
use crate::executor::Executor;
use crate::request::{Method, Request};

/// Knobs for [`Collection::insert`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertOptions {
    /// Return the full new document under `new` instead of just metadata.
    pub return_new: bool,
    /// Replace an existing document with the same key instead of failing.
    pub overwrite: bool,
    /// Block until the write is synced to disk.
    pub sync: Option<bool>,
    /// Ask the server for an empty response body.
    pub silent: bool,
}

/// Knobs for [`Collection::update`].
#[derive(Debug, Clone, Copy)]
pub struct UpdateOptions {
    /// Compare the document revision and fail on mismatch.
    pub check_rev: bool,
    /// Merge sub-objects instead of replacing them.
    pub merge: bool,
    /// Keep fields set to `null` instead of removing them.
    pub keep_none: bool,
    pub return_new: bool,
    pub return_old: bool,
    pub sync: Option<bool>,
    pub silent: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        UpdateOptions {
            check_rev: true,
            merge: true,
            keep_none: true,
            return_new: false,
            return_old: false,
            sync: None,
            silent: false,
        }
    }
}

/// Knobs for [`Collection::replace`].
#[derive(Debug, Clone, Copy)]
pub struct ReplaceOptions {
    pub check_rev: bool,
    pub return_new: bool,
    pub return_old: bool,
    pub sync: Option<bool>,
    pub silent: bool,
}

impl Default for ReplaceOptions {
    fn default() -> Self {
        ReplaceOptions {
            check_rev: true,
            return_new: false,
            return_old: false,
            sync: None,
            silent: false,
        }
    }
}

/// Knobs for [`Collection::delete`].
#[derive(Debug, Clone, Copy)]
pub struct DeleteOptions {
    pub check_rev: bool,
    /// Treat a missing document as `None` instead of an error.
    pub ignore_missing: bool,
    pub return_old: bool,
    pub sync: Option<bool>,
    pub silent: bool,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        DeleteOptions {
            check_rev: true,
            ignore_missing: false,
            return_old: false,
            sync: None,
            silent: false,
        }
    }
}

/// Knobs for [`Collection::export`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    /// Flush the WAL before exporting so the snapshot is complete.
    pub flush: bool,
    /// Seconds to wait for the flush.
    pub flush_wait: Option<u64>,
    /// Documents per batch.
    pub batch_size: Option<u64>,
    /// Maximum number of documents, 0 meaning no limit.
    pub limit: Option<u64>,
    /// Server-side cursor time-to-live in seconds.
    pub ttl: Option<u64>,
}

/// API wrapper for one collection, generic over the execution context.
///
/// Every method builds the request and decoder and defers to the executor,
/// so the same wrapper works inline, async, batched or inside a transaction.
pub struct Collection<E> {
    name: String,
    executor: E,
}

impl<E: Executor + Clone> Clone for Collection<E> {
    fn clone(&self) -> Self {
        Collection {
            name: self.name.clone(),
            executor: self.executor.clone(),
        }
    }
}

impl<E: Executor> Collection<E> {
    pub(crate) fn new(name: impl Into<String>, executor: E) -> Self {
        Collection {
            name: name.into(),
            executor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert a new document. Returns the document metadata (`_id`, `_key`,
    /// `_rev`), plus the full document under `new` when requested.
    pub fn insert(&self, body: Value, options: InsertOptions) -> Result<E::Output<Value>> {
        let command = format!("result = db.{}.insert({})", self.name, body);
        let request = Request::new(Method::Post, format!("/_api/document/{}", self.name))
            .param("returnNew", options.return_new)
            .param("overwrite", options.overwrite)
            .param("silent", options.silent)
            .opt_param("waitForSync", options.sync)
            .json(body)
            .command(command);
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::DocumentInsert, &resp);
            }
            Ok(resp.body_or_null())
        })
    }

    /// Fetch a document. `Ok(None)` when it does not exist; a revision
    /// mismatch with `check_rev` surfaces as a revision conflict.
    pub fn get(
        &self,
        selector: impl Into<DocumentSelector>,
        rev: Option<&str>,
        check_rev: bool,
    ) -> Result<E::Output<Option<Value>>> {
        let (id, if_match) =
            document::prep_from_doc(&self.name, &selector.into(), rev, check_rev)?;
        let command = format!("result = db.{}.document('{}')", self.name, id);
        let mut request =
            Request::new(Method::Get, format!("/_api/document/{id}")).command(command);
        if let Some((key, value)) = if_match {
            request = request.header(key, value);
        }
        self.executor.execute(request, |resp| {
            if resp.error_code == Some(errno::DOCUMENT_NOT_FOUND) {
                return Ok(None);
            }
            if !resp.is_success {
                return fail(Operation::DocumentGet, &resp);
            }
            Ok(Some(resp.body_or_null()))
        })
    }

    /// Check that a document exists, without fetching its body.
    pub fn has(
        &self,
        selector: impl Into<DocumentSelector>,
        rev: Option<&str>,
        check_rev: bool,
    ) -> Result<E::Output<bool>> {
        let (id, if_match) =
            document::prep_from_doc(&self.name, &selector.into(), rev, check_rev)?;
        let mut request = Request::new(Method::Head, format!("/_api/document/{id}"));
        if let Some((key, value)) = if_match {
            request = request.header(key, value);
        }
        self.executor.execute(request, |resp| {
            // HEAD responses carry no body, so only the status can be read.
            if resp.status_code == 404 {
                return Ok(false);
            }
            if !resp.is_success {
                return fail(Operation::DocumentIn, &resp);
            }
            Ok(true)
        })
    }

    /// Partially update a document. The body must carry `_key` or `_id`.
    pub fn update(&self, body: Value, options: UpdateOptions) -> Result<E::Output<Value>> {
        let (id, if_match) = document::prep_from_doc(
            &self.name,
            &DocumentSelector::Doc(body.clone()),
            None,
            options.check_rev,
        )?;
        let command = format!("result = db.{}.update('{}', {})", self.name, id, body);
        let mut request = Request::new(Method::Patch, format!("/_api/document/{id}"))
            .param("keepNull", options.keep_none)
            .param("mergeObjects", options.merge)
            .param("returnNew", options.return_new)
            .param("returnOld", options.return_old)
            .param("silent", options.silent)
            .opt_param("waitForSync", options.sync)
            .json(body)
            .command(command);
        if let Some((key, value)) = if_match {
            request = request.header(key, value);
        }
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::DocumentUpdate, &resp);
            }
            Ok(resp.body_or_null())
        })
    }

    /// Replace a document wholesale. The body must carry `_key` or `_id`.
    pub fn replace(&self, body: Value, options: ReplaceOptions) -> Result<E::Output<Value>> {
        let (id, if_match) = document::prep_from_doc(
            &self.name,
            &DocumentSelector::Doc(body.clone()),
            None,
            options.check_rev,
        )?;
        let command = format!("result = db.{}.replace('{}', {})", self.name, id, body);
        let mut request = Request::new(Method::Put, format!("/_api/document/{id}"))
            .param("returnNew", options.return_new)
            .param("returnOld", options.return_old)
            .param("silent", options.silent)
            .opt_param("waitForSync", options.sync)
            .json(body)
            .command(command);
        if let Some((key, value)) = if_match {
            request = request.header(key, value);
        }
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::DocumentReplace, &resp);
            }
            Ok(resp.body_or_null())
        })
    }

    /// Delete a document. With `ignore_missing`, a document that is already
    /// gone yields `Ok(None)` instead of an error.
    pub fn delete(
        &self,
        selector: impl Into<DocumentSelector>,
        rev: Option<&str>,
        options: DeleteOptions,
    ) -> Result<E::Output<Option<Value>>> {
        let (id, if_match) =
            document::prep_from_doc(&self.name, &selector.into(), rev, options.check_rev)?;
        let command = format!("result = db.{}.remove('{}')", self.name, id);
        let mut request = Request::new(Method::Delete, format!("/_api/document/{id}"))
            .param("returnOld", options.return_old)
            .param("silent", options.silent)
            .opt_param("waitForSync", options.sync)
            .command(command);
        if let Some((key, value)) = if_match {
            request = request.header(key, value);
        }
        let ignore_missing = options.ignore_missing;
        self.executor.execute(request, move |resp| {
            if resp.error_code == Some(errno::DOCUMENT_NOT_FOUND) && ignore_missing {
                return Ok(None);
            }
            if !resp.is_success {
                return fail(Operation::DocumentDelete, &resp);
            }
            Ok(Some(resp.body_or_null()))
        })
    }

    /// Number of documents in the collection.
    pub fn count(&self) -> Result<E::Output<u64>> {
        let command = format!("result = db.{}.count()", self.name);
        let request = Request::new(
            Method::Get,
            format!("/_api/collection/{}/count", self.name),
        )
        .command(command);
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::DocumentCount, &resp);
            }
            Ok(resp.body_field("count").as_u64().unwrap_or(0))
        })
    }

    /// Remove every document, keeping the collection and its indexes.
    pub fn truncate(&self) -> Result<E::Output<bool>> {
        let command = format!("db.{}.truncate()", self.name);
        let request = Request::new(
            Method::Put,
            format!("/_api/collection/{}/truncate", self.name),
        )
        .command(command);
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::CollectionTruncate, &resp);
            }
            Ok(true)
        })
    }

    pub fn properties(&self) -> Result<E::Output<Value>> {
        let request = Request::new(
            Method::Get,
            format!("/_api/collection/{}/properties", self.name),
        );
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::CollectionProperties, &resp);
            }
            Ok(resp.body_or_null())
        })
    }

    /// Rename the collection. The wrapper keeps its old name; fetch a fresh
    /// handle from the database afterwards.
    pub fn rename(&self, new_name: &str) -> Result<E::Output<bool>> {
        let request = Request::new(
            Method::Put,
            format!("/_api/collection/{}/rename", self.name),
        )
        .json(json!({ "name": new_name }));
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::CollectionRename, &resp);
            }
            Ok(true)
        })
    }

    /// Collection checksum, for cheap content comparison across servers.
    pub fn checksum(&self, with_rev: bool, with_data: bool) -> Result<E::Output<String>> {
        let request = Request::new(
            Method::Get,
            format!("/_api/collection/{}/checksum", self.name),
        )
        .param("withRevisions", with_rev)
        .param("withData", with_data);
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::CollectionChecksum, &resp);
            }
            Ok(resp
                .body_field("checksum")
                .as_str()
                .unwrap_or_default()
                .to_string())
        })
    }

    /// Cursor over every document, in no particular order.
    pub fn all(&self, skip: Option<u64>, limit: Option<u64>) -> Result<E::Output<Cursor>> {
        let mut data = json!({ "collection": self.name });
        if let Some(skip) = skip {
            data["skip"] = json!(skip);
        }
        if let Some(limit) = limit {
            data["limit"] = json!(limit);
        }
        let request = Request::new(Method::Put, "/_api/simple/all").json(data);
        let conn = self.executor.connection().clone();
        self.executor.execute(request, move |resp| {
            if !resp.is_success {
                return fail(Operation::DocumentAll, &resp);
            }
            Ok(Cursor::from_response(conn, CursorKind::Cursor, &resp))
        })
    }

    /// Cursor over the `_key` of every document.
    pub fn keys(&self) -> Result<E::Output<Cursor>> {
        self.query_field("_key")
    }

    /// Cursor over the `_id` of every document.
    pub fn ids(&self) -> Result<E::Output<Cursor>> {
        self.query_field("_id")
    }

    fn query_field(&self, field: &str) -> Result<E::Output<Cursor>> {
        let request = Request::new(Method::Post, "/_api/cursor").json(json!({
            "query": format!("FOR doc IN @@collection RETURN doc.{field}"),
            "bindVars": { "@collection": self.name },
        }));
        let conn = self.executor.connection().clone();
        self.executor.execute(request, move |resp| {
            if !resp.is_success {
                return fail(Operation::AqlQueryExecute, &resp);
            }
            Ok(Cursor::from_response(conn, CursorKind::Cursor, &resp))
        })
    }

    /// Export the collection contents through the export API, which bypasses
    /// the AQL layer for bulk reads.
    pub fn export(&self, options: ExportOptions) -> Result<E::Output<Cursor>> {
        let mut data = json!({ "flush": options.flush });
        if let Some(wait) = options.flush_wait {
            data["flushWait"] = json!(wait);
        }
        if let Some(size) = options.batch_size {
            data["batchSize"] = json!(size);
        }
        if let Some(limit) = options.limit {
            data["limit"] = json!(limit);
        }
        if let Some(ttl) = options.ttl {
            data["ttl"] = json!(ttl);
        }
        let request = Request::new(Method::Post, "/_api/export")
            .param("collection", &self.name)
            .json(data);
        let conn = self.executor.connection().clone();
        self.executor.execute(request, move |resp| {
            if !resp.is_success {
                return fail(Operation::CollectionExport, &resp);
            }
            Ok(Cursor::from_response(conn, CursorKind::Export, &resp))
        })
    }

    /// List the collection's indexes.
    pub fn indexes(&self) -> Result<E::Output<Vec<Value>>> {
        let request =
            Request::new(Method::Get, "/_api/index").param("collection", &self.name);
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::IndexList, &resp);
            }
            Ok(resp
                .body_field("indexes")
                .as_array()
                .cloned()
                .unwrap_or_default())
        })
    }

    /// Create an index from its raw definition, e.g.
    /// `{"type": "persistent", "fields": ["email"], "unique": true}`.
    pub fn create_index(&self, definition: Value) -> Result<E::Output<Value>> {
        let request = Request::new(Method::Post, "/_api/index")
            .param("collection", &self.name)
            .json(definition);
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::IndexCreate, &resp);
            }
            Ok(resp.body_or_null())
        })
    }

    /// Delete an index by id; accepts either the bare id or the
    /// `collection/id` handle form.
    pub fn delete_index(&self, index_id: &str, ignore_missing: bool) -> Result<E::Output<bool>> {
        let bare = index_id.rsplit('/').next().unwrap_or(index_id);
        let request = Request::new(
            Method::Delete,
            format!("/_api/index/{}/{}", self.name, bare),
        );
        self.executor.execute(request, move |resp| {
            if !resp.is_success {
                if resp.error_code == Some(errno::INDEX_NOT_FOUND) && ignore_missing {
                    return Ok(false);
                }
                return Err(server_error(Operation::IndexDelete, &resp));
            }
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::error::ArangoError;
    use crate::executor::DefaultExecutor;
    use crate::testing::MockClient;
    use std::sync::Arc;

    fn collection(mock: &Arc<MockClient>) -> Collection<DefaultExecutor> {
        let conn = Connection::new("http://localhost:8529", "test", "root", "pw", mock.clone());
        Collection::new("users", DefaultExecutor::new(conn))
    }

    #[test]
    fn insert_posts_to_the_document_endpoint() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(
            201,
            json!({"_id": "users/1", "_key": "1", "_rev": "abc"}),
        );
        let users = collection(&mock);
        let meta = users
            .insert(json!({"_key": "1", "name": "n"}), InsertOptions::default())
            .expect("insert should succeed");
        assert_eq!(meta["_key"], "1");

        let sent = mock.take_requests();
        assert_eq!(sent[0].method, Method::Post);
        assert!(sent[0].url.contains("/_db/test/_api/document/users?"));
        assert!(sent[0].url.contains("returnNew=false"));
    }

    #[test]
    fn get_missing_document_is_none() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(
            404,
            json!({"error": true, "errorNum": 1202, "errorMessage": "document not found"}),
        );
        let users = collection(&mock);
        let doc = users.get("missing", None, true).expect("1202 maps to None");
        assert!(doc.is_none());
    }

    #[test]
    fn get_with_rev_sends_if_match_and_maps_412() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(
            412,
            json!({"error": true, "errorNum": 1200, "errorMessage": "conflict"}),
        );
        let users = collection(&mock);
        let err = users
            .get("users/1", Some("old-rev"), true)
            .expect_err("412 must fail");
        assert!(err.is_revision_conflict());

        let sent = mock.take_requests();
        assert!(sent[0]
            .headers
            .iter()
            .any(|(k, v)| k == "If-Match" && v == "old-rev"));
    }

    #[test]
    fn bad_selector_fails_before_any_network_call() {
        let mock = Arc::new(MockClient::new());
        let users = collection(&mock);
        let err = users
            .get("teams/1", None, true)
            .expect_err("foreign id must fail");
        assert!(matches!(err, ArangoError::DocumentParse(_)));
        assert!(mock.take_requests().is_empty());
    }

    #[test]
    fn update_requires_document_identity() {
        let mock = Arc::new(MockClient::new());
        let users = collection(&mock);
        let err = users
            .update(json!({"name": "x"}), UpdateOptions::default())
            .expect_err("body without _key/_id must fail");
        assert_eq!(err.to_string(), "field \"_key\" or \"_id\" required");
    }

    #[test]
    fn update_patches_with_rev_check() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(
            202,
            json!({"_id": "users/1", "_key": "1", "_rev": "new", "_oldRev": "old"}),
        );
        let users = collection(&mock);
        let meta = users
            .update(
                json!({"_key": "1", "_rev": "old", "name": "x"}),
                UpdateOptions::default(),
            )
            .expect("update should succeed");
        assert_eq!(meta["_rev"], "new");

        let sent = mock.take_requests();
        assert_eq!(sent[0].method, Method::Patch);
        assert!(sent[0].url.contains("/_api/document/users/1?"));
        assert!(sent[0].url.contains("keepNull=true"));
        assert!(sent[0]
            .headers
            .iter()
            .any(|(k, v)| k == "If-Match" && v == "old"));
    }

    #[test]
    fn delete_honors_ignore_missing() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(
            404,
            json!({"error": true, "errorNum": 1202, "errorMessage": "document not found"}),
        );
        mock.push_json(
            404,
            json!({"error": true, "errorNum": 1202, "errorMessage": "document not found"}),
        );
        let users = collection(&mock);

        let gone = users
            .delete(
                "1",
                None,
                DeleteOptions {
                    ignore_missing: true,
                    ..DeleteOptions::default()
                },
            )
            .expect("missing is tolerated");
        assert!(gone.is_none());

        let err = users
            .delete("1", None, DeleteOptions::default())
            .expect_err("missing surfaces without the flag");
        assert_eq!(err.as_server().unwrap().error_code, Some(1202));
    }

    #[test]
    fn has_reads_only_the_status() {
        let mock = Arc::new(MockClient::new());
        mock.push_raw(200, "");
        mock.push_raw(404, "");
        let users = collection(&mock);
        assert!(users.has("1", None, true).unwrap());
        assert!(!users.has("1", None, true).unwrap());
        assert_eq!(mock.take_requests()[0].method, Method::Head);
    }

    #[test]
    fn count_unwraps_the_count_field() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(200, json!({"count": 42}));
        let users = collection(&mock);
        assert_eq!(users.count().unwrap(), 42);
    }

    #[test]
    fn keys_query_binds_the_collection_name() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(201, json!({"result": ["1", "2"], "hasMore": false}));
        let users = collection(&mock);
        let keys: Vec<Value> = users.keys().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(keys, vec![json!("1"), json!("2")]);

        let sent = mock.take_requests();
        let body: Value = serde_json::from_str(sent[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(body["bindVars"]["@collection"], "users");
        assert!(body["query"].as_str().unwrap().contains("RETURN doc._key"));
    }

    #[test]
    fn export_builds_an_export_cursor() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(
            201,
            json!({"id": "11", "result": [{"_key": "1"}], "hasMore": true, "count": 2}),
        );
        mock.push_json(200, json!({"result": [{"_key": "2"}], "hasMore": false}));
        let users = collection(&mock);
        let cursor = users
            .export(ExportOptions {
                flush: true,
                batch_size: Some(1),
                ..ExportOptions::default()
            })
            .expect("export should succeed");
        assert_eq!(cursor.kind(), CursorKind::Export);
        let docs: Vec<Value> = cursor.collect::<Result<_>>().unwrap();
        assert_eq!(docs.len(), 2);

        let sent = mock.take_requests();
        assert!(sent[0].url.contains("/_api/export?collection=users"));
        assert!(sent[1].url.ends_with("/_api/export/11"));
    }

    #[test]
    fn bulk_read_failures_carry_their_own_operation_families() {
        let missing = json!({
            "error": true,
            "errorNum": 1203,
            "errorMessage": "collection or view not found"
        });

        let mock = Arc::new(MockClient::new());
        mock.push_json(404, missing.clone());
        let err = collection(&mock).all(None, None).expect_err("must fail");
        assert_eq!(
            err.as_server().map(|e| e.operation),
            Some(Operation::DocumentAll)
        );

        let mock = Arc::new(MockClient::new());
        mock.push_json(404, missing.clone());
        let err = collection(&mock).keys().expect_err("must fail");
        assert_eq!(
            err.as_server().map(|e| e.operation),
            Some(Operation::AqlQueryExecute)
        );

        let mock = Arc::new(MockClient::new());
        mock.push_json(404, missing);
        let err = collection(&mock)
            .export(ExportOptions::default())
            .expect_err("must fail");
        assert_eq!(
            err.as_server().map(|e| e.operation),
            Some(Operation::CollectionExport)
        );
    }

    #[test]
    fn index_lifecycle_targets_the_index_api() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(
            201,
            json!({"id": "users/9", "type": "persistent", "fields": ["email"]}),
        );
        mock.push_json(200, json!({"indexes": [{"id": "users/0"}, {"id": "users/9"}]}));
        mock.push_json(200, json!({"id": "users/9"}));
        mock.push_json(
            404,
            json!({"error": true, "errorNum": 1212, "errorMessage": "index not found"}),
        );
        let users = collection(&mock);

        let index = users
            .create_index(json!({"type": "persistent", "fields": ["email"], "unique": true}))
            .unwrap();
        assert_eq!(index["id"], "users/9");
        assert_eq!(users.indexes().unwrap().len(), 2);
        assert!(users.delete_index("users/9", false).unwrap());
        assert!(!users.delete_index("users/9", true).unwrap());

        let sent = mock.take_requests();
        assert!(sent[2].url.ends_with("/_api/index/users/9"));
    }
}
