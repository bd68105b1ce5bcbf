use serde_json::{json, Value};

use crate::document::{self, DocumentSelector};
use crate::error::{errno, fail, Operation, Result};
use crate::executor::Executor;
use crate::request::{Method, Request};

/// One edge definition: a relation collection plus the vertex collections
/// its edges may start from and point to.
#[derive(Debug, Clone)]
pub struct EdgeDefinition {
    pub edge_collection: String,
    pub from_collections: Vec<String>,
    pub to_collections: Vec<String>,
}

impl EdgeDefinition {
    pub fn new(
        edge_collection: impl Into<String>,
        from_collections: Vec<String>,
        to_collections: Vec<String>,
    ) -> Self {
        EdgeDefinition {
            edge_collection: edge_collection.into(),
            from_collections,
            to_collections,
        }
    }

    pub(crate) fn to_json(&self) -> Value {
        json!({
            "collection": self.edge_collection,
            "from": self.from_collections,
            "to": self.to_collections,
        })
    }
}

/// API wrapper for one named graph, generic over the execution context.
///
/// Vertex and edge operations go through `/_api/gharial`, which keeps the
/// graph's edge definitions consistent (e.g. deleting a vertex also deletes
/// its edges), unlike the plain document API.
pub struct Graph<E> {
    name: String,
    executor: E,
}

impl<E: Executor + Clone> Clone for Graph<E> {
    fn clone(&self) -> Self {
        Graph {
            name: self.name.clone(),
            executor: self.executor.clone(),
        }
    }
}

impl<E: Executor> Graph<E> {
    pub(crate) fn new(name: impl Into<String>, executor: E) -> Self {
        Graph {
            name: name.into(),
            executor,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> Result<E::Output<Value>> {
        let request = Request::new(Method::Get, format!("/_api/gharial/{}", self.name));
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::GraphProperties, &resp);
            }
            Ok(resp.body_field("graph"))
        })
    }

    /// Names of the vertex collections in the graph, including orphans.
    pub fn vertex_collections(&self) -> Result<E::Output<Vec<String>>> {
        let request = Request::new(Method::Get, format!("/_api/gharial/{}/vertex", self.name));
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::VertexCollectionList, &resp);
            }
            let mut names: Vec<String> = resp
                .body_field("collections")
                .as_array()
                .map(|list| {
                    list.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            names.sort();
            Ok(names)
        })
    }

    /// Add a vertex collection to the graph, creating it if needed.
    pub fn create_vertex_collection(&self, name: &str) -> Result<E::Output<Value>> {
        let request = Request::new(Method::Post, format!("/_api/gharial/{}/vertex", self.name))
            .json(json!({ "collection": name }));
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::VertexCollectionCreate, &resp);
            }
            Ok(resp.body_field("graph"))
        })
    }

    /// Remove a vertex collection from the graph; with `purge` the
    /// underlying collection is dropped as well.
    pub fn delete_vertex_collection(&self, name: &str, purge: bool) -> Result<E::Output<bool>> {
        let request = Request::new(
            Method::Delete,
            format!("/_api/gharial/{}/vertex/{}", self.name, name),
        )
        .param("dropCollection", purge);
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::VertexCollectionDelete, &resp);
            }
            Ok(true)
        })
    }

    pub fn edge_definitions(&self) -> Result<E::Output<Vec<Value>>> {
        let request = Request::new(Method::Get, format!("/_api/gharial/{}", self.name));
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::EdgeDefinitionList, &resp);
            }
            Ok(resp
                .body_field("graph")
                .get("edgeDefinitions")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default())
        })
    }

    pub fn create_edge_definition(
        &self,
        definition: &EdgeDefinition,
    ) -> Result<E::Output<Value>> {
        let request = Request::new(Method::Post, format!("/_api/gharial/{}/edge", self.name))
            .json(definition.to_json());
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::EdgeDefinitionCreate, &resp);
            }
            Ok(resp.body_field("graph"))
        })
    }

    pub fn replace_edge_definition(
        &self,
        definition: &EdgeDefinition,
    ) -> Result<E::Output<Value>> {
        let request = Request::new(
            Method::Put,
            format!(
                "/_api/gharial/{}/edge/{}",
                self.name, definition.edge_collection
            ),
        )
        .json(definition.to_json());
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::EdgeDefinitionReplace, &resp);
            }
            Ok(resp.body_field("graph"))
        })
    }

    /// Remove an edge definition; with `purge` the edge collection is
    /// dropped as well.
    pub fn delete_edge_definition(&self, name: &str, purge: bool) -> Result<E::Output<bool>> {
        let request = Request::new(
            Method::Delete,
            format!("/_api/gharial/{}/edge/{}", self.name, name),
        )
        .param("dropCollections", purge);
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::EdgeDefinitionDelete, &resp);
            }
            Ok(true)
        })
    }

    pub fn insert_vertex(&self, collection: &str, body: Value) -> Result<E::Output<Value>> {
        let request = Request::new(
            Method::Post,
            format!("/_api/gharial/{}/vertex/{}", self.name, collection),
        )
        .json(body);
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::DocumentInsert, &resp);
            }
            Ok(resp.body_field("vertex"))
        })
    }

    /// Fetch a vertex; `Ok(None)` when it does not exist.
    pub fn vertex(
        &self,
        collection: &str,
        selector: impl Into<DocumentSelector>,
        rev: Option<&str>,
        check_rev: bool,
    ) -> Result<E::Output<Option<Value>>> {
        let (id, if_match) =
            document::prep_from_doc(collection, &selector.into(), rev, check_rev)?;
        let mut request = Request::new(
            Method::Get,
            format!("/_api/gharial/{}/vertex/{}", self.name, id),
        );
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
            Ok(Some(resp.body_field("vertex")))
        })
    }

    pub fn update_vertex(&self, collection: &str, body: Value) -> Result<E::Output<Value>> {
        let (id, if_match) = document::prep_from_doc(
            collection,
            &DocumentSelector::Doc(body.clone()),
            None,
            true,
        )?;
        let mut request = Request::new(
            Method::Patch,
            format!("/_api/gharial/{}/vertex/{}", self.name, id),
        )
        .json(body);
        if let Some((key, value)) = if_match {
            request = request.header(key, value);
        }
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::DocumentUpdate, &resp);
            }
            Ok(resp.body_field("vertex"))
        })
    }

    pub fn replace_vertex(&self, collection: &str, body: Value) -> Result<E::Output<Value>> {
        let (id, if_match) = document::prep_from_doc(
            collection,
            &DocumentSelector::Doc(body.clone()),
            None,
            true,
        )?;
        let mut request = Request::new(
            Method::Put,
            format!("/_api/gharial/{}/vertex/{}", self.name, id),
        )
        .json(body);
        if let Some((key, value)) = if_match {
            request = request.header(key, value);
        }
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::DocumentReplace, &resp);
            }
            Ok(resp.body_field("vertex"))
        })
    }

    /// Delete a vertex along with every edge touching it.
    pub fn delete_vertex(
        &self,
        collection: &str,
        selector: impl Into<DocumentSelector>,
        rev: Option<&str>,
        check_rev: bool,
        ignore_missing: bool,
    ) -> Result<E::Output<bool>> {
        let (id, if_match) =
            document::prep_from_doc(collection, &selector.into(), rev, check_rev)?;
        let mut request = Request::new(
            Method::Delete,
            format!("/_api/gharial/{}/vertex/{}", self.name, id),
        );
        if let Some((key, value)) = if_match {
            request = request.header(key, value);
        }
        self.executor.execute(request, move |resp| {
            if resp.error_code == Some(errno::DOCUMENT_NOT_FOUND) && ignore_missing {
                return Ok(false);
            }
            if !resp.is_success {
                return fail(Operation::DocumentDelete, &resp);
            }
            Ok(true)
        })
    }

    /// Insert an edge; the body must carry `_from` and `_to` handles.
    pub fn insert_edge(&self, collection: &str, body: Value) -> Result<E::Output<Value>> {
        let request = Request::new(
            Method::Post,
            format!("/_api/gharial/{}/edge/{}", self.name, collection),
        )
        .json(body);
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::DocumentInsert, &resp);
            }
            Ok(resp.body_field("edge"))
        })
    }

    /// Fetch an edge; `Ok(None)` when it does not exist.
    pub fn edge(
        &self,
        collection: &str,
        selector: impl Into<DocumentSelector>,
        rev: Option<&str>,
        check_rev: bool,
    ) -> Result<E::Output<Option<Value>>> {
        let (id, if_match) =
            document::prep_from_doc(collection, &selector.into(), rev, check_rev)?;
        let mut request = Request::new(
            Method::Get,
            format!("/_api/gharial/{}/edge/{}", self.name, id),
        );
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
            Ok(Some(resp.body_field("edge")))
        })
    }

    pub fn update_edge(&self, collection: &str, body: Value) -> Result<E::Output<Value>> {
        let (id, if_match) = document::prep_from_doc(
            collection,
            &DocumentSelector::Doc(body.clone()),
            None,
            true,
        )?;
        let mut request = Request::new(
            Method::Patch,
            format!("/_api/gharial/{}/edge/{}", self.name, id),
        )
        .json(body);
        if let Some((key, value)) = if_match {
            request = request.header(key, value);
        }
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::DocumentUpdate, &resp);
            }
            Ok(resp.body_field("edge"))
        })
    }

    pub fn replace_edge(&self, collection: &str, body: Value) -> Result<E::Output<Value>> {
        let (id, if_match) = document::prep_from_doc(
            collection,
            &DocumentSelector::Doc(body.clone()),
            None,
            true,
        )?;
        let mut request = Request::new(
            Method::Put,
            format!("/_api/gharial/{}/edge/{}", self.name, id),
        )
        .json(body);
        if let Some((key, value)) = if_match {
            request = request.header(key, value);
        }
        self.executor.execute(request, |resp| {
            if !resp.is_success {
                return fail(Operation::DocumentReplace, &resp);
            }
            Ok(resp.body_field("edge"))
        })
    }

    pub fn delete_edge(
        &self,
        collection: &str,
        selector: impl Into<DocumentSelector>,
        rev: Option<&str>,
        check_rev: bool,
        ignore_missing: bool,
    ) -> Result<E::Output<bool>> {
        let (id, if_match) =
            document::prep_from_doc(collection, &selector.into(), rev, check_rev)?;
        let mut request = Request::new(
            Method::Delete,
            format!("/_api/gharial/{}/edge/{}", self.name, id),
        );
        if let Some((key, value)) = if_match {
            request = request.header(key, value);
        }
        self.executor.execute(request, move |resp| {
            if resp.error_code == Some(errno::DOCUMENT_NOT_FOUND) && ignore_missing {
                return Ok(false);
            }
            if !resp.is_success {
                return fail(Operation::DocumentDelete, &resp);
            }
            Ok(true)
        })
    }
}
