//! Blocking client for the ArangoDB HTTP API.
//!
//! The central abstraction is the execution context: every API wrapper
//! (database, collection, graph, AQL) builds plain request descriptions and
//! hands them to an [`Executor`], which decides when they are sent. The
//! default context sends inline; the async context queues them on the
//! server's task queue and returns [`AsyncJob`] handles; the batch context
//! buffers them for one multipart round trip; the transaction context
//! translates them to Javascript and runs them atomically server-side.
//!
//! ```no_run
//! use arango_client::{ArangoClient, InsertOptions};
//! use serde_json::json;
//!
//! let client = ArangoClient::new("http://localhost:8529")?;
//! let db = client.db("_system", "root", "passwd");
//!
//! let users = db.collection("users");
//! users.insert(json!({"_key": "1", "name": "ada"}), InsertOptions::default())?;
//!
//! let cursor = db.aql().execute(
//!     "FOR u IN users FILTER u.name == @name RETURN u",
//!     Some(json!({"name": "ada"})),
//!     Default::default(),
//! )?;
//! for doc in cursor {
//!     println!("{}", doc?);
//! }
//! # Ok::<(), arango_client::ArangoError>(())
//! ```

mod aql;
mod client;
mod collection;
mod connection;
mod cursor;
mod database;
mod document;
mod error;
mod executor;
mod graph;
mod http;
mod job;
mod multipart;
mod request;
mod response;
#[cfg(test)]
mod testing;
mod transaction;

pub use aql::{Aql, AqlOptions};
pub use client::ArangoClient;
pub use collection::{
    Collection, DeleteOptions, ExportOptions, InsertOptions, ReplaceOptions, UpdateOptions,
};
pub use connection::Connection;
pub use cursor::{Cursor, CursorKind};
pub use database::{
    AsyncDatabase, BatchDatabase, ClusterTestDatabase, CreateCollectionOptions, Database,
    StandardDatabase, TransactionDatabase,
};
pub use document::DocumentSelector;
pub use error::{errno, ArangoError, Operation, Result, ServerError};
pub use executor::{
    AsyncExecutor, BatchExecutor, ClusterTestExecutor, DefaultExecutor, Executor,
};
pub use graph::{EdgeDefinition, Graph};
pub use http::{BackgroundHttpClient, DefaultHttpClient, HttpClient, RawResponse};
pub use job::{AsyncJob, BatchJob, JobStatus};
pub use request::{Method, Payload, Request};
pub use response::Response;
pub use transaction::{TransactionCollections, TransactionExecutor, TransactionOptions};
