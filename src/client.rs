use std::sync::Arc;

use crate::connection::Connection;
use crate::database::{Database, StandardDatabase};
use crate::error::Result;
use crate::executor::DefaultExecutor;
use crate::http::{DefaultHttpClient, HttpClient};

/// Entry point: holds the server address and the transport, and mints
/// database wrappers.
///
/// ```no_run
/// use arango_client::ArangoClient;
///
/// let client = ArangoClient::new("http://localhost:8529")?;
/// let db = client.db("_system", "root", "passwd");
/// println!("{}", db.version()?);
/// # Ok::<(), arango_client::ArangoError>(())
/// ```
pub struct ArangoClient {
    base_url: String,
    client: Arc<dyn HttpClient>,
}

impl ArangoClient {
    /// Connect with the default blocking transport.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Ok(Self::with_http_client(base_url, Arc::new(DefaultHttpClient::new()?)))
    }

    /// Connect over a custom transport (a pooled client, the background
    /// thread client, or a test double).
    pub fn with_http_client(base_url: impl Into<String>, client: Arc<dyn HttpClient>) -> Self {
        ArangoClient {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Wrapper for the named database. No network round trip happens here;
    /// call [`StandardDatabase::ping`] to verify the credentials.
    pub fn db(&self, name: &str, username: &str, password: &str) -> StandardDatabase {
        let conn = Connection::new(
            self.base_url.clone(),
            name,
            username,
            password,
            self.client.clone(),
        );
        Database::with_executor(DefaultExecutor::new(conn))
    }

    /// Like [`ArangoClient::db`], but pings the server first so bad
    /// addresses and credentials fail here instead of on the first call.
    pub fn connect(&self, name: &str, username: &str, password: &str) -> Result<StandardDatabase> {
        let db = self.db(name, username, password);
        db.ping()?;
        Ok(db)
    }
}
