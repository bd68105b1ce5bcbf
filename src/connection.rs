use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use log::trace;

use crate::error::{fail, Operation, Result, ServerError};
use crate::http::HttpClient;
use crate::request::{Payload, Request};
use crate::response::Response;

struct Inner {
    base_url: String,
    db_name: String,
    username: String,
    auth_header: String,
    client: Arc<dyn HttpClient>,
}

/// Connection to one ArangoDB database: base URL, credentials and the
/// transport. Cheap to clone; all execution contexts share one of these.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("base_url", &self.inner.base_url)
            .field("db_name", &self.inner.db_name)
            .field("username", &self.inner.username)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new(
        base_url: impl Into<String>,
        db_name: impl Into<String>,
        username: impl Into<String>,
        password: &str,
        client: Arc<dyn HttpClient>,
    ) -> Self {
        let username = username.into();
        let auth_header = format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!("{username}:{password}"))
        );
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Connection {
            inner: Arc::new(Inner {
                base_url,
                db_name: db_name.into(),
                username,
                auth_header,
                client,
            }),
        }
    }

    pub fn db_name(&self) -> &str {
        &self.inner.db_name
    }

    pub fn username(&self) -> &str {
        &self.inner.username
    }

    /// Full URL for a request, including the `/_db/{name}` prefix and the
    /// encoded query string.
    pub fn request_url(&self, request: &Request) -> String {
        let query = request.query_string();
        let inner = &self.inner;
        if query.is_empty() {
            format!("{}/_db/{}{}", inner.base_url, inner.db_name, request.endpoint)
        } else {
            format!(
                "{}/_db/{}{}?{}",
                inner.base_url, inner.db_name, request.endpoint, query
            )
        }
    }

    /// Send the request over the transport and prepare the response: parse
    /// the JSON body and extract the ArangoDB error fields.
    pub fn send_request(&self, request: &Request) -> Result<Response> {
        let url = self.request_url(request);
        let headers = self.build_headers(request);
        let body = request.payload.render();

        trace!("-> {} {}", request.method, url);
        let raw = self
            .inner
            .client
            .send(request.method, &url, &headers, body)?;
        trace!("<- {} {} {}", raw.status_code, request.method, url);

        Ok(Response::from_raw(
            request.method,
            url,
            raw.status_code,
            raw.status_text,
            raw.headers,
            raw.body,
        ))
    }

    /// Check that the server is reachable and the credentials are accepted.
    pub fn ping(&self) -> Result<u16> {
        let request = Request::new(crate::request::Method::Get, "/_api/collection");
        let resp = self.send_request(&request)?;
        if resp.status_code == 401 || resp.status_code == 403 {
            return Err(ServerError::with_message(
                Operation::ServerConnection,
                &resp,
                Some("bad username or password"),
            )
            .into());
        }
        if !resp.is_success {
            return fail(Operation::ServerConnection, &resp);
        }
        Ok(resp.status_code)
    }

    fn build_headers(&self, request: &Request) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = vec![
            ("accept".to_string(), "application/json".to_string()),
            ("authorization".to_string(), self.inner.auth_header.clone()),
        ];
        if matches!(request.payload, Payload::Json(_)) {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }
        // Request-specific headers win over the defaults.
        for (key, value) in &request.headers {
            let lower = key.to_ascii_lowercase();
            headers.retain(|(existing, _)| existing.to_ascii_lowercase() != lower);
            headers.push((key.clone(), value.clone()));
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Method;
    use crate::testing::MockClient;
    use serde_json::json;

    #[test]
    fn url_carries_db_prefix_and_query() {
        let mock = Arc::new(MockClient::new());
        let conn = Connection::new("http://localhost:8529/", "test", "root", "pw", mock);
        let request = Request::new(Method::Get, "/_api/index").param("collection", "users");
        assert_eq!(
            conn.request_url(&request),
            "http://localhost:8529/_db/test/_api/index?collection=users"
        );
    }

    #[test]
    fn basic_auth_and_content_type_are_attached() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(200, json!({"result": []}));
        let conn = Connection::new("http://localhost:8529", "test", "root", "pw", mock.clone());

        let request = Request::new(Method::Post, "/_api/cursor").json(json!({"query": "x"}));
        conn.send_request(&request).expect("send should succeed");

        let sent = mock.take_requests();
        assert_eq!(sent.len(), 1);
        let auth = sent[0]
            .headers
            .iter()
            .find(|(k, _)| k == "authorization")
            .map(|(_, v)| v.clone());
        // base64("root:pw")
        assert_eq!(auth.as_deref(), Some("Basic cm9vdDpwdw=="));
        assert!(sent[0]
            .headers
            .iter()
            .any(|(k, v)| k == "content-type" && v == "application/json"));
    }

    #[test]
    fn request_headers_override_defaults() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(200, json!({}));
        let conn = Connection::new("http://localhost:8529", "test", "root", "pw", mock.clone());

        let request = Request::new(Method::Post, "/_api/batch")
            .raw("--XXXsubpartXXX--\r\n\r\n")
            .header(
                "content-type",
                "multipart/form-data; boundary=XXXsubpartXXX",
            );
        conn.send_request(&request).expect("send should succeed");

        let sent = mock.take_requests();
        let content_types: Vec<_> = sent[0]
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .collect();
        assert_eq!(content_types.len(), 1);
        assert_eq!(
            content_types[0].1,
            "multipart/form-data; boundary=XXXsubpartXXX"
        );
    }

    #[test]
    fn ping_translates_auth_failures() {
        let mock = Arc::new(MockClient::new());
        mock.push_json(401, json!({"error": true, "errorNum": 11}));
        let conn = Connection::new("http://localhost:8529", "test", "root", "bad", mock);
        let err = conn.ping().expect_err("ping must fail");
        let server = err.as_server().expect("server error expected");
        assert_eq!(server.operation, Operation::ServerConnection);
        assert!(server.message.contains("bad username or password"));
    }
}
