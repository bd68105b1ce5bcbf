use std::fmt;

use serde_json::Value;

/// HTTP methods understood by the ArangoDB REST API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Patch,
    Delete,
    Head,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body. ArangoDB endpoints take JSON almost everywhere; the batch
/// endpoint takes a pre-rendered multipart string.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    Empty,
    Json(Value),
    Raw(String),
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    /// Render the payload to the string that goes on the wire.
    pub fn render(&self) -> Option<String> {
        match self {
            Payload::Empty => None,
            Payload::Json(value) => Some(value.to_string()),
            Payload::Raw(raw) => Some(raw.clone()),
        }
    }
}

/// A logical API request: what to send, independent of when and how the
/// active execution context sends it.
///
/// Built fresh per call with the builder-style methods below. Executors may
/// stamp additional headers (async marker, transaction id) before dispatch.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub endpoint: String,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub payload: Payload,
    /// Javascript snippet used by the transaction execution context instead
    /// of an HTTP round trip.
    pub command: Option<String>,
}

impl Request {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Request {
            method,
            endpoint: endpoint.into(),
            params: Vec::new(),
            headers: Vec::new(),
            payload: Payload::Empty,
            command: None,
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn opt_param(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.param(key, value),
            None => self,
        }
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.payload = Payload::Json(body);
        self
    }

    pub fn raw(mut self, body: impl Into<String>) -> Self {
        self.payload = Payload::Raw(body.into());
        self
    }

    pub fn command(mut self, js: impl Into<String>) -> Self {
        self.command = Some(js.into());
        self
    }

    pub(crate) fn set_header(&mut self, key: &str, value: &str) {
        self.headers.push((key.to_string(), value.to_string()));
    }

    /// Query string rendered from the params, without the leading `?`.
    pub fn query_string(&self) -> String {
        if self.params.is_empty() {
            return String::new();
        }
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.params {
            serializer.append_pair(key, value);
        }
        serializer.finish()
    }

    /// Endpoint plus query string, as it appears in a batch part request line.
    pub fn endpoint_with_query(&self) -> String {
        let query = self.query_string();
        if query.is_empty() {
            self.endpoint.clone()
        } else {
            format!("{}?{}", self.endpoint, query)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_collects_params_and_headers() {
        let request = Request::new(Method::Post, "/_api/cursor")
            .param("count", true)
            .param("batchSize", 100)
            .opt_param("ttl", None::<u64>)
            .header("x-arango-async", "store")
            .json(json!({"query": "RETURN 1"}));

        assert_eq!(request.method, Method::Post);
        assert_eq!(
            request.params,
            vec![
                ("count".to_string(), "true".to_string()),
                ("batchSize".to_string(), "100".to_string()),
            ]
        );
        assert_eq!(request.headers.len(), 1);
        assert!(matches!(request.payload, Payload::Json(_)));
    }

    #[test]
    fn query_string_is_urlencoded_in_order() {
        let request = Request::new(Method::Get, "/_api/index")
            .param("collection", "my col")
            .param("withStats", false);
        assert_eq!(request.query_string(), "collection=my+col&withStats=false");
        assert_eq!(
            request.endpoint_with_query(),
            "/_api/index?collection=my+col&withStats=false"
        );
    }

    #[test]
    fn payload_renders_json_and_raw() {
        assert_eq!(Payload::Empty.render(), None);
        assert_eq!(
            Payload::Json(json!({"a": 1})).render(),
            Some("{\"a\":1}".to_string())
        );
        assert_eq!(
            Payload::Raw("--part--".to_string()).render(),
            Some("--part--".to_string())
        );
    }
}
