use std::collections::HashMap;

use serde_json::Value;

use crate::request::Method;

/// A fully prepared server response: parsed body plus the ArangoDB error
/// fields extracted from it.
///
/// ArangoDB reports failures in the body as
/// `{"error": true, "errorNum": N, "errorMessage": "..."}`; `error_code` and
/// `error_message` carry those fields when present. `is_success` requires a
/// 2xx status *and* the absence of an errorNum.
#[derive(Debug, Clone)]
pub struct Response {
    pub method: Method,
    pub url: String,
    pub status_code: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub raw_body: String,
    pub body: Option<Value>,
    pub error_code: Option<i64>,
    pub error_message: Option<String>,
    pub is_success: bool,
}

impl Response {
    pub fn from_raw(
        method: Method,
        url: String,
        status_code: u16,
        status_text: String,
        headers: HashMap<String, String>,
        raw_body: String,
    ) -> Self {
        let body: Option<Value> = serde_json::from_str(&raw_body).ok();
        let (error_code, error_message) = match &body {
            Some(Value::Object(map)) => (
                map.get("errorNum").and_then(Value::as_i64),
                map.get("errorMessage")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            ),
            _ => (None, None),
        };
        let http_ok = (200..300).contains(&status_code);
        let is_success = http_ok && error_code.is_none();
        Response {
            method,
            url,
            status_code,
            status_text,
            headers,
            raw_body,
            body,
            error_code,
            error_message,
            is_success,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| key.to_ascii_lowercase() == name)
            .map(|(_, value)| value.as_str())
    }

    /// The parsed body, or `Value::Null` when the body was empty or not JSON.
    pub fn body_or_null(&self) -> Value {
        self.body.clone().unwrap_or(Value::Null)
    }

    /// A named field of the body object, or `Value::Null`.
    pub fn body_field(&self, name: &str) -> Value {
        self.body
            .as_ref()
            .and_then(|body| body.get(name))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(status: u16, body: &str) -> Response {
        Response::from_raw(
            Method::Get,
            "http://localhost:8529/_db/test/_api/document/c/1".to_string(),
            status,
            "Not Found".to_string(),
            HashMap::new(),
            body.to_string(),
        )
    }

    #[test]
    fn extracts_arango_error_fields() {
        let resp = make(
            404,
            r#"{"error":true,"errorNum":1202,"errorMessage":"document not found","code":404}"#,
        );
        assert_eq!(resp.error_code, Some(1202));
        assert_eq!(resp.error_message.as_deref(), Some("document not found"));
        assert!(!resp.is_success);
    }

    #[test]
    fn success_requires_2xx_and_no_error_num() {
        let ok = make(200, r#"{"result": []}"#);
        assert!(ok.is_success);

        // 2xx with an errorNum in the body still counts as failure.
        let sneaky = make(200, r#"{"error":true,"errorNum":600,"errorMessage":"bad"}"#);
        assert!(!sneaky.is_success);
    }

    #[test]
    fn tolerates_non_json_bodies() {
        let resp = make(200, "");
        assert!(resp.body.is_none());
        assert_eq!(resp.body_or_null(), Value::Null);
        assert!(resp.is_success);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = HashMap::new();
        headers.insert("X-Arango-Async-Id".to_string(), "12345".to_string());
        let resp = Response::from_raw(
            Method::Post,
            "http://localhost:8529/_db/test/_api/version".to_string(),
            202,
            "Accepted".to_string(),
            headers,
            String::new(),
        );
        assert_eq!(resp.header("x-arango-async-id"), Some("12345"));
        assert_eq!(resp.header("X-ARANGO-ASYNC-ID"), Some("12345"));
        assert_eq!(resp.header("x-missing"), None);
    }
}
