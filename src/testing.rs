//! Scripted transport used by the unit tests in place of a live server.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::Value;

use crate::error::{ArangoError, Result};
use crate::http::{HttpClient, RawResponse};
use crate::request::Method;

#[derive(Debug, Clone)]
pub(crate) struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Replays queued responses in order and records every request it sees.
pub(crate) struct MockClient {
    responses: Mutex<VecDeque<RawResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockClient {
    pub fn new() -> Self {
        MockClient {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_response(&self, response: RawResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn push_json(&self, status_code: u16, body: Value) {
        self.push_response(RawResponse {
            status_code,
            status_text: status_text_for(status_code).to_string(),
            headers: HashMap::new(),
            body: body.to_string(),
        });
    }

    pub fn push_with_headers(&self, status_code: u16, body: Value, headers: &[(&str, &str)]) {
        let headers = headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.push_response(RawResponse {
            status_code,
            status_text: status_text_for(status_code).to_string(),
            headers,
            body: body.to_string(),
        });
    }

    pub fn push_raw(&self, status_code: u16, body: &str) {
        self.push_response(RawResponse {
            status_code,
            status_text: status_text_for(status_code).to_string(),
            headers: HashMap::new(),
            body: body.to_string(),
        });
    }

    pub fn take_requests(&self) -> Vec<RecordedRequest> {
        std::mem::take(&mut self.requests.lock().unwrap())
    }
}

impl HttpClient for MockClient {
    fn send(
        &self,
        method: Method,
        url: &str,
        headers: &[(String, String)],
        body: Option<String>,
    ) -> Result<RawResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            method,
            url: url.to_string(),
            headers: headers.to_vec(),
            body,
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ArangoError::Transport {
                url: url.to_string(),
                reason: "mock transport: no scripted response left".to_string(),
            })
    }
}

fn status_text_for(status_code: u16) -> &'static str {
    match status_code {
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        412 => "Precondition Failed",
        _ => "",
    }
}
