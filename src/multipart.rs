//! Wire format for the `/_api/batch` endpoint.
//!
//! Grammar (request side):
//!
//! ```text
//! body     = *part close
//! part     = "--XXXsubpartXXX" CRLF
//!            "Content-Type: application/x-arango-batchpart" CRLF
//!            "Content-Id: " 1*DIGIT CRLF CRLF
//!            embedded CRLF
//! embedded = METHOD SP path-with-query SP "HTTP/1.1" CRLF
//!            *(header-name ": " header-value CRLF) CRLF
//!            [json-body]
//! close    = "--XXXsubpartXXX--" CRLF CRLF
//! ```
//!
//! The response body uses the same boundary; each part wraps an embedded
//! HTTP/1.1 response (status line, headers, blank line, JSON body). Parts are
//! matched positionally to the submitted requests.

use crate::error::{ArangoError, Result};
use crate::request::{Payload, Request};

pub const BOUNDARY: &str = "XXXsubpartXXX";

/// `Content-Type` header value for the combined batch request.
pub fn content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// One embedded response extracted from a multipart batch reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPart {
    pub status_code: u16,
    pub status_text: String,
    pub body: String,
}

/// Render the queued requests into one multipart body.
pub fn serialize_batch(requests: &[Request]) -> String {
    let mut raw = String::new();
    for (index, request) in requests.iter().enumerate() {
        raw.push_str(&format!("--{BOUNDARY}\r\n"));
        raw.push_str("Content-Type: application/x-arango-batchpart\r\n");
        raw.push_str(&format!("Content-Id: {}\r\n\r\n", index + 1));
        raw.push_str(&format!(
            "{} {} HTTP/1.1\r\n",
            request.method,
            request.endpoint_with_query()
        ));
        for (key, value) in &request.headers {
            raw.push_str(&format!("{key}: {value}\r\n"));
        }
        if matches!(request.payload, Payload::Json(_)) {
            raw.push_str("Content-Type: application/json\r\n");
        }
        raw.push_str("\r\n");
        if let Some(body) = request.payload.render() {
            raw.push_str(&body);
        }
        raw.push_str("\r\n");
    }
    raw.push_str(&format!("--{BOUNDARY}--\r\n\r\n"));
    raw
}

/// Split a multipart batch reply into its embedded responses, in order.
///
/// The part is parsed structurally: part headers, then the embedded status
/// line, then the embedded headers, then the body after the blank line. This
/// replaces the looks-like-JSON line scan of older drivers, which broke on
/// string values containing braces.
pub fn parse_batch(raw: &str) -> Result<Vec<BatchPart>> {
    let malformed = |detail: &str| ArangoError::BatchState(format!("malformed batch response: {detail}"));

    let delimiter = format!("--{BOUNDARY}");
    let mut parts = Vec::new();
    for segment in raw.split(delimiter.as_str()) {
        let segment = segment.trim_start_matches("\r\n");
        // Preamble before the first boundary and the closing "--" marker.
        if segment.is_empty() || segment.starts_with("--") {
            continue;
        }
        // Drop the part headers (Content-Type, Content-Id).
        let embedded = match segment.split_once("\r\n\r\n") {
            Some((_, rest)) => rest,
            None => return Err(malformed("missing part header separator")),
        };
        let (status_line, rest) = embedded
            .split_once("\r\n")
            .ok_or_else(|| malformed("missing embedded status line"))?;
        let mut status_fields = status_line.splitn(3, ' ');
        let version = status_fields.next().unwrap_or("");
        if !version.starts_with("HTTP/") {
            return Err(malformed("embedded part does not start with an HTTP status line"));
        }
        let status_code: u16 = status_fields
            .next()
            .and_then(|code| code.parse().ok())
            .ok_or_else(|| malformed("unparsable embedded status code"))?;
        let status_text = status_fields.next().unwrap_or("").to_string();
        // Embedded headers end at the next blank line; the body may be empty
        // (e.g. HEAD responses) and the header section may be absent.
        let body = match rest.strip_prefix("\r\n") {
            Some(stripped) => stripped,
            None => match rest.split_once("\r\n\r\n") {
                Some((_, body)) => body,
                None => "",
            },
        };
        parts.push(BatchPart {
            status_code,
            status_text,
            body: body.trim_end_matches("\r\n").to_string(),
        });
    }
    Ok(parts)
}
