use std::collections::HashMap;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Sender};
use log::{debug, warn};

use crate::error::{ArangoError, Result};
use crate::request::Method;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Undecoded response straight off the wire. `Connection` turns this into a
/// prepared [`crate::response::Response`].
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Transport abstraction: turn one request into one raw response.
///
/// The default implementation uses a blocking reqwest session; tests plug in
/// scripted transports, and callers may supply their own (e.g. the
/// [`BackgroundHttpClient`] worker-thread variant).
pub trait HttpClient: Send + Sync {
    fn send(
        &self,
        method: Method,
        url: &str,
        headers: &[(String, String)],
        body: Option<String>,
    ) -> Result<RawResponse>;
}

/// Default transport: a shared blocking reqwest client, so the underlying
/// connection pool is reused across all requests of one driver instance.
pub struct DefaultHttpClient {
    client: reqwest::blocking::Client,
}

impl DefaultHttpClient {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArangoError::Transport {
                url: String::new(),
                reason: format!("failed to initialize HTTP client: {e}"),
            })?;
        Ok(DefaultHttpClient { client })
    }
}

impl HttpClient for DefaultHttpClient {
    fn send(
        &self,
        method: Method,
        url: &str,
        headers: &[(String, String)],
        body: Option<String>,
    ) -> Result<RawResponse> {
        let transport_err = |reason: String| ArangoError::Transport {
            url: url.to_string(),
            reason,
        };

        let reqwest_method = match method {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
        };

        let mut builder = self.client.request(reqwest_method, url);
        for (key, value) in headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().map_err(|e| transport_err(e.to_string()))?;

        let status = response.status();
        let mut response_headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                response_headers.insert(key.as_str().to_string(), value.to_string());
            }
        }
        let body = response
            .text()
            .map_err(|e| transport_err(format!("failed to read response body: {e}")))?;

        Ok(RawResponse {
            status_code: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            headers: response_headers,
            body,
        })
    }
}

struct WorkItem {
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    body: Option<String>,
    reply: Sender<Result<RawResponse>>,
}

/// Alternate transport that owns exactly one background worker thread with
/// its own HTTP session. Callers hand work over a channel and block on a
/// per-request reply channel, so the API stays synchronous while all wire
/// traffic runs on the worker.
pub struct BackgroundHttpClient {
    sender: Option<Sender<WorkItem>>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundHttpClient {
    pub fn new() -> Result<Self> {
        let inner = DefaultHttpClient::new()?;
        let (sender, receiver) = unbounded::<WorkItem>();
        let worker = std::thread::Builder::new()
            .name("arango-http".to_string())
            .spawn(move || {
                for item in receiver {
                    let result =
                        inner.send(item.method, &item.url, &item.headers, item.body.clone());
                    if item.reply.send(result).is_err() {
                        debug!("http worker: caller went away before the response arrived");
                    }
                }
            })
            .map_err(|e| ArangoError::Transport {
                url: String::new(),
                reason: format!("failed to spawn HTTP worker thread: {e}"),
            })?;
        Ok(BackgroundHttpClient {
            sender: Some(sender),
            worker: Some(worker),
        })
    }
}

impl HttpClient for BackgroundHttpClient {
    fn send(
        &self,
        method: Method,
        url: &str,
        headers: &[(String, String)],
        body: Option<String>,
    ) -> Result<RawResponse> {
        let (reply_tx, reply_rx) = bounded(1);
        let item = WorkItem {
            method,
            url: url.to_string(),
            headers: headers.to_vec(),
            body,
            reply: reply_tx,
        };
        let sender = self.sender.as_ref().ok_or_else(|| ArangoError::Transport {
            url: url.to_string(),
            reason: "HTTP worker has shut down".to_string(),
        })?;
        sender.send(item).map_err(|_| ArangoError::Transport {
            url: url.to_string(),
            reason: "HTTP worker has shut down".to_string(),
        })?;
        reply_rx.recv().map_err(|_| ArangoError::Transport {
            url: url.to_string(),
            reason: "HTTP worker dropped the request".to_string(),
        })?
    }
}

impl Drop for BackgroundHttpClient {
    fn drop(&mut self) {
        // Closing the channel lets the worker loop finish.
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("HTTP worker thread panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_client_shuts_down_cleanly() {
        let client = BackgroundHttpClient::new().expect("worker should start");
        drop(client);
    }

    #[test]
    fn background_client_reports_transport_errors() {
        let client = BackgroundHttpClient::new().expect("worker should start");
        // Nothing listens on this port; the worker must hand the failure back.
        let result = client.send(Method::Get, "http://127.0.0.1:1/_api/version", &[], None);
        assert!(matches!(result, Err(ArangoError::Transport { .. })));
    }
}
