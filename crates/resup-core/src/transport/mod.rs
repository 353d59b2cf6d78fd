//! HTTP transport for upload exchanges.
//!
//! A `Transport` performs one blocking request/response exchange. The queue
//! runs exchanges on tokio's blocking pool, so implementations are free to
//! block (libcurl's easy interface in production, scripted responses in tests).

mod easy;
mod parse;

pub use easy::CurlTransport;
pub(crate) use parse::parse_headers;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Shared abort flag for one in-flight exchange. Set when the transfer is
/// paused, cancelled or removed; the transport stops as soon as it notices.
pub type AbortToken = Arc<AtomicBool>;

/// One outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    /// Header name/value pairs in send order.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response of one exchange. Non-2xx statuses are still `Ok` at this layer;
/// the protocol layer decides what they mean.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpResponse {
    pub status: u32,
    /// Headers of the final response block.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as lossy UTF-8 text (attached to observer records).
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Failure below the HTTP layer: no status code was received.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("curl: {0}")]
    Curl(#[from] curl::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// The abort token was raised while the exchange was in flight.
    #[error("request aborted")]
    Aborted,
    #[error("invalid request: {0}")]
    Invalid(String),
}

/// Performs a single blocking HTTP exchange.
pub trait Transport: Send + Sync + 'static {
    /// Send `request` and wait for the full response. Implementations should
    /// check `abort` while waiting and return `TransportError::Aborted` once it
    /// is set.
    fn execute(&self, request: &HttpRequest, abort: &AtomicBool)
        -> Result<HttpResponse, TransportError>;
}
