//! libcurl easy-handle transport.

use std::str;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{parse_headers, HttpRequest, HttpResponse, Transport, TransportError};
use crate::config::UploaderConfig;

/// Blocking transport backed by one curl easy handle per exchange.
/// Call from `spawn_blocking` when used from async code.
#[derive(Debug, Clone, Copy)]
pub struct CurlTransport {
    connect_timeout: Duration,
    timeout: Duration,
}

impl Default for CurlTransport {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            timeout: Duration::from_secs(3600),
        }
    }
}

impl CurlTransport {
    pub fn new(connect_timeout: Duration, timeout: Duration) -> Self {
        Self {
            connect_timeout,
            timeout,
        }
    }

    pub fn from_config(cfg: &UploaderConfig) -> Self {
        Self::new(
            Duration::from_secs(cfg.connect_timeout_secs.max(1)),
            Duration::from_secs(cfg.request_timeout_secs.max(1)),
        )
    }
}

impl Transport for CurlTransport {
    fn execute(
        &self,
        request: &HttpRequest,
        abort: &AtomicBool,
    ) -> Result<HttpResponse, TransportError> {
        if request.method.trim().is_empty() {
            return Err(TransportError::Invalid("empty HTTP method".into()));
        }

        let mut header_lines: Vec<String> = Vec::new();
        let mut body: Vec<u8> = Vec::new();

        let mut easy = curl::easy::Easy::new();
        easy.url(&request.url)?;
        // 308 means "resume incomplete" here, never a redirect to follow.
        easy.follow_location(false)?;
        easy.connect_timeout(self.connect_timeout)?;
        easy.timeout(self.timeout)?;
        easy.low_speed_limit(1024)?;
        easy.low_speed_time(Duration::from_secs(60))?;
        easy.progress(true)?;

        easy.post(true)?;
        easy.post_fields_copy(&request.body)?;
        if !request.method.eq_ignore_ascii_case("POST") {
            easy.custom_request(&request.method)?;
        }

        let mut list = curl::easy::List::new();
        for (k, v) in &request.headers {
            list.append(&format!("{}: {}", k.trim(), v.trim()))?;
        }
        // No `Expect: 100-continue` round trip for chunk bodies.
        list.append("Expect:")?;
        easy.http_headers(list)?;

        {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    header_lines.push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.write_function(|data| {
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.progress_function(|_, _, _, _| !abort.load(Ordering::Relaxed))?;
            if let Err(e) = transfer.perform() {
                if e.is_aborted_by_callback() {
                    return Err(TransportError::Aborted);
                }
                return Err(TransportError::Curl(e));
            }
        }

        let status = easy.response_code()?;
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status,
            "exchange finished"
        );
        Ok(HttpResponse {
            status,
            headers: parse_headers(&header_lines),
            body,
        })
    }
}
