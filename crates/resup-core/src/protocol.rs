//! Resumable-upload wire protocol.
//!
//! Session creation: `<method> <endpoint>` with a JSON description of the
//! file; the `Location` response header names the session. Chunks:
//! `PUT <session>` with `Content-Range: bytes a-b/size`. The server answers
//! `308` with `Range: bytes=0-n` (or `Upload-Offset: n+1`) while bytes are
//! missing and a 2xx once the file is whole.

use serde_json::{Map, Value};
use url::Url;

use crate::config::UploadOptions;
use crate::retry::ChunkError;
use crate::source::FileSource;
use crate::transport::{HttpRequest, HttpResponse};

/// Server acknowledgment of one chunk exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkAck {
    /// Server holds every byte before this offset.
    Advanced(u64),
    /// Server confirmed the file is complete; carries the response body.
    Complete(String),
}

/// End of the next chunk starting at `offset`. A zero chunk size sends the
/// whole remainder.
pub fn chunk_end(offset: u64, chunk_size: u64, size: u64) -> u64 {
    if chunk_size == 0 {
        return size;
    }
    offset.saturating_add(chunk_size).min(size)
}

/// `Content-Range` value for `[start, end)` of a `size`-byte file. An empty
/// range (`bytes */size`) asks the server to finalize or report its offset.
pub fn content_range(start: u64, end: u64, size: u64) -> String {
    if end <= start {
        format!("bytes */{}", size)
    } else {
        format!("bytes {}-{}/{}", start, end - 1, size)
    }
}

/// Absolute endpoint URL; relative endpoints are joined onto `base_url`.
pub fn resolve_endpoint(opts: &UploadOptions) -> Result<Url, ChunkError> {
    match Url::parse(&opts.url) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = opts.base_url.as_deref().ok_or_else(|| {
                ChunkError::Protocol(format!(
                    "endpoint {} is relative and no base_url is configured",
                    opts.url
                ))
            })?;
            Url::parse(base)
                .and_then(|b| b.join(&opts.url))
                .map_err(|e| ChunkError::Protocol(format!("invalid base_url {}: {}", base, e)))
        }
        Err(e) => Err(ChunkError::Protocol(format!(
            "invalid endpoint {}: {}",
            opts.url, e
        ))),
    }
}

/// Configured headers plus `Authorization` when the token may go to `target`:
/// always for the endpoint's own origin, elsewhere only with credentials.
fn request_headers(opts: &UploadOptions, endpoint: &Url, target: &Url) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = opts
        .headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    if let Some(token) = opts.token.as_deref().filter(|t| !t.is_empty()) {
        if opts.with_credentials || endpoint.origin() == target.origin() {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }
    }
    headers
}

/// Request that opens an upload session for `file`.
pub fn create_session_request(
    opts: &UploadOptions,
    file: &dyn FileSource,
) -> Result<HttpRequest, ChunkError> {
    let endpoint = resolve_endpoint(opts)?;

    let mut meta = Map::new();
    for (k, v) in &opts.metadata {
        meta.insert(k.clone(), Value::String(v.clone()));
    }
    meta.insert("name".into(), Value::String(file.name().to_string()));
    meta.insert("mimeType".into(), Value::String(file.mime_type().to_string()));
    meta.insert("size".into(), Value::from(file.size()));
    let body = serde_json::to_vec(&Value::Object(meta))
        .map_err(|e| ChunkError::Protocol(format!("encode metadata: {}", e)))?;

    let mut headers = request_headers(opts, &endpoint, &endpoint);
    headers.push((
        "Content-Type".into(),
        "application/json; charset=utf-8".into(),
    ));
    headers.push(("X-Upload-Content-Type".into(), file.mime_type().to_string()));
    headers.push(("X-Upload-Content-Length".into(), file.size().to_string()));

    Ok(HttpRequest {
        method: opts.method.clone(),
        url: endpoint.to_string(),
        headers,
        body,
    })
}

/// Request that sends `[start, end)` of `file` to the session.
pub fn chunk_request(
    opts: &UploadOptions,
    session_uri: &str,
    file: &dyn FileSource,
    start: u64,
    end: u64,
) -> Result<HttpRequest, ChunkError> {
    let endpoint = resolve_endpoint(opts)?;
    let target = Url::parse(session_uri)
        .map_err(|e| ChunkError::Protocol(format!("invalid session uri {}: {}", session_uri, e)))?;
    let body = file.read_range(start, end).map_err(ChunkError::Source)?;

    let mut headers = request_headers(opts, &endpoint, &target);
    headers.push(("Content-Type".into(), "application/octet-stream".into()));
    headers.push((
        "Content-Range".into(),
        content_range(start, end, file.size()),
    ));

    Ok(HttpRequest {
        method: "PUT".to_string(),
        url: target.to_string(),
        headers,
        body,
    })
}

/// Session URI from a session-creation response.
pub fn session_from_response(resp: &HttpResponse, endpoint: &Url) -> Result<String, ChunkError> {
    if !(200..300).contains(&resp.status) {
        return Err(ChunkError::Http {
            code: resp.status,
            body: resp.body_text(),
        });
    }
    let location = resp
        .header("Location")
        .filter(|l| !l.is_empty())
        .ok_or_else(|| {
            ChunkError::Protocol(format!(
                "session response (HTTP {}) has no Location header",
                resp.status
            ))
        })?;
    endpoint
        .join(location)
        .map(|u| u.to_string())
        .map_err(|e| ChunkError::Protocol(format!("invalid Location {}: {}", location, e)))
}

/// Offset the server reports holding: `Range: bytes=0-n` means `n + 1`,
/// `Upload-Offset: n` means `n`. A range end at `u64::MAX` is unusable.
pub fn resume_offset(resp: &HttpResponse) -> Option<u64> {
    if let Some(range) = resp.header("Range") {
        let spec = range.trim().strip_prefix("bytes=")?;
        let (_, last) = spec.split_once('-')?;
        return last.trim().parse::<u64>().ok().and_then(|n| n.checked_add(1));
    }
    resp.header("Upload-Offset")
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Interpret the response to a chunk covering `[start, end)` of a
/// `size`-byte file.
pub fn chunk_ack(
    resp: &HttpResponse,
    start: u64,
    end: u64,
    size: u64,
) -> Result<ChunkAck, ChunkError> {
    match resp.status {
        200..=299 if end >= size => Ok(ChunkAck::Complete(resp.body_text())),
        200..=299 => Ok(ChunkAck::Advanced(end)),
        308 => {
            let received = resume_offset(resp).unwrap_or(0);
            if received < start {
                return Err(ChunkError::Protocol(format!(
                    "server offset {} is behind acknowledged offset {}",
                    received, start
                )));
            }
            if received > end {
                return Err(ChunkError::Protocol(format!(
                    "server offset {} is past the bytes sent ({})",
                    received, end
                )));
            }
            if received == end && end > start {
                Ok(ChunkAck::Advanced(received))
            } else {
                Err(ChunkError::Incomplete {
                    received,
                    expected: end,
                })
            }
        }
        code @ (409 | 416) => Err(ChunkError::Conflict {
            code,
            server_offset: resume_offset(resp).filter(|o| *o >= start && *o <= size),
        }),
        code => Err(ChunkError::Http {
            code,
            body: resp.body_text(),
        }),
    }
}
