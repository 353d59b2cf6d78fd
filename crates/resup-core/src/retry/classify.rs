//! Classify HTTP status and transport errors into retry policy error kinds.

use crate::retry::error::ChunkError;
use crate::retry::policy::ErrorKind;
use crate::transport::TransportError;

/// Classify an HTTP status code for retry decisions.
pub fn classify_http_status(code: u32) -> ErrorKind {
    match code {
        408 => ErrorKind::Timeout,
        429 | 503 => ErrorKind::Throttled,
        409 | 416 => ErrorKind::Conflict,
        500..=599 => ErrorKind::Http5xx(code as u16),
        _ => ErrorKind::Other,
    }
}

/// Classify a curl error for retry decisions.
pub fn classify_curl_error(e: &curl::Error) -> ErrorKind {
    if e.is_operation_timedout() {
        return ErrorKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return ErrorKind::Connection;
    }
    ErrorKind::Other
}

/// Classify an exchange error into an ErrorKind.
pub fn classify(e: &ChunkError) -> ErrorKind {
    match e {
        ChunkError::Transport(TransportError::Curl(ce)) => classify_curl_error(ce),
        ChunkError::Transport(TransportError::Io(_)) => ErrorKind::Connection,
        ChunkError::Transport(TransportError::Aborted | TransportError::Invalid(_)) => {
            ErrorKind::Other
        }
        ChunkError::Http { code, .. } => classify_http_status(*code),
        ChunkError::Incomplete { .. } | ChunkError::Conflict { .. } => ErrorKind::Conflict,
        ChunkError::Protocol(_) | ChunkError::Source(_) => ErrorKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_429_and_503_throttled() {
        assert_eq!(classify_http_status(429), ErrorKind::Throttled);
        assert_eq!(classify_http_status(503), ErrorKind::Throttled);
    }

    #[test]
    fn http_5xx_retryable() {
        assert!(matches!(classify_http_status(500), ErrorKind::Http5xx(500)));
        assert!(matches!(classify_http_status(502), ErrorKind::Http5xx(502)));
    }

    #[test]
    fn http_408_is_timeout() {
        assert_eq!(classify_http_status(408), ErrorKind::Timeout);
    }

    #[test]
    fn resumable_conflicts_are_retryable() {
        assert_eq!(classify_http_status(409), ErrorKind::Conflict);
        assert_eq!(classify_http_status(416), ErrorKind::Conflict);
        let e = ChunkError::Incomplete {
            received: 10,
            expected: 20,
        };
        assert_eq!(classify(&e), ErrorKind::Conflict);
        assert_eq!(e.server_offset(), Some(10));
    }

    #[test]
    fn http_4xx_other() {
        assert_eq!(classify_http_status(404), ErrorKind::Other);
        assert_eq!(classify_http_status(403), ErrorKind::Other);
        assert_eq!(classify_http_status(410), ErrorKind::Other);
    }

    #[test]
    fn protocol_and_source_errors_not_retried() {
        assert_eq!(
            classify(&ChunkError::Protocol("missing Location".into())),
            ErrorKind::Other
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(classify(&ChunkError::Source(io)), ErrorKind::Other);
    }

    #[test]
    fn aborted_is_not_retried() {
        assert_eq!(
            classify(&ChunkError::Transport(TransportError::Aborted)),
            ErrorKind::Other
        );
    }
}
