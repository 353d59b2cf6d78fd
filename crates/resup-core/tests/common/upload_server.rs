//! Minimal HTTP/1.1 resumable-upload server for integration tests.
//!
//! `POST /upload/` opens a session and answers `201` with a relative
//! `Location`. `PUT /upload/s/<n>` with `Content-Range` appends the chunk when
//! it starts at the stored length, then answers `308` with `Range` until the
//! file is whole and `200` after. Every response closes the connection.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct UploadServerOptions {
    /// Answer this many chunk PUTs with `503` before accepting any.
    pub fail_puts: usize,
    /// Store at most this many bytes of each chunk (simulates a short write).
    pub max_accept: Option<usize>,
}

#[derive(Debug, Default)]
struct State {
    sessions: Vec<Vec<u8>>,
    names: Vec<String>,
    authorization: Vec<Option<String>>,
    fail_puts: usize,
}

/// Handle to a running server. The server runs until the process exits.
#[derive(Clone)]
pub struct UploadServer {
    pub base_url: String,
    state: Arc<Mutex<State>>,
    opts: UploadServerOptions,
}

impl UploadServer {
    /// Bytes stored per session, in creation order.
    pub fn sessions(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().sessions.clone()
    }

    /// `name` field of each session-creation body.
    pub fn names(&self) -> Vec<String> {
        self.state.lock().unwrap().names.clone()
    }

    /// `Authorization` header of every request, in arrival order.
    pub fn authorization(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().authorization.clone()
    }
}

pub fn start() -> UploadServer {
    start_with_options(UploadServerOptions::default())
}

pub fn start_with_options(opts: UploadServerOptions) -> UploadServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let server = UploadServer {
        base_url: format!("http://127.0.0.1:{}/", port),
        state: Arc::new(Mutex::new(State {
            fail_puts: opts.fail_puts,
            ..State::default()
        })),
        opts,
    };
    let accept = server.clone();
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let server = accept.clone();
            thread::spawn(move || server.handle(stream));
        }
    });
    server
}

struct Request {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
}

impl UploadServer {
    fn handle(&self, mut stream: TcpStream) {
        let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
        let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
        let Some(req) = read_request(&mut stream) else {
            return;
        };
        let (status, headers, body) = self.respond(&req);
        let mut head = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n",
            status,
            body.len()
        );
        for (k, v) in headers {
            head.push_str(&format!("{}: {}\r\n", k, v));
        }
        head.push_str("\r\n");
        let _ = stream.write_all(head.as_bytes());
        let _ = stream.write_all(body.as_bytes());
    }

    fn respond(&self, req: &Request) -> (&'static str, Vec<(&'static str, String)>, String) {
        let mut state = self.state.lock().unwrap();
        state
            .authorization
            .push(req.headers.get("authorization").cloned());

        if req.method == "POST" && req.path == "/upload/" {
            let name = serde_json::from_slice::<serde_json::Value>(&req.body)
                .ok()
                .and_then(|v| v.get("name").and_then(|n| n.as_str()).map(str::to_string))
                .unwrap_or_default();
            state.names.push(name);
            state.sessions.push(Vec::new());
            let location = format!("/upload/s/{}", state.sessions.len());
            return ("201 Created", vec![("Location", location)], String::new());
        }

        let Some(idx) = req
            .path
            .strip_prefix("/upload/s/")
            .and_then(|n| n.parse::<usize>().ok())
            .and_then(|n| n.checked_sub(1))
        else {
            return ("404 Not Found", Vec::new(), String::new());
        };
        if req.method != "PUT" || idx >= state.sessions.len() {
            return ("404 Not Found", Vec::new(), String::new());
        }
        if state.fail_puts > 0 {
            state.fail_puts -= 1;
            return ("503 Service Unavailable", Vec::new(), "busy".into());
        }

        let Some((start, total)) = req.headers.get("content-range").and_then(|v| parse_content_range(v))
        else {
            return ("400 Bad Request", Vec::new(), "missing Content-Range".into());
        };
        let received = &mut state.sessions[idx];
        if start == Some(received.len()) {
            let take = self
                .opts
                .max_accept
                .map_or(req.body.len(), |m| m.min(req.body.len()));
            received.extend_from_slice(&req.body[..take]);
        }
        if received.len() == total {
            return (
                "200 OK",
                Vec::new(),
                format!("{{\"size\":{}}}", received.len()),
            );
        }
        let headers = if received.is_empty() {
            Vec::new()
        } else {
            vec![("Range", format!("bytes=0-{}", received.len() - 1))]
        };
        ("308 Resume Incomplete", headers, String::new())
    }
}

fn read_request(stream: &mut TcpStream) -> Option<Request> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = std::str::from_utf8(&buf[..header_end]).ok()?;
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let len: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = buf[header_end..].to_vec();
    while body.len() < len {
        let n = stream.read(&mut chunk).ok()?;
        if n == 0 {
            return None;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(len);
    Some(Request {
        method,
        path,
        headers,
        body,
    })
}

/// `bytes a-b/total` → (Some(a), total); `bytes */total` → (None, total).
fn parse_content_range(v: &str) -> Option<(Option<usize>, usize)> {
    let spec = v.strip_prefix("bytes ")?;
    let (range, total) = spec.split_once('/')?;
    let total = total.trim().parse().ok()?;
    if range == "*" {
        return Some((None, total));
    }
    let (a, _) = range.split_once('-')?;
    Some((Some(a.trim().parse().ok()?), total))
}
