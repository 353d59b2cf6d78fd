//! Parse raw HTTP response header lines into name/value pairs.

/// Parse collected header lines into `(name, value)` pairs.
///
/// libcurl hands over every header block it sees (`100 Continue`, then the
/// final response). Each status line starts a new block, so only the headers
/// of the last block are returned.
pub(crate) fn parse_headers(lines: &[String]) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.starts_with("HTTP/") {
            headers.clear();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_headers_location_and_range() {
        let h = parse_headers(&lines(&[
            "HTTP/1.1 308 Resume Incomplete",
            "Range: bytes=0-1023",
            "Location: https://up.example.com/s/1",
            "",
        ]));
        assert_eq!(h.len(), 2);
        assert_eq!(h[0], ("Range".to_string(), "bytes=0-1023".to_string()));
        assert_eq!(h[1].1, "https://up.example.com/s/1");
    }

    #[test]
    fn parse_headers_keeps_only_final_block() {
        let h = parse_headers(&lines(&[
            "HTTP/1.1 100 Continue",
            "X-Early: 1",
            "",
            "HTTP/1.1 200 OK",
            "Content-Length: 2",
        ]));
        assert_eq!(h, vec![("Content-Length".to_string(), "2".to_string())]);
    }

    #[test]
    fn parse_headers_value_with_colon() {
        let h = parse_headers(&lines(&["Location: http://127.0.0.1:8080/s/9"]));
        assert_eq!(h[0].1, "http://127.0.0.1:8080/s/9");
    }
}
