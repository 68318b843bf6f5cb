//! HTTP/1.x start line and header parsing.

use crate::domain::{HttpMessage, HttpStartLine, Protocol};
use crate::error::DecodeError;

const METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "DELETE", "HEAD", "PATCH", "OPTIONS", "CONNECT", "TRACE",
];

/// Whether the payload opens like an HTTP message.
pub(super) fn looks_like_http(data: &[u8]) -> bool {
    if data.starts_with(b"HTTP/") {
        return true;
    }
    METHODS.iter().any(|m| {
        data.len() > m.len() && data.starts_with(m.as_bytes()) && data[m.len()] == b' '
    })
}

/// Parse the start line and headers present in `data`.
///
/// A segment may end inside the header block; the headers seen so far are
/// kept and a partial trailing line is dropped.
pub(super) fn parse(data: &[u8]) -> Result<HttpMessage, DecodeError> {
    if !looks_like_http(data) {
        return Err(DecodeError::Unrecognized(Protocol::Http));
    }

    let header_end = find_header_end(data);
    let (head, body_length) = match header_end {
        Some((head_end, body_start)) => (&data[..head_end], data.len() - body_start),
        None => (data, 0),
    };
    let complete = header_end.is_some();

    let text = String::from_utf8_lossy(head);
    let mut lines: Vec<&str> = text.split('\n').map(|l| l.trim_end_matches('\r')).collect();
    if !complete && lines.len() > 1 {
        lines.pop();
    }

    let mut lines = lines.into_iter();
    let start = lines
        .next()
        .ok_or_else(|| DecodeError::invalid(Protocol::Http, "empty start line"))?;
    let start_line = parse_start_line(start)?;

    let mut headers: Vec<(String, String)> = Vec::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            // obs-fold continuation
            let Some((_, value)) = headers.last_mut() else {
                return Err(DecodeError::invalid(Protocol::Http, "continuation before first header"));
            };
            value.push(' ');
            value.push_str(line.trim());
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(DecodeError::invalid(
                Protocol::Http,
                format!("header without colon: {:?}", line),
            ));
        };
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }

    Ok(HttpMessage {
        start_line,
        headers,
        body_length,
    })
}

/// Offsets of the end of the header block and the start of the body.
fn find_header_end(data: &[u8]) -> Option<(usize, usize)> {
    if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some((pos, pos + 4));
    }
    data.windows(2)
        .position(|w| w == b"\n\n")
        .map(|pos| (pos, pos + 2))
}

fn parse_start_line(line: &str) -> Result<HttpStartLine, DecodeError> {
    if line.starts_with("HTTP/") {
        let mut parts = line.splitn(3, ' ');
        let version = parts.next().unwrap_or_default().to_string();
        let status_text = parts.next().unwrap_or_default();
        let status = status_text
            .parse::<u16>()
            .ok()
            .filter(|s| (100..1000).contains(s))
            .ok_or_else(|| {
                DecodeError::invalid(Protocol::Http, format!("status code {:?}", status_text))
            })?;
        let reason = parts.next().unwrap_or_default().to_string();
        return Ok(HttpStartLine::Response {
            version,
            status,
            reason,
        });
    }

    let parts: Vec<&str> = line.split(' ').filter(|p| !p.is_empty()).collect();
    match parts.as_slice() {
        [method, target, version] if version.starts_with("HTTP/") => Ok(HttpStartLine::Request {
            method: method.to_string(),
            target: target.to_string(),
            version: version.to_string(),
        }),
        _ => Err(DecodeError::invalid(
            Protocol::Http,
            format!("request line {:?}", line),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_request_with_headers() {
        let data = b"GET /index.html HTTP/1.1\r\nHost: example.com\r\nAccept: */*\r\n\r\n";
        let msg = parse(data).unwrap();
        assert_eq!(msg.method(), Some("GET"));
        assert_eq!(msg.header("host"), Some("example.com"));
        assert_eq!(msg.headers.len(), 2);
        assert_eq!(msg.body_length, 0);
    }

    #[test]
    fn test_parses_response_and_body_length() {
        let data = b"HTTP/1.1 404 Not Found\r\nContent-Length: 5\r\n\r\nnope!";
        let msg = parse(data).unwrap();
        assert_eq!(msg.status(), Some(404));
        assert_eq!(msg.body_length, 5);
        assert!(matches!(
            msg.start_line,
            HttpStartLine::Response { ref reason, .. } if reason == "Not Found"
        ));
    }

    #[test]
    fn test_folded_header_is_joined() {
        let data = b"GET / HTTP/1.0\r\nX-Long: first\r\n  second\r\n\r\n";
        let msg = parse(data).unwrap();
        assert_eq!(msg.header("x-long"), Some("first second"));
    }

    #[test]
    fn test_partial_header_block_drops_cut_line() {
        let data = b"POST /api HTTP/1.1\r\nHost: a\r\nContent-Ty";
        let msg = parse(data).unwrap();
        assert_eq!(msg.headers, vec![("Host".to_string(), "a".to_string())]);
    }

    #[test]
    fn test_rejections() {
        assert_eq!(
            parse(b"\x16\x03\x01"),
            Err(DecodeError::Unrecognized(Protocol::Http))
        );
        assert!(matches!(
            parse(b"GET /only-two-parts\r\n\r\n"),
            Err(DecodeError::Invalid { .. })
        ));
        assert!(matches!(
            parse(b"HTTP/1.1 abc OK\r\n\r\n"),
            Err(DecodeError::Invalid { .. })
        ));
    }
}
