//! Zero-copy HTTP/1.1 request-line and header parser: splits a GET/HEAD
//! request to the point a static file server needs, nothing more.

#[derive(Debug, Clone)]
pub struct Request<'a> {
    pub method: &'a str,
    pub path: &'a str,
    pub version: &'a str,
    pub headers: Vec<(&'a str, &'a str)>,
}

#[derive(Debug)]
pub enum ParseError {
    Incomplete,
    Invalid,
}

/// Parse the request line plus headers out of `buf`, stopping at the blank
/// line. Returns the parsed request and the byte offset just past it.
pub fn parse(buf: &[u8]) -> Result<Option<(Request<'_>, usize)>, ParseError> {
    let Some(header_end) = find_double_crlf(buf) else { return Ok(None) };
    let head = std::str::from_utf8(&buf[..header_end]).map_err(|_| ParseError::Invalid)?;
    let mut lines = head.split("\r\n");

    let request_line = lines.next().ok_or(ParseError::Invalid)?;
    let mut parts = request_line.split_ascii_whitespace();
    let method = parts.next().ok_or(ParseError::Invalid)?;
    let path = parts.next().ok_or(ParseError::Invalid)?;
    let version = parts.next().ok_or(ParseError::Invalid)?;

    let mut headers = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':').ok_or(ParseError::Invalid)?;
        headers.push((name.trim(), value.trim()));
    }

    Ok(Some((Request { method, path, version, headers }, header_end + 4)))
}

fn find_double_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_get() {
        let raw = b"GET /index.html HTTP/1.1\r\nHost: x\r\n\r\n";
        let (req, consumed) = parse(raw).unwrap().unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/index.html");
        assert_eq!(req.version, "HTTP/1.1");
        assert_eq!(consumed, raw.len());
    }

    #[test]
    fn incomplete_request_returns_none() {
        let raw = b"GET /index.html HTTP/1.1\r\nHost: x\r\n";
        assert!(parse(raw).unwrap().is_none());
    }
}
