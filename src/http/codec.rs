//! Sans-IO HTTP/1.1 request parsing: feed raw bytes in, pull out complete
//! requests. No socket access happens in here; the caller owns I/O and
//! timing (including the 2-second body-read timeout from §4.5).

use bytes::BytesMut;

use super::{Headers, Method, HttpRequest};

/// Header section larger than this is rejected outright.
pub const MAX_HEADER_SIZE: usize = 8192;
/// Body larger than this is rejected outright.
pub const MAX_BODY_SIZE: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum HttpCodecError {
    #[error("malformed request line")]
    MalformedRequestLine,

    #[error("unsupported method")]
    UnsupportedMethod,

    #[error("malformed header line")]
    MalformedHeader,

    #[error("header section exceeds {MAX_HEADER_SIZE} bytes")]
    HeaderTooLarge,

    #[error("body exceeds {MAX_BODY_SIZE} bytes")]
    BodyTooLarge,

    #[error("invalid Content-Length value")]
    InvalidContentLength,
}

/// Buffers incoming bytes and decodes one `HttpRequest` at a time.
#[derive(Debug, Default)]
pub struct HttpCodec {
    input: BytesMut,
}

impl HttpCodec {
    #[must_use]
    pub fn new() -> Self {
        Self { input: BytesMut::new() }
    }

    /// Feed bytes received from the record layer's decrypted output.
    pub fn feed(&mut self, data: &[u8]) {
        self.input.extend_from_slice(data);
    }

    /// Attempt to decode one complete request. `Ok(None)` means the buffer
    /// doesn't yet hold a full request and the caller should feed more.
    pub fn decode(&mut self) -> Result<Option<HttpRequest>, HttpCodecError> {
        let Some(header_end) = find_header_end(&self.input) else {
            if self.input.len() > MAX_HEADER_SIZE {
                return Err(HttpCodecError::HeaderTooLarge);
            }
            return Ok(None);
        };
        if header_end > MAX_HEADER_SIZE {
            return Err(HttpCodecError::HeaderTooLarge);
        }

        let header_bytes = &self.input[..header_end];
        let header_text = std::str::from_utf8(header_bytes).map_err(|_| HttpCodecError::MalformedRequestLine)?;
        let mut lines = header_text.split("\r\n");

        let request_line = lines.next().ok_or(HttpCodecError::MalformedRequestLine)?;
        let (method, path) = parse_request_line(request_line)?;
        let headers = parse_headers(lines)?;

        let body_len = match headers.content_length() {
            Some(len) => len,
            None => 0,
        };
        if body_len > MAX_BODY_SIZE {
            return Err(HttpCodecError::BodyTooLarge);
        }

        let total_len = header_end + 4 + body_len;
        if self.input.len() < total_len {
            return Ok(None);
        }

        let body = self.input[header_end + 4..total_len].to_vec();
        let _ = self.input.split_to(total_len);

        Ok(Some(HttpRequest { method, path, headers, body }))
    }
}

/// Index of the `\r\n\r\n` separating headers from body, if present.
fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_request_line(line: &str) -> Result<(Method, String), HttpCodecError> {
    let mut parts = line.split(' ');
    let method_str = parts.next().ok_or(HttpCodecError::MalformedRequestLine)?;
    let path = parts.next().ok_or(HttpCodecError::MalformedRequestLine)?;
    let _version = parts.next().ok_or(HttpCodecError::MalformedRequestLine)?;

    let method = Method::from_str(method_str).ok_or(HttpCodecError::UnsupportedMethod)?;
    Ok((method, path.to_string()))
}

fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> Result<Headers, HttpCodecError> {
    let mut headers = Headers::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once(':').ok_or(HttpCodecError::MalformedHeader)?;
        headers.insert(name.trim(), value.trim());
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_request_with_body() {
        let mut codec = HttpCodec::new();
        codec.feed(b"POST /pair-setup HTTP/1.1\r\nContent-Type: application/pairing+tlv8\r\nContent-Length: 5\r\n\r\nhello");
        let request = codec.decode().unwrap().unwrap();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, "/pair-setup");
        assert_eq!(request.body, b"hello");
    }

    #[test]
    fn decodes_request_without_body() {
        let mut codec = HttpCodec::new();
        codec.feed(b"GET /accessories HTTP/1.1\r\n\r\n");
        let request = codec.decode().unwrap().unwrap();
        assert_eq!(request.method, Method::Get);
        assert!(request.body.is_empty());
    }

    #[test]
    fn partial_headers_wait_for_more_bytes() {
        let mut codec = HttpCodec::new();
        codec.feed(b"GET /accessories HTTP/1.1\r\nContent-L");
        assert!(codec.decode().unwrap().is_none());
    }

    #[test]
    fn partial_body_waits_for_more_bytes() {
        let mut codec = HttpCodec::new();
        codec.feed(b"PUT /characteristics HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc");
        assert!(codec.decode().unwrap().is_none());
        codec.feed(b"defghijk");
        let request = codec.decode().unwrap().unwrap();
        assert_eq!(request.body, b"abcdefghij");
    }

    #[test]
    fn query_string_preserved_for_characteristics_get() {
        let mut codec = HttpCodec::new();
        codec.feed(b"GET /characteristics?id=1.10&meta=1 HTTP/1.1\r\n\r\n");
        let request = codec.decode().unwrap().unwrap();
        assert_eq!(request.path_without_query(), "/characteristics");
        assert_eq!(request.query(), Some("id=1.10&meta=1"));
    }

    #[test]
    fn pipelined_requests_decode_one_at_a_time() {
        let mut codec = HttpCodec::new();
        codec.feed(b"GET /accessories HTTP/1.1\r\n\r\nGET /accessories HTTP/1.1\r\n\r\n");
        assert!(codec.decode().unwrap().is_some());
        assert!(codec.decode().unwrap().is_some());
        assert!(codec.decode().unwrap().is_none());
    }

    #[test]
    fn oversized_header_section_is_rejected() {
        let mut codec = HttpCodec::new();
        let mut junk = vec![b'a'; MAX_HEADER_SIZE + 1];
        junk.extend_from_slice(b"\r\n\r\n");
        codec.feed(b"GET / HTTP/1.1\r\nX-Junk: ");
        codec.feed(&junk);
        assert!(matches!(codec.decode(), Err(HttpCodecError::HeaderTooLarge)));
    }
}
