use super::{Headers, headers::{content_type, names}};

/// HTTP status codes used by the HAP surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const MULTI_STATUS: StatusCode = StatusCode(207);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    pub const NOT_FOUND: StatusCode = StatusCode(404);

    #[must_use]
    pub fn as_u16(self) -> u16 {
        self.0
    }

    fn reason(self) -> &'static str {
        match self.0 {
            200 => "OK",
            204 => "No Content",
            207 => "Multi-Status",
            400 => "Bad Request",
            401 => "Unauthorized",
            404 => "Not Found",
            _ => "Unknown",
        }
    }
}

/// A fully-buffered HTTP/1.1 response, or the `EVENT/1.0` pseudo-response
/// used to push characteristic-change notifications.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_line: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Fluent response construction, mirroring the HAP response shapes the
/// router needs: fixed TLV8, fixed JSON, chunked JSON, and 204.
#[derive(Debug, Clone)]
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
    chunked: bool,
}

impl ResponseBuilder {
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
            chunked: false,
        }
    }

    #[must_use]
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    #[must_use]
    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT)
    }

    #[must_use]
    pub fn tlv8(mut self, body: Vec<u8>) -> Self {
        self.headers.insert(names::CONTENT_TYPE, content_type::TLV8);
        self.body = body;
        self
    }

    #[must_use]
    pub fn json(mut self, body: Vec<u8>) -> Self {
        self.headers.insert(names::CONTENT_TYPE, content_type::HAP_JSON);
        self.body = body;
        self
    }

    /// Marks the body for chunked transfer (`GET /accessories`,
    /// `GET /characteristics`). The body is still built up-front here; the
    /// wire-level chunk splitting happens in [`encode_response`].
    #[must_use]
    pub fn chunked_json(mut self, body: Vec<u8>) -> Self {
        self.headers.insert(names::CONTENT_TYPE, content_type::HAP_JSON);
        self.headers.insert(names::TRANSFER_ENCODING, "chunked");
        self.chunked = true;
        self.body = body;
        self
    }

    #[must_use]
    pub fn build(mut self) -> HttpResponse {
        if !self.chunked && (!self.body.is_empty() || self.status == StatusCode::OK) {
            self.headers.insert(names::CONTENT_LENGTH, self.body.len().to_string());
        }
        HttpResponse {
            status_line: format!("HTTP/1.1 {} {}", self.status.as_u16(), self.status.reason()),
            headers: self.headers,
            body: self.body,
        }
    }

    #[must_use]
    pub fn encode(self) -> Vec<u8> {
        let chunked = self.chunked;
        let response = self.build();
        if chunked { encode_chunked(&response) } else { encode_fixed(&response) }
    }
}

fn write_headers(out: &mut Vec<u8>, response: &HttpResponse) {
    out.extend_from_slice(response.status_line.as_bytes());
    out.extend_from_slice(b"\r\n");
    for (name, value) in response.headers.iter() {
        out.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
    }
    out.extend_from_slice(b"\r\n");
}

fn encode_fixed(response: &HttpResponse) -> Vec<u8> {
    let mut out = Vec::with_capacity(256 + response.body.len());
    write_headers(&mut out, response);
    out.extend_from_slice(&response.body);
    out
}

/// Encode the whole body as a single HTTP chunk followed by the
/// terminating zero-length chunk, matching how a streaming JSON writer
/// would flush one buffered document.
fn encode_chunked(response: &HttpResponse) -> Vec<u8> {
    let mut out = Vec::with_capacity(256 + response.body.len() + 16);
    write_headers(&mut out, response);
    if !response.body.is_empty() {
        out.extend_from_slice(format!("{:x}\r\n", response.body.len()).as_bytes());
        out.extend_from_slice(&response.body);
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"0\r\n\r\n");
    out
}

/// Exact header text for the `EVENT/1.0` pseudo-response used to push
/// notifications on an already-open connection, taken verbatim from the
/// original accessory implementation's wire format.
const EVENT_HEADER: &str = "EVENT/1.0 200 OK\r\nContent-Type: application/hap+json\r\nTransfer-Encoding: chunked\r\n\r\n";

/// Build an `EVENT/1.0` chunked JSON push carrying `body`.
#[must_use]
pub fn encode_event(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(EVENT_HEADER.len() + body.len() + 16);
    out.extend_from_slice(EVENT_HEADER.as_bytes());
    out.extend_from_slice(format!("{:x}\r\n", body.len()).as_bytes());
    out.extend_from_slice(body);
    out.extend_from_slice(b"\r\n0\r\n\r\n");
    out
}

/// The minimal `{"status": N}` JSON body used for single-field error
/// replies, matching the original accessory's `json_status` format string.
#[must_use]
pub fn json_status_body(status: i32) -> Vec<u8> {
    format!("{{\"status\": {status}}}").into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_response_has_content_length() {
        let bytes = ResponseBuilder::ok().json(b"{}".to_vec()).encode();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.ends_with("{}"));
    }

    #[test]
    fn chunked_response_wraps_body_in_one_chunk() {
        let body = b"{\"accessories\":[]}".to_vec();
        let bytes = ResponseBuilder::ok().chunked_json(body.clone()).encode();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(text.contains(&format!("{:x}\r\n", body.len())));
        assert!(text.ends_with("0\r\n\r\n"));
    }

    #[test]
    fn no_content_has_no_body() {
        let bytes = ResponseBuilder::no_content().encode();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn event_pseudo_response_is_not_an_http_status_line() {
        let bytes = encode_event(b"{\"characteristics\":[]}");
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.starts_with("EVENT/1.0 200 OK\r\n"));
        assert!(!text.starts_with("HTTP/1.1"));
    }

    #[test]
    fn json_status_body_matches_original_format() {
        assert_eq!(json_status_body(0), b"{\"status\": 0}");
        assert_eq!(json_status_body(-70409), b"{\"status\": -70409}");
    }
}
