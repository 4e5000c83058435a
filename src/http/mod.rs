//! HTTP/1.1 request parsing and response construction for the HAP wire
//! format (§4.5): plain headers, buffered bodies, chunked JSON bodies, and
//! the `EVENT/1.0` pseudo-response used for notifications.

mod codec;
mod headers;
mod request;
mod response;

pub use codec::{HttpCodec, HttpCodecError, MAX_BODY_SIZE, MAX_HEADER_SIZE};
pub use headers::{content_type, names, Headers};
pub use request::{HttpRequest, Method};
pub use response::{encode_event, json_status_body, HttpResponse, ResponseBuilder, StatusCode};
