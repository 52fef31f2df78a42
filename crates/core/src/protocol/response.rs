use std::time::Instant;

use super::headers::{Headers, split_session, write_headers_and_body};
use super::message::RtspMessage;
use super::request::RtspRequest;
use crate::error::{ParseErrorKind, RtspError};

/// Session timeout assumed when the `Session` header carries none
/// (RFC 2326 §12.37).
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;

/// Identification string for responses built with [`RtspResponse::new`]
/// (RFC 2326 §12.36).
pub const SERVER_AGENT: &str = concat!("rtsp-media/", env!("CARGO_PKG_VERSION"));

/// An RTSP response (RFC 2326 §7).
///
/// ```text
/// RTSP/1.0 200 OK\r\n
/// CSeq: 1\r\n
/// Content-Type: application/sdp\r\n
/// Content-Length: 142\r\n
/// \r\n
/// v=0\r\n...
/// ```
///
/// Uses a builder pattern: chain [`add_header`](Self::add_header) and
/// [`with_body`](Self::with_body), then call [`serialize`](Self::serialize).
/// `Content-Length` is computed from the body on every serialization.
#[derive(Debug, Clone)]
#[must_use]
pub struct RtspResponse {
    pub status_code: u16,
    pub status_text: String,
    pub version: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    /// The request this answers, attached by the listener when the CSeq
    /// matched a pending request.
    pub original_request: Option<Box<RtspRequest>>,
    pub created_at: Instant,
}

impl RtspResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        debug_assert!((100..=599).contains(&status_code));
        let mut headers = Headers::new();
        headers.set("Server", SERVER_AGENT);
        RtspResponse {
            status_code,
            status_text: status_text.to_string(),
            version: "RTSP/1.0".to_string(),
            headers,
            body: Vec::new(),
            original_request: None,
            created_at: Instant::now(),
        }
    }

    /// 200 OK: success (RFC 2326 §7.1.1).
    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    /// 404 Not Found: the requested resource does not exist.
    pub fn not_found() -> Self {
        Self::new(404, "Not Found")
    }

    /// 400 Bad Request: malformed or missing required header.
    pub fn bad_request() -> Self {
        Self::new(400, "Bad Request")
    }

    /// 401 Unauthorized: pair with a `WWW-Authenticate` challenge.
    pub fn unauthorized() -> Self {
        Self::new(401, "Unauthorized")
    }

    /// Parse one complete response from its wire form.
    pub fn parse(raw: &[u8]) -> crate::error::Result<Self> {
        match RtspMessage::parse(raw)? {
            RtspMessage::Response(resp) => Ok(resp),
            _ => Err(RtspError::parse(ParseErrorKind::InvalidCommandLine)),
        }
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn cseq(&self) -> Option<u32> {
        self.headers.get("CSeq").and_then(|v| v.trim().parse().ok())
    }

    /// 2xx status.
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Session id with any `;timeout=` suffix removed.
    pub fn session(&self) -> Option<&str> {
        self.headers.get("Session").map(|v| split_session(v).0)
    }

    /// Session timeout in seconds, defaulting to 60 when a `Session`
    /// header has no explicit timeout.
    pub fn session_timeout(&self) -> Option<u64> {
        self.headers
            .get("Session")
            .map(|v| split_session(v).1.unwrap_or(DEFAULT_SESSION_TIMEOUT_SECS))
    }

    /// Serialize to the RTSP wire format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.body.len());
        out.extend_from_slice(
            format!("{} {} {}\r\n", self.version, self.status_code, self.status_text).as_bytes(),
        );
        write_headers_and_body(&self.headers, &self.body, &mut out);
        out
    }
}

/// Default reason phrase for a status code (RFC 2326 §7.1.1).
pub fn reason_phrase(status_code: u16) -> &'static str {
    match status_code {
        100 => "Continue",
        200 => "OK",
        201 => "Created",
        250 => "Low on Storage Space",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Moved Temporarily",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Time-out",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Request Entity Too Large",
        414 => "Request-URI Too Large",
        415 => "Unsupported Media Type",
        451 => "Parameter Not Understood",
        452 => "Conference Not Found",
        453 => "Not Enough Bandwidth",
        454 => "Session Not Found",
        455 => "Method Not Valid in This State",
        456 => "Header Field Not Valid for Resource",
        457 => "Invalid Range",
        458 => "Parameter Is Read-Only",
        459 => "Aggregate operation not allowed",
        460 => "Only aggregate operation allowed",
        461 => "Unsupported transport",
        462 => "Destination unreachable",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Time-out",
        505 => "RTSP Version not supported",
        551 => "Option not supported",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_no_body() {
        let resp = RtspResponse::ok()
            .add_header("CSeq", "1")
            .add_header("Public", "OPTIONS");
        let s = String::from_utf8(resp.serialize()).unwrap();
        assert!(s.starts_with("RTSP/1.0 200 OK\r\n"));
        assert!(s.contains(&format!("Server: {SERVER_AGENT}\r\n")));
        assert!(s.contains("CSeq: 1\r\n"));
        assert!(s.contains("Public: OPTIONS\r\n"));
        assert!(!s.contains("Content-Length"));
        assert!(s.ends_with("\r\n\r\n"));
    }

    #[test]
    fn serialize_with_body() {
        let resp = RtspResponse::ok()
            .add_header("CSeq", "2")
            .with_body("v=0\r\n");
        let s = String::from_utf8(resp.serialize()).unwrap();
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.ends_with("v=0\r\n"));
    }

    #[test]
    fn parse_response_with_multiword_reason() {
        let raw = b"RTSP/1.0 454 Session Not Found\r\nCSeq: 5\r\n\r\n";
        let resp = RtspResponse::parse(raw).unwrap();
        assert_eq!(resp.status_code, 454);
        assert_eq!(resp.status_text, "Session Not Found");
        assert_eq!(resp.cseq(), Some(5));
        assert!(!resp.is_ok());
    }

    #[test]
    fn session_timeout_parsing() {
        let resp = RtspResponse::ok().add_header("Session", "4711;timeout=30");
        assert_eq!(resp.session(), Some("4711"));
        assert_eq!(resp.session_timeout(), Some(30));

        let resp = RtspResponse::ok().add_header("Session", "4711");
        assert_eq!(resp.session_timeout(), Some(DEFAULT_SESSION_TIMEOUT_SECS));

        assert_eq!(RtspResponse::ok().session_timeout(), None);
    }

    #[test]
    fn status_code_out_of_range_is_not_a_response() {
        assert!(RtspResponse::parse(b"RTSP/1.0 999 Nope\r\n\r\n").is_err());
        assert!(RtspResponse::parse(b"RTSP/1.0 abc Nope\r\n\r\n").is_err());
    }

    #[test]
    fn not_found_response() {
        let resp = RtspResponse::not_found().add_header("CSeq", "5");
        assert_eq!(resp.status_code, 404);
        let s = String::from_utf8(resp.serialize()).unwrap();
        assert!(s.starts_with("RTSP/1.0 404 Not Found\r\n"));
    }

    #[test]
    fn error_constructors() {
        assert!(!RtspResponse::bad_request().is_ok());
        let resp = RtspResponse::unauthorized()
            .add_header("WWW-Authenticate", "Basic realm=\"cam\"");
        let s = String::from_utf8(resp.serialize()).unwrap();
        assert!(s.starts_with("RTSP/1.0 401 Unauthorized\r\n"));
        assert!(s.contains("WWW-Authenticate: Basic realm=\"cam\"\r\n"));
    }
}
