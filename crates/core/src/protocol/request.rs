use std::fmt;
use std::time::Instant;

use super::headers::{Headers, split_session, write_headers_and_body};
use super::message::RtspMessage;
use super::response::{RtspResponse, reason_phrase};
use crate::error::{ParseErrorKind, RtspError};

/// RTSP method token (RFC 2326 §6.1).
///
/// Matching is case-sensitive, as the RFC requires. Anything we don't know
/// is kept verbatim in [`Method::Unknown`] so it can be echoed or logged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Options,
    Describe,
    Setup,
    Play,
    Pause,
    Teardown,
    Announce,
    Record,
    GetParameter,
    SetParameter,
    Redirect,
    Unknown(String),
}

impl Method {
    pub fn from_token(token: &str) -> Self {
        match token {
            "OPTIONS" => Method::Options,
            "DESCRIBE" => Method::Describe,
            "SETUP" => Method::Setup,
            "PLAY" => Method::Play,
            "PAUSE" => Method::Pause,
            "TEARDOWN" => Method::Teardown,
            "ANNOUNCE" => Method::Announce,
            "RECORD" => Method::Record,
            "GET_PARAMETER" => Method::GetParameter,
            "SET_PARAMETER" => Method::SetParameter,
            "REDIRECT" => Method::Redirect,
            other => Method::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Options => "OPTIONS",
            Method::Describe => "DESCRIBE",
            Method::Setup => "SETUP",
            Method::Play => "PLAY",
            Method::Pause => "PAUSE",
            Method::Teardown => "TEARDOWN",
            Method::Announce => "ANNOUNCE",
            Method::Record => "RECORD",
            Method::GetParameter => "GET_PARAMETER",
            Method::SetParameter => "SET_PARAMETER",
            Method::Redirect => "REDIRECT",
            Method::Unknown(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An RTSP request (RFC 2326 §6).
///
/// ```text
/// Method SP Request-URI SP RTSP-Version CRLF
/// *(Header: Value CRLF)
/// CRLF
/// [body]
/// ```
///
/// Header lookup is case-insensitive per RFC 2326 §4.2.
#[derive(Debug, Clone)]
pub struct RtspRequest {
    pub method: Method,
    /// Request-URI (e.g. `rtsp://host:port/stream/track1`), or `*`.
    pub uri: String,
    /// Protocol version, normally `RTSP/1.0`.
    pub version: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    /// When this value was parsed or built.
    pub created_at: Instant,
}

impl RtspRequest {
    pub fn new(method: Method, uri: &str) -> Self {
        RtspRequest {
            method,
            uri: uri.to_string(),
            version: "RTSP/1.0".to_string(),
            headers: Headers::new(),
            body: Vec::new(),
            created_at: Instant::now(),
        }
    }

    /// Parse one complete request from its wire form.
    ///
    /// Fails if the bytes hold a response or an unrecognisable command line.
    pub fn parse(raw: &[u8]) -> crate::error::Result<Self> {
        match RtspMessage::parse(raw)? {
            RtspMessage::Request(req) => Ok(req),
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

    /// CSeq as a number (RFC 2326 §12.17).
    pub fn cseq(&self) -> Option<u32> {
        self.headers.get("CSeq").and_then(|v| v.trim().parse().ok())
    }

    /// Session id with any `;timeout=` suffix removed.
    pub fn session(&self) -> Option<&str> {
        self.headers.get("Session").map(|v| split_session(v).0)
    }

    /// Build the response a server sends for this request.
    ///
    /// CSeq and Session are echoed; the reason phrase comes from the
    /// standard table.
    pub fn create_response(&self, status_code: u16) -> RtspResponse {
        let mut response = RtspResponse::new(status_code, reason_phrase(status_code));
        if let Some(cseq) = self.headers.get("CSeq") {
            response.headers.set("CSeq", cseq);
        }
        if let Some(session) = self.headers.get("Session") {
            response.headers.set("Session", session);
        }
        response
    }

    /// Serialize to the RTSP wire format. `Content-Length` always reflects
    /// the body.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + self.body.len());
        out.extend_from_slice(
            format!("{} {} {}\r\n", self.method, self.uri, self.version).as_bytes(),
        );
        write_headers_and_body(&self.headers, &self.body, &mut out);
        out
    }
}
