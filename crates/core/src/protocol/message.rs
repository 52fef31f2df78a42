use std::time::Instant;

use super::headers::{Headers, write_headers_and_body};
use super::request::{Method, RtspRequest};
use super::response::RtspResponse;
use crate::error::{ParseErrorKind, RtspError};

/// Any unit exchanged on the RTSP control channel.
#[derive(Debug, Clone)]
pub enum RtspMessage {
    Request(RtspRequest),
    Response(RtspResponse),
    /// The command line was neither a request nor a response. Kept so the
    /// application can see what the peer sent; never fatal.
    Unknown(UnknownMessage),
}

/// A message whose command line could not be classified.
#[derive(Debug, Clone)]
pub struct UnknownMessage {
    pub command_line: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    pub created_at: Instant,
}

impl RtspMessage {
    /// Parse one complete message (command line, headers, blank line, body).
    ///
    /// Malformed header lines are dropped with a warning. An unclassifiable
    /// command line yields [`RtspMessage::Unknown`]. Only empty input and a
    /// bad or overlong `Content-Length` are errors.
    pub fn parse(raw: &[u8]) -> crate::error::Result<Self> {
        let (head, rest) = split_head(raw);
        let head = String::from_utf8_lossy(head);
        let mut lines = head
            .split('\n')
            .map(|l| l.strip_suffix('\r').unwrap_or(l))
            .skip_while(|l| l.trim().is_empty());

        let command_line = lines
            .next()
            .ok_or(RtspError::parse(ParseErrorKind::EmptyMessage))?
            .to_string();

        let mut headers = Headers::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            if !headers.push_line(line) {
                tracing::warn!(line, "dropping malformed header line");
            }
        }

        let len = headers
            .content_length()
            .map_err(|_| RtspError::parse(ParseErrorKind::InvalidContentLength))?;
        if len > rest.len() {
            return Err(RtspError::parse(ParseErrorKind::InvalidContentLength));
        }

        Ok(Self::from_parts(&command_line, headers, rest[..len].to_vec()))
    }

    /// Assemble a message from an already-split command line, headers and body.
    pub(crate) fn from_parts(command_line: &str, headers: Headers, body: Vec<u8>) -> Self {
        match classify(command_line) {
            CommandLine::Request {
                method,
                uri,
                version,
            } => {
                if version != "RTSP/1.0" {
                    tracing::debug!(version, "peer sent non-RTSP/1.0 request");
                }
                RtspMessage::Request(RtspRequest {
                    method: Method::from_token(method),
                    uri: uri.to_string(),
                    version: version.to_string(),
                    headers,
                    body,
                    created_at: Instant::now(),
                })
            }
            CommandLine::Response {
                version,
                status_code,
                reason,
            } => RtspMessage::Response(RtspResponse {
                status_code,
                status_text: reason,
                version: version.to_string(),
                headers,
                body,
                original_request: None,
                created_at: Instant::now(),
            }),
            CommandLine::Unknown => {
                tracing::warn!(command_line, "unrecognised RTSP command line");
                RtspMessage::Unknown(UnknownMessage {
                    command_line: command_line.to_string(),
                    headers,
                    body,
                    created_at: Instant::now(),
                })
            }
        }
    }

    pub fn headers(&self) -> &Headers {
        match self {
            RtspMessage::Request(r) => &r.headers,
            RtspMessage::Response(r) => &r.headers,
            RtspMessage::Unknown(u) => &u.headers,
        }
    }

    pub fn body(&self) -> &[u8] {
        match self {
            RtspMessage::Request(r) => &r.body,
            RtspMessage::Response(r) => &r.body,
            RtspMessage::Unknown(u) => &u.body,
        }
    }

    pub fn cseq(&self) -> Option<u32> {
        self.headers()
            .get("CSeq")
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn serialize(&self) -> Vec<u8> {
        match self {
            RtspMessage::Request(r) => r.serialize(),
            RtspMessage::Response(r) => r.serialize(),
            RtspMessage::Unknown(u) => {
                let mut out = Vec::new();
                out.extend_from_slice(u.command_line.as_bytes());
                out.extend_from_slice(b"\r\n");
                write_headers_and_body(&u.headers, &u.body, &mut out);
                out
            }
        }
    }
}

impl From<RtspRequest> for RtspMessage {
    fn from(req: RtspRequest) -> Self {
        RtspMessage::Request(req)
    }
}

impl From<RtspResponse> for RtspMessage {
    fn from(resp: RtspResponse) -> Self {
        RtspMessage::Response(resp)
    }
}

pub(crate) enum CommandLine<'a> {
    Request {
        method: &'a str,
        uri: &'a str,
        version: &'a str,
    },
    Response {
        version: &'a str,
        status_code: u16,
        reason: String,
    },
    Unknown,
}

/// Classify a command line.
///
/// Request when the third token is `RTSP/d.d`, response when the first is.
pub(crate) fn classify(line: &str) -> CommandLine<'_> {
    let tokens: Vec<&str> = line.split_whitespace().collect();

    if tokens.len() >= 3 && is_rtsp_version(tokens[2]) {
        return CommandLine::Request {
            method: tokens[0],
            uri: tokens[1],
            version: tokens[2],
        };
    }

    if tokens.len() >= 2 && is_rtsp_version(tokens[0]) {
        if let Ok(status_code) = tokens[1].parse::<u16>()
            && (100..=599).contains(&status_code)
        {
            return CommandLine::Response {
                version: tokens[0],
                status_code,
                reason: tokens[2..].join(" "),
            };
        }
    }

    CommandLine::Unknown
}

fn is_rtsp_version(token: &str) -> bool {
    let b = token.as_bytes();
    b.len() == 8
        && token.starts_with("RTSP/")
        && b[5].is_ascii_digit()
        && b[6] == b'.'
        && b[7].is_ascii_digit()
}

/// Split raw bytes at the first blank line into (head, body).
fn split_head(raw: &[u8]) -> (&[u8], &[u8]) {
    for i in 0..raw.len() {
        if raw[i..].starts_with(b"\r\n\r\n") {
            return (&raw[..i], &raw[i + 4..]);
        }
        if raw[i..].starts_with(b"\n\n") {
            return (&raw[..i], &raw[i + 2..]);
        }
    }
    (raw, &raw[raw.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_request_and_response() {
        assert!(matches!(
            classify("DESCRIBE rtsp://cam/ RTSP/1.0"),
            CommandLine::Request { .. }
        ));
        assert!(matches!(
            classify("RTSP/1.0 200 OK"),
            CommandLine::Response { status_code: 200, .. }
        ));
        assert!(matches!(classify("HTTP/1.1 200 OK"), CommandLine::Unknown));
        assert!(matches!(classify("GET / RTSP/x.0"), CommandLine::Unknown));
        assert!(matches!(classify(""), CommandLine::Unknown));
    }

    #[test]
    fn response_without_reason() {
        match classify("RTSP/2.0 204") {
            CommandLine::Response {
                version,
                status_code,
                reason,
            } => {
                assert_eq!(version, "RTSP/2.0");
                assert_eq!(status_code, 204);
                assert!(reason.is_empty());
            }
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn unknown_command_line_is_not_an_error() {
        let msg = RtspMessage::parse(b"HELLO THERE\r\nCSeq: 2\r\n\r\n").unwrap();
        match msg {
            RtspMessage::Unknown(u) => {
                assert_eq!(u.command_line, "HELLO THERE");
                assert_eq!(u.headers.get("cseq"), Some("2"));
            }
            other => panic!("expected unknown, got {other:?}"),
        }
    }

    #[test]
    fn malformed_header_is_dropped() {
        let msg = RtspMessage::parse(b"RTSP/1.0 200 OK\r\nCSeq: 3\r\nnonsense\r\nSession: 1\r\n\r\n")
            .unwrap();
        assert_eq!(msg.headers().len(), 2);
        assert_eq!(msg.cseq(), Some(3));
    }

    #[test]
    fn bare_lf_line_endings() {
        let msg = RtspMessage::parse(b"RTSP/1.0 200 OK\nCSeq: 4\nContent-Length: 2\n\nhi").unwrap();
        assert_eq!(msg.cseq(), Some(4));
        assert_eq!(msg.body(), b"hi");
    }

    #[test]
    fn overlong_content_length_is_an_error() {
        assert!(RtspMessage::parse(b"RTSP/1.0 200 OK\r\nContent-Length: 10\r\n\r\nhi").is_err());
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(RtspMessage::parse(b"").is_err());
        assert!(RtspMessage::parse(b"\r\n\r\n").is_err());
    }
}
