//! Error types for the RTSP engine.

use std::fmt;

/// Errors that can occur in the RTSP engine.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Protocol**: [`Parse`](Self::Parse): malformed RTSP messages, RTP
///   headers or `Transport` values handed directly to a parser.
/// - **Transport**: [`Io`](Self::Io), [`ConnectionClosed`](Self::ConnectionClosed).
/// - **Authentication**: [`UnsupportedAuthentication`](Self::UnsupportedAuthentication)
///   when a `WWW-Authenticate` challenge cannot be answered.
/// - **Contract**: [`InvalidArgument`](Self::InvalidArgument): caller passed
///   something the API cannot accept (e.g. an oversized interleaved payload).
///
/// Codec reassembly problems are not errors: depacketizers drop the packet,
/// bump a counter and keep going.
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse protocol data.
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The connection's reader has stopped; nothing more can be sent or received.
    #[error("connection closed")]
    ConnectionClosed,

    /// A `WWW-Authenticate` challenge used a scheme or algorithm we cannot answer.
    #[error("unsupported authentication: {0}")]
    UnsupportedAuthentication(String),

    /// The caller violated an API contract.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl RtspError {
    pub(crate) fn parse(kind: ParseErrorKind) -> Self {
        RtspError::Parse { kind }
    }
}

/// Specific kind of parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Input was empty (no command line).
    EmptyMessage,
    /// Command line was neither `Method URI RTSP/x.y` nor `RTSP/x.y Code Reason`.
    InvalidCommandLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// `Content-Length` was not a number or exceeded the available bytes.
    InvalidContentLength,
    /// `Transport` header value could not be parsed.
    InvalidTransport,
    /// Datagram too short or inconsistent to be an RTP packet.
    InvalidRtpPacket,
    /// Authentication header could not be parsed.
    InvalidAuthenticationHeader,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMessage => write!(f, "empty message"),
            Self::InvalidCommandLine => write!(f, "invalid command line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidContentLength => write!(f, "invalid content length"),
            Self::InvalidTransport => write!(f, "invalid transport"),
            Self::InvalidRtpPacket => write!(f, "invalid RTP packet"),
            Self::InvalidAuthenticationHeader => write!(f, "invalid authentication header"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
