//! RTSP protocol implementation (RFC 2326).
//!
//! This module handles the text-based RTSP signaling protocol: the message
//! model, the stream framer that separates messages from interleaved media,
//! the `Transport` header, and the SDP facts needed for SETUP.
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! RTSP messages follow HTTP/1.1 syntax with a different method set:
//!
//! ```text
//! DESCRIBE rtsp://server/stream RTSP/1.0\r\n
//! CSeq: 2\r\n
//! Accept: application/sdp\r\n
//! \r\n
//! ```
//!
//! Key differences from HTTP:
//! - Stateful: sessions persist across requests (RFC 2326 §3).
//! - Different methods: OPTIONS, DESCRIBE, SETUP, PLAY, PAUSE, TEARDOWN, ...
//! - Either side may send requests; responses are matched by CSeq.
//! - Binary RTP may be interleaved on the same connection (RFC 2326 §10.12).

pub mod framer;
pub mod headers;
pub mod message;
pub mod request;
pub mod response;
pub mod sdp;
pub mod transport;

pub use framer::{InterleavedData, RtspChunk, RtspFramer};
pub use headers::Headers;
pub use message::{RtspMessage, UnknownMessage};
pub use request::{Method, RtspRequest};
pub use response::RtspResponse;
pub use sdp::{MediaDescription, SessionDescription};
pub use transport::{LowerTransport, PortCouple, RtspTransport};
