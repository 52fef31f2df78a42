//! Connection layer for RTSP signaling and interleaved RTP.
//!
//! RTSP runs over one TCP connection per camera. Once SETUP negotiates
//! `RTP/AVP/TCP;interleaved=N-M`, the same connection also carries the
//! media as `$`-framed binary chunks (RFC 2326 §10.12).
//!
//! [`tcp::RtspListener`] owns that connection: a dedicated reader thread
//! splits the stream with [`crate::protocol::RtspFramer`] and hands
//! [`RtspEvent`]s to the consumer over a channel, while any thread may
//! send requests, responses or interleaved data through the shared write
//! half.

pub mod tcp;

pub use tcp::{ListenerConfig, RtspEvent, RtspListener};
