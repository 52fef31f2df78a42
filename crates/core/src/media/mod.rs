//! RTP depacketization.
//!
//! This module provides the [`Depacketizer`] trait and codec-specific
//! implementations that turn a sequence of RTP packets back into whole
//! media access units.
//!
//! ## RTP overview (RFC 3550)
//!
//! A sender splits each encoded frame into one or more RTP packets.
//! Every packet carries a 12-byte fixed header ([`rtp::RtpPacket`]) with:
//!
//! - **Sequence number** (16-bit, wrapping): for reordering and loss detection.
//! - **Timestamp** (32-bit): media clock, typically 90 kHz for video.
//! - **SSRC** (32-bit): identifies the stream.
//! - **Marker bit**: set on the last packet of an access unit (frame).
//!
//! ## Supported payload formats
//!
//! | Codec | Module | RFC | Emits |
//! |-------|--------|-----|-------|
//! | H.264 | [`h264`] | [RFC 6184](https://tools.ietf.org/html/rfc6184) | on marker |
//! | H.265 | [`h265`] | [RFC 7798](https://tools.ietf.org/html/rfc7798) | on marker |
//! | JPEG | [`jpeg`] | [RFC 2435](https://tools.ietf.org/html/rfc2435) | on marker |
//! | AAC | [`aac`] | [RFC 3640](https://tools.ietf.org/html/rfc3640) | per packet |
//! | AMR | [`amr`] | [RFC 4867](https://tools.ietf.org/html/rfc4867) | per packet |
//! | G.711.1 | [`g711`] | [RFC 5391](https://tools.ietf.org/html/rfc5391) | per packet |
//! | G.711, MP2T, other | [`raw`] | RFC 3551 / RFC 2250 | per packet |

pub mod aac;
pub mod amr;
pub mod g711;
pub mod h264;
pub mod h265;
pub mod jpeg;
mod nal;
pub mod raw;
pub mod rtp;

use crate::protocol::sdp::MediaDescription;
pub use rtp::{RtpHeader, RtpPacket};

/// One completed access unit.
///
/// `units` holds the logical units in order: NAL units (without start
/// codes) for H.264/H.265, a single contiguous JPEG image, one entry per
/// AAC frame, and so on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFrame {
    /// RTP timestamp shared by the packets of this frame.
    pub timestamp: u32,
    pub units: Vec<Vec<u8>>,
}

impl MediaFrame {
    pub fn new(timestamp: u32, units: Vec<Vec<u8>>) -> Self {
        Self { timestamp, units }
    }

    /// Total payload bytes across all units.
    pub fn len(&self) -> usize {
        self.units.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.units.iter().all(Vec::is_empty)
    }

    /// Concatenate the units into an H.264/H.265 Annex B byte stream.
    pub fn to_annex_b(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() + 4 * self.units.len());
        for unit in &self.units {
            out.extend_from_slice(&[0, 0, 0, 1]);
            out.extend_from_slice(unit);
        }
        out
    }
}

/// Counters kept by every depacketizer.
///
/// Nothing here is an error: each counter records a packet or partial
/// frame that was dropped so the stream could carry on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepacketizerStats {
    /// Access units emitted.
    pub frames: u64,
    /// Packets that were too short or structurally invalid.
    pub malformed_packets: u64,
    /// Packets using a payload structure we do not implement
    /// (STAP-B, MTAP, FU-B, DONL, PACI, bandwidth-efficient AMR, ...).
    pub unsupported_packets: u64,
    /// Continuation fragments with no preceding start fragment.
    pub orphan_fragments: u64,
    /// Start fragments that discarded an unterminated earlier fragment.
    pub restarted_fragments: u64,
    /// Aggregation or AU sizes that overran the packet.
    pub truncated_units: u64,
    /// Partial frames discarded because the timestamp moved on before
    /// the marker bit arrived.
    pub stale_frames: u64,
}

/// Codec-specific RTP depacketizer.
///
/// One instance per RTP stream (SSRC / payload type). Instances hold
/// reassembly buffers and are not meant to be shared between threads;
/// `Send` lets a stream consumer own one on its worker.
///
/// ## Implementing a new codec
///
/// 1. Create a new module (e.g. `media/opus.rs`)
/// 2. Implement `Depacketizer` for your type
/// 3. Add its encoding name to [`depacketizer_for`]
pub trait Depacketizer: Send {
    /// Consume one packet; return an access unit once one is complete.
    ///
    /// Bad packets are counted in [`stats`](Self::stats) and skipped.
    fn process_packet(&mut self, packet: &RtpPacket<'_>) -> Option<MediaFrame>;

    /// Encoding name as it appears in `a=rtpmap` (e.g. `"H264"`).
    fn codec_name(&self) -> &'static str;

    fn stats(&self) -> DepacketizerStats;
}

/// Pick the depacketizer for an SDP media section.
///
/// Unknown encodings fall back to [`raw::RawDepacketizer`], which hands
/// each payload through unchanged.
pub fn depacketizer_for(media: &MediaDescription) -> Box<dyn Depacketizer> {
    match media.encoding_name.as_str() {
        "H264" => Box::new(h264::H264Depacketizer::new()),
        "H265" => Box::new(h265::H265Depacketizer::from_media(media)),
        "JPEG" => Box::new(jpeg::JpegDepacketizer::new()),
        "MPEG4-GENERIC" => Box::new(aac::AacDepacketizer::from_media(media)),
        "AMR" | "AMR-WB" => Box::new(amr::AmrDepacketizer::from_media(media)),
        "G7111" => Box::new(g711::G7111Depacketizer::new()),
        "PCMU" | "PCMA" => Box::new(raw::RawDepacketizer::new("G711")),
        "MP2T" => Box::new(raw::RawDepacketizer::new("MP2T")),
        other => {
            tracing::debug!(encoding = other, "no specific depacketizer, passing payloads through");
            Box::new(raw::RawDepacketizer::new("RAW"))
        }
    }
}
