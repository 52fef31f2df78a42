use super::rtp::RtpPacket;
use super::{Depacketizer, DepacketizerStats, MediaFrame};

/// Passthrough depacketizer: every non-empty payload is one frame.
///
/// Used for G.711 (PCMU/PCMA), MPEG-2 TS (RFC 2250) and any encoding
/// without a dedicated depacketizer.
#[derive(Debug)]
pub struct RawDepacketizer {
    codec: &'static str,
    stats: DepacketizerStats,
}

impl RawDepacketizer {
    pub fn new(codec: &'static str) -> Self {
        Self {
            codec,
            stats: DepacketizerStats::default(),
        }
    }
}

impl Depacketizer for RawDepacketizer {
    fn process_packet(&mut self, packet: &RtpPacket<'_>) -> Option<MediaFrame> {
        let payload = packet.payload();
        if payload.is_empty() {
            return None;
        }
        self.stats.frames += 1;
        Some(MediaFrame::new(packet.timestamp(), vec![payload.to_vec()]))
    }

    fn codec_name(&self) -> &'static str {
        self.codec
    }

    fn stats(&self) -> DepacketizerStats {
        self.stats
    }
}
