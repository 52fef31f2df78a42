use super::rtp::RtpPacket;
use super::{Depacketizer, DepacketizerStats, MediaFrame};
use crate::protocol::sdp::MediaDescription;

/// AMR / AMR-WB depacketizer (RFC 4867, octet-aligned mode).
///
/// Drops the one-byte CMR payload header and returns the rest of the
/// packet as one frame. Bandwidth-efficient mode packs the header into
/// bits and is not handled; such streams are still passed through but
/// the output will not be byte aligned.
#[derive(Debug)]
pub struct AmrDepacketizer {
    codec: &'static str,
    stats: DepacketizerStats,
}

impl AmrDepacketizer {
    pub fn new() -> Self {
        Self {
            codec: "AMR",
            stats: DepacketizerStats::default(),
        }
    }

    pub fn from_media(media: &MediaDescription) -> Self {
        if media.fmtp_u32("octet-align") != Some(1) {
            tracing::warn!(
                encoding = %media.encoding_name,
                "AMR stream is not octet-aligned, frames will be misaligned"
            );
        }
        Self {
            codec: if media.encoding_name == "AMR-WB" {
                "AMR-WB"
            } else {
                "AMR"
            },
            stats: DepacketizerStats::default(),
        }
    }
}

impl Default for AmrDepacketizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Depacketizer for AmrDepacketizer {
    fn process_packet(&mut self, packet: &RtpPacket<'_>) -> Option<MediaFrame> {
        let payload = packet.payload();
        if payload.len() < 2 {
            self.stats.malformed_packets += 1;
            return None;
        }
        self.stats.frames += 1;
        Some(MediaFrame::new(packet.timestamp(), vec![payload[1..].to_vec()]))
    }

    fn codec_name(&self) -> &'static str {
        self.codec
    }

    fn stats(&self) -> DepacketizerStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::rtp::RtpHeader;

    #[test]
    fn strips_cmr_byte() {
        let mut d = AmrDepacketizer::new();
        let bytes = RtpHeader::new(98, 1).packet(false, &[0xf0, 0x3c, 0x11, 0x22]);
        let frame = d.process_packet(&RtpPacket::parse(&bytes).unwrap()).unwrap();
        assert_eq!(frame.units, vec![vec![0x3c, 0x11, 0x22]]);
    }

    #[test]
    fn header_only_packet_is_dropped() {
        let mut d = AmrDepacketizer::new();
        let bytes = RtpHeader::new(98, 1).packet(false, &[0xf0]);
        assert!(d.process_packet(&RtpPacket::parse(&bytes).unwrap()).is_none());
        assert_eq!(d.stats().malformed_packets, 1);
    }
}
