use super::nal::NalAssembler;
use super::rtp::RtpPacket;
use super::{Depacketizer, DepacketizerStats, MediaFrame};
use crate::protocol::sdp::MediaDescription;

const CODEC: &str = "H265";

const NAL_AP: u8 = 48;
const NAL_FU: u8 = 49;
const NAL_PACI: u8 = 50;

const FU_START: u8 = 0x80;
const FU_END: u8 = 0x40;

/// H.265/HEVC RTP depacketizer (RFC 7798).
///
/// HEVC NAL headers are two bytes:
///
/// ```text
/// [F|Type(6)|LayerId(6)|TID(3)]
/// ```
///
/// Supported payload structures:
///
/// - **Single NAL unit** (types 0-47, §4.4.1)
/// - **Aggregation Packet** (type 48, §4.4.2): 2-byte payload header,
///   then `[size: u16][NAL]` entries.
/// - **Fragmentation Unit** (type 49, §4.4.3): 2-byte payload header,
///   1-byte FU header `[S|E|FuType(6)]`, then fragment data. The rebuilt
///   NAL header keeps F, LayerId and TID from the payload header and
///   takes its type from `FuType`.
///
/// Streams signalling `sprop-max-don-diff > 0` carry a DONL field in
/// every packet; those and PACI packets (type 50) are counted as
/// unsupported and dropped.
#[derive(Debug, Default)]
pub struct H265Depacketizer {
    assembler: NalAssembler,
    using_donl: bool,
}

impl H265Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure from the stream's fmtp parameters.
    pub fn from_media(media: &MediaDescription) -> Self {
        let using_donl = media.fmtp_u32("sprop-max-don-diff").unwrap_or(0) > 0;
        if using_donl {
            tracing::warn!("H.265 stream uses DONL, its packets will be dropped");
        }
        Self {
            using_donl,
            ..Self::default()
        }
    }

    fn process_payload(&mut self, payload: &[u8]) {
        if payload.len() < 2 {
            self.assembler.stats.malformed_packets += 1;
            return;
        }
        if self.using_donl {
            self.assembler.stats.unsupported_packets += 1;
            return;
        }

        match (payload[0] >> 1) & 0x3f {
            0..=47 => self.assembler.push_nal(payload),
            NAL_AP => self.assembler.push_aggregate(&payload[2..], CODEC),
            NAL_FU => {
                let Some(&fu_header) = payload.get(2) else {
                    self.assembler.stats.malformed_packets += 1;
                    return;
                };
                let header = [
                    (payload[0] & 0x81) | ((fu_header & 0x3f) << 1),
                    payload[1],
                ];
                self.assembler.push_fragment(
                    fu_header & FU_START != 0,
                    fu_header & FU_END != 0,
                    &header,
                    &payload[3..],
                    CODEC,
                );
            }
            NAL_PACI => {
                tracing::debug!("PACI packets are not supported");
                self.assembler.stats.unsupported_packets += 1;
            }
            nal_type => {
                tracing::debug!(nal_type, "reserved H.265 NAL type");
                self.assembler.stats.malformed_packets += 1;
            }
        }
    }
}

impl Depacketizer for H265Depacketizer {
    fn process_packet(&mut self, packet: &RtpPacket<'_>) -> Option<MediaFrame> {
        self.assembler.begin_packet(packet.timestamp(), CODEC);
        self.process_payload(packet.payload());
        if packet.marker() {
            self.assembler.finish(CODEC)
        } else {
            None
        }
    }

    fn codec_name(&self) -> &'static str {
        CODEC
    }

    fn stats(&self) -> DepacketizerStats {
        self.assembler.stats
    }
}
