use super::nal::NalAssembler;
use super::rtp::RtpPacket;
use super::{Depacketizer, DepacketizerStats, MediaFrame};

const CODEC: &str = "H264";

const NAL_STAP_A: u8 = 24;
const NAL_FU_A: u8 = 28;

const FU_START: u8 = 0x80;
const FU_END: u8 = 0x40;

/// H.264 RTP depacketizer (RFC 6184).
///
/// Rebuilds NAL units from the three payload structures used in
/// packetization-mode 0 and 1:
///
/// - **Single NAL Unit** (types 1-23, §5.6): the payload is the NAL.
///
/// - **STAP-A** (type 24, §5.7.1): one aggregation header byte, then
///   `[size: u16][NAL]` repeated until the payload is used up.
///
/// - **FU-A** (type 28, §5.8): a large NAL split across packets:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   Fragment data: [...]
///   ```
///
///   The original NAL header is `(indicator & 0xE0) | NAL_Type`.
///
/// STAP-B, MTAP16, MTAP24 (25-27) and FU-B (29) are interleaved-mode
/// structures; such packets are counted in
/// [`DepacketizerStats::unsupported_packets`] and dropped.
///
/// ## Frame boundary
///
/// NALs accumulate until a packet with the RTP marker bit arrives
/// (§5.1), then the whole access unit is returned.
#[derive(Debug, Default)]
pub struct H264Depacketizer {
    assembler: NalAssembler,
}

impl H264Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn process_payload(&mut self, payload: &[u8]) {
        let Some(&indicator) = payload.first() else {
            self.assembler.stats.malformed_packets += 1;
            return;
        };

        match indicator & 0x1f {
            1..=23 => self.assembler.push_nal(payload),
            NAL_STAP_A => self.assembler.push_aggregate(&payload[1..], CODEC),
            NAL_FU_A => {
                let Some(&fu_header) = payload.get(1) else {
                    self.assembler.stats.malformed_packets += 1;
                    return;
                };
                let header = (indicator & 0xe0) | (fu_header & 0x1f);
                self.assembler.push_fragment(
                    fu_header & FU_START != 0,
                    fu_header & FU_END != 0,
                    &[header],
                    &payload[2..],
                    CODEC,
                );
            }
            nal_type @ (25..=27 | 29) => {
                tracing::debug!(nal_type, "unsupported H.264 payload structure");
                self.assembler.stats.unsupported_packets += 1;
            }
            nal_type => {
                tracing::debug!(nal_type, "reserved H.264 NAL type");
                self.assembler.stats.malformed_packets += 1;
            }
        }
    }
}

impl Depacketizer for H264Depacketizer {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::rtp::RtpHeader;

    fn feed(d: &mut H264Depacketizer, h: &mut RtpHeader, marker: bool, payload: &[u8]) -> Option<MediaFrame> {
        let bytes = h.packet(marker, payload);
        let packet = RtpPacket::parse(&bytes).unwrap();
        d.process_packet(&packet)
    }

    fn fu_a(indicator: u8, fu_header: u8, body: &[u8]) -> Vec<u8> {
        let mut p = vec![indicator, fu_header];
        p.extend_from_slice(body);
        p
    }

    // --- Single NAL ---

    #[test]
    fn single_nal_emitted_on_marker() {
        let mut d = H264Depacketizer::new();
        let mut h = RtpHeader::new(96, 1);
        assert!(feed(&mut d, &mut h, false, &[0x67, 0x42, 0x00, 0x1e]).is_none());
        assert!(feed(&mut d, &mut h, false, &[0x68, 0xce, 0x3c, 0x80]).is_none());
        let frame = feed(&mut d, &mut h, true, &[0x65, 0x88, 0x84]).unwrap();
        assert_eq!(frame.units.len(), 3);
        assert_eq!(frame.units[2], vec![0x65, 0x88, 0x84]);
        assert_eq!(d.stats().frames, 1);
    }

    #[test]
    fn marker_with_nothing_pending_yields_none() {
        let mut d = H264Depacketizer::new();
        let mut h = RtpHeader::new(96, 1);
        assert!(feed(&mut d, &mut h, true, &[]).is_none());
        assert_eq!(d.stats().malformed_packets, 1);
    }

    // --- STAP-A ---

    #[test]
    fn stap_a_splits_into_nals() {
        let mut d = H264Depacketizer::new();
        let mut h = RtpHeader::new(96, 1);
        let mut payload = vec![0x18, 0x00, 0x0a];
        payload.extend_from_slice(&[0x67; 10]);
        payload.extend_from_slice(&[0x00, 0x14]);
        payload.extend_from_slice(&[0x68; 20]);
        let frame = feed(&mut d, &mut h, true, &payload).unwrap();
        assert_eq!(frame.units.len(), 2);
        assert_eq!(frame.units[0].len(), 10);
        assert_eq!(frame.units[1].len(), 20);
    }

    #[test]
    fn stap_a_overrun_drops_whole_packet() {
        let mut d = H264Depacketizer::new();
        let mut h = RtpHeader::new(96, 1);
        let mut payload = vec![0x18, 0x00, 0x02, 0x67, 0x42];
        payload.extend_from_slice(&[0x00, 0x10, 0x68]);
        assert!(feed(&mut d, &mut h, true, &payload).is_none());
        assert_eq!(d.stats().truncated_units, 1);
    }

    #[test]
    fn stap_a_ignores_trailing_byte() {
        let mut d = H264Depacketizer::new();
        let mut h = RtpHeader::new(96, 1);
        let frame = feed(&mut d, &mut h, true, &[0x18, 0x00, 0x01, 0x09, 0xff]).unwrap();
        assert_eq!(frame.units, vec![vec![0x09]]);
    }

    // --- FU-A ---

    #[test]
    fn fu_a_reassembles_300_bytes() {
        let mut d = H264Depacketizer::new();
        let mut h = RtpHeader::new(96, 1);
        let body: Vec<u8> = (0..300u32).map(|i| i as u8).collect();

        assert!(feed(&mut d, &mut h, false, &fu_a(0x7c, 0x85, &body[..100])).is_none());
        assert!(feed(&mut d, &mut h, false, &fu_a(0x7c, 0x05, &body[100..200])).is_none());
        let frame = feed(&mut d, &mut h, true, &fu_a(0x7c, 0x45, &body[200..])).unwrap();

        assert_eq!(frame.units.len(), 1);
        let nal = &frame.units[0];
        assert_eq!(nal.len(), 301);
        assert_eq!(nal[0], 0x65);
        assert_eq!(&nal[1..], body.as_slice());
    }

    #[test]
    fn fu_a_without_start_is_dropped() {
        let mut d = H264Depacketizer::new();
        let mut h = RtpHeader::new(96, 1);
        assert!(feed(&mut d, &mut h, false, &fu_a(0x7c, 0x05, &[1, 2])).is_none());
        assert!(feed(&mut d, &mut h, true, &fu_a(0x7c, 0x45, &[3, 4])).is_none());
        assert_eq!(d.stats().orphan_fragments, 2);
        assert_eq!(d.stats().frames, 0);
    }

    #[test]
    fn fu_a_restart_discards_previous_fragment() {
        let mut d = H264Depacketizer::new();
        let mut h = RtpHeader::new(96, 1);
        feed(&mut d, &mut h, false, &fu_a(0x7c, 0x85, &[1, 1, 1]));
        feed(&mut d, &mut h, false, &fu_a(0x7c, 0x81, &[2, 2]));
        let frame = feed(&mut d, &mut h, true, &fu_a(0x7c, 0x41, &[3])).unwrap();
        assert_eq!(frame.units, vec![vec![0x61, 2, 2, 3]]);
        assert_eq!(d.stats().restarted_fragments, 1);
    }

    #[test]
    fn truncated_fu_a_counts_as_malformed() {
        let mut d = H264Depacketizer::new();
        let mut h = RtpHeader::new(96, 1);
        assert!(feed(&mut d, &mut h, true, &[0x7c]).is_none());
        assert_eq!(d.stats().malformed_packets, 1);
    }

    // --- Unsupported / frame boundaries ---

    #[test]
    fn interleaved_structures_are_unsupported() {
        let mut d = H264Depacketizer::new();
        let mut h = RtpHeader::new(96, 1);
        for t in [25u8, 26, 27, 29] {
            feed(&mut d, &mut h, false, &[t, 0, 0, 0]);
        }
        assert_eq!(d.stats().unsupported_packets, 4);
    }

    #[test]
    fn timestamp_change_discards_unmarked_frame() {
        let mut d = H264Depacketizer::new();
        let mut h = RtpHeader::new(96, 1);
        feed(&mut d, &mut h, false, &[0x41, 0xaa]);
        h.advance_timestamp(3000);
        let frame = feed(&mut d, &mut h, true, &[0x41, 0xbb]).unwrap();
        assert_eq!(frame.units, vec![vec![0x41, 0xbb]]);
        assert_eq!(frame.timestamp, 3000);
        assert_eq!(d.stats().stale_frames, 1);
    }

    #[test]
    fn codec_metadata() {
        assert_eq!(H264Depacketizer::new().codec_name(), "H264");
    }
}
