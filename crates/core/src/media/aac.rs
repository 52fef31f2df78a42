use super::rtp::RtpPacket;
use super::{Depacketizer, DepacketizerStats, MediaFrame};
use crate::protocol::sdp::MediaDescription;

const CODEC: &str = "MPEG4-GENERIC";

/// AAC-hbr defaults (RFC 3640 §3.3.6).
const DEFAULT_SIZE_LENGTH: u32 = 13;
const DEFAULT_INDEX_LENGTH: u32 = 3;

/// AAC depacketizer for `mpeg4-generic` streams (RFC 3640).
///
/// ```text
/// [AU-headers-length: u16, in bits]
/// [AU-header: size(13) | index(3)] ...   (AAC-hbr)
/// [AU 1][AU 2] ...
/// ```
///
/// Field widths come from the `sizeLength`, `indexLength` and
/// `indexDeltaLength` fmtp parameters, defaulting to AAC-hbr. Every
/// packet yields one [`MediaFrame`] holding its access units. If the
/// declared sizes overrun the payload, the whole packet is dropped.
#[derive(Debug)]
pub struct AacDepacketizer {
    size_length: u32,
    index_length: u32,
    index_delta_length: u32,
    stats: DepacketizerStats,
}

impl Default for AacDepacketizer {
    fn default() -> Self {
        Self {
            size_length: DEFAULT_SIZE_LENGTH,
            index_length: DEFAULT_INDEX_LENGTH,
            index_delta_length: DEFAULT_INDEX_LENGTH,
            stats: DepacketizerStats::default(),
        }
    }
}

impl AacDepacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_media(media: &MediaDescription) -> Self {
        let defaults = Self::default();
        let size_length = media.fmtp_u32("sizelength").unwrap_or(defaults.size_length);
        let index_length = media.fmtp_u32("indexlength").unwrap_or(defaults.index_length);
        let index_delta_length = media.fmtp_u32("indexdeltalength").unwrap_or(index_length);
        if size_length > 16 || index_length > 16 || index_delta_length > 16 {
            tracing::warn!(size_length, index_length, "unusual AU header layout, using AAC-hbr");
            return defaults;
        }
        Self {
            size_length,
            index_length,
            index_delta_length,
            ..defaults
        }
    }

    /// Split one payload into access units, or `None` if it is inconsistent.
    fn split(&self, payload: &[u8]) -> Option<Vec<Vec<u8>>> {
        if self.size_length == 0 {
            return Some(vec![payload.to_vec()]);
        }
        if payload.len() < 2 {
            return None;
        }

        let header_bits = usize::from(u16::from_be_bytes([payload[0], payload[1]]));
        let header_bytes = header_bits.div_ceil(8);
        let headers = payload.get(2..2 + header_bytes)?;
        let mut data = &payload[2 + header_bytes..];

        let mut bits = BitReader::new(headers);
        let mut units = Vec::new();
        let mut consumed = 0;
        while consumed < header_bits {
            let index_len = if units.is_empty() {
                self.index_length
            } else {
                self.index_delta_length
            };
            let size = bits.read(self.size_length)? as usize;
            bits.read(index_len)?;
            consumed += (self.size_length + index_len) as usize;

            if size > data.len() {
                tracing::debug!(size, remaining = data.len(), "AAC AU overruns packet");
                return None;
            }
            units.push(data[..size].to_vec());
            data = &data[size..];
        }
        Some(units)
    }
}

impl Depacketizer for AacDepacketizer {
    fn process_packet(&mut self, packet: &RtpPacket<'_>) -> Option<MediaFrame> {
        match self.split(packet.payload()) {
            Some(units) if !units.is_empty() => {
                self.stats.frames += 1;
                Some(MediaFrame::new(packet.timestamp(), units))
            }
            Some(_) => None,
            None => {
                self.stats.truncated_units += 1;
                None
            }
        }
    }

    fn codec_name(&self) -> &'static str {
        CODEC
    }

    fn stats(&self) -> DepacketizerStats {
        self.stats
    }
}

/// MSB-first reader over the AU header section.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read(&mut self, bits: u32) -> Option<u32> {
        let mut value = 0u32;
        for _ in 0..bits {
            let byte = *self.data.get(self.pos / 8)?;
            let bit = (byte >> (7 - self.pos % 8)) & 1;
            value = (value << 1) | u32::from(bit);
            self.pos += 1;
        }
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::rtp::RtpHeader;
    use crate::protocol::sdp::SessionDescription;

    fn feed(d: &mut AacDepacketizer, payload: &[u8]) -> Option<MediaFrame> {
        let bytes = RtpHeader::new(97, 3).packet(true, payload);
        d.process_packet(&RtpPacket::parse(&bytes).unwrap())
    }

    fn au_header(size: u16) -> [u8; 2] {
        (size << 3).to_be_bytes()
    }

    #[test]
    fn single_access_unit() {
        let mut d = AacDepacketizer::new();
        let mut payload = vec![0x00, 0x10];
        payload.extend_from_slice(&au_header(5));
        payload.extend_from_slice(&[1, 2, 3, 4, 5]);
        let frame = feed(&mut d, &payload).unwrap();
        assert_eq!(frame.units, vec![vec![1, 2, 3, 4, 5]]);
    }

    #[test]
    fn multiple_access_units() {
        let mut d = AacDepacketizer::new();
        let mut payload = vec![0x00, 0x20];
        payload.extend_from_slice(&au_header(2));
        payload.extend_from_slice(&au_header(3));
        payload.extend_from_slice(&[0xa, 0xa, 0xb, 0xb, 0xb]);
        let frame = feed(&mut d, &payload).unwrap();
        assert_eq!(frame.units, vec![vec![0xa, 0xa], vec![0xb, 0xb, 0xb]]);
        assert_eq!(d.stats().frames, 1);
    }

    #[test]
    fn overrunning_size_drops_packet() {
        let mut d = AacDepacketizer::new();
        let mut payload = vec![0x00, 0x20];
        payload.extend_from_slice(&au_header(2));
        payload.extend_from_slice(&au_header(30));
        payload.extend_from_slice(&[1, 2, 3]);
        assert!(feed(&mut d, &payload).is_none());
        assert_eq!(d.stats().truncated_units, 1);

        // The next packet is unaffected.
        let mut ok = vec![0x00, 0x10];
        ok.extend_from_slice(&au_header(1));
        ok.push(9);
        assert_eq!(feed(&mut d, &ok).unwrap().units, vec![vec![9]]);
    }

    #[test]
    fn header_section_past_payload() {
        let mut d = AacDepacketizer::new();
        assert!(feed(&mut d, &[0x00, 0x40, 0x00]).is_none());
        assert!(feed(&mut d, &[0x00]).is_none());
        assert_eq!(d.stats().truncated_units, 2);
    }

    #[test]
    fn low_bitrate_layout_from_fmtp() {
        let sdp = SessionDescription::parse(
            "m=audio 0 RTP/AVP 97\r\n\
             a=rtpmap:97 mpeg4-generic/8000/1\r\n\
             a=fmtp:97 mode=AAC-lbr;SizeLength=6;IndexLength=2;IndexDeltaLength=2\r\n",
        );
        let mut d = AacDepacketizer::from_media(&sdp.media[0]);
        // One 8-bit header: size 3, index 0.
        let frame = feed(&mut d, &[0x00, 0x08, 3 << 2, 7, 8, 9]).unwrap();
        assert_eq!(frame.units, vec![vec![7, 8, 9]]);
    }
}
