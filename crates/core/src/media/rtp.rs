use rand::RngExt as _;

use crate::error::{ParseErrorKind, Result, RtspError};

/// Size of the RTP fixed header (RFC 3550 §5.1).
pub const RTP_HEADER_SIZE: usize = 12;

/// Zero-copy view of one RTP datagram (RFC 3550 §5.1).
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                           Timestamp                           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                             SSRC                              |
/// +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
/// |                  CSRC list (CC × 32 bits)                     |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |   profile-defined id (X=1)    |        length (words)         |
/// |                  extension (length × 32 bits)                 |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                 payload ...   | padding (P=1, last byte=count)|
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
///
/// Construction validates every size, so the accessors never index out
/// of bounds.
#[derive(Debug, Clone, Copy)]
pub struct RtpPacket<'a> {
    data: &'a [u8],
    extension_size: usize,
    padding_size: usize,
}

impl<'a> RtpPacket<'a> {
    /// Interpret `data` as an RTP packet.
    ///
    /// Fails when the datagram is shorter than its declared header,
    /// extension and padding, or is not version 2.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let invalid = || RtspError::parse(ParseErrorKind::InvalidRtpPacket);

        if data.len() < RTP_HEADER_SIZE || data[0] >> 6 != 2 {
            return Err(invalid());
        }

        let header_size = RTP_HEADER_SIZE + 4 * usize::from(data[0] & 0x0f);
        if data.len() < header_size {
            return Err(invalid());
        }

        let extension_size = if data[0] & 0x10 != 0 {
            if data.len() < header_size + 4 {
                return Err(invalid());
            }
            let words = u16::from_be_bytes([data[header_size + 2], data[header_size + 3]]);
            4 * (usize::from(words) + 1)
        } else {
            0
        };

        let padding_size = if data[0] & 0x20 != 0 {
            usize::from(data[data.len() - 1])
        } else {
            0
        };

        if header_size + extension_size + padding_size > data.len() {
            return Err(invalid());
        }

        Ok(Self {
            data,
            extension_size,
            padding_size,
        })
    }

    pub fn version(&self) -> u8 {
        self.data[0] >> 6
    }

    pub fn has_padding(&self) -> bool {
        self.data[0] & 0x20 != 0
    }

    pub fn has_extension(&self) -> bool {
        self.data[0] & 0x10 != 0
    }

    pub fn csrc_count(&self) -> u8 {
        self.data[0] & 0x0f
    }

    /// Marker bit: last packet of an access unit for video payloads.
    pub fn marker(&self) -> bool {
        self.data[1] & 0x80 != 0
    }

    pub fn payload_type(&self) -> u8 {
        self.data[1] & 0x7f
    }

    pub fn sequence_number(&self) -> u16 {
        u16::from_be_bytes([self.data[2], self.data[3]])
    }

    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.data[4], self.data[5], self.data[6], self.data[7]])
    }

    pub fn ssrc(&self) -> u32 {
        u32::from_be_bytes([self.data[8], self.data[9], self.data[10], self.data[11]])
    }

    /// The `index`-th contributing source, if present.
    pub fn csrc(&self, index: usize) -> Option<u32> {
        if index >= usize::from(self.csrc_count()) {
            return None;
        }
        let at = RTP_HEADER_SIZE + 4 * index;
        Some(u32::from_be_bytes([
            self.data[at],
            self.data[at + 1],
            self.data[at + 2],
            self.data[at + 3],
        ]))
    }

    /// `12 + 4 × CC`.
    pub fn header_size(&self) -> usize {
        RTP_HEADER_SIZE + 4 * usize::from(self.csrc_count())
    }

    /// `4 × (length + 1)` when X is set, including the 4-byte extension header.
    pub fn extension_size(&self) -> usize {
        self.extension_size
    }

    pub fn padding_size(&self) -> usize {
        self.padding_size
    }

    pub fn payload_size(&self) -> usize {
        self.data.len() - self.header_size() - self.extension_size - self.padding_size
    }

    /// Payload bytes: after header, CSRCs and extension; before padding.
    pub fn payload(&self) -> &'a [u8] {
        let start = self.header_size() + self.extension_size;
        &self.data[start..self.data.len() - self.padding_size]
    }

    /// Header extension as `(profile-defined id, extension words)`.
    pub fn extension(&self) -> Option<(u16, &'a [u8])> {
        if !self.has_extension() {
            return None;
        }
        let at = self.header_size();
        let id = u16::from_be_bytes([self.data[at], self.data[at + 1]]);
        Some((id, &self.data[at + 4..at + self.extension_size]))
    }

    /// The whole datagram.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }
}

/// RTP fixed header writer (RFC 3550 §5.1).
///
/// Keeps sequence and timestamp state for one outgoing stream. The
/// sequence number wraps and is advanced on every packet written; the
/// timestamp only moves when [`advance_timestamp`](Self::advance_timestamp)
/// is called, so all packets of one frame share it.
///
/// Version is always 2. Padding and CSRC count are always 0.
#[derive(Debug)]
pub struct RtpHeader {
    /// RTP payload type (7-bit, RFC 3551).
    pub pt: u8,
    /// Synchronization source identifier (RFC 3550 §8.1).
    pub ssrc: u32,
    sequence: u16,
    timestamp: u32,
}

impl RtpHeader {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Self {
            pt: pt & 0x7f,
            ssrc,
            sequence: 0,
            timestamp: 0,
        }
    }

    /// Create with a random SSRC, initial sequence number and timestamp,
    /// as RFC 3550 §5.1 recommends.
    pub fn with_random_ssrc(pt: u8) -> Self {
        let mut rng = rand::rng();
        Self {
            pt: pt & 0x7f,
            ssrc: rng.random(),
            sequence: rng.random(),
            timestamp: rng.random(),
        }
    }

    /// Sequence number the next packet will carry.
    pub fn sequence(&self) -> u16 {
        self.sequence
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Write header + payload as one datagram and advance the sequence number.
    pub fn packet(&mut self, marker: bool, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(RTP_HEADER_SIZE + payload.len());
        self.write_fixed(marker, false, &mut out);
        out.extend_from_slice(payload);
        out
    }

    /// Like [`packet`](Self::packet) with a header extension.
    ///
    /// `extension` is zero-padded to a multiple of four bytes.
    pub fn packet_with_extension(
        &mut self,
        marker: bool,
        extension_id: u16,
        extension: &[u8],
        payload: &[u8],
    ) -> Vec<u8> {
        let words = extension.len().div_ceil(4);
        let mut out = Vec::with_capacity(RTP_HEADER_SIZE + 4 + words * 4 + payload.len());
        self.write_fixed(marker, true, &mut out);
        out.extend_from_slice(&extension_id.to_be_bytes());
        out.extend_from_slice(&(words as u16).to_be_bytes());
        out.extend_from_slice(extension);
        out.resize(out.len() + (words * 4 - extension.len()), 0);
        out.extend_from_slice(payload);
        out
    }

    /// Advance the RTP timestamp by one frame duration in clock ticks
    /// (e.g. 3000 for 30 fps at 90 kHz).
    pub fn advance_timestamp(&mut self, increment: u32) {
        self.timestamp = self.timestamp.wrapping_add(increment);
    }

    fn write_fixed(&mut self, marker: bool, extension: bool, out: &mut Vec<u8>) {
        out.push((2 << 6) | ((extension as u8) << 4));
        out.push(((marker as u8) << 7) | self.pt);
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.ssrc.to_be_bytes());
        self.sequence = self.sequence.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_packet_payload_starts_at_12() {
        let mut h = RtpHeader::new(96, 0xAABBCCDD);
        let payload = [1u8, 2, 3, 4, 5];
        let bytes = h.packet(true, &payload);
        let pkt = RtpPacket::parse(&bytes).unwrap();
        assert_eq!(pkt.version(), 2);
        assert_eq!(pkt.header_size(), 12);
        assert_eq!(pkt.payload_size(), payload.len());
        assert_eq!(pkt.payload(), &payload);
        assert_eq!(pkt.payload().as_ptr(), bytes[12..].as_ptr());
        assert!(pkt.marker());
        assert_eq!(pkt.payload_type(), 96);
        assert_eq!(pkt.ssrc(), 0xAABBCCDD);
    }

    #[test]
    fn csrc_extension_and_padding_are_excluded() {
        let mut bytes = vec![
            0b1011_0010, // V=2 P=1 X=1 CC=2
            0x60,
            0x00,
            0x07,
            0,
            0,
            0x0b,
            0xb8,
            1,
            2,
            3,
            4,
        ];
        bytes.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 2]); // CSRCs
        bytes.extend_from_slice(&[0xbe, 0xde, 0x00, 0x01, 9, 9, 9, 9]); // extension, 1 word
        bytes.extend_from_slice(&[0x41, 0x42, 0x43]); // payload
        bytes.extend_from_slice(&[0, 0, 3]); // padding, count 3

        let pkt = RtpPacket::parse(&bytes).unwrap();
        assert_eq!(pkt.csrc_count(), 2);
        assert_eq!(pkt.csrc(1), Some(2));
        assert_eq!(pkt.csrc(2), None);
        assert_eq!(pkt.header_size(), 20);
        assert_eq!(pkt.extension_size(), 8);
        assert_eq!(pkt.padding_size(), 3);
        assert_eq!(pkt.payload(), b"ABC");
        assert_eq!(pkt.extension(), Some((0xbede, &[9u8, 9, 9, 9][..])));
        assert_eq!(pkt.sequence_number(), 7);
        assert_eq!(pkt.timestamp(), 3000);
    }

    #[test]
    fn short_or_inconsistent_packets_rejected() {
        assert!(RtpPacket::parse(&[0x80; 11]).is_err());
        // Version 1.
        assert!(RtpPacket::parse(&[0x40; 12]).is_err());
        // CC=3 but no room for CSRCs.
        assert!(RtpPacket::parse(&[0x83, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).is_err());
        // Extension header missing.
        assert!(RtpPacket::parse(&[0x90, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).is_err());
        // Padding count larger than the packet.
        let mut bytes = vec![0xa0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 200];
        assert!(RtpPacket::parse(&bytes).is_err());
        bytes[13] = 2;
        assert_eq!(RtpPacket::parse(&bytes).unwrap().payload_size(), 0);
    }

    #[test]
    fn extension_writer_pads_to_words() {
        let mut h = RtpHeader::new(26, 1);
        let bytes = h.packet_with_extension(false, 0xFFD8, &[1, 2, 3, 4, 5], &[0xAA]);
        let pkt = RtpPacket::parse(&bytes).unwrap();
        let (id, ext) = pkt.extension().unwrap();
        assert_eq!(id, 0xFFD8);
        assert_eq!(ext, &[1u8, 2, 3, 4, 5, 0, 0, 0]);
        assert_eq!(pkt.payload(), &[0xAAu8]);
    }

    #[test]
    fn sequence_increments_and_wraps() {
        let mut h = RtpHeader::new(96, 1);
        h.sequence = u16::MAX;
        let a = h.packet(false, &[]);
        let b = h.packet(false, &[]);
        assert_eq!(RtpPacket::parse(&a).unwrap().sequence_number(), u16::MAX);
        assert_eq!(RtpPacket::parse(&b).unwrap().sequence_number(), 0);
    }

    #[test]
    fn timestamp_advance() {
        let mut h = RtpHeader::new(96, 1);
        h.advance_timestamp(3000);
        h.advance_timestamp(3000);
        assert_eq!(h.timestamp(), 6000);
    }

    #[test]
    fn random_ssrc_differs() {
        let h1 = RtpHeader::with_random_ssrc(96);
        let h2 = RtpHeader::with_random_ssrc(96);
        assert_ne!(h1.ssrc, h2.ssrc);
    }
}
