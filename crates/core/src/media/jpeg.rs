use super::rtp::RtpPacket;
use super::{Depacketizer, DepacketizerStats, MediaFrame};

const CODEC: &str = "JPEG";

/// type-specific(8) + fragment offset(24) + type(8) + Q(8) + width(8) + height(8)
const MAIN_HEADER_SIZE: usize = 8;
const RESTART_HEADER_SIZE: usize = 4;
const QUANT_HEADER_SIZE: usize = 4;

/// ONVIF JPEG header extension profile (carries raw JPEG marker segments).
const ONVIF_JPEG_EXTENSION: u16 = 0xffd8;

const EOI: [u8; 2] = [0xff, 0xd9];

/// IJG base luminance quantizer, zigzag order (RFC 2435 Appendix A).
#[rustfmt::skip]
const LUMA_QUANTIZER: [u8; 64] = [
    16, 11, 12, 14, 12, 10, 16, 14,
    13, 14, 18, 17, 16, 19, 24, 40,
    26, 24, 22, 22, 24, 49, 35, 37,
    29, 40, 58, 51, 61, 60, 57, 51,
    56, 55, 64, 72, 92, 78, 64, 68,
    87, 69, 55, 56, 80, 109, 81, 87,
    95, 98, 103, 104, 103, 62, 77, 113,
    121, 112, 100, 120, 92, 101, 103, 99,
];

/// IJG base chrominance quantizer, zigzag order.
#[rustfmt::skip]
const CHROMA_QUANTIZER: [u8; 64] = [
    17, 18, 18, 24, 21, 24, 47, 26,
    26, 47, 99, 66, 56, 66, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
];

// ITU-T T.81 Annex K.3 Huffman tables.

const LUMA_DC_CODELENS: [u8; 16] = [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0];
const LUMA_DC_SYMBOLS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

const CHROMA_DC_CODELENS: [u8; 16] = [0, 3, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0];
const CHROMA_DC_SYMBOLS: [u8; 12] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

const LUMA_AC_CODELENS: [u8; 16] = [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 0x7d];
#[rustfmt::skip]
const LUMA_AC_SYMBOLS: [u8; 162] = [
    0x01, 0x02, 0x03, 0x00, 0x04, 0x11, 0x05, 0x12,
    0x21, 0x31, 0x41, 0x06, 0x13, 0x51, 0x61, 0x07,
    0x22, 0x71, 0x14, 0x32, 0x81, 0x91, 0xa1, 0x08,
    0x23, 0x42, 0xb1, 0xc1, 0x15, 0x52, 0xd1, 0xf0,
    0x24, 0x33, 0x62, 0x72, 0x82, 0x09, 0x0a, 0x16,
    0x17, 0x18, 0x19, 0x1a, 0x25, 0x26, 0x27, 0x28,
    0x29, 0x2a, 0x34, 0x35, 0x36, 0x37, 0x38, 0x39,
    0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48, 0x49,
    0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58, 0x59,
    0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69,
    0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78, 0x79,
    0x7a, 0x83, 0x84, 0x85, 0x86, 0x87, 0x88, 0x89,
    0x8a, 0x92, 0x93, 0x94, 0x95, 0x96, 0x97, 0x98,
    0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5, 0xa6, 0xa7,
    0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4, 0xb5, 0xb6,
    0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3, 0xc4, 0xc5,
    0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2, 0xd3, 0xd4,
    0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda, 0xe1, 0xe2,
    0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9, 0xea,
    0xf1, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

const CHROMA_AC_CODELENS: [u8; 16] = [0, 2, 1, 2, 4, 4, 3, 4, 7, 5, 4, 4, 0, 1, 2, 0x77];
#[rustfmt::skip]
const CHROMA_AC_SYMBOLS: [u8; 162] = [
    0x00, 0x01, 0x02, 0x03, 0x11, 0x04, 0x05, 0x21,
    0x31, 0x06, 0x12, 0x41, 0x51, 0x07, 0x61, 0x71,
    0x13, 0x22, 0x32, 0x81, 0x08, 0x14, 0x42, 0x91,
    0xa1, 0xb1, 0xc1, 0x09, 0x23, 0x33, 0x52, 0xf0,
    0x15, 0x62, 0x72, 0xd1, 0x0a, 0x16, 0x24, 0x34,
    0xe1, 0x25, 0xf1, 0x17, 0x18, 0x19, 0x1a, 0x26,
    0x27, 0x28, 0x29, 0x2a, 0x35, 0x36, 0x37, 0x38,
    0x39, 0x3a, 0x43, 0x44, 0x45, 0x46, 0x47, 0x48,
    0x49, 0x4a, 0x53, 0x54, 0x55, 0x56, 0x57, 0x58,
    0x59, 0x5a, 0x63, 0x64, 0x65, 0x66, 0x67, 0x68,
    0x69, 0x6a, 0x73, 0x74, 0x75, 0x76, 0x77, 0x78,
    0x79, 0x7a, 0x82, 0x83, 0x84, 0x85, 0x86, 0x87,
    0x88, 0x89, 0x8a, 0x92, 0x93, 0x94, 0x95, 0x96,
    0x97, 0x98, 0x99, 0x9a, 0xa2, 0xa3, 0xa4, 0xa5,
    0xa6, 0xa7, 0xa8, 0xa9, 0xaa, 0xb2, 0xb3, 0xb4,
    0xb5, 0xb6, 0xb7, 0xb8, 0xb9, 0xba, 0xc2, 0xc3,
    0xc4, 0xc5, 0xc6, 0xc7, 0xc8, 0xc9, 0xca, 0xd2,
    0xd3, 0xd4, 0xd5, 0xd6, 0xd7, 0xd8, 0xd9, 0xda,
    0xe2, 0xe3, 0xe4, 0xe5, 0xe6, 0xe7, 0xe8, 0xe9,
    0xea, 0xf2, 0xf3, 0xf4, 0xf5, 0xf6, 0xf7, 0xf8,
    0xf9, 0xfa,
];

/// Inputs that fully determine the synthesized JPEG header, apart from
/// an explicit quantization table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeaderParams {
    kind: u8,
    q: u8,
    width: u16,
    height: u16,
    restart_interval: u16,
}

/// JPEG RTP depacketizer (RFC 2435).
///
/// RTP/JPEG strips the JFIF headers and sends only the entropy-coded scan,
/// prefixed in every packet by a small main header:
///
/// ```text
/// [type-specific(8)][fragment offset(24)][type(8)][Q(8)][width/8][height/8]
/// [restart header (4 bytes), types 64-127 only]
/// [quantization header + tables, Q >= 128 and offset 0 only]
/// [scan data ...]
/// ```
///
/// On the first fragment of a frame the depacketizer synthesizes a full
/// baseline JFIF header (SOI, APP0, DRI, DQT, SOF0, DHT x4, SOS) and
/// appends each fragment's scan data behind it. The header is cached and
/// only rebuilt when type, Q, dimensions, restart interval or the
/// explicit quantization table change.
///
/// Frames are emitted on the RTP marker bit, with an EOI marker appended
/// when the sender did not include one.
#[derive(Debug, Default)]
pub struct JpegDepacketizer {
    frame: Vec<u8>,
    timestamp: Option<u32>,
    in_frame: bool,
    /// Scan bytes received so far; the next fragment offset must match.
    scan_len: usize,
    quant_table: Vec<u8>,
    quant_precision: u8,
    header: Vec<u8>,
    header_params: Option<HeaderParams>,
    headers_built: u64,
    stats: DepacketizerStats,
}

impl JpegDepacketizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn process_fragment(&mut self, packet: &RtpPacket<'_>) {
        let payload = packet.payload();
        if payload.len() < MAIN_HEADER_SIZE {
            tracing::debug!(len = payload.len(), "JPEG payload shorter than main header");
            self.stats.malformed_packets += 1;
            return;
        }

        let offset = u32::from_be_bytes([0, payload[1], payload[2], payload[3]]) as usize;
        let kind = payload[4];
        let q = payload[5];
        let mut width = u16::from(payload[6]) * 8;
        let mut height = u16::from(payload[7]) * 8;
        let mut data = &payload[MAIN_HEADER_SIZE..];

        let mut restart_interval = 0;
        if (64..=127).contains(&kind) {
            if data.len() < RESTART_HEADER_SIZE {
                self.stats.malformed_packets += 1;
                return;
            }
            restart_interval = u16::from_be_bytes([data[0], data[1]]);
            data = &data[RESTART_HEADER_SIZE..];
        }

        if offset == 0 {
            if q >= 128 {
                let Some(rest) = self.read_quant_header(data) else {
                    self.stats.malformed_packets += 1;
                    return;
                };
                data = rest;
                if self.quant_table.is_empty() {
                    tracing::warn!(q, "JPEG frame references a quantization table never sent");
                    self.stats.malformed_packets += 1;
                    return;
                }
            }

            if width == 0
                && height == 0
                && let Some((w, h)) = packet.extension().and_then(onvif_dimensions)
            {
                width = w;
                height = h;
            }

            if self.in_frame {
                tracing::debug!("JPEG frame restarted before marker");
                self.stats.restarted_fragments += 1;
            }

            let params = HeaderParams {
                kind,
                q,
                width,
                height,
                restart_interval,
            };
            if self.header_params != Some(params) {
                self.header = self.make_header(&params);
                self.header_params = Some(params);
                self.headers_built += 1;
                tracing::trace!(?params, len = self.header.len(), "rebuilt JPEG header");
            }

            self.frame.clear();
            self.frame.extend_from_slice(&self.header);
            self.in_frame = true;
            self.scan_len = 0;
        } else if !self.in_frame {
            tracing::debug!(offset, "JPEG fragment without frame start");
            self.stats.orphan_fragments += 1;
            return;
        }

        if offset != self.scan_len {
            tracing::debug!(
                offset,
                expected = self.scan_len,
                "JPEG fragment offset mismatch, dropping frame"
            );
            self.stats.malformed_packets += 1;
            self.reset_frame();
            return;
        }

        self.frame.extend_from_slice(data);
        self.scan_len += data.len();
    }

    /// Parse the quantization table header, replacing the cached table only
    /// when its contents differ. Returns the bytes after the tables.
    fn read_quant_header<'a>(&mut self, data: &'a [u8]) -> Option<&'a [u8]> {
        if data.len() < QUANT_HEADER_SIZE {
            return None;
        }
        let precision = data[1];
        let len = usize::from(u16::from_be_bytes([data[2], data[3]]));
        let data = &data[QUANT_HEADER_SIZE..];
        if len > data.len() {
            tracing::debug!(len, remaining = data.len(), "JPEG quantization table overruns packet");
            self.stats.truncated_units += 1;
            return None;
        }
        let (table, rest) = data.split_at(len);
        // An empty table means "same as before".
        if !table.is_empty() && (table != self.quant_table || precision != self.quant_precision) {
            self.quant_table = table.to_vec();
            self.quant_precision = precision;
            self.header_params = None;
        }
        Some(rest)
    }

    fn make_header(&self, params: &HeaderParams) -> Vec<u8> {
        if params.q >= 128 {
            build_header(params, &self.quant_table, self.quant_precision)
        } else {
            build_header(params, &scaled_quant_tables(params.q), 0)
        }
    }

    fn reset_frame(&mut self) {
        self.frame.clear();
        self.in_frame = false;
        self.scan_len = 0;
    }
}

impl Depacketizer for JpegDepacketizer {
    fn process_packet(&mut self, packet: &RtpPacket<'_>) -> Option<MediaFrame> {
        let timestamp = packet.timestamp();
        if let Some(current) = self.timestamp
            && current != timestamp
            && self.in_frame
        {
            tracing::debug!(current, timestamp, "timestamp changed before marker, discarding JPEG frame");
            self.stats.stale_frames += 1;
            self.reset_frame();
        }
        self.timestamp = Some(timestamp);

        self.process_fragment(packet);

        if !packet.marker() {
            return None;
        }
        self.timestamp = None;
        if !self.in_frame {
            return None;
        }
        if !self.frame.ends_with(&EOI) {
            self.frame.extend_from_slice(&EOI);
        }
        self.in_frame = false;
        self.scan_len = 0;
        self.stats.frames += 1;
        Some(MediaFrame::new(timestamp, vec![std::mem::take(&mut self.frame)]))
    }

    fn codec_name(&self) -> &'static str {
        CODEC
    }

    fn stats(&self) -> DepacketizerStats {
        self.stats
    }
}

/// Luma + chroma tables for quality factor `q` (1-99), using the IJG
/// scaling applied by libjpeg's `jpeg_quality_scaling`.
fn scaled_quant_tables(q: u8) -> Vec<u8> {
    let factor = u32::from(q.clamp(1, 99));
    let scale = if factor < 50 {
        5000 / factor
    } else {
        200 - factor * 2
    };
    LUMA_QUANTIZER
        .iter()
        .chain(CHROMA_QUANTIZER.iter())
        .map(|&base| ((u32::from(base) * scale + 50) / 100).clamp(1, 255) as u8)
        .collect()
}

/// Width and height from the SOF0 segment of an ONVIF JPEG extension.
fn onvif_dimensions((profile, data): (u16, &[u8])) -> Option<(u16, u16)> {
    if profile != ONVIF_JPEG_EXTENSION {
        return None;
    }
    // FF C0 [len:2] [precision] [height:2] [width:2]
    let pos = data.windows(2).position(|w| w == [0xff, 0xc0])?;
    let sof = data.get(pos..pos + 9)?;
    let height = u16::from_be_bytes([sof[5], sof[6]]);
    let width = u16::from_be_bytes([sof[7], sof[8]]);
    Some((width, height))
}

fn build_header(params: &HeaderParams, table: &[u8], precision: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(640);

    out.extend_from_slice(&[0xff, 0xd8]);

    // APP0: JFIF 1.1, no density units, 1:1 aspect, no thumbnail.
    out.extend_from_slice(&[0xff, 0xe0, 0x00, 0x10]);
    out.extend_from_slice(b"JFIF\0");
    out.extend_from_slice(&[0x01, 0x01, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00]);

    if params.restart_interval != 0 {
        out.extend_from_slice(&[0xff, 0xdd, 0x00, 0x04]);
        out.extend_from_slice(&params.restart_interval.to_be_bytes());
    }

    // 16-bit tables are flagged per table in the precision byte.
    let luma_len = if precision & 1 != 0 { 128 } else { 64 };
    let (luma, chroma) = table.split_at(luma_len.min(table.len()));
    write_dqt(&mut out, 0, precision & 1, luma);
    let chroma_table = if chroma.is_empty() {
        0
    } else {
        write_dqt(&mut out, 1, (precision >> 1) & 1, chroma);
        1
    };

    out.extend_from_slice(&[0xff, 0xc0, 0x00, 0x11, 0x08]);
    out.extend_from_slice(&params.height.to_be_bytes());
    out.extend_from_slice(&params.width.to_be_bytes());
    out.push(3);
    // Type 0 is 4:2:2 (2x1 luma sampling), type 1 is 4:2:0 (2x2).
    let luma_sampling = if params.kind & 1 == 0 { 0x21 } else { 0x22 };
    out.extend_from_slice(&[0x01, luma_sampling, 0x00]);
    out.extend_from_slice(&[0x02, 0x11, chroma_table]);
    out.extend_from_slice(&[0x03, 0x11, chroma_table]);

    write_dht(&mut out, 0x00, &LUMA_DC_CODELENS, &LUMA_DC_SYMBOLS);
    write_dht(&mut out, 0x10, &LUMA_AC_CODELENS, &LUMA_AC_SYMBOLS);
    write_dht(&mut out, 0x01, &CHROMA_DC_CODELENS, &CHROMA_DC_SYMBOLS);
    write_dht(&mut out, 0x11, &CHROMA_AC_CODELENS, &CHROMA_AC_SYMBOLS);

    // SOS: 3 components, Y uses tables 0/0, Cb and Cr use 1/1; full spectral range.
    out.extend_from_slice(&[
        0xff, 0xda, 0x00, 0x0c, 0x03, 0x01, 0x00, 0x02, 0x11, 0x03, 0x11, 0x00, 0x3f, 0x00,
    ]);

    out
}

fn write_dqt(out: &mut Vec<u8>, id: u8, precision: u8, table: &[u8]) {
    out.extend_from_slice(&[0xff, 0xdb]);
    out.extend_from_slice(&(3 + table.len() as u16).to_be_bytes());
    out.push((precision << 4) | id);
    out.extend_from_slice(table);
}

fn write_dht(out: &mut Vec<u8>, class_id: u8, codelens: &[u8; 16], symbols: &[u8]) {
    out.extend_from_slice(&[0xff, 0xc4]);
    out.extend_from_slice(&(3 + 16 + symbols.len() as u16).to_be_bytes());
    out.push(class_id);
    out.extend_from_slice(codelens);
    out.extend_from_slice(symbols);
}
