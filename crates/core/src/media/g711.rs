use super::rtp::RtpPacket;
use super::{Depacketizer, DepacketizerStats, MediaFrame};

/// Layer 0 (plain G.711 core) bytes per 5 ms frame.
const CORE_FRAME_SIZE: usize = 40;

/// G.711.1 depacketizer (RFC 5391).
///
/// The payload starts with a mode index byte (`MBZ(5) | MI(3)`) followed
/// by 5 ms frames whose size depends on the mode:
///
/// | MI | Layers | Bytes |
/// |----|--------|-------|
/// | 1 | R1 | 40 |
/// | 2 | R2a | 50 |
/// | 3 | R2b | 50 |
/// | 4 | R3 | 60 |
///
/// Only the 40-byte core of each frame is kept, giving plain G.711.
#[derive(Debug, Default)]
pub struct G7111Depacketizer {
    stats: DepacketizerStats,
}

impl G7111Depacketizer {
    pub fn new() -> Self {
        Self::default()
    }
}

fn frame_size(mode_index: u8) -> Option<usize> {
    match mode_index {
        1 => Some(40),
        2 | 3 => Some(50),
        4 => Some(60),
        _ => None,
    }
}

impl Depacketizer for G7111Depacketizer {
    fn process_packet(&mut self, packet: &RtpPacket<'_>) -> Option<MediaFrame> {
        let (&mode, mut data) = packet.payload().split_first()?;
        let Some(size) = frame_size(mode & 0x07) else {
            tracing::debug!(mode, "unknown G.711.1 mode index");
            self.stats.unsupported_packets += 1;
            return None;
        };

        let mut units = Vec::with_capacity(data.len() / size);
        while data.len() >= size {
            units.push(data[..CORE_FRAME_SIZE].to_vec());
            data = &data[size..];
        }
        if !data.is_empty() {
            tracing::debug!(trailing = data.len(), "partial G.711.1 frame");
            self.stats.truncated_units += 1;
        }
        if units.is_empty() {
            return None;
        }
        self.stats.frames += 1;
        Some(MediaFrame::new(packet.timestamp(), units))
    }

    fn codec_name(&self) -> &'static str {
        "G7111"
    }

    fn stats(&self) -> DepacketizerStats {
        self.stats
    }
}
