//! Frame and fragment bookkeeping shared by the H.264 and H.265 depacketizers.

use super::{DepacketizerStats, MediaFrame};

/// Collects NAL units for the current marker-delimited frame, plus at most
/// one NAL being rebuilt from fragments.
#[derive(Debug, Default)]
pub(super) struct NalAssembler {
    nals: Vec<Vec<u8>>,
    timestamp: Option<u32>,
    /// NAL under reassembly, header included.
    fragment: Vec<u8>,
    in_fragment: bool,
    pub(super) stats: DepacketizerStats,
}

impl NalAssembler {
    /// Note the packet timestamp; a change with data pending means the
    /// previous frame lost its marker packet, so that data is discarded.
    pub(super) fn begin_packet(&mut self, timestamp: u32, codec: &'static str) {
        if let Some(current) = self.timestamp
            && current != timestamp
            && (!self.nals.is_empty() || self.in_fragment)
        {
            tracing::debug!(
                codec,
                current,
                timestamp,
                nals = self.nals.len(),
                "timestamp changed before marker, discarding partial frame"
            );
            self.stats.stale_frames += 1;
            self.nals.clear();
            self.reset_fragment();
        }
        self.timestamp = Some(timestamp);
    }

    pub(super) fn push_nal(&mut self, nal: &[u8]) {
        if !nal.is_empty() {
            self.nals.push(nal.to_vec());
        }
    }

    /// Split an aggregation payload of `[size: u16][nal]...` entries.
    ///
    /// Trailing bytes too short for a size field end the walk. A size that
    /// runs past the packet discards everything this packet contributed.
    pub(super) fn push_aggregate(&mut self, mut data: &[u8], codec: &'static str) {
        let mut units = Vec::new();
        while data.len() >= 2 {
            let size = usize::from(u16::from_be_bytes([data[0], data[1]]));
            data = &data[2..];
            if size > data.len() {
                tracing::warn!(
                    codec,
                    size,
                    remaining = data.len(),
                    "aggregation unit overruns packet, dropping packet"
                );
                self.stats.truncated_units += 1;
                return;
            }
            if size > 0 {
                units.push(data[..size].to_vec());
            }
            data = &data[size..];
        }
        self.nals.extend(units);
    }

    /// Handle one fragment. `header` is the rebuilt NAL header, used only
    /// when `start` is set; `data` is the fragment body.
    pub(super) fn push_fragment(
        &mut self,
        start: bool,
        end: bool,
        header: &[u8],
        data: &[u8],
        codec: &'static str,
    ) {
        if start {
            if self.in_fragment {
                tracing::warn!(
                    codec,
                    discarded = self.fragment.len(),
                    "new fragment started before previous one ended"
                );
                self.stats.restarted_fragments += 1;
            }
            self.fragment.clear();
            self.fragment.extend_from_slice(header);
            self.in_fragment = true;
        } else if !self.in_fragment {
            tracing::debug!(codec, "fragment without start, dropping");
            self.stats.orphan_fragments += 1;
            return;
        }

        self.fragment.extend_from_slice(data);

        if end {
            self.nals.push(std::mem::take(&mut self.fragment));
            self.in_fragment = false;
        }
    }

    /// Called on the marker packet: hand out the frame and start fresh.
    pub(super) fn finish(&mut self, codec: &'static str) -> Option<MediaFrame> {
        let timestamp = self.timestamp.take().unwrap_or(0);
        if self.in_fragment {
            tracing::debug!(codec, "marker inside an unterminated fragment, discarding it");
            self.stats.orphan_fragments += 1;
            self.reset_fragment();
        }
        if self.nals.is_empty() {
            return None;
        }
        self.stats.frames += 1;
        Some(MediaFrame::new(timestamp, std::mem::take(&mut self.nals)))
    }

    fn reset_fragment(&mut self) {
        self.fragment.clear();
        self.in_fragment = false;
    }
}
