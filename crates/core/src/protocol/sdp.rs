//! SDP (Session Description Protocol, RFC 4566 / RFC 8866) media sections.
//!
//! Only the facts needed to pick and configure a depacketizer are
//! extracted from a DESCRIBE body:
//!
//! ```text
//! m=video 0 RTP/AVP 96                          ← media kind, payload type
//! a=rtpmap:96 H264/90000                        ← encoding / clock rate
//! a=fmtp:96 packetization-mode=1;sprop-...      ← format parameters
//! a=control:trackID=1                           ← SETUP URL
//! ```
//!
//! Everything else in the document is ignored.

use std::collections::HashMap;

use base64::prelude::{BASE64_STANDARD, Engine as _};

/// The media sections of a session description.
#[derive(Debug, Clone, Default)]
pub struct SessionDescription {
    /// Session-level `a=control`, usually `*` or an absolute URL.
    pub control: Option<String>,
    pub media: Vec<MediaDescription>,
}

/// One `m=` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaDescription {
    /// `video`, `audio`, `application`, ...
    pub media: String,
    /// First payload type listed on the `m=` line.
    pub payload_type: u8,
    /// Encoding name from `a=rtpmap`, upper-cased (`H264`, `MPEG4-GENERIC`).
    /// For static payload types without rtpmap it is derived from the
    /// RFC 3551 table.
    pub encoding_name: String,
    pub clock_rate: u32,
    pub channels: Option<u16>,
    /// `a=fmtp` parameters; keys lower-cased.
    pub fmtp: HashMap<String, String>,
    pub control: Option<String>,
}

impl SessionDescription {
    pub fn parse(text: &str) -> Self {
        let mut sdp = SessionDescription::default();

        for line in text.lines() {
            let line = line.trim();
            let Some((kind, value)) = line.split_once('=') else {
                continue;
            };
            match kind {
                "m" => {
                    let mut parts = value.split_whitespace();
                    let media = parts.next().unwrap_or("").to_string();
                    let payload_type = parts.nth(2).and_then(|pt| pt.parse().ok()).unwrap_or(0);
                    let (encoding_name, clock_rate, channels) = static_payload(payload_type);
                    sdp.media.push(MediaDescription {
                        media,
                        payload_type,
                        encoding_name: encoding_name.to_string(),
                        clock_rate,
                        channels,
                        ..MediaDescription::default()
                    });
                }
                "a" => {
                    let (name, attr) = value.split_once(':').unwrap_or((value, ""));
                    match sdp.media.last_mut() {
                        Some(m) => m.apply_attribute(name, attr),
                        None if name == "control" => sdp.control = Some(attr.trim().to_string()),
                        None => {}
                    }
                }
                _ => {}
            }
        }

        sdp
    }
}

impl MediaDescription {
    fn apply_attribute(&mut self, name: &str, value: &str) {
        match name {
            "rtpmap" => {
                let Some((pt, encoding)) = value.trim().split_once(' ') else {
                    return;
                };
                if pt.trim().parse::<u8>().ok() != Some(self.payload_type) {
                    return;
                }
                let mut parts = encoding.trim().split('/');
                self.encoding_name = parts.next().unwrap_or("").to_ascii_uppercase();
                self.clock_rate = parts.next().and_then(|r| r.parse().ok()).unwrap_or(0);
                self.channels = parts.next().and_then(|c| c.parse().ok());
            }
            "fmtp" => {
                let Some((pt, params)) = value.trim().split_once(' ') else {
                    return;
                };
                if pt.trim().parse::<u8>().ok() != Some(self.payload_type) {
                    return;
                }
                for param in params.split(';') {
                    if let Some((k, v)) = param.split_once('=') {
                        self.fmtp
                            .insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
                    }
                }
            }
            "control" => self.control = Some(value.trim().to_string()),
            _ => {}
        }
    }

    /// Resolve this section's control attribute against the presentation URL.
    ///
    /// Absolute control URLs are returned as-is; `*` or a missing attribute
    /// resolve to the base itself.
    pub fn control_url(&self, base: &str) -> String {
        match self.control.as_deref() {
            None | Some("*") | Some("") => base.to_string(),
            Some(c) if c.starts_with("rtsp://") || c.starts_with("rtsps://") => c.to_string(),
            Some(c) => {
                if base.ends_with('/') {
                    format!("{base}{c}")
                } else {
                    format!("{base}/{c}")
                }
            }
        }
    }

    /// Decoded `sprop-parameter-sets` (H.264 SPS/PPS, RFC 6184 §8.1).
    pub fn h264_parameter_sets(&self) -> Vec<Vec<u8>> {
        self.fmtp
            .get("sprop-parameter-sets")
            .map(|sets| {
                sets.split(',')
                    .filter_map(|s| match BASE64_STANDARD.decode(s.trim()) {
                        Ok(nal) => Some(nal),
                        Err(e) => {
                            tracing::warn!(error = %e, "bad sprop-parameter-sets entry");
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Hex AudioSpecificConfig from an MPEG4-GENERIC `config` parameter.
    pub fn aac_config(&self) -> Option<&str> {
        self.fmtp.get("config").map(String::as_str)
    }

    /// Integer fmtp parameter.
    pub fn fmtp_u32(&self, key: &str) -> Option<u32> {
        self.fmtp.get(key).and_then(|v| v.parse().ok())
    }
}

/// RFC 3551 static payload types we know how to depacketize.
fn static_payload(pt: u8) -> (&'static str, u32, Option<u16>) {
    match pt {
        0 => ("PCMU", 8000, Some(1)),
        8 => ("PCMA", 8000, Some(1)),
        26 => ("JPEG", 90000, None),
        33 => ("MP2T", 90000, None),
        _ => ("", 0, None),
    }
}
