use std::fmt;

use crate::error::{ParseErrorKind, RtspError};

/// A `low-high` pair as used by `client_port`, `server_port`, `port` and
/// `interleaved` (RFC 2326 §12.39). The second value is optional on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortCouple {
    pub first: u16,
    pub second: Option<u16>,
}

impl PortCouple {
    pub fn new(first: u16, second: u16) -> Self {
        Self {
            first,
            second: Some(second),
        }
    }

    pub fn single(first: u16) -> Self {
        Self {
            first,
            second: None,
        }
    }

    /// Parse `8000-8001` or `8000`.
    pub fn parse(value: &str) -> crate::error::Result<Self> {
        let invalid = || RtspError::parse(ParseErrorKind::InvalidTransport);
        let mut parts = value.trim().splitn(2, '-');
        let first = parts
            .next()
            .and_then(|p| p.trim().parse().ok())
            .ok_or_else(invalid)?;
        let second = match parts.next() {
            Some(p) => Some(p.trim().parse().map_err(|_| invalid())?),
            None => None,
        };
        Ok(Self { first, second })
    }
}

impl fmt::Display for PortCouple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.second {
            Some(second) => write!(f, "{}-{}", self.first, second),
            None => write!(f, "{}", self.first),
        }
    }
}

/// Lower transport of an RTP transport spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LowerTransport {
    #[default]
    Udp,
    Tcp,
}

/// One transport spec from a `Transport` header (RFC 2326 §12.39).
///
/// ## Wire format examples
///
/// ```text
/// RTP/AVP;unicast;client_port=8000-8001;server_port=5000-5001;ssrc=1A2B3C4D
/// RTP/AVP/TCP;unicast;interleaved=0-1
/// RTP/AVP;multicast;destination=239.0.0.1;port=5000-5001;ttl=16
/// ```
///
/// Parameters we do not recognise are ignored on parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtspTransport {
    /// Transport protocol, always `RTP` in practice.
    pub transport: String,
    /// Profile, normally `AVP`.
    pub profile: String,
    pub lower_transport: LowerTransport,
    pub is_multicast: bool,
    pub destination: Option<String>,
    pub source: Option<String>,
    /// Interleaved channel pair when carried over the RTSP connection.
    pub interleaved: Option<PortCouple>,
    pub append: bool,
    pub ttl: Option<u8>,
    pub layers: Option<u32>,
    /// Multicast port pair.
    pub port: Option<PortCouple>,
    pub client_port: Option<PortCouple>,
    pub server_port: Option<PortCouple>,
    pub ssrc: Option<u32>,
    /// `PLAY`, `RECORD`, ... (quotes stripped).
    pub mode: Option<String>,
}

impl Default for RtspTransport {
    fn default() -> Self {
        Self {
            transport: "RTP".to_string(),
            profile: "AVP".to_string(),
            lower_transport: LowerTransport::Udp,
            is_multicast: false,
            destination: None,
            source: None,
            interleaved: None,
            append: false,
            ttl: None,
            layers: None,
            port: None,
            client_port: None,
            server_port: None,
            ssrc: None,
            mode: None,
        }
    }
}

impl RtspTransport {
    /// Unicast UDP towards the given client port pair.
    pub fn udp(client_port: PortCouple) -> Self {
        Self {
            client_port: Some(client_port),
            ..Self::default()
        }
    }

    /// Unicast RTP interleaved on the RTSP connection.
    pub fn interleaved(rtp_channel: u8, rtcp_channel: u8) -> Self {
        Self {
            lower_transport: LowerTransport::Tcp,
            interleaved: Some(PortCouple::new(rtp_channel.into(), rtcp_channel.into())),
            ..Self::default()
        }
    }

    /// Parse one transport spec.
    pub fn parse(value: &str) -> crate::error::Result<Self> {
        let invalid = || RtspError::parse(ParseErrorKind::InvalidTransport);
        let mut params = value.split(';').map(str::trim);

        let spec = params.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let mut protocol = spec.split('/');
        let transport = protocol.next().unwrap_or("").to_string();
        let profile = protocol.next().ok_or_else(invalid)?.to_string();
        let lower_transport = match protocol.next() {
            None => LowerTransport::Udp,
            Some(t) if t.eq_ignore_ascii_case("UDP") => LowerTransport::Udp,
            Some(t) if t.eq_ignore_ascii_case("TCP") => LowerTransport::Tcp,
            Some(_) => return Err(invalid()),
        };

        let mut out = RtspTransport {
            transport,
            profile,
            lower_transport,
            ..Self::default()
        };

        for param in params.filter(|p| !p.is_empty()) {
            let (key, val) = match param.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (param, None),
            };
            match (key.to_ascii_lowercase().as_str(), val) {
                ("unicast", None) => out.is_multicast = false,
                ("multicast", None) => out.is_multicast = true,
                ("append", None) => out.append = true,
                ("destination", Some(v)) => out.destination = Some(v.to_string()),
                ("source", Some(v)) => out.source = Some(v.to_string()),
                ("interleaved", Some(v)) => out.interleaved = Some(PortCouple::parse(v)?),
                ("ttl", Some(v)) => out.ttl = Some(v.parse().map_err(|_| invalid())?),
                ("layers", Some(v)) => out.layers = Some(v.parse().map_err(|_| invalid())?),
                ("port", Some(v)) => out.port = Some(PortCouple::parse(v)?),
                ("client_port", Some(v)) => out.client_port = Some(PortCouple::parse(v)?),
                ("server_port", Some(v)) => out.server_port = Some(PortCouple::parse(v)?),
                ("ssrc", Some(v)) => {
                    out.ssrc = Some(u32::from_str_radix(v, 16).map_err(|_| invalid())?)
                }
                ("mode", Some(v)) => out.mode = Some(v.trim_matches('"').to_string()),
                _ => tracing::debug!(param, "ignoring unknown transport parameter"),
            }
        }

        Ok(out)
    }

    /// Parse every comma-separated spec of a `Transport` header.
    pub fn parse_all(value: &str) -> crate::error::Result<Vec<Self>> {
        value
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Self::parse)
            .collect()
    }

    /// Interleaved RTP/RTCP channel numbers, if they fit in a byte.
    pub fn interleaved_channels(&self) -> Option<(u8, Option<u8>)> {
        let couple = self.interleaved?;
        let rtp = u8::try_from(couple.first).ok()?;
        let rtcp = couple.second.and_then(|c| u8::try_from(c).ok());
        Some((rtp, rtcp))
    }
}

impl fmt::Display for RtspTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.transport, self.profile)?;
        if self.lower_transport == LowerTransport::Tcp {
            write!(f, "/TCP")?;
        }
        write!(f, ";{}", if self.is_multicast { "multicast" } else { "unicast" })?;
        if let Some(v) = &self.destination {
            write!(f, ";destination={v}")?;
        }
        if let Some(v) = &self.source {
            write!(f, ";source={v}")?;
        }
        if let Some(v) = self.interleaved {
            write!(f, ";interleaved={v}")?;
        }
        if self.append {
            write!(f, ";append")?;
        }
        if let Some(v) = self.ttl {
            write!(f, ";ttl={v}")?;
        }
        if let Some(v) = self.layers {
            write!(f, ";layers={v}")?;
        }
        if let Some(v) = self.port {
            write!(f, ";port={v}")?;
        }
        if let Some(v) = self.client_port {
            write!(f, ";client_port={v}")?;
        }
        if let Some(v) = self.server_port {
            write!(f, ";server_port={v}")?;
        }
        if let Some(v) = self.ssrc {
            write!(f, ";ssrc={v:08X}")?;
        }
        if let Some(v) = &self.mode {
            write!(f, ";mode=\"{v}\"")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_udp_transport() {
        let t = RtspTransport::parse("RTP/AVP;unicast;client_port=5000-5001").unwrap();
        assert_eq!(t.lower_transport, LowerTransport::Udp);
        assert!(!t.is_multicast);
        assert_eq!(t.client_port, Some(PortCouple::new(5000, 5001)));
        assert!(t.interleaved.is_none());
    }

    #[test]
    fn parse_interleaved_setup_response() {
        let t = RtspTransport::parse(
            "RTP/AVP/TCP;unicast;interleaved=2-3;ssrc=0A1B2C3D;mode=\"PLAY\"",
        )
        .unwrap();
        assert_eq!(t.lower_transport, LowerTransport::Tcp);
        assert_eq!(t.interleaved_channels(), Some((2, Some(3))));
        assert_eq!(t.ssrc, Some(0x0A1B2C3D));
        assert_eq!(t.mode.as_deref(), Some("PLAY"));
    }

    #[test]
    fn parse_multicast() {
        let t = RtspTransport::parse(
            "RTP/AVP;multicast;destination=239.1.1.1;port=6000-6001;ttl=16;source=10.0.0.2",
        )
        .unwrap();
        assert!(t.is_multicast);
        assert_eq!(t.destination.as_deref(), Some("239.1.1.1"));
        assert_eq!(t.port, Some(PortCouple::new(6000, 6001)));
        assert_eq!(t.ttl, Some(16));
        assert_eq!(t.source.as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn single_port_allowed() {
        let t = RtspTransport::parse("RTP/AVP;unicast;client_port=7000").unwrap();
        assert_eq!(t.client_port, Some(PortCouple::single(7000)));
        assert_eq!(t.client_port.unwrap().to_string(), "7000");
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(RtspTransport::parse("").is_err());
        assert!(RtspTransport::parse("RTP").is_err());
        assert!(RtspTransport::parse("RTP/AVP/SCTP").is_err());
        assert!(RtspTransport::parse("RTP/AVP;client_port=abc-1").is_err());
        assert!(RtspTransport::parse("RTP/AVP;ssrc=zz").is_err());
    }

    #[test]
    fn unknown_parameters_ignored() {
        let t = RtspTransport::parse("RTP/AVP;unicast;x-vendor=1;client_port=1-2").unwrap();
        assert_eq!(t.client_port, Some(PortCouple::new(1, 2)));
    }

    #[test]
    fn serialize_round_trip() {
        let mut t = RtspTransport::interleaved(0, 1);
        t.ssrc = Some(0xDEADBEEF);
        t.mode = Some("PLAY".into());
        let text = t.to_string();
        assert_eq!(
            text,
            "RTP/AVP/TCP;unicast;interleaved=0-1;ssrc=DEADBEEF;mode=\"PLAY\""
        );
        assert_eq!(RtspTransport::parse(&text).unwrap(), t);
    }

    #[test]
    fn parse_all_specs() {
        let all = RtspTransport::parse_all(
            "RTP/AVP/TCP;unicast;interleaved=0-1, RTP/AVP;unicast;client_port=4588-4589",
        )
        .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].client_port, Some(PortCouple::new(4588, 4589)));
    }
}
