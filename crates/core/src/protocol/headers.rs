/// RTSP header map (RFC 2326 §4.2).
///
/// Names are stored as given; every lookup is case-insensitive. Setting a
/// name that already exists (in any case) overwrites its value in place, so a
/// message never carries two values for one header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a header value by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Insert or overwrite a header.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    /// Remove a header, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let pos = self
            .entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(pos).1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse one `Name: Value` line into the map.
    ///
    /// The line is split at the first colon; name and value are trimmed.
    /// Returns `false` (leaving the map untouched) if there is no colon.
    pub fn push_line(&mut self, line: &str) -> bool {
        match line.split_once(':') {
            Some((name, value)) => {
                let name = name.trim();
                if name.is_empty() {
                    return false;
                }
                self.set(name, value.trim());
                true
            }
            None => false,
        }
    }

    /// Content-Length as declared by the peer.
    ///
    /// `Ok(0)` when absent; `Err(())` when present but not a number.
    pub(crate) fn content_length(&self) -> Result<usize, ()> {
        match self.get("Content-Length") {
            None => Ok(0),
            Some(v) => v.trim().parse().map_err(|_| ()),
        }
    }

    /// Serialize every header except `Content-Length`, which the caller
    /// writes from the actual body.
    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        for (name, value) in &self.entries {
            if name.eq_ignore_ascii_case("Content-Length") {
                continue;
            }
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
    }
}

/// Serialize headers plus a body with a freshly computed `Content-Length`.
pub(crate) fn write_headers_and_body(headers: &Headers, body: &[u8], out: &mut Vec<u8>) {
    headers.write_to(out);
    if !body.is_empty() {
        out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(body);
}

/// Split a `Session` header value into the id and the optional timeout.
///
/// `"12345678;timeout=60"` → `("12345678", Some(60))`
pub fn split_session(value: &str) -> (&str, Option<u64>) {
    let mut parts = value.split(';');
    let id = parts.next().unwrap_or("").trim();
    let timeout = parts
        .filter_map(|p| p.trim().strip_prefix("timeout="))
        .find_map(|t| t.trim().parse().ok());
    (id, timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut h = Headers::new();
        h.set("CSeq", "42");
        assert_eq!(h.get("cseq"), Some("42"));
        assert_eq!(h.get("CSEQ"), Some("42"));
    }

    #[test]
    fn duplicate_keys_overwrite() {
        let mut h = Headers::new();
        assert!(h.push_line("Session: abc"));
        assert!(h.push_line("session: def"));
        assert_eq!(h.len(), 1);
        assert_eq!(h.get("Session"), Some("def"));
    }

    #[test]
    fn push_line_rejects_missing_colon() {
        let mut h = Headers::new();
        assert!(!h.push_line("garbage line"));
        assert!(h.is_empty());
    }

    #[test]
    fn value_keeps_later_colons() {
        let mut h = Headers::new();
        h.push_line("Content-Base: rtsp://10.0.0.1:554/live/");
        assert_eq!(h.get("content-base"), Some("rtsp://10.0.0.1:554/live/"));
    }

    #[test]
    fn content_length_defaults_to_zero() {
        let mut h = Headers::new();
        assert_eq!(h.content_length(), Ok(0));
        h.set("Content-Length", "abc");
        assert!(h.content_length().is_err());
        h.set("content-length", " 12 ");
        assert_eq!(h.content_length(), Ok(12));
    }

    #[test]
    fn stale_content_length_is_rewritten() {
        let mut h = Headers::new();
        h.set("CSeq", "1");
        h.set("Content-Length", "999");
        let mut out = Vec::new();
        write_headers_and_body(&h, b"abc", &mut out);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Content-Length: 3\r\n"));
        assert!(!text.contains("999"));
        assert!(text.ends_with("\r\n\r\nabc"));
    }

    #[test]
    fn session_split() {
        assert_eq!(split_session("ABCDEF;timeout=30"), ("ABCDEF", Some(30)));
        assert_eq!(split_session("ABCDEF"), ("ABCDEF", None));
        assert_eq!(split_session(" X ; timeout=bad"), ("X", None));
    }
}
