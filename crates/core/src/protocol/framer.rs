//! Splitting one RTSP byte stream into messages and interleaved data.
//!
//! A single TCP connection carries both textual RTSP messages and, once a
//! client has negotiated `RTP/AVP/TCP;interleaved=...`, binary RTP/RTCP
//! frames (RFC 2326 §10.12):
//!
//! ```text
//! +-----+---------+----------------+----------------------+
//! | '$' | channel | length (u16 BE) | length bytes of data |
//! +-----+---------+----------------+----------------------+
//! ```
//!
//! A `$` can never begin an RTSP command line, so the first byte of each
//! unit tells the two apart.

use std::io::{BufRead, ErrorKind, Read};

use super::headers::Headers;
use super::message::RtspMessage;
use crate::error::{Result, RtspError};

/// Interleaved frame marker (`$`).
pub const INTERLEAVED_MARKER: u8 = 0x24;

/// Upper bound for a single text line; longer lines are dropped whole.
const MAX_LINE_LEN: u64 = 16 * 1024;

/// Largest message body we buffer. Bigger bodies are skipped unread.
pub const MAX_BODY_LEN: usize = 4 * 1024 * 1024;

/// One binary frame carried inside the RTSP connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterleavedData {
    pub channel: u8,
    pub payload: Vec<u8>,
}

impl InterleavedData {
    pub fn new(channel: u8, payload: Vec<u8>) -> Self {
        Self { channel, payload }
    }

    /// Encode as `$ channel len_hi len_lo payload`.
    ///
    /// Payloads over 65535 bytes cannot be represented.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let len = u16::try_from(self.payload.len())
            .map_err(|_| RtspError::InvalidArgument("interleaved payload exceeds 65535 bytes"))?;
        let mut out = Vec::with_capacity(4 + self.payload.len());
        out.push(INTERLEAVED_MARKER);
        out.push(self.channel);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }
}

/// A unit read off the connection.
#[derive(Debug, Clone)]
pub enum RtspChunk {
    Message(RtspMessage),
    Data(InterleavedData),
}

impl RtspChunk {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        match self {
            RtspChunk::Message(msg) => Ok(msg.serialize()),
            RtspChunk::Data(data) => data.encode(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadingState {
    NewCommand,
    Headers,
    Data,
    InterleavedHeader,
    InterleavedData,
}

/// Read side of the RTSP stream.
///
/// Pulls complete [`RtspChunk`]s from a buffered reader. A chunk is only
/// returned once all of its bytes have arrived; a stream that ends in the
/// middle of a unit yields an `UnexpectedEof` I/O error and the partial
/// unit is discarded.
pub struct RtspFramer<R> {
    reader: R,
}

impl<R: BufRead> RtspFramer<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read the next chunk. `Ok(None)` means the peer closed the stream
    /// cleanly between units.
    pub fn read_chunk(&mut self) -> Result<Option<RtspChunk>> {
        let mut state = ReadingState::NewCommand;
        let mut command_line = String::new();
        let mut headers = Headers::new();
        let mut channel = 0u8;
        let mut data_len = 0usize;

        loop {
            state = match state {
                ReadingState::NewCommand => {
                    let buf = self.reader.fill_buf()?;
                    if buf.is_empty() {
                        return Ok(None);
                    }
                    if buf[0] == INTERLEAVED_MARKER {
                        self.reader.consume(1);
                        ReadingState::InterleavedHeader
                    } else {
                        match self.read_line()? {
                            None => return Ok(None),
                            // Stray CRLF between messages.
                            Some(line) if line.trim().is_empty() => ReadingState::NewCommand,
                            Some(line) => {
                                command_line = line;
                                ReadingState::Headers
                            }
                        }
                    }
                }
                ReadingState::Headers => {
                    let line = self.read_line()?.ok_or_else(truncated)?;
                    if line.is_empty() {
                        ReadingState::Data
                    } else {
                        if !headers.push_line(&line) {
                            tracing::warn!(line, "dropping malformed header line");
                        }
                        ReadingState::Headers
                    }
                }
                ReadingState::Data => {
                    let len = headers.content_length().unwrap_or_else(|_| {
                        tracing::warn!(
                            value = headers.get("Content-Length").unwrap_or(""),
                            "unparseable Content-Length, assuming no body"
                        );
                        0
                    });
                    if len > MAX_BODY_LEN {
                        tracing::warn!(
                            command_line = %command_line,
                            len,
                            max = MAX_BODY_LEN,
                            "message body too large, dropping message"
                        );
                        self.skip(len as u64)?;
                        headers = Headers::new();
                        ReadingState::NewCommand
                    } else {
                        let mut body = vec![0u8; len];
                        self.read_exact(&mut body)?;
                        let message = RtspMessage::from_parts(&command_line, headers, body);
                        return Ok(Some(RtspChunk::Message(message)));
                    }
                }
                ReadingState::InterleavedHeader => {
                    let mut hdr = [0u8; 3];
                    self.read_exact(&mut hdr)?;
                    channel = hdr[0];
                    data_len = u16::from_be_bytes([hdr[1], hdr[2]]) as usize;
                    ReadingState::InterleavedData
                }
                ReadingState::InterleavedData => {
                    let mut payload = vec![0u8; data_len];
                    self.read_exact(&mut payload)?;
                    tracing::trace!(channel, len = data_len, "interleaved frame");
                    return Ok(Some(RtspChunk::Data(InterleavedData { channel, payload })));
                }
            };
        }
    }

    /// One line without its `\n` / `\r\n`; `None` at end of stream.
    /// Lines longer than [`MAX_LINE_LEN`] are discarded and the next line
    /// is returned instead.
    fn read_line(&mut self) -> Result<Option<String>> {
        loop {
            let mut raw = Vec::new();
            let n = (&mut self.reader)
                .take(MAX_LINE_LEN)
                .read_until(b'\n', &mut raw)?;
            if n == 0 {
                return Ok(None);
            }
            if raw.last() != Some(&b'\n') && n as u64 == MAX_LINE_LEN {
                let rest = self.discard_line()?;
                tracing::warn!(len = n + rest, "dropping over-long line");
                continue;
            }
            if raw.last() == Some(&b'\n') {
                raw.pop();
            }
            if raw.last() == Some(&b'\r') {
                raw.pop();
            }
            return Ok(Some(String::from_utf8_lossy(&raw).into_owned()));
        }
    }

    /// Consume up to and including the next `\n` without buffering it.
    fn discard_line(&mut self) -> Result<usize> {
        let mut skipped = 0;
        loop {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                return Ok(skipped);
            }
            match buf.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    self.reader.consume(i + 1);
                    return Ok(skipped + i + 1);
                }
                None => {
                    let n = buf.len();
                    self.reader.consume(n);
                    skipped += n;
                }
            }
        }
    }

    /// Consume exactly `n` bytes without buffering them.
    fn skip(&mut self, n: u64) -> Result<()> {
        let skipped = std::io::copy(&mut (&mut self.reader).take(n), &mut std::io::sink())?;
        if skipped < n {
            return Err(truncated());
        }
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf)?;
        Ok(())
    }
}

fn truncated() -> RtspError {
    RtspError::Io(std::io::Error::new(
        ErrorKind::UnexpectedEof,
        "stream ended inside an RTSP message",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::request::{Method, RtspRequest};
    use std::io::Cursor;

    fn framer(bytes: &[u8]) -> RtspFramer<Cursor<Vec<u8>>> {
        RtspFramer::new(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn interleaved_encoding() {
        let data = InterleavedData::new(1, vec![0xAA, 0xBB, 0xCC]);
        assert_eq!(
            data.encode().unwrap(),
            vec![0x24, 0x01, 0x00, 0x03, 0xAA, 0xBB, 0xCC]
        );
    }

    #[test]
    fn interleaved_decoding() {
        let mut f = framer(&[0x24, 0x01, 0x00, 0x03, 0xAA, 0xBB, 0xCC]);
        match f.read_chunk().unwrap() {
            Some(RtspChunk::Data(d)) => {
                assert_eq!(d.channel, 1);
                assert_eq!(d.payload, vec![0xAA, 0xBB, 0xCC]);
            }
            other => panic!("expected data, got {other:?}"),
        }
        assert!(f.read_chunk().unwrap().is_none());
    }

    #[test]
    fn oversized_interleaved_payload_is_rejected() {
        let data = InterleavedData::new(0, vec![0; 70_000]);
        assert!(matches!(data.encode(), Err(RtspError::InvalidArgument(_))));
    }

    #[test]
    fn request_round_trip() {
        let req = RtspRequest::new(Method::SetParameter, "rtsp://cam/live")
            .add_header("CSeq", "3")
            .add_header("Content-Type", "text/parameters")
            .with_body(b"volume: 10\r\n".to_vec());
        let mut f = framer(&req.serialize());
        match f.read_chunk().unwrap() {
            Some(RtspChunk::Message(RtspMessage::Request(parsed))) => {
                assert_eq!(parsed.method, Method::SetParameter);
                assert_eq!(parsed.uri, "rtsp://cam/live");
                assert_eq!(parsed.body, b"volume: 10\r\n");
                for (name, value) in req.headers.iter() {
                    assert_eq!(parsed.get_header(name), Some(value));
                }
            }
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn mixed_messages_and_data() {
        let mut bytes = b"RTSP/1.0 200 OK\r\nCSeq: 1\r\nContent-Length: 3\r\n\r\nabc".to_vec();
        bytes.extend_from_slice(&[0x24, 0x00, 0x00, 0x02, 0x80, 0x60]);
        bytes.extend_from_slice(b"\r\nRTSP/1.0 200 OK\r\nCSeq: 2\r\n\r\n");
        let mut f = framer(&bytes);

        match f.read_chunk().unwrap() {
            Some(RtspChunk::Message(RtspMessage::Response(r))) => {
                assert_eq!(r.cseq(), Some(1));
                assert_eq!(r.body, b"abc");
            }
            other => panic!("unexpected {other:?}"),
        }
        match f.read_chunk().unwrap() {
            Some(RtspChunk::Data(d)) => assert_eq!(d.payload, vec![0x80, 0x60]),
            other => panic!("unexpected {other:?}"),
        }
        match f.read_chunk().unwrap() {
            Some(RtspChunk::Message(RtspMessage::Response(r))) => assert_eq!(r.cseq(), Some(2)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(f.read_chunk().unwrap().is_none());
    }

    #[test]
    fn garbage_command_line_yields_unknown() {
        let mut f = framer(b"what is this\r\nCSeq: 1\r\n\r\n");
        assert!(matches!(
            f.read_chunk().unwrap(),
            Some(RtspChunk::Message(RtspMessage::Unknown(_)))
        ));
    }

    #[test]
    fn malformed_header_does_not_abort() {
        let mut f = framer(b"RTSP/1.0 200 OK\r\nbroken header\r\nCSeq: 8\r\n\r\n");
        match f.read_chunk().unwrap() {
            Some(RtspChunk::Message(msg)) => {
                assert_eq!(msg.cseq(), Some(8));
                assert_eq!(msg.headers().len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_content_length_means_no_body() {
        let mut f = framer(b"RTSP/1.0 200 OK\r\nContent-Length: x\r\n\r\nRTSP/1.0 200 OK\r\nCSeq: 2\r\n\r\n");
        match f.read_chunk().unwrap() {
            Some(RtspChunk::Message(msg)) => assert!(msg.body().is_empty()),
            other => panic!("unexpected {other:?}"),
        }
        match f.read_chunk().unwrap() {
            Some(RtspChunk::Message(msg)) => assert_eq!(msg.cseq(), Some(2)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn truncated_body_is_not_delivered() {
        let mut f = framer(b"RTSP/1.0 200 OK\r\nContent-Length: 10\r\n\r\nabc");
        assert!(f.read_chunk().is_err());
    }

    #[test]
    fn truncated_interleaved_frame_is_not_delivered() {
        let mut f = framer(&[0x24, 0x00, 0x00, 0x08, 0x01]);
        assert!(f.read_chunk().is_err());
    }

    #[test]
    fn truncated_headers_are_not_delivered() {
        let mut f = framer(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n");
        assert!(f.read_chunk().is_err());
    }

    #[test]
    fn empty_stream_is_clean_end() {
        let mut f = framer(b"");
        assert!(f.read_chunk().unwrap().is_none());
    }

    #[test]
    fn oversized_body_is_skipped() {
        let mut bytes = format!(
            "RTSP/1.0 200 OK\r\nCSeq: 1\r\nContent-Length: {}\r\n\r\n",
            MAX_BODY_LEN + 1
        )
        .into_bytes();
        bytes.resize(bytes.len() + MAX_BODY_LEN + 1, b'x');
        bytes.extend_from_slice(b"RTSP/1.0 200 OK\r\nCSeq: 2\r\n\r\n");
        let mut f = framer(&bytes);
        match f.read_chunk().unwrap() {
            Some(RtspChunk::Message(msg)) => {
                assert_eq!(msg.cseq(), Some(2));
                assert!(msg.body().is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(f.read_chunk().unwrap().is_none());
    }

    #[test]
    fn huge_content_length_is_not_allocated() {
        let mut f = framer(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\nContent-Length: 18446744073709551615\r\n\r\nabc");
        match f.read_chunk() {
            Err(RtspError::Io(e)) => assert_eq!(e.kind(), ErrorKind::UnexpectedEof),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn over_long_line_is_dropped_whole() {
        let mut bytes = b"RTSP/1.0 200 OK\r\nX-Junk: ".to_vec();
        bytes.resize(bytes.len() + 20_000, b'a');
        bytes.extend_from_slice(b"\r\nCSeq: 3\r\n\r\n");
        let mut f = framer(&bytes);
        match f.read_chunk().unwrap() {
            Some(RtspChunk::Message(msg)) => {
                assert_eq!(msg.cseq(), Some(3));
                assert_eq!(msg.headers().len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(f.read_chunk().unwrap().is_none());
    }
}
