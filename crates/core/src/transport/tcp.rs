use std::collections::HashMap;
use std::io::{BufReader, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::error::{Result, RtspError};
use crate::protocol::{InterleavedData, RtspChunk, RtspFramer, RtspMessage, RtspRequest};

/// `User-Agent` added to outgoing requests that carry none.
pub const USER_AGENT: &str = concat!("rtsp-media/", env!("CARGO_PKG_VERSION"));

/// Listener settings.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Added to requests without a `User-Agent` header; `None` adds nothing.
    pub user_agent: Option<String>,
    /// CSeq assigned to the first request sent.
    pub first_cseq: u32,
    /// Bound for the event queue. `None` means unbounded; with a bound, the
    /// reader thread blocks while the consumer is behind.
    pub event_capacity: Option<usize>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            user_agent: Some(USER_AGENT.to_string()),
            first_cseq: 1,
            event_capacity: None,
        }
    }
}

/// Something the reader thread observed on the connection.
#[derive(Debug, Clone)]
pub enum RtspEvent {
    /// A complete message. Responses that matched a pending request carry
    /// it in `original_request`, with the caller's own CSeq restored.
    Message(RtspMessage),
    Data(InterleavedData),
    /// The reader stopped: `None` on clean end-of-stream, otherwise the
    /// error text. Always the last event.
    Closed(Option<String>),
}

/// Write half and pending-request table, guarded together.
struct WriteState {
    writer: Box<dyn Write + Send>,
    /// Requests awaiting a response, keyed by the CSeq sent on the wire.
    pending: HashMap<u32, RtspRequest>,
    next_cseq: u32,
}

struct Shared {
    state: Mutex<WriteState>,
    closed: AtomicBool,
    user_agent: Option<String>,
    /// Handle used to shut the connection down from any thread.
    socket: Option<TcpStream>,
}

/// One RTSP connection.
///
/// ```text
///            send_message / send_data (any thread)
///                         │
///                         ▼
///   ┌──────────── Mutex<WriteState> ─────────────┐
///   │ writer, pending {cseq → request}, next_cseq│
///   └────────────────────▲───────────────────────┘
///                        │ correlate responses
///   socket ──► reader thread (RtspFramer) ──► Receiver<RtspEvent>
/// ```
///
/// Sending a request renumbers its CSeq from a local counter and records
/// the caller's original; the matching response comes back with that
/// original attached. Closing shuts the socket down, which makes the
/// reader see end-of-stream and emit [`RtspEvent::Closed`].
pub struct RtspListener {
    shared: Arc<Shared>,
    reader: Mutex<Option<Box<dyn Read + Send>>>,
    peer_addr: Option<SocketAddr>,
    event_capacity: Option<usize>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RtspListener {
    /// Listener over arbitrary byte streams (pipes, test doubles, ...).
    ///
    /// Without a socket, [`close`](Self::close) can only mark the listener
    /// closed; the reader stops when `reader` reaches end-of-stream.
    pub fn new(
        reader: impl Read + Send + 'static,
        writer: impl Write + Send + 'static,
        config: ListenerConfig,
    ) -> Self {
        Self::with_socket(reader, writer, config, None, None)
    }

    fn with_socket(
        reader: impl Read + Send + 'static,
        writer: impl Write + Send + 'static,
        config: ListenerConfig,
        socket: Option<TcpStream>,
        peer_addr: Option<SocketAddr>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(WriteState {
                    writer: Box::new(writer),
                    pending: HashMap::new(),
                    next_cseq: config.first_cseq,
                }),
                closed: AtomicBool::new(false),
                user_agent: config.user_agent,
                socket,
            }),
            reader: Mutex::new(Some(Box::new(reader))),
            peer_addr,
            event_capacity: config.event_capacity,
            worker: Mutex::new(None),
        }
    }

    pub fn from_tcp(stream: TcpStream, config: ListenerConfig) -> Result<Self> {
        let peer_addr = stream.peer_addr()?;
        let reader = stream.try_clone()?;
        let socket = stream.try_clone()?;
        let listener = Self::with_socket(reader, stream, config, Some(socket), Some(peer_addr));
        tracing::info!(%peer_addr, "RTSP connection established");
        Ok(listener)
    }

    pub fn connect(addr: impl ToSocketAddrs, config: ListenerConfig) -> Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Self::from_tcp(stream, config)
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Spawn the reader thread and return its event stream.
    ///
    /// Can only be called once.
    pub fn start(&self) -> Result<Receiver<RtspEvent>> {
        let reader = self
            .reader
            .lock()
            .take()
            .ok_or(RtspError::InvalidArgument("listener already started"))?;

        let (tx, rx) = match self.event_capacity {
            Some(cap) => crossbeam_channel::bounded(cap),
            None => crossbeam_channel::unbounded(),
        };

        let shared = self.shared.clone();
        let peer = self.peer_addr;
        let handle = thread::Builder::new()
            .name("rtsp-reader".to_string())
            .spawn(move || read_loop(shared, reader, tx, peer))?;
        *self.worker.lock() = Some(handle);
        Ok(rx)
    }

    /// Send a message and return its CSeq.
    ///
    /// Requests get the next local CSeq, are recorded as pending, and are
    /// sent with that number; the caller's value is restored on the
    /// response. Responses and unknown messages go out unchanged and
    /// return their own CSeq (0 if absent).
    pub fn send_message(&self, message: impl Into<RtspMessage>) -> Result<u32> {
        if self.is_closed() {
            return Err(RtspError::ConnectionClosed);
        }

        let mut guard = self.shared.state.lock();
        // close() may have run while we waited for the lock.
        if self.is_closed() {
            return Err(RtspError::ConnectionClosed);
        }
        let state = &mut *guard;

        match message.into() {
            RtspMessage::Request(request) => {
                let cseq = state.next_cseq;
                state.next_cseq = state.next_cseq.wrapping_add(1);

                let mut wire = request.clone();
                wire.headers.set("CSeq", cseq.to_string());
                if let Some(agent) = &self.shared.user_agent
                    && !wire.headers.contains("User-Agent")
                {
                    wire.headers.set("User-Agent", agent.as_str());
                }

                tracing::debug!(method = %wire.method, uri = %wire.uri, cseq, "sending request");
                write_flush(&mut state.writer, &wire.serialize())?;
                state.pending.insert(cseq, request);
                Ok(cseq)
            }
            other => {
                let cseq = other.cseq().unwrap_or(0);
                write_flush(&mut state.writer, &other.serialize())?;
                Ok(cseq)
            }
        }
    }

    /// Send one interleaved `$` frame.
    pub fn send_data(&self, channel: u8, payload: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(RtspError::ConnectionClosed);
        }
        let frame = InterleavedData::new(channel, payload.to_vec()).encode()?;
        write_flush(&mut self.shared.state.lock().writer, &frame)
    }

    /// Requests still waiting for a response, oldest CSeq first.
    pub fn pending_requests(&self) -> Vec<(u32, RtspRequest)> {
        let state = self.shared.state.lock();
        let mut pending: Vec<_> = state
            .pending
            .iter()
            .map(|(cseq, req)| (*cseq, req.clone()))
            .collect();
        pending.sort_by_key(|(cseq, _)| *cseq);
        pending
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Close the connection. The reader thread observes end-of-stream and
    /// emits [`RtspEvent::Closed`]; incomplete units and requests still
    /// awaiting a response are discarded.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.shutdown();
    }

    /// Wait for the reader thread to finish.
    pub fn join(&self) {
        if let Some(handle) = self.worker.lock().take()
            && handle.join().is_err()
        {
            tracing::warn!("RTSP reader thread panicked");
        }
    }
}

impl Drop for RtspListener {
    fn drop(&mut self) {
        self.close();
    }
}

impl Shared {
    /// Shut the socket down and drop requests that can no longer be answered.
    fn shutdown(&self) {
        if let Some(socket) = &self.socket
            && let Err(e) = socket.shutdown(Shutdown::Both)
            && e.kind() != ErrorKind::NotConnected
        {
            tracing::debug!(error = %e, "socket shutdown failed");
        }
        let dropped = std::mem::take(&mut self.state.lock().pending).len();
        if dropped > 0 {
            tracing::debug!(dropped, "discarding unanswered requests");
        }
    }

    /// Attach the pending request a response answers.
    fn correlate(&self, message: RtspMessage) -> RtspMessage {
        let mut response = match message {
            RtspMessage::Response(response) => response,
            other => return other,
        };
        let Some(cseq) = response.cseq() else {
            tracing::warn!(status = response.status_code, "response without CSeq");
            return RtspMessage::Response(response);
        };

        match self.state.lock().pending.remove(&cseq) {
            Some(original) => {
                if let Some(own) = original.get_header("CSeq").map(str::to_owned) {
                    response.headers.set("CSeq", own);
                }
                tracing::debug!(
                    cseq,
                    status = response.status_code,
                    method = %original.method,
                    elapsed_ms = original.created_at.elapsed().as_millis() as u64,
                    "response"
                );
                response.original_request = Some(Box::new(original));
            }
            None => {
                tracing::warn!(
                    cseq,
                    status = response.status_code,
                    "response does not match any pending request"
                );
            }
        }
        RtspMessage::Response(response)
    }
}

fn read_loop(
    shared: Arc<Shared>,
    reader: Box<dyn Read + Send>,
    events: Sender<RtspEvent>,
    peer: Option<SocketAddr>,
) {
    let mut framer = RtspFramer::new(BufReader::new(reader));

    let reason = loop {
        let event = match framer.read_chunk() {
            Ok(Some(RtspChunk::Message(message))) => RtspEvent::Message(shared.correlate(message)),
            Ok(Some(RtspChunk::Data(data))) => RtspEvent::Data(data),
            Ok(None) => break None,
            Err(e) => {
                // A local close surfaces as a reset on some platforms.
                if shared.closed.load(Ordering::SeqCst) {
                    break None;
                }
                break Some(e.to_string());
            }
        };
        if events.send(event).is_err() {
            tracing::debug!("event receiver dropped, stopping reader");
            break None;
        }
    };

    shared.closed.store(true, Ordering::SeqCst);
    shared.shutdown();
    tracing::info!(
        peer = ?peer,
        reason = reason.as_deref().unwrap_or("end of stream"),
        "RTSP connection closed"
    );
    let _ = events.send(RtspEvent::Closed(reason));
}

fn write_flush(writer: &mut Box<dyn Write + Send>, bytes: &[u8]) -> Result<()> {
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(())
}
