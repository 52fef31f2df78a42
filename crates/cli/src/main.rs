use std::time::Duration;

use clap::Parser;
use crossbeam_channel::{Receiver, select, tick};
use rtsp::media::RtpPacket;
use rtsp::protocol::{
    Method, RtspMessage, RtspRequest, RtspResponse, RtspTransport, SessionDescription,
};
use rtsp::{
    Authentication, Credentials, Depacketizer, ListenerConfig, RtspError, RtspEvent,
    RtspListener, depacketizer_for,
};
use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: u16 = 554;
const DEFAULT_SESSION_TIMEOUT: u64 = 60;
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(
    name = "rtsp-dump",
    about = "Pull an RTSP stream over TCP and log the depacketized frames"
)]
struct Args {
    /// Stream URL (rtsp://[user:pass@]host[:port]/path)
    url: String,

    /// Username for Basic/Digest authentication
    #[arg(long, short)]
    user: Option<String>,

    /// Password for Basic/Digest authentication
    #[arg(long, short, default_value = "")]
    password: String,

    /// Stop after this many frames (0 = until the server closes)
    #[arg(long, short, default_value_t = 0)]
    frames: u64,
}

#[derive(Debug, thiserror::Error)]
enum DumpError {
    #[error(transparent)]
    Rtsp(#[from] RtspError),

    #[error("invalid URL: {0}")]
    Url(String),

    #[error("{method} failed: {code} {text}")]
    Status {
        method: Method,
        code: u16,
        text: String,
    },

    #[error("server offered no media")]
    NoMedia,

    #[error("connection closed: {0}")]
    Closed(String),

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// Host address, optional inline credentials and the URL without them.
struct Target {
    addr: String,
    credentials: Option<Credentials>,
    url: String,
}

fn parse_url(url: &str) -> Result<Target, DumpError> {
    let rest = url
        .strip_prefix("rtsp://")
        .ok_or_else(|| DumpError::Url(url.to_string()))?;
    let (authority, path) = match rest.find('/') {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };
    let (credentials, host) = match authority.rsplit_once('@') {
        Some((userinfo, host)) => {
            let (user, pass) = userinfo.split_once(':').unwrap_or((userinfo, ""));
            (Some(Credentials::new(user, pass)), host)
        }
        None => (None, authority),
    };
    if host.is_empty() {
        return Err(DumpError::Url(url.to_string()));
    }
    let has_port = host
        .rsplit_once(':')
        .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
    let addr = if has_port {
        host.to_string()
    } else {
        format!("{host}:{DEFAULT_PORT}")
    };
    Ok(Target {
        addr,
        credentials,
        url: format!("rtsp://{host}{path}"),
    })
}

struct Track {
    channel: u8,
    depacketizer: Box<dyn Depacketizer>,
}

struct Client {
    listener: RtspListener,
    events: Receiver<RtspEvent>,
    credentials: Option<Credentials>,
    auth: Option<Authentication>,
    session: Option<String>,
    tracks: Vec<Track>,
    frames: u64,
}

impl Client {
    fn connect(target: &Target, credentials: Option<Credentials>) -> Result<Self, DumpError> {
        let listener = RtspListener::connect(target.addr.as_str(), ListenerConfig::default())?;
        let events = listener.start()?;
        Ok(Self {
            listener,
            events,
            credentials,
            auth: None,
            session: None,
            tracks: Vec::new(),
            frames: 0,
        })
    }

    /// Send a request and wait for its response, retrying once with
    /// credentials when challenged.
    fn request(&mut self, request: RtspRequest) -> Result<RtspResponse, DumpError> {
        let response = self.send_and_wait(request.clone())?;
        if response.status_code != 401 || self.auth.is_some() {
            return check_status(&request, response);
        }
        let (Some(credentials), Some(challenge)) = (
            self.credentials.clone(),
            response.get_header("WWW-Authenticate"),
        ) else {
            return check_status(&request, response);
        };
        tracing::debug!(challenge, "server requested authentication");
        self.auth = Some(Authentication::from_challenge(credentials, challenge)?);
        let response = self.send_and_wait(request.clone())?;
        check_status(&request, response)
    }

    fn send_and_wait(&mut self, mut request: RtspRequest) -> Result<RtspResponse, DumpError> {
        if let Some(auth) = self.auth.as_mut() {
            auth.authorize(&mut request);
        }
        if let Some(session) = &self.session
            && !request.headers.contains("Session")
        {
            request.headers.set("Session", session.as_str());
        }
        let cseq = self.listener.send_message(request)?;
        tracing::debug!(cseq, "request sent");
        loop {
            let event = self
                .events
                .recv_timeout(RESPONSE_TIMEOUT)
                .map_err(|_| DumpError::Timeout(RESPONSE_TIMEOUT))?;
            if let Some(response) = self.handle_event(event)? {
                return Ok(response);
            }
        }
    }

    /// Route one event; responses are returned to the caller.
    fn handle_event(&mut self, event: RtspEvent) -> Result<Option<RtspResponse>, DumpError> {
        match event {
            RtspEvent::Message(RtspMessage::Response(response)) => Ok(Some(response)),
            RtspEvent::Message(RtspMessage::Request(request)) => {
                tracing::debug!(method = %request.method, "server request");
                self.listener.send_message(request.create_response(501))?;
                Ok(None)
            }
            RtspEvent::Message(RtspMessage::Unknown(_)) => Ok(None),
            RtspEvent::Data(data) => {
                let Some(track) = self.tracks.iter_mut().find(|t| t.channel == data.channel) else {
                    // RTCP and anything we did not set up.
                    return Ok(None);
                };
                let packet = match RtpPacket::parse(&data.payload) {
                    Ok(packet) => packet,
                    Err(e) => {
                        tracing::warn!(channel = data.channel, error = %e, "bad RTP packet");
                        return Ok(None);
                    }
                };
                if let Some(frame) = track.depacketizer.process_packet(&packet) {
                    self.frames += 1;
                    tracing::info!(
                        channel = track.channel,
                        codec = track.depacketizer.codec_name(),
                        timestamp = frame.timestamp,
                        units = frame.units.len(),
                        bytes = frame.len(),
                        "frame"
                    );
                }
                Ok(None)
            }
            RtspEvent::Closed(reason) => Err(DumpError::Closed(
                reason.unwrap_or_else(|| "end of stream".to_string()),
            )),
        }
    }

    fn setup(&mut self, base: &str, sdp: &SessionDescription) -> Result<u64, DumpError> {
        let mut timeout = DEFAULT_SESSION_TIMEOUT;
        for (i, media) in sdp.media.iter().enumerate() {
            let Ok(rtp_channel) = u8::try_from(2 * i) else {
                tracing::warn!(index = i, "too many media sections, ignoring the rest");
                break;
            };
            let transport = RtspTransport::interleaved(rtp_channel, rtp_channel + 1);
            let request = RtspRequest::new(Method::Setup, &media.control_url(base))
                .add_header("Transport", &transport.to_string());
            let response = self.request(request)?;

            if self.session.is_none() {
                self.session = response.session().map(str::to_string);
                if let Some(t) = response.session_timeout() {
                    timeout = t;
                }
            }
            let channel = response
                .get_header("Transport")
                .and_then(|v| RtspTransport::parse(v).ok())
                .and_then(|t| t.interleaved_channels())
                .map_or(rtp_channel, |(rtp, _)| rtp);

            tracing::info!(
                media = %media.media,
                encoding = %media.encoding_name,
                channel,
                "track set up"
            );
            self.tracks.push(Track {
                channel,
                depacketizer: depacketizer_for(media),
            });
        }
        Ok(timeout)
    }

    fn stream(&mut self, url: &str, keepalive: Duration, limit: u64) -> Result<(), DumpError> {
        let events = self.events.clone();
        let ticker = tick(keepalive);
        while limit == 0 || self.frames < limit {
            select! {
                recv(events) -> event => {
                    let Ok(event) = event else { break };
                    match self.handle_event(event) {
                        Ok(Some(response)) if !response.is_ok() => {
                            tracing::warn!(status = response.status_code, "keepalive rejected");
                        }
                        Ok(_) => {}
                        Err(DumpError::Closed(reason)) => {
                            tracing::info!(%reason, "stream ended");
                            return Ok(());
                        }
                        Err(e) => return Err(e),
                    }
                }
                recv(ticker) -> _ => {
                    let mut request = RtspRequest::new(Method::GetParameter, url);
                    if let Some(auth) = self.auth.as_mut() {
                        auth.authorize(&mut request);
                    }
                    if let Some(session) = &self.session {
                        request.headers.set("Session", session.as_str());
                    }
                    self.listener.send_message(request)?;
                    tracing::debug!("keepalive sent");
                }
            }
        }
        Ok(())
    }

    fn teardown(&mut self, url: &str) {
        if self.listener.is_closed() {
            return;
        }
        if let Err(e) = self.request(RtspRequest::new(Method::Teardown, url)) {
            tracing::warn!(error = %e, "TEARDOWN failed");
        }
        self.listener.close();
    }
}

fn check_status(request: &RtspRequest, response: RtspResponse) -> Result<RtspResponse, DumpError> {
    if response.is_ok() {
        Ok(response)
    } else {
        Err(DumpError::Status {
            method: request.method.clone(),
            code: response.status_code,
            text: response.status_text,
        })
    }
}

fn run(args: Args) -> Result<(), DumpError> {
    let target = parse_url(&args.url)?;
    let credentials = match args.user {
        Some(user) => Some(Credentials::new(user, args.password)),
        None => target.credentials.clone(),
    };

    let mut client = Client::connect(&target, credentials)?;
    tracing::info!(addr = %target.addr, "connected");

    let options = client.request(RtspRequest::new(Method::Options, &target.url))?;
    tracing::debug!(public = options.get_header("Public"), "OPTIONS");

    let describe = client.request(
        RtspRequest::new(Method::Describe, &target.url).add_header("Accept", "application/sdp"),
    )?;
    let base = describe
        .get_header("Content-Base")
        .unwrap_or(target.url.as_str())
        .trim_end_matches('/')
        .to_string();
    let sdp = SessionDescription::parse(&String::from_utf8_lossy(&describe.body));
    if sdp.media.is_empty() {
        return Err(DumpError::NoMedia);
    }

    let timeout = client.setup(&base, &sdp)?;
    let play_url = sdp
        .control
        .as_deref()
        .filter(|c| c.starts_with("rtsp://"))
        .unwrap_or(base.as_str())
        .to_string();
    client.request(RtspRequest::new(Method::Play, &play_url))?;
    tracing::info!(session = client.session.as_deref(), timeout, "playing");

    let keepalive = Duration::from_secs((timeout / 2).max(1));
    let result = client.stream(&play_url, keepalive, args.frames);
    client.teardown(&play_url);

    for track in &client.tracks {
        tracing::info!(
            channel = track.channel,
            codec = track.depacketizer.codec_name(),
            stats = ?track.depacketizer.stats(),
            "track summary"
        );
    }
    result
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("rtsp-dump: {e}");
        std::process::exit(1);
    }
}
