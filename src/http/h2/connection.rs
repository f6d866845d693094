//! HTTP/2 connection driver.
//!
//! [`H2Connection::handshake`] writes the client preface together with the
//! profile's SETTINGS and WINDOW_UPDATE, then splits the work in two:
//! a reader task that turns socket bytes into [`Frame`]s, and an
//! [`H2Driver`] that owns all connection state. Callers talk to the driver
//! through a clonable [`H2Handle`].

use crate::base::neterror::NetError;
use crate::emulation::profile::Http2Profile;
use crate::http::h2::frame::{self, flags, ErrorCode, Frame, FrameHeader, FRAME_HEADER_SIZE};
use crate::http::h2::hpack::{Decoder, Encoder};
use crate::http::h2settings::{
    self, H2Settings, PseudoHeader, DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_FRAME_SIZE,
    MAX_ALLOWED_FRAME_SIZE, MAX_WINDOW_SIZE,
};
use crate::http::response::RawResponse;
use crate::socket::stream::BoxedSocket;
use bytes::{Bytes, BytesMut};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Headers that have no meaning on an HTTP/2 connection.
const CONNECTION_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
];

const MAX_STREAM_ID: u32 = 0x7fff_ffff;

/// Connection parameters taken from a profile (or defaults for plain h2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct H2Config {
    pub settings: H2Settings,
    pub window_update: u32,
    pub pseudo_order: Vec<PseudoHeader>,
    pub encoder_table_size: u32,
    pub never_index: Vec<String>,
}

impl H2Config {
    pub fn from_profile(profile: &Http2Profile) -> Self {
        Self {
            settings: profile.settings.clone(),
            window_update: profile.window_update,
            pseudo_order: profile.pseudo_order.clone(),
            encoder_table_size: profile.encoder_table_size,
            never_index: profile.never_index.clone(),
        }
    }

    /// Replace the SETTINGS list.
    pub fn with_settings(mut self, settings: H2Settings) -> Self {
        self.settings = settings;
        self
    }
}

impl Default for H2Config {
    fn default() -> Self {
        let mut config = Self::from_profile(&Http2Profile::default());
        config.settings = H2Settings::new(vec![(h2settings::ENABLE_PUSH, 0)]);
        config
    }
}

/// Request head for a single stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct H2Head {
    pub method: String,
    pub scheme: String,
    pub authority: String,
    pub path: String,
    /// Regular headers in emission order.
    pub headers: Vec<(String, String)>,
}

impl H2Head {
    /// The header block fields: pseudo-headers in `pseudo_order`, any
    /// missing pseudo-header after them, then regular headers lowercased
    /// with connection-specific ones removed. A `host` header overrides
    /// `:authority`.
    pub fn fields(&self, pseudo_order: &[PseudoHeader]) -> Vec<(String, String)> {
        let authority = self
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("host"))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.authority.clone());

        let mut order: Vec<PseudoHeader> = pseudo_order.to_vec();
        for p in PseudoHeader::default_order() {
            if !order.contains(&p) {
                order.push(p);
            }
        }

        let mut out = Vec::with_capacity(order.len() + self.headers.len());
        for p in order {
            let value = match p {
                PseudoHeader::Method => self.method.clone(),
                PseudoHeader::Authority => authority.clone(),
                PseudoHeader::Scheme => self.scheme.clone(),
                PseudoHeader::Path => self.path.clone(),
            };
            out.push((p.as_str().to_string(), value));
        }

        for (name, value) in &self.headers {
            let name = name.to_ascii_lowercase();
            if name == "host" || CONNECTION_HEADERS.contains(&name.as_str()) {
                continue;
            }
            if name == "te" && !value.eq_ignore_ascii_case("trailers") {
                continue;
            }
            out.push((name, value.clone()));
        }
        out
    }
}

pub struct H2Connection;

impl H2Connection {
    /// Write the preface, SETTINGS and WINDOW_UPDATE in a single flight and
    /// return the handle together with the driver that must be spawned.
    pub async fn handshake(
        mut stream: BoxedSocket,
        config: H2Config,
    ) -> Result<(H2Handle, H2Driver), NetError> {
        let mut out = BytesMut::with_capacity(64);
        out.extend_from_slice(frame::PREFACE);
        Frame::Settings {
            ack: false,
            settings: config.settings.entries().to_vec(),
        }
        .encode(&mut out);
        if config.window_update > 0 {
            Frame::WindowUpdate {
                stream_id: 0,
                increment: config.window_update,
            }
            .encode(&mut out);
        }
        stream.write_all(&out).await?;
        stream.flush().await?;

        let (rd, wr) = tokio::io::split(stream);
        let (frame_tx, frame_rx) = mpsc::channel(64);
        let reader = tokio::spawn(read_frames(rd, config.settings.max_frame_size(), frame_tx));

        let (command_tx, command_rx) = mpsc::channel(32);
        let (cancel_tx, cancel_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        let local_window = config.settings.initial_window_size();
        let conn_recv_window = DEFAULT_INITIAL_WINDOW_SIZE as i64 + config.window_update as i64;
        let driver = H2Driver {
            writer: wr,
            reader,
            frames: frame_rx,
            commands: command_rx,
            commands_open: true,
            cancel_tx,
            cancel_rx,
            shared: shared.clone(),
            encoder: Encoder::new(config.encoder_table_size as usize, &config.never_index),
            decoder: Decoder::new(config.settings.header_table_size() as usize),
            pseudo_order: config.pseudo_order,
            streams: BTreeMap::new(),
            queue: VecDeque::new(),
            next_stream_id: 1,
            peer_max_concurrent: None,
            peer_initial_window: DEFAULT_INITIAL_WINDOW_SIZE as i64,
            peer_max_frame_size: DEFAULT_MAX_FRAME_SIZE as usize,
            conn_send_window: DEFAULT_INITIAL_WINDOW_SIZE as i64,
            local_stream_window: local_window as i64,
            conn_recv_window,
            conn_recv_available: conn_recv_window,
            conn_recv_unacked: 0,
            continuation: None,
            goaway: None,
        };

        debug!(
            settings = ?config.settings.entries(),
            window_update = config.window_update,
            "HTTP/2 preface sent"
        );
        Ok((
            H2Handle {
                command_tx,
                shared,
            },
            driver,
        ))
    }
}

#[derive(Debug, Default)]
struct Shared {
    closed: AtomicBool,
    goaway: AtomicBool,
}

/// What one stream got as far as on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamFlags {
    /// The HEADERS block went out.
    pub headers_sent: bool,
    /// A HEADERS, DATA or RST_STREAM frame arrived for the stream.
    pub frame_received: bool,
}

type Reply = (StreamFlags, Result<RawResponse, NetError>);

struct Command {
    head: H2Head,
    body: Bytes,
    token: CancellationToken,
    reply: oneshot::Sender<Reply>,
}

impl Command {
    /// Fail a request that never left the queue.
    fn reject(self, error: NetError) {
        let _ = self.reply.send((StreamFlags::default(), Err(error)));
    }
}

/// Handle to a running HTTP/2 connection.
#[derive(Clone)]
pub struct H2Handle {
    command_tx: mpsc::Sender<Command>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for H2Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("H2Handle")
            .field("closed", &self.is_closed())
            .field("open", &self.is_open())
            .finish()
    }
}

impl H2Handle {
    /// Whether new streams may be opened.
    pub fn is_open(&self) -> bool {
        !self.shared.closed.load(Ordering::Acquire)
            && !self.shared.goaway.load(Ordering::Acquire)
            && !self.command_tx.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire) || self.command_tx.is_closed()
    }

    /// Send one request and wait for the full response.
    ///
    /// `flags` is filled from the driver's view of the stream. Cancelling
    /// `cancel`, or dropping the returned future, resets the stream with
    /// RST_STREAM(CANCEL).
    pub async fn send_request(
        &self,
        head: H2Head,
        body: Bytes,
        flags: &mut StreamFlags,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, NetError> {
        if self.is_closed() {
            return Err(NetError::ConnectionClosed);
        }
        let token = cancel.child_token();
        let guard = token.clone().drop_guard();
        let (reply, response) = oneshot::channel();

        let command = Command {
            head,
            body,
            token: token.clone(),
            reply,
        };
        tokio::select! {
            sent = self.command_tx.send(command) => {
                if sent.is_err() {
                    guard.disarm();
                    return Err(NetError::ConnectionClosed);
                }
            }
            _ = token.cancelled() => return Err(NetError::Cancelled),
        }

        let result = tokio::select! {
            res = response => match res {
                Ok((reported, result)) => {
                    *flags = reported;
                    result
                }
                Err(_) => Err(NetError::ConnectionClosed),
            },
            _ = token.cancelled() => {
                // The driver may already have written HEADERS.
                flags.headers_sent = true;
                Err(NetError::Cancelled)
            }
        };
        guard.disarm();
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
}

struct Stream {
    state: StreamState,
    send_window: i64,
    recv_available: i64,
    recv_unacked: u32,
    body: Bytes,
    status: Option<u16>,
    headers: Vec<(String, String)>,
    data: BytesMut,
    flags: StreamFlags,
    reply: Option<oneshot::Sender<Reply>>,
    finished: CancellationToken,
}

impl Stream {
    fn finish(&mut self, result: Result<RawResponse, NetError>) {
        self.finished.cancel();
        if let Some(reply) = self.reply.take() {
            let _ = reply.send((self.flags, result));
        }
    }
}

struct PartialBlock {
    stream_id: u32,
    end_stream: bool,
    push: bool,
    block: BytesMut,
}

/// Owns the socket and all connection state. Run it with `tokio::spawn`.
pub struct H2Driver {
    writer: WriteHalf<BoxedSocket>,
    reader: JoinHandle<()>,
    frames: mpsc::Receiver<Result<Frame, NetError>>,
    commands: mpsc::Receiver<Command>,
    commands_open: bool,
    cancel_tx: mpsc::UnboundedSender<u32>,
    cancel_rx: mpsc::UnboundedReceiver<u32>,
    shared: Arc<Shared>,
    encoder: Encoder,
    decoder: Decoder,
    pseudo_order: Vec<PseudoHeader>,
    streams: BTreeMap<u32, Stream>,
    queue: VecDeque<Command>,
    next_stream_id: u32,
    peer_max_concurrent: Option<u32>,
    peer_initial_window: i64,
    peer_max_frame_size: usize,
    conn_send_window: i64,
    local_stream_window: i64,
    conn_recv_window: i64,
    conn_recv_available: i64,
    conn_recv_unacked: u32,
    continuation: Option<PartialBlock>,
    goaway: Option<(u32, u32)>,
}

/// Why the driver loop stopped.
enum Exit {
    Idle,
    Failed(NetError),
}

async fn read_frame(
    rd: &mut ReadHalf<BoxedSocket>,
    max_frame_size: u32,
) -> Result<Frame, NetError> {
    let mut head = [0u8; FRAME_HEADER_SIZE];
    if let Err(e) = rd.read_exact(&mut head).await {
        return Err(match e.kind() {
            std::io::ErrorKind::UnexpectedEof => NetError::ConnectionClosed,
            _ => e.into(),
        });
    }
    let header = FrameHeader::parse(&head);
    if header.length > max_frame_size {
        return Err(NetError::ProtocolError(format!(
            "frame of {} bytes exceeds SETTINGS_MAX_FRAME_SIZE",
            header.length
        )));
    }
    let mut payload = vec![0u8; header.length as usize];
    rd.read_exact(&mut payload).await?;
    Frame::decode(header, Bytes::from(payload))
}

async fn read_frames(
    mut rd: ReadHalf<BoxedSocket>,
    max_frame_size: u32,
    tx: mpsc::Sender<Result<Frame, NetError>>,
) {
    loop {
        let frame = read_frame(&mut rd, max_frame_size).await;
        let failed = frame.is_err();
        if tx.send(frame).await.is_err() || failed {
            return;
        }
    }
}

impl H2Driver {
    /// Drive the connection until it closes.
    pub async fn run(mut self) {
        let exit = self.serve().await;
        self.shared.closed.store(true, Ordering::Release);

        let error = match exit {
            Exit::Idle => {
                let _ = self.goaway_out(ErrorCode::NO_ERROR).await;
                NetError::ConnectionClosed
            }
            Exit::Failed(e) => e,
        };
        for (_, mut stream) in std::mem::take(&mut self.streams) {
            stream.finish(Err(error.clone()));
        }
        for command in self.queue.drain(..) {
            command.reject(error.clone());
        }
        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            command.reject(NetError::ConnectionClosed);
        }
        self.reader.abort();
        let _ = self.writer.shutdown().await;
        debug!("HTTP/2 connection closed");
    }

    async fn serve(&mut self) -> Exit {
        loop {
            if !self.commands_open && self.streams.is_empty() && self.queue.is_empty() {
                return Exit::Idle;
            }
            if self.goaway.is_some() && self.streams.is_empty() {
                let (code, last) = self.goaway.unwrap_or_default();
                return Exit::Failed(NetError::GoAway {
                    code,
                    last_stream_id: last,
                });
            }

            let mut out = BytesMut::new();
            let step = tokio::select! {
                command = self.commands.recv(), if self.commands_open => {
                    match command {
                        Some(command) => {
                            self.queue.push_back(command);
                            self.open_streams(&mut out)
                        }
                        None => {
                            self.commands_open = false;
                            Ok(())
                        }
                    }
                }
                frame = self.frames.recv() => match frame {
                    Some(Ok(frame)) => self.on_frame(frame, &mut out),
                    Some(Err(e)) => Err(e),
                    None => Err(NetError::ConnectionClosed),
                },
                Some(id) = self.cancel_rx.recv() => {
                    self.cancel_stream(id, &mut out);
                    self.open_streams(&mut out)
                }
            };

            if let Err(e) = step {
                if matches!(
                    e,
                    NetError::ProtocolError(_)
                        | NetError::FlowControlError
                        | NetError::CompressionError(_)
                ) {
                    let code = match e {
                        NetError::FlowControlError => ErrorCode::FLOW_CONTROL_ERROR,
                        NetError::CompressionError(_) => ErrorCode::COMPRESSION_ERROR,
                        _ => ErrorCode::PROTOCOL_ERROR,
                    };
                    warn!(error = %e, "HTTP/2 connection error");
                    let _ = self.flush(&mut out).await;
                    let _ = self.goaway_out(code).await;
                }
                return Exit::Failed(e);
            }
            if let Err(e) = self.flush(&mut out).await {
                return Exit::Failed(e);
            }
        }
    }

    async fn flush(&mut self, out: &mut BytesMut) -> Result<(), NetError> {
        if out.is_empty() {
            return Ok(());
        }
        self.writer.write_all(out).await?;
        self.writer.flush().await?;
        out.clear();
        Ok(())
    }

    async fn goaway_out(&mut self, code: ErrorCode) -> Result<(), NetError> {
        let mut out = BytesMut::new();
        let last_stream_id = self.next_stream_id.saturating_sub(2);
        Frame::GoAway {
            last_stream_id: if self.next_stream_id > 1 { last_stream_id } else { 0 },
            code,
            debug: Bytes::new(),
        }
        .encode(&mut out);
        self.flush(&mut out).await
    }

    fn can_open(&self) -> bool {
        match self.peer_max_concurrent {
            Some(max) => (self.streams.len() as u32) < max,
            None => true,
        }
    }

    /// Start queued requests while the peer's concurrency limit allows.
    fn open_streams(&mut self, out: &mut BytesMut) -> Result<(), NetError> {
        while self.can_open() {
            let Some(command) = self.queue.pop_front() else {
                break;
            };
            if command.token.is_cancelled() || command.reply.is_closed() {
                continue;
            }
            if self.goaway.is_some() || self.next_stream_id > MAX_STREAM_ID {
                command.reject(NetError::Refused);
                continue;
            }
            self.start_stream(command, out);
        }
        self.send_pending_data(out);
        Ok(())
    }

    fn start_stream(&mut self, command: Command, out: &mut BytesMut) {
        let id = self.next_stream_id;
        self.next_stream_id += 2;

        let fields = command.head.fields(&self.pseudo_order);
        let block = self
            .encoder
            .encode(fields.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let end_stream = command.body.is_empty();
        frame::encode_header_block(out, id, &block, end_stream, self.peer_max_frame_size);

        let finished = CancellationToken::new();
        let watcher_done = finished.clone();
        let token = command.token;
        let cancel_tx = self.cancel_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    let _ = cancel_tx.send(id);
                }
                _ = watcher_done.cancelled() => {}
            }
        });

        debug!(stream_id = id, method = %command.head.method, path = %command.head.path, "HTTP/2 stream opened");
        self.streams.insert(
            id,
            Stream {
                state: if end_stream {
                    StreamState::HalfClosedLocal
                } else {
                    StreamState::Open
                },
                send_window: self.peer_initial_window,
                recv_available: self.local_stream_window,
                recv_unacked: 0,
                body: command.body,
                status: None,
                headers: Vec::new(),
                data: BytesMut::new(),
                flags: StreamFlags {
                    headers_sent: true,
                    frame_received: false,
                },
                reply: Some(command.reply),
                finished,
            },
        );
    }

    /// Send request body bytes as far as both windows allow.
    fn send_pending_data(&mut self, out: &mut BytesMut) {
        let max_frame = self.peer_max_frame_size;
        for (&id, stream) in self.streams.iter_mut() {
            while stream.state == StreamState::Open && !stream.body.is_empty() {
                let window = stream.send_window.min(self.conn_send_window);
                if window <= 0 {
                    break;
                }
                let n = stream.body.len().min(window as usize).min(max_frame);
                let chunk = stream.body.split_to(n);
                let end_stream = stream.body.is_empty();
                Frame::Data {
                    stream_id: id,
                    end_stream,
                    data: chunk,
                    flow_len: n as u32,
                }
                .encode(out);
                stream.send_window -= n as i64;
                self.conn_send_window -= n as i64;
                if end_stream {
                    stream.state = StreamState::HalfClosedLocal;
                }
            }
        }
    }

    fn cancel_stream(&mut self, id: u32, out: &mut BytesMut) {
        if let Some(mut stream) = self.streams.remove(&id) {
            debug!(stream_id = id, "HTTP/2 stream cancelled");
            Frame::RstStream {
                stream_id: id,
                code: ErrorCode::CANCEL,
            }
            .encode(out);
            stream.finish(Err(NetError::Cancelled));
        }
    }

    fn on_frame(&mut self, frame: Frame, out: &mut BytesMut) -> Result<(), NetError> {
        if let Some(partial) = &self.continuation {
            let continues = matches!(&frame, Frame::Continuation { stream_id, .. } if *stream_id == partial.stream_id);
            if !continues {
                return Err(NetError::ProtocolError(
                    "expected CONTINUATION frame".into(),
                ));
            }
        }

        match frame {
            Frame::Settings { ack: true, .. } => {
                debug!("HTTP/2 SETTINGS acknowledged by peer");
            }
            Frame::Settings {
                ack: false,
                settings,
            } => {
                self.apply_settings(&settings)?;
                Frame::Settings {
                    ack: true,
                    settings: Vec::new(),
                }
                .encode(out);
                self.open_streams(out)?;
            }
            Frame::Ping { ack: false, data } => {
                Frame::Ping { ack: true, data }.encode(out);
            }
            Frame::Ping { ack: true, .. } => {}
            Frame::WindowUpdate {
                stream_id,
                increment,
            } => {
                if increment == 0 {
                    return Err(NetError::ProtocolError(
                        "WINDOW_UPDATE with zero increment".into(),
                    ));
                }
                if stream_id == 0 {
                    self.conn_send_window += increment as i64;
                    if self.conn_send_window > MAX_WINDOW_SIZE as i64 {
                        return Err(NetError::FlowControlError);
                    }
                } else if let Some(stream) = self.streams.get_mut(&stream_id) {
                    stream.send_window += increment as i64;
                    if stream.send_window > MAX_WINDOW_SIZE as i64 {
                        Frame::RstStream {
                            stream_id,
                            code: ErrorCode::FLOW_CONTROL_ERROR,
                        }
                        .encode(out);
                        self.close_stream(stream_id, Err(NetError::FlowControlError));
                    }
                }
                self.send_pending_data(out);
            }
            Frame::Headers {
                stream_id,
                end_stream,
                end_headers,
                block,
                ..
            } => {
                let partial = PartialBlock {
                    stream_id,
                    end_stream,
                    push: false,
                    block: BytesMut::from(&block[..]),
                };
                if end_headers {
                    self.on_header_block(partial, out)?;
                } else {
                    self.continuation = Some(partial);
                }
            }
            Frame::PushPromise {
                stream_id,
                promised_id,
                end_headers,
                block,
            } => {
                Frame::RstStream {
                    stream_id: promised_id,
                    code: ErrorCode::REFUSED_STREAM,
                }
                .encode(out);
                let partial = PartialBlock {
                    stream_id,
                    end_stream: false,
                    push: true,
                    block: BytesMut::from(&block[..]),
                };
                if end_headers {
                    self.on_header_block(partial, out)?;
                } else {
                    self.continuation = Some(partial);
                }
            }
            Frame::Continuation {
                end_headers, block, ..
            } => {
                let Some(mut partial) = self.continuation.take() else {
                    return Err(NetError::ProtocolError(
                        "CONTINUATION without HEADERS".into(),
                    ));
                };
                partial.block.extend_from_slice(&block);
                if end_headers {
                    self.on_header_block(partial, out)?;
                } else {
                    self.continuation = Some(partial);
                }
            }
            Frame::Data {
                stream_id,
                end_stream,
                data,
                flow_len,
            } => self.on_data(stream_id, end_stream, data, flow_len, out)?,
            Frame::RstStream { stream_id, code } => {
                debug!(stream_id, code = code.0, "HTTP/2 stream reset by peer");
                if let Some(stream) = self.streams.get_mut(&stream_id) {
                    stream.flags.frame_received = true;
                }
                let error = if code == ErrorCode::REFUSED_STREAM {
                    NetError::Refused
                } else {
                    NetError::StreamReset { code: code.0 }
                };
                self.close_stream(stream_id, Err(error));
                self.open_streams(out)?;
            }
            Frame::GoAway {
                last_stream_id,
                code,
                ..
            } => self.on_goaway(last_stream_id, code.0),
            Frame::Priority { .. } | Frame::Unknown { .. } => {}
        }
        Ok(())
    }

    fn apply_settings(&mut self, settings: &[(u16, u32)]) -> Result<(), NetError> {
        for &(id, value) in settings {
            match id {
                h2settings::HEADER_TABLE_SIZE => self.encoder.set_peer_table_size(value as usize),
                h2settings::ENABLE_PUSH if value > 1 => {
                    return Err(NetError::ProtocolError("invalid ENABLE_PUSH".into()));
                }
                h2settings::MAX_CONCURRENT_STREAMS => self.peer_max_concurrent = Some(value),
                h2settings::INITIAL_WINDOW_SIZE => {
                    if value > MAX_WINDOW_SIZE {
                        return Err(NetError::FlowControlError);
                    }
                    let delta = value as i64 - self.peer_initial_window;
                    self.peer_initial_window = value as i64;
                    for stream in self.streams.values_mut() {
                        stream.send_window += delta;
                    }
                }
                h2settings::MAX_FRAME_SIZE => {
                    if !(DEFAULT_MAX_FRAME_SIZE..=MAX_ALLOWED_FRAME_SIZE).contains(&value) {
                        return Err(NetError::ProtocolError("invalid MAX_FRAME_SIZE".into()));
                    }
                    self.peer_max_frame_size = value as usize;
                }
                _ => {}
            }
        }
        debug!(settings = ?settings, "HTTP/2 peer SETTINGS applied");
        Ok(())
    }

    fn on_header_block(&mut self, partial: PartialBlock, out: &mut BytesMut) -> Result<(), NetError> {
        // Always decode so the HPACK state stays in step with the peer.
        let fields = self.decoder.decode(&partial.block)?;
        if partial.push {
            return Ok(());
        }
        let id = partial.stream_id;
        let Some(stream) = self.streams.get_mut(&id) else {
            return Ok(());
        };
        stream.flags.frame_received = true;

        if stream.status.is_none() {
            let status = fields
                .iter()
                .find(|(k, _)| k == ":status")
                .and_then(|(_, v)| v.parse::<u16>().ok());
            let Some(status) = status else {
                Frame::RstStream {
                    stream_id: id,
                    code: ErrorCode::PROTOCOL_ERROR,
                }
                .encode(out);
                self.close_stream(
                    id,
                    Err(NetError::ProtocolError("response without :status".into())),
                );
                return self.open_streams(out);
            };
            if (100..200).contains(&status) {
                return Ok(());
            }
            stream.status = Some(status);
        }
        stream
            .headers
            .extend(fields.into_iter().filter(|(k, _)| !k.starts_with(':')));

        if partial.end_stream {
            self.remote_closed(id, out)?;
        }
        Ok(())
    }

    fn on_data(
        &mut self,
        stream_id: u32,
        end_stream: bool,
        data: Bytes,
        flow_len: u32,
        out: &mut BytesMut,
    ) -> Result<(), NetError> {
        self.conn_recv_available -= flow_len as i64;
        if self.conn_recv_available < 0 {
            return Err(NetError::FlowControlError);
        }
        self.conn_recv_unacked += flow_len;
        if self.conn_recv_unacked as i64 >= self.conn_recv_window / 2 {
            Frame::WindowUpdate {
                stream_id: 0,
                increment: self.conn_recv_unacked,
            }
            .encode(out);
            self.conn_recv_available += self.conn_recv_unacked as i64;
            self.conn_recv_unacked = 0;
        }

        let half = self.local_stream_window / 2;
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return Ok(());
        };
        stream.flags.frame_received = true;
        if stream.status.is_none() {
            return Err(NetError::ProtocolError("DATA before response HEADERS".into()));
        }
        stream.recv_available -= flow_len as i64;
        if stream.recv_available < 0 {
            Frame::RstStream {
                stream_id,
                code: ErrorCode::FLOW_CONTROL_ERROR,
            }
            .encode(out);
            self.close_stream(stream_id, Err(NetError::FlowControlError));
            return self.open_streams(out);
        }
        stream.data.extend_from_slice(&data);
        stream.recv_unacked += flow_len;

        if end_stream {
            return self.remote_closed(stream_id, out);
        }
        if stream.recv_unacked as i64 >= half {
            Frame::WindowUpdate {
                stream_id,
                increment: stream.recv_unacked,
            }
            .encode(out);
            stream.recv_available += stream.recv_unacked as i64;
            stream.recv_unacked = 0;
        }
        Ok(())
    }

    /// The peer sent END_STREAM.
    fn remote_closed(&mut self, id: u32, out: &mut BytesMut) -> Result<(), NetError> {
        let Some(stream) = self.streams.get_mut(&id) else {
            return Ok(());
        };
        if stream.state == StreamState::Open {
            // Response finished before the upload did.
            stream.state = StreamState::HalfClosedRemote;
            Frame::RstStream {
                stream_id: id,
                code: ErrorCode::NO_ERROR,
            }
            .encode(out);
        }
        let Some(mut stream) = self.streams.remove(&id) else {
            return Ok(());
        };
        let status = stream.status.unwrap_or_default();
        let response = RawResponse::new(
            status,
            http::Version::HTTP_2,
            std::mem::take(&mut stream.headers),
            stream.data.split().freeze(),
        );
        debug!(stream_id = id, status, "HTTP/2 stream complete");
        stream.finish(Ok(response));
        self.open_streams(out)
    }

    fn close_stream(&mut self, id: u32, result: Result<RawResponse, NetError>) {
        if let Some(mut stream) = self.streams.remove(&id) {
            stream.finish(result);
        }
    }

    fn on_goaway(&mut self, last_stream_id: u32, code: u32) {
        debug!(last_stream_id, code, "HTTP/2 GOAWAY received");
        self.goaway = Some((code, last_stream_id));
        self.shared.goaway.store(true, Ordering::Release);

        let refused: Vec<u32> = self
            .streams
            .range(last_stream_id.saturating_add(1)..)
            .map(|(id, _)| *id)
            .collect();
        for id in refused {
            self.close_stream(id, Err(NetError::Refused));
        }
        for command in self.queue.drain(..) {
            command.reject(NetError::Refused);
        }
    }
}
