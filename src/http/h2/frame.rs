//! HTTP/2 frame layout (RFC 7540 §4 and §6).

use crate::base::neterror::NetError;
use crate::http::h2settings::H2Settings;
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const FRAME_HEADER_SIZE: usize = 9;

/// Client connection preface.
pub const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Headers,
    Priority,
    RstStream,
    Settings,
    PushPromise,
    Ping,
    GoAway,
    WindowUpdate,
    Continuation,
    Unknown(u8),
}

impl From<u8> for FrameType {
    fn from(v: u8) -> Self {
        match v {
            0x0 => Self::Data,
            0x1 => Self::Headers,
            0x2 => Self::Priority,
            0x3 => Self::RstStream,
            0x4 => Self::Settings,
            0x5 => Self::PushPromise,
            0x6 => Self::Ping,
            0x7 => Self::GoAway,
            0x8 => Self::WindowUpdate,
            0x9 => Self::Continuation,
            other => Self::Unknown(other),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        match ft {
            FrameType::Data => 0x0,
            FrameType::Headers => 0x1,
            FrameType::Priority => 0x2,
            FrameType::RstStream => 0x3,
            FrameType::Settings => 0x4,
            FrameType::PushPromise => 0x5,
            FrameType::Ping => 0x6,
            FrameType::GoAway => 0x7,
            FrameType::WindowUpdate => 0x8,
            FrameType::Continuation => 0x9,
            FrameType::Unknown(v) => v,
        }
    }
}

pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// RFC 7540 §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode(pub u32);

impl ErrorCode {
    pub const NO_ERROR: ErrorCode = ErrorCode(0x0);
    pub const PROTOCOL_ERROR: ErrorCode = ErrorCode(0x1);
    pub const INTERNAL_ERROR: ErrorCode = ErrorCode(0x2);
    pub const FLOW_CONTROL_ERROR: ErrorCode = ErrorCode(0x3);
    pub const SETTINGS_TIMEOUT: ErrorCode = ErrorCode(0x4);
    pub const STREAM_CLOSED: ErrorCode = ErrorCode(0x5);
    pub const FRAME_SIZE_ERROR: ErrorCode = ErrorCode(0x6);
    pub const REFUSED_STREAM: ErrorCode = ErrorCode(0x7);
    pub const CANCEL: ErrorCode = ErrorCode(0x8);
    pub const COMPRESSION_ERROR: ErrorCode = ErrorCode(0x9);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub frame_type: FrameType,
    pub flags: u8,
    pub stream_id: u32,
}

impl FrameHeader {
    pub fn parse(buf: &[u8; FRAME_HEADER_SIZE]) -> Self {
        let length = ((buf[0] as u32) << 16) | ((buf[1] as u32) << 8) | buf[2] as u32;
        let stream_id = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) & 0x7fff_ffff;
        Self {
            length,
            frame_type: FrameType::from(buf[3]),
            flags: buf[4],
            stream_id,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8((self.length >> 16) as u8);
        buf.put_u8((self.length >> 8) as u8);
        buf.put_u8(self.length as u8);
        buf.put_u8(self.frame_type.into());
        buf.put_u8(self.flags);
        buf.put_u32(self.stream_id & 0x7fff_ffff);
    }

    pub fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Priority {
    pub exclusive: bool,
    pub dependency: u32,
    pub weight: u8,
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data {
        stream_id: u32,
        end_stream: bool,
        data: Bytes,
        /// Full payload length, padding included; this is what flow control counts.
        flow_len: u32,
    },
    Headers {
        stream_id: u32,
        end_stream: bool,
        end_headers: bool,
        priority: Option<Priority>,
        block: Bytes,
    },
    Priority {
        stream_id: u32,
        priority: Priority,
    },
    RstStream {
        stream_id: u32,
        code: ErrorCode,
    },
    Settings {
        ack: bool,
        settings: Vec<(u16, u32)>,
    },
    PushPromise {
        stream_id: u32,
        promised_id: u32,
        end_headers: bool,
        block: Bytes,
    },
    Ping {
        ack: bool,
        data: [u8; 8],
    },
    GoAway {
        last_stream_id: u32,
        code: ErrorCode,
        debug: Bytes,
    },
    WindowUpdate {
        stream_id: u32,
        increment: u32,
    },
    Continuation {
        stream_id: u32,
        end_headers: bool,
        block: Bytes,
    },
    Unknown {
        kind: u8,
        stream_id: u32,
    },
}

fn protocol(msg: &str) -> NetError {
    NetError::ProtocolError(msg.to_string())
}

fn strip_padding(header: &FrameHeader, payload: &mut Bytes) -> Result<(), NetError> {
    if !header.has(flags::PADDED) {
        return Ok(());
    }
    if payload.is_empty() {
        return Err(protocol("padded frame without pad length"));
    }
    let pad = payload.get_u8() as usize;
    if pad > payload.len() {
        return Err(protocol("padding exceeds payload"));
    }
    payload.truncate(payload.len() - pad);
    Ok(())
}

fn read_priority(payload: &mut Bytes) -> Result<Priority, NetError> {
    if payload.len() < 5 {
        return Err(protocol("short priority block"));
    }
    let dep = payload.get_u32();
    Ok(Priority {
        exclusive: dep & 0x8000_0000 != 0,
        dependency: dep & 0x7fff_ffff,
        weight: payload.get_u8(),
    })
}

impl Frame {
    /// Decode a frame from its header and payload.
    pub fn decode(header: FrameHeader, mut payload: Bytes) -> Result<Frame, NetError> {
        let sid = header.stream_id;
        let frame = match header.frame_type {
            FrameType::Data => {
                if sid == 0 {
                    return Err(protocol("DATA on stream 0"));
                }
                let flow_len = payload.len() as u32;
                strip_padding(&header, &mut payload)?;
                Frame::Data {
                    stream_id: sid,
                    end_stream: header.has(flags::END_STREAM),
                    data: payload,
                    flow_len,
                }
            }
            FrameType::Headers => {
                if sid == 0 {
                    return Err(protocol("HEADERS on stream 0"));
                }
                strip_padding(&header, &mut payload)?;
                let priority = if header.has(flags::PRIORITY) {
                    Some(read_priority(&mut payload)?)
                } else {
                    None
                };
                Frame::Headers {
                    stream_id: sid,
                    end_stream: header.has(flags::END_STREAM),
                    end_headers: header.has(flags::END_HEADERS),
                    priority,
                    block: payload,
                }
            }
            FrameType::Priority => {
                if sid == 0 || payload.len() != 5 {
                    return Err(protocol("malformed PRIORITY"));
                }
                Frame::Priority {
                    stream_id: sid,
                    priority: read_priority(&mut payload)?,
                }
            }
            FrameType::RstStream => {
                if sid == 0 || payload.len() != 4 {
                    return Err(protocol("malformed RST_STREAM"));
                }
                Frame::RstStream {
                    stream_id: sid,
                    code: ErrorCode(payload.get_u32()),
                }
            }
            FrameType::Settings => {
                if sid != 0 {
                    return Err(protocol("SETTINGS on a stream"));
                }
                let ack = header.has(flags::ACK);
                if ack && !payload.is_empty() {
                    return Err(NetError::ProtocolError("SETTINGS ACK with payload".into()));
                }
                if payload.len() % 6 != 0 {
                    return Err(protocol("SETTINGS length not a multiple of 6"));
                }
                let mut settings = Vec::with_capacity(payload.len() / 6);
                while payload.has_remaining() {
                    settings.push((payload.get_u16(), payload.get_u32()));
                }
                Frame::Settings { ack, settings }
            }
            FrameType::PushPromise => {
                strip_padding(&header, &mut payload)?;
                if payload.len() < 4 {
                    return Err(protocol("short PUSH_PROMISE"));
                }
                Frame::PushPromise {
                    stream_id: sid,
                    promised_id: payload.get_u32() & 0x7fff_ffff,
                    end_headers: header.has(flags::END_HEADERS),
                    block: payload,
                }
            }
            FrameType::Ping => {
                if sid != 0 || payload.len() != 8 {
                    return Err(protocol("malformed PING"));
                }
                let mut data = [0u8; 8];
                payload.copy_to_slice(&mut data);
                Frame::Ping {
                    ack: header.has(flags::ACK),
                    data,
                }
            }
            FrameType::GoAway => {
                if sid != 0 || payload.len() < 8 {
                    return Err(protocol("malformed GOAWAY"));
                }
                Frame::GoAway {
                    last_stream_id: payload.get_u32() & 0x7fff_ffff,
                    code: ErrorCode(payload.get_u32()),
                    debug: payload,
                }
            }
            FrameType::WindowUpdate => {
                if payload.len() != 4 {
                    return Err(protocol("malformed WINDOW_UPDATE"));
                }
                Frame::WindowUpdate {
                    stream_id: sid,
                    increment: payload.get_u32() & 0x7fff_ffff,
                }
            }
            FrameType::Continuation => Frame::Continuation {
                stream_id: sid,
                end_headers: header.has(flags::END_HEADERS),
                block: payload,
            },
            FrameType::Unknown(kind) => Frame::Unknown {
                kind,
                stream_id: sid,
            },
        };
        Ok(frame)
    }

    /// Append the wire form of this frame to `buf`. Outgoing frames are
    /// never padded.
    pub fn encode(&self, buf: &mut BytesMut) {
        let (frame_type, flags, stream_id, payload): (FrameType, u8, u32, BytesMut) = match self {
            Frame::Data {
                stream_id,
                end_stream,
                data,
                ..
            } => (
                FrameType::Data,
                if *end_stream { flags::END_STREAM } else { 0 },
                *stream_id,
                BytesMut::from(&data[..]),
            ),
            Frame::Headers {
                stream_id,
                end_stream,
                end_headers,
                priority,
                block,
            } => {
                let mut p = BytesMut::with_capacity(block.len() + 5);
                let mut f = 0;
                if *end_stream {
                    f |= flags::END_STREAM;
                }
                if *end_headers {
                    f |= flags::END_HEADERS;
                }
                if let Some(pr) = priority {
                    f |= flags::PRIORITY;
                    put_priority(&mut p, pr);
                }
                p.extend_from_slice(block);
                (FrameType::Headers, f, *stream_id, p)
            }
            Frame::Priority {
                stream_id,
                priority,
            } => {
                let mut p = BytesMut::with_capacity(5);
                put_priority(&mut p, priority);
                (FrameType::Priority, 0, *stream_id, p)
            }
            Frame::RstStream { stream_id, code } => {
                let mut p = BytesMut::with_capacity(4);
                p.put_u32(code.0);
                (FrameType::RstStream, 0, *stream_id, p)
            }
            Frame::Settings { ack, settings } => {
                let payload = H2Settings::new(settings.clone()).payload();
                (
                    FrameType::Settings,
                    if *ack { flags::ACK } else { 0 },
                    0,
                    BytesMut::from(&payload[..]),
                )
            }
            Frame::PushPromise {
                stream_id,
                promised_id,
                end_headers,
                block,
            } => {
                let mut p = BytesMut::with_capacity(block.len() + 4);
                p.put_u32(*promised_id & 0x7fff_ffff);
                p.extend_from_slice(block);
                (
                    FrameType::PushPromise,
                    if *end_headers { flags::END_HEADERS } else { 0 },
                    *stream_id,
                    p,
                )
            }
            Frame::Ping { ack, data } => (
                FrameType::Ping,
                if *ack { flags::ACK } else { 0 },
                0,
                BytesMut::from(&data[..]),
            ),
            Frame::GoAway {
                last_stream_id,
                code,
                debug,
            } => {
                let mut p = BytesMut::with_capacity(8 + debug.len());
                p.put_u32(*last_stream_id & 0x7fff_ffff);
                p.put_u32(code.0);
                p.extend_from_slice(debug);
                (FrameType::GoAway, 0, 0, p)
            }
            Frame::WindowUpdate {
                stream_id,
                increment,
            } => {
                let mut p = BytesMut::with_capacity(4);
                p.put_u32(*increment & 0x7fff_ffff);
                (FrameType::WindowUpdate, 0, *stream_id, p)
            }
            Frame::Continuation {
                stream_id,
                end_headers,
                block,
            } => (
                FrameType::Continuation,
                if *end_headers { flags::END_HEADERS } else { 0 },
                *stream_id,
                BytesMut::from(&block[..]),
            ),
            Frame::Unknown { kind, stream_id } => {
                (FrameType::Unknown(*kind), 0, *stream_id, BytesMut::new())
            }
        };

        FrameHeader {
            length: payload.len() as u32,
            frame_type,
            flags,
            stream_id,
        }
        .encode(buf);
        buf.extend_from_slice(&payload);
    }
}

fn put_priority(p: &mut BytesMut, pr: &Priority) {
    let mut dep = pr.dependency & 0x7fff_ffff;
    if pr.exclusive {
        dep |= 0x8000_0000;
    }
    p.put_u32(dep);
    p.put_u8(pr.weight);
}

/// Split a header block into HEADERS plus CONTINUATION frames no larger
/// than `max_frame_size`.
pub fn encode_header_block(
    buf: &mut BytesMut,
    stream_id: u32,
    block: &[u8],
    end_stream: bool,
    max_frame_size: usize,
) {
    let max = max_frame_size.max(1);
    let mut chunks = block.chunks(max).peekable();
    let first = chunks.next().unwrap_or(&[]);
    Frame::Headers {
        stream_id,
        end_stream,
        end_headers: chunks.peek().is_none(),
        priority: None,
        block: Bytes::copy_from_slice(first),
    }
    .encode(buf);
    while let Some(chunk) = chunks.next() {
        Frame::Continuation {
            stream_id,
            end_headers: chunks.peek().is_none(),
            block: Bytes::copy_from_slice(chunk),
        }
        .encode(buf);
    }
}
