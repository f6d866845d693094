//! HTTP/1.1 framing over a single exclusive connection.

use crate::base::neterror::NetError;
use crate::http::response::RawResponse;
use crate::socket::stream::BoxedSocket;
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

const MAX_HEAD_SIZE: usize = 64 * 1024;
const MAX_HEADERS: usize = 128;

/// Request line plus headers, in the exact order they go on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct H1Head {
    pub method: String,
    /// Origin-form target: path and query.
    pub target: String,
    pub headers: Vec<(String, String)>,
}

impl H1Head {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn is_chunked(&self) -> bool {
        self.header("transfer-encoding")
            .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
    }

    /// Serialize the head and body.
    pub fn encode(&self, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(256 + body.len());
        out.extend_from_slice(self.method.as_bytes());
        out.push(b' ');
        out.extend_from_slice(self.target.as_bytes());
        out.extend_from_slice(b" HTTP/1.1\r\n");
        for (name, value) in &self.headers {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        let chunked = self.is_chunked();
        if !chunked && self.header("content-length").is_none() {
            let wants_length = !body.is_empty()
                || matches!(self.method.as_str(), "POST" | "PUT" | "PATCH");
            if wants_length {
                out.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
            }
        }
        out.extend_from_slice(b"\r\n");

        if chunked {
            if !body.is_empty() {
                out.extend_from_slice(format!("{:x}\r\n", body.len()).as_bytes());
                out.extend_from_slice(body);
                out.extend_from_slice(b"\r\n");
            }
            out.extend_from_slice(b"0\r\n\r\n");
        } else {
            out.extend_from_slice(body);
        }
        out
    }
}

/// What happened on the wire, for the retry decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub request_written: bool,
    pub response_started: bool,
}

/// An exclusive HTTP/1.1 connection.
#[derive(Debug)]
pub struct H1Connection {
    stream: BoxedSocket,
    buf: BytesMut,
    reusable: bool,
}

struct Head {
    status: u16,
    reason: String,
    version: http::Version,
    headers: Vec<(String, String)>,
}

impl Head {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn has_token(&self, name: &str, token: &str) -> bool {
        self.headers
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .any(|(_, v)| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
    }
}

impl H1Connection {
    pub fn new(stream: BoxedSocket) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(8 * 1024),
            reusable: true,
        }
    }

    /// Whether another request may follow on this connection.
    pub fn is_reusable(&self) -> bool {
        self.reusable
    }

    pub async fn send_request(
        &mut self,
        head: &H1Head,
        body: &Bytes,
        progress: &mut Progress,
    ) -> Result<RawResponse, NetError> {
        // A failed request leaves the framing unknown.
        self.reusable = false;

        let wire = head.encode(body);
        self.stream.write_all(&wire).await?;
        self.stream.flush().await?;
        progress.request_written = true;
        debug!(method = %head.method, target = %head.target, bytes = wire.len(), "HTTP/1.1 request written");

        let response_head = loop {
            let parsed = self.read_head(progress).await?;
            // 101 ends HTTP/1.1 on this socket; other 1xx are interim.
            if (100..200).contains(&parsed.status) && parsed.status != 101 {
                continue;
            }
            break parsed;
        };

        let no_body = head.method.eq_ignore_ascii_case("HEAD")
            || matches!(response_head.status, 204 | 304)
            || (100..200).contains(&response_head.status);

        let mut keep_alive = match response_head.version {
            http::Version::HTTP_10 => response_head.has_token("connection", "keep-alive"),
            _ => !response_head.has_token("connection", "close"),
        };

        let body = if no_body {
            Bytes::new()
        } else if response_head.has_token("transfer-encoding", "chunked") {
            self.read_chunked().await?
        } else if let Some(len) = response_head.header("content-length") {
            let len: usize = len.trim().parse().map_err(|_| {
                NetError::HeaderParseError(format!("invalid Content-Length {:?}", len))
            })?;
            self.read_exact(len).await?
        } else {
            keep_alive = false;
            self.read_to_end().await?
        };

        self.reusable = keep_alive && response_head.status != 101;
        let mut response = RawResponse::new(
            response_head.status,
            response_head.version,
            response_head.headers,
            body,
        );
        if !response_head.reason.is_empty() {
            response.reason = response_head.reason;
        }
        Ok(response)
    }

    async fn fill(&mut self) -> Result<usize, NetError> {
        Ok(self.stream.read_buf(&mut self.buf).await?)
    }

    async fn read_head(&mut self, progress: &mut Progress) -> Result<Head, NetError> {
        loop {
            if !self.buf.is_empty() {
                progress.response_started = true;
                let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
                let mut res = httparse::Response::new(&mut headers);
                match res.parse(&self.buf) {
                    Ok(httparse::Status::Complete(len)) => {
                        let head = Head {
                            status: res.code.unwrap_or_default(),
                            reason: res.reason.unwrap_or_default().to_string(),
                            version: if res.version == Some(0) {
                                http::Version::HTTP_10
                            } else {
                                http::Version::HTTP_11
                            },
                            headers: res
                                .headers
                                .iter()
                                .map(|h| {
                                    (
                                        h.name.to_string(),
                                        String::from_utf8_lossy(h.value).into_owned(),
                                    )
                                })
                                .collect(),
                        };
                        self.buf.advance(len);
                        return Ok(head);
                    }
                    Ok(httparse::Status::Partial) => {
                        if self.buf.len() > MAX_HEAD_SIZE {
                            return Err(NetError::HeaderParseError(
                                "response head too large".into(),
                            ));
                        }
                    }
                    Err(e @ (httparse::Error::Status | httparse::Error::Version)) => {
                        let line = self.buf[..].split(|b| *b == b'\n').next().unwrap_or_default();
                        return Err(NetError::BadStatusLine(format!(
                            "{}: {:?}",
                            e,
                            String::from_utf8_lossy(line).trim_end()
                        )));
                    }
                    Err(e) => return Err(NetError::HeaderParseError(e.to_string())),
                }
            }
            if self.fill().await? == 0 {
                return Err(NetError::UnexpectedEof);
            }
        }
    }

    async fn read_exact(&mut self, len: usize) -> Result<Bytes, NetError> {
        while self.buf.len() < len {
            if self.fill().await? == 0 {
                return Err(NetError::UnexpectedEof);
            }
        }
        Ok(self.buf.split_to(len).freeze())
    }

    async fn read_to_end(&mut self) -> Result<Bytes, NetError> {
        while self.fill().await? > 0 {}
        Ok(self.buf.split().freeze())
    }

    async fn read_line(&mut self) -> Result<BytesMut, NetError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let mut line = self.buf.split_to(pos + 1);
                line.truncate(pos);
                if line.last() == Some(&b'\r') {
                    line.truncate(pos - 1);
                }
                return Ok(line);
            }
            if self.buf.len() > MAX_HEAD_SIZE {
                return Err(NetError::InvalidChunkedEncoding);
            }
            if self.fill().await? == 0 {
                return Err(NetError::UnexpectedEof);
            }
        }
    }

    async fn read_chunked(&mut self) -> Result<Bytes, NetError> {
        let mut body = BytesMut::new();
        loop {
            let line = self.read_line().await?;
            let line = std::str::from_utf8(&line).map_err(|_| NetError::InvalidChunkedEncoding)?;
            let size = line.split(';').next().unwrap_or_default().trim();
            let size =
                usize::from_str_radix(size, 16).map_err(|_| NetError::InvalidChunkedEncoding)?;
            if size == 0 {
                // Trailers end at an empty line.
                while !self.read_line().await?.is_empty() {}
                return Ok(body.freeze());
            }
            body.extend_from_slice(&self.read_exact(size).await?);
            if !self.read_line().await?.is_empty() {
                return Err(NetError::InvalidChunkedEncoding);
            }
        }
    }
}
