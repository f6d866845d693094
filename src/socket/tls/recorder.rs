//! First-flight capture for TLS connections.
//!
//! [`RecordingStream`] sits between BoringSSL and the socket. It holds the
//! first TLS record written (the ClientHello) until an [`Inspector`] has
//! looked at it, then forwards it and passes every later byte through
//! untouched. An inspector that returns [`Verdict::Block`] keeps the
//! record from ever reaching the wire.

use crate::socket::tls::ja3::record_len;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Upper bound on a buffered first record before inspection is abandoned.
const MAX_RECORD: usize = 5 + 16_384 + 2048;

/// Result of inspecting the first flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Forward,
    Block(String),
}

pub type Inspector = Box<dyn FnOnce(&[u8]) -> Verdict + Send + Sync>;

/// What the recorder saw, shared with the caller driving the handshake.
#[derive(Debug, Default)]
pub struct Capture {
    hello: OnceLock<Vec<u8>>,
    blocked: OnceLock<String>,
}

impl Capture {
    /// The first record written, once it has been seen.
    pub fn hello(&self) -> Option<&[u8]> {
        self.hello.get().map(Vec::as_slice)
    }

    /// The reason the flight was held back, if it was.
    pub fn blocked(&self) -> Option<&str> {
        self.blocked.get().map(String::as_str)
    }
}

enum State {
    Inspecting(Vec<u8>),
    Draining { buf: Vec<u8>, pos: usize },
    Passthrough,
    Blocked,
}

pub struct RecordingStream<S> {
    inner: S,
    state: State,
    inspector: Option<Inspector>,
    capture: Arc<Capture>,
}

impl<S> RecordingStream<S> {
    pub fn new(inner: S, inspector: Option<Inspector>) -> Self {
        Self {
            inner,
            state: State::Inspecting(Vec::new()),
            inspector,
            capture: Arc::new(Capture::default()),
        }
    }

    pub fn capture(&self) -> Arc<Capture> {
        self.capture.clone()
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncWrite + Unpin> RecordingStream<S> {
    /// Inspect the buffered record once it is complete.
    fn settle(&mut self) -> io::Result<()> {
        let State::Inspecting(pending) = &mut self.state else {
            return Ok(());
        };

        let complete = match record_len(pending) {
            Some(_) if pending[0] != 0x16 => true,
            Some(len) => pending.len() >= len || pending.len() >= MAX_RECORD,
            None => false,
        };
        if !complete {
            return Ok(());
        }

        let buf = std::mem::take(pending);
        let len = record_len(&buf).unwrap_or(buf.len()).min(buf.len());
        let record = &buf[..len];
        let _ = self.capture.hello.set(record.to_vec());

        let verdict = match self.inspector.take() {
            Some(inspect) => inspect(record),
            None => Verdict::Forward,
        };
        match verdict {
            Verdict::Forward => {
                self.state = State::Draining { buf, pos: 0 };
                Ok(())
            }
            Verdict::Block(reason) => {
                let _ = self.capture.blocked.set(reason.clone());
                self.state = State::Blocked;
                Err(io::Error::new(io::ErrorKind::PermissionDenied, reason))
            }
        }
    }

    /// Flush held bytes to the socket.
    fn poll_drain(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        loop {
            match &mut self.state {
                State::Draining { buf, pos } => {
                    if *pos >= buf.len() {
                        self.state = State::Passthrough;
                        continue;
                    }
                    let n = match Pin::new(&mut self.inner).poll_write(cx, &buf[*pos..]) {
                        Poll::Ready(Ok(n)) => n,
                        Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                        Poll::Pending => return Poll::Pending,
                    };
                    if n == 0 {
                        return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
                    }
                    *pos += n;
                }
                State::Blocked => {
                    let reason = self.capture.blocked().unwrap_or("blocked").to_string();
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::PermissionDenied,
                        reason,
                    )));
                }
                State::Inspecting(_) | State::Passthrough => return Poll::Ready(Ok(())),
            }
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for RecordingStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = &mut *self;
        if let State::Inspecting(pending) = &mut this.state {
            pending.extend_from_slice(data);
            this.settle()?;
            // Bytes are accepted even if the socket is not ready yet; the
            // drain resumes on the next write, flush or read.
            if let Poll::Ready(Err(e)) = this.poll_drain(cx) {
                return Poll::Ready(Err(e));
            }
            return Poll::Ready(Ok(data.len()));
        }

        match this.poll_drain(cx) {
            Poll::Ready(Ok(())) => Pin::new(&mut this.inner).poll_write(cx, data),
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = &mut *self;
        match this.poll_drain(cx) {
            Poll::Ready(Ok(())) => Pin::new(&mut this.inner).poll_flush(cx),
            other => other,
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for RecordingStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        match this.poll_drain(cx) {
            Poll::Ready(Ok(())) => Pin::new(&mut this.inner).poll_read(cx, buf),
            Poll::Ready(Err(e)) => Poll::Ready(Err(e)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn record(body: &[u8]) -> Vec<u8> {
        let mut r = vec![0x16, 0x03, 0x01];
        r.extend_from_slice(&(body.len() as u16).to_be_bytes());
        r.extend_from_slice(body);
        r
    }

    #[tokio::test]
    async fn test_forwards_after_inspection() {
        let (client, mut server) = tokio::io::duplex(4096);
        let seen = Arc::new(OnceLock::new());
        let seen2 = seen.clone();
        let inspector: Inspector = Box::new(move |r: &[u8]| {
            let _ = seen2.set(r.len());
            Verdict::Forward
        });
        let mut stream = RecordingStream::new(client, Some(inspector));
        let rec = record(&[1, 2, 3, 4]);

        // Split across writes: nothing reaches the peer until the record is whole.
        stream.write_all(&rec[..3]).await.unwrap();
        stream.write_all(&rec[3..]).await.unwrap();
        stream.write_all(b"tail").await.unwrap();
        stream.flush().await.unwrap();

        let mut got = vec![0u8; rec.len() + 4];
        server.read_exact(&mut got).await.unwrap();
        assert_eq!(&got[..rec.len()], &rec[..]);
        assert_eq!(&got[rec.len()..], b"tail");
        assert_eq!(seen.get(), Some(&rec.len()));
        assert_eq!(stream.capture().hello(), Some(&rec[..]));
    }

    #[tokio::test]
    async fn test_blocked_flight_never_written() {
        let (client, mut server) = tokio::io::duplex(4096);
        let inspector: Inspector = Box::new(|_: &[u8]| Verdict::Block("drift".into()));
        let mut stream = RecordingStream::new(client, Some(inspector));
        let capture = stream.capture();

        let err = stream.write_all(&record(&[9; 16])).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(capture.blocked(), Some("drift"));
        drop(stream);

        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }
}
