//! Loopback servers shared by the integration tests.

#![allow(dead_code)]

use boring::asn1::Asn1Time;
use boring::bn::{BigNum, MsbOption};
use boring::hash::MessageDigest;
use boring::pkey::PKey;
use boring::rsa::Rsa;
use boring::ssl::{select_next_proto, AlpnError, SslAcceptor, SslMethod};
use boring::x509::{X509NameBuilder, X509};
use bytes::{Bytes, BytesMut};
use mimicnet::http::h2::frame::{Frame, FrameHeader, FRAME_HEADER_SIZE, PREFACE};
use mimicnet::http::h2::hpack::{Decoder, Encoder};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};

/// Read up to and including the blank line that ends a request head.
pub async fn read_head<S: AsyncRead + Unpin>(sock: &mut S) -> String {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    while !buf.ends_with(b"\r\n\r\n") {
        if sock.read(&mut byte).await.unwrap() == 0 {
            break;
        }
        buf.push(byte[0]);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Header names of a request head, in wire order and casing.
pub fn header_names(head: &str) -> Vec<String> {
    head.split("\r\n")
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .map(|(name, _)| name.to_string())
        .collect()
}

pub fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.split("\r\n")
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.trim())
}

/// Serve one canned HTTP/1.1 response per request on every accepted
/// connection. Request heads are forwarded to the returned channel.
pub async fn h1_server(
    response: &'static [u8],
) -> (SocketAddr, tokio::sync::mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                loop {
                    let head = read_head(&mut sock).await;
                    if head.is_empty() {
                        return;
                    }
                    let _ = tx.send(head);
                    if sock.write_all(response).await.is_err() {
                        return;
                    }
                }
            });
        }
    });
    (addr, rx)
}

/// A TLS acceptor with a fresh self-signed certificate for `localhost`,
/// selecting the first of `alpn` the client offers.
pub fn tls_acceptor(alpn: &[&str]) -> SslAcceptor {
    let rsa = Rsa::generate(2048).unwrap();
    let pkey = PKey::from_rsa(rsa).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", "localhost").unwrap();
    let name = name.build();

    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();

    let mut cert = X509::builder().unwrap();
    cert.set_version(2).unwrap();
    cert.set_serial_number(&serial.to_asn1_integer().unwrap()).unwrap();
    cert.set_subject_name(&name).unwrap();
    cert.set_issuer_name(&name).unwrap();
    cert.set_pubkey(&pkey).unwrap();
    cert.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    cert.set_not_after(&Asn1Time::days_from_now(7).unwrap()).unwrap();
    cert.sign(&pkey, MessageDigest::sha256()).unwrap();
    let cert = cert.build();

    let mut acceptor = SslAcceptor::mozilla_intermediate(SslMethod::tls()).unwrap();
    acceptor.set_private_key(&pkey).unwrap();
    acceptor.set_certificate(&cert).unwrap();

    let mut wire = Vec::new();
    for proto in alpn {
        wire.push(proto.len() as u8);
        wire.extend_from_slice(proto.as_bytes());
    }
    acceptor.set_alpn_select_callback(move |_, client| {
        select_next_proto(&wire, client).ok_or(AlpnError::NOACK)
    });
    acceptor.build()
}

/// The server side of an HTTP/2 connection, driven frame by frame.
pub struct H2Peer<S> {
    pub io: S,
    decoder: Decoder,
    encoder: Encoder,
}

impl<S: AsyncRead + AsyncWrite + Unpin> H2Peer<S> {
    pub fn new(io: S) -> Self {
        Self {
            io,
            decoder: Decoder::new(65536),
            encoder: Encoder::new(4096, &[]),
        }
    }

    pub async fn preface(&mut self) {
        let mut buf = [0u8; 24];
        self.io.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..], PREFACE);
    }

    pub async fn frame(&mut self) -> Frame {
        let mut head = [0u8; FRAME_HEADER_SIZE];
        self.io.read_exact(&mut head).await.unwrap();
        let header = FrameHeader::parse(&head);
        let mut payload = vec![0u8; header.length as usize];
        self.io.read_exact(&mut payload).await.unwrap();
        Frame::decode(header, Bytes::from(payload)).unwrap()
    }

    /// Skip connection frames until the next HEADERS.
    pub async fn headers(&mut self) -> (u32, Vec<(String, String)>) {
        loop {
            if let Frame::Headers {
                stream_id, block, ..
            } = self.frame().await
            {
                return (stream_id, self.decoder.decode(&block).unwrap());
            }
        }
    }

    pub async fn send(&mut self, frame: Frame) {
        let mut buf = BytesMut::new();
        frame.encode(&mut buf);
        self.io.write_all(&buf).await.unwrap();
    }

    /// Empty SETTINGS followed by an ACK of the client's.
    pub async fn settle(&mut self) {
        self.send(Frame::Settings {
            ack: false,
            settings: Vec::new(),
        })
        .await;
        self.send(Frame::Settings {
            ack: true,
            settings: Vec::new(),
        })
        .await;
    }

    pub async fn respond(&mut self, stream_id: u32, headers: &[(&str, &str)], body: &[u8]) {
        let block = self.encoder.encode(headers.iter().copied());
        self.send(Frame::Headers {
            stream_id,
            end_stream: body.is_empty(),
            end_headers: true,
            priority: None,
            block: Bytes::from(block),
        })
        .await;
        if !body.is_empty() {
            self.send(Frame::Data {
                stream_id,
                end_stream: true,
                data: Bytes::copy_from_slice(body),
                flow_len: body.len() as u32,
            })
            .await;
        }
    }
}

/// Accept one TCP connection on a fresh loopback listener.
pub async fn listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

pub async fn accept(listener: &TcpListener) -> TcpStream {
    listener.accept().await.unwrap().0
}

/// Read one whole TLS record off `sock`, header included.
pub async fn read_record<S: AsyncRead + Unpin>(sock: &mut S) -> Vec<u8> {
    let mut record = vec![0u8; 5];
    sock.read_exact(&mut record).await.unwrap();
    let len = u16::from_be_bytes([record[3], record[4]]) as usize;
    record.resize(5 + len, 0);
    sock.read_exact(&mut record[5..]).await.unwrap();
    record
}

/// Hands `prefix` back to the reader before reading from `inner`, so
/// bytes already taken off a socket can be fed to a TLS acceptor.
pub struct Replay<S> {
    prefix: Bytes,
    inner: S,
}

impl<S> Replay<S> {
    pub fn new(prefix: impl Into<Bytes>, inner: S) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Replay<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if !self.prefix.is_empty() {
            let n = self.prefix.len().min(buf.remaining());
            let chunk = self.prefix.split_to(n);
            buf.put_slice(&chunk);
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Replay<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}
