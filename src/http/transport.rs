//! Protocol selection: how a connection is dialed and which engine a
//! request runs on.

use crate::base::neterror::NetError;
use crate::emulation::profile::Profile;
use crate::http::h1::{H1Connection, H1Head, Progress};
use crate::http::h2::{H2Config, H2Connection, H2Handle, H2Head, StreamFlags};
use crate::http::h2settings::H2Settings;
use crate::http::response::RawResponse;
use crate::socket::connectjob::ConnectDialer;
use crate::socket::proxy::ProxySettings;
use crate::socket::stream::BoxedSocket;
use crate::socket::tls::{FingerprintCheck, TlsHandshaker};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// The capability set of a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// HTTP/1.1 only; stock TLS for `https`.
    PlainH1,
    /// HTTP/2 with prior knowledge (h2c) for `http`; stock TLS offering
    /// `h2` for `https`.
    PlainH2,
    /// TLS, ALPN and HTTP/2 parameters taken from a browser profile.
    Fingerprinted(Arc<Profile>),
}

impl Transport {
    pub fn profile(&self) -> Option<&Arc<Profile>> {
        match self {
            Transport::Fingerprinted(profile) => Some(profile),
            _ => None,
        }
    }

    /// Whether connections of this transport may carry several requests at
    /// once.
    pub fn can_multiplex(&self) -> bool {
        match self {
            Transport::PlainH1 => false,
            Transport::PlainH2 => true,
            Transport::Fingerprinted(profile) => profile.alpn().iter().any(|p| p == "h2"),
        }
    }
}

/// A live connection.
#[derive(Debug)]
pub enum Connection {
    /// Exclusive, leased to one request at a time.
    H1(H1Connection),
    /// Shared; the driver task owns the socket.
    H2(H2Handle),
}

impl Connection {
    pub fn is_h2(&self) -> bool {
        matches!(self, Connection::H2(_))
    }
}

/// A request in wire form: headers already filtered and ordered.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: String,
    pub scheme: String,
    pub authority: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Dials connections for one [`Transport`].
#[derive(Debug, Clone)]
pub struct Connector {
    transport: Transport,
    tls: TlsHandshaker,
    h2: H2Config,
}

impl Connector {
    pub fn new(
        transport: Transport,
        insecure_skip_verify: bool,
        fingerprint_check: FingerprintCheck,
        h2_settings_overrides: Option<&[(u16, u32)]>,
    ) -> Result<Self, NetError> {
        let (tls, h2) = match &transport {
            Transport::PlainH1 => (
                TlsHandshaker::standard(&["http/1.1"], insecure_skip_verify)?,
                H2Config::default(),
            ),
            Transport::PlainH2 => (
                TlsHandshaker::standard(&["h2"], insecure_skip_verify)?,
                H2Config::default(),
            ),
            Transport::Fingerprinted(profile) => (
                TlsHandshaker::new(profile.clone(), insecure_skip_verify, fingerprint_check)?,
                H2Config::from_profile(&profile.http2),
            ),
        };
        let h2 = match h2_settings_overrides {
            Some(settings) => h2.with_settings(H2Settings::new(settings.to_vec())),
            None => h2,
        };
        Ok(Self { transport, tls, h2 })
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn h2_config(&self) -> &H2Config {
        &self.h2
    }

    /// Dial `host:port` and bring up the protocol `scheme` and ALPN call for.
    pub async fn dial(
        &self,
        host: &str,
        port: u16,
        scheme: &str,
        proxy: Option<&ProxySettings>,
        deadline: Option<Duration>,
    ) -> Result<Connection, NetError> {
        let dial = async {
            let socket = ConnectDialer::connect(host, port, proxy, None, None).await?;
            self.establish(socket, host, scheme).await
        };
        match deadline.filter(|d| !d.is_zero()) {
            Some(limit) => tokio::time::timeout(limit, dial)
                .await
                .map_err(|_| NetError::DialTimeout)?,
            None => dial.await,
        }
    }

    /// Layer TLS (for `https`) and the HTTP engine over a dialed socket.
    pub async fn establish(
        &self,
        socket: BoxedSocket,
        host: &str,
        scheme: &str,
    ) -> Result<Connection, NetError> {
        if scheme == "https" {
            let outcome = self.tls.handshake(socket, host).await?;
            debug!(host = %host, alpn = %outcome.alpn, "ALPN negotiated");
            let stream = BoxedSocket::new(outcome.stream);
            if outcome.alpn == "h2" {
                return self.start_h2(stream).await;
            }
            return Ok(Connection::H1(H1Connection::new(stream)));
        }

        match self.transport {
            Transport::PlainH2 => self.start_h2(socket).await,
            _ => Ok(Connection::H1(H1Connection::new(socket))),
        }
    }

    async fn start_h2(&self, stream: BoxedSocket) -> Result<Connection, NetError> {
        let (handle, driver) = H2Connection::handshake(stream, self.h2.clone()).await?;
        tokio::spawn(driver.run());
        Ok(Connection::H2(handle))
    }

    /// Run one request on `conn`.
    pub async fn round_trip(
        &self,
        conn: &mut Connection,
        request: &WireRequest,
        progress: &mut Progress,
        cancel: &CancellationToken,
    ) -> Result<RawResponse, NetError> {
        match conn {
            Connection::H1(h1) => {
                let head = H1Head {
                    method: request.method.clone(),
                    target: request.target.clone(),
                    headers: request.headers.clone(),
                };
                h1.send_request(&head, &request.body, progress).await
            }
            Connection::H2(handle) => {
                let head = H2Head {
                    method: request.method.clone(),
                    scheme: request.scheme.clone(),
                    authority: request.authority.clone(),
                    path: request.target.clone(),
                    headers: request.headers.clone(),
                };
                let mut flags = StreamFlags::default();
                let result = handle
                    .send_request(head, request.body.clone(), &mut flags, cancel)
                    .await;
                // A refused stream was never processed by the server.
                progress.request_written =
                    flags.headers_sent && !matches!(result, Err(NetError::Refused));
                progress.response_started = flags.frame_received;
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation::registry::ProfileRegistry;
    use crate::http::h2settings;

    #[test]
    fn test_multiplex_capability() {
        assert!(!Transport::PlainH1.can_multiplex());
        assert!(Transport::PlainH2.can_multiplex());
        let profile = ProfileRegistry::builtin().unwrap().get("chrome-120").unwrap();
        assert!(Transport::Fingerprinted(profile).can_multiplex());
    }

    #[test]
    fn test_settings_overrides_replace_profile_list() {
        let profile = ProfileRegistry::builtin().unwrap().get("firefox-110").unwrap();
        let overrides = [(h2settings::INITIAL_WINDOW_SIZE, 1_048_576)];
        let connector = Connector::new(
            Transport::Fingerprinted(profile.clone()),
            true,
            FingerprintCheck::Off,
            Some(&overrides),
        )
        .unwrap();
        assert_eq!(connector.h2_config().settings.entries(), &overrides);
        assert_eq!(connector.h2_config().window_update, profile.http2.window_update);
    }

    #[tokio::test]
    async fn test_plain_h2_over_http_uses_prior_knowledge() {
        use tokio::io::AsyncReadExt;

        let connector = Connector::new(Transport::PlainH2, false, FingerprintCheck::Off, None).unwrap();
        let (client, mut server) = tokio::io::duplex(4096);
        let conn = connector
            .establish(BoxedSocket::new(client), "a.test", "http")
            .await
            .unwrap();
        assert!(conn.is_h2());

        let mut preface = [0u8; 24];
        server.read_exact(&mut preface).await.unwrap();
        assert_eq!(&preface, crate::http::h2::frame::PREFACE);
    }

    #[tokio::test]
    async fn test_fingerprinted_over_http_is_h1() {
        let profile = ProfileRegistry::builtin().unwrap().get("chrome-120").unwrap();
        let connector =
            Connector::new(Transport::Fingerprinted(profile), false, FingerprintCheck::Off, None)
                .unwrap();
        let (client, _server) = tokio::io::duplex(64);
        let conn = connector
            .establish(BoxedSocket::new(client), "a.test", "http")
            .await
            .unwrap();
        assert!(!conn.is_h2());
    }

    async fn next_frame(server: &mut tokio::io::DuplexStream) -> crate::http::h2::frame::Frame {
        use crate::http::h2::frame::{Frame, FrameHeader, FRAME_HEADER_SIZE};
        use tokio::io::AsyncReadExt;

        let mut head = [0u8; FRAME_HEADER_SIZE];
        server.read_exact(&mut head).await.unwrap();
        let header = FrameHeader::parse(&head);
        let mut payload = vec![0u8; header.length as usize];
        server.read_exact(&mut payload).await.unwrap();
        Frame::decode(header, Bytes::from(payload)).unwrap()
    }

    #[tokio::test]
    async fn test_h2_progress_reported_by_driver() {
        use crate::http::h2::frame::{ErrorCode, Frame};
        use bytes::BytesMut;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let connector = Connector::new(Transport::PlainH2, false, FingerprintCheck::Off, None).unwrap();
        let (client, mut server) = tokio::io::duplex(1 << 16);
        let mut conn = connector
            .establish(BoxedSocket::new(client), "a.test", "http")
            .await
            .unwrap();
        let mut preface = [0u8; 24];
        server.read_exact(&mut preface).await.unwrap();

        let peer = tokio::spawn(async move {
            loop {
                if let Frame::Headers { stream_id, .. } = next_frame(&mut server).await {
                    let mut out = BytesMut::new();
                    Frame::RstStream {
                        stream_id,
                        code: ErrorCode::INTERNAL_ERROR,
                    }
                    .encode(&mut out);
                    server.write_all(&out).await.unwrap();
                    return server;
                }
            }
        });

        let request = WireRequest {
            method: "POST".into(),
            scheme: "http".into(),
            authority: "a.test".into(),
            target: "/".into(),
            headers: Vec::new(),
            body: Bytes::new(),
        };
        let mut progress = Progress::default();
        let err = connector
            .round_trip(&mut conn, &request, &mut progress, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, NetError::StreamReset { code: 2 });
        assert_eq!(
            progress,
            Progress {
                request_written: true,
                response_started: true
            }
        );
        let _server = peer.await.unwrap();
    }
}
