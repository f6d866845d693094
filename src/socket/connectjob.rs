use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::socket::proxy::{ProxySettings, ProxyType};
use crate::socket::socks::{self, DnsResolve};
use crate::socket::stream::BoxedSocket;
use crate::socket::tls::TlsHandshaker;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Upper bound on a CONNECT response head.
const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

/// Opens the byte stream a request travels over: DNS -> TCP, then any
/// proxy tunnel. TLS to the origin is layered on afterwards.
pub struct ConnectDialer;

impl ConnectDialer {
    /// Connect to `host:port`, directly or through `proxy`.
    ///
    /// `tls_for_proxy` is the handshaker used to reach an `https://` proxy.
    /// When absent, a stock handshaker verifying against the system trust
    /// store is used.
    pub async fn connect(
        host: &str,
        port: u16,
        proxy: Option<&ProxySettings>,
        timeout: Option<Duration>,
        tls_for_proxy: Option<&TlsHandshaker>,
    ) -> Result<BoxedSocket, NetError> {
        let dial = async {
            match proxy {
                None => {
                    let tcp = connect_tcp(host, port, false).await?;
                    Ok(BoxedSocket::new(tcp))
                }
                Some(proxy) => Self::connect_via(host, port, proxy, tls_for_proxy).await,
            }
        };
        with_deadline(timeout, dial).await
    }

    async fn connect_via(
        host: &str,
        port: u16,
        proxy: &ProxySettings,
        tls_for_proxy: Option<&TlsHandshaker>,
    ) -> Result<BoxedSocket, NetError> {
        let tcp = connect_tcp(&proxy.host, proxy.port, true).await?;
        debug!(proxy = %proxy.key(), target = %host, port, "connected to proxy");

        match proxy.kind {
            ProxyType::Http => {
                let mut socket = BoxedSocket::new(tcp);
                http_connect(&mut socket, host, port, proxy).await?;
                Ok(socket)
            }
            ProxyType::Https => {
                let standard;
                let handshaker = match tls_for_proxy {
                    Some(hs) => hs,
                    None => {
                        standard = TlsHandshaker::standard(&["http/1.1"], false)?;
                        &standard
                    }
                };
                let outcome = handshaker.handshake(BoxedSocket::new(tcp), &proxy.host).await?;
                let mut socket = BoxedSocket::new(outcome.stream);
                http_connect(&mut socket, host, port, proxy).await?;
                Ok(socket)
            }
            ProxyType::Socks5 { remote_dns } => {
                let dns = if remote_dns {
                    DnsResolve::Remote
                } else {
                    DnsResolve::Local
                };
                let tcp = socks::connect(tcp, host, port, dns, proxy.socks5_auth()).await?;
                Ok(BoxedSocket::new(tcp))
            }
        }
    }
}

async fn with_deadline<T, F>(timeout: Option<Duration>, fut: F) -> Result<T, NetError>
where
    F: Future<Output = Result<T, NetError>>,
{
    match timeout.filter(|t| !t.is_zero()) {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| NetError::DialTimeout)?,
        None => fut.await,
    }
}

fn dial_context<T>(r: std::io::Result<T>, host: &str, port: u16, is_proxy: bool) -> Result<T, NetError> {
    if is_proxy {
        r.proxy_context(host, port)
    } else {
        r.connection_context(host, port)
    }
}

/// Resolve and try each address in turn.
async fn connect_tcp(host: &str, port: u16, is_proxy: bool) -> Result<TcpStream, NetError> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    let addrs: Vec<_> =
        dial_context(tokio::net::lookup_host((bare, port)).await, bare, port, is_proxy)?.collect();

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                debug!(host = %bare, %addr, "TCP connected");
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }
    let err = last_err.unwrap_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
    });
    dial_context(Err(err), bare, port, is_proxy)
}

/// Send `CONNECT` and consume the proxy's response head, leaving any
/// tunnelled bytes that follow it unread.
pub async fn http_connect<S>(
    stream: &mut S,
    host: &str,
    port: u16,
    proxy: &ProxySettings,
) -> Result<(), NetError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let authority = if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    };
    let mut req = format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n", authority);
    if let Some(auth) = proxy.basic_auth() {
        req.push_str("Proxy-Authorization: ");
        req.push_str(&auth);
        req.push_str("\r\n");
    }
    req.push_str("\r\n");
    let req = zeroize::Zeroizing::new(req);

    stream
        .write_all(req.as_bytes())
        .await
        .proxy_context(&proxy.host, proxy.port)?;
    stream.flush().await.proxy_context(&proxy.host, proxy.port)?;

    // One byte at a time: the origin may speak first once the tunnel is up.
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() >= MAX_CONNECT_RESPONSE {
            return Err(NetError::ProxyUnreachable(
                "CONNECT response head too large".to_string(),
            ));
        }
        let n = stream
            .read(&mut byte)
            .await
            .proxy_context(&proxy.host, proxy.port)?;
        if n == 0 {
            return Err(NetError::ProxyUnreachable(
                "proxy closed the connection during CONNECT".to_string(),
            ));
        }
        head.push(byte[0]);
    }

    let status = parse_connect_status(&head)?;
    match status {
        200..=299 => {
            debug!(proxy = %proxy.key(), target = %authority, "CONNECT tunnel established");
            Ok(())
        }
        407 => {
            warn!(proxy = %proxy.key(), "proxy rejected credentials");
            Err(NetError::ProxyAuthFailed)
        }
        status => {
            warn!(proxy = %proxy.key(), status, "proxy refused CONNECT");
            Err(NetError::ProxyRefused { status })
        }
    }
}

fn parse_connect_status(head: &[u8]) -> Result<u16, NetError> {
    let line_end = head.iter().position(|&b| b == b'\r').unwrap_or(head.len());
    let line = String::from_utf8_lossy(&head[..line_end]);
    let mut parts = line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(NetError::ProxyUnreachable(format!(
            "bad CONNECT status line: {:?}",
            line
        )));
    }
    parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| NetError::ProxyUnreachable(format!("bad CONNECT status line: {:?}", line)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy(url: &str) -> ProxySettings {
        ProxySettings::parse(url).unwrap()
    }

    #[test]
    fn test_parse_connect_status() {
        assert_eq!(parse_connect_status(b"HTTP/1.1 200 Connection established\r\n\r\n").unwrap(), 200);
        assert_eq!(parse_connect_status(b"HTTP/1.0 407 Auth\r\n\r\n").unwrap(), 407);
        assert!(parse_connect_status(b"SSH-2.0-x\r\n\r\n").is_err());
    }

    #[tokio::test]
    async fn test_http_connect_leaves_tunnel_bytes() {
        let (mut client, mut server) = tokio::io::duplex(4096);
        let settings = proxy("http://user:pw@proxy.test:3128");
        let server_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 1024];
            let n = server.read(&mut buf).await.unwrap();
            let req = String::from_utf8_lossy(&buf[..n]).into_owned();
            server
                .write_all(b"HTTP/1.1 200 Connection established\r\n\r\nEARLY")
                .await
                .unwrap();
            req
        });

        http_connect(&mut client, "a.test", 443, &settings).await.unwrap();
        let mut early = [0u8; 5];
        client.read_exact(&mut early).await.unwrap();
        assert_eq!(&early, b"EARLY");

        let req = server_task.await.unwrap();
        assert!(req.starts_with("CONNECT a.test:443 HTTP/1.1\r\nHost: a.test:443\r\n"));
        assert!(req.contains("Proxy-Authorization: Basic dXNlcjpwdw==\r\n"));
        assert!(req.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_http_connect_status_mapping() {
        for (reply, expected) in [
            (&b"HTTP/1.1 407 Proxy Authentication Required\r\n\r\n"[..], NetError::ProxyAuthFailed),
            (&b"HTTP/1.1 403 Forbidden\r\nX: y\r\n\r\n"[..], NetError::ProxyRefused { status: 403 }),
        ] {
            let (mut client, mut server) = tokio::io::duplex(4096);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1024];
                let _ = server.read(&mut buf).await;
                server.write_all(reply).await.unwrap();
            });
            let err = http_connect(&mut client, "a.test", 443, &proxy("http://p.test"))
                .await
                .unwrap_err();
            assert_eq!(err, expected);
        }
    }

    #[tokio::test]
    async fn test_direct_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let err = ConnectDialer::connect("127.0.0.1", port, None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::Unreachable(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_proxy_unreachable() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let settings = proxy(&format!("http://127.0.0.1:{}", port));
        let err = ConnectDialer::connect("a.test", 80, Some(&settings), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::ProxyUnreachable(_)), "{:?}", err);
    }

    #[tokio::test]
    async fn test_dial_timeout() {
        // A proxy that accepts but never answers CONNECT.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let settings = proxy(&format!("http://127.0.0.1:{}", port));
        let err = ConnectDialer::connect(
            "a.test",
            80,
            Some(&settings),
            Some(Duration::from_millis(50)),
            None,
        )
        .await
        .unwrap_err();
        assert_eq!(err, NetError::DialTimeout);
    }
}
