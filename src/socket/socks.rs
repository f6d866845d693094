//! SOCKS5 tunnels over an already connected proxy socket.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_socks::tcp::Socks5Stream;
use tokio_socks::TargetAddr;
use tracing::{debug, warn};

/// Where the target name is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsResolve {
    /// `socks5://`: resolve here, send an address.
    Local,
    /// `socks5h://`: send the name, the proxy resolves it.
    Remote,
}

async fn target_addr(host: &str, port: u16, dns: DnsResolve) -> Result<TargetAddr<'_>, NetError> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Ok(TargetAddr::Ip(SocketAddr::new(ip, port)));
    }
    match dns {
        DnsResolve::Remote => Ok(TargetAddr::Domain(Cow::Borrowed(bare), port)),
        DnsResolve::Local => {
            let addr = tokio::net::lookup_host((bare, port))
                .await
                .connection_context(bare, port)?
                .next()
                .ok_or_else(|| NetError::Unreachable(format!("{}:{}: no addresses", bare, port)))?;
            Ok(TargetAddr::Ip(addr))
        }
    }
}

/// Map a reply code or handshake failure onto the proxy error kinds.
fn socks_error(err: tokio_socks::Error) -> NetError {
    use tokio_socks::Error;

    let refused = |status: u16| {
        warn!(code = status, "SOCKS5 proxy refused CONNECT");
        NetError::ProxyRefused { status }
    };
    match err {
        Error::NoAcceptableAuthMethods
        | Error::UnknownAuthMethod
        | Error::PasswordAuthFailure(_)
        | Error::InvalidAuthValues(_) => NetError::ProxyAuthFailed,
        Error::GeneralSocksServerFailure => refused(1),
        Error::ConnectionNotAllowedByRuleset => refused(2),
        Error::NetworkUnreachable => refused(3),
        Error::HostUnreachable => refused(4),
        Error::ConnectionRefused => refused(5),
        Error::TtlExpired => refused(6),
        Error::CommandNotSupported => refused(7),
        Error::AddressTypeNotSupported => refused(8),
        Error::InvalidTargetAddress(msg) => NetError::InvalidUrl(format!("SOCKS5 target: {}", msg)),
        Error::Io(e) => NetError::ProxyUnreachable(format!("SOCKS5 proxy closed the handshake: {}", e)),
        other => NetError::ProxyUnreachable(format!("SOCKS5 handshake failed: {}", other)),
    }
}

/// Run the greeting, optional username/password exchange and CONNECT for
/// `host:port` over `socket`, handing the tunnelled socket back.
pub async fn connect<S>(
    socket: S,
    host: &str,
    port: u16,
    dns: DnsResolve,
    auth: Option<(&str, &str)>,
) -> Result<S, NetError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let target = target_addr(host, port, dns).await?;
    debug!(target = ?target, "SOCKS5 CONNECT");

    let stream = match auth {
        Some((user, pass)) => {
            Socks5Stream::connect_with_password_and_socket(socket, target, user, pass).await
        }
        None => Socks5Stream::connect_with_socket(socket, target).await,
    }
    .map_err(socks_error)?;

    debug!(host = %host, port, "SOCKS5 tunnel established");
    Ok(stream.into_inner())
}
