//! TLS handshakes whose ClientHello follows a browser profile.
//!
//! - [`hello`]: byte-exact ClientHello synthesis from a template
//! - [`ja3`]: ClientHello parsing and JA3/JA4 fingerprints
//! - [`options`]: projection of a profile onto BoringSSL settings
//! - [`recorder`]: first-flight capture and template check

pub mod hello;
pub mod ja3;
pub mod options;
pub mod recorder;

pub use self::hello::{synthesize, GreaseSeed, HelloParams};
pub use self::ja3::{parse_client_hello, ClientHelloInfo, HelloShape};
pub use self::options::{TlsOptions, TlsOptionsBuilder};

use crate::base::neterror::NetError;
use crate::emulation::profile::Profile;
use crate::socket::stream::BoxedSocket;
use boring::ssl::{SslConnector, SslMethod, SslVerifyMode};
use recorder::{Inspector, RecordingStream, Verdict};
use std::sync::Arc;
use tokio_boring::SslStream;
use tracing::{debug, warn};

/// What happens when the first flight is not the profile's ClientHello.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FingerprintCheck {
    Off,
    /// Log the mismatch and send the flight anyway.
    Warn,
    /// Hold the flight back and fail with [`NetError::FingerprintMismatch`].
    #[default]
    Strict,
}

pub type TlsStream = SslStream<RecordingStream<BoxedSocket>>;

/// A completed handshake.
pub struct TlsOutcome {
    pub stream: TlsStream,
    /// `h2` or `http/1.1`.
    pub alpn: String,
    /// Peer certificate chain, DER encoded.
    pub peer_certificates: Vec<Vec<u8>>,
    /// The ClientHello record as it went out.
    pub client_hello: Vec<u8>,
}

impl std::fmt::Debug for TlsOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsOutcome")
            .field("alpn", &self.alpn)
            .field("peer_certificates", &self.peer_certificates.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
struct Fingerprint {
    profile: Arc<Profile>,
    check: FingerprintCheck,
}

impl Fingerprint {
    /// Rebuild the template hello from the random fields of `record` and
    /// require the two to be identical.
    fn verify(&self, record: &[u8], host: &str) -> Result<(), String> {
        let actual = parse_client_hello(record).map_err(|e| e.to_string())?;
        let params = HelloParams::from_client_hello(&actual, host).map_err(|e| e.to_string())?;
        let expected = synthesize(&self.profile, &params).map_err(|e| e.to_string())?;
        if expected == record {
            return Ok(());
        }

        let template = parse_client_hello(&expected).map_err(|e| e.to_string())?;
        let mut drift: Vec<String> = template
            .shape()
            .diff(&actual.shape())
            .into_iter()
            .map(str::to_string)
            .collect();
        if drift.is_empty() {
            let offset = expected
                .iter()
                .zip(record)
                .position(|(a, b)| a != b)
                .unwrap_or_else(|| expected.len().min(record.len()));
            drift.push(format!("bytes from offset {}", offset));
        }
        Err(format!(
            "{} differs in {} (expected JA3 {}, actual JA3 {})",
            self.profile.id,
            drift.join(", "),
            template.ja3_string(),
            actual.ja3_string()
        ))
    }
}

/// Drives TLS handshakes over dialed sockets.
#[derive(Clone)]
pub struct TlsHandshaker {
    connector: SslConnector,
    alpn: Vec<String>,
    alps: Vec<String>,
    send_sni: bool,
    insecure_skip_verify: bool,
    fingerprint: Option<Arc<Fingerprint>>,
}

impl std::fmt::Debug for TlsHandshaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsHandshaker")
            .field("alpn", &self.alpn)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field(
                "profile",
                &self.fingerprint.as_ref().map(|fp| fp.profile.id.as_str()),
            )
            .finish()
    }
}

fn connector(options: &TlsOptions) -> Result<SslConnector, NetError> {
    let mut builder = SslConnector::builder(SslMethod::tls())
        .map_err(|e| NetError::TlsHandshakeFailed(format!("connector: {}", e)))?;
    options.apply_to_builder(&mut builder)?;
    Ok(builder.build())
}

impl TlsHandshaker {
    /// A handshaker imitating `profile`.
    pub fn new(
        profile: Arc<Profile>,
        insecure_skip_verify: bool,
        fingerprint_check: FingerprintCheck,
    ) -> Result<Self, NetError> {
        let mut options = TlsOptions::from_profile(&profile)?;
        options.verify_peer = !insecure_skip_verify;

        let fingerprint = Fingerprint {
            profile: profile.clone(),
            check: fingerprint_check,
        };

        Ok(Self {
            connector: connector(&options)?,
            alpn: options.alpn_protocols,
            alps: options.alps_protocols,
            send_sni: options.send_sni,
            insecure_skip_verify,
            fingerprint: Some(Arc::new(fingerprint)),
        })
    }

    /// A stock BoringSSL handshaker offering `alpn`.
    pub fn standard(alpn: &[&str], insecure_skip_verify: bool) -> Result<Self, NetError> {
        let options = TlsOptions::builder()
            .alpn_protocols(alpn)
            .verify_peer(!insecure_skip_verify)
            .build();
        Ok(Self {
            connector: connector(&options)?,
            alpn: options.alpn_protocols,
            alps: Vec::new(),
            send_sni: true,
            insecure_skip_verify,
            fingerprint: None,
        })
    }

    pub fn profile(&self) -> Option<&Arc<Profile>> {
        self.fingerprint.as_ref().map(|fp| &fp.profile)
    }

    fn inspector(&self, sni: &str) -> Option<Inspector> {
        let fp = self.fingerprint.clone()?;
        if fp.check == FingerprintCheck::Off {
            return None;
        }
        let host = sni.to_string();

        Some(Box::new(move |record: &[u8]| match fp.verify(record, &host) {
            Ok(()) => {
                debug!(profile = %fp.profile.id, host = %host, "ClientHello matches profile template");
                Verdict::Forward
            }
            Err(reason) if fp.check == FingerprintCheck::Strict => Verdict::Block(reason),
            Err(reason) => {
                warn!(profile = %fp.profile.id, host = %host, reason = %reason, "ClientHello differs from profile template");
                Verdict::Forward
            }
        }))
    }

    /// Run the handshake over `stream`, presenting `sni`.
    pub async fn handshake(&self, stream: BoxedSocket, sni: &str) -> Result<TlsOutcome, NetError> {
        let host = sni.trim_start_matches('[').trim_end_matches(']');
        let recording = RecordingStream::new(stream, self.inspector(host));
        let capture = recording.capture();

        let mut config = self
            .connector
            .configure()
            .map_err(|e| NetError::TlsHandshakeFailed(e.to_string()))?;
        config.set_use_server_name_indication(self.send_sni && hello::sni_applicable(host));
        for proto in &self.alps {
            config
                .add_application_settings(proto.as_bytes())
                .map_err(|e| NetError::TlsHandshakeFailed(format!("application settings: {}", e)))?;
        }
        config.set_verify_hostname(!self.insecure_skip_verify);
        if self.insecure_skip_verify {
            config.set_verify(SslVerifyMode::NONE);
        }

        let stream = match tokio_boring::connect(config, host, recording).await {
            Ok(stream) => stream,
            Err(e) => {
                if let Some(reason) = capture.blocked() {
                    return Err(NetError::FingerprintMismatch(reason.to_string()));
                }
                let msg = e.to_string();
                if msg.contains("CERTIFICATE_VERIFY_FAILED") || msg.contains("certificate verify") {
                    return Err(NetError::CertificateInvalid(msg));
                }
                return Err(NetError::TlsHandshakeFailed(msg));
            }
        };

        let alpn = match stream.ssl().selected_alpn_protocol() {
            None => "http/1.1".to_string(),
            Some(selected) => {
                let selected = String::from_utf8_lossy(selected).into_owned();
                if !self.alpn.iter().any(|p| *p == selected) {
                    return Err(NetError::AlpnMismatch(selected));
                }
                selected
            }
        };

        let peer_certificates = stream
            .ssl()
            .peer_cert_chain()
            .map(|chain| chain.iter().filter_map(|c| c.to_der().ok()).collect())
            .unwrap_or_default();

        debug!(host = %host, alpn = %alpn, "TLS handshake complete");

        Ok(TlsOutcome {
            stream,
            alpn,
            peer_certificates,
            client_hello: capture.hello().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }
}
