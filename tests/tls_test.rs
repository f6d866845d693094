//! ClientHello shape, synthesized and captured from the wire.

mod common;

use common::{accept, listener, read_record, tls_acceptor, H2Peer, Replay};
use mimicnet::http::h2::frame::Frame;
use mimicnet::socket::tls::{parse_client_hello, synthesize, GreaseSeed, HelloParams};
use mimicnet::{Client, NetError, ProfileRegistry};
use std::collections::BTreeMap;
use tokio::io::AsyncWriteExt;

const CHROME_120_JA3: &str = "771,4865-4866-4867-49195-49199-49196-49200-52393-52392-49171-49172-156-157-47-53,0-23-65281-10-11-35-16-5-13-18-51-45-43-27-17513-21,29-23-24,0";

#[test]
fn test_synthesized_chrome_ja3() {
    let profile = ProfileRegistry::builtin().unwrap().get("chrome-120").unwrap();
    let record = synthesize(&profile, &HelloParams::generate(&profile, "example.com")).unwrap();
    let info = parse_client_hello(&record).unwrap();

    assert_eq!(info.ja3_string(), CHROME_120_JA3);
    assert_eq!(info.server_name.as_deref(), Some("example.com"));
    assert_eq!(info.alpn_protocols, vec!["h2", "http/1.1"]);
    assert_eq!(record.len() - 5, 512);
}

#[test]
fn test_chrome_hello_matches_checked_in_vector() {
    let profile = ProfileRegistry::builtin().unwrap().get("chrome-120").unwrap();
    let params = HelloParams {
        sni: "example.com".into(),
        random: std::array::from_fn(|i| i as u8),
        session_id: (0x20..0x40).collect(),
        grease: GreaseSeed::new([0x00, 0x10, 0x20, 0x30, 0x40]),
        key_shares: BTreeMap::from([(29, vec![0x11; 32])]),
    };
    let record = synthesize(&profile, &params).unwrap();
    let hex: String = record.iter().map(|b| format!("{:02x}", b)).collect();

    let expected: String = include_str!("fixtures/chrome_120_hello.hex")
        .split_whitespace()
        .collect();
    assert_eq!(hex, expected);
    assert_eq!(parse_client_hello(&record).unwrap().ja3_string(), CHROME_120_JA3);
}

#[test]
fn test_synthesis_is_a_function_of_params() {
    let profile = ProfileRegistry::builtin().unwrap().get("safari-17").unwrap();
    let a = HelloParams::generate(&profile, "example.com");
    let mut b = HelloParams::generate(&profile, "example.com");
    assert_ne!(a.random, b.random);

    b.random = a.random;
    b.session_id = a.session_id.clone();
    b.grease = a.grease;
    b.key_shares = a.key_shares.clone();
    assert_eq!(
        synthesize(&profile, &a).unwrap(),
        synthesize(&profile, &b).unwrap()
    );
}

#[test]
fn test_profiles_differ_in_ja3() {
    let registry = ProfileRegistry::builtin().unwrap();
    let ja3: Vec<String> = registry
        .ids()
        .into_iter()
        .map(|id| {
            let profile = registry.get(id).unwrap();
            let record = synthesize(&profile, &HelloParams::generate(&profile, "a.test")).unwrap();
            parse_client_hello(&record).unwrap().ja3_hash()
        })
        .collect();
    assert_eq!(ja3.len(), 3);
    assert_ne!(ja3[0], ja3[1]);
    assert_ne!(ja3[1], ja3[2]);
    assert_ne!(ja3[0], ja3[2]);
}

#[tokio::test]
async fn test_first_flight_captured_on_the_wire() {
    let acceptor = tls_acceptor(&["http/1.1"]);
    let (listener, addr) = listener().await;
    let server = tokio::spawn(async move {
        let mut sock = accept(&listener).await;
        let hello = read_record(&mut sock).await;
        let mut tls = tokio_boring::accept(&acceptor, Replay::new(hello.clone(), sock))
            .await
            .unwrap();
        common::read_head(&mut tls).await;
        tls.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        hello
    });

    let client = Client::builder()
        .use_tls(true)
        .profile("chrome-120")
        .insecure_skip_verify(true)
        .build()
        .unwrap();
    let resp = client
        .get(format!("https://localhost:{}/", addr.port()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let info = parse_client_hello(&server.await.unwrap()).unwrap();
    assert_eq!(info.ja3_string(), CHROME_120_JA3);
    assert_eq!(info.server_name.as_deref(), Some("localhost"));
    assert_eq!(info.alpn_protocols, vec!["h2", "http/1.1"]);
}

#[tokio::test]
async fn test_firefox_settings_sent_over_tls() {
    let acceptor = tls_acceptor(&["h2"]);
    let (listener, addr) = listener().await;
    let server = tokio::spawn(async move {
        let tls = tokio_boring::accept(&acceptor, accept(&listener).await)
            .await
            .unwrap();
        let mut peer = H2Peer::new(tls);
        peer.preface().await;
        let settings = peer.frame().await;
        peer.settle().await;
        let (id, _) = peer.headers().await;
        peer.respond(id, &[(":status", "200")], b"").await;
        settings
    });

    let client = Client::builder()
        .use_tls(true)
        .profile("firefox-110")
        .insecure_skip_verify(true)
        .build()
        .unwrap();
    let resp = client
        .get(format!("https://localhost:{}/", addr.port()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.version(), http::Version::HTTP_2);

    assert_eq!(
        server.await.unwrap(),
        Frame::Settings {
            ack: false,
            settings: vec![(1, 65536), (4, 131072), (5, 16384)]
        }
    );
}

#[tokio::test]
async fn test_self_signed_rejected_unless_insecure() {
    let acceptor = tls_acceptor(&["http/1.1"]);
    let (listener, addr) = listener().await;
    tokio::spawn(async move {
        loop {
            let sock = accept(&listener).await;
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok(mut tls) = tokio_boring::accept(&acceptor, sock).await {
                    common::read_head(&mut tls).await;
                    let _ = tls
                        .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
                        .await;
                }
            });
        }
    });
    let url = format!("https://localhost:{}/", addr.port());

    let strict = Client::builder().build().unwrap();
    let err = strict.get(&url).send().await.unwrap_err();
    assert!(
        matches!(err, NetError::CertificateInvalid(_) | NetError::TlsHandshakeFailed(_)),
        "{:?}",
        err
    );

    let insecure = Client::builder().insecure_skip_verify(true).build().unwrap();
    assert_eq!(insecure.get(&url).send().await.unwrap().status(), 200);
}
