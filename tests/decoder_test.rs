//! Content-Encoding handling through the client.

mod common;

use common::{accept, listener, read_head};
use flate2::write::GzEncoder;
use flate2::Compression;
use mimicnet::{Client, NetError};
use std::io::Write;
use tokio::io::AsyncWriteExt;

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn brotli(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
        writer.write_all(data).unwrap();
    }
    out
}

/// Serve `body` once with the given Content-Encoding.
async fn serve(encoding: &'static str, body: Vec<u8>) -> std::net::SocketAddr {
    let (listener, addr) = listener().await;
    tokio::spawn(async move {
        let mut sock = accept(&listener).await;
        read_head(&mut sock).await;
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Encoding: {}\r\nContent-Length: {}\r\n\r\n",
            encoding,
            body.len()
        );
        sock.write_all(head.as_bytes()).await.unwrap();
        sock.write_all(&body).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_gzip_json_body() {
    let addr = serve("gzip", gzip(b"{\"ok\":true}")).await;
    let client = Client::builder().build().unwrap();
    let resp = client.get(format!("http://{}/", addr)).send().await.unwrap();

    assert_ne!(resp.raw_body().as_ref(), b"{\"ok\":true}");
    let value: serde_json::Value = resp.json().unwrap();
    assert_eq!(value, serde_json::json!({"ok": true}));
}

#[tokio::test]
async fn test_chained_codings_undone_in_reverse() {
    // Applied gzip first, then br
    let addr = serve("gzip, br", brotli(&gzip(b"layered"))).await;
    let client = Client::builder().build().unwrap();
    let resp = client.get(format!("http://{}/", addr)).send().await.unwrap();
    assert_eq!(resp.text().unwrap(), "layered");
}

#[tokio::test]
async fn test_unknown_coding_reported_on_read() {
    let addr = serve("zstd", b"whatever".to_vec()).await;
    let client = Client::builder().build().unwrap();
    let resp = client.get(format!("http://{}/", addr)).send().await.unwrap();

    assert_eq!(resp.status(), 200);
    assert!(matches!(resp.text(), Err(NetError::UnknownContentEncoding(_))));
    assert_eq!(resp.raw_body().as_ref(), b"whatever");
    assert_eq!(resp.body_with_encoding("identity").unwrap().as_ref(), b"whatever");
}
