//! Cancellation and timeouts leave nothing behind in the pool.

mod common;

use common::{accept, listener, read_head, H2Peer};
use mimicnet::{Client, NetError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_cancel_in_flight_h1_request() {
    let (listener, addr) = listener().await;
    tokio::spawn(async move {
        let mut sock = accept(&listener).await;
        read_head(&mut sock).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let client = Client::builder().build().unwrap();
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = client
        .get(format!("http://{}/slow", addr))
        .cancel_token(token)
        .send()
        .await
        .unwrap_err();
    assert_eq!(err, NetError::Cancelled);
    assert!(client.pool().is_empty());
}

#[tokio::test]
async fn test_cancelled_before_send() {
    let (listener, addr) = listener().await;
    let client = Client::builder().build().unwrap();
    let token = CancellationToken::new();
    token.cancel();

    let err = client
        .get(format!("http://{}/", addr))
        .cancel_token(token)
        .send()
        .await
        .unwrap_err();
    assert_eq!(err, NetError::Cancelled);
    drop(listener);
}

#[tokio::test]
async fn test_cancel_h2_stream_resets_it() {
    let (listener, addr) = listener().await;
    let server = tokio::spawn(async move {
        let mut peer = H2Peer::new(accept(&listener).await);
        peer.preface().await;
        peer.settle().await;
        let (id, _) = peer.headers().await;
        loop {
            if let mimicnet::http::h2::frame::Frame::RstStream { stream_id, code } =
                peer.frame().await
            {
                return (id, stream_id, code.0);
            }
        }
    });

    let client = Client::builder().http2_prior_knowledge(true).build().unwrap();
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = client
        .get(format!("http://{}/", addr))
        .cancel_token(token)
        .send()
        .await
        .unwrap_err();
    assert_eq!(err, NetError::Cancelled);
    assert!(client.pool().is_empty());

    let (opened, reset, code) = server.await.unwrap();
    assert_eq!(opened, reset);
    // CANCEL
    assert_eq!(code, 0x8);
}

#[tokio::test]
async fn test_timeout_reported() {
    let (listener, addr) = listener().await;
    tokio::spawn(async move {
        let mut sock = accept(&listener).await;
        read_head(&mut sock).await;
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let client = Client::builder()
        .timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let err = client.get(format!("http://{}/", addr)).send().await.unwrap_err();
    assert_eq!(err, NetError::Timeout);
    assert!(client.pool().is_empty());
}

#[tokio::test]
async fn test_client_token_cancels_every_pending_request() {
    let (h1_listener, h1_addr) = listener().await;
    tokio::spawn(async move {
        loop {
            let mut sock = accept(&h1_listener).await;
            tokio::spawn(async move {
                read_head(&mut sock).await;
                tokio::time::sleep(Duration::from_secs(10)).await;
            });
        }
    });
    let (h2_listener, h2_addr) = listener().await;
    tokio::spawn(async move {
        loop {
            let mut peer = H2Peer::new(accept(&h2_listener).await);
            tokio::spawn(async move {
                peer.preface().await;
                peer.settle().await;
                tokio::time::sleep(Duration::from_secs(10)).await;
            });
        }
    });

    let token = CancellationToken::new();
    let h1 = Client::builder().cancel_token(token.clone()).build().unwrap();
    let h2 = Client::builder()
        .http2_prior_knowledge(true)
        .cancel_token(token.clone())
        .build()
        .unwrap();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let h1_url = format!("http://{}/", h1_addr);
    let h2_url = format!("http://{}/", h2_addr);
    let (a, b, c, d) = tokio::join!(
        h1.get(&h1_url).send(),
        h1.get(&h1_url).send(),
        h2.get(&h2_url).send(),
        h2.get(&h2_url).send(),
    );
    for result in [a, b, c, d] {
        assert_eq!(result.unwrap_err(), NetError::Cancelled);
    }
    assert!(h1.pool().is_empty());
    assert!(h2.pool().is_empty());
    assert!(h1.cancel_token().is_cancelled());

    // The client stays cancelled.
    assert_eq!(h1.get(&h1_url).send().await.unwrap_err(), NetError::Cancelled);
}
