// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Correlator behavior over real loopback sockets: cross-address isolation,
//! cancellation, timeout/retry bounds, malformed-reply absorption.

use lumen::{
    send_with_retry, CancelToken, Envelope, LinkConfig, RetryConfig, UdpLink,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;

/// Stub device answering with the given mac after a fixed delay.
async fn spawn_delayed_stub(mac: &'static str, delay: Duration) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        while let Ok((_, src)) = socket.recv_from(&mut buf).await {
            tokio::time::sleep(delay).await;
            let reply = json!({
                "method": "getPilot",
                "result": {"mac": mac, "state": true}
            });
            let _ = socket
                .send_to(&serde_json::to_vec(&reply).unwrap(), src)
                .await;
        }
    });
    addr
}

/// Bound socket that swallows everything it receives.
async fn spawn_blackhole() -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        while socket.recv_from(&mut buf).await.is_ok() {}
    });
    addr
}

fn loopback_link() -> Arc<UdpLink> {
    Arc::new(UdpLink::with_config(LinkConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        ..LinkConfig::default()
    }))
}

#[tokio::test(flavor = "multi_thread")]
async fn interleaved_replies_reach_their_own_requests() {
    // The slow target answers after the fast one: replies arrive in the
    // opposite order of the sends.
    let slow = spawn_delayed_stub("aa0000000001", Duration::from_millis(150)).await;
    let fast = spawn_delayed_stub("bb0000000002", Duration::from_millis(20)).await;
    let link = loopback_link();

    let timeout = Duration::from_secs(2);
    let get_pilot = Envelope::get_pilot();
    let (slow_reply, fast_reply) = tokio::join!(
        link.request(&get_pilot, slow, timeout, None),
        link.request(&get_pilot, fast, timeout, None),
    );

    assert_eq!(
        slow_reply.unwrap().result_mac(),
        Some("aa0000000001".parse().unwrap())
    );
    assert_eq!(
        fast_reply.unwrap().result_mac(),
        Some("bb0000000002".parse().unwrap())
    );
    assert_eq!(link.outstanding_requests(), 0);
    link.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_resolves_promptly_and_cleans_up() {
    let blackhole = spawn_blackhole().await;
    let link = loopback_link();

    let cancel = CancelToken::new();
    let request = {
        let link = Arc::clone(&link);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            link.request(
                &Envelope::get_pilot(),
                blackhole,
                Duration::from_secs(10),
                Some(&cancel),
            )
            .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(link.outstanding_requests(), 1);

    let fired = Instant::now();
    cancel.cancel();
    let result = request.await.unwrap();

    assert!(matches!(result, Err(lumen::Error::Cancelled)));
    assert!(fired.elapsed() < Duration::from_millis(500));
    assert_eq!(link.outstanding_requests(), 0);
    link.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn silent_target_times_out_within_retry_bound() {
    let blackhole = spawn_blackhole().await;
    let link = loopback_link();

    let timeout = Duration::from_millis(150);
    let retry = RetryConfig::default()
        .with_attempts(1)
        .with_delays(Duration::from_millis(50), Duration::from_millis(50));

    let started = Instant::now();
    let result = send_with_retry(&link, &Envelope::get_pilot(), blackhole, timeout, None, &retry)
        .await;
    let elapsed = started.elapsed();

    assert!(matches!(result, Err(lumen::Error::Timeout)));
    // Two timed-out attempts plus one backoff, never an indefinite hang.
    assert!(elapsed >= Duration::from_millis(300), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(2000), "elapsed {:?}", elapsed);
    assert_eq!(link.outstanding_requests(), 0);
    link.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_traffic_is_absorbed_not_fatal() {
    // Stub that first emits junk, then a valid reply.
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let stub = socket.local_addr().unwrap();
    tokio::spawn(async move {
        let mut buf = [0u8; 2048];
        while let Ok((_, src)) = socket.recv_from(&mut buf).await {
            let _ = socket.send_to(b"not a protocol document", src).await;
            let _ = socket.send_to(b"", src).await;
            tokio::time::sleep(Duration::from_millis(30)).await;
            let reply = json!({"method": "getPilot", "result": {"mac": "cc0000000003", "state": false}});
            let _ = socket
                .send_to(&serde_json::to_vec(&reply).unwrap(), src)
                .await;
        }
    });
    let link = loopback_link();

    let reply = link
        .request(&Envelope::get_pilot(), stub, Duration::from_secs(2), None)
        .await
        .unwrap();
    assert_eq!(reply.result_mac(), Some("cc0000000003".parse().unwrap()));
    link.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn operations_after_shutdown_are_rejected() {
    let blackhole = spawn_blackhole().await;
    let link = loopback_link();
    link.initialize(None).await.unwrap();
    link.shutdown();

    let result = link
        .request(&Envelope::get_pilot(), blackhole, Duration::from_secs(1), None)
        .await;
    assert!(matches!(result, Err(lumen::Error::Disposed)));

    let result = link.initialize(None).await;
    assert!(matches!(result, Err(lumen::Error::Disposed)));

    // Shutdown is idempotent.
    link.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn send_raw_is_fire_and_forget() {
    let blackhole = spawn_blackhole().await;
    let link = loopback_link();

    let payload = Envelope::get_pilot().encode().unwrap();
    let sent = link.send_raw(&payload, blackhole).await.unwrap();
    assert_eq!(sent, payload.len());
    assert_eq!(link.outstanding_requests(), 0);
    link.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn initialize_is_idempotent() {
    let link = loopback_link();
    link.initialize(None).await.unwrap();
    let first = link.local_addr().unwrap();

    link.initialize(Some("127.0.0.1:0".parse().unwrap()))
        .await
        .unwrap();
    assert_eq!(link.local_addr().unwrap(), first);

    let (a, b) = tokio::join!(link.initialize(None), link.initialize(None));
    a.unwrap();
    b.unwrap();
    assert_eq!(link.local_addr().unwrap(), first);
    link.shutdown();
}
