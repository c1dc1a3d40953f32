//! Failure injection tests for the query bridge.

use futures_util::SinkExt;
use serde_json::json;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message as WsMessage;

mod common;

#[tokio::test]
async fn test_no_peer_fails_fast() {
    let bridge = common::start_bridge(2000).await;
    let client = common::http_client();

    let started = std::time::Instant::now();
    let res = client.get(bridge.http_url("/query")).send().await.expect("Bridge unreachable");

    assert_eq!(res.status(), 500);
    assert_eq!(res.text().await.unwrap(), "no active backend connection");
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(bridge.manager.table().stats().snapshot().registered, 0);

    bridge.shutdown.trigger();
}

#[tokio::test]
async fn test_method_not_allowed() {
    let bridge = common::start_bridge(2000).await;
    let client = common::http_client();

    let res = client.post(bridge.http_url("/query")).send().await.unwrap();
    assert_eq!(res.status(), 405);

    let res = client
        .request(reqwest::Method::OPTIONS, bridge.http_url("/query"))
        .header("Origin", "http://localhost")
        .header("Access-Control-Request-Method", "GET")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");

    bridge.shutdown.trigger();
}

#[tokio::test]
async fn test_peer_disconnect_clears_connection() {
    let bridge = common::start_bridge(2000).await;
    let mut peer = bridge.connect_peer().await;

    peer.close(None).await.unwrap();
    bridge.wait_disconnected().await;

    let res = common::http_client().get(bridge.http_url("/query")).send().await.unwrap();
    assert_eq!(res.status(), 500);
    assert_eq!(res.text().await.unwrap(), "no active backend connection");

    bridge.shutdown.trigger();
}

#[tokio::test]
async fn test_malformed_reply_clears_connection() {
    let bridge = common::start_bridge(2000).await;
    let mut peer = bridge.connect_peer().await;

    peer.send(WsMessage::text("this is not json")).await.unwrap();
    bridge.wait_disconnected().await;

    bridge.shutdown.trigger();
}

#[tokio::test]
async fn test_new_peer_supersedes_old() {
    let bridge = common::start_bridge(300).await;
    let mut old_peer = bridge.connect_peer().await;
    let client = common::http_client();

    // A query waiting on the old peer keeps its own deadline.
    let url = bridge.http_url("/query");
    let waiting = tokio::spawn({
        let client = client.clone();
        async move {
            let started = std::time::Instant::now();
            let res = client.get(url).send().await.unwrap();
            (res.status(), started.elapsed())
        }
    });
    let old_query = common::next_query(&mut old_peer).await;

    let new_peer = bridge.connect_peer().await;
    let new_id = bridge.manager.connection_id().await;

    // The superseded socket is closed by the bridge.
    let old_closed = tokio::time::timeout(Duration::from_secs(2), async {
        use futures_util::StreamExt;
        loop {
            match old_peer.next().await {
                None | Some(Err(_)) | Some(Ok(WsMessage::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(old_closed.is_ok(), "old peer should be closed");
    assert_eq!(old_query["type"], "query");

    let (status, elapsed) = waiting.await.unwrap();
    assert_eq!(status, 500);
    assert!(elapsed >= Duration::from_millis(300));

    // The old pump exiting must not detach the new peer.
    assert!(bridge.manager.is_connected().await);
    assert_eq!(bridge.manager.connection_id().await, new_id);

    let _peer_task = common::spawn_answering_peer(new_peer, json!("new"));
    let res = client.get(bridge.http_url("/query")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), r#""new""#);

    bridge.shutdown.trigger();
}

#[tokio::test]
async fn test_unresponsive_peer_times_out() {
    let bridge = common::start_bridge(250).await;
    let mut peer = bridge.connect_peer().await;
    let client = common::http_client();

    let url = bridge.http_url("/query");
    let request = tokio::spawn(async move { client.get(url).send().await.unwrap() });

    // Read the query but never answer it.
    let _ = common::next_query(&mut peer).await;

    let res = request.await.unwrap();
    assert_eq!(res.status(), 500);
    assert!(res.text().await.unwrap().contains("timeout"));
    assert_eq!(bridge.manager.pending_count(), 0);
    assert_eq!(bridge.manager.table().stats().snapshot().timed_out, 1);

    bridge.shutdown.trigger();
}
