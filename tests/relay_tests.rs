//! End-to-end relay tests driven over real WebSocket connections, mirroring
//! the scenarios enumerated in the specification's testable-properties
//! section: basic relay, binary preservation, fan-out, bad path rejection,
//! reconnecting after a channel's last subscriber leaves, and coalescing
//! under a publisher that outruns a subscriber.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message as TMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const PING_MS: u64 = 60_000;

/// Binds an ephemeral port, spawns the relay, and returns its address along
/// with a handle that aborts the server when dropped.
async fn spawn_relay() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let (listener, addr) = relay_server::server::bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let handle = tokio::spawn(async move {
        let _ = relay_server::server::serve(listener, Duration::from_millis(PING_MS)).await;
    });
    (addr, handle)
}

type Ws = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(addr: SocketAddr, path: &str) -> Ws {
    let url = format!("ws://{}{}", addr, path);
    let (ws, _) = connect_async(url).await.expect("connect");
    ws
}

/// Every connection's first frame is the ping-duration handshake.
async fn expect_handshake(ws: &mut Ws) {
    match ws.next().await.expect("stream open").expect("frame") {
        TMessage::Text(text) => assert_eq!(text, format!("{:x}", PING_MS)),
        other => panic!("expected handshake text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn basic_relay() {
    let (addr, _server) = spawn_relay().await;

    let mut sub = connect(addr, "/room/sub").await;
    expect_handshake(&mut sub).await;

    let mut publ = connect(addr, "/room/pub").await;
    expect_handshake(&mut publ).await;

    publ.send(TMessage::Text("hello".into())).await.unwrap();

    match sub.next().await.unwrap().unwrap() {
        TMessage::Text(text) => assert_eq!(text, "hello"),
        other => panic!("expected text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn binary_preservation() {
    let (addr, _server) = spawn_relay().await;

    let mut sub = connect(addr, "/room/sub").await;
    expect_handshake(&mut sub).await;
    let mut publ = connect(addr, "/room/pub").await;
    expect_handshake(&mut publ).await;

    let payload = vec![0xDE, 0xAD, 0xBE, 0xEF];
    publ.send(TMessage::Binary(payload.clone())).await.unwrap();

    match sub.next().await.unwrap().unwrap() {
        TMessage::Binary(bytes) => assert_eq!(bytes, payload),
        other => panic!("expected binary frame, got {other:?}"),
    }
}

#[tokio::test]
async fn fan_out_to_all_subscribers() {
    let (addr, _server) = spawn_relay().await;

    let mut subs = Vec::new();
    for _ in 0..3 {
        let mut sub = connect(addr, "/x/sub").await;
        expect_handshake(&mut sub).await;
        subs.push(sub);
    }

    let mut publ = connect(addr, "/x/pub").await;
    expect_handshake(&mut publ).await;
    publ.send(TMessage::Text("m1".into())).await.unwrap();

    for mut sub in subs {
        match sub.next().await.unwrap().unwrap() {
            TMessage::Text(text) => assert_eq!(text, "m1"),
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn bad_path_is_rejected_with_404() {
    let (addr, _server) = spawn_relay().await;

    // A channel name containing `/` is the case the handler's 404 branch
    // actually fires for: drive a genuine WebSocket upgrade handshake so
    // `parse_path` runs inside `upgrade_handler`, rather than a bare HTTP
    // request that axum's `WebSocketUpgrade` extractor would itself reject
    // before the handler body ever runs.
    let url = format!("ws://{}/a/b/pub", addr);
    let result = connect_async(url).await;
    let err = result.err().expect("upgrade to a `/`-containing channel name must be rejected");
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 404);
        }
        other => panic!("expected an HTTP 404 upgrade rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn reconnecting_after_last_subscriber_leaves_works() {
    let (addr, _server) = spawn_relay().await;

    let mut sub = connect(addr, "/tmp/sub").await;
    expect_handshake(&mut sub).await;
    sub.close(None).await.unwrap();
    drop(sub);

    // Give the server a moment to observe the close and run teardown.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // The channel-lifetime invariant itself (at most one Channel per name,
    // usage == 0 iff absent from the hub, resurrection race handled) is
    // exercised directly against `ChannelHub` in `src/hub.rs`'s unit tests,
    // where the hub's internal state is actually observable. Here we only
    // confirm the end-to-end path stays healthy once a channel's last
    // subscriber has gone away: a fresh publisher must still be able to
    // connect to the same name and send without error.
    let mut publ = connect(addr, "/tmp/pub").await;
    expect_handshake(&mut publ).await;
    publ.send(TMessage::Text("after-teardown".into())).await.unwrap();
    publ.send(TMessage::Text("still-alive".into())).await.unwrap();
}

#[tokio::test]
async fn subscriber_receives_only_latest_message_under_coalescing() {
    let (addr, _server) = spawn_relay().await;

    let mut sub = connect(addr, "/coalesce/sub").await;
    expect_handshake(&mut sub).await;
    let mut publ = connect(addr, "/coalesce/pub").await;
    expect_handshake(&mut publ).await;

    publ.send(TMessage::Text("m1".into())).await.unwrap();
    publ.send(TMessage::Text("m2".into())).await.unwrap();
    publ.send(TMessage::Text("m3".into())).await.unwrap();

    // Drain every frame the subscriber actually receives. Coalescing means
    // intermediate messages may be dropped, but the first delivered frame
    // must be m1 (already in flight before m2/m3 arrived) and the last
    // frame received must be m3 — m2 is allowed to vanish.
    let mut received = Vec::new();
    loop {
        let frame = tokio::time::timeout(Duration::from_millis(500), sub.next()).await;
        match frame {
            Ok(Some(Ok(TMessage::Text(text)))) => received.push(text),
            _ => break,
        }
    }

    assert!(!received.is_empty());
    assert_eq!(received.first().unwrap(), "m1");
    assert_eq!(received.last().unwrap(), "m3");
    assert!(received.len() <= 3);
}
