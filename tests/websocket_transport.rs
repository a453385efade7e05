use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use vigil::{Channel, ChannelState, Envelope, ReconnectConfig, WsTransport};

async fn wait_until<F>(what: &str, condition: F)
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    (listener, url)
}

fn fast_retry(max_attempts: u32) -> ReconnectConfig {
    ReconnectConfig {
        max_attempts,
        delay_ms: 50,
    }
}

#[tokio::test]
async fn test_queued_frame_reaches_server_and_reply_is_dispatched() {
    let (listener, url) = listener().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let first = match ws.next().await {
            Some(Ok(WsMessage::Text(text))) => text.to_string(),
            other => panic!("unexpected frame: {:?}", other),
        };

        ws.send(WsMessage::Text(
            r#"{"type":"camera_status","data":{"cameraId":3,"status":1}}"#.into(),
        ))
        .await
        .unwrap();

        // Hold the socket open until the client leaves
        while let Some(Ok(_)) = ws.next().await {}
        first
    });

    let channel = Channel::new(url, WsTransport::new()).unwrap();
    let received: Arc<Mutex<Vec<Envelope>>> = Default::default();
    let sink = Arc::clone(&received);
    channel.add_handler(move |envelope| sink.lock().push(envelope.clone()));

    channel.send_raw(r#"{"type":"check_camera","data":{"cameraId":3}}"#.to_string());

    wait_until("connection", || channel.is_connected()).await;
    wait_until("reply", || !received.lock().is_empty()).await;

    assert_eq!(received.lock()[0].kind, "camera_status");
    assert_eq!(received.lock()[0].camera_id(), Some(3));

    channel.close();
    let first = server.await.unwrap();
    assert_eq!(first, r#"{"type":"check_camera","data":{"cameraId":3}}"#);
}

#[tokio::test]
async fn test_abrupt_drop_triggers_reconnect() {
    let (listener, url) = listener().await;
    let accepted = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        // First connection is dropped without a close frame
        let (stream, _) = listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        *counter.lock() += 1;
        drop(ws);

        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        *counter.lock() += 1;
        while let Some(Ok(_)) = ws.next().await {}
    });

    let channel = Channel::builder(url, WsTransport::new())
        .reconnect(fast_retry(5))
        .build()
        .unwrap();
    channel.connect();

    wait_until("second connection", || *accepted.lock() == 2).await;
    wait_until("reopen", || channel.is_connected()).await;
    assert_eq!(channel.reconnect_attempts(), 0);

    channel.close();
}

#[tokio::test]
async fn test_peer_normal_close_is_not_retried() {
    let (listener, url) = listener().await;

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.close(None).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let channel = Channel::builder(url, WsTransport::new())
        .reconnect(fast_retry(5))
        .build()
        .unwrap();
    channel.connect();

    wait_until("open", || channel.is_connected()).await;
    wait_until("close", || channel.state() == ChannelState::Closed).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!channel.reconnect_pending());
    assert_eq!(channel.reconnect_attempts(), 0);
}

#[tokio::test]
async fn test_refused_connection_exhausts_retries() {
    let (listener, url) = listener().await;
    // Free the port so nothing is listening
    drop(listener);

    let channel = Channel::builder(url, WsTransport::new())
        .reconnect(fast_retry(2))
        .build()
        .unwrap();
    channel.connect();

    wait_until("retries exhausted", || {
        channel.reconnect_attempts() == 2
            && !channel.reconnect_pending()
            && channel.state() == ChannelState::Closed
    })
    .await;
}

#[tokio::test]
async fn test_invalid_endpoint_is_establishment_failure() {
    let channel = Channel::builder("not a url", WsTransport::new())
        .reconnect(fast_retry(1))
        .build()
        .unwrap();
    channel.connect();

    assert_eq!(channel.state(), ChannelState::Closed);
    assert!(channel.reconnect_pending());
    channel.close();
    assert!(!channel.reconnect_pending());
}

#[tokio::test]
async fn test_close_sends_normal_closure() {
    let (listener, url) = listener().await;

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Close(frame))) => {
                    return frame.map(|f| (u16::from(f.code), f.reason.as_str().to_string()));
                }
                Some(Ok(_)) => continue,
                _ => return None,
            }
        }
    });

    let channel = Channel::new(url, WsTransport::new()).unwrap();
    channel.connect();
    wait_until("open", || channel.is_connected()).await;

    channel.close();
    assert_eq!(channel.state(), ChannelState::Closed);

    let frame = server.await.unwrap();
    assert_eq!(frame, Some((1000, "Normal closure".to_string())));
}
