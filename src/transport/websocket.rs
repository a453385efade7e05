// ABOUTME: WebSocket transport implementation over tokio-tungstenite
// ABOUTME: One spawned task per connection attempt, reporting progress through an EventSink

use crate::error::Error;
use crate::transport::{CloseInfo, Connection, EventSink, Transport};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

/// Close code used when the peer's close frame carried no status
const NO_STATUS_RECEIVED: u16 = 1005;

/// How long to wait for the peer to echo our close frame
const CLOSE_LINGER: Duration = Duration::from_secs(1);

/// WebSocket transport
#[derive(Debug, Clone)]
pub struct WsTransport {
    handshake_timeout: Duration,
}

impl Default for WsTransport {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl WsTransport {
    /// Transport with a 10 second handshake timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up on a handshake that has not completed after `timeout`
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

impl Transport for WsTransport {
    fn open(&self, endpoint: &str, events: EventSink) -> Result<Box<dyn Connection>, Error> {
        let request = endpoint
            .into_client_request()
            .map_err(|e| Error::Connection(format!("invalid endpoint {}: {}", endpoint, e)))?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let opened = Arc::new(AtomicBool::new(false));

        let task = runtime.spawn(run_connection(
            request,
            self.handshake_timeout,
            command_rx,
            events,
            Arc::clone(&opened),
        ));

        Ok(Box::new(WsConnection {
            commands,
            task,
            opened,
        }))
    }
}

enum Command {
    Send(String),
    Close(u16, String),
}

/// Handle to one connection task
struct WsConnection {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
    opened: Arc<AtomicBool>,
}

impl Connection for WsConnection {
    fn send(&mut self, frame: String) -> Result<(), Error> {
        self.commands
            .send(Command::Send(frame))
            .map_err(|_| Error::Connection("connection task has exited".to_string()))
    }

    fn close(&mut self, code: u16, reason: &str) {
        // Still handshaking: nothing to close gracefully
        if !self.opened.load(Ordering::SeqCst) {
            self.task.abort();
            return;
        }

        let _ = self.commands.send(Command::Close(code, reason.to_string()));
    }
}

async fn run_connection<R>(
    request: R,
    handshake_timeout: Duration,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: EventSink,
    opened: Arc<AtomicBool>,
) where
    R: IntoClientRequest + Unpin,
{
    let ws_stream = match tokio::time::timeout(handshake_timeout, connect_async(request)).await {
        Ok(Ok((ws_stream, _))) => ws_stream,
        Ok(Err(e)) => {
            let error = Error::Connection(e.to_string());
            events.errored(&error);
            events.closed(CloseInfo::abnormal(error.to_string()));
            return;
        }
        Err(_) => {
            let error = Error::Connection(format!(
                "handshake timed out after {}ms",
                handshake_timeout.as_millis()
            ));
            events.errored(&error);
            events.closed(CloseInfo::abnormal(error.to_string()));
            return;
        }
    };

    opened.store(true, Ordering::SeqCst);
    events.opened();

    let (mut write, mut read) = ws_stream.split();
    let mut peer_close: Option<CloseInfo> = None;

    let info = loop {
        tokio::select! {
            command = commands.recv() => {
                let (code, reason) = match command {
                    Some(Command::Send(frame)) => {
                        if let Err(e) = write.send(WsMessage::Text(frame.into())).await {
                            log::error!("WebSocket send failed: {}", e);
                        }
                        continue;
                    }
                    Some(Command::Close(code, reason)) => (code, reason),
                    // Handle dropped without an explicit close
                    None => (1000, String::new()),
                };

                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: reason.clone().into(),
                };
                if let Err(e) = write.send(WsMessage::Close(Some(frame))).await {
                    log::debug!("WebSocket close frame not sent: {}", e);
                }

                // Let the peer finish the closing handshake
                let _ = tokio::time::timeout(CLOSE_LINGER, async {
                    while let Some(Ok(_)) = read.next().await {}
                })
                .await;

                break CloseInfo::clean(code, reason);
            }
            message = read.next() => {
                match message {
                    Some(Ok(WsMessage::Text(text))) => events.message(text.as_str()),
                    Some(Ok(WsMessage::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                        Ok(text) => events.message(text),
                        Err(_) => log::warn!("Dropping non-UTF-8 binary frame ({} bytes)", bytes.len()),
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        let info = match frame {
                            Some(frame) => CloseInfo::clean(u16::from(frame.code), frame.reason.as_str()),
                            None => CloseInfo::clean(NO_STATUS_RECEIVED, ""),
                        };
                        log::debug!("Peer sent close frame (code {})", info.code);
                        peer_close = Some(info);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        break match peer_close.take() {
                            Some(info) => info,
                            None => {
                                let error = Error::WebSocket(e.to_string());
                                events.errored(&error);
                                CloseInfo::abnormal(error.to_string())
                            }
                        };
                    }
                    None => {
                        break peer_close
                            .take()
                            .unwrap_or_else(|| CloseInfo::abnormal("stream ended without close frame"));
                    }
                }
            }
        }
    };

    events.closed(info);
}
