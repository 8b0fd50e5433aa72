use anyhow::{Result, anyhow};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

/// Per-command response timeout, the implicit-wait analogue of the driver.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

static GLOBAL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Returns a unique incremental ID for request messages.
pub(crate) fn next_id() -> u64 {
    GLOBAL_ID_COUNTER.fetch_add(1, Ordering::SeqCst) + 1
}

/// A command response frame.
#[derive(Debug, Deserialize)]
pub(crate) struct Response {
    pub(crate) id: u64,
    #[serde(default)]
    pub(crate) result: Value,
    pub(crate) error: Option<CommandError>,
}

/// The error object the protocol attaches to a failed command.
#[derive(Debug, Deserialize)]
pub(crate) struct CommandError {
    pub(crate) code: i64,
    pub(crate) message: String,
}

/// An event frame, tagged with the session it belongs to.
#[derive(Debug, Deserialize)]
pub(crate) struct Event {
    pub(crate) method: String,
    #[serde(default)]
    pub(crate) params: Value,
    #[serde(rename = "sessionId")]
    pub(crate) session_id: Option<String>,
}

/// Messages sent to the transport actor.
#[derive(Debug)]
enum TransportMessage {
    /// A command with a response sender.
    Request(Value, oneshot::Sender<Result<Value>>),
    /// One-shot wait for the next event of `method` on `session_id`.
    ListenEvent {
        session_id: String,
        method: String,
        tx: oneshot::Sender<Value>,
    },
    /// Close the connection, optionally asking the browser to quit first.
    Shutdown {
        close_browser: bool,
        done: oneshot::Sender<()>,
    },
}

/// Internal actor owning the WebSocket and the request/event routing tables.
struct TransportActor {
    pending_requests: HashMap<u64, oneshot::Sender<Result<Value>>>,
    event_listeners: HashMap<(String, String), Vec<oneshot::Sender<Value>>>,
    ws_sink: SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>,
    command_rx: mpsc::Receiver<TransportMessage>,
}

impl TransportActor {
    /// Event loop handling incoming/outgoing WebSocket messages and commands.
    async fn run(mut self, mut ws_stream: SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>) {
        loop {
            tokio::select! {
                Some(msg) = ws_stream.next() => {
                    match msg {
                        Ok(Message::Text(text)) => self.route_frame(&text),
                        Err(_) => break,
                        _ => {}
                    }
                }
                Some(msg) = self.command_rx.recv() => {
                    match msg {
                        TransportMessage::Request(cmd, tx) => {
                            if let Some(id) = cmd["id"].as_u64()
                                && let Ok(text) = serde_json::to_string(&cmd)
                            {
                                if self.ws_sink.send(Message::Text(text)).await.is_ok() {
                                    self.pending_requests.insert(id, tx);
                                } else {
                                    let _ = tx.send(Err(anyhow!("WebSocket send failed")));
                                }
                            }
                        }
                        TransportMessage::ListenEvent { session_id, method, tx } => {
                            self.event_listeners
                                .entry((session_id, method))
                                .or_default()
                                .push(tx);
                        }
                        TransportMessage::Shutdown { close_browser, done } => {
                            if close_browser {
                                let _ = self.ws_sink.send(Message::Text(json!({
                                    "id": next_id(),
                                    "method": "Browser.close",
                                    "params": {}
                                }).to_string())).await;
                            }
                            let _ = self.ws_sink.close().await;
                            let _ = done.send(());
                            break;
                        }
                    }
                }
                else => break,
            }
        }
    }

    /// Dispatch one incoming frame to its pending request or event listeners.
    fn route_frame(&mut self, text: &str) {
        if let Ok(response) = serde_json::from_str::<Response>(text) {
            if let Some(sender) = self.pending_requests.remove(&response.id) {
                let outcome = match response.error {
                    Some(e) => Err(anyhow!("CDP error {}: {}", e.code, e.message)),
                    None => Ok(response.result),
                };
                let _ = sender.send(outcome);
            }
        } else if let Ok(event) = serde_json::from_str::<Event>(text) {
            let key = (event.session_id.unwrap_or_default(), event.method);
            if let Some(listeners) = self.event_listeners.remove(&key) {
                for tx in listeners {
                    let _ = tx.send(event.params.clone());
                }
            }
        }
    }
}

/// Asynchronous transport to a browser's DevTools WebSocket.
///
/// Sessions are flattened: commands addressed to an attached target carry a
/// top-level `sessionId`, and events come back tagged the same way.
#[derive(Debug)]
pub(crate) struct Transport {
    tx: mpsc::Sender<TransportMessage>,
}

impl Transport {
    /// Connect to the given WebSocket URL and spawn the transport actor.
    pub(crate) async fn new(ws_url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(ws_url).await?;
        let (ws_sink, ws_stream) = ws_stream.split();
        let (tx, rx) = mpsc::channel(100);

        let actor = TransportActor {
            pending_requests: HashMap::new(),
            event_listeners: HashMap::new(),
            ws_sink,
            command_rx: rx,
        };
        tokio::spawn(actor.run(ws_stream));

        Ok(Self { tx })
    }

    /// Send a browser-level command and await its result object.
    pub(crate) async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.send_raw(json!({
            "id": next_id(),
            "method": method,
            "params": params
        }))
        .await
    }

    /// Send a command scoped to an attached session.
    pub(crate) async fn send_to_session(
        &self,
        session_id: &str,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        self.send_raw(json!({
            "id": next_id(),
            "method": method,
            "params": params,
            "sessionId": session_id
        }))
        .await
    }

    async fn send_raw(&self, command: Value) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TransportMessage::Request(command, tx))
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        time::timeout(COMMAND_TIMEOUT, rx)
            .await
            .map_err(|_| anyhow!("Timeout while waiting for response"))?
            .map_err(|_| anyhow!("Response channel closed"))?
    }

    /// Register a one-shot listener for the next `method` event on a session.
    /// Register before triggering the action that fires the event.
    pub(crate) async fn listen_for_event(
        &self,
        session_id: &str,
        method: &str,
    ) -> Result<oneshot::Receiver<Value>> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(TransportMessage::ListenEvent {
                session_id: session_id.to_string(),
                method: method.to_string(),
                tx,
            })
            .await
            .map_err(|_| anyhow!("Transport actor dropped"))?;
        Ok(rx)
    }

    /// Close the connection. `close_browser` additionally asks the browser to
    /// quit, which is only appropriate for a process we spawned ourselves.
    pub(crate) async fn shutdown(&self, close_browser: bool) {
        let (tx, rx) = oneshot::channel();
        if self
            .tx
            .send(TransportMessage::Shutdown {
                close_browser,
                done: tx,
            })
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_frame_parses_with_result() {
        let res: Response =
            serde_json::from_str(r#"{"id":3,"result":{"targetId":"abc"},"sessionId":"s1"}"#)
                .unwrap();
        assert_eq!(res.id, 3);
        assert_eq!(res.result["targetId"], "abc");
        assert!(res.error.is_none());
    }

    #[test]
    fn error_frame_carries_code_and_message() {
        let res: Response =
            serde_json::from_str(r#"{"id":9,"error":{"code":-32000,"message":"Not allowed"}}"#)
                .unwrap();
        let err = res.error.unwrap();
        assert_eq!(err.code, -32000);
        assert_eq!(err.message, "Not allowed");
        assert!(res.result.is_null());
    }

    #[test]
    fn event_frame_is_not_mistaken_for_a_response() {
        let text = r#"{"method":"Page.loadEventFired","params":{"timestamp":1.0},"sessionId":"s1"}"#;
        assert!(serde_json::from_str::<Response>(text).is_err());
        let event: Event = serde_json::from_str(text).unwrap();
        assert_eq!(event.method, "Page.loadEventFired");
        assert_eq!(event.session_id.as_deref(), Some("s1"));
        assert_eq!(event.params["timestamp"], 1.0);
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = next_id();
        let b = next_id();
        assert!(b > a);
    }
}
