//! Browser-level DevTools WebSocket: command/response correlation plus an
//! event stream. Target sessions are multiplexed with `sessionId`
//! (flattened mode).

use std::collections::HashMap;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingTx = oneshot::Sender<Result<Value, String>>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CdpError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("failed to connect to DevTools: {0}")]
    Connect(String),
    #[error("DevTools connection closed")]
    Closed,
    #[error("CDP {method} timed out after {timeout:?}")]
    Timeout { method: String, timeout: Duration },
    /// Error object returned by the browser for a command.
    #[error("{0}")]
    Protocol(String),
}

/// An unsolicited protocol event.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

struct CdpCommand {
    method: String,
    params: Value,
    session_id: Option<String>,
    response_tx: PendingTx,
}

pub struct CdpConnection {
    cmd_tx: mpsc::Sender<CdpCommand>,
    events: broadcast::Sender<CdpEvent>,
    timeout: Duration,
    _handler: JoinHandle<()>,
}

impl CdpConnection {
    pub async fn connect(ws_url: &str, timeout: Duration) -> Result<Self, CdpError> {
        let (ws, _) = connect_async(ws_url)
            .await
            .map_err(|e| CdpError::Connect(e.to_string()))?;

        let (cmd_tx, cmd_rx) = mpsc::channel::<CdpCommand>(64);
        let (events, _) = broadcast::channel(256);
        let handler = tokio::spawn(handler_loop(ws, cmd_rx, events.clone()));

        Ok(Self {
            cmd_tx,
            events,
            timeout,
            _handler: handler,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CdpEvent> {
        self.events.subscribe()
    }

    /// Send a browser-level command.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, CdpError> {
        self.send(method, params, None).await
    }

    /// Send a command to an attached target session.
    pub async fn call_session(&self, session_id: &str, method: &str, params: Value) -> Result<Value, CdpError> {
        self.send(method, params, Some(session_id.to_string())).await
    }

    async fn send(&self, method: &str, params: Value, session_id: Option<String>) -> Result<Value, CdpError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(CdpCommand {
                method: method.into(),
                params,
                session_id,
                response_tx: tx,
            })
            .await
            .map_err(|_| CdpError::Closed)?;

        let result = tokio::time::timeout(self.timeout, rx)
            .await
            .map_err(|_| CdpError::Timeout {
                method: method.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|_| CdpError::Closed)?;

        result.map_err(CdpError::Protocol)
    }
}

async fn handler_loop(ws: WsStream, mut cmd_rx: mpsc::Receiver<CdpCommand>, events: broadcast::Sender<CdpEvent>) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut pending: HashMap<u64, PendingTx> = HashMap::new();
    let mut next_id: u64 = 1;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                let id = next_id;
                next_id += 1;
                let mut msg = json!({
                    "id": id,
                    "method": cmd.method,
                    "params": cmd.params,
                });
                if let Some(session_id) = cmd.session_id {
                    msg["sessionId"] = Value::String(session_id);
                }
                let _ = pending.insert(id, cmd.response_tx);
                if ws_tx.send(Message::Text(msg.to_string().into())).await.is_err() {
                    break;
                }
            }
            msg = ws_rx.next() => {
                let Some(Ok(msg)) = msg else { break };
                let Message::Text(text) = msg else { continue };
                let Ok(val) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                if let Some(id) = val.get("id").and_then(Value::as_u64) {
                    if let Some(tx) = pending.remove(&id) {
                        if let Some(err) = val.get("error") {
                            let msg = err["message"].as_str().unwrap_or("CDP error");
                            let _ = tx.send(Err(msg.into()));
                        } else {
                            let _ = tx.send(Ok(val["result"].clone()));
                        }
                    }
                } else if let Some(method) = val.get("method").and_then(Value::as_str) {
                    let _ = events.send(CdpEvent {
                        method: method.to_string(),
                        params: val["params"].clone(),
                        session_id: val["sessionId"].as_str().map(str::to_string),
                    });
                }
            }
        }
    }
    tracing::debug!(pending = pending.len(), "DevTools handler loop exited");
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::testing::FakeDevTools;
    use super::*;

    #[tokio::test]
    async fn correlates_responses_by_id() {
        let fake = FakeDevTools::start(Arc::new(|method, _| match method {
            "Browser.getVersion" => Ok(json!({"product": "Chrome/130"})),
            other => Err(format!("'{other}' wasn't found")),
        }))
        .await;
        let conn = CdpConnection::connect(&fake.url, Duration::from_secs(5)).await.unwrap();

        let version = conn.call("Browser.getVersion", json!({})).await.unwrap();
        assert_eq!(version["product"], "Chrome/130");

        let err = conn.call("Nope.nothing", json!({})).await.unwrap_err();
        assert_eq!(err, CdpError::Protocol("'Nope.nothing' wasn't found".into()));
    }

    #[tokio::test]
    async fn session_commands_carry_session_id() {
        let fake = FakeDevTools::start(Arc::new(|_, _| Ok(json!({})))).await;
        let conn = CdpConnection::connect(&fake.url, Duration::from_secs(5)).await.unwrap();

        conn.call_session("S-1", "Runtime.evaluate", json!({"expression": "1"}))
            .await
            .unwrap();
        let calls = fake.calls.lock();
        assert_eq!(calls[0].0, "Runtime.evaluate");
        assert_eq!(calls[0].2.as_deref(), Some("S-1"));
    }

    #[tokio::test]
    async fn connect_failure_is_reported() {
        let err = CdpConnection::connect("ws://127.0.0.1:1/devtools", Duration::from_secs(1))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, CdpError::Connect(_)));
    }
}
