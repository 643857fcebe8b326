use std::sync::Arc;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use columbus_engine::ScanOrchestrator;
use columbus_telemetry::SqliteLogSink;

use crate::client::{self, ClientId, ClientRegistry};
use crate::event_bridge;
use crate::handlers::{self, HandlerState};
use crate::rpc::{self, ControlRequest};

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7777,
            max_send_queue: 256,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
    pub client_registry: Arc<ClientRegistry>,
    pub message_tx: mpsc::Sender<(ClientId, String)>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/control", post(control_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Bind and serve. Scan events from `orchestrator` are pushed to every
/// WebSocket client until the returned handle is shut down. `logs` backs
/// `GET_LOGS`.
pub async fn start(
    config: ServerConfig,
    orchestrator: Arc<ScanOrchestrator>,
    logs: Option<Arc<SqliteLogSink>>,
) -> Result<ServerHandle, std::io::Error> {
    let client_registry = Arc::new(ClientRegistry::new(config.max_send_queue));

    let bridge = event_bridge::create_bridge(Arc::clone(&client_registry), orchestrator.subscribe());
    let cleanup = client::start_cleanup_task(Arc::clone(&client_registry), std::time::Duration::from_secs(60));

    let (msg_tx, msg_rx) = mpsc::channel::<(ClientId, String)>(1024);
    let handler_state = Arc::new(HandlerState::new(orchestrator, logs));

    let control = tokio::spawn(process_ws_messages(
        msg_rx,
        Arc::clone(&handler_state),
        Arc::clone(&client_registry),
    ));

    let router = build_router(AppState {
        handler_state,
        client_registry,
        message_tx: msg_tx,
    });
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, "control server listening");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "control server stopped");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        tasks: vec![server, bridge, control, cleanup],
    })
}

/// Keeps the server's background tasks; `shutdown` aborts them.
pub struct ServerHandle {
    pub port: u16,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl ServerHandle {
    pub fn shutdown(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn control_handler(State(state): State<AppState>, body: String) -> impl IntoResponse {
    let request: ControlRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(error = %e, "unparseable control message");
            return (StatusCode::BAD_REQUEST, Json(rpc::parse_error()));
        }
    };
    (StatusCode::OK, Json(handlers::dispatch(&state.handler_state, &request).await))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, rx) = state.client_registry.register();
    tracing::info!(client_id = %client_id, "WebSocket client connected");
    client::handle_ws_connection(socket, client_id, rx, state.client_registry, state.message_tx).await;
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(handlers::health(&state.handler_state))
}

/// Answer control messages arriving over WebSocket connections in-band.
async fn process_ws_messages(
    mut rx: mpsc::Receiver<(ClientId, String)>,
    state: Arc<HandlerState>,
    registry: Arc<ClientRegistry>,
) {
    while let Some((client_id, raw)) = rx.recv().await {
        let state = Arc::clone(&state);
        let registry = Arc::clone(&registry);
        // START_SCAN waits on the prompt source; don't hold up other clients.
        tokio::spawn(async move {
            let reply = match serde_json::from_str::<ControlRequest>(&raw) {
                Ok(request) => {
                    let reply = handlers::dispatch(&state, &request).await;
                    rpc::with_request_id(reply, request.request_id)
                }
                Err(_) => rpc::parse_error(),
            };
            if let Ok(json) = serde_json::to_string(&reply) {
                registry.send_to(&client_id, json);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio_tungstenite::tungstenite::Message;

    use crate::handlers::tests::state_with;

    async fn serve() -> (ServerHandle, Arc<ScanOrchestrator>) {
        let orchestrator = Arc::clone(&state_with(1).orchestrator);
        let config = ServerConfig {
            port: 0,
            ..Default::default()
        };
        let handle = start(config, Arc::clone(&orchestrator), None).await.unwrap();
        (handle, orchestrator)
    }

    async fn post_control(port: u16, body: Value) -> (u16, Value) {
        let resp = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{port}/control"))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    #[tokio::test]
    async fn serves_health() {
        let (handle, _) = serve().await;
        let resp = reqwest::get(format!("http://127.0.0.1:{}/health", handle.port))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        handle.shutdown();
    }

    #[tokio::test]
    async fn control_over_http() {
        let (handle, _) = serve().await;
        let (status, body) = post_control(handle.port, json!({"type": "GET_SCAN_STATUS"})).await;
        assert_eq!(status, 200);
        assert_eq!(body, json!({"status": "idle"}));

        let (_, body) = post_control(handle.port, json!({"type": "NOPE"})).await;
        assert_eq!(body, json!({"error": "Unknown message type"}));

        let resp = reqwest::Client::new()
            .post(format!("http://127.0.0.1:{}/control", handle.port))
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        handle.shutdown();
    }

    #[tokio::test]
    async fn websocket_answers_in_band_and_streams_events() {
        let (handle, orchestrator) = serve().await;
        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{}/ws", handle.port))
            .await
            .unwrap();

        ws.send(Message::Text(r#"{"type":"GET_SCAN_STATUS","requestId":1}"#.into()))
            .await
            .unwrap();
        let reply = next_json(&mut ws).await;
        assert_eq!(reply["status"], "idle");
        assert_eq!(reply["requestId"], 1);

        let (_, started) = post_control(handle.port, json!({"type": "START_SCAN", "productId": "prod-1"})).await;
        assert_eq!(started["success"], true);

        let event = loop {
            let value = next_json(&mut ws).await;
            if value.get("type").is_some() {
                break value;
            }
        };
        assert_eq!(event["type"], "SCAN_PROGRESS");
        assert_eq!(event["scanSessionId"], started["scanSessionId"]);

        orchestrator.cancel_scan().await;
        orchestrator.join().await;
        handle.shutdown();
    }

    async fn next_json<S>(ws: &mut S) -> Value
    where
        S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = msg {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }
}
