//! Control message handlers.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};

use columbus_core::ids::ProductId;
use columbus_engine::{ScanOrchestrator, StartOptions};
use columbus_telemetry::{LogQuery, SqliteLogSink};

use crate::rpc::{self, ControlRequest};

/// Shared state available to all handlers.
pub struct HandlerState {
    pub orchestrator: Arc<ScanOrchestrator>,
    logs: Option<Arc<SqliteLogSink>>,
    started_at: Instant,
}

impl HandlerState {
    pub fn new(orchestrator: Arc<ScanOrchestrator>, logs: Option<Arc<SqliteLogSink>>) -> Self {
        Self {
            orchestrator,
            logs,
            started_at: Instant::now(),
        }
    }
}

/// Route a control message to its handler. Failures are reported in-band
/// as `{ "error": ... }`; this never fails.
pub async fn dispatch(state: &HandlerState, request: &ControlRequest) -> Value {
    tracing::debug!(kind = %request.kind, "control message");
    match request.kind.as_str() {
        rpc::START_SCAN => start_scan(state, request).await,
        rpc::GET_SCAN_STATUS => scan_status(state),
        rpc::CANCEL_SCAN => cancel_scan(state).await,
        rpc::COLLECT_NOW => collect_now(state),
        rpc::GET_LAST_SCAN => last_scan(state),
        rpc::GET_LOGS => recent_logs(state, request),
        other => {
            tracing::debug!(kind = other, "unknown control message");
            rpc::unknown_type()
        }
    }
}

async fn start_scan(state: &HandlerState, request: &ControlRequest) -> Value {
    let product_id = match rpc::require_str(&request.params, "productId") {
        Ok(id) => ProductId::from_raw(id),
        Err(e) => return rpc::error(e),
    };
    let options: StartOptions = match serde_json::from_value(request.params_value()) {
        Ok(options) => options,
        Err(e) => return rpc::error(format!("Invalid scan options: {e}")),
    };

    match state.orchestrator.start_scan(product_id, options).await {
        Ok(started) => json!({
            "success": true,
            "totalPrompts": started.total_prompts,
            "scanSessionId": started.scan_session_id,
        }),
        Err(e) => {
            tracing::warn!(error = %e, "scan start rejected");
            rpc::error(e.to_string())
        }
    }
}

fn scan_status(state: &HandlerState) -> Value {
    serde_json::to_value(state.orchestrator.status()).unwrap_or_else(|e| rpc::error(e.to_string()))
}

async fn cancel_scan(state: &HandlerState) -> Value {
    let cancelled = state.orchestrator.cancel_scan().await;
    tracing::info!(cancelled, "cancel requested");
    rpc::success()
}

fn collect_now(state: &HandlerState) -> Value {
    state.orchestrator.collect_now();
    rpc::success()
}

fn last_scan(state: &HandlerState) -> Value {
    match state.orchestrator.last_scan_at() {
        Ok(at) => json!({ "lastScanDate": at.map(|at| at.to_rfc3339()) }),
        Err(e) => rpc::error(e.to_string()),
    }
}

fn recent_logs(state: &HandlerState, request: &ControlRequest) -> Value {
    let Some(logs) = &state.logs else {
        return rpc::error("Log persistence is disabled");
    };
    let query: LogQuery = match serde_json::from_value(request.params_value()) {
        Ok(query) => query,
        Err(e) => return rpc::error(format!("Invalid log query: {e}")),
    };
    match logs.query(&query) {
        Ok(records) => json!({ "logs": records }),
        Err(e) => {
            tracing::warn!(error = %e, "log query failed");
            rpc::error(e.to_string())
        }
    }
}

/// Liveness summary for `GET /health`.
pub fn health(state: &HandlerState) -> Value {
    let status = state.orchestrator.status();
    json!({
        "status": "healthy",
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "scan": status.status,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use columbus_core::platform::Platform;
    use columbus_engine::mock::{MockBackend, MockBrowser};
    use columbus_engine::{ScanConfig, ScanServices};

    pub(crate) fn state_with(prompts: usize) -> HandlerState {
        state_with_logs(prompts, None)
    }

    pub(crate) fn state_with_logs(prompts: usize, logs: Option<Arc<SqliteLogSink>>) -> HandlerState {
        let browser = Arc::new(MockBrowser::new());
        let backend = Arc::new(MockBackend::with_prompts(prompts));
        let orchestrator = ScanOrchestrator::new(
            ScanServices {
                host: browser.clone(),
                channel: browser,
                prompts: backend.clone(),
                sink: backend,
                history: None,
            },
            ScanConfig {
                platforms: vec![Platform::ChatGpt, Platform::Claude],
                ..ScanConfig::default()
            },
        );
        HandlerState::new(Arc::new(orchestrator), logs)
    }

    fn msg(kind: &str, params: Value) -> ControlRequest {
        ControlRequest::new(kind, params)
    }

    #[tokio::test(start_paused = true)]
    async fn start_scan_reports_total_prompts() {
        let state = state_with(3);
        let reply = dispatch(&state, &msg(rpc::START_SCAN, json!({"productId": "prod-1"}))).await;
        assert_eq!(reply["success"], true);
        assert_eq!(reply["totalPrompts"], 6);
        assert!(reply["scanSessionId"].is_string());

        let again = dispatch(&state, &msg(rpc::START_SCAN, json!({"productId": "prod-1"}))).await;
        assert_eq!(again, json!({"error": "A scan is already running"}));

        dispatch(&state, &msg(rpc::CANCEL_SCAN, json!({}))).await;
        state.orchestrator.join().await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_scan_honours_options() {
        let state = state_with(2);
        let reply = dispatch(
            &state,
            &msg(
                rpc::START_SCAN,
                json!({"productId": "prod-1", "platforms": ["gemini"], "samplesPerPrompt": 3}),
            ),
        )
        .await;
        assert_eq!(reply["totalPrompts"], 6);
        dispatch(&state, &msg(rpc::CANCEL_SCAN, json!({}))).await;
        state.orchestrator.join().await;
    }

    #[tokio::test]
    async fn start_scan_validation_errors() {
        let state = state_with(1);
        let reply = dispatch(&state, &msg(rpc::START_SCAN, json!({}))).await;
        assert_eq!(reply["error"], "Missing required parameter: productId");

        let reply = dispatch(
            &state,
            &msg(rpc::START_SCAN, json!({"productId": "p", "platforms": ["bard"]})),
        )
        .await;
        assert!(reply["error"].as_str().unwrap().starts_with("Invalid scan options"));

        let empty = state_with(0);
        let reply = dispatch(&empty, &msg(rpc::START_SCAN, json!({"productId": "p"}))).await;
        assert_eq!(reply["error"], "No prompts configured for this product");
    }

    #[tokio::test]
    async fn idle_status() {
        let state = state_with(1);
        let reply = dispatch(&state, &msg(rpc::GET_SCAN_STATUS, json!({}))).await;
        assert_eq!(reply, json!({"status": "idle"}));
    }

    #[tokio::test(start_paused = true)]
    async fn running_status_has_progress() {
        let state = state_with(1);
        dispatch(&state, &msg(rpc::START_SCAN, json!({"productId": "prod-1"}))).await;
        let reply = dispatch(&state, &msg(rpc::GET_SCAN_STATUS, json!({}))).await;
        assert_eq!(reply["status"], "running");
        assert_eq!(reply["progress"]["total"], 2);
        assert!(reply["platforms"]["chatgpt"].is_object());

        assert_eq!(dispatch(&state, &msg(rpc::CANCEL_SCAN, json!({}))).await, json!({"success": true}));
        state.orchestrator.join().await;
        let reply = dispatch(&state, &msg(rpc::GET_SCAN_STATUS, json!({}))).await;
        assert_eq!(reply["status"], "idle");
    }

    #[tokio::test]
    async fn cancel_and_collect_without_scan_succeed() {
        let state = state_with(1);
        assert_eq!(dispatch(&state, &msg(rpc::CANCEL_SCAN, json!({}))).await, json!({"success": true}));
        assert_eq!(dispatch(&state, &msg(rpc::COLLECT_NOW, json!({}))).await, json!({"success": true}));
    }

    #[tokio::test]
    async fn last_scan_without_history_is_null() {
        let state = state_with(1);
        let reply = dispatch(&state, &msg(rpc::GET_LAST_SCAN, json!({}))).await;
        assert_eq!(reply, json!({"lastScanDate": null}));
    }

    #[tokio::test]
    async fn logs_are_served_newest_first() {
        use tracing_subscriber::layer::SubscriberExt;

        let sink = Arc::new(SqliteLogSink::in_memory().unwrap());
        let subscriber = tracing_subscriber::registry().with(columbus_telemetry::SqliteLogLayer::new(sink.clone()));
        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(scan_session_id = "scan-1", platform = "claude", "tab editing blocked");
            tracing::error!(scan_session_id = "scan-2", "scan window closed");
        });

        let state = state_with_logs(1, Some(sink));
        let reply = dispatch(&state, &msg(rpc::GET_LOGS, json!({}))).await;
        let logs = reply["logs"].as_array().unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0]["message"], "scan window closed");
        assert_eq!(logs[1]["scanSessionId"], "scan-1");

        let reply = dispatch(&state, &msg(rpc::GET_LOGS, json!({"level": "warn", "platform": "claude"}))).await;
        assert_eq!(reply["logs"].as_array().unwrap().len(), 1);

        let reply = dispatch(&state, &msg(rpc::GET_LOGS, json!({"limit": "many"}))).await;
        assert!(reply["error"].as_str().unwrap().starts_with("Invalid log query"));
    }

    #[tokio::test]
    async fn logs_without_sink_is_an_error() {
        let state = state_with(1);
        let reply = dispatch(&state, &msg(rpc::GET_LOGS, json!({}))).await;
        assert_eq!(reply, json!({"error": "Log persistence is disabled"}));
    }

    #[tokio::test]
    async fn unknown_type() {
        let state = state_with(1);
        let reply = dispatch(&state, &msg("PROMPT_RESULT", json!({}))).await;
        assert_eq!(reply, json!({"error": "Unknown message type"}));
    }

    #[test]
    fn health_reports_idle_scan() {
        let state = state_with(1);
        let body = health(&state);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["scan"], "idle");
    }
}
