use std::sync::Arc;

use tokio::sync::broadcast;

use columbus_core::events::ScanEvent;

use crate::client::ClientRegistry;

/// Forward every scan event to all connected WebSocket clients.
pub fn create_bridge(registry: Arc<ClientRegistry>, mut rx: broadcast::Receiver<ScanEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Some(json) = serialize_event(&event) else {
                        continue;
                    };
                    let delivered = registry.broadcast(&json);
                    tracing::trace!(event = event.event_type(), delivered, "event forwarded");
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "event bridge lagged, dropped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("event bridge channel closed");
                    break;
                }
            }
        }
    })
}

pub fn serialize_event(event: &ScanEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::warn!(event = event.event_type(), error = %e, "failed to serialize event");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use columbus_core::ids::{PromptId, ScanSessionId};
    use columbus_core::platform::Platform;

    fn result_event() -> ScanEvent {
        ScanEvent::ScanResult {
            scan_session_id: ScanSessionId::from_raw("s-1"),
            platform: Platform::Claude,
            prompt_id: PromptId::from_raw("p1"),
            success: true,
            brand_mentioned: false,
        }
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serialize_event(&result_event()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "SCAN_RESULT");
        assert_eq!(value["platform"], "claude");
        assert_eq!(value["promptId"], "p1");
    }

    #[tokio::test]
    async fn bridge_forwards_to_all_clients() {
        let registry = Arc::new(ClientRegistry::new(8));
        let (tx, rx) = broadcast::channel(8);
        let (_a, mut rx_a) = registry.register();
        let (_b, mut rx_b) = registry.register();

        let handle = create_bridge(Arc::clone(&registry), rx);
        tx.send(result_event()).unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(1), rx_a.recv()).await.unwrap().unwrap();
        assert!(msg.contains("SCAN_RESULT"));
        let msg = tokio::time::timeout(Duration::from_secs(1), rx_b.recv()).await.unwrap().unwrap();
        assert!(msg.contains("s-1"));

        handle.abort();
    }

    #[tokio::test]
    async fn bridge_stops_when_channel_closes() {
        let registry = Arc::new(ClientRegistry::new(8));
        let (tx, rx) = broadcast::channel::<ScanEvent>(8);
        let handle = create_bridge(registry, rx);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
