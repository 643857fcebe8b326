use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Control message: `{ "type": "START_SCAN", ...params }`.
///
/// Over the WebSocket a client may add `requestId`; it is echoed on the reply.
#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, rename = "requestId")]
    pub request_id: Option<Value>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl ControlRequest {
    pub fn new(kind: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            kind: kind.into(),
            request_id: None,
            params,
        }
    }

    pub fn params_value(&self) -> Value {
        Value::Object(self.params.clone())
    }
}

pub const START_SCAN: &str = "START_SCAN";
pub const GET_SCAN_STATUS: &str = "GET_SCAN_STATUS";
pub const CANCEL_SCAN: &str = "CANCEL_SCAN";
pub const COLLECT_NOW: &str = "COLLECT_NOW";
pub const GET_LAST_SCAN: &str = "GET_LAST_SCAN";
pub const GET_LOGS: &str = "GET_LOGS";

pub fn success() -> Value {
    json!({ "success": true })
}

pub fn error(message: impl Into<String>) -> Value {
    json!({ "error": message.into() })
}

pub fn unknown_type() -> Value {
    error("Unknown message type")
}

pub fn parse_error() -> Value {
    error("Invalid control message")
}

/// Attach the caller's `requestId` to a reply object.
pub fn with_request_id(mut reply: Value, request_id: Option<Value>) -> Value {
    if let (Some(id), Value::Object(map)) = (request_id, &mut reply) {
        map.insert("requestId".into(), id);
    }
    reply
}

/// Extract a required, non-empty string param.
pub fn require_str<'a>(params: &'a Map<String, Value>, key: &str) -> Result<&'a str, String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required parameter: {key}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_control_request() {
        let req: ControlRequest =
            serde_json::from_str(r#"{"type":"START_SCAN","productId":"prod-1","requestId":7}"#).unwrap();
        assert_eq!(req.kind, START_SCAN);
        assert_eq!(req.request_id, Some(json!(7)));
        assert_eq!(req.params.get("productId"), Some(&json!("prod-1")));
        assert!(!req.params.contains_key("type"));
        assert!(!req.params.contains_key("requestId"));
    }

    #[test]
    fn missing_type_is_rejected() {
        assert!(serde_json::from_str::<ControlRequest>(r#"{"productId":"p"}"#).is_err());
    }

    #[test]
    fn reply_shapes() {
        assert_eq!(success(), json!({"success": true}));
        assert_eq!(unknown_type(), json!({"error": "Unknown message type"}));
    }

    #[test]
    fn request_id_is_echoed_on_objects_only() {
        let reply = with_request_id(success(), Some(json!("r1")));
        assert_eq!(reply["requestId"], "r1");
        assert_eq!(with_request_id(json!(3), Some(json!("r1"))), json!(3));
        assert_eq!(with_request_id(success(), None), success());
    }

    #[test]
    fn require_str_extracts() {
        let req = ControlRequest::new(START_SCAN, json!({"productId": "p", "empty": "", "n": 1}));
        assert_eq!(require_str(&req.params, "productId").unwrap(), "p");
        assert!(require_str(&req.params, "empty").is_err());
        assert!(require_str(&req.params, "n").is_err());
        assert!(require_str(&req.params, "missing").is_err());
    }
}
