use schat_models::events::{ClientEvent, ServerEvent, CLIENT_EVENT_TYPES};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("malformed event: {0}")]
    Malformed(String),
    #[error("unknown event type '{0}'")]
    UnknownType(String),
}

/// Parse one inbound text frame. Frames without a string `type` or with
/// fields that do not fit their type are `Malformed`; well-formed frames
/// naming a type the gateway does not handle are `UnknownType`.
pub fn decode_client_event(text: &str) -> Result<ClientEvent, GatewayError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| GatewayError::Malformed(e.to_string()))?;
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Err(GatewayError::Malformed("missing `type` field".into()));
    };
    if !CLIENT_EVENT_TYPES.contains(&kind) {
        return Err(GatewayError::UnknownType(kind.to_string()));
    }
    serde_json::from_value(value).map_err(|e| GatewayError::Malformed(e.to_string()))
}

pub fn encode_server_event(event: &ServerEvent) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}
