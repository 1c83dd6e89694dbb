//! Gateway WebSocket protocol types (connect, health, message/content/error events).

use serde::{Deserialize, Serialize};

use crate::dispatch::Reply;

/// Event name clients use to submit a raw command.
pub const MESSAGE_EVENT: &str = "message";

/// Any frame a client may send: a request (`connect`, `health`) or an event (`message`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientFrame {
    Req(WsRequest),
    Event(WsEvent),
}

/// Wire request: `{ "type": "req", "id", "method", "params" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsRequest {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Wire event: `{ "type": "event", "event", "payload" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEvent {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Wire response: `{ "type": "res", "id", "ok", "payload" or "error" }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsResponse {
    #[serde(rename = "type")]
    pub typ: String,
    pub id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Client connect params.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    #[serde(default)]
    pub client: ConnectClient,
    #[serde(default)]
    pub auth: ConnectAuth,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectClient {
    pub id: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectAuth {
    pub token: Option<String>,
}

/// Server hello-ok payload after successful connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloOk {
    #[serde(rename = "type")]
    pub typ: String,
    pub protocol: u32,
    /// The one program callers may run (e.g. "ls").
    pub program: String,
}

impl WsResponse {
    pub fn ok(id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            typ: "res".to_string(),
            id: id.into(),
            ok: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            typ: "res".to_string(),
            id: id.into(),
            ok: false,
            payload: None,
            error: Some(error.into()),
        }
    }
}

/// Outbound event frame for a reply: `{"type":"event","event":"content"|"error","payload":"..."}`.
pub fn reply_frame(reply: &Reply) -> String {
    event_frame(reply.event(), serde_json::Value::String(reply.payload().to_string()))
}

/// Serialize an arbitrary event frame.
pub fn event_frame(event: &str, payload: serde_json::Value) -> String {
    serde_json::to_string(&serde_json::json!({
        "type": "event",
        "event": event,
        "payload": payload,
    }))
    .unwrap_or_else(|_| format!(r#"{{"type":"event","event":"{}","payload":null}}"#, event))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_message_event() {
        let f: ClientFrame =
            serde_json::from_str(r#"{"type":"event","event":"message","payload":"ls -la"}"#)
                .unwrap();
        match f {
            ClientFrame::Event(e) => {
                assert_eq!(e.event, MESSAGE_EVENT);
                assert_eq!(e.payload.as_str(), Some("ls -la"));
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }

    #[test]
    fn parses_connect_request_without_params() {
        let f: ClientFrame =
            serde_json::from_str(r#"{"type":"req","id":"1","method":"connect"}"#).unwrap();
        let ClientFrame::Req(req) = f else {
            panic!("expected request");
        };
        assert_eq!(req.method, "connect");
        assert!(req.params.is_null());
        let params: ConnectParams = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(params.auth.token.is_none());
    }

    #[test]
    fn unknown_frame_type_fails_to_parse() {
        assert!(serde_json::from_str::<ClientFrame>(r#"{"type":"res","id":"1"}"#).is_err());
    }

    #[test]
    fn reply_frames() {
        let v: serde_json::Value =
            serde_json::from_str(&reply_frame(&Reply::Error("nope".to_string()))).unwrap();
        assert_eq!(
            v,
            serde_json::json!({ "type": "event", "event": "error", "payload": "nope" })
        );
    }
}
