//! CDP wire types
//!
//! Minimal set of frame shapes. Inbound frames demultiplex on the presence
//! of `id`: frames with an id are command replies, frames without one are
//! protocol events.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Command id - monotonically increasing per connection
pub type CommandId = u64;

/// Target id assigned by the browser
pub type TargetId = String;

/// Session id for attached targets
pub type SessionId = String;

/// Outbound command frame
#[derive(Debug, Clone, Serialize)]
pub struct CdpRequest {
    pub id: CommandId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

/// Reply to a command, matched by id
#[derive(Debug, Clone, Deserialize)]
pub struct CdpResponse {
    pub id: CommandId,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ProtocolError>,
}

/// Error object inside a reply frame
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Unsolicited notification (no command id)
#[derive(Debug, Clone, Deserialize)]
pub struct CdpEvent {
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

/// Unified inbound frame
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum CdpMessage {
    Response(CdpResponse),
    Event(CdpEvent),
}

/// Target description from Target.getTargets / Target.getTargetInfo
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetInfo {
    #[serde(rename = "targetId")]
    pub target_id: TargetId,
    #[serde(rename = "type")]
    pub target_type: String,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub attached: bool,
}

/// Result of Target.attachToTarget
#[derive(Debug, Clone, Deserialize)]
pub struct AttachToTargetResult {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_with_id_parses_as_response() {
        let frame = r#"{"id":7,"result":{"value":42}}"#;
        match serde_json::from_str::<CdpMessage>(frame).unwrap() {
            CdpMessage::Response(response) => {
                assert_eq!(response.id, 7);
                assert!(response.error.is_none());
            }
            CdpMessage::Event(_) => panic!("expected a response frame"),
        }
    }

    #[test]
    fn frame_without_id_parses_as_event() {
        let frame = r#"{"method":"Page.loadEventFired","params":{"timestamp":1.0}}"#;
        match serde_json::from_str::<CdpMessage>(frame).unwrap() {
            CdpMessage::Event(event) => assert_eq!(event.method, "Page.loadEventFired"),
            CdpMessage::Response(_) => panic!("expected an event frame"),
        }
    }

    #[test]
    fn error_replies_carry_code_and_message() {
        let frame = r#"{"id":3,"error":{"code":-32000,"message":"no such target"}}"#;
        match serde_json::from_str::<CdpMessage>(frame).unwrap() {
            CdpMessage::Response(response) => {
                let error = response.error.unwrap();
                assert_eq!(error.code, -32000);
                assert_eq!(error.message, "no such target");
            }
            CdpMessage::Event(_) => panic!("expected a response frame"),
        }
    }
}
