use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::inventory::ToolStatus;

/// Current time in the wire format every message carries.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

#[derive(Debug, Error)]
#[error("invalid message payload: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Raw inbound shape: `{action, quantity?, current_weight?}`. Everything is
/// optional at this layer so an unknown or incomplete message still decodes
/// and can be answered instead of dropped.
#[derive(Debug, Deserialize)]
struct InboundMessage {
    action: Option<String>,
    quantity: Option<i64>,
    current_weight: Option<f64>,
}

/// One decoded client request. Built per message, discarded after handling.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    GetStatus,
    Borrow { quantity: i64 },
    Return { quantity: i64 },
    SensorUpdate { current_weight: Option<f64> },
    Ping,
    Unknown { action: String },
}

impl Command {
    /// Decode a raw frame. Malformed JSON is a [`DecodeError`]; a missing or
    /// unrecognized `action` still decodes, as [`Command::Unknown`]. A missing
    /// `quantity` defaults to 1.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let message: InboundMessage = serde_json::from_str(raw)?;
        let action = message.action.unwrap_or_else(|| "unknown".to_owned());
        let command = match action.as_str() {
            "get_tool_status" => Command::GetStatus,
            "borrow_tool" => Command::Borrow {
                quantity: message.quantity.unwrap_or(1),
            },
            "return_tool" => Command::Return {
                quantity: message.quantity.unwrap_or(1),
            },
            "sensor_update" => Command::SensorUpdate {
                current_weight: message.current_weight,
            },
            "ping" => Command::Ping,
            _ => Command::Unknown { action },
        };
        Ok(command)
    }

    /// Label used for per-action metrics.
    pub fn action_label(&self) -> &'static str {
        match self {
            Command::GetStatus => "get_tool_status",
            Command::Borrow { .. } => "borrow_tool",
            Command::Return { .. } => "return_tool",
            Command::SensorUpdate { .. } => "sensor_update",
            Command::Ping => "ping",
            Command::Unknown { .. } => "unknown",
        }
    }
}

/// Outbound message envelope, unicast and broadcast alike:
/// `{type, action?, success?, data?, message?, timestamp?}`.
#[derive(Debug, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Envelope {
    pub fn tool_success(action: &str, data: serde_json::Value, message: &str) -> Self {
        Envelope {
            kind: "tool".to_owned(),
            action: Some(action.to_owned()),
            success: Some(true),
            data: Some(data),
            message: Some(message.to_owned()),
            timestamp: Some(now_rfc3339()),
        }
    }

    /// Success reply that carries only data, no human-readable message
    /// (status queries answer this way).
    pub fn tool_data(action: &str, data: serde_json::Value) -> Self {
        Envelope {
            kind: "tool".to_owned(),
            action: Some(action.to_owned()),
            success: Some(true),
            data: Some(data),
            message: None,
            timestamp: Some(now_rfc3339()),
        }
    }

    /// Business-rule rejection: structured, unicast-only, never closes the
    /// connection.
    pub fn tool_failure(action: &str, message: impl Into<String>) -> Self {
        Envelope {
            kind: "tool".to_owned(),
            action: Some(action.to_owned()),
            success: Some(false),
            data: None,
            message: Some(message.into()),
            timestamp: Some(now_rfc3339()),
        }
    }

    pub fn error(action: Option<&str>, message: impl Into<String>) -> Self {
        Envelope {
            kind: "error".to_owned(),
            action: action.map(str::to_owned),
            success: None,
            data: None,
            message: Some(message.into()),
            timestamp: Some(now_rfc3339()),
        }
    }

    pub fn pong() -> Self {
        Envelope {
            kind: "system".to_owned(),
            action: Some("pong".to_owned()),
            success: None,
            data: None,
            message: None,
            timestamp: Some(now_rfc3339()),
        }
    }

    /// The broadcast-only change notification. Its timestamp lives inside
    /// `data`, not at the top level.
    pub fn inventory_changed(old_quantity: i64, new_quantity: i64, status: ToolStatus) -> Self {
        Envelope {
            kind: "notification".to_owned(),
            action: Some("inventory_changed".to_owned()),
            success: None,
            data: Some(serde_json::json!({
                "old_quantity": old_quantity,
                "new_quantity": new_quantity,
                "status": status,
                "timestamp": now_rfc3339(),
            })),
            message: None,
            timestamp: None,
        }
    }
}
