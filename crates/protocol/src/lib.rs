//! JSON bodies exchanged between the Corvax Lab client and the session server.
//! Engine types (`ResourceLedger`, `MachineInstance`, ...) are sent as-is;
//! this crate only holds the request shapes and the envelopes around them.

use serde::{Deserialize, Serialize};

/// Resource amounts keyed by kind name (`tcorvax`, `catNips`, `energy`, `eggs`).
pub type Amounts = std::collections::BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRequest {
    #[serde(rename = "type")]
    pub machine_type: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoveRequest {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRequest {
    pub room: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AffordRequest {
    #[serde(default)]
    pub cost: Amounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffordResponse {
    pub affordable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreditRequest {
    #[serde(default)]
    pub income: Amounts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintOutcome {
    pub minted: bool,
}

/// Toast shown by the client after a room change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub text: String,
    pub color: String,
}

impl Notification {
    pub const SUCCESS_COLOR: &'static str = "#4CAF50";

    pub fn entered_room(room: u32) -> Self {
        Self {
            text: format!("Entered Room {room}"),
            color: Self::SUCCESS_COLOR.to_string(),
        }
    }

    pub fn room_unlocked(room: u32) -> Self {
        Self {
            text: format!("Room {room} unlocked!"),
            color: Self::SUCCESS_COLOR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomChange {
    pub changed: bool,
    pub current_room: u32,
    pub rooms_unlocked: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<Notification>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InsufficientResources,
    BuildNotAllowed,
    MaxLevelReached,
    NotFound,
    BadRequest,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
    /// Missing amounts for `insufficient_resources`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<Amounts>,
}

impl ErrorBody {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            missing: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_uses_type_field() {
        let req: BuildRequest =
            serde_json::from_str(r#"{"type":"catsLair","x":100,"y":100.5}"#).unwrap();
        assert_eq!(req.machine_type, "catsLair");
        assert_eq!((req.x, req.y), (100.0, 100.5));
    }

    #[test]
    fn room_change_omits_missing_notification() {
        let v = serde_json::to_value(RoomChange {
            changed: false,
            current_room: 1,
            rooms_unlocked: 1,
            notification: None,
        })
        .unwrap();
        assert_eq!(
            v,
            serde_json::json!({ "changed": false, "currentRoom": 1, "roomsUnlocked": 1 })
        );
    }

    #[test]
    fn error_kind_is_snake_case() {
        let body = ErrorBody::new(ErrorKind::MaxLevelReached, "machine #3 is at level 5");
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["kind"], "max_level_reached");
        assert!(v.get("missing").is_none());
    }

    #[test]
    fn entered_room_text() {
        let n = Notification::entered_room(2);
        assert_eq!(n.text, "Entered Room 2");
        assert_eq!(n.color, "#4CAF50");
    }
}
