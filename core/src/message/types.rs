// Message types: the JSON records the bot consumes

use crate::decoder::DecodedPayload;
use crate::launch::Panel;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors building or encoding an outbound message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("Panel not available for this launch: {0}")]
    PanelNotAllowed(Panel),
    #[error("Message too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Role declared inside a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Speaker,
    MasterAdmin,
}

/// A message for the host chat.
///
/// Built once, sent once. Field order and names are part of the bot contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Scan result; `role` and `lecture_id` only for the student panel
    CheckIn {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lecture_id: Option<u64>,
        qr_payload: String,
        #[serde(default)]
        init_data: String,
    },
    SpeakerToggle {
        role: Role,
        lecture_id: u64,
        is_active: bool,
        #[serde(default)]
        init_data: String,
    },
    SpeakerSetLocation {
        role: Role,
        lecture_id: u64,
        lat: f64,
        lon: f64,
        #[serde(default)]
        init_data: String,
    },
    AdminSetRatingChat {
        role: Role,
        rating_chat_id: i64,
        #[serde(default)]
        init_data: String,
    },
    AdminSetSheetId {
        role: Role,
        sheet_id: String,
        #[serde(default)]
        init_data: String,
    },
}

impl OutboundMessage {
    /// Plain check-in, no role or lecture attached
    pub fn check_in(payload: DecodedPayload, init_data: String) -> Self {
        OutboundMessage::CheckIn {
            role: None,
            lecture_id: None,
            qr_payload: payload.into_string(),
            init_data,
        }
    }

    /// Check-in from the student panel for a known lecture
    pub fn student_check_in(lecture_id: u64, payload: DecodedPayload, init_data: String) -> Self {
        OutboundMessage::CheckIn {
            role: Some(Role::Student),
            lecture_id: Some(lecture_id),
            qr_payload: payload.into_string(),
            init_data,
        }
    }

    pub fn speaker_toggle(lecture_id: u64, is_active: bool, init_data: String) -> Self {
        OutboundMessage::SpeakerToggle {
            role: Role::Speaker,
            lecture_id,
            is_active,
            init_data,
        }
    }

    pub fn speaker_set_location(
        lecture_id: u64,
        lat: f64,
        lon: f64,
        init_data: String,
    ) -> Result<Self, MessageError> {
        super::form::validate_coordinates(lat, lon)?;
        Ok(OutboundMessage::SpeakerSetLocation {
            role: Role::Speaker,
            lecture_id,
            lat,
            lon,
            init_data,
        })
    }

    pub fn admin_set_rating_chat(rating_chat_id: i64, init_data: String) -> Self {
        OutboundMessage::AdminSetRatingChat {
            role: Role::MasterAdmin,
            rating_chat_id,
            init_data,
        }
    }

    pub fn admin_set_sheet_id(sheet_id: &str, init_data: String) -> Result<Self, MessageError> {
        Ok(OutboundMessage::AdminSetSheetId {
            role: Role::MasterAdmin,
            sheet_id: super::form::parse_sheet_id(sheet_id)?,
            init_data,
        })
    }

    /// Wire value of the `type` field
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::CheckIn { .. } => "check_in",
            OutboundMessage::SpeakerToggle { .. } => "speaker_toggle",
            OutboundMessage::SpeakerSetLocation { .. } => "speaker_set_location",
            OutboundMessage::AdminSetRatingChat { .. } => "admin_set_rating_chat",
            OutboundMessage::AdminSetSheetId { .. } => "admin_set_sheet_id",
        }
    }

    /// Panel the message originates from
    pub fn panel(&self) -> Panel {
        match self {
            OutboundMessage::CheckIn { .. } => Panel::Student,
            OutboundMessage::SpeakerToggle { .. } | OutboundMessage::SpeakerSetLocation { .. } => {
                Panel::Speaker
            }
            OutboundMessage::AdminSetRatingChat { .. } | OutboundMessage::AdminSetSheetId { .. } => {
                Panel::Admin
            }
        }
    }

    pub fn init_data(&self) -> &str {
        match self {
            OutboundMessage::CheckIn { init_data, .. }
            | OutboundMessage::SpeakerToggle { init_data, .. }
            | OutboundMessage::SpeakerSetLocation { init_data, .. }
            | OutboundMessage::AdminSetRatingChat { init_data, .. }
            | OutboundMessage::AdminSetSheetId { init_data, .. } => init_data,
        }
    }

    /// Scanned text, for check-ins
    pub fn qr_payload(&self) -> Option<&str> {
        match self {
            OutboundMessage::CheckIn { qr_payload, .. } => Some(qr_payload),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Symbol;

    fn payload(text: &str) -> DecodedPayload {
        DecodedPayload::from_symbol(Symbol::new(text)).unwrap()
    }

    #[test]
    fn test_plain_check_in_shape() {
        let msg = OutboundMessage::check_in(payload("LECTURE:42"), String::new());
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"type":"check_in","qr_payload":"LECTURE:42","init_data":""}"#
        );
    }

    #[test]
    fn test_student_check_in_shape() {
        let msg = OutboundMessage::student_check_in(12, payload("abc"), "auth".into());
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"type":"check_in","role":"student","lecture_id":12,"qr_payload":"abc","init_data":"auth"}"#
        );
    }

    #[test]
    fn test_admin_role_is_master_admin() {
        let msg = OutboundMessage::admin_set_rating_chat(-100123, String::new());
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"type":"admin_set_rating_chat","role":"master_admin","rating_chat_id":-100123,"init_data":""}"#
        );
    }

    #[test]
    fn test_missing_init_data_deserializes_as_empty() {
        let msg: OutboundMessage =
            serde_json::from_str(r#"{"type":"check_in","qr_payload":"x"}"#).unwrap();
        assert_eq!(msg.init_data(), "");
        assert_eq!(msg.qr_payload(), Some("x"));
    }

    #[test]
    fn test_kind_matches_wire_tag() {
        let messages = vec![
            OutboundMessage::check_in(payload("a"), String::new()),
            OutboundMessage::speaker_toggle(1, true, String::new()),
            OutboundMessage::speaker_set_location(1, 10.0, 20.0, String::new()).unwrap(),
            OutboundMessage::admin_set_rating_chat(5, String::new()),
            OutboundMessage::admin_set_sheet_id("sheet", String::new()).unwrap(),
        ];
        for msg in messages {
            let value = serde_json::to_value(&msg).unwrap();
            assert_eq!(value["type"], msg.kind());
        }
    }

    #[test]
    fn test_panel_of_message() {
        assert_eq!(
            OutboundMessage::speaker_toggle(1, false, String::new()).panel(),
            Panel::Speaker
        );
        assert_eq!(
            OutboundMessage::admin_set_rating_chat(1, String::new()).panel(),
            Panel::Admin
        );
    }
}
