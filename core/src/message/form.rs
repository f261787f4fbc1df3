// Panel forms: raw field values from the role panels, validated into messages

use super::types::{MessageError, OutboundMessage};
use crate::launch::{LaunchContext, Panel};

/// Lecture ids are positive integers
pub fn parse_lecture_id(raw: &str) -> Result<u64, MessageError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(MessageError::MissingField("lecture_id"));
    }
    match raw.parse::<u64>() {
        Ok(0) => Err(MessageError::InvalidField {
            field: "lecture_id",
            reason: "must be positive".into(),
        }),
        Ok(id) => Ok(id),
        Err(e) => Err(MessageError::InvalidField {
            field: "lecture_id",
            reason: e.to_string(),
        }),
    }
}

/// Chat ids may be negative (groups and channels)
pub fn parse_rating_chat_id(raw: &str) -> Result<i64, MessageError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(MessageError::MissingField("rating_chat_id"));
    }
    raw.parse::<i64>().map_err(|e| MessageError::InvalidField {
        field: "rating_chat_id",
        reason: e.to_string(),
    })
}

pub fn parse_sheet_id(raw: &str) -> Result<String, MessageError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(MessageError::MissingField("sheet_id"));
    }
    Ok(trimmed.to_string())
}

pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(), MessageError> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(MessageError::InvalidField {
            field: "lat",
            reason: format!("{} is outside [-90, 90]", lat),
        });
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(MessageError::InvalidField {
            field: "lon",
            reason: format!("{} is outside [-180, 180]", lon),
        });
    }
    Ok(())
}

/// An explicit user action on the speaker or admin panel, fields as typed
#[derive(Debug, Clone, PartialEq)]
pub enum PanelAction {
    SpeakerToggle { lecture_id: String, is_active: bool },
    SpeakerLocation { lecture_id: String, lat: f64, lon: f64 },
    AdminRatingChat { rating_chat_id: String },
    AdminSheetId { sheet_id: String },
}

impl PanelAction {
    pub fn panel(&self) -> Panel {
        match self {
            PanelAction::SpeakerToggle { .. } | PanelAction::SpeakerLocation { .. } => {
                Panel::Speaker
            }
            PanelAction::AdminRatingChat { .. } | PanelAction::AdminSheetId { .. } => Panel::Admin,
        }
    }

    /// Validate the form and build the message, if the launch grants the panel
    pub fn into_message(
        self,
        launch: &LaunchContext,
        init_data: String,
    ) -> Result<OutboundMessage, MessageError> {
        let panel = self.panel();
        if !launch.allows(panel) {
            return Err(MessageError::PanelNotAllowed(panel));
        }

        match self {
            PanelAction::SpeakerToggle {
                lecture_id,
                is_active,
            } => Ok(OutboundMessage::speaker_toggle(
                parse_lecture_id(&lecture_id)?,
                is_active,
                init_data,
            )),
            PanelAction::SpeakerLocation {
                lecture_id,
                lat,
                lon,
            } => OutboundMessage::speaker_set_location(
                parse_lecture_id(&lecture_id)?,
                lat,
                lon,
                init_data,
            ),
            PanelAction::AdminRatingChat { rating_chat_id } => Ok(
                OutboundMessage::admin_set_rating_chat(
                    parse_rating_chat_id(&rating_chat_id)?,
                    init_data,
                ),
            ),
            PanelAction::AdminSheetId { sheet_id } => {
                OutboundMessage::admin_set_sheet_id(&sheet_id, init_data)
            }
        }
    }
}
