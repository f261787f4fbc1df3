// Message codec: JSON serialization with the host's size limit

use super::types::{MessageError, OutboundMessage};

/// Maximum payload the host accepts through `sendData`: 4 KB
pub const MAX_SEND_DATA_SIZE: usize = 4096;

/// Serialize a message to the JSON string handed to the host
pub fn encode_message(msg: &OutboundMessage) -> Result<String, MessageError> {
    let json =
        serde_json::to_string(msg).map_err(|e| MessageError::Serialization(e.to_string()))?;

    if json.len() > MAX_SEND_DATA_SIZE {
        return Err(MessageError::TooLarge {
            size: json.len(),
            max: MAX_SEND_DATA_SIZE,
        });
    }

    Ok(json)
}

/// Parse a message, as the bot side would
pub fn decode_message(json: &str) -> Result<OutboundMessage, MessageError> {
    if json.len() > MAX_SEND_DATA_SIZE {
        return Err(MessageError::TooLarge {
            size: json.len(),
            max: MAX_SEND_DATA_SIZE,
        });
    }

    serde_json::from_str(json).map_err(|e| MessageError::Serialization(e.to_string()))
}
