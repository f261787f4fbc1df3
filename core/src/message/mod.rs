// Message module: outbound JSON messages handed to the host chat

pub mod codec;
pub mod form;
pub mod types;

pub use codec::{decode_message, encode_message, MAX_SEND_DATA_SIZE};
pub use form::{
    parse_lecture_id, parse_rating_chat_id, parse_sheet_id, validate_coordinates, PanelAction,
};
pub use types::{MessageError, OutboundMessage, Role};
