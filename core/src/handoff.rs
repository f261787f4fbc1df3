//! Result handoff
//!
//! Turns a decoded payload (or a panel action) into one outbound message and
//! hands it to the host channel. Delivery is at-most-once: one `send`, no
//! retry, no queue. After a successful send the host is asked to close the
//! app; a refused close is only logged.

use crate::decoder::DecodedPayload;
use crate::host::{init_data_of, AuthStatus, HostChannel};
use crate::launch::LaunchContext;
use crate::message::{
    encode_message, parse_lecture_id, MessageError, OutboundMessage, PanelAction,
};
use crate::ScanError;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct CheckInHandoff {
    host: Arc<dyn HostChannel>,
    launch: LaunchContext,
    /// Lecture typed into the student panel, shared by clones
    typed_lecture: Arc<Mutex<Option<u64>>>,
    close_after_send: bool,
}

impl CheckInHandoff {
    pub fn new(host: Arc<dyn HostChannel>, launch: LaunchContext, close_after_send: bool) -> Self {
        Self {
            host,
            launch,
            typed_lecture: Arc::new(Mutex::new(None)),
            close_after_send,
        }
    }

    pub fn launch(&self) -> &LaunchContext {
        &self.launch
    }

    /// Signed launch data from the host, empty when the host gave none
    pub fn init_data(&self) -> String {
        init_data_of(self.host.as_ref())
    }

    pub fn auth_status(&self) -> AuthStatus {
        AuthStatus::from_identity(self.host.identity().as_ref())
    }

    /// Set the lecture from the student panel. A blank field clears it and
    /// falls back to the launch's lecture.
    pub fn set_lecture_id(&self, raw: &str) -> Result<Option<u64>, MessageError> {
        let lecture_id = if raw.trim().is_empty() {
            None
        } else {
            Some(parse_lecture_id(raw)?)
        };
        *self.typed_lecture.lock() = lecture_id;
        Ok(self.lecture_id())
    }

    /// Typed lecture first, then the one from the launch link
    pub fn lecture_id(&self) -> Option<u64> {
        self.typed_lecture.lock().or(self.launch.lecture_id())
    }

    /// Message for a scanned code: the student form when a lecture is known,
    /// the plain check-in otherwise
    pub fn check_in_message(&self, payload: DecodedPayload) -> OutboundMessage {
        let init_data = self.init_data();
        match self.lecture_id() {
            Some(lecture_id) => OutboundMessage::student_check_in(lecture_id, payload, init_data),
            None => OutboundMessage::check_in(payload, init_data),
        }
    }

    /// Encode and send `message` once, then ask the host to close
    pub fn deliver(&self, message: &OutboundMessage) -> Result<(), ScanError> {
        let json = encode_message(message)?;
        self.host.send(&json)?;
        info!("Sent {} message ({} bytes)", message.kind(), json.len());

        if self.close_after_send {
            if let Err(err) = self.host.close() {
                warn!("Host refused to close after send: {}", err);
            }
        }
        Ok(())
    }

    /// Hand off a scanned code
    pub fn hand_off(&self, payload: DecodedPayload) -> Result<OutboundMessage, ScanError> {
        let message = self.check_in_message(payload);
        self.deliver(&message)?;
        Ok(message)
    }

    /// Validate a panel form and send the resulting message. The app stays
    /// open so the speaker or admin can keep working.
    pub fn submit(&self, action: PanelAction) -> Result<OutboundMessage, ScanError> {
        let message = action.into_message(&self.launch, self.init_data())?;
        let json = encode_message(&message)?;
        self.host.send(&json)?;
        debug!("Submitted {} from the {} panel", message.kind(), message.panel());
        Ok(message)
    }
}

impl std::fmt::Debug for CheckInHandoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckInHandoff")
            .field("launch", &self.launch)
            .field("typed_lecture", &*self.typed_lecture.lock())
            .field("close_after_send", &self.close_after_send)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Symbol;
    use crate::host::{ChannelError, HostIdentity, HostUser, MockHostChannel};
    use crate::launch::{LaunchRole, Panel};
    use crate::message::MessageError;
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn payload(text: &str) -> DecodedPayload {
        DecodedPayload::from_symbol(Symbol::new(text)).unwrap()
    }

    fn identity() -> HostIdentity {
        HostIdentity {
            init_data: "query_id=1&hash=abc".to_string(),
            user: Some(HostUser {
                id: 7,
                first_name: Some("Ada".to_string()),
                username: None,
            }),
        }
    }

    #[test]
    fn test_send_then_close_in_order() {
        let mut host = MockHostChannel::new();
        let mut seq = Sequence::new();
        host.expect_identity().returning(|| None);
        host.expect_send()
            .with(eq(r#"{"type":"check_in","qr_payload":"LECTURE:42","init_data":""}"#))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        host.expect_close()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let handoff = CheckInHandoff::new(Arc::new(host), LaunchContext::default(), true);
        let message = handoff.hand_off(payload("LECTURE:42")).unwrap();
        assert_eq!(message.qr_payload(), Some("LECTURE:42"));
    }

    #[test]
    fn test_close_failure_is_not_fatal() {
        let mut host = MockHostChannel::new();
        host.expect_identity().returning(|| None);
        host.expect_send().times(1).returning(|_| Ok(()));
        host.expect_close()
            .times(1)
            .returning(|| Err(ChannelError::CloseFailed("unsupported".into())));

        let handoff = CheckInHandoff::new(Arc::new(host), LaunchContext::default(), true);
        assert!(handoff.hand_off(payload("LECTURE:1")).is_ok());
    }

    #[test]
    fn test_send_failure_skips_close() {
        let mut host = MockHostChannel::new();
        host.expect_identity().returning(|| None);
        host.expect_send()
            .times(1)
            .returning(|_| Err(ChannelError::Unavailable));
        host.expect_close().never();

        let handoff = CheckInHandoff::new(Arc::new(host), LaunchContext::default(), true);
        let err = handoff.hand_off(payload("LECTURE:1")).unwrap_err();
        assert_eq!(err, ScanError::Channel(ChannelError::Unavailable));
    }

    #[test]
    fn test_no_close_when_disabled() {
        let mut host = MockHostChannel::new();
        host.expect_identity().returning(|| None);
        host.expect_send().times(1).returning(|_| Ok(()));
        host.expect_close().never();

        let handoff = CheckInHandoff::new(Arc::new(host), LaunchContext::default(), false);
        handoff.hand_off(payload("LECTURE:1")).unwrap();
    }

    #[test]
    fn test_lecture_launch_uses_student_check_in() {
        let mut host = MockHostChannel::new();
        host.expect_identity().returning(|| Some(identity()));

        let launch = LaunchContext::for_role(LaunchRole::Student).with_lecture(12);
        let handoff = CheckInHandoff::new(Arc::new(host), launch, true);
        let message = handoff.check_in_message(payload("LECTURE:12"));
        assert_eq!(
            serde_json::to_string(&message).unwrap(),
            r#"{"type":"check_in","role":"student","lecture_id":12,"qr_payload":"LECTURE:12","init_data":"query_id=1&hash=abc"}"#
        );
    }

    #[test]
    fn test_typed_lecture_uses_student_check_in() {
        let mut host = MockHostChannel::new();
        host.expect_identity().returning(|| None);
        host.expect_send()
            .with(eq(
                r#"{"type":"check_in","role":"student","lecture_id":31,"qr_payload":"LECTURE:31","init_data":""}"#,
            ))
            .times(1)
            .returning(|_| Ok(()));
        host.expect_close().times(1).returning(|| Ok(()));

        let handoff = CheckInHandoff::new(Arc::new(host), LaunchContext::default(), true);
        // the flow holds a clone, the panel writes through another
        let panel = handoff.clone();
        assert_eq!(panel.set_lecture_id(" 31 "), Ok(Some(31)));
        handoff.hand_off(payload("LECTURE:31")).unwrap();
    }

    #[test]
    fn test_typed_lecture_overrides_and_clears() {
        let mut host = MockHostChannel::new();
        host.expect_identity().returning(|| None);

        let launch = LaunchContext::for_role(LaunchRole::Student).with_lecture(4);
        let handoff = CheckInHandoff::new(Arc::new(host), launch, true);
        assert_eq!(handoff.set_lecture_id("9"), Ok(Some(9)));
        assert_eq!(handoff.lecture_id(), Some(9));

        assert!(handoff.set_lecture_id("abc").is_err());
        assert!(handoff.set_lecture_id("0").is_err());
        assert_eq!(handoff.lecture_id(), Some(9));

        assert_eq!(handoff.set_lecture_id(""), Ok(Some(4)));
        assert!(matches!(
            handoff.check_in_message(payload("X")),
            OutboundMessage::CheckIn {
                lecture_id: Some(4),
                ..
            }
        ));
    }

    #[test]
    fn test_auth_status_follows_identity() {
        let mut host = MockHostChannel::new();
        host.expect_identity().returning(|| Some(identity()));
        let handoff = CheckInHandoff::new(Arc::new(host), LaunchContext::default(), true);
        assert_eq!(handoff.auth_status().to_string(), "Signed in as Ada");
        assert_eq!(handoff.init_data(), "query_id=1&hash=abc");
    }

    #[test]
    fn test_submit_respects_launch_panels() {
        let mut host = MockHostChannel::new();
        host.expect_identity().returning(|| None);
        host.expect_send().never();

        let handoff = CheckInHandoff::new(Arc::new(host), LaunchContext::default(), true);
        let err = handoff
            .submit(PanelAction::AdminSheetId {
                sheet_id: "sheet".into(),
            })
            .unwrap_err();
        assert_eq!(
            err,
            ScanError::Message(MessageError::PanelNotAllowed(Panel::Admin))
        );
    }

    #[test]
    fn test_submit_does_not_close() {
        let mut host = MockHostChannel::new();
        host.expect_identity().returning(|| None);
        host.expect_send()
            .with(eq(
                r#"{"type":"speaker_toggle","role":"speaker","lecture_id":5,"is_active":true,"init_data":""}"#,
            ))
            .times(1)
            .returning(|_| Ok(()));
        host.expect_close().never();

        let launch = LaunchContext::for_role(LaunchRole::Speaker);
        let handoff = CheckInHandoff::new(Arc::new(host), launch, true);
        handoff
            .submit(PanelAction::SpeakerToggle {
                lecture_id: "5".into(),
                is_active: true,
            })
            .unwrap();
    }
}
