//! Check-in flow: scan until a code is found, then hand it to the chat

use crate::handoff::CheckInHandoff;
use crate::message::{OutboundMessage, PanelAction};
use crate::scanner::{ScanController, ScanOutcome, ScanStatus, Ticker};
use crate::ScanError;
use tracing::{debug, warn};

/// How a check-in attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum FlowOutcome {
    /// The message that was handed to the host
    Sent(OutboundMessage),
    Stopped,
    TimedOut,
}

/// A scan controller wired to a handoff.
///
/// Clones share the controller, so a UI handler can call [`CheckInFlow::stop`]
/// while another task is inside [`CheckInFlow::scan`].
#[derive(Debug, Clone)]
pub struct CheckInFlow {
    controller: ScanController,
    handoff: CheckInHandoff,
}

impl CheckInFlow {
    pub fn new(controller: ScanController, handoff: CheckInHandoff) -> Self {
        Self {
            controller,
            handoff,
        }
    }

    pub fn controller(&self) -> &ScanController {
        &self.controller
    }

    pub fn handoff(&self) -> &CheckInHandoff {
        &self.handoff
    }

    /// Open the camera, poll on `ticker` and send the first decoded code
    pub async fn scan<T: Ticker + ?Sized>(&self, ticker: &mut T) -> Result<FlowOutcome, ScanError> {
        match self.controller.start().await {
            Ok(_) => {}
            Err(ScanError::Cancelled) => return Ok(FlowOutcome::Stopped),
            Err(err) => return Err(err),
        }

        let payload = match self.controller.run(ticker).await? {
            ScanOutcome::Matched(payload) => payload,
            ScanOutcome::Stopped => {
                debug!("Scan stopped before a code was found");
                return Ok(FlowOutcome::Stopped);
            }
            ScanOutcome::TimedOut => return Ok(FlowOutcome::TimedOut),
        };

        match self.handoff.hand_off(payload) {
            Ok(message) => {
                self.controller.report_status(ScanStatus::Sent);
                Ok(FlowOutcome::Sent(message))
            }
            Err(err) => {
                warn!("Check-in handoff failed: {}", err);
                self.controller.report_status(ScanStatus::from_error(&err));
                Err(err)
            }
        }
    }

    /// Cancel a running scan
    pub fn stop(&self) {
        self.controller.stop();
    }

    /// Send a speaker or admin panel action, reporting the result
    pub fn submit(&self, action: PanelAction) -> Result<OutboundMessage, ScanError> {
        match self.handoff.submit(action) {
            Ok(message) => {
                self.controller.report_status(ScanStatus::Sent);
                Ok(message)
            }
            Err(err) => {
                self.controller.report_status(ScanStatus::from_error(&err));
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use crate::host::ChannelError;
    use crate::launch::LaunchContext;
    use crate::scanner::{IntervalTicker, ScanState};
    use crate::scripted::{RecordingHost, ScriptedCamera, ScriptedDecoder, ScriptedFrame};
    use std::sync::Arc;
    use std::time::Duration;

    fn flow(camera: &ScriptedCamera, host: &RecordingHost) -> CheckInFlow {
        let controller = ScanController::new(
            Arc::new(camera.clone()),
            Arc::new(ScriptedDecoder::new()),
            ScanConfig::default(),
        )
        .unwrap();
        let handoff = CheckInHandoff::new(Arc::new(host.clone()), LaunchContext::default(), true);
        CheckInFlow::new(controller, handoff)
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_sends_once_and_closes() {
        let camera = ScriptedCamera::new(vec![
            ScriptedFrame::Blank,
            ScriptedFrame::Code("LECTURE:7".into()),
            ScriptedFrame::Code("LECTURE:8".into()),
        ]);
        let host = RecordingHost::new();
        let flow = flow(&camera, &host);

        let mut ticker = IntervalTicker::new(Duration::from_millis(300));
        let outcome = flow.scan(&mut ticker).await.unwrap();
        assert!(matches!(outcome, FlowOutcome::Sent(_)));
        assert_eq!(
            host.sent(),
            vec![r#"{"type":"check_in","qr_payload":"LECTURE:7","init_data":""}"#.to_string()]
        );
        assert_eq!(host.close_calls(), 1);
        assert_eq!(flow.controller().status(), ScanStatus::Sent);
        assert_eq!(camera.remaining_frames(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_reported_without_retry() {
        let camera = ScriptedCamera::new(vec![ScriptedFrame::Code("LECTURE:7".into())]);
        let host = RecordingHost::new();
        host.fail_sends(ChannelError::SendFailed("bridge gone".into()));
        let flow = flow(&camera, &host);

        let mut ticker = IntervalTicker::new(Duration::from_millis(300));
        let err = flow.scan(&mut ticker).await.unwrap_err();
        assert!(matches!(err, ScanError::Channel(_)));
        assert!(matches!(flow.controller().status(), ScanStatus::SendFailed(_)));
        assert_eq!(flow.controller().state(), ScanState::Stopped);
        assert_eq!(host.close_calls(), 0);
        assert_eq!(camera.open_handles(), 0);
    }

    #[test]
    fn test_submit_reports_form_errors() {
        let camera = ScriptedCamera::new(vec![]);
        let host = RecordingHost::new();
        let flow = flow(&camera, &host);

        let result = flow.submit(PanelAction::SpeakerToggle {
            lecture_id: "12".into(),
            is_active: false,
        });
        assert!(result.is_err());
        assert!(matches!(flow.controller().status(), ScanStatus::InvalidInput(_)));
        assert!(host.sent().is_empty());
    }
}
