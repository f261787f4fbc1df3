// Replay a scripted camera through the real scan loop

use anyhow::{Context, Result};
use attendscan_core::scripted::{parse_script, RecordingHost, ScriptedCamera, ScriptedDecoder};
use attendscan_core::{
    ChannelError, CheckInFlow, CheckInHandoff, FlowOutcome, HostIdentity, IntervalTicker,
    LaunchContext, ScanConfig, ScanController, ScanError, ScanObserver, ScanStatus,
    ZoomCapability, ZoomRange,
};
use colored::*;
use parking_lot::Mutex;
use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

pub struct SimulationOptions {
    pub script: String,
    pub config: ScanConfig,
    pub launch: LaunchContext,
    pub identity: Option<HostIdentity>,
    pub optical_zoom: Option<ZoomRange>,
    /// Zoom to request once the camera is open
    pub zoom: Option<f64>,
    /// Make the host refuse every send
    pub fail_sends: Option<ChannelError>,
}

#[derive(Debug)]
pub struct SimulationReport {
    /// How the scan ended; camera, channel and message failures stay errors
    pub outcome: Result<FlowOutcome, ScanError>,
    pub statuses: Vec<ScanStatus>,
    pub sent: Vec<String>,
    pub close_calls: usize,
    pub decode_calls: usize,
    pub acquired: usize,
    pub released: usize,
    /// Level in effect after the requested zoom
    pub applied_zoom: Option<f64>,
}

/// Prints each status as it happens and keeps a copy
#[derive(Default)]
struct ConsoleObserver {
    quiet: bool,
    statuses: Mutex<Vec<ScanStatus>>,
}

impl ScanObserver for ConsoleObserver {
    fn on_status(&self, status: &ScanStatus) {
        self.statuses.lock().push(status.clone());
        if self.quiet {
            return;
        }
        let line = status.to_string();
        if status.is_error() {
            println!("  {} {}", "✗".red(), line.red());
        } else if *status == ScanStatus::Sent {
            println!("  {} {}", "✓".green(), line.green());
        } else {
            println!("  {} {}", "•".dimmed(), line);
        }
    }

    fn on_zoom_capability(&self, capability: &ZoomCapability) {
        if self.quiet {
            return;
        }
        match capability.range() {
            Some(range) => println!(
                "  {} zoom {}..{} (step {}){}",
                "•".dimmed(),
                range.min,
                range.max,
                range.step,
                if capability.is_optical() { "" } else { ", visual only" }
            ),
            None => println!("  {} no zoom", "•".dimmed()),
        }
    }
}

/// Stop the scan a couple of ticks after the script runs dry
async fn stop_when_exhausted(flow: &CheckInFlow, camera: &ScriptedCamera, tick: Duration) {
    loop {
        tokio::time::sleep(tick).await;
        if camera.remaining_frames() == 0 {
            tokio::time::sleep(tick * 2).await;
            flow.stop();
            return;
        }
    }
}

pub async fn run(options: SimulationOptions, quiet: bool) -> Result<SimulationReport> {
    let frames = parse_script(&options.script)
        .map_err(anyhow::Error::msg)
        .context("Invalid frame script")?;

    let mut camera = ScriptedCamera::new(frames);
    if let Some(range) = options.optical_zoom {
        camera = camera.with_zoom(range);
    }
    let decoder = ScriptedDecoder::new();
    let mut host = RecordingHost::new();
    if let Some(identity) = options.identity {
        host = host.with_identity(identity);
    }
    if let Some(err) = options.fail_sends {
        host.fail_sends(err);
    }

    let requested_zoom = options.zoom;
    let tick = options.config.tick_interval();
    let close_after_send = options.config.close_after_send;
    let controller = ScanController::new(
        Arc::new(camera.clone()),
        Arc::new(decoder.clone()),
        options.config,
    )?;
    let observer = Arc::new(ConsoleObserver {
        quiet,
        ..Default::default()
    });
    controller.set_observer(observer.clone());

    let handoff = CheckInHandoff::new(Arc::new(host.clone()), options.launch, close_after_send);
    let flow = CheckInFlow::new(controller, handoff);

    let mut ticker = IntervalTicker::new(tick);
    let applied_zoom = Cell::new(None);
    let zoom = async {
        if let Some(level) = requested_zoom {
            // first tick is a full interval away, the camera is open by then
            tokio::time::sleep(tick / 2).await;
            match flow.controller().set_zoom(level).await {
                Ok(applied) => applied_zoom.set(Some(applied)),
                Err(e) => tracing::warn!("Zoom request ignored: {}", e),
            }
        }
    };
    let scan = async {
        let (outcome, ()) = tokio::join!(flow.scan(&mut ticker), zoom);
        outcome
    };

    let outcome = tokio::select! {
        outcome = scan => outcome,
        _ = stop_when_exhausted(&flow, &camera, tick) => Ok(FlowOutcome::Stopped),
    };

    if let Err(err) = &outcome {
        tracing::warn!("Scan failed: {}", err);
    }
    let report = SimulationReport {
        outcome,
        statuses: observer.statuses.lock().clone(),
        sent: host.sent(),
        close_calls: host.close_calls(),
        decode_calls: decoder.calls(),
        acquired: camera.acquired(),
        released: camera.released(),
        applied_zoom: applied_zoom.get(),
    };
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use attendscan_core::{CaptureError, LaunchRole};

    fn options(script: &str) -> SimulationOptions {
        SimulationOptions {
            script: script.to_string(),
            config: ScanConfig::default(),
            launch: LaunchContext::default(),
            identity: None,
            optical_zoom: None,
            zoom: None,
            fail_sends: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_sends_scanned_code() {
        let report = run(options(".\n.\n# found it\nLECTURE:42\n"), true)
            .await
            .unwrap();

        assert!(matches!(report.outcome, Ok(FlowOutcome::Sent(_))));
        assert_eq!(report.decode_calls, 3);
        assert_eq!(
            report.sent,
            vec![r#"{"type":"check_in","qr_payload":"LECTURE:42","init_data":""}"#.to_string()]
        );
        assert_eq!(report.close_calls, 1);
        assert_eq!(report.acquired, report.released);
        assert_eq!(report.statuses.last(), Some(&ScanStatus::Sent));
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_without_code_stops() {
        let report = run(options(".\n-\n.\n"), true).await.unwrap();

        assert_eq!(report.outcome, Ok(FlowOutcome::Stopped));
        assert!(report.sent.is_empty());
        assert_eq!(report.acquired, report.released);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_student_launch() {
        let mut opts = options("LECTURE:5");
        opts.launch = LaunchContext::for_role(LaunchRole::Student).with_lecture(5);
        let report = run(opts, true).await.unwrap();

        assert_eq!(
            report.sent,
            vec![
                r#"{"type":"check_in","role":"student","lecture_id":5,"qr_payload":"LECTURE:5","init_data":""}"#
                    .to_string()
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_applies_zoom() {
        let mut opts = options(".\n.\n.\nLECTURE:1");
        opts.optical_zoom = Some(ZoomRange::new(1.0, 4.0, None));
        opts.zoom = Some(9.0);
        let report = run(opts, true).await.unwrap();

        assert_eq!(report.applied_zoom, Some(4.0));
        assert!(matches!(report.outcome, Ok(FlowOutcome::Sent(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_camera_loss_is_a_failure() {
        let report = run(options(".\n!\n"), true).await.unwrap();

        assert!(matches!(
            report.outcome,
            Err(ScanError::Capture(CaptureError::DeviceUnavailable(_)))
        ));
        assert!(report.sent.is_empty());
        assert_eq!(report.acquired, report.released);
        assert!(matches!(
            report.statuses.last(),
            Some(ScanStatus::CameraUnavailable(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_is_a_failure() {
        let mut opts = options("LECTURE:8");
        let host_failure = ChannelError::Unavailable;
        opts.fail_sends = Some(host_failure.clone());
        let report = run(opts, true).await.unwrap();

        assert_eq!(report.outcome, Err(ScanError::Channel(host_failure)));
        assert!(report.sent.is_empty());
        assert_eq!(report.close_calls, 0);
    }

    #[tokio::test]
    async fn test_bad_script_is_rejected() {
        assert!(run(options("@0x0"), true).await.is_err());
    }
}
