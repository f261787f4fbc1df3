// attendscan: desktop harness for the check-in scanner
//
// Builds the messages the mini app sends, replays scripted camera sessions
// through the real scan loop, and inspects launch links.

mod config;
mod simulate;

use anyhow::{Context, Result};
use attendscan_core::scripted::RecordingHost;
use attendscan_core::{
    AuthStatus, ChannelError, CheckInHandoff, DecodedPayload, FlowOutcome, LaunchContext,
    LaunchRole, OutboundMessage, PanelAction, ScanStatus, Symbol, ZoomRange, MAX_SEND_DATA_SIZE,
};
use clap::{Parser, Subcommand};
use colored::*;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "attendscan")]
#[command(about = "AttendScan: QR attendance check-in toolkit", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and print an outbound message
    Message {
        /// Launch link to take role, panels and lecture from
        #[arg(short, long)]
        launch: Option<String>,
        #[command(subcommand)]
        kind: MessageKind,
    },
    /// Replay a frame script through the scan loop
    Simulate {
        /// Script file, one frame per line ("-" reads stdin)
        script: PathBuf,
        #[arg(short, long)]
        launch: Option<String>,
        /// Override the tick interval
        #[arg(long)]
        tick_ms: Option<u64>,
        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Optical zoom range of the simulated camera, as MIN:MAX
        #[arg(long)]
        optical_zoom: Option<String>,
        /// Zoom level to request once the camera is open
        #[arg(long)]
        zoom: Option<f64>,
        /// Make the simulated host refuse every send
        #[arg(long)]
        fail_send: bool,
        /// Print the report as JSON only
        #[arg(long)]
        json: bool,
    },
    /// Show what a launch link grants
    Launch { url: String },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum MessageKind {
    /// Check-in for a scanned code
    CheckIn {
        payload: String,
        #[arg(long)]
        lecture_id: Option<u64>,
    },
    /// Open or close a lecture for check-ins
    SpeakerToggle {
        lecture_id: String,
        #[arg(long)]
        inactive: bool,
    },
    /// Pin a lecture to a location
    SpeakerLocation {
        lecture_id: String,
        #[arg(allow_hyphen_values = true)]
        lat: f64,
        #[arg(allow_hyphen_values = true)]
        lon: f64,
    },
    /// Chat that receives lecture ratings
    RatingChat {
        #[arg(allow_hyphen_values = true)]
        chat_id: String,
    },
    /// Spreadsheet that stores attendance
    SheetId { sheet_id: String },
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
    /// Print the config file location
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Message { launch, kind } => cmd_message(launch, kind),
        Commands::Simulate {
            script,
            launch,
            tick_ms,
            timeout_ms,
            optical_zoom,
            zoom,
            fail_send,
            json,
        } => {
            let args = SimulateArgs {
                script,
                launch,
                tick_ms,
                timeout_ms,
                optical_zoom,
                zoom,
                fail_send,
            };
            cmd_simulate(args, json).await
        }
        Commands::Launch { url } => cmd_launch(&url),
        Commands::Config { action } => cmd_config(action),
    }
}

fn parse_launch(url: Option<&str>, fallback: LaunchContext) -> Result<LaunchContext> {
    match url {
        Some(url) => LaunchContext::from_url(url).context("Invalid launch link"),
        None => Ok(fallback),
    }
}

fn parse_zoom_range(raw: &str) -> Result<ZoomRange> {
    let (min, max) = raw
        .split_once(':')
        .context("Zoom range must look like MIN:MAX")?;
    Ok(ZoomRange::new(
        min.trim().parse().context("Invalid zoom minimum")?,
        max.trim().parse().context("Invalid zoom maximum")?,
        None,
    ))
}

fn cmd_message(launch: Option<String>, kind: MessageKind) -> Result<()> {
    let config = config::Config::load()?;
    let host = RecordingHost::new();
    let host = match config.host.identity() {
        Some(identity) => host.with_identity(identity),
        None => host,
    };

    let submit = |action: PanelAction| -> Result<OutboundMessage> {
        let launch =
            parse_launch(launch.as_deref(), LaunchContext::for_role(LaunchRole::Admin))?;
        let handoff = CheckInHandoff::new(Arc::new(host.clone()), launch, false);
        Ok(handoff.submit(action)?)
    };

    let message = match kind {
        MessageKind::CheckIn {
            payload,
            lecture_id,
        } => {
            let mut fallback = LaunchContext::for_role(LaunchRole::Student);
            if let Some(id) = lecture_id {
                fallback = fallback.with_lecture(id);
            }
            let launch = parse_launch(launch.as_deref(), fallback)?;
            let payload = DecodedPayload::from_symbol(Symbol::new(payload))
                .context("Payload is empty after trimming")?;
            let handoff = CheckInHandoff::new(Arc::new(host.clone()), launch, false);
            handoff.hand_off(payload)?
        }
        MessageKind::SpeakerToggle {
            lecture_id,
            inactive,
        } => submit(PanelAction::SpeakerToggle {
            lecture_id,
            is_active: !inactive,
        })?,
        MessageKind::SpeakerLocation {
            lecture_id,
            lat,
            lon,
        } => submit(PanelAction::SpeakerLocation {
            lecture_id,
            lat,
            lon,
        })?,
        MessageKind::RatingChat { chat_id } => submit(PanelAction::AdminRatingChat {
            rating_chat_id: chat_id,
        })?,
        MessageKind::SheetId { sheet_id } => submit(PanelAction::AdminSheetId { sheet_id })?,
    };

    let sent = host.sent();
    let json = sent.last().context("Nothing was sent")?;
    println!("{}", json);
    eprintln!(
        "{} {} ({} of {} bytes)",
        "✓".green(),
        message.kind().bold(),
        json.len(),
        MAX_SEND_DATA_SIZE
    );
    Ok(())
}

struct SimulateArgs {
    script: PathBuf,
    launch: Option<String>,
    tick_ms: Option<u64>,
    timeout_ms: Option<u64>,
    optical_zoom: Option<String>,
    zoom: Option<f64>,
    fail_send: bool,
}

async fn cmd_simulate(args: SimulateArgs, json: bool) -> Result<()> {
    let SimulateArgs {
        script,
        launch,
        tick_ms,
        timeout_ms,
        optical_zoom,
        zoom,
        fail_send,
    } = args;
    let config = config::Config::load()?;

    let script = if script.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read script from stdin")?;
        text
    } else {
        std::fs::read_to_string(&script)
            .with_context(|| format!("Failed to read {}", script.display()))?
    };

    let mut scan = config.scan.clone();
    if let Some(ms) = tick_ms {
        scan = scan.with_tick_interval(ms)?;
    }
    if let Some(ms) = timeout_ms {
        scan = scan.with_max_scan_duration(ms)?;
    }

    let options = simulate::SimulationOptions {
        script,
        config: scan,
        launch: parse_launch(launch.as_deref(), LaunchContext::default())?,
        identity: config.host.identity(),
        optical_zoom: optical_zoom.as_deref().map(parse_zoom_range).transpose()?,
        zoom,
        fail_sends: fail_send.then(|| ChannelError::SendFailed("refused by --fail-send".into())),
    };

    if !json {
        println!("{}", "Simulating scan session...".bold());
    }
    let report = simulate::run(options, json).await?;

    let failure = report.outcome.as_ref().err().map(ScanStatus::from_error);

    if json {
        let summary = serde_json::json!({
            "outcome": match &report.outcome {
                Ok(FlowOutcome::Sent(_)) => "sent",
                Ok(FlowOutcome::Stopped) => "stopped",
                Ok(FlowOutcome::TimedOut) => "timed_out",
                Err(_) => "failed",
            },
            "error": failure.as_ref().map(|status| status.to_string()),
            "statuses": report.statuses,
            "sent": report.sent,
            "close_calls": report.close_calls,
            "decode_calls": report.decode_calls,
            "acquired": report.acquired,
            "released": report.released,
            "applied_zoom": report.applied_zoom,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!();
        match &report.outcome {
            Ok(FlowOutcome::Sent(message)) => {
                println!("{} {}", "Sent:".green().bold(), report.sent.join("\n"));
                println!("  Kind:     {}", message.kind().bright_cyan());
            }
            Ok(FlowOutcome::Stopped) => println!("{}", "No code was sent".yellow()),
            Ok(FlowOutcome::TimedOut) => println!("{}", "Timed out".yellow()),
            Err(_) => println!("{}", "Scan failed".red().bold()),
        }
        println!("  Decodes:  {}", report.decode_calls);
        println!(
            "  Camera:   {} opened, {} released",
            report.acquired, report.released
        );
        if let Some(level) = report.applied_zoom {
            println!("  Zoom:     {}", level);
        }
    }

    match failure {
        Some(status) => anyhow::bail!("Scan failed: {}", status),
        None => Ok(()),
    }
}

fn cmd_launch(url: &str) -> Result<()> {
    let launch = LaunchContext::from_url(url).context("Invalid launch link")?;
    let config = config::Config::load()?;
    let auth = AuthStatus::from_identity(config.host.identity().as_ref());

    println!("{}", "Launch".bold());
    println!("  Role:     {}", launch.role().to_string().bright_cyan());
    let panels: Vec<&str> = launch.panels().iter().map(|p| p.as_str()).collect();
    println!("  Panels:   {}", panels.join(", "));
    match launch.lecture_id() {
        Some(id) => println!("  Lecture:  {}", id),
        None => println!("  Lecture:  {}", "(none)".dimmed()),
    }
    println!("  Host:     {}", auth);
    Ok(())
}

fn cmd_config(action: ConfigAction) -> Result<()> {
    let mut config = config::Config::load()?;

    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            println!("{} {} = {}", "✓".green(), key, value);
        }
        ConfigAction::Get { key } => match config.get(&key) {
            Some(value) => println!("{}", value),
            None => println!("{}", "(unset)".dimmed()),
        },
        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            for (key, value) in config.list() {
                println!("  {:<22} {}", key, value);
            }
        }
        ConfigAction::Path => {
            println!("{}", config::Config::config_file()?.display());
        }
    }
    Ok(())
}
