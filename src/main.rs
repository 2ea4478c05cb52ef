//! hdcp-tx - Run the HDCP transmitter engine against a simulated sink.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hdcp_core::{EngineConfig, HotplugState, LinkStatus};
use hdcp_engine::{CallbackHandler, EngineBuilder, EngineEvent, HdcpHandle};
use hdcp_sim::{Hdcp2Behavior, SimulatedLink};
use hdcp_srm::SrmList;
use tracing::{info, warn};

/// Command-line arguments
struct Args {
    /// Enable debug logging
    debug: bool,
    /// Log to this file instead of stderr
    log_file: Option<PathBuf>,
    /// Engine configuration (JSON)
    config: Option<PathBuf>,
    /// Simulate an HDCP 2.2 sink
    hdcp2: bool,
    /// Number of devices behind a simulated repeater
    repeater: Option<u8>,
    /// Put the sink's KSV on the revocation list
    revoked: bool,
    /// Make the 2.x receiver fault the link
    link_fault: bool,
    /// Seconds to wait for encryption
    timeout: u64,
    /// Seconds to keep the link up afterwards
    hold: u64,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            debug: false,
            log_file: None,
            config: None,
            hdcp2: false,
            repeater: None,
            revoked: false,
            link_fault: false,
            timeout: 10,
            hold: 2,
        }
    }
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--debug" | "-d" => {
                args.debug = true;
            }
            "--log-file" | "-l" => {
                if let Some(path) = iter.next() {
                    args.log_file = Some(PathBuf::from(path));
                }
            }
            "--config" | "-c" => {
                if let Some(path) = iter.next() {
                    args.config = Some(PathBuf::from(path));
                }
            }
            "--hdcp2" => {
                args.hdcp2 = true;
            }
            "--repeater" | "-r" => {
                args.repeater = iter.next().and_then(|n| n.parse().ok()).or(Some(1));
            }
            "--revoked" => {
                args.revoked = true;
            }
            "--link-fault" => {
                args.link_fault = true;
            }
            "--timeout" | "-t" => {
                if let Some(secs) = iter.next().and_then(|s| s.parse().ok()) {
                    args.timeout = secs;
                }
            }
            "--hold" => {
                if let Some(secs) = iter.next().and_then(|s| s.parse().ok()) {
                    args.hold = secs;
                }
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            _ => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
        }
    }

    args
}

fn print_help() {
    println!("hdcp-tx - HDCP transmitter engine against a simulated sink");
    println!();
    println!("Usage: hdcp-tx [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -d, --debug           Enable debug logging");
    println!("  -l, --log-file PATH   Write logs to PATH instead of stderr");
    println!("  -c, --config PATH     Engine configuration (JSON)");
    println!("      --hdcp2           Simulate an HDCP 2.2 sink");
    println!("  -r, --repeater N      Simulate a repeater with N downstream devices");
    println!("      --revoked         Revoke the sink's KSV");
    println!("      --link-fault      Make the HDCP 2.x receiver fault the link");
    println!("  -t, --timeout SECS    Seconds to wait for encryption (default: 10)");
    println!("      --hold SECS       Seconds to keep the link up (default: 2)");
    println!("  -h, --help            Show this help message");
}

fn setup_logging(args: &Args) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let (writer, guard) = match &args.log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("creating log file {:?}", path))?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stderr()),
    };
    let level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(args.log_file.is_none())
        .with_target(true)
        .with_thread_ids(true)
        .with_max_level(level)
        .init();

    Ok(guard)
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let Some(path) = &args.config else {
        return Ok(EngineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {:?}", path))?;
    let config: EngineConfig =
        serde_json::from_str(&text).with_context(|| format!("parsing config {:?}", path))?;
    info!("Loaded engine config from {:?}", path);
    Ok(config)
}

fn simulated_link(args: &Args) -> SimulatedLink {
    let link = match (args.hdcp2, args.repeater) {
        (false, None) => SimulatedLink::hdcp1_sink(),
        (false, Some(n)) => SimulatedLink::hdcp1_repeater(n),
        (true, None) => SimulatedLink::hdcp2_sink(),
        (true, Some(n)) => SimulatedLink::hdcp2_repeater(n),
    };
    if args.link_fault {
        link.hdcp2_behavior(Hdcp2Behavior::LinkFault)
    } else {
        link
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args();

    // Setup logging before anything else
    let _guard = setup_logging(&args)?;

    info!("Starting hdcp-tx");

    let config = load_config(&args)?;
    let link = simulated_link(&args);
    let srm = if args.revoked {
        SrmList::from_ksvs([hdcp_sim::sim_ksv(1)])
    } else {
        SrmList::empty()
    };

    let builder = EngineBuilder::new()
        .config(config)
        .srm(Arc::new(srm))
        .event_handler(CallbackHandler::new(|event| match event {
            EngineEvent::StateChanged { .. } => {}
            EngineEvent::AuthenticationFailed { state, error } => {
                warn!("Authentication failed in {}: {}", state, error)
            }
            other => info!("{:?}", other),
        }));
    let (dispatcher, _probe) = link.build(builder)?;
    let mut handle = HdcpHandle::spawn(dispatcher)?;

    handle.start();
    handle.notify_hotplug(HotplugState::PluggedSinkOn);

    let timeout = Duration::from_secs(args.timeout);
    match handle
        .wait_for_status(LinkStatus::ConnectedEncrypted, timeout)
        .await
    {
        Ok(()) => println!("Link encrypted"),
        Err(e) => println!("Link not encrypted: {} (status {:?})", e, handle.link_status()),
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = tokio::time::sleep(Duration::from_secs(args.hold)) => {}
    }

    handle.notify_hotplug(HotplugState::Unplugged);
    handle
        .wait_for_status(LinkStatus::Disconnected, Duration::from_secs(1))
        .await?;
    handle.shutdown();

    info!("hdcp-tx exiting");
    Ok(())
}
