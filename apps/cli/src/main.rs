use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, error, info, warn};
use validity_core::events::{DriverEvent, DriverObserver, TracingObserver};
use validity_core::frame::RawFrame;
use validity_core::protocol::constants::{VALIDITY_VENDOR_ID, VFS101_PRODUCT_ID};
use validity_core::session::{SessionConfig, ShortReadPolicy};
use validity_core::transport::NusbTransport;
use validity_core::{DeviceState, ImageDeviceState, VALIDITY_DRIVER, ValidityDevice};

#[derive(Parser, Debug)]
#[command(author, version, about = "Validity fingerprint sensor tool (Pure Rust)", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List attached supported sensors
    List,
    /// Activate a sensor and capture swipes
    Capture(CaptureArgs),
    /// Write the default session configuration to a TOML file
    Config {
        #[arg(default_value = "validity.toml")]
        path: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct CaptureArgs {
    /// Session configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// USB vendor id (hex)
    #[arg(long, value_parser = parse_hex_u16, default_value = "138a")]
    vid: u16,

    /// USB product id (hex)
    #[arg(long, value_parser = parse_hex_u16, default_value = "0001")]
    pid: u16,

    /// Stop after this many captures
    #[arg(short = 'n', long)]
    frames: Option<u64>,

    /// Finger poll interval in milliseconds
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Handling of short frame reads
    #[arg(long, value_enum)]
    short_reads: Option<ShortReads>,

    /// Fail on unexpected response headers
    #[arg(long)]
    strict: bool,

    /// Directory to write raw frames into
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Give up after this many seconds
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Image-device state to request
    #[arg(long, value_enum, default_value_t = Requested::AwaitFingerOn)]
    request: Requested,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ShortReads {
    Fail,
    Tolerate,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Requested {
    AwaitFingerOn,
    Capture,
    AwaitFingerOff,
}

impl From<Requested> for ImageDeviceState {
    fn from(r: Requested) -> Self {
        match r {
            Requested::AwaitFingerOn => ImageDeviceState::AwaitFingerOn,
            Requested::Capture => ImageDeviceState::Capture,
            Requested::AwaitFingerOff => ImageDeviceState::AwaitFingerOff,
        }
    }
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid hex id '{}': {}", s, e))
}

/// Logs events through tracing and optionally dumps frames to disk.
struct CliObserver {
    output: Option<PathBuf>,
    written: AtomicU64,
}

impl DriverObserver for CliObserver {
    fn on_event(&self, event: &DriverEvent) {
        TracingObserver.on_event(event);
    }

    fn on_frame(&self, frame: &RawFrame) {
        let Some(dir) = &self.output else {
            debug!(phase = %frame.phase(), len = frame.len(), "Frame (not saved)");
            return;
        };

        let n = self.written.fetch_add(1, Ordering::SeqCst) + 1;
        let path = dir.join(format!("frame-{:04}-{}.raw", n, frame.phase().code()));
        match std::fs::write(&path, frame.as_bytes()) {
            Ok(()) => info!(path = %path.display(), len = frame.len(), packets = frame.packet_count(), "Frame saved"),
            Err(e) => warn!(path = %path.display(), error = %e, "Could not save frame"),
        }
    }
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let result = match args.command {
        Commands::List => list(),
        Commands::Capture(capture_args) => capture(capture_args),
        Commands::Config { path } => SessionConfig::default()
            .save_to_file(&path)
            .with_context(|| format!("writing {}", path.display())),
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn list() -> Result<()> {
    let devices = NusbTransport::list_supported()?;
    if devices.is_empty() {
        info!(
            "No {} sensors found (looking for {:04x}:{:04x})",
            VALIDITY_DRIVER.full_name, VALIDITY_VENDOR_ID, VFS101_PRODUCT_ID
        );
        return Ok(());
    }
    for d in devices {
        println!("{}", d);
    }
    Ok(())
}

fn load_config(args: &CaptureArgs) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SessionConfig::default(),
    };

    if let Some(n) = args.frames {
        config.max_captures = Some(n);
    }
    if let Some(ms) = args.poll_interval {
        config.poll_interval_ms = ms;
    }
    if let Some(policy) = args.short_reads {
        config.short_reads = match policy {
            ShortReads::Fail => ShortReadPolicy::Fail,
            ShortReads::Tolerate => ShortReadPolicy::Tolerate,
        };
    }
    if args.strict {
        config.strict_protocol = true;
    }
    Ok(config)
}

fn capture(args: CaptureArgs) -> Result<()> {
    let config = load_config(&args)?;
    debug!(?config, "Session configuration");

    if let Some(dir) = &args.output {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    if !VALIDITY_DRIVER.matches(args.vid, args.pid) {
        warn!(vid = %format!("{:04X}", args.vid), pid = %format!("{:04X}", args.pid), "Device id not in the driver table");
    }

    info!("Starting {} capture (nusb backend)...", VALIDITY_DRIVER.full_name);
    let transport = NusbTransport::open_with_ids(args.vid, args.pid)?;
    let observer = Arc::new(CliObserver {
        output: args.output.clone(),
        written: AtomicU64::new(0),
    });
    let mut device = ValidityDevice::open(transport, config, observer)?;

    device.activate(args.request.into(), |result| match result {
        Ok(()) => info!("Sensor ready, swipe a finger"),
        Err(e) => error!(error = %e, "Activation failed"),
    })?;

    // The worker stops by itself on errors or after the capture limit.
    let deadline = Instant::now() + Duration::from_secs(args.timeout);
    while device.state() != DeviceState::Deactivated {
        if Instant::now() >= deadline {
            info!(timeout_s = args.timeout, "Timeout reached, stopping");
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }

    let mut outcome = Ok(());
    device.deactivate(|result| outcome = result)?;
    device.close()?;

    if let Err(e) = outcome {
        bail!("capture failed: {}", e);
    }
    Ok(())
}
