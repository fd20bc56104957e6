use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::{self, ExitCode};

mod config;
mod normalize;
#[cfg_attr(feature = "devmock", allow(dead_code))]
mod onvif;
mod protos;
mod ptzdev;
#[cfg(any(test, feature = "devmock"))]
mod ptzdev_mock;
mod ptzerror;
mod report;
mod runner;
mod schedule;

use clap::{Parser, Subcommand};
use tokio::fs;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use crate::config::CameraConfig;
use crate::normalize::setpoint_to_device;
use crate::protos::{ProfileInfo, Speed};
use crate::ptzdev::DeviceHandle;
use crate::ptzerror::{PTZError, PTZResult};
use crate::runner::{AbortCause, CancelHandle, RunOutcome, ScheduleRunner};
use crate::schedule::Setpoint;

const EXIT_FAILURE: u8 = 1;
const EXIT_CONNECT: u8 = 2;
const EXIT_POSITION_SPACE: u8 = 3;
const EXIT_CANCELLED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "ptz-schedule", version, about = "Time-scheduled PTZ camera positioning")]
struct Cli {
    /// Camera settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    host: Option<String>,
    #[arg(long, global = true)]
    port: Option<u16>,
    #[arg(long, global = true)]
    user: Option<String>,
    #[arg(long, global = true, env = "PTZ_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a schedule file with columns time,pan,tilt,zoom
    Run {
        #[arg(long, short)]
        file: PathBuf,
    },
    /// Move to one position immediately
    Move {
        #[arg(long, allow_hyphen_values = true)]
        pan: f64,
        #[arg(long, allow_hyphen_values = true)]
        tilt: f64,
        #[arg(long, default_value_t = 1.0)]
        zoom: f64,
    },
    /// Print the current position
    Status,
    /// Print device identity, media profiles and their snapshot URIs
    Info,
    /// Save a still image from the first profile that offers one
    Snapshot {
        #[arg(long, short, default_value = "snapshot.jpg")]
        out: PathBuf,
    },
}

impl Cli {
    fn apply_overrides(&self, cfg: &mut CameraConfig) {
        if let Some(host) = &self.host {
            cfg.host = host.clone();
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(user) = &self.user {
            cfg.username = user.clone();
        }
        if let Some(password) = &self.password {
            cfg.password = password.clone();
        }
    }
}

#[cfg(not(feature = "devmock"))]
fn open_device(cfg: &CameraConfig) -> PTZResult<DeviceHandle> {
    Ok(DeviceHandle::spawn(onvif::OnvifCamera::new(cfg)?))
}

#[cfg(feature = "devmock")]
fn open_device(_cfg: &CameraConfig) -> PTZResult<DeviceHandle> {
    Ok(DeviceHandle::spawn(ptzdev_mock::MockPtz::new()))
}

/// The first interrupt cancels the run cooperatively; resolves to true when
/// a second one arrives while the run is still winding down.
async fn escalate_interrupts<S, F>(mut interrupt: S, cancel: CancelHandle) -> bool
where
    S: FnMut() -> F,
    F: Future<Output = io::Result<()>>,
{
    if interrupt().await.is_err() {
        return false;
    }
    tracing::warn!("interrupted, stopping schedule (interrupt again to exit)");
    cancel.cancel();
    interrupt().await.is_ok()
}

async fn run_schedule(file: PathBuf, device: DeviceHandle) -> u8 {
    let schedule = match schedule::load_file(&file).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("cannot load {}: {}", file.display(), e);
            return EXIT_FAILURE;
        }
    };
    println!("Scheduling {} PTZ commands", schedule.len());

    let (send_events, recv_events) = mpsc::unbounded_channel();
    let printer = task::spawn(report::print_events(recv_events));
    let mut runner = ScheduleRunner::new().with_events(send_events);
    let cancel = runner.cancel_handle();
    task::spawn(async move {
        if escalate_interrupts(signal::ctrl_c, cancel).await {
            tracing::error!("interrupted again, exiting");
            process::exit(i32::from(EXIT_CANCELLED));
        }
    });

    let outcome = runner.run(&schedule, &device).await;
    // the printer ends once the runner's sender is gone
    drop(runner);
    printer.await.ok();

    match outcome {
        RunOutcome::Completed(_) => 0,
        RunOutcome::Aborted { cause: AbortCause::Connect(_), .. } => EXIT_CONNECT,
        RunOutcome::Aborted { cause: AbortCause::PositionSpace(_), .. } => EXIT_POSITION_SPACE,
        RunOutcome::Aborted { cause: AbortCause::Cancelled, .. } => EXIT_CANCELLED,
    }
}

async fn move_once(setpoint: Setpoint, device: DeviceHandle) -> PTZResult<()> {
    let token = device.connect().await?;
    let space = device.get_position_space().await?;
    let position = setpoint_to_device(&setpoint, &space);
    println!("Pan={}, Tilt={}, Zoom={} -> {:.4}, {:.4}, {:.4}",
        setpoint.pan_degrees, setpoint.tilt_degrees, setpoint.zoom_ratio,
        position.pan, position.tilt, position.zoom);
    device.absolute_move(&token, position, Speed::FULL).await
}

async fn show_status(device: DeviceHandle) -> PTZResult<u8> {
    let token = device.connect().await?;
    let space = match device.get_position_space().await {
        Ok(space) => Some(space),
        Err(e) => {
            tracing::warn!(error = %e, "no position space, guessing conventions");
            None
        }
    };
    // past the position space query, a failure is no longer a configuration problem
    let raw = match device.get_status(&token).await {
        Ok(raw) => raw,
        Err(e) => return Ok(fail(&e, EXIT_FAILURE)),
    };
    for line in report::format_status(&raw, space.as_ref()) {
        println!("{}", line);
    }
    Ok(0)
}

async fn show_info(device: DeviceHandle) -> PTZResult<u8> {
    device.connect().await?;
    match device.device_information().await {
        Ok(info) => {
            for line in report::format_device_info(&info) {
                println!("{}", line);
            }
        },
        Err(e) => tracing::warn!(error = %e, "device information unavailable"),
    }
    let profiles = device.profiles().await?;
    for line in report::format_profiles(&profiles) {
        println!("{}", line);
    }
    for (i, p) in profiles.iter().enumerate() {
        match device.snapshot_uri(&p.token).await {
            Ok(uri) => println!("Profile #{} snapshot: {}", i, uri),
            Err(e) => println!("Profile #{} snapshot: unavailable ({})", i, e),
        }
    }
    Ok(0)
}

async fn first_snapshot_uri(device: &DeviceHandle, profiles: &[ProfileInfo]) -> Option<String> {
    for p in profiles {
        match device.snapshot_uri(&p.token).await {
            Ok(uri) => return Some(uri),
            Err(e) => tracing::debug!(profile = %p.token, error = %e, "no snapshot uri"),
        }
    }
    None
}

async fn save_snapshot(out: PathBuf, device: DeviceHandle) -> PTZResult<u8> {
    device.connect().await?;
    let profiles = device.profiles().await?;
    let uri = first_snapshot_uri(&device, &profiles).await
        .ok_or_else(|| PTZError::Snapshot("no profile offers a snapshot uri".to_string()))?;
    let image = device.fetch_snapshot(&uri).await?;
    fs::write(&out, &image).await?;
    println!("saved {} bytes from {} to {}", image.len(), uri, out.display());
    Ok(0)
}

fn exit_code(e: &PTZError) -> u8 {
    match e {
        PTZError::Connection(_) => EXIT_CONNECT,
        PTZError::Query(_) | PTZError::InvalidRange { .. } => EXIT_POSITION_SPACE,
        _ => EXIT_FAILURE,
    }
}

fn fail(e: &PTZError, code: u8) -> u8 {
    tracing::error!(error = %e, "ptz-schedule failed");
    eprintln!("error: {}", e);
    code
}

async fn dispatch(cli: Cli) -> PTZResult<u8> {
    let mut cfg = config::load_config(cli.config.as_deref()).await?;
    cli.apply_overrides(&mut cfg);
    let device = open_device(&cfg)?;
    tracing::info!(device = %device, "device ready");
    match cli.command {
        Command::Run { file } => Ok(run_schedule(file, device).await),
        Command::Move { pan, tilt, zoom } => {
            let setpoint = Setpoint {
                time_offset_seconds: 0.0,
                pan_degrees: pan,
                tilt_degrees: tilt,
                zoom_ratio: zoom,
            };
            move_once(setpoint, device).await.map(|_| 0)
        },
        Command::Status => show_status(device).await,
        Command::Info => show_info(device).await,
        Command::Snapshot { out } => save_snapshot(out, device).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("ptz_schedule=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => ExitCode::from(fail(&e, exit_code(&e))),
    }
}
