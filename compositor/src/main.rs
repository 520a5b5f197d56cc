//! riftwm - immersive stereo window compositor.
//!
//! Application windows are captured as textures, placed as quads in a 3D
//! scene and rendered once per eye for a head-mounted display.  A body
//! tracker lets the user point at a window to focus it and raise the left
//! forearm to drag it.

mod backend;
mod config;
mod error;
mod frame;
mod input;
mod render;
mod state;
mod vr;
mod window;

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info};

use crate::config::{CompositorConfig, HeadlessConfig};
use crate::frame::LoopExit;
use crate::render::camera::DEFAULT_MOVE_SPEED;
use crate::vr::gesture::GestureConfig;
use crate::vr::smoothing::DEFAULT_WINDOW;

#[derive(Parser, Debug)]
#[command(name = "riftwm", about = "Immersive stereo window compositor")]
struct Cli {
    /// Backend to use: winit, headless, or auto
    #[arg(long, default_value = "auto")]
    backend: String,

    /// Output resolution WxH; each eye gets half the width
    #[arg(long, default_value = "1280x800")]
    resolution: String,

    /// Exit after N seconds (headless mode testing)
    #[arg(long)]
    exit_after: Option<u64>,

    /// Headless: read window and key events from stdin as s-expressions
    #[arg(long)]
    stdin_events: bool,

    /// Replay a recorded skeleton session instead of a live tracker
    #[arg(long)]
    skeleton_replay: Option<PathBuf>,

    /// Command spawned by the launch key (empty disables it)
    #[arg(long, default_value = "xterm")]
    launch: String,

    /// Head position samples averaged per frame
    #[arg(long, default_value_t = DEFAULT_WINDOW)]
    smoothing_window: usize,

    /// Minimum pointing cosine for a window to take focus
    #[arg(long, default_value_t = 0.96)]
    focus_threshold: f32,

    /// Forearm verticality tolerance for the hands-up gesture
    #[arg(long, default_value_t = 0.002)]
    hands_up_tolerance: f32,

    /// Scene units per tracker millimeter
    #[arg(long, default_value_t = 0.01)]
    units_per_mm: f32,

    /// Keyboard movement speed in scene units per second
    #[arg(long, default_value_t = DEFAULT_MOVE_SPEED)]
    move_speed: f32,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

impl Cli {
    fn compositor_config(&self) -> anyhow::Result<CompositorConfig> {
        let (width, height) = config::parse_resolution(&self.resolution).ok_or_else(|| {
            anyhow::anyhow!("invalid resolution {:?}, expected WxH", self.resolution)
        })?;
        if !(-1.0..=1.0).contains(&self.focus_threshold) {
            anyhow::bail!("focus threshold must be a cosine in [-1, 1]");
        }
        Ok(CompositorConfig {
            width,
            height,
            smoothing_window: self.smoothing_window.max(1),
            gesture: GestureConfig {
                focus_threshold: self.focus_threshold,
                hands_up_tolerance: self.hands_up_tolerance,
                units_per_mm: self.units_per_mm,
            },
            move_speed: self.move_speed,
            launch_command: Some(self.launch.trim())
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            skeleton_replay: self.skeleton_replay.clone(),
            ..CompositorConfig::default()
        })
    }

    fn backend_type(&self) -> anyhow::Result<backend::BackendType> {
        match self.backend.as_str() {
            "winit" => Ok(backend::BackendType::Winit),
            "headless" => Ok(backend::BackendType::Headless),
            "auto" => {
                if cfg!(feature = "full-backend")
                    && (std::env::var("DISPLAY").is_ok()
                        || std::env::var("WAYLAND_DISPLAY").is_ok())
                {
                    info!("auto-detected: running under existing display, using winit backend");
                    Ok(backend::BackendType::Winit)
                } else {
                    info!("auto-detected: no usable display, using headless backend");
                    Ok(backend::BackendType::Headless)
                }
            }
            other => anyhow::bail!("unknown backend: {other}. Use: winit, headless, or auto"),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if cli.version {
        println!("riftwm {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "riftwm=info,smithay=warn".into()),
        )
        .init();

    if let Err(e) = run(&cli) {
        error!("riftwm: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    info!("riftwm v{} starting", env!("CARGO_PKG_VERSION"));
    let backend_type = cli.backend_type()?;
    let config = cli.compositor_config()?;
    info!(
        backend = ?backend_type,
        width = config.width,
        height = config.height,
        "configuration loaded"
    );

    let headless = HeadlessConfig {
        exit_after: cli.exit_after,
        stdin_events: cli.stdin_events,
        ..HeadlessConfig::default()
    };

    match backend::run(backend_type, config, headless)? {
        LoopExit::Quit => {
            info!("riftwm exiting");
            Ok(())
        }
        LoopExit::Restart => restart(),
    }
}

/// Replace this process with a fresh instance using the same arguments.
fn restart() -> anyhow::Result<()> {
    use std::os::unix::process::CommandExt;

    let exe = std::env::current_exe()?;
    info!(exe = %exe.display(), "restarting");
    let err = std::process::Command::new(&exe)
        .args(std::env::args_os().skip(1))
        .exec();
    Err(anyhow::Error::new(err).context(format!("re-exec of {} failed", exe.display())))
}
