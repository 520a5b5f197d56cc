//! Backend abstraction — headless and winit/XWayland backends.
//!
//! A backend supplies the windowing-system side of the frame loop
//! (`WindowSource`) and a `Gpu`.  Tracking sources are chosen here too so
//! both backends share the same selection logic.

pub mod headless;
pub mod replay;
mod sexp;

#[cfg(feature = "full-backend")]
pub mod gles;
#[cfg(feature = "full-backend")]
pub mod winit;
#[cfg(feature = "full-backend")]
pub mod xwayland;

use tracing::info;

use crate::config::{CompositorConfig, HeadlessConfig};
use crate::error::CompositorError;
use crate::frame::LoopExit;
use crate::input::WmEvent;
use crate::vr::skeleton::SkeletonTracker;
use crate::window::WindowHandle;

/// Current attributes of a window, as reported by the windowing system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowAttributes {
    pub width: u32,
    pub height: u32,
    /// Mapped and not obscured by an unmapped ancestor.
    pub viewable: bool,
}

/// Windowing-system side of the frame loop.
pub trait WindowSource {
    /// Append every event queued right now to `out`.  Never blocks.
    fn drain_events(&mut self, out: &mut Vec<WmEvent>) -> Result<(), CompositorError>;

    /// Synchronously query a window's current attributes.
    fn query_attributes(&mut self, window: WindowHandle)
        -> Result<WindowAttributes, CompositorError>;

    /// Spawn an external application onto this display.
    fn launch(&mut self, command: &str) -> std::io::Result<()> {
        std::process::Command::new(command).spawn().map(|_| ())
    }
}

/// Backend type selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Winit,
    Headless,
}

/// Skeleton source selected by the configuration: a replayed recording if
/// one was given, otherwise a tracker that never sees anyone.
pub fn skeleton_source(config: &CompositorConfig) -> anyhow::Result<Box<dyn SkeletonTracker>> {
    match config.skeleton_replay {
        Some(ref path) => {
            let replay = replay::ReplaySkeleton::load(path)?;
            info!(
                path = %path.display(),
                frames = replay.frame_count(),
                "skeleton replay loaded"
            );
            Ok(Box::new(replay))
        }
        None => Ok(Box::new(replay::NullSkeleton)),
    }
}

/// Run the compositor with the selected backend until it quits or asks to restart.
pub fn run(
    backend: BackendType,
    config: CompositorConfig,
    headless: HeadlessConfig,
) -> anyhow::Result<LoopExit> {
    match backend {
        BackendType::Headless => headless::run(config, headless),
        #[cfg(feature = "full-backend")]
        BackendType::Winit => winit::run(config),
        #[cfg(not(feature = "full-backend"))]
        BackendType::Winit => {
            anyhow::bail!("winit backend requires building with --features full-backend")
        }
    }
}
