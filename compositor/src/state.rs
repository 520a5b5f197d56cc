//! Compositor state — the context object every frame stage works on.
//!
//! A single `RiftState` owns the window set, capture bridge, camera,
//! tracking filters, renderer and timing.  External collaborators (window
//! source, GPU, trackers) live beside it in `frame::Compositor` and are
//! passed in by reference.

use std::time::Instant;

use crate::config::CompositorConfig;
use crate::render::camera::Camera;
use crate::render::StereoRenderer;
use crate::vr::frame_timing::FrameTiming;
use crate::vr::gesture::GestureSelector;
use crate::vr::head_pose::StereoConfig;
use crate::vr::skeleton::UserLock;
use crate::window::{TextureBridge, WindowRegistry};

/// Central compositor state.
pub struct RiftState {
    pub config: CompositorConfig,

    // Scene
    pub registry: WindowRegistry,
    pub bridge: TextureBridge,
    pub camera: Camera,
    pub renderer: StereoRenderer,

    // Tracking
    pub user_lock: UserLock,
    pub gesture: GestureSelector,
    /// Whether the last head-pose poll found an HMD.
    pub hmd_active: bool,
    /// Stereo pair used without an HMD.
    pub stereo: StereoConfig,

    // Timing
    pub timing: FrameTiming,
    pub start_time: Instant,
    pub frame_count: u64,
}

impl RiftState {
    pub fn new(config: CompositorConfig, renderer: StereoRenderer) -> Self {
        Self {
            registry: WindowRegistry::new(),
            bridge: TextureBridge::new(),
            camera: Camera::new(config.move_speed),
            renderer,
            user_lock: UserLock::new(config.smoothing_window),
            gesture: GestureSelector::new(config.gesture.clone()),
            hmd_active: false,
            stereo: config.stereo.clone(),
            timing: FrameTiming::default(),
            start_time: Instant::now(),
            frame_count: 0,
            config,
        }
    }

    /// One-line status for periodic logging.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:uptime {} :frames {} :hmd {} :registry {} :capture {} :tracking {} :gesture {} :timing {})",
            self.start_time.elapsed().as_secs(),
            self.frame_count,
            if self.hmd_active { "t" } else { "nil" },
            self.registry.status_sexp(),
            self.bridge.status_sexp(),
            self.user_lock.status_sexp(),
            self.gesture.status_sexp(),
            self.timing.stats_sexp(),
        )
    }
}
