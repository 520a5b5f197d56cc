//! Launch-time configuration.

use std::path::PathBuf;

use crate::render::camera::DEFAULT_MOVE_SPEED;
use crate::vr::gesture::GestureConfig;
use crate::vr::head_pose::StereoConfig;
use crate::vr::smoothing::DEFAULT_WINDOW;

/// Compositor configuration shared by every backend.
#[derive(Debug, Clone)]
pub struct CompositorConfig {
    /// Output width in pixels; each eye gets half.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Samples in the head-position running average.
    pub smoothing_window: usize,
    /// Selection thresholds and tracker scaling.
    pub gesture: GestureConfig,
    /// Stereo pair synthesized when no HMD is active.
    pub stereo: StereoConfig,
    /// Keyboard movement speed in scene units per second.
    pub move_speed: f32,
    /// Command spawned by the launch key.
    pub launch_command: Option<String>,
    /// Recorded skeleton session to replay instead of a live tracker.
    pub skeleton_replay: Option<PathBuf>,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            smoothing_window: DEFAULT_WINDOW,
            gesture: GestureConfig::default(),
            stereo: StereoConfig::default(),
            move_speed: DEFAULT_MOVE_SPEED,
            launch_command: Some("xterm".to_string()),
            skeleton_replay: None,
        }
    }
}

/// Headless run-loop configuration.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Frame interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Exit after N seconds (for CI).
    pub exit_after: Option<u64>,
    /// Seconds between status log lines.
    pub status_interval_secs: u64,
    /// Read window and input events from stdin, one s-expression per line.
    pub stdin_events: bool,
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 16,
            exit_after: None,
            status_interval_secs: 60,
            stdin_events: false,
        }
    }
}

/// Parse a "WxH" resolution string. Returns (width, height) or None.
pub fn parse_resolution(s: &str) -> Option<(u32, u32)> {
    let (w, h) = s.split_once('x')?;
    let w = w.trim().parse::<u32>().ok()?;
    let h = h.trim().parse::<u32>().ok()?;
    // Each eye needs at least one column.
    if w >= 2 && h > 0 {
        Some((w, h))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = CompositorConfig::default();
        assert_eq!((c.width, c.height), (1280, 800));
        assert_eq!(c.smoothing_window, 20);
        assert!((c.gesture.focus_threshold - 0.96).abs() < 0.0001);
        assert!((c.gesture.hands_up_tolerance - 0.002).abs() < 0.0001);
        assert_eq!(c.launch_command.as_deref(), Some("xterm"));
    }

    #[test]
    fn test_parse_resolution() {
        assert_eq!(parse_resolution("1280x800"), Some((1280, 800)));
        assert_eq!(parse_resolution("1920x1080"), Some((1920, 1080)));
        assert_eq!(parse_resolution("1280"), None);
        assert_eq!(parse_resolution("0x800"), None);
        assert_eq!(parse_resolution("1x800"), None);
        assert_eq!(parse_resolution("axb"), None);
        assert_eq!(parse_resolution("1280x800x2"), None);
    }
}
