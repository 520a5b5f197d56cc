//! Gesture-driven window selection and drag.
//!
//! The right hand points at windows: every mapped window is scored by the
//! cosine between the camera→window and camera→hand directions, and the
//! best score above a threshold becomes the focus candidate.  Raising the
//! left forearm vertically ("hands up") arms dragging: the focused window
//! then follows the right hand until the arm comes down.
//!
//! Focus only moves when a candidate exists, which keeps it from
//! flickering between windows that are almost equally aligned.

use glam::Vec3;
use tracing::debug;

use super::skeleton::TrackedSample;
use crate::window::{WindowHandle, WindowRegistry};

// ── Events ─────────────────────────────────────────────────

/// Changes produced by one selector update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionEvent {
    FocusGained(WindowHandle),
    FocusLost(WindowHandle),
    DragStarted(WindowHandle),
    DragEnded(WindowHandle),
}

// ── Config ─────────────────────────────────────────────────

/// Selection thresholds and tracker scaling.
#[derive(Debug, Clone)]
pub struct GestureConfig {
    /// Minimum cosine between window and hand directions for a candidate.
    pub focus_threshold: f32,
    /// Maximum squared deviation of the forearm's vertical ratio from 1.
    pub hands_up_tolerance: f32,
    /// Scene units per tracker millimeter.
    pub units_per_mm: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            focus_threshold: 0.96,
            hands_up_tolerance: 0.002,
            units_per_mm: 0.01,
        }
    }
}

// ── Geometry ───────────────────────────────────────────────

/// True iff the forearm from `elbow` to `hand` points (almost) straight up.
pub fn hands_up(hand: Vec3, elbow: Vec3, tolerance: f32) -> bool {
    let forearm = hand - elbow;
    let dist = forearm.length();
    if dist <= f32::EPSILON {
        return false;
    }
    let ratio = forearm.y / dist - 1.0;
    ratio * ratio < tolerance
}

/// Cosine of the angle at `camera` between `target` and `hand`.
/// `None` when either point coincides with the camera.
pub fn alignment(camera: Vec3, target: Vec3, hand: Vec3) -> Option<f32> {
    let to_target = (target - camera).try_normalize()?;
    let to_hand = (hand - camera).try_normalize()?;
    Some(to_target.dot(to_hand))
}

/// Highest-scoring entry strictly above `threshold`.  Equal scores go to
/// the lower handle, whatever the iteration order.
pub fn best_candidate<I>(scores: I, threshold: f32) -> Option<WindowHandle>
where
    I: IntoIterator<Item = (WindowHandle, f32)>,
{
    scores
        .into_iter()
        .filter(|(_, cos)| *cos > threshold)
        .max_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.0.cmp(&a.0))
        })
        .map(|(handle, _)| handle)
}

// ── Offsets ────────────────────────────────────────────────

/// Calibrated joint offsets in scene units for the current frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Offsets {
    pub head: Vec3,
    pub left_hand: Vec3,
    pub right_hand: Vec3,
}

// ── Selector ───────────────────────────────────────────────

/// Focus selection and drag state.
#[derive(Debug, Default)]
pub struct GestureSelector {
    pub config: GestureConfig,
    /// Head position (tracker mm) captured when the user was locked.
    origin: Option<Vec3>,
    offsets: Offsets,
    hands_up: bool,
}

impl GestureSelector {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn origin(&self) -> Option<Vec3> {
        self.origin
    }

    pub fn offsets(&self) -> Offsets {
        self.offsets
    }

    #[cfg(test)]
    pub fn is_hands_up(&self) -> bool {
        self.hands_up
    }

    /// Tracker position → scene offset from the calibrated origin.
    pub fn offset(&self, sample: Vec3, origin: Vec3) -> Vec3 {
        (sample - origin) * self.config.units_per_mm
    }

    /// Run one selection step for the locked user.
    ///
    /// `anchor` is the avatar's world position; the camera sits at
    /// `anchor - head offset` and the hand at `anchor - right-hand offset`.
    pub fn update(
        &mut self,
        sample: &TrackedSample,
        anchor: Vec3,
        registry: &mut WindowRegistry,
    ) -> Vec<SelectionEvent> {
        if sample.newly_locked || self.origin.is_none() {
            debug!(user = sample.user.0, origin = ?sample.joints.head, "origin calibrated");
            self.origin = Some(sample.joints.head);
        }
        let origin = self.origin.unwrap_or(sample.joints.head);

        self.offsets = Offsets {
            head: self.offset(sample.head, origin),
            left_hand: self.offset(sample.joints.left_hand, origin),
            right_hand: self.offset(sample.joints.right_hand, origin),
        };
        self.hands_up = hands_up(
            sample.joints.left_hand,
            sample.joints.left_elbow,
            self.config.hands_up_tolerance,
        );

        let camera = anchor - self.offsets.head;
        let hand = anchor - self.offsets.right_hand;
        let candidate = best_candidate(
            registry
                .mapped()
                .filter_map(|w| alignment(camera, w.position, hand).map(|c| (w.handle(), c))),
            self.config.focus_threshold,
        );

        let mut events = Vec::new();
        let before = registry.focused();
        match candidate {
            Some(target) if Some(target) != before => {
                registry.set_focus(Some(target));
            }
            None if !self.hands_up => {
                registry.set_focus(None);
            }
            _ => {}
        }
        let after = registry.focused();
        if before != after {
            if let Some(old) = before {
                events.push(SelectionEvent::FocusLost(old));
            }
            if let Some(new) = after {
                events.push(SelectionEvent::FocusGained(new));
            }
        }

        let dragging = if self.hands_up { after } else { None };
        for win in registry.iter_mut() {
            if Some(win.handle()) == dragging {
                if !win.moving {
                    events.push(SelectionEvent::DragStarted(win.handle()));
                }
                win.moving = true;
                win.position = hand;
            } else if win.moving {
                events.push(SelectionEvent::DragEnded(win.handle()));
                win.moving = false;
            }
        }
        events
    }

    /// No user tracked this frame: nothing is selected or dragged, focus stays.
    pub fn idle(&mut self, registry: &mut WindowRegistry) -> Vec<SelectionEvent> {
        self.hands_up = false;
        let mut events = Vec::new();
        for win in registry.iter_mut().filter(|w| w.moving) {
            win.moving = false;
            events.push(SelectionEvent::DragEnded(win.handle()));
        }
        events
    }

    /// Drop the calibration; the next tracked user recalibrates.
    pub fn reset(&mut self) {
        self.origin = None;
        self.offsets = Offsets::default();
        self.hands_up = false;
    }

    pub fn status_sexp(&self) -> String {
        let origin = match self.origin {
            Some(o) => format!("({:.0} {:.0} {:.0})", o.x, o.y, o.z),
            None => "nil".to_string(),
        };
        format!(
            "(:origin {} :hands-up {} :head-offset ({:.2} {:.2} {:.2}))",
            origin,
            if self.hands_up { "t" } else { "nil" },
            self.offsets.head.x,
            self.offsets.head.y,
            self.offsets.head.z,
        )
    }
}

// ── Tests ──────────────────────────────────────────────────
