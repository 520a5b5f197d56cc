//! Head-mounted display pose input.
//!
//! The HMD driver hands over per-eye projection and view matrices and the
//! raw head orientation once per frame.  Either matrix may be missing on a
//! given frame (driver warming up, dropped sample); the renderer treats a
//! missing matrix as identity.  When no HMD is active the stereo pair is
//! synthesized from `StereoConfig` and pointer look.

use glam::{Mat4, Quat, Vec3};

use crate::error::CompositorError;

// ── Eyes ───────────────────────────────────────────────────

/// Which eye.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// Matrices for one eye.  `None` means the driver had nothing this frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EyeMatrices {
    pub projection: Option<Mat4>,
    pub view: Option<Mat4>,
}

// ── Pose ───────────────────────────────────────────────────

/// One frame of HMD output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadPose {
    pub left: EyeMatrices,
    pub right: EyeMatrices,
    /// Raw head orientation (GL convention: -Z forward, +Y up).
    pub orientation: Quat,
}

impl HeadPose {
    pub fn eye(&self, eye: Eye) -> &EyeMatrices {
        match eye {
            Eye::Left => &self.left,
            Eye::Right => &self.right,
        }
    }

    /// Heading angle with pitch and roll removed.
    pub fn yaw(&self) -> f32 {
        yaw_from_orientation(self.orientation)
    }
}

/// Project the orientation's forward vector onto the horizontal plane and
/// return its heading in radians.  Positive yaw turns left (toward -X in
/// GL space).
pub fn yaw_from_orientation(orientation: Quat) -> f32 {
    let forward = orientation * Vec3::NEG_Z;
    if forward.x.abs() < f32::EPSILON && forward.z.abs() < f32::EPSILON {
        // Looking straight up or down: heading is undefined.
        return 0.0;
    }
    (-forward.x).atan2(-forward.z)
}

/// Source of per-frame HMD poses.
pub trait HeadTracker {
    /// Poll the device.  `Ok(None)` means no HMD is active.
    fn poll(&mut self) -> Result<Option<HeadPose>, CompositorError>;
}

impl<T: HeadTracker + ?Sized> HeadTracker for Box<T> {
    fn poll(&mut self) -> Result<Option<HeadPose>, CompositorError> {
        (**self).poll()
    }
}

/// Tracker for sessions without a headset.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHeadset;

impl HeadTracker for NoHeadset {
    fn poll(&mut self) -> Result<Option<HeadPose>, CompositorError> {
        Ok(None)
    }
}

// ── Synthesized stereo ─────────────────────────────────────

/// Parameters for the stereo pair used when no HMD supplies one.
#[derive(Debug, Clone)]
pub struct StereoConfig {
    /// Interpupillary distance in scene units.
    pub ipd: f32,
    /// Vertical field of view in degrees.
    pub fov_y_deg: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for StereoConfig {
    fn default() -> Self {
        // 63 mm IPD at 100 mm per scene unit.
        Self {
            ipd: 0.63,
            fov_y_deg: 90.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl StereoConfig {
    /// Build a pose for a display whose eyes are each `eye_width` × `eye_height`.
    pub fn synthesize(&self, eye_width: u32, eye_height: u32) -> HeadPose {
        let aspect = if eye_height == 0 {
            1.0
        } else {
            eye_width as f32 / eye_height as f32
        };
        let projection = Mat4::perspective_rh_gl(
            self.fov_y_deg.to_radians(),
            aspect,
            self.near,
            self.far,
        );
        let half = self.ipd / 2.0;
        HeadPose {
            // The left eye sits at -x, so its view shifts the world by +x.
            left: EyeMatrices {
                projection: Some(projection),
                view: Some(Mat4::from_translation(Vec3::new(half, 0.0, 0.0))),
            },
            right: EyeMatrices {
                projection: Some(projection),
                view: Some(Mat4::from_translation(Vec3::new(-half, 0.0, 0.0))),
            },
            orientation: Quat::IDENTITY,
        }
    }
}
