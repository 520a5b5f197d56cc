//! Tracking subsystem — head pose, body skeleton, gestures.
//!
//! Provides:
//! - `head_pose`: HMD per-eye matrices and yaw (`HeadTracker`)
//! - `skeleton`: depth-camera users and the locked-user filter (`SkeletonTracker`)
//! - `smoothing`: running-average filter for joint jitter
//! - `gesture`: angular window selection and hands-up drag
//! - `frame_timing`: per-stage frame instrumentation

pub mod frame_timing;
pub mod gesture;
pub mod head_pose;
pub mod skeleton;
pub mod smoothing;

pub use skeleton::SkeletonTracker;
