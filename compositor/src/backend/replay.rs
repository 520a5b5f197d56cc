//! Recorded skeleton sessions, replayed as a tracker.
//!
//! A recording is a single s-expression: a list of frames, each frame a
//! list of user plists.
//!
//! ```text
//! (((:user 1 :state tracking
//!    :head (0 1600 2000) :left-hand (-550 1200 2000)
//!    :right-hand (200 1300 1500) :left-elbow (-300 1200 2000)))
//!  ()
//!  ((:user 1 :state lost)))
//! ```
//!
//! Positions are tracker millimeters; omitted joints read as zero.
//! Playback loops once the last frame has been returned.

use std::path::Path;

use glam::Vec3;
use lexpr::Value;
use tracing::debug;

use super::sexp::{list_items, number, plist_get, symbol_name};
use crate::error::{CompositorError, ReplayError};
use crate::vr::skeleton::{
    Joints, SkeletonJoint, SkeletonTracker, TrackedUser, TrackingState, UserId,
};

/// Tracker that never sees anyone.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSkeleton;

impl SkeletonTracker for NullSkeleton {
    fn poll(&mut self) -> Result<Vec<TrackedUser>, CompositorError> {
        Ok(Vec::new())
    }

    fn start_tracking(&mut self, _user: UserId) -> Result<(), CompositorError> {
        Ok(())
    }
}

/// Replays recorded frames in order, looping.
#[derive(Debug)]
pub struct ReplaySkeleton {
    frames: Vec<Vec<TrackedUser>>,
    cursor: usize,
    requested: Vec<UserId>,
}

impl ReplaySkeleton {
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let text = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ReplayError> {
        let value = lexpr::from_str(text).map_err(|e| ReplayError::Parse(e.to_string()))?;
        let frames = list_items(&value).ok_or_else(|| {
            ReplayError::Parse("recording must be a list of frames".into())
        })?;

        let mut parsed = Vec::with_capacity(frames.len());
        for (frame, users) in frames.into_iter().enumerate() {
            let users = list_items(users).ok_or_else(|| ReplayError::Frame {
                frame,
                reason: "frame must be a list of users".into(),
            })?;
            let users = users
                .into_iter()
                .map(parse_user)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|reason| ReplayError::Frame { frame, reason })?;
            parsed.push(users);
        }
        Self::from_frames(parsed)
    }

    pub fn from_frames(frames: Vec<Vec<TrackedUser>>) -> Result<Self, ReplayError> {
        if frames.is_empty() {
            return Err(ReplayError::Empty);
        }
        Ok(Self {
            frames,
            cursor: 0,
            requested: Vec::new(),
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Users for which tracking was requested, in request order.
    #[cfg(test)]
    pub fn requested(&self) -> &[UserId] {
        &self.requested
    }
}

impl SkeletonTracker for ReplaySkeleton {
    fn poll(&mut self) -> Result<Vec<TrackedUser>, CompositorError> {
        let users = self.frames[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        Ok(users)
    }

    fn start_tracking(&mut self, user: UserId) -> Result<(), CompositorError> {
        if !self.frames.iter().flatten().any(|u| u.id == user) {
            return Err(CompositorError::Tracking(format!(
                "user {} does not appear in the recording",
                user.0
            )));
        }
        if !self.requested.contains(&user) {
            debug!(user = user.0, "replay: tracking requested");
            self.requested.push(user);
        }
        Ok(())
    }
}

// ── Recording format ───────────────────────────────────────

fn parse_vec3(value: &Value) -> Option<Vec3> {
    let items = list_items(value)?;
    match items.as_slice() {
        [x, y, z] => Some(Vec3::new(
            number(x)? as f32,
            number(y)? as f32,
            number(z)? as f32,
        )),
        _ => None,
    }
}

fn parse_user(value: &Value) -> Result<TrackedUser, String> {
    let id = plist_get(value, "user")
        .and_then(number)
        .filter(|n| n.fract() == 0.0 && *n >= 0.0 && *n <= u16::MAX as f64)
        .ok_or_else(|| format!("missing or invalid :user in {}", value))?;

    let state = plist_get(value, "state")
        .and_then(symbol_name)
        .ok_or_else(|| format!("user {}: missing :state", id))?;
    let state = TrackingState::parse(state)
        .ok_or_else(|| format!("user {}: unknown state {}", id, state))?;

    let mut joints = Joints::default();
    for joint in SkeletonJoint::ALL {
        if let Some(v) = plist_get(value, joint.as_str()) {
            let position = parse_vec3(v)
                .ok_or_else(|| format!("user {}: :{} must be (x y z)", id, joint.as_str()))?;
            joints.set(joint, position);
        }
    }

    Ok(TrackedUser {
        id: UserId(id as u16),
        state,
        joints,
    })
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vr::skeleton::UserLock;

    const RECORDING: &str = "
        (((:user 1 :state tracking
           :head (0 1600 2000) :left-hand (-550 1200 2000)
           :right-hand (200.5 1300 1500) :left-elbow (-300 1200 2000)))
         ()
         ((:user 1 :state lost) (:user 2 :state none)))";

    #[test]
    fn test_parse_frames_and_joints() {
        let replay = ReplaySkeleton::parse(RECORDING).unwrap();
        assert_eq!(replay.frame_count(), 3);

        let user = &replay.frames[0][0];
        assert_eq!(user.id, UserId(1));
        assert_eq!(user.state, TrackingState::Tracking);
        assert_eq!(user.joints.head, Vec3::new(0.0, 1600.0, 2000.0));
        assert_eq!(user.joints.right_hand, Vec3::new(200.5, 1300.0, 1500.0));

        assert!(replay.frames[1].is_empty());
        assert_eq!(replay.frames[2].len(), 2);
        assert_eq!(replay.frames[2][1].state, TrackingState::None);
    }

    #[test]
    fn test_omitted_joints_are_zero() {
        let replay = ReplaySkeleton::parse("(((:user 3 :state lost)))").unwrap();
        assert_eq!(replay.frames[0][0].joints, Joints::default());
    }

    #[test]
    fn test_playback_loops() {
        let mut replay = ReplaySkeleton::parse(RECORDING).unwrap();
        let lens: Vec<usize> = (0..5).map(|_| replay.poll().unwrap().len()).collect();
        assert_eq!(lens, vec![1, 0, 2, 1, 0]);
    }

    #[test]
    fn test_start_tracking_recorded_once() {
        let mut replay = ReplaySkeleton::parse(RECORDING).unwrap();
        replay.start_tracking(UserId(2)).unwrap();
        replay.start_tracking(UserId(2)).unwrap();
        assert_eq!(replay.requested(), &[UserId(2)]);
    }

    #[test]
    fn test_start_tracking_unknown_user_fails() {
        let mut replay = ReplaySkeleton::parse(RECORDING).unwrap();
        let err = replay.start_tracking(UserId(9)).unwrap_err();
        assert!(matches!(err, CompositorError::Tracking(_)));
        assert!(replay.requested().is_empty());
    }

    #[test]
    fn test_drives_user_lock() {
        let mut replay = ReplaySkeleton::parse(RECORDING).unwrap();
        let mut lock = UserLock::default();

        let users = replay.poll().unwrap();
        let sample = lock.update(&users, &mut replay).unwrap().unwrap();
        assert!(sample.newly_locked);

        let users = replay.poll().unwrap();
        assert!(lock.update(&users, &mut replay).unwrap().is_none());
        assert_eq!(lock.locked_user(), None);

        let users = replay.poll().unwrap();
        lock.update(&users, &mut replay).unwrap();
        assert_eq!(replay.requested(), &[UserId(2)]);
    }

    #[test]
    fn test_unknown_state_names_frame() {
        let err = ReplaySkeleton::parse("(() ((:user 1 :state dancing)))").unwrap_err();
        match err {
            ReplayError::Frame { frame, reason } => {
                assert_eq!(frame, 1);
                assert!(reason.contains("dancing"), "{}", reason);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_joint_rejected() {
        let err = ReplaySkeleton::parse("(((:user 1 :state tracking :head (1 2))))").unwrap_err();
        assert!(matches!(err, ReplayError::Frame { frame: 0, .. }));
    }

    #[test]
    fn test_missing_user_id_rejected() {
        assert!(ReplaySkeleton::parse("(((:state tracking)))").is_err());
        assert!(ReplaySkeleton::parse("(((:user -1 :state tracking)))").is_err());
    }

    #[test]
    fn test_empty_and_malformed() {
        assert!(matches!(ReplaySkeleton::parse("()"), Err(ReplayError::Empty)));
        assert!(matches!(ReplaySkeleton::parse("((("), Err(ReplayError::Parse(_))));
        assert!(matches!(ReplaySkeleton::parse("42"), Err(ReplayError::Parse(_))));
        assert!(matches!(
            ReplaySkeleton::parse("(7)"),
            Err(ReplayError::Frame { frame: 0, .. })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("riftwm-replay-{}.sexp", std::process::id()));
        std::fs::write(&path, RECORDING).unwrap();
        let replay = ReplaySkeleton::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(replay.unwrap().frame_count(), 3);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ReplaySkeleton::load(Path::new("/nonexistent/riftwm.sexp")).unwrap_err();
        assert!(matches!(err, ReplayError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/riftwm.sexp"));
    }

    #[test]
    fn test_null_skeleton_is_empty() {
        let mut null = NullSkeleton;
        assert!(null.poll().unwrap().is_empty());
        assert!(null.start_tracking(UserId(1)).is_ok());
    }
}
