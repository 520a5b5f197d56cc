//! Skeletal tracking input and user locking.
//!
//! A depth-camera tracker reports zero or more users per frame, each with
//! a tracking state and body joint positions in millimeters.  `UserLock`
//! picks one user (the first seen tracked), asks the tracker to start
//! skeleton tracking for newly detected users, and smooths the locked
//! user's head position.

use glam::Vec3;
use tracing::{debug, info};

use super::smoothing::{Smoother, DEFAULT_WINDOW};
use crate::error::CompositorError;

// ── Joints ─────────────────────────────────────────────────

/// Joints the compositor consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkeletonJoint {
    Head,
    LeftHand,
    RightHand,
    LeftElbow,
}

impl SkeletonJoint {
    pub const ALL: [SkeletonJoint; 4] = [
        Self::Head,
        Self::LeftHand,
        Self::RightHand,
        Self::LeftElbow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Head => "head",
            Self::LeftHand => "left-hand",
            Self::RightHand => "right-hand",
            Self::LeftElbow => "left-elbow",
        }
    }
}

/// Joint positions for one user, in tracker millimeters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Joints {
    pub head: Vec3,
    pub left_hand: Vec3,
    pub right_hand: Vec3,
    pub left_elbow: Vec3,
}

impl Joints {
    #[cfg(test)]
    pub fn get(&self, joint: SkeletonJoint) -> Vec3 {
        match joint {
            SkeletonJoint::Head => self.head,
            SkeletonJoint::LeftHand => self.left_hand,
            SkeletonJoint::RightHand => self.right_hand,
            SkeletonJoint::LeftElbow => self.left_elbow,
        }
    }

    pub fn set(&mut self, joint: SkeletonJoint, position: Vec3) {
        match joint {
            SkeletonJoint::Head => self.head = position,
            SkeletonJoint::LeftHand => self.left_hand = position,
            SkeletonJoint::RightHand => self.right_hand = position,
            SkeletonJoint::LeftElbow => self.left_elbow = position,
        }
    }
}

// ── Users ──────────────────────────────────────────────────

/// Tracker-assigned user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(pub u16);

/// Per-user skeleton tracking state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    /// Joints are valid this frame.
    Tracking,
    /// User detected but skeleton tracking was never started.
    None,
    /// Tracking requested, pose not yet acquired.
    Calibrating,
    /// Track dropped out; joints are stale.
    Lost,
}

impl TrackingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tracking => "tracking",
            Self::None => "none",
            Self::Calibrating => "calibrating",
            Self::Lost => "lost",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tracking" => Some(Self::Tracking),
            "none" => Some(Self::None),
            "calibrating" => Some(Self::Calibrating),
            "lost" => Some(Self::Lost),
            _ => None,
        }
    }
}

/// One user as reported for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedUser {
    pub id: UserId,
    pub state: TrackingState,
    pub joints: Joints,
}

/// Source of per-frame user skeletons.
pub trait SkeletonTracker {
    /// Read the current frame's users.  An empty list means nobody is in view.
    fn poll(&mut self) -> Result<Vec<TrackedUser>, CompositorError>;

    /// Ask the tracker to begin skeleton tracking for a detected user.
    fn start_tracking(&mut self, user: UserId) -> Result<(), CompositorError>;
}

impl<T: SkeletonTracker + ?Sized> SkeletonTracker for Box<T> {
    fn poll(&mut self) -> Result<Vec<TrackedUser>, CompositorError> {
        (**self).poll()
    }

    fn start_tracking(&mut self, user: UserId) -> Result<(), CompositorError> {
        (**self).start_tracking(user)
    }
}

// ── Locking ────────────────────────────────────────────────

/// The locked user's data for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedSample {
    pub user: UserId,
    /// Head position averaged over the smoothing window.
    pub head: Vec3,
    /// Raw joint positions this frame.
    pub joints: Joints,
    /// Set on the frame the user was locked; the raw head is the calibration origin.
    pub newly_locked: bool,
}

/// Follows one user for the life of its track.
#[derive(Debug)]
pub struct UserLock {
    locked: Option<UserId>,
    head: Smoother,
    window: usize,
    /// Number of `start_tracking` requests issued.
    pub tracking_requests: u64,
}

impl Default for UserLock {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl UserLock {
    pub fn new(smoothing_window: usize) -> Self {
        Self {
            locked: None,
            head: Smoother::new(smoothing_window),
            window: smoothing_window,
            tracking_requests: 0,
        }
    }

    pub fn locked_user(&self) -> Option<UserId> {
        self.locked
    }

    /// Consume one frame of users.  Returns the locked user's sample when it
    /// is tracked this frame.
    pub fn update(
        &mut self,
        users: &[TrackedUser],
        tracker: &mut dyn SkeletonTracker,
    ) -> Result<Option<TrackedSample>, CompositorError> {
        for user in users.iter().filter(|u| u.state == TrackingState::None) {
            debug!(user = user.id.0, "user detected, starting skeleton tracking");
            tracker.start_tracking(user.id)?;
            self.tracking_requests += 1;
        }

        if let Some(id) = self.locked {
            let still_tracked = users
                .iter()
                .any(|u| u.id == id && u.state != TrackingState::None);
            if !still_tracked {
                info!(user = id.0, "tracked user left, releasing lock");
                self.release();
            }
        }

        let mut newly_locked = false;
        if self.locked.is_none() {
            if let Some(user) = users.iter().find(|u| u.state == TrackingState::Tracking) {
                info!(user = user.id.0, "locking onto tracked user");
                self.locked = Some(user.id);
                newly_locked = true;
            }
        }

        let Some(id) = self.locked else {
            return Ok(None);
        };
        let Some(user) = users
            .iter()
            .find(|u| u.id == id && u.state == TrackingState::Tracking)
        else {
            // Locked but calibrating or briefly lost: no sample this frame.
            return Ok(None);
        };

        self.head.add(user.joints.head);
        let head = self.head.average().unwrap_or(user.joints.head);
        Ok(Some(TrackedSample {
            user: id,
            head,
            joints: user.joints,
            newly_locked,
        }))
    }

    /// Forget the locked user and its smoothing history.
    pub fn release(&mut self) {
        self.locked = None;
        self.head = Smoother::new(self.window);
    }

    pub fn status_sexp(&self) -> String {
        format!(
            "(:user {} :head-samples {} :tracking-requests {})",
            self.locked
                .map(|u| u.0.to_string())
                .unwrap_or_else(|| "nil".to_string()),
            self.head.len(),
            self.tracking_requests,
        )
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        started: Vec<UserId>,
    }

    impl SkeletonTracker for Recorder {
        fn poll(&mut self) -> Result<Vec<TrackedUser>, CompositorError> {
            Ok(Vec::new())
        }

        fn start_tracking(&mut self, user: UserId) -> Result<(), CompositorError> {
            self.started.push(user);
            Ok(())
        }
    }

    fn user(id: u16, state: TrackingState, head: Vec3) -> TrackedUser {
        TrackedUser {
            id: UserId(id),
            state,
            joints: Joints {
                head,
                ..Joints::default()
            },
        }
    }

    #[test]
    fn test_starts_tracking_for_new_users() {
        let mut lock = UserLock::default();
        let mut rec = Recorder::default();
        let users = [
            user(1, TrackingState::None, Vec3::ZERO),
            user(2, TrackingState::Calibrating, Vec3::ZERO),
        ];
        let sample = lock.update(&users, &mut rec).unwrap();
        assert!(sample.is_none());
        assert_eq!(rec.started, vec![UserId(1)]);
        assert_eq!(lock.locked_user(), None);
    }

    #[test]
    fn test_locks_first_tracked_user() {
        let mut lock = UserLock::default();
        let mut rec = Recorder::default();
        let users = [
            user(3, TrackingState::Tracking, Vec3::new(0.0, 1600.0, 2000.0)),
            user(4, TrackingState::Tracking, Vec3::new(500.0, 1700.0, 2500.0)),
        ];
        let sample = lock.update(&users, &mut rec).unwrap().unwrap();
        assert_eq!(sample.user, UserId(3));
        assert!(sample.newly_locked);

        let sample = lock.update(&users, &mut rec).unwrap().unwrap();
        assert_eq!(sample.user, UserId(3));
        assert!(!sample.newly_locked);
    }

    #[test]
    fn test_head_is_smoothed() {
        let mut lock = UserLock::new(4);
        let mut rec = Recorder::default();
        lock.update(&[user(1, TrackingState::Tracking, Vec3::new(0.0, 1000.0, 0.0))], &mut rec)
            .unwrap();
        let sample = lock
            .update(&[user(1, TrackingState::Tracking, Vec3::new(0.0, 1100.0, 0.0))], &mut rec)
            .unwrap()
            .unwrap();
        assert!((sample.head.y - 1050.0).abs() < 0.001);
        assert!((sample.joints.head.y - 1100.0).abs() < 0.001);
    }

    #[test]
    fn test_lost_keeps_lock_without_sample() {
        let mut lock = UserLock::default();
        let mut rec = Recorder::default();
        lock.update(&[user(1, TrackingState::Tracking, Vec3::ZERO)], &mut rec)
            .unwrap();
        let sample = lock
            .update(&[user(1, TrackingState::Lost, Vec3::ZERO)], &mut rec)
            .unwrap();
        assert!(sample.is_none());
        assert_eq!(lock.locked_user(), Some(UserId(1)));
    }

    #[test]
    fn test_departure_releases_and_relocks() {
        let mut lock = UserLock::default();
        let mut rec = Recorder::default();
        lock.update(&[user(1, TrackingState::Tracking, Vec3::ZERO)], &mut rec)
            .unwrap();

        let sample = lock
            .update(&[user(2, TrackingState::Tracking, Vec3::ONE)], &mut rec)
            .unwrap()
            .unwrap();
        assert_eq!(sample.user, UserId(2));
        assert!(sample.newly_locked);
        // Smoothing history restarted with the new user.
        assert!((sample.head - Vec3::ONE).length() < 0.001);
    }

    #[test]
    fn test_empty_frame_releases() {
        let mut lock = UserLock::default();
        let mut rec = Recorder::default();
        lock.update(&[user(1, TrackingState::Tracking, Vec3::ZERO)], &mut rec)
            .unwrap();
        assert!(lock.update(&[], &mut rec).unwrap().is_none());
        assert_eq!(lock.locked_user(), None);
        assert!(lock.status_sexp().starts_with("(:user nil"));
    }

    #[test]
    fn test_joint_and_state_names() {
        let mut joints = Joints::default();
        for (i, joint) in SkeletonJoint::ALL.into_iter().enumerate() {
            joints.set(joint, Vec3::splat(i as f32));
        }
        for (i, joint) in SkeletonJoint::ALL.into_iter().enumerate() {
            assert_eq!(joints.get(joint), Vec3::splat(i as f32), "{}", joint.as_str());
        }
        assert_eq!(TrackingState::parse("lost"), Some(TrackingState::Lost));
        assert_eq!(TrackingState::parse("torso"), None);
    }
}
