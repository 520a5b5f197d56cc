//! Frame orchestration — one pass of the compositor loop.
//!
//! Each frame runs seven stages strictly in order: drain window events,
//! poll head pose, poll the skeleton tracker, update gesture selection,
//! refresh dirty captures, render both eyes, present.  Any error unwinds
//! out of `step`; the caller tears down and ends the session.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::backend::WindowSource;
use crate::config::CompositorConfig;
use crate::error::{CompositorError, InitError};
use crate::input::{KeyAction, WmEvent};
use crate::render::gpu::Gpu;
use crate::render::StereoRenderer;
use crate::state::RiftState;
use crate::vr::frame_timing::{FrameClock, Stage};
use crate::vr::gesture::SelectionEvent;
use crate::vr::head_pose::{HeadPose, HeadTracker};
use crate::vr::skeleton::SkeletonTracker;

/// Why the frame loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Quit,
    /// Tear down and re-execute the compositor.
    Restart,
}

/// The compositor: scene state plus its external collaborators.
pub struct Compositor<W, G, H, S> {
    pub state: RiftState,
    windows: W,
    gpu: G,
    head: H,
    skeleton: S,
    events: Vec<WmEvent>,
    last_frame: Option<Instant>,
    torn_down: bool,
}

impl<W, G, H, S> Compositor<W, G, H, S>
where
    W: WindowSource,
    G: Gpu,
    H: HeadTracker,
    S: SkeletonTracker,
{
    /// Build render resources and the initial state.
    pub fn new(
        config: CompositorConfig,
        windows: W,
        mut gpu: G,
        head: H,
        skeleton: S,
    ) -> Result<Self, InitError> {
        let renderer = StereoRenderer::new(&mut gpu, config.width, config.height)?;
        Ok(Self {
            state: RiftState::new(config, renderer),
            windows,
            gpu,
            head,
            skeleton,
            events: Vec::new(),
            last_frame: None,
            torn_down: false,
        })
    }

    pub fn windows(&self) -> &W {
        &self.windows
    }

    pub fn windows_mut(&mut self) -> &mut W {
        &mut self.windows
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn gpu_mut(&mut self) -> &mut G {
        &mut self.gpu
    }

    pub fn skeleton_mut(&mut self) -> &mut S {
        &mut self.skeleton
    }

    /// Run one frame, timing movement by the wall clock.
    pub fn frame(&mut self) -> Result<Option<LoopExit>, CompositorError> {
        let now = Instant::now();
        let dt = self
            .last_frame
            .map(|t| (now - t).as_secs_f32())
            .unwrap_or(0.0);
        self.last_frame = Some(now);
        self.step(dt)
    }

    /// Run one frame with an explicit time step in seconds.
    pub fn step(&mut self, dt: f32) -> Result<Option<LoopExit>, CompositorError> {
        let mut clock = FrameClock::start();

        // 1. Window-system events
        if let Some(exit) = self.intake_events()? {
            info!(?exit, "exit requested");
            return Ok(Some(exit));
        }
        clock.lap(Stage::Events);

        // 2. Head pose
        let pose = self.poll_head()?;
        self.state.camera.update(dt);
        clock.lap(Stage::HeadPose);

        // 3. Skeleton
        let users = self.skeleton.poll()?;
        let sample = self.state.user_lock.update(&users, &mut self.skeleton)?;
        clock.lap(Stage::Skeleton);

        // 4. Gesture selection
        let state = &mut self.state;
        let events = match sample {
            Some(ref s) => state.gesture.update(s, state.camera.position, &mut state.registry),
            None => {
                if state.user_lock.locked_user().is_none() && state.gesture.origin().is_some() {
                    state.gesture.reset();
                }
                state.gesture.idle(&mut state.registry)
            }
        };
        state.camera.head_offset = state.gesture.offsets().head;
        for event in events {
            log_selection(event);
        }
        clock.lap(Stage::Gesture);

        // 5. Capture refresh
        self.state
            .bridge
            .refresh(&mut self.state.registry, &mut self.windows, &mut self.gpu)?;
        clock.lap(Stage::Capture);

        // 6. Render
        let look = !self.state.hmd_active;
        self.state.renderer.render(
            &mut self.gpu,
            &self.state.registry,
            &self.state.camera,
            &pose,
            look,
        )?;
        clock.lap(Stage::Render);

        // 7. Present
        self.state.renderer.present(&mut self.gpu)?;
        clock.lap(Stage::Present);

        self.state.timing.record_frame(clock.durations());
        self.state.frame_count += 1;
        Ok(None)
    }

    /// Drain and apply queued events.  Stops at the first exit request.
    fn intake_events(&mut self) -> Result<Option<LoopExit>, CompositorError> {
        self.events.clear();
        self.windows.drain_events(&mut self.events)?;
        let events = std::mem::take(&mut self.events);
        let mut exit = None;
        for event in &events {
            exit = self.apply_event(event);
            if exit.is_some() {
                break;
            }
        }
        self.events = events;
        Ok(exit)
    }

    fn apply_event(&mut self, event: &WmEvent) -> Option<LoopExit> {
        let registry = &mut self.state.registry;
        match *event {
            WmEvent::Created { window } => {
                registry.upsert(window);
            }
            WmEvent::Configured { window, width, height } => {
                registry.mark_configured(window, width, height);
            }
            WmEvent::Mapped { window } => {
                let (width, height) = registry.upsert(window).size();
                registry.mark_mapped(window, width, height);
                debug!(%window, "window mapped");
            }
            WmEvent::Unmapped { window } | WmEvent::Destroyed { window } => {
                registry.remove(window, &mut self.gpu);
            }
            WmEvent::Key { action, pressed } => return self.apply_key(action, pressed),
            WmEvent::PointerMotion { x, y } => {
                if !self.state.hmd_active {
                    let (width, height) = self.state.renderer.size();
                    self.state.camera.look_at_pointer(x, y, width, height);
                }
            }
            WmEvent::CloseRequested => return Some(LoopExit::Quit),
        }
        None
    }

    fn apply_key(&mut self, action: KeyAction, pressed: bool) -> Option<LoopExit> {
        match action {
            KeyAction::Move(direction) => self.state.camera.set_held(direction, pressed),
            _ if !pressed => {}
            KeyAction::Quit => return Some(LoopExit::Quit),
            KeyAction::Restart => return Some(LoopExit::Restart),
            KeyAction::Launch => match self.state.config.launch_command.as_deref() {
                Some(command) => match self.windows.launch(command) {
                    Ok(()) => info!(command, "launched"),
                    Err(e) => warn!(command, "launch failed: {}", e),
                },
                None => debug!("launch key pressed, no command configured"),
            },
        }
        None
    }

    /// HMD pose, or the synthesized stereo pair when no HMD is active.
    fn poll_head(&mut self) -> Result<HeadPose, CompositorError> {
        match self.head.poll()? {
            Some(pose) => {
                if !self.state.hmd_active {
                    info!("HMD active");
                }
                self.state.hmd_active = true;
                self.state.camera.yaw = pose.yaw();
                Ok(pose)
            }
            None => {
                if self.state.hmd_active {
                    info!("HMD lost, using synthesized stereo");
                }
                self.state.hmd_active = false;
                let (eye_width, eye_height) = self.state.renderer.eye_size();
                Ok(self.state.stereo.synthesize(eye_width, eye_height))
            }
        }
    }

    /// Release every window capture and both eye targets.  Idempotent.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        let windows = self.state.registry.len();
        self.state.registry.clear(&mut self.gpu);
        self.state.renderer.destroy(&mut self.gpu);
        info!(windows, frames = self.state.frame_count, "compositor torn down");
    }

    pub fn status_sexp(&self) -> String {
        self.state.status_sexp()
    }
}

fn log_selection(event: SelectionEvent) {
    match event {
        SelectionEvent::FocusGained(h) => info!(handle = %h, "focus gained"),
        SelectionEvent::FocusLost(h) => info!(handle = %h, "focus lost"),
        SelectionEvent::DragStarted(h) => debug!(handle = %h, "drag started"),
        SelectionEvent::DragEnded(h) => debug!(handle = %h, "drag ended"),
    }
}

// ── Tests ──────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::{
        FixedHmd, GpuCall, HeadlessGpu, HeadlessWindows, ScriptedSkeleton,
    };
    use crate::input::Direction;
    use crate::vr::head_pose::{EyeMatrices, NoHeadset};
    use crate::vr::skeleton::{Joints, TrackedUser, TrackingState, UserId};
    use crate::window::WindowHandle;
    use glam::{Mat4, Quat, Vec3};

    type TestCompositor = Compositor<HeadlessWindows, HeadlessGpu, NoHeadset, ScriptedSkeleton>;

    const A: WindowHandle = WindowHandle(0xa);
    const B: WindowHandle = WindowHandle(0xb);

    fn compositor() -> TestCompositor {
        let config = CompositorConfig {
            launch_command: Some("xterm".into()),
            ..CompositorConfig::default()
        };
        Compositor::new(
            config,
            HeadlessWindows::new(),
            HeadlessGpu::new(),
            NoHeadset,
            ScriptedSkeleton::default(),
        )
        .unwrap()
    }

    fn key(action: KeyAction, pressed: bool) -> WmEvent {
        WmEvent::Key { action, pressed }
    }

    fn draws(gpu: &HeadlessGpu) -> usize {
        gpu.calls()
            .iter()
            .filter(|c| matches!(c, GpuCall::DrawQuad { .. }))
            .count()
    }

    /// Tracked user standing at the origin, right hand pointing at scene
    /// position `hand`, left forearm vertical if `arm_up`.
    fn user(hand: Vec3, arm_up: bool) -> TrackedUser {
        let head = Vec3::new(0.0, 1600.0, 2000.0);
        let elbow = head + Vec3::new(-300.0, -400.0, 0.0);
        let left_hand = if arm_up {
            elbow + Vec3::new(0.0, 250.0, 0.0)
        } else {
            elbow + Vec3::new(-250.0, 0.0, 0.0)
        };
        TrackedUser {
            id: UserId(1),
            state: TrackingState::Tracking,
            joints: Joints {
                head,
                left_hand,
                right_hand: head - hand / 0.01,
                left_elbow: elbow,
            },
        }
    }

    #[test]
    fn test_window_captured_and_drawn_same_frame() {
        let mut c = compositor();
        c.windows_mut().open_window(A, 800, 600);
        assert_eq!(c.step(0.016).unwrap(), None);

        let win = c.state.registry.get(A).unwrap();
        assert!(win.is_mapped());
        assert_eq!(win.texture_size(), Some((800, 600)));
        assert_eq!(draws(c.gpu()), 2);
        assert_eq!(c.gpu().presents(), 1);

        // Capture work precedes the first eye pass of the frame.
        let calls = c.gpu().calls();
        let bind = calls.iter().position(|c| matches!(c, GpuCall::Bind { .. }));
        let begin = calls.iter().rposition(|c| matches!(c, GpuCall::BeginTarget { .. }));
        assert!(bind.unwrap() < begin.unwrap());
    }

    #[test]
    fn test_resize_rebinds_next_frame() {
        let mut c = compositor();
        c.windows_mut().open_window(A, 800, 600);
        c.step(0.016).unwrap();

        c.windows_mut()
            .push(WmEvent::Configured { window: A, width: 640, height: 480 });
        c.step(0.016).unwrap();
        assert_eq!(c.gpu().release_calls(), 1);
        assert_eq!(c.gpu().bind_calls(), 2);
        assert_eq!(c.state.registry.get(A).unwrap().texture_size(), Some((640, 480)));

        // Nothing changed: no further binding work.
        c.step(0.016).unwrap();
        assert_eq!(c.gpu().bind_calls(), 2);
    }

    #[test]
    fn test_zero_size_window_not_drawn() {
        let mut c = compositor();
        c.windows_mut().open_window(A, 800, 600);
        c.step(0.016).unwrap();
        assert_eq!(draws(c.gpu()), 2);

        c.windows_mut()
            .push(WmEvent::Configured { window: A, width: 0, height: 0 });
        c.gpu_mut().clear_calls();
        c.step(0.016).unwrap();
        assert_eq!(draws(c.gpu()), 0);
        assert_eq!(c.state.renderer.quads_last_frame, 0);
        assert_eq!(c.gpu().live_bindings(), 0);
        assert_eq!(c.gpu().live_textures(), 1);
    }

    #[test]
    fn test_destroy_releases_resources() {
        let mut c = compositor();
        c.windows_mut().open_window(A, 800, 600);
        c.step(0.016).unwrap();
        c.windows_mut().push(WmEvent::Destroyed { window: A });
        c.step(0.016).unwrap();

        assert!(c.state.registry.is_empty());
        assert_eq!(c.gpu().live_textures(), 0);
        assert_eq!(c.gpu().live_bindings(), 0);
        assert!(c.gpu().released_before_destroyed());
    }

    #[test]
    fn test_unmap_removes_window() {
        let mut c = compositor();
        c.windows_mut().open_window(A, 800, 600);
        c.windows_mut().open_window(B, 300, 200);
        c.step(0.016).unwrap();
        c.windows_mut().push(WmEvent::Unmapped { window: A });
        c.step(0.016).unwrap();

        assert!(!c.state.registry.contains(A));
        assert!(c.state.registry.contains(B));
        assert_eq!(c.state.renderer.quads_last_frame, 1);
    }

    #[test]
    fn test_window_gone_from_server_is_fatal() {
        let mut c = compositor();
        c.windows_mut().open_window(A, 800, 600);
        c.step(0.016).unwrap();
        c.windows_mut().push(WmEvent::Configured { window: A, width: 10, height: 10 });
        // Server forgets the window before the destroy notification arrives.
        c.windows_mut().apply(&WmEvent::Destroyed { window: A });

        let err = c.step(0.016).unwrap_err();
        assert!(matches!(err, CompositorError::WindowQuery { handle: A, .. }));
    }

    #[test]
    fn test_quit_and_restart_keys() {
        let mut c = compositor();
        c.windows_mut().push(key(KeyAction::Quit, true));
        assert_eq!(c.step(0.016).unwrap(), Some(LoopExit::Quit));
        assert_eq!(c.gpu().presents(), 0);

        let mut c = compositor();
        c.windows_mut().push(key(KeyAction::Restart, false));
        assert_eq!(c.step(0.016).unwrap(), None);
        c.windows_mut().push(key(KeyAction::Restart, true));
        assert_eq!(c.step(0.016).unwrap(), Some(LoopExit::Restart));
    }

    #[test]
    fn test_close_requested_quits() {
        let mut c = compositor();
        c.windows_mut().push(WmEvent::CloseRequested);
        assert_eq!(c.step(0.016).unwrap(), Some(LoopExit::Quit));
    }

    #[test]
    fn test_launch_key_spawns_command() {
        let mut c = compositor();
        c.windows_mut().push(key(KeyAction::Launch, true));
        c.windows_mut().push(key(KeyAction::Launch, false));
        c.step(0.016).unwrap();
        assert_eq!(c.windows().launched(), &["xterm".to_string()]);
    }

    #[test]
    fn test_held_key_moves_camera() {
        let mut c = compositor();
        c.windows_mut().push(key(KeyAction::Move(Direction::Forward), true));
        c.step(1.0).unwrap();
        let z = c.state.camera.position.z;
        assert!((z - c.state.config.move_speed).abs() < 0.001, "got {}", z);

        c.windows_mut().push(key(KeyAction::Move(Direction::Forward), false));
        c.step(1.0).unwrap();
        assert!((c.state.camera.position.z - z).abs() < 0.001);
    }

    #[test]
    fn test_pointer_look_without_hmd() {
        let mut c = compositor();
        c.windows_mut().push(WmEvent::PointerMotion { x: 1280.0, y: 400.0 });
        c.step(0.016).unwrap();
        assert!(!c.state.hmd_active);
        assert!((c.state.camera.yaw + std::f32::consts::FRAC_PI_2).abs() < 0.001);
    }

    #[test]
    fn test_hmd_drives_yaw_and_disables_pointer_look() {
        let yaw = 0.4;
        let pose = HeadPose {
            left: EyeMatrices { projection: Some(Mat4::IDENTITY), view: None },
            right: EyeMatrices::default(),
            orientation: Quat::from_rotation_y(yaw),
        };
        let mut c = Compositor::new(
            CompositorConfig::default(),
            HeadlessWindows::new(),
            HeadlessGpu::new(),
            FixedHmd(pose),
            ScriptedSkeleton::default(),
        )
        .unwrap();
        c.windows_mut().push(WmEvent::PointerMotion { x: 0.0, y: 0.0 });
        c.step(0.016).unwrap();
        assert!(c.state.hmd_active);
        assert!((c.state.camera.yaw - yaw).abs() < 0.001);
        assert_eq!(c.state.camera.pitch, 0.0);
        assert_eq!(c.gpu().presents(), 1);
    }

    #[test]
    fn test_new_user_gets_tracking_started() {
        let mut c = compositor();
        c.skeleton_mut().users = vec![TrackedUser {
            id: UserId(7),
            state: TrackingState::None,
            joints: Joints::default(),
        }];
        c.step(0.016).unwrap();
        assert_eq!(c.skeleton_mut().started, vec![UserId(7)]);
        assert_eq!(c.state.user_lock.locked_user(), None);
    }

    #[test]
    fn test_pointing_focuses_and_drag_moves_window() {
        let mut c = compositor();
        c.windows_mut().open_window(A, 800, 600);
        c.windows_mut().open_window(B, 800, 600);
        c.step(0.016).unwrap();
        c.state.registry.get_mut(B).unwrap().position = Vec3::new(5.0, 0.0, 0.0);

        c.skeleton_mut().users = vec![user(Vec3::new(0.0, 0.0, 5.0), false)];
        c.step(0.016).unwrap();
        assert_eq!(c.state.registry.focused(), Some(A));

        c.skeleton_mut().users = vec![user(Vec3::new(1.0, 0.0, 4.5), true)];
        c.step(0.016).unwrap();
        let win = c.state.registry.get(A).unwrap();
        assert!(win.moving);
        assert!((win.position - Vec3::new(1.0, 0.0, 4.5)).length() < 0.01);

        // User walks away: drag ends, focus stays, lock released.
        c.skeleton_mut().users.clear();
        c.step(0.016).unwrap();
        assert!(!c.state.registry.get(A).unwrap().moving);
        assert_eq!(c.state.registry.focused(), Some(A));
        assert_eq!(c.state.user_lock.locked_user(), None);
        assert_eq!(c.state.gesture.origin(), None);
    }

    #[test]
    fn test_head_offset_moves_camera() {
        let mut c = compositor();
        let mut u = user(Vec3::new(0.0, 0.0, 5.0), false);
        c.skeleton_mut().users = vec![u.clone()];
        c.step(0.016).unwrap();

        // Head drops 50 mm; smoothing averages it with the first sample.
        u.joints.head.y -= 50.0;
        c.skeleton_mut().users = vec![u];
        c.step(0.016).unwrap();
        assert!((c.state.camera.head_offset.y + 0.25).abs() < 0.001);
    }

    #[test]
    fn test_tracker_failure_is_fatal() {
        let mut c = compositor();
        c.skeleton_mut().fail = true;
        assert!(matches!(
            c.step(0.016),
            Err(CompositorError::Tracking(_))
        ));
    }

    #[test]
    fn test_bind_failure_keeps_running() {
        let mut c = compositor();
        c.gpu_mut().fail_binds_for(A);
        c.windows_mut().open_window(A, 800, 600);
        c.step(0.016).unwrap();
        assert_eq!(c.state.renderer.quads_last_frame, 0);
        assert_eq!(c.gpu().presents(), 1);

        c.gpu_mut().allow_binds_for(A);
        c.windows_mut().push(WmEvent::Mapped { window: A });
        c.step(0.016).unwrap();
        assert_eq!(c.state.renderer.quads_last_frame, 1);
    }

    #[test]
    fn test_init_failure() {
        let mut gpu = HeadlessGpu::new();
        gpu.fail_render_targets(true);
        let result = Compositor::new(
            CompositorConfig::default(),
            HeadlessWindows::new(),
            gpu,
            NoHeadset,
            ScriptedSkeleton::default(),
        );
        assert!(matches!(result, Err(InitError::RenderTarget { .. })));
    }

    #[test]
    fn test_teardown_releases_everything() {
        let mut c = compositor();
        c.windows_mut().open_window(A, 800, 600);
        c.windows_mut().open_window(B, 300, 200);
        c.step(0.016).unwrap();
        c.teardown();
        c.teardown();

        assert_eq!(c.gpu().live_textures(), 0);
        assert_eq!(c.gpu().live_bindings(), 0);
        assert_eq!(c.gpu().live_targets(), 0);
        assert!(c.gpu().released_before_destroyed());
    }

    #[test]
    fn test_timing_and_status() {
        let mut c = compositor();
        for _ in 0..3 {
            c.step(0.016).unwrap();
        }
        assert_eq!(c.state.frame_count, 3);
        assert_eq!(c.state.timing.total_frames, 3);
        let status = c.status_sexp();
        assert!(status.contains(":frames 3"));
        assert!(status.contains(":hmd nil"));
    }
}
