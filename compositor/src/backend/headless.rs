//! Headless backend — CI testing and display-less runs.
//!
//! Supplies an in-memory window source that emulates the attribute
//! queries of a windowing system, and a GPU that records every call
//! instead of touching hardware.  The run loop drives the full frame
//! pipeline with graceful signal handling, an optional exit timer and
//! periodic status logging.
//!
//! Window and input events reach the loop over a calloop channel.  With
//! `--stdin-events` a reader thread feeds it one s-expression per line:
//!
//! ```text
//! (:type open :window 4194305 :width 800 :height 600)
//! (:type configured :window 4194305 :width 640 :height 480)
//! (:type key :action forward :pressed t)
//! (:type pointer :x 640 :y 400)
//! (:type destroyed :window 4194305)
//! (:type close)
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use calloop::channel::{self, Sender};
use calloop::timer::{TimeoutAction, Timer};
use calloop::{EventLoop, LoopHandle};
use glam::Mat4;
use tracing::{debug, info, warn};

use super::sexp::{number, plist_get, symbol_name, truthy};
use super::{WindowAttributes, WindowSource};
use crate::config::{CompositorConfig, HeadlessConfig};
use crate::error::{CompositorError, GpuError};
use crate::frame::{Compositor, LoopExit};
use crate::input::{KeyAction, WmEvent};
use crate::render::gpu::{BindingId, Gpu, RenderTargetId, TextureId};
use crate::vr::head_pose::NoHeadset;
use crate::window::WindowHandle;

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

// ── Window source ──────────────────────────────────────────

/// In-memory windowing system.
///
/// `apply` changes server-side window state; `push` does that and also
/// queues the notification for the next `drain_events`.  In run mode the
/// event feed channel calls `push`.
#[derive(Debug, Default)]
pub struct HeadlessWindows {
    attributes: HashMap<WindowHandle, WindowAttributes>,
    pending: VecDeque<WmEvent>,
    queries: u64,
    launched: Vec<String>,
}

impl HeadlessWindows {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update emulated server state for a lifecycle event.
    pub fn apply(&mut self, event: &WmEvent) {
        match *event {
            WmEvent::Created { window } => {
                self.attributes.entry(window).or_insert(WindowAttributes {
                    width: 0,
                    height: 0,
                    viewable: false,
                });
            }
            WmEvent::Configured { window, width, height } => {
                let attrs = self.attributes.entry(window).or_insert(WindowAttributes {
                    width,
                    height,
                    viewable: false,
                });
                attrs.width = width;
                attrs.height = height;
            }
            WmEvent::Mapped { window } => {
                if let Some(attrs) = self.attributes.get_mut(&window) {
                    attrs.viewable = true;
                }
            }
            WmEvent::Unmapped { window } => {
                if let Some(attrs) = self.attributes.get_mut(&window) {
                    attrs.viewable = false;
                }
            }
            WmEvent::Destroyed { window } => {
                self.attributes.remove(&window);
            }
            WmEvent::Key { .. } | WmEvent::PointerMotion { .. } | WmEvent::CloseRequested => {}
        }
    }

    /// Apply `event` and queue it for delivery.
    pub fn push(&mut self, event: WmEvent) {
        self.apply(&event);
        self.pending.push_back(event);
    }

    /// Create, size and map a window in one go.
    pub fn open_window(&mut self, window: WindowHandle, width: u32, height: u32) {
        self.push(WmEvent::Created { window });
        self.push(WmEvent::Configured { window, width, height });
        self.push(WmEvent::Mapped { window });
    }

    /// Number of attribute queries answered.
    pub fn query_count(&self) -> u64 {
        self.queries
    }

    /// Commands passed to `launch`.
    pub fn launched(&self) -> &[String] {
        &self.launched
    }
}

impl WindowSource for HeadlessWindows {
    fn drain_events(&mut self, out: &mut Vec<WmEvent>) -> Result<(), CompositorError> {
        out.extend(self.pending.drain(..));
        Ok(())
    }

    fn query_attributes(
        &mut self,
        window: WindowHandle,
    ) -> Result<WindowAttributes, CompositorError> {
        self.queries += 1;
        self.attributes
            .get(&window)
            .copied()
            .ok_or_else(|| CompositorError::WindowQuery {
                handle: window,
                reason: "BadWindow".into(),
            })
    }

    fn launch(&mut self, command: &str) -> std::io::Result<()> {
        info!(command, "headless: launch recorded");
        self.launched.push(command.to_string());
        Ok(())
    }
}

// ── Recording GPU ──────────────────────────────────────────

/// One recorded GPU call.
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateTexture { texture: TextureId, width: u32, height: u32 },
    DestroyTexture { texture: TextureId },
    Bind { binding: BindingId, window: WindowHandle, texture: TextureId },
    Release { binding: BindingId },
    CreateTarget { target: RenderTargetId, width: u32, height: u32 },
    DestroyTarget { target: RenderTargetId },
    PrepareWarp,
    BeginTarget { target: RenderTargetId },
    SetCamera { projection: Mat4, view: Mat4 },
    DrawQuad { texture: TextureId, model: Mat4 },
    EndTarget { target: RenderTargetId },
    Warp { left: RenderTargetId, right: RenderTargetId, width: u32, height: u32 },
    Present,
}

/// GPU stand-in that tracks resource lifetimes and records calls.
#[derive(Debug)]
pub struct HeadlessGpu {
    next_id: u64,
    textures: HashMap<TextureId, (u32, u32)>,
    bindings: HashMap<BindingId, (WindowHandle, TextureId)>,
    targets: HashMap<RenderTargetId, (u32, u32)>,
    warp_ready: bool,
    log_calls: bool,
    calls: Vec<GpuCall>,
    bind_calls: u64,
    release_calls: u64,
    presents: u64,
    fail_binds: HashSet<WindowHandle>,
    fail_targets: bool,
    fail_warp: bool,
}

impl Default for HeadlessGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessGpu {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            textures: HashMap::new(),
            bindings: HashMap::new(),
            targets: HashMap::new(),
            warp_ready: false,
            log_calls: true,
            calls: Vec::new(),
            bind_calls: 0,
            release_calls: 0,
            presents: 0,
            fail_binds: HashSet::new(),
            fail_targets: false,
            fail_warp: false,
        }
    }

    /// Keep counters only; for long runs.
    pub fn without_call_log(mut self) -> Self {
        self.log_calls = false;
        self
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, call: GpuCall) {
        if self.log_calls {
            self.calls.push(call);
        }
    }

    pub fn calls(&self) -> &[GpuCall] {
        &self.calls
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    pub fn bind_calls(&self) -> u64 {
        self.bind_calls
    }

    pub fn release_calls(&self) -> u64 {
        self.release_calls
    }

    pub fn presents(&self) -> u64 {
        self.presents
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_bindings(&self) -> usize {
        self.bindings.len()
    }

    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&texture).copied()
    }

    pub fn target_size(&self, target: RenderTargetId) -> Option<(u32, u32)> {
        self.targets.get(&target).copied()
    }

    /// Window whose surface is currently bound to `texture`.
    pub fn bound_window(&self, texture: TextureId) -> Option<WindowHandle> {
        self.bindings
            .values()
            .find(|(_, t)| *t == texture)
            .map(|(w, _)| *w)
    }

    pub fn is_binding_live(&self, binding: BindingId) -> bool {
        self.bindings.contains_key(&binding)
    }

    pub fn warp_prepared(&self) -> bool {
        self.warp_ready
    }

    /// Make `bind_surface` fail for `window` until allowed again.
    pub fn fail_binds_for(&mut self, window: WindowHandle) {
        self.fail_binds.insert(window);
    }

    pub fn allow_binds_for(&mut self, window: WindowHandle) {
        self.fail_binds.remove(&window);
    }

    pub fn fail_render_targets(&mut self, fail: bool) {
        self.fail_targets = fail;
    }

    pub fn fail_warp(&mut self, fail: bool) {
        self.fail_warp = fail;
    }

    /// Whether every destroyed texture had its bindings released first,
    /// judged from the call log.
    pub fn released_before_destroyed(&self) -> bool {
        let mut live: HashMap<BindingId, TextureId> = HashMap::new();
        for call in &self.calls {
            match call {
                GpuCall::Bind { binding, texture, .. } => {
                    live.insert(*binding, *texture);
                }
                GpuCall::Release { binding } => {
                    live.remove(binding);
                }
                GpuCall::DestroyTexture { texture } => {
                    if live.values().any(|t| t == texture) {
                        return false;
                    }
                }
                _ => {}
            }
        }
        true
    }
}

impl Gpu for HeadlessGpu {
    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureId, GpuError> {
        if width == 0 || height == 0 {
            return Err(GpuError::TextureAlloc {
                width,
                height,
                reason: "zero-sized texture".into(),
            });
        }
        let texture = TextureId(self.next());
        self.textures.insert(texture, (width, height));
        self.record(GpuCall::CreateTexture { texture, width, height });
        Ok(texture)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
        self.record(GpuCall::DestroyTexture { texture });
    }

    fn bind_surface(
        &mut self,
        window: WindowHandle,
        texture: TextureId,
    ) -> Result<BindingId, GpuError> {
        if self.fail_binds.contains(&window) {
            return Err(GpuError::Bind {
                handle: window,
                reason: "surface not redirected".into(),
            });
        }
        if !self.textures.contains_key(&texture) {
            return Err(GpuError::Bind {
                handle: window,
                reason: format!("unknown texture {}", texture.0),
            });
        }
        let binding = BindingId(self.next());
        self.bindings.insert(binding, (window, texture));
        self.bind_calls += 1;
        self.record(GpuCall::Bind { binding, window, texture });
        Ok(binding)
    }

    fn release_surface(&mut self, binding: BindingId) {
        self.bindings.remove(&binding);
        self.release_calls += 1;
        self.record(GpuCall::Release { binding });
    }

    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<RenderTargetId, GpuError> {
        if self.fail_targets || width == 0 || height == 0 {
            return Err(GpuError::IncompleteTarget("missing attachment".into()));
        }
        let target = RenderTargetId(self.next());
        self.targets.insert(target, (width, height));
        self.record(GpuCall::CreateTarget { target, width, height });
        Ok(target)
    }

    fn destroy_render_target(&mut self, target: RenderTargetId) {
        self.targets.remove(&target);
        self.record(GpuCall::DestroyTarget { target });
    }

    fn prepare_warp(&mut self) -> Result<(), GpuError> {
        if self.fail_warp {
            return Err(GpuError::Shader("0:1: syntax error".into()));
        }
        self.warp_ready = true;
        self.record(GpuCall::PrepareWarp);
        Ok(())
    }

    fn begin_target(&mut self, target: RenderTargetId, _clear: [f32; 4]) -> Result<(), GpuError> {
        if !self.targets.contains_key(&target) {
            return Err(GpuError::Render(format!("unknown target {}", target.0)));
        }
        self.record(GpuCall::BeginTarget { target });
        Ok(())
    }

    fn set_camera(&mut self, projection: Mat4, view: Mat4) {
        self.record(GpuCall::SetCamera { projection, view });
    }

    fn draw_textured_quad(&mut self, texture: TextureId, model: Mat4) {
        self.record(GpuCall::DrawQuad { texture, model });
    }

    fn end_target(&mut self, target: RenderTargetId) -> Result<(), GpuError> {
        self.record(GpuCall::EndTarget { target });
        Ok(())
    }

    fn warp(
        &mut self,
        left: RenderTargetId,
        right: RenderTargetId,
        width: u32,
        height: u32,
    ) -> Result<(), GpuError> {
        if !self.warp_ready {
            return Err(GpuError::Shader("warp program not built".into()));
        }
        self.record(GpuCall::Warp { left, right, width, height });
        Ok(())
    }

    fn present(&mut self) -> Result<(), GpuError> {
        self.presents += 1;
        self.record(GpuCall::Present);
        Ok(())
    }
}

// ── Run loop ───────────────────────────────────────────────

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
pub fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Whether a shutdown signal has been received.
pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::SeqCst)
}

type HeadlessCompositor =
    Compositor<HeadlessWindows, HeadlessGpu, NoHeadset, Box<dyn crate::vr::SkeletonTracker>>;

/// Loop data shared with calloop callbacks.
struct HeadlessLoop {
    compositor: HeadlessCompositor,
    exit: Option<LoopExit>,
}

impl HeadlessLoop {
    fn new(config: CompositorConfig) -> anyhow::Result<Self> {
        let skeleton = super::skeleton_source(&config)?;
        let compositor = Compositor::new(
            config,
            HeadlessWindows::new(),
            HeadlessGpu::new().without_call_log(),
            NoHeadset,
            skeleton,
        )?;
        Ok(Self {
            compositor,
            exit: None,
        })
    }
}

/// Route events sent on the returned channel into the window source,
/// where the next frame's intake stage drains them.
fn insert_event_feed(handle: &LoopHandle<'_, HeadlessLoop>) -> anyhow::Result<Sender<WmEvent>> {
    let (sender, feed) = channel::channel::<WmEvent>();
    handle
        .insert_source(feed, |event, _, data: &mut HeadlessLoop| match event {
            channel::Event::Msg(event) => data.compositor.windows_mut().push(event),
            channel::Event::Closed => debug!("headless event feed closed"),
        })
        .map_err(|e| anyhow::anyhow!("failed to insert event feed: {}", e.error))?;
    Ok(sender)
}

/// Parse one event-feed line into the events it stands for.  `open`
/// expands to create, configure and map.
pub fn parse_event(line: &str) -> Result<Vec<WmEvent>, String> {
    let value = lexpr::from_str(line).map_err(|e| format!("malformed s-expression: {e}"))?;
    let kind = plist_get(&value, "type")
        .and_then(symbol_name)
        .ok_or_else(|| "missing :type".to_string())?;

    let uint = |key: &str| {
        plist_get(&value, key)
            .and_then(number)
            .filter(|n| n.fract() == 0.0 && *n >= 0.0 && *n <= u32::MAX as f64)
            .map(|n| n as u32)
            .ok_or_else(|| format!("{kind}: missing or invalid :{key}"))
    };
    let window = || uint("window").map(WindowHandle);

    let event = match kind {
        "created" => WmEvent::Created { window: window()? },
        "configured" => WmEvent::Configured {
            window: window()?,
            width: uint("width")?,
            height: uint("height")?,
        },
        "mapped" => WmEvent::Mapped { window: window()? },
        "unmapped" => WmEvent::Unmapped { window: window()? },
        "destroyed" => WmEvent::Destroyed { window: window()? },
        "open" => {
            let window = window()?;
            let (width, height) = (uint("width")?, uint("height")?);
            return Ok(vec![
                WmEvent::Created { window },
                WmEvent::Configured { window, width, height },
                WmEvent::Mapped { window },
            ]);
        }
        "key" => {
            let name = plist_get(&value, "action")
                .and_then(symbol_name)
                .ok_or_else(|| "key: missing :action".to_string())?;
            let action =
                KeyAction::parse(name).ok_or_else(|| format!("key: unknown action {name}"))?;
            let pressed = plist_get(&value, "pressed").map(truthy).unwrap_or(true);
            WmEvent::Key { action, pressed }
        }
        "pointer" => {
            let coord = |key: &str| {
                plist_get(&value, key)
                    .and_then(number)
                    .ok_or_else(|| format!("pointer: missing :{key}"))
            };
            WmEvent::PointerMotion {
                x: coord("x")?,
                y: coord("y")?,
            }
        }
        "close" => WmEvent::CloseRequested,
        other => return Err(format!("unknown event type {other}")),
    };
    Ok(vec![event])
}

/// Forward stdin lines to the event feed until EOF or the loop is gone.
fn spawn_stdin_reader(sender: Sender<WmEvent>) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("riftwm-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("stdin feed: {}", e);
                        break;
                    }
                };
                let line = line.trim();
                if line.is_empty() || line.starts_with(';') {
                    continue;
                }
                match parse_event(line) {
                    Ok(events) => {
                        for event in events {
                            if sender.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => warn!("stdin feed: {}", e),
                }
            }
            debug!("stdin feed reached EOF");
        })?;
    Ok(())
}

/// Run the compositor without a display.
pub fn run(config: CompositorConfig, headless: HeadlessConfig) -> anyhow::Result<LoopExit> {
    let mut event_loop = EventLoop::<HeadlessLoop>::try_new()?;
    let mut data = HeadlessLoop::new(config)?;

    let feed = insert_event_feed(&event_loop.handle())?;
    if headless.stdin_events {
        spawn_stdin_reader(feed)?;
        info!("reading window events from stdin");
    }

    // Exit timer for CI
    if let Some(secs) = headless.exit_after {
        event_loop
            .handle()
            .insert_source(
                Timer::from_duration(Duration::from_secs(secs)),
                move |_, _, data: &mut HeadlessLoop| {
                    info!("Headless exit timer fired after {}s", secs);
                    data.exit = Some(LoopExit::Quit);
                    TimeoutAction::Drop
                },
            )
            .map_err(|e| anyhow::anyhow!("failed to insert exit timer: {}", e.error))?;
    }

    // Periodic status logging
    let status_interval = Duration::from_secs(headless.status_interval_secs.max(1));
    event_loop
        .handle()
        .insert_source(
            Timer::from_duration(status_interval),
            move |_, _, data: &mut HeadlessLoop| {
                info!("Headless status: {}", data.compositor.status_sexp());
                TimeoutAction::ToDuration(status_interval)
            },
        )
        .map_err(|e| anyhow::anyhow!("failed to insert status timer: {}", e.error))?;

    // Signal handling via libc (avoids calloop version conflicts)
    install_signal_handlers();

    let poll_interval = Duration::from_millis(headless.poll_interval_ms);
    info!(
        "Headless backend initialized (frame interval: {}ms), entering frame loop",
        headless.poll_interval_ms
    );

    let start_time = Instant::now();
    let result = drive(&mut event_loop, &mut data, poll_interval);

    data.compositor.teardown();
    info!(
        "Headless backend shutting down after {:.1}s ({} frame(s))",
        start_time.elapsed().as_secs_f64(),
        data.compositor.gpu().presents()
    );
    result
}

fn drive(
    event_loop: &mut EventLoop<HeadlessLoop>,
    data: &mut HeadlessLoop,
    poll_interval: Duration,
) -> anyhow::Result<LoopExit> {
    loop {
        // Check global shutdown flag (set by signal handler)
        if shutdown_requested() {
            info!("Shutdown signal received, exiting");
            return Ok(LoopExit::Quit);
        }
        if let Some(exit) = data.exit {
            return Ok(exit);
        }

        if let Some(exit) = data.compositor.frame()? {
            return Ok(exit);
        }

        event_loop.dispatch(Some(poll_interval), data)?;
    }
}

// ── Test doubles ───────────────────────────────────────────

#[cfg(test)]
pub use self::test_doubles::{FixedHmd, ScriptedSkeleton};

#[cfg(test)]
mod test_doubles {
    use crate::error::CompositorError;
    use crate::vr::head_pose::{HeadPose, HeadTracker};
    use crate::vr::skeleton::{SkeletonTracker, TrackedUser, UserId};

    /// HMD that reports the same pose every frame.
    pub struct FixedHmd(pub HeadPose);

    impl HeadTracker for FixedHmd {
        fn poll(&mut self) -> Result<Option<HeadPose>, CompositorError> {
            Ok(Some(self.0))
        }
    }

    /// Skeleton tracker whose users are set by the test.
    #[derive(Default)]
    pub struct ScriptedSkeleton {
        pub users: Vec<TrackedUser>,
        pub started: Vec<UserId>,
        pub fail: bool,
    }

    impl SkeletonTracker for ScriptedSkeleton {
        fn poll(&mut self) -> Result<Vec<TrackedUser>, CompositorError> {
            if self.fail {
                return Err(CompositorError::Tracking("device disconnected".into()));
            }
            Ok(self.users.clone())
        }

        fn start_tracking(&mut self, user: UserId) -> Result<(), CompositorError> {
            self.started.push(user);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: WindowHandle = WindowHandle(0xa);

    #[test]
    fn test_windows_emulate_attributes() {
        let mut w = HeadlessWindows::new();
        w.open_window(A, 800, 600);
        let attrs = w.query_attributes(A).unwrap();
        assert_eq!(attrs, WindowAttributes { width: 800, height: 600, viewable: true });

        w.apply(&WmEvent::Unmapped { window: A });
        assert!(!w.query_attributes(A).unwrap().viewable);
        assert_eq!(w.query_count(), 2);
    }

    #[test]
    fn test_windows_drain_in_order() {
        let mut w = HeadlessWindows::new();
        w.open_window(A, 10, 10);
        let mut out = Vec::new();
        w.drain_events(&mut out).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], WmEvent::Created { window: A });
        assert_eq!(out[2], WmEvent::Mapped { window: A });

        out.clear();
        w.drain_events(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_destroyed_window_query_fails() {
        let mut w = HeadlessWindows::new();
        w.open_window(A, 10, 10);
        w.apply(&WmEvent::Destroyed { window: A });
        assert!(matches!(
            w.query_attributes(A),
            Err(CompositorError::WindowQuery { .. })
        ));
    }

    #[test]
    fn test_launch_is_recorded() {
        let mut w = HeadlessWindows::new();
        w.launch("xterm").unwrap();
        assert_eq!(w.launched(), &["xterm".to_string()]);
    }

    #[test]
    fn test_gpu_tracks_lifetimes() {
        let mut gpu = HeadlessGpu::new();
        let tex = gpu.create_texture(64, 32).unwrap();
        let b = gpu.bind_surface(A, tex).unwrap();
        assert_eq!(gpu.bound_window(tex), Some(A));
        gpu.release_surface(b);
        gpu.destroy_texture(tex);
        assert_eq!(gpu.live_textures(), 0);
        assert!(gpu.released_before_destroyed());
    }

    #[test]
    fn test_gpu_detects_destroy_while_bound() {
        let mut gpu = HeadlessGpu::new();
        let tex = gpu.create_texture(64, 32).unwrap();
        gpu.bind_surface(A, tex).unwrap();
        gpu.destroy_texture(tex);
        assert!(!gpu.released_before_destroyed());
    }

    #[test]
    fn test_gpu_rejects_zero_texture() {
        let mut gpu = HeadlessGpu::new();
        assert!(gpu.create_texture(0, 10).is_err());
    }

    #[test]
    fn test_parse_event_lines() {
        let h = WindowHandle(4194305);
        assert_eq!(
            parse_event("(:type configured :window 4194305 :width 640 :height 480)").unwrap(),
            vec![WmEvent::Configured { window: h, width: 640, height: 480 }]
        );
        assert_eq!(
            parse_event("(:type open :window 4194305 :width 8 :height 6)").unwrap(),
            vec![
                WmEvent::Created { window: h },
                WmEvent::Configured { window: h, width: 8, height: 6 },
                WmEvent::Mapped { window: h },
            ]
        );
        assert_eq!(
            parse_event("(:type key :action left :pressed nil)").unwrap(),
            vec![WmEvent::Key {
                action: KeyAction::Move(crate::input::Direction::Left),
                pressed: false,
            }]
        );
        assert_eq!(
            parse_event("(:type key :action quit)").unwrap(),
            vec![WmEvent::Key { action: KeyAction::Quit, pressed: true }]
        );
        assert_eq!(
            parse_event("(:type pointer :x 640 :y 400.5)").unwrap(),
            vec![WmEvent::PointerMotion { x: 640.0, y: 400.5 }]
        );
        assert_eq!(parse_event("(:type close)").unwrap(), vec![WmEvent::CloseRequested]);
    }

    #[test]
    fn test_parse_event_rejects_bad_lines() {
        assert!(parse_event("(:type mapped").is_err());
        assert!(parse_event("(:window 1)").is_err());
        assert!(parse_event("(:type mapped :window -1)").is_err());
        assert!(parse_event("(:type configured :window 1 :width 10)").is_err());
        assert!(parse_event("(:type key :action jump)").is_err());
        let err = parse_event("(:type resize :window 1)").unwrap_err();
        assert!(err.contains("resize"), "got {}", err);
    }

    #[test]
    fn test_event_feed_reaches_frame_intake() {
        let mut event_loop = EventLoop::<HeadlessLoop>::try_new().unwrap();
        let mut data = HeadlessLoop::new(CompositorConfig::default()).unwrap();
        let feed = insert_event_feed(&event_loop.handle()).unwrap();

        for event in parse_event("(:type open :window 10 :width 800 :height 600)").unwrap() {
            feed.send(event).unwrap();
        }
        event_loop
            .dispatch(Some(Duration::ZERO), &mut data)
            .unwrap();
        assert_eq!(data.compositor.frame().unwrap(), None);

        let win = data.compositor.state.registry.get(WindowHandle(10)).unwrap();
        assert!(win.is_mapped());
        assert_eq!(win.texture_size(), Some((800, 600)));
        assert_eq!(data.compositor.gpu().bind_calls(), 1);
    }

    #[test]
    fn test_event_feed_quit_key_ends_loop() {
        let mut event_loop = EventLoop::<HeadlessLoop>::try_new().unwrap();
        let mut data = HeadlessLoop::new(CompositorConfig::default()).unwrap();
        let feed = insert_event_feed(&event_loop.handle()).unwrap();

        feed.send(WmEvent::Key { action: KeyAction::Quit, pressed: true })
            .unwrap();
        event_loop
            .dispatch(Some(Duration::ZERO), &mut data)
            .unwrap();
        assert_eq!(data.compositor.frame().unwrap(), Some(LoopExit::Quit));
        assert_eq!(data.compositor.gpu().presents(), 0);
    }

    #[test]
    fn test_call_log_can_be_disabled() {
        let mut gpu = HeadlessGpu::new().without_call_log();
        gpu.create_texture(1, 1).unwrap();
        gpu.present().unwrap();
        assert!(gpu.calls().is_empty());
        assert_eq!(gpu.presents(), 1);
    }
}
