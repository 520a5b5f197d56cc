//! Winit backend — the compositor runs inside a desktop window.
//!
//! The window shows the warped side-by-side stereo output, sized for an
//! HMD mirrored or extended onto it.  X11 applications connect to an
//! embedded XWayland server.

use std::process::Stdio;
use std::time::{Duration, Instant};

use smithay::{
    backend::{
        input::{
            AbsolutePositionEvent, InputBackend, InputEvent, KeyState, KeyboardKeyEvent,
        },
        renderer::gles::GlesRenderer,
        winit::{self as winit_backend, WinitEvent},
    },
    reexports::calloop::{
        generic::Generic, EventLoop, Interest, Mode, PostAction,
    },
    reexports::wayland_server::Display,
    xwayland::{xwm::X11Wm, XWayland, XWaylandEvent},
};
use tracing::{debug, error, info, warn};

use super::gles::GlesGpu;
use super::headless::{install_signal_handlers, shutdown_requested};
use super::xwayland::{SharedX11, WaylandHost, XWindows};
use crate::config::CompositorConfig;
use crate::frame::{Compositor, LoopExit};
use crate::input::{KeyAction, WmEvent};
use crate::vr::head_pose::NoHeadset;

/// XKB key codes are evdev codes offset by 8.
const XKB_KEYCODE_OFFSET: u32 = 8;

/// Translate a winit input event into a compositor event.
fn translate_input<B: InputBackend>(
    event: InputEvent<B>,
    width: u32,
    height: u32,
) -> Option<WmEvent> {
    match event {
        InputEvent::Keyboard { event } => {
            let code = event.key_code().raw().saturating_sub(XKB_KEYCODE_OFFSET);
            let action = KeyAction::from_keycode(code)?;
            Some(WmEvent::Key {
                action,
                pressed: event.state() == KeyState::Pressed,
            })
        }
        InputEvent::PointerMotionAbsolute { event } => Some(WmEvent::PointerMotion {
            x: event.x_transformed(width as i32),
            y: event.y_transformed(height as i32),
        }),
        _ => None,
    }
}

pub fn run(config: CompositorConfig) -> anyhow::Result<LoopExit> {
    let mut event_loop = EventLoop::<WaylandHost>::try_new()?;
    let display = Display::<WaylandHost>::new()?;
    let shared = SharedX11::default();
    let mut host = WaylandHost::new(display.handle(), event_loop.handle(), shared.clone());

    // Initialize Winit backend
    let (backend, mut winit_evt) = winit_backend::init::<GlesRenderer>()
        .map_err(|e| anyhow::anyhow!("winit init failed: {:?}", e))?;
    info!(size = ?backend.window_size(), "winit window created");

    // Dispatch Wayland clients (XWayland is the only one)
    event_loop
        .handle()
        .insert_source(
            Generic::new(display, Interest::READ, Mode::Level),
            |_, display, host: &mut WaylandHost| {
                // SAFETY: the display is not dropped while the source is alive.
                unsafe {
                    display
                        .get_mut()
                        .dispatch_clients(host)
                        .map_err(std::io::Error::other)?;
                }
                Ok(PostAction::Continue)
            },
        )
        .map_err(|e| anyhow::anyhow!("failed to insert display source: {}", e.error))?;

    // Spawn XWayland
    let (xwayland, client) = XWayland::spawn(
        &host.display_handle,
        None,
        std::iter::empty::<(String, String)>(),
        true,
        Stdio::null(),
        Stdio::null(),
        |_| (),
    )
    .map_err(|e| anyhow::anyhow!("XWayland not available: {}", e))?;
    event_loop
        .handle()
        .insert_source(xwayland, move |event, _, host: &mut WaylandHost| match event {
            XWaylandEvent::Ready {
                x11_socket,
                display_number,
            } => {
                info!(display_number, "XWayland ready");
                match X11Wm::start_wm(host.loop_handle.clone(), x11_socket, client.clone()) {
                    Ok(wm) => {
                        host.xwm = Some(wm);
                        host.shared.borrow_mut().display = Some(display_number);
                        std::env::set_var("DISPLAY", format!(":{}", display_number));
                    }
                    Err(e) => error!("Failed to start X11 WM: {}", e),
                }
            }
            XWaylandEvent::Error => {
                warn!("XWayland crashed on startup");
                host.shared
                    .borrow_mut()
                    .events
                    .push_back(WmEvent::CloseRequested);
            }
        })
        .map_err(|e| anyhow::anyhow!("failed to insert XWayland source: {}", e.error))?;
    info!("XWayland spawning");

    install_signal_handlers();

    let skeleton = super::skeleton_source(&config)?;
    let (width, height) = (config.width, config.height);
    let gpu = GlesGpu::new(backend, shared.clone())?;
    let mut compositor = Compositor::new(
        config,
        XWindows::new(shared.clone()),
        gpu,
        NoHeadset,
        skeleton,
    )?;

    info!("Winit backend initialized, entering frame loop");
    let start_time = Instant::now();
    let status_interval = Duration::from_secs(60);
    let mut last_status = Instant::now();

    let result = (|| -> anyhow::Result<LoopExit> {
        loop {
            if shutdown_requested() {
                info!("Shutdown signal received, exiting");
                return Ok(LoopExit::Quit);
            }

            winit_evt.dispatch_new_events(|event| match event {
                WinitEvent::Resized { size, .. } => {
                    debug!(?size, "output window resized");
                }
                WinitEvent::CloseRequested => {
                    shared
                        .borrow_mut()
                        .events
                        .push_back(WmEvent::CloseRequested);
                }
                WinitEvent::Input(event) => {
                    if let Some(ev) = translate_input(event, width, height) {
                        shared.borrow_mut().events.push_back(ev);
                    }
                }
                _ => {}
            });

            if let Some(exit) = compositor.frame()? {
                return Ok(exit);
            }

            if last_status.elapsed() >= status_interval {
                info!("Status: {}", compositor.status_sexp());
                last_status = Instant::now();
            }

            event_loop.dispatch(Some(Duration::from_millis(1)), &mut host)?;
            host.display_handle.flush_clients()?;
        }
    })();

    compositor.teardown();
    info!(
        "Winit backend shutting down after {:.1}s",
        start_time.elapsed().as_secs_f64()
    );
    result
}
