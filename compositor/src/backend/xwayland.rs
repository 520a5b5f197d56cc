//! XWayland window management for the full backend.
//!
//! X11 applications run on an embedded XWayland server.  The window
//! manager callbacks translate X11 lifecycle notifications into
//! `WmEvent`s on a queue shared with `XWindows`, which the frame loop
//! drains once per frame.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use smithay::{
    backend::renderer::utils::on_commit_buffer_handler,
    delegate_compositor, delegate_shm, delegate_xwayland_shell,
    reexports::calloop::LoopHandle,
    reexports::wayland_server::{
        protocol::{wl_buffer::WlBuffer, wl_surface::WlSurface},
        Client, DisplayHandle,
    },
    utils::{Logical, Rectangle},
    wayland::{
        buffer::BufferHandler,
        compositor::{CompositorClientState, CompositorHandler, CompositorState},
        shm::{ShmHandler, ShmState},
        xwayland_shell::{XWaylandShellHandler, XWaylandShellState},
    },
    xwayland::{
        xwm::{Reorder, ResizeEdge, XwmHandler, XwmId},
        X11Surface, X11Wm, XWaylandClientData,
    },
};
use tracing::{debug, info, warn};

use super::{WindowAttributes, WindowSource};
use crate::error::CompositorError;
use crate::input::WmEvent;
use crate::window::WindowHandle;

// ── Shared window table ────────────────────────────────────

/// State written by the window manager callbacks and read by the frame loop.
#[derive(Debug, Default)]
pub struct X11Shared {
    pub events: VecDeque<WmEvent>,
    /// Managed (non override-redirect) windows by X11 id.
    pub surfaces: HashMap<WindowHandle, X11Surface>,
    /// X display number once XWayland is ready.
    pub display: Option<u32>,
}

pub type SharedX11 = Rc<RefCell<X11Shared>>;

fn handle_of(window: &X11Surface) -> WindowHandle {
    WindowHandle(window.window_id())
}

/// `WindowSource` over the XWayland window table.
pub struct XWindows {
    shared: SharedX11,
}

impl XWindows {
    pub fn new(shared: SharedX11) -> Self {
        Self { shared }
    }
}

impl WindowSource for XWindows {
    fn drain_events(&mut self, out: &mut Vec<WmEvent>) -> Result<(), CompositorError> {
        out.extend(self.shared.borrow_mut().events.drain(..));
        Ok(())
    }

    fn query_attributes(
        &mut self,
        window: WindowHandle,
    ) -> Result<WindowAttributes, CompositorError> {
        let shared = self.shared.borrow();
        let surface = shared
            .surfaces
            .get(&window)
            .ok_or_else(|| CompositorError::WindowQuery {
                handle: window,
                reason: "BadWindow".into(),
            })?;
        let size = surface.geometry().size;
        Ok(WindowAttributes {
            width: size.w.max(0) as u32,
            height: size.h.max(0) as u32,
            viewable: surface.is_mapped(),
        })
    }

    fn launch(&mut self, command: &str) -> std::io::Result<()> {
        let display = self.shared.borrow().display;
        let mut cmd = std::process::Command::new(command);
        if let Some(display) = display {
            cmd.env("DISPLAY", format!(":{}", display));
        }
        cmd.spawn().map(|_| ())
    }
}

// ── Wayland host state ─────────────────────────────────────

/// Calloop data for the full backend: the Wayland globals XWayland needs
/// plus the X11 window manager.
pub struct WaylandHost {
    pub display_handle: DisplayHandle,
    pub loop_handle: LoopHandle<'static, WaylandHost>,
    pub compositor_state: CompositorState,
    pub shm_state: ShmState,
    pub xwayland_shell_state: XWaylandShellState,
    pub xwm: Option<X11Wm>,
    pub shared: SharedX11,
}

impl WaylandHost {
    pub fn new(
        display_handle: DisplayHandle,
        loop_handle: LoopHandle<'static, WaylandHost>,
        shared: SharedX11,
    ) -> Self {
        let compositor_state = CompositorState::new::<Self>(&display_handle);
        let shm_state = ShmState::new::<Self>(&display_handle, vec![]);
        let xwayland_shell_state = XWaylandShellState::new::<Self>(&display_handle);
        Self {
            display_handle,
            loop_handle,
            compositor_state,
            shm_state,
            xwayland_shell_state,
            xwm: None,
            shared,
        }
    }

    fn push(&self, event: WmEvent) {
        self.shared.borrow_mut().events.push_back(event);
    }
}

impl CompositorHandler for WaylandHost {
    fn compositor_state(&mut self) -> &mut CompositorState {
        &mut self.compositor_state
    }

    fn client_compositor_state<'a>(&self, client: &'a Client) -> &'a CompositorClientState {
        match client.get_data::<XWaylandClientData>() {
            Some(data) => &data.compositor_state,
            // Only the XWayland client ever connects.
            None => unreachable!("client without XWayland client data"),
        }
    }

    fn commit(&mut self, surface: &WlSurface) {
        on_commit_buffer_handler::<Self>(surface);
        X11Wm::commit_hook::<Self>(self, surface);
    }
}

impl BufferHandler for WaylandHost {
    fn buffer_destroyed(&mut self, _buffer: &WlBuffer) {}
}

impl ShmHandler for WaylandHost {
    fn shm_state(&self) -> &ShmState {
        &self.shm_state
    }
}

impl XWaylandShellHandler for WaylandHost {
    fn xwayland_shell_state(&mut self) -> &mut XWaylandShellState {
        &mut self.xwayland_shell_state
    }
}

delegate_compositor!(WaylandHost);
delegate_shm!(WaylandHost);
delegate_xwayland_shell!(WaylandHost);

// ── Window manager ─────────────────────────────────────────

impl XwmHandler for WaylandHost {
    fn xwm_state(&mut self, _xwm: XwmId) -> &mut X11Wm {
        self.xwm.as_mut().expect("xwm not initialized")
    }

    fn new_window(&mut self, _xwm: XwmId, window: X11Surface) {
        let handle = handle_of(&window);
        debug!(%handle, "XWayland: new window");
        self.shared.borrow_mut().surfaces.insert(handle, window);
        self.push(WmEvent::Created { window: handle });
    }

    fn new_override_redirect_window(&mut self, _xwm: XwmId, _window: X11Surface) {
        // Menus and tooltips are not placed in the scene.
        debug!("XWayland: override-redirect window ignored");
    }

    fn map_window_request(&mut self, _xwm: XwmId, window: X11Surface) {
        let handle = handle_of(&window);
        if let Err(e) = window.set_mapped(true) {
            warn!(%handle, "XWayland: failed to set mapped: {}", e);
            return;
        }
        let geometry = window.geometry();
        if let Err(e) = window.configure(Some(geometry)) {
            warn!(%handle, "XWayland: configure failed: {}", e);
        }
        info!(
            %handle,
            class = %window.class(),
            width = geometry.size.w,
            height = geometry.size.h,
            "XWayland: mapping window"
        );
        self.shared
            .borrow_mut()
            .surfaces
            .insert(handle, window.clone());
        self.push(WmEvent::Configured {
            window: handle,
            width: geometry.size.w.max(0) as u32,
            height: geometry.size.h.max(0) as u32,
        });
        self.push(WmEvent::Mapped { window: handle });
    }

    fn mapped_override_redirect_window(&mut self, _xwm: XwmId, _window: X11Surface) {}

    fn unmapped_window(&mut self, _xwm: XwmId, window: X11Surface) {
        let handle = handle_of(&window);
        debug!(%handle, "XWayland: window unmapped");
        if !window.is_override_redirect() {
            if let Err(e) = window.set_mapped(false) {
                warn!(%handle, "XWayland: failed to set unmapped: {}", e);
            }
        }
        self.push(WmEvent::Unmapped { window: handle });
    }

    fn destroyed_window(&mut self, _xwm: XwmId, window: X11Surface) {
        let handle = handle_of(&window);
        debug!(%handle, "XWayland: window destroyed");
        if self.shared.borrow_mut().surfaces.remove(&handle).is_some() {
            self.push(WmEvent::Destroyed { window: handle });
        }
    }

    fn configure_request(
        &mut self,
        _xwm: XwmId,
        window: X11Surface,
        x: Option<i32>,
        y: Option<i32>,
        w: Option<u32>,
        h: Option<u32>,
        _reorder: Option<Reorder>,
    ) {
        // Grant whatever the client asks for; placement is in the 3D scene.
        let mut geo = window.geometry();
        if let Some(x) = x {
            geo.loc.x = x;
        }
        if let Some(y) = y {
            geo.loc.y = y;
        }
        if let Some(w) = w {
            geo.size.w = w as i32;
        }
        if let Some(h) = h {
            geo.size.h = h as i32;
        }
        if let Err(e) = window.configure(Some(geo)) {
            warn!("XWayland: configure request failed: {}", e);
        }
    }

    fn configure_notify(
        &mut self,
        _xwm: XwmId,
        window: X11Surface,
        geometry: Rectangle<i32, Logical>,
        _above: Option<u32>,
    ) {
        let handle = handle_of(&window);
        if self.shared.borrow().surfaces.contains_key(&handle) {
            self.push(WmEvent::Configured {
                window: handle,
                width: geometry.size.w.max(0) as u32,
                height: geometry.size.h.max(0) as u32,
            });
        }
    }

    fn resize_request(
        &mut self,
        _xwm: XwmId,
        _window: X11Surface,
        _button: u32,
        _resize_edge: ResizeEdge,
    ) {
    }

    fn move_request(&mut self, _xwm: XwmId, _window: X11Surface, _button: u32) {}
}
