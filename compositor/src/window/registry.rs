//! Window registry — the authoritative set of managed windows.
//!
//! Every top-level window the windowing system reports is tracked here by
//! its native handle.  A window owns its capture resources; removing it
//! always releases the surface binding, then the texture, then the entry.

use glam::Vec3;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::render::gpu::{BindingId, Gpu, TextureId};

/// Where new windows appear: five units in front of the starting camera.
pub const DEFAULT_POSITION: Vec3 = Vec3::new(0.0, 0.0, 5.0);

/// Native window handle (an X11 window id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowHandle(pub u32);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// GPU resources capturing one window's surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Capture {
    pub texture: TextureId,
    /// `None` after a failed bind or while the window has nothing to show;
    /// the texture is kept for reuse.
    pub binding: Option<BindingId>,
    pub width: u32,
    pub height: u32,
}

/// A window placed in the 3D scene.
#[derive(Debug)]
pub struct ManagedWindow {
    handle: WindowHandle,
    pub(super) capture: Option<Capture>,
    pub(super) width: u32,
    pub(super) height: u32,
    pub(super) dirty: bool,
    mapped: bool,
    focused: bool,
    /// Set while the window follows the user's hand.
    pub moving: bool,
    /// World-space center of the window quad.
    pub position: Vec3,
}

impl ManagedWindow {
    fn new(handle: WindowHandle) -> Self {
        Self {
            handle,
            capture: None,
            width: 0,
            height: 0,
            dirty: true,
            mapped: false,
            focused: false,
            moving: false,
            position: DEFAULT_POSITION,
        }
    }

    pub fn handle(&self) -> WindowHandle {
        self.handle
    }

    /// Last known size in pixels.  Stale between a resize and the next capture.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Width over height, 1.0 for a degenerate size.
    pub fn aspect(&self) -> f32 {
        if self.width == 0 || self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// Texture to sample this frame, if the window is mapped and bound.
    pub fn texture(&self) -> Option<TextureId> {
        if !self.mapped {
            return None;
        }
        self.capture
            .filter(|c| c.binding.is_some())
            .map(|c| c.texture)
    }

    /// Current surface binding, if any.
    pub fn binding(&self) -> Option<BindingId> {
        self.capture.and_then(|c| c.binding)
    }

    /// Size of the texture currently allocated for this window.
    pub fn texture_size(&self) -> Option<(u32, u32)> {
        self.capture.map(|c| (c.width, c.height))
    }

    #[cfg(test)]
    pub(crate) fn attach_for_test(
        &mut self,
        texture: TextureId,
        binding: BindingId,
        width: u32,
        height: u32,
    ) {
        self.capture = Some(Capture {
            texture,
            binding: Some(binding),
            width,
            height,
        });
        self.dirty = false;
    }

    /// Release the surface binding, then the texture.
    pub(super) fn release(&mut self, gpu: &mut dyn Gpu) {
        if let Some(capture) = self.capture.take() {
            if let Some(binding) = capture.binding {
                gpu.release_surface(binding);
            }
            gpu.destroy_texture(capture.texture);
        }
    }
}

/// Handle → window map.
#[derive(Debug, Default)]
pub struct WindowRegistry {
    windows: HashMap<WindowHandle, ManagedWindow>,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the window for `handle`, creating it with defaults if absent.
    pub fn upsert(&mut self, handle: WindowHandle) -> &mut ManagedWindow {
        self.windows.entry(handle).or_insert_with(|| {
            debug!(%handle, "window registered");
            ManagedWindow::new(handle)
        })
    }

    /// Record that `handle` is mapped at the given size.
    pub fn mark_mapped(&mut self, handle: WindowHandle, width: u32, height: u32) {
        let win = self.upsert(handle);
        win.mapped = true;
        win.width = width;
        win.height = height;
        win.dirty = true;
    }

    /// Record a configure notification; a size change invalidates the capture.
    pub fn mark_configured(&mut self, handle: WindowHandle, width: u32, height: u32) {
        let win = self.upsert(handle);
        if (win.width, win.height) != (width, height) {
            win.width = width;
            win.height = height;
            win.dirty = true;
        }
    }

    /// Request a capture rebuild before the window is next drawn.
    pub fn mark_dirty(&mut self, handle: WindowHandle) {
        if let Some(win) = self.windows.get_mut(&handle) {
            win.dirty = true;
        }
    }

    /// Release the window's GPU resources and forget it.
    /// Returns false for an unknown handle.
    pub fn remove(&mut self, handle: WindowHandle, gpu: &mut dyn Gpu) -> bool {
        match self.windows.remove(&handle) {
            Some(mut win) => {
                win.release(gpu);
                debug!(%handle, "window removed");
                true
            }
            None => false,
        }
    }

    /// Release every window; used at teardown.
    pub fn clear(&mut self, gpu: &mut dyn Gpu) {
        for (_, mut win) in self.windows.drain() {
            win.release(gpu);
        }
    }

    pub fn get(&self, handle: WindowHandle) -> Option<&ManagedWindow> {
        self.windows.get(&handle)
    }

    pub fn get_mut(&mut self, handle: WindowHandle) -> Option<&mut ManagedWindow> {
        self.windows.get_mut(&handle)
    }

    pub fn contains(&self, handle: WindowHandle) -> bool {
        self.windows.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedWindow> {
        self.windows.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ManagedWindow> {
        self.windows.values_mut()
    }

    /// Windows currently mapped on screen.
    pub fn mapped(&self) -> impl Iterator<Item = &ManagedWindow> {
        self.windows.values().filter(|w| w.mapped)
    }

    /// Handles of windows whose capture must be rebuilt.
    pub fn dirty_handles(&self) -> Vec<WindowHandle> {
        self.windows
            .values()
            .filter(|w| w.dirty)
            .map(|w| w.handle)
            .collect()
    }

    /// The focused window, if any.
    pub fn focused(&self) -> Option<WindowHandle> {
        self.windows.values().find(|w| w.focused).map(|w| w.handle)
    }

    /// Move focus to `target` (or nowhere), clearing every other focus flag.
    /// An unknown target clears focus.  Returns true if focus changed.
    pub fn set_focus(&mut self, target: Option<WindowHandle>) -> bool {
        let before = self.focused();
        for win in self.windows.values_mut() {
            win.focused = Some(win.handle) == target;
        }
        before != self.focused()
    }

    /// Status s-expression for logs.
    pub fn status_sexp(&self) -> String {
        let captured = self.windows.values().filter(|w| w.texture().is_some()).count();
        format!(
            "(:windows {} :mapped {} :captured {} :dirty {} :focused {})",
            self.windows.len(),
            self.mapped().count(),
            captured,
            self.windows.values().filter(|w| w.dirty).count(),
            self.focused()
                .map(|h| h.to_string())
                .unwrap_or_else(|| "nil".to_string()),
        )
    }
}

// ── Tests ──────────────────────────────────────────────────
