//! GPU seam — opaque resource handles and the device operations the
//! compositor needs.
//!
//! Components never hold GPU objects directly.  Whoever allocates a
//! resource keeps its handle; everyone else borrows the handle for the
//! duration of a call.

use glam::Mat4;

use crate::error::GpuError;
use crate::window::WindowHandle;

/// Texture sampled when drawing a window quad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Live association between a window surface and a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(pub u64);

/// Off-screen color + depth target for one eye.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetId(pub u64);

/// Device operations used by the capture bridge and the stereo renderer.
pub trait Gpu {
    /// Allocate an RGBA texture for window content.
    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureId, GpuError>;

    /// Free a texture.  Any binding onto it must already be released.
    fn destroy_texture(&mut self, texture: TextureId);

    /// Bind a window's pixel surface to `texture` so sampling it yields the
    /// window's current content.
    fn bind_surface(
        &mut self,
        window: WindowHandle,
        texture: TextureId,
    ) -> Result<BindingId, GpuError>;

    /// Undo a previous `bind_surface`.
    fn release_surface(&mut self, binding: BindingId);

    /// Create a complete off-screen target of the given size.
    fn create_render_target(&mut self, width: u32, height: u32)
        -> Result<RenderTargetId, GpuError>;

    fn destroy_render_target(&mut self, target: RenderTargetId);

    /// Build the lens-correction program used by `warp`.
    fn prepare_warp(&mut self) -> Result<(), GpuError>;

    /// Bind `target`, set its viewport and clear color and depth.
    fn begin_target(&mut self, target: RenderTargetId, clear: [f32; 4]) -> Result<(), GpuError>;

    /// Load the projection and view for subsequent draws.
    fn set_camera(&mut self, projection: Mat4, view: Mat4);

    /// Draw the unit quad (x, y in [-0.5, 0.5], z = 0) transformed by `model`.
    fn draw_textured_quad(&mut self, texture: TextureId, model: Mat4);

    /// Finish drawing into `target`.
    fn end_target(&mut self, target: RenderTargetId) -> Result<(), GpuError>;

    /// Composite both eye images side by side into the output, lens-corrected.
    fn warp(
        &mut self,
        left: RenderTargetId,
        right: RenderTargetId,
        width: u32,
        height: u32,
    ) -> Result<(), GpuError>;

    /// Show the composited image.
    fn present(&mut self) -> Result<(), GpuError>;
}
