//! GLES implementation of the GPU seam for the winit backend.
//!
//! Window textures are the XWayland surface buffers imported by smithay's
//! renderer utilities; a binding re-imports the surface on every draw so
//! the quad always shows current content.  Eye targets and both shader
//! programs are plain GL objects driven through the renderer's context.

use std::collections::HashMap;
use std::ptr;

use glam::Mat4;
use smithay::backend::renderer::gles::ffi::{self, types::GLint, types::GLuint, Gles2};
use smithay::backend::renderer::gles::{GlesRenderer, GlesTexture};
use smithay::backend::renderer::utils::{import_surface, with_renderer_surface_state};
use smithay::backend::renderer::{Renderer, Texture};
use smithay::backend::winit::WinitGraphicsBackend;
use tracing::{debug, warn};

use super::xwayland::SharedX11;
use crate::error::{GpuError, InitError};
use crate::render::gpu::{BindingId, Gpu, RenderTargetId, TextureId};
use crate::window::WindowHandle;

const QUAD_VERT: &str = include_str!("../../shaders/quad.vert");
const QUAD_FRAG: &str = include_str!("../../shaders/quad.frag");
const WARP_VERT: &str = include_str!("../../shaders/warp.vert");
const WARP_FRAG: &str = include_str!("../../shaders/warp.frag");

/// Unit quad as a triangle strip: x, y, z, u, v.
#[rustfmt::skip]
const QUAD_VERTICES: [f32; 20] = [
    -0.5, -0.5, 0.0,  0.0, 1.0,
     0.5, -0.5, 0.0,  1.0, 1.0,
    -0.5,  0.5, 0.0,  0.0, 0.0,
     0.5,  0.5, 0.0,  1.0, 0.0,
];

/// Full viewport as a triangle strip: x, y, u, v.
#[rustfmt::skip]
const WARP_VERTICES: [f32; 16] = [
    -1.0, -1.0,  0.0, 0.0,
     1.0, -1.0,  1.0, 0.0,
    -1.0,  1.0,  0.0, 1.0,
     1.0,  1.0,  1.0, 1.0,
];

#[derive(Debug, Clone, Copy)]
struct Program {
    id: GLuint,
    /// Matrix uniform (`u_mvp`), or -1 for the warp program.
    mvp: GLint,
    scr_w: GLint,
    scr_h: GLint,
}

#[derive(Debug)]
struct Slot {
    width: u32,
    height: u32,
    window: Option<WindowHandle>,
    texture: Option<GlesTexture>,
}

#[derive(Debug, Clone, Copy)]
struct Target {
    fbo: GLuint,
    color: GLuint,
    depth: GLuint,
    width: u32,
    height: u32,
}

pub struct GlesGpu {
    backend: WinitGraphicsBackend<GlesRenderer>,
    shared: SharedX11,
    next_id: u64,
    slots: HashMap<TextureId, Slot>,
    bindings: HashMap<BindingId, TextureId>,
    targets: HashMap<RenderTargetId, Target>,
    quad: Program,
    warp: Option<Program>,
    camera: Mat4,
}

impl GlesGpu {
    pub fn new(
        mut backend: WinitGraphicsBackend<GlesRenderer>,
        shared: SharedX11,
    ) -> Result<Self, InitError> {
        let quad = backend
            .renderer()
            .with_context(|gl| unsafe { build_program(gl, QUAD_VERT, QUAD_FRAG) })
            .map_err(|e| InitError::Display(e.to_string()))?
            .map_err(InitError::Shader)?;
        debug!(program = quad.id, "quad program built");
        Ok(Self {
            backend,
            shared,
            next_id: 1,
            slots: HashMap::new(),
            bindings: HashMap::new(),
            targets: HashMap::new(),
            quad,
            warp: None,
            camera: Mat4::IDENTITY,
        })
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Import the current buffer of `window`'s surface as a texture.
    fn surface_texture(&mut self, window: WindowHandle) -> Result<GlesTexture, String> {
        let surface = self
            .shared
            .borrow()
            .surfaces
            .get(&window)
            .and_then(|s| s.wl_surface())
            .ok_or_else(|| "no wl_surface associated".to_string())?;
        let renderer = self.backend.renderer();
        import_surface(renderer, &surface).map_err(|e| e.to_string())?;
        let context = renderer.context_id();
        with_renderer_surface_state(&surface, |state| state.texture(&context).cloned())
            .flatten()
            .ok_or_else(|| "surface has no buffer attached".to_string())
    }

    fn with_gl<T>(&mut self, f: impl FnOnce(&Gles2) -> T) -> Result<T, GpuError> {
        self.backend
            .renderer()
            .with_context(f)
            .map_err(|e| GpuError::Render(e.to_string()))
    }
}

impl Gpu for GlesGpu {
    fn create_texture(&mut self, width: u32, height: u32) -> Result<TextureId, GpuError> {
        if width == 0 || height == 0 {
            return Err(GpuError::TextureAlloc {
                width,
                height,
                reason: "zero-sized texture".into(),
            });
        }
        let texture = TextureId(self.next());
        self.slots.insert(
            texture,
            Slot {
                width,
                height,
                window: None,
                texture: None,
            },
        );
        Ok(texture)
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.slots.remove(&texture);
    }

    fn bind_surface(
        &mut self,
        window: WindowHandle,
        texture: TextureId,
    ) -> Result<BindingId, GpuError> {
        if !self.slots.contains_key(&texture) {
            return Err(GpuError::Bind {
                handle: window,
                reason: format!("unknown texture {}", texture.0),
            });
        }
        let imported = self
            .surface_texture(window)
            .map_err(|reason| GpuError::Bind { handle: window, reason })?;
        let binding = BindingId(self.next());
        if let Some(slot) = self.slots.get_mut(&texture) {
            if (imported.width(), imported.height()) != (slot.width, slot.height) {
                debug!(
                    handle = %window,
                    buffer_width = imported.width(),
                    buffer_height = imported.height(),
                    "surface buffer lags configured size"
                );
            }
            slot.window = Some(window);
            slot.texture = Some(imported);
        }
        self.bindings.insert(binding, texture);
        Ok(binding)
    }

    fn release_surface(&mut self, binding: BindingId) {
        if let Some(texture) = self.bindings.remove(&binding) {
            if let Some(slot) = self.slots.get_mut(&texture) {
                slot.window = None;
                slot.texture = None;
            }
        }
    }

    fn create_render_target(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<RenderTargetId, GpuError> {
        let target = self
            .with_gl(|gl| unsafe { build_target(gl, width, height) })?
            .map_err(GpuError::IncompleteTarget)?;
        let id = RenderTargetId(self.next());
        self.targets.insert(id, target);
        Ok(id)
    }

    fn destroy_render_target(&mut self, target: RenderTargetId) {
        if let Some(t) = self.targets.remove(&target) {
            let result = self.with_gl(|gl| unsafe {
                gl.DeleteFramebuffers(1, &t.fbo);
                gl.DeleteRenderbuffers(1, &t.depth);
                gl.DeleteTextures(1, &t.color);
            });
            if let Err(e) = result {
                warn!("failed to delete render target: {}", e);
            }
        }
    }

    fn prepare_warp(&mut self) -> Result<(), GpuError> {
        let program = self
            .with_gl(|gl| unsafe { build_program(gl, WARP_VERT, WARP_FRAG) })?
            .map_err(GpuError::Shader)?;
        self.warp = Some(program);
        Ok(())
    }

    fn begin_target(&mut self, target: RenderTargetId, clear: [f32; 4]) -> Result<(), GpuError> {
        let t = *self
            .targets
            .get(&target)
            .ok_or_else(|| GpuError::Render(format!("unknown target {}", target.0)))?;
        self.with_gl(|gl| unsafe {
            gl.BindFramebuffer(ffi::FRAMEBUFFER, t.fbo);
            gl.Viewport(0, 0, t.width as i32, t.height as i32);
            gl.ClearColor(clear[0], clear[1], clear[2], clear[3]);
            gl.Clear(ffi::COLOR_BUFFER_BIT | ffi::DEPTH_BUFFER_BIT);
            gl.Enable(ffi::DEPTH_TEST);
            gl.Disable(ffi::BLEND);
        })
    }

    fn set_camera(&mut self, projection: Mat4, view: Mat4) {
        self.camera = projection * view;
    }

    fn draw_textured_quad(&mut self, texture: TextureId, model: Mat4) {
        let Some(window) = self.slots.get(&texture).and_then(|s| s.window) else {
            return;
        };
        match self.surface_texture(window) {
            Ok(fresh) => {
                if let Some(slot) = self.slots.get_mut(&texture) {
                    slot.texture = Some(fresh);
                }
            }
            Err(reason) => debug!(handle = %window, "keeping stale texture: {}", reason),
        }
        let Some(tex_id) = self
            .slots
            .get(&texture)
            .and_then(|s| s.texture.as_ref())
            .map(|t| t.tex_id())
        else {
            return;
        };

        let mvp = (self.camera * model).to_cols_array();
        let quad = self.quad;
        let result = self.with_gl(|gl| unsafe {
            gl.UseProgram(quad.id);
            gl.UniformMatrix4fv(quad.mvp, 1, ffi::FALSE, mvp.as_ptr());
            gl.ActiveTexture(ffi::TEXTURE0);
            gl.BindTexture(ffi::TEXTURE_2D, tex_id);
            draw_strip(gl, &QUAD_VERTICES, 3);
        });
        if let Err(e) = result {
            warn!("quad draw failed: {}", e);
        }
    }

    fn end_target(&mut self, _target: RenderTargetId) -> Result<(), GpuError> {
        self.with_gl(|gl| unsafe {
            gl.Disable(ffi::DEPTH_TEST);
            gl.BindFramebuffer(ffi::FRAMEBUFFER, 0);
        })
    }

    fn warp(
        &mut self,
        left: RenderTargetId,
        right: RenderTargetId,
        width: u32,
        height: u32,
    ) -> Result<(), GpuError> {
        let warp = self
            .warp
            .ok_or_else(|| GpuError::Shader("warp program not built".into()))?;
        let color = |id: RenderTargetId| {
            self.targets
                .get(&id)
                .map(|t| t.color)
                .ok_or_else(|| GpuError::Render(format!("unknown target {}", id.0)))
        };
        let (left, right) = (color(left)?, color(right)?);
        let half = (width / 2) as i32;

        let (renderer, _framebuffer) = self
            .backend
            .bind()
            .map_err(|e| GpuError::Present(e.to_string()))?;
        renderer
            .with_context(|gl| unsafe {
                gl.UseProgram(warp.id);
                gl.Uniform1i(warp.scr_w, half);
                gl.Uniform1i(warp.scr_h, height as i32);
                gl.ActiveTexture(ffi::TEXTURE0);
                for (x, color) in [(0, left), (half, right)] {
                    gl.Viewport(x, 0, half, height as i32);
                    gl.BindTexture(ffi::TEXTURE_2D, color);
                    draw_strip(gl, &WARP_VERTICES, 2);
                }
                gl.UseProgram(0);
            })
            .map_err(|e| GpuError::Render(e.to_string()))
    }

    fn present(&mut self) -> Result<(), GpuError> {
        self.backend
            .submit(None)
            .map_err(|e| GpuError::Present(e.to_string()))
    }
}

// ── Raw GL helpers ─────────────────────────────────────────

/// Draw a 4-vertex triangle strip of interleaved position (`dims`
/// components) and uv from client memory.
unsafe fn draw_strip(gl: &Gles2, vertices: &[f32], dims: i32) {
    let stride = ((dims + 2) as usize * std::mem::size_of::<f32>()) as i32;
    gl.BindBuffer(ffi::ARRAY_BUFFER, 0);
    gl.VertexAttribPointer(0, dims, ffi::FLOAT, ffi::FALSE, stride, vertices.as_ptr().cast());
    gl.VertexAttribPointer(
        1,
        2,
        ffi::FLOAT,
        ffi::FALSE,
        stride,
        vertices.as_ptr().add(dims as usize).cast(),
    );
    gl.EnableVertexAttribArray(0);
    gl.EnableVertexAttribArray(1);
    gl.DrawArrays(ffi::TRIANGLE_STRIP, 0, 4);
    gl.DisableVertexAttribArray(0);
    gl.DisableVertexAttribArray(1);
}

unsafe fn compile_shader(gl: &Gles2, kind: ffi::types::GLenum, src: &str) -> Result<GLuint, String> {
    let shader = gl.CreateShader(kind);
    let ptr = src.as_ptr().cast::<ffi::types::GLchar>();
    let len = src.len() as GLint;
    gl.ShaderSource(shader, 1, &ptr, &len);
    gl.CompileShader(shader);

    let mut status = 0;
    gl.GetShaderiv(shader, ffi::COMPILE_STATUS, &mut status);
    if status == ffi::FALSE as GLint {
        let mut log_len = 0;
        gl.GetShaderiv(shader, ffi::INFO_LOG_LENGTH, &mut log_len);
        let mut log = vec![0u8; log_len.max(1) as usize];
        gl.GetShaderInfoLog(shader, log_len, ptr::null_mut(), log.as_mut_ptr().cast());
        gl.DeleteShader(shader);
        return Err(String::from_utf8_lossy(&log).trim_end_matches('\0').to_string());
    }
    Ok(shader)
}

unsafe fn build_program(gl: &Gles2, vert: &str, frag: &str) -> Result<Program, String> {
    let vs = compile_shader(gl, ffi::VERTEX_SHADER, vert)?;
    let fs = match compile_shader(gl, ffi::FRAGMENT_SHADER, frag) {
        Ok(fs) => fs,
        Err(e) => {
            gl.DeleteShader(vs);
            return Err(e);
        }
    };
    let id = gl.CreateProgram();
    gl.AttachShader(id, vs);
    gl.AttachShader(id, fs);
    gl.BindAttribLocation(id, 0, c"a_pos".as_ptr());
    gl.BindAttribLocation(id, 1, c"a_uv".as_ptr());
    gl.LinkProgram(id);
    gl.DeleteShader(vs);
    gl.DeleteShader(fs);

    let mut status = 0;
    gl.GetProgramiv(id, ffi::LINK_STATUS, &mut status);
    if status == ffi::FALSE as GLint {
        gl.DeleteProgram(id);
        return Err("program link failed".into());
    }

    gl.UseProgram(id);
    gl.Uniform1i(gl.GetUniformLocation(id, c"u_tex".as_ptr()), 0);
    gl.UseProgram(0);
    Ok(Program {
        id,
        mvp: gl.GetUniformLocation(id, c"u_mvp".as_ptr()),
        scr_w: gl.GetUniformLocation(id, c"u_scr_w".as_ptr()),
        scr_h: gl.GetUniformLocation(id, c"u_scr_h".as_ptr()),
    })
}

unsafe fn build_target(gl: &Gles2, width: u32, height: u32) -> Result<Target, String> {
    let (w, h) = (width as i32, height as i32);

    let mut color = 0;
    gl.GenTextures(1, &mut color);
    gl.BindTexture(ffi::TEXTURE_2D, color);
    gl.TexImage2D(
        ffi::TEXTURE_2D,
        0,
        ffi::RGBA as i32,
        w,
        h,
        0,
        ffi::RGBA,
        ffi::UNSIGNED_BYTE,
        ptr::null(),
    );
    gl.TexParameteri(ffi::TEXTURE_2D, ffi::TEXTURE_MIN_FILTER, ffi::LINEAR as i32);
    gl.TexParameteri(ffi::TEXTURE_2D, ffi::TEXTURE_MAG_FILTER, ffi::LINEAR as i32);
    gl.TexParameteri(ffi::TEXTURE_2D, ffi::TEXTURE_WRAP_S, ffi::CLAMP_TO_EDGE as i32);
    gl.TexParameteri(ffi::TEXTURE_2D, ffi::TEXTURE_WRAP_T, ffi::CLAMP_TO_EDGE as i32);

    let mut depth = 0;
    gl.GenRenderbuffers(1, &mut depth);
    gl.BindRenderbuffer(ffi::RENDERBUFFER, depth);
    gl.RenderbufferStorage(ffi::RENDERBUFFER, ffi::DEPTH_COMPONENT16, w, h);

    let mut fbo = 0;
    gl.GenFramebuffers(1, &mut fbo);
    gl.BindFramebuffer(ffi::FRAMEBUFFER, fbo);
    gl.FramebufferTexture2D(ffi::FRAMEBUFFER, ffi::COLOR_ATTACHMENT0, ffi::TEXTURE_2D, color, 0);
    gl.FramebufferRenderbuffer(ffi::FRAMEBUFFER, ffi::DEPTH_ATTACHMENT, ffi::RENDERBUFFER, depth);
    let status = gl.CheckFramebufferStatus(ffi::FRAMEBUFFER);
    gl.BindFramebuffer(ffi::FRAMEBUFFER, 0);

    if status != ffi::FRAMEBUFFER_COMPLETE {
        gl.DeleteFramebuffers(1, &fbo);
        gl.DeleteRenderbuffers(1, &depth);
        gl.DeleteTextures(1, &color);
        return Err(format!("framebuffer status 0x{:x}", status));
    }
    Ok(Target {
        fbo,
        color,
        depth,
        width,
        height,
    })
}
