//! Stereo renderer — draws the window scene once per eye into off-screen
//! targets, then lens-warps both into the output.
//!
//! Per frame the stages run strictly in order:
//! `BeginEye(left)`, `RenderScene`, `EndEye(left)`, `BeginEye(right)`,
//! `RenderScene`, `EndEye(right)`, `Warp`, then `Present` once the frame
//! loop asks for it.

pub mod camera;
pub mod gpu;

use glam::{Mat4, Vec3};
use tracing::{info, trace};

use self::camera::Camera;
use self::gpu::{Gpu, RenderTargetId, TextureId};
use crate::error::{CompositorError, InitError};
use crate::vr::head_pose::{Eye, HeadPose};
use crate::window::{ManagedWindow, WindowRegistry};

/// Background color of each eye target.
pub const CLEAR_COLOR: [f32; 4] = [0.02, 0.02, 0.05, 1.0];

/// Pipeline stage, recorded for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    BeginEye(Eye),
    RenderScene,
    EndEye(Eye),
    Warp,
    Present,
}

/// Quad model matrix: unit height, width by aspect ratio, centered on the
/// window position and turned to the camera's heading.
pub fn quad_model(window: &ManagedWindow, yaw: f32) -> Mat4 {
    Mat4::from_translation(window.position)
        * Mat4::from_rotation_y(yaw)
        * Mat4::from_scale(Vec3::new(window.aspect(), 1.0, 1.0))
}

/// Projection and view for `eye`, identity where the pose has no matrix.
pub fn eye_matrices(pose: &HeadPose, eye: Eye) -> (Mat4, Mat4) {
    let m = pose.eye(eye);
    if m.projection.is_none() || m.view.is_none() {
        trace!(eye = eye.as_str(), "eye matrix unavailable, using identity");
    }
    (
        m.projection.unwrap_or(Mat4::IDENTITY),
        m.view.unwrap_or(Mat4::IDENTITY),
    )
}

/// Dual-eye renderer owning the two eye targets.
#[derive(Debug)]
pub struct StereoRenderer {
    width: u32,
    height: u32,
    left: RenderTargetId,
    right: RenderTargetId,
    stages: Vec<RenderStage>,
    /// Frames presented.
    pub frames: u64,
    /// Windows drawn per eye in the last frame.
    pub quads_last_frame: usize,
}

impl StereoRenderer {
    /// Create both eye targets (half width, full height) and the warp program.
    pub fn new(gpu: &mut dyn Gpu, width: u32, height: u32) -> Result<Self, InitError> {
        let eye_width = width / 2;
        let target_err = |e: crate::error::GpuError| InitError::RenderTarget {
            width: eye_width,
            height,
            reason: e.to_string(),
        };

        let left = gpu.create_render_target(eye_width, height).map_err(target_err)?;
        let right = match gpu.create_render_target(eye_width, height) {
            Ok(t) => t,
            Err(e) => {
                gpu.destroy_render_target(left);
                return Err(target_err(e));
            }
        };
        if let Err(e) = gpu.prepare_warp() {
            gpu.destroy_render_target(left);
            gpu.destroy_render_target(right);
            return Err(InitError::Shader(e.to_string()));
        }

        info!(width, height, eye_width, "stereo renderer ready");
        Ok(Self {
            width,
            height,
            left,
            right,
            stages: Vec::with_capacity(8),
            frames: 0,
            quads_last_frame: 0,
        })
    }

    /// Output resolution.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Size of one eye target.
    pub fn eye_size(&self) -> (u32, u32) {
        (self.width / 2, self.height)
    }

    pub fn target(&self, eye: Eye) -> RenderTargetId {
        match eye {
            Eye::Left => self.left,
            Eye::Right => self.right,
        }
    }

    /// Stages run for the current (or last) frame.
    pub fn stages(&self) -> &[RenderStage] {
        &self.stages
    }

    /// Render both eyes and warp them into the output.
    ///
    /// `look` applies the camera's own yaw and pitch; pass false when the
    /// pose comes from an HMD.
    pub fn render(
        &mut self,
        gpu: &mut dyn Gpu,
        registry: &WindowRegistry,
        camera: &Camera,
        pose: &HeadPose,
        look: bool,
    ) -> Result<(), CompositorError> {
        self.stages.clear();

        // Draw far windows first.
        let eye_pos = camera.eye_position();
        let mut quads: Vec<(TextureId, Mat4, f32)> = registry
            .mapped()
            .filter_map(|w| {
                w.texture().map(|tex| {
                    (
                        tex,
                        quad_model(w, camera.yaw),
                        w.position.distance_squared(eye_pos),
                    )
                })
            })
            .collect();
        quads.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let world_view = camera.world_view(look);
        for eye in Eye::BOTH {
            let target = self.target(eye);
            self.stages.push(RenderStage::BeginEye(eye));
            gpu.begin_target(target, CLEAR_COLOR)?;
            let (projection, eye_view) = eye_matrices(pose, eye);
            gpu.set_camera(projection, eye_view * world_view);

            self.stages.push(RenderStage::RenderScene);
            for (texture, model, _) in &quads {
                gpu.draw_textured_quad(*texture, *model);
            }

            self.stages.push(RenderStage::EndEye(eye));
            gpu.end_target(target)?;
        }

        self.stages.push(RenderStage::Warp);
        gpu.warp(self.left, self.right, self.width, self.height)?;
        self.quads_last_frame = quads.len();
        Ok(())
    }

    /// Show the warped image.
    pub fn present(&mut self, gpu: &mut dyn Gpu) -> Result<(), CompositorError> {
        self.stages.push(RenderStage::Present);
        gpu.present()?;
        self.frames += 1;
        Ok(())
    }

    /// Release both eye targets.
    pub fn destroy(&mut self, gpu: &mut dyn Gpu) {
        gpu.destroy_render_target(self.left);
        gpu.destroy_render_target(self.right);
    }
}

// ── Tests ──────────────────────────────────────────────────
