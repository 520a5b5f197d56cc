//! Texture bridge — lazily binds window surfaces to GPU textures.
//!
//! Capture work happens only for windows flagged dirty (new, resized or
//! remapped).  The window's size is re-queried at capture time because the
//! size stored in the registry may lag the windowing system.

use tracing::{debug, warn};

use super::registry::{Capture, ManagedWindow, WindowRegistry};
use crate::backend::WindowSource;
use crate::error::CompositorError;
use crate::render::gpu::Gpu;

/// What `ensure_captured` did for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Window was not dirty; nothing to do.
    Clean,
    /// Window is not viewable (or has no area); its old texture is kept but
    /// not drawn until the next successful bind.
    Skipped,
    /// Surface bound to a texture of the given size.
    Bound { width: u32, height: u32 },
    /// Texture allocation or surface binding failed; retried on the next dirty cycle.
    Failed,
}

/// Counters for status reporting.
#[derive(Debug, Clone, Copy, Default)]
pub struct CaptureStats {
    pub binds: u64,
    pub releases: u64,
    pub allocations: u64,
    pub failures: u64,
}

/// Keeps window textures in step with window surfaces.
#[derive(Debug, Default)]
pub struct TextureBridge {
    pub stats: CaptureStats,
}

impl TextureBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `window`'s texture valid for its current size if it is dirty.
    ///
    /// Errors only when the windowing system cannot describe a window the
    /// registry still tracks.
    pub fn ensure_captured(
        &mut self,
        window: &mut ManagedWindow,
        source: &mut dyn WindowSource,
        gpu: &mut dyn Gpu,
    ) -> Result<CaptureOutcome, CompositorError> {
        if !window.dirty {
            return Ok(CaptureOutcome::Clean);
        }

        let handle = window.handle();
        let attrs = source.query_attributes(handle)?;
        window.width = attrs.width;
        window.height = attrs.height;

        // The old binding no longer matches the surface; a texture can only
        // carry one.  The texture itself stays for reuse.
        if let Some(binding) = window.capture.as_mut().and_then(|c| c.binding.take()) {
            gpu.release_surface(binding);
            self.stats.releases += 1;
        }

        if !window.is_mapped() || !attrs.viewable || attrs.width == 0 || attrs.height == 0 {
            window.dirty = false;
            debug!(%handle, "capture skipped: window not viewable");
            return Ok(CaptureOutcome::Skipped);
        }

        let (width, height) = (attrs.width, attrs.height);
        let texture = match window.capture {
            Some(c) if (c.width, c.height) == (width, height) => c.texture,
            _ => {
                if let Some(old) = window.capture.take() {
                    gpu.destroy_texture(old.texture);
                }
                match gpu.create_texture(width, height) {
                    Ok(texture) => {
                        self.stats.allocations += 1;
                        texture
                    }
                    Err(e) => {
                        warn!(%handle, "texture allocation failed: {}", e);
                        self.stats.failures += 1;
                        window.dirty = false;
                        return Ok(CaptureOutcome::Failed);
                    }
                }
            }
        };

        let mut capture = Capture {
            texture,
            binding: None,
            width,
            height,
        };
        let outcome = match gpu.bind_surface(handle, texture) {
            Ok(binding) => {
                capture.binding = Some(binding);
                self.stats.binds += 1;
                debug!(%handle, width, height, "surface bound");
                CaptureOutcome::Bound { width, height }
            }
            Err(e) => {
                warn!(%handle, "surface bind failed: {}", e);
                self.stats.failures += 1;
                CaptureOutcome::Failed
            }
        };
        window.capture = Some(capture);
        window.dirty = false;
        Ok(outcome)
    }

    /// Run `ensure_captured` over every dirty window.  Returns how many were bound.
    pub fn refresh(
        &mut self,
        registry: &mut WindowRegistry,
        source: &mut dyn WindowSource,
        gpu: &mut dyn Gpu,
    ) -> Result<usize, CompositorError> {
        let mut bound = 0;
        for handle in registry.dirty_handles() {
            if let Some(window) = registry.get_mut(handle) {
                if let CaptureOutcome::Bound { .. } = self.ensure_captured(window, source, gpu)? {
                    bound += 1;
                }
            }
        }
        Ok(bound)
    }

    /// Status s-expression for logs.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:binds {} :releases {} :allocations {} :failures {})",
            self.stats.binds, self.stats.releases, self.stats.allocations, self.stats.failures,
        )
    }
}

// ── Tests ──────────────────────────────────────────────────
