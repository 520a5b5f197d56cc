//! Error taxonomy for the compositor.
//!
//! Setup failures are `InitError` and abort startup.  Per-window binding
//! failures surface as `GpuError` from the capture path and are logged, not
//! propagated.  Anything else raised inside the frame loop is a
//! `CompositorError` and unwinds to the handler in `main`.  A bad skeleton
//! recording is a `ReplayError`, reported before the loop starts.

use thiserror::Error;

use crate::window::WindowHandle;

/// Environment or resource setup failed; the session cannot start.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("cannot open display: {0}")]
    Display(String),
    #[error("render target {width}x{height} incomplete: {reason}")]
    RenderTarget {
        width: u32,
        height: u32,
        reason: String,
    },
    #[error("warp shader build failed: {0}")]
    Shader(String),
}

/// A GPU operation failed.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("texture allocation {width}x{height} failed: {reason}")]
    TextureAlloc {
        width: u32,
        height: u32,
        reason: String,
    },
    #[error("cannot bind surface of window {handle}: {reason}")]
    Bind { handle: WindowHandle, reason: String },
    #[error("render target incomplete: {0}")]
    IncompleteTarget(String),
    #[error("shader: {0}")]
    Shader(String),
    #[error("render pass failed: {0}")]
    Render(String),
    #[error("present failed: {0}")]
    Present(String),
}

/// Fatal condition raised while the frame loop is running.
#[derive(Debug, Error)]
pub enum CompositorError {
    #[error(transparent)]
    Init(#[from] InitError),
    #[error("cannot query attributes of window {handle}: {reason}")]
    WindowQuery { handle: WindowHandle, reason: String },
    #[error("gpu: {0}")]
    Gpu(#[from] GpuError),
    #[error("skeleton tracker: {0}")]
    Tracking(String),
}

/// A skeleton recording could not be loaded.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed s-expression: {0}")]
    Parse(String),
    #[error("frame {frame}: {reason}")]
    Frame { frame: usize, reason: String },
    #[error("recording has no frames")]
    Empty,
}
