//! Managed windows and their captured textures.

pub mod capture;
pub mod registry;

pub use capture::TextureBridge;
pub use registry::{ManagedWindow, WindowHandle, WindowRegistry};
