//! Multi-pass rendering: shadow map, multi-sampled color, post-process.
//!
//! This crate holds:
//! - the push-constant blocks shared with the shaders
//! - the pass objects and their render targets
//! - the frame orchestrator and the Vulkan backend it drives

mod error;
pub mod lighting_pass;
pub mod orchestrator;
pub mod post_process;
pub mod push_constants;
mod renderer;
pub mod shaders;
pub mod shadow_map;
pub mod targets;

pub use error::{RendererError, RendererResult};
pub use orchestrator::{FrameBackend, FrameOrchestrator, FrameOutcome, FrameScene};
pub use post_process::PostProcessSettings;
pub use push_constants::{DrawPushConstants, PostProcessPushConstants, PushConstantSchema};
pub use renderer::{Overlay, Renderer};
pub use shaders::ShaderLibrary;
