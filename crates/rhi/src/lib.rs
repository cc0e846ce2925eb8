//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance, physical device and device creation ([`context`])
//! - Buffers, textures and memory-type selection
//! - Descriptor set layouts, pools and batched updates
//! - Render passes, framebuffers and pipelines
//! - Command buffer recording and synchronization primitives
//! - Swapchain management
//!
//! Every object owns its Vulkan handles and releases them on drop. Every
//! `vk::Result` is checked and mapped into [`RhiError`].

mod error;

pub mod buffer;
pub mod command;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod instance;
pub mod memory;
pub mod physical_device;
pub mod pipeline;
pub mod release;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{ResourceKind, RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
