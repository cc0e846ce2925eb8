//! Platform layer for the multipass renderer.
//!
//! - Fixed-size window management via winit
//! - Vulkan surface creation
//! - Keyboard and mouse input state

mod input;
mod window;

pub use input::{InputState, KeyCode, MouseButton};
pub use window::{Surface, Window};

pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
