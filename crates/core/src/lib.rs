//! Core utilities for the multipass renderer.
//!
//! This crate provides foundational types used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Configuration loading and validation
//! - Frame timing

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::{Config, LightingMode, PostProcessMode};
pub use error::{Error, Result};
pub use logging::{DEFAULT_FILTER, init_logging};
pub use timer::{FrameStats, FrameTimer};
