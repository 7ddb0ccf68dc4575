//! GPU abstraction layer for the presenter frame loop.
//!
//! This crate owns everything between the frame loop and the outside world:
//! - Driver capability traits ([`driver::GpuQueue`], [`driver::PresentTarget`])
//! - Fence tracking for CPU/GPU completion ordering
//! - Command recording with resource-state validation
//! - Surface (swapchain) image lifecycle
//! - A deterministic software device for tests and headless runs

mod error;

pub mod command;
pub mod driver;
pub mod fence;
pub mod software;
pub mod surface;

pub use error::{RhiError, RhiResult};
