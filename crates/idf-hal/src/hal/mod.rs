//! HAL trait definitions and implementations.
//!
//! This module defines the core traits for system operations and provides
//! both real (LinuxHal) and fake (FakeHal) implementations.

pub mod fake_hal;
pub mod fs_ops;
pub mod linux_hal;
pub mod process_ops;

pub use fake_hal::{FakeHal, FakeResponse, Operation};
pub use fs_ops::FsOps;
pub use linux_hal::LinuxHal;
pub use process_ops::{CommandOutput, ProcessOps, ProcessSpec, DEFAULT_TIMEOUT};

/// Complete HAL combining all system operation traits.
pub trait ToolHal: ProcessOps + FsOps + Send + Sync {}

/// Automatically implement ToolHal for any type implementing all required traits.
impl<T> ToolHal for T where T: ProcessOps + FsOps + Send + Sync {}
