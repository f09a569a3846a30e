//! idf-build Hardware Abstraction Layer (HAL).
//!
//! Everything that touches the outside world (child processes, the build
//! directory on disk) goes through the traits in [`hal`] so the build workflow
//! can be exercised against [`FakeHal`] without an ESP-IDF installation.

pub mod hal;

pub use hal::*;
pub use idf_error::{HalError, HalResult};
