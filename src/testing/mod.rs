//! Testing utilities
//!
//! A scripted transport so the registry, monitor and routing engine can be
//! exercised without specialist processes.

pub mod mocks;

pub use mocks::*;
