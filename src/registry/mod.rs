//! Specialist registry
//!
//! Holds every known specialist together with its health status and request
//! counters, answers filtered discovery queries and computes fleet statistics.
//! Health state is fed by the [`crate::monitor`] loop and by real request
//! outcomes reported through [`SpecialistRegistry::record_outcome`].

pub mod error;
pub mod events;
pub mod fleet;
pub mod specialist;
pub mod statistics;
pub mod store;

pub use error::RegistryError;
pub use events::RegistryEvent;
pub use fleet::FleetDefinition;
pub use specialist::{Specialist, SpecialistSpec, SpecialistStatus, UNTESTED_SUCCESS_RATE};
pub use statistics::RegistryStatistics;
pub use store::{DiscoverFilter, ProbeApplication, SpecialistRegistry};
