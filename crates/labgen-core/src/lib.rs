//! Core domain types and traits for labgen.
//!
//! This crate contains:
//! - The unified configuration model (machines, services, secrets)
//! - Machine keys, storage and deploy strategy types
//! - Machine assignment resolution
//! - The backend translator trait

pub mod assignment;
pub mod error;
pub mod key;
pub mod model;
pub mod storage;
pub mod strategy;
pub mod translator;

pub use assignment::ResolvedAssignment;
pub use error::{Error, Result};
pub use key::MachineKey;
pub use model::{
    Backend, Domain, Machine, MachineRole, SecretSpec, ServiceSpec, UnifiedConfig, mapping_key,
};
pub use storage::{Quantity, SizeUnit, Storage};
pub use strategy::DeployStrategy;
pub use translator::{BackendServiceDescriptor, Placement, ServiceRef, Translator};
