//! Ladder Common - Shared types, utilities, and configuration for the ladder allocator.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Configuration validation
//! - The service error type
//! - Logging setup and structured logging helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    AllocatorSection, Config, CrashBrakeSection, ObservabilityConfig, PhaseThresholdSection,
    ServerConfig, SmallCapCapsSection,
};
pub use error::Error;
pub use validation::{Validate, ValidationError, ValidationResult};
