//! Rental request lifecycle and access-control engine for a property-rental marketplace.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
