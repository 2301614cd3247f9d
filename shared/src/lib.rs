//! # Shared Module for the LWM2M Bootstrap Service
//!
//! This crate provides the LWM2M bootstrap data model, errors, constants
//! and service configuration used by the bootstrap service crate.
//!
//! ## Bootstrap at a glance
//!
//! On first contact a device connects to the bootstrap server, which writes:
//! - **Security** instances (object 0): credentials for each server
//! - **Server** instances (object 1): registration parameters
//! - **Access Control** instances (object 2): per-server access rights
//!
//! The bootstrap server itself is identified by short server id 0.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

// Re-exports for convenience
pub use config::*;
pub use constants::*;
pub use error::*;
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
