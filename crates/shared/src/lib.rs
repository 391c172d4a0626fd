//! Fieldform Shared Types
//!
//! This crate contains domain types shared across the Fieldform platform:
//! account limits, subscription/product records from the billing provider,
//! and the environment configuration payload.

pub mod types;

pub use types::*;
