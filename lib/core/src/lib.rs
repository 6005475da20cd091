//! Core domain types and utilities for the rolegate authorization engine.
//!
//! This crate provides the foundational types, error handling, and shared
//! utilities used by the role authorization and session reconciliation
//! crates.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ParseIdError, UserId};
