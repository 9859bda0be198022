//! API request and response data models.
//!
//! These are kept apart from the pipeline's domain types in [`crate::types`] so the wire contract
//! can be documented and evolved independently.

pub mod generate;
