//! Lifecycle orchestration over repository implementations.
//!
//! # Responsibility
//! - Provide the per-instance destroy/recover entry points.
//!
//! # Invariants
//! - Services never bypass repository persistence contracts.

pub mod lifecycle;
