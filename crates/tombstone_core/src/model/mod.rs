//! In-memory record model.
//!
//! # Responsibility
//! - Define the runtime record shape shared by the query façade and the
//!   lifecycle controller.
//!
//! # Invariants
//! - Deletion state is derived from the deletion attribute, never stored
//!   separately.

pub mod record;
