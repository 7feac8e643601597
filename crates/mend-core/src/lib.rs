//! # mend-core
//!
//! Core types, traits, and repair rules for the mend document backfill
//! engine.
//!
//! This crate holds everything that does not touch a real store: the
//! document and patch model, the migration predicate, the patch computer,
//! the batch accumulator, and the [`DocumentSource`] trait that storage
//! crates implement.

pub mod batch;
pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod patch;
pub mod predicate;
pub mod traits;

// Re-export commonly used types at crate root
pub use batch::accumulate;
pub use error::{Error, Result};
pub use models::*;
pub use patch::{compute_patch, MarkerRepair};
pub use predicate::needs_migration;
pub use traits::*;
