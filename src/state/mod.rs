//! Pure replay logic for unit state.
//!
//! `apply` folds events into state with no I/O; `builder` drives replay
//! against the store, seeded by snapshots. All durability concerns live in
//! the persistence layer.

pub mod apply;
pub mod builder;

pub use apply::{apply, ApplyError};
pub use builder::{AggregateBuilder, BuildError};
