//! Core domain entities.
//!
//! Entities are plain data structures without behaviour beyond construction.
//!
//! - [`Link`] - A short code mapped to a long URL
//! - [`Click`] - A persisted redirect event
//!
//! Creation inputs live in separate structs (`NewLink`, `NewClick`).

pub mod click;
pub mod link;

pub use click::{Click, NewClick, RecordOutcome};
pub use link::{Link, NewLink};
