//! Repository implementations.
//!
//! Concrete implementations of domain repository traits: PostgreSQL through
//! SQLx for production, and in-process maps for tests and store-less runs.
//!
//! # Repositories
//!
//! - [`PgLinkRepository`] - Short link storage and retrieval
//! - [`PgClickRepository`] - De-duplicated click records
//! - [`MemoryLinkRepository`], [`MemoryClickRepository`] - In-process counterparts

pub mod memory;
pub mod pg_click_repository;
pub mod pg_link_repository;

pub use memory::{MemoryClickRepository, MemoryLinkRepository};
pub use pg_click_repository::PgClickRepository;
pub use pg_link_repository::PgLinkRepository;
