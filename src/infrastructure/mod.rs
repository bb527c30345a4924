//! Infrastructure layer for external integrations.
//!
//! This layer implements interfaces defined by the domain layer, providing
//! concrete implementations for data persistence, caching, and messaging.
//!
//! # Modules
//!
//! - [`broker`] - Click message broker (Redis Streams and in-process implementations)
//! - [`cache`] - Caching abstractions (Redis, in-memory, and no-op implementations)
//! - [`persistence`] - PostgreSQL and in-memory repository implementations

pub mod broker;
pub mod cache;
pub mod persistence;
