//! Domain layer containing business entities and logic.
//!
//! This module defines entities, repository interfaces, and the click
//! pipeline. It is independent of the HTTP layer.
//!
//! # Architecture
//!
//! - [`entities`] - Core business data structures
//! - [`repositories`] - Data access trait definitions
//! - [`click_event`] - Click event model and broker message format
//! - [`click_publisher`] - Non-blocking publishing to the broker
//! - [`click_worker`] - Durable consumer persisting clicks
//!
//! # Click Processing Flow
//!
//! 1. A successful resolve emits a [`click_event::ClickEvent`]
//! 2. [`click_publisher::ClickPublisher`] buffers it without blocking the redirect
//! 3. [`click_publisher::run_click_publisher`] appends it to the broker with retries
//! 4. [`click_worker::run_click_workers`] persist it via [`repositories::ClickRepository`]
//!    and acknowledge the message only afterwards

pub mod click_event;
pub mod click_publisher;
pub mod click_worker;
pub mod entities;
pub mod repositories;
