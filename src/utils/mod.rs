//! Utility functions for code generation and URL processing.
//!
//! - [`code_generator`] - Short code generation and shape validation
//! - [`url_normalizer`] - URL validation and normalization

pub mod code_generator;
pub mod url_normalizer;
