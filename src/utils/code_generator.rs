//! Short code generation and validation utilities.
//!
//! Codes are fixed-length strings over `[A-Za-z0-9]` drawn from the thread-local
//! CSPRNG. With the default length of 7 the space holds 62^7 ≈ 3.5·10^12 codes,
//! so birthday collisions stay negligible for expected volumes; the service
//! still retries on the rare collision the store reports.

use rand::Rng;
use rand::distr::Alphanumeric;

/// Default length of generated codes.
pub const DEFAULT_CODE_LENGTH: usize = 7;

/// Upper bound for any code accepted on the resolve path or in click messages.
pub const MAX_CODE_LENGTH: usize = 64;

/// Paths served by fixed routes; a code equal to one of them could never be
/// resolved.
pub const RESERVED_CODES: &[&str] = &["api", "health"];

/// Generates a random alphanumeric short code of `length` characters.
///
/// Reserved route names are never returned.
///
/// # Examples
///
/// ```ignore
/// let code = generate_code(7);
/// assert_eq!(code.len(), 7);
/// assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
/// ```
pub fn generate_code(length: usize) -> String {
    first_unreserved(|| {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect()
    })
}

fn first_unreserved(mut draw: impl FnMut() -> String) -> String {
    loop {
        let code = draw();
        if !is_reserved_code(&code) {
            return code;
        }
    }
}

/// Returns true if `code` collides with a fixed route.
pub fn is_reserved_code(code: &str) -> bool {
    RESERVED_CODES.contains(&code)
}

/// Returns true if `code` could have been issued by this service.
///
/// Used to reject junk on the redirect path before touching cache or store.
pub fn is_well_formed_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= MAX_CODE_LENGTH
        && code.chars().all(|c| c.is_ascii_alphanumeric())
}
