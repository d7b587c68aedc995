//! Hand-rolled crypto primitives needed by the WebSocket handshake.
//!
//! Kept dependency-free on purpose, following the same approach as a
//! from-scratch SHA-256 used elsewhere for handshake material: a small,
//! auditable implementation rather than pulling in a hashing crate for two
//! functions.

pub mod base64;
pub mod sha1;
