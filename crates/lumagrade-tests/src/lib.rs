//! Integration test crate for lumagrade.
//!
//! This crate exists solely to hold cross-crate integration tests.
//! It depends on the core, color and gpu crates to verify they work together.

#[cfg(test)]
mod support;

#[cfg(test)]
mod properties;

#[cfg(test)]
mod render;

#[cfg(test)]
mod hardware;
