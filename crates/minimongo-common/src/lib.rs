//! Common utilities for minimongo
//!
//! This crate provides the error type shared by the minimongo crates.

pub mod error;

pub use error::{MinimongoError, Result};
