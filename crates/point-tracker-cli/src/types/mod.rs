//! Shared CLI types.

pub mod error;

pub use error::*;
