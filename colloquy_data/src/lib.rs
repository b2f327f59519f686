//! Shared data model for Colloquy dialogue content.

pub mod defs;
pub mod validate;

pub use defs::*;
pub use validate::{ValidationError, validate_graph};
