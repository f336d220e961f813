//! Utility functions.

pub mod fs;
pub mod hash;
pub mod progress;
