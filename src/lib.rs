//! Workspace Deployer Library
//!
//! Orders workspace phases by dependency, executes them sequentially or level
//! by level, records every run in a durable state store and rolls runs back to
//! earlier successful ones.

pub mod cli;
pub mod context;
pub mod core;
pub mod deployer;
pub mod error;
pub mod models;
pub mod utils;

pub use context::EngineContext;
pub use error::{Error, Result};
