//! Core engine modules.

pub mod executor;
pub mod rollback;
pub mod scheduler;
pub mod state_store;
pub mod workspace;
