//! Data models.

pub mod config;
pub mod deployment;
pub mod rollback;
pub mod workspace;
