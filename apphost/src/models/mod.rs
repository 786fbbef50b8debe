//! Persisted records

pub mod app;
pub mod deployment;
pub mod log;
