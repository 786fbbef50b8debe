//! Reverse-proxy configuration

pub mod config;
pub mod sync;
