//! Platform services

pub mod locks;
pub mod service;

pub use service::{Platform, PlatformOptions, RecoveryReport};
