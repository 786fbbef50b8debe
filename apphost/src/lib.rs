//! Apphost Library
//!
//! Core modules for the self-hosted application platform.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod fanout;
pub mod filesys;
pub mod health;
pub mod logs;
pub mod models;
pub mod platform;
pub mod ports;
pub mod proxy;
pub mod server;
pub mod storage;
pub mod store;
pub mod supervisor;
pub mod telemetry;
pub mod utils;
pub mod workers;
