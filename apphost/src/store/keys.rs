//! Key space of the store
//!
//! Numeric components are zero-padded so lexical order equals numeric order
//! and prefix scans come back sorted by version or time.

pub const APP_PREFIX: &str = "app/";
pub const PORT_PREFIX: &str = "port/";

pub fn app(app_id: &str) -> String {
    format!("{APP_PREFIX}{app_id}")
}

pub fn host(hostname: &str) -> String {
    format!("host/{hostname}")
}

pub fn port(port: u16) -> String {
    format!("{PORT_PREFIX}{port:05}")
}

pub fn deployments(app_id: &str) -> String {
    format!("deploy/{app_id}/")
}

pub fn deployment(app_id: &str, version: u32) -> String {
    format!("deploy/{app_id}/{version:010}")
}

pub fn logs(app_id: &str) -> String {
    format!("log/{app_id}/")
}

pub fn log(app_id: &str, timestamp_ms: i64, seq: u64) -> String {
    format!("log/{app_id}/{timestamp_ms:013}/{seq:010}")
}
