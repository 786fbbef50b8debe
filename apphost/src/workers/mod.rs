//! Background workers

pub mod health;
pub mod proxy_retry;
pub mod store_flush;
