//! Integration tests

mod common;
mod test_platform;
mod test_server;
