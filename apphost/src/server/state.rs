//! Server state

use std::sync::Arc;

use crate::platform::Platform;

/// Server state shared across handlers
pub struct ServerState {
    pub platform: Arc<Platform>,
}

impl ServerState {
    pub fn new(platform: Arc<Platform>) -> Self {
        Self { platform }
    }
}
