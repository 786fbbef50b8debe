//! Finite state machine for release status

use crate::errors::PlatformError;
use crate::models::deployment::{Deployment, DeploymentStatus};

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// Materialization started
    Build,

    /// Release became the served one after a deploy
    Activate,

    /// Materialization, validation or activation failed
    Fail(String),

    /// Another release was activated
    Supersede,

    /// Rolled back to
    Restore,
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentStatus,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self::from_status(DeploymentStatus::Pending)
    }

    /// Resume from a persisted status
    pub fn from_status(state: DeploymentStatus) -> Self {
        Self { state, error: None }
    }

    /// Get current state
    pub fn state(&self) -> DeploymentStatus {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<DeploymentStatus, String> {
        let new_state = match (self.state, &event) {
            (DeploymentStatus::Pending, DeploymentEvent::Build) => DeploymentStatus::Building,

            (DeploymentStatus::Building, DeploymentEvent::Activate) => DeploymentStatus::Active,
            (DeploymentStatus::Pending | DeploymentStatus::Building, DeploymentEvent::Fail(err)) => {
                self.error = Some(err.clone());
                DeploymentStatus::Failed
            }

            (DeploymentStatus::Active, DeploymentEvent::Supersede) => DeploymentStatus::Inactive,
            (DeploymentStatus::Inactive, DeploymentEvent::Restore) => DeploymentStatus::Active,

            (state, event) => {
                return Err(format!("Invalid transition: {} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply an event to a deployment record in place
pub fn advance(deployment: &mut Deployment, event: DeploymentEvent) -> Result<(), PlatformError> {
    let mut fsm = DeploymentFsm::from_status(deployment.status);
    let status = fsm.process(event).map_err(|e| {
        PlatformError::Conflict(format!("Deployment v{} ({}): {}", deployment.version, deployment.id, e))
    })?;

    deployment.status = status;
    if let Some(err) = fsm.error() {
        deployment.error_message = Some(err.to_string());
    }
    Ok(())
}
