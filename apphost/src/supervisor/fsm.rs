//! Finite state machine for a supervised process

use serde::{Deserialize, Serialize};

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    /// No process
    Stopped,

    /// Spawn in progress
    Starting,

    /// Process alive
    Running,

    /// Termination requested, waiting for exit
    Stopping,

    /// Exited without being asked to
    Crashed,
}

/// Process event
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// Start requested
    Start,

    /// Child spawned successfully
    Spawned,

    /// Child could not be spawned
    SpawnFailed(String),

    /// Stop requested
    Stop,

    /// Child exited
    Exited(Option<i32>),
}

/// Process FSM
#[derive(Debug, Clone)]
pub struct ProcessFsm {
    state: ProcessState,
    error: Option<String>,
    exit_code: Option<i32>,
}

impl ProcessFsm {
    /// Create a new FSM in stopped state
    pub fn new() -> Self {
        Self {
            state: ProcessState::Stopped,
            error: None,
            exit_code: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Spawn error, if the last start failed
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Exit code of the last exit, if any
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: ProcessEvent) -> Result<ProcessState, String> {
        let new_state = match (self.state, &event) {
            (ProcessState::Stopped | ProcessState::Crashed, ProcessEvent::Start) => {
                self.error = None;
                self.exit_code = None;
                ProcessState::Starting
            }

            (ProcessState::Starting, ProcessEvent::Spawned) => ProcessState::Running,
            (ProcessState::Starting, ProcessEvent::SpawnFailed(err)) => {
                self.error = Some(err.clone());
                ProcessState::Stopped
            }

            (ProcessState::Running, ProcessEvent::Stop) => ProcessState::Stopping,
            (ProcessState::Running, ProcessEvent::Exited(code)) => {
                self.exit_code = *code;
                ProcessState::Crashed
            }

            // The process may exit on its own while a stop is pending; either
            // way the exit was requested.
            (ProcessState::Stopping, ProcessEvent::Exited(code)) => {
                self.exit_code = *code;
                ProcessState::Stopped
            }

            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for ProcessFsm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fsm_stop_flow() {
        let mut fsm = ProcessFsm::new();
        assert_eq!(fsm.state(), ProcessState::Stopped);

        fsm.process(ProcessEvent::Start).unwrap();
        assert_eq!(fsm.state(), ProcessState::Starting);

        fsm.process(ProcessEvent::Spawned).unwrap();
        assert_eq!(fsm.state(), ProcessState::Running);

        fsm.process(ProcessEvent::Stop).unwrap();
        assert_eq!(fsm.state(), ProcessState::Stopping);

        fsm.process(ProcessEvent::Exited(Some(0))).unwrap();
        assert_eq!(fsm.state(), ProcessState::Stopped);
    }

    #[test]
    fn test_fsm_unexpected_exit_is_crash() {
        let mut fsm = ProcessFsm::new();
        fsm.process(ProcessEvent::Start).unwrap();
        fsm.process(ProcessEvent::Spawned).unwrap();

        fsm.process(ProcessEvent::Exited(Some(1))).unwrap();
        assert_eq!(fsm.state(), ProcessState::Crashed);
        assert_eq!(fsm.exit_code(), Some(1));

        // A crashed process can be started again
        fsm.process(ProcessEvent::Start).unwrap();
        assert_eq!(fsm.exit_code(), None);
    }

    #[test]
    fn test_fsm_spawn_failure() {
        let mut fsm = ProcessFsm::new();
        fsm.process(ProcessEvent::Start).unwrap();
        fsm.process(ProcessEvent::SpawnFailed("no such file".to_string()))
            .unwrap();

        assert_eq!(fsm.state(), ProcessState::Stopped);
        assert_eq!(fsm.error(), Some("no such file"));
    }

    #[test]
    fn test_fsm_invalid_transition() {
        let mut fsm = ProcessFsm::new();
        assert!(fsm.process(ProcessEvent::Stop).is_err());
        assert!(fsm.process(ProcessEvent::Spawned).is_err());
    }
}
