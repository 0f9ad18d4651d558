// error_handling.rs - Error taxonomy for session coordination

use thiserror::Error;

use crate::session::AgentRole;

#[derive(Error, Debug)]
pub enum MissionError {
    #[error("Invalid maze configuration: {0}")]
    Maze(#[from] maze_solver::MazeError),

    #[error("Could not plan route: {0}")]
    Plan(#[from] maze_solver::PlanError),

    #[error("No route from {from} to {to} in the generated maze")]
    NoRoute {
        from: maze_solver::Cell,
        to: maze_solver::Cell,
    },

    #[error("Join failed: {0}")]
    Join(#[from] JoinError),

    #[error("Role {role} gave up joining after {elapsed:?}")]
    JoinTimeout {
        role: AgentRole,
        elapsed: std::time::Duration,
    },

    #[error("Status query failed: {0}")]
    Status(String),

    #[error("Session stopped running after {sent} of {total} commands")]
    SessionStopped { sent: usize, total: usize },

    #[error("Session ended without ever beginning")]
    NeverBegan,

    #[error("Command '{command}' could not be sent: {reason}")]
    CommandSend { command: String, reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Configuration I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cancelled")]
    Cancelled,

    #[error("Coordinator task for role {role} panicked or was aborted")]
    TaskFailed { role: AgentRole },
}

pub type Result<T> = std::result::Result<T, MissionError>;

/// Failure of one join attempt, split by whether retrying can help.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JoinError {
    /// The creating role has not brought the session up yet.
    #[error("Session '{0}' is not available yet")]
    NotYetAvailable(String),

    #[error("No free client in the endpoint pool")]
    NoFreeClient,

    #[error("Transport error: {0}")]
    Transport(String),

    /// Another creator already owns this session identifier.
    #[error("Session '{0}' already has a creator")]
    Conflict(String),

    #[error("Scene descriptor rejected: {0}")]
    InvalidDescriptor(String),
}

impl JoinError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            JoinError::NotYetAvailable(_) | JoinError::NoFreeClient | JoinError::Transport(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_split() {
        assert!(JoinError::NotYetAvailable("m".into()).is_retriable());
        assert!(JoinError::NoFreeClient.is_retriable());
        assert!(JoinError::Transport("reset".into()).is_retriable());
        assert!(!JoinError::Conflict("m".into()).is_retriable());
        assert!(!JoinError::InvalidDescriptor("bad".into()).is_retriable());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = MissionError::JoinTimeout {
            role: AgentRole(1),
            elapsed: std::time::Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "Role 1 gave up joining after 2s");
    }
}
