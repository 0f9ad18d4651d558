// lib.rs - Library exports for mission-runner
// Two agents rendezvous in one shared session and one of them walks the solved maze

pub mod config;
pub mod coordinator;
pub mod error_handling;
pub mod http_server;
pub mod launcher;
pub mod position_feed;
pub mod probe;
pub mod retry;
pub mod scene;
pub mod session;
pub mod simulation;

// Re-export commonly used types
pub use config::RunnerConfig;
pub use coordinator::{CoordinatorOutcome, CoordinatorReport, CoordinatorSettings, CoordinatorState, SessionCoordinator};
pub use error_handling::{JoinError, MissionError, Result};
pub use launcher::{LaunchReport, LaunchSettings, RendezvousLauncher};
pub use position_feed::{PositionBoard, PositionSnapshot};
pub use retry::{poll_until, retry_until_deadline, PollOutcome, RetryError, RetryPolicy};
pub use scene::{plan_for_role, spawn_for, SceneBuilder, SceneDescriptor, Spawn};
pub use session::{AgentRole, Endpoint, EndpointPool, Observation, SessionHost, SessionId, SessionStatus};
pub use simulation::{LocalSessionServer, SimulatedHost, SimulationOptions};
