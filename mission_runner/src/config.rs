// config.rs - Runner configuration: defaults, JSON file, validation

use serde::{Deserialize, Serialize};
use maze_solver::MazeGenerator;
use std::path::Path;
use std::time::Duration;

use crate::coordinator::CoordinatorSettings;
use crate::error_handling::{MissionError, Result};
use crate::launcher::LaunchSettings;
use crate::retry::RetryPolicy;
use crate::session::{AgentRole, Endpoint, EndpointPool};
use crate::simulation::SimulationOptions;

/// Every externally supplied constant. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    pub endpoints: Vec<Endpoint>,
    pub roles: u32,
    pub join_deadline_ms: u64,
    pub join_interval_ms: u64,
    pub begin_deadline_ms: u64,
    pub begin_poll_ms: u64,
    pub end_poll_ms: u64,
    pub stagger_ms: u64,
    pub command_pacing_ms: u64,
    /// TCP-probe every endpoint before joining. Off by default because the
    /// built-in simulator joins in-process and nothing listens on these ports.
    pub probe_endpoints: bool,
    pub probe_timeout_ms: u64,
    pub maze_size: usize,
    pub seed: Option<u64>,
    /// Roles that walk the solved path; the rest stay idle until the session ends.
    pub navigating_roles: Vec<u32>,
    pub time_limit_ms: Option<u64>,
    /// Delay the simulated engine adds to the creating join call.
    pub creation_latency_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![Endpoint::local(10000), Endpoint::local(10001)],
            roles: 2,
            join_deadline_ms: 60_000,
            join_interval_ms: 1_500,
            begin_deadline_ms: 60_000,
            begin_poll_ms: 200,
            end_poll_ms: 500,
            stagger_ms: 5_000,
            command_pacing_ms: 200,
            probe_endpoints: false,
            probe_timeout_ms: 500,
            maze_size: 21,
            seed: None,
            navigating_roles: vec![0],
            time_limit_ms: None,
            creation_latency_ms: 2_000,
        }
    }
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

impl RunnerConfig {
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await?;
        let config: RunnerConfig = serde_json::from_str(&text)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| -> Result<()> { Err(MissionError::InvalidConfig { reason }) };

        if self.roles == 0 {
            return invalid("at least one role is required".into());
        }
        if self.endpoints.is_empty() {
            return invalid("endpoint list is empty".into());
        }
        if self.maze_size < maze_solver::MIN_MAZE_SIZE || self.maze_size % 2 == 0 {
            return invalid(format!("maze_size must be odd and at least 5, got {}", self.maze_size));
        }
        for (name, value) in [
            ("join_interval_ms", self.join_interval_ms),
            ("begin_poll_ms", self.begin_poll_ms),
            ("end_poll_ms", self.end_poll_ms),
        ] {
            if value == 0 {
                return invalid(format!("{name} must be positive"));
            }
        }
        if let Some(role) = self.navigating_roles.iter().find(|r| **r >= self.roles) {
            return invalid(format!("navigating role {} is outside 0..{}", role, self.roles));
        }
        Ok(())
    }

    /// Clamps instead of overflowing on absurdly large values.
    pub fn set_join_deadline_secs(&mut self, secs: u64) {
        self.join_deadline_ms = secs.saturating_mul(1000);
    }

    pub fn generator(&self) -> Result<MazeGenerator> {
        Ok(MazeGenerator::new(self.maze_size)?)
    }

    pub fn endpoint_pool(&self) -> EndpointPool {
        EndpointPool::new(self.endpoints.iter().cloned())
    }

    pub fn navigating(&self) -> impl Iterator<Item = AgentRole> + '_ {
        self.navigating_roles.iter().map(|&r| AgentRole(r))
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_ms.map(ms)
    }

    pub fn coordinator_settings(&self) -> CoordinatorSettings {
        CoordinatorSettings {
            probe_timeout: self.probe_endpoints.then(|| ms(self.probe_timeout_ms)),
            join: RetryPolicy::bounded(ms(self.join_interval_ms), ms(self.join_deadline_ms)),
            begin: RetryPolicy::bounded(ms(self.begin_poll_ms), ms(self.begin_deadline_ms)),
            end: RetryPolicy::unbounded(ms(self.end_poll_ms)),
            command_pacing: ms(self.command_pacing_ms),
        }
    }

    pub fn launch_settings(&self) -> LaunchSettings {
        LaunchSettings {
            roles: self.roles,
            stagger: ms(self.stagger_ms),
            coordinator: self.coordinator_settings(),
        }
    }

    pub fn simulation_options(&self) -> SimulationOptions {
        SimulationOptions {
            creation_latency: ms(self.creation_latency_ms),
            time_limit: self.time_limit(),
        }
    }
}
