// launcher.rs - Starts one coordinator per role against a shared session
//
// Role 0 starts first, the rest after a stagger. The stagger only saves retry
// attempts; joining order is tolerated by the coordinators' join loop.

use futures::future::join_all;
use maze_solver::Action;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::coordinator::{CoordinatorOutcome, CoordinatorReport, CoordinatorSettings, SessionCoordinator};
use crate::error_handling::MissionError;
use crate::position_feed::PositionBoard;
use crate::retry::sleep_or_cancel;
use crate::scene::SceneDescriptor;
use crate::session::{AgentRole, EndpointPool, SessionHost, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchSettings {
    pub roles: u32,
    pub stagger: Duration,
    pub coordinator: CoordinatorSettings,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            roles: 2,
            stagger: Duration::from_secs(5),
            coordinator: CoordinatorSettings::default(),
        }
    }
}

/// Every coordinator's report, in role order.
#[derive(Debug, Clone)]
pub struct LaunchReport {
    pub session: SessionId,
    pub reports: Vec<CoordinatorReport>,
}

impl LaunchReport {
    pub fn all_completed(&self) -> bool {
        self.reports.iter().all(|r| r.outcome == CoordinatorOutcome::Completed)
    }

    pub fn roles_with(&self, outcome: CoordinatorOutcome) -> Vec<AgentRole> {
        self.reports
            .iter()
            .filter(|r| r.outcome == outcome)
            .map(|r| r.role)
            .collect()
    }

    pub fn timed_out_roles(&self) -> Vec<AgentRole> {
        self.roles_with(CoordinatorOutcome::JoinTimeout)
    }
}

pub struct RendezvousLauncher<F> {
    session: SessionId,
    scene: SceneDescriptor,
    pool: EndpointPool,
    settings: LaunchSettings,
    host_factory: F,
    plans: HashMap<AgentRole, Vec<Action>>,
    board: Option<PositionBoard>,
    cancel: CancellationToken,
}

impl<F, H> RendezvousLauncher<F>
where
    F: Fn(AgentRole) -> H,
    H: SessionHost + 'static,
{
    /// Generates the session identifier every role will share.
    pub fn new(scene: SceneDescriptor, pool: EndpointPool, settings: LaunchSettings, host_factory: F) -> Self {
        Self {
            session: SessionId::generate(),
            scene,
            pool,
            settings,
            host_factory,
            plans: HashMap::new(),
            board: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Roles without a plan stay connected but idle.
    pub fn with_plan(mut self, role: AgentRole, actions: Vec<Action>) -> Self {
        self.plans.insert(role, actions);
        self
    }

    pub fn with_positions(mut self, board: PositionBoard) -> Self {
        self.board = Some(board);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn coordinator(&mut self, role: AgentRole) -> SessionCoordinator<H> {
        let mut coordinator = SessionCoordinator::new(
            role,
            (self.host_factory)(role),
            self.scene.clone(),
            self.pool.clone(),
            self.session.clone(),
            self.settings.coordinator,
        )
        .with_cancel(self.cancel.clone());

        if let Some(actions) = self.plans.remove(&role) {
            coordinator = coordinator.with_actions(actions);
        }
        if let Some(board) = &self.board {
            coordinator = coordinator.with_positions(board.clone());
        }
        coordinator
    }

    /// Run every role to termination. Never aborts a sibling because another failed.
    pub async fn launch(mut self) -> LaunchReport {
        log::info!(
            "Launching {} roles into session '{}' (stagger {:?})",
            self.settings.roles,
            self.session,
            self.settings.stagger
        );

        let mut handles = Vec::with_capacity(self.settings.roles as usize);
        for index in 0..self.settings.roles {
            let role = AgentRole(index);
            if index == 1 && !sleep_or_cancel(self.settings.stagger, &self.cancel).await {
                log::warn!("Cancelled during stagger; remaining roles will stop at once");
            }
            let coordinator = self.coordinator(role);
            handles.push((role, tokio::spawn(coordinator.run())));
        }

        let (roles, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let reports = join_all(tasks)
            .await
            .into_iter()
            .zip(roles)
            .map(|(joined, role)| {
                joined.unwrap_or_else(|e| {
                    log::error!("Coordinator task for role {} failed: {}", role, e);
                    CoordinatorReport::lost(role, &MissionError::TaskFailed { role })
                })
            })
            .collect();

        let report = LaunchReport { session: self.session, reports };
        let timed_out = report.timed_out_roles();
        if !timed_out.is_empty() {
            log::error!("Roles {:?} timed out joining session '{}'", timed_out, report.session);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::JoinError;
    use crate::retry::RetryPolicy;
    use crate::session::{Endpoint, Observation, SessionStatus};
    use async_trait::async_trait;
    use maze_solver::Cell;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    /// Records when each role first called join, and never lets anyone in.
    struct Locked {
        role: AgentRole,
        first_join: Arc<Mutex<HashMap<AgentRole, Instant>>>,
    }

    #[async_trait]
    impl SessionHost for Locked {
        async fn join(
            &self,
            _scene: &SceneDescriptor,
            _pool: &EndpointPool,
            _role: AgentRole,
            session: &SessionId,
        ) -> Result<(), JoinError> {
            self.first_join.lock().unwrap().entry(self.role).or_insert_with(Instant::now);
            Err(JoinError::NotYetAvailable(session.to_string()))
        }

        async fn status(&self) -> Result<SessionStatus, String> {
            Ok(SessionStatus::default())
        }

        async fn send_command(&self, _command: &str) -> Result<(), String> {
            Ok(())
        }

        async fn observation(&self) -> Option<Observation> {
            None
        }
    }

    fn settings() -> LaunchSettings {
        LaunchSettings {
            roles: 2,
            stagger: Duration::from_secs(2),
            coordinator: CoordinatorSettings {
                probe_timeout: None,
                join: RetryPolicy::bounded(Duration::from_millis(1500), Duration::from_secs(4)),
                ..CoordinatorSettings::default()
            },
        }
    }

    fn scene() -> SceneDescriptor {
        let grid = maze_solver::MazeGenerator::new(5).unwrap().generate_seeded(3);
        crate::scene::SceneBuilder::new(&grid, Cell::new(1, 1), Cell::new(3, 3)).build()
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_roles_report_and_timeouts_are_listed() {
        let first_join = Arc::new(Mutex::new(HashMap::new()));
        let seen = first_join.clone();
        let started = Instant::now();

        let pool = EndpointPool::new([Endpoint::local(10000), Endpoint::local(10001)]);
        let launcher = RendezvousLauncher::new(scene(), pool, settings(), move |role| Locked {
            role,
            first_join: seen.clone(),
        });
        let report = launcher.launch().await;

        assert_eq!(report.reports.len(), 2);
        assert_eq!(report.timed_out_roles(), vec![AgentRole(0), AgentRole(1)]);
        assert!(!report.all_completed());

        let first_join = first_join.lock().unwrap();
        assert_eq!(first_join[&AgentRole(0)] - started, Duration::ZERO);
        assert_eq!(first_join[&AgentRole(1)] - started, Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_reaches_every_role() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let pool = EndpointPool::new([Endpoint::local(10000), Endpoint::local(10001)]);
        let first_join = Arc::new(Mutex::new(HashMap::new()));
        let report = RendezvousLauncher::new(scene(), pool, settings(), move |role| Locked {
            role,
            first_join: first_join.clone(),
        })
        .with_cancel(cancel)
        .launch()
        .await;

        assert_eq!(report.roles_with(CoordinatorOutcome::Cancelled), vec![AgentRole(0), AgentRole(1)]);
    }

    #[test]
    fn test_sessions_are_fresh_per_launcher() {
        let pool = EndpointPool::new([Endpoint::local(10000)]);
        let make = |_: AgentRole| Locked {
            role: AgentRole(0),
            first_join: Arc::new(Mutex::new(HashMap::new())),
        };
        let a = RendezvousLauncher::new(scene(), pool.clone(), settings(), make);
        let b = RendezvousLauncher::new(scene(), pool, settings(), make);
        assert_ne!(a.session(), b.session());
    }
}
