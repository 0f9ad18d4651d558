// coordinator.rs - Per-role session state machine
//
// probing -> joining -> awaiting-begin -> active -> awaiting-end -> terminated.
// Every blocking wait goes through the retry module and honours the cancel token.

use maze_solver::{Action, QUIT_COMMAND};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error_handling::{JoinError, MissionError};
use crate::position_feed::{PositionBoard, PositionSnapshot};
use crate::probe;
use crate::retry::{poll_until, retry_until_deadline, sleep_or_cancel, PollOutcome, RetryError, RetryPolicy};
use crate::scene::SceneDescriptor;
use crate::session::{AgentRole, EndpointPool, SessionHost, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoordinatorOutcome {
    Completed,
    JoinTimeout,
    AbortedError,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoordinatorState {
    Probing,
    Joining,
    AwaitingBegin,
    Active,
    AwaitingEnd,
    Terminated(CoordinatorOutcome),
}

/// Timing knobs for one coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Probe every endpoint with this timeout before joining; `None` skips probing.
    pub probe_timeout: Option<Duration>,
    pub join: RetryPolicy,
    /// Exceeding this deadline is only a warning.
    pub begin: RetryPolicy,
    pub end: RetryPolicy,
    /// Minimum gap between two commands.
    pub command_pacing: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            probe_timeout: None,
            join: RetryPolicy::bounded(Duration::from_millis(1500), Duration::from_secs(60)),
            begin: RetryPolicy::bounded(Duration::from_millis(200), Duration::from_secs(60)),
            end: RetryPolicy::unbounded(Duration::from_millis(500)),
            command_pacing: Duration::from_millis(200),
        }
    }
}

/// What a coordinator hands back once it has terminated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatorReport {
    pub role: AgentRole,
    pub outcome: CoordinatorOutcome,
    /// Every state entered, in order, ending with `Terminated`.
    pub states: Vec<CoordinatorState>,
    pub join_attempts: u32,
    pub commands_sent: usize,
    pub elapsed: Duration,
    /// Last error message for non-completed outcomes.
    pub error: Option<String>,
}

impl CoordinatorReport {
    /// Report for a coordinator task that never returned.
    pub fn lost(role: AgentRole, error: &MissionError) -> Self {
        Self {
            role,
            outcome: CoordinatorOutcome::AbortedError,
            states: vec![CoordinatorState::Terminated(CoordinatorOutcome::AbortedError)],
            join_attempts: 0,
            commands_sent: 0,
            elapsed: Duration::ZERO,
            error: Some(error.to_string()),
        }
    }

    pub fn reached(&self, state: CoordinatorState) -> bool {
        self.states.contains(&state)
    }
}

/// How the active phase ended when nothing went wrong.
enum ActiveEnd {
    Exhausted,
    /// The session ended right after the last command.
    Delivered,
    Idle,
}

pub struct SessionCoordinator<H: SessionHost> {
    role: AgentRole,
    label: String,
    host: H,
    scene: SceneDescriptor,
    pool: EndpointPool,
    session: SessionId,
    settings: CoordinatorSettings,
    actions: Option<Vec<Action>>,
    board: Option<PositionBoard>,
    cancel: CancellationToken,

    states: Vec<CoordinatorState>,
    join_attempts: u32,
    commands_sent: usize,
    /// Set once any status poll reports `has_begun`.
    began: bool,
    error: Option<String>,
}

impl<H: SessionHost> SessionCoordinator<H> {
    pub fn new(
        role: AgentRole,
        host: H,
        scene: SceneDescriptor,
        pool: EndpointPool,
        session: SessionId,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            role,
            label: format!("[{} role={}]", role.agent_name(), role),
            host,
            scene,
            pool,
            session,
            settings,
            actions: None,
            board: None,
            cancel: CancellationToken::new(),
            states: Vec::new(),
            join_attempts: 0,
            commands_sent: 0,
            began: false,
            error: None,
        }
    }

    /// Give this role a command stream. Without one it stays connected but idle.
    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = Some(actions);
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

    /// Drive the state machine to `Terminated`.
    pub async fn run(mut self) -> CoordinatorReport {
        let started = Instant::now();
        let outcome = match self.drive().await {
            Ok(()) => CoordinatorOutcome::Completed,
            Err(outcome) => outcome,
        };
        self.enter(CoordinatorState::Terminated(outcome));

        let elapsed = started.elapsed();
        match outcome {
            CoordinatorOutcome::Completed => {
                log::info!("{} Completed after {:?}, {} commands sent", self.label, elapsed, self.commands_sent)
            }
            _ => log::warn!(
                "{} Terminated with {:?} after {:?}: {}",
                self.label,
                outcome,
                elapsed,
                self.error.as_deref().unwrap_or("no error recorded")
            ),
        }

        CoordinatorReport {
            role: self.role,
            outcome,
            states: self.states,
            join_attempts: self.join_attempts,
            commands_sent: self.commands_sent,
            elapsed,
            error: self.error,
        }
    }

    async fn drive(&mut self) -> Result<(), CoordinatorOutcome> {
        if let Some(limit) = self.settings.probe_timeout {
            self.enter(CoordinatorState::Probing);
            probe::check_pool(&self.pool, limit).await;
        }

        self.enter(CoordinatorState::Joining);
        self.join().await?;

        self.enter(CoordinatorState::AwaitingBegin);
        self.await_begin().await?;

        self.enter(CoordinatorState::Active);
        match self.run_active().await? {
            ActiveEnd::Exhausted => log::info!("{} Command stream exhausted, quit sent", self.label),
            ActiveEnd::Delivered => log::info!("{} Session ended after the last command", self.label),
            ActiveEnd::Idle => log::info!("{} No command stream, staying connected", self.label),
        }

        self.enter(CoordinatorState::AwaitingEnd);
        self.await_end().await
    }

    fn enter(&mut self, next: CoordinatorState) {
        match self.states.last() {
            Some(prev) => log::info!("{} {:?} -> {:?}", self.label, prev, next),
            None => log::info!("{} -> {:?}", self.label, next),
        }
        self.states.push(next);
    }

    fn fail(&mut self, outcome: CoordinatorOutcome, error: impl ToString) -> CoordinatorOutcome {
        self.error = Some(error.to_string());
        outcome
    }

    async fn join(&mut self) -> Result<(), CoordinatorOutcome> {
        let (host, scene, pool, session, role, label) =
            (&self.host, &self.scene, &self.pool, &self.session, self.role, &self.label);
        log::info!("{} Joining session '{}' across {} endpoints", label, session, pool.len());

        let result = retry_until_deadline(
            self.settings.join,
            &self.cancel,
            move |attempt| {
                log::debug!("{} Join attempt {}", label, attempt);
                host.join(scene, pool, role, session)
            },
            JoinError::is_retriable,
        )
        .await;

        match result {
            Ok(done) => {
                self.join_attempts = done.attempts;
                log::info!("{} Joined after {} attempts ({:?})", self.label, done.attempts, done.elapsed);
                Ok(())
            }
            Err(RetryError::DeadlineExceeded { last, attempts, elapsed }) => {
                self.join_attempts = attempts;
                let err = MissionError::JoinTimeout { role, elapsed };
                log::error!("{} {} (last error: {})", self.label, err, last);
                Err(self.fail(CoordinatorOutcome::JoinTimeout, err))
            }
            Err(RetryError::Fatal { error, attempts }) => {
                self.join_attempts = attempts;
                log::error!("{} Join failed on attempt {}: {}", self.label, attempts, error);
                Err(self.fail(CoordinatorOutcome::AbortedError, MissionError::Join(error)))
            }
            Err(RetryError::Cancelled) => Err(self.fail(CoordinatorOutcome::Cancelled, MissionError::Cancelled)),
        }
    }

    async fn await_begin(&mut self) -> Result<(), CoordinatorOutcome> {
        let host = &self.host;
        let polled = poll_until(self.settings.begin, &self.cancel, move || async move {
            host.status().await.map(|status| status.has_begun)
        })
        .await;

        match polled {
            Ok(PollOutcome::Satisfied { polls, elapsed }) => {
                log::info!("{} Session began after {} polls ({:?})", self.label, polls, elapsed);
                self.began = true;
                Ok(())
            }
            Ok(PollOutcome::DeadlineExceeded { elapsed, .. }) => {
                log::warn!("{} Session has not begun after {:?}; proceeding anyway", self.label, elapsed);
                Ok(())
            }
            Ok(PollOutcome::Cancelled) => Err(self.fail(CoordinatorOutcome::Cancelled, MissionError::Cancelled)),
            Err(reason) => {
                log::error!("{} Status query failed while waiting to begin: {}", self.label, reason);
                Err(self.fail(CoordinatorOutcome::AbortedError, MissionError::Status(reason)))
            }
        }
    }

    async fn run_active(&mut self) -> Result<ActiveEnd, CoordinatorOutcome> {
        let Some(actions) = self.actions.take() else {
            return Ok(ActiveEnd::Idle);
        };
        log::info!("{} Sending {} commands", self.label, actions.len());

        for (index, action) in actions.iter().enumerate() {
            let token = action.command.token();
            if let Err(reason) = self.host.send_command(token).await {
                let err = MissionError::CommandSend { command: token.to_string(), reason };
                return Err(self.fail(CoordinatorOutcome::AbortedError, err));
            }
            self.commands_sent += 1;
            log::debug!("{} Sent '{}' towards {}", self.label, token, action.target);
            self.publish_position(action).await;

            if !sleep_or_cancel(self.settings.command_pacing, &self.cancel).await {
                return Err(self.fail(CoordinatorOutcome::Cancelled, MissionError::Cancelled));
            }

            match self.host.status().await {
                Ok(status) if status.is_running => self.began |= status.has_begun,
                Ok(status) => {
                    self.began |= status.has_begun;
                    if self.began && index + 1 == actions.len() {
                        return Ok(ActiveEnd::Delivered);
                    }
                    log::error!(
                        "{} Session stopped running; {} commands not sent",
                        self.label,
                        actions.len() - index - 1
                    );
                    let err = if self.began {
                        MissionError::SessionStopped { sent: self.commands_sent, total: actions.len() }
                    } else {
                        MissionError::NeverBegan
                    };
                    return Err(self.fail(CoordinatorOutcome::AbortedError, err));
                }
                Err(reason) => {
                    log::error!("{} Lost the session mid-run: {}", self.label, reason);
                    return Err(self.fail(CoordinatorOutcome::AbortedError, MissionError::Status(reason)));
                }
            }
        }

        if let Err(reason) = self.host.send_command(QUIT_COMMAND).await {
            let err = MissionError::CommandSend { command: QUIT_COMMAND.to_string(), reason };
            return Err(self.fail(CoordinatorOutcome::AbortedError, err));
        }
        self.commands_sent += 1;
        Ok(ActiveEnd::Exhausted)
    }

    async fn publish_position(&self, action: &Action) {
        let Some(board) = &self.board else {
            return;
        };
        let snapshot = match self.host.observation().await {
            Some(observation) => PositionSnapshot::observed(self.role, &observation),
            None => PositionSnapshot::planned(self.role, action.target),
        };
        board.publish(snapshot);
    }

    async fn await_end(&mut self) -> Result<(), CoordinatorOutcome> {
        let seen = AtomicBool::new(self.began);
        let (host, seen) = (&self.host, &seen);
        let polled = poll_until(self.settings.end, &self.cancel, move || async move {
            host.status().await.map(|status| {
                if status.has_begun {
                    seen.store(true, Ordering::Relaxed);
                }
                !status.is_running
            })
        })
        .await;
        self.began = seen.load(Ordering::Relaxed);

        match polled {
            Ok(PollOutcome::Satisfied { .. }) if !self.began => {
                Err(self.fail(CoordinatorOutcome::AbortedError, MissionError::NeverBegan))
            }
            Ok(PollOutcome::Satisfied { elapsed, .. }) => {
                log::info!("{} Session ended ({:?} after leaving active)", self.label, elapsed);
                Ok(())
            }
            Ok(PollOutcome::DeadlineExceeded { elapsed, .. }) => Err(self.fail(
                CoordinatorOutcome::AbortedError,
                format!("session still running {:?} after this role finished", elapsed),
            )),
            Ok(PollOutcome::Cancelled) => Err(self.fail(CoordinatorOutcome::Cancelled, MissionError::Cancelled)),
            Err(reason) => Err(self.fail(CoordinatorOutcome::AbortedError, MissionError::Status(reason))),
        }
    }
}
