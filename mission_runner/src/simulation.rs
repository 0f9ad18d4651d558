// simulation.rs - In-process session server standing in for the external engine
//
// Sessions are keyed by identifier. Role 0 creates one (after a configurable
// latency); other roles get `NotYetAvailable` until it exists. The session
// begins once every role in the scene has joined and ends on `quit` or time-up.

use maze_solver::{apply_command, Cell, Command, Grid, Heading, QUIT_COMMAND};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error_handling::JoinError;
use crate::scene::{spawn_for, SceneDescriptor};
use crate::session::{AgentRole, EndpointPool, Entity, Observation, SessionHost, SessionId, SessionStatus};

#[derive(Debug, Clone, Copy)]
struct Pose {
    cell: Cell,
    heading: Heading,
}

#[derive(Debug)]
struct SimSession {
    expected_roles: u32,
    /// False while the creator is still bringing the session up.
    available: bool,
    agents: HashMap<AgentRole, Pose>,
    begun_at: Option<Instant>,
    ended: bool,
}

impl SimSession {
    fn is_running(&mut self, time_limit: Option<Duration>) -> bool {
        if let (Some(begun), Some(limit)) = (self.begun_at, time_limit) {
            if !self.ended && begun.elapsed() >= limit {
                log::info!("Session time limit of {:?} reached", limit);
                self.ended = true;
            }
        }
        self.begun_at.is_some() && !self.ended
    }

    fn admit(&mut self, role: AgentRole, spawn: Pose) {
        self.agents.insert(role, spawn);
        if self.begun_at.is_none() && self.agents.len() as u32 >= self.expected_roles {
            log::info!("All {} roles joined, session begins", self.expected_roles);
            self.begun_at = Some(Instant::now());
        }
    }
}

/// Behaviour knobs of the simulated engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationOptions {
    /// How long the creating join call takes before the session is visible to others.
    pub creation_latency: Duration,
    pub time_limit: Option<Duration>,
}

struct ServerInner {
    grid: Grid,
    start: Cell,
    end: Cell,
    options: SimulationOptions,
    sessions: Mutex<HashMap<SessionId, SimSession>>,
}

/// Shared handle to the simulated engine; cheap to clone.
#[derive(Clone)]
pub struct LocalSessionServer {
    inner: Arc<ServerInner>,
}

impl LocalSessionServer {
    pub fn new(grid: Grid, start: Cell, end: Cell, options: SimulationOptions) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                grid,
                start,
                end,
                options,
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// A host bound to one role, for one coordinator.
    pub fn host(&self, role: AgentRole) -> SimulatedHost {
        SimulatedHost {
            server: self.clone(),
            role,
            session: OnceLock::new(),
        }
    }

    pub async fn agent_cell(&self, session: &SessionId, role: AgentRole) -> Option<Cell> {
        let sessions = self.inner.sessions.lock().await;
        sessions.get(session).and_then(|s| s.agents.get(&role)).map(|pose| pose.cell)
    }

    fn spawn(&self, role: AgentRole) -> Pose {
        let spawn = spawn_for(role, self.inner.start, self.inner.end);
        Pose { cell: spawn.cell, heading: spawn.heading }
    }

    async fn create(&self, scene: &SceneDescriptor, session: &SessionId) -> Result<(), JoinError> {
        {
            let mut sessions = self.inner.sessions.lock().await;
            if sessions.contains_key(session) {
                return Err(JoinError::Conflict(session.to_string()));
            }
            sessions.insert(
                session.clone(),
                SimSession {
                    expected_roles: scene.roles(),
                    available: false,
                    agents: HashMap::new(),
                    begun_at: None,
                    ended: false,
                },
            );
        }

        tokio::time::sleep(self.inner.options.creation_latency).await;

        let mut sessions = self.inner.sessions.lock().await;
        let entry = sessions
            .get_mut(session)
            .ok_or_else(|| JoinError::Transport(format!("session '{}' vanished during creation", session)))?;
        entry.available = true;
        entry.admit(AgentRole::CREATOR, self.spawn(AgentRole::CREATOR));
        log::info!("Session '{}' created", session);
        Ok(())
    }

    async fn attach(&self, role: AgentRole, session: &SessionId) -> Result<(), JoinError> {
        let mut sessions = self.inner.sessions.lock().await;
        match sessions.get_mut(session) {
            Some(entry) if entry.available => {
                if entry.agents.contains_key(&role) {
                    return Err(JoinError::Conflict(format!("{} (role {} already joined)", session, role)));
                }
                let spawn = self.spawn(role);
                entry.admit(role, spawn);
                Ok(())
            }
            _ => Err(JoinError::NotYetAvailable(session.to_string())),
        }
    }
}

/// One role's view of the simulated engine.
pub struct SimulatedHost {
    server: LocalSessionServer,
    role: AgentRole,
    session: OnceLock<SessionId>,
}

impl SimulatedHost {
    fn joined(&self) -> Result<&SessionId, String> {
        self.session.get().ok_or_else(|| format!("role {} has not joined a session", self.role))
    }
}

#[async_trait::async_trait]
impl SessionHost for SimulatedHost {
    async fn join(
        &self,
        scene: &SceneDescriptor,
        pool: &EndpointPool,
        role: AgentRole,
        session: &SessionId,
    ) -> Result<(), JoinError> {
        if pool.len() < scene.roles() as usize {
            return Err(JoinError::NoFreeClient);
        }
        if role.0 >= scene.roles() {
            return Err(JoinError::InvalidDescriptor(format!("no agent section for role {}", role)));
        }

        if role.is_creator() {
            self.server.create(scene, session).await?;
        } else {
            self.server.attach(role, session).await?;
        }
        // A second successful join on the same host keeps the first session
        let _ = self.session.set(session.clone());
        Ok(())
    }

    async fn status(&self) -> Result<SessionStatus, String> {
        let id = self.joined()?;
        let mut sessions = self.server.inner.sessions.lock().await;
        let session = sessions.get_mut(id).ok_or_else(|| format!("session '{}' is gone", id))?;
        Ok(SessionStatus {
            has_begun: session.begun_at.is_some(),
            is_running: session.is_running(self.server.inner.options.time_limit),
        })
    }

    async fn send_command(&self, command: &str) -> Result<(), String> {
        let id = self.joined()?;
        let mut sessions = self.server.inner.sessions.lock().await;
        let session = sessions.get_mut(id).ok_or_else(|| format!("session '{}' is gone", id))?;

        if !session.is_running(self.server.inner.options.time_limit) {
            log::debug!("Ignoring '{}' from role {}: session not running", command, self.role);
            return Ok(());
        }
        if command == QUIT_COMMAND {
            log::info!("Role {} ended session '{}'", self.role, id);
            session.ended = true;
            return Ok(());
        }

        let parsed = Command::from_token(command).ok_or_else(|| format!("unknown command '{}'", command))?;
        let pose = session
            .agents
            .get_mut(&self.role)
            .ok_or_else(|| format!("role {} has no agent in '{}'", self.role, id))?;
        let (cell, heading) = apply_command(pose.cell, pose.heading, parsed);
        if self.server.inner.grid.is_open(cell) {
            *pose = Pose { cell, heading };
        } else {
            log::debug!("Role {} bumped into the wall at {}", self.role, cell);
        }
        Ok(())
    }

    async fn observation(&self) -> Option<Observation> {
        let id = self.session.get()?;
        let sessions = self.server.inner.sessions.lock().await;
        let session = sessions.get(id)?;
        let pose = session.agents.get(&self.role)?;

        let entities = session
            .agents
            .iter()
            .filter(|(role, _)| **role != self.role)
            .map(|(role, other)| Entity {
                name: role.agent_name(),
                x: other.cell.x as f64 + 0.5,
                z: other.cell.z as f64 + 0.5,
            })
            .collect();

        Some(Observation {
            x: pose.cell.x as f64 + 0.5,
            z: pose.cell.z as f64 + 0.5,
            yaw: pose.heading.yaw() as f32,
            life: 20.0,
            entities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneBuilder;
    use crate::session::Endpoint;

    fn corridor() -> Grid {
        Grid::from_rows(&["#####", "#...#", "###.#", "#...#", "#####"]).unwrap()
    }

    fn setup(latency: Duration) -> (LocalSessionServer, SceneDescriptor, EndpointPool) {
        let grid = corridor();
        let (start, end) = (Cell::new(1, 1), Cell::new(3, 3));
        let scene = SceneBuilder::new(&grid, start, end).roles(2).build();
        let options = SimulationOptions { creation_latency: latency, time_limit: None };
        let server = LocalSessionServer::new(grid, start, end, options);
        let pool = EndpointPool::new([Endpoint::local(10000), Endpoint::local(10001)]);
        (server, scene, pool)
    }

    #[tokio::test(start_paused = true)]
    async fn test_joiner_waits_for_creator() {
        let (server, scene, pool) = setup(Duration::from_secs(1));
        let id = SessionId::new("race");
        let (creator, joiner) = (server.host(AgentRole(0)), server.host(AgentRole(1)));

        let early = joiner.join(&scene, &pool, AgentRole(1), &id).await;
        assert_eq!(early, Err(JoinError::NotYetAvailable("race".into())));

        creator.join(&scene, &pool, AgentRole(0), &id).await.unwrap();
        assert!(!creator.status().await.unwrap().has_begun);

        joiner.join(&scene, &pool, AgentRole(1), &id).await.unwrap();
        let status = joiner.status().await.unwrap();
        assert!(status.has_begun && status.is_running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_creator_conflicts() {
        let (server, scene, pool) = setup(Duration::from_secs(1));
        let id = SessionId::new("dup");
        let first = server.host(AgentRole(0));
        let second = server.host(AgentRole(0));

        let pending = {
            let (scene, pool, id) = (scene.clone(), pool.clone(), id.clone());
            tokio::spawn(async move { first.join(&scene, &pool, AgentRole(0), &id).await })
        };
        tokio::task::yield_now().await;

        let clash = second.join(&scene, &pool, AgentRole(0), &id).await;
        assert_eq!(clash, Err(JoinError::Conflict("dup".into())));
        assert_eq!(pending.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn test_small_pool_has_no_free_client() {
        let (server, scene, _) = setup(Duration::ZERO);
        let pool = EndpointPool::new([Endpoint::local(10000)]);
        let err = server.host(AgentRole(0)).join(&scene, &pool, AgentRole(0), &SessionId::new("x")).await;
        assert_eq!(err, Err(JoinError::NoFreeClient));
    }

    #[tokio::test]
    async fn test_walls_block_and_quit_ends() {
        let (server, scene, pool) = setup(Duration::ZERO);
        let id = SessionId::new("walk");
        let (a, b) = (server.host(AgentRole(0)), server.host(AgentRole(1)));
        a.join(&scene, &pool, AgentRole(0), &id).await.unwrap();
        b.join(&scene, &pool, AgentRole(1), &id).await.unwrap();

        // Facing +z from (1,1) is a wall
        a.send_command("move 1").await.unwrap();
        assert_eq!(server.agent_cell(&id, AgentRole(0)).await, Some(Cell::new(1, 1)));

        let path = [(1, 1), (2, 1), (3, 1), (3, 2), (3, 3)].map(Cell::from);
        for action in maze_solver::plan_actions(&path, Heading::South).unwrap() {
            a.send_command(action.command.token()).await.unwrap();
        }
        let obs = a.observation().await.unwrap();
        assert_eq!(obs.cell(), Cell::new(3, 3));
        assert_eq!(obs.entities.len(), 1);
        assert!(a.send_command("jump").await.is_err());

        a.send_command(QUIT_COMMAND).await.unwrap();
        assert!(!b.status().await.unwrap().is_running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_limit_ends_session() {
        let grid = corridor();
        let scene = SceneBuilder::new(&grid, Cell::new(1, 1), Cell::new(3, 3)).roles(1).build();
        let options = SimulationOptions { time_limit: Some(Duration::from_secs(10)), ..Default::default() };
        let server = LocalSessionServer::new(grid, Cell::new(1, 1), Cell::new(3, 3), options);
        let host = server.host(AgentRole(0));
        let pool = EndpointPool::new([Endpoint::local(10000)]);
        host.join(&scene, &pool, AgentRole(0), &SessionId::new("t")).await.unwrap();

        assert!(host.status().await.unwrap().is_running);
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(!host.status().await.unwrap().is_running);
    }
}
