// session.rs - Shared session identity and the seam to the external agent host

use async_trait::async_trait;
use maze_solver::Cell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error_handling::JoinError;
use crate::scene::SceneDescriptor;

/// Opaque identifier every role passes to its join call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Arc<str>);

impl SessionId {
    pub fn new(raw: impl Into<Arc<str>>) -> Self {
        Self(raw.into())
    }

    /// Time-based identifier with a short random suffix.
    pub fn generate() -> Self {
        let stamp = chrono::Utc::now().timestamp();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self::new(format!("shared_mission_{}_{}", stamp, &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of an agent in the shared session. Role 0 creates, the rest join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentRole(pub u32);

impl AgentRole {
    pub const CREATOR: AgentRole = AgentRole(0);

    pub fn is_creator(self) -> bool {
        self.0 == 0
    }

    /// Display name used in logs and scene sections: AgentA, AgentB, ...
    pub fn agent_name(self) -> String {
        match char::from_u32('A' as u32 + self.0) {
            Some(c) if self.0 < 26 => format!("Agent{c}"),
            _ => format!("Agent{}", self.0),
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One independently started server process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port }
    }

    pub fn local(port: u16) -> Self {
        Self::new("127.0.0.1", port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Ordered, read-only set of endpoints shared by every coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPool(Arc<[Endpoint]>);

impl EndpointPool {
    /// Duplicates are dropped, first occurrence wins.
    pub fn new(endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        let mut unique: Vec<Endpoint> = Vec::new();
        for endpoint in endpoints {
            if !unique.contains(&endpoint) {
                unique.push(endpoint);
            }
        }
        Self(unique.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.0.iter()
    }
}

/// Polled session flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub has_begun: bool,
    pub is_running: bool,
}

/// Entity near the agent, as reported by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    pub x: f64,
    pub z: f64,
}

/// Latest structured snapshot of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    #[serde(rename = "XPos")]
    pub x: f64,
    #[serde(rename = "ZPos")]
    pub z: f64,
    #[serde(rename = "Yaw")]
    pub yaw: f32,
    #[serde(rename = "Life", default)]
    pub life: f32,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl Observation {
    /// Grid cell containing the agent.
    pub fn cell(&self) -> Cell {
        Cell::new(self.x.floor() as i32, self.z.floor() as i32)
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// The external agent host: one instance per coordinator.
///
/// All calls are polled; nothing is pushed back to the caller.
#[async_trait]
pub trait SessionHost: Send + Sync {
    /// Ask to join `session` under `role`. Every role must pass the same identifier.
    async fn join(
        &self,
        scene: &SceneDescriptor,
        pool: &EndpointPool,
        role: AgentRole,
        session: &SessionId,
    ) -> Result<(), JoinError>;

    async fn status(&self) -> Result<SessionStatus, String>;

    /// Fire-and-forget; success only means the command was handed over.
    async fn send_command(&self, command: &str) -> Result<(), String>;

    /// `None` until the engine has produced an observation.
    async fn observation(&self) -> Option<Observation>;
}
