// position_feed.rs - Latest agent positions, one watch slot per role
//
// Each coordinator is the only writer of its own slot. Readers (the HTTP feed,
// tests, the final summary) take snapshots or subscribe; writers never wait on them.

use chrono::{DateTime, Utc};
use maze_solver::Cell;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

use crate::session::{AgentRole, Observation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub role: AgentRole,
    pub agent: String,
    pub cell: Cell,
    /// Reported yaw; absent when the position comes from the plan rather than the engine.
    pub yaw: Option<f32>,
    pub updated_at: DateTime<Utc>,
}

impl PositionSnapshot {
    pub fn planned(role: AgentRole, cell: Cell) -> Self {
        Self {
            role,
            agent: role.agent_name(),
            cell,
            yaw: None,
            updated_at: Utc::now(),
        }
    }

    pub fn observed(role: AgentRole, observation: &Observation) -> Self {
        Self {
            role,
            agent: role.agent_name(),
            cell: observation.cell(),
            yaw: Some(observation.yaw),
            updated_at: Utc::now(),
        }
    }
}

type Slot = watch::Sender<Option<PositionSnapshot>>;

#[derive(Debug, Clone)]
pub struct PositionBoard {
    slots: Arc<[Slot]>,
}

impl PositionBoard {
    pub fn new(roles: u32) -> Self {
        let slots: Vec<Slot> = (0..roles).map(|_| watch::channel(None).0).collect();
        Self { slots: slots.into() }
    }

    pub fn roles(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Replace the role's snapshot. Returns false for a role the board does not track.
    pub fn publish(&self, snapshot: PositionSnapshot) -> bool {
        match self.slots.get(snapshot.role.0 as usize) {
            Some(slot) => {
                slot.send_replace(Some(snapshot));
                true
            }
            None => {
                log::warn!("Dropping position for untracked role {}", snapshot.role);
                false
            }
        }
    }

    pub fn latest(&self, role: AgentRole) -> Option<PositionSnapshot> {
        self.slots.get(role.0 as usize).and_then(|slot| slot.borrow().clone())
    }

    /// Every role that has published at least once, in role order.
    pub fn snapshot(&self) -> Vec<PositionSnapshot> {
        self.slots.iter().filter_map(|slot| slot.borrow().clone()).collect()
    }

    pub fn subscribe(&self, role: AgentRole) -> Option<watch::Receiver<Option<PositionSnapshot>>> {
        self.slots.get(role.0 as usize).map(|slot| slot.subscribe())
    }

    pub fn subscribe_all(&self) -> Vec<watch::Receiver<Option<PositionSnapshot>>> {
        self.slots.iter().map(|slot| slot.subscribe()).collect()
    }
}
