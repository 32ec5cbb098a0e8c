//! Who knows which walls.
//!
//! The only difference between the two modes lives here: which set of
//! discovered walls the planner and the local explorer consult.

use std::{collections::HashSet, fmt};

use serde::{Deserialize, Serialize};

use crate::{Position, agent::Agent};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Each agent only knows the walls it bumped into itself.
    #[default]
    Uncoordinated,
    /// Every discovery is shared with all agents at once.
    Coordinated,
}

impl Mode {
    pub const ALL: [Mode; 2] = [Mode::Uncoordinated, Mode::Coordinated];
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Uncoordinated => f.write_str("uncoordinated"),
            Mode::Coordinated => f.write_str("coordinated"),
        }
    }
}

/// What sharing a discovery did to the shared set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sharing {
    /// The wall was new to everyone.
    Fresh,
    /// Someone had already reported it.
    Redundant,
}

/// The shared discovered-wall set. Private sets live on each [`Agent`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeStore {
    shared: HashSet<Position>,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The set `agent` plans against under `mode`.
    pub fn known_for<'a>(&'a self, mode: Mode, agent: &'a Agent) -> &'a HashSet<Position> {
        match mode {
            Mode::Uncoordinated => &agent.known,
            Mode::Coordinated => &self.shared,
        }
    }

    /// Returns `true` if `agent` already knows `pos` is a wall under `mode`.
    pub fn is_known_blocked(&self, mode: Mode, agent: &Agent, pos: Position) -> bool {
        self.known_for(mode, agent).contains(&pos)
    }

    /// Adds a discovery to the shared set.
    pub fn share(&mut self, pos: Position) -> Sharing {
        if self.shared.insert(pos) {
            Sharing::Fresh
        } else {
            Sharing::Redundant
        }
    }

    /// Whether a wall counts as discovered for display: in the shared set
    /// when coordinated, in any agent's private set otherwise.
    pub fn is_discovered(&self, mode: Mode, agents: &[Agent], pos: Position) -> bool {
        match mode {
            Mode::Coordinated => self.shared.contains(&pos),
            Mode::Uncoordinated => agents.iter().any(|agent| agent.known.contains(&pos)),
        }
    }

    pub fn shared(&self) -> &HashSet<Position> {
        &self.shared
    }

    pub fn clear(&mut self) {
        self.shared.clear();
    }
}
