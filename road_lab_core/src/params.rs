//! Simulation parameters.

use serde::{Deserialize, Serialize};

// === Field ===
/// Side length of the square obstacle field (cells)
pub const GRID_SIZE: usize = 40;
/// Attempts a single obstacle shape gets before it is skipped
pub const SHAPE_RETRIES: usize = 50;

// === Agents ===
pub const AGENT_COUNT: usize = 10;
/// Minimum manhattan distance between a randomized start and its goal
pub const MIN_SEPARATION: usize = 12;
/// Attempts for a random empty cell or a start/goal pair before giving up
pub const PLACEMENT_RETRIES: usize = 2000;
/// Positions kept in an agent's trail
pub const TRAIL_LENGTH: usize = 12;

// === Motion ===
/// Ticks an agent waits after every move attempt
pub const MOVE_COOLDOWN: u32 = 1;
/// Ticks an agent stalls after bumping into an undiscovered wall
pub const DISCOVERY_PAUSE: u32 = 1;

/// Runtime copy of the parameters above.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    pub grid_size: usize,
    pub agent_count: usize,
    pub move_cooldown: u32,
    pub discovery_pause: u32,
    pub min_separation: usize,
    pub trail_length: usize,
    pub shape_retries: usize,
    pub placement_retries: usize,
}

impl Default for LabConfig {
    fn default() -> Self {
        LabConfig {
            grid_size: GRID_SIZE,
            agent_count: AGENT_COUNT,
            move_cooldown: MOVE_COOLDOWN,
            discovery_pause: DISCOVERY_PAUSE,
            min_separation: MIN_SEPARATION,
            trail_length: TRAIL_LENGTH,
            shape_retries: SHAPE_RETRIES,
            placement_retries: PLACEMENT_RETRIES,
        }
    }
}
