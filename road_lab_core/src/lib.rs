use serde::{Deserialize, Serialize};

pub mod agent;
pub mod environment;
pub mod knowledge;
pub mod layout;
pub mod map;
pub mod metrics;
pub mod params;
pub mod planner;

pub use environment::{CellView, Lab, LabError, TickResult};
pub use knowledge::Mode;
pub use layout::{GenerationError, Layout};
pub use params::LabConfig;

/// Unique identifier for agents.
pub type EntityId = usize;

/// Represents a 2D coordinate: `x` is the column, `y` the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: usize,
    pub y: usize,
}

impl Position {
    pub const fn new(x: usize, y: usize) -> Self {
        Position { x, y }
    }

    /// Returns the manhattan distance between two positions.
    pub fn manhattan(&self, other: &Position) -> usize {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Returns the position shifted by `(dx, dy)`, or `None` if either
    /// coordinate would go negative. Upper bounds are the grid's business.
    pub fn offset(&self, dx: isize, dy: isize) -> Option<Position> {
        Some(Position {
            x: self.x.checked_add_signed(dx)?,
            y: self.y.checked_add_signed(dy)?,
        })
    }
}

impl From<(usize, usize)> for Position {
    fn from((x, y): (usize, usize)) -> Self {
        Position { x, y }
    }
}
