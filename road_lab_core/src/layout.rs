//! Obstacle field generation and layout snapshots.
//!
//! A [`Layout`] is everything needed to replay a run: the obstacle grid plus
//! each agent's start and goal. Fixed layouts are fully reproducible;
//! randomized layouts are a pure function of the random source handed in.

use std::collections::HashSet;

use log::debug;
use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use crate::{
    EntityId, Position,
    agent::{self, AgentSpec, SetupWarning},
    map::Grid,
    params::LabConfig,
};

/// Failures that abort building a layout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("Could not find an empty cell after {attempts} attempts")]
    NoEmptyCell { attempts: usize },
    #[error("Could not find a valid start/goal pair for agent {agent} after {attempts} attempts")]
    NoValidPair { agent: EntityId, attempts: usize },
    #[error("{agents} agents need {needed} open cells but the field only has {available}")]
    InsufficientSpace {
        agents: usize,
        needed: usize,
        available: usize,
    },
}

/// Calls `candidate` up to `budget` times and returns the first placement it
/// produces, or `None` once the budget is spent.
pub fn attempt<T>(budget: usize, mut candidate: impl FnMut() -> Option<T>) -> Option<T> {
    (0..budget).find_map(|_| candidate())
}

/// Like [`attempt`], for candidates that can fail outright.
pub fn try_attempt<T, E>(
    budget: usize,
    mut candidate: impl FnMut() -> Result<Option<T>, E>,
) -> Result<Option<T>, E> {
    for _ in 0..budget {
        if let Some(found) = candidate()? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// The obstacle shapes the randomized generator knows how to place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    HorizontalWall,
    VerticalWall,
    LShape,
    UShape,
    Diagonal,
}

impl ShapeKind {
    /// The shapes offered to one randomized field, before duplication.
    pub const POOL: [ShapeKind; 9] = [
        ShapeKind::HorizontalWall,
        ShapeKind::HorizontalWall,
        ShapeKind::HorizontalWall,
        ShapeKind::VerticalWall,
        ShapeKind::VerticalWall,
        ShapeKind::VerticalWall,
        ShapeKind::LShape,
        ShapeKind::UShape,
        ShapeKind::Diagonal,
    ];

    /// Draws one candidate placement on a `size` x `size` field.
    ///
    /// Returns `None` when the field is too small to hold the drawn length.
    pub fn sample<R: Rng + ?Sized>(self, rng: &mut R, size: usize) -> Option<Vec<Position>> {
        // Exclusive upper bound for an origin coordinate, if any exists.
        let room = |span: usize| size.checked_sub(span).filter(|r| *r > 0);

        let cells = match self {
            ShapeKind::HorizontalWall => {
                let len = rng.random_range(8..16);
                let span = room(len)?;
                let x = rng.random_range(0..span);
                let y = rng.random_range(0..size);
                (0..len).map(|i| Position::new(x + i, y)).collect()
            }
            ShapeKind::VerticalWall => {
                let len = rng.random_range(8..16);
                let span = room(len)?;
                let x = rng.random_range(0..size);
                let y = rng.random_range(0..span);
                (0..len).map(|i| Position::new(x, y + i)).collect()
            }
            ShapeKind::LShape => {
                let len = rng.random_range(6..11);
                let x = rng.random_range(0..room(len)?);
                let y = rng.random_range(0..room(len)?);
                (0..len)
                    .map(|i| Position::new(x, y + i))
                    .chain((1..len).map(|i| Position::new(x + i, y)))
                    .collect()
            }
            ShapeKind::UShape => {
                let len = rng.random_range(6..10);
                let x = rng.random_range(0..room(len + 2)?);
                let y = rng.random_range(0..room(len)?);
                (0..len)
                    .map(|i| Position::new(x, y + i))
                    .chain((0..len).map(|i| Position::new(x + 2 + len, y + i)))
                    .chain((0..len + 3).map(|i| Position::new(x + i, y + len)))
                    .collect()
            }
            ShapeKind::Diagonal => {
                let len = rng.random_range(7..13);
                let x = rng.random_range(0..room(len)?);
                let y = rng.random_range(0..room(len)?);
                (0..len).map(|i| Position::new(x + i, y + i)).collect()
            }
        };
        Some(cells)
    }
}

/// A shape that made it onto the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedShape {
    pub kind: ShapeKind,
    pub cells: Vec<Position>,
}

/// A shape fits when every cell is in bounds, open, and not touching an
/// existing wall orthogonally or diagonally.
pub fn can_place(cells: &[Position], grid: &Grid<bool>) -> bool {
    cells.iter().all(|&cell| {
        grid.contains(cell)
            && !grid[cell]
            && !grid.surrounding(cell).any(|neighbor| grid[neighbor])
    })
}

/// Builds a randomized obstacle field.
///
/// Every shape in [`ShapeKind::POOL`] is offered twice, in shuffled order.
/// A shape that finds no valid spot within `retries` draws is skipped.
pub fn random_grid<R: Rng + ?Sized>(
    rng: &mut R,
    size: usize,
    retries: usize,
) -> (Grid<bool>, Vec<PlacedShape>) {
    let mut grid = Grid::square(size);
    let mut placed = Vec::new();

    let mut order: Vec<ShapeKind> = ShapeKind::POOL
        .iter()
        .chain(ShapeKind::POOL.iter())
        .copied()
        .collect();
    order.shuffle(rng);

    for kind in order {
        let cells = attempt(retries, || {
            kind.sample(rng, size)
                .filter(|cells| can_place(cells, &grid))
        });
        match cells {
            Some(cells) => {
                for &cell in &cells {
                    grid[cell] = true;
                }
                placed.push(PlacedShape { kind, cells });
            }
            None => debug!("Skipping {kind:?}: no valid placement in {retries} attempts"),
        }
    }

    (grid, placed)
}

/// Evenly spaced gap coordinates along a wall of length `size`.
fn gaps(size: usize, count: usize) -> HashSet<usize> {
    (1..=count).map(|i| i * size / (count + 1)).collect()
}

/// Builds the fixed obstacle field: two gapped horizontal walls, two gapped
/// vertical walls, a broken diagonal, two L-shapes and a U-shape.
pub fn fixed_grid(size: usize) -> Grid<bool> {
    let mut grid: Grid<bool> = Grid::square(size);
    let at = |per_mille: usize| size * per_mille / 1000;

    let wall = |grid: &mut Grid<bool>, x: usize, y: usize| {
        let pos = Position::new(x, y);
        if grid.contains(pos) {
            grid[pos] = true;
        }
    };

    for (row, gap_count) in [(at(300), 6), (at(700), 5)] {
        let open = gaps(size, gap_count);
        for x in (0..size).filter(|x| !open.contains(x)) {
            wall(&mut grid, x, row);
        }
    }

    for (col, gap_count) in [(at(600), 7), (at(200), 4)] {
        let open = gaps(size, gap_count);
        for y in (0..size).filter(|y| !open.contains(y)) {
            wall(&mut grid, col, y);
        }
    }

    // Diagonal barrier, every third cell left open.
    for i in (0..at(400)).filter(|i| i % 3 != 1) {
        wall(&mut grid, at(100) + i, at(500) + i);
    }

    let (lx, ly) = (at(800), at(150));
    for i in 0..10 {
        wall(&mut grid, lx, ly + i);
        wall(&mut grid, lx + i, ly);
    }

    let (lx, ly) = (at(50), at(750));
    for i in 0..8 {
        wall(&mut grid, lx + i, ly);
        wall(&mut grid, lx, ly + i);
    }

    let (ux, uy) = (at(750), at(600));
    for i in 0..8 {
        wall(&mut grid, ux, uy + i);
        wall(&mut grid, ux + 6, uy + i);
        if i < 6 {
            wall(&mut grid, ux + i, uy + 7);
        }
    }

    grid
}

/// An obstacle grid plus the start/goal pair of every agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub grid: Grid<bool>,
    pub agents: Vec<AgentSpec>,
}

impl Layout {
    /// The reproducible layout: fixed field and fixed start/goal pairs.
    pub fn fixed(config: &LabConfig) -> Self {
        Layout {
            grid: fixed_grid(config.grid_size),
            agents: agent::fixed_specs(config.grid_size, config.agent_count),
        }
    }

    /// A randomized field with randomly placed agents.
    pub fn random<R: Rng + ?Sized>(
        rng: &mut R,
        config: &LabConfig,
    ) -> Result<Self, GenerationError> {
        let (grid, shapes) = random_grid(rng, config.grid_size, config.shape_retries);
        debug!(
            "Placed {} shapes ({} wall cells)",
            shapes.len(),
            grid.wall_count()
        );
        let agents = agent::random_specs(rng, &grid, config)?;
        Ok(Layout { grid, agents })
    }

    /// Moves any start or goal that sits on a wall onto open ground.
    ///
    /// Returns a warning for each cell that could not be moved.
    pub fn settle(&mut self) -> Vec<SetupWarning> {
        agent::settle(&mut self.agents, &self.grid)
    }

    /// The first agent whose start or goal lies outside the field.
    pub fn first_out_of_bounds(&self) -> Option<EntityId> {
        self.agents
            .iter()
            .position(|spec| !self.grid.contains(spec.start) || !self.grid.contains(spec.goal))
    }
}
