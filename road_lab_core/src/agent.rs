use std::collections::{HashSet, VecDeque};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    EntityId, Position,
    layout::{GenerationError, attempt, try_attempt},
    map::Grid,
    params::LabConfig,
    planner::Planner,
};

/// Display color of an agent, as plain RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn hex(value: u32) -> Self {
        Rgb {
            r: (value >> 16) as u8,
            g: (value >> 8) as u8,
            b: value as u8,
        }
    }
}

pub const PALETTE: [Rgb; 10] = [
    Rgb::hex(0xFF4444),
    Rgb::hex(0x4444FF),
    Rgb::hex(0x44FF44),
    Rgb::hex(0xFF44FF),
    Rgb::hex(0x44FFFF),
    Rgb::hex(0xFFFF44),
    Rgb::hex(0xFF8844),
    Rgb::hex(0x8844FF),
    Rgb::hex(0xFFB347),
    Rgb::hex(0xB4FF47),
];

/// Where an agent begins and where it is trying to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentSpec {
    pub start: Position,
    pub goal: Position,
}

/// Problems found while preparing agents that leave an agent stuck.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupWarning {
    #[error("Agent {agent} goal at {position:?} is on a wall and could not be relocated")]
    UnresolvedGoal { agent: EntityId, position: Position },
    #[error("Agent {agent} start at {position:?} is on a wall and could not be relocated")]
    UnresolvedStart { agent: EntityId, position: Position },
    #[error("Agent {agent} cannot reach its goal at {goal:?} from {start:?}")]
    UnreachableGoal {
        agent: EntityId,
        start: Position,
        goal: Position,
    },
}

/// A simulated vehicle.
///
/// `known` is the agent's private memory of walls it has bumped into. The
/// stepper only plans against it in uncoordinated mode, but it is filled in
/// either mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: EntityId,
    pub start: Position,
    pub position: Position,
    pub goal: Position,
    pub color: Rgb,
    pub known: HashSet<Position>,
    pub path: VecDeque<Position>,
    pub trail: VecDeque<Position>,
    pub cooldown: u32,
    pub pause: u32,
}

impl Agent {
    pub fn new(id: EntityId, spec: AgentSpec) -> Self {
        Agent {
            id,
            start: spec.start,
            position: spec.start,
            goal: spec.goal,
            color: PALETTE[id % PALETTE.len()],
            known: HashSet::new(),
            path: VecDeque::new(),
            trail: VecDeque::from([spec.start]),
            cooldown: 0,
            pause: 0,
        }
    }

    pub fn spec(&self) -> AgentSpec {
        AgentSpec {
            start: self.start,
            goal: self.goal,
        }
    }

    #[inline]
    pub fn at_goal(&self) -> bool {
        self.position == self.goal
    }

    /// Replaces the current plan.
    pub fn set_path(&mut self, path: impl IntoIterator<Item = Position>) {
        self.path.clear();
        self.path.extend(path);
    }

    /// Moves to `target` and records it in the trail, dropping the oldest
    /// entries beyond `trail_length`.
    pub fn move_to(&mut self, target: Position, trail_length: usize) {
        self.position = target;
        self.trail.push_back(target);
        while self.trail.len() > trail_length {
            self.trail.pop_front();
        }
    }
}

/// The fixed start/goal pairs: corners, edge midpoints, and inner diagonals.
///
/// Yields at most ten agents; `count` only truncates. Pairs that do not fit
/// on a small field are dropped.
pub fn fixed_specs(size: usize, count: usize) -> Vec<AgentSpec> {
    let far = size.saturating_sub(3);
    let inner_far = size.saturating_sub(6);
    let mid = size / 2;
    let quarter = size / 4;
    let three_quarters = size * 3 / 4;

    let pair = |sx, sy, gx, gy| AgentSpec {
        start: Position::new(sx, sy),
        goal: Position::new(gx, gy),
    };

    [
        pair(2, 2, far, far),
        pair(far, 2, 2, far),
        pair(2, far, far, 2),
        pair(far, far, 2, 2),
        pair(mid, 2, mid, far),
        pair(2, mid, far, mid),
        pair(quarter, quarter, three_quarters, three_quarters),
        pair(three_quarters, quarter, quarter, three_quarters),
        pair(5, 5, inner_far, inner_far),
        pair(inner_far, 5, 5, inner_far),
    ]
    .into_iter()
    .filter(|spec| spec.start.x.max(spec.start.y).max(spec.goal.x).max(spec.goal.y) < size)
    .take(count)
    .collect()
}

/// Draws random cells until one is open and not in `occupied`.
pub fn random_empty_cell<R: Rng + ?Sized>(
    rng: &mut R,
    grid: &Grid<bool>,
    occupied: &HashSet<Position>,
    budget: usize,
) -> Result<Position, GenerationError> {
    if grid.width() == 0 || grid.height() == 0 {
        return Err(GenerationError::NoEmptyCell { attempts: 0 });
    }
    attempt(budget, || {
        let cell = Position::new(
            rng.random_range(0..grid.width()),
            rng.random_range(0..grid.height()),
        );
        (!grid[cell] && !occupied.contains(&cell)).then_some(cell)
    })
    .ok_or(GenerationError::NoEmptyCell { attempts: budget })
}

/// Places `config.agent_count` agents on open cells.
///
/// Starts and goals never share a cell with another agent's start or goal,
/// each start is at least `config.min_separation` steps from its goal, and
/// every goal is reachable from its start through the true walls.
pub fn random_specs<R: Rng + ?Sized>(
    rng: &mut R,
    grid: &Grid<bool>,
    config: &LabConfig,
) -> Result<Vec<AgentSpec>, GenerationError> {
    let available = grid.iter().filter(|blocked| !**blocked).count();
    let needed = config.agent_count * 2;
    if available < needed {
        return Err(GenerationError::InsufficientSpace {
            agents: config.agent_count,
            needed,
            available,
        });
    }

    let budget = config.placement_retries;
    let planner = Planner::for_grid(grid);
    let walls = grid.walls();
    let mut occupied = HashSet::with_capacity(needed);
    let mut specs = Vec::with_capacity(config.agent_count);

    for agent in 0..config.agent_count {
        let spec = try_attempt(budget, || {
            let start = random_empty_cell(rng, grid, &occupied, budget)?;
            let goal = random_empty_cell(rng, grid, &occupied, budget)?;
            let valid = start != goal
                && start.manhattan(&goal) >= config.min_separation
                && planner.reachable(start, goal, &walls);
            Ok::<_, GenerationError>(valid.then_some(AgentSpec { start, goal }))
        })?
        .ok_or(GenerationError::NoValidPair {
            agent,
            attempts: budget,
        })?;

        occupied.insert(spec.start);
        occupied.insert(spec.goal);
        specs.push(spec);
    }

    Ok(specs)
}

/// Walks diagonally from `pos`, wrapping at the edges, until an open cell
/// outside `taken` is found. Gives up after one pass over the whole field.
pub fn relocate(pos: Position, grid: &Grid<bool>, taken: &HashSet<Position>) -> Option<Position> {
    let (width, height) = (grid.width(), grid.height());
    let mut cell = pos;
    for _ in 0..=width * height {
        if !grid.is_blocked(cell) && !taken.contains(&cell) {
            return Some(cell);
        }
        cell = Position::new((cell.x + 1) % width, (cell.y + 1) % height);
    }
    None
}

/// Relocates every start and goal that sits on a wall onto a cell no other
/// start or goal uses, then checks that each goal can be reached.
pub fn settle(specs: &mut [AgentSpec], grid: &Grid<bool>) -> Vec<SetupWarning> {
    let mut taken: HashSet<Position> = specs
        .iter()
        .flat_map(|spec| [spec.start, spec.goal])
        .collect();
    let mut warnings = Vec::new();
    let mut resolved = vec![true; specs.len()];

    for (agent, spec) in specs.iter_mut().enumerate() {
        if grid.is_blocked(spec.start) {
            match relocate(spec.start, grid, &taken) {
                Some(open) => {
                    taken.insert(open);
                    spec.start = open;
                }
                None => {
                    resolved[agent] = false;
                    warnings.push(SetupWarning::UnresolvedStart {
                        agent,
                        position: spec.start,
                    });
                }
            }
        }
        if grid.is_blocked(spec.goal) {
            match relocate(spec.goal, grid, &taken) {
                Some(open) => {
                    taken.insert(open);
                    spec.goal = open;
                }
                None => {
                    resolved[agent] = false;
                    warnings.push(SetupWarning::UnresolvedGoal {
                        agent,
                        position: spec.goal,
                    });
                }
            }
        }
    }

    let planner = Planner::for_grid(grid);
    let walls = grid.walls();
    for (agent, spec) in specs.iter().enumerate() {
        if resolved[agent] && !planner.reachable(spec.start, spec.goal, &walls) {
            warnings.push(SetupWarning::UnreachableGoal {
                agent,
                start: spec.start,
                goal: spec.goal,
            });
        }
    }
    warnings
}
