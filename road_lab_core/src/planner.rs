use std::collections::{HashMap, HashSet, VecDeque};

use crate::{Position, map::Grid};

/// Orthogonal steps in the order used after the goal-directed ones.
const STEPS: [(isize, isize); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Breadth-first route finder over a rectangular field.
///
/// The planner only knows the field's size. Walls are whatever the caller
/// says it knows about; everything else is assumed passable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Planner {
    width: usize,
    height: usize,
}

impl Planner {
    pub fn new(width: usize, height: usize) -> Self {
        Planner { width, height }
    }

    pub fn for_grid<T>(grid: &Grid<T>) -> Self {
        Self::new(grid.width(), grid.height())
    }

    #[inline]
    fn contains(&self, pos: Position) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    /// In-bounds orthogonal neighbors of `from`, biased toward `goal`.
    ///
    /// The step along the axis with the larger remaining distance comes
    /// first (horizontal on ties), then the step along the other axis, then
    /// the remaining neighbors.
    pub fn neighbors_toward(&self, from: Position, goal: Position) -> Vec<Position> {
        let dx = goal.x.cmp(&from.x) as isize;
        let dy = goal.y.cmp(&from.y) as isize;
        let horizontal = (dx != 0).then_some((dx, 0));
        let vertical = (dy != 0).then_some((0, dy));

        let (first, second) = if from.x.abs_diff(goal.x) >= from.y.abs_diff(goal.y) {
            (horizontal, vertical)
        } else {
            (vertical, horizontal)
        };

        let mut order: Vec<(isize, isize)> = Vec::with_capacity(4);
        order.extend(first);
        order.extend(second);
        for step in STEPS {
            if !order.contains(&step) {
                order.push(step);
            }
        }

        order
            .into_iter()
            .filter_map(|(dx, dy)| from.offset(dx, dy))
            .filter(|pos| self.contains(*pos))
            .collect()
    }

    /// Shortest route from `start` to `goal` that avoids `known` walls.
    ///
    /// The route excludes `start` and ends at `goal`. It is empty when the
    /// agent is already there or when `known` cuts the goal off.
    pub fn plan(
        &self,
        start: Position,
        goal: Position,
        known: &HashSet<Position>,
    ) -> Vec<Position> {
        if start == goal || !self.contains(start) || !self.contains(goal) {
            return Vec::new();
        }

        let mut came_from: HashMap<Position, Position> = HashMap::new();
        let mut visited: HashSet<Position> = HashSet::from([start]);
        let mut frontier = VecDeque::from([start]);

        while let Some(current) = frontier.pop_front() {
            if current == goal {
                let mut path = vec![goal];
                let mut cursor = goal;
                while let Some(&previous) = came_from.get(&cursor) {
                    if previous == start {
                        break;
                    }
                    path.push(previous);
                    cursor = previous;
                }
                path.reverse();
                return path;
            }

            for next in self.neighbors_toward(current, goal) {
                if known.contains(&next) || !visited.insert(next) {
                    continue;
                }
                came_from.insert(next, current);
                frontier.push_back(next);
            }
        }

        Vec::new()
    }

    /// Whether `goal` can be reached from `start` without crossing `walls`.
    pub fn reachable(&self, start: Position, goal: Position, walls: &HashSet<Position>) -> bool {
        if !self.contains(start) || !self.contains(goal) {
            return false;
        }
        start == goal || !self.plan(start, goal, walls).is_empty()
    }
}
