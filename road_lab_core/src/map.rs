use std::{
    collections::HashSet,
    ops::{Index, IndexMut},
};

use serde::{Deserialize, Serialize};

use crate::Position;

/// Represents errors that can occur within the grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Coordinates ({x}, {y}) are out of bounds for grid size ({width}, {height})")]
    OutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    },
    #[error("Grid text is empty")]
    Empty,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown cell symbol '{symbol}' at ({x}, {y})")]
    UnknownSymbol { symbol: char, x: usize, y: usize },
}

/// A generic 2D grid structure.
///
/// Stores elements of type `T` in a flat vector using row-major order.
/// Provides methods for accessing and modifying elements via [`Position`]s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid<T> {
    width: usize,
    height: usize,
    cells: Vec<T>,
}

impl<T> Grid<T> {
    /// Creates a new grid with the specified dimensions, filled with default values.
    ///
    /// # Panics
    ///
    /// Panics if `width * height` overflows `usize`.
    pub fn new(width: usize, height: usize) -> Self
    where
        T: Default + Clone,
    {
        let size = width.checked_mul(height).expect("Grid size overflow");
        Grid {
            width,
            height,
            cells: vec![T::default(); size],
        }
    }

    /// Creates a square `size` x `size` grid filled with default values.
    pub fn square(size: usize) -> Self
    where
        T: Default + Clone,
    {
        Self::new(size, size)
    }

    /// Returns the width of the grid.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the height of the grid.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Converts a position to a flat vector index.
    ///
    /// Returns `None` if the position is out of bounds.
    #[inline]
    fn index_of(&self, pos: Position) -> Option<usize> {
        if self.contains(pos) {
            Some(pos.y * self.width + pos.x)
        } else {
            None
        }
    }

    /// Checks if the given position is within the grid boundaries.
    #[inline]
    pub fn contains(&self, pos: Position) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    /// Gets an immutable reference to the cell at the given position.
    ///
    /// Returns `None` if the position is out of bounds.
    pub fn get(&self, pos: Position) -> Option<&T> {
        self.index_of(pos).and_then(|index| self.cells.get(index))
    }

    /// Sets the value of the cell at the given position.
    ///
    /// Returns `Err(GridError::OutOfBounds)` if the position is invalid.
    pub fn set(&mut self, pos: Position, value: T) -> Result<(), GridError> {
        let index = self.index_of(pos).ok_or(GridError::OutOfBounds {
            x: pos.x,
            y: pos.y,
            width: self.width,
            height: self.height,
        })?;
        self.cells[index] = value;
        Ok(())
    }

    /// Returns an iterator over the cells of the grid in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.cells.iter()
    }

    /// Returns an iterator that yields `(Position, &T)` for each cell.
    pub fn enumerate(&self) -> impl Iterator<Item = (Position, &T)> {
        let width = self.width;
        self.cells
            .iter()
            .enumerate()
            .map(move |(index, cell)| (Position::new(index % width, index / width), cell))
    }

    /// Returns the in-bounds cells among the eight surrounding `pos`.
    pub fn surrounding(&self, pos: Position) -> impl Iterator<Item = Position> + '_ {
        (-1..=1isize)
            .flat_map(|dy| (-1..=1isize).map(move |dx| (dx, dy)))
            .filter(|&(dx, dy)| dx != 0 || dy != 0)
            .filter_map(move |(dx, dy)| pos.offset(dx, dy))
            .filter(move |p| self.contains(*p))
    }
}

impl Grid<bool> {
    /// Parses an obstacle grid from text: `#` is a wall, `.` is open.
    ///
    /// Whitespace inside a row is ignored, so rows may be spaced out for
    /// readability. Blank lines are skipped.
    pub fn from_ascii(text: &str) -> Result<Self, GridError> {
        let rows: Vec<Vec<char>> = text
            .lines()
            .map(|line| line.chars().filter(|c| !c.is_whitespace()).collect::<Vec<_>>())
            .filter(|row| !row.is_empty())
            .collect();

        let width = rows.first().map(Vec::len).ok_or(GridError::Empty)?;
        let mut grid = Grid::new(width, rows.len());

        for (y, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(GridError::RaggedRow {
                    row: y,
                    expected: width,
                    found: row.len(),
                });
            }
            for (x, symbol) in row.iter().enumerate() {
                let blocked = match symbol {
                    '#' => true,
                    '.' => false,
                    other => {
                        return Err(GridError::UnknownSymbol {
                            symbol: *other,
                            x,
                            y,
                        });
                    }
                };
                grid[Position::new(x, y)] = blocked;
            }
        }

        Ok(grid)
    }

    /// Returns `true` if the position is in bounds and holds a wall.
    #[inline]
    pub fn is_blocked(&self, pos: Position) -> bool {
        self.get(pos).copied().unwrap_or(false)
    }

    /// Number of wall cells.
    pub fn wall_count(&self) -> usize {
        self.iter().filter(|blocked| **blocked).count()
    }

    /// Every wall cell, as a set a planner can route around.
    pub fn walls(&self) -> HashSet<Position> {
        self.enumerate()
            .filter(|(_, blocked)| **blocked)
            .map(|(pos, _)| pos)
            .collect()
    }
}

/// Indexing using Position coordinates for access
impl<T> Index<Position> for Grid<T> {
    type Output = T;

    #[inline]
    fn index(&self, pos: Position) -> &Self::Output {
        match self.index_of(pos) {
            Some(idx) => &self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                pos.x, pos.y, self.width, self.height
            ),
        }
    }
}

/// Indexing using Position coordinates for mutable access
impl<T> IndexMut<Position> for Grid<T> {
    #[inline]
    fn index_mut(&mut self, pos: Position) -> &mut Self::Output {
        let width = self.width;
        let height = self.height;
        match self.index_of(pos) {
            Some(idx) => &mut self.cells[idx],
            None => panic!(
                "Grid index ({}, {}) out of bounds for grid size ({}, {})",
                pos.x, pos.y, width, height
            ),
        }
    }
}
