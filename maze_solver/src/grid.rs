// grid.rs - Square wall/open grid shared by generation, search and planning

use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer cell coordinate, 0-indexed on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub z: i32,
}

impl Cell {
    #[inline]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    #[inline]
    pub const fn offset(self, dx: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.z + dz)
    }

    /// True when `other` differs by exactly one unit along exactly one axis.
    #[inline]
    pub fn is_adjacent(self, other: Cell) -> bool {
        (self.x - other.x).abs() + (self.z - other.z).abs() == 1
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

impl From<(i32, i32)> for Cell {
    #[inline]
    fn from((x, z): (i32, i32)) -> Self {
        Cell::new(x, z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellState {
    Wall,
    Open,
}

/// Neighbor order used everywhere a deterministic walk is needed: +z, -z, +x, -x.
pub const NEIGHBOR_OFFSETS: [(i32, i32); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];

/// Square grid of cell states, stored row-major (`z` rows of `x` columns).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid {
    size: usize,
    cells: Vec<CellState>,
}

impl Grid {
    /// A grid where every cell is a wall.
    pub fn filled(size: usize) -> Self {
        Self {
            size,
            cells: vec![CellState::Wall; size * size],
        }
    }

    /// Build a grid from rows of `#` (wall) and `.` (open).
    ///
    /// Returns `None` when the rows are not square or contain other characters.
    pub fn from_rows<S: AsRef<str>>(rows: &[S]) -> Option<Self> {
        let size = rows.len();
        let mut cells = Vec::with_capacity(size * size);
        for row in rows {
            let row = row.as_ref();
            if row.chars().count() != size {
                return None;
            }
            for ch in row.chars() {
                cells.push(match ch {
                    '#' => CellState::Wall,
                    '.' => CellState::Open,
                    _ => return None,
                });
            }
        }
        Some(Self { size, cells })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn contains(&self, cell: Cell) -> bool {
        cell.x >= 0 && cell.z >= 0 && (cell.x as usize) < self.size && (cell.z as usize) < self.size
    }

    /// True for cells on the outer ring.
    #[inline]
    pub fn is_border(&self, cell: Cell) -> bool {
        let last = self.size as i32 - 1;
        cell.x == 0 || cell.z == 0 || cell.x == last || cell.z == last
    }

    #[inline]
    fn index(&self, cell: Cell) -> usize {
        cell.z as usize * self.size + cell.x as usize
    }

    pub fn get(&self, cell: Cell) -> Option<CellState> {
        if self.contains(cell) {
            Some(self.cells[self.index(cell)])
        } else {
            None
        }
    }

    /// Out-of-bounds cells read as walls.
    #[inline]
    pub fn is_open(&self, cell: Cell) -> bool {
        self.get(cell) == Some(CellState::Open)
    }

    pub(crate) fn set(&mut self, cell: Cell, state: CellState) {
        let idx = self.index(cell);
        self.cells[idx] = state;
    }

    /// Every open cell in row-major order.
    pub fn open_cells(&self) -> impl Iterator<Item = Cell> + '_ {
        let size = self.size as i32;
        (0..size)
            .flat_map(move |z| (0..size).map(move |x| Cell::new(x, z)))
            .filter(move |&c| self.is_open(c))
    }

    pub fn open_count(&self) -> usize {
        self.cells.iter().filter(|&&s| s == CellState::Open).count()
    }

    /// Open 4-neighbors of `cell` in `NEIGHBOR_OFFSETS` order.
    pub fn open_neighbors(&self, cell: Cell) -> impl Iterator<Item = Cell> + '_ {
        NEIGHBOR_OFFSETS
            .iter()
            .map(move |&(dx, dz)| cell.offset(dx, dz))
            .filter(move |&n| self.is_open(n))
    }

    /// Number of unordered adjacent open/open pairs.
    pub fn open_adjacency_count(&self) -> usize {
        self.open_cells()
            .map(|c| {
                [c.offset(1, 0), c.offset(0, 1)]
                    .into_iter()
                    .filter(|&n| self.is_open(n))
                    .count()
            })
            .sum()
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for z in 0..self.size {
            for x in 0..self.size {
                let ch = match self.cells[z * self.size + x] {
                    CellState::Wall => '#',
                    CellState::Open => '.',
                };
                write!(f, "{ch}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
