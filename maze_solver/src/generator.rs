// generator.rs - Perfect maze generation by randomized depth-first carving

use crate::grid::{Cell, CellState, Grid};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

pub const MIN_MAZE_SIZE: usize = 5;

/// Carving steps two cells at a time so walls stay one cell thick.
const CARVE_OFFSETS: [(i32, i32); 4] = [(0, 2), (0, -2), (2, 0), (-2, 0)];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MazeError {
    #[error("Maze size must be odd and at least 5, got {0}")]
    InvalidSize(usize),

    #[error("Start cell {cell} must be an interior cell with odd coordinates in a {size}x{size} maze")]
    InvalidStart { cell: Cell, size: usize },
}

/// Maze generator for a fixed size and start cell.
#[derive(Debug, Clone)]
pub struct MazeGenerator {
    size: usize,
    start: Cell,
}

impl MazeGenerator {
    /// Generator starting at (1, 1).
    pub fn new(size: usize) -> Result<Self, MazeError> {
        Self::with_start(size, Cell::new(1, 1))
    }

    pub fn with_start(size: usize, start: Cell) -> Result<Self, MazeError> {
        if size < MIN_MAZE_SIZE || size % 2 == 0 {
            return Err(MazeError::InvalidSize(size));
        }
        let last = size as i32 - 1;
        let interior = start.x > 0 && start.z > 0 && start.x < last && start.z < last;
        if !interior || start.x % 2 == 0 || start.z % 2 == 0 {
            return Err(MazeError::InvalidStart { cell: start, size });
        }
        Ok(Self { size, start })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn start(&self) -> Cell {
        self.start
    }

    /// The opposite interior corner, (size-2, size-2).
    pub fn default_end(&self) -> Cell {
        let e = self.size as i32 - 2;
        Cell::new(e, e)
    }

    /// Deterministic generation from a seed.
    pub fn generate_seeded(&self, seed: u64) -> Grid {
        let mut rng = StdRng::seed_from_u64(seed);
        self.generate(&mut rng)
    }

    /// Carve a perfect maze with an explicit stack.
    ///
    /// Every carved cell is pushed exactly once, and each push opens exactly one
    /// wall cell, so the open cells always form a spanning tree.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Grid {
        let mut grid = Grid::filled(self.size);
        grid.set(self.start, CellState::Open);

        let mut stack = vec![self.start];
        let mut candidates: Vec<(i32, i32)> = Vec::with_capacity(4);

        while let Some(&current) = stack.last() {
            candidates.clear();
            for &(dx, dz) in &CARVE_OFFSETS {
                let next = current.offset(dx, dz);
                if grid.contains(next) && !grid.is_border(next) && !grid.is_open(next) {
                    candidates.push((dx, dz));
                }
            }

            match candidates.choose(rng) {
                Some(&(dx, dz)) => {
                    let next = current.offset(dx, dz);
                    grid.set(current.offset(dx / 2, dz / 2), CellState::Open);
                    grid.set(next, CellState::Open);
                    stack.push(next);
                }
                None => {
                    stack.pop();
                }
            }
        }

        log::debug!(
            "Carved {}x{} maze from {} with {} open cells",
            self.size,
            self.size,
            self.start,
            grid.open_count()
        );
        grid
    }
}
