// lib.rs - Maze generation, shortest-path search and command planning
//
// The grid produced by `MazeGenerator` is immutable once built; `PathFinder`
// and the planner only read it.

pub mod generator;
pub mod grid;
pub mod path_finder;
pub mod planner;

pub use generator::{MazeError, MazeGenerator, MIN_MAZE_SIZE};
pub use grid::{Cell, CellState, Grid};
pub use path_finder::{bfs_distances, find_path, Path, PathFinder};
pub use planner::{apply_command, plan_actions, replay, Action, Command, Heading, PlanError, Replay, QUIT_COMMAND};

/// A generated maze plus the route between its designated endpoints.
#[derive(Debug, Clone)]
pub struct SolvedMaze {
    pub grid: Grid,
    pub start: Cell,
    pub end: Cell,
    pub path: Path,
}

/// Generate a seeded maze of `size` and solve it from (1, 1) to the opposite corner.
pub fn generate_and_solve(size: usize, seed: u64) -> Result<SolvedMaze, MazeError> {
    let generator = MazeGenerator::new(size)?;
    let grid = generator.generate_seeded(seed);
    let start = generator.start();
    let end = generator.default_end();
    let path = find_path(&grid, start, end);
    Ok(SolvedMaze { grid, start, end, path })
}
