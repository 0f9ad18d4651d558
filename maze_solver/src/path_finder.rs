// path_finder.rs - Bidirectional breadth-first search over a grid

use crate::grid::{Cell, Grid};
use std::collections::{HashMap, VecDeque};

/// Ordered cells from source to destination; empty means "no path".
pub type Path = Vec<Cell>;

/// One search frontier with its own parent map. Roots map to `None`.
struct Frontier {
    queue: VecDeque<Cell>,
    parents: HashMap<Cell, Option<Cell>>,
}

impl Frontier {
    fn rooted_at(root: Cell) -> Self {
        Self {
            queue: VecDeque::from([root]),
            parents: HashMap::from([(root, None)]),
        }
    }

    fn has_visited(&self, cell: Cell) -> bool {
        self.parents.contains_key(&cell)
    }

    /// Cells from `cell` back to this frontier's root, inclusive.
    fn walk_to_root(&self, cell: Cell) -> Vec<Cell> {
        let mut out = vec![cell];
        let mut cursor = cell;
        while let Some(Some(parent)) = self.parents.get(&cursor) {
            out.push(*parent);
            cursor = *parent;
        }
        out
    }

    /// Expand every cell of the current BFS layer, one at a time.
    ///
    /// Returns the first newly discovered cell the other frontier already holds.
    fn expand_layer(&mut self, grid: &Grid, other: &Frontier) -> Option<Cell> {
        let layer = self.queue.len();
        for _ in 0..layer {
            let Some(cell) = self.queue.pop_front() else {
                break;
            };
            for next in grid.open_neighbors(cell) {
                if self.has_visited(next) {
                    continue;
                }
                self.parents.insert(next, Some(cell));
                if other.has_visited(next) {
                    return Some(next);
                }
                self.queue.push_back(next);
            }
        }
        None
    }
}

/// Shortest-path search over one grid.
pub struct PathFinder<'g> {
    grid: &'g Grid,
}

impl<'g> PathFinder<'g> {
    pub fn new(grid: &'g Grid) -> Self {
        Self { grid }
    }

    /// Shortest 4-connected path from `start` to `end`.
    ///
    /// Frontiers alternate by whole BFS layers, so the first meeting cell found
    /// already lies on a shortest path. Wall or out-of-bounds endpoints, and
    /// disconnected endpoints, give an empty path.
    pub fn shortest_path(&self, start: Cell, end: Cell) -> Path {
        if !self.grid.is_open(start) || !self.grid.is_open(end) {
            log::debug!("No path: endpoint {} or {} is not open", start, end);
            return Vec::new();
        }
        if start == end {
            return vec![start];
        }

        let mut forward = Frontier::rooted_at(start);
        let mut backward = Frontier::rooted_at(end);
        let mut expand_forward = true;

        while !forward.queue.is_empty() && !backward.queue.is_empty() {
            let meeting = if expand_forward {
                forward.expand_layer(self.grid, &backward)
            } else {
                backward.expand_layer(self.grid, &forward)
            };

            if let Some(meet) = meeting {
                let mut path = forward.walk_to_root(meet);
                path.reverse();
                path.extend(backward.walk_to_root(meet).into_iter().skip(1));
                log::debug!("Path {} -> {} meets at {} ({} cells)", start, end, meet, path.len());
                return path;
            }
            expand_forward = !expand_forward;
        }

        log::debug!("No path between {} and {}", start, end);
        Vec::new()
    }
}

/// Convenience wrapper around [`PathFinder::shortest_path`].
pub fn find_path(grid: &Grid, start: Cell, end: Cell) -> Path {
    PathFinder::new(grid).shortest_path(start, end)
}

/// Single-source BFS distances (in steps) to every reachable open cell.
pub fn bfs_distances(grid: &Grid, start: Cell) -> HashMap<Cell, usize> {
    let mut dist = HashMap::new();
    if !grid.is_open(start) {
        return dist;
    }
    dist.insert(start, 0);
    let mut queue = VecDeque::from([start]);
    while let Some(cell) = queue.pop_front() {
        let d = dist[&cell];
        for next in grid.open_neighbors(cell) {
            if !dist.contains_key(&next) {
                dist.insert(next, d + 1);
                queue.push_back(next);
            }
        }
    }
    dist
}
