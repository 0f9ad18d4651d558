// Property tests over randomly seeded mazes of every small odd size.

use maze_solver::{
    bfs_distances, find_path, plan_actions, replay, Cell, Command, Heading, MazeGenerator,
};
use proptest::prelude::*;

fn odd_size() -> impl Strategy<Value = usize> {
    (2usize..=15).prop_map(|n| 2 * n + 1)
}

fn heading() -> impl Strategy<Value = Heading> {
    prop::sample::select(Heading::ALL.to_vec())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn maze_is_a_spanning_tree(size in odd_size(), seed in any::<u64>()) {
        let generator = MazeGenerator::new(size).unwrap();
        let grid = generator.generate_seeded(seed);

        let reachable = bfs_distances(&grid, generator.start());
        prop_assert_eq!(reachable.len(), grid.open_count());
        prop_assert_eq!(grid.open_adjacency_count(), grid.open_count() - 1);
    }

    #[test]
    fn path_is_shortest(size in odd_size(), seed in any::<u64>()) {
        let generator = MazeGenerator::new(size).unwrap();
        let grid = generator.generate_seeded(seed);
        let (start, end) = (generator.start(), generator.default_end());

        let path = find_path(&grid, start, end);
        prop_assert!(!path.is_empty());
        prop_assert_eq!(path.len() - 1, bfs_distances(&grid, start)[&end]);
    }

    #[test]
    fn path_to_any_open_cell_is_shortest(size in odd_size(), seed in any::<u64>(), pick in any::<prop::sample::Index>()) {
        let generator = MazeGenerator::new(size).unwrap();
        let grid = generator.generate_seeded(seed);
        let open: Vec<Cell> = grid.open_cells().collect();
        let end = open[pick.index(open.len())];

        let path = find_path(&grid, generator.start(), end);
        prop_assert_eq!(path.len() - 1, bfs_distances(&grid, generator.start())[&end]);
    }

    #[test]
    fn plan_replays_to_path(size in odd_size(), seed in any::<u64>(), initial in heading()) {
        let generator = MazeGenerator::new(size).unwrap();
        let grid = generator.generate_seeded(seed);
        let path = find_path(&grid, generator.start(), generator.default_end());

        let actions = plan_actions(&path, initial).unwrap();
        let result = replay(path[0], initial, actions.iter().map(|a| a.command));
        prop_assert_eq!(&result.visited, &path);

        let last = path[path.len() - 1];
        let prev = path[path.len() - 2];
        prop_assert_eq!(Some(result.heading), Heading::from_step(last.x - prev.x, last.z - prev.z));

        let moves = actions.iter().filter(|a| a.command == Command::MoveForward).count();
        prop_assert_eq!(moves, path.len() - 1);
    }
}
