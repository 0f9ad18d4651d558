// planner.rs - Converts a cell path into discrete turn/move commands

use crate::grid::Cell;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cardinal heading as a yaw in degrees. Yaw grows clockwise seen from above:
/// 0 faces +z, 90 faces -x, 180 faces -z, 270 faces +x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Heading {
    South,
    West,
    North,
    East,
}

impl Heading {
    pub const ALL: [Heading; 4] = [Heading::South, Heading::West, Heading::North, Heading::East];

    #[inline]
    pub const fn yaw(self) -> i32 {
        match self {
            Heading::South => 0,
            Heading::West => 90,
            Heading::North => 180,
            Heading::East => 270,
        }
    }

    /// Accepts any yaw that is a multiple of 90, including negatives.
    pub fn from_yaw(yaw: i32) -> Option<Self> {
        match yaw.rem_euclid(360) {
            0 => Some(Heading::South),
            90 => Some(Heading::West),
            180 => Some(Heading::North),
            270 => Some(Heading::East),
            _ => None,
        }
    }

    /// Unit step `(dx, dz)` taken by a forward move.
    #[inline]
    pub const fn step(self) -> (i32, i32) {
        match self {
            Heading::South => (0, 1),
            Heading::West => (-1, 0),
            Heading::North => (0, -1),
            Heading::East => (1, 0),
        }
    }

    pub fn from_step(dx: i32, dz: i32) -> Option<Self> {
        match (dx, dz) {
            (0, 1) => Some(Heading::South),
            (-1, 0) => Some(Heading::West),
            (0, -1) => Some(Heading::North),
            (1, 0) => Some(Heading::East),
            _ => None,
        }
    }

    #[inline]
    pub fn turned_right(self) -> Self {
        match self {
            Heading::South => Heading::West,
            Heading::West => Heading::North,
            Heading::North => Heading::East,
            Heading::East => Heading::South,
        }
    }

    #[inline]
    pub fn turned_left(self) -> Self {
        match self {
            Heading::South => Heading::East,
            Heading::East => Heading::North,
            Heading::North => Heading::West,
            Heading::West => Heading::South,
        }
    }

    /// Signed rotation from `self` to `target`, normalized to (-180, 180].
    pub fn angle_to(self, target: Heading) -> i32 {
        let mut diff = (target.yaw() - self.yaw()).rem_euclid(360);
        if diff > 180 {
            diff -= 360;
        }
        diff
    }
}

/// Explicit end-of-session signal, sent after the last movement command.
pub const QUIT_COMMAND: &str = "quit";

/// One discrete movement command, one simulation tick each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Command {
    TurnLeft,
    TurnRight,
    MoveForward,
}

impl Command {
    /// Token understood by the discrete-movement command handler.
    pub const fn token(self) -> &'static str {
        match self {
            Command::TurnLeft => "turn -1",
            Command::TurnRight => "turn 1",
            Command::MoveForward => "move 1",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim() {
            "turn -1" => Some(Command::TurnLeft),
            "turn 1" => Some(Command::TurnRight),
            "move 1" => Some(Command::MoveForward),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A command plus the cell the agent occupies once it has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub command: Command,
    pub target: Cell,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("Path step {index} goes from {from} to {to}, which are not 4-adjacent")]
    NonAdjacentStep { index: usize, from: Cell, to: Cell },
}

/// Plan the command sequence that walks `path` starting with `heading`.
///
/// Paths shorter than two cells need no movement and yield no actions.
pub fn plan_actions(path: &[Cell], heading: Heading) -> Result<Vec<Action>, PlanError> {
    let mut actions = Vec::with_capacity(path.len().saturating_mul(2));
    let Some(&first) = path.first() else {
        return Ok(actions);
    };

    let mut current = first;
    let mut facing = heading;

    for (index, &next) in path.iter().enumerate().skip(1) {
        let required = Heading::from_step(next.x - current.x, next.z - current.z).ok_or(
            PlanError::NonAdjacentStep {
                index,
                from: current,
                to: next,
            },
        )?;

        match facing.angle_to(required) {
            90 => actions.push(Action { command: Command::TurnRight, target: current }),
            -90 => actions.push(Action { command: Command::TurnLeft, target: current }),
            180 => {
                actions.push(Action { command: Command::TurnRight, target: current });
                actions.push(Action { command: Command::TurnRight, target: current });
            }
            _ => {}
        }

        actions.push(Action { command: Command::MoveForward, target: next });
        facing = required;
        current = next;
    }

    Ok(actions)
}

/// Result of replaying commands from a start pose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay {
    pub position: Cell,
    pub heading: Heading,
    /// Start cell followed by the cell reached after every forward move.
    pub visited: Vec<Cell>,
}

/// Apply one command to a pose.
#[inline]
pub fn apply_command(position: Cell, heading: Heading, command: Command) -> (Cell, Heading) {
    match command {
        Command::TurnLeft => (position, heading.turned_left()),
        Command::TurnRight => (position, heading.turned_right()),
        Command::MoveForward => {
            let (dx, dz) = heading.step();
            (position.offset(dx, dz), heading)
        }
    }
}

/// Replay commands without any collision checks.
pub fn replay<I>(start: Cell, heading: Heading, commands: I) -> Replay
where
    I: IntoIterator<Item = Command>,
{
    let mut position = start;
    let mut facing = heading;
    let mut visited = vec![start];
    for command in commands {
        let (next, next_heading) = apply_command(position, facing, command);
        if command == Command::MoveForward {
            visited.push(next);
        }
        position = next;
        facing = next_heading;
    }
    Replay { position, heading: facing, visited }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(raw: &[(i32, i32)]) -> Vec<Cell> {
        raw.iter().map(|&c| Cell::from(c)).collect()
    }

    #[test]
    fn test_heading_convention() {
        assert_eq!(Heading::South.step(), (0, 1));
        assert_eq!(Heading::West.step(), (-1, 0));
        assert_eq!(Heading::North.step(), (0, -1));
        assert_eq!(Heading::East.step(), (1, 0));
        assert_eq!(Heading::from_yaw(-90), Some(Heading::East));
        assert_eq!(Heading::from_yaw(45), None);
        for h in Heading::ALL {
            assert_eq!(Heading::from_yaw(h.yaw()), Some(h));
            assert_eq!(h.turned_right().turned_left(), h);
            assert_eq!(h.angle_to(h.turned_right()), 90);
            assert_eq!(h.angle_to(h.turned_left()), -90);
            assert_eq!(h.angle_to(h.turned_right().turned_right()), 180);
        }
    }

    #[test]
    fn test_short_paths_need_no_actions() {
        assert!(plan_actions(&[], Heading::South).unwrap().is_empty());
        assert!(plan_actions(&cells(&[(1, 1)]), Heading::North).unwrap().is_empty());
    }

    #[test]
    fn test_straight_ahead_is_moves_only() {
        let path = cells(&[(1, 1), (1, 2), (1, 3)]);
        let actions = plan_actions(&path, Heading::South).unwrap();
        assert_eq!(
            actions,
            vec![
                Action { command: Command::MoveForward, target: Cell::new(1, 2) },
                Action { command: Command::MoveForward, target: Cell::new(1, 3) },
            ]
        );
    }

    #[test]
    fn test_turns_keep_current_cell() {
        // Facing +z, step to +x is a left turn (yaw 0 -> 270).
        let path = cells(&[(1, 1), (2, 1)]);
        let actions = plan_actions(&path, Heading::South).unwrap();
        assert_eq!(
            actions,
            vec![
                Action { command: Command::TurnLeft, target: Cell::new(1, 1) },
                Action { command: Command::MoveForward, target: Cell::new(2, 1) },
            ]
        );
    }

    #[test]
    fn test_reverse_uses_two_turns_same_sense() {
        let path = cells(&[(3, 3), (3, 2)]);
        let actions = plan_actions(&path, Heading::South).unwrap();
        let commands: Vec<_> = actions.iter().map(|a| a.command).collect();
        assert_eq!(commands, vec![Command::TurnRight, Command::TurnRight, Command::MoveForward]);
        assert_eq!(actions[0].target, Cell::new(3, 3));
        assert_eq!(actions[1].target, Cell::new(3, 3));
    }

    #[test]
    fn test_replay_reconstructs_path() {
        let path = cells(&[(1, 1), (2, 1), (3, 1), (3, 2), (3, 3), (2, 3), (1, 3), (1, 2)]);
        for heading in Heading::ALL {
            let actions = plan_actions(&path, heading).unwrap();
            let result = replay(path[0], heading, actions.iter().map(|a| a.command));
            assert_eq!(result.visited, path);
            assert_eq!(result.heading, Heading::North);
            for action in &actions {
                assert!(path.contains(&action.target));
            }
        }
    }

    #[test]
    fn test_non_adjacent_step_is_rejected() {
        let path = cells(&[(1, 1), (1, 3)]);
        assert_eq!(
            plan_actions(&path, Heading::South).unwrap_err(),
            PlanError::NonAdjacentStep { index: 1, from: Cell::new(1, 1), to: Cell::new(1, 3) }
        );
    }

    #[test]
    fn test_tokens_roundtrip() {
        for cmd in [Command::TurnLeft, Command::TurnRight, Command::MoveForward] {
            assert_eq!(Command::from_token(cmd.token()), Some(cmd));
        }
        assert_eq!(Command::from_token("quit"), None);
    }
}
