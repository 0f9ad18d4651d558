// scene.rs - Mission markup handed unchanged to every join call

use maze_solver::{plan_actions, Action, Cell, Grid, Heading};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use crate::error_handling::Result;
use crate::session::AgentRole;

/// Floor level agents stand on; walls are two blocks high above it.
pub const Y_LEVEL: i32 = 228;
const WALL_BLOCK: &str = "stonebrick";
const START_MARKER: &str = "grass";
const END_MARKER: &str = "emerald_block";
const SUMMARY: &str = "Multi-agent random maze";
/// Half-length of each arm of the corner walls around start and end.
const L_WALL_REACH: i32 = 2;

/// Where and how an agent enters the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spawn {
    pub cell: Cell,
    pub heading: Heading,
}

/// Even roles spawn on the start cell facing +z, odd roles on the end cell facing -z.
pub fn spawn_for(role: AgentRole, start: Cell, end: Cell) -> Spawn {
    if role.0 % 2 == 0 {
        Spawn { cell: start, heading: Heading::South }
    } else {
        Spawn { cell: end, heading: Heading::North }
    }
}

/// Commands that walk `path` from `role`'s own spawn; roles spawning on the end walk it backwards.
pub fn plan_for_role(role: AgentRole, path: &[Cell], start: Cell, end: Cell) -> Result<Vec<Action>> {
    let spawn = spawn_for(role, start, end);
    let route: Vec<Cell> = if spawn.cell == start {
        path.to_vec()
    } else {
        path.iter().rev().copied().collect()
    };
    Ok(plan_actions(&route, spawn.heading)?)
}

/// Immutable scene markup, cheap to clone across coordinators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneDescriptor {
    xml: Arc<str>,
    roles: u32,
}

impl SceneDescriptor {
    pub fn as_str(&self) -> &str {
        &self.xml
    }

    /// Number of agent sections in the markup.
    pub fn roles(&self) -> u32 {
        self.roles
    }
}

/// Builds mission markup from a generated grid.
#[derive(Debug, Clone)]
pub struct SceneBuilder<'g> {
    grid: &'g Grid,
    start: Cell,
    end: Cell,
    roles: u32,
    time_limit: Option<Duration>,
}

impl<'g> SceneBuilder<'g> {
    pub fn new(grid: &'g Grid, start: Cell, end: Cell) -> Self {
        Self {
            grid,
            start,
            end,
            roles: 2,
            time_limit: None,
        }
    }

    pub fn roles(mut self, roles: u32) -> Self {
        self.roles = roles;
        self
    }

    pub fn time_limit(mut self, limit: Option<Duration>) -> Self {
        self.time_limit = limit;
        self
    }

    fn in_clearing(cell: Cell, center: Cell) -> bool {
        (cell.x - center.x).abs() <= 1 && (cell.z - center.z).abs() <= 1
    }

    fn drawing(&self) -> String {
        let size = self.grid.size() as i32;
        let top = Y_LEVEL + 1;
        let mut out = String::new();

        // write! into a String cannot fail
        for z in 0..size {
            for x in 0..size {
                let cell = Cell::new(x, z);
                if self.grid.is_open(cell)
                    || Self::in_clearing(cell, self.start)
                    || Self::in_clearing(cell, self.end)
                {
                    continue;
                }
                for y in [Y_LEVEL, top] {
                    let _ = writeln!(out, r#"<DrawBlock x="{x}" y="{y}" z="{z}" type="{WALL_BLOCK}"/>"#);
                }
            }
        }

        for (center, marker) in [(self.start, START_MARKER), (self.end, END_MARKER)] {
            let _ = writeln!(
                out,
                r#"<DrawCuboid x1="{}" y1="{}" z1="{}" x2="{}" y2="{}" z2="{}" type="air"/>"#,
                center.x - 1,
                Y_LEVEL,
                center.z - 1,
                center.x + 1,
                top,
                center.z + 1
            );
            // Pillars only where they land on the outer ring, to keep corridors intact.
            for y in [Y_LEVEL, top] {
                for (dx, dz) in [(-2, -2), (2, -2), (-2, 2), (2, 2)] {
                    let pillar = center.offset(dx, dz);
                    if self.grid.contains(pillar) && self.grid.is_border(pillar) {
                        let _ = writeln!(
                            out,
                            r#"<DrawBlock x="{}" y="{y}" z="{}" type="{WALL_BLOCK}"/>"#,
                            pillar.x, pillar.z
                        );
                    }
                }
            }
            let _ = writeln!(
                out,
                r#"<DrawBlock x="{}" y="{}" z="{}" type="{marker}"/>"#,
                center.x,
                Y_LEVEL - 1,
                center.z
            );
        }

        for anchor in [self.start, self.end] {
            self.corner_wall(anchor, &mut out);
        }
        out
    }

    /// -1 near the low edge, 1 near the high edge, 0 in between.
    fn outward(&self, v: i32) -> i32 {
        let last = self.grid.size() as i32 - 1;
        if v <= L_WALL_REACH {
            -1
        } else if v >= last - L_WALL_REACH {
            1
        } else {
            0
        }
    }

    /// L-shaped wall, three high from the floor, on the outer side of an anchor near the edge.
    /// An arm is skipped on an axis where the anchor is not near either edge.
    fn corner_wall(&self, anchor: Cell, out: &mut String) {
        let (x_dir, z_dir) = (self.outward(anchor.x), self.outward(anchor.z));
        let reach = -L_WALL_REACH..=L_WALL_REACH;
        let mut blocks = Vec::new();
        if z_dir != 0 {
            blocks.extend(reach.clone().map(|d| anchor.offset(d, z_dir * L_WALL_REACH)));
        }
        if x_dir != 0 {
            blocks.extend(reach.map(|d| anchor.offset(x_dir * L_WALL_REACH, d)));
        }
        for block in blocks {
            for y in Y_LEVEL - 1..=Y_LEVEL + 1 {
                let _ = writeln!(
                    out,
                    r#"<DrawBlock x="{}" y="{y}" z="{}" type="{WALL_BLOCK}"/>"#,
                    block.x, block.z
                );
            }
        }
    }

    fn agent_section(&self, role: AgentRole) -> String {
        let spawn = spawn_for(role, self.start, self.end);
        format!(
            r#"  <AgentSection mode="Survival">
    <Name>{name}</Name>
    <AgentStart>
      <Placement x="{x}.5" y="{y}.0" z="{z}.5" yaw="{yaw}"/>
    </AgentStart>
    <AgentHandlers>
      <DiscreteMovementCommands/>
      <ObservationFromFullStats/>
    </AgentHandlers>
  </AgentSection>
"#,
            name = role.agent_name(),
            x = spawn.cell.x,
            y = Y_LEVEL,
            z = spawn.cell.z,
            yaw = spawn.heading.yaw(),
        )
    }

    pub fn build(&self) -> SceneDescriptor {
        let last = self.grid.size() as i32 - 1;
        let quit_handler = match self.time_limit {
            Some(limit) => format!(
                "\n      <ServerQuitFromTimeUp timeLimitMs=\"{}\"/>",
                limit.as_millis()
            ),
            None => String::new(),
        };
        let agents: String = (0..self.roles).map(|r| self.agent_section(AgentRole(r))).collect();

        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="no" ?>
<Mission xmlns="http://ProjectMalmo.microsoft.com" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" forceWorldReset="true">
  <About>
    <Summary>{summary}</Summary>
  </About>
  <ServerSection>
    <ServerInitialConditions>
      <Time><StartTime>1</StartTime></Time>
    </ServerInitialConditions>
    <ServerHandlers>
      <FlatWorldGenerator generatorString="3;7,220*1,5*3,2;3;,biome_1"/>
      <DrawingDecorator>
        <DrawCuboid x1="0" y1="{floor}" z1="0" x2="{last}" y2="{floor}" z2="{last}" type="sandstone"/>
        <DrawCuboid x1="0" y1="{y}" z1="0" x2="{last}" y2="{top}" z2="{last}" type="air"/>
{drawing}      </DrawingDecorator>{quit_handler}
    </ServerHandlers>
  </ServerSection>
{agents}</Mission>
"#,
            summary = SUMMARY,
            floor = Y_LEVEL - 1,
            y = Y_LEVEL,
            top = Y_LEVEL + 1,
            last = last,
            drawing = self.drawing(),
            quit_handler = quit_handler,
            agents = agents,
        );

        log::debug!("Built scene descriptor: {} bytes, {} agent sections", xml.len(), self.roles);
        SceneDescriptor {
            xml: xml.into(),
            roles: self.roles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::MissionError;
    use maze_solver::{Command, MazeGenerator, PathFinder};

    fn scene(roles: u32, limit: Option<Duration>) -> (Grid, SceneDescriptor) {
        let generator = MazeGenerator::new(11).unwrap();
        let grid = generator.generate_seeded(5);
        let descriptor = SceneBuilder::new(&grid, generator.start(), generator.default_end())
            .roles(roles)
            .time_limit(limit)
            .build();
        (grid, descriptor)
    }

    #[test]
    fn test_one_agent_section_per_role() {
        let (_, descriptor) = scene(2, None);
        let xml = descriptor.as_str();
        assert_eq!(xml.matches("<AgentSection").count(), 2);
        assert!(xml.contains("<Name>AgentA</Name>"));
        assert!(xml.contains(r#"<Placement x="1.5" y="228.0" z="1.5" yaw="0"/>"#));
        assert!(xml.contains(r#"<Placement x="9.5" y="228.0" z="9.5" yaw="180"/>"#));
        assert!(!xml.contains("ServerQuitFromTimeUp"));
    }

    #[test]
    fn test_markers_and_time_limit() {
        let (_, descriptor) = scene(2, Some(Duration::from_secs(30)));
        let xml = descriptor.as_str();
        assert!(xml.contains(r#"<DrawBlock x="1" y="227" z="1" type="grass"/>"#));
        assert!(xml.contains(r#"<DrawBlock x="9" y="227" z="9" type="emerald_block"/>"#));
        assert!(xml.contains(r#"<ServerQuitFromTimeUp timeLimitMs="30000"/>"#));
    }

    #[test]
    fn test_walls_are_two_high_outside_clearings() {
        let (grid, descriptor) = scene(2, None);
        let xml = descriptor.as_str();
        // Centre wall cell of the border, far from both clearings
        assert!(!grid.is_open(Cell::new(5, 0)));
        assert!(xml.contains(r#"<DrawBlock x="5" y="228" z="0" type="stonebrick"/>"#));
        assert!(xml.contains(r#"<DrawBlock x="5" y="229" z="0" type="stonebrick"/>"#));
        // (0,0) sits inside the start clearing
        assert!(!xml.contains(r#"<DrawBlock x="0" y="228" z="0" type="stonebrick"/>"#));
    }

    #[test]
    fn test_corner_walls_wrap_start_and_end() {
        let (_, descriptor) = scene(2, None);
        let xml = descriptor.as_str();
        // Start (1,1): arms along z = -1 and x = -1, from the floor up
        for x in -1..=3 {
            assert!(xml.contains(&format!(r#"<DrawBlock x="{x}" y="227" z="-1" type="stonebrick"/>"#)));
        }
        assert!(xml.contains(r#"<DrawBlock x="-1" y="229" z="3" type="stonebrick"/>"#));
        // End (9,9): arms along z = 11 and x = 11
        assert!(xml.contains(r#"<DrawBlock x="7" y="228" z="11" type="stonebrick"/>"#));
        assert!(xml.contains(r#"<DrawBlock x="11" y="227" z="7" type="stonebrick"/>"#));
    }

    #[test]
    fn test_corner_wall_skips_arm_away_from_edge() {
        let grid = MazeGenerator::new(11).unwrap().generate_seeded(5);
        let descriptor = SceneBuilder::new(&grid, Cell::new(5, 1), Cell::new(9, 9)).build();
        let xml = descriptor.as_str();
        assert!(xml.contains(r#"<DrawBlock x="3" y="227" z="-1" type="stonebrick"/>"#));
        // No arm through the anchor column
        assert!(!xml.contains(r#"<DrawBlock x="5" y="227" z="3" type="stonebrick"/>"#));
        assert!(!xml.contains(r#"<DrawBlock x="5" y="228" z="1" type="stonebrick"/>"#));
    }

    #[test]
    fn test_odd_roles_plan_the_reversed_route() {
        let generator = MazeGenerator::new(11).unwrap();
        let grid = generator.generate_seeded(5);
        let (start, end) = (generator.start(), generator.default_end());
        let path = PathFinder::new(&grid).shortest_path(start, end);

        let forward = plan_for_role(AgentRole(0), &path, start, end).unwrap();
        let backward = plan_for_role(AgentRole(1), &path, start, end).unwrap();
        assert_eq!(forward.last().map(|a| a.target), Some(end));
        assert_eq!(backward.last().map(|a| a.target), Some(start));
        let moves = |plan: &[Action]| plan.iter().filter(|a| a.command == Command::MoveForward).count();
        assert_eq!(moves(&forward), path.len() - 1);
        assert_eq!(moves(&backward), path.len() - 1);
    }

    #[test]
    fn test_broken_route_is_a_plan_error() {
        let path = [Cell::new(1, 1), Cell::new(3, 1)];
        let err = plan_for_role(AgentRole(0), &path, Cell::new(1, 1), Cell::new(9, 9)).unwrap_err();
        assert!(matches!(err, MissionError::Plan(_)));
    }

    #[test]
    fn test_spawns_alternate_by_role() {
        let (start, end) = (Cell::new(1, 1), Cell::new(9, 9));
        assert_eq!(spawn_for(AgentRole(0), start, end).cell, start);
        assert_eq!(spawn_for(AgentRole(1), start, end).heading, Heading::North);
        assert_eq!(spawn_for(AgentRole(2), start, end).cell, start);
    }
}
