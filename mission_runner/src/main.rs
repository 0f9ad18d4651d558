// main.rs - Generate a maze, plan the route and run both agents through one shared session

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use maze_solver::{bfs_distances, PathFinder};
use mission_runner::http_server::{self, ServerState};
use mission_runner::{
    plan_for_role, AgentRole, CoordinatorOutcome, LocalSessionServer, MissionError, PositionBoard, RendezvousLauncher,
    RunnerConfig, SceneBuilder,
};

/// CLI
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON configuration file; missing keys keep their defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maze seed (random when omitted)
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Maze side length, odd and at least 5
    #[arg(long)]
    pub size: Option<usize>,

    /// Delay between starting role 0 and the other roles
    #[arg(long)]
    pub stagger_ms: Option<u64>,

    /// Give up joining after this many seconds
    #[arg(long)]
    pub join_deadline_secs: Option<u64>,

    /// TCP-probe the configured endpoints before joining. Only useful against a real
    /// engine: the built-in simulator does not listen on them, so every probe warns.
    #[arg(long)]
    pub probe: bool,

    /// Print the generated maze before launching
    #[arg(long)]
    pub print_maze: bool,

    /// Serve agent positions over HTTP and WebSocket
    #[arg(long)]
    pub serve_positions: bool,

    /// Port for --serve-positions (falls back to MISSION_RUNNER_PORT, then 3030)
    #[arg(short, long)]
    pub port: Option<u16>,
}

async fn load_config(args: &Args) -> Result<RunnerConfig> {
    let mut config = match &args.config {
        Some(path) => RunnerConfig::load(path)
            .await
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RunnerConfig::default(),
    };

    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    if let Some(size) = args.size {
        config.maze_size = size;
    }
    if let Some(stagger) = args.stagger_ms {
        config.stagger_ms = stagger;
    }
    if let Some(secs) = args.join_deadline_secs {
        config.set_join_deadline_secs(secs);
    }
    if args.probe {
        config.probe_endpoints = true;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    info!("Starting with {args:?}");

    let config = load_config(&args).await?;
    let seed = config.seed.unwrap_or_else(rand::random);

    // Maze, route and plans are fixed before any agent starts
    let generator = config.generator()?;
    let grid = generator.generate_seeded(seed);
    let (start, end) = (generator.start(), generator.default_end());
    info!("Generated {0}x{0} maze with seed {1}, {2} open cells", grid.size(), seed, grid.open_count());

    if args.print_maze {
        println!("{grid}");
    }

    let path = PathFinder::new(&grid).shortest_path(start, end);
    if path.is_empty() {
        return Err(MissionError::NoRoute { from: start, to: end }.into());
    }
    let shortest = bfs_distances(&grid, start).get(&end).copied();
    info!("Route {} -> {}: {} cells (breadth-first distance {:?})", start, end, path.len(), shortest);

    let scene = SceneBuilder::new(&grid, start, end)
        .roles(config.roles)
        .time_limit(config.time_limit())
        .build();

    let server = LocalSessionServer::new(grid.clone(), start, end, config.simulation_options());
    let board = PositionBoard::new(config.roles);
    let cancel = CancellationToken::new();

    let mut launcher = RendezvousLauncher::new(scene, config.endpoint_pool(), config.launch_settings(), {
        let server = server.clone();
        move |role: AgentRole| server.host(role)
    })
    .with_positions(board.clone())
    .with_cancel(cancel.clone());

    for role in config.navigating() {
        let actions = plan_for_role(role, &path, start, end)?;
        info!("{} will send {} commands", role.agent_name(), actions.len());
        launcher = launcher.with_plan(role, actions);
    }

    let feed = if args.serve_positions {
        let state = ServerState::new(board.clone(), launcher.session().clone());
        let port = http_server::resolve_port(args.port);
        let shutdown = cancel.child_token();
        Some(tokio::spawn(async move {
            if let Err(e) = http_server::start_server(state, port, shutdown).await {
                error!("Position feed failed: {e:#}");
            }
        }))
    } else {
        None
    };

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling all roles");
                cancel.cancel();
            }
        });
    }

    let session = launcher.session().clone();
    let report = launcher.launch().await;

    for r in &report.reports {
        info!(
            "{} role={}: {:?} after {:?} ({} join attempts, {} commands)",
            r.role.agent_name(),
            r.role,
            r.outcome,
            r.elapsed,
            r.join_attempts,
            r.commands_sent
        );
    }
    for position in board.snapshot() {
        info!("{} last seen at {}", position.agent, position.cell);
    }
    if let Some(cell) = server.agent_cell(&session, AgentRole::CREATOR).await {
        info!("AgentA finished on {} (goal {})", cell, end);
    }

    cancel.cancel();
    if let Some(feed) = feed {
        let _ = feed.await;
    }

    if !report.all_completed() {
        let timed_out = report.timed_out_roles();
        let aborted = report.roles_with(CoordinatorOutcome::AbortedError);
        bail!(
            "Session '{}' did not complete: timed out {:?}, aborted {:?}",
            report.session,
            timed_out,
            aborted
        );
    }

    info!("Session '{}' completed", report.session);
    Ok(())
}
