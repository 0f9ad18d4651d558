// mission_runner/src/http_server.rs
use futures_util::{SinkExt, StreamExt};
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use warp::http::StatusCode;
use warp::ws::{Message, WebSocket};
use warp::{Filter, Rejection, Reply};

use crate::position_feed::{PositionBoard, PositionSnapshot};
use crate::session::{AgentRole, SessionId};

pub const DEFAULT_PORT: u16 = 3030;

// ============= Custom Error Handling =============

#[derive(Debug)]
struct ServiceError {
    message: String,
    status_code: StatusCode,
}

impl warp::reject::Reject for ServiceError {}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let code;
    let message;

    if err.is_not_found() {
        code = StatusCode::NOT_FOUND;
        message = "Not Found";
    } else if let Some(service_err) = err.find::<ServiceError>() {
        code = service_err.status_code;
        message = service_err.message.as_str();
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        code = StatusCode::METHOD_NOT_ALLOWED;
        message = "Method Not Allowed";
    } else {
        log::error!("unhandled rejection: {:?}", err);
        code = StatusCode::INTERNAL_SERVER_ERROR;
        message = "Internal Server Error";
    }

    let json = warp::reply::json(&serde_json::json!({
        "error": message,
        "status_code": code.as_u16(),
    }));

    Ok(warp::reply::with_status(json, code))
}

// ============= Shared State =============

#[derive(Clone)]
pub struct ServerState {
    board: PositionBoard,
    session: SessionId,
}

impl ServerState {
    pub fn new(board: PositionBoard, session: SessionId) -> Self {
        Self { board, session }
    }
}

fn with_state(state: ServerState) -> impl Filter<Extract = (ServerState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn with_cors() -> warp::cors::Builder {
    warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["Accept", "Content-Type"])
        .allow_methods(vec!["GET", "OPTIONS"])
        .max_age(3600)
}

// ============= Position Streaming =============

async fn handle_position_stream(ws: WebSocket, state: ServerState) {
    log::info!("New position WebSocket connection");

    let (mut ws_sender, mut ws_receiver) = ws.split();
    let (snapshot_tx, mut snapshot_rx) = mpsc::unbounded_channel::<PositionSnapshot>();

    // Current positions first, then one forwarder per role slot
    for snapshot in state.board.snapshot() {
        let _ = snapshot_tx.send(snapshot);
    }
    let forwarders: Vec<_> = state
        .board
        .subscribe_all()
        .into_iter()
        .map(|mut slot| {
            let tx = snapshot_tx.clone();
            tokio::spawn(async move {
                while slot.changed().await.is_ok() {
                    let latest = slot.borrow_and_update().clone();
                    if let Some(snapshot) = latest {
                        if tx.send(snapshot).is_err() {
                            break;
                        }
                    }
                }
            })
        })
        .collect();
    drop(snapshot_tx);

    loop {
        tokio::select! {
            Some(snapshot) = snapshot_rx.recv() => {
                let text = match serde_json::to_string(&snapshot) {
                    Ok(text) => text,
                    Err(e) => {
                        log::error!("Failed to encode position: {}", e);
                        continue;
                    }
                };
                if ws_sender.send(Message::text(text)).await.is_err() {
                    break; // Connection closed
                }
            }

            incoming = ws_receiver.next() => match incoming {
                Some(Ok(msg)) if msg.is_close() => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    log::warn!("Position stream error: {}", e);
                    break;
                }
                None => break,
            }
        }
    }

    for forwarder in forwarders {
        forwarder.abort();
    }
    log::info!("Position WebSocket closed");
}

// ============= Request Handlers =============

async fn handle_health(state: ServerState) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&serde_json::json!({
        "status": "healthy",
        "service": "mission-runner",
        "version": env!("CARGO_PKG_VERSION"),
        "session": state.session.as_str(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

async fn handle_positions(state: ServerState) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&state.board.snapshot()))
}

async fn handle_role_position(role: u32, state: ServerState) -> Result<impl Reply, Rejection> {
    if role >= state.board.roles() {
        return Err(warp::reject::custom(ServiceError {
            message: format!("Unknown role {}", role),
            status_code: StatusCode::NOT_FOUND,
        }));
    }
    match state.board.latest(AgentRole(role)) {
        Some(snapshot) => Ok(warp::reply::json(&snapshot)),
        None => Err(warp::reject::custom(ServiceError {
            message: format!("Role {} has not reported a position yet", role),
            status_code: StatusCode::NOT_FOUND,
        })),
    }
}

// ============= Server Initialization =============

pub fn routes(state: ServerState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health = warp::path("health")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_health);

    let positions = warp::path("positions")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_positions);

    let role_position = warp::path!("positions" / u32)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(handle_role_position);

    let stream = warp::path("stream")
        .and(warp::ws())
        .and(with_state(state))
        .map(|ws: warp::ws::Ws, state: ServerState| {
            ws.on_upgrade(move |websocket| handle_position_stream(websocket, state))
        });

    health
        .or(positions)
        .or(role_position)
        .or(stream)
        .recover(handle_rejection)
        .with(with_cors())
        .with(warp::log("mission_runner"))
}

/// Port from the command line, then `MISSION_RUNNER_PORT`, then the default.
pub fn resolve_port(cli: Option<u16>) -> u16 {
    cli.or_else(|| {
        std::env::var("MISSION_RUNNER_PORT")
            .ok()
            .and_then(|raw| raw.parse::<u16>().ok())
    })
    .unwrap_or(DEFAULT_PORT)
}

/// Serve until `shutdown` fires.
pub async fn start_server(state: ServerState, port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let (bound, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(addr, async move { shutdown.cancelled().await })?;

    log::info!("Position feed listening on {}", bound);
    server.await;
    log::info!("Position feed stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use maze_solver::Cell;

    fn state() -> ServerState {
        let board = PositionBoard::new(2);
        board.publish(PositionSnapshot::planned(AgentRole(0), Cell::new(1, 3)));
        ServerState::new(board, SessionId::new("shared_mission_test"))
    }

    #[tokio::test]
    async fn test_health_reports_session() {
        let res = warp::test::request().path("/health").reply(&routes(state())).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["session"], "shared_mission_test");
    }

    #[tokio::test]
    async fn test_positions_lists_reported_roles() {
        let res = warp::test::request().path("/positions").reply(&routes(state())).await;
        assert_eq!(res.status(), StatusCode::OK);
        let body: Vec<PositionSnapshot> = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].cell, Cell::new(1, 3));
    }

    #[tokio::test]
    async fn test_missing_role_is_not_found() {
        let filter = routes(state());
        let silent = warp::test::request().path("/positions/1").reply(&filter).await;
        assert_eq!(silent.status(), StatusCode::NOT_FOUND);
        let unknown = warp::test::request().path("/positions/9").reply(&filter).await;
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
        let found = warp::test::request().path("/positions/0").reply(&filter).await;
        assert_eq!(found.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_stream_pushes_updates() {
        let state = state();
        let board = state.board.clone();
        let mut client = warp::test::ws().path("/stream").handshake(routes(state)).await.unwrap();

        let first: PositionSnapshot = serde_json::from_str(client.recv().await.unwrap().to_str().unwrap()).unwrap();
        assert_eq!(first.cell, Cell::new(1, 3));

        board.publish(PositionSnapshot::planned(AgentRole(1), Cell::new(9, 9)));
        let next: PositionSnapshot = serde_json::from_str(client.recv().await.unwrap().to_str().unwrap()).unwrap();
        assert_eq!(next.role, AgentRole(1));
    }

    #[test]
    fn test_cli_port_wins() {
        assert_eq!(resolve_port(Some(8080)), 8080);
    }
}
