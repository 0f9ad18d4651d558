// probe.rs - Best-effort TCP reachability checks, advisory only

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::session::{Endpoint, EndpointPool};

/// Connect and immediately close. Never fails; any error reads as unreachable.
pub async fn tcp_open(endpoint: &Endpoint, limit: Duration) -> bool {
    let target = (endpoint.host.as_str(), endpoint.port);
    match timeout(limit, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            true
        }
        Ok(Err(e)) => {
            log::debug!("Probe {} failed: {}", endpoint, e);
            false
        }
        Err(_) => {
            log::debug!("Probe {} timed out after {:?}", endpoint, limit);
            false
        }
    }
}

/// Probe every endpoint in order and log a warning for each unreachable one.
///
/// Returns `(endpoint, reachable)` pairs; callers must not gate joining on it.
pub async fn check_pool(pool: &EndpointPool, limit: Duration) -> Vec<(Endpoint, bool)> {
    let mut results = Vec::with_capacity(pool.len());
    for endpoint in pool.iter() {
        let ok = tcp_open(endpoint, limit).await;
        log::info!("[CHECK] endpoint {} reachable: {}", endpoint, ok);
        if !ok {
            log::warn!("Start a client listening on {} before launching agents", endpoint);
        }
        results.push((endpoint.clone(), ok));
    }
    results
}
