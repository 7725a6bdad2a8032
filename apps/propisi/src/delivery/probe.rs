//! Optional liveness probe used to reorder a roster before an operation.
//!
//! Never needed for correctness: a dead endpoint left in front only costs a
//! failed attempt.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::delivery::{Endpoint, EndpointRoster};

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Answers 2xx on `GET /health`, or failing that on `GET /`.
pub async fn is_live(client: &Client, endpoint: &Endpoint, timeout: Duration) -> bool {
    for path in ["/health", "/"] {
        let url = endpoint.join(path);
        match client.get(url.clone()).timeout(timeout).send().await {
            Ok(response) if response.status().is_success() => return true,
            Ok(response) => debug!(%url, status = %response.status(), "probe not ok"),
            Err(e) => debug!(%url, "probe failed: {e}"),
        }
    }
    false
}

/// Moves live endpoints to the front, keeping relative order within each
/// group. The returned roster starts at cursor 0.
pub async fn reorder_by_liveness(
    client: &Client,
    roster: &EndpointRoster,
    timeout: Duration,
) -> EndpointRoster {
    let mut live = Vec::new();
    let mut dead = Vec::new();
    for endpoint in roster.endpoints() {
        if is_live(client, endpoint, timeout).await {
            live.push(endpoint.clone());
        } else {
            dead.push(endpoint.clone());
        }
    }
    debug!(live = live.len(), dead = dead.len(), "roster probed");
    live.extend(dead);
    // Same endpoints as a non-empty roster, so this cannot be empty.
    EndpointRoster::new(live).unwrap_or_else(|_| roster.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    /// A port that was bound and released, so nothing listens there.
    async fn dead_address() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_live_endpoints_move_to_front_in_order() {
        let health_only = spawn(Router::new().route("/health", get(|| async { "ok" }))).await;
        let root_only = spawn(Router::new().route("/", get(|| async { "propisi" }))).await;
        let dead = dead_address().await;

        let roster =
            EndpointRoster::parse_list(&format!("{dead},{health_only},{root_only}")).unwrap();
        let reordered =
            reorder_by_liveness(&Client::new(), &roster, Duration::from_secs(2)).await;

        let order: Vec<String> = reordered.endpoints().iter().map(|e| e.to_string()).collect();
        assert_eq!(order, vec![health_only, root_only, dead]);
        assert_eq!(reordered.current(), &reordered.endpoints()[0]);
    }
}
