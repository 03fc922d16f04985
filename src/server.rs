//! The listener: binds the TCP socket, wires up the single WebSocket
//! fallback route, and drives axum's accept loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{OriginalUri, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpSocket;
use tower_http::trace::TraceLayer;

use crate::error::Result;
use crate::hub::ChannelHub;
use crate::session::{self, Session};

#[derive(Clone)]
struct AppState {
    hub: Arc<ChannelHub>,
    ping_duration: Duration,
}

/// Binds `addr` and serves the relay until the process is terminated.
pub async fn run(addr: SocketAddr, ping_duration: Duration) -> Result<()> {
    let (listener, bound) = bind(addr)?;
    tracing::info!("listening on {}", bound);
    serve(listener, ping_duration).await
}

/// Binds a reuse-addr TCP socket to `addr`, returning the listener and the
/// address it actually bound to (useful for tests that bind port 0).
pub fn bind(addr: SocketAddr) -> Result<(tokio::net::TcpListener, SocketAddr)> {
    let socket = if addr.is_ipv6() {
        TcpSocket::new_v6()?
    } else {
        TcpSocket::new_v4()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    let tcp_listener = socket.listen(1024)?;
    let bound = tcp_listener.local_addr()?;
    Ok((tcp_listener, bound))
}

/// Drives axum's accept loop over an already-bound listener until the
/// process is terminated or the listener is dropped.
pub async fn serve(listener: tokio::net::TcpListener, ping_duration: Duration) -> Result<()> {
    let hub = Arc::new(ChannelHub::new());
    let state = AppState { hub, ping_duration };

    let app = Router::new()
        .fallback(upgrade_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Parses the request path into a role and channel name, rejecting anything
/// that isn't `/<name>/pub` or `/<name>/sub` with a bare 404 before ever
/// upgrading the connection — mirroring the reference server's rejection of
/// the request before the WebSocket accept handshake even begins.
async fn upgrade_handler(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    ws: WebSocketUpgrade,
) -> Response {
    match session::parse_path(uri.path()) {
        Some((role, channel_name)) => ws
            .on_upgrade(move |socket| async move {
                Session::run(socket, role, channel_name, state.hub, state.ping_duration).await;
            })
            .into_response(),
        None => (StatusCode::NOT_FOUND, "404 Not Found").into_response(),
    }
}
