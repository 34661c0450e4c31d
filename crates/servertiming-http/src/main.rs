//! servertiming demo server
//!
//! - Routes: `/`, `/db`, `/blocking`, `/fail`, `/quiet`
//! - Every response carries `Server-Timing` when metrics were recorded
//! - Per-request dumps are logged under the `servertiming` target

use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};

use servertiming_http::{app_state, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let cfg = config::load_or_default("servertiming.yaml").expect("config load failed");
    let state = app_state::AppState::new(cfg).expect("invalid app state");
    let listen: SocketAddr = state
        .cfg()
        .server
        .listen
        .parse()
        .expect("server.listen must be a valid SocketAddr");

    let app = router::build_router(state);

    tracing::info!(%listen, "servertiming demo starting");
    let listener = tokio::net::TcpListener::bind(listen).await.expect("failed to bind");

    axum::serve(listener, app).await.expect("server failed");
}
