mod context;
mod errors;
mod participants;
mod playback;
mod queue;
mod requester;
mod schemas;
mod sessions;
mod sse;

use std::{
    env,
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
};

use jam_collab::Collab;
use log::info;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use context::ServerContext;
pub use errors::{ServerError, ServerResult};
pub use requester::{Requester, PARTICIPANT_HEADER};

/// The default port the server will listen on.
pub const DEFAULT_PORT: u16 = 9050;

pub type Router = axum::Router<ServerContext>;

#[derive(Debug, Error)]
pub enum StartError {
    #[error("JAM_SERVER_PORT must be a port number, got {0}")]
    InvalidPort(String),
    #[error("Could not serve: {0}")]
    Io(#[from] std::io::Error),
}

/// Starts the jam server, and the presence sweep that goes with it
pub async fn run_server(collab: Arc<Collab>) -> Result<(), StartError> {
    let port = match env::var("JAM_SERVER_PORT") {
        Ok(value) => value
            .parse::<u16>()
            .map_err(|_| StartError::InvalidPort(value))?,
        Err(_) => DEFAULT_PORT,
    };

    let addr: SocketAddr = (Ipv6Addr::UNSPECIFIED, port).into();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let version_one_router = Router::new()
        .merge(sessions::router())
        .merge(participants::router())
        .merge(queue::router())
        .merge(playback::router())
        .merge(sse::router());

    let root_router = Router::new()
        .nest("/v1", version_one_router)
        .layer(cors)
        .with_state(ServerContext::new(collab.clone()));

    let listener = TcpListener::bind(&addr).await?;

    spawn_presence_sweep(collab);
    info!("Listening on port {}", port);

    axum::serve(listener, root_router).await?;
    Ok(())
}

fn spawn_presence_sweep(collab: Arc<Collab>) {
    let period = collab.config().sweep_interval();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);

        loop {
            interval.tick().await;
            collab.presence.sweep();
        }
    });
}
