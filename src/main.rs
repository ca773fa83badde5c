use std::sync::Arc;

use colored::Colorize;
use jam_collab::{Collab, Config};
use jam_server::StartError;
use log::{error, info};
use thiserror::Error;
use tokio::runtime;

mod logging;

#[derive(Debug, Error)]
enum JamError {
    #[error("Could not build the async runtime: {0}")]
    Runtime(std::io::Error),

    #[error("{0}")]
    Server(#[from] StartError),
}

impl JamError {
    fn hint(&self) -> &'static str {
        match self {
            JamError::Runtime(_) => "This error is fatal, and should not happen.",
            JamError::Server(StartError::InvalidPort(_)) => {
                "Set JAM_SERVER_PORT to a number between 1 and 65535, or unset it to use the default."
            }
            JamError::Server(StartError::Io(_)) => {
                "Make sure the port is free and that you are allowed to listen on it."
            }
        }
    }
}

fn run() -> Result<(), JamError> {
    let config = Config::from_env();
    info!(
        "Heartbeats every {}ms, inactive after {} missed",
        config.heartbeat_interval.num_milliseconds(),
        config.missed_heartbeats
    );

    let collab = Arc::new(Collab::new(config));

    let runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("jam-async")
        .build()
        .map_err(JamError::Runtime)?;

    runtime.block_on(jam_server::run_server(collab))?;
    Ok(())
}

fn main() {
    if let Err(error) = logging::init_logger() {
        eprintln!("Could not initialize logging: {error}");
    }

    if let Err(error) = run() {
        error!("{}", "Jam failed to start!".bold().red());
        error!("{}", error);
        error!("{}", format!("Hint: {}", error.hint()).dimmed().italic());
    }
}
