//! The Spindle daemon.
//!
//! `spindled` hosts a procedure router over a TCP or Unix socket with a
//! minimal HTTP/1.1 surface. The startup sequence is deliberately small:
//! load configuration, install structured telemetry, build the router,
//! bind the listener, and serve until a termination signal arrives. Each
//! accepted connection carries one request/response exchange handled by
//! [`RpcConnectionHandler`], which lowers the wire request into the
//! resolution engine from `spindle-http` and writes the engine's framing
//! decisions back as HTTP.

use std::io;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

mod config;
mod http;
mod service;
pub mod telemetry;
mod transport;

pub use config::{Config, ConfigError, LogFormat, SocketEndpoint};
pub use service::{DaemonContext, RpcConnectionHandler, demo_router};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{
    ConnectionHandler, ConnectionStream, ListenerError, ListenerHandle, SocketListener,
};

const DAEMON_TARGET: &str = env!("CARGO_PKG_NAME");

/// Errors that abort daemon startup or shutdown.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration could not be assembled.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// Telemetry could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The built-in router failed to build.
    #[error("router construction failed: {0}")]
    Router(#[from] spindle_core::RouterBuildError),
    /// The socket listener failed.
    #[error(transparent)]
    Listener(#[from] ListenerError),
    /// Termination signal handlers could not be installed.
    #[error("failed to install signal handler: {0}")]
    Signals(#[source] io::Error),
}

/// Runs the daemon until a termination signal arrives.
///
/// # Errors
///
/// Returns a [`DaemonError`] when startup fails or shutdown cannot
/// complete cleanly.
pub fn run() -> Result<(), DaemonError> {
    let config = Config::load()?;
    telemetry::initialise(&config)?;

    let router = Arc::new(demo_router()?);
    let listener = SocketListener::bind(config.socket())?;
    let handler = Arc::new(RpcConnectionHandler::new(router, &config));
    let handle = listener.start(handler)?;
    info!(
        target: DAEMON_TARGET,
        endpoint = %config.socket(),
        prefix = config.endpoint(),
        "daemon serving"
    );

    wait_for_termination().map_err(DaemonError::Signals)?;
    info!(target: DAEMON_TARGET, "termination signal received, shutting down");
    handle.shutdown();
    handle.join()?;
    Ok(())
}

/// Blocks until any of the platform's termination signals fires.
fn wait_for_termination() -> io::Result<()> {
    let stop = Arc::new(AtomicBool::new(false));
    for signal in signal_hook::consts::TERM_SIGNALS {
        signal_hook::flag::register(*signal, Arc::clone(&stop))?;
    }
    while !stop.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }
    Ok(())
}
