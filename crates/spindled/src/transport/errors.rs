//! Error types for socket listener operations.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors surfaced while binding or running the socket listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Resolving the configured TCP address failed.
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
        /// Underlying resolver failure.
        #[source]
        source: io::Error,
    },

    /// The configured host resolved to no usable addresses.
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
    },

    /// Binding the TCP listener failed.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        /// The resolved address.
        addr: SocketAddr,
        /// Underlying bind failure.
        #[source]
        source: io::Error,
    },

    /// Switching the listener to non-blocking mode failed.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Underlying failure.
        #[source]
        source: io::Error,
    },

    /// Unix endpoints cannot be served on this platform.
    #[cfg(not(unix))]
    #[error("unix sockets are unsupported for endpoint {endpoint}")]
    UnsupportedUnix {
        /// The rejected endpoint.
        endpoint: String,
    },

    /// Binding the Unix listener failed.
    #[cfg(unix)]
    #[error("failed to bind unix listener at {path}: {source}")]
    BindUnix {
        /// The socket path.
        path: String,
        /// Underlying bind failure.
        #[source]
        source: io::Error,
    },

    /// Another live daemon already serves the Unix socket.
    #[cfg(unix)]
    #[error("existing unix socket {path} is already in use")]
    UnixInUse {
        /// The socket path.
        path: String,
    },

    /// The configured socket path points at a non-socket file.
    #[cfg(unix)]
    #[error("unix socket path {path} is not a socket")]
    UnixNotSocket {
        /// The offending path.
        path: String,
    },

    /// Removing a stale socket file failed.
    #[cfg(unix)]
    #[error("failed to remove stale unix socket {path}: {source}")]
    UnixCleanup {
        /// The socket path.
        path: String,
        /// Underlying removal failure.
        #[source]
        source: io::Error,
    },

    /// The accept-loop thread panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}
