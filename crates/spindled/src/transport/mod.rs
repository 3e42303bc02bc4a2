//! Socket transport for the daemon.
//!
//! The transport binds the configured endpoint, accepts connections on a
//! background thread, and hands each accepted stream to a
//! [`ConnectionHandler`] on its own worker thread. One connection carries
//! one request/response exchange.

mod errors;
mod listener;
mod stream;

pub use self::errors::ListenerError;
pub use self::listener::{ListenerHandle, SocketListener};
pub use self::stream::{ConnectionHandler, ConnectionStream};

pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
