//! Corral server library.
//!
//! The binary in `main.rs` wires configuration into [`state::AppState`]
//! and hands accepted sockets to [`connection::serve_connection`], the
//! per-connection protocol state machine. Everything here is also
//! reachable from the integration tests, which run the same listener
//! in-process.

pub mod attest;
pub mod auth;
pub mod connection;
pub mod mailer;
pub mod session;
pub mod state;
pub mod tls;

pub use connection::serve;
pub use state::AppState;
