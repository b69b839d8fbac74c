//! Shared types for the Corral fleet-management protocol.
//!
//! This crate holds everything both sides of the wire (and every server
//! crate) agree on: the status vocabulary, the typed protocol messages,
//! the frame codec, identifier rules, and the configuration model.

pub mod config;
pub mod error;
pub mod ident;
pub mod message;
pub mod status;
pub mod wire;

pub use error::{Error, Result};
pub use message::{ClientMessage, ServerMessage};
pub use status::Status;
