//! Typed protocol messages.
//!
//! Control frames carry one JSON-encoded message each. Client messages
//! are tagged by the `op` field with the protocol opcode; server
//! messages are tagged by `msg`. Binary payloads (images, temperature
//! listings) are not messages: they follow a `DATA` reply as a raw
//! length-prefixed byte stream (see [`crate::wire`]).

use crate::status::Status;
use serde::{Deserialize, Serialize};

/// Messages sent by the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Start user authentication. `password` is present in password
    /// mode only; certificate mode answers the server challenge with
    /// [`ClientMessage::AuthResponse`] instead.
    AuthUser {
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },
    /// Answer a certificate-mode challenge: the echoed nonce, a
    /// signature over it, and (first contact only) the public key to
    /// bind to the account.
    AuthResponse {
        nonce: u64,
        signature: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        certificate: Option<String>,
    },
    /// Return the second-factor code.
    TwoFactor { code: u32 },
    /// Request a device session.
    AuthDevice { device_id: String },
    /// Request an attestation challenge.
    Attest,
    /// Answer an attestation challenge with the computed digest.
    AttestResponse { digest: String },
    /// Create a domain owned by the caller.
    Create { domain: String },
    /// Add a user to a domain the caller owns.
    Add { user_id: String, domain: String },
    /// Register the session device into a domain.
    RegisterDevice { domain: String },
    /// Publish the session device's latest temperature.
    SetTemperature { value: f32 },
    /// Announce an image upload; exactly `len` payload bytes follow.
    UploadImage { name: String, len: u64 },
    /// Read the latest temperatures of a domain's devices.
    ReadTemperatures { domain: String },
    /// Read the latest image of a device.
    ReadImage { full_id: String },
    /// Close the session.
    Disconnect,
}

impl ClientMessage {
    /// Every opcode the protocol understands, in wire spelling.
    pub const KNOWN_OPS: &'static [&'static str] = &[
        "AUTH_USER",
        "AUTH_RESPONSE",
        "TWO_FACTOR",
        "AUTH_DEVICE",
        "ATTEST",
        "ATTEST_RESPONSE",
        "CREATE",
        "ADD",
        "REGISTER_DEVICE",
        "SET_TEMPERATURE",
        "UPLOAD_IMAGE",
        "READ_TEMPERATURES",
        "READ_IMAGE",
        "DISCONNECT",
    ];

    /// Wire opcode of this message.
    pub fn op(&self) -> &'static str {
        match self {
            Self::AuthUser { .. } => "AUTH_USER",
            Self::AuthResponse { .. } => "AUTH_RESPONSE",
            Self::TwoFactor { .. } => "TWO_FACTOR",
            Self::AuthDevice { .. } => "AUTH_DEVICE",
            Self::Attest => "ATTEST",
            Self::AttestResponse { .. } => "ATTEST_RESPONSE",
            Self::Create { .. } => "CREATE",
            Self::Add { .. } => "ADD",
            Self::RegisterDevice { .. } => "REGISTER_DEVICE",
            Self::SetTemperature { .. } => "SET_TEMPERATURE",
            Self::UploadImage { .. } => "UPLOAD_IMAGE",
            Self::ReadTemperatures { .. } => "READ_TEMPERATURES",
            Self::ReadImage { .. } => "READ_IMAGE",
            Self::Disconnect => "DISCONNECT",
        }
    }
}

/// Messages sent by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// Certificate-mode challenge. `user_status` tells the client
    /// whether this is a first contact (`OK_NEW_USER`) or a known
    /// account (`OK_USER`).
    Challenge { user_status: Status, nonce: u64 },
    /// Authentication stage outcome. When `second_factor` is true the
    /// client must follow up with [`ClientMessage::TwoFactor`].
    Auth { status: Status, second_factor: bool },
    /// Attestation challenge nonce.
    AttestChallenge { nonce: u64 },
    /// Plain status reply.
    Status { code: Status },
    /// Status reply announcing a payload: exactly `len` raw bytes
    /// follow the frame.
    Data { code: Status, len: u64 },
}
