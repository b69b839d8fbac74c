//! Protocol status vocabulary.
//!
//! Every server reply carries one of these codes. The wire spelling is
//! the upper-snake form (`OK_NEW_USER`), matching the textual status
//! lines the protocol exchanges.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status codes returned to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Generic success.
    Ok,
    /// Authentication succeeded and a new account was provisioned.
    OkNewUser,
    /// Authentication succeeded for a known account.
    OkUser,
    /// Device session admitted.
    OkDevid,
    /// Device session rejected (user already has an online device).
    NokDevid,
    /// Attestation accepted.
    OkTested,
    /// Attestation rejected.
    NokTested,
    /// Password did not match the stored credential.
    WrongPassword,
    /// Challenge signature or nonce echo did not verify.
    WrongNonce,
    /// Second-factor code did not match.
    WrongCode,
    /// Domain does not exist.
    NoSuchDomain,
    /// Caller is not the domain owner.
    NotOwner,
    /// Caller is neither owner nor member of the domain.
    NotMember,
    /// Target user is not a known identity.
    NoSuchUser,
    /// Domain name already taken.
    AlreadyExists,
    /// Target user is already a domain member.
    AlreadyMember,
    /// Device is already registered in the domain.
    AlreadyRegistered,
    /// Device id is not in the catalog.
    NoSuchDevice,
    /// No data has been published for the request.
    NoData,
    /// Caller may not read from the target device.
    NotPermitted,
    /// Command opcode not recognized.
    UnknownCommand,
    /// Generic failure (malformed value or persistence error).
    Nok,
}

impl Status {
    /// Wire spelling of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::OkNewUser => "OK_NEW_USER",
            Self::OkUser => "OK_USER",
            Self::OkDevid => "OK_DEVID",
            Self::NokDevid => "NOK_DEVID",
            Self::OkTested => "OK_TESTED",
            Self::NokTested => "NOK_TESTED",
            Self::WrongPassword => "WRONG_PASSWORD",
            Self::WrongNonce => "WRONG_NONCE",
            Self::WrongCode => "WRONG_CODE",
            Self::NoSuchDomain => "NO_SUCH_DOMAIN",
            Self::NotOwner => "NOT_OWNER",
            Self::NotMember => "NOT_MEMBER",
            Self::NoSuchUser => "NO_SUCH_USER",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::AlreadyMember => "ALREADY_MEMBER",
            Self::AlreadyRegistered => "ALREADY_REGISTERED",
            Self::NoSuchDevice => "NO_SUCH_DEVICE",
            Self::NoData => "NO_DATA",
            Self::NotPermitted => "NOT_PERMITTED",
            Self::UnknownCommand => "UNKNOWN_COMMAND",
            Self::Nok => "NOK",
        }
    }

    /// Whether the code reports success.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Ok | Self::OkNewUser | Self::OkUser | Self::OkDevid | Self::OkTested
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_spelling_matches_serde() {
        let json = serde_json::to_string(&Status::OkNewUser).unwrap();
        assert_eq!(json, "\"OK_NEW_USER\"");

        let parsed: Status = serde_json::from_str("\"NO_SUCH_DOMAIN\"").unwrap();
        assert_eq!(parsed, Status::NoSuchDomain);
    }

    #[test]
    fn success_classification() {
        assert!(Status::OkDevid.is_success());
        assert!(!Status::NokDevid.is_success());
        assert!(!Status::NoData.is_success());
    }
}
