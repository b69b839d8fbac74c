//! Identifier rules.
//!
//! User ids, device ids, domain names, and image names all end up as
//! fields in colon-separated snapshot lines, so the accepted alphabet
//! must exclude every separator the snapshot formats use.

use crate::error::{Error, Result};

/// Maximum identifier length.
pub const MAX_IDENT_LEN: usize = 128;

/// Validate a user id, device id, or domain name.
///
/// Accepted alphabet: ASCII alphanumerics plus `_`, `.`, `@`, `-`.
pub fn validate_ident(s: &str) -> Result<()> {
    if s.is_empty() || s.len() > MAX_IDENT_LEN {
        return Err(Error::InvalidIdentifier(s.to_string()));
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@' | '-'))
    {
        return Err(Error::InvalidIdentifier(s.to_string()));
    }
    Ok(())
}

/// Validate an image name (same alphabet as identifiers, but a leading
/// dot is rejected so stored files are never hidden or `..`).
pub fn validate_image_name(s: &str) -> Result<()> {
    validate_ident(s)?;
    if s.starts_with('.') {
        return Err(Error::InvalidIdentifier(s.to_string()));
    }
    Ok(())
}

/// Compose the composite device key `userId:devId`.
pub fn full_id(user_id: &str, device_id: &str) -> String {
    format!("{user_id}:{device_id}")
}

/// Split a composite device key into `(userId, devId)`.
pub fn split_full_id(full_id: &str) -> Result<(&str, &str)> {
    let (user_id, device_id) = full_id
        .split_once(':')
        .ok_or_else(|| Error::InvalidFullId(full_id.to_string()))?;
    validate_ident(user_id).map_err(|_| Error::InvalidFullId(full_id.to_string()))?;
    validate_ident(device_id).map_err(|_| Error::InvalidFullId(full_id.to_string()))?;
    Ok((user_id, device_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        for ok in ["alice", "dev-1", "home_lab", "a.b@c"] {
            assert!(validate_ident(ok).is_ok(), "{ok}");
        }
    }

    #[test]
    fn rejects_separator_characters() {
        for bad in ["", "a:b", "a\tb", "a,b", "a b", "a\nb"] {
            assert!(validate_ident(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn rejects_hidden_image_names() {
        assert!(validate_image_name(".hidden").is_err());
        assert!(validate_image_name("..").is_err());
        assert!(validate_image_name("photo.png").is_ok());
    }

    #[test]
    fn full_id_roundtrip() {
        let id = full_id("alice", "1");
        assert_eq!(id, "alice:1");
        assert_eq!(split_full_id(&id).unwrap(), ("alice", "1"));
        assert!(split_full_id("no-colon").is_err());
        assert!(split_full_id("bad id:1").is_err());
    }
}
