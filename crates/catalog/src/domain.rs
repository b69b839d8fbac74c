//! Domain records.

use std::fmt::Write as _;

/// A named sharing group: one owner, an ordered member list, and an
/// ordered list of registered device full-ids.
///
/// The owner is implicitly a member for every permission check, whether
/// or not it appears in `members`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Domain {
    pub name: String,
    pub owner: String,
    members: Vec<String>,
    devices: Vec<String>,
}

impl Domain {
    /// Create a domain owned by `owner`.
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            members: Vec::new(),
            devices: Vec::new(),
        }
    }

    /// Whether the user is the owner.
    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner == user_id
    }

    /// Whether the user may act as a member (owner included).
    pub fn is_member(&self, user_id: &str) -> bool {
        self.is_owner(user_id) || self.members.iter().any(|m| m == user_id)
    }

    /// Append a member. Returns false when already present (the owner
    /// counts as present).
    pub fn add_member(&mut self, user_id: &str) -> bool {
        if self.is_member(user_id) {
            return false;
        }
        self.members.push(user_id.to_string());
        true
    }

    /// Whether the device is registered in this domain.
    pub fn has_device(&self, full_id: &str) -> bool {
        self.devices.iter().any(|d| d == full_id)
    }

    /// Append a device. Returns false when already present.
    pub fn add_device(&mut self, full_id: &str) -> bool {
        if self.has_device(full_id) {
            return false;
        }
        self.devices.push(full_id.to_string());
        true
    }

    /// Remove a device appended by [`Domain::add_device`] (rollback).
    pub fn remove_device(&mut self, full_id: &str) {
        self.devices.retain(|d| d != full_id);
    }

    /// Registered members, in insertion order (owner not included).
    pub fn members(&self) -> &[String] {
        &self.members
    }

    /// Registered device full-ids, in insertion order.
    pub fn devices(&self) -> &[String] {
        &self.devices
    }

    /// Render the snapshot block: a `name:owner[:member...]` header
    /// followed by one tab-indented full-id line per device.
    pub fn render_block(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "{}:{}", self.name, self.owner);
        for member in &self.members {
            let _ = write!(out, ":{member}");
        }
        out.push('\n');
        for device in &self.devices {
            let _ = writeln!(out, "\t{device}");
        }
        out
    }

    /// Build a domain from a parsed header line's fields.
    pub fn from_header(fields: &[&str]) -> Option<Self> {
        let (name, rest) = fields.split_first()?;
        let (owner, members) = rest.split_first()?;
        let mut domain = Self::new(*name, *owner);
        for member in members {
            domain.add_member(member);
        }
        Some(domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_is_implicit_member() {
        let domain = Domain::new("home", "alice");
        assert!(domain.is_member("alice"));
        assert!(!domain.is_member("bob"));
    }

    #[test]
    fn member_append_is_idempotent_rejecting() {
        let mut domain = Domain::new("home", "alice");
        assert!(domain.add_member("bob"));
        assert!(!domain.add_member("bob"));
        assert!(!domain.add_member("alice"), "owner is already a member");
        assert_eq!(domain.members(), &["bob".to_string()]);
    }

    #[test]
    fn block_roundtrip() {
        let mut domain = Domain::new("home", "alice");
        domain.add_member("bob");
        domain.add_device("alice:1");
        domain.add_device("bob:7");

        let block = domain.render_block();
        assert_eq!(block, "home:alice:bob\n\talice:1\n\tbob:7\n");

        let header: Vec<&str> = "home:alice:bob".split(':').collect();
        let mut parsed = Domain::from_header(&header).unwrap();
        parsed.add_device("alice:1");
        parsed.add_device("bob:7");
        assert_eq!(parsed, domain);
    }
}
