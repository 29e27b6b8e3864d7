//! Chat member identity and the ordered roster of registered members

use crate::error::ValidationError;
use std::hash::{Hash, Hasher};

/// A registered chat participant and the address of its broadcast endpoint
///
/// Members are immutable once built. Two members are equal when their screen names
/// match, regardless of address or port, so a roster can never hold the same name twice.
#[derive(Debug, Clone)]
pub struct Member {
    screen_name: String,
    address: String,
    port: u16,
}

impl Member {
    /// Builds a member after checking the screen name and port
    pub fn new(
        screen_name: impl Into<String>,
        address: impl Into<String>,
        port: u16,
    ) -> Result<Self, ValidationError> {
        let screen_name = screen_name.into();
        validate_screen_name(&screen_name)?;
        if port == 0 {
            return Err(ValidationError::InvalidPort(port.to_string()));
        }

        Ok(Self {
            screen_name,
            address: address.into(),
            port,
        })
    }

    pub fn screen_name(&self) -> &str {
        &self.screen_name
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl PartialEq for Member {
    fn eq(&self, other: &Self) -> bool {
        self.screen_name == other.screen_name
    }
}

impl Eq for Member {}

impl Hash for Member {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.screen_name.hash(state);
    }
}

/// Checks that a screen name is usable as a single protocol token
pub fn validate_screen_name(screen_name: &str) -> Result<(), ValidationError> {
    if screen_name.is_empty() || screen_name.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidScreenName(screen_name.to_string()));
    }
    Ok(())
}

/// Parses a textual port number, rejecting zero and anything outside `u16`
pub fn validate_port(port: &str) -> Result<u16, ValidationError> {
    match port.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ValidationError::InvalidPort(port.to_string())),
    }
}

/// Ordered set of members keyed by screen name
///
/// Insertion order is kept only because it decides the order of an ACPT payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    members: Vec<Member>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a member unless one with the same screen name is present.
    /// Returns true if the roster changed.
    pub fn insert(&mut self, member: Member) -> bool {
        if self.contains(member.screen_name()) {
            return false;
        }
        self.members.push(member);
        true
    }

    /// Removes the member with the given screen name, returning it if present
    pub fn remove(&mut self, screen_name: &str) -> Option<Member> {
        let index = self
            .members
            .iter()
            .position(|member| member.screen_name() == screen_name)?;
        Some(self.members.remove(index))
    }

    /// Replaces the whole roster. Later duplicates of a screen name are dropped.
    pub fn replace(&mut self, members: Vec<Member>) {
        self.members.clear();
        for member in members {
            self.insert(member);
        }
    }

    pub fn contains(&self, screen_name: &str) -> bool {
        self.get(screen_name).is_some()
    }

    pub fn get(&self, screen_name: &str) -> Option<&Member> {
        self.members
            .iter()
            .find(|member| member.screen_name() == screen_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.iter()
    }

    pub fn to_vec(&self) -> Vec<Member> {
        self.members.clone()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl From<Vec<Member>> for Roster {
    fn from(members: Vec<Member>) -> Self {
        let mut roster = Roster::new();
        roster.replace(members);
        roster
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, port: u16) -> Member {
        Member::new(name, "127.0.0.1", port).unwrap()
    }

    #[test]
    fn test_member_equality_uses_screen_name_only() {
        let a = Member::new("alice", "127.0.0.1", 9001).unwrap();
        let b = Member::new("alice", "10.0.0.7", 4242).unwrap();
        let c = Member::new("bob", "127.0.0.1", 9001).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_member_rejects_bad_fields() {
        assert!(matches!(
            Member::new("al ice", "127.0.0.1", 9001),
            Err(ValidationError::InvalidScreenName(_))
        ));
        assert!(matches!(
            Member::new("", "127.0.0.1", 9001),
            Err(ValidationError::InvalidScreenName(_))
        ));
        assert!(matches!(
            Member::new("alice", "127.0.0.1", 0),
            Err(ValidationError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_validate_port() {
        assert_eq!(validate_port("8080"), Ok(8080));
        assert!(validate_port("0").is_err());
        assert!(validate_port("-1").is_err());
        assert!(validate_port("65536").is_err());
        assert!(validate_port("http").is_err());
    }

    #[test]
    fn test_validate_screen_name_whitespace() {
        assert!(validate_screen_name("alice").is_ok());
        assert!(validate_screen_name("alice\t").is_err());
        assert!(validate_screen_name("a\nb").is_err());
    }

    #[test]
    fn test_roster_insert_is_idempotent() {
        let mut roster = Roster::new();

        assert!(roster.insert(member("alice", 9001)));
        assert!(!roster.insert(member("alice", 9999)));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.get("alice").unwrap().port(), 9001);
    }

    #[test]
    fn test_roster_preserves_insertion_order() {
        let mut roster = Roster::new();
        roster.insert(member("carol", 3));
        roster.insert(member("alice", 1));
        roster.insert(member("bob", 2));

        let names: Vec<&str> = roster.iter().map(Member::screen_name).collect();
        assert_eq!(names, vec!["carol", "alice", "bob"]);
    }

    #[test]
    fn test_roster_remove() {
        let mut roster = Roster::from(vec![member("alice", 1), member("bob", 2)]);

        let removed = roster.remove("alice").unwrap();
        assert_eq!(removed.screen_name(), "alice");
        assert!(roster.remove("alice").is_none());
        assert_eq!(roster.len(), 1);
        assert!(roster.contains("bob"));
    }

    #[test]
    fn test_roster_replace_drops_duplicates() {
        let mut roster = Roster::from(vec![member("zed", 1)]);
        roster.replace(vec![member("alice", 1), member("bob", 2), member("alice", 3)]);

        assert_eq!(roster.len(), 2);
        assert!(!roster.contains("zed"));
        assert_eq!(roster.get("alice").unwrap().port(), 1);
    }
}
