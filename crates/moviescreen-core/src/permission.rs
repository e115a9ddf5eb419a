//! Flat permission-code sets.

use std::collections::BTreeSet;

use serde::Serialize;

/// Read access to the movie catalog.
pub const MOVIES_READ: &str = "movies:read";
/// Create, update and delete access to the movie catalog.
pub const MOVIES_WRITE: &str = "movies:write";
/// Access to the `/debug/vars` metrics snapshot.
pub const METRICS_VIEW: &str = "metrics:view";

/// Every code the service knows how to grant.
pub const KNOWN_CODES: [&str; 3] = [MOVIES_READ, MOVIES_WRITE, METRICS_VIEW];

/// The permission codes held by one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Permissions(BTreeSet<String>);

impl Permissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Membership check. No wildcard or hierarchy semantics.
    pub fn includes(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    pub fn insert(&mut self, code: impl Into<String>) {
        self.0.insert(code.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for Permissions {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_is_exact_membership() {
        let perms: Permissions = [MOVIES_READ].into_iter().collect();
        assert!(perms.includes(MOVIES_READ));
        assert!(!perms.includes(MOVIES_WRITE));
        assert!(!perms.includes("movies:*"));
        assert!(!perms.includes("movies"));
    }

    #[test]
    fn empty_set_includes_nothing() {
        let perms = Permissions::new();
        assert!(perms.is_empty());
        assert!(KNOWN_CODES.iter().all(|c| !perms.includes(c)));
    }

    #[test]
    fn duplicate_grants_collapse() {
        let mut perms = Permissions::new();
        perms.insert(MOVIES_READ);
        perms.insert(MOVIES_READ.to_string());
        assert_eq!(perms.iter().count(), 1);
    }
}
