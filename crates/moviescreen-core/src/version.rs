//! Optimistic-concurrency version counters.
//!
//! Every mutable record carries a [`Version`] that starts at
//! [`Version::INITIAL`] and increases by exactly one on each successful
//! conditional write. A write submitted with a stale version is rejected as
//! an edit conflict by the store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Monotonic record version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub i32);

impl Version {
    pub const INITIAL: Version = Version(1);

    /// The version a successful write produces.
    pub fn next(self) -> Version {
        Version(self.0.saturating_add(1))
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Version {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Version)
    }
}

/// A record that participates in conditional writes.
pub trait Versioned: Clone + Send + Sync {
    type Id: Copy + Eq + fmt::Debug + Send + Sync;

    fn id(&self) -> Self::Id;
    fn version(&self) -> Version;
    fn set_version(&mut self, version: Version);
}
