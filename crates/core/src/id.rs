//! Unique identifiers for quill entities.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a BacklogItem.
///
/// Backed by a ULID, so identifiers are time-derived and sort in creation
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BacklogId(Ulid);

impl BacklogId {
    /// Generate a new BacklogId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for BacklogId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BacklogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for BacklogId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}
