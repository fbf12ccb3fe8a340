use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedRegion {
    /// ISO 3166-1 alpha-2 code as supplied by the region collaborator.
    pub code: String,
    /// Display name surfaced to the blocked user.
    pub name: String,
}

/// Which regions may not start tasks. The requester's apparent region is
/// supplied externally; this component never resolves it itself.
#[derive(Debug, Clone, Default)]
pub struct RegionPolicy {
    blocked: HashMap<String, String>,
}

impl RegionPolicy {
    pub fn new(blocked: impl IntoIterator<Item = BlockedRegion>) -> Self {
        Self {
            blocked: blocked
                .into_iter()
                .map(|r| (r.code.to_ascii_uppercase(), r.name))
                .collect(),
        }
    }

    /// Display name of the blocking region, or `None` when unblocked.
    pub fn blocked_name(&self, code: &str) -> Option<&str> {
        self.blocked
            .get(&code.to_ascii_uppercase())
            .map(String::as_str)
    }

    pub fn is_blocked(&self, code: &str) -> bool {
        self.blocked_name(code).is_some()
    }
}
