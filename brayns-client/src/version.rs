use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine version as returned by `get-version`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// Source revision (commit hash) the engine was built from
    #[serde(default)]
    pub revision: String,
}

impl Version {
    /// `major.minor.patch`, without the revision
    pub fn tag(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.patch)
    }

    /// Whether both versions share major and minor numbers
    pub fn is_compatible_with(&self, other: &Version) -> bool {
        self.major == other.major && self.minor == other.minor
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.revision.is_empty() {
            write!(f, " ({})", self.revision)?;
        }
        Ok(())
    }
}
