//! Resource version counter.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// Strictly positive, monotonically increasing version of a stored resource.
///
/// Starts at 1 on creation and advances by exactly one per successful
/// update. It never wraps: [`Version::next`] returns `None` at the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Version(NonZeroU32);

impl Version {
    pub const INITIAL: Version = Version(NonZeroU32::MIN);

    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Version)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Version)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<u32> for Version {
    type Error = &'static str;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Version::new(value).ok_or("version must be a positive integer")
    }
}

impl From<Version> for u32 {
    fn from(version: Version) -> Self {
        version.get()
    }
}

impl std::str::FromStr for Version {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map_err(|_| "version must be a positive integer")
            .and_then(Version::try_from)
    }
}
