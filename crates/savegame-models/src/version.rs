//! Save schema versions.
//!
//! Versions are `major.minor.patch` strings on disk. Parsing them into
//! [`SaveVersion`] gives a total ordering so migrations only ever run
//! forward.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Schema version written by this build.
pub const CURRENT_SAVE_VERSION: &str = "1.2.0";

/// Version reported for slots whose sidecar cannot be read.
pub const UNKNOWN_VERSION: &str = "Unknown";

/// A parsed save schema version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SaveVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SaveVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parses a version string, returning `None` for anything malformed.
    ///
    /// Missing trailing components default to zero (`"1.2"` == `"1.2.0"`).
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }

    /// The version this build writes.
    pub fn current() -> Self {
        // CURRENT_SAVE_VERSION is a literal that always parses.
        Self::parse(CURRENT_SAVE_VERSION).unwrap_or(Self::new(1, 2, 0))
    }
}

impl Ord for SaveVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then_with(|| self.minor.cmp(&other.minor))
            .then_with(|| self.patch.cmp(&other.patch))
    }
}

impl PartialOrd for SaveVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SaveVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for SaveVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid save version: {:?}", s))
    }
}

/// How an on-disk version relates to the running one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Same schema, nothing to do.
    Current,
    /// Older schema that can be migrated forward.
    NeedsMigration,
    /// Written by a newer build; never migrated backward.
    Newer,
    /// Not a parseable version.
    Unknown,
}

/// Compares a stored version string against the running version.
pub fn compatibility(stored: &str, running: &str) -> Compatibility {
    match (SaveVersion::parse(stored), SaveVersion::parse(running)) {
        (Some(s), Some(r)) => match s.cmp(&r) {
            Ordering::Equal => Compatibility::Current,
            Ordering::Less => Compatibility::NeedsMigration,
            Ordering::Greater => Compatibility::Newer,
        },
        _ => Compatibility::Unknown,
    }
}
