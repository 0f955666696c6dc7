//! Archive container identity.
//!
//! A container is a pure value naming one package: where it lives, which
//! role it plays in the migration, and which format generation it follows.
//! It never performs I/O.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;

/// Format generation of an archive package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FormatVersion {
    V2_1,
    #[default]
    V2_2,
}

impl FormatVersion {
    /// All generations this engine reads and writes.
    pub const ALL: [FormatVersion; 2] = [FormatVersion::V2_1, FormatVersion::V2_2];

    /// The `major.minor` name used for the version marker folder.
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatVersion::V2_1 => "2.1",
            FormatVersion::V2_2 => "2.2",
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatVersion {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "2.1" => Ok(FormatVersion::V2_1),
            "2.2" => Ok(FormatVersion::V2_2),
            other => Err(ArchiveError::Config(format!(
                "unsupported format version '{}', expected 2.1 or 2.2",
                other
            ))),
        }
    }
}

impl Serialize for FormatVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FormatVersion {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Role of a container within one migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerRole {
    /// The package holding header and content documents.
    Main,
    /// A companion location holding externalized large objects.
    Auxiliary,
}

/// One archive package: path, role and (possibly not yet known) version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveContainer {
    path: PathBuf,
    role: ContainerRole,
    version: Option<FormatVersion>,
}

impl ArchiveContainer {
    /// A container whose version is known up front (export).
    pub fn new(path: impl Into<PathBuf>, role: ContainerRole, version: FormatVersion) -> Self {
        Self {
            path: path.into(),
            role,
            version: Some(version),
        }
    }

    /// A container whose version is detected when it is opened (import).
    pub fn detect(path: impl Into<PathBuf>, role: ContainerRole) -> Self {
        Self {
            path: path.into(),
            role,
            version: None,
        }
    }

    /// Copy of this container with the detected version filled in.
    pub fn with_version(&self, version: FormatVersion) -> Self {
        Self {
            path: self.path.clone(),
            role: self.role,
            version: Some(version),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn role(&self) -> ContainerRole {
        self.role
    }

    pub fn version(&self) -> Option<FormatVersion> {
        self.version
    }

    /// Final path component, used when one container references another.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl fmt::Display for ArchiveContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_and_display() {
        assert_eq!("2.1".parse::<FormatVersion>().unwrap(), FormatVersion::V2_1);
        assert_eq!(" 2.2 ".parse::<FormatVersion>().unwrap(), FormatVersion::V2_2);
        assert!("1.0".parse::<FormatVersion>().is_err());
        assert_eq!(FormatVersion::V2_2.to_string(), "2.2");
    }

    #[test]
    fn test_detect_then_fill_version() {
        let c = ArchiveContainer::detect("/tmp/db.siard", ContainerRole::Main);
        assert_eq!(c.version(), None);
        let v = c.with_version(FormatVersion::V2_1);
        assert_eq!(v.version(), Some(FormatVersion::V2_1));
        assert_eq!(v.path(), c.path());
        assert_eq!(v.file_name(), "db.siard");
    }
}
