//! Configuration type definitions.

use serde::{Deserialize, Serialize};

use crate::archive::FormatVersion;

/// Root configuration structure, passed to the pipeline at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Target format version; selects the path scheme (default: 2.2).
    #[serde(default)]
    pub format_version: FormatVersion,

    /// Physical container layout (default: zip).
    #[serde(default)]
    pub layout: ContainerLayout,

    /// Compression used by the zip layouts (default: deflate).
    #[serde(default)]
    pub compression: Compression,

    /// Indent generated XML documents (default: true).
    #[serde(default = "default_true")]
    pub pretty_print: bool,

    /// Large object externalization settings.
    #[serde(default)]
    pub lob: LobConfig,

    /// File the reporter materializes into when a run records conditions.
    #[serde(default)]
    pub report_path: Option<String>,

    /// Schemas excluded from the exported archive.
    #[serde(default)]
    pub ignored_schemas: Vec<String>,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            format_version: FormatVersion::default(),
            layout: ContainerLayout::default(),
            compression: Compression::default(),
            pretty_print: true,
            lob: LobConfig::default(),
            report_path: None,
            ignored_schemas: Vec::new(),
        }
    }
}

/// Physical representation of an archive package.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerLayout {
    /// One compressed archive holding every entry.
    #[default]
    Zip,
    /// A plain folder mirroring the archive layout.
    Folder,
    /// A compressed archive whose large objects live in a companion folder.
    ZipExternalLobs,
}

/// Entry compression for the zip layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    #[default]
    Deflate,
    Store,
}

/// Per-kind externalization thresholds.
///
/// A cell whose encoded size is at most the threshold stays inline; one byte
/// more and it becomes a large object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobConfig {
    /// Character large objects (bytes of UTF-8 text).
    #[serde(default = "default_clob_threshold")]
    pub clob_threshold: u64,

    /// Binary large objects (raw bytes).
    #[serde(default = "default_blob_threshold")]
    pub blob_threshold: u64,

    /// Companion folder for the `zip_external_lobs` layout.
    #[serde(default)]
    pub external_lob_folder: Option<String>,
}

impl Default for LobConfig {
    fn default() -> Self {
        Self {
            clob_threshold: default_clob_threshold(),
            blob_threshold: default_blob_threshold(),
            external_lob_folder: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_clob_threshold() -> u64 {
    4000
}

fn default_blob_threshold() -> u64 {
    2000
}
