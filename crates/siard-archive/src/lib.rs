//! # siard-archive
//!
//! Streaming engine for SIARD database archive packages.
//!
//! This library turns a vendor-neutral database snapshot into a
//! self-describing archive package and back, with support for:
//!
//! - **Three container layouts**: one zip, a plain folder, or a zip whose
//!   large objects live in a companion folder
//! - **Streaming content**: rows are written and read one at a time, large
//!   objects are copied without buffering
//! - **Canonical types** with SQL:1999 and SQL:2008 name projections
//! - **Structural validation** of finished packages
//! - **Format versions** 2.1 and 2.2
//!
//! ## Example
//!
//! ```rust,no_run
//! use siard_archive::{ArchiveConfig, SiardImporter, StructureValidator};
//!
//! fn main() -> siard_archive::Result<()> {
//!     let config = ArchiveConfig::load("archive.yaml")?;
//!     let report = StructureValidator::new(config.clone()).validate("shop.siard")?;
//!     println!("{}", report.to_json()?);
//!
//!     let mut copy = siard_archive::SiardExporter::new("copy.siard", config.clone())?;
//!     let stats = SiardImporter::new("shop.siard", config)?.import(&mut copy)?;
//!     println!("Copied {} rows", stats.rows);
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod config;
pub mod content;
pub mod core;
pub mod dialect;
pub mod error;
pub mod metadata;
pub mod paths;
pub mod pipeline;
pub mod report;
pub mod validate;

// Re-exports for convenient access
pub use archive::{AccessMode, ArchiveContainer, ArchiveStrategy, ContainerRole, FormatVersion};
pub use config::{ArchiveConfig, Compression, ContainerLayout, LobConfig};
pub use crate::core::{Cell, DatabaseHandler, DatabaseStructure, Row, SchemaStructure, TableStructure};
pub use dialect::{Type, TypeKind};
pub use error::{ArchiveError, Result};
pub use metadata::MetadataCodec;
pub use paths::{path_strategy, LobKind, PathStrategy};
pub use pipeline::{PipelineStats, SiardExporter, SiardImporter};
pub use report::{ConditionKind, Reporter};
pub use validate::{StructureRule, StructureValidator, ValidationReport};
