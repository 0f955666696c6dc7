//! Archive containers and the strategies that read and write them.

mod container;
mod folder;
mod strategy;
mod zip_archive;

pub use container::{ArchiveContainer, ContainerRole, FormatVersion};
pub use folder::FolderStrategy;
pub use strategy::{AccessMode, ArchiveStrategy, OutputEntry, EXTERNAL_REFERENCE_PREFIX};
pub use zip_archive::ZipStrategy;
