//! Byte-level access to a container's entries.
//!
//! [`ArchiveStrategy`] is chosen once when a migration is wired and carried
//! as data; every call dispatches on the variant without inspecting paths
//! or container types again.
//!
//! - [`ArchiveStrategy::Zip`]: one compressed archive holding everything
//! - [`ArchiveStrategy::Folder`]: a plain folder with the same layout
//! - [`ArchiveStrategy::ZipWithExternalLobs`]: a compressed archive whose
//!   large-object payloads live in a companion folder under the same
//!   relative paths

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;

use tracing::{debug, info};

use super::container::{ArchiveContainer, ContainerRole, FormatVersion};
use super::folder::FolderStrategy;
use super::zip_archive::ZipStrategy;
use crate::config::{ArchiveConfig, Compression, ContainerLayout};
use crate::core::LobSource;
use crate::error::{ArchiveError, Result};
use crate::paths::VERSION_FOLDER;

/// Prefix marking a large-object reference that points outside the package.
pub const EXTERNAL_REFERENCE_PREFIX: &str = "../";

/// Direction a strategy was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
}

/// Backing store of an open output entry.
#[derive(Debug)]
pub(crate) enum EntrySink {
    /// Written straight to its final location.
    Direct(BufWriter<File>),
    /// Spooled to a temp file, appended to the container on close.
    Spool(BufWriter<File>),
}

impl EntrySink {
    pub(crate) fn into_writer(self) -> Result<BufWriter<File>> {
        match self {
            EntrySink::Direct(w) | EntrySink::Spool(w) => Ok(w),
        }
    }
}

/// An entry being written. Hand it back to
/// [`ArchiveStrategy::close_output`] to commit it.
#[derive(Debug)]
pub struct OutputEntry {
    path: String,
    sink: EntrySink,
}

impl OutputEntry {
    pub(crate) fn new(path: &str, sink: EntrySink) -> Self {
        Self {
            path: path.to_string(),
            sink,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn into_parts(self) -> (String, EntrySink) {
        (self.path, self.sink)
    }
}

impl Write for OutputEntry {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.sink {
            EntrySink::Direct(w) | EntrySink::Spool(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            EntrySink::Direct(w) | EntrySink::Spool(w) => w.flush(),
        }
    }
}

/// Polymorphic access to one archive package.
#[derive(Debug)]
pub enum ArchiveStrategy {
    Zip(ZipStrategy),
    Folder(FolderStrategy),
    ZipWithExternalLobs {
        main: ZipStrategy,
        lobs: FolderStrategy,
    },
}

impl ArchiveStrategy {
    /// Build the strategy matching `layout` for a package at `path`.
    ///
    /// For the external-LOB layout a relative companion folder is placed
    /// next to the package.
    pub fn for_layout(
        path: impl Into<PathBuf>,
        layout: ContainerLayout,
        compression: Compression,
        external_lob_folder: Option<&str>,
        mode: AccessMode,
        version: Option<FormatVersion>,
    ) -> Result<Self> {
        let path = path.into();
        let container = match version {
            Some(v) => ArchiveContainer::new(&path, ContainerRole::Main, v),
            None => ArchiveContainer::detect(&path, ContainerRole::Main),
        };
        Ok(match layout {
            ContainerLayout::Zip => ArchiveStrategy::Zip(ZipStrategy::new(container, mode, compression)),
            ContainerLayout::Folder => ArchiveStrategy::Folder(FolderStrategy::new(container, mode)),
            ContainerLayout::ZipExternalLobs => {
                let folder = external_lob_folder.ok_or_else(|| {
                    ArchiveError::Config("external large-object folder not configured".into())
                })?;
                let mut lob_path = PathBuf::from(folder);
                if lob_path.is_relative() {
                    let parent = path.parent().map(PathBuf::from).unwrap_or_default();
                    lob_path = parent.join(lob_path);
                }
                let lob_container = match version {
                    Some(v) => ArchiveContainer::new(lob_path, ContainerRole::Auxiliary, v),
                    None => ArchiveContainer::detect(lob_path, ContainerRole::Auxiliary),
                };
                ArchiveStrategy::ZipWithExternalLobs {
                    main: ZipStrategy::new(container, mode, compression),
                    lobs: FolderStrategy::new(lob_container, mode),
                }
            }
        })
    }

    /// Convenience constructor for writing with the configured layout.
    pub fn for_export(path: impl Into<PathBuf>, config: &ArchiveConfig) -> Result<Self> {
        Self::for_layout(
            path,
            config.layout,
            config.compression,
            config.lob.external_lob_folder.as_deref(),
            AccessMode::Write,
            Some(config.format_version),
        )
    }

    /// Convenience constructor for reading with the configured layout.
    pub fn for_import(path: impl Into<PathBuf>, config: &ArchiveConfig) -> Result<Self> {
        Self::for_layout(
            path,
            config.layout,
            config.compression,
            config.lob.external_lob_folder.as_deref(),
            AccessMode::Read,
            None,
        )
    }

    /// The MAIN container.
    pub fn container(&self) -> &ArchiveContainer {
        match self {
            ArchiveStrategy::Zip(s) => s.container(),
            ArchiveStrategy::Folder(s) => s.container(),
            ArchiveStrategy::ZipWithExternalLobs { main, .. } => main.container(),
        }
    }

    /// Open the package. Calling it again is a no-op.
    ///
    /// When the version was not known up front it is detected here and
    /// copied to the auxiliary container.
    pub fn setup(&mut self) -> Result<()> {
        match self {
            ArchiveStrategy::Zip(s) => s.setup()?,
            ArchiveStrategy::Folder(s) => s.setup()?,
            ArchiveStrategy::ZipWithExternalLobs { main, lobs } => {
                main.setup()?;
                if lobs.mode() == AccessMode::Write {
                    lobs.setup()?;
                }
            }
        }
        if self.container().version().is_none() {
            let version = self.detect_version()?;
            self.set_version(version);
        }
        Ok(())
    }

    fn set_version(&mut self, version: FormatVersion) {
        match self {
            ArchiveStrategy::Zip(s) => {
                let c = s.container().with_version(version);
                s.set_container(c);
            }
            ArchiveStrategy::Folder(s) => {
                let c = s.container().with_version(version);
                s.set_container(c);
            }
            ArchiveStrategy::ZipWithExternalLobs { main, lobs } => {
                let c = main.container().with_version(version);
                main.set_container(c);
                let c = lobs.container().with_version(version);
                lobs.set_container(c);
            }
        }
        info!("Detected format version {} for {}", version, self.container());
    }

    /// Read the version marker folder(s) and pick the single known one.
    fn detect_version(&mut self) -> Result<FormatVersion> {
        let prefix = format!("{}/", VERSION_FOLDER);
        let mut found: Vec<FormatVersion> = Vec::new();
        for path in self.list_entry_paths()? {
            if let Some(rest) = path.strip_prefix(&prefix) {
                let name = rest.split('/').next().unwrap_or_default();
                if let Ok(version) = name.parse::<FormatVersion>() {
                    if !found.contains(&version) {
                        found.push(version);
                    }
                }
            }
        }
        match found.as_slice() {
            [version] => Ok(*version),
            [] => Err(ArchiveError::container(
                self.container().to_string(),
                "no supported version marker found",
            )),
            _ => Err(ArchiveError::container(
                self.container().to_string(),
                format!("ambiguous version markers: {:?}", found),
            )),
        }
    }

    pub fn create_input_stream(&mut self, relative_path: &str) -> Result<Box<dyn Read + Send>> {
        match self {
            ArchiveStrategy::Zip(s) => s.create_input_stream(relative_path),
            ArchiveStrategy::Folder(s) => s.create_input_stream(relative_path),
            ArchiveStrategy::ZipWithExternalLobs { main, .. } => main.create_input_stream(relative_path),
        }
    }

    pub fn open_output(&mut self, relative_path: &str) -> Result<OutputEntry> {
        match self {
            ArchiveStrategy::Zip(s) => s.open_output(relative_path),
            ArchiveStrategy::Folder(s) => s.open_output(relative_path),
            ArchiveStrategy::ZipWithExternalLobs { main, .. } => main.open_output(relative_path),
        }
    }

    pub fn close_output(&mut self, entry: OutputEntry) -> Result<()> {
        match self {
            ArchiveStrategy::Zip(s) => s.close_output(entry),
            ArchiveStrategy::Folder(s) => s.close_output(entry),
            ArchiveStrategy::ZipWithExternalLobs { main, .. } => main.close_output(entry),
        }
    }

    /// Copy `reader` into a new entry of the MAIN container.
    pub fn write_entry(
        &mut self,
        relative_path: &str,
        reader: &mut dyn Read,
        size_hint: Option<u64>,
    ) -> Result<u64> {
        match self {
            ArchiveStrategy::Zip(s) => s.write_entry(relative_path, reader, size_hint),
            ArchiveStrategy::Folder(s) => s.write_entry(relative_path, reader),
            ArchiveStrategy::ZipWithExternalLobs { main, .. } => {
                main.write_entry(relative_path, reader, size_hint)
            }
        }
    }

    /// Store a large object at `relative_path`, returning the reference the
    /// content document records for it.
    pub fn write_lob(
        &mut self,
        relative_path: &str,
        reader: &mut dyn Read,
        size_hint: Option<u64>,
    ) -> Result<String> {
        match self {
            ArchiveStrategy::ZipWithExternalLobs { lobs, .. } => {
                lobs.write_entry(relative_path, reader)?;
                let reference = format!(
                    "{}{}/{}",
                    EXTERNAL_REFERENCE_PREFIX,
                    lobs.container().file_name(),
                    relative_path
                );
                debug!("Externalized large object to {}", reference);
                Ok(reference)
            }
            _ => {
                self.write_entry(relative_path, reader, size_hint)?;
                Ok(relative_path.to_string())
            }
        }
    }

    /// Lazy handle on an entry of the MAIN container.
    pub fn entry_source(&mut self, relative_path: &str) -> Result<LobSource> {
        match self {
            ArchiveStrategy::Zip(s) => s.entry_source(relative_path),
            ArchiveStrategy::Folder(s) => s.entry_source(relative_path),
            ArchiveStrategy::ZipWithExternalLobs { main, .. } => main.entry_source(relative_path),
        }
    }

    /// Resolve the large object a content document references.
    ///
    /// References starting with `../` are resolved next to the MAIN package,
    /// through the companion container when this strategy has one. Nothing
    /// is opened yet.
    pub fn lob_source(&mut self, reference: &str) -> Result<LobSource> {
        let Some(outside) = reference.strip_prefix(EXTERNAL_REFERENCE_PREFIX) else {
            return self.entry_source(reference);
        };
        if let ArchiveStrategy::ZipWithExternalLobs { lobs, .. } = self {
            let prefix = format!("{}/", lobs.container().file_name());
            if let Some(relative) = outside.strip_prefix(&prefix) {
                return lobs.entry_source(relative);
            }
        }
        let mut path = self
            .container()
            .path()
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default();
        for segment in outside.split('/').filter(|s| !s.is_empty()) {
            if segment == ".." {
                return Err(ArchiveError::container(
                    self.container().to_string(),
                    format!("large-object reference escapes its location: {}", reference),
                ));
            }
            path.push(segment);
        }
        if !path.is_file() {
            return Err(ArchiveError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("large object not found: {}", reference),
            )));
        }
        Ok(LobSource::File(path))
    }

    /// Open the large object a content document references.
    pub fn open_lob(&mut self, reference: &str) -> Result<Box<dyn Read + Send>> {
        Ok(self.lob_source(reference)?.open()?)
    }

    pub fn create_directory(&mut self, relative_path: &str) -> Result<()> {
        match self {
            ArchiveStrategy::Zip(s) => s.create_directory(relative_path),
            ArchiveStrategy::Folder(s) => s.create_directory(relative_path),
            ArchiveStrategy::ZipWithExternalLobs { main, .. } => main.create_directory(relative_path),
        }
    }

    /// Entry paths of the MAIN container, single pass.
    pub fn list_entry_paths(&mut self) -> Result<std::vec::IntoIter<String>> {
        let paths = match self {
            ArchiveStrategy::Zip(s) => s.list_entry_paths()?,
            ArchiveStrategy::Folder(s) => s.list_entry_paths()?,
            ArchiveStrategy::ZipWithExternalLobs { main, .. } => main.list_entry_paths()?,
        };
        Ok(paths.into_iter())
    }

    /// Close the package; on export this flushes and compresses. Calling it
    /// again is a no-op.
    pub fn finish(&mut self) -> Result<()> {
        match self {
            ArchiveStrategy::Zip(s) => s.finish(),
            ArchiveStrategy::Folder(s) => s.finish(),
            ArchiveStrategy::ZipWithExternalLobs { main, lobs } => {
                let main_result = main.finish();
                lobs.finish()?;
                main_result
            }
        }
    }
}
