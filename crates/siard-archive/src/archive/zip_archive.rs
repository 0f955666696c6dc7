//! Single compressed archive access.
//!
//! Writing streams entries straight into the zip. Documents that stay open
//! while other entries are written (a table document receiving rows while
//! its large objects are emitted) are spooled to an anonymous temp file and
//! appended to the zip when closed, so memory never scales with table size.
//!
//! Reading shares the opened package between the strategy and the lazy
//! sources it hands out. Opening a source decompresses the entry through
//! the zip reader into an anonymous temp file, so the entry's CRC is
//! verified before any byte reaches the caller and the returned stream owns
//! its data.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::container::ArchiveContainer;
use super::strategy::{AccessMode, EntrySink, OutputEntry};
use crate::config::Compression;
use crate::core::LobSource;
use crate::error::{ArchiveError, Result};

/// Entries at or above this size need zip64 records.
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

enum ZipState {
    Closed,
    Writing(ZipWriter<File>),
    Reading(Arc<Mutex<ZipArchive<File>>>),
    Finished,
}

impl std::fmt::Debug for ZipState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ZipState::Closed => "Closed",
            ZipState::Writing(_) => "Writing",
            ZipState::Reading(_) => "Reading",
            ZipState::Finished => "Finished",
        };
        f.write_str(name)
    }
}

/// One compressed archive holding every entry.
#[derive(Debug)]
pub struct ZipStrategy {
    container: ArchiveContainer,
    mode: AccessMode,
    compression: Compression,
    state: ZipState,
}

impl ZipStrategy {
    pub fn new(container: ArchiveContainer, mode: AccessMode, compression: Compression) -> Self {
        Self {
            container,
            mode,
            compression,
            state: ZipState::Closed,
        }
    }

    pub fn container(&self) -> &ArchiveContainer {
        &self.container
    }

    pub(crate) fn set_container(&mut self, container: ArchiveContainer) {
        self.container = container;
    }

    fn options(&self, size_hint: Option<u64>) -> SimpleFileOptions {
        let method = match self.compression {
            Compression::Deflate => CompressionMethod::Deflated,
            Compression::Store => CompressionMethod::Stored,
        };
        let large = size_hint.map_or(true, |n| n >= ZIP64_THRESHOLD);
        SimpleFileOptions::default()
            .compression_method(method)
            .large_file(large)
    }

    fn open_error(&self, message: impl std::fmt::Display) -> ArchiveError {
        ArchiveError::container(self.container.to_string(), message.to_string())
    }

    pub fn setup(&mut self) -> Result<()> {
        if !matches!(self.state, ZipState::Closed) {
            return Ok(());
        }
        let path = self.container.path();
        self.state = match self.mode {
            AccessMode::Write => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| self.open_error(e))?;
                }
                let file = File::create(path).map_err(|e| self.open_error(e))?;
                ZipState::Writing(ZipWriter::new(file))
            }
            AccessMode::Read => {
                let file = File::open(path).map_err(|e| self.open_error(e))?;
                let archive = ZipArchive::new(file).map_err(|e| self.open_error(e))?;
                ZipState::Reading(Arc::new(Mutex::new(archive)))
            }
        };
        debug!("Opened zip container {} for {:?}", self.container, self.mode);
        Ok(())
    }

    fn writer(&mut self) -> Result<&mut ZipWriter<File>> {
        match &mut self.state {
            ZipState::Writing(writer) => Ok(writer),
            _ => Err(ArchiveError::container(
                self.container.to_string(),
                "container is not open for writing",
            )),
        }
    }

    fn reader(&mut self) -> Result<&Arc<Mutex<ZipArchive<File>>>> {
        self.setup()?;
        match &self.state {
            ZipState::Reading(archive) => Ok(archive),
            _ => Err(ArchiveError::container(
                self.container.to_string(),
                "container is not open for reading",
            )),
        }
    }

    /// Lazy handle on one entry's bytes. Fails now if the entry is missing.
    pub fn entry_source(&mut self, relative_path: &str) -> Result<LobSource> {
        let label = self.container.to_string();
        let archive = Arc::clone(self.reader()?);
        {
            let mut guard = lock(&archive).map_err(|e| ArchiveError::container(&label, e.to_string()))?;
            guard.by_name(relative_path)?;
        }
        let name = relative_path.to_string();
        Ok(LobSource::from_opener(move || open_entry(&archive, &name)))
    }

    pub fn create_input_stream(&mut self, relative_path: &str) -> Result<Box<dyn Read + Send>> {
        Ok(self.entry_source(relative_path)?.open()?)
    }

    pub fn open_output(&mut self, relative_path: &str) -> Result<OutputEntry> {
        self.writer()?;
        let spool = tempfile::tempfile()?;
        Ok(OutputEntry::new(
            relative_path,
            EntrySink::Spool(BufWriter::new(spool)),
        ))
    }

    pub fn close_output(&mut self, entry: OutputEntry) -> Result<()> {
        let (path, sink) = entry.into_parts();
        let mut spool = sink.into_writer()?;
        spool.flush()?;
        let mut file = spool.into_inner().map_err(|e| e.into_error())?;
        let len = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(0))?;
        let options = self.options(Some(len));
        let writer = self.writer()?;
        writer.start_file(path.as_str(), options)?;
        io::copy(&mut file, writer)?;
        debug!("Appended spooled entry {} ({} bytes)", path, len);
        Ok(())
    }

    pub fn write_entry(
        &mut self,
        relative_path: &str,
        reader: &mut dyn Read,
        size_hint: Option<u64>,
    ) -> Result<u64> {
        let options = self.options(size_hint);
        let writer = self.writer()?;
        writer.start_file(relative_path, options)?;
        let copied = io::copy(reader, writer)?;
        Ok(copied)
    }

    pub fn create_directory(&mut self, relative_path: &str) -> Result<()> {
        let options = self.options(Some(0));
        let writer = self.writer()?;
        writer.add_directory(relative_path.trim_end_matches('/'), options)?;
        Ok(())
    }

    /// Entry names in central-directory order.
    pub fn list_entry_paths(&mut self) -> Result<Vec<String>> {
        let label = self.container.to_string();
        let guard = lock(self.reader()?).map_err(|e| ArchiveError::container(&label, e.to_string()))?;
        let names = guard.file_names().map(str::to_string).collect();
        Ok(names)
    }

    pub fn finish(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, ZipState::Finished) {
            ZipState::Writing(writer) => {
                writer.finish()?;
                debug!("Finalized zip container {}", self.container);
            }
            ZipState::Closed | ZipState::Reading(_) | ZipState::Finished => {}
        }
        Ok(())
    }
}

fn lock(archive: &Mutex<ZipArchive<File>>) -> io::Result<std::sync::MutexGuard<'_, ZipArchive<File>>> {
    archive
        .lock()
        .map_err(|_| io::Error::other("zip package lock poisoned"))
}

/// Decompress one entry into a temp file. The zip reader checks the CRC
/// when the copy reaches the end of the entry.
fn open_entry(archive: &Mutex<ZipArchive<File>>, name: &str) -> io::Result<Box<dyn Read + Send>> {
    let mut guard = lock(archive)?;
    let mut entry = guard.by_name(name).map_err(io::Error::other)?;
    let mut spool = tempfile::tempfile()?;
    let copied = io::copy(&mut entry, &mut spool)?;
    spool.seek(SeekFrom::Start(0))?;
    debug!("Spooled zip entry {} ({} bytes)", name, copied);
    Ok(Box::new(BufReader::new(spool)))
}
