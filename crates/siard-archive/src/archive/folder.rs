//! Plain-folder container access.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use tracing::debug;
use walkdir::WalkDir;

use super::container::ArchiveContainer;
use super::strategy::{AccessMode, EntrySink, OutputEntry};
use crate::core::LobSource;
use crate::error::{ArchiveError, Result};

/// Folder mirroring the archive's relative layout on disk.
#[derive(Debug)]
pub struct FolderStrategy {
    container: ArchiveContainer,
    mode: AccessMode,
    opened: bool,
    finished: bool,
}

impl FolderStrategy {
    pub fn new(container: ArchiveContainer, mode: AccessMode) -> Self {
        Self {
            container,
            mode,
            opened: false,
            finished: false,
        }
    }

    pub fn container(&self) -> &ArchiveContainer {
        &self.container
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub(crate) fn set_container(&mut self, container: ArchiveContainer) {
        self.container = container;
    }

    pub fn setup(&mut self) -> Result<()> {
        if self.opened {
            return Ok(());
        }
        let root = self.container.path();
        match self.mode {
            AccessMode::Write => fs::create_dir_all(root).map_err(|e| {
                ArchiveError::container(self.container.to_string(), format!("cannot create folder: {}", e))
            })?,
            AccessMode::Read => {
                if !root.is_dir() {
                    return Err(ArchiveError::container(
                        self.container.to_string(),
                        "not a directory",
                    ));
                }
            }
        }
        debug!("Opened folder container {}", self.container);
        self.opened = true;
        Ok(())
    }

    fn resolve(&self, relative_path: &str) -> PathBuf {
        let mut path = self.container.path().to_path_buf();
        for segment in relative_path.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.mode != AccessMode::Write || !self.opened || self.finished {
            return Err(ArchiveError::container(
                self.container.to_string(),
                "container is not open for writing",
            ));
        }
        Ok(())
    }

    /// Lazy handle on one entry's bytes.
    pub fn entry_source(&mut self, relative_path: &str) -> Result<LobSource> {
        self.setup()?;
        let path = self.resolve(relative_path);
        if !path.is_file() {
            return Err(ArchiveError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("entry not found: {}", relative_path),
            )));
        }
        Ok(LobSource::File(path))
    }

    pub fn create_input_stream(&mut self, relative_path: &str) -> Result<Box<dyn Read + Send>> {
        self.setup()?;
        let file = File::open(self.resolve(relative_path))?;
        Ok(Box::new(BufReader::new(file)))
    }

    pub fn open_output(&mut self, relative_path: &str) -> Result<OutputEntry> {
        self.ensure_writable()?;
        let path = self.resolve(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        Ok(OutputEntry::new(
            relative_path,
            EntrySink::Direct(BufWriter::new(file)),
        ))
    }

    pub fn close_output(&mut self, entry: OutputEntry) -> Result<()> {
        let (path, sink) = entry.into_parts();
        let mut writer = sink.into_writer()?;
        writer.flush()?;
        debug!("Closed folder entry {}", path);
        Ok(())
    }

    pub fn write_entry(&mut self, relative_path: &str, reader: &mut dyn Read) -> Result<u64> {
        let mut entry = self.open_output(relative_path)?;
        let copied = io::copy(reader, &mut entry)?;
        self.close_output(entry)?;
        Ok(copied)
    }

    pub fn create_directory(&mut self, relative_path: &str) -> Result<()> {
        self.ensure_writable()?;
        fs::create_dir_all(self.resolve(relative_path))?;
        Ok(())
    }

    /// Relative paths of every file and directory, directories ending in `/`.
    pub fn list_entry_paths(&mut self) -> Result<Vec<String>> {
        self.setup()?;
        let root = self.container.path().to_path_buf();
        let mut paths = Vec::new();
        for entry in WalkDir::new(&root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                ArchiveError::container(self.container.to_string(), format!("cannot list entries: {}", e))
            })?;
            let relative = entry
                .path()
                .strip_prefix(&root)
                .map_err(|e| ArchiveError::container(self.container.to_string(), e.to_string()))?;
            let mut name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            if entry.file_type().is_dir() {
                name.push('/');
            }
            paths.push(name);
        }
        Ok(paths)
    }

    pub fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ContainerRole, FormatVersion};

    fn make_test_strategy(root: PathBuf, mode: AccessMode) -> FolderStrategy {
        FolderStrategy::new(
            ArchiveContainer::new(root, ContainerRole::Main, FormatVersion::V2_2),
            mode,
        )
    }

    #[test]
    fn test_write_then_list_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("pkg");

        let mut writer = make_test_strategy(root.clone(), AccessMode::Write);
        writer.setup().unwrap();
        writer.setup().unwrap();
        let mut entry = writer.open_output("content/schema1/table1/table1.xml").unwrap();
        entry.write_all(b"<table/>").unwrap();
        writer.close_output(entry).unwrap();
        writer.create_directory("header/siardversion/2.2").unwrap();
        writer.finish().unwrap();
        writer.finish().unwrap();

        let mut reader = make_test_strategy(root, AccessMode::Read);
        let paths = reader.list_entry_paths().unwrap();
        assert!(paths.contains(&"content/schema1/table1/table1.xml".to_string()));
        assert!(paths.contains(&"header/siardversion/2.2/".to_string()));

        let mut text = String::new();
        reader
            .create_input_stream("content/schema1/table1/table1.xml")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "<table/>");
    }

    #[test]
    fn test_read_missing_folder_is_container_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = make_test_strategy(dir.path().join("absent"), AccessMode::Read);
        let err = reader.setup().unwrap_err();
        assert!(matches!(err, ArchiveError::Container { .. }));
    }

    #[test]
    fn test_write_after_finish_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = make_test_strategy(dir.path().join("pkg"), AccessMode::Write);
        writer.setup().unwrap();
        writer.finish().unwrap();
        assert!(writer.open_output("header/metadata.xml").is_err());
    }
}
