//! Row and cell values streamed between producers and consumers.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;

/// Opens a fresh byte stream each time it is called.
pub type StreamOpener = Arc<dyn Fn() -> io::Result<Box<dyn Read + Send>> + Send + Sync>;

/// Lazy provider of a binary cell's bytes.
///
/// Nothing is opened until [`LobSource::open`]; the returned stream is
/// meant to be consumed and dropped while handling one cell.
#[derive(Clone)]
pub enum LobSource {
    /// Bytes already in memory (small inline values).
    Bytes(Arc<[u8]>),
    /// A file on disk.
    File(PathBuf),
    /// A caller-supplied opener. Package entries use this too.
    Opener(StreamOpener),
}

impl LobSource {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        LobSource::Bytes(Arc::from(bytes))
    }

    pub fn from_opener<F>(opener: F) -> Self
    where
        F: Fn() -> io::Result<Box<dyn Read + Send>> + Send + Sync + 'static,
    {
        LobSource::Opener(Arc::new(opener))
    }

    pub fn open(&self) -> io::Result<Box<dyn Read + Send>> {
        match self {
            LobSource::Bytes(bytes) => Ok(Box::new(Cursor::new(Arc::clone(bytes)))),
            LobSource::File(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
            LobSource::Opener(opener) => opener(),
        }
    }

    /// Read everything. Only for values known to be small.
    pub fn read_all(&self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.open()?.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl fmt::Debug for LobSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LobSource::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            LobSource::File(p) => write!(f, "File({})", p.display()),
            LobSource::Opener(_) => f.write_str("Opener"),
        }
    }
}

/// One cell. `id` is `schema.table.column.rowIndex`.
#[derive(Debug, Clone)]
pub enum Cell {
    Null {
        id: String,
    },
    Simple {
        id: String,
        text: String,
    },
    Binary {
        id: String,
        source: LobSource,
        /// Length in bytes.
        length: u64,
        /// True when the bytes were stored outside the content document.
        externalized: bool,
    },
    Composed {
        id: String,
        children: Vec<Cell>,
    },
}

impl Cell {
    pub fn null(id: impl Into<String>) -> Self {
        Cell::Null { id: id.into() }
    }

    pub fn simple(id: impl Into<String>, text: impl Into<String>) -> Self {
        Cell::Simple {
            id: id.into(),
            text: text.into(),
        }
    }

    /// An in-memory binary cell.
    pub fn binary(id: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        Cell::Binary {
            id: id.into(),
            length: bytes.len() as u64,
            source: LobSource::from_bytes(bytes),
            externalized: false,
        }
    }

    /// A binary cell backed by a lazy stream of `length` bytes.
    pub fn stream(id: impl Into<String>, source: LobSource, length: u64) -> Self {
        Cell::Binary {
            id: id.into(),
            source,
            length,
            externalized: false,
        }
    }

    pub fn composed(id: impl Into<String>, children: Vec<Cell>) -> Self {
        Cell::Composed {
            id: id.into(),
            children,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Cell::Null { id }
            | Cell::Simple { id, .. }
            | Cell::Binary { id, .. }
            | Cell::Composed { id, .. } => id,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null { .. })
    }
}

/// Cell id for a column at a row.
pub fn cell_id(column_id: &str, row_index: u64) -> String {
    format!("{}.{}", column_id, row_index)
}

/// One row. Cells align with the table's columns by position.
#[derive(Debug, Clone)]
pub struct Row {
    /// 1-based, ascending within a table.
    pub index: u64,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(index: u64, cells: Vec<Cell>) -> Self {
        Self { index, cells }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_cell_reads_back() {
        let cell = Cell::binary("s.t.c.1", vec![1u8, 2, 3]);
        match cell {
            Cell::Binary { source, length, externalized, .. } => {
                assert_eq!(length, 3);
                assert!(!externalized);
                assert_eq!(source.read_all().unwrap(), vec![1, 2, 3]);
                // Sources can be opened more than once.
                assert_eq!(source.read_all().unwrap(), vec![1, 2, 3]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_opener_source_is_lazy() {
        let source = LobSource::from_opener(|| Err(io::Error::new(io::ErrorKind::NotFound, "gone")));
        assert!(source.open().is_err());
        assert_eq!(format!("{:?}", source), "Opener");
    }

    #[test]
    fn test_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("record1.bin");
        std::fs::write(&path, b"abc").unwrap();
        assert_eq!(LobSource::File(path).read_all().unwrap(), b"abc");
    }

    #[test]
    fn test_cell_ids() {
        assert_eq!(cell_id("s.t.payload", 2), "s.t.payload.2");
        assert_eq!(Cell::null("x.1").id(), "x.1");
        assert!(Cell::null("x.1").is_null());
        assert!(!Cell::simple("x.1", "a").is_null());
    }
}
