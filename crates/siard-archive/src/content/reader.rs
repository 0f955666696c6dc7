//! Event-driven reader for table documents.
//!
//! The reader never builds a tree: it walks parser events with a small
//! explicit state (outside the table, inside a row, inside a cell) and
//! hands each completed row to the caller before reading the next one.
//! Composed cells push one frame per nesting level, bounded by the depth
//! of the column type.

use std::io::BufReader;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use crate::archive::ArchiveStrategy;
use crate::core::{cell_id, Cell, LobSource, Row, TableStructure};
use crate::dialect::{Type, TypeKind, XsdType};
use crate::error::{ArchiveError, Result};
use crate::paths::PathStrategy;
use crate::report::{ConditionKind, Reporter};

use super::escape;
use super::schema::{
    attribute, parse_column_element, parse_indexed, DocumentCheck, TableSchema, ROW_ELEMENT,
    TABLE_ELEMENT,
};
use super::writer::child_element;

/// Highest array item index accepted on import.
pub const MAX_ARRAY_ITEMS: usize = 65_536;

/// Check a table document against its schema document.
///
/// When the schema document is missing or declares no columns, the grammar
/// is derived from the table's metadata instead.
pub fn check_table(
    strategy: &mut ArchiveStrategy,
    paths: &dyn PathStrategy,
    table: &TableStructure,
    schema_index: usize,
    table_index: usize,
) -> Result<DocumentCheck> {
    let xsd_path = paths.table_schema_path(schema_index, table_index);
    let expected = TableSchema::for_table(table);
    let mut notes = Vec::new();
    let schema = match strategy.create_input_stream(&xsd_path) {
        Ok(input) => match TableSchema::parse_xsd(BufReader::new(input)) {
            Ok(parsed) if !parsed.columns().is_empty() => parsed,
            Ok(_) => {
                notes.push(format!("{} declares no columns", xsd_path));
                expected.clone()
            }
            Err(e) => {
                notes.push(format!("{} is not readable: {}", xsd_path, e));
                expected.clone()
            }
        },
        Err(_) => {
            notes.push(format!("{} is missing", xsd_path));
            expected.clone()
        }
    };
    if schema.columns().len() != expected.columns().len() {
        notes.push(format!(
            "{} declares {} columns, metadata lists {}",
            xsd_path,
            schema.columns().len(),
            expected.columns().len()
        ));
    }

    let doc_path = paths.table_document_path(schema_index, table_index);
    let input = strategy.create_input_stream(&doc_path)?;
    let mut check = schema.check(BufReader::new(input));
    for note in notes {
        check.violation(note);
    }
    Ok(check)
}

/// One element being assembled: a top-level cell or a composed child.
struct Frame {
    /// 0-based position within the row or the parent value.
    position: usize,
    id: String,
    ty: Type,
    file: Option<String>,
    length: Option<u64>,
    text: String,
    children: Vec<(usize, Cell)>,
    /// Set when the element's text could not be decoded.
    poisoned: Option<String>,
}

impl Frame {
    fn open(e: &BytesStart<'_>, position: usize, id: String, ty: Type) -> Result<Self> {
        Ok(Self {
            position,
            id,
            ty,
            file: attribute(e, b"file")?,
            length: attribute(e, b"length")?.and_then(|v| v.trim().parse().ok()),
            text: String::new(),
            children: Vec::new(),
            poisoned: None,
        })
    }

    fn finish(self, strategy: &mut ArchiveStrategy, reporter: &mut Reporter) -> Cell {
        if let Some(reason) = &self.poisoned {
            reporter.report(
                ConditionKind::CellProcessingUsedNull,
                self.id.as_str(),
                format!("undecodable text: {}", reason),
            );
            return Cell::null(self.id);
        }
        if let Some(reference) = &self.file {
            return match strategy.lob_source(reference) {
                Ok(source) => Cell::Binary {
                    id: self.id,
                    source,
                    length: self.length.unwrap_or(0),
                    externalized: true,
                },
                Err(e) => {
                    reporter.report(
                        ConditionKind::CellProcessingUsedNull,
                        self.id.as_str(),
                        format!("large object {} could not be opened: {}", reference, e),
                    );
                    Cell::null(self.id)
                }
            };
        }
        match self.ty.xsd_type() {
            XsdType::Composed => {
                let width = match self.ty.kind() {
                    TypeKind::ComposedStructure { fields } => fields.len(),
                    _ => self.children.iter().map(|(p, _)| p + 1).max().unwrap_or(0),
                };
                let mut children: Vec<Cell> = (0..width)
                    .map(|p| Cell::null(format!("{}.{}", self.id, p + 1)))
                    .collect();
                for (p, cell) in self.children {
                    children[p] = cell;
                }
                Cell::Composed {
                    id: self.id,
                    children,
                }
            }
            XsdType::Blob => match hex::decode(self.text.trim()) {
                Ok(bytes) => Cell::Binary {
                    id: self.id,
                    length: bytes.len() as u64,
                    source: LobSource::from_bytes(bytes),
                    externalized: false,
                },
                Err(e) => {
                    reporter.report(
                        ConditionKind::CellProcessingUsedNull,
                        self.id.as_str(),
                        format!("invalid hex content: {}", e),
                    );
                    Cell::null(self.id)
                }
            },
            _ => Cell::Simple {
                text: escape::decode(&self.text),
                id: self.id,
            },
        }
    }
}

#[derive(Default)]
struct ReadState {
    in_table: bool,
    done: bool,
    row: Option<Vec<Option<Cell>>>,
    row_index: u64,
    frames: Vec<Frame>,
    /// Depth inside an element whose content is ignored.
    skip: usize,
}

/// Stream the rows of one table document to `on_row`, returning how many
/// rows were read.
pub fn read_table<F>(
    strategy: &mut ArchiveStrategy,
    paths: &dyn PathStrategy,
    table: &TableStructure,
    schema_index: usize,
    table_index: usize,
    reporter: &mut Reporter,
    mut on_row: F,
) -> Result<u64>
where
    F: FnMut(Row) -> Result<()>,
{
    let path = paths.table_document_path(schema_index, table_index);
    debug!("Reading table document {} for {}", path, table.id);
    let input = strategy.create_input_stream(&path)?;
    let mut reader = Reader::from_reader(BufReader::new(input));
    let mut buf = Vec::new();
    let mut state = ReadState::default();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| ArchiveError::content(&table.id, format!("{}: {}", path, e)))?;
        match event {
            Event::Start(e) => state.open(&e, false, table, strategy, reporter, &mut on_row)?,
            Event::Empty(e) => state.open(&e, true, table, strategy, reporter, &mut on_row)?,
            Event::End(_) => state.close(table, strategy, reporter, &mut on_row)?,
            Event::Text(t) if state.skip == 0 => {
                if let Some(frame) = state.frames.last_mut() {
                    match t.unescape() {
                        Ok(text) => frame.text.push_str(&text),
                        Err(e) => {
                            frame.poisoned.get_or_insert_with(|| e.to_string());
                        }
                    }
                }
            }
            Event::CData(c) if state.skip == 0 => {
                if let Some(frame) = state.frames.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    if !state.done {
        return Err(ArchiveError::content(
            &table.id,
            format!("{} ends before the table element is closed", path),
        ));
    }
    debug!("Read {} rows from {}", state.row_index, path);
    Ok(state.row_index)
}

impl ReadState {
    fn skip_element(&mut self, is_empty: bool) {
        if !is_empty {
            self.skip = 1;
        }
    }

    fn open<F>(
        &mut self,
        e: &BytesStart<'_>,
        is_empty: bool,
        table: &TableStructure,
        strategy: &mut ArchiveStrategy,
        reporter: &mut Reporter,
        on_row: &mut F,
    ) -> Result<()>
    where
        F: FnMut(Row) -> Result<()>,
    {
        if self.skip > 0 {
            if !is_empty {
                self.skip += 1;
            }
            return Ok(());
        }
        let local = e.local_name();
        let name = local.as_ref();

        if !self.in_table {
            if self.done {
                self.skip_element(is_empty);
                return Ok(());
            }
            if name != TABLE_ELEMENT.as_bytes() {
                return Err(ArchiveError::content(
                    &table.id,
                    format!(
                        "root element is <{}>, expected <{}>",
                        String::from_utf8_lossy(name),
                        TABLE_ELEMENT
                    ),
                ));
            }
            self.in_table = !is_empty;
            self.done = is_empty;
            return Ok(());
        }

        if self.row.is_none() {
            if name != ROW_ELEMENT.as_bytes() {
                warn!(
                    "Skipping <{}> in table {}",
                    String::from_utf8_lossy(name),
                    table.id
                );
                self.skip_element(is_empty);
                return Ok(());
            }
            self.row_index += 1;
            self.row = Some((0..table.columns.len()).map(|_| None).collect());
            if is_empty {
                self.emit_row(table, on_row)?;
            }
            return Ok(());
        }

        let frame = match self.frames.last() {
            Some(parent) => {
                let prefix = match parent.ty.kind() {
                    TypeKind::ComposedArray { .. } => b'a',
                    TypeKind::ComposedStructure { .. } => b'u',
                    _ => {
                        self.skip_element(is_empty);
                        return Ok(());
                    }
                };
                let index = parse_indexed(name, prefix);
                if let Some(index) = index.filter(|&i| prefix == b'a' && i > MAX_ARRAY_ITEMS) {
                    reporter.report(
                        ConditionKind::ValueChanged,
                        parent.id.as_str(),
                        format!("array item a{} beyond {} dropped", index, MAX_ARRAY_ITEMS),
                    );
                    self.skip_element(is_empty);
                    return Ok(());
                }
                let child = index
                    .and_then(|i| child_element(&parent.ty, i - 1).map(|(_, ty)| (i, ty)));
                let Some((index, ty)) = child else {
                    self.skip_element(is_empty);
                    return Ok(());
                };
                Frame::open(e, index - 1, format!("{}.{}", parent.id, index), ty.clone())?
            }
            None => {
                let column = parse_column_element(name)
                    .and_then(|i| table.columns.get(i - 1).map(|c| (i, c)));
                let Some((index, column)) = column else {
                    self.skip_element(is_empty);
                    return Ok(());
                };
                Frame::open(
                    e,
                    index - 1,
                    cell_id(&column.id, self.row_index),
                    column.ty.clone(),
                )?
            }
        };
        self.frames.push(frame);
        if is_empty {
            self.close_frame(strategy, reporter);
        }
        Ok(())
    }

    fn close<F>(
        &mut self,
        table: &TableStructure,
        strategy: &mut ArchiveStrategy,
        reporter: &mut Reporter,
        on_row: &mut F,
    ) -> Result<()>
    where
        F: FnMut(Row) -> Result<()>,
    {
        if self.skip > 0 {
            self.skip -= 1;
        } else if !self.frames.is_empty() {
            self.close_frame(strategy, reporter);
        } else if self.row.is_some() {
            self.emit_row(table, on_row)?;
        } else if self.in_table {
            self.in_table = false;
            self.done = true;
        }
        Ok(())
    }

    fn close_frame(&mut self, strategy: &mut ArchiveStrategy, reporter: &mut Reporter) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        let position = frame.position;
        let cell = frame.finish(strategy, reporter);
        if let Some(parent) = self.frames.last_mut() {
            parent.children.push((position, cell));
        } else if let Some(row) = self.row.as_mut() {
            row[position] = Some(cell);
        }
    }

    fn emit_row<F>(&mut self, table: &TableStructure, on_row: &mut F) -> Result<()>
    where
        F: FnMut(Row) -> Result<()>,
    {
        let Some(cells) = self.row.take() else {
            return Ok(());
        };
        let index = self.row_index;
        let cells = cells
            .into_iter()
            .zip(&table.columns)
            .map(|(cell, column)| cell.unwrap_or_else(|| Cell::null(cell_id(&column.id, index))))
            .collect();
        on_row(Row::new(index, cells))
    }
}
