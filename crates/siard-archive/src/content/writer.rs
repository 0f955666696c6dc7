//! Streaming writer for table documents.

use std::io::Read;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tracing::debug;

use crate::archive::{ArchiveStrategy, OutputEntry};
use crate::config::LobConfig;
use crate::core::{Cell, Row, TableStructure};
use crate::dialect::{Type, TypeKind, XsdType};
use crate::error::{ArchiveError, Result};
use crate::paths::{LobKind, PathStrategy};
use crate::report::{ConditionKind, Reporter};

use super::escape;
use super::lob::{should_externalize, DigestReader, DIGEST_TYPE};
use super::schema::{column_element, TableSchema, ROW_ELEMENT, TABLE_ELEMENT, XSI_NAMESPACE};

/// Totals for one written table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    pub rows: u64,
    pub lobs: u64,
}

/// Writes one table document, row by row.
///
/// Rows are serialized as they arrive; only the current row is held.
/// Large cells are copied to their own entries while the document stays
/// open.
pub struct TableWriter {
    table: TableStructure,
    schema_index: usize,
    table_index: usize,
    writer: Writer<OutputEntry>,
    /// Next record number per column.
    lob_counters: Vec<u64>,
    stats: TableStats,
    pretty: bool,
}

impl TableWriter {
    /// Open `content/schemaS/tableT/tableT.xml` and write the root element.
    pub fn open(
        strategy: &mut ArchiveStrategy,
        paths: &dyn PathStrategy,
        table: &TableStructure,
        schema_index: usize,
        table_index: usize,
        pretty: bool,
    ) -> Result<Self> {
        let path = paths.table_document_path(schema_index, table_index);
        debug!("Opening table document {} for {}", path, table.id);
        let entry = strategy.open_output(&path)?;
        let mut writer = if pretty {
            Writer::new_with_indent(entry, b' ', 2)
        } else {
            Writer::new(entry)
        };

        let namespace = paths.table_namespace(schema_index, table_index);
        let location = format!("{} {}", namespace, paths.table_schema_name(table_index));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        let mut root = BytesStart::new(TABLE_ELEMENT);
        root.push_attribute(("xmlns", namespace.as_str()));
        root.push_attribute(("xmlns:xsi", XSI_NAMESPACE));
        root.push_attribute(("xsi:schemaLocation", location.as_str()));
        writer.write_event(Event::Start(root))?;

        Ok(Self {
            table: table.clone(),
            schema_index,
            table_index,
            writer,
            lob_counters: vec![0; table.columns.len()],
            stats: TableStats::default(),
            pretty,
        })
    }

    pub fn stats(&self) -> TableStats {
        self.stats
    }

    /// Append one row. Null cells are omitted.
    pub fn write_row(
        &mut self,
        strategy: &mut ArchiveStrategy,
        paths: &dyn PathStrategy,
        row: &Row,
        lob: &LobConfig,
        reporter: &mut Reporter,
    ) -> Result<()> {
        if row.cells.len() != self.table.columns.len() {
            return Err(ArchiveError::content(
                &self.table.id,
                format!(
                    "row {} has {} cells but the table has {} columns",
                    row.index,
                    row.cells.len(),
                    self.table.columns.len()
                ),
            ));
        }
        self.writer
            .write_event(Event::Start(BytesStart::new(ROW_ELEMENT)))?;
        for (i, cell) in row.cells.iter().enumerate() {
            self.write_cell(strategy, paths, i, cell, lob, reporter)?;
        }
        self.writer
            .write_event(Event::End(BytesEnd::new(ROW_ELEMENT)))?;
        self.stats.rows += 1;
        Ok(())
    }

    fn write_cell(
        &mut self,
        strategy: &mut ArchiveStrategy,
        paths: &dyn PathStrategy,
        position: usize,
        cell: &Cell,
        lob: &LobConfig,
        reporter: &mut Reporter,
    ) -> Result<()> {
        let ty = self.table.columns[position].ty.clone();
        let name = column_element(position + 1);
        match cell {
            Cell::Null { .. } => Ok(()),
            Cell::Simple { id, text } => match ty.lob_kind() {
                Some(kind @ LobKind::Character)
                    if should_externalize(lob, kind, text.len() as u64) =>
                {
                    let mut bytes = text.as_bytes();
                    self.externalize(
                        strategy,
                        paths,
                        position,
                        id,
                        kind,
                        &mut bytes,
                        text.len() as u64,
                        reporter,
                    )
                }
                _ => write_text(&mut self.writer, &name, text),
            },
            Cell::Binary {
                id, source, length, ..
            } => {
                let mut input = match source.open() {
                    Ok(input) => input,
                    Err(e) => {
                        reporter.report(
                            ConditionKind::CellProcessingUsedNull,
                            id.as_str(),
                            format!("large object could not be opened: {}", e),
                        );
                        return Ok(());
                    }
                };
                if let Some(kind) = ty.lob_kind() {
                    if should_externalize(lob, kind, *length) {
                        return self.externalize(
                            strategy, paths, position, id, kind, &mut input, *length, reporter,
                        );
                    }
                }
                let mut bytes = Vec::new();
                input.read_to_end(&mut bytes)?;
                let text = bytes_as_text(&ty, bytes, id, reporter);
                write_text(&mut self.writer, &name, &text)
            }
            Cell::Composed { children, .. } => {
                write_composed(&mut self.writer, &name, &ty, children, reporter)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn externalize(
        &mut self,
        strategy: &mut ArchiveStrategy,
        paths: &dyn PathStrategy,
        position: usize,
        id: &str,
        kind: LobKind,
        input: &mut dyn Read,
        size_hint: u64,
        reporter: &mut Reporter,
    ) -> Result<()> {
        self.lob_counters[position] += 1;
        let record = self.lob_counters[position];
        let path = paths.lob_file_path(
            self.schema_index,
            self.table_index,
            position + 1,
            record,
            kind,
        );
        let mut digest = DigestReader::new(input);
        let reference = strategy.write_lob(&path, &mut digest, Some(size_hint))?;
        let (length, digest) = digest.finish();

        let length_text = length.to_string();
        let mut e = BytesStart::new(column_element(position + 1));
        e.push_attribute(("file", reference.as_str()));
        e.push_attribute(("length", length_text.as_str()));
        e.push_attribute(("digestType", DIGEST_TYPE));
        e.push_attribute(("digest", digest.as_str()));
        self.writer.write_event(Event::Empty(e))?;

        self.stats.lobs += 1;
        reporter.report(
            ConditionKind::LobExternalized,
            id,
            format!("{} bytes stored as {}", length, reference),
        );
        Ok(())
    }

    /// Close the document and write its schema next to it.
    pub fn finish(
        mut self,
        strategy: &mut ArchiveStrategy,
        paths: &dyn PathStrategy,
    ) -> Result<TableStats> {
        self.writer
            .write_event(Event::End(BytesEnd::new(TABLE_ELEMENT)))?;
        let mut entry = self.writer.into_inner();
        std::io::Write::write_all(&mut entry, b"\n")?;
        strategy.close_output(entry)?;

        let namespace = paths.table_namespace(self.schema_index, self.table_index);
        let xsd = TableSchema::for_table(&self.table).to_xsd(&namespace, self.pretty)?;
        let xsd_path = paths.table_schema_path(self.schema_index, self.table_index);
        strategy.write_entry(&xsd_path, &mut &xsd[..], Some(xsd.len() as u64))?;
        debug!(
            "Finished {}: {} rows, {} large objects",
            self.table.id, self.stats.rows, self.stats.lobs
        );
        Ok(self.stats)
    }
}

fn write_text<W: std::io::Write>(w: &mut Writer<W>, name: &str, text: &str) -> Result<()> {
    if text.is_empty() {
        w.write_event(Event::Empty(BytesStart::new(name)))?;
        return Ok(());
    }
    let encoded = escape::encode(text);
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(&encoded)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Inline representation of binary cell content.
///
/// Character columns carry the bytes as UTF-8 text; everything else is hex.
fn bytes_as_text(ty: &Type, bytes: Vec<u8>, id: &str, reporter: &mut Reporter) -> String {
    match ty.xsd_type() {
        XsdType::Blob => hex::encode(bytes),
        _ => match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                reporter.report(
                    ConditionKind::ValueChanged,
                    id,
                    "invalid UTF-8 replaced while writing text",
                );
                String::from_utf8_lossy(e.as_bytes()).into_owned()
            }
        },
    }
}

fn write_composed<W: std::io::Write>(
    w: &mut Writer<W>,
    name: &str,
    ty: &Type,
    children: &[Cell],
    reporter: &mut Reporter,
) -> Result<()> {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    for (i, child) in children.iter().enumerate() {
        let Some((child_name, child_ty)) = child_element(ty, i) else {
            reporter.report(
                ConditionKind::CellProcessingUsedNull,
                child.id(),
                format!("no field {} in {}", i + 1, ty),
            );
            continue;
        };
        match child {
            Cell::Null { .. } => {}
            Cell::Simple { text, .. } => write_text(w, &child_name, text)?,
            Cell::Binary { id, source, .. } => match source.read_all() {
                Ok(bytes) => {
                    let text = bytes_as_text(child_ty, bytes, id, reporter);
                    write_text(w, &child_name, &text)?;
                }
                Err(e) => reporter.report(
                    ConditionKind::CellProcessingUsedNull,
                    id.as_str(),
                    format!("value could not be read: {}", e),
                ),
            },
            Cell::Composed { children, .. } => {
                write_composed(w, &child_name, child_ty, children, reporter)?
            }
        }
    }
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Element name and type of the `position`-th (0-based) child of a
/// composed value: `aN` for array items, `uN` for structure fields.
pub(crate) fn child_element(ty: &Type, position: usize) -> Option<(String, &Type)> {
    match ty.kind() {
        TypeKind::ComposedArray { element } => Some((format!("a{}", position + 1), element)),
        TypeKind::ComposedStructure { fields } => fields
            .get(position)
            .map(|f| (format!("u{}", position + 1), &f.ty)),
        _ => None,
    }
}
