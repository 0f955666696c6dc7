//! Content codec: per-table documents, their schema documents and the
//! large objects they reference.

pub mod escape;
pub mod lob;
pub mod reader;
pub mod schema;
pub mod writer;

pub use lob::{should_externalize, DigestReader, DIGEST_TYPE};
pub use reader::{check_table, read_table};
pub use schema::{ColumnRule, DocumentCheck, TableSchema, MAX_VIOLATIONS};
pub use writer::{TableStats, TableWriter};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{AccessMode, ArchiveStrategy, FormatVersion};
    use crate::config::{Compression, ContainerLayout, LobConfig};
    use crate::core::{Cell, LobSource, Row, TableStructure};
    use crate::dialect::{StructField, Type};
    use crate::paths::{PathStrategy, Siard22Paths};
    use crate::report::{ConditionKind, Reporter};
    use std::path::Path;
    use tempfile::TempDir;

    fn make_test_table() -> TableStructure {
        let mut table = TableStructure::new("app", "docs", 1);
        table.add_column("id", Type::integer(), false);
        table.add_column("payload", Type::blob(), true);
        table.add_column("body", Type::clob(), true);
        table.add_column("title", Type::varchar(40), true);
        table.add_column("tags", Type::array(Type::varchar(10)), true);
        table.add_column(
            "point",
            Type::structure(vec![
                StructField::new("x", Type::integer()),
                StructField::new("y", Type::integer()),
            ]),
            true,
        );
        table
    }

    fn make_test_lob_config() -> LobConfig {
        LobConfig {
            clob_threshold: 10,
            blob_threshold: 10,
            external_lob_folder: None,
        }
    }

    fn strategy(path: &Path, mode: AccessMode) -> ArchiveStrategy {
        let mut strategy = ArchiveStrategy::for_layout(
            path,
            ContainerLayout::Folder,
            Compression::Deflate,
            None,
            mode,
            Some(FormatVersion::V2_2),
        )
        .unwrap();
        strategy.setup().unwrap();
        strategy
    }

    fn write_rows(path: &Path, table: &TableStructure, rows: &[Row], reporter: &mut Reporter) {
        let paths = Siard22Paths;
        let mut strategy = strategy(path, AccessMode::Write);
        let mut writer = TableWriter::open(&mut strategy, &paths, table, 1, 1, true).unwrap();
        for row in rows {
            writer
                .write_row(&mut strategy, &paths, row, &make_test_lob_config(), reporter)
                .unwrap();
        }
        writer.finish(&mut strategy, &paths).unwrap();
        strategy.finish().unwrap();
    }

    fn read_rows(path: &Path, table: &TableStructure, reporter: &mut Reporter) -> Vec<Row> {
        let paths = Siard22Paths;
        let mut strategy = strategy(path, AccessMode::Read);
        let check = check_table(&mut strategy, &paths, table, 1, 1).unwrap();
        assert!(check.is_valid(), "{:?}", check.violations);
        let mut rows = Vec::new();
        let count = read_table(&mut strategy, &paths, table, 1, 1, reporter, |row| {
            rows.push(row);
            Ok(())
        })
        .unwrap();
        assert_eq!(count as usize, rows.len());
        rows
    }

    fn text(cell: &Cell) -> Option<&str> {
        match cell {
            Cell::Simple { text, .. } => Some(text),
            _ => None,
        }
    }

    fn bytes(cell: &Cell) -> Option<Vec<u8>> {
        match cell {
            Cell::Binary { source, .. } => Some(source.read_all().unwrap()),
            _ => None,
        }
    }

    #[test]
    fn test_round_trip_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pkg");
        let table = make_test_table();
        let mut reporter = Reporter::in_memory();
        let rows = vec![
            Row::new(
                1,
                vec![
                    Cell::simple("c1", "1"),
                    Cell::binary("c2", vec![1u8; 9]),
                    Cell::simple("c3", "short"),
                    Cell::simple("c4", "  two\\spaces\u{1}"),
                    Cell::composed("c5", vec![Cell::simple("a1", "x"), Cell::simple("a2", "y")]),
                    Cell::composed("c6", vec![Cell::simple("u1", "3"), Cell::null("u2")]),
                ],
            ),
            Row::new(
                2,
                vec![
                    Cell::simple("c1", "2"),
                    Cell::binary("c2", vec![7u8; 12]),
                    Cell::simple("c3", "a character value over ten bytes"),
                    Cell::simple("c4", ""),
                    Cell::null("c5"),
                    Cell::null("c6"),
                ],
            ),
        ];
        write_rows(&path, &table, &rows, &mut reporter);
        assert_eq!(reporter.count(ConditionKind::LobExternalized), 2);

        let lob_dir = path.join("content/schema1/table1");
        assert!(lob_dir.join("lob2/record1.bin").is_file());
        assert!(lob_dir.join("lob3/record1.txt").is_file());
        assert!(!lob_dir.join("lob2/record2.bin").exists());
        assert!(lob_dir.join("table1.xsd").is_file());

        let mut reporter = Reporter::in_memory();
        let read = read_rows(&path, &table, &mut reporter);
        assert!(reporter.is_empty());
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].index, 1);
        assert_eq!(read[0].cells[0].id(), "app.docs.id.1");
        assert_eq!(text(&read[0].cells[0]), Some("1"));
        assert_eq!(bytes(&read[0].cells[1]), Some(vec![1u8; 9]));
        assert_eq!(text(&read[0].cells[2]), Some("short"));
        assert_eq!(text(&read[0].cells[3]), Some("  two\\spaces\u{1}"));
        match &read[0].cells[4] {
            Cell::Composed { children, .. } => {
                assert_eq!(children.len(), 2);
                assert_eq!(text(&children[1]), Some("y"));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &read[0].cells[5] {
            Cell::Composed { children, .. } => {
                assert_eq!(text(&children[0]), Some("3"));
                assert!(children[1].is_null());
            }
            other => panic!("unexpected {:?}", other),
        }

        match &read[1].cells[1] {
            Cell::Binary {
                length,
                externalized,
                ..
            } => {
                assert_eq!(*length, 12);
                assert!(*externalized);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(bytes(&read[1].cells[1]), Some(vec![7u8; 12]));
        assert_eq!(
            bytes(&read[1].cells[2]),
            Some(b"a character value over ten bytes".to_vec())
        );
        assert_eq!(text(&read[1].cells[3]), Some(""));
        assert!(read[1].cells[4].is_null());
    }

    #[test]
    fn test_missing_lob_becomes_null() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pkg");
        let table = make_test_table();
        let mut reporter = Reporter::in_memory();
        let row = Row::new(
            1,
            vec![
                Cell::simple("c1", "1"),
                Cell::stream("c2", LobSource::from_bytes(vec![0u8; 50]), 50),
                Cell::null("c3"),
                Cell::null("c4"),
                Cell::null("c5"),
                Cell::null("c6"),
            ],
        );
        write_rows(&path, &table, &[row], &mut reporter);
        std::fs::remove_file(path.join("content/schema1/table1/lob2/record1.bin")).unwrap();

        let mut reporter = Reporter::in_memory();
        let read = read_rows(&path, &table, &mut reporter);
        assert!(read[0].cells[1].is_null());
        assert_eq!(reporter.count(ConditionKind::CellProcessingUsedNull), 1);
    }

    #[test]
    fn test_unopenable_source_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pkg");
        let table = make_test_table();
        let mut reporter = Reporter::in_memory();
        let broken = LobSource::from_opener(|| {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "gone"))
        });
        let row = Row::new(
            1,
            vec![
                Cell::simple("c1", "1"),
                Cell::stream("c2", broken, 100),
                Cell::null("c3"),
                Cell::null("c4"),
                Cell::null("c5"),
                Cell::null("c6"),
            ],
        );
        write_rows(&path, &table, &[row], &mut reporter);
        assert_eq!(reporter.count(ConditionKind::CellProcessingUsedNull), 1);
    }

    #[test]
    fn test_row_width_mismatch_is_fatal() {
        let dir = TempDir::new().unwrap();
        let paths = Siard22Paths;
        let table = make_test_table();
        let mut strategy = strategy(&dir.path().join("pkg"), AccessMode::Write);
        let mut writer = TableWriter::open(&mut strategy, &paths, &table, 1, 1, false).unwrap();
        let row = Row::new(1, vec![Cell::simple("c1", "1")]);
        let mut reporter = Reporter::in_memory();
        assert!(writer
            .write_row(&mut strategy, &paths, &row, &make_test_lob_config(), &mut reporter)
            .is_err());
    }

    #[test]
    fn test_bad_hex_degrades_to_null() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pkg");
        let table = make_test_table();
        let mut reporter = Reporter::in_memory();
        write_rows(&path, &table, &[], &mut reporter);
        let doc = path.join(Siard22Paths.table_document_path(1, 1));
        std::fs::write(
            &doc,
            "<table><row><c1>5</c1><c2>zz</c2></row></table>",
        )
        .unwrap();

        let paths = Siard22Paths;
        let mut strategy = strategy(&path, AccessMode::Read);
        let check = check_table(&mut strategy, &paths, &table, 1, 1).unwrap();
        assert_eq!(check.violation_count, 1);
        let mut rows = Vec::new();
        read_table(&mut strategy, &paths, &table, 1, 1, &mut reporter, |row| {
            rows.push(row);
            Ok(())
        })
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].cells[1].is_null());
        assert_eq!(reporter.count(ConditionKind::CellProcessingUsedNull), 1);
    }

    fn read_raw(doc_text: &str, reporter: &mut Reporter) -> Vec<Row> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pkg");
        let table = make_test_table();
        write_rows(&path, &table, &[], reporter);
        std::fs::write(path.join(Siard22Paths.table_document_path(1, 1)), doc_text).unwrap();

        let paths = Siard22Paths;
        let mut strategy = strategy(&path, AccessMode::Read);
        let mut rows = Vec::new();
        read_table(&mut strategy, &paths, &table, 1, 1, reporter, |row| {
            rows.push(row);
            Ok(())
        })
        .unwrap();
        rows
    }

    #[test]
    fn test_bad_entity_degrades_to_null() {
        let mut reporter = Reporter::in_memory();
        let rows = read_raw(
            "<table><row><c1>1</c1><c4>a&bogus;b</c4></row><row><c1>2</c1><c4>ok</c4></row></table>",
            &mut reporter,
        );
        assert_eq!(rows.len(), 2);
        assert!(rows[0].cells[3].is_null());
        assert_eq!(text(&rows[0].cells[0]), Some("1"));
        assert_eq!(text(&rows[1].cells[3]), Some("ok"));
        assert_eq!(reporter.count(ConditionKind::CellProcessingUsedNull), 1);
    }

    #[test]
    fn test_array_item_beyond_limit_is_dropped() {
        let mut reporter = Reporter::in_memory();
        let rows = read_raw(
            "<table><row><c1>1</c1><c5><a1>x</a1><a4000000000>y</a4000000000></c5></row>\
             <row><c1>2</c1></row></table>",
            &mut reporter,
        );
        assert_eq!(rows.len(), 2);
        match &rows[0].cells[4] {
            Cell::Composed { children, .. } => {
                assert_eq!(children.len(), 1);
                assert_eq!(text(&children[0]), Some("x"));
            }
            other => panic!("expected composed cell, got {:?}", other),
        }
        assert_eq!(reporter.count(ConditionKind::ValueChanged), 1);
    }
}
