//! End-to-end tests for siard-archive.
//!
//! These tests export packages through the handler interface, validate
//! them, and import them back into a recording handler.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use siard_archive::dialect::StructField;
use siard_archive::{
    ArchiveConfig, ArchiveError, Cell, ConditionKind, ContainerLayout, DatabaseHandler,
    DatabaseStructure, FormatVersion, LobConfig, Result, Row, SchemaStructure, SiardExporter,
    SiardImporter, StructureRule, StructureValidator, TableStructure, Type,
};
use tempfile::TempDir;

/// Handler that keeps everything it receives.
#[derive(Default)]
struct Recorder {
    calls: Vec<String>,
    ignored: BTreeSet<String>,
    structure: Option<DatabaseStructure>,
    rows: BTreeMap<String, Vec<Row>>,
    open_table: Option<String>,
}

impl DatabaseHandler for Recorder {
    fn init_database(&mut self) -> Result<()> {
        self.calls.push("init".into());
        Ok(())
    }

    fn set_ignored_schemas(&mut self, schemas: BTreeSet<String>) -> Result<()> {
        self.calls.push("ignored".into());
        self.ignored = schemas;
        Ok(())
    }

    fn handle_structure(&mut self, structure: &DatabaseStructure) -> Result<()> {
        self.calls.push("structure".into());
        self.structure = Some(structure.clone());
        Ok(())
    }

    fn handle_data_open_schema(&mut self, schema_name: &str) -> Result<()> {
        self.calls.push(format!("open {}", schema_name));
        Ok(())
    }

    fn handle_data_open_table(&mut self, table_id: &str) -> Result<()> {
        self.calls.push(format!("open {}", table_id));
        self.open_table = Some(table_id.to_string());
        Ok(())
    }

    fn handle_data_row(&mut self, row: Row) -> Result<()> {
        let table = self.open_table.clone().unwrap_or_default();
        self.rows.entry(table).or_default().push(row);
        Ok(())
    }

    fn handle_data_close_table(&mut self, table_id: &str) -> Result<()> {
        self.calls.push(format!("close {}", table_id));
        self.open_table = None;
        Ok(())
    }

    fn handle_data_close_schema(&mut self, schema_name: &str) -> Result<()> {
        self.calls.push(format!("close {}", schema_name));
        Ok(())
    }

    fn finish_database(&mut self) -> Result<()> {
        self.calls.push("finish".into());
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn make_test_database() -> DatabaseStructure {
    let mut db = DatabaseStructure::new("shop");
    db.metadata.data_owner = Some("Records office".into());
    db.metadata.archival_date = NaiveDate::from_ymd_opt(2024, 5, 1);

    let mut app = SchemaStructure::new("app", 1);
    let mut orders = TableStructure::new("app", "orders", 1);
    orders.add_column("id", Type::integer(), false);
    orders.add_column("amount", Type::decimal(12, 2), true);
    orders.add_column("note", Type::clob(), true);
    orders.add_column("scan", Type::blob(), true);
    orders.add_column("placed", Type::timestamp(false), true);
    orders.add_column("tags", Type::array(Type::varchar(10)), true);
    orders.add_column(
        "origin",
        Type::structure(vec![
            StructField::new("lat", Type::double()),
            StructField::new("lon", Type::double()),
        ]),
        true,
    );
    app.tables.push(orders);

    let mut customers = TableStructure::new("app", "customers", 2);
    customers.add_column("id", Type::integer(), false);
    customers.add_column("name", Type::varchar(40), false);
    customers.add_column("active", Type::boolean(), true);
    app.tables.push(customers);
    db.schemas.push(app);

    let mut audit = SchemaStructure::new("audit", 2);
    let mut log = TableStructure::new("audit", "log", 1);
    log.add_column("entry", Type::varchar(200), true);
    audit.tables.push(log);
    db.schemas.push(audit);
    db
}

fn make_test_rows() -> BTreeMap<String, Vec<Row>> {
    let mut rows = BTreeMap::new();
    rows.insert(
        "app.orders".to_string(),
        vec![
            Row::new(
                1,
                vec![
                    Cell::simple("app.orders.id.1", "1"),
                    Cell::simple("app.orders.amount.1", "19.90"),
                    Cell::simple("app.orders.note.1", "short"),
                    Cell::binary("app.orders.scan.1", vec![0xab; 4]),
                    Cell::simple("app.orders.placed.1", "2024-05-01T10:00:00"),
                    Cell::composed(
                        "app.orders.tags.1",
                        vec![
                            Cell::simple("app.orders.tags.1.1", "new"),
                            Cell::simple("app.orders.tags.1.2", "paid"),
                        ],
                    ),
                    Cell::composed(
                        "app.orders.origin.1",
                        vec![
                            Cell::simple("app.orders.origin.1.1", "46.95"),
                            Cell::simple("app.orders.origin.1.2", "7.44"),
                        ],
                    ),
                ],
            ),
            Row::new(
                2,
                vec![
                    Cell::simple("app.orders.id.2", "2"),
                    Cell::null("app.orders.amount.2"),
                    Cell::simple("app.orders.note.2", "a note that is well over the threshold"),
                    Cell::binary("app.orders.scan.2", vec![0x5a; 64]),
                    Cell::null("app.orders.placed.2"),
                    Cell::null("app.orders.tags.2"),
                    Cell::null("app.orders.origin.2"),
                ],
            ),
        ],
    );
    rows.insert(
        "app.customers".to_string(),
        vec![Row::new(
            1,
            vec![
                Cell::simple("app.customers.id.1", "1"),
                Cell::simple("app.customers.name.1", "Ada  <Lovelace> & co"),
                Cell::simple("app.customers.active.1", "true"),
            ],
        )],
    );
    rows.insert(
        "audit.log".to_string(),
        vec![Row::new(1, vec![Cell::simple("audit.log.entry.1", "created")])],
    );
    rows
}

fn make_test_config(layout: ContainerLayout) -> ArchiveConfig {
    ArchiveConfig {
        layout,
        lob: LobConfig {
            clob_threshold: 16,
            blob_threshold: 16,
            external_lob_folder: (layout == ContainerLayout::ZipExternalLobs)
                .then(|| "shop_lobs".to_string()),
        },
        ..ArchiveConfig::default()
    }
}

/// Drive an exporter through the whole call sequence.
fn export(
    path: &Path,
    config: ArchiveConfig,
    db: &DatabaseStructure,
    rows: &BTreeMap<String, Vec<Row>>,
) -> SiardExporter {
    let mut exporter = SiardExporter::new(path, config).unwrap();
    exporter.init_database().unwrap();
    exporter.set_ignored_schemas(BTreeSet::new()).unwrap();
    exporter.handle_structure(db).unwrap();
    for schema in &db.schemas {
        exporter.handle_data_open_schema(&schema.name).unwrap();
        for table in &schema.tables {
            exporter.handle_data_open_table(&table.id).unwrap();
            for row in rows.get(&table.id).into_iter().flatten() {
                exporter.handle_data_row(row.clone()).unwrap();
            }
            exporter.handle_data_close_table(&table.id).unwrap();
        }
        exporter.handle_data_close_schema(&schema.name).unwrap();
    }
    exporter.finish_database().unwrap();
    exporter
}

fn package_path(dir: &TempDir, layout: ContainerLayout) -> PathBuf {
    match layout {
        ContainerLayout::Folder => dir.path().join("shop"),
        _ => dir.path().join("shop.siard"),
    }
}

fn cell_bytes(cell: &Cell) -> Option<Vec<u8>> {
    match cell {
        Cell::Null { .. } => None,
        Cell::Simple { text, .. } => Some(text.clone().into_bytes()),
        Cell::Binary { source, .. } => Some(source.read_all().unwrap()),
        Cell::Composed { children, .. } => {
            let parts: Vec<String> = children
                .iter()
                .map(|c| cell_bytes(c).map(|b| String::from_utf8_lossy(&b).into_owned()).unwrap_or_default())
                .collect();
            Some(parts.join("|").into_bytes())
        }
    }
}

// =============================================================================
// Round Trip Tests
// =============================================================================

fn assert_round_trip(layout: ContainerLayout) {
    let dir = TempDir::new().unwrap();
    let path = package_path(&dir, layout);
    let db = make_test_database();
    let rows = make_test_rows();
    let config = make_test_config(layout);
    let exporter = export(&path, config.clone(), &db, &rows);
    assert_eq!(exporter.stats().rows, 4);
    assert_eq!(exporter.stats().lobs, 2);
    assert_eq!(exporter.reporter().count(ConditionKind::LobExternalized), 2);
    let written = exporter.structure().unwrap().clone();

    let mut recorder = Recorder::default();
    let stats = SiardImporter::new(&path, config).unwrap().import(&mut recorder).unwrap();
    assert_eq!(stats.rows, 4);
    assert_eq!(stats.lobs, 2);

    let imported = recorder.structure.unwrap();
    assert_eq!(imported, written);
    let orders = imported.table_by_id("app.orders").unwrap();
    assert_eq!(orders.row_count, 2);
    assert_eq!(orders.columns[1].ty.sql2008_name(), "DECIMAL(12,2)");

    for (table, expected) in &rows {
        let actual = &recorder.rows[table];
        assert_eq!(actual.len(), expected.len(), "{}", table);
        for (a, e) in actual.iter().zip(expected) {
            assert_eq!(a.index, e.index);
            for (ac, ec) in a.cells.iter().zip(&e.cells) {
                assert_eq!(ac.id(), ec.id());
                assert_eq!(cell_bytes(ac), cell_bytes(ec), "{}", ec.id());
            }
        }
    }
}

#[test]
fn test_round_trip_zip() {
    assert_round_trip(ContainerLayout::Zip);
}

#[test]
fn test_round_trip_folder() {
    assert_round_trip(ContainerLayout::Folder);
}

#[test]
fn test_round_trip_zip_external_lobs() {
    assert_round_trip(ContainerLayout::ZipExternalLobs);
    let dir = TempDir::new().unwrap();
    let path = package_path(&dir, ContainerLayout::ZipExternalLobs);
    export(
        &path,
        make_test_config(ContainerLayout::ZipExternalLobs),
        &make_test_database(),
        &make_test_rows(),
    );
    assert!(dir
        .path()
        .join("shop_lobs/content/schema1/table1/lob4/record1.bin")
        .is_file());
}

#[test]
fn test_import_call_order() {
    let dir = TempDir::new().unwrap();
    let path = package_path(&dir, ContainerLayout::Zip);
    let config = make_test_config(ContainerLayout::Zip);
    export(&path, config.clone(), &make_test_database(), &make_test_rows());

    let mut recorder = Recorder::default();
    SiardImporter::new(&path, config).unwrap().import(&mut recorder).unwrap();
    assert!(recorder.ignored.is_empty());
    assert_eq!(
        recorder.calls,
        vec![
            "init",
            "ignored",
            "structure",
            "open app",
            "open app.orders",
            "close app.orders",
            "open app.customers",
            "close app.customers",
            "close app",
            "open audit",
            "open audit.log",
            "close audit.log",
            "close audit",
            "finish",
        ]
    );
}

// =============================================================================
// Validator Tests
// =============================================================================

#[test]
fn test_exported_packages_pass_validation() {
    for layout in [
        ContainerLayout::Zip,
        ContainerLayout::Folder,
        ContainerLayout::ZipExternalLobs,
    ] {
        let dir = TempDir::new().unwrap();
        let path = package_path(&dir, layout);
        let config = make_test_config(layout);
        export(&path, config.clone(), &make_test_database(), &make_test_rows());

        let report = StructureValidator::new(config)
            .expect_version(FormatVersion::V2_2)
            .validate(&path)
            .unwrap();
        for rule in &report.rules {
            assert!(rule.passed, "{:?} {} {:?}", layout, rule.rule, rule.offending);
            assert!(rule.offending.is_empty());
        }
        for document in &report.documents {
            assert!(document.passed, "{:?} {} {:?}", layout, document.path, document.violations);
        }
        assert!(report.passed());
        assert_eq!(report.documents.len(), 4);
        assert_eq!(report.version.as_deref(), Some("2.2"));
    }
}

#[test]
fn test_threshold_scenario() {
    let dir = TempDir::new().unwrap();
    let path = package_path(&dir, ContainerLayout::Zip);
    let config = ArchiveConfig {
        lob: LobConfig {
            clob_threshold: 10,
            blob_threshold: 10,
            external_lob_folder: None,
        },
        ..ArchiveConfig::default()
    };
    let mut db = DatabaseStructure::new("scenario");
    let mut schema = SchemaStructure::new("main", 1);
    let mut table = TableStructure::new("main", "payloads", 1);
    table.add_column("id", Type::integer(), false);
    table.add_column("payload", Type::blob(), true);
    schema.tables.push(table);
    db.schemas.push(schema);

    let mut rows = BTreeMap::new();
    rows.insert(
        "main.payloads".to_string(),
        vec![
            Row::new(
                1,
                vec![
                    Cell::simple("main.payloads.id.1", "1"),
                    Cell::binary("main.payloads.payload.1", vec![1u8; 9]),
                ],
            ),
            Row::new(
                2,
                vec![
                    Cell::simple("main.payloads.id.2", "2"),
                    Cell::binary("main.payloads.payload.2", vec![2u8; 12]),
                ],
            ),
        ],
    );
    let exporter = export(&path, config.clone(), &db, &rows);
    assert_eq!(exporter.stats().lobs, 1);

    let file = fs::File::open(&path).unwrap();
    let archive = zip::ZipArchive::new(file).unwrap();
    let lobs: Vec<&str> = archive.file_names().filter(|n| n.contains("/lob")).collect();
    assert_eq!(lobs, vec!["content/schema1/table1/lob2/record1.bin"]);

    let report = StructureValidator::new(config).validate(&path).unwrap();
    assert!(report.rules_passed(), "{:?}", report.failed_rules());
    assert!(report.passed());
}

#[test]
fn test_naming_rule_alone_rejects_bad_names() {
    let dir = TempDir::new().unwrap();
    let path = package_path(&dir, ContainerLayout::Folder);
    let config = make_test_config(ContainerLayout::Folder);
    export(&path, config.clone(), &make_test_database(), &make_test_rows());
    for name in ["two..dots.txt", "9lives.txt", "bad-name.txt"] {
        fs::write(path.join("header").join(name), b"x").unwrap();
    }

    let report = StructureValidator::new(config).validate(&path).unwrap();
    assert_eq!(report.failed_rules(), vec![StructureRule::NamingGrammar]);
    let naming = report.rule(StructureRule::NamingGrammar).unwrap();
    assert_eq!(naming.offending.len(), 3);
    assert!(!report.passed());
}

#[test]
fn test_missing_table_schema_fails_rule_c() {
    let dir = TempDir::new().unwrap();
    let path = package_path(&dir, ContainerLayout::Folder);
    let config = make_test_config(ContainerLayout::Folder);
    export(&path, config.clone(), &make_test_database(), &make_test_rows());
    fs::remove_file(path.join("content/schema1/table2/table2.xsd")).unwrap();

    let report = StructureValidator::new(config).validate(&path).unwrap();
    assert_eq!(report.failed_rules(), vec![StructureRule::TableFolderContents]);
    let json = report.to_json().unwrap();
    assert!(json.contains("content/schema1/table2/table2.xsd (missing)"));
}

#[test]
fn test_validator_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let path = package_path(&dir, ContainerLayout::Zip);
    let config = make_test_config(ContainerLayout::Zip);
    export(&path, config.clone(), &make_test_database(), &make_test_rows());
    let validator = StructureValidator::new(config);
    let first = validator.validate(&path).unwrap();
    let second = validator.validate(&path).unwrap();
    assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
}

// =============================================================================
// Numbering and Sequence Tests
// =============================================================================

#[test]
fn test_numbering_is_dense_with_ignored_schemas() {
    let dir = TempDir::new().unwrap();
    let path = package_path(&dir, ContainerLayout::Folder);
    let mut db = make_test_database();
    db.schemas.insert(0, SchemaStructure::new("staging", 1));
    let mut staging_table = TableStructure::new("staging", "tmp", 1);
    staging_table.add_column("x", Type::integer(), true);
    db.schemas[0].tables.push(staging_table);

    let config = ArchiveConfig {
        ignored_schemas: vec!["staging".into()],
        ..make_test_config(ContainerLayout::Folder)
    };
    export(&path, config.clone(), &db, &make_test_rows());

    let schemas: Vec<String> = fs::read_dir(path.join("content"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    assert_eq!(schemas, vec!["schema1", "schema2"]);
    assert!(path.join("content/schema1/table2/table2.xml").is_file());
    assert!(path.join("content/schema2/table1/table1.xml").is_file());
    assert!(!path.join("content/schema3").exists());

    let mut recorder = Recorder::default();
    SiardImporter::new(&path, make_test_config(ContainerLayout::Folder))
        .unwrap()
        .import(&mut recorder)
        .unwrap();
    let imported = recorder.structure.unwrap();
    let names: Vec<&str> = imported.schemas.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["app", "audit"]);
    assert_eq!(imported.schemas[1].index, 2);
}

#[test]
fn test_rows_out_of_order_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = package_path(&dir, ContainerLayout::Zip);
    let db = make_test_database();
    let mut exporter = SiardExporter::new(&path, make_test_config(ContainerLayout::Zip)).unwrap();
    exporter.init_database().unwrap();
    exporter.handle_structure(&db).unwrap();
    exporter.handle_data_open_schema("app").unwrap();
    exporter.handle_data_open_table("app.customers").unwrap();
    let row = |i: u64| {
        Row::new(
            i,
            vec![
                Cell::simple(format!("app.customers.id.{}", i), i.to_string()),
                Cell::simple(format!("app.customers.name.{}", i), "n"),
                Cell::null(format!("app.customers.active.{}", i)),
            ],
        )
    };
    exporter.handle_data_row(row(2)).unwrap();
    let err = exporter.handle_data_row(row(1)).unwrap_err();
    assert!(matches!(err, ArchiveError::Sequence(_)));
}

#[test]
fn test_row_width_mismatch_is_fatal() {
    let dir = TempDir::new().unwrap();
    let path = package_path(&dir, ContainerLayout::Folder);
    let db = make_test_database();
    let mut exporter = SiardExporter::new(&path, make_test_config(ContainerLayout::Folder)).unwrap();
    exporter.init_database().unwrap();
    exporter.handle_structure(&db).unwrap();
    exporter.handle_data_open_schema("audit").unwrap();
    exporter.handle_data_open_table("audit.log").unwrap();
    let err = exporter
        .handle_data_row(Row::new(1, vec![Cell::null("a"), Cell::null("b")]))
        .unwrap_err();
    assert!(matches!(err, ArchiveError::Content { .. }));
}

#[test]
fn test_missing_lob_degrades_to_null_on_import() {
    let dir = TempDir::new().unwrap();
    let path = package_path(&dir, ContainerLayout::Folder);
    let config = make_test_config(ContainerLayout::Folder);
    export(&path, config.clone(), &make_test_database(), &make_test_rows());
    fs::remove_file(path.join("content/schema1/table1/lob4/record1.bin")).unwrap();

    let mut recorder = Recorder::default();
    let mut importer = SiardImporter::new(&path, config).unwrap();
    importer.import(&mut recorder).unwrap();
    let scan = &recorder.rows["app.orders"][1].cells[3];
    assert!(scan.is_null());
    assert_eq!(importer.reporter().count(ConditionKind::CellProcessingUsedNull), 1);
}
