//! Metadata codec: `header/metadata.xml`, its schema document and the
//! version marker folder.
//!
//! Export serializes the [`DatabaseStructure`] through serde. Import first
//! runs the structural check of [`check::check_metadata`]; violations are
//! reported and the lenient read is attempted anyway. Only a document that
//! cannot be deserialized at all is fatal.

pub mod check;
pub mod convert;
pub mod document;

use std::io::Read;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::archive::{ArchiveStrategy, FormatVersion};
use crate::content::DocumentCheck;
use crate::core::DatabaseStructure;
use crate::error::{ArchiveError, Result};
use crate::paths::PathStrategy;
use crate::report::{ConditionKind, Reporter};

pub use check::check_metadata;
pub use convert::{from_document, to_document};
pub use document::SiardArchiveDoc;

/// Schema document written next to `metadata.xml`.
pub const METADATA_XSD: &str = include_str!("metadata.xsd");

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

/// Result of importing the metadata document.
#[derive(Debug)]
pub struct MetadataImport {
    pub structure: DatabaseStructure,
    /// Generation declared by the document.
    pub version: Option<FormatVersion>,
    pub check: DocumentCheck,
}

/// Reads and writes the metadata document of one generation.
pub struct MetadataCodec<'a> {
    paths: &'a dyn PathStrategy,
    pretty: bool,
}

impl<'a> MetadataCodec<'a> {
    pub fn new(paths: &'a dyn PathStrategy, pretty: bool) -> Self {
        Self { paths, pretty }
    }

    /// Render the document for `db`.
    pub fn render(&self, db: &DatabaseStructure) -> Result<String> {
        let doc = to_document(db, self.paths);
        let mut body = String::new();
        let mut serializer = quick_xml::se::Serializer::new(&mut body);
        if self.pretty {
            serializer.indent(' ', 2);
        }
        doc.serialize(serializer)?;
        Ok(format!("{}{}\n", XML_DECLARATION, body))
    }

    /// Write `metadata.xml`, `metadata.xsd` and the version marker.
    pub fn export(&self, strategy: &mut ArchiveStrategy, db: &DatabaseStructure) -> Result<()> {
        let xml = self.render(db)?;
        let path = self.paths.metadata_path();
        strategy.write_entry(&path, &mut xml.as_bytes(), Some(xml.len() as u64))?;
        strategy.write_entry(
            &self.paths.metadata_schema_path(),
            &mut METADATA_XSD.as_bytes(),
            Some(METADATA_XSD.len() as u64),
        )?;
        strategy.create_directory(&self.paths.version_marker_path())?;
        info!(
            "Wrote metadata for {} ({} schemas, {} tables)",
            db.name,
            db.schemas.len(),
            db.table_count()
        );
        Ok(())
    }

    /// Read the raw document.
    pub fn read_document(&self, strategy: &mut ArchiveStrategy) -> Result<Vec<u8>> {
        let path = self.paths.metadata_path();
        let mut input = strategy.create_input_stream(&path).map_err(|e| {
            ArchiveError::Metadata(format!("{} cannot be opened: {}", path, e))
        })?;
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Check and read the document back into a [`DatabaseStructure`].
    pub fn import(
        &self,
        strategy: &mut ArchiveStrategy,
        reporter: &mut Reporter,
    ) -> Result<MetadataImport> {
        let path = self.paths.metadata_path();
        let bytes = self.read_document(strategy)?;
        let check = check_metadata(&bytes, strategy.container().version());
        if !check.is_valid() {
            warn!(
                "{} failed its structural check with {} violations, reading leniently",
                path, check.violation_count
            );
            for violation in &check.violations {
                reporter.report(ConditionKind::ValidationWarning, path.as_str(), violation.as_str());
            }
        }
        let doc: SiardArchiveDoc = quick_xml::de::from_reader(&bytes[..])
            .map_err(|e| ArchiveError::Metadata(format!("{} cannot be read: {}", path, e)))?;
        let version = doc.version.parse().ok();
        let structure = from_document(doc, reporter);
        debug!(
            "Read metadata for {}: {} schemas, {} tables",
            structure.name,
            structure.schemas.len(),
            structure.table_count()
        );
        Ok(MetadataImport {
            structure,
            version,
            check,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::AccessMode;
    use crate::config::{Compression, ContainerLayout};
    use crate::core::{
        ForeignKey, PrimaryKey, Reference, RoutineStructure, SchemaStructure, TableStructure,
        UserStructure, ViewStructure, Parameter,
    };
    use crate::dialect::{StructField, Type};
    use crate::paths::Siard22Paths;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn make_test_database() -> DatabaseStructure {
        let mut db = DatabaseStructure::new("shop");
        db.metadata.data_owner = Some("Records office".into());
        db.metadata.data_origin_timespan = Some("2001-2020".into());
        db.metadata.archival_date = NaiveDate::from_ymd_opt(2024, 5, 1);
        let mut schema = SchemaStructure::new("app", 1);
        let mut orders = TableStructure::new("app", "orders", 1);
        orders.add_column("id", Type::integer().with_original_name("int4"), false);
        orders.add_column("customer", Type::bigint(), true);
        orders.add_column("note", Type::clob().with_original_name("text"), true);
        orders.add_column("shape", Type::unsupported("geometry"), true);
        orders.add_column(
            "dims",
            Type::structure(vec![
                StructField::new("Unit Width", Type::decimal(8, 2)),
                StructField::new("h", Type::decimal(8, 2)),
            ]),
            true,
        );
        orders.add_column("tags", Type::array(Type::varchar(16)), true);
        orders.primary_key = Some(PrimaryKey {
            name: "orders_pk".into(),
            columns: vec!["id".into()],
            description: None,
        });
        orders.foreign_keys.push(ForeignKey {
            name: "orders_customer_fk".into(),
            referenced_schema: "app".into(),
            referenced_table: "customers".into(),
            references: vec![Reference {
                column: "customer".into(),
                referenced: "id".into(),
            }],
            delete_action: Some("CASCADE".into()),
            ..ForeignKey::default()
        });
        orders.row_count = 2;
        let mut customers = TableStructure::new("app", "customers", 2);
        customers.add_column("id", Type::bigint(), false);
        customers.add_column("name", Type::varchar(100), true);
        schema.tables = vec![orders, customers];
        schema.views.push(ViewStructure {
            name: "big_orders".into(),
            query: Some("SELECT * FROM orders".into()),
            ..ViewStructure::default()
        });
        schema.routines.push(RoutineStructure {
            name: "touch".into(),
            parameters: vec![Parameter {
                name: "n".into(),
                mode: "IN".into(),
                ty: Type::integer(),
                description: None,
            }],
            ..RoutineStructure::default()
        });
        db.schemas.push(schema);
        db.users.push(UserStructure {
            name: "archivist".into(),
            description: None,
        });
        db
    }

    #[test]
    fn test_render_is_valid() {
        let db = make_test_database();
        for pretty in [true, false] {
            let xml = MetadataCodec::new(&Siard22Paths, pretty).render(&db).unwrap();
            assert!(xml.starts_with("<?xml"));
            assert!(xml.contains("<folder>schema1</folder>"));
            assert!(xml.contains("<lobFolder>lob3</lobFolder>"));
            let check = check_metadata(xml.as_bytes(), Some(FormatVersion::V2_2));
            assert!(check.is_valid(), "{:?}", check.violations);
        }
    }

    #[test]
    fn test_document_round_trip() {
        let db = make_test_database();
        let xml = MetadataCodec::new(&Siard22Paths, true).render(&db).unwrap();
        let doc: SiardArchiveDoc = quick_xml::de::from_str(&xml).unwrap();
        assert_eq!(doc.version, "2.2");
        let mut reporter = Reporter::in_memory();
        let back = from_document(doc, &mut reporter);
        assert!(reporter.is_empty(), "{:?}", reporter.conditions());
        assert_eq!(back, db);
    }

    #[test]
    fn test_export_and_import() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shop.siard");
        let db = make_test_database();

        let mut strategy = ArchiveStrategy::for_layout(
            &path,
            ContainerLayout::Zip,
            Compression::Deflate,
            None,
            AccessMode::Write,
            Some(FormatVersion::V2_2),
        )
        .unwrap();
        strategy.setup().unwrap();
        MetadataCodec::new(&Siard22Paths, true)
            .export(&mut strategy, &db)
            .unwrap();
        strategy.finish().unwrap();

        let mut strategy = ArchiveStrategy::for_layout(
            &path,
            ContainerLayout::Zip,
            Compression::Deflate,
            None,
            AccessMode::Read,
            None,
        )
        .unwrap();
        strategy.setup().unwrap();
        assert_eq!(strategy.container().version(), Some(FormatVersion::V2_2));
        let entries: Vec<String> = strategy.list_entry_paths().unwrap().collect();
        assert!(entries.contains(&"header/metadata.xml".to_string()));
        assert!(entries.contains(&"header/metadata.xsd".to_string()));
        assert!(entries.contains(&"header/siardversion/2.2/".to_string()));

        let mut reporter = Reporter::in_memory();
        let imported = MetadataCodec::new(&Siard22Paths, true)
            .import(&mut strategy, &mut reporter)
            .unwrap();
        assert!(imported.check.is_valid());
        assert_eq!(imported.version, Some(FormatVersion::V2_2));
        assert_eq!(imported.structure, db);
    }

    #[test]
    fn test_lenient_read_reports() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pkg");
        std::fs::create_dir_all(path.join("header")).unwrap();
        std::fs::write(
            path.join("header/metadata.xml"),
            r#"<siardArchive version="2.2"><dbname>x</dbname><schemas><schema><name>s</name><folder>schema1</folder></schema></schemas></siardArchive>"#,
        )
        .unwrap();
        let mut strategy = ArchiveStrategy::for_layout(
            &path,
            ContainerLayout::Folder,
            Compression::Deflate,
            None,
            AccessMode::Read,
            Some(FormatVersion::V2_2),
        )
        .unwrap();
        strategy.setup().unwrap();
        let mut reporter = Reporter::in_memory();
        let imported = MetadataCodec::new(&Siard22Paths, true)
            .import(&mut strategy, &mut reporter)
            .unwrap();
        assert!(!imported.check.is_valid());
        assert_eq!(
            reporter.count(ConditionKind::ValidationWarning),
            imported.check.violation_count
        );
        assert_eq!(imported.structure.name, "x");
        assert_eq!(imported.structure.schemas[0].name, "s");
    }

    #[test]
    fn test_unreadable_document_is_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pkg");
        std::fs::create_dir_all(path.join("header")).unwrap();
        std::fs::write(path.join("header/metadata.xml"), "<siardArchive><dbname>").unwrap();
        let mut strategy = ArchiveStrategy::for_layout(
            &path,
            ContainerLayout::Folder,
            Compression::Deflate,
            None,
            AccessMode::Read,
            Some(FormatVersion::V2_2),
        )
        .unwrap();
        strategy.setup().unwrap();
        let mut reporter = Reporter::in_memory();
        let result = MetadataCodec::new(&Siard22Paths, true).import(&mut strategy, &mut reporter);
        assert!(matches!(result, Err(ArchiveError::Metadata(_))));
    }
}
