//! Canonical in-archive paths.
//!
//! Every name inside a package is generated here from indices, never taken
//! from user data, so the output always satisfies the naming grammar the
//! structural validator enforces. Indices are 1-based.
//!
//! The shared layout lives in the default methods of [`PathStrategy`]; the
//! two metadata-document generations only supply their version-specific
//! pieces and are swapped through [`path_strategy`].

use std::fmt::Debug;

use crate::archive::FormatVersion;

pub const HEADER_FOLDER: &str = "header";
pub const CONTENT_FOLDER: &str = "content";
pub const VERSION_FOLDER: &str = "header/siardversion";
pub const METADATA_FILE: &str = "metadata.xml";
pub const METADATA_SCHEMA_FILE: &str = "metadata.xsd";

pub const SCHEMA_PREFIX: &str = "schema";
pub const TABLE_PREFIX: &str = "table";
pub const LOB_PREFIX: &str = "lob";
pub const RECORD_PREFIX: &str = "record";

pub const XML_EXTENSION: &str = "xml";
pub const XSD_EXTENSION: &str = "xsd";

/// Kind of an externalized large object; decides the record extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LobKind {
    /// Character data, `.txt`.
    Character,
    /// Binary data, `.bin`.
    Binary,
    /// XML data, `.xml`. Only read: other producers store XML values this
    /// way, but no column type here externalizes to it.
    Xml,
}

impl LobKind {
    pub fn extension(&self) -> &'static str {
        match self {
            LobKind::Character => "txt",
            LobKind::Binary => "bin",
            LobKind::Xml => "xml",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "txt" => Some(LobKind::Character),
            "bin" => Some(LobKind::Binary),
            "xml" => Some(LobKind::Xml),
            _ => None,
        }
    }
}

/// Version-scoped mapping from logical names to relative paths.
pub trait PathStrategy: Debug + Send + Sync {
    /// Generation this scheme writes.
    fn version(&self) -> FormatVersion;

    /// Namespace of the metadata document.
    fn metadata_namespace(&self) -> &'static str;

    /// Base URI of the per-table content namespaces.
    fn content_namespace_base(&self) -> &'static str;

    fn metadata_path(&self) -> String {
        format!("{}/{}", HEADER_FOLDER, METADATA_FILE)
    }

    fn metadata_schema_path(&self) -> String {
        format!("{}/{}", HEADER_FOLDER, METADATA_SCHEMA_FILE)
    }

    /// The empty folder identifying the generation, with trailing `/`.
    fn version_marker_path(&self) -> String {
        format!("{}/{}/", VERSION_FOLDER, self.version())
    }

    fn schema_folder_name(&self, schema_index: usize) -> String {
        format!("{}{}", SCHEMA_PREFIX, schema_index)
    }

    fn table_folder_name(&self, table_index: usize) -> String {
        format!("{}{}", TABLE_PREFIX, table_index)
    }

    fn table_folder_path(&self, schema_index: usize, table_index: usize) -> String {
        format!(
            "{}/{}/{}",
            CONTENT_FOLDER,
            self.schema_folder_name(schema_index),
            self.table_folder_name(table_index)
        )
    }

    fn table_document_name(&self, table_index: usize) -> String {
        format!("{}{}.{}", TABLE_PREFIX, table_index, XML_EXTENSION)
    }

    fn table_schema_name(&self, table_index: usize) -> String {
        format!("{}{}.{}", TABLE_PREFIX, table_index, XSD_EXTENSION)
    }

    fn table_document_path(&self, schema_index: usize, table_index: usize) -> String {
        format!(
            "{}/{}",
            self.table_folder_path(schema_index, table_index),
            self.table_document_name(table_index)
        )
    }

    fn table_schema_path(&self, schema_index: usize, table_index: usize) -> String {
        format!(
            "{}/{}",
            self.table_folder_path(schema_index, table_index),
            self.table_schema_name(table_index)
        )
    }

    fn lob_folder_name(&self, column_index: usize) -> String {
        format!("{}{}", LOB_PREFIX, column_index)
    }

    fn lob_folder_path(&self, schema_index: usize, table_index: usize, column_index: usize) -> String {
        format!(
            "{}/{}",
            self.table_folder_path(schema_index, table_index),
            self.lob_folder_name(column_index)
        )
    }

    fn lob_file_name(&self, record: u64, kind: LobKind) -> String {
        format!("{}{}.{}", RECORD_PREFIX, record, kind.extension())
    }

    fn lob_file_path(
        &self,
        schema_index: usize,
        table_index: usize,
        column_index: usize,
        record: u64,
        kind: LobKind,
    ) -> String {
        format!(
            "{}/{}",
            self.lob_folder_path(schema_index, table_index, column_index),
            self.lob_file_name(record, kind)
        )
    }

    /// Namespace of one table's content document.
    fn table_namespace(&self, schema_index: usize, table_index: usize) -> String {
        format!(
            "{}{}/{}",
            self.content_namespace_base(),
            self.schema_folder_name(schema_index),
            self.table_schema_name(table_index)
        )
    }
}

/// Paths of the 2.1 generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Siard21Paths;

impl PathStrategy for Siard21Paths {
    fn version(&self) -> FormatVersion {
        FormatVersion::V2_1
    }

    fn metadata_namespace(&self) -> &'static str {
        "http://www.bar.admin.ch/xmlns/siard/2/metadata.xsd"
    }

    fn content_namespace_base(&self) -> &'static str {
        "http://www.bar.admin.ch/xmlns/siard/2/"
    }
}

/// Paths of the 2.2 generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Siard22Paths;

impl PathStrategy for Siard22Paths {
    fn version(&self) -> FormatVersion {
        FormatVersion::V2_2
    }

    fn metadata_namespace(&self) -> &'static str {
        "http://www.bar.admin.ch/xmlns/siard/2/metadata.xsd"
    }

    fn content_namespace_base(&self) -> &'static str {
        "http://www.bar.admin.ch/xmlns/siard/2/"
    }
}

/// The scheme for a format generation.
pub fn path_strategy(version: FormatVersion) -> Box<dyn PathStrategy> {
    match version {
        FormatVersion::V2_1 => Box::new(Siard21Paths),
        FormatVersion::V2_2 => Box::new(Siard22Paths),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_paths() {
        let paths = path_strategy(FormatVersion::V2_2);
        assert_eq!(paths.metadata_path(), "header/metadata.xml");
        assert_eq!(paths.metadata_schema_path(), "header/metadata.xsd");
        assert_eq!(paths.version_marker_path(), "header/siardversion/2.2/");
        assert_eq!(
            path_strategy(FormatVersion::V2_1).version_marker_path(),
            "header/siardversion/2.1/"
        );
    }

    #[test]
    fn test_table_paths() {
        let paths = Siard22Paths;
        assert_eq!(paths.table_document_path(1, 3), "content/schema1/table3/table3.xml");
        assert_eq!(paths.table_schema_path(2, 1), "content/schema2/table1/table1.xsd");
        assert_eq!(paths.lob_folder_path(1, 1, 2), "content/schema1/table1/lob2");
        assert_eq!(
            paths.lob_file_path(1, 1, 2, 1, LobKind::Binary),
            "content/schema1/table1/lob2/record1.bin"
        );
        assert_eq!(
            paths.lob_file_path(1, 4, 1, 12, LobKind::Character),
            "content/schema1/table4/lob1/record12.txt"
        );
    }

    #[test]
    fn test_table_namespace() {
        assert_eq!(
            Siard21Paths.table_namespace(1, 2),
            "http://www.bar.admin.ch/xmlns/siard/2/schema1/table2.xsd"
        );
    }

    #[test]
    fn test_lob_kind_extensions() {
        for kind in [LobKind::Character, LobKind::Binary, LobKind::Xml] {
            assert_eq!(LobKind::from_extension(kind.extension()), Some(kind));
        }
        assert_eq!(LobKind::from_extension("dat"), None);
    }
}
