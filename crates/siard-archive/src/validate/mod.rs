//! Structural validation of finished packages.
//!
//! The validator re-opens a package read-only and checks it against the
//! format's folder grammar without relying on how it was produced:
//!
//! - **(a)** only the `header/` and `content/` roots exist
//! - **(b)** `content/` holds indexed `schemaN/` folders holding `tableN/`
//! - **(c)** each table folder holds `tableN.xml`, `tableN.xsd` and
//!   `lobN/recordM.<bin|txt|xml>` entries
//! - **(d)** exactly one empty `header/siardversion/<v>/` folder
//! - **(e)** `header/` holds `metadata.xml` and `metadata.xsd`
//! - **(f)** every name follows the naming grammar
//!
//! Every rule runs even after an earlier one failed. The metadata and table
//! document checks used on import are folded into the same report.

pub mod naming;
pub mod types;

pub use types::{DocumentOutcome, RuleOutcome, StructureRule, ValidationReport};

use std::path::Path;

use tracing::{info, warn};

use crate::archive::{ArchiveStrategy, FormatVersion};
use crate::config::ArchiveConfig;
use crate::content::check_table;
use crate::error::Result;
use crate::metadata::{check_metadata, MetadataCodec};
use crate::paths::{
    path_strategy, LobKind, CONTENT_FOLDER, HEADER_FOLDER, LOB_PREFIX, METADATA_FILE,
    METADATA_SCHEMA_FILE, RECORD_PREFIX, SCHEMA_PREFIX, TABLE_PREFIX, VERSION_FOLDER,
    XML_EXTENSION, XSD_EXTENSION,
};
use crate::report::Reporter;

use naming::{is_valid_name, is_version_name, RECOMMENDED_NAME_LENGTH};

/// One entry of the package, with every ancestor folder made explicit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Node {
    /// Relative path; folders end with `/`.
    path: String,
}

impl Node {
    fn is_dir(&self) -> bool {
        self.path.ends_with('/')
    }

    fn trimmed(&self) -> &str {
        self.path.trim_end_matches('/')
    }

    fn name(&self) -> &str {
        self.trimmed().rsplit('/').next().unwrap_or_default()
    }

    fn parent(&self) -> &str {
        match self.trimmed().rfind('/') {
            Some(i) => &self.path[..=i],
            None => "",
        }
    }
}

/// All entries of a package, sorted.
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_entries<I: IntoIterator<Item = String>>(entries: I) -> Self {
        let mut paths = std::collections::BTreeSet::new();
        for entry in entries {
            let entry = entry.replace('\\', "/");
            let entry = entry.trim_start_matches('/').to_string();
            if entry.is_empty() {
                continue;
            }
            let mut end = 0;
            while let Some(i) = entry[end..].find('/') {
                end += i + 1;
                paths.insert(entry[..end].to_string());
            }
            paths.insert(entry);
        }
        Self {
            nodes: paths.into_iter().map(|path| Node { path }).collect(),
        }
    }

    fn contains(&self, path: &str) -> bool {
        self.nodes.iter().any(|n| n.path == path)
    }

    /// Direct children of the folder `dir` (ending with `/`, or empty for
    /// the top level).
    fn children<'a>(&'a self, dir: &'a str) -> impl Iterator<Item = &'a Node> + 'a {
        self.nodes.iter().filter(move |n| n.parent() == dir)
    }
}

/// Index of `name` when it is `prefix` followed by a number without
/// leading zeros.
fn indexed(name: &str, prefix: &str) -> Option<usize> {
    let digits = name.strip_prefix(prefix)?;
    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }
    digits.parse().ok()
}

/// Re-opens packages and checks their structure.
#[derive(Debug, Clone)]
pub struct StructureValidator {
    config: ArchiveConfig,
    expected_version: Option<FormatVersion>,
}

impl StructureValidator {
    pub fn new(config: ArchiveConfig) -> Self {
        Self {
            config,
            expected_version: None,
        }
    }

    /// Require the version folder to name `version`.
    pub fn expect_version(mut self, version: FormatVersion) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Validate the package at `path`.
    ///
    /// Fails only when the package cannot be opened at all; everything else
    /// ends up in the report.
    pub fn validate(&self, path: impl AsRef<Path>) -> Result<ValidationReport> {
        let path = path.as_ref();
        let fallback = self.expected_version.unwrap_or(self.config.format_version);
        let mut strategy = ArchiveStrategy::for_layout(
            path,
            self.config.layout,
            self.config.compression,
            self.config.lob.external_lob_folder.as_deref(),
            crate::archive::AccessMode::Read,
            Some(fallback),
        )?;
        strategy.setup()?;
        let tree = Tree::from_entries(strategy.list_entry_paths()?);
        let version = marker_version(&tree).unwrap_or(fallback);

        let rules = vec![
            self.check_roots(&tree),
            self.check_indexed_folders(&tree),
            self.check_table_folders(&tree),
            self.check_version_marker(&tree),
            self.check_header(&tree),
            self.check_names(&tree),
        ];
        let documents = self.check_documents(&mut strategy, &tree, version);
        strategy.finish()?;

        let report = ValidationReport {
            package: path.display().to_string(),
            version: Some(version.to_string()),
            rules,
            documents,
        };
        for rule in &report.rules {
            if !rule.passed {
                warn!(
                    "Rule {} failed for {}: {} offending entries",
                    rule.rule,
                    report.package,
                    rule.offending.len()
                );
            }
        }
        info!(
            "Validated {}: {}",
            report.package,
            if report.passed() { "passed" } else { "failed" }
        );
        Ok(report)
    }

    fn check_roots(&self, tree: &Tree) -> RuleOutcome {
        let mut outcome = RuleOutcome::new(StructureRule::TopLevelRoots);
        for node in tree.children("") {
            let allowed = node.is_dir() && matches!(node.name(), HEADER_FOLDER | CONTENT_FOLDER);
            if !allowed {
                outcome.offend(node.path.clone());
            }
        }
        outcome
    }

    fn check_indexed_folders(&self, tree: &Tree) -> RuleOutcome {
        let mut outcome = RuleOutcome::new(StructureRule::IndexedFolders);
        let content = format!("{}/", CONTENT_FOLDER);
        for schema in tree.children(&content) {
            if !schema.is_dir() || indexed(schema.name(), SCHEMA_PREFIX).is_none() {
                outcome.offend(schema.path.clone());
                continue;
            }
            for table in tree.children(&schema.path) {
                if !table.is_dir() || indexed(table.name(), TABLE_PREFIX).is_none() {
                    outcome.offend(table.path.clone());
                }
            }
        }
        outcome
    }

    fn check_table_folders(&self, tree: &Tree) -> RuleOutcome {
        let mut outcome = RuleOutcome::new(StructureRule::TableFolderContents);
        let content = format!("{}/", CONTENT_FOLDER);
        let schemas = tree
            .children(&content)
            .filter(|s| s.is_dir() && indexed(s.name(), SCHEMA_PREFIX).is_some());
        for schema in schemas {
            let tables = tree.children(&schema.path).filter(|t| t.is_dir());
            for table in tables {
                let Some(index) = indexed(table.name(), TABLE_PREFIX) else {
                    continue;
                };
                let document = format!("{}{}.{}", TABLE_PREFIX, index, XML_EXTENSION);
                let schema_doc = format!("{}{}.{}", TABLE_PREFIX, index, XSD_EXTENSION);
                for expected in [&document, &schema_doc] {
                    let full = format!("{}{}", table.path, expected);
                    if !tree.contains(&full) {
                        outcome.offend(format!("{} (missing)", full));
                    }
                }
                for entry in tree.children(&table.path) {
                    if entry.is_dir() {
                        if indexed(entry.name(), LOB_PREFIX).is_none() {
                            outcome.offend(entry.path.clone());
                            continue;
                        }
                        for record in tree.children(&entry.path) {
                            if record.is_dir() || !is_record_name(record.name()) {
                                outcome.offend(record.path.clone());
                            }
                        }
                    } else if entry.name() != document && entry.name() != schema_doc {
                        outcome.offend(entry.path.clone());
                    }
                }
            }
        }
        outcome
    }

    fn check_version_marker(&self, tree: &Tree) -> RuleOutcome {
        let mut outcome = RuleOutcome::new(StructureRule::VersionMarker);
        let folder = format!("{}/", VERSION_FOLDER);
        if !tree.contains(&folder) {
            outcome.offend(format!("{} (missing)", folder));
            return outcome;
        }
        let markers: Vec<&Node> = tree.children(&folder).collect();
        if markers.is_empty() {
            outcome.offend(format!("{} (no version folder)", folder));
        }
        if markers.len() > 1 {
            for marker in &markers {
                outcome.offend(marker.path.clone());
            }
            return outcome;
        }
        for marker in markers {
            let known = marker.is_dir() && marker.name().parse::<FormatVersion>().is_ok();
            let expected = self
                .expected_version
                .map_or(true, |v| v.as_str() == marker.name());
            if !known || !expected {
                outcome.offend(marker.path.clone());
            } else if tree.children(&marker.path).next().is_some() {
                outcome.offend(format!("{} (not empty)", marker.path));
            }
        }
        outcome
    }

    fn check_header(&self, tree: &Tree) -> RuleOutcome {
        let mut outcome = RuleOutcome::new(StructureRule::HeaderDocuments);
        for file in [METADATA_FILE, METADATA_SCHEMA_FILE] {
            let path = format!("{}/{}", HEADER_FOLDER, file);
            if !tree.contains(&path) {
                outcome.offend(format!("{} (missing)", path));
            }
        }
        outcome
    }

    fn check_names(&self, tree: &Tree) -> RuleOutcome {
        let mut outcome = RuleOutcome::new(StructureRule::NamingGrammar);
        let version_folder = format!("{}/", VERSION_FOLDER);
        for node in &tree.nodes {
            let name = node.name();
            let exempt = node.is_dir() && node.parent() == version_folder && is_version_name(name);
            if !exempt && !is_valid_name(name) {
                outcome.offend(node.path.clone());
            } else if name.len() > RECOMMENDED_NAME_LENGTH {
                outcome.warn(format!(
                    "{} is longer than {} characters",
                    node.path, RECOMMENDED_NAME_LENGTH
                ));
            }
        }
        outcome
    }

    fn check_documents(
        &self,
        strategy: &mut ArchiveStrategy,
        tree: &Tree,
        version: FormatVersion,
    ) -> Vec<DocumentOutcome> {
        let paths = path_strategy(version);
        let codec = MetadataCodec::new(paths.as_ref(), self.config.pretty_print);
        let metadata_path = paths.metadata_path();
        if !tree.contains(&metadata_path) {
            return vec![DocumentOutcome::failed(&metadata_path, "missing")];
        }

        let mut outcomes = Vec::new();
        match codec.read_document(strategy) {
            Ok(bytes) => {
                let check = check_metadata(&bytes, Some(version));
                outcomes.push(DocumentOutcome::from_check(&metadata_path, check));
            }
            Err(e) => {
                outcomes.push(DocumentOutcome::failed(&metadata_path, e.to_string()));
                return outcomes;
            }
        }

        let mut reporter = Reporter::in_memory();
        let structure = match codec.import(strategy, &mut reporter) {
            Ok(imported) => imported.structure,
            Err(e) => {
                outcomes.push(DocumentOutcome::failed(&metadata_path, e.to_string()));
                return outcomes;
            }
        };
        for schema in &structure.schemas {
            for table in &schema.tables {
                let doc_path = paths.table_document_path(schema.index, table.index);
                let outcome = match check_table(strategy, paths.as_ref(), table, schema.index, table.index) {
                    Ok(mut check) => {
                        if check.rows != table.row_count {
                            check.violation(format!(
                                "metadata declares {} rows, document holds {}",
                                table.row_count, check.rows
                            ));
                        }
                        DocumentOutcome::from_check(&doc_path, check)
                    }
                    Err(e) => DocumentOutcome::failed(&doc_path, e.to_string()),
                };
                outcomes.push(outcome);
            }
        }
        outcomes
    }
}

/// The single known generation named by the version folder, if any.
fn marker_version(tree: &Tree) -> Option<FormatVersion> {
    let folder = format!("{}/", VERSION_FOLDER);
    let mut versions = tree
        .children(&folder)
        .filter_map(|n| n.name().parse::<FormatVersion>().ok());
    let first = versions.next()?;
    versions.next().is_none().then_some(first)
}

fn is_record_name(name: &str) -> bool {
    let Some((stem, extension)) = name.split_once('.') else {
        return false;
    };
    indexed(stem, RECORD_PREFIX).is_some() && LobKind::from_extension(extension).is_some()
}
