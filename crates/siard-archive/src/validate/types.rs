//! Result types for structural validation.

use std::fmt;

use serde::Serialize;

use crate::content::DocumentCheck;
use crate::error::Result;

/// The structural rules every package is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StructureRule {
    /// (a) Only `header/` and `content/` exist at the top level.
    TopLevelRoots,
    /// (b) `content/` holds only `schemaN/` folders holding only `tableN/`.
    IndexedFolders,
    /// (c) A table folder holds its document/schema pair and `lobN/recordM` entries.
    TableFolderContents,
    /// (d) Exactly one empty version folder for the package's generation.
    VersionMarker,
    /// (e) `header/` holds the metadata document and its schema document.
    HeaderDocuments,
    /// (f) Every name is a letter followed by letters, digits or `_`, with
    /// at most one dot before an extension.
    NamingGrammar,
}

impl StructureRule {
    pub const ALL: [StructureRule; 6] = [
        StructureRule::TopLevelRoots,
        StructureRule::IndexedFolders,
        StructureRule::TableFolderContents,
        StructureRule::VersionMarker,
        StructureRule::HeaderDocuments,
        StructureRule::NamingGrammar,
    ];

    pub fn label(&self) -> char {
        match self {
            StructureRule::TopLevelRoots => 'a',
            StructureRule::IndexedFolders => 'b',
            StructureRule::TableFolderContents => 'c',
            StructureRule::VersionMarker => 'd',
            StructureRule::HeaderDocuments => 'e',
            StructureRule::NamingGrammar => 'f',
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            StructureRule::TopLevelRoots => "only header and content roots",
            StructureRule::IndexedFolders => "content holds indexed schema and table folders",
            StructureRule::TableFolderContents => "table folders hold document, schema and records",
            StructureRule::VersionMarker => "one empty version folder",
            StructureRule::HeaderDocuments => "header holds metadata document and schema",
            StructureRule::NamingGrammar => "entry names follow the naming grammar",
        }
    }
}

impl fmt::Display for StructureRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.label(), self.description())
    }
}

/// Outcome of one structural rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub rule: StructureRule,
    pub passed: bool,
    /// Entries breaking the rule.
    pub offending: Vec<String>,
    /// Findings that do not fail the rule.
    pub warnings: Vec<String>,
}

impl RuleOutcome {
    pub fn new(rule: StructureRule) -> Self {
        Self {
            rule,
            passed: true,
            offending: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn offend(&mut self, path: impl Into<String>) {
        self.passed = false;
        self.offending.push(path.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

/// Outcome of checking one document against its schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentOutcome {
    pub path: String,
    pub passed: bool,
    pub violations: Vec<String>,
    pub violation_count: u64,
}

impl DocumentOutcome {
    pub fn from_check(path: impl Into<String>, check: DocumentCheck) -> Self {
        Self {
            path: path.into(),
            passed: check.is_valid(),
            violations: check.violations,
            violation_count: check.violation_count,
        }
    }

    pub fn failed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            passed: false,
            violations: vec![message.into()],
            violation_count: 1,
        }
    }
}

/// Everything the validator found about one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub package: String,
    pub version: Option<String>,
    pub rules: Vec<RuleOutcome>,
    pub documents: Vec<DocumentOutcome>,
}

impl ValidationReport {
    /// True iff every rule and every document check passed.
    pub fn passed(&self) -> bool {
        self.rules_passed() && self.documents.iter().all(|d| d.passed)
    }

    pub fn rules_passed(&self) -> bool {
        self.rules.iter().all(|r| r.passed)
    }

    pub fn rule(&self, rule: StructureRule) -> Option<&RuleOutcome> {
        self.rules.iter().find(|r| r.rule == rule)
    }

    pub fn failed_rules(&self) -> Vec<StructureRule> {
        self.rules
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.rule)
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_outcome_fails_on_offence() {
        let mut outcome = RuleOutcome::new(StructureRule::NamingGrammar);
        outcome.warn("long name");
        assert!(outcome.passed);
        outcome.offend("content/9bad");
        assert!(!outcome.passed);
        assert_eq!(outcome.offending, vec!["content/9bad".to_string()]);
    }

    #[test]
    fn test_report_json() {
        let report = ValidationReport {
            package: "shop.siard".into(),
            version: Some("2.2".into()),
            rules: vec![RuleOutcome::new(StructureRule::TopLevelRoots)],
            documents: vec![DocumentOutcome::failed("header/metadata.xml", "missing")],
        };
        assert!(report.rules_passed());
        assert!(!report.passed());
        let json = report.to_json().unwrap();
        assert!(json.contains("\"rule\": \"topLevelRoots\""));
        assert!(json.contains("\"violation_count\": 1"));
    }

    #[test]
    fn test_rule_labels() {
        let labels: String = StructureRule::ALL.iter().map(|r| r.label()).collect();
        assert_eq!(labels, "abcdef");
        assert_eq!(
            StructureRule::VersionMarker.to_string(),
            "(d) one empty version folder"
        );
    }
}
