//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

impl ArchiveConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ArchiveConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration, for comparing archive runs.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::FormatVersion;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config = ArchiveConfig::from_yaml("{}").unwrap();
        assert_eq!(config, ArchiveConfig::default());
        assert_eq!(config.lob.clob_threshold, 4000);
        assert_eq!(config.lob.blob_threshold, 2000);
        assert_eq!(config.format_version, FormatVersion::V2_2);
        assert!(config.pretty_print);
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
format_version: "2.1"
layout: zip_external_lobs
compression: store
pretty_print: false
lob:
  clob_threshold: 10
  blob_threshold: 12
  external_lob_folder: lobs
ignored_schemas: [audit]
"#;
        let config = ArchiveConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.format_version, FormatVersion::V2_1);
        assert_eq!(config.layout, ContainerLayout::ZipExternalLobs);
        assert_eq!(config.compression, Compression::Store);
        assert!(!config.pretty_print);
        assert_eq!(config.lob.blob_threshold, 12);
        assert_eq!(config.lob.external_lob_folder.as_deref(), Some("lobs"));
        assert_eq!(config.ignored_schemas, vec!["audit".to_string()]);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let err = ArchiveConfig::from_yaml("lob:\n  blob_threshold: 0\n").unwrap_err();
        assert!(err.to_string().contains("blob_threshold"));
    }

    #[test]
    fn test_external_layout_requires_folder() {
        let err = ArchiveConfig::from_yaml("layout: zip_external_lobs\n").unwrap_err();
        assert!(err.to_string().contains("external_lob_folder"));
    }

    #[test]
    fn test_external_folder_rejected_for_plain_zip() {
        let yaml = "layout: zip\nlob:\n  external_lob_folder: lobs\n";
        assert!(ArchiveConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_unknown_version_rejected() {
        assert!(ArchiveConfig::from_yaml("format_version: \"1.0\"\n").is_err());
    }

    #[test]
    fn test_hash_is_stable_and_sensitive() {
        let a = ArchiveConfig::default();
        let mut b = ArchiveConfig::default();
        assert_eq!(a.hash(), b.hash());
        b.lob.clob_threshold = 1;
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.yaml");
        std::fs::write(&path, "layout: folder\n").unwrap();
        let config = ArchiveConfig::load(&path).unwrap();
        assert_eq!(config.layout, ContainerLayout::Folder);
    }
}
