//! Configuration validation.

use super::{ArchiveConfig, ContainerLayout};
use crate::error::{ArchiveError, Result};

/// Validate the configuration.
pub fn validate(config: &ArchiveConfig) -> Result<()> {
    if config.lob.clob_threshold == 0 {
        return Err(ArchiveError::Config(
            "lob.clob_threshold must be at least 1".into(),
        ));
    }
    if config.lob.blob_threshold == 0 {
        return Err(ArchiveError::Config(
            "lob.blob_threshold must be at least 1".into(),
        ));
    }

    match (&config.layout, &config.lob.external_lob_folder) {
        (ContainerLayout::ZipExternalLobs, None) => {
            return Err(ArchiveError::Config(
                "lob.external_lob_folder is required for the zip_external_lobs layout".into(),
            ));
        }
        (ContainerLayout::ZipExternalLobs, Some(folder)) if folder.trim().is_empty() => {
            return Err(ArchiveError::Config(
                "lob.external_lob_folder cannot be empty".into(),
            ));
        }
        (ContainerLayout::Zip | ContainerLayout::Folder, Some(_)) => {
            return Err(ArchiveError::Config(format!(
                "lob.external_lob_folder is only valid with the zip_external_lobs layout, got '{:?}'",
                config.layout
            )));
        }
        _ => {}
    }

    for schema in &config.ignored_schemas {
        if schema.is_empty() {
            return Err(ArchiveError::Config(
                "ignored_schemas cannot contain empty names".into(),
            ));
        }
    }

    Ok(())
}
