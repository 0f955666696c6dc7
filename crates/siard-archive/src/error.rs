//! Error types for the archive engine.

use thiserror::Error;

/// Main error type for archive operations.
///
/// Every variant is fatal. Degraded-but-continuing outcomes never surface
/// here; they are recorded on the [`Reporter`](crate::report::Reporter).
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Configuration error (invalid YAML, inconsistent settings, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The archive container cannot be opened or is not a supported package
    #[error("Container error: {message}\n  Container: {container}")]
    Container { container: String, message: String },

    /// The metadata document could not be read even with the lenient reader
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Reading or writing a table's content failed
    #[error("Content error for table {table}: {message}")]
    Content { table: String, message: String },

    /// The downstream call sequence was violated
    #[error("Call sequence violated: {0}")]
    Sequence(String),

    /// A canonical type name could not be parsed
    #[error("Type error: {0}")]
    Type(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip container error
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML parse error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// XML (de)serialization error
    #[error("XML serialization error: {0}")]
    XmlSerde(#[from] quick_xml::DeError),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArchiveError {
    /// Create a Container error naming the package it occurred on
    pub fn container(container: impl Into<String>, message: impl Into<String>) -> Self {
        ArchiveError::Container {
            container: container.into(),
            message: message.into(),
        }
    }

    /// Create a Content error
    pub fn content(table: impl Into<String>, message: impl Into<String>) -> Self {
        ArchiveError::Content {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detailed_includes_cause_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.siard");
        let err = ArchiveError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: missing.siard"));
    }

    #[test]
    fn test_content_constructor() {
        let err = ArchiveError::content("public.orders", "unexpected element");
        assert_eq!(
            err.to_string(),
            "Content error for table public.orders: unexpected element"
        );
    }
}
