//! Reported (non-fatal) conditions.
//!
//! A [`Reporter`] is an explicit handle threaded through one migration. It
//! counts degraded-but-continuing outcomes, mirrors each one to `tracing`,
//! and materializes a report file on [`Reporter::close`] only when something
//! was recorded, so a clean run leaves no artifact.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;

/// Messages beyond this many are counted but not kept.
const MAX_MESSAGES: usize = 10_000;

/// Category of a reported condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConditionKind {
    /// A cell could not be decoded or opened and became Null.
    CellProcessingUsedNull,
    /// A vendor type was widened or defaulted while importing.
    DataTypeChangedOnImport,
    /// A type with no canonical form is stored as text.
    SavedAsString,
    /// A cell exceeded its threshold and became a large object.
    LobExternalized,
    /// A value was altered to fit its target representation.
    ValueChanged,
    /// A document or structure check failed without aborting.
    ValidationWarning,
    /// An operation failed and was skipped.
    Failed,
    /// Anything else worth telling the archivist.
    Custom,
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConditionKind::CellProcessingUsedNull => "cell processing used null",
            ConditionKind::DataTypeChangedOnImport => "data type changed on import",
            ConditionKind::SavedAsString => "saved as string",
            ConditionKind::LobExternalized => "large object externalized",
            ConditionKind::ValueChanged => "value changed",
            ConditionKind::ValidationWarning => "validation warning",
            ConditionKind::Failed => "failed",
            ConditionKind::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// One recorded condition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Condition {
    pub kind: ConditionKind,
    /// Where it happened: a cell id, `schema.table.column`, or an entry path.
    pub location: String,
    pub message: String,
}

/// Accumulates reported conditions for one migration.
#[derive(Debug, Default)]
pub struct Reporter {
    path: Option<PathBuf>,
    counts: BTreeMap<ConditionKind, u64>,
    conditions: Vec<Condition>,
    closed: bool,
}

impl Reporter {
    /// A reporter that materializes into `path` when closed non-empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// A reporter that never writes a file.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Record one condition.
    pub fn report(&mut self, kind: ConditionKind, location: impl Into<String>, message: impl Into<String>) {
        let location = location.into();
        let message = message.into();
        warn!(kind = %kind, location = %location, "{}", message);
        *self.counts.entry(kind).or_insert(0) += 1;
        if self.conditions.len() < MAX_MESSAGES {
            self.conditions.push(Condition {
                kind,
                location,
                message,
            });
        }
    }

    pub fn count(&self, kind: ConditionKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Kept conditions in the order they were reported.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Materialize the report if anything was recorded. Returns the file
    /// written, if any. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<Option<PathBuf>> {
        if self.closed {
            return Ok(None);
        }
        self.closed = true;
        let Some(path) = self.path.clone() else {
            return Ok(None);
        };
        if self.is_empty() {
            return Ok(None);
        }

        let mut out = BufWriter::new(File::create(&path)?);
        writeln!(out, "Archive report generated {}", Utc::now().to_rfc3339())?;
        writeln!(out)?;
        for (kind, count) in &self.counts {
            writeln!(out, "{:>8}  {}", count, kind)?;
        }
        writeln!(out)?;
        for condition in &self.conditions {
            writeln!(
                out,
                "[{}] {}: {}",
                condition.kind, condition.location, condition.message
            )?;
        }
        let dropped = self.total().saturating_sub(self.conditions.len() as u64);
        if dropped > 0 {
            writeln!(out, "... {} further conditions not listed", dropped)?;
        }
        out.flush()?;
        info!("Wrote report with {} conditions to {}", self.total(), path.display());
        Ok(Some(path))
    }
}
