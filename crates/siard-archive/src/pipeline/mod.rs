//! Export and import drivers.
//!
//! - [`SiardExporter`]: a [`DatabaseHandler`](crate::core::DatabaseHandler)
//!   that writes every call it receives into a new package
//! - [`SiardImporter`]: reads a package and replays it into any handler
//!
//! Both own the strategy for the whole run and always attempt to finish it,
//! also when an error propagates.

mod export;
mod import;

use std::time::Duration;

pub use export::SiardExporter;
pub use import::SiardImporter;

/// Totals collected during one export or import.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    pub schemas: usize,
    pub tables: usize,
    pub rows: u64,
    /// Large objects written (export) or resolved (import).
    pub lobs: u64,
    pub elapsed: Duration,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows per second over the whole run.
    pub fn rows_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.rows as f64 / secs
        } else {
            0.0
        }
    }
}
