//! Replaying a package into a [`DatabaseHandler`].

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::archive::ArchiveStrategy;
use crate::config::ArchiveConfig;
use crate::content::{check_table, read_table};
use crate::core::{Cell, DatabaseHandler};
use crate::error::{ArchiveError, Result};
use crate::metadata::MetadataCodec;
use crate::paths::path_strategy;
use crate::report::{ConditionKind, Reporter};

use super::PipelineStats;

/// Reads one package and drives a handler through the full call sequence.
pub struct SiardImporter {
    path: PathBuf,
    config: ArchiveConfig,
    reporter: Reporter,
}

impl SiardImporter {
    pub fn new(path: impl Into<PathBuf>, config: ArchiveConfig) -> Result<Self> {
        config.validate()?;
        let reporter = match &config.report_path {
            Some(p) => Reporter::open(p),
            None => Reporter::in_memory(),
        };
        Ok(Self {
            path: path.into(),
            config,
            reporter,
        })
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Import the package into `handler`.
    ///
    /// Document check failures and unreadable cells are reported and the
    /// import continues; the package is closed on every path out.
    pub fn import(&mut self, handler: &mut dyn DatabaseHandler) -> Result<PipelineStats> {
        let started = Instant::now();
        let mut strategy = ArchiveStrategy::for_import(&self.path, &self.config)?;
        let result = self.run(&mut strategy, handler);
        let finished = strategy.finish();
        let closed = self.reporter.close();
        let mut stats = match result {
            Ok(stats) => stats,
            Err(e) => {
                if let Err(f) = finished {
                    warn!("Failed to close {} after an error: {}", self.path.display(), f);
                }
                return Err(e);
            }
        };
        finished?;
        if let Some(report) = closed? {
            info!("Wrote report {}", report.display());
        }
        stats.elapsed = started.elapsed();
        info!(
            "Imported {}: {} tables, {} rows in {:.1?}",
            self.path.display(),
            stats.tables,
            stats.rows,
            stats.elapsed
        );
        Ok(stats)
    }

    fn run(
        &mut self,
        strategy: &mut ArchiveStrategy,
        handler: &mut dyn DatabaseHandler,
    ) -> Result<PipelineStats> {
        strategy.setup()?;
        let version = strategy.container().version().ok_or_else(|| {
            ArchiveError::container(strategy.container().to_string(), "format version unknown")
        })?;
        let paths = path_strategy(version);
        let imported =
            MetadataCodec::new(paths.as_ref(), self.config.pretty_print).import(strategy, &mut self.reporter)?;
        if let Some(declared) = imported.version {
            if declared != version {
                self.reporter.report(
                    ConditionKind::ValidationWarning,
                    paths.metadata_path(),
                    format!("document declares version {}, package is {}", declared, version),
                );
            }
        }
        let structure = imported.structure;
        let ignored: BTreeSet<String> = self.config.ignored_schemas.iter().cloned().collect();
        info!(
            "Importing {} (format {}): {} schemas, {} tables",
            self.path.display(),
            version,
            structure.schemas.len(),
            structure.table_count()
        );

        handler.init_database()?;
        handler.set_ignored_schemas(ignored.clone())?;
        handler.handle_structure(&structure)?;

        let mut stats = PipelineStats::new();
        for schema in &structure.schemas {
            if ignored.contains(&schema.name) {
                debug!("Skipping data of ignored schema {}", schema.name);
                continue;
            }
            handler.handle_data_open_schema(&schema.name)?;
            for table in &schema.tables {
                handler.handle_data_open_table(&table.id)?;
                let document = paths.table_document_path(schema.index, table.index);
                let check = check_table(strategy, paths.as_ref(), table, schema.index, table.index)?;
                if !check.is_valid() {
                    warn!(
                        "{} failed its check with {} violations, reading anyway",
                        document, check.violation_count
                    );
                    for violation in &check.violations {
                        self.reporter
                            .report(ConditionKind::ValidationWarning, document.as_str(), violation.as_str());
                    }
                }

                let mut lobs = 0u64;
                let rows = read_table(
                    strategy,
                    paths.as_ref(),
                    table,
                    schema.index,
                    table.index,
                    &mut self.reporter,
                    |row| {
                        lobs += row.cells.iter().map(count_external).sum::<u64>();
                        handler.handle_data_row(row)
                    },
                )?;
                if rows != table.row_count {
                    self.reporter.report(
                        ConditionKind::ValidationWarning,
                        document.as_str(),
                        format!("metadata declares {} rows, document holds {}", table.row_count, rows),
                    );
                }
                handler.handle_data_close_table(&table.id)?;
                debug!("Read {}: {} rows, {} large objects", table.id, rows, lobs);
                stats.tables += 1;
                stats.rows += rows;
                stats.lobs += lobs;
            }
            handler.handle_data_close_schema(&schema.name)?;
            stats.schemas += 1;
        }
        handler.finish_database()?;
        Ok(stats)
    }
}

fn count_external(cell: &Cell) -> u64 {
    match cell {
        Cell::Binary { externalized, .. } => u64::from(*externalized),
        Cell::Composed { children, .. } => children.iter().map(count_external).sum(),
        _ => 0,
    }
}
