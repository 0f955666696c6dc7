//! Writing a package from a [`DatabaseHandler`] call sequence.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::archive::ArchiveStrategy;
use crate::config::ArchiveConfig;
use crate::content::TableWriter;
use crate::core::{CallSequence, DatabaseHandler, DatabaseStructure, Row};
use crate::error::{ArchiveError, Result};
use crate::metadata::MetadataCodec;
use crate::paths::{path_strategy, PathStrategy};
use crate::report::Reporter;

use super::PipelineStats;

/// The table currently receiving rows.
struct OpenTable {
    schema: usize,
    table: usize,
    writer: TableWriter,
}

/// Writes one package from the calls it receives.
///
/// Schemas named in the configuration or in
/// [`set_ignored_schemas`](DatabaseHandler::set_ignored_schemas) are left
/// out entirely; the rest are numbered `1..N` in structure order, their
/// tables `1..M`, so the folder indices stay dense whatever was filtered.
pub struct SiardExporter {
    path: PathBuf,
    config: ArchiveConfig,
    strategy: Option<ArchiveStrategy>,
    paths: Box<dyn PathStrategy>,
    sequence: CallSequence,
    reporter: Reporter,
    ignored: BTreeSet<String>,
    structure: Option<DatabaseStructure>,
    /// Position of the open schema within `structure`, `None` while an
    /// ignored schema is open.
    schema: Option<usize>,
    table: Option<OpenTable>,
    /// Ids of tables whose document has been written.
    written: BTreeSet<String>,
    stats: PipelineStats,
    started: Instant,
}

impl SiardExporter {
    /// Prepare an export to `path`. Nothing is created before
    /// [`init_database`](DatabaseHandler::init_database).
    pub fn new(path: impl Into<PathBuf>, config: ArchiveConfig) -> Result<Self> {
        config.validate()?;
        let reporter = match &config.report_path {
            Some(p) => Reporter::open(p),
            None => Reporter::in_memory(),
        };
        Ok(Self {
            path: path.into(),
            paths: path_strategy(config.format_version),
            ignored: config.ignored_schemas.iter().cloned().collect(),
            config,
            strategy: None,
            sequence: CallSequence::new(),
            reporter,
            structure: None,
            schema: None,
            table: None,
            written: BTreeSet::new(),
            stats: PipelineStats::new(),
            started: Instant::now(),
        })
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// The structure as written, with dense indices and streamed row counts.
    pub fn structure(&self) -> Option<&DatabaseStructure> {
        self.structure.as_ref()
    }

    /// Run `step`; on failure try to close the package before propagating.
    fn guarded<T>(&mut self, step: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        match step(self) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.abort();
                Err(e)
            }
        }
    }

    fn abort(&mut self) {
        self.table = None;
        if let Some(strategy) = self.strategy.as_mut() {
            if let Err(e) = strategy.finish() {
                warn!("Failed to close {} after an error: {}", self.path.display(), e);
            }
        }
        if let Err(e) = self.reporter.close() {
            warn!("Failed to write the report: {}", e);
        }
    }

    fn structure_mut(&mut self) -> Result<&mut DatabaseStructure> {
        self.structure
            .as_mut()
            .ok_or_else(|| ArchiveError::Sequence("structure has not been handled".into()))
    }

    /// Keep the non-ignored schemas and renumber schemas and tables densely.
    fn index_structure(&self, structure: &DatabaseStructure) -> DatabaseStructure {
        let mut indexed = structure.clone();
        indexed.schemas.retain(|s| !self.ignored.contains(&s.name));
        for (i, schema) in indexed.schemas.iter_mut().enumerate() {
            schema.index = i + 1;
            for (j, table) in schema.tables.iter_mut().enumerate() {
                table.index = j + 1;
                table.row_count = 0;
            }
        }
        indexed
    }

    /// Write an empty document for a table that received no data calls.
    fn write_empty_table(&mut self, schema: usize, table: usize) -> Result<()> {
        let Some(structure) = self.structure.as_ref() else {
            return Ok(());
        };
        let s = &structure.schemas[schema];
        let t = &s.tables[table];
        let (schema_index, table_index) = (s.index, t.index);
        debug!("No data delivered for {}, writing an empty document", t.id);
        let t = t.clone();
        let strategy = open_strategy(&mut self.strategy)?;
        let writer = TableWriter::open(
            strategy,
            self.paths.as_ref(),
            &t,
            schema_index,
            table_index,
            self.config.pretty_print,
        )?;
        writer.finish(strategy, self.paths.as_ref())?;
        self.written.insert(t.id);
        Ok(())
    }
}

impl DatabaseHandler for SiardExporter {
    fn init_database(&mut self) -> Result<()> {
        self.guarded(|this| {
            this.sequence.init_database()?;
            this.started = Instant::now();
            let mut strategy = ArchiveStrategy::for_export(&this.path, &this.config)?;
            strategy.setup()?;
            info!(
                "Exporting to {} (format {}, {:?})",
                this.path.display(),
                this.config.format_version,
                this.config.layout
            );
            this.strategy = Some(strategy);
            Ok(())
        })
    }

    fn set_ignored_schemas(&mut self, schemas: BTreeSet<String>) -> Result<()> {
        self.guarded(|this| {
            this.sequence.set_ignored_schemas()?;
            this.ignored.extend(schemas);
            Ok(())
        })
    }

    fn handle_structure(&mut self, structure: &DatabaseStructure) -> Result<()> {
        self.guarded(|this| {
            this.sequence.handle_structure()?;
            let indexed = this.index_structure(structure);
            debug!(
                "Structure of {}: {} schemas kept, {} ignored",
                indexed.name,
                indexed.schemas.len(),
                structure.schemas.len() - indexed.schemas.len()
            );
            this.structure = Some(indexed);
            Ok(())
        })
    }

    fn handle_data_open_schema(&mut self, schema_name: &str) -> Result<()> {
        self.guarded(|this| {
            this.sequence.open_schema(schema_name)?;
            if this.ignored.contains(schema_name) {
                this.schema = None;
                return Ok(());
            }
            let position = this
                .structure_mut()?
                .schemas
                .iter()
                .position(|s| s.name == schema_name)
                .ok_or_else(|| {
                    ArchiveError::Sequence(format!("schema {} is not part of the structure", schema_name))
                })?;
            this.schema = Some(position);
            Ok(())
        })
    }

    fn handle_data_open_table(&mut self, table_id: &str) -> Result<()> {
        self.guarded(|this| {
            this.sequence.open_table(table_id)?;
            let Some(schema) = this.schema else {
                return Ok(());
            };
            if this.written.contains(table_id) {
                return Err(ArchiveError::Sequence(format!(
                    "table {} was already written",
                    table_id
                )));
            }
            let structure = this.structure_mut()?;
            let s = &structure.schemas[schema];
            let table = s.tables.iter().position(|t| t.id == table_id).ok_or_else(|| {
                ArchiveError::Sequence(format!("table {} is not part of schema {}", table_id, s.name))
            })?;
            let t = s.tables[table].clone();
            let schema_index = s.index;
            let pretty = this.config.pretty_print;
            let strategy = open_strategy(&mut this.strategy)?;
            let writer = TableWriter::open(
                strategy,
                this.paths.as_ref(),
                &t,
                schema_index,
                t.index,
                pretty,
            )?;
            this.table = Some(OpenTable {
                schema,
                table,
                writer,
            });
            Ok(())
        })
    }

    fn handle_data_row(&mut self, row: Row) -> Result<()> {
        self.guarded(|this| {
            this.sequence.row(row.index)?;
            let Some(open) = this.table.as_mut() else {
                return Ok(());
            };
            let strategy = open_strategy(&mut this.strategy)?;
            open.writer.write_row(
                strategy,
                this.paths.as_ref(),
                &row,
                &this.config.lob,
                &mut this.reporter,
            )
        })
    }

    fn handle_data_close_table(&mut self, table_id: &str) -> Result<()> {
        self.guarded(|this| {
            this.sequence.close_table(table_id)?;
            let Some(open) = this.table.take() else {
                return Ok(());
            };
            let paths = this.paths.as_ref();
            let strategy = open_strategy(&mut this.strategy)?;
            let table_stats = open.writer.finish(strategy, paths)?;
            this.structure_mut()?.schemas[open.schema].tables[open.table].row_count =
                table_stats.rows;
            this.written.insert(table_id.to_string());
            this.stats.tables += 1;
            this.stats.rows += table_stats.rows;
            this.stats.lobs += table_stats.lobs;
            info!(
                "Wrote {}: {} rows, {} large objects",
                table_id, table_stats.rows, table_stats.lobs
            );
            Ok(())
        })
    }

    fn handle_data_close_schema(&mut self, schema_name: &str) -> Result<()> {
        self.guarded(|this| {
            this.sequence.close_schema(schema_name)?;
            if this.schema.take().is_some() {
                this.stats.schemas += 1;
            }
            Ok(())
        })
    }

    fn finish_database(&mut self) -> Result<()> {
        self.guarded(|this| {
            this.sequence.finish_database()?;
            let written = &this.written;
            let missing: Vec<(usize, usize)> = match this.structure.as_ref() {
                Some(structure) => structure
                    .schemas
                    .iter()
                    .enumerate()
                    .flat_map(move |(i, s)| {
                        s.tables
                            .iter()
                            .enumerate()
                            .filter(move |(_, t)| !written.contains(&t.id))
                            .map(move |(j, _)| (i, j))
                    })
                    .collect(),
                None => Vec::new(),
            };
            for (schema, table) in missing {
                this.write_empty_table(schema, table)?;
            }

            let structure = this
                .structure
                .take()
                .ok_or_else(|| ArchiveError::Sequence("structure has not been handled".into()))?;
            let pretty = this.config.pretty_print;
            let paths = this.paths.as_ref();
            let strategy = open_strategy(&mut this.strategy)?;
            MetadataCodec::new(paths, pretty).export(strategy, &structure)?;
            strategy.finish()?;
            this.structure = Some(structure);

            this.stats.elapsed = this.started.elapsed();
            if let Some(report) = this.reporter.close()? {
                info!("Wrote report {}", report.display());
            }
            info!(
                "Finished {}: {} tables, {} rows, {} large objects in {:.1?}",
                this.path.display(),
                this.stats.tables,
                this.stats.rows,
                this.stats.lobs,
                this.stats.elapsed
            );
            Ok(())
        })
    }
}

fn open_strategy(strategy: &mut Option<ArchiveStrategy>) -> Result<&mut ArchiveStrategy> {
    strategy
        .as_mut()
        .ok_or_else(|| ArchiveError::Sequence("package is not open".into()))
}
