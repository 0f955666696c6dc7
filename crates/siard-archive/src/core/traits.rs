//! The downstream consumer interface.
//!
//! Every exporter and filter receives a migration through
//! [`DatabaseHandler`] in one fixed order:
//!
//! ```text
//! init_database
//! set_ignored_schemas
//! handle_structure
//! ( handle_data_open_schema
//!     ( handle_data_open_table  handle_data_row*  handle_data_close_table )*
//!   handle_data_close_schema )*
//! finish_database
//! ```
//!
//! Filters may wrap a handler transparently as long as they forward this
//! order. [`CallSequence`] checks it for implementations that want the
//! guarantee enforced.

use std::collections::BTreeSet;

use crate::error::{ArchiveError, Result};

use super::schema::DatabaseStructure;
use super::value::Row;

/// Consumer of one database migration.
pub trait DatabaseHandler {
    fn init_database(&mut self) -> Result<()>;

    /// Schemas whose data and structure must be skipped.
    fn set_ignored_schemas(&mut self, schemas: BTreeSet<String>) -> Result<()>;

    fn handle_structure(&mut self, structure: &DatabaseStructure) -> Result<()>;

    fn handle_data_open_schema(&mut self, schema_name: &str) -> Result<()>;

    /// `table_id` is `schema.table`.
    fn handle_data_open_table(&mut self, table_id: &str) -> Result<()>;

    /// Rows arrive in ascending index order within the open table.
    fn handle_data_row(&mut self, row: Row) -> Result<()>;

    fn handle_data_close_table(&mut self, table_id: &str) -> Result<()>;

    fn handle_data_close_schema(&mut self, schema_name: &str) -> Result<()>;

    fn finish_database(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Created,
    Initialized,
    Configured,
    Structured,
    InSchema(String),
    InTable { schema: String, table: String, last_row: u64 },
    Finished,
}

/// Tracks a [`DatabaseHandler`] call order and rejects violations.
#[derive(Debug, Clone)]
pub struct CallSequence {
    phase: Phase,
}

impl Default for CallSequence {
    fn default() -> Self {
        Self {
            phase: Phase::Created,
        }
    }
}

impl CallSequence {
    pub fn new() -> Self {
        Self::default()
    }

    fn violation(&self, call: &str) -> ArchiveError {
        ArchiveError::Sequence(format!("{} not allowed in state {:?}", call, self.phase))
    }

    pub fn init_database(&mut self) -> Result<()> {
        match self.phase {
            Phase::Created => {
                self.phase = Phase::Initialized;
                Ok(())
            }
            _ => Err(self.violation("init_database")),
        }
    }

    pub fn set_ignored_schemas(&mut self) -> Result<()> {
        match self.phase {
            Phase::Initialized | Phase::Configured => {
                self.phase = Phase::Configured;
                Ok(())
            }
            _ => Err(self.violation("set_ignored_schemas")),
        }
    }

    pub fn handle_structure(&mut self) -> Result<()> {
        match self.phase {
            Phase::Initialized | Phase::Configured => {
                self.phase = Phase::Structured;
                Ok(())
            }
            _ => Err(self.violation("handle_structure")),
        }
    }

    pub fn open_schema(&mut self, schema: &str) -> Result<()> {
        match self.phase {
            Phase::Structured => {
                self.phase = Phase::InSchema(schema.to_string());
                Ok(())
            }
            _ => Err(self.violation("handle_data_open_schema")),
        }
    }

    pub fn open_table(&mut self, table_id: &str) -> Result<()> {
        match &self.phase {
            Phase::InSchema(schema) => {
                self.phase = Phase::InTable {
                    schema: schema.clone(),
                    table: table_id.to_string(),
                    last_row: 0,
                };
                Ok(())
            }
            _ => Err(self.violation("handle_data_open_table")),
        }
    }

    /// Rows must ascend strictly within a table.
    pub fn row(&mut self, index: u64) -> Result<()> {
        match &mut self.phase {
            Phase::InTable { last_row, table, .. } => {
                if index <= *last_row {
                    return Err(ArchiveError::Sequence(format!(
                        "row {} of {} delivered after row {}",
                        index, table, last_row
                    )));
                }
                *last_row = index;
                Ok(())
            }
            _ => Err(self.violation("handle_data_row")),
        }
    }

    pub fn close_table(&mut self, table_id: &str) -> Result<()> {
        match &self.phase {
            Phase::InTable { schema, table, .. } if table == table_id => {
                self.phase = Phase::InSchema(schema.clone());
                Ok(())
            }
            _ => Err(self.violation("handle_data_close_table")),
        }
    }

    pub fn close_schema(&mut self, schema_name: &str) -> Result<()> {
        match &self.phase {
            Phase::InSchema(schema) if schema == schema_name => {
                self.phase = Phase::Structured;
                Ok(())
            }
            _ => Err(self.violation("handle_data_close_schema")),
        }
    }

    pub fn finish_database(&mut self) -> Result<()> {
        match self.phase {
            Phase::Structured => {
                self.phase = Phase::Finished;
                Ok(())
            }
            _ => Err(self.violation("finish_database")),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_sequence() {
        let mut seq = CallSequence::new();
        seq.init_database().unwrap();
        seq.set_ignored_schemas().unwrap();
        seq.handle_structure().unwrap();
        seq.open_schema("public").unwrap();
        seq.open_table("public.t").unwrap();
        seq.row(1).unwrap();
        seq.row(2).unwrap();
        seq.close_table("public.t").unwrap();
        seq.close_schema("public").unwrap();
        seq.finish_database().unwrap();
        assert!(seq.is_finished());
    }

    #[test]
    fn test_rows_must_ascend() {
        let mut seq = CallSequence::new();
        seq.init_database().unwrap();
        seq.handle_structure().unwrap();
        seq.open_schema("s").unwrap();
        seq.open_table("s.t").unwrap();
        seq.row(2).unwrap();
        assert!(matches!(seq.row(2), Err(ArchiveError::Sequence(_))));
    }

    #[test]
    fn test_out_of_order_calls_rejected() {
        let mut seq = CallSequence::new();
        assert!(seq.handle_structure().is_err());
        seq.init_database().unwrap();
        assert!(seq.open_schema("s").is_err());
        seq.handle_structure().unwrap();
        seq.open_schema("s").unwrap();
        assert!(seq.close_table("s.t").is_err());
        assert!(seq.close_schema("other").is_err());
        assert!(seq.finish_database().is_err());
    }
}
