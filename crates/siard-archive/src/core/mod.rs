//! Core model shared by every codec:
//!
//! - [`schema`]: database, schema, table, column and constraint structure
//! - [`value`]: rows, cells and lazy large-object sources
//! - [`traits`]: the downstream consumer interface and its call order

pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{
    ArchiveMetadata, CandidateKey, CheckConstraint, ColumnStructure, DatabaseStructure, ForeignKey,
    Parameter, PrimaryKey, Reference, RoutineStructure, SchemaStructure, TableStructure, Trigger,
    UserStructure, ViewStructure,
};
pub use traits::{CallSequence, DatabaseHandler};
pub use value::{cell_id, Cell, LobSource, Row, StreamOpener};
