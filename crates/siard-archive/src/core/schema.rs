//! Database structure model: schemas, tables, columns, keys, constraints,
//! triggers, views and routines.
//!
//! Built once per migration. On export it is read-only; on import the
//! metadata codec assembles it. Column order is authoritative: it drives
//! the alignment of rows and cells in content documents.

use chrono::NaiveDate;

use crate::dialect::Type;

/// Descriptive metadata about the archived database and its archiving.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveMetadata {
    pub description: Option<String>,
    pub archiver: Option<String>,
    pub archiver_contact: Option<String>,
    pub data_owner: Option<String>,
    pub data_origin_timespan: Option<String>,
    pub producer_application: Option<String>,
    pub archival_date: Option<NaiveDate>,
    pub database_product: Option<String>,
    pub connection: Option<String>,
    pub database_user: Option<String>,
}

/// The whole database.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseStructure {
    pub name: String,
    pub metadata: ArchiveMetadata,
    pub schemas: Vec<SchemaStructure>,
    pub users: Vec<UserStructure>,
}

impl DatabaseStructure {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn schema(&self, name: &str) -> Option<&SchemaStructure> {
        self.schemas.iter().find(|s| s.name == name)
    }

    /// Look up a table by its `schema.table` id.
    pub fn table_by_id(&self, id: &str) -> Option<&TableStructure> {
        self.schemas
            .iter()
            .flat_map(|s| s.tables.iter())
            .find(|t| t.id == id)
    }

    pub fn table_count(&self) -> usize {
        self.schemas.iter().map(|s| s.tables.len()).sum()
    }
}

/// One schema. `index` is 1-based and names the `schemaN` folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaStructure {
    pub name: String,
    pub index: usize,
    pub description: Option<String>,
    pub tables: Vec<TableStructure>,
    pub views: Vec<ViewStructure>,
    pub routines: Vec<RoutineStructure>,
}

impl SchemaStructure {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            ..Self::default()
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableStructure> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// One table. `id` is `schema.table`; `index` is 1-based and names the
/// `tableN` folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStructure {
    pub id: String,
    pub schema: String,
    pub name: String,
    pub index: usize,
    pub description: Option<String>,
    pub columns: Vec<ColumnStructure>,
    pub primary_key: Option<PrimaryKey>,
    pub foreign_keys: Vec<ForeignKey>,
    pub candidate_keys: Vec<CandidateKey>,
    pub check_constraints: Vec<CheckConstraint>,
    pub triggers: Vec<Trigger>,
    pub row_count: u64,
}

impl TableStructure {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, index: usize) -> Self {
        let schema = schema.into();
        let name = name.into();
        Self {
            id: format!("{}.{}", schema, name),
            schema,
            name,
            index,
            ..Self::default()
        }
    }

    /// Append a column, deriving its id from this table.
    pub fn add_column(&mut self, name: impl Into<String>, ty: Type, nullable: bool) -> &mut ColumnStructure {
        let name = name.into();
        self.columns.push(ColumnStructure {
            id: format!("{}.{}", self.id, name),
            name,
            ty,
            nullable,
            default_value: None,
            description: None,
        });
        let last = self.columns.len() - 1;
        &mut self.columns[last]
    }

    /// 1-based position of a column, as used in `c<N>` and `lob<N>` names.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name).map(|i| i + 1)
    }
}

/// One column with its canonical type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnStructure {
    /// `schema.table.column`.
    pub id: String,
    pub name: String,
    pub ty: Type,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimaryKey {
    pub name: String,
    pub columns: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateKey {
    pub name: String,
    pub columns: Vec<String>,
    pub description: Option<String>,
}

/// Column pairing of a foreign key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reference {
    pub column: String,
    pub referenced: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForeignKey {
    pub name: String,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub references: Vec<Reference>,
    pub match_type: Option<String>,
    pub delete_action: Option<String>,
    pub update_action: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckConstraint {
    pub name: String,
    pub condition: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trigger {
    pub name: String,
    /// `BEFORE`, `AFTER` or `INSTEAD OF`.
    pub action_time: String,
    pub trigger_event: String,
    pub alias_list: Option<String>,
    pub triggered_action: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewStructure {
    pub name: String,
    pub query: Option<String>,
    pub query_original: Option<String>,
    pub columns: Vec<ColumnStructure>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    /// `IN`, `OUT` or `INOUT`.
    pub mode: String,
    pub ty: Type,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutineStructure {
    pub name: String,
    pub description: Option<String>,
    pub source: Option<String>,
    pub body: Option<String>,
    pub characteristic: Option<String>,
    pub return_type: Option<String>,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserStructure {
    pub name: String,
    pub description: Option<String>,
}
