//! Serde model of `header/metadata.xml`.
//!
//! One lenient set of structs serves both directions: every field has a
//! default so that a document missing required elements still reads after
//! the structural check has reported it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const ROOT_ELEMENT: &str = "siardArchive";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename = "siardArchive", rename_all = "camelCase", default)]
pub struct SiardArchiveDoc {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,
    #[serde(rename = "@version")]
    pub version: String,
    pub dbname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archiver: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archiver_contact: Option<String>,
    pub data_owner: String,
    pub data_origin_timespan: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer_application: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archival_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_user: Option<String>,
    pub schemas: SchemasDoc,
    #[serde(skip_serializing_if = "UsersDoc::is_empty")]
    pub users: UsersDoc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemasDoc {
    pub schema: Vec<SchemaDoc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaDoc {
    pub name: String,
    pub folder: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "TablesDoc::is_empty")]
    pub tables: TablesDoc,
    #[serde(skip_serializing_if = "ViewsDoc::is_empty")]
    pub views: ViewsDoc,
    #[serde(skip_serializing_if = "RoutinesDoc::is_empty")]
    pub routines: RoutinesDoc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TablesDoc {
    pub table: Vec<TableDoc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableDoc {
    pub name: String,
    pub folder: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub columns: ColumnsDoc,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<KeyDoc>,
    #[serde(skip_serializing_if = "ForeignKeysDoc::is_empty")]
    pub foreign_keys: ForeignKeysDoc,
    #[serde(skip_serializing_if = "CandidateKeysDoc::is_empty")]
    pub candidate_keys: CandidateKeysDoc,
    #[serde(skip_serializing_if = "CheckConstraintsDoc::is_empty")]
    pub check_constraints: CheckConstraintsDoc,
    #[serde(skip_serializing_if = "TriggersDoc::is_empty")]
    pub triggers: TriggersDoc,
    pub rows: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnsDoc {
    pub column: Vec<ColumnDoc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnDoc {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lob_folder: Option<String>,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_original: Option<String>,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Primary or candidate key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyDoc {
    pub name: String,
    pub column: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForeignKeysDoc {
    pub foreign_key: Vec<ForeignKeyDoc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForeignKeyDoc {
    pub name: String,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub reference: Vec<ReferenceDoc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceDoc {
    pub column: String,
    pub referenced: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CandidateKeysDoc {
    pub candidate_key: Vec<KeyDoc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckConstraintsDoc {
    pub check_constraint: Vec<CheckConstraintDoc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckConstraintDoc {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggersDoc {
    pub trigger: Vec<TriggerDoc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TriggerDoc {
    pub name: String,
    pub action_time: String,
    pub trigger_event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias_list: Option<String>,
    pub triggered_action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewsDoc {
    pub view: Vec<ViewDoc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewDoc {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_original: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "ColumnsDoc::is_empty")]
    pub columns: ColumnsDoc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutinesDoc {
    pub routine: Vec<RoutineDoc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutineDoc {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub characteristic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(skip_serializing_if = "ParametersDoc::is_empty")]
    pub parameters: ParametersDoc,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParametersDoc {
    pub parameter: Vec<ParameterDoc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterDoc {
    pub name: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_original: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsersDoc {
    pub user: Vec<UserDoc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserDoc {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

macro_rules! list_is_empty {
    ($($doc:ident . $field:ident),* $(,)?) => {
        $(impl $doc {
            pub fn is_empty(&self) -> bool {
                self.$field.is_empty()
            }
        })*
    };
}

list_is_empty!(
    TablesDoc.table,
    ColumnsDoc.column,
    ForeignKeysDoc.foreign_key,
    CandidateKeysDoc.candidate_key,
    CheckConstraintsDoc.check_constraint,
    TriggersDoc.trigger,
    ViewsDoc.view,
    RoutinesDoc.routine,
    ParametersDoc.parameter,
    UsersDoc.user,
);
