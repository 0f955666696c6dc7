//! Mapping between [`DatabaseStructure`] and the metadata document.

use chrono::Local;

use crate::core::{
    ArchiveMetadata, CandidateKey, CheckConstraint, ColumnStructure, DatabaseStructure, ForeignKey,
    Parameter, PrimaryKey, Reference, RoutineStructure, SchemaStructure, TableStructure, Trigger,
    UserStructure, ViewStructure,
};
use crate::dialect::sqlname::parse_type_name;
use crate::dialect::Type;
use crate::paths::{PathStrategy, SCHEMA_PREFIX, TABLE_PREFIX};
use crate::report::{ConditionKind, Reporter};

use super::document::*;

/// Build the document for `db`. Folder names come from the 1-based schema
/// and table indices.
pub fn to_document(db: &DatabaseStructure, paths: &dyn PathStrategy) -> SiardArchiveDoc {
    let meta = &db.metadata;
    SiardArchiveDoc {
        xmlns: paths.metadata_namespace().to_string(),
        version: paths.version().to_string(),
        dbname: db.name.clone(),
        description: meta.description.clone(),
        archiver: meta.archiver.clone(),
        archiver_contact: meta.archiver_contact.clone(),
        data_owner: meta.data_owner.clone().unwrap_or_default(),
        data_origin_timespan: meta.data_origin_timespan.clone().unwrap_or_default(),
        producer_application: meta.producer_application.clone(),
        archival_date: Some(
            meta.archival_date
                .unwrap_or_else(|| Local::now().date_naive()),
        ),
        database_product: meta.database_product.clone(),
        connection: meta.connection.clone(),
        database_user: meta.database_user.clone(),
        schemas: SchemasDoc {
            schema: db.schemas.iter().map(|s| schema_doc(s, paths)).collect(),
        },
        users: UsersDoc {
            user: db
                .users
                .iter()
                .map(|u| UserDoc {
                    name: u.name.clone(),
                    description: u.description.clone(),
                })
                .collect(),
        },
    }
}

fn schema_doc(schema: &SchemaStructure, paths: &dyn PathStrategy) -> SchemaDoc {
    SchemaDoc {
        name: schema.name.clone(),
        folder: paths.schema_folder_name(schema.index),
        description: schema.description.clone(),
        tables: TablesDoc {
            table: schema.tables.iter().map(|t| table_doc(t, paths)).collect(),
        },
        views: ViewsDoc {
            view: schema
                .views
                .iter()
                .map(|v| ViewDoc {
                    name: v.name.clone(),
                    query: v.query.clone(),
                    query_original: v.query_original.clone(),
                    description: v.description.clone(),
                    columns: ColumnsDoc {
                        column: v.columns.iter().map(|c| column_doc(c, None)).collect(),
                    },
                })
                .collect(),
        },
        routines: RoutinesDoc {
            routine: schema.routines.iter().map(routine_doc).collect(),
        },
    }
}

fn table_doc(table: &TableStructure, paths: &dyn PathStrategy) -> TableDoc {
    TableDoc {
        name: table.name.clone(),
        folder: paths.table_folder_name(table.index),
        description: table.description.clone(),
        columns: ColumnsDoc {
            column: table
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let lob_folder = c.ty.is_large().then(|| paths.lob_folder_name(i + 1));
                    column_doc(c, lob_folder)
                })
                .collect(),
        },
        primary_key: table.primary_key.as_ref().map(|pk| KeyDoc {
            name: pk.name.clone(),
            column: pk.columns.clone(),
            description: pk.description.clone(),
        }),
        foreign_keys: ForeignKeysDoc {
            foreign_key: table
                .foreign_keys
                .iter()
                .map(|fk| ForeignKeyDoc {
                    name: fk.name.clone(),
                    referenced_schema: fk.referenced_schema.clone(),
                    referenced_table: fk.referenced_table.clone(),
                    reference: fk
                        .references
                        .iter()
                        .map(|r| ReferenceDoc {
                            column: r.column.clone(),
                            referenced: r.referenced.clone(),
                        })
                        .collect(),
                    match_type: fk.match_type.clone(),
                    delete_action: fk.delete_action.clone(),
                    update_action: fk.update_action.clone(),
                    description: fk.description.clone(),
                })
                .collect(),
        },
        candidate_keys: CandidateKeysDoc {
            candidate_key: table
                .candidate_keys
                .iter()
                .map(|k| KeyDoc {
                    name: k.name.clone(),
                    column: k.columns.clone(),
                    description: k.description.clone(),
                })
                .collect(),
        },
        check_constraints: CheckConstraintsDoc {
            check_constraint: table
                .check_constraints
                .iter()
                .map(|c| CheckConstraintDoc {
                    name: c.name.clone(),
                    condition: c.condition.clone(),
                    description: c.description.clone(),
                })
                .collect(),
        },
        triggers: TriggersDoc {
            trigger: table
                .triggers
                .iter()
                .map(|t| TriggerDoc {
                    name: t.name.clone(),
                    action_time: t.action_time.clone(),
                    trigger_event: t.trigger_event.clone(),
                    alias_list: t.alias_list.clone(),
                    triggered_action: t.triggered_action.clone(),
                    description: t.description.clone(),
                })
                .collect(),
        },
        rows: table.row_count,
    }
}

fn column_doc(column: &ColumnStructure, lob_folder: Option<String>) -> ColumnDoc {
    ColumnDoc {
        name: column.name.clone(),
        lob_folder,
        type_name: column.ty.sql2008_name().to_string(),
        type_original: Some(column.ty.original_name().to_string()),
        nullable: column.nullable,
        default_value: column.default_value.clone(),
        description: column.description.clone(),
    }
}

fn routine_doc(routine: &RoutineStructure) -> RoutineDoc {
    RoutineDoc {
        name: routine.name.clone(),
        description: routine.description.clone(),
        source: routine.source.clone(),
        body: routine.body.clone(),
        characteristic: routine.characteristic.clone(),
        return_type: routine.return_type.clone(),
        parameters: ParametersDoc {
            parameter: routine
                .parameters
                .iter()
                .map(|p| ParameterDoc {
                    name: p.name.clone(),
                    mode: p.mode.clone(),
                    type_name: p.ty.sql2008_name().to_string(),
                    type_original: Some(p.ty.original_name().to_string()),
                    description: p.description.clone(),
                })
                .collect(),
        },
    }
}

/// Rebuild the structure a document describes.
///
/// Types are parsed back from their SQL:2008 names; a name that cannot be
/// read is kept as an unsupported type and reported.
pub fn from_document(doc: SiardArchiveDoc, reporter: &mut Reporter) -> DatabaseStructure {
    let metadata = ArchiveMetadata {
        description: non_empty(doc.description),
        archiver: non_empty(doc.archiver),
        archiver_contact: non_empty(doc.archiver_contact),
        data_owner: non_empty(Some(doc.data_owner)),
        data_origin_timespan: non_empty(Some(doc.data_origin_timespan)),
        producer_application: non_empty(doc.producer_application),
        archival_date: doc.archival_date,
        database_product: non_empty(doc.database_product),
        connection: non_empty(doc.connection),
        database_user: non_empty(doc.database_user),
    };
    let schemas = doc
        .schemas
        .schema
        .into_iter()
        .enumerate()
        .map(|(i, s)| schema_from_doc(s, i + 1, reporter))
        .collect();
    DatabaseStructure {
        name: doc.dbname,
        metadata,
        schemas,
        users: doc
            .users
            .user
            .into_iter()
            .map(|u| UserStructure {
                name: u.name,
                description: non_empty(u.description),
            })
            .collect(),
    }
}

fn schema_from_doc(doc: SchemaDoc, position: usize, reporter: &mut Reporter) -> SchemaStructure {
    let index = folder_index(&doc.folder, SCHEMA_PREFIX).unwrap_or(position);
    let mut schema = SchemaStructure::new(doc.name, index);
    schema.description = non_empty(doc.description);
    for (i, t) in doc.tables.table.into_iter().enumerate() {
        let table = table_from_doc(&schema.name, t, i + 1, reporter);
        schema.tables.push(table);
    }
    for v in doc.views.view {
        let location = format!("{}.{}", schema.name, v.name);
        let columns = v
            .columns
            .column
            .into_iter()
            .map(|c| column_from_doc(&location, c, reporter))
            .collect();
        schema.views.push(ViewStructure {
            name: v.name,
            query: non_empty(v.query),
            query_original: non_empty(v.query_original),
            columns,
            description: non_empty(v.description),
        });
    }
    for r in doc.routines.routine {
        let location = format!("{}.{}", schema.name, r.name);
        let parameters = r
            .parameters
            .parameter
            .into_iter()
            .map(|p| Parameter {
                ty: import_type(
                    &p.type_name,
                    p.type_original.as_deref(),
                    &format!("{}.{}", location, p.name),
                    reporter,
                ),
                name: p.name,
                mode: p.mode,
                description: non_empty(p.description),
            })
            .collect();
        schema.routines.push(RoutineStructure {
            name: r.name,
            description: non_empty(r.description),
            source: non_empty(r.source),
            body: non_empty(r.body),
            characteristic: non_empty(r.characteristic),
            return_type: non_empty(r.return_type),
            parameters,
        });
    }
    schema
}

fn table_from_doc(
    schema: &str,
    doc: TableDoc,
    position: usize,
    reporter: &mut Reporter,
) -> TableStructure {
    let index = folder_index(&doc.folder, TABLE_PREFIX).unwrap_or(position);
    let mut table = TableStructure::new(schema, doc.name, index);
    table.description = non_empty(doc.description);
    for c in doc.columns.column {
        let column = column_from_doc(&table.id, c, reporter);
        table.columns.push(column);
    }
    table.primary_key = doc.primary_key.map(|k| PrimaryKey {
        name: k.name,
        columns: k.column,
        description: non_empty(k.description),
    });
    table.foreign_keys = doc
        .foreign_keys
        .foreign_key
        .into_iter()
        .map(|fk| ForeignKey {
            name: fk.name,
            referenced_schema: fk.referenced_schema,
            referenced_table: fk.referenced_table,
            references: fk
                .reference
                .into_iter()
                .map(|r| Reference {
                    column: r.column,
                    referenced: r.referenced,
                })
                .collect(),
            match_type: non_empty(fk.match_type),
            delete_action: non_empty(fk.delete_action),
            update_action: non_empty(fk.update_action),
            description: non_empty(fk.description),
        })
        .collect();
    table.candidate_keys = doc
        .candidate_keys
        .candidate_key
        .into_iter()
        .map(|k| CandidateKey {
            name: k.name,
            columns: k.column,
            description: non_empty(k.description),
        })
        .collect();
    table.check_constraints = doc
        .check_constraints
        .check_constraint
        .into_iter()
        .map(|c| CheckConstraint {
            name: c.name,
            condition: non_empty(c.condition),
            description: non_empty(c.description),
        })
        .collect();
    table.triggers = doc
        .triggers
        .trigger
        .into_iter()
        .map(|t| Trigger {
            name: t.name,
            action_time: t.action_time,
            trigger_event: t.trigger_event,
            alias_list: non_empty(t.alias_list),
            triggered_action: t.triggered_action,
            description: non_empty(t.description),
        })
        .collect();
    table.row_count = doc.rows;
    table
}

fn column_from_doc(owner: &str, doc: ColumnDoc, reporter: &mut Reporter) -> ColumnStructure {
    let id = format!("{}.{}", owner, doc.name);
    ColumnStructure {
        ty: import_type(&doc.type_name, doc.type_original.as_deref(), &id, reporter),
        id,
        name: doc.name,
        nullable: doc.nullable,
        default_value: non_empty(doc.default_value),
        description: non_empty(doc.description),
    }
}

fn import_type(name: &str, original: Option<&str>, location: &str, reporter: &mut Reporter) -> Type {
    let original = original.unwrap_or("");
    match parse_type_name(name) {
        Ok(kind) => Type::new(kind, original),
        Err(e) => {
            let ty = Type::unsupported(if original.trim().is_empty() {
                name
            } else {
                original
            });
            if ty.sql2008_name() != name.trim() {
                reporter.report(
                    ConditionKind::SavedAsString,
                    location,
                    format!("{}; kept as {}", e, ty),
                );
            }
            ty
        }
    }
}

fn folder_index(folder: &str, prefix: &str) -> Option<usize> {
    folder
        .strip_prefix(prefix)?
        .parse()
        .ok()
        .filter(|&i: &usize| i > 0)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
