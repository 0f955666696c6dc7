//! Canonical type system.
//!
//! Every column carries one [`Type`]: a closed set of structural variants
//! plus the vendor's original type name and two canonical dialect-name
//! projections (SQL:1999 and SQL:2008). The projections are computed once in
//! [`Type::new`] from the structural fields and never re-derived, so the
//! metadata codec, the content codec and the validator all agree on them.
//!
//! # Architecture
//!
//! ```text
//! vendor descriptor  →  TypeKind  →  Type { sql99, sql2008, xsd }
//!     (typemap)                        ↑
//! metadata "type"    →  sqlname parser ┘
//! ```

use std::fmt;

use crate::paths::LobKind;

/// Declared length used for character large objects and unbounded
/// character descriptors.
pub const MAX_STRING_LENGTH: u32 = 65535;

/// Structural variant of a canonical type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    /// Character data. `large` marks a character large object, whose
    /// declared length is always [`MAX_STRING_LENGTH`].
    String {
        length: u32,
        variable: bool,
        large: bool,
    },
    /// Exact numeric with decimal precision and scale.
    NumericExact { precision: u32, scale: u32 },
    /// Approximate numeric with binary precision (24 = REAL, 53 = DOUBLE).
    NumericApproximate { precision: u32 },
    Boolean,
    /// Date, time or timestamp, optionally zoned.
    DateTime {
        has_date: bool,
        has_time: bool,
        has_time_zone: bool,
    },
    /// Binary data; `None` is an unbounded binary large object.
    Binary { length: Option<u32> },
    /// Array of one element type.
    ComposedArray { element: Box<Type> },
    /// Structured (row) type with named fields.
    ComposedStructure { fields: Vec<StructField> },
    /// A vendor type with no canonical form; stored as text.
    Unsupported,
}

/// A named field of a structured type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    pub name: String,
    pub ty: Type,
}

impl StructField {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// XML Schema type a column's cells are written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XsdType {
    Clob,
    Blob,
    String,
    Decimal,
    Integer,
    Float,
    Double,
    Boolean,
    Date,
    Time,
    DateTime,
    /// Array or structure; children are elements, not text.
    Composed,
}

impl XsdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            XsdType::Clob => "clobType",
            XsdType::Blob => "blobType",
            XsdType::String => "xs:string",
            XsdType::Decimal => "xs:decimal",
            XsdType::Integer => "xs:integer",
            XsdType::Float => "xs:float",
            XsdType::Double => "xs:double",
            XsdType::Boolean => "xs:boolean",
            XsdType::Date => "dateType",
            XsdType::Time => "timeType",
            XsdType::DateTime => "dateTimeType",
            XsdType::Composed => "composedType",
        }
    }

    /// Inverse of [`XsdType::as_str`]; the `xs:` prefix is optional.
    pub fn from_name(name: &str) -> Option<Self> {
        let local = name.rsplit(':').next().unwrap_or(name);
        Some(match local {
            "clobType" => XsdType::Clob,
            "blobType" => XsdType::Blob,
            "string" => XsdType::String,
            "decimal" => XsdType::Decimal,
            "integer" => XsdType::Integer,
            "float" => XsdType::Float,
            "double" => XsdType::Double,
            "boolean" => XsdType::Boolean,
            "dateType" => XsdType::Date,
            "timeType" => XsdType::Time,
            "dateTimeType" => XsdType::DateTime,
            "composedType" => XsdType::Composed,
            _ => return None,
        })
    }

    /// Only large types are candidates for externalization.
    pub fn is_large(&self) -> bool {
        matches!(self, XsdType::Clob | XsdType::Blob)
    }
}

/// A canonical column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Type {
    kind: TypeKind,
    original_name: String,
    sql99_name: String,
    sql2008_name: String,
}

impl Type {
    /// Build a type, normalizing its fields and deriving both projections.
    pub fn new(kind: TypeKind, original_name: impl Into<String>) -> Self {
        let kind = normalize(kind);
        let (sql99_name, sql2008_name) = project(&kind);
        let mut original_name = original_name.into();
        if original_name.trim().is_empty() {
            original_name = sql2008_name.clone();
        }
        let (sql99_name, sql2008_name) = if kind == TypeKind::Unsupported {
            let name = original_name.trim().to_uppercase();
            (name.clone(), name)
        } else {
            (sql99_name, sql2008_name)
        };
        Self {
            kind,
            original_name,
            sql99_name,
            sql2008_name,
        }
    }

    /// Build a type whose original name is its own SQL:2008 name.
    pub fn canonical(kind: TypeKind) -> Self {
        Self::new(kind, "")
    }

    pub fn character(length: u32) -> Self {
        Self::canonical(TypeKind::String {
            length,
            variable: false,
            large: false,
        })
    }

    pub fn varchar(length: u32) -> Self {
        Self::canonical(TypeKind::String {
            length,
            variable: true,
            large: false,
        })
    }

    pub fn clob() -> Self {
        Self::canonical(TypeKind::String {
            length: MAX_STRING_LENGTH,
            variable: true,
            large: true,
        })
    }

    pub fn decimal(precision: u32, scale: u32) -> Self {
        Self::canonical(TypeKind::NumericExact { precision, scale })
    }

    pub fn smallint() -> Self {
        Self::decimal(5, 0)
    }

    pub fn integer() -> Self {
        Self::decimal(10, 0)
    }

    pub fn bigint() -> Self {
        Self::decimal(19, 0)
    }

    pub fn real() -> Self {
        Self::canonical(TypeKind::NumericApproximate { precision: 24 })
    }

    pub fn double() -> Self {
        Self::canonical(TypeKind::NumericApproximate { precision: 53 })
    }

    pub fn boolean() -> Self {
        Self::canonical(TypeKind::Boolean)
    }

    pub fn date() -> Self {
        Self::canonical(TypeKind::DateTime {
            has_date: true,
            has_time: false,
            has_time_zone: false,
        })
    }

    pub fn time(with_time_zone: bool) -> Self {
        Self::canonical(TypeKind::DateTime {
            has_date: false,
            has_time: true,
            has_time_zone: with_time_zone,
        })
    }

    pub fn timestamp(with_time_zone: bool) -> Self {
        Self::canonical(TypeKind::DateTime {
            has_date: true,
            has_time: true,
            has_time_zone: with_time_zone,
        })
    }

    pub fn binary(length: Option<u32>) -> Self {
        Self::canonical(TypeKind::Binary { length })
    }

    pub fn blob() -> Self {
        Self::binary(None)
    }

    pub fn array(element: Type) -> Self {
        Self::canonical(TypeKind::ComposedArray {
            element: Box::new(element),
        })
    }

    pub fn structure(fields: Vec<StructField>) -> Self {
        Self::canonical(TypeKind::ComposedStructure { fields })
    }

    pub fn unsupported(original_name: impl Into<String>) -> Self {
        Self::new(TypeKind::Unsupported, original_name)
    }

    /// Same structure, different vendor name.
    pub fn with_original_name(self, original_name: impl Into<String>) -> Self {
        Self::new(self.kind, original_name)
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn sql99_name(&self) -> &str {
        &self.sql99_name
    }

    pub fn sql2008_name(&self) -> &str {
        &self.sql2008_name
    }

    /// Schema type used for this column's cells in content documents.
    pub fn xsd_type(&self) -> XsdType {
        match &self.kind {
            TypeKind::String { large: true, .. } => XsdType::Clob,
            TypeKind::String { .. } | TypeKind::Unsupported => XsdType::String,
            TypeKind::NumericExact { precision, scale: 0 } if is_integer_width(*precision) => {
                XsdType::Integer
            }
            TypeKind::NumericExact { .. } => XsdType::Decimal,
            TypeKind::NumericApproximate { precision } if *precision <= 24 => XsdType::Float,
            TypeKind::NumericApproximate { .. } => XsdType::Double,
            TypeKind::Boolean => XsdType::Boolean,
            TypeKind::DateTime {
                has_date: true,
                has_time: false,
                ..
            } => XsdType::Date,
            TypeKind::DateTime { has_date: false, .. } => XsdType::Time,
            TypeKind::DateTime { .. } => XsdType::DateTime,
            TypeKind::Binary { .. } => XsdType::Blob,
            TypeKind::ComposedArray { .. } | TypeKind::ComposedStructure { .. } => XsdType::Composed,
        }
    }

    /// True when cells of this type may be externalized.
    pub fn is_large(&self) -> bool {
        self.xsd_type().is_large()
    }

    /// Record kind used when a cell of this type is externalized.
    pub fn lob_kind(&self) -> Option<LobKind> {
        match self.xsd_type() {
            XsdType::Clob => Some(LobKind::Character),
            XsdType::Blob => Some(LobKind::Binary),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql2008_name)
    }
}

fn is_integer_width(precision: u32) -> bool {
    matches!(precision, 5 | 10 | 19)
}

fn normalize(kind: TypeKind) -> TypeKind {
    match kind {
        TypeKind::String { large: true, .. } => TypeKind::String {
            length: MAX_STRING_LENGTH,
            variable: true,
            large: true,
        },
        TypeKind::String {
            length,
            variable,
            large,
        } => TypeKind::String {
            length: length.max(1),
            variable,
            large,
        },
        TypeKind::NumericExact { precision, scale } => {
            let precision = precision.max(1);
            TypeKind::NumericExact {
                precision,
                scale: scale.min(precision),
            }
        }
        TypeKind::NumericApproximate { precision } => TypeKind::NumericApproximate {
            precision: precision.clamp(1, 53),
        },
        TypeKind::DateTime {
            has_date,
            has_time,
            has_time_zone,
        } => {
            let has_date = has_date || !has_time;
            TypeKind::DateTime {
                has_date,
                has_time,
                has_time_zone: has_time_zone && has_time,
            }
        }
        TypeKind::Binary { length } => TypeKind::Binary {
            length: length.map(|n| n.max(1)),
        },
        TypeKind::ComposedArray { element } => TypeKind::ComposedArray {
            element: Box::new(canonical_only(*element)),
        },
        TypeKind::ComposedStructure { fields } => TypeKind::ComposedStructure {
            fields: fields
                .into_iter()
                .map(|f| StructField::new(f.name, canonical_only(f.ty)))
                .collect(),
        },
        other => other,
    }
}

/// Nested types keep canonical names only; vendor names live on the column.
fn canonical_only(ty: Type) -> Type {
    match ty.kind {
        TypeKind::Unsupported => ty,
        kind => Type::canonical(kind),
    }
}

fn project(kind: &TypeKind) -> (String, String) {
    match kind {
        TypeKind::String { large: true, .. } => same("CHARACTER LARGE OBJECT"),
        TypeKind::String {
            length,
            variable: true,
            ..
        } => same(&format!("CHARACTER VARYING({})", length)),
        TypeKind::String { length, .. } => same(&format!("CHARACTER({})", length)),
        TypeKind::NumericExact { precision: 5, scale: 0 } => same("SMALLINT"),
        TypeKind::NumericExact { precision: 10, scale: 0 } => same("INTEGER"),
        TypeKind::NumericExact { precision: 19, scale: 0 } => {
            ("DECIMAL(19)".to_string(), "BIGINT".to_string())
        }
        TypeKind::NumericExact { precision, scale: 0 } => same(&format!("DECIMAL({})", precision)),
        TypeKind::NumericExact { precision, scale } => {
            same(&format!("DECIMAL({},{})", precision, scale))
        }
        TypeKind::NumericApproximate { precision: 24 } => same("REAL"),
        TypeKind::NumericApproximate { precision: 53 } => same("DOUBLE PRECISION"),
        TypeKind::NumericApproximate { precision } => same(&format!("FLOAT({})", precision)),
        TypeKind::Boolean => same("BOOLEAN"),
        TypeKind::DateTime {
            has_date,
            has_time,
            has_time_zone,
        } => {
            let base = match (has_date, has_time) {
                (true, false) => "DATE",
                (false, _) => "TIME",
                (true, true) => "TIMESTAMP",
            };
            if *has_time_zone {
                same(&format!("{} WITH TIME ZONE", base))
            } else {
                same(base)
            }
        }
        TypeKind::Binary { length: None } => same("BINARY LARGE OBJECT"),
        TypeKind::Binary { length: Some(n) } => (
            format!("BIT VARYING({})", u64::from(*n) * 8),
            format!("BINARY VARYING({})", n),
        ),
        TypeKind::ComposedArray { element } => (
            format!("{} ARRAY", element.sql99_name()),
            format!("{} ARRAY", element.sql2008_name()),
        ),
        TypeKind::ComposedStructure { fields } => {
            let sql99 = fields
                .iter()
                .map(|f| format!("{} {}", delimit_identifier(&f.name), f.ty.sql99_name()))
                .collect::<Vec<_>>()
                .join(", ");
            let sql2008 = fields
                .iter()
                .map(|f| format!("{} {}", delimit_identifier(&f.name), f.ty.sql2008_name()))
                .collect::<Vec<_>>()
                .join(", ");
            (format!("ROW({})", sql99), format!("ROW({})", sql2008))
        }
        TypeKind::Unsupported => same("UNSUPPORTED"),
    }
}

fn same(name: &str) -> (String, String) {
    (name.to_string(), name.to_string())
}

/// A structure field name as it appears in a type name. Anything but a
/// regular identifier is written as `"..."` with inner quotes doubled.
fn delimit_identifier(name: &str) -> String {
    let mut chars = name.chars();
    let regular = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if regular {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_projections() {
        assert_eq!(Type::character(10).sql2008_name(), "CHARACTER(10)");
        assert_eq!(Type::varchar(255).sql99_name(), "CHARACTER VARYING(255)");
        assert_eq!(Type::clob().sql2008_name(), "CHARACTER LARGE OBJECT");
    }

    #[test]
    fn test_numeric_projections() {
        assert_eq!(Type::integer().sql2008_name(), "INTEGER");
        assert_eq!(Type::smallint().sql2008_name(), "SMALLINT");
        assert_eq!(Type::bigint().sql2008_name(), "BIGINT");
        assert_eq!(Type::bigint().sql99_name(), "DECIMAL(19)");
        assert_eq!(Type::decimal(12, 2).sql2008_name(), "DECIMAL(12,2)");
        assert_eq!(Type::decimal(7, 0).sql2008_name(), "DECIMAL(7)");
        assert_eq!(Type::real().sql2008_name(), "REAL");
        assert_eq!(Type::double().sql2008_name(), "DOUBLE PRECISION");
        assert_eq!(
            Type::canonical(TypeKind::NumericApproximate { precision: 30 }).sql2008_name(),
            "FLOAT(30)"
        );
    }

    #[test]
    fn test_datetime_projections() {
        assert_eq!(Type::date().sql2008_name(), "DATE");
        assert_eq!(Type::time(true).sql2008_name(), "TIME WITH TIME ZONE");
        assert_eq!(Type::timestamp(false).sql2008_name(), "TIMESTAMP");
    }

    #[test]
    fn test_binary_projections_differ_by_dialect() {
        let t = Type::binary(Some(16));
        assert_eq!(t.sql2008_name(), "BINARY VARYING(16)");
        assert_eq!(t.sql99_name(), "BIT VARYING(128)");
        assert_eq!(Type::blob().sql2008_name(), "BINARY LARGE OBJECT");
    }

    #[test]
    fn test_composed_projections() {
        let arr = Type::array(Type::integer().with_original_name("int4"));
        assert_eq!(arr.sql2008_name(), "INTEGER ARRAY");
        match arr.kind() {
            TypeKind::ComposedArray { element } => assert_eq!(element.original_name(), "INTEGER"),
            other => panic!("unexpected {:?}", other),
        }

        let row = Type::structure(vec![
            StructField::new("x", Type::double()),
            StructField::new("label", Type::varchar(20)),
        ]);
        assert_eq!(row.sql2008_name(), "ROW(x DOUBLE PRECISION, label CHARACTER VARYING(20))");

        let quoted = Type::structure(vec![
            StructField::new("Mixed Case", Type::decimal(4, 1)),
            StructField::new("say \"hi\"", Type::integer()),
        ]);
        assert_eq!(
            quoted.sql2008_name(),
            r#"ROW("Mixed Case" DECIMAL(4,1), "say ""hi""" INTEGER)"#
        );
    }

    #[test]
    fn test_original_name_kept() {
        let t = Type::varchar(40).with_original_name("nvarchar");
        assert_eq!(t.original_name(), "nvarchar");
        assert_eq!(t.sql2008_name(), "CHARACTER VARYING(40)");
        assert_eq!(Type::varchar(40).original_name(), "CHARACTER VARYING(40)");
    }

    #[test]
    fn test_unsupported_keeps_vendor_name() {
        let t = Type::unsupported("geometry");
        assert_eq!(t.sql2008_name(), "GEOMETRY");
        assert_eq!(t.original_name(), "geometry");
        assert_eq!(t.xsd_type(), XsdType::String);
        assert!(!t.is_large());
    }

    #[test]
    fn test_normalization() {
        let clob = Type::canonical(TypeKind::String {
            length: 10,
            variable: false,
            large: true,
        });
        assert_eq!(clob, Type::clob());

        let t = Type::canonical(TypeKind::DateTime {
            has_date: true,
            has_time: false,
            has_time_zone: true,
        });
        assert_eq!(t, Type::date());
    }

    #[test]
    fn test_xsd_mapping_and_large_types() {
        assert_eq!(Type::clob().xsd_type(), XsdType::Clob);
        assert_eq!(Type::binary(Some(4)).xsd_type(), XsdType::Blob);
        assert_eq!(Type::integer().xsd_type(), XsdType::Integer);
        assert_eq!(Type::decimal(10, 2).xsd_type(), XsdType::Decimal);
        assert_eq!(Type::real().xsd_type(), XsdType::Float);
        assert_eq!(Type::double().xsd_type(), XsdType::Double);
        assert_eq!(Type::timestamp(true).xsd_type(), XsdType::DateTime);
        assert_eq!(Type::time(false).xsd_type(), XsdType::Time);
        assert!(Type::clob().is_large());
        assert!(Type::blob().is_large());
        assert!(!Type::varchar(10).is_large());
        assert_eq!(Type::blob().lob_kind(), Some(LobKind::Binary));
        assert_eq!(Type::clob().lob_kind(), Some(LobKind::Character));
        assert_eq!(Type::boolean().lob_kind(), None);
    }
}
