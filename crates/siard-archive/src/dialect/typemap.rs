//! Vendor descriptor → canonical type import.
//!
//! Connectivity code reports each column as a [`TypeDescriptor`] (name,
//! declared size, decimal digits, radix and a [`VendorKind`] discriminator).
//! [`TypeImporter`] turns it into exactly one [`Type`]. Every widening,
//! defaulting or unsupported mapping is recorded on the [`Reporter`]; the
//! importer never aborts a migration over a type.

use tracing::debug;

use super::canonical::{StructField, Type, TypeKind, MAX_STRING_LENGTH};
use crate::report::{ConditionKind, Reporter};

/// Precision used for exact numerics declared without one.
pub const DEFAULT_DECIMAL_PRECISION: u32 = 38;

/// Precision used for approximate numerics declared without one.
pub const DEFAULT_FLOAT_PRECISION: u32 = 53;

/// Vendor-neutral discriminator of a reported column type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VendorKind {
    Char,
    NChar,
    Varchar,
    NVarchar,
    LongVarchar,
    LongNVarchar,
    Clob,
    Binary,
    Varbinary,
    LongVarbinary,
    Blob,
    Bit,
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Numeric,
    Real,
    Float,
    Double,
    Date,
    Time,
    TimeWithTimeZone,
    Timestamp,
    TimestampWithTimeZone,
    /// Array of the described element.
    Array(Box<TypeDescriptor>),
    /// Structured type with named, described fields.
    Struct(Vec<(String, TypeDescriptor)>),
    /// Anything the connectivity layer could not classify.
    Other,
}

/// A column type as reported by the source database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDescriptor {
    /// Vendor type name, e.g. `nvarchar` or `int4`.
    pub name: String,
    /// Declared size (length for character/binary, precision for numerics).
    pub size: Option<u32>,
    /// Declared decimal digits (scale).
    pub decimal_digits: Option<u32>,
    /// Radix of `size` for numerics (2 or 10).
    pub radix: Option<u32>,
    pub kind: VendorKind,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>, kind: VendorKind) -> Self {
        Self {
            name: name.into(),
            size: None,
            decimal_digits: None,
            radix: None,
            kind,
        }
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_decimal_digits(mut self, digits: u32) -> Self {
        self.decimal_digits = Some(digits);
        self
    }

    pub fn with_radix(mut self, radix: u32) -> Self {
        self.radix = Some(radix);
        self
    }
}

/// Result of importing one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedType {
    pub ty: Type,
    /// Set when the import was not faithful.
    pub fallback: Option<(ConditionKind, String)>,
}

impl ImportedType {
    /// Create a faithful import.
    pub fn lossless(ty: Type) -> Self {
        Self { ty, fallback: None }
    }

    /// Create an import that changed or defaulted something.
    pub fn lossy(ty: Type, kind: ConditionKind, message: impl Into<String>) -> Self {
        Self {
            ty,
            fallback: Some((kind, message.into())),
        }
    }

    pub fn is_lossless(&self) -> bool {
        self.fallback.is_none()
    }
}

/// Turns vendor descriptors into canonical types.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeImporter;

impl TypeImporter {
    /// Import `descriptor` for the column at `location`, reporting any
    /// fallback exactly once.
    pub fn import(&self, descriptor: &TypeDescriptor, location: &str, reporter: &mut Reporter) -> Type {
        let imported = self.map(descriptor);
        if let Some((kind, message)) = &imported.fallback {
            reporter.report(*kind, location, message.clone());
        } else {
            debug!("{}: {} -> {}", location, descriptor.name, imported.ty);
        }
        imported.ty
    }

    /// Pure mapping, without reporting.
    pub fn map(&self, d: &TypeDescriptor) -> ImportedType {
        let name = d.name.as_str();
        match &d.kind {
            VendorKind::Char | VendorKind::NChar => self.sized_string(d, false),
            VendorKind::Varchar | VendorKind::NVarchar => self.sized_string(d, true),
            VendorKind::LongVarchar | VendorKind::LongNVarchar | VendorKind::Clob => {
                ImportedType::lossless(Type::clob().with_original_name(name))
            }
            VendorKind::Binary | VendorKind::Varbinary => match d.size {
                Some(0) => ImportedType::lossy(
                    Type::binary(Some(1)).with_original_name(name),
                    ConditionKind::DataTypeChangedOnImport,
                    format!("{} declared with length 0, widened to 1", name),
                ),
                Some(n) => ImportedType::lossless(Type::binary(Some(n)).with_original_name(name)),
                None => ImportedType::lossless(Type::blob().with_original_name(name)),
            },
            VendorKind::LongVarbinary | VendorKind::Blob => {
                ImportedType::lossless(Type::blob().with_original_name(name))
            }
            VendorKind::Bit => match d.size {
                Some(n) if n > 1 => {
                    ImportedType::lossless(Type::binary(Some(n.div_ceil(8))).with_original_name(name))
                }
                _ => ImportedType::lossless(Type::boolean().with_original_name(name)),
            },
            VendorKind::Boolean => ImportedType::lossless(Type::boolean().with_original_name(name)),
            VendorKind::TinyInt | VendorKind::SmallInt => {
                ImportedType::lossless(Type::smallint().with_original_name(name))
            }
            VendorKind::Integer => ImportedType::lossless(Type::integer().with_original_name(name)),
            VendorKind::BigInt => ImportedType::lossless(Type::bigint().with_original_name(name)),
            VendorKind::Decimal | VendorKind::Numeric => self.exact_numeric(d),
            VendorKind::Real => ImportedType::lossless(Type::real().with_original_name(name)),
            VendorKind::Double => ImportedType::lossless(Type::double().with_original_name(name)),
            VendorKind::Float => self.float(d),
            VendorKind::Date => ImportedType::lossless(Type::date().with_original_name(name)),
            VendorKind::Time => ImportedType::lossless(Type::time(false).with_original_name(name)),
            VendorKind::TimeWithTimeZone => {
                ImportedType::lossless(Type::time(true).with_original_name(name))
            }
            VendorKind::Timestamp => {
                ImportedType::lossless(Type::timestamp(false).with_original_name(name))
            }
            VendorKind::TimestampWithTimeZone => {
                ImportedType::lossless(Type::timestamp(true).with_original_name(name))
            }
            VendorKind::Array(element) => {
                let inner = self.map(element);
                let ty = Type::array(inner.ty).with_original_name(name);
                match inner.fallback {
                    None => ImportedType::lossless(ty),
                    Some((kind, message)) => {
                        ImportedType::lossy(ty, kind, format!("array element: {}", message))
                    }
                }
            }
            VendorKind::Struct(fields) if fields.is_empty() => self.unsupported(d),
            VendorKind::Struct(fields) => {
                let mut messages = Vec::new();
                let mut kind = None;
                let mapped = fields
                    .iter()
                    .map(|(field, descriptor)| {
                        let inner = self.map(descriptor);
                        if let Some((k, m)) = inner.fallback {
                            kind.get_or_insert(k);
                            messages.push(format!("{}: {}", field, m));
                        }
                        StructField::new(field.clone(), inner.ty)
                    })
                    .collect();
                let ty = Type::structure(mapped).with_original_name(name);
                match kind {
                    None => ImportedType::lossless(ty),
                    Some(k) => ImportedType::lossy(ty, k, messages.join("; ")),
                }
            }
            VendorKind::Other => self.unsupported(d),
        }
    }

    fn sized_string(&self, d: &TypeDescriptor, variable: bool) -> ImportedType {
        let kind = |length| TypeKind::String {
            length,
            variable,
            large: false,
        };
        match d.size {
            Some(0) => ImportedType::lossy(
                Type::new(kind(1), &d.name),
                ConditionKind::DataTypeChangedOnImport,
                format!("{} declared with length 0, widened to 1", d.name),
            ),
            Some(n) => ImportedType::lossless(Type::new(kind(n), &d.name)),
            None if variable => ImportedType::lossy(
                Type::new(kind(MAX_STRING_LENGTH), &d.name),
                ConditionKind::DataTypeChangedOnImport,
                format!("{} has no declared length, using {}", d.name, MAX_STRING_LENGTH),
            ),
            None => ImportedType::lossy(
                Type::new(kind(1), &d.name),
                ConditionKind::DataTypeChangedOnImport,
                format!("{} has no declared length, using 1", d.name),
            ),
        }
    }

    fn exact_numeric(&self, d: &TypeDescriptor) -> ImportedType {
        let scale = d.decimal_digits.unwrap_or(0);
        match d.size.filter(|p| *p > 0) {
            Some(raw) => {
                let precision = if d.radix == Some(2) {
                    binary_to_decimal_digits(raw)
                } else {
                    raw
                };
                ImportedType::lossless(
                    Type::new(TypeKind::NumericExact { precision, scale }, &d.name),
                )
            }
            None => ImportedType::lossy(
                Type::new(
                    TypeKind::NumericExact {
                        precision: DEFAULT_DECIMAL_PRECISION,
                        scale,
                    },
                    &d.name,
                ),
                ConditionKind::DataTypeChangedOnImport,
                format!(
                    "{} has no declared precision, using {}",
                    d.name, DEFAULT_DECIMAL_PRECISION
                ),
            ),
        }
    }

    fn float(&self, d: &TypeDescriptor) -> ImportedType {
        match d.size.filter(|p| *p > 0) {
            Some(raw) => {
                let precision = if d.radix == Some(10) {
                    decimal_to_binary_digits(raw)
                } else {
                    raw
                };
                let ty = Type::new(TypeKind::NumericApproximate { precision }, &d.name);
                if precision > DEFAULT_FLOAT_PRECISION {
                    ImportedType::lossy(
                        ty,
                        ConditionKind::DataTypeChangedOnImport,
                        format!("{} precision {} capped at 53", d.name, precision),
                    )
                } else {
                    ImportedType::lossless(ty)
                }
            }
            None => ImportedType::lossy(
                Type::new(
                    TypeKind::NumericApproximate {
                        precision: DEFAULT_FLOAT_PRECISION,
                    },
                    &d.name,
                ),
                ConditionKind::DataTypeChangedOnImport,
                format!(
                    "{} has no declared precision, using {}",
                    d.name, DEFAULT_FLOAT_PRECISION
                ),
            ),
        }
    }

    fn unsupported(&self, d: &TypeDescriptor) -> ImportedType {
        let name = if d.name.trim().is_empty() {
            "UNKNOWN"
        } else {
            d.name.as_str()
        };
        ImportedType::lossy(
            Type::unsupported(name),
            ConditionKind::SavedAsString,
            format!("type {} is not supported, values are stored as text", name),
        )
    }
}

/// Decimal digits needed to hold `bits` binary digits.
fn binary_to_decimal_digits(bits: u32) -> u32 {
    ((f64::from(bits) * std::f64::consts::LOG10_2).ceil() as u32).max(1)
}

/// Binary digits needed to hold `digits` decimal digits.
fn decimal_to_binary_digits(digits: u32) -> u32 {
    ((f64::from(digits) / std::f64::consts::LOG10_2).ceil() as u32).max(1)
}
