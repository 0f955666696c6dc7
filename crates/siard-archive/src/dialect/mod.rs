//! Canonical type system and its dialect projections.
//!
//! - [`canonical`]: the closed [`Type`] model and its SQL:1999 / SQL:2008
//!   name projections
//! - [`typemap`]: vendor descriptor import
//! - [`sqlname`]: parsing canonical names back into types

pub mod canonical;
pub mod sqlname;
pub mod typemap;

pub use canonical::{StructField, Type, TypeKind, XsdType, MAX_STRING_LENGTH};
pub use sqlname::parse_type_name;
pub use typemap::{ImportedType, TypeDescriptor, TypeImporter, VendorKind};
