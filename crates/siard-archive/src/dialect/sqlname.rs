//! SQL-standard type name parser.
//!
//! Rebuilds a [`TypeKind`] from a canonical name read back from a metadata
//! document, e.g. `DECIMAL(12,2)`, `TIMESTAMP WITH TIME ZONE`,
//! `CHARACTER VARYING(40) CHARACTER SET UTF8`, `INTEGER ARRAY[10]` or
//! `ROW(x DOUBLE PRECISION, "Unit Price" VARCHAR(20))`. Common
//! abbreviations (`VARCHAR`, `CLOB`, `BLOB`, `INT`, `NUMERIC`, ...) are
//! accepted.

use super::canonical::{StructField, Type, TypeKind, MAX_STRING_LENGTH};
use crate::error::{ArchiveError, Result};

/// Parse a canonical SQL type name.
pub fn parse_type_name(name: &str) -> Result<TypeKind> {
    let normalized = normalize(name);
    if normalized.is_empty() {
        return Err(ArchiveError::Type("empty type name".into()));
    }
    parse_normalized(&normalized)
        .ok_or_else(|| ArchiveError::Type(format!("unrecognized type name '{}'", name.trim())))
}

/// Collapse whitespace runs to one space, except inside `"..."`.
fn normalize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut quoted = false;
    let mut space = false;
    for c in name.trim().chars() {
        if quoted {
            quoted = c != '"';
            out.push(c);
            continue;
        }
        if c.is_whitespace() {
            space = true;
            continue;
        }
        if space {
            out.push(' ');
            space = false;
        }
        quoted = c == '"';
        out.push(c);
    }
    out
}

/// Parse a whitespace-normalized name. Case is kept so structure field
/// names survive; keywords are matched case-insensitively.
fn parse_normalized(name: &str) -> Option<TypeKind> {
    let is_row = name
        .get(..4)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("ROW("));
    if is_row && name.ends_with(')') {
        return parse_row(&name[4..name.len() - 1]);
    }

    if let Some(element) = strip_array_suffix(name) {
        let element = parse_normalized(element)?;
        return Some(TypeKind::ComposedArray {
            element: Box::new(Type::canonical(element)),
        });
    }

    let upper = name.to_uppercase();
    let (base, args, rest) = split_arguments(strip_clauses(&upper))?;
    let rest_tz = match rest.trim() {
        "" | "WITHOUT TIME ZONE" => false,
        "WITH TIME ZONE" => true,
        _ => return None,
    };
    let base = base.trim();
    let (base, with_tz) = if let Some(b) = base.strip_suffix(" WITH TIME ZONE") {
        (b.trim(), true)
    } else if let Some(b) = base.strip_suffix(" WITHOUT TIME ZONE") {
        (b.trim(), rest_tz)
    } else {
        (base, rest_tz)
    };

    let first = args.first().copied();
    let second = args.get(1).copied();

    let kind = match base {
        "CHARACTER" | "CHAR" | "NATIONAL CHARACTER" | "NCHAR" => TypeKind::String {
            length: first.unwrap_or(1),
            variable: false,
            large: false,
        },
        "CHARACTER VARYING" | "CHAR VARYING" | "VARCHAR" | "NATIONAL CHARACTER VARYING"
        | "NCHAR VARYING" | "NVARCHAR" => TypeKind::String {
            length: first.unwrap_or(MAX_STRING_LENGTH),
            variable: true,
            large: false,
        },
        "CHARACTER LARGE OBJECT" | "CLOB" | "NATIONAL CHARACTER LARGE OBJECT" | "NCLOB" => {
            TypeKind::String {
                length: MAX_STRING_LENGTH,
                variable: true,
                large: true,
            }
        }
        "SMALLINT" => TypeKind::NumericExact {
            precision: 5,
            scale: 0,
        },
        "INTEGER" | "INT" => TypeKind::NumericExact {
            precision: 10,
            scale: 0,
        },
        "BIGINT" => TypeKind::NumericExact {
            precision: 19,
            scale: 0,
        },
        "DECIMAL" | "DEC" | "NUMERIC" => TypeKind::NumericExact {
            precision: first.unwrap_or(super::typemap::DEFAULT_DECIMAL_PRECISION),
            scale: second.unwrap_or(0),
        },
        "REAL" => TypeKind::NumericApproximate { precision: 24 },
        "DOUBLE PRECISION" | "DOUBLE" => TypeKind::NumericApproximate { precision: 53 },
        "FLOAT" => TypeKind::NumericApproximate {
            precision: first.unwrap_or(53),
        },
        "BOOLEAN" => TypeKind::Boolean,
        "DATE" => TypeKind::DateTime {
            has_date: true,
            has_time: false,
            has_time_zone: false,
        },
        "TIME" => TypeKind::DateTime {
            has_date: false,
            has_time: true,
            has_time_zone: with_tz,
        },
        "TIMESTAMP" => TypeKind::DateTime {
            has_date: true,
            has_time: true,
            has_time_zone: with_tz,
        },
        "BINARY LARGE OBJECT" | "BLOB" => TypeKind::Binary { length: None },
        "BINARY VARYING" | "VARBINARY" | "BINARY" => TypeKind::Binary { length: first },
        "BIT VARYING" | "BIT" => TypeKind::Binary {
            length: first.map(|bits| bits.div_ceil(8)),
        },
        _ => return None,
    };

    // Time zone clauses only make sense on time-bearing types.
    if with_tz && !matches!(kind, TypeKind::DateTime { has_time: true, .. }) {
        return None;
    }
    Some(kind)
}

/// `<element> ARRAY` or `<element> ARRAY[n]`.
fn strip_array_suffix(name: &str) -> Option<&str> {
    if let Some(element) = strip_suffix_ignore_case(name, " ARRAY") {
        return Some(element);
    }
    let open = name.rfind('[')?;
    let digits = name[open + 1..].strip_suffix(']')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    strip_suffix_ignore_case(&name[..open], " ARRAY")
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let cut = s.len().checked_sub(suffix.len())?;
    let tail = s.get(cut..)?;
    if cut > 0 && tail.eq_ignore_ascii_case(suffix) {
        Some(&s[..cut])
    } else {
        None
    }
}

/// Drop `CHARACTER SET x` and `COLLATE y` clauses.
fn strip_clauses(name: &str) -> &str {
    let mut end = name.len();
    for clause in [" CHARACTER SET ", " COLLATE "] {
        if let Some(pos) = name.find(clause) {
            end = end.min(pos);
        }
    }
    &name[..end]
}

/// Split `BASE(a,b) REST` into its parts. Names without arguments return
/// an empty argument list and the whole name as base.
fn split_arguments(name: &str) -> Option<(&str, Vec<u32>, &str)> {
    let Some(open) = name.find('(') else {
        return Some((name, Vec::new(), ""));
    };
    let close = name[open..].find(')')? + open;
    let args = name[open + 1..close]
        .split(',')
        .map(|a| a.trim().parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    Some((&name[..open], args, &name[close + 1..]))
}

fn parse_row(inner: &str) -> Option<TypeKind> {
    let mut fields = Vec::new();
    for part in split_top_level(inner) {
        let (name, ty) = split_field(part.trim())?;
        let kind = parse_normalized(ty.trim())?;
        fields.push(StructField::new(name, Type::canonical(kind)));
    }
    if fields.is_empty() {
        return None;
    }
    Some(TypeKind::ComposedStructure { fields })
}

/// Split `name type` where the name may be a delimited identifier.
fn split_field(part: &str) -> Option<(String, &str)> {
    let Some(rest) = part.strip_prefix('"') else {
        let (name, ty) = part.split_once(' ')?;
        return Some((name.to_string(), ty));
    };
    let mut name = String::new();
    let mut chars = rest.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '"' {
            name.push(c);
        } else if chars.next_if(|&(_, c)| c == '"').is_some() {
            name.push('"');
        } else {
            return Some((name, &rest[i + 1..]));
        }
    }
    None
}

fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in s.char_indices() {
        if c == '"' {
            quoted = !quoted;
            continue;
        }
        if quoted {
            continue;
        }
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}
