//! Per-table schema documents.
//!
//! Every table document `tableN.xml` is accompanied by `tableN.xsd`, which
//! declares a `table` root holding `row` elements whose children `c1..cN`
//! follow the table's columns. The generated schema is also read back on
//! import to check the table document before its rows are streamed.

use std::io::{BufRead, Write};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::core::TableStructure;
use crate::dialect::XsdType;
use crate::error::Result;

use super::lob::DIGEST_TYPE;

pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

pub const TABLE_ELEMENT: &str = "table";
pub const ROW_ELEMENT: &str = "row";
pub const ROW_TYPE: &str = "recordType";

/// Violations kept per document; further ones are only counted.
pub const MAX_VIOLATIONS: usize = 100;

/// Cell element name of the 1-based column `index`.
pub fn column_element(index: usize) -> String {
    format!("c{}", index)
}

/// Column index of a cell element name, if it is one.
pub fn parse_column_element(name: &[u8]) -> Option<usize> {
    parse_indexed(name, b'c')
}

pub(crate) fn parse_indexed(name: &[u8], prefix: u8) -> Option<usize> {
    let (&first, digits) = name.split_first()?;
    if first != prefix || digits.is_empty() || digits[0] == b'0' {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// What the schema says about one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRule {
    /// 1-based.
    pub index: usize,
    pub xsd: XsdType,
    pub required: bool,
}

/// Row grammar of one table document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableSchema {
    columns: Vec<ColumnRule>,
}

/// Outcome of checking one table document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentCheck {
    pub rows: u64,
    pub violations: Vec<String>,
    /// All violations seen, including those beyond [`MAX_VIOLATIONS`].
    pub violation_count: u64,
}

impl DocumentCheck {
    pub fn is_valid(&self) -> bool {
        self.violation_count == 0
    }

    pub(crate) fn violation(&mut self, message: String) {
        self.violation_count += 1;
        if self.violations.len() < MAX_VIOLATIONS {
            self.violations.push(message);
        }
    }
}

impl TableSchema {
    pub fn for_table(table: &TableStructure) -> Self {
        Self {
            columns: table
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| ColumnRule {
                    index: i + 1,
                    xsd: c.ty.xsd_type(),
                    required: !c.nullable,
                })
                .collect(),
        }
    }

    pub fn columns(&self) -> &[ColumnRule] {
        &self.columns
    }

    /// Render the schema document for a table in `namespace`.
    pub fn to_xsd(&self, namespace: &str, pretty: bool) -> Result<Vec<u8>> {
        let mut w = if pretty {
            Writer::new_with_indent(Vec::new(), b' ', 2)
        } else {
            Writer::new(Vec::new())
        };
        w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut root = BytesStart::new("xs:schema");
        root.push_attribute(("xmlns:xs", XSD_NAMESPACE));
        root.push_attribute(("xmlns", namespace));
        root.push_attribute(("targetNamespace", namespace));
        root.push_attribute(("elementFormDefault", "qualified"));
        root.push_attribute(("attributeFormDefault", "unqualified"));
        w.write_event(Event::Start(root))?;

        start(&mut w, "xs:element", &[("name", TABLE_ELEMENT)])?;
        start(&mut w, "xs:complexType", &[])?;
        start(&mut w, "xs:sequence", &[])?;
        empty(
            &mut w,
            "xs:element",
            &[
                ("name", ROW_ELEMENT),
                ("type", ROW_TYPE),
                ("minOccurs", "0"),
                ("maxOccurs", "unbounded"),
            ],
        )?;
        end(&mut w, "xs:sequence")?;
        end(&mut w, "xs:complexType")?;
        end(&mut w, "xs:element")?;

        start(&mut w, "xs:complexType", &[("name", ROW_TYPE)])?;
        start(&mut w, "xs:sequence", &[])?;
        for column in &self.columns {
            let name = column_element(column.index);
            let mut attrs = vec![("name", name.as_str()), ("type", column.xsd.as_str())];
            if !column.required {
                attrs.push(("minOccurs", "0"));
            }
            empty(&mut w, "xs:element", &attrs)?;
        }
        end(&mut w, "xs:sequence")?;
        end(&mut w, "xs:complexType")?;

        write_lob_type(&mut w, "clobType", "xs:string")?;
        write_lob_type(&mut w, "blobType", "xs:hexBinary")?;
        for (name, base) in [
            ("dateType", "xs:date"),
            ("timeType", "xs:time"),
            ("dateTimeType", "xs:dateTime"),
        ] {
            start(&mut w, "xs:simpleType", &[("name", name)])?;
            empty(&mut w, "xs:restriction", &[("base", base)])?;
            end(&mut w, "xs:simpleType")?;
        }
        start(&mut w, "xs:simpleType", &[("name", "digestTypeType")])?;
        start(&mut w, "xs:restriction", &[("base", "xs:string")])?;
        for value in ["MD5", "SHA-1", DIGEST_TYPE] {
            empty(&mut w, "xs:enumeration", &[("value", value)])?;
        }
        end(&mut w, "xs:restriction")?;
        end(&mut w, "xs:simpleType")?;
        start(&mut w, "xs:complexType", &[("name", "composedType")])?;
        start(&mut w, "xs:sequence", &[])?;
        empty(
            &mut w,
            "xs:any",
            &[
                ("processContents", "lax"),
                ("minOccurs", "0"),
                ("maxOccurs", "unbounded"),
            ],
        )?;
        end(&mut w, "xs:sequence")?;
        end(&mut w, "xs:complexType")?;

        end(&mut w, "xs:schema")?;
        let mut bytes = w.into_inner();
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Read the row grammar back from a generated schema document.
    pub fn parse_xsd<R: BufRead>(input: R) -> Result<Self> {
        let mut reader = Reader::from_reader(input);
        let mut buf = Vec::new();
        let mut in_row_type = false;
        let mut columns = Vec::new();
        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(e) if e.local_name().as_ref() == b"complexType" => {
                    in_row_type = attribute(&e, b"name")?.as_deref() == Some(ROW_TYPE);
                }
                Event::End(e) if e.local_name().as_ref() == b"complexType" => {
                    in_row_type = false;
                }
                Event::Start(e) | Event::Empty(e)
                    if in_row_type && e.local_name().as_ref() == b"element" =>
                {
                    let name = attribute(&e, b"name")?.unwrap_or_default();
                    let Some(index) = parse_column_element(name.as_bytes()) else {
                        continue;
                    };
                    let xsd = attribute(&e, b"type")?
                        .and_then(|t| XsdType::from_name(&t))
                        .unwrap_or(XsdType::String);
                    let required = attribute(&e, b"minOccurs")?.as_deref() != Some("0");
                    columns.push(ColumnRule {
                        index,
                        xsd,
                        required,
                    });
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }
        Ok(Self { columns })
    }

    /// Check a table document against this grammar.
    ///
    /// Malformed XML ends the check with a violation rather than an error.
    pub fn check<R: BufRead>(&self, input: R) -> DocumentCheck {
        let mut check = DocumentCheck::default();
        let mut reader = Reader::from_reader(input);
        let mut buf = Vec::new();
        let mut state = CheckState::Document;
        loop {
            let event = match reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(e) => {
                    check.violation(format!(
                        "malformed XML near byte {}: {}",
                        reader.buffer_position(),
                        e
                    ));
                    break;
                }
            };
            match event {
                Event::Eof => {
                    if !matches!(state, CheckState::Done) {
                        check.violation("document ends before the table is closed".to_string());
                    }
                    break;
                }
                Event::Start(e) => {
                    state = self.on_start(state, &e, false, &mut check);
                }
                Event::Empty(e) => {
                    state = self.on_start(state, &e, true, &mut check);
                }
                Event::End(_) => {
                    state = self.on_end(state, &mut check);
                }
                Event::Text(t) => {
                    if let CheckState::Cell(cell) = &mut state {
                        match t.unescape() {
                            Ok(text) => cell.1.push(&text),
                            Err(e) => check.violation(format!("row {}: {}", check.rows, e)),
                        }
                    } else if !matches!(state, CheckState::Skip { .. })
                        && t.iter().any(|b| !b.is_ascii_whitespace())
                    {
                        check.violation(format!("unexpected text after row {}", check.rows));
                    }
                }
                Event::CData(c) => {
                    if let CheckState::Cell(cell) = &mut state {
                        cell.1.push(&String::from_utf8_lossy(&c));
                    }
                }
                _ => {}
            }
            buf.clear();
        }
        check
    }

    fn on_start(
        &self,
        state: CheckState,
        e: &BytesStart<'_>,
        is_empty: bool,
        check: &mut DocumentCheck,
    ) -> CheckState {
        let name = e.local_name();
        let name = name.as_ref();
        match state {
            CheckState::Document => {
                if name != TABLE_ELEMENT.as_bytes() {
                    check.violation(format!(
                        "root element is <{}>, expected <{}>",
                        String::from_utf8_lossy(name),
                        TABLE_ELEMENT
                    ));
                    return CheckState::Skip { depth: 0, resume: Box::new(CheckState::Done) }
                        .descend(is_empty);
                }
                if is_empty {
                    CheckState::Done
                } else {
                    CheckState::Table
                }
            }
            CheckState::Table => {
                if name != ROW_ELEMENT.as_bytes() {
                    check.violation(format!(
                        "unexpected <{}> after row {}",
                        String::from_utf8_lossy(name),
                        check.rows
                    ));
                    return CheckState::Skip { depth: 0, resume: Box::new(CheckState::Table) }
                        .descend(is_empty);
                }
                check.rows += 1;
                let row = RowCheck {
                    seen: vec![false; self.columns.len()],
                    last: 0,
                };
                if is_empty {
                    self.finish_row(&row, check);
                    CheckState::Table
                } else {
                    CheckState::Row(row)
                }
            }
            CheckState::Row(mut row) => {
                let position = parse_column_element(name)
                    .and_then(|i| self.columns.iter().position(|c| c.index == i));
                let Some(position) = position else {
                    check.violation(format!(
                        "row {}: unexpected element <{}>",
                        check.rows,
                        String::from_utf8_lossy(name)
                    ));
                    return CheckState::Skip { depth: 0, resume: Box::new(CheckState::Row(row)) }
                        .descend(is_empty);
                };
                if position + 1 <= row.last || row.seen[position] {
                    check.violation(format!(
                        "row {}: <{}> out of order",
                        check.rows,
                        String::from_utf8_lossy(name)
                    ));
                }
                row.seen[position] = true;
                row.last = row.last.max(position + 1);
                let rule = self.columns[position].clone();
                let has_file = matches!(attribute(e, b"file"), Ok(Some(_)));
                let cell = CellCheck::new(rule, has_file);
                if is_empty {
                    cell.finish(check);
                    CheckState::Row(row)
                } else {
                    CheckState::Cell(Box::new((row, cell)))
                }
            }
            CheckState::Cell(mut boxed) => {
                let (_, cell) = boxed.as_mut();
                if cell.rule.xsd != XsdType::Composed {
                    check.violation(format!(
                        "row {}: element <{}> inside simple cell c{}",
                        check.rows,
                        String::from_utf8_lossy(name),
                        cell.rule.index
                    ));
                }
                cell.nested = true;
                CheckState::Skip { depth: 0, resume: Box::new(CheckState::Cell(boxed)) }
                    .descend(is_empty)
            }
            CheckState::Skip { depth, resume } => {
                CheckState::Skip { depth, resume }.descend(is_empty)
            }
            CheckState::Done => {
                check.violation("content after the table element".to_string());
                CheckState::Skip { depth: 0, resume: Box::new(CheckState::Done) }
                    .descend(is_empty)
            }
        }
    }

    fn on_end(&self, state: CheckState, check: &mut DocumentCheck) -> CheckState {
        match state {
            CheckState::Skip { depth, resume } => {
                if depth <= 1 {
                    *resume
                } else {
                    CheckState::Skip {
                        depth: depth - 1,
                        resume,
                    }
                }
            }
            CheckState::Cell(boxed) => {
                let (row, cell) = *boxed;
                cell.finish(check);
                CheckState::Row(row)
            }
            CheckState::Row(row) => {
                self.finish_row(&row, check);
                CheckState::Table
            }
            CheckState::Table | CheckState::Document | CheckState::Done => CheckState::Done,
        }
    }

    fn finish_row(&self, row: &RowCheck, check: &mut DocumentCheck) {
        for (rule, seen) in self.columns.iter().zip(&row.seen) {
            if rule.required && !seen {
                check.violation(format!(
                    "row {}: missing required cell {}",
                    check.rows,
                    column_element(rule.index)
                ));
            }
        }
    }
}

enum CheckState {
    Document,
    Table,
    Row(RowCheck),
    Cell(Box<(RowCheck, CellCheck)>),
    /// Inside an element whose content is not checked further.
    Skip {
        depth: usize,
        resume: Box<CheckState>,
    },
    Done,
}

impl CheckState {
    fn descend(self, is_empty: bool) -> CheckState {
        match self {
            CheckState::Skip { depth, resume } if !is_empty => CheckState::Skip {
                depth: depth + 1,
                resume,
            },
            CheckState::Skip { depth: 0, resume } => *resume,
            other => other,
        }
    }
}

struct RowCheck {
    seen: Vec<bool>,
    /// Highest 1-based position seen so far.
    last: usize,
}

struct CellCheck {
    rule: ColumnRule,
    has_file: bool,
    nested: bool,
    text: String,
    hex_digits: u64,
    hex_invalid: bool,
}

impl CellCheck {
    fn new(rule: ColumnRule, has_file: bool) -> Self {
        Self {
            rule,
            has_file,
            nested: false,
            text: String::new(),
            hex_digits: 0,
            hex_invalid: false,
        }
    }

    fn push(&mut self, text: &str) {
        // Strings and inline large objects are not checked lexically.
        if self.rule.xsd == XsdType::Blob {
            for b in text.bytes().filter(|b| !b.is_ascii_whitespace()) {
                self.hex_digits += 1;
                self.hex_invalid |= !b.is_ascii_hexdigit();
            }
            return;
        }
        if !matches!(self.rule.xsd, XsdType::String | XsdType::Clob | XsdType::Composed) {
            self.text.push_str(text);
        }
    }

    fn finish(self, check: &mut DocumentCheck) {
        let value = self.text.trim();
        let row = check.rows;
        let column = column_element(self.rule.index);
        if self.has_file && !self.rule.xsd.is_large() {
            check.violation(format!(
                "row {}: {} of type {} cannot reference a file",
                row,
                column,
                self.rule.xsd.as_str()
            ));
            return;
        }
        let valid = match self.rule.xsd {
            XsdType::Blob => self.has_file || (!self.hex_invalid && self.hex_digits % 2 == 0),
            XsdType::String | XsdType::Clob | XsdType::Composed => true,
            XsdType::Integer => is_integer(value),
            XsdType::Decimal => is_decimal(value),
            XsdType::Float | XsdType::Double => is_double(value),
            XsdType::Boolean => matches!(value, "true" | "false" | "1" | "0"),
            XsdType::Date => NaiveDate::parse_from_str(strip_zone(value), "%Y-%m-%d").is_ok(),
            XsdType::Time => NaiveTime::parse_from_str(strip_zone(value), "%H:%M:%S%.f").is_ok(),
            XsdType::DateTime => {
                NaiveDateTime::parse_from_str(strip_zone(value), "%Y-%m-%dT%H:%M:%S%.f").is_ok()
            }
        };
        if !valid || (self.nested && self.rule.xsd != XsdType::Composed) {
            check.violation(format!(
                "row {}: {} is not a valid {}",
                row,
                column,
                self.rule.xsd.as_str()
            ));
        }
    }
}

fn is_integer(value: &str) -> bool {
    let digits = value.strip_prefix(['+', '-']).unwrap_or(value);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_decimal(value: &str) -> bool {
    let unsigned = value.strip_prefix(['+', '-']).unwrap_or(value);
    let (int, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    (!int.is_empty() || !frac.is_empty())
        && int.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b.is_ascii_digit())
}

fn is_double(value: &str) -> bool {
    matches!(value, "INF" | "-INF" | "+INF" | "NaN") || value.parse::<f64>().is_ok_and(|v| v.is_finite())
}

/// Remove a trailing `Z` or `±hh:mm` zone designator.
fn strip_zone(value: &str) -> &str {
    if let Some(rest) = value.strip_suffix('Z') {
        return rest;
    }
    let bytes = value.as_bytes();
    let n = bytes.len();
    if n > 6 && matches!(bytes[n - 6], b'+' | b'-') && bytes[n - 3] == b':' {
        return &value[..n - 6];
    }
    value
}

fn start<W: Write>(w: &mut Writer<W>, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    let mut e = BytesStart::new(name);
    for &attr in attrs {
        e.push_attribute(attr);
    }
    w.write_event(Event::Start(e))?;
    Ok(())
}

fn empty<W: Write>(w: &mut Writer<W>, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    let mut e = BytesStart::new(name);
    for &attr in attrs {
        e.push_attribute(attr);
    }
    w.write_event(Event::Empty(e))?;
    Ok(())
}

fn end<W: Write>(w: &mut Writer<W>, name: &str) -> Result<()> {
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_lob_type<W: Write>(w: &mut Writer<W>, name: &str, base: &str) -> Result<()> {
    start(w, "xs:complexType", &[("name", name)])?;
    start(w, "xs:simpleContent", &[])?;
    start(w, "xs:extension", &[("base", base)])?;
    for (attr, ty) in [
        ("file", "xs:string"),
        ("length", "xs:integer"),
        ("digestType", "digestTypeType"),
        ("digest", "xs:string"),
    ] {
        empty(w, "xs:attribute", &[("name", attr), ("type", ty)])?;
    }
    end(w, "xs:extension")?;
    end(w, "xs:simpleContent")?;
    end(w, "xs:complexType")?;
    Ok(())
}

/// Value of the attribute with local name `name`.
pub(crate) fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.local_name().as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
