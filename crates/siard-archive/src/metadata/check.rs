//! Structural check of the metadata document.
//!
//! Walks parser events against a static element grammar: which children an
//! element may have, in which order, and which are required. Column and
//! parameter types must be readable SQL:2008 names, or the upper-cased
//! original name of a type stored as text.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::archive::FormatVersion;
use crate::content::{schema::attribute, DocumentCheck};
use crate::dialect::sqlname::parse_type_name;

use super::document::ROOT_ELEMENT;

struct Rule {
    children: &'static [Child],
    /// Validate captured `type`/`typeOriginal` children on close.
    typed: bool,
}

struct Child {
    name: &'static str,
    required: bool,
    rule: Option<&'static Rule>,
}

const fn leaf(name: &'static str, required: bool) -> Child {
    Child {
        name,
        required,
        rule: None,
    }
}

const fn node(name: &'static str, required: bool, rule: &'static Rule) -> Child {
    Child {
        name,
        required,
        rule: Some(rule),
    }
}

static ARCHIVE: Rule = Rule {
    children: &[
        leaf("dbname", true),
        leaf("description", false),
        leaf("archiver", false),
        leaf("archiverContact", false),
        leaf("dataOwner", true),
        leaf("dataOriginTimespan", true),
        leaf("producerApplication", false),
        leaf("archivalDate", true),
        leaf("databaseProduct", false),
        leaf("connection", false),
        leaf("databaseUser", false),
        node("schemas", true, &SCHEMAS),
        node("users", false, &USERS),
    ],
    typed: false,
};
static SCHEMAS: Rule = Rule {
    children: &[node("schema", false, &SCHEMA)],
    typed: false,
};
static SCHEMA: Rule = Rule {
    children: &[
        leaf("name", true),
        leaf("folder", true),
        leaf("description", false),
        node("tables", false, &TABLES),
        node("views", false, &VIEWS),
        node("routines", false, &ROUTINES),
    ],
    typed: false,
};
static TABLES: Rule = Rule {
    children: &[node("table", false, &TABLE)],
    typed: false,
};
static TABLE: Rule = Rule {
    children: &[
        leaf("name", true),
        leaf("folder", true),
        leaf("description", false),
        node("columns", true, &COLUMNS),
        node("primaryKey", false, &KEY),
        node("foreignKeys", false, &FOREIGN_KEYS),
        node("candidateKeys", false, &CANDIDATE_KEYS),
        node("checkConstraints", false, &CHECKS),
        node("triggers", false, &TRIGGERS),
        leaf("rows", true),
    ],
    typed: false,
};
static COLUMNS: Rule = Rule {
    children: &[node("column", true, &COLUMN)],
    typed: false,
};
static COLUMN: Rule = Rule {
    children: &[
        leaf("name", true),
        leaf("lobFolder", false),
        leaf("type", true),
        leaf("typeOriginal", false),
        leaf("nullable", false),
        leaf("defaultValue", false),
        leaf("description", false),
    ],
    typed: true,
};
static KEY: Rule = Rule {
    children: &[
        leaf("name", true),
        leaf("column", true),
        leaf("description", false),
    ],
    typed: false,
};
static FOREIGN_KEYS: Rule = Rule {
    children: &[node("foreignKey", false, &FOREIGN_KEY)],
    typed: false,
};
static FOREIGN_KEY: Rule = Rule {
    children: &[
        leaf("name", true),
        leaf("referencedSchema", true),
        leaf("referencedTable", true),
        node("reference", true, &REFERENCE),
        leaf("matchType", false),
        leaf("deleteAction", false),
        leaf("updateAction", false),
        leaf("description", false),
    ],
    typed: false,
};
static REFERENCE: Rule = Rule {
    children: &[leaf("column", true), leaf("referenced", true)],
    typed: false,
};
static CANDIDATE_KEYS: Rule = Rule {
    children: &[node("candidateKey", false, &KEY)],
    typed: false,
};
static CHECKS: Rule = Rule {
    children: &[node("checkConstraint", false, &CHECK)],
    typed: false,
};
static CHECK: Rule = Rule {
    children: &[
        leaf("name", true),
        leaf("condition", false),
        leaf("description", false),
    ],
    typed: false,
};
static TRIGGERS: Rule = Rule {
    children: &[node("trigger", false, &TRIGGER)],
    typed: false,
};
static TRIGGER: Rule = Rule {
    children: &[
        leaf("name", true),
        leaf("actionTime", true),
        leaf("triggerEvent", true),
        leaf("aliasList", false),
        leaf("triggeredAction", true),
        leaf("description", false),
    ],
    typed: false,
};
static VIEWS: Rule = Rule {
    children: &[node("view", false, &VIEW)],
    typed: false,
};
static VIEW: Rule = Rule {
    children: &[
        leaf("name", true),
        leaf("query", false),
        leaf("queryOriginal", false),
        leaf("description", false),
        node("columns", false, &COLUMNS),
    ],
    typed: false,
};
static ROUTINES: Rule = Rule {
    children: &[node("routine", false, &ROUTINE)],
    typed: false,
};
static ROUTINE: Rule = Rule {
    children: &[
        leaf("name", true),
        leaf("description", false),
        leaf("source", false),
        leaf("body", false),
        leaf("characteristic", false),
        leaf("returnType", false),
        node("parameters", false, &PARAMETERS),
    ],
    typed: false,
};
static PARAMETERS: Rule = Rule {
    children: &[node("parameter", false, &PARAMETER)],
    typed: false,
};
static PARAMETER: Rule = Rule {
    children: &[
        leaf("name", true),
        leaf("mode", true),
        leaf("type", true),
        leaf("typeOriginal", false),
        leaf("description", false),
    ],
    typed: true,
};
static USERS: Rule = Rule {
    children: &[node("user", false, &USER)],
    typed: false,
};
static USER: Rule = Rule {
    children: &[leaf("name", true), leaf("description", false)],
    typed: false,
};

struct Frame {
    name: String,
    rule: Option<&'static Rule>,
    /// Position of the last child seen, in rule order.
    last: usize,
    seen: Vec<bool>,
    text: String,
    type_name: Option<String>,
    type_original: Option<String>,
}

impl Frame {
    fn new(name: String, rule: Option<&'static Rule>) -> Self {
        Self {
            seen: vec![false; rule.map_or(0, |r| r.children.len())],
            name,
            rule,
            last: 0,
            text: String::new(),
            type_name: None,
            type_original: None,
        }
    }
}

/// Check a metadata document.
///
/// `expected` is the generation the package declares through its version
/// folder, when known.
pub fn check_metadata(document: &[u8], expected: Option<FormatVersion>) -> DocumentCheck {
    let mut check = DocumentCheck::default();
    let mut reader = Reader::from_reader(document);
    let mut buf = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut root_seen = false;
    // Elements under an unknown element are not checked.
    let mut skip = 0usize;

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                check.violation(format!(
                    "malformed XML near byte {}: {}",
                    reader.buffer_position(),
                    e
                ));
                return check;
            }
        };
        let (e, is_empty) = match event {
            Event::Start(e) => (e, false),
            Event::Empty(e) => (e, true),
            Event::End(_) => {
                if skip > 0 {
                    skip -= 1;
                } else if let Some(frame) = stack.pop() {
                    close(frame, &mut stack, &mut check);
                }
                buf.clear();
                continue;
            }
            Event::Text(t) => {
                if skip == 0 {
                    if let Some(frame) = stack.last_mut() {
                        match t.unescape() {
                            Ok(text) => frame.text.push_str(&text),
                            Err(e) => check.violation(format!("in <{}>: {}", frame.name, e)),
                        }
                    }
                }
                buf.clear();
                continue;
            }
            Event::Eof => break,
            _ => {
                buf.clear();
                continue;
            }
        };
        let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();

        if skip > 0 {
            if !is_empty {
                skip += 1;
            }
        } else if let Some(parent) = stack.last_mut() {
            match child_rule(parent, &name, &mut check) {
                Some(rule) => {
                    let frame = Frame::new(name, rule);
                    if is_empty {
                        close(frame, &mut stack, &mut check);
                    } else {
                        stack.push(frame);
                    }
                }
                None if !is_empty => skip = 1,
                None => {}
            }
        } else if root_seen {
            check.violation(format!("<{}> after the root element", name));
            if !is_empty {
                skip = 1;
            }
        } else {
            root_seen = true;
            if name != ROOT_ELEMENT {
                check.violation(format!(
                    "root element is <{}>, expected <{}>",
                    name, ROOT_ELEMENT
                ));
                if !is_empty {
                    skip = 1;
                }
            } else {
                match attribute(&e, b"version") {
                    Ok(Some(v)) => match v.parse::<FormatVersion>() {
                        Ok(version) if expected.is_some_and(|x| x != version) => {
                            check.violation(format!(
                                "document version {} differs from package version {}",
                                version,
                                expected.map(|x| x.to_string()).unwrap_or_default()
                            ))
                        }
                        Ok(_) => {}
                        Err(_) => check.violation(format!("unknown version {:?}", v)),
                    },
                    Ok(None) => check.violation("missing version attribute".to_string()),
                    Err(e) => check.violation(format!("unreadable version attribute: {}", e)),
                }
                let frame = Frame::new(name, Some(&ARCHIVE));
                if is_empty {
                    close(frame, &mut stack, &mut check);
                } else {
                    stack.push(frame);
                }
            }
        }
        buf.clear();
    }

    if !root_seen {
        check.violation("document has no root element".to_string());
    } else if !stack.is_empty() {
        check.violation("document ends inside an element".to_string());
    }
    check
}

/// Record `name` as a child of `parent`, returning the child's own rule.
/// `None` means the element is not allowed there.
#[allow(clippy::option_option)]
fn child_rule(
    parent: &mut Frame,
    name: &str,
    check: &mut DocumentCheck,
) -> Option<Option<&'static Rule>> {
    let Some(rule) = parent.rule else {
        check.violation(format!("<{}> inside text element <{}>", name, parent.name));
        return None;
    };
    let Some(position) = rule.children.iter().position(|c| c.name == name) else {
        check.violation(format!("unexpected <{}> in <{}>", name, parent.name));
        return None;
    };
    if position < parent.last {
        check.violation(format!("<{}> out of order in <{}>", name, parent.name));
    }
    parent.last = parent.last.max(position);
    parent.seen[position] = true;
    Some(rule.children[position].rule)
}

fn close(frame: Frame, stack: &mut [Frame], check: &mut DocumentCheck) {
    if let Some(rule) = frame.rule {
        for (child, seen) in rule.children.iter().zip(&frame.seen) {
            if child.required && !seen {
                check.violation(format!(
                    "<{}> is missing required <{}>",
                    frame.name, child.name
                ));
            }
        }
        if rule.typed {
            check_type(&frame, check);
        }
        return;
    }
    if let Some(parent) = stack.last_mut() {
        match frame.name.as_str() {
            "type" => parent.type_name = Some(frame.text),
            "typeOriginal" => parent.type_original = Some(frame.text),
            _ => {}
        }
    }
}

fn check_type(frame: &Frame, check: &mut DocumentCheck) {
    let Some(name) = frame.type_name.as_deref() else {
        return;
    };
    if parse_type_name(name).is_ok() {
        return;
    }
    let stored_as_text = frame
        .type_original
        .as_deref()
        .is_some_and(|original| original.trim().to_uppercase() == name.trim());
    if !stored_as_text {
        check.violation(format!("<{}> has unknown type {:?}", frame.name, name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<siardArchive xmlns="http://www.bar.admin.ch/xmlns/siard/2/metadata.xsd" version="2.2">
  <dbname>shop</dbname>
  <dataOwner>owner</dataOwner>
  <dataOriginTimespan>2020</dataOriginTimespan>
  <archivalDate>2024-05-01</archivalDate>
  <schemas>
    <schema>
      <name>app</name>
      <folder>schema1</folder>
      <tables>
        <table>
          <name>items</name>
          <folder>table1</folder>
          <columns>
            <column><name>id</name><type>INTEGER</type><nullable>false</nullable></column>
            <column><name>geo</name><type>GEOMETRY</type><typeOriginal>geometry</typeOriginal></column>
          </columns>
          <primaryKey><name>pk</name><column>id</column></primaryKey>
          <rows>3</rows>
        </table>
      </tables>
    </schema>
  </schemas>
</siardArchive>"#;

    #[test]
    fn test_valid_document() {
        let check = check_metadata(VALID.as_bytes(), Some(FormatVersion::V2_2));
        assert!(check.is_valid(), "{:?}", check.violations);
    }

    #[test]
    fn test_version_mismatch() {
        let check = check_metadata(VALID.as_bytes(), Some(FormatVersion::V2_1));
        assert_eq!(check.violation_count, 1);
        assert!(check.violations[0].contains("differs"));
    }

    #[test]
    fn test_missing_required_element() {
        let doc = VALID.replace("<rows>3</rows>", "");
        let check = check_metadata(doc.as_bytes(), None);
        assert_eq!(check.violation_count, 1);
        assert!(check.violations[0].contains("missing required <rows>"));
    }

    #[test]
    fn test_out_of_order() {
        let doc = VALID.replace(
            "<dbname>shop</dbname>\n  <dataOwner>owner</dataOwner>",
            "<dataOwner>owner</dataOwner>\n  <dbname>shop</dbname>",
        );
        let check = check_metadata(doc.as_bytes(), None);
        assert!(check.violations.iter().any(|v| v.contains("out of order")));
    }

    #[test]
    fn test_unknown_type_and_element() {
        let doc = VALID
            .replace("<type>INTEGER</type>", "<type>INTEGRAL</type>")
            .replace("<rows>3</rows>", "<rows>3</rows><extra/>");
        let check = check_metadata(doc.as_bytes(), None);
        assert_eq!(check.violation_count, 2);
    }

    #[test]
    fn test_wrong_root_and_garbage() {
        assert!(!check_metadata(b"<archive version=\"2.2\"/>", None).is_valid());
        assert!(!check_metadata(b"not xml at all", None).is_valid());
        assert!(!check_metadata(b"<siardArchive version=\"2.2\"><dbname>", None).is_valid());
    }
}
