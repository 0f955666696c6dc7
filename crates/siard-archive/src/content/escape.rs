//! Text encoding for cell values.
//!
//! XML cannot carry most control characters, and parsers collapse or trim
//! whitespace. Before entity escaping, cell text is therefore encoded:
//!
//! - `\` and the characters U+0000–U+0008, U+000B, U+000C, U+000E–U+001F,
//!   U+007F–U+009F, U+FFFE and U+FFFF become `\uXXXX`
//! - in a run of two or more spaces every space becomes `\u0020`
//!
//! [`decode`] reverses this. Malformed escapes are kept verbatim.

/// Encode cell text for a content document.
pub fn encode(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == ' ' {
            let run = chars[i..].iter().take_while(|&&ch| ch == ' ').count();
            if run >= 2 {
                for _ in 0..run {
                    out.push_str("\\u0020");
                }
            } else {
                out.push(' ');
            }
            i += run;
            continue;
        }
        if needs_escape(c) {
            out.push_str(&format!("\\u{:04X}", c as u32));
        } else {
            out.push(c);
        }
        i += 1;
    }
    out
}

/// Reverse [`encode`].
pub fn decode(text: &str) -> String {
    if !text.contains('\\') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('\\') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        match parse_escape(tail) {
            Some(c) => {
                out.push(c);
                rest = &tail[6..];
            }
            None => {
                out.push('\\');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn needs_escape(c: char) -> bool {
    matches!(c,
        '\\'
        | '\u{0}'..='\u{8}'
        | '\u{B}'
        | '\u{C}'
        | '\u{E}'..='\u{1F}'
        | '\u{7F}'..='\u{9F}'
        | '\u{FFFE}'
        | '\u{FFFF}')
}

/// `\uXXXX` at the start of `s`.
fn parse_escape(s: &str) -> Option<char> {
    let hex = s.strip_prefix("\\u")?.get(..4)?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let code = u32::from_str_radix(hex, 16).ok()?;
    char::from_u32(code)
}
