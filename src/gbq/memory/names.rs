//! Table names in memory queries
//!
//! Polars SQL resolves a relation by its first identifier only, so qualified
//! names (`dataset.table`, `project.dataset.table`, backquoted or not) are
//! rewritten to flat registered names before the statement runs.

use std::collections::BTreeSet;

/// A statement with its qualified table names rewritten
#[derive(Debug, Default, PartialEq)]
pub(super) struct Rewritten {
    pub sql: String,
    /// Unqualified identifiers outside string literals, including the
    /// replacement names
    pub identifiers: BTreeSet<String>,
}

/// Registered name for a qualified table
pub(super) fn flat_name(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| {
            part.chars()
                .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("__")
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '`'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Rewrite every dotted name that `resolve` maps to a registered table
pub(super) fn rewrite_qualified_names(
    sql: &str,
    resolve: impl Fn(&[&str]) -> Option<String>,
) -> Rewritten {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = Rewritten::default();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        // String literal or double-quoted identifier: copied verbatim
        if c == '\'' || c == '"' {
            let start = i;
            i += 1;
            while i < chars.len() && chars[i] != c {
                i += 1;
            }
            i = (i + 1).min(chars.len());
            out.sql.extend(&chars[start..i]);
            continue;
        }

        // Numbers and the tails of other tokens
        if is_ident_char(c) && !is_ident_start(c) {
            while i < chars.len() && (is_ident_char(chars[i]) || chars[i] == '.') {
                out.sql.push(chars[i]);
                i += 1;
            }
            continue;
        }

        if !is_ident_start(c) {
            out.sql.push(c);
            i += 1;
            continue;
        }

        // Dotted path of plain or backquoted segments
        let start = i;
        let mut parts: Vec<String> = Vec::new();
        let mut quoted = false;
        loop {
            if i < chars.len() && chars[i] == '`' {
                quoted = true;
                let seg_start = i + 1;
                i = seg_start;
                while i < chars.len() && chars[i] != '`' {
                    i += 1;
                }
                let segment: String = chars[seg_start..i.min(chars.len())].iter().collect();
                parts.extend(segment.split('.').map(str::to_string));
                i = (i + 1).min(chars.len());
            } else {
                let seg_start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                parts.push(chars[seg_start..i].iter().collect());
            }

            let continues = i + 1 < chars.len()
                && chars[i] == '.'
                && (is_ident_start(chars[i + 1]) || chars[i + 1].is_ascii_digit());
            if !continues {
                break;
            }
            i += 1;
        }

        let raw: String = chars[start..i].iter().collect();
        let segments: Vec<&str> = parts.iter().map(String::as_str).collect();

        match segments.len() {
            1 if !quoted => {
                out.identifiers.insert(raw.clone());
                out.sql.push_str(&raw);
            }
            n if n >= 2 => match resolve(&segments) {
                Some(name) => {
                    out.sql.push_str(&name);
                    out.identifiers.insert(name);
                }
                None => out.sql.push_str(&raw),
            },
            _ => out.sql.push_str(&raw),
        }
    }

    out
}
