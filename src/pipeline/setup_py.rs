//! Static extraction of `install_requires` from a `setup.py`.
//!
//! The script is never executed. Only a literal list (or a name bound to a
//! literal list elsewhere in the file) is understood; anything computed at
//! runtime yields no requirements.

use std::path::Path;

use crate::error::Result;

const KEYWORD: &str = "install_requires";

/// Reads `setup.py` in `project_dir` and extracts its requirements.
pub fn read_install_requires(project_dir: &Path) -> Result<Vec<String>> {
    let source = std::fs::read_to_string(project_dir.join("setup.py"))?;
    let requirements = extract_install_requires(&source);
    if requirements.is_empty() {
        tracing::debug!(project = %project_dir.display(), "no literal install_requires found in setup.py");
    }
    Ok(requirements)
}

/// Extracts the string literals of the first resolvable `install_requires` list.
pub fn extract_install_requires(source: &str) -> Vec<String> {
    let mut offset = 0;
    while let Some(found) = source[offset..].find(KEYWORD) {
        let after = offset + found + KEYWORD.len();
        offset = after;

        let rest = source[after..].trim_start_matches(['"', '\'']).trim_start();
        let Some(rest) = rest.strip_prefix(['=', ':']) else {
            continue;
        };
        let rest = rest.trim_start();

        if let Some(items) = string_list(rest) {
            return items;
        }
        if let Some(name) = identifier(rest) {
            if let Some(items) = assigned_list(source, name) {
                return items;
            }
        }
    }
    Vec::new()
}

/// Finds `name = [...]` at the start of a line and parses the list.
fn assigned_list(source: &str, name: &str) -> Option<Vec<String>> {
    source.match_indices(name).find_map(|(pos, _)| {
        let line_start = source[..pos].rfind('\n').map_or(0, |i| i + 1);
        if !source[line_start..pos].trim().is_empty() {
            return None;
        }
        let rest = source[pos + name.len()..].trim_start_matches([' ', '\t']);
        let rest = rest.strip_prefix('=')?;
        if rest.starts_with('=') {
            return None;
        }
        string_list(rest.trim_start())
    })
}

fn identifier(text: &str) -> Option<&str> {
    let end = text
        .find(|c: char| !(c == '_' || c.is_ascii_alphanumeric()))
        .unwrap_or(text.len());
    let ident = &text[..end];
    match ident.chars().next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => Some(ident),
        _ => None,
    }
}

/// Parses a `[...]` or `(...)` literal of strings, skipping comments.
fn string_list(text: &str) -> Option<Vec<String>> {
    let mut chars = text.chars();
    let close = match chars.next()? {
        '[' => ']',
        '(' => ')',
        _ => return None,
    };

    let mut items = Vec::new();
    while let Some(c) = chars.next() {
        match c {
            c if c == close => return Some(items),
            '#' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            quote @ ('"' | '\'') => {
                let mut item = String::new();
                let mut escaped = false;
                for c in chars.by_ref() {
                    if escaped {
                        item.push(c);
                        escaped = false;
                    } else if c == '\\' {
                        escaped = true;
                    } else if c == quote {
                        break;
                    } else {
                        item.push(c);
                    }
                }
                items.push(item);
            }
            _ => {}
        }
    }
    None
}
