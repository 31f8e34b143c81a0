//! BibTeX entry scanner.
//!
//! Handles the subset of BibTeX needed to pull fields out of entries:
//! - Entries: `@type{key, name = value, ...}` or `@type(key, ...)`
//! - Values: `{brace {balanced}}`, `"quoted"`, bare tokens, `#` concatenation
//! - `@comment`, `@string`, `@preamble` blocks are skipped

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A single parsed bibliography entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibEntry {
    /// Lowercased entry type (`article`, `inproceedings`, ...).
    pub entry_type: String,
    /// Citation key.
    pub key: String,
    /// Fields keyed by lowercased name, values with outer delimiters removed.
    fields: BTreeMap<String, String>,
}

impl BibEntry {
    /// Field value by case-insensitive name.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Matches the start of an entry: `@article{` or `@misc(`.
static ENTRY_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@\s*([A-Za-z]+)\s*([{(])").expect("entry start regex"));

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse every well-formed entry in `content`.
///
/// A malformed entry is logged and skipped; scanning resumes after it.
pub fn parse_entries(content: &str) -> Vec<BibEntry> {
    let mut entries = Vec::new();
    let mut pos = 0;

    while let Some(caps) = ENTRY_START_RE.captures_at(content, pos) {
        let Some(start) = caps.get(0) else { break };
        let entry_type = caps[1].to_ascii_lowercase();
        let close = if &caps[2] == "{" { '}' } else { ')' };

        let mut scanner = Scanner {
            src: content,
            pos: start.end(),
            close,
        };

        if matches!(entry_type.as_str(), "comment" | "string" | "preamble") {
            scanner.skip_to_close();
            pos = scanner.pos.max(start.end());
            continue;
        }

        match scanner.entry_body() {
            Ok((key, fields)) if !key.is_empty() => entries.push(BibEntry {
                entry_type,
                key,
                fields,
            }),
            Ok(_) => warn!(offset = start.start(), "bibliography entry without a key, skipping"),
            Err(reason) => {
                warn!(offset = start.start(), %reason, "malformed bibliography entry, skipping");
            }
        }

        pos = scanner.pos.max(start.end());
    }

    entries
}

/// Cursor over an entry body, positioned just past its opening delimiter.
struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    close: char,
}

impl Scanner<'_> {
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    /// Advance past the entry's closing delimiter, honouring nested braces.
    fn skip_to_close(&mut self) {
        let mut depth = 0usize;
        while let Some(c) = self.bump() {
            match c {
                '{' => depth += 1,
                '}' if depth > 0 => depth -= 1,
                c if c == self.close && depth == 0 => return,
                _ => {}
            }
        }
    }

    /// Parse `key, name = value, ...` up to and including the closing delimiter.
    fn entry_body(&mut self) -> Result<(String, BTreeMap<String, String>), String> {
        let mut key = String::new();
        loop {
            match self.bump() {
                Some(',') => break,
                Some(c) if c == self.close => return Ok((key.trim().to_string(), BTreeMap::new())),
                Some(c) => key.push(c),
                None => return Err("unterminated entry".into()),
            }
        }
        let key = key.trim().to_string();

        let mut fields = BTreeMap::new();
        loop {
            while self.peek().is_some_and(|c| c.is_whitespace() || c == ',') {
                self.bump();
            }
            match self.peek() {
                None => return Err(format!("unterminated entry '{key}'")),
                Some(c) if c == self.close => {
                    self.bump();
                    break;
                }
                Some(_) => {}
            }

            let name = self.field_name()?;
            let value = self.value()?;
            fields.insert(name, value);
        }

        Ok((key, fields))
    }

    /// Read a field name up to and including `=`.
    fn field_name(&mut self) -> Result<String, String> {
        let mut name = String::new();
        loop {
            match self.bump() {
                Some('=') => break,
                Some(c) if c == ',' || c == self.close => {
                    return Err(format!("field '{}' has no value", name.trim()));
                }
                Some(c) => name.push(c),
                None => return Err("unterminated field".into()),
            }
        }
        Ok(name.trim().to_ascii_lowercase())
    }

    /// Read a value, joining `#`-concatenated parts.
    fn value(&mut self) -> Result<String, String> {
        let mut out = String::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some('{') => out.push_str(&self.braced()?),
                Some('"') => out.push_str(&self.quoted()?),
                Some(c) if c != ',' && c != self.close && c != '#' => out.push_str(&self.bare()),
                _ => return Err("missing field value".into()),
            }
            self.skip_ws();
            if self.peek() == Some('#') {
                self.bump();
            } else {
                return Ok(out);
            }
        }
    }

    fn braced(&mut self) -> Result<String, String> {
        self.bump();
        let mut depth = 1usize;
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                }
                _ => {}
            }
            out.push(c);
        }
        Err("unbalanced braces in value".into())
    }

    fn quoted(&mut self) -> Result<String, String> {
        self.bump();
        let mut depth = 0usize;
        let mut prev = '\0';
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                '"' if depth == 0 && prev != '\\' => return Ok(out),
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                _ => {}
            }
            out.push(c);
            prev = c;
        }
        Err("unterminated quoted value".into())
    }

    fn bare(&mut self) -> String {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == ',' || c == '#' || c == self.close {
                break;
            }
            out.push(c);
            self.bump();
        }
        out
    }
}
