//! Header block parsing and the `translated` marker.
//!
//! A document is `---`, a YAML key/value header, `---`, then the body. The
//! raw header text is kept next to the parsed mapping so that stamping the
//! marker touches exactly one line and leaves every other byte alone.

use serde_yaml::{Mapping, Value};

use crate::error::FrontmatterError;
use crate::types::{Document, SyncState};

/// Header delimiter line.
pub const DELIMITER: &str = "---";

/// Header key carrying the mirror marker.
pub const MARKER_KEY: &str = "translated";

const MARKER_LINE: &str = "translated: true";

/// Line ending used by the header block, reused when inserting the marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::CrLf => "\r\n",
        }
    }
}

/// Ordered header mapping.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Header(Mapping);

impl Header {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Keys in file order. Non-string keys are skipped.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().filter_map(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_translated(&self) -> bool {
        matches!(self.get(MARKER_KEY), Some(Value::Bool(true)))
    }

    fn with_marker(&self) -> Header {
        let key = Value::String(MARKER_KEY.to_string());
        if self.0.contains_key(&key) {
            let mut mapping = self.0.clone();
            mapping.insert(key, Value::Bool(true));
            return Header(mapping);
        }
        let mut mapping = Mapping::with_capacity(self.0.len() + 1);
        mapping.insert(key, Value::Bool(true));
        for (k, v) in &self.0 {
            mapping.insert(k.clone(), v.clone());
        }
        Header(mapping)
    }
}

/// Parsed header block plus body.
#[derive(Debug, Clone, PartialEq)]
pub struct Frontmatter {
    pub header: Header,
    /// Header lines exactly as they appeared, each with its line ending.
    pub raw: String,
    pub body: String,
    pub line_ending: LineEnding,
}

impl Frontmatter {
    /// Parse document text. Fails when the delimiters are missing or the
    /// header is not a mapping.
    pub fn parse(text: &str) -> Result<Self, FrontmatterError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut lines = text.split_inclusive('\n');

        let opening = lines
            .next()
            .ok_or(FrontmatterError::MissingOpeningDelimiter)?;
        if trim_eol(opening) != DELIMITER || !opening.ends_with('\n') {
            return Err(FrontmatterError::MissingOpeningDelimiter);
        }
        let line_ending = if opening.ends_with("\r\n") {
            LineEnding::CrLf
        } else {
            LineEnding::Lf
        };

        let header_start = opening.len();
        let mut consumed = header_start;
        for line in lines {
            if trim_eol(line) == DELIMITER {
                let raw = &text[header_start..consumed];
                let body = &text[consumed + line.len()..];
                return Ok(Self {
                    header: parse_header(raw)?,
                    raw: raw.to_string(),
                    body: body.to_string(),
                    line_ending,
                });
            }
            consumed += line.len();
        }
        Err(FrontmatterError::MissingClosingDelimiter)
    }

    pub fn render(&self) -> String {
        let nl = self.line_ending.as_str();
        let mut out = String::with_capacity(self.raw.len() + self.body.len() + 8);
        out.push_str(DELIMITER);
        out.push_str(nl);
        out.push_str(&self.raw);
        out.push_str(DELIMITER);
        out.push_str(nl);
        out.push_str(&self.body);
        out
    }

    /// Copy with the marker set: an existing top-level `translated:` line is
    /// rewritten in place, otherwise the marker becomes the first line.
    pub fn stamped(&self) -> Self {
        let nl = self.line_ending.as_str();
        let mut raw = String::with_capacity(self.raw.len() + MARKER_LINE.len() + 2);
        let mut replaced = false;
        for line in self.raw.split_inclusive('\n') {
            if is_marker_line(line) {
                if !replaced {
                    raw.push_str(MARKER_LINE);
                    raw.push_str(line_eol(line).unwrap_or(nl));
                    replaced = true;
                }
                continue;
            }
            raw.push_str(line);
        }
        if !replaced {
            raw.insert_str(0, &format!("{MARKER_LINE}{nl}"));
        }

        Self {
            header: self.header.with_marker(),
            raw,
            body: self.body.clone(),
            line_ending: self.line_ending,
        }
    }
}

/// `true` iff the document carries `translated: true`.
pub fn is_translated(doc: &Document) -> bool {
    doc.state.is_mirror
}

/// Marker check on raw text; malformed documents are never translated.
pub fn is_translated_text(text: &str) -> bool {
    Frontmatter::parse(text)
        .map(|fm| fm.header.is_translated())
        .unwrap_or(false)
}

/// Copy of `doc` carrying the marker. Never duplicates the key.
pub fn stamp_translated(doc: &Document) -> Document {
    Document {
        location: doc.location.clone(),
        frontmatter: doc.frontmatter.stamped(),
        state: SyncState { is_mirror: true },
        modified: doc.modified,
    }
}

fn parse_header(raw: &str) -> Result<Header, FrontmatterError> {
    if raw.trim().is_empty() {
        return Ok(Header::default());
    }
    match serde_yaml::from_str::<Value>(raw)? {
        Value::Mapping(mapping) => Ok(Header(mapping)),
        Value::Null => Ok(Header::default()),
        _ => Err(FrontmatterError::NotAMapping),
    }
}

fn trim_eol(line: &str) -> &str {
    line.trim_end_matches('\n').trim_end_matches('\r')
}

fn line_eol(line: &str) -> Option<&'static str> {
    if line.ends_with("\r\n") {
        Some("\r\n")
    } else if line.ends_with('\n') {
        Some("\n")
    } else {
        None
    }
}

/// A top-level `translated:` line, with the key bare or quoted.
fn is_marker_line(line: &str) -> bool {
    let key_end = ['"', '\'']
        .iter()
        .find_map(|quote| {
            line.strip_prefix(*quote)
                .and_then(|rest| rest.strip_prefix(MARKER_KEY))
                .and_then(|rest| rest.strip_prefix(*quote))
        })
        .or_else(|| line.strip_prefix(MARKER_KEY));
    key_end
        .map(|rest| rest.trim_start().starts_with(':'))
        .unwrap_or(false)
}
