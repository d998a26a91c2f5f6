//! Field path tokenizer: `spec.forProvider.tags[env]`, `rules[0].resources[1]`.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Segment {
    /// Dotted field access.
    Field(String),
    /// Bracketed non-numeric key, e.g. a label name.
    Key(String),
    /// Bracketed array index.
    Index(usize),
}

impl Segment {
    /// Name of a field or key segment.
    pub fn name(&self) -> Option<&str> {
        match self {
            Segment::Field(n) | Segment::Key(n) => Some(n),
            Segment::Index(_) => None,
        }
    }

    /// Structural equality where `a.b` and `a[b]` address the same member.
    pub fn matches(&self, other: &Segment) -> bool {
        match (self, other) {
            (Segment::Index(a), Segment::Index(b)) => a == b,
            (Segment::Index(_), _) | (_, Segment::Index(_)) => false,
            (a, b) => a.name() == b.name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("field path is empty")]
    Empty,
    #[error("empty field name at offset {0}")]
    EmptyField(usize),
    #[error("empty brackets at offset {0}")]
    EmptyBracket(usize),
    #[error("unterminated '[' at offset {0}")]
    Unterminated(usize),
    #[error("unexpected '{ch}' at offset {pos}")]
    Unexpected { ch: char, pos: usize },
}

/// A parsed field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FieldPath {
    segments: SmallVec<[Segment; 8]>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        if raw.is_empty() { return Err(ParseError::Empty); }
        let bytes = raw.as_bytes();
        let mut segments: SmallVec<[Segment; 8]> = SmallVec::new();
        let mut i = 0usize;
        // a '.' must be followed by a field name, never a bracket
        let mut after_dot = false;
        while i < bytes.len() {
            match bytes[i] {
                b'[' if after_dot => return Err(ParseError::EmptyField(i)),
                b'[' => {
                    let close = raw[i + 1..].find(']').map(|off| i + 1 + off).ok_or(ParseError::Unterminated(i))?;
                    let inner = &raw[i + 1..close];
                    if inner.is_empty() { return Err(ParseError::EmptyBracket(i)); }
                    if inner.bytes().all(|b| b.is_ascii_digit()) {
                        let idx = inner.parse::<usize>().map_err(|_| ParseError::Unexpected { ch: '[', pos: i })?;
                        segments.push(Segment::Index(idx));
                    } else {
                        segments.push(Segment::Key(inner.to_string()));
                    }
                    i = close + 1;
                    match bytes.get(i) {
                        None | Some(b'[') => {}
                        Some(b'.') => {
                            i += 1;
                            if i == bytes.len() { return Err(ParseError::EmptyField(i)); }
                            after_dot = true;
                        }
                        Some(&other) => return Err(ParseError::Unexpected { ch: other as char, pos: i }),
                    }
                }
                b'.' => return Err(ParseError::EmptyField(i)),
                b']' => return Err(ParseError::Unexpected { ch: ']', pos: i }),
                _ => {
                    let start = i;
                    while i < bytes.len() && !matches!(bytes[i], b'.' | b'[' | b']') { i += 1; }
                    segments.push(Segment::Field(raw[start..i].to_string()));
                    after_dot = false;
                    if i < bytes.len() && bytes[i] == b'.' {
                        i += 1;
                        if i == bytes.len() { return Err(ParseError::EmptyField(i)); }
                        after_dot = true;
                    }
                }
            }
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] { &self.segments }

    pub fn len(&self) -> usize { self.segments.len() }

    pub fn is_empty(&self) -> bool { self.segments.is_empty() }

    /// Segment-wise equality with `Field`/`Key` treated alike.
    pub fn matches(&self, other: &FieldPath) -> bool {
        self.segments.len() == other.segments.len()
            && self.segments.iter().zip(other.segments.iter()).all(|(a, b)| a.matches(b))
    }
}

impl std::str::FromStr for FieldPath {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> { FieldPath::parse(s) }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                Segment::Field(name) => {
                    if i > 0 { f.write_str(".")?; }
                    f.write_str(name)?;
                }
                Segment::Key(key) => write!(f, "[{}]", key)?,
                Segment::Index(idx) => write!(f, "[{}]", idx)?,
            }
        }
        Ok(())
    }
}

/// A set of registered ("safe") paths, matched exactly.
#[derive(Debug, Clone, Default)]
pub struct PathSet {
    paths: Vec<FieldPath>,
}

impl PathSet {
    /// Parse every raw path; the first failure is returned with the raw input.
    pub fn parse_all<I, S>(raw: I) -> Result<Self, (String, ParseError)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut paths = Vec::new();
        for r in raw {
            let r = r.as_ref();
            let p = FieldPath::parse(r).map_err(|e| (r.to_string(), e))?;
            if !paths.iter().any(|q: &FieldPath| q.matches(&p)) { paths.push(p); }
        }
        Ok(Self { paths })
    }

    pub fn contains(&self, path: &FieldPath) -> bool { self.paths.iter().any(|p| p.matches(path)) }

    pub fn len(&self) -> usize { self.paths.len() }

    pub fn is_empty(&self) -> bool { self.paths.is_empty() }
}
