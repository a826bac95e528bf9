//! Path expressions over JSON values
//!
//! A path is a chain of segments written in dot and bracket notation:
//!
//! - `deploy.replicas` - dot-separated identifiers (`[A-Za-z0-9_$]+`)
//! - `ports[0]` - bracketed numeric index
//! - `labels["app.kubernetes.io/name"]` or `labels['x']` - bracketed quoted key
//!
//! Syntax errors are reported as [`PathError`]; they are never folded into
//! "not found".

use crate::error::{PathError, Result};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// One step of a path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    /// Object key (identifier or quoted string)
    Key(String),
    /// Array index
    Index(usize),
}

impl Segment {
    /// Look this segment up in `value`
    ///
    /// Keys and indices are interchangeable the way they are in a JSON
    /// document: `[0]` on an object reads key `"0"`, and `["1"]` on an
    /// array reads element 1.
    pub fn get<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        match (self, value) {
            (Segment::Key(key), Value::Object(map)) => map.get(key),
            (Segment::Key(key), Value::Array(items)) => {
                key.parse::<usize>().ok().and_then(|i| items.get(i))
            }
            (Segment::Index(i), Value::Array(items)) => items.get(*i),
            (Segment::Index(i), Value::Object(map)) => map.get(&i.to_string()),
            _ => None,
        }
    }
}

/// A parsed path expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// The empty path, which resolves to the root value
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a path expression
    pub fn parse(expr: &str) -> Result<Self> {
        Parser::new(expr).parse()
    }

    /// Segments of this path
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether this is the root path
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// A new path with a key appended
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.segments.push(Segment::Key(key.into()));
        next
    }

    /// A new path with an index appended
    pub fn index(&self, index: usize) -> Self {
        let mut next = self.clone();
        next.segments.push(Segment::Index(index));
        next
    }

    /// Whether `self` equals `other` or is an ancestor of it
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// Walk `value` along this path
    pub fn resolve<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.segments
            .iter()
            .try_fold(value, |current, segment| segment.get(current))
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if is_identifier(key) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(key)?;
                }
                Segment::Key(key) => {
                    f.write_str("[\"")?;
                    for c in key.chars() {
                        if c == '"' || c == '\\' {
                            f.write_str("\\")?;
                        }
                        write!(f, "{}", c)?;
                    }
                    f.write_str("\"]")?;
                }
                Segment::Index(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// Evaluate `expr` against `value`
///
/// Returns `Ok(Some(v))` when the path resolves, `Ok(None)` when any
/// segment is missing, and `Err` when the expression itself is malformed.
///
/// ```
/// use serde_json::json;
///
/// let obj = json!({ "a": { "b": [{ "c-d": "x" }] } });
/// let found = diffkit::exists(&obj, r#"a.b[0]["c-d"]"#).unwrap();
/// assert_eq!(found, Some(&json!("x")));
/// assert!(diffkit::exists(&obj, "a.b[").is_err());
/// ```
pub fn exists<'a>(value: &'a Value, expr: &str) -> Result<Option<&'a Value>> {
    Ok(Path::parse(expr)?.resolve(value))
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_identifier_char)
}

struct Parser<'a> {
    expr: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(expr: &'a str) -> Self {
        Self {
            expr,
            chars: expr.chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<Path> {
        let mut segments = Vec::new();

        // The first segment may be a bare identifier or a bracket
        if self.peek() == Some('[') {
            segments.push(self.bracket()?);
        } else {
            segments.push(self.identifier()?);
        }

        while let Some(c) = self.peek() {
            match c {
                '.' => {
                    self.pos += 1;
                    segments.push(self.identifier()?);
                }
                '[' => segments.push(self.bracket()?),
                other => return Err(self.unexpected(other)),
            }
        }

        Ok(Path { segments })
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn identifier(&mut self) -> Result<Segment> {
        let start = self.pos;
        while self.peek().is_some_and(is_identifier_char) {
            self.pos += 1;
        }

        if self.pos == start {
            return match self.peek() {
                None | Some('.') | Some('[') => Err(PathError::EmptyIdentifier {
                    path: self.expr.to_string(),
                    position: start,
                }),
                Some(other) => Err(self.unexpected(other)),
            };
        }

        Ok(Segment::Key(self.chars[start..self.pos].iter().collect()))
    }

    fn bracket(&mut self) -> Result<Segment> {
        let open = self.pos;
        self.pos += 1;

        let segment = match self.peek() {
            None => return Err(self.unterminated(open)),
            Some(quote @ ('"' | '\'')) => Segment::Key(self.quoted(quote)?),
            Some(c) if c.is_ascii_digit() => {
                let start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
                let digits: String = self.chars[start..self.pos].iter().collect();
                let index = digits.parse::<usize>().map_err(|_| PathError::InvalidIndex {
                    path: self.expr.to_string(),
                    position: start,
                })?;
                Segment::Index(index)
            }
            Some(_) => {
                return Err(PathError::InvalidIndex {
                    path: self.expr.to_string(),
                    position: self.pos,
                });
            }
        };

        match self.peek() {
            Some(']') => {
                self.pos += 1;
                Ok(segment)
            }
            None => Err(self.unterminated(open)),
            Some(_) => Err(PathError::InvalidIndex {
                path: self.expr.to_string(),
                position: self.pos,
            }),
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String> {
        let open = self.pos;
        self.pos += 1;
        let mut out = String::new();

        loop {
            match self.peek() {
                None => {
                    return Err(PathError::UnterminatedString {
                        path: self.expr.to_string(),
                        position: open,
                    });
                }
                Some('\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(escaped) => {
                            out.push(escaped);
                            self.pos += 1;
                        }
                        None => {
                            return Err(PathError::UnterminatedString {
                                path: self.expr.to_string(),
                                position: open,
                            });
                        }
                    }
                }
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(out);
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn unterminated(&self, open: usize) -> PathError {
        PathError::UnterminatedBracket {
            path: self.expr.to_string(),
            position: open,
        }
    }

    fn unexpected(&self, found: char) -> PathError {
        PathError::UnexpectedCharacter {
            path: self.expr.to_string(),
            position: self.pos,
            found,
        }
    }
}
