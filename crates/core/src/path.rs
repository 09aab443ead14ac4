//! Path expressions into a JSON document
//!
//! A path is an ordered list of segments:
//!
//! | Syntax | Segment | Example |
//! |--------|---------|---------|
//! | `name` | object field | `geo` |
//! | `.name` | nested field | `geo.alt` |
//! | `` `a.b` `` | escaped field (literal dots/brackets) | `` `user.name` `` |
//! | `[n]` | array index | `array[2]`, `array.[2]`, `[1]` |
//! | `[-1]` | append marker (end of array) | `array[-1]` |
//! | (empty) | document root | `` |
//!
//! The append marker may only appear as the final segment. A leading `$`
//! (for example `$document.exptime`) names an extended attribute; whether a
//! spec targets xattrs is carried on the spec, not on the path.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::limits::MAX_PATH_DEPTH;

/// Error type for path parsing
///
/// Positions are character offsets into the input string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathSyntaxError {
    /// Empty field name (leading dot, doubled dot, trailing dot, or ``` `` ```)
    #[error("empty field name at position {0}")]
    EmptyField(usize),
    /// `[` without a matching `]`, or a stray `]`
    #[error("unbalanced bracket at position {0}")]
    UnbalancedBracket(usize),
    /// Bracket contents are not a non-negative integer or `-1`
    #[error("invalid array index at position {0}: {1:?}")]
    InvalidIndex(usize, String),
    /// `[-1]` followed by further segments
    #[error("append marker at position {0} must be the last segment")]
    AppendMarkerNotLast(usize),
    /// A field name glued to a closing bracket or escaped field
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
    /// Backtick-escaped field without a closing backtick
    #[error("unterminated escaped field starting at position {0}")]
    UnterminatedEscape(usize),
    /// Too many segments
    #[error("path has {depth} segments, maximum is {max}")]
    TooDeep {
        /// Number of segments parsed
        depth: usize,
        /// Maximum allowed
        max: usize,
    },
}

/// A segment in a path
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    /// Object field: `name`
    Field(String),
    /// Array element: `[n]`
    Index(usize),
    /// End of array: `[-1]`
    AppendMarker,
}

impl PathSegment {
    /// Check if this is an explicit array position (`[n]` or `[-1]`)
    pub fn is_array_position(&self) -> bool {
        matches!(self, PathSegment::Index(_) | PathSegment::AppendMarker)
    }
}

/// A parsed path into a JSON document
///
/// The empty path denotes the document root. Paths are immutable once
/// built; the builder methods consume and return `self`.
///
/// # Examples
///
/// ```
/// use tessera_core::path::{Path, PathSegment};
///
/// let path: Path = "geo.alt".parse().unwrap();
/// assert_eq!(path, Path::root().field("geo").field("alt"));
///
/// let tail: Path = "array[-1]".parse().unwrap();
/// assert_eq!(tail.last_segment(), Some(&PathSegment::AppendMarker));
///
/// assert!("".parse::<Path>().unwrap().is_root());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Path {
    segments: Vec<PathSegment>,
}

impl Path {
    /// The document root (empty path)
    pub fn root() -> Self {
        Path {
            segments: Vec::new(),
        }
    }

    /// Build a path from raw segments
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Path { segments }
    }

    /// Parse a path string
    pub fn parse(input: &str) -> Result<Self, PathSyntaxError> {
        parse(input)
    }

    /// Get the path segments
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Check if the path has no segments
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Check if this is the document root
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append a field segment
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.segments.push(PathSegment::Field(name.into()));
        self
    }

    /// Append an index segment
    pub fn index(mut self, idx: usize) -> Self {
        self.segments.push(PathSegment::Index(idx));
        self
    }

    /// Append the end-of-array marker
    pub fn append_marker(mut self) -> Self {
        self.segments.push(PathSegment::AppendMarker);
        self
    }

    /// Get the parent path (None for the root)
    pub fn parent(&self) -> Option<Path> {
        if self.segments.is_empty() {
            None
        } else {
            Some(Path {
                segments: self.segments[..self.segments.len() - 1].to_vec(),
            })
        }
    }

    /// Get the last segment (None for the root)
    pub fn last_segment(&self) -> Option<&PathSegment> {
        self.segments.last()
    }

    /// Check if the path starts with a `$`-prefixed field
    ///
    /// Such paths name extended attributes (`$document.exptime`) and are
    /// only valid on specs that target xattrs.
    pub fn is_virtual(&self) -> bool {
        matches!(self.segments.first(), Some(PathSegment::Field(f)) if f.starts_with('$'))
    }
}

impl FromStr for Path {
    type Err = PathSyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Field(name) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    write_field(f, name)?;
                }
                PathSegment::Index(idx) => write!(f, "[{}]", idx)?,
                PathSegment::AppendMarker => f.write_str("[-1]")?,
            }
        }
        Ok(())
    }
}

fn write_field(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if name.chars().any(is_reserved) {
        write!(f, "`{}`", name.replace('`', "``"))
    } else {
        f.write_str(name)
    }
}

fn is_reserved(c: char) -> bool {
    matches!(c, '.' | '[' | ']' | '`')
}

/// Parse a path string into a [`Path`]
pub fn parse(input: &str) -> Result<Path, PathSyntaxError> {
    let chars: Vec<char> = input.chars().collect();
    let mut builder = SegmentBuilder::default();
    let mut i = 0;
    // At the start of input or right after a dot, a segment must follow.
    let mut expect_segment = true;

    while i < chars.len() {
        match chars[i] {
            '.' => {
                if expect_segment {
                    return Err(PathSyntaxError::EmptyField(i));
                }
                i += 1;
                if i == chars.len() {
                    return Err(PathSyntaxError::EmptyField(i));
                }
                expect_segment = true;
            }
            '[' => {
                let open = i;
                let close = chars[open + 1..]
                    .iter()
                    .position(|&c| c == ']' || c == '[')
                    .map(|offset| open + 1 + offset)
                    .filter(|&pos| chars[pos] == ']')
                    .ok_or(PathSyntaxError::UnbalancedBracket(open))?;
                let text: String = chars[open + 1..close].iter().collect();
                builder.push(parse_index(&text, open + 1)?, open)?;
                i = close + 1;
                expect_segment = false;
            }
            ']' => return Err(PathSyntaxError::UnbalancedBracket(i)),
            '`' => {
                if !expect_segment {
                    return Err(PathSyntaxError::UnexpectedChar('`', i));
                }
                let (name, next) = parse_escaped(&chars, i)?;
                builder.push(PathSegment::Field(name), i)?;
                i = next;
                expect_segment = false;
            }
            c => {
                if !expect_segment {
                    return Err(PathSyntaxError::UnexpectedChar(c, i));
                }
                let start = i;
                while i < chars.len() && !is_reserved(chars[i]) {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                builder.push(PathSegment::Field(name), start)?;
                expect_segment = false;
            }
        }
    }

    builder.finish()
}

fn parse_index(text: &str, position: usize) -> Result<PathSegment, PathSyntaxError> {
    if text == "-1" {
        return Ok(PathSegment::AppendMarker);
    }
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PathSyntaxError::InvalidIndex(position, text.to_string()));
    }
    text.parse::<usize>()
        .map(PathSegment::Index)
        .map_err(|_| PathSyntaxError::InvalidIndex(position, text.to_string()))
}

/// Parse a backtick-escaped field starting at `start`; a doubled backtick is
/// a literal backtick. Returns the name and the position after the closing
/// backtick.
fn parse_escaped(chars: &[char], start: usize) -> Result<(String, usize), PathSyntaxError> {
    let mut name = String::new();
    let mut j = start + 1;
    loop {
        match chars.get(j) {
            None => return Err(PathSyntaxError::UnterminatedEscape(start)),
            Some('`') if chars.get(j + 1) == Some(&'`') => {
                name.push('`');
                j += 2;
            }
            Some('`') => {
                j += 1;
                break;
            }
            Some(&c) => {
                name.push(c);
                j += 1;
            }
        }
    }
    if name.is_empty() {
        return Err(PathSyntaxError::EmptyField(start));
    }
    Ok((name, j))
}

#[derive(Default)]
struct SegmentBuilder {
    segments: Vec<PathSegment>,
    marker_at: Option<usize>,
}

impl SegmentBuilder {
    fn push(&mut self, segment: PathSegment, position: usize) -> Result<(), PathSyntaxError> {
        if let Some(marker) = self.marker_at {
            return Err(PathSyntaxError::AppendMarkerNotLast(marker));
        }
        if segment == PathSegment::AppendMarker {
            self.marker_at = Some(position);
        }
        self.segments.push(segment);
        Ok(())
    }

    fn finish(self) -> Result<Path, PathSyntaxError> {
        if self.segments.len() > MAX_PATH_DEPTH {
            return Err(PathSyntaxError::TooDeep {
                depth: self.segments.len(),
                max: MAX_PATH_DEPTH,
            });
        }
        Ok(Path {
            segments: self.segments,
        })
    }
}
