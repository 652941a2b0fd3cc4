//! Topic matching (routing key vs. binding pattern).
//!
//! Both keys and patterns are dot-segmented. A pattern segment is either a
//! literal word, `*` (exactly one key segment) or `#` (zero or more key
//! segments, only allowed as the final segment).
//!
//! | pattern     | key                   | matches |
//! |-------------|-----------------------|---------|
//! | `order.*`   | `order.created`       | yes     |
//! | `order.*`   | `order.created.extra` | no      |
//! | `order.#`   | `order.created.extra` | yes     |
//! | `order.#`   | `order`               | yes     |
//! | `#`         | `` (empty)            | yes     |
//! | `*`         | `` (empty)            | no      |
//!
//! The empty routing key has zero segments.

use serde::{Deserialize, Serialize};
use thiserror::Error;

const SEPARATOR: char = '.';
const ONE: &str = "*";
const ANY: &str = "#";

/// A binding pattern that failed validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid binding pattern `{pattern}`: {reason}")]
pub struct InvalidPatternError {
    pub pattern: String,
    pub reason: PatternFault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternFault {
    /// Pattern (or one of its segments) is empty.
    EmptySegment,
    /// `#` appears before the final segment.
    MultiWildcardNotLast,
    /// `*` or `#` is part of a larger segment, e.g. `ord*`.
    EmbeddedWildcard,
}

impl core::fmt::Display for PatternFault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            PatternFault::EmptySegment => "empty segment",
            PatternFault::MultiWildcardNotLast => "`#` is only allowed as the final segment",
            PatternFault::EmbeddedWildcard => "wildcards must be whole segments",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Literal(String),
    One,
    Any,
}

/// A validated binding pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Validate and compile a pattern.
    pub fn parse(raw: &str) -> Result<Self, InvalidPatternError> {
        let fail = |reason| InvalidPatternError {
            pattern: raw.to_string(),
            reason,
        };

        let parts: Vec<&str> = raw.split(SEPARATOR).collect();
        let last = parts.len() - 1;
        let mut segments = Vec::with_capacity(parts.len());

        for (idx, part) in parts.into_iter().enumerate() {
            let segment = match part {
                "" => return Err(fail(PatternFault::EmptySegment)),
                ONE => Segment::One,
                ANY if idx == last => Segment::Any,
                ANY => return Err(fail(PatternFault::MultiWildcardNotLast)),
                word if word.contains(['*', '#']) => {
                    return Err(fail(PatternFault::EmbeddedWildcard));
                }
                word => Segment::Literal(word.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether `routing_key` is selected by this pattern.
    pub fn matches(&self, routing_key: &str) -> bool {
        let key: Vec<&str> = if routing_key.is_empty() {
            Vec::new()
        } else {
            routing_key.split(SEPARATOR).collect()
        };

        let mut pos = 0;
        for segment in &self.segments {
            match segment {
                // Only ever last: swallows whatever remains.
                Segment::Any => return true,
                Segment::One => {
                    if pos >= key.len() {
                        return false;
                    }
                }
                Segment::Literal(word) => {
                    if key.get(pos) != Some(&word.as_str()) {
                        return false;
                    }
                }
            }
            pos += 1;
        }

        pos == key.len()
    }
}

impl core::fmt::Display for Pattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl core::str::FromStr for Pattern {
    type Err = InvalidPatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Pattern {
    type Error = InvalidPatternError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Pattern> for String {
    fn from(value: Pattern) -> Self {
        value.raw
    }
}

/// Match `routing_key` against a raw pattern.
///
/// Invalid patterns never match. Callers that route repeatedly should parse
/// once with [`Pattern::parse`] instead.
pub fn matches(pattern: &str, routing_key: &str) -> bool {
    Pattern::parse(pattern).is_ok_and(|p| p.matches(routing_key))
}
