//! Typed resource and action patterns.
//!
//! A pattern is written as segments separated by `:` or `/`, for example
//! `agent:id:[1-50]`, `logs/*` or `cluster:**`. Each segment is parsed once
//! into a [`Segment`]:
//!
//! | Syntax    | Segment              | Matches                                   |
//! |-----------|----------------------|-------------------------------------------|
//! | `name`    | `Exact`              | the identical segment                     |
//! | `*`       | `Wildcard`           | any single segment                        |
//! | `[lo-hi]` | `Range`              | a numeric segment with `lo <= n <= hi`    |
//! | `**`      | `Rest` (last only)   | one or more remaining segments            |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, WardenError};

const SEPARATORS: [char; 2] = [':', '/'];

/// One parsed segment of a [`Pattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Exact(String),
    Wildcard,
    Range { lo: u64, hi: u64 },
    Rest,
}

impl Segment {
    fn parse(raw: &str, is_last: bool) -> Result<Self> {
        match raw {
            "" => Err(WardenError::validation("Pattern contains an empty segment")),
            "*" => Ok(Self::Wildcard),
            "**" if is_last => Ok(Self::Rest),
            "**" => Err(WardenError::validation(
                "`**` is only allowed as the last pattern segment",
            )),
            _ if raw.starts_with('[') => Self::parse_range(raw),
            _ if raw.contains(['*', '[', ']']) => Err(WardenError::validation(format!(
                "Invalid pattern segment: {:?}",
                raw
            ))),
            _ => Ok(Self::Exact(raw.to_string())),
        }
    }

    fn parse_range(raw: &str) -> Result<Self> {
        let invalid = || WardenError::validation(format!("Invalid range segment: {:?}", raw));

        let body = raw
            .strip_prefix('[')
            .and_then(|r| r.strip_suffix(']'))
            .ok_or_else(invalid)?;
        let (lo, hi) = body.split_once('-').ok_or_else(invalid)?;
        let lo = parse_number(lo.trim()).ok_or_else(invalid)?;
        let hi = parse_number(hi.trim()).ok_or_else(invalid)?;
        if lo > hi {
            return Err(invalid());
        }
        Ok(Self::Range { lo, hi })
    }

    fn matches(&self, value: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == value,
            Self::Wildcard | Self::Rest => true,
            Self::Range { lo, hi } => {
                parse_number(value).is_some_and(|n| (*lo..=*hi).contains(&n))
            }
        }
    }

    /// Weight used to rank overlapping rules: narrower segments weigh more.
    fn weight(&self) -> u32 {
        match self {
            Self::Exact(_) => 2,
            Self::Range { .. } => 1,
            Self::Wildcard | Self::Rest => 0,
        }
    }
}

/// Plain decimal digits only; `u64::from_str` would also take a leading `+`.
fn parse_number(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(s) => write!(f, "{}", s),
            Self::Wildcard => write!(f, "*"),
            Self::Range { lo, hi } => write!(f, "[{}-{}]", lo, hi),
            Self::Rest => write!(f, "**"),
        }
    }
}

/// A parsed resource or action pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Parse a pattern, rejecting malformed input.
    pub fn parse(source: &str) -> Result<Self> {
        let source = source.trim();
        if source.is_empty() {
            return Err(WardenError::validation("Pattern must not be empty"));
        }

        let raw: Vec<&str> = source.split(SEPARATORS).collect();
        let last = raw.len() - 1;
        let segments = raw
            .iter()
            .enumerate()
            .map(|(i, seg)| Segment::parse(seg, i == last))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| e.with_context("pattern", source))?;

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// Pattern matching everything.
    pub fn any() -> Self {
        Self {
            source: "**".to_string(),
            segments: vec![Segment::Rest],
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Check whether every segment of `path` satisfies this pattern.
    pub fn matches(&self, path: &SegmentPath) -> bool {
        let values = path.segments();
        for (i, segment) in self.segments.iter().enumerate() {
            if *segment == Segment::Rest {
                return values.len() > i;
            }
            match values.get(i) {
                Some(value) if segment.matches(value) => {}
                _ => return false,
            }
        }
        values.len() == self.segments.len()
    }

    /// Sum of segment weights; higher means narrower.
    pub fn specificity(&self) -> u32 {
        self.segments.iter().map(Segment::weight).sum()
    }
}

impl FromStr for Pattern {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Pattern {
    type Error = WardenError;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Pattern> for String {
    fn from(p: Pattern) -> Self {
        p.source
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// A concrete resource or action identifier, split once into segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPath {
    raw: String,
    segments: Vec<String>,
}

impl SegmentPath {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let segments = raw.split(SEPARATORS).map(str::to_string).collect();
        Self { raw, segments }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl fmt::Display for SegmentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn matches(pattern: &str, value: &str) -> bool {
        Pattern::parse(pattern).unwrap().matches(&SegmentPath::new(value))
    }

    #[test]
    fn exact_match() {
        assert!(matches("agent:read", "agent:read"));
        assert!(!matches("agent:read", "agent:delete"));
        assert!(!matches("agent:read", "agent:read:extra"));
    }

    #[test]
    fn wildcard_matches_one_segment() {
        assert!(matches("logs/*", "logs/a"));
        assert!(!matches("logs/*", "logs"));
        assert!(!matches("logs/*", "logs/a/b"));
        assert!(matches("agent:*:001", "agent:id:001"));
    }

    #[test]
    fn mixed_separators() {
        assert!(matches("logs/*", "logs:a"));
        assert!(matches("cluster:node/*", "cluster/node/master"));
    }

    #[test]
    fn range_matches_numeric_segments() {
        assert!(matches("agent:id:[1-50]", "agent:id:001"));
        assert!(matches("agent:id:[1-50]", "agent:id:50"));
        assert!(!matches("agent:id:[1-50]", "agent:id:51"));
        assert!(!matches("agent:id:[1-50]", "agent:id:abc"));
    }

    #[test]
    fn rest_matches_remaining_segments() {
        assert!(matches("logs/**", "logs/a"));
        assert!(matches("logs/**", "logs/a/b/c"));
        assert!(!matches("logs/**", "logs"));
        assert!(matches("**", "anything:at:all"));
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        for bad in ["", "logs//a", "logs/", "lo*gs", "**:tail", "[5-1]", "[a-z]", "[1-2", "x]"] {
            let err = Pattern::parse(bad).unwrap_err();
            assert_eq!(err.code(), ErrorCode::ValidationError, "pattern {:?}", bad);
        }
    }

    #[test]
    fn specificity_ranks_narrower_higher() {
        let broad = Pattern::parse("logs/*").unwrap();
        let ranged = Pattern::parse("logs/[1-9]").unwrap();
        let narrow = Pattern::parse("logs/a").unwrap();
        assert!(broad.specificity() < ranged.specificity());
        assert!(ranged.specificity() < narrow.specificity());
        assert_eq!(Pattern::any().specificity(), 0);
    }

    #[test]
    fn serde_uses_source_string() {
        let pattern: Pattern = serde_json::from_str("\"agent:id:[1-5]\"").unwrap();
        assert_eq!(
            pattern.segments()[2],
            Segment::Range { lo: 1, hi: 5 }
        );
        assert_eq!(serde_json::to_string(&pattern).unwrap(), "\"agent:id:[1-5]\"");
        assert!(serde_json::from_str::<Pattern>("\"a**\"").is_err());
    }
}
