//! C1 — Path & Pattern Matcher.
//!
//! Parses `scheme://seg/seg` addresses and matches them against patterns
//! built from literal segments, `{param}` placeholders, and `*` wildcards.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::{KernelError, KernelResult};

/// A concrete, parsed message address: `scheme://segment(/segment)*`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Path {
    scheme: String,
    segments: Vec<String>,
}

impl Path {
    /// Parse a wire-format path. Fails with [`KernelError::Path`] if the
    /// scheme separator is missing or the scheme is empty.
    ///
    /// Reserved segment names (`query`, `reply`, and the `res.type.<t>.name.<n>`
    /// suffix) are accepted here as ordinary literal segments — their meaning
    /// is a routing-time convention enforced by [`crate::system::MessageSystem`]
    /// and [`crate::request`], not a parse-time restriction.
    pub fn parse(raw: &str) -> KernelResult<Self> {
        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| KernelError::Path(raw.to_string()))?;
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(KernelError::Path(raw.to_string()));
        }
        let segments: Vec<String> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').map(|s| s.to_string()).collect()
        };
        if segments.iter().any(|s| s.is_empty()) {
            return Err(KernelError::Path(raw.to_string()));
        }
        Ok(Self {
            scheme: scheme.to_string(),
            segments,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Build a path programmatically without going through the wire grammar.
    pub fn new(scheme: impl Into<String>, segments: Vec<String>) -> Self {
        Self {
            scheme: scheme.into(),
            segments,
        }
    }

    /// The first segment, if any — used by the root router to decide whether
    /// a path addresses a child subsystem.
    pub fn first_segment(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// A new path with the leading segment stripped, for descent into a
    /// child subsystem's own routing.
    pub fn shift(&self) -> Path {
        Path {
            scheme: self.scheme.clone(),
            segments: self.segments.iter().skip(1).cloned().collect(),
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.segments.join("/"))
    }
}

/// One segment of an unresolved [`PathPattern`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PatternSegment {
    Literal(String),
    Param(String),
    /// Bare `*`: matches exactly one segment, wherever it appears.
    Wildcard,
    /// Trailing `*`: only valid as the last segment, consumes the remainder
    /// of the concrete path (joined with `/`).
    TrailingWildcard,
}

/// A route-matching pattern: a scheme plus a sequence of segments that may
/// contain `{param}` placeholders and wildcards.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PathPattern {
    scheme: String,
    segments: Vec<PatternSegment>,
}

/// Bound parameter values extracted by a successful match, plus the value of
/// a trailing wildcard (if the pattern had one) under the reserved key `"*"`.
pub type Params = BTreeMap<String, String>;

impl PathPattern {
    /// Parse a pattern in the same `scheme://seg/seg` grammar as [`Path`],
    /// with `{name}` and `*` segments given their special meaning. A `*`
    /// segment is treated as [`PatternSegment::TrailingWildcard`] iff it is
    /// the last segment in the pattern.
    pub fn parse(raw: &str) -> KernelResult<Self> {
        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| KernelError::Path(raw.to_string()))?;
        if scheme.is_empty() {
            return Err(KernelError::Path(raw.to_string()));
        }
        let raw_segments: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').collect()
        };
        let len = raw_segments.len();
        let segments = raw_segments
            .into_iter()
            .enumerate()
            .map(|(i, seg)| {
                if seg == "*" {
                    if i + 1 == len {
                        PatternSegment::TrailingWildcard
                    } else {
                        PatternSegment::Wildcard
                    }
                } else if seg.starts_with('{') && seg.ends_with('}') && seg.len() > 2 {
                    PatternSegment::Param(seg[1..seg.len() - 1].to_string())
                } else {
                    PatternSegment::Literal(seg.to_string())
                }
            })
            .collect();
        Ok(Self {
            scheme: scheme.to_string(),
            segments,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn segments(&self) -> &[PatternSegment] {
        &self.segments
    }

    /// Attempt to match a concrete [`Path`] against this pattern, returning
    /// the bound parameters on success.
    ///
    /// Matching is segment-by-segment: literal segments require equality,
    /// `{name}` binds the segment under `name`, a bare `*` consumes exactly
    /// one segment, and a trailing `*` consumes every remaining segment
    /// (joined by `/`) and is bound under the key `"*"`. The scheme must
    /// match exactly.
    pub fn matches(&self, path: &Path) -> Option<Params> {
        if self.scheme != path.scheme() {
            return None;
        }
        let mut params = Params::new();
        let path_segs = path.segments();
        let mut pi = 0usize;
        for (idx, pat_seg) in self.segments.iter().enumerate() {
            match pat_seg {
                PatternSegment::TrailingWildcard => {
                    debug_assert_eq!(idx + 1, self.segments.len());
                    let remainder = path_segs.get(pi..)?;
                    params.insert("*".to_string(), remainder.join("/"));
                    return Some(params);
                }
                PatternSegment::Wildcard => {
                    path_segs.get(pi)?;
                    pi += 1;
                }
                PatternSegment::Literal(lit) => {
                    if path_segs.get(pi) != Some(lit) {
                        return None;
                    }
                    pi += 1;
                }
                PatternSegment::Param(name) => {
                    let value = path_segs.get(pi)?;
                    params.insert(name.clone(), value.clone());
                    pi += 1;
                }
            }
        }
        if pi == path_segs.len() {
            Some(params)
        } else {
            None
        }
    }

    /// Specificity vector used by [`crate::router::RouteRegistry`] to order
    /// otherwise-ambiguous matches: literal=3, param=2, wildcard=1 per
    /// segment, compared lexicographically with earlier segments dominant.
    pub fn specificity(&self) -> Vec<u8> {
        self.segments
            .iter()
            .map(|s| match s {
                PatternSegment::Literal(_) => 3,
                PatternSegment::Param(_) => 2,
                PatternSegment::Wildcard | PatternSegment::TrailingWildcard => 1,
            })
            .collect()
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        let rendered: Vec<String> = self
            .segments
            .iter()
            .map(|s| match s {
                PatternSegment::Literal(l) => l.clone(),
                PatternSegment::Param(p) => format!("{{{p}}}"),
                PatternSegment::Wildcard | PatternSegment::TrailingWildcard => "*".to_string(),
            })
            .collect();
        write!(f, "{}", rendered.join("/"))
    }
}
