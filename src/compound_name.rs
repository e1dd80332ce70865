// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use crate::error::QueryProfileError;
use crate::Rc;

use core::fmt;
use core::str::FromStr;

/// A dotted name such as `a.b.c`, stored as its segments.
///
/// There is no escaping: every `.` separates two segments. Feature names such as
/// `query(embedding)` are ordinary segments as long as they contain no dot.
/// The empty name is the root of a profile.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompoundName {
    segments: Vec<Rc<str>>,
}

impl CompoundName {
    /// The empty name.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a dotted name. Empty segments (`a..b`, `.a`, `a.`) are rejected;
    /// the empty string is the root.
    pub fn parse(name: &str) -> Result<Self, QueryProfileError> {
        if name.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for segment in name.split('.') {
            if segment.is_empty() {
                return Err(QueryProfileError::InvalidName {
                    name: name.into(),
                    reason: "names cannot contain empty segments".into(),
                });
            }
            segments.push(Rc::from(segment));
        }
        Ok(Self { segments })
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Rc<str>>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(|s| s.as_ref())
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_ref())
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(|s| s.as_ref())
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> + '_ {
        self.segments.iter().map(|s| s.as_ref())
    }

    /// The first `n` segments (all of them if `n` exceeds the length).
    pub fn prefix(&self, n: usize) -> Self {
        let n = n.min(self.segments.len());
        Self {
            segments: self.segments[..n].to_vec(),
        }
    }

    /// Everything after the first segment.
    pub fn rest(&self) -> Self {
        self.suffix(1)
    }

    /// Everything from segment `n` on.
    pub fn suffix(&self, n: usize) -> Self {
        let n = n.min(self.segments.len());
        Self {
            segments: self.segments[n..].to_vec(),
        }
    }

    /// Everything but the last segment.
    pub fn parent(&self) -> Self {
        self.prefix(self.segments.len().saturating_sub(1))
    }

    pub fn append(&self, segment: impl Into<Rc<str>>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    pub fn concat(&self, other: &CompoundName) -> Self {
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Self { segments }
    }

    pub fn starts_with(&self, prefix: &CompoundName) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Replaces segment `index` and returns the result.
    pub(crate) fn with_segment(mut self, index: usize, segment: Rc<str>) -> Self {
        if let Some(s) = self.segments.get_mut(index) {
            *s = segment;
        }
        self
    }
}

impl FromStr for CompoundName {
    type Err = QueryProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CompoundName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl fmt::Debug for CompoundName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{self}'")
    }
}
