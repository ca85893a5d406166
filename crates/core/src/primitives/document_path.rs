//! Hierarchical paths into a document tree
//!
//! A path is a non-empty sequence of segments whose first segment is always
//! `root`. The textual form joins segments with `|`, e.g. `root|a|b`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the root node
pub const ROOT: &str = "root";

/// Separator used by the textual form
pub const SEPARATOR: char = '|';

/// Path to a node of a document tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentPath {
    segments: Vec<String>,
}

impl DocumentPath {
    /// The root path
    pub fn root() -> Self {
        DocumentPath {
            segments: vec![ROOT.to_string()],
        }
    }

    /// Build a path from its segments
    ///
    /// The first segment must be `root` and no segment may be empty or
    /// contain the separator.
    pub fn from_segments<I, S>(segments: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        match segments.first() {
            Some(first) if first == ROOT => {}
            _ => {
                return Err(Error::invalid_argument(format!(
                    "document path must start with '{}'",
                    ROOT
                )))
            }
        }
        for segment in &segments[1..] {
            validate_segment(segment)?;
        }
        Ok(DocumentPath { segments })
    }

    /// Path of a direct child of this node
    pub fn child(&self, name: &str) -> Result<Self> {
        validate_segment(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(DocumentPath { segments })
    }

    /// Path of the parent node, `None` for the root
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(DocumentPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Last segment of the path
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or(ROOT)
    }

    /// All segments, starting with `root`
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether this is the root path
    pub fn is_root(&self) -> bool {
        self.segments.len() == 1
    }

    /// Whether this path equals `ancestor` or lies below it
    pub fn is_descendant_of(&self, ancestor: &DocumentPath) -> bool {
        self.segments.starts_with(&ancestor.segments)
    }

    /// Deepest path that every given path descends from
    ///
    /// Returns `None` for an empty input.
    pub fn least_common_ancestor(paths: &[DocumentPath]) -> Option<DocumentPath> {
        let (first, rest) = paths.split_first()?;
        let mut common = first.segments.len();
        for path in rest {
            common = first
                .segments
                .iter()
                .zip(&path.segments)
                .take(common)
                .take_while(|(a, b)| a == b)
                .count();
        }
        Some(DocumentPath {
            segments: first.segments[..common.max(1)].to_vec(),
        })
    }
}

fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() || segment.contains(SEPARATOR) {
        return Err(Error::invalid_argument(format!(
            "invalid document path segment '{}'",
            segment
        )));
    }
    Ok(())
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                write!(f, "{}", SEPARATOR)?;
            }
            f.write_str(segment)?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for DocumentPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DocumentPath::from_segments(s.split(SEPARATOR))
    }
}
