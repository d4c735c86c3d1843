//! Store paths.
//!
//! A path addresses one location inside a JSON-like state tree: a sequence
//! of object keys and array indices. Paths key the store's lazily created
//! per-path signals, and ancestor/descendant relationships between paths
//! decide which signals a write refreshes.
//!
//! Matching is segment-aware: `user.name` is not an ancestor of
//! `user.names`, which a raw string-prefix check would get wrong.

use std::fmt::{self, Display};

use smallvec::SmallVec;

/// One step into the state tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// An object key.
    Key(String),
    /// An array index.
    Index(usize),
}

impl From<&str> for Segment {
    fn from(key: &str) -> Self {
        Segment::Key(key.to_string())
    }
}

impl From<String> for Segment {
    fn from(key: String) -> Self {
        Segment::Key(key)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

/// A location in the state tree. The empty path is the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path {
    segments: SmallVec<[Segment; 4]>,
}

impl Path {
    /// The root path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a dot-joined path. All-digit segments become indices.
    ///
    /// ```rust,ignore
    /// let p = Path::parse("todos.0.title");
    /// assert_eq!(p.len(), 3);
    /// ```
    pub fn parse(path: &str) -> Self {
        if path.is_empty() {
            return Self::root();
        }
        let segments = path
            .split('.')
            .map(|part| match part.parse::<usize>() {
                Ok(index) => Segment::Index(index),
                Err(_) => Segment::Key(part.to_string()),
            })
            .collect();
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// The first object key of the path, if the path starts with one.
    pub fn head_key(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Segment::Key(key)) => Some(key),
            _ => None,
        }
    }

    /// Extend the path by one segment.
    pub fn child(&self, segment: impl Into<Segment>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// Whether `self` is a strict ancestor of `other`.
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        other.segments.len() > self.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    /// Whether `self` is a strict descendant of `other`.
    pub fn is_descendant_of(&self, other: &Path) -> bool {
        other.is_ancestor_of(self)
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            match segment {
                Segment::Key(key) => write!(f, "{key}")?,
                Segment::Index(index) => write!(f, "{index}")?,
            }
        }
        Ok(())
    }
}

impl From<&str> for Path {
    fn from(path: &str) -> Self {
        Path::parse(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display_round_trip() {
        let path = Path::parse("todos.0.title");
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("todos".into()),
                Segment::Index(0),
                Segment::Key("title".into()),
            ]
        );
        assert_eq!(path.to_string(), "todos.0.title");
    }

    #[test]
    fn empty_string_is_root() {
        assert_eq!(Path::parse(""), Path::root());
        assert!(Path::root().is_empty());
    }

    #[test]
    fn ancestor_matching_is_segment_aware() {
        let user = Path::parse("user");
        let name = Path::parse("user.name");
        let names = Path::parse("user.names");

        assert!(user.is_ancestor_of(&name));
        assert!(name.is_descendant_of(&user));

        // Not an ancestor of itself.
        assert!(!user.is_ancestor_of(&user));

        // Key boundaries matter; "name" does not prefix-match "names".
        assert!(!name.is_ancestor_of(&names));
        assert!(!names.is_descendant_of(&name));
    }

    #[test]
    fn root_is_ancestor_of_everything() {
        let root = Path::root();
        assert!(root.is_ancestor_of(&Path::parse("a")));
        assert!(root.is_ancestor_of(&Path::parse("a.b.0")));
        assert!(!root.is_ancestor_of(&root));
    }

    #[test]
    fn child_extends_path() {
        let path = Path::root().child("items").child(2);
        assert_eq!(path.to_string(), "items.2");
    }
}
