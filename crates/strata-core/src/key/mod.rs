//! Module: key
//! Responsibility: entity key paths and the fully qualified entity key.
//! Does not own: byte encoding (see `db::codec`).

use serde::{Deserialize, Serialize};
use std::fmt;

///
/// IdOrName
///
/// Identifier of one path element. Numeric ids sort before names.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub enum IdOrName {
    Id(i64),
    Name(String),
}

impl fmt::Display for IdOrName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name:?}"),
        }
    }
}

///
/// PathElement
///
/// One `(kind, id-or-name)` pair. An element without an identifier is
/// incomplete: it may be handed to the allocator but never encoded.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct PathElement {
    pub kind: String,
    pub id_or_name: Option<IdOrName>,
}

impl PathElement {
    #[must_use]
    pub fn with_id(kind: impl Into<String>, id: i64) -> Self {
        Self {
            kind: kind.into(),
            id_or_name: Some(IdOrName::Id(id)),
        }
    }

    #[must_use]
    pub fn with_name(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id_or_name: Some(IdOrName::Name(name.into())),
        }
    }

    #[must_use]
    pub fn incomplete(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id_or_name: None,
        }
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.id_or_name.is_some()
    }
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id_or_name {
            Some(id_or_name) => write!(f, "{}:{id_or_name}", self.kind),
            None => write!(f, "{}:?", self.kind),
        }
    }
}

///
/// KeyPath
///
/// Ordered ancestor chain; the last element identifies the entity itself.
/// Ordering is element-wise, so an ancestor sorts before its descendants.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct KeyPath(Vec<PathElement>);

impl KeyPath {
    #[must_use]
    pub const fn new(elements: Vec<PathElement>) -> Self {
        Self(elements)
    }

    /// Convenience constructor from `(kind, id-or-name)` pairs.
    #[must_use]
    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, IdOrName)>) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(kind, id_or_name)| PathElement {
                    kind: kind.into(),
                    id_or_name: Some(id_or_name),
                })
                .collect(),
        )
    }

    #[must_use]
    pub fn elements(&self) -> &[PathElement] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The entity's own element.
    #[must_use]
    pub fn last(&self) -> Option<&PathElement> {
        self.0.last()
    }

    /// Kind of the entity this path identifies.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.0.last().map(|element| element.kind.as_str())
    }

    /// The first `len` elements as a new path.
    #[must_use]
    pub fn prefix(&self, len: usize) -> Self {
        Self(self.0[..len.min(self.0.len())].to_vec())
    }

    /// Elements from `start` to the end as a new path.
    #[must_use]
    pub fn suffix(&self, start: usize) -> Self {
        Self(self.0[start.min(self.0.len())..].to_vec())
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        (self.0.len() > 1).then(|| self.prefix(self.0.len() - 1))
    }

    /// True if every element of `ancestor` is a leading element of `self`.
    #[must_use]
    pub fn starts_with(&self, ancestor: &Self) -> bool {
        self.0.starts_with(&ancestor.0)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(PathElement::is_complete)
    }

    pub fn push(&mut self, element: PathElement) {
        self.0.push(element);
    }

    /// Replace the identifier of the entity's own element.
    pub fn set_last_id(&mut self, id: i64) {
        if let Some(last) = self.0.last_mut() {
            last.id_or_name = Some(IdOrName::Id(id));
        }
    }
}

impl From<Vec<PathElement>> for KeyPath {
    fn from(elements: Vec<PathElement>) -> Self {
        Self(elements)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, element) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{element}")?;
        }
        Ok(())
    }
}

///
/// EntityKey
///
/// Fully qualified entity identity: tenant, namespace and key path.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct EntityKey {
    pub project_id: String,
    pub namespace: String,
    pub path: KeyPath,
}

impl EntityKey {
    #[must_use]
    pub fn new(project_id: impl Into<String>, namespace: impl Into<String>, path: KeyPath) -> Self {
        Self {
            project_id: project_id.into(),
            namespace: namespace.into(),
            path,
        }
    }

    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.path.kind()
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]:{}", self.project_id, self.namespace, self.path)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> KeyPath {
        KeyPath::from_pairs([
            ("Guestbook", IdOrName::Name("main".to_string())),
            ("Greeting", IdOrName::Id(7)),
        ])
    }

    #[test]
    fn ids_sort_before_names() {
        assert!(IdOrName::Id(i64::MAX) < IdOrName::Name(String::new()));
    }

    #[test]
    fn ancestors_sort_before_descendants() {
        let full = path();
        let parent = full.parent().expect("two-element path has a parent");
        assert!(parent < full);
        assert!(full.starts_with(&parent));
        assert!(!parent.starts_with(&full));
    }

    #[test]
    fn incomplete_elements_make_the_path_incomplete() {
        let mut partial = path().prefix(1);
        partial.push(PathElement::incomplete("Greeting"));
        assert!(!partial.is_complete());

        partial.set_last_id(42);
        assert!(partial.is_complete());
        assert_eq!(partial.to_string(), "Guestbook:\"main\"/Greeting:42");
    }
}
