use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// A path element in a result tree: a response key or a list index.
/// e.g `/user/friends/3/name`
#[derive(Clone, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// A list index.
    Index(usize),

    /// A response key.
    Key(String),
}

impl fmt::Display for PathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElement::Index(index) => write!(f, "{index}"),
            PathElement::Key(key) => write!(f, "{key}"),
        }
    }
}

/// The absolute address of a node from the root of a result tree.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultPath(Vec<PathElement>);

impl ResultPath {
    /// The root path.
    pub fn root() -> Self {
        ResultPath(Vec::new())
    }

    /// Parse a path of the form `user/friends/3/name`. Numeric segments are list indexes.
    pub fn parse(path: &str) -> Self {
        ResultPath(
            path.split('/')
                .filter(|segment| !segment.is_empty())
                .map(|segment| match segment.parse::<usize>() {
                    Ok(index) => PathElement::Index(index),
                    Err(_) => PathElement::Key(segment.to_string()),
                })
                .collect(),
        )
    }

    /// This path extended with a response key.
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut elements = self.0.clone();
        elements.push(PathElement::Key(key.into()));
        ResultPath(elements)
    }

    /// This path extended with a list index.
    pub fn index(&self, index: usize) -> Self {
        let mut elements = self.0.clone();
        elements.push(PathElement::Index(index));
        ResultPath(elements)
    }

    /// This path extended with another path.
    pub fn join(&self, other: &ResultPath) -> Self {
        let mut elements = self.0.clone();
        elements.extend(other.0.iter().cloned());
        ResultPath(elements)
    }

    pub fn parent(&self) -> Option<Self> {
        self.0
            .split_last()
            .map(|(_, parent)| ResultPath(parent.to_vec()))
    }

    /// The last response key, skipping list indexes.
    pub fn last_key(&self) -> Option<&str> {
        self.0.iter().rev().find_map(|element| match element {
            PathElement::Key(key) => Some(key.as_str()),
            PathElement::Index(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }

    /// This path without its list indexes, as used for field ids.
    pub fn without_indexes(&self) -> Self {
        ResultPath(
            self.0
                .iter()
                .filter(|element| matches!(element, PathElement::Key(_)))
                .cloned()
                .collect(),
        )
    }
}

impl fmt::Display for ResultPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for element in &self.0 {
            write!(f, "/{element}")?;
        }
        Ok(())
    }
}

impl From<Vec<PathElement>> for ResultPath {
    fn from(elements: Vec<PathElement>) -> Self {
        ResultPath(elements)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_and_display() {
        let path = ResultPath::parse("user/friends/3/name");
        assert_eq!(path.to_string(), "/user/friends/3/name");
        assert_eq!(
            path,
            ResultPath::root()
                .key("user")
                .key("friends")
                .index(3)
                .key("name")
        );
        assert_eq!(ResultPath::parse("").to_string(), "/");
        assert_eq!(ResultPath::parse("/user/"), ResultPath::root().key("user"));
    }

    #[test]
    fn parent_and_last_key() {
        let path = ResultPath::parse("users/1");
        assert_eq!(path.parent(), Some(ResultPath::parse("users")));
        assert_eq!(path.last_key(), Some("users"));
        assert_eq!(ResultPath::root().parent(), None);
    }

    #[test]
    fn without_indexes() {
        assert_eq!(
            ResultPath::parse("users/1/company").without_indexes(),
            ResultPath::parse("users/company")
        );
    }

    #[test]
    fn serde() {
        let path = ResultPath::parse("users/1/company");
        assert_eq!(serde_json::to_value(&path).unwrap(), json!(["users", 1, "company"]));
        assert_eq!(
            serde_json::from_value::<ResultPath>(json!(["users", 1, "company"])).unwrap(),
            path
        );
    }
}
