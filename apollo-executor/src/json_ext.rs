//! Performance oriented JSON manipulation.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

/// Extension trait for [`serde_json_bytes::Value`].
pub(crate) trait ValueExt {
    /// Returns a string for errors: short values are displayed whole,
    /// long values are truncated.
    fn describe(&self) -> String;

    /// Whether the value is an integer that fits a GraphQL `Int`.
    fn is_valid_int_input(&self) -> bool;

    /// Whether the value is accepted as a GraphQL `Float` input.
    fn is_valid_float_input(&self) -> bool;
}

impl ValueExt for Value {
    fn describe(&self) -> String {
        const MAX_LEN: usize = 64;
        let mut repr = match self {
            Value::String(s) => format!("{:?}", s.as_str()),
            other => serde_json::to_string(other).unwrap_or_default(),
        };
        if repr.len() > MAX_LEN {
            let mut end = MAX_LEN;
            while !repr.is_char_boundary(end) {
                end -= 1;
            }
            repr.truncate(end);
            repr.push_str("...");
        }
        repr
    }

    fn is_valid_int_input(&self) -> bool {
        // https://spec.graphql.org/October2021/#sec-Int.Input-Coercion
        self.as_i64().and_then(|x| i32::try_from(x).ok()).is_some()
    }

    fn is_valid_float_input(&self) -> bool {
        // https://spec.graphql.org/October2021/#sec-Float.Input-Coercion
        self.is_f64() || self.is_valid_int_input()
    }
}

/// A path element: either a response key or a list index.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// An index path element.
    Index(usize),

    /// A key path element.
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

impl From<usize> for PathElement {
    fn from(index: usize) -> Self {
        PathElement::Index(index)
    }
}

impl From<&str> for PathElement {
    fn from(key: &str) -> Self {
        PathElement::Key(key.to_string())
    }
}

impl From<String> for PathElement {
    fn from(key: String) -> Self {
        PathElement::Key(key)
    }
}

/// A path into the result document.
///
/// This can be composed of keys and indices, and serializes as a JSON array
/// (`["items", 1, "id"]`), the format used by GraphQL errors.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn empty() -> Path {
        Path(Default::default())
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

    pub fn last(&self) -> Option<&PathElement> {
        self.0.last()
    }

    pub fn last_key(&self) -> Option<&str> {
        self.0.iter().rev().find_map(|element| match element {
            PathElement::Key(key) => Some(key.as_str()),
            PathElement::Index(_) => None,
        })
    }

    /// Returns a new path with `element` appended.
    pub fn join(&self, element: impl Into<PathElement>) -> Self {
        let mut elements = Vec::with_capacity(self.0.len() + 1);
        elements.extend(self.0.iter().cloned());
        elements.push(element.into());
        Path(elements)
    }

    pub fn push(&mut self, element: impl Into<PathElement>) {
        self.0.push(element.into())
    }

    pub fn pop(&mut self) -> Option<PathElement> {
        self.0.pop()
    }
}

impl<T> FromIterator<T> for Path
where
    T: Into<PathElement>,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Path(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for element in self.iter() {
            write!(f, "/")?;
            element.fmt(f)?;
        }
        Ok(())
    }
}

/// Build a [`Path`] from keys and indices: `path!["items", 1, "id"]`.
#[macro_export]
macro_rules! path {
    ($($element:expr),* $(,)?) => {
        $crate::json_ext::Path(vec![$($crate::json_ext::PathElement::from($element)),*])
    };
}
