//! Document syntax tree.
//!
//! Every [`Node`] and every mapping key carries the [`Span`] it was parsed
//! from. Equality ignores spans, so two documents that differ only in layout
//! or syntax style (block YAML versus JSON) compare equal.

use std::fmt;

use crate::span::{Span, Spanned};

/// A parsed value with its source span.
#[derive(Debug, Clone)]
pub struct Node {
    kind: NodeKind,
    span: Span,
}

/// The value carried by a [`Node`].
#[derive(Debug, Clone)]
pub enum NodeKind {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Sequence(Vec<Node>),
    Mapping(Mapping),
}

/// An ordered mapping with string keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    entries: Vec<MappingEntry>,
}

/// One `key: value` pair of a [`Mapping`].
#[derive(Debug, Clone, PartialEq)]
pub struct MappingEntry {
    pub key: Spanned<String>,
    pub value: Node,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// A node with no meaningful source position.
    pub fn detached(kind: NodeKind) -> Self {
        Self::new(kind, Span::default())
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn into_kind(self) -> NodeKind {
        self.kind
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, NodeKind::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.kind {
            NodeKind::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match &self.kind {
            NodeKind::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match &self.kind {
            NodeKind::Mapping(mapping) => Some(mapping),
            _ => None,
        }
    }

    /// Short description of the node's kind, for messages.
    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            NodeKind::Null => "null",
            NodeKind::Bool(_) => "boolean",
            NodeKind::Integer(_) => "integer",
            NodeKind::Float(_) => "float",
            NodeKind::String(_) => "string",
            NodeKind::Sequence(_) => "sequence",
            NodeKind::Mapping(_) => "mapping",
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl PartialEq for NodeKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (NodeKind::Null, NodeKind::Null) => true,
            (NodeKind::Bool(a), NodeKind::Bool(b)) => a == b,
            (NodeKind::Integer(a), NodeKind::Integer(b)) => a == b,
            // NaN equals NaN so that parsed trees compare reflexively.
            (NodeKind::Float(a), NodeKind::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (NodeKind::String(a), NodeKind::String(b)) => a == b,
            (NodeKind::Sequence(a), NodeKind::Sequence(b)) => a == b,
            (NodeKind::Mapping(a), NodeKind::Mapping(b)) => a == b,
            _ => false,
        }
    }
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Callers check for duplicate keys.
    pub fn push(&mut self, key: Spanned<String>, value: Node) {
        self.entries.push(MappingEntry { key, value });
    }

    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entry(key).map(|entry| &entry.value)
    }

    pub fn entry(&self, key: &str) -> Option<&MappingEntry> {
        self.entries.iter().find(|entry| entry.key.as_str() == key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entry(key).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MappingEntry> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a Mapping {
    type Item = &'a MappingEntry;
    type IntoIter = std::slice::Iter<'a, MappingEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            NodeKind::Null => f.write_str("null"),
            NodeKind::Bool(b) => write!(f, "{b}"),
            NodeKind::Integer(i) => write!(f, "{i}"),
            NodeKind::Float(x) => write!(f, "{x}"),
            NodeKind::String(s) => write!(f, "{s:?}"),
            NodeKind::Sequence(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            NodeKind::Mapping(mapping) => {
                f.write_str("{")?;
                for (i, entry) in mapping.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}: {}", entry.key.as_str(), entry.value)?;
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string(s: &str, at: usize) -> Node {
        Node::new(NodeKind::String(s.to_string()), Span::new(at..at + s.len()))
    }

    #[test]
    fn test_equality_ignores_spans() {
        assert_eq!(string("a", 0), string("a", 40));
        assert_ne!(string("a", 0), string("b", 0));
    }

    #[test]
    fn test_nan_equals_nan() {
        let a = Node::detached(NodeKind::Float(f64::NAN));
        assert_eq!(a, a.clone());
        assert_ne!(
            Node::detached(NodeKind::Float(1.0)),
            Node::detached(NodeKind::Integer(1))
        );
    }

    #[test]
    fn test_mapping_lookup() {
        let mut mapping = Mapping::new();
        mapping.push(Spanned::new("x".to_string(), Span::new(0..1)), string("1", 3));
        mapping.push(Spanned::new("y".to_string(), Span::new(5..6)), string("2", 8));

        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.get("y").and_then(Node::as_str), Some("2"));
        assert!(mapping.get("z").is_none());
        assert_eq!(mapping.keys().collect::<Vec<_>>(), vec!["x", "y"]);
        assert_eq!(mapping.entry("y").map(|e| e.key.span()), Some(Span::new(5..6)));
    }

    #[test]
    fn test_display() {
        let node = Node::detached(NodeKind::Sequence(vec![
            Node::detached(NodeKind::Integer(1)),
            Node::detached(NodeKind::Null),
            string("a", 0),
        ]));
        assert_eq!(node.to_string(), "[1, null, \"a\"]");
    }
}
