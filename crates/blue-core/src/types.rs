//! Structural type model.
//!
//! A [`TypeNode`] describes the shape of a value: a primitive, an object with
//! named fields, a union of alternatives, a list, a dictionary, or a reference
//! to a named type definition. Any of these may carry [`Constraints`].
//!
//! Equality is structural. Object fields compare as a map, so field order is
//! preserved for output but does not affect equality. Union members are
//! normalized on construction (flattened, deduplicated, and sorted by
//! [`TypeNode::canonical_key`]) so two unions with the same members compare
//! equal no matter how they were built.

use std::{fmt, str::FromStr};

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::constraints::Constraints;

/// The built-in scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Primitive {
    Text,
    Integer,
    Number,
    Boolean,
}

impl Primitive {
    /// All primitives, in declaration order.
    pub const ALL: [Primitive; 4] = [
        Primitive::Text,
        Primitive::Integer,
        Primitive::Number,
        Primitive::Boolean,
    ];

    /// The name used in type expressions.
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Text => "Text",
            Primitive::Integer => "Integer",
            Primitive::Number => "Number",
            Primitive::Boolean => "Boolean",
        }
    }

    /// Look up a primitive by its type-expression name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.name() == name)
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Primitive {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown primitive type `{s}`"))
    }
}

/// Index of a type definition in a resolved graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(usize);

impl TypeId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A reference to a named type definition.
///
/// `target` is the name as written (`Point`, `geo.Point`) until the linker
/// rewrites it to the qualified name of the definition and fills `resolved`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub target: String,
    pub resolved: Option<TypeId>,
}

impl Reference {
    /// An unresolved reference.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            resolved: None,
        }
    }

    /// A reference bound to a definition.
    pub fn resolved(target: impl Into<String>, id: TypeId) -> Self {
        Self {
            target: target.into(),
            resolved: Some(id),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// Split `alias.Name` into its alias and local name.
    pub fn split_alias(&self) -> (Option<&str>, &str) {
        match self.target.split_once('.') {
            Some((alias, name)) => (Some(alias), name),
            None => (None, self.target.as_str()),
        }
    }
}

/// An object type: named fields, optionally closed to extra fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectType {
    pub fields: IndexMap<String, TypeNode>,
    pub closed: bool,
}

impl ObjectType {
    pub fn new(fields: IndexMap<String, TypeNode>, closed: bool) -> Self {
        Self { fields, closed }
    }

    pub fn field(&self, name: &str) -> Option<&TypeNode> {
        self.fields.get(name)
    }
}

/// A normalized union of alternatives.
///
/// Members are never unions themselves, contain no duplicates, and are kept
/// in canonical order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnionType {
    members: Vec<TypeNode>,
}

impl UnionType {
    /// Build a union, flattening nested unions and removing duplicates.
    pub fn new(members: impl IntoIterator<Item = TypeNode>) -> Self {
        let mut flat = Vec::new();
        for member in members {
            match member {
                TypeNode::Union(inner) => flat.extend(inner.members),
                other => flat.push(other),
            }
        }

        let mut keyed: Vec<(String, TypeNode)> = flat
            .into_iter()
            .map(|member| (member.canonical_key(), member))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        keyed.dedup_by(|a, b| a.1 == b.1);

        Self {
            members: keyed.into_iter().map(|(_, member)| member).collect(),
        }
    }

    pub fn members(&self) -> &[TypeNode] {
        &self.members
    }

    pub fn into_members(self) -> Vec<TypeNode> {
        self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub(crate) fn members_mut(&mut self) -> &mut Vec<TypeNode> {
        &mut self.members
    }
}

/// A structural type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeNode {
    Primitive(Primitive),
    Object(ObjectType),
    Union(UnionType),
    List(Box<TypeNode>),
    Dictionary {
        key: Box<TypeNode>,
        value: Box<TypeNode>,
    },
    Reference(Reference),
    /// A type narrowed by value constraints. `node` is never itself
    /// constrained.
    Constrained {
        node: Box<TypeNode>,
        constraints: Constraints,
    },
}

impl TypeNode {
    pub fn text() -> Self {
        TypeNode::Primitive(Primitive::Text)
    }

    pub fn integer() -> Self {
        TypeNode::Primitive(Primitive::Integer)
    }

    pub fn number() -> Self {
        TypeNode::Primitive(Primitive::Number)
    }

    pub fn boolean() -> Self {
        TypeNode::Primitive(Primitive::Boolean)
    }

    /// An open object with the given fields.
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, TypeNode)>) -> Self {
        TypeNode::Object(ObjectType::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            false,
        ))
    }

    /// A closed object with the given fields.
    pub fn closed_object<K: Into<String>>(fields: impl IntoIterator<Item = (K, TypeNode)>) -> Self {
        TypeNode::Object(ObjectType::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            true,
        ))
    }

    /// A normalized union. A single surviving member is returned as itself.
    pub fn union(members: impl IntoIterator<Item = TypeNode>) -> Self {
        let mut union = UnionType::new(members);
        if union.len() == 1 {
            union.members_mut().remove(0)
        } else {
            TypeNode::Union(union)
        }
    }

    pub fn list(element: TypeNode) -> Self {
        TypeNode::List(Box::new(element))
    }

    pub fn dictionary(key: TypeNode, value: TypeNode) -> Self {
        TypeNode::Dictionary {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn reference(target: impl Into<String>) -> Self {
        TypeNode::Reference(Reference::new(target))
    }

    /// `node` narrowed by `constraints`. Empty constraints leave the node
    /// as is; on a constrained node both sets apply.
    ///
    /// Whether any value is left is not checked here.
    pub fn constrained(node: TypeNode, constraints: Constraints) -> Self {
        let (node, constraints) = match node {
            TypeNode::Constrained {
                node,
                constraints: inner,
            } => (*node, inner.narrowed(&constraints)),
            other => (other, constraints),
        };
        if constraints.is_empty() {
            node
        } else {
            TypeNode::Constrained {
                node: Box::new(node),
                constraints,
            }
        }
    }

    /// The node without its constraints, and the constraints if any.
    pub fn split_constraints(&self) -> (&TypeNode, Option<&Constraints>) {
        match self {
            TypeNode::Constrained { node, constraints } => (node, Some(constraints)),
            other => (other, None),
        }
    }

    /// Short name of the node's kind, for messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            TypeNode::Primitive(p) => p.name(),
            TypeNode::Object(_) => "object",
            TypeNode::Union(_) => "union",
            TypeNode::List(_) => "list",
            TypeNode::Dictionary { .. } => "dictionary",
            TypeNode::Reference(_) => "reference",
            TypeNode::Constrained { node, .. } => node.kind_name(),
        }
    }

    /// The object type, looking through constraints.
    pub fn as_object(&self) -> Option<&ObjectType> {
        match self.split_constraints().0 {
            TypeNode::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Visit every reference in this node, depth-first.
    pub fn for_each_reference<'a>(&'a self, f: &mut impl FnMut(&'a Reference)) {
        match self {
            TypeNode::Primitive(_) => {}
            TypeNode::Object(object) => {
                for field in object.fields.values() {
                    field.for_each_reference(f);
                }
            }
            TypeNode::Union(union) => {
                for member in union.members() {
                    member.for_each_reference(f);
                }
            }
            TypeNode::List(element) => element.for_each_reference(f),
            TypeNode::Dictionary { key, value } => {
                key.for_each_reference(f);
                value.for_each_reference(f);
            }
            TypeNode::Reference(reference) => f(reference),
            TypeNode::Constrained { node, .. } => node.for_each_reference(f),
        }
    }

    /// All references in this node, depth-first.
    pub fn references(&self) -> Vec<&Reference> {
        let mut out = Vec::new();
        self.for_each_reference(&mut |r| out.push(r));
        out
    }

    /// Whether any reference in this node is still unbound.
    pub fn has_unresolved_references(&self) -> bool {
        let mut unresolved = false;
        self.for_each_reference(&mut |r| unresolved |= !r.is_resolved());
        unresolved
    }

    /// Rebuild this node bottom-up, replacing references through `f`.
    ///
    /// Unions are renormalized afterwards since replacement may introduce
    /// duplicates or nested unions.
    pub fn try_map_references<E>(
        &self,
        f: &mut impl FnMut(&Reference) -> Result<TypeNode, E>,
    ) -> Result<TypeNode, E> {
        Ok(match self {
            TypeNode::Primitive(p) => TypeNode::Primitive(*p),
            TypeNode::Object(object) => {
                let mut fields = IndexMap::with_capacity(object.fields.len());
                for (name, field) in &object.fields {
                    fields.insert(name.clone(), field.try_map_references(f)?);
                }
                TypeNode::Object(ObjectType::new(fields, object.closed))
            }
            TypeNode::Union(union) => {
                let mut members = Vec::with_capacity(union.len());
                for member in union.members() {
                    members.push(member.try_map_references(f)?);
                }
                TypeNode::union(members)
            }
            TypeNode::List(element) => TypeNode::list(element.try_map_references(f)?),
            TypeNode::Dictionary { key, value } => {
                TypeNode::dictionary(key.try_map_references(f)?, value.try_map_references(f)?)
            }
            TypeNode::Reference(reference) => f(reference)?,
            TypeNode::Constrained { node, constraints } => {
                TypeNode::constrained(node.try_map_references(f)?, constraints.clone())
            }
        })
    }

    /// The type-expression form of this node, as a JSON value.
    ///
    /// Primitives and references become bare strings, every other node an
    /// object keyed by its constructor (`fields`, `union`, `list`,
    /// `dictionary`). Constraints add a `constraints` key, with a bare
    /// string moved under `type`. The value elaborates back into an equal
    /// node.
    pub fn to_value(&self) -> Value {
        self.value_form(false)
    }

    /// A deterministic string that identifies this node up to equality.
    pub fn canonical_key(&self) -> String {
        self.value_form(true).to_string()
    }

    fn value_form(&self, sorted: bool) -> Value {
        match self {
            TypeNode::Primitive(p) => Value::String(p.name().to_string()),
            TypeNode::Reference(reference) => {
                if sorted {
                    match reference.resolved {
                        Some(id) => Value::String(format!("{}{}", reference.target, id)),
                        None => Value::String(reference.target.clone()),
                    }
                } else {
                    Value::String(reference.target.clone())
                }
            }
            TypeNode::Object(object) => {
                let mut entries: Vec<(&String, &TypeNode)> = object.fields.iter().collect();
                if sorted {
                    entries.sort_by(|a, b| a.0.cmp(b.0));
                }
                let fields: Map<String, Value> = entries
                    .into_iter()
                    .map(|(name, field)| (name.clone(), field.value_form(sorted)))
                    .collect();

                let mut out = Map::new();
                out.insert("fields".to_string(), Value::Object(fields));
                if object.closed {
                    out.insert("closed".to_string(), Value::Bool(true));
                }
                Value::Object(out)
            }
            TypeNode::Union(union) => {
                let members = union
                    .members()
                    .iter()
                    .map(|member| member.value_form(sorted))
                    .collect();
                single_key("union", Value::Array(members))
            }
            TypeNode::List(element) => single_key("list", element.value_form(sorted)),
            TypeNode::Dictionary { key, value } => {
                let mut inner = Map::new();
                inner.insert("key".to_string(), key.value_form(sorted));
                inner.insert("value".to_string(), value.value_form(sorted));
                single_key("dictionary", Value::Object(inner))
            }
            TypeNode::Constrained { node, constraints } => {
                let mut out = match node.value_form(sorted) {
                    Value::Object(map) => map,
                    other => {
                        let mut map = Map::new();
                        map.insert("type".to_string(), other);
                        map
                    }
                };
                out.insert("constraints".to_string(), constraints.to_value());
                Value::Object(out)
            }
        }
    }
}

fn single_key(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

impl From<Primitive> for TypeNode {
    fn from(p: Primitive) -> Self {
        TypeNode::Primitive(p)
    }
}

impl fmt::Display for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeNode::Primitive(p) => write!(f, "{p}"),
            TypeNode::Reference(reference) => f.write_str(&reference.target),
            TypeNode::Object(object) => {
                if object.closed {
                    f.write_str("closed ")?;
                }
                f.write_str("{")?;
                for (i, (name, field)) in object.fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {field}")?;
                }
                f.write_str("}")
            }
            TypeNode::Union(union) => {
                f.write_str("(")?;
                for (i, member) in union.members().iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{member}")?;
                }
                f.write_str(")")
            }
            TypeNode::List(element) => write!(f, "[{element}]"),
            TypeNode::Dictionary { key, value } => write!(f, "dictionary<{key}, {value}>"),
            TypeNode::Constrained { node, constraints } => {
                write!(f, "{node} where {}", constraints.to_value())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_primitive_names() {
        for p in Primitive::ALL {
            assert_eq!(Primitive::from_name(p.name()), Some(p));
        }
        assert_eq!(Primitive::from_name("Point"), None);
        assert!("Float".parse::<Primitive>().is_err());
    }

    #[test]
    fn test_object_equality_ignores_field_order() {
        let a = TypeNode::object([("x", TypeNode::integer()), ("y", TypeNode::text())]);
        let b = TypeNode::object([("y", TypeNode::text()), ("x", TypeNode::integer())]);
        assert_eq!(a, b);
        assert_eq!(a.canonical_key(), b.canonical_key());
        assert_ne!(a.to_value().to_string(), b.to_value().to_string());
    }

    #[test]
    fn test_union_normalization() {
        let a = TypeNode::union([
            TypeNode::integer(),
            TypeNode::text(),
            TypeNode::union([TypeNode::integer(), TypeNode::boolean()]),
        ]);
        let b = TypeNode::union([TypeNode::boolean(), TypeNode::text(), TypeNode::integer()]);
        assert_eq!(a, b);

        let TypeNode::Union(union) = a else {
            panic!("expected union");
        };
        assert_eq!(union.len(), 3);
        assert!(
            union
                .members()
                .iter()
                .all(|m| !matches!(m, TypeNode::Union(_)))
        );
    }

    #[test]
    fn test_single_member_union_collapses() {
        let node = TypeNode::union([TypeNode::text(), TypeNode::text()]);
        assert_eq!(node, TypeNode::text());
    }

    #[test]
    fn test_to_value_forms() {
        let node = TypeNode::closed_object([
            ("name", TypeNode::text()),
            ("tags", TypeNode::list(TypeNode::text())),
            (
                "meta",
                TypeNode::dictionary(TypeNode::text(), TypeNode::number()),
            ),
            ("owner", TypeNode::reference("geo.Person")),
        ]);

        assert_eq!(
            node.to_value(),
            json!({
                "fields": {
                    "name": "Text",
                    "tags": {"list": "Text"},
                    "meta": {"dictionary": {"key": "Text", "value": "Number"}},
                    "owner": "geo.Person"
                },
                "closed": true
            })
        );
    }

    #[test]
    fn test_references_and_resolution_state() {
        let node = TypeNode::object([
            ("a", TypeNode::reference("A")),
            ("b", TypeNode::list(TypeNode::reference("geo.B"))),
        ]);
        let targets: Vec<&str> = node.references().iter().map(|r| r.target.as_str()).collect();
        assert_eq!(targets, vec!["A", "geo.B"]);
        assert!(node.has_unresolved_references());

        let bound = node
            .try_map_references::<()>(&mut |r| {
                Ok(TypeNode::Reference(Reference::resolved(
                    r.target.clone(),
                    TypeId::new(0),
                )))
            })
            .unwrap();
        assert!(!bound.has_unresolved_references());
    }

    #[test]
    fn test_constrained_forms() {
        let constraints = Constraints {
            min_length: Some(1),
            ..Constraints::default()
        };
        let name = TypeNode::constrained(TypeNode::text(), constraints.clone());
        assert_eq!(
            name.to_value(),
            json!({"type": "Text", "constraints": {"minLength": 1}})
        );
        assert_eq!(name.kind_name(), "Text");
        assert_eq!(name.to_string(), "Text where {\"minLength\":1}");

        let tags = TypeNode::constrained(
            TypeNode::list(TypeNode::text()),
            Constraints {
                min_items: Some(1),
                ..Constraints::default()
            },
        );
        assert_eq!(
            tags.to_value(),
            json!({"list": "Text", "constraints": {"minItems": 1}})
        );

        assert_eq!(
            TypeNode::constrained(TypeNode::text(), Constraints::default()),
            TypeNode::text()
        );
        assert_eq!(TypeNode::constrained(name.clone(), Constraints::default()), name);
        let narrowed = TypeNode::constrained(
            name,
            Constraints {
                max_length: Some(8),
                ..Constraints::default()
            },
        );
        assert_eq!(
            narrowed,
            TypeNode::constrained(
                TypeNode::text(),
                Constraints {
                    min_length: Some(1),
                    max_length: Some(8),
                    ..Constraints::default()
                }
            )
        );
    }

    #[test]
    fn test_constraints_distinguish_union_members() {
        let short = TypeNode::constrained(
            TypeNode::text(),
            Constraints {
                max_length: Some(4),
                ..Constraints::default()
            },
        );
        let union = TypeNode::union([TypeNode::text(), short.clone(), short]);
        let TypeNode::Union(union) = union else {
            panic!("expected union");
        };
        assert_eq!(union.len(), 2);
    }

    #[test]
    fn test_split_alias() {
        assert_eq!(Reference::new("geo.Point").split_alias(), (Some("geo"), "Point"));
        assert_eq!(Reference::new("Point").split_alias(), (None, "Point"));
    }

    #[test]
    fn test_display() {
        let node = TypeNode::object([
            ("x", TypeNode::integer()),
            ("v", TypeNode::union([TypeNode::text(), TypeNode::integer()])),
        ]);
        assert_eq!(node.to_string(), "{x: Integer, v: (Integer | Text)}");
    }
}
