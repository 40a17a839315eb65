//! Type unification.
//!
//! Unification merges two structural types into the most specific type that
//! both describe, or reports where they disagree:
//!
//! - identical primitives unify to themselves
//! - objects unify field-wise; a field present in only one operand is
//!   carried through unless the other operand is closed
//! - unions take the set union of their members
//! - lists unify element-wise, dictionaries key-wise and value-wise
//! - constraints intersect, taking the tighter of each bound; bounds that
//!   leave no value are a mismatch
//! - resolved references unify when they name the same definition, or,
//!   given the [`Definitions`], when the definitions they name unify
//!
//! The operation is commutative up to structural equality. It is associative
//! over union-free operands and over unions, but a union absorbs an object
//! as a whole member rather than merging into it.

use std::fmt;

use indexmap::IndexMap;
use thiserror::Error;

use crate::{
    constraints::Constraints,
    types::{ObjectType, Reference, TypeId, TypeNode},
};

/// Options that tighten unification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnifyOptions {
    /// Treat every object as closed: a field present in only one operand is
    /// a mismatch.
    pub closed_objects: bool,
}

/// Location inside a type where unification failed.
///
/// Segments are field names, `[]` for a list element and `{key}` /
/// `{value}` for dictionary parts. The root path displays as `<root>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypePath(Vec<String>);

impl TypePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// A copy of this path with `prefix` prepended.
    pub fn prefixed(&self, prefix: &str) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.push(prefix.to_string());
        segments.extend(self.0.iter().cloned());
        Self(segments)
    }
}

impl fmt::Display for TypePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        f.write_str(&self.0.join("."))
    }
}

impl From<&[&str]> for TypePath {
    fn from(segments: &[&str]) -> Self {
        Self(segments.iter().map(|s| s.to_string()).collect())
    }
}

/// Failure to unify two types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnificationError {
    /// The operands have incompatible shapes at `path`.
    #[error("type mismatch at `{path}`: {reason}")]
    TypeMismatch {
        path: TypePath,
        left: String,
        right: String,
        reason: String,
    },

    /// Two references name different definitions.
    #[error("cannot unify references `{left}` and `{right}` at `{path}`")]
    IncompatibleReferences {
        path: TypePath,
        left: String,
        right: String,
    },

    /// An operand still contains an unbound reference.
    #[error("internal error at `{path}`: {message}")]
    Internal { path: TypePath, message: String },
}

impl UnificationError {
    pub fn path(&self) -> &TypePath {
        match self {
            UnificationError::TypeMismatch { path, .. }
            | UnificationError::IncompatibleReferences { path, .. }
            | UnificationError::Internal { path, .. } => path,
        }
    }

    /// The same error reported under an enclosing field.
    pub fn prefixed(self, prefix: &str) -> Self {
        match self {
            UnificationError::TypeMismatch {
                path,
                left,
                right,
                reason,
            } => UnificationError::TypeMismatch {
                path: path.prefixed(prefix),
                left,
                right,
                reason,
            },
            UnificationError::IncompatibleReferences { path, left, right } => {
                UnificationError::IncompatibleReferences {
                    path: path.prefixed(prefix),
                    left,
                    right,
                }
            }
            UnificationError::Internal { path, message } => UnificationError::Internal {
                path: path.prefixed(prefix),
                message,
            },
        }
    }
}

/// Unify two types with default options.
///
/// # Examples
///
/// ```
/// use blue_core::{TypeNode, unify};
///
/// let base = TypeNode::object([("x", TypeNode::integer())]);
/// let ext = TypeNode::object([("x", TypeNode::integer()), ("y", TypeNode::text())]);
///
/// let merged = unify(&base, &ext).unwrap();
/// assert_eq!(merged, ext);
/// ```
pub fn unify(a: &TypeNode, b: &TypeNode) -> Result<TypeNode, UnificationError> {
    unify_with(a, b, UnifyOptions::default())
}

/// Unify two types.
///
/// Resolved references unify only with references to the same definition.
/// Use [`unify_in`] to compare the definitions they name.
pub fn unify_with(
    a: &TypeNode,
    b: &TypeNode,
    options: UnifyOptions,
) -> Result<TypeNode, UnificationError> {
    unify_in(a, b, options, &Opaque)
}

/// The definitions that resolved references name.
pub trait Definitions {
    fn definition(&self, id: TypeId) -> Option<&TypeNode>;
}

/// No definitions: references are opaque.
#[derive(Debug, Clone, Copy, Default)]
pub struct Opaque;

impl Definitions for Opaque {
    fn definition(&self, _id: TypeId) -> Option<&TypeNode> {
        None
    }
}

/// Definitions indexed by [`TypeId`].
impl Definitions for [TypeNode] {
    fn definition(&self, id: TypeId) -> Option<&TypeNode> {
        self.get(id.index())
    }
}

/// Unify two types whose references name entries of `definitions`.
///
/// A reference meeting a structural type or a reference to another
/// definition is unified through its definition. Where the result equals a
/// definition, the reference is kept instead of copying the definition, so
/// shared and recursive definitions stay shared. A pair of definitions
/// already being compared further up is assumed to unify.
///
/// # Examples
///
/// ```
/// use blue_core::{Reference, TypeId, TypeNode, UnifyOptions, unify_in};
///
/// let definitions = [TypeNode::text()];
/// let id = TypeNode::Reference(Reference::resolved("Id", TypeId::new(0)));
///
/// let merged = unify_in(&id, &TypeNode::text(), UnifyOptions::default(), &definitions[..]).unwrap();
/// assert_eq!(merged, id);
/// assert!(unify_in(&id, &TypeNode::integer(), UnifyOptions::default(), &definitions[..]).is_err());
/// ```
pub fn unify_in<D: Definitions + ?Sized>(
    a: &TypeNode,
    b: &TypeNode,
    options: UnifyOptions,
    definitions: &D,
) -> Result<TypeNode, UnificationError> {
    for operand in [a, b] {
        if let Some(reference) = first_unresolved(operand) {
            return Err(unresolved(TypePath::root(), reference));
        }
    }

    let mut unifier = Unifier {
        options,
        definitions,
        path: Vec::new(),
        assumed: Vec::new(),
        unfolding: Vec::new(),
    };
    unifier.unify(a, b)
}

fn first_unresolved(node: &TypeNode) -> Option<&Reference> {
    let mut found = None;
    node.for_each_reference(&mut |r| {
        if found.is_none() && !r.is_resolved() {
            found = Some(r);
        }
    });
    found
}

fn unresolved(path: TypePath, reference: &Reference) -> UnificationError {
    UnificationError::Internal {
        path,
        message: format!("reference `{}` has not been resolved", reference.target),
    }
}

struct Unifier<'d, D: ?Sized> {
    options: UnifyOptions,
    definitions: &'d D,
    path: Vec<String>,
    /// Pairs of definitions being compared.
    assumed: Vec<(TypeId, TypeId)>,
    /// Definitions being unfolded against a structural operand, which is
    /// compared by address.
    unfolding: Vec<(TypeId, *const TypeNode)>,
}

impl<'d, D: Definitions + ?Sized> Unifier<'d, D> {
    fn unify(&mut self, a: &TypeNode, b: &TypeNode) -> Result<TypeNode, UnificationError> {
        match (a, b) {
            (TypeNode::Union(x), TypeNode::Union(y)) => Ok(TypeNode::union(
                x.members().iter().chain(y.members()).cloned(),
            )),
            (TypeNode::Union(x), other) | (other, TypeNode::Union(x)) => Ok(TypeNode::union(
                x.members().iter().cloned().chain([other.clone()]),
            )),
            (
                TypeNode::Constrained {
                    node: x,
                    constraints: cx,
                },
                TypeNode::Constrained {
                    node: y,
                    constraints: cy,
                },
            ) => {
                let node = self.unify(x, y)?;
                self.constrain(node, cx, Some(cy), a, b)
            }
            (TypeNode::Constrained { node, constraints }, other) => {
                let node = self.unify(node, other)?;
                self.constrain(node, constraints, None, a, b)
            }
            (other, TypeNode::Constrained { node, constraints }) => {
                let node = self.unify(other, node)?;
                self.constrain(node, constraints, None, a, b)
            }
            (TypeNode::Reference(x), TypeNode::Reference(y)) => self.unify_references(x, y),
            (TypeNode::Reference(x), other) => self.unify_unfolded(x, other, true, a, b),
            (other, TypeNode::Reference(y)) => self.unify_unfolded(y, other, false, a, b),
            (TypeNode::Primitive(p), TypeNode::Primitive(q)) if p == q => Ok(a.clone()),
            (TypeNode::Object(x), TypeNode::Object(y)) => self.unify_objects(x, y),
            (TypeNode::List(x), TypeNode::List(y)) => {
                let element = self.nested("[]", |u| u.unify(x, y))?;
                Ok(TypeNode::list(element))
            }
            (
                TypeNode::Dictionary {
                    key: ka,
                    value: va,
                },
                TypeNode::Dictionary {
                    key: kb,
                    value: vb,
                },
            ) => {
                let key = self.nested("{key}", |u| u.unify(ka, kb))?;
                let value = self.nested("{value}", |u| u.unify(va, vb))?;
                Ok(TypeNode::dictionary(key, value))
            }
            _ => Err(self.mismatch(
                a,
                b,
                format!("expected {}, found {}", a.kind_name(), b.kind_name()),
            )),
        }
    }

    // ============================================================================
    // References
    // ============================================================================

    fn unify_references(
        &mut self,
        x: &Reference,
        y: &Reference,
    ) -> Result<TypeNode, UnificationError> {
        let (i, j) = match (x.resolved, y.resolved) {
            (Some(i), Some(j)) => (i, j),
            (None, _) => return Err(unresolved(self.current_path(), x)),
            (_, None) => return Err(unresolved(self.current_path(), y)),
        };
        if i == j {
            return Ok(TypeNode::Reference(x.clone()));
        }

        let (Some(left), Some(right)) = (self.unfold(i), self.unfold(j)) else {
            return Err(UnificationError::IncompatibleReferences {
                path: self.current_path(),
                left: x.target.clone(),
                right: y.target.clone(),
            });
        };

        let first = if i < j { x } else { y };
        if self.assumed.contains(&(i, j)) || self.assumed.contains(&(j, i)) {
            return Ok(TypeNode::Reference(first.clone()));
        }

        self.assumed.push((i, j));
        let merged = self.unify(left, right);
        self.assumed.pop();
        let merged = merged?;

        let keep = [(i, x, left), (j, y, right)]
            .into_iter()
            .filter(|(_, _, definition)| **definition == merged)
            .min_by_key(|(id, _, _)| *id);
        Ok(match keep {
            Some((_, reference, _)) => TypeNode::Reference(reference.clone()),
            None => merged,
        })
    }

    /// Unify a reference with a structural operand through its definition.
    fn unify_unfolded(
        &mut self,
        reference: &Reference,
        other: &TypeNode,
        reference_first: bool,
        a: &TypeNode,
        b: &TypeNode,
    ) -> Result<TypeNode, UnificationError> {
        let Some(id) = reference.resolved else {
            return Err(unresolved(self.current_path(), reference));
        };
        let Some(definition) = self.unfold(id) else {
            return Err(self.mismatch(
                a,
                b,
                format!("expected {}, found {}", a.kind_name(), b.kind_name()),
            ));
        };

        let state = (id, other as *const TypeNode);
        if self.unfolding.contains(&state) {
            return Ok(TypeNode::Reference(reference.clone()));
        }

        self.unfolding.push(state);
        let merged = if reference_first {
            self.unify(definition, other)
        } else {
            self.unify(other, definition)
        };
        self.unfolding.pop();
        let merged = merged?;

        if merged == *definition {
            Ok(TypeNode::Reference(reference.clone()))
        } else {
            Ok(merged)
        }
    }

    /// The definition `id` names, following aliases of other definitions.
    /// `None` when unknown or when the aliases form a cycle.
    fn unfold(&self, id: TypeId) -> Option<&'d TypeNode> {
        let mut seen = vec![id];
        let mut node = self.definitions.definition(id)?;
        while let TypeNode::Reference(Reference {
            resolved: Some(next),
            ..
        }) = node
        {
            if seen.contains(next) {
                return None;
            }
            seen.push(*next);
            node = self.definitions.definition(*next)?;
        }
        Some(node)
    }

    // ============================================================================
    // Constraints
    // ============================================================================

    fn constrain(
        &mut self,
        node: TypeNode,
        constraints: &Constraints,
        other: Option<&Constraints>,
        a: &TypeNode,
        b: &TypeNode,
    ) -> Result<TypeNode, UnificationError> {
        // The unified node may carry constraints of its own from a
        // definition.
        let inner = node.split_constraints().1.cloned();
        let combined = match other {
            Some(other) => constraints.intersect(other),
            None => Ok(constraints.clone()),
        }
        .and_then(|combined| match &inner {
            Some(inner) => combined.intersect(inner),
            None => Ok(combined),
        });
        match combined {
            Ok(constraints) => Ok(TypeNode::constrained(node, constraints)),
            Err(reason) => Err(self.mismatch(a, b, format!("conflicting constraints: {reason}"))),
        }
    }

    fn unify_objects(
        &mut self,
        x: &ObjectType,
        y: &ObjectType,
    ) -> Result<TypeNode, UnificationError> {
        let strict = self.options.closed_objects;
        let mut fields = IndexMap::with_capacity(x.fields.len().max(y.fields.len()));

        for (name, left) in &x.fields {
            match y.fields.get(name) {
                Some(right) => {
                    let merged = self.nested(name, |u| u.unify(left, right))?;
                    fields.insert(name.clone(), merged);
                }
                None if y.closed || strict => {
                    return Err(self.extra_field(name, left, x, y));
                }
                None => {
                    fields.insert(name.clone(), left.clone());
                }
            }
        }

        for (name, right) in &y.fields {
            if x.fields.contains_key(name) {
                continue;
            }
            if x.closed || strict {
                return Err(self.extra_field(name, right, x, y));
            }
            fields.insert(name.clone(), right.clone());
        }

        Ok(TypeNode::Object(ObjectType::new(
            fields,
            x.closed || y.closed,
        )))
    }

    fn extra_field(
        &mut self,
        name: &str,
        field: &TypeNode,
        x: &ObjectType,
        y: &ObjectType,
    ) -> UnificationError {
        self.path.push(name.to_string());
        let err = self.mismatch(
            &TypeNode::Object(x.clone()),
            &TypeNode::Object(y.clone()),
            format!("field `{name}` of type {field} is not allowed by a closed object"),
        );
        self.path.pop();
        err
    }

    fn nested<T>(
        &mut self,
        segment: &str,
        f: impl FnOnce(&mut Self) -> Result<T, UnificationError>,
    ) -> Result<T, UnificationError> {
        self.path.push(segment.to_string());
        let result = f(self);
        self.path.pop();
        result
    }

    fn current_path(&self) -> TypePath {
        TypePath(self.path.clone())
    }

    fn mismatch(&self, a: &TypeNode, b: &TypeNode, reason: String) -> UnificationError {
        UnificationError::TypeMismatch {
            path: self.current_path(),
            left: a.to_string(),
            right: b.to_string(),
            reason,
        }
    }
}
