//! The resolved document and type graph.
//!
//! A [`ResolvedGraph`] owns every document reached from a root through its
//! imports, the import edges between them, and the linked type definitions.
//! Documents are addressed by [`DocumentId`] (their index in the arena) and
//! definitions by [`TypeId`].

use std::{collections::HashMap, convert::Infallible, fmt, sync::Arc};

use indexmap::IndexMap;
use petgraph::{
    Direction,
    algo::toposort,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};

use blue_core::{Definitions, Reference, TypeId, TypeNode};
use blue_parser::Document;

/// Index of a document in a resolution's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(usize);

impl DocumentId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc#{}", self.0)
    }
}

/// An `alias: reference` import of `source`.
///
/// `target` stays `None` when the import could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEdge {
    pub source: DocumentId,
    pub alias: String,
    /// The reference as written in the importing document.
    pub reference: String,
    pub target: Option<DocumentId>,
}

/// A linked type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDefinition {
    pub id: TypeId,
    /// Name as declared in its document.
    pub name: String,
    /// Name qualified by the alias path from the root (`geo.Point`); root
    /// definitions keep their declared name.
    pub qualified: String,
    pub document: DocumentId,
    /// The definition with bases unified. References to other definitions
    /// are resolved references; [`ResolvedGraph::expand`] inlines them.
    pub node: TypeNode,
}

/// Documents, imports, and linked types reached from a root document.
#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    documents: Vec<Arc<Document>>,
    prefixes: Vec<String>,
    imports: Vec<ImportEdge>,
    types: Vec<TypeDefinition>,
    by_name: HashMap<String, TypeId>,
    dependencies: DiGraph<DocumentId, usize>,
}

impl ResolvedGraph {
    pub(crate) fn new(
        documents: Vec<Arc<Document>>,
        prefixes: Vec<String>,
        imports: Vec<ImportEdge>,
        types: Vec<TypeDefinition>,
    ) -> Self {
        let mut dependencies = DiGraph::with_capacity(documents.len(), imports.len());
        for index in 0..documents.len() {
            dependencies.add_node(DocumentId::new(index));
        }
        for (edge_index, edge) in imports.iter().enumerate() {
            if let Some(target) = edge.target {
                dependencies.add_edge(
                    NodeIndex::new(edge.source.index()),
                    NodeIndex::new(target.index()),
                    edge_index,
                );
            }
        }
        let by_name = types
            .iter()
            .map(|def| (def.qualified.clone(), def.id))
            .collect();

        Self {
            documents,
            prefixes,
            imports,
            types,
            by_name,
            dependencies,
        }
    }

    /// The root document's id.
    pub fn root(&self) -> DocumentId {
        DocumentId::new(0)
    }

    pub fn root_document(&self) -> &Arc<Document> {
        &self.documents[0]
    }

    pub fn document(&self, id: DocumentId) -> Option<&Arc<Document>> {
        self.documents.get(id.index())
    }

    pub fn documents(&self) -> impl Iterator<Item = (DocumentId, &Arc<Document>)> {
        self.documents
            .iter()
            .enumerate()
            .map(|(index, doc)| (DocumentId::new(index), doc))
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// The alias path under which a document's types are qualified; empty
    /// for the root.
    pub fn prefix(&self, id: DocumentId) -> Option<&str> {
        self.prefixes.get(id.index()).map(String::as_str)
    }

    pub fn imports(&self) -> &[ImportEdge] {
        &self.imports
    }

    /// Import edges declared by `id`.
    pub fn imports_of(&self, id: DocumentId) -> impl Iterator<Item = &ImportEdge> {
        self.imports.iter().filter(move |edge| edge.source == id)
    }

    /// Documents that `id` imports successfully, in declaration order.
    pub fn dependencies(&self, id: DocumentId) -> Vec<DocumentId> {
        let mut edges: Vec<_> = self
            .dependencies
            .edges_directed(NodeIndex::new(id.index()), Direction::Outgoing)
            .map(|edge| (*edge.weight(), self.dependencies[edge.target()]))
            .collect();
        edges.sort_by_key(|(order, _)| *order);
        edges.into_iter().map(|(_, target)| target).collect()
    }

    /// Documents ordered so that every document comes after the documents it
    /// imports. `None` if the import graph has a cycle.
    pub fn dependency_order(&self) -> Option<Vec<DocumentId>> {
        let mut order: Vec<DocumentId> = toposort(&self.dependencies, None)
            .ok()?
            .into_iter()
            .map(|index| self.dependencies[index])
            .collect();
        order.reverse();
        Some(order)
    }

    pub fn types(&self) -> &[TypeDefinition] {
        &self.types
    }

    pub fn type_definition(&self, id: TypeId) -> Option<&TypeDefinition> {
        self.types.get(id.index())
    }

    /// Look up a definition by qualified name.
    pub fn lookup(&self, qualified: &str) -> Option<&TypeDefinition> {
        self.by_name
            .get(qualified)
            .and_then(|id| self.type_definition(*id))
    }

    /// The definition `id` with every reference replaced by the definition
    /// it names. A reference back into a definition being inlined stays a
    /// reference, so recursive types stay finite.
    ///
    /// The result grows with every use of a shared definition; prefer
    /// [`TypeDefinition::node`] with [`Definitions`] where possible.
    pub fn expand(&self, id: TypeId) -> Option<TypeNode> {
        let definition = self.type_definition(id)?;
        Some(self.inline(definition, &mut Vec::new()))
    }

    /// [`expand`](Self::expand) by qualified name.
    pub fn expand_named(&self, qualified: &str) -> Option<TypeNode> {
        self.by_name.get(qualified).and_then(|id| self.expand(*id))
    }

    fn inline(&self, definition: &TypeDefinition, stack: &mut Vec<TypeId>) -> TypeNode {
        stack.push(definition.id);
        let inlined = definition
            .node
            .try_map_references(&mut |reference: &Reference| {
                let target = reference.resolved.and_then(|id| self.type_definition(id));
                Ok::<_, Infallible>(match target {
                    Some(target) if !stack.contains(&target.id) => self.inline(target, stack),
                    _ => TypeNode::Reference(reference.clone()),
                })
            });
        stack.pop();
        match inlined {
            Ok(node) => node,
            Err(never) => match never {},
        }
    }

    /// Definitions declared by the root document, keyed by declared name.
    pub fn root_types(&self) -> IndexMap<&str, &TypeDefinition> {
        self.types
            .iter()
            .filter(|def| def.document == self.root())
            .map(|def| (def.name.as_str(), def))
            .collect()
    }
}

impl Definitions for ResolvedGraph {
    fn definition(&self, id: TypeId) -> Option<&TypeNode> {
        self.type_definition(id).map(|def| &def.node)
    }
}
