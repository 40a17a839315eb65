//! Linking of resolved documents into type definitions.
//!
//! The linker runs after import resolution:
//!
//! 1. Every declaration gets a [`TypeId`] and a qualified name.
//! 2. Every reference is bound to a definition, through the import alias for
//!    qualified references (`E200` unknown name, `E204` unknown alias).
//! 3. Each definition is expanded: the definitions it refers to are expanded
//!    first, and `extends` bases are unified into it (`E300`/`E301`).
//!    References stay resolved references into the definition table, so a
//!    definition shared by many fields is stored once; unification looks
//!    through them where a base and an extension meet. A reference back
//!    into a definition that is still being expanded is recursion, and is
//!    `E206` unless recursive types are allowed.

use std::{collections::HashMap, convert::Infallible, sync::Arc};

use log::{debug, trace};

use blue_core::{
    ContentHash, Definitions, Reference, TypeId, TypeNode, UnificationError, UnifyOptions,
    hash::ContentHasher, unify_in,
};
use blue_parser::{Diagnostic, Document, ErrorCode, Span, TypeDecl};

use crate::{
    config::ResolveConfig,
    graph::{DocumentId, ImportEdge, TypeDefinition},
};

/// Linked definitions together with the diagnostics raised while linking.
#[derive(Debug, Clone)]
pub(crate) struct Linked {
    pub types: Vec<TypeDefinition>,
    pub diagnostics: Vec<Diagnostic>,
}

/// The key under which a linked result is memoized: the root, the sorted
/// set of every document key in the closure, and the linker options.
pub(crate) fn link_key(documents: &[Arc<Document>], config: &ResolveConfig) -> ContentHash {
    let mut hasher = ContentHasher::new();
    if let Some(root) = documents.first() {
        hasher.update_part(root.key().as_bytes());
    }
    let mut closure: Vec<ContentHash> = documents.iter().map(|doc| doc.key()).collect();
    closure.sort();
    closure.dedup();
    for hash in &closure {
        hasher.update_part(hash.as_bytes());
    }
    hasher.update_part(&[
        u8::from(config.closed_objects()),
        u8::from(config.allow_recursive_types()),
    ]);
    hasher.finish()
}

/// Link `documents`, whose imports are described by `imports`.
pub(crate) fn link(
    documents: &[Arc<Document>],
    prefixes: &[String],
    imports: &[ImportEdge],
    config: &ResolveConfig,
) -> Linked {
    let mut linker = Linker::new(documents, prefixes, imports, config);
    linker.bind_all();
    for index in 0..linker.decls.len() {
        linker.expand(TypeId::new(index));
    }
    debug!(
        types = linker.decls.len(),
        diagnostics = linker.diagnostics.len();
        "Linked types",
    );
    linker.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Pending,
    Expanding,
    Done,
}

struct Linker<'a> {
    documents: &'a [Arc<Document>],
    allow_recursive: bool,
    options: UnifyOptions,

    /// Declarations indexed by `TypeId`.
    decls: Vec<(DocumentId, &'a TypeDecl)>,
    qualified: Vec<String>,
    ids: HashMap<(DocumentId, &'a str), TypeId>,
    /// Per document: alias to imported document, `None` for failed imports.
    aliases: Vec<HashMap<&'a str, Option<DocumentId>>>,

    bound: Vec<TypeNode>,
    /// Bound reference sites of each declaration, for diagnostics.
    sites: Vec<Vec<(TypeId, Span)>>,
    bases: Vec<Vec<(TypeId, Span)>>,

    state: Vec<Visit>,
    expanded: Vec<Option<TypeNode>>,
    stack: Vec<TypeId>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Linker<'a> {
    fn new(
        documents: &'a [Arc<Document>],
        prefixes: &[String],
        imports: &'a [ImportEdge],
        config: &ResolveConfig,
    ) -> Self {
        let mut decls = Vec::new();
        let mut qualified = Vec::new();
        let mut ids = HashMap::new();
        for (index, document) in documents.iter().enumerate() {
            let doc = DocumentId::new(index);
            let prefix = prefixes.get(index).map_or("", String::as_str);
            for (name, decl) in &document.module().types {
                let id = TypeId::new(decls.len());
                ids.insert((doc, name.as_str()), id);
                decls.push((doc, decl));
                qualified.push(if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}.{name}")
                });
            }
        }

        let mut aliases = vec![HashMap::new(); documents.len()];
        for edge in imports {
            if let Some(map) = aliases.get_mut(edge.source.index()) {
                map.insert(edge.alias.as_str(), edge.target);
            }
        }

        let count = decls.len();
        Self {
            documents,
            allow_recursive: config.allow_recursive_types(),
            options: config.unify_options(),
            decls,
            qualified,
            ids,
            aliases,
            bound: Vec::with_capacity(count),
            sites: Vec::with_capacity(count),
            bases: Vec::with_capacity(count),
            state: vec![Visit::Pending; count],
            expanded: vec![None; count],
            stack: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn finish(self) -> Linked {
        let types = self
            .decls
            .iter()
            .zip(self.qualified)
            .zip(self.expanded)
            .enumerate()
            .map(|(index, (((doc, decl), qualified), node))| TypeDefinition {
                id: TypeId::new(index),
                name: decl.name.inner().clone(),
                qualified,
                document: *doc,
                node: node.unwrap_or_else(|| decl.node.clone()),
            })
            .collect();
        Linked {
            types,
            diagnostics: self.diagnostics,
        }
    }

    fn report(&mut self, doc: DocumentId, diagnostic: Diagnostic) {
        let diagnostic = match self.documents.get(doc.index()) {
            Some(document) => diagnostic.with_source(Arc::clone(document.source())),
            None => diagnostic,
        };
        self.diagnostics.push(diagnostic);
    }

    // ============================================================================
    // Binding
    // ============================================================================

    fn bind_all(&mut self) {
        for index in 0..self.decls.len() {
            let (doc, decl) = self.decls[index];

            let mut sites = Vec::new();
            let bound = match decl.node.try_map_references(&mut |reference: &Reference| {
                let span = decl.reference_span(&reference.target);
                Ok::<_, Infallible>(match self.bind(doc, &reference.target, span) {
                    Some(id) => {
                        sites.push((id, span));
                        TypeNode::Reference(Reference::resolved(self.qualified[id.index()].clone(), id))
                    }
                    None => TypeNode::Reference(reference.clone()),
                })
            }) {
                Ok(node) => node,
                Err(never) => match never {},
            };

            let bases = decl
                .extends
                .iter()
                .filter_map(|base| {
                    self.bind(doc, base.inner(), base.span())
                        .map(|id| (id, base.span()))
                })
                .collect();

            trace!(name = self.qualified[index].as_str(); "Bound references");
            self.bound.push(bound);
            self.sites.push(sites);
            self.bases.push(bases);
        }
    }

    /// Bind `target` as written in document `doc`.
    fn bind(&mut self, doc: DocumentId, target: &str, span: Span) -> Option<TypeId> {
        let (home, name) = match target.split_once('.') {
            None => (doc, target),
            Some((alias, name)) => {
                match self.aliases.get(doc.index()).and_then(|map| map.get(alias)) {
                    Some(Some(imported)) => (*imported, name),
                    // The failed import was already reported.
                    Some(None) => return None,
                    None => {
                        self.report(
                            doc,
                            Diagnostic::error(format!("unknown import alias `{alias}`"))
                                .with_code(ErrorCode::E204)
                                .with_label(span, "alias is not imported")
                                .with_help(format!("add `{alias}` under `imports`")),
                        );
                        return None;
                    }
                }
            }
        };

        if let Some(id) = self.ids.get(&(home, name)) {
            return Some(*id);
        }

        let help = if home == doc {
            format!("declare `{name}` under `types` or import the document that defines it")
        } else {
            format!(
                "`{}` does not declare `{name}`",
                self.documents[home.index()].identifier()
            )
        };
        self.report(
            doc,
            Diagnostic::error(format!("unresolved reference `{target}`"))
                .with_code(ErrorCode::E200)
                .with_label(span, "no such type")
                .with_help(help),
        );
        None
    }

    // ============================================================================
    // Expansion
    // ============================================================================

    fn expand(&mut self, id: TypeId) {
        let index = id.index();
        if self.state[index] != Visit::Pending {
            return;
        }
        self.state[index] = Visit::Expanding;
        self.stack.push(id);

        let mut targets = Vec::new();
        self.bound[index].for_each_reference(&mut |reference| {
            if let Some(target) = reference.resolved {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        });
        for target in targets {
            match self.state[target.index()] {
                Visit::Pending => self.expand(target),
                Visit::Expanding if !self.allow_recursive => self.report_recursion(id, target),
                Visit::Expanding | Visit::Done => {}
            }
        }

        let mut node = self.bound[index].clone();
        let bases = self.bases[index].clone();
        for (base, span) in bases {
            node = self.extend(id, node, base, span);
        }

        self.stack.pop();
        self.state[index] = Visit::Done;
        self.expanded[index] = Some(node);
    }

    fn report_recursion(&mut self, owner: TypeId, target: TypeId) {
        let span = self.site(owner, target);
        let cycle = self.cycle_names(target);
        let (doc, _) = self.decls[owner.index()];
        self.report(
            doc,
            Diagnostic::error(format!("recursive type [{}]", cycle.join(", ")))
                .with_code(ErrorCode::E206)
                .with_label(span, "refers back to a type being defined")
                .with_help("set `resolve.allow_recursive_types` to keep recursive references"),
        );
    }

    fn extend(&mut self, id: TypeId, node: TypeNode, base: TypeId, span: Span) -> TypeNode {
        let (doc, _) = self.decls[id.index()];
        let base_name = self.qualified[base.index()].clone();

        if self.state[base.index()] == Visit::Expanding {
            let cycle = self.cycle_names(base);
            self.report(
                doc,
                Diagnostic::error(format!("type extends itself [{}]", cycle.join(", ")))
                    .with_code(ErrorCode::E206)
                    .with_label(span, "base is still being defined")
                    .with_help("a type cannot be its own base, directly or indirectly"),
            );
            return node;
        }
        self.expand(base);

        let definitions = LinkDefinitions {
            expanded: &self.expanded,
            bound: &self.bound,
        };
        let base_node = definitions.get(base);
        match unify_in(base_node, &node, self.options, &definitions) {
            Ok(merged) => merged,
            Err(err) => {
                let code = match err {
                    UnificationError::TypeMismatch { .. } => ErrorCode::E300,
                    UnificationError::IncompatibleReferences { .. } => ErrorCode::E301,
                    UnificationError::Internal { .. } => ErrorCode::E900,
                };
                self.report(
                    doc,
                    Diagnostic::error(format!(
                        "`{}` cannot extend `{base_name}`",
                        self.qualified[id.index()]
                    ))
                    .with_code(code)
                    .with_label(span, err.to_string())
                    .with_help("make the shared fields agree, or drop the base"),
                );
                node
            }
        }
    }

    /// Span of the first reference from `owner` to `target`.
    fn site(&self, owner: TypeId, target: TypeId) -> Span {
        self.sites[owner.index()]
            .iter()
            .find(|(id, _)| *id == target)
            .map_or_else(|| self.decls[owner.index()].1.name.span(), |(_, span)| *span)
    }

    /// Names from `target` to the top of the expansion stack, closed by
    /// `target` again.
    fn cycle_names(&self, target: TypeId) -> Vec<String> {
        let start = self
            .stack
            .iter()
            .position(|id| *id == target)
            .unwrap_or(0);
        self.stack[start..]
            .iter()
            .chain([&target])
            .map(|id| self.qualified[id.index()].clone())
            .collect()
    }
}

/// Definitions as far as linking has got: expanded where done, bound
/// otherwise.
struct LinkDefinitions<'l> {
    expanded: &'l [Option<TypeNode>],
    bound: &'l [TypeNode],
}

impl LinkDefinitions<'_> {
    fn get(&self, id: TypeId) -> &TypeNode {
        let index = id.index();
        self.expanded[index].as_ref().unwrap_or(&self.bound[index])
    }
}

impl Definitions for LinkDefinitions<'_> {
    fn definition(&self, id: TypeId) -> Option<&TypeNode> {
        (id.index() < self.bound.len()).then(|| self.get(id))
    }
}

#[cfg(test)]
mod tests {
    use blue_parser::Origin;

    use super::*;

    fn link_one(text: &str, config: &ResolveConfig) -> Linked {
        let document = Arc::new(Document::parse(text, Origin::Memory("main".into())).unwrap());
        link(&[document], &[String::new()], &[], config)
    }

    fn codes(linked: &Linked) -> Vec<ErrorCode> {
        linked.diagnostics.iter().filter_map(|d| d.code()).collect()
    }

    fn node<'l>(linked: &'l Linked, name: &str) -> &'l TypeNode {
        &linked
            .types
            .iter()
            .find(|def| def.qualified == name)
            .unwrap()
            .node
    }

    fn resolved(name: &str, id: usize) -> TypeNode {
        TypeNode::Reference(Reference::resolved(name, TypeId::new(id)))
    }

    #[test]
    fn test_references_are_bound() {
        let linked = link_one(
            "types:\n  Id: Text\n  User:\n    fields:\n      id: Id\n      tags: [Id]\n",
            &ResolveConfig::default(),
        );
        assert!(linked.diagnostics.is_empty());
        assert_eq!(
            *node(&linked, "User"),
            TypeNode::object([
                ("id", resolved("Id", 0)),
                ("tags", TypeNode::list(resolved("Id", 0))),
            ])
        );
    }

    #[test]
    fn test_shared_definitions_stay_shared() {
        let depth = 48;
        let mut text = String::from("types:\n");
        for i in 0..depth {
            text.push_str(&format!("  T{i}:\n    fields: {{a: T{next}, b: T{next}}}\n", next = i + 1));
        }
        text.push_str(&format!("  T{depth}: Text\n"));
        text.push_str("  Top:\n    extends: T0\n    fields: {c: Text}\n");

        let linked = link_one(&text, &ResolveConfig::default());
        assert!(linked.diagnostics.is_empty(), "{:?}", linked.diagnostics);
        assert_eq!(
            *node(&linked, "T0"),
            TypeNode::object([("a", resolved("T1", 1)), ("b", resolved("T1", 1))])
        );
        assert_eq!(
            *node(&linked, "Top"),
            TypeNode::object([
                ("a", resolved("T1", 1)),
                ("b", resolved("T1", 1)),
                ("c", TypeNode::text()),
            ])
        );
    }

    #[test]
    fn test_extends_looks_through_references() {
        let linked = link_one(
            "types:\n  Id: Text\n  Base:\n    fields: {id: Id}\n  User:\n    extends: Base\n    fields: {id: Text, name: Text}\n",
            &ResolveConfig::default(),
        );
        assert!(linked.diagnostics.is_empty(), "{:?}", linked.diagnostics);
        assert_eq!(
            *node(&linked, "User"),
            TypeNode::object([("id", resolved("Id", 0)), ("name", TypeNode::text())])
        );

        let linked = link_one(
            "types:\n  Id: Text\n  Base:\n    fields: {id: Id}\n  User:\n    extends: Base\n    fields: {id: Integer}\n",
            &ResolveConfig::default(),
        );
        assert_eq!(codes(&linked), [ErrorCode::E300]);
        let label = linked.diagnostics[0].labels()[0].message().to_string();
        assert!(label.contains("`id`"), "{label}");
    }

    #[test]
    fn test_extends_sees_extended_references() {
        // `Named` gains `name` from its own base before `User` is checked.
        let linked = link_one(
            "types:\n  User:\n    extends: Holder\n    fields: {item: {fields: {name: Text}}}\n  Holder:\n    fields: {item: Named}\n  Named:\n    extends: Base\n    fields: {nick: Text}\n  Base:\n    fields: {name: Text}\n",
            &ResolveConfig::default(),
        );
        assert!(linked.diagnostics.is_empty(), "{:?}", linked.diagnostics);
        assert_eq!(
            *node(&linked, "User"),
            TypeNode::object([("item", resolved("Named", 2))])
        );
    }

    #[test]
    fn test_extends_unifies_base() {
        let linked = link_one(
            "types:\n  Base:\n    fields: {id: Text}\n  User:\n    extends: Base\n    fields: {name: Text}\n",
            &ResolveConfig::default(),
        );
        assert!(linked.diagnostics.is_empty());
        assert_eq!(
            *node(&linked, "User"),
            TypeNode::object([("id", TypeNode::text()), ("name", TypeNode::text())])
        );
    }

    #[test]
    fn test_closed_objects_reject_extension() {
        let mut config = ResolveConfig::default();
        config.set_closed_objects(true);
        let linked = link_one(
            "types:\n  Base:\n    fields: {id: Text}\n  User:\n    extends: Base\n    fields: {name: Text}\n",
            &config,
        );
        assert_eq!(codes(&linked), [ErrorCode::E300]);
    }

    #[test]
    fn test_extends_mismatch_reports_path() {
        let linked = link_one(
            "types:\n  Base:\n    fields: {address: {fields: {zip: Text}}}\n  User:\n    extends: Base\n    fields: {address: {fields: {zip: Integer}}}\n",
            &ResolveConfig::default(),
        );
        assert_eq!(codes(&linked), [ErrorCode::E300]);
        let label = linked.diagnostics[0].labels()[0].message().to_string();
        assert!(label.contains("address.zip"), "{label}");
    }

    #[test]
    fn test_unresolved_and_unknown_alias() {
        let linked = link_one(
            "types:\n  A:\n    fields: {x: Missing, y: geo.Point}\n",
            &ResolveConfig::default(),
        );
        assert_eq!(codes(&linked), [ErrorCode::E200, ErrorCode::E204]);
        assert!(linked.diagnostics[0].source().is_some());
    }

    #[test]
    fn test_recursive_type_rejected_by_default() {
        let linked = link_one(
            "types:\n  Node:\n    fields: {next: Node}\n",
            &ResolveConfig::default(),
        );
        assert_eq!(codes(&linked), [ErrorCode::E206]);
        assert!(linked.diagnostics[0].message().contains("[Node, Node]"));
    }

    #[test]
    fn test_recursive_type_allowed() {
        let mut config = ResolveConfig::default();
        config.set_allow_recursive_types(true);
        let linked = link_one(
            "types:\n  Node:\n    fields: {value: Integer, next: Node}\n  Holder:\n    fields: {head: Node}\n",
            &config,
        );
        assert!(linked.diagnostics.is_empty());
        assert_eq!(
            *node(&linked, "Node"),
            TypeNode::object([("value", TypeNode::integer()), ("next", resolved("Node", 0))])
        );
        assert_eq!(
            *node(&linked, "Holder"),
            TypeNode::object([("head", resolved("Node", 0))])
        );
    }

    #[test]
    fn test_mutual_recursion_lists_cycle() {
        let linked = link_one(
            "types:\n  A:\n    fields: {b: B}\n  B:\n    fields: {a: A}\n",
            &ResolveConfig::default(),
        );
        assert_eq!(codes(&linked), [ErrorCode::E206]);
        assert!(linked.diagnostics[0].message().contains("[A, B, A]"));
    }

    #[test]
    fn test_self_extension() {
        let linked = link_one(
            "types:\n  A:\n    extends: A\n    fields: {x: Text}\n",
            &ResolveConfig::default(),
        );
        assert_eq!(codes(&linked), [ErrorCode::E206]);
    }

    #[test]
    fn test_link_key_depends_on_options() {
        let document = Arc::new(Document::parse("types: {}", Origin::Memory("m".into())).unwrap());
        let documents = [document];
        let mut config = ResolveConfig::default();
        let first = link_key(&documents, &config);
        assert_eq!(first, link_key(&documents, &config));
        config.set_allow_recursive_types(true);
        assert_ne!(first, link_key(&documents, &config));
    }
}
