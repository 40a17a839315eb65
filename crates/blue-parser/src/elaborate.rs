//! Elaboration of the document tree into the type DSL.
//!
//! This module turns a parsed [`Node`] into a [`Module`]: the document's
//! declared name, its imports, and its type declarations with every type
//! expression converted to a [`TypeNode`]. References are kept by name; the
//! resolver binds them once the imported documents are loaded.
//!
//! Every malformed part is reported. Unknown top-level keys are warnings, so
//! documents can carry data the type system does not interpret.

use indexmap::IndexMap;
use log::{debug, trace};
use serde_json::{Number, Value};

use blue_core::{Bound, Constraints, ContentHash, ObjectType, Primitive, TypeNode};

use crate::{
    ast::{Mapping, MappingEntry, Node, NodeKind},
    error::{Diagnostic, DiagnosticCollector, ErrorCode, ParseError},
    reference::ImportRef,
    span::{Span, Spanned},
};

const TOP_LEVEL_KEYS: [&str; 4] = ["name", "description", "imports", "types"];
const CONSTRUCTORS: [&str; 5] = ["type", "list", "union", "dictionary", "ref"];
const CONSTRAINT_KEYS: [&str; 13] = [
    "required",
    "minLength",
    "maxLength",
    "pattern",
    "minimum",
    "maximum",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "multipleOf",
    "minItems",
    "maxItems",
    "uniqueItems",
    "options",
];

const TYPE_HELP: &str = "a type is a primitive (`Text`, `Integer`, `Number`, `Boolean`), \
     a type name, `alias.Name`, `[T]`, or a mapping with `fields`, `type`, `list`, `union`, \
     `dictionary`, or `ref`, optionally with `constraints`";

/// An elaborated document.
#[derive(Debug, Clone, Default)]
pub struct Module {
    /// The declared `name`, used as the document's identifier.
    pub name: Option<Spanned<String>>,
    pub description: Option<String>,
    pub imports: Vec<ImportDecl>,
    pub types: IndexMap<String, TypeDecl>,
}

/// `alias: reference` under `imports`.
#[derive(Debug, Clone)]
pub struct ImportDecl {
    pub alias: Spanned<String>,
    pub reference: Spanned<ImportRef>,
    /// Expected content hash of the imported document.
    pub pin: Option<ContentHash>,
    pub span: Span,
}

/// A named type under `types`.
#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: Spanned<String>,
    pub description: Option<String>,
    pub node: TypeNode,
    /// Bases unified into this type.
    pub extends: Vec<Spanned<String>>,
    /// Every reference in `node`, in source order, with its span.
    pub references: Vec<Spanned<String>>,
    pub span: Span,
}

impl Module {
    /// Elaborate a document tree.
    ///
    /// Returns the module together with any warnings, or every error found.
    pub fn elaborate(root: &Node) -> Result<(Module, Vec<Diagnostic>), ParseError> {
        let mut elaborator = Elaborator::default();
        let module = elaborator.module(root);
        debug!(
            imports = module.imports.len(),
            types = module.types.len();
            "Elaborated module",
        );
        elaborator
            .diagnostics
            .finish()
            .map(|warnings| (module, warnings))
    }

    pub fn import(&self, alias: &str) -> Option<&ImportDecl> {
        self.imports.iter().find(|import| import.alias.as_str() == alias)
    }

    pub fn type_decl(&self, name: &str) -> Option<&TypeDecl> {
        self.types.get(name)
    }
}

impl TypeDecl {
    /// Span of the first occurrence of a reference, falling back to the
    /// declaration.
    pub fn reference_span(&self, target: &str) -> Span {
        self.references
            .iter()
            .chain(&self.extends)
            .find(|r| r.as_str() == target)
            .map_or(self.name.span(), Spanned::span)
    }
}

/// Whether `s` is a name usable for types and aliases.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Whether `s` is `Name` or `alias.Name`.
pub fn is_reference(s: &str) -> bool {
    match s.split_once('.') {
        Some((alias, name)) => is_identifier(alias) && is_identifier(name),
        None => is_identifier(s),
    }
}

#[derive(Default)]
struct Elaborator {
    diagnostics: DiagnosticCollector,
}

impl Elaborator {
    // ============================================================================
    // Document Structure
    // ============================================================================

    fn module(&mut self, root: &Node) -> Module {
        let mut module = Module::default();
        let mapping = match root.kind() {
            NodeKind::Null => return module,
            NodeKind::Mapping(mapping) => mapping,
            _ => {
                self.diagnostics.emit(
                    Diagnostic::error(format!(
                        "document root must be a mapping, found {}",
                        root.kind_name()
                    ))
                    .with_code(ErrorCode::E100)
                    .with_label(root.span(), "expected a mapping")
                    .with_help("a type document has `name`, `imports`, and `types` keys"),
                );
                return module;
            }
        };

        for entry in mapping {
            match entry.key.as_str() {
                "name" => module.name = self.document_name(entry),
                "description" => module.description = self.description(entry),
                "imports" => module.imports = self.imports(&entry.value),
                "types" => module.types = self.types(&entry.value),
                other => self.diagnostics.emit(
                    Diagnostic::warning(format!("unknown top-level key `{other}`"))
                        .with_code(ErrorCode::E101)
                        .with_label(entry.key.span(), "ignored")
                        .with_help(format!("known keys are {}", quoted_list(&TOP_LEVEL_KEYS))),
                ),
            }
        }
        module
    }

    fn document_name(&mut self, entry: &MappingEntry) -> Option<Spanned<String>> {
        match entry.value.as_str() {
            Some(name) if !name.trim().is_empty() => {
                Some(Spanned::new(name.to_string(), entry.value.span()))
            }
            _ => {
                self.diagnostics.emit(
                    Diagnostic::error("document `name` must be a non-empty string")
                        .with_code(ErrorCode::E104)
                        .with_label(entry.value.span(), "invalid name"),
                );
                None
            }
        }
    }

    fn description(&mut self, entry: &MappingEntry) -> Option<String> {
        match entry.value.kind() {
            NodeKind::String(text) => Some(text.clone()),
            NodeKind::Null => None,
            _ => {
                self.diagnostics.emit(
                    Diagnostic::warning("`description` is not a string")
                        .with_code(ErrorCode::E101)
                        .with_label(entry.value.span(), "ignored"),
                );
                None
            }
        }
    }

    fn imports(&mut self, node: &Node) -> Vec<ImportDecl> {
        let mapping = match node.kind() {
            NodeKind::Null => return Vec::new(),
            NodeKind::Mapping(mapping) => mapping,
            _ => {
                self.diagnostics.emit(
                    Diagnostic::error("`imports` must be a mapping of aliases to references")
                        .with_code(ErrorCode::E103)
                        .with_label(node.span(), format!("found {}", node.kind_name())),
                );
                return Vec::new();
            }
        };

        mapping
            .iter()
            .filter_map(|entry| self.import(entry))
            .collect()
    }

    fn import(&mut self, entry: &MappingEntry) -> Option<ImportDecl> {
        let alias = entry.key.clone();
        if !is_identifier(&alias) {
            self.diagnostics.emit(
                Diagnostic::error(format!("invalid import alias `{}`", alias.as_str()))
                    .with_code(ErrorCode::E103)
                    .with_label(alias.span(), "not an identifier")
                    .with_help("aliases start with a letter or `_` and contain letters, digits, and `_`"),
            );
            return None;
        }

        let span = alias.span().union(entry.value.span());
        match entry.value.kind() {
            NodeKind::String(text) => {
                let reference = self.import_ref(text, entry.value.span())?;
                trace!(alias = alias.as_str(), reference:% = reference.inner(); "Import declaration");
                Some(ImportDecl {
                    alias,
                    reference,
                    pin: None,
                    span,
                })
            }
            NodeKind::Mapping(mapping) => {
                let (reference, pin) = self.pinned_import(mapping, entry.value.span())?;
                Some(ImportDecl {
                    alias,
                    reference,
                    pin,
                    span,
                })
            }
            _ => {
                self.diagnostics.emit(
                    Diagnostic::error(format!("invalid import `{}`", alias.as_str()))
                        .with_code(ErrorCode::E103)
                        .with_label(entry.value.span(), format!("found {}", entry.value.kind_name()))
                        .with_help("an import is a path, URL, `sha256:` hash, or `{from, hash}`"),
                );
                None
            }
        }
    }

    /// `{from: reference, hash: sha256:...}`
    fn pinned_import(
        &mut self,
        mapping: &Mapping,
        span: Span,
    ) -> Option<(Spanned<ImportRef>, Option<ContentHash>)> {
        let mut reference = None;
        let mut pin = None;
        let mut ok = true;

        for entry in mapping {
            match (entry.key.as_str(), entry.value.as_str()) {
                ("from", Some(text)) => {
                    reference = self.import_ref(text, entry.value.span());
                    ok &= reference.is_some();
                }
                ("hash", Some(text)) => match text.parse::<ContentHash>() {
                    Ok(hash) => pin = Some(hash),
                    Err(err) => {
                        self.diagnostics.emit(
                            Diagnostic::error(format!("invalid import hash: {err}"))
                                .with_code(ErrorCode::E103)
                                .with_label(entry.value.span(), "invalid hash"),
                        );
                        ok = false;
                    }
                },
                ("from" | "hash", None) => {
                    self.diagnostics.emit(
                        Diagnostic::error(format!("import `{}` must be a string", entry.key.as_str()))
                            .with_code(ErrorCode::E103)
                            .with_label(entry.value.span(), format!("found {}", entry.value.kind_name())),
                    );
                    ok = false;
                }
                (other, _) => {
                    self.diagnostics.emit(
                        Diagnostic::error(format!("unknown import key `{other}`"))
                            .with_code(ErrorCode::E103)
                            .with_label(entry.key.span(), "unknown key")
                            .with_help("a pinned import has `from` and `hash`"),
                    );
                    ok = false;
                }
            }
        }

        if !mapping.contains_key("from") {
            self.diagnostics.emit(
                Diagnostic::error("pinned import is missing `from`")
                    .with_code(ErrorCode::E103)
                    .with_label(span, "no `from` key"),
            );
            return None;
        }
        if !ok {
            return None;
        }
        reference.map(|reference| (reference, pin))
    }

    fn import_ref(&mut self, text: &str, span: Span) -> Option<Spanned<ImportRef>> {
        match ImportRef::parse(text) {
            Ok(reference) => Some(Spanned::new(reference, span)),
            Err(err) => {
                self.diagnostics.emit(
                    Diagnostic::error(format!("invalid import reference `{text}`: {err}"))
                        .with_code(ErrorCode::E103)
                        .with_label(span, "invalid reference"),
                );
                None
            }
        }
    }

    // ============================================================================
    // Type Declarations
    // ============================================================================

    fn types(&mut self, node: &Node) -> IndexMap<String, TypeDecl> {
        let mapping = match node.kind() {
            NodeKind::Null => return IndexMap::new(),
            NodeKind::Mapping(mapping) => mapping,
            _ => {
                self.diagnostics.emit(
                    Diagnostic::error("`types` must be a mapping of type names to types")
                        .with_code(ErrorCode::E102)
                        .with_label(node.span(), format!("found {}", node.kind_name())),
                );
                return IndexMap::new();
            }
        };

        let mut types = IndexMap::with_capacity(mapping.len());
        for entry in mapping {
            if let Some(decl) = self.declaration(entry) {
                types.insert(decl.name.inner().clone(), decl);
            }
        }
        types
    }

    fn declaration(&mut self, entry: &MappingEntry) -> Option<TypeDecl> {
        let name = entry.key.clone();
        let valid_name = self.check_type_name(&name);

        let mut references = Vec::new();
        let mut extends = Vec::new();
        let mut description = None;

        let node = match entry.value.as_mapping() {
            Some(mapping) => {
                for field in mapping {
                    match field.key.as_str() {
                        "extends" => extends = self.extends(&field.value),
                        "description" => description = self.description(field),
                        _ => {}
                    }
                }
                self.mapping_expr(mapping, entry.value.span(), &mut references, true)
            }
            None => self.type_expr(&entry.value, &mut references),
        }?;

        trace!(name = name.as_str(), node:% = node; "Type declaration");
        valid_name.then(|| TypeDecl {
            span: name.span().union(entry.value.span()),
            name,
            description,
            node,
            extends,
            references,
        })
    }

    fn check_type_name(&mut self, name: &Spanned<String>) -> bool {
        if Primitive::from_name(name).is_some() {
            self.diagnostics.emit(
                Diagnostic::error(format!("type name `{}` shadows a primitive", name.as_str()))
                    .with_code(ErrorCode::E104)
                    .with_label(name.span(), "primitive name")
                    .with_help("choose a different name"),
            );
            return false;
        }
        if !is_identifier(name) {
            self.diagnostics.emit(
                Diagnostic::error(format!("invalid type name `{}`", name.as_str()))
                    .with_code(ErrorCode::E104)
                    .with_label(name.span(), "not an identifier")
                    .with_help("type names start with a letter or `_` and contain letters, digits, and `_`"),
            );
            return false;
        }
        true
    }

    fn extends(&mut self, node: &Node) -> Vec<Spanned<String>> {
        let items: Vec<&Node> = match node.kind() {
            NodeKind::Sequence(items) => items.iter().collect(),
            _ => vec![node],
        };

        let mut bases = Vec::with_capacity(items.len());
        for item in items {
            match item.as_str() {
                Some(base) if Primitive::from_name(base).is_some() => {
                    self.diagnostics.emit(
                        Diagnostic::error(format!("cannot extend primitive `{base}`"))
                            .with_code(ErrorCode::E105)
                            .with_label(item.span(), "primitive")
                            .with_help("only named types can be extended"),
                    );
                }
                Some(base) if is_reference(base) => {
                    bases.push(Spanned::new(base.to_string(), item.span()));
                }
                _ => {
                    self.diagnostics.emit(
                        Diagnostic::error("`extends` must be a type reference or a list of references")
                            .with_code(ErrorCode::E105)
                            .with_label(item.span(), "not a reference"),
                    );
                }
            }
        }
        bases
    }

    // ============================================================================
    // Type Expressions
    // ============================================================================

    fn type_expr(&mut self, node: &Node, references: &mut Vec<Spanned<String>>) -> Option<TypeNode> {
        match node.kind() {
            NodeKind::String(name) => self.named_type(name, node.span(), references),
            NodeKind::Sequence(items) => match items.as_slice() {
                [element] => Some(TypeNode::list(self.type_expr(element, references)?)),
                _ => {
                    self.diagnostics.emit(
                        Diagnostic::error("list shorthand takes exactly one element type")
                            .with_code(ErrorCode::E102)
                            .with_label(node.span(), format!("{} element types", items.len()))
                            .with_help("write `[T]`, or `{union: [A, B]}` for alternatives"),
                    );
                    None
                }
            },
            NodeKind::Mapping(mapping) => self.mapping_expr(mapping, node.span(), references, false),
            _ => {
                self.diagnostics.emit(
                    Diagnostic::error(format!("expected a type, found {}", node.kind_name()))
                        .with_code(ErrorCode::E102)
                        .with_label(node.span(), "not a type")
                        .with_help(TYPE_HELP),
                );
                None
            }
        }
    }

    fn named_type(
        &mut self,
        name: &str,
        span: Span,
        references: &mut Vec<Spanned<String>>,
    ) -> Option<TypeNode> {
        if let Some(primitive) = Primitive::from_name(name) {
            return Some(primitive.into());
        }
        if is_reference(name) {
            references.push(Spanned::new(name.to_string(), span));
            return Some(TypeNode::reference(name));
        }

        self.diagnostics.emit(
            Diagnostic::error(format!("invalid type `{name}`"))
                .with_code(ErrorCode::E102)
                .with_label(span, "not a primitive or reference")
                .with_help(TYPE_HELP),
        );
        None
    }

    /// A mapping in type position: an object type or a single constructor,
    /// narrowed by `constraints` when present.
    ///
    /// On declarations, `extends` and `description` sit next to the type and
    /// are handled by the caller.
    fn mapping_expr(
        &mut self,
        mapping: &Mapping,
        span: Span,
        references: &mut Vec<Spanned<String>>,
        declaration: bool,
    ) -> Option<TypeNode> {
        let Some(node) = mapping.get("constraints") else {
            return self.constructed_expr(mapping, span, references, declaration);
        };

        let constraints = self.constraints(node);
        let has_type = mapping
            .iter()
            .any(|e| !matches!(e.key.as_str(), "description" | "constraints"));
        if !has_type {
            self.diagnostics.emit(
                Diagnostic::error("`constraints` need a type to constrain")
                    .with_code(ErrorCode::E102)
                    .with_label(span, "no type")
                    .with_help("add `type`, `fields`, or another constructor next to `constraints`"),
            );
            return None;
        }
        let node = self.constructed_expr(mapping, span, references, declaration);
        let node = TypeNode::constrained(node?, constraints?);
        // A nested `type` may carry constraints of its own.
        if let (_, Some(all)) = node.split_constraints() {
            if let Err(reason) = all.check() {
                self.diagnostics.emit(
                    Diagnostic::error(format!("inconsistent constraints: {reason}"))
                        .with_code(ErrorCode::E102)
                        .with_label(span, "admits no value"),
                );
                return None;
            }
        }
        Some(node)
    }

    fn constructed_expr(
        &mut self,
        mapping: &Mapping,
        span: Span,
        references: &mut Vec<Spanned<String>>,
        declaration: bool,
    ) -> Option<TypeNode> {
        let constructors: Vec<&MappingEntry> = mapping
            .iter()
            .filter(|e| {
                !matches!(
                    e.key.as_str(),
                    "description" | "closed" | "fields" | "constraints"
                )
            })
            .filter(|e| !(declaration && e.key.as_str() == "extends"))
            .collect();

        let is_object = mapping.contains_key("fields")
            || mapping.contains_key("closed")
            || constructors.is_empty();
        if is_object {
            return self.object_expr(mapping, references, declaration);
        }

        if let Some(entry) = constructors
            .iter()
            .find(|e| !CONSTRUCTORS.contains(&e.key.as_str()))
        {
            self.emit_unknown_key(entry, declaration);
            return None;
        }

        let [entry] = constructors.as_slice() else {
            self.diagnostics.emit(
                Diagnostic::error("a type expression takes exactly one constructor")
                    .with_code(ErrorCode::E102)
                    .with_label(span, format!("found {}", quoted_list_of(&constructors)))
                    .with_help("nest the constructors, e.g. `{list: {union: [A, B]}}`"),
            );
            return None;
        };

        match entry.key.as_str() {
            "type" => self.type_expr(&entry.value, references),
            "list" => Some(TypeNode::list(self.type_expr(&entry.value, references)?)),
            "union" => self.union_expr(&entry.value, references),
            "dictionary" => self.dictionary_expr(&entry.value, references),
            _ => match entry.value.as_str() {
                Some(name) => self.named_type(name, entry.value.span(), references),
                None => {
                    self.diagnostics.emit(
                        Diagnostic::error("`ref` must name a type")
                            .with_code(ErrorCode::E102)
                            .with_label(entry.value.span(), format!("found {}", entry.value.kind_name())),
                    );
                    None
                }
            },
        }
    }

    fn emit_unknown_key(&mut self, entry: &MappingEntry, declaration: bool) {
        let key = entry.key.as_str();
        let diagnostic = if key == "extends" && !declaration {
            Diagnostic::error("`extends` is only allowed on type declarations")
                .with_code(ErrorCode::E105)
                .with_label(entry.key.span(), "not a declaration")
                .with_help("declare a named type that extends the base and reference it here")
        } else {
            Diagnostic::error(format!("invalid type expression: unknown key `{key}`"))
                .with_code(ErrorCode::E102)
                .with_label(entry.key.span(), "unknown key")
                .with_help("object types list their fields under `fields:`")
        };
        self.diagnostics.emit(diagnostic);
    }

    fn object_expr(
        &mut self,
        mapping: &Mapping,
        references: &mut Vec<Spanned<String>>,
        declaration: bool,
    ) -> Option<TypeNode> {
        let mut fields = IndexMap::new();
        let mut closed = false;
        let mut ok = true;

        for entry in mapping {
            match entry.key.as_str() {
                "fields" => match entry.value.kind() {
                    NodeKind::Mapping(field_types) => {
                        for field in field_types {
                            match self.type_expr(&field.value, references) {
                                Some(node) => {
                                    fields.insert(field.key.inner().clone(), node);
                                }
                                None => ok = false,
                            }
                        }
                    }
                    NodeKind::Null => {}
                    _ => {
                        self.diagnostics.emit(
                            Diagnostic::error("`fields` must be a mapping of field names to types")
                                .with_code(ErrorCode::E102)
                                .with_label(entry.value.span(), format!("found {}", entry.value.kind_name())),
                        );
                        ok = false;
                    }
                },
                "closed" => match entry.value.as_bool() {
                    Some(value) => closed = value,
                    None => {
                        self.diagnostics.emit(
                            Diagnostic::error("`closed` must be a boolean")
                                .with_code(ErrorCode::E102)
                                .with_label(entry.value.span(), format!("found {}", entry.value.kind_name())),
                        );
                        ok = false;
                    }
                },
                "description" | "constraints" => {}
                "extends" if declaration => {}
                _ => {
                    self.emit_unknown_key(entry, declaration);
                    ok = false;
                }
            }
        }

        ok.then(|| TypeNode::Object(ObjectType::new(fields, closed)))
    }

    /// `constraints:` next to a type. Each key narrows the values further;
    /// keys that leave no value are an error.
    fn constraints(&mut self, node: &Node) -> Option<Constraints> {
        let Some(mapping) = node.as_mapping() else {
            self.diagnostics.emit(
                Diagnostic::error("`constraints` must be a mapping")
                    .with_code(ErrorCode::E102)
                    .with_label(node.span(), format!("found {}", node.kind_name())),
            );
            return None;
        };

        let mut constraints = Constraints::default();
        let mut ok = true;
        for entry in mapping {
            let key = entry.key.as_str();
            if !CONSTRAINT_KEYS.contains(&key) {
                self.diagnostics.emit(
                    Diagnostic::error(format!("unknown constraint `{key}`"))
                        .with_code(ErrorCode::E102)
                        .with_label(entry.key.span(), "unknown key")
                        .with_help(format!("known constraints are {}", quoted_list(&CONSTRAINT_KEYS))),
                );
                ok = false;
                continue;
            }

            let Some(single) = constraint(key, &entry.value) else {
                self.diagnostics.emit(
                    Diagnostic::error(format!("invalid `{key}` constraint"))
                        .with_code(ErrorCode::E102)
                        .with_label(entry.value.span(), format!("expected {}", constraint_shape(key))),
                );
                ok = false;
                continue;
            };
            match constraints.intersect(&single) {
                Ok(narrowed) => constraints = narrowed,
                Err(reason) => {
                    self.diagnostics.emit(
                        Diagnostic::error(format!("inconsistent constraints: {reason}"))
                            .with_code(ErrorCode::E102)
                            .with_label(entry.key.span(), "admits no value with the keys before it"),
                    );
                    ok = false;
                }
            }
        }
        ok.then_some(constraints)
    }

    fn union_expr(&mut self, node: &Node, references: &mut Vec<Spanned<String>>) -> Option<TypeNode> {
        let Some(items) = node.as_sequence().filter(|items| !items.is_empty()) else {
            self.diagnostics.emit(
                Diagnostic::error("`union` must be a non-empty list of types")
                    .with_code(ErrorCode::E102)
                    .with_label(node.span(), "expected a list")
                    .with_help("write `{union: [A, B]}`"),
            );
            return None;
        };

        let mut members = Vec::with_capacity(items.len());
        let mut ok = true;
        for item in items {
            match self.type_expr(item, references) {
                Some(member) => members.push(member),
                None => ok = false,
            }
        }
        ok.then(|| TypeNode::union(members))
    }

    fn dictionary_expr(
        &mut self,
        node: &Node,
        references: &mut Vec<Spanned<String>>,
    ) -> Option<TypeNode> {
        let Some(mapping) = node.as_mapping() else {
            self.diagnostics.emit(
                Diagnostic::error("`dictionary` must be a mapping with `key` and `value`")
                    .with_code(ErrorCode::E102)
                    .with_label(node.span(), format!("found {}", node.kind_name())),
            );
            return None;
        };

        let mut key = None;
        let mut value = None;
        let mut ok = true;
        for entry in mapping {
            match entry.key.as_str() {
                "key" => key = self.type_expr(&entry.value, references),
                "value" => value = self.type_expr(&entry.value, references),
                other => {
                    self.diagnostics.emit(
                        Diagnostic::error(format!("unknown dictionary key `{other}`"))
                            .with_code(ErrorCode::E102)
                            .with_label(entry.key.span(), "unknown key")
                            .with_help("a dictionary has `key` and `value`"),
                    );
                    ok = false;
                }
            }
        }

        for required in ["key", "value"] {
            if !mapping.contains_key(required) {
                self.diagnostics.emit(
                    Diagnostic::error(format!("dictionary is missing `{required}`"))
                        .with_code(ErrorCode::E102)
                        .with_label(node.span(), format!("no `{required}` type")),
                );
                ok = false;
            }
        }

        match (key, value) {
            (Some(key), Some(value)) if ok => Some(TypeNode::dictionary(key, value)),
            _ => None,
        }
    }
}

/// The constraint a single `key: value` entry states.
fn constraint(key: &str, value: &Node) -> Option<Constraints> {
    let mut out = Constraints::default();
    match key {
        "required" => out.required = value.as_bool()?,
        "uniqueItems" => out.unique_items = value.as_bool()?,
        "minLength" => out.min_length = Some(count(value)?),
        "maxLength" => out.max_length = Some(count(value)?),
        "minItems" => out.min_items = Some(count(value)?),
        "maxItems" => out.max_items = Some(count(value)?),
        "multipleOf" => out.multiple_of = Some(count(value).filter(|n| *n > 0)?),
        "minimum" => out.minimum = Some(bound(value, false)?),
        "exclusiveMinimum" => out.minimum = Some(bound(value, true)?),
        "maximum" => out.maximum = Some(bound(value, false)?),
        "exclusiveMaximum" => out.maximum = Some(bound(value, true)?),
        "pattern" => match value.kind() {
            NodeKind::String(pattern) => out.add_pattern(pattern.as_str()),
            NodeKind::Sequence(items) if !items.is_empty() => {
                for item in items {
                    out.add_pattern(item.as_str()?);
                }
            }
            _ => return None,
        },
        "options" => {
            let items = value.as_sequence().filter(|items| !items.is_empty())?;
            let options = items.iter().map(scalar).collect::<Option<Vec<_>>>()?;
            out.set_options(options);
        }
        _ => return None,
    }
    Some(out)
}

fn constraint_shape(key: &str) -> &'static str {
    match key {
        "required" | "uniqueItems" => "a boolean",
        "multipleOf" => "a positive integer",
        "minimum" | "maximum" | "exclusiveMinimum" | "exclusiveMaximum" => "a number",
        "pattern" => "a string or a list of strings",
        "options" => "a non-empty list of scalar values",
        _ => "a non-negative integer",
    }
}

fn count(node: &Node) -> Option<u64> {
    match node.kind() {
        NodeKind::Integer(n) => u64::try_from(*n).ok(),
        _ => None,
    }
}

fn bound(node: &Node, exclusive: bool) -> Option<Bound> {
    match node.kind() {
        NodeKind::Integer(n) => Some(Bound::new(*n, exclusive)),
        NodeKind::Float(f) => Bound::from_f64(*f, exclusive),
        _ => None,
    }
}

fn scalar(node: &Node) -> Option<Value> {
    match node.kind() {
        NodeKind::Bool(b) => Some(Value::Bool(*b)),
        NodeKind::Integer(n) => Some(Value::Number((*n).into())),
        NodeKind::Float(f) => Number::from_f64(*f).map(Value::Number),
        NodeKind::String(text) => Some(Value::String(text.clone())),
        _ => None,
    }
}

fn quoted_list(items: &[&str]) -> String {
    items
        .iter()
        .map(|item| format!("`{item}`"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn quoted_list_of(entries: &[&MappingEntry]) -> String {
    let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
    quoted_list(&keys)
}
