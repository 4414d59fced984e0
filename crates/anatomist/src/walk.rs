//! The shared declaration walk.
//!
//! Every pass that needs to agree on node identity goes through `walk_declarations`.
//! Indices are handed out in pre-order, one per namespace, class, struct or method node,
//! whether or not the visitor ends up caring about the node.

use std::fmt;

use tree_sitter::Node;

use crate::syntax::text;

/// Positional identity of a counted declaration within one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIndex(pub u32);

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Explicit index source for one walk. Never shared between walks.
#[derive(Debug, Default)]
pub struct NodeCounter {
    next: u32,
}

impl NodeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next index and moves past it.
    pub fn advance(&mut self) -> NodeIndex {
        let index = NodeIndex(self.next);
        self.next += 1;
        index
    }

    /// Number of indices handed out so far.
    pub fn issued(&self) -> u32 {
        self.next
    }
}

/// Declaration kinds that consume a `NodeIndex`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
    Namespace,
    Class,
    Struct,
    Method,
}

impl DeclKind {
    /// Maps a tree-sitter node kind to a counted declaration kind.
    pub fn of(kind: &str) -> Option<Self> {
        match kind {
            "namespace_declaration" | "file_scoped_namespace_declaration" => Some(Self::Namespace),
            "class_declaration" => Some(Self::Class),
            "struct_declaration" => Some(Self::Struct),
            "method_declaration" => Some(Self::Method),
            _ => None,
        }
    }

    pub fn is_type(self) -> bool {
        matches!(self, Self::Class | Self::Struct)
    }
}

/// Callbacks driven by `walk_declarations`.
pub trait DeclarationVisitor<'t> {
    type Error;

    /// Called once per counted declaration, in pre-order, with its freshly issued index.
    fn visit_declaration(
        &mut self,
        kind: DeclKind,
        index: NodeIndex,
        node: Node<'t>,
    ) -> Result<(), Self::Error>;

    /// Called for every `using` directive at file or namespace level.
    fn visit_using(&mut self, _node: Node<'t>) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Member kinds that can never contain a counted declaration.
const OPAQUE_KINDS: &[&str] = &[
    "field_declaration",
    "property_declaration",
    "event_declaration",
    "event_field_declaration",
    "constructor_declaration",
    "destructor_declaration",
    "operator_declaration",
    "conversion_operator_declaration",
    "indexer_declaration",
    "delegate_declaration",
    "enum_declaration",
    "global_statement",
    "attribute_list",
];

/// Walks `root` in pre-order, issuing indices from `counter`.
///
/// Method bodies are never entered.
pub fn walk_declarations<'t, V>(
    root: Node<'t>,
    counter: &mut NodeCounter,
    visitor: &mut V,
) -> Result<(), V::Error>
where
    V: DeclarationVisitor<'t>,
{
    let mut cursor = root.walk();
    for child in root.named_children(&mut cursor) {
        walk_node(child, counter, visitor)?;
    }
    Ok(())
}

fn walk_node<'t, V>(node: Node<'t>, counter: &mut NodeCounter, visitor: &mut V) -> Result<(), V::Error>
where
    V: DeclarationVisitor<'t>,
{
    if node.kind() == "using_directive" {
        return visitor.visit_using(node);
    }
    if OPAQUE_KINDS.contains(&node.kind()) {
        return Ok(());
    }

    if let Some(kind) = DeclKind::of(node.kind()) {
        let index = counter.advance();
        visitor.visit_declaration(kind, index, node)?;
        if kind == DeclKind::Method {
            return Ok(());
        }
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        walk_node(child, counter, visitor)?;
    }
    Ok(())
}

/// Text of the `name` field, or `""` when the node has none.
pub fn declaration_name<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    node.child_by_field_name("name")
        .map(|name| text(name, source))
        .unwrap_or("")
}

/// The declaration that syntactically encloses `node`.
///
/// `declaration_list` wrappers and preprocessor blocks are transparent. Top-level
/// declarations that follow a file-scoped namespace belong to it. `None` means the
/// compilation unit itself.
pub fn declaration_parent<'t>(node: Node<'t>) -> Option<Node<'t>> {
    let mut current = node;
    loop {
        let parent = current.parent()?;
        match parent.kind() {
            "declaration_list" => current = parent,
            kind if kind.starts_with("preproc_") => current = parent,
            "compilation_unit" => return preceding_file_scoped_namespace(current),
            _ => return Some(parent),
        }
    }
}

fn preceding_file_scoped_namespace(top_level: Node<'_>) -> Option<Node<'_>> {
    if top_level.kind() == "file_scoped_namespace_declaration" {
        return None;
    }
    let mut sibling = top_level.prev_named_sibling();
    while let Some(node) = sibling {
        if node.kind() == "file_scoped_namespace_declaration" {
            return Some(node);
        }
        sibling = node.prev_named_sibling();
    }
    None
}

/// Structural sameness: same kind, same name, and structurally the same parents
/// all the way up to the compilation unit.
pub fn same_declaration(a: Node<'_>, b: Node<'_>, source: &str) -> bool {
    if a.id() == b.id() {
        return true;
    }
    if a.kind() != b.kind() || declaration_name(a, source) != declaration_name(b, source) {
        return false;
    }
    match (declaration_parent(a), declaration_parent(b)) {
        (None, None) => true,
        (Some(pa), Some(pb)) => same_declaration(pa, pb, source),
        _ => false,
    }
}
