//! The scanner: one walk from a parsed tree to a pruned envelope.
//!
//! Two ancestor stacks track where the walk is. Entering a declaration pops frames until
//! the top frame is structurally the same declaration as the new node's parent. A node
//! whose parent cannot be found on the stacks (a class nested in a record, say) is skipped
//! without disturbing the stacks, so later siblings still find their ancestors.

use common::AttributeTable;
use tracing::debug;
use tree_sitter::Node;
use uuid::Uuid;

use crate::attributes::{method_attributes, normalize_whitespace, split_arguments};
use crate::envelope::{
    Envelope, MatchedAttribute, MatchedMethod, NamespaceDecl, NodeId, NodeKind, ObsoleteMarker,
    TypeDecl, TypeKind, UsingDirective,
};
use crate::signature::{type_parameter_names, MethodSignature};
use crate::syntax::{text, SourceTree};
use crate::walk::{
    declaration_name, declaration_parent, same_declaration, walk_declarations, DeclKind,
    DeclarationVisitor, NodeCounter, NodeIndex,
};
use crate::AnatomistError;

/// Scans `tree` for methods carrying attributes from `table`.
///
/// # Errors
/// - `SyntaxErrors`: the tree has error diagnostics; no envelope is produced.
pub fn scan(tree: &SourceTree, table: &AttributeTable) -> Result<Envelope, AnatomistError> {
    tree.ensure_clean()?;

    let mut scanner = Scanner {
        source: tree.source(),
        table,
        envelope: Envelope::new(tree.origin()),
        namespaces: Vec::new(),
        types: Vec::new(),
    };
    let mut counter = NodeCounter::new();
    walk_declarations(tree.root(), &mut counter, &mut scanner)?;

    let mut envelope = scanner.envelope;
    let removed = envelope.prune();
    debug!(
        origin = %tree.origin().display(),
        visited = counter.issued(),
        retained = envelope.gather_indices().len(),
        pruned = removed,
        "scan complete"
    );
    Ok(envelope)
}

struct Frame<'t> {
    node: Node<'t>,
    id: NodeId,
}

struct Scanner<'t, 's> {
    source: &'s str,
    table: &'s AttributeTable,
    envelope: Envelope,
    namespaces: Vec<Frame<'t>>,
    types: Vec<Frame<'t>>,
}

impl<'t> DeclarationVisitor<'t> for Scanner<'t, '_> {
    type Error = AnatomistError;

    fn visit_declaration(
        &mut self,
        kind: DeclKind,
        index: NodeIndex,
        node: Node<'t>,
    ) -> Result<(), AnatomistError> {
        match kind {
            DeclKind::Namespace => self.enter_namespace(index, node),
            DeclKind::Class | DeclKind::Struct => self.enter_type(kind, index, node),
            DeclKind::Method => self.visit_method(index, node),
        }
    }

    fn visit_using(&mut self, node: Node<'t>) -> Result<(), AnatomistError> {
        if let Some(using) = using_directive(node, self.source) {
            self.envelope.add_using(using);
        }
        Ok(())
    }
}

impl<'t> Scanner<'t, '_> {
    fn enter_namespace(&mut self, index: NodeIndex, node: Node<'t>) -> Result<(), AnatomistError> {
        self.types.clear();
        let parent_id = match declaration_parent(node) {
            None => {
                self.namespaces.clear();
                None
            }
            Some(parent) => match frame_position(&self.namespaces, parent, self.source) {
                Some(pos) => {
                    self.namespaces.truncate(pos + 1);
                    Some(self.namespaces[pos].id)
                }
                None => {
                    debug!(%index, "namespace without a known parent, skipped");
                    return Ok(());
                }
            },
        };

        let decl = NamespaceDecl {
            name: normalize_whitespace(declaration_name(node, self.source)),
            file_scoped: node.kind() == "file_scoped_namespace_declaration",
        };
        let id = self
            .envelope
            .add_child(parent_id, index, node.byte_range(), NodeKind::Namespace(decl))?;
        self.namespaces.push(Frame { node, id });
        Ok(())
    }

    fn enter_type(
        &mut self,
        kind: DeclKind,
        index: NodeIndex,
        node: Node<'t>,
    ) -> Result<(), AnatomistError> {
        let parent_id = match declaration_parent(node) {
            None => {
                self.namespaces.clear();
                self.types.clear();
                None
            }
            Some(parent) => match DeclKind::of(parent.kind()) {
                Some(DeclKind::Namespace) => {
                    match frame_position(&self.namespaces, parent, self.source) {
                        Some(pos) => {
                            self.namespaces.truncate(pos + 1);
                            self.types.clear();
                            Some(self.namespaces[pos].id)
                        }
                        None => return Ok(()),
                    }
                }
                Some(parent_kind) if parent_kind.is_type() => {
                    match frame_position(&self.types, parent, self.source) {
                        Some(pos) => {
                            self.types.truncate(pos + 1);
                            Some(self.types[pos].id)
                        }
                        None => return Ok(()),
                    }
                }
                _ => {
                    debug!(%index, container = parent.kind(), "type inside unsupported container, skipped");
                    return Ok(());
                }
            },
        };

        let decl = type_decl(kind, node, self.source);
        let id = self
            .envelope
            .add_child(parent_id, index, node.byte_range(), NodeKind::Type(decl))?;
        self.types.push(Frame { node, id });
        Ok(())
    }

    fn visit_method(&mut self, index: NodeIndex, node: Node<'t>) -> Result<(), AnatomistError> {
        let found = method_attributes(node, self.source, self.table);
        if found.is_empty() {
            return Ok(());
        }

        let signature = MethodSignature::from_node(node, self.source)?;
        if !signature.has_body || signature.has_modifier("partial") {
            debug!(method = %signature.name, %index, "attributed method without a wrappable body, skipped");
            return Ok(());
        }
        if signature.returns_by_ref() {
            debug!(method = %signature.name, %index, "attributed method returning by reference, skipped");
            return Ok(());
        }

        let Some(parent) = declaration_parent(node) else {
            return Ok(());
        };
        if !DeclKind::of(parent.kind()).is_some_and(DeclKind::is_type) {
            debug!(method = %signature.name, container = parent.kind(), "method outside class or struct, skipped");
            return Ok(());
        }
        let Some(pos) = frame_position(&self.types, parent, self.source) else {
            debug!(method = %signature.name, %index, "method inside a skipped type");
            return Ok(());
        };
        self.types.truncate(pos + 1);
        let type_id = self.types[pos].id;

        let attributes = found
            .matched
            .iter()
            .map(|occurrence| {
                let (arguments, initializers) = occurrence
                    .arguments
                    .map(|args| split_arguments(args, self.source))
                    .unwrap_or_default();
                MatchedAttribute {
                    name: occurrence.name.clone(),
                    written: occurrence.written.clone(),
                    arguments,
                    initializers,
                    marker: Uuid::new_v4().to_string(),
                }
            })
            .collect();
        let obsolete = found.obsolete.as_ref().map(|o| ObsoleteMarker {
            attribute: normalize_whitespace(text(o.node, self.source)),
        });

        debug!(method = %signature.name, %index, attributes = ?found.names(), "matched method");
        let method = MatchedMethod {
            attributes,
            obsolete,
            signature,
        };
        self.envelope
            .add_child(Some(type_id), index, node.byte_range(), NodeKind::Method(method))?;
        Ok(())
    }
}

/// Position of the topmost frame structurally matching `parent`.
fn frame_position(stack: &[Frame<'_>], parent: Node<'_>, source: &str) -> Option<usize> {
    stack
        .iter()
        .rposition(|frame| same_declaration(frame.node, parent, source))
}

fn type_decl(kind: DeclKind, node: Node<'_>, source: &str) -> TypeDecl {
    let type_kind = if kind == DeclKind::Struct {
        TypeKind::Struct
    } else {
        TypeKind::Class
    };

    let mut modifiers = Vec::new();
    let mut type_parameters = Vec::new();
    let mut type_parameter_list = None;
    let mut before_keyword = true;

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        match child.kind() {
            k if k == type_kind.keyword() => before_keyword = false,
            "attribute_list" | "comment" => {}
            "type_parameter_list" => {
                type_parameter_list = Some(normalize_whitespace(text(child, source)));
                type_parameters = type_parameter_names(child, source);
            }
            _ if before_keyword => {
                let word = text(child, source).trim();
                if !word.is_empty() {
                    modifiers.push(word.to_string());
                }
            }
            _ => {}
        }
    }

    TypeDecl {
        kind: type_kind,
        name: declaration_name(node, source).to_string(),
        modifiers,
        type_parameters,
        type_parameter_list,
    }
}

fn using_directive(node: Node<'_>, source: &str) -> Option<UsingDirective> {
    let written = normalize_whitespace(text(node, source));
    let (global, rest) = match written.strip_prefix("global ") {
        Some(rest) => (true, rest),
        None => (false, written.as_str()),
    };
    let body = rest
        .strip_prefix("using ")?
        .trim_end_matches(';')
        .trim()
        .to_string();
    if body.is_empty() {
        return None;
    }
    Some(UsingDirective { body, global })
}
