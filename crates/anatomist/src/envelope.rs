//! The envelope: an arena holding the attribute-relevant skeleton of one file.
//!
//! Nodes are appended during the scan and never move. Pruning detaches empty
//! branches instead of compacting the arena, so `NodeId`s stay valid throughout.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::signature::MethodSignature;
use crate::walk::NodeIndex;
use crate::AnatomistError;

/// Handle of a node in the envelope arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    pub name: String,
    pub file_scoped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Class,
    Struct,
}

impl TypeKind {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Struct => "struct",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    pub kind: TypeKind,
    pub name: String,
    /// Modifier keywords in source order, `partial` included if written.
    pub modifiers: Vec<String>,
    pub type_parameters: Vec<String>,
    /// Type parameter list as written, e.g. `<TKey, TValue>`.
    pub type_parameter_list: Option<String>,
}

impl TypeDecl {
    pub fn is_partial(&self) -> bool {
        self.modifiers.iter().any(|m| m == "partial")
    }

    /// Name as referenced from inside the type, e.g. `Cache<TKey, TValue>`.
    pub fn reference(&self) -> String {
        if self.type_parameters.is_empty() {
            self.name.clone()
        } else {
            format!("{}<{}>", self.name, self.type_parameters.join(", "))
        }
    }
}

/// A configured attribute as it was written on a matched method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedAttribute {
    /// Configured descriptor name.
    pub name: String,
    /// Reference as written, qualification included.
    pub written: String,
    /// Constructor arguments, named ones (`x: 1`) included.
    pub arguments: Vec<String>,
    /// Property initializers (`Name = value`).
    pub initializers: Vec<String>,
    /// Unique token carried by the marker attached to the renamed method.
    pub marker: String,
}

/// The obsolescence attribute found on a matched method, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObsoleteMarker {
    /// Full attribute text including arguments, e.g. `Obsolete("use Bar", true)`.
    pub attribute: String,
}

/// A method carrying at least one configured attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedMethod {
    pub attributes: Vec<MatchedAttribute>,
    pub obsolete: Option<ObsoleteMarker>,
    pub signature: MethodSignature,
}

impl MatchedMethod {
    /// Configured names of every matched attribute. Never empty.
    pub fn matched_names(&self) -> BTreeSet<&str> {
        self.attributes.iter().map(|a| a.name.as_str()).collect()
    }

    pub fn attribute(&self, name: &str) -> Option<&MatchedAttribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Namespace(NamespaceDecl),
    Type(TypeDecl),
    Method(MatchedMethod),
}

#[derive(Debug, Clone)]
pub struct EnvelopeNode {
    pub index: NodeIndex,
    /// Byte range of the declaration in the scanned source.
    pub span: Range<usize>,
    pub kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    retained: bool,
}

impl EnvelopeNode {
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_retained(&self) -> bool {
        self.retained
    }
}

/// A `using` directive of the scanned file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsingDirective {
    /// Directive text without `using` and `;`, e.g. `static System.Math` or `IO = System.IO`.
    pub body: String,
    pub global: bool,
}

impl UsingDirective {
    /// Key used to de-duplicate directives: the text after `using`.
    pub fn key(&self) -> &str {
        &self.body
    }
}

/// Filtered structural view of one source file.
#[derive(Debug, Clone)]
pub struct Envelope {
    origin: PathBuf,
    nodes: Vec<EnvelopeNode>,
    roots: Vec<NodeId>,
    usings: Vec<UsingDirective>,
    attribute_names: BTreeSet<String>,
    by_index: BTreeMap<NodeIndex, NodeId>,
}

impl Envelope {
    pub fn new(origin: impl Into<PathBuf>) -> Self {
        Self {
            origin: origin.into(),
            nodes: Vec::new(),
            roots: Vec::new(),
            usings: Vec::new(),
            attribute_names: BTreeSet::new(),
            by_index: BTreeMap::new(),
        }
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }

    /// Appends `kind` under `parent` (`None` for the file level).
    ///
    /// Methods may only hang under types, and types and namespaces never under methods.
    pub fn add_child(
        &mut self,
        parent: Option<NodeId>,
        index: NodeIndex,
        span: Range<usize>,
        kind: NodeKind,
    ) -> Result<NodeId, AnatomistError> {
        let parent_kind = parent.map(|id| &self.nodes[id.0].kind);
        match (&kind, parent_kind) {
            (NodeKind::Method(_), Some(NodeKind::Type(_))) => {}
            (NodeKind::Method(m), _) => {
                return Err(AnatomistError::Structure(format!(
                    "method {} {index} must be placed inside a type",
                    m.signature.name
                )))
            }
            (_, Some(NodeKind::Method(_))) => {
                return Err(AnatomistError::Structure(format!(
                    "node {index} cannot be placed inside a method"
                )))
            }
            (NodeKind::Namespace(ns), Some(NodeKind::Type(_))) => {
                return Err(AnatomistError::Structure(format!(
                    "namespace {} {index} cannot be placed inside a type",
                    ns.name
                )))
            }
            _ => {}
        }
        if self.by_index.contains_key(&index) {
            return Err(AnatomistError::Structure(format!("index {index} added twice")));
        }

        if let NodeKind::Method(method) = &kind {
            self.attribute_names
                .extend(method.attributes.iter().map(|a| a.name.clone()));
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(EnvelopeNode {
            index,
            span,
            kind,
            parent,
            children: Vec::new(),
            retained: true,
        });
        match parent {
            Some(parent) => self.nodes[parent.0].children.push(id),
            None => self.roots.push(id),
        }
        self.by_index.insert(index, id);
        Ok(id)
    }

    pub fn add_using(&mut self, using: UsingDirective) {
        if !self.usings.iter().any(|u| u.key() == using.key()) {
            self.usings.push(using);
        }
    }

    /// Removes, bottom-up, every branch that holds no method.
    ///
    /// Returns the number of nodes removed. A second call removes nothing.
    pub fn prune(&mut self) -> usize {
        let roots = self.roots.clone();
        let mut removed = 0;
        for root in roots {
            self.prune_branch(root, &mut removed);
        }
        self.roots.retain(|id| self.nodes[id.0].retained);
        removed
    }

    fn prune_branch(&mut self, id: NodeId, removed: &mut usize) -> bool {
        if matches!(self.nodes[id.0].kind, NodeKind::Method(_)) {
            return true;
        }
        let children = self.nodes[id.0].children.clone();
        let mut kept = Vec::with_capacity(children.len());
        for child in children {
            if self.prune_branch(child, removed) {
                kept.push(child);
            }
        }
        let keep = !kept.is_empty();
        let node = &mut self.nodes[id.0];
        node.children = kept;
        if !keep {
            node.retained = false;
            self.by_index.remove(&node.index);
            *removed += 1;
        }
        keep
    }

    /// Indices of every retained node.
    pub fn gather_indices(&self) -> BTreeSet<NodeIndex> {
        self.by_index.keys().copied().collect()
    }

    /// The retained node that was assigned `index` during the scan.
    pub fn node_by_index(&self, index: NodeIndex) -> Option<&EnvelopeNode> {
        self.by_index.get(&index).map(|id| &self.nodes[id.0])
    }

    pub fn node(&self, id: NodeId) -> &EnvelopeNode {
        &self.nodes[id.0]
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// `true` when no node survived pruning.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn usings(&self) -> &[UsingDirective] {
        &self.usings
    }

    /// Configured names matched anywhere in the file.
    pub fn attribute_names(&self) -> &BTreeSet<String> {
        &self.attribute_names
    }

    /// Retained matched methods in document order.
    pub fn methods(&self) -> impl Iterator<Item = &MatchedMethod> + '_ {
        self.by_index
            .values()
            .filter_map(|id| match &self.nodes[id.0].kind {
                NodeKind::Method(m) => Some(m),
                _ => None,
            })
    }
}
