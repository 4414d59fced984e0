//! The rewriter: mirror-file production.

use std::collections::BTreeSet;

use anatomist::syntax::text;
use anatomist::{
    method_attributes, walk_declarations, DeclKind, DeclarationVisitor, Envelope, EnvelopeNode,
    MatchedMethod, NodeCounter, NodeIndex, NodeKind, SourceTree,
};
use common::runtime::qualified_marker;
use common::AttributeTable;
use tracing::debug;
use tree_sitter::Node;

use crate::splice::{apply_edits, Edit};
use crate::TailorError;

pub use common::renamed_identifier;

/// Mirror text plus whether any method was renamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub source: String,
    pub changed: bool,
    /// `(old, new)` identifier pairs, in document order.
    pub renamed: Vec<(String, String)>,
}

/// Modifiers that would make the renamed method fail to compile.
const CONFLICTING_MODIFIERS: &[&str] = &["override", "sealed"];

/// Rewrites `tree` so the companion file can re-declare every matched method.
///
/// Attribute matching is recomputed from each node and cross-checked against what the
/// scan recorded for the same index.
///
/// # Errors
/// - `IndexMismatch`: the walk disagrees with the envelope's index table
/// - `SyntaxErrors`: the tree has error diagnostics
pub fn rewrite(
    tree: &SourceTree,
    table: &AttributeTable,
    envelope: &Envelope,
) -> Result<RewriteOutcome, TailorError> {
    let in_scope = envelope.gather_indices();
    if in_scope.is_empty() {
        return Ok(RewriteOutcome {
            source: tree.source().to_string(),
            changed: false,
            renamed: Vec::new(),
        });
    }
    tree.ensure_clean()?;

    let mut rewriter = Rewriter {
        source: tree.source(),
        table,
        envelope,
        in_scope: &in_scope,
        reached: BTreeSet::new(),
        edits: Vec::new(),
        renamed: Vec::new(),
    };
    walk_declarations(tree.root(), &mut NodeCounter::new(), &mut rewriter)?;

    if let Some(missing) = in_scope.difference(&rewriter.reached).next() {
        let expected = envelope
            .node_by_index(*missing)
            .map(describe)
            .unwrap_or_default();
        return Err(TailorError::IndexMismatch {
            index: *missing,
            expected,
            found: "no such node".to_string(),
        });
    }

    let Rewriter { edits, renamed, .. } = rewriter;
    debug!(
        origin = %tree.origin().display(),
        edits = edits.len(),
        renamed = renamed.len(),
        "rewrite complete"
    );
    let source = apply_edits(tree.source(), edits)?;

    Ok(RewriteOutcome {
        source,
        changed: !renamed.is_empty(),
        renamed,
    })
}

struct Rewriter<'a> {
    source: &'a str,
    table: &'a AttributeTable,
    envelope: &'a Envelope,
    in_scope: &'a BTreeSet<NodeIndex>,
    reached: BTreeSet<NodeIndex>,
    edits: Vec<Edit>,
    renamed: Vec<(String, String)>,
}

impl<'t> DeclarationVisitor<'t> for Rewriter<'_> {
    type Error = TailorError;

    fn visit_declaration(
        &mut self,
        kind: DeclKind,
        index: NodeIndex,
        node: Node<'t>,
    ) -> Result<(), TailorError> {
        if !self.in_scope.contains(&index) {
            return Ok(());
        }
        let envelope = self.envelope;
        let Some(recorded) = envelope.node_by_index(index) else {
            return Ok(());
        };
        self.reached.insert(index);

        if recorded.span != node.byte_range() || !kind_agrees(kind, &recorded.kind) {
            return Err(TailorError::IndexMismatch {
                index,
                expected: describe(recorded),
                found: format!("{} at {:?}", node.kind(), node.byte_range()),
            });
        }

        match &recorded.kind {
            NodeKind::Namespace(_) => Ok(()),
            NodeKind::Type(_) => {
                self.ensure_partial(node);
                Ok(())
            }
            NodeKind::Method(matched) => self.rewrite_method(index, node, matched),
        }
    }
}

impl Rewriter<'_> {
    fn ensure_partial(&mut self, node: Node<'_>) {
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            match child.kind() {
                "class" | "struct" => {
                    self.edits.push(Edit::insert(child.start_byte(), "partial "));
                    return;
                }
                "modifier" if text(child, self.source).trim() == "partial" => return,
                _ => {}
            }
        }
    }

    fn rewrite_method(
        &mut self,
        index: NodeIndex,
        node: Node<'_>,
        matched: &MatchedMethod,
    ) -> Result<(), TailorError> {
        let found = method_attributes(node, self.source, self.table);
        let names = found.names();
        if names != matched.matched_names() {
            return Err(TailorError::IndexMismatch {
                index,
                expected: format!("attributes {:?}", matched.matched_names()),
                found: format!("attributes {names:?}"),
            });
        }

        if let Some(arguments) = found.obsolete.as_ref().and_then(|o| o.arguments) {
            self.edits.push(Edit::delete(arguments.byte_range()));
        }

        let name_node = node.child_by_field_name("name").ok_or_else(|| {
            TailorError::IndexMismatch {
                index,
                expected: describe_method(matched),
                found: "method without a name".to_string(),
            }
        })?;

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "modifier" if CONFLICTING_MODIFIERS.contains(&text(child, self.source).trim()) => {
                    let end = skip_horizontal_space(self.source, child.end_byte());
                    self.edits.push(Edit::delete(child.start_byte()..end));
                }
                "explicit_interface_specifier" => {
                    self.edits
                        .push(Edit::delete(child.start_byte()..name_node.start_byte()));
                }
                _ => {}
            }
        }

        let current = text(name_node, self.source);
        let new_name = renamed_identifier(current, names.iter().copied());
        if new_name != current {
            debug!(%index, from = current, to = %new_name, "renaming method");
            self.edits
                .push(Edit::replace(name_node.byte_range(), new_name.clone()));
            self.renamed.push((current.to_string(), new_name));
        }

        let marker = qualified_marker();
        let markers: String = matched
            .attributes
            .iter()
            .map(|a| format!("[{marker}(\"{}\", \"{}\")] ", a.name, a.marker))
            .collect();
        self.edits.push(Edit::insert(node.start_byte(), markers));

        Ok(())
    }
}

fn kind_agrees(kind: DeclKind, recorded: &NodeKind) -> bool {
    matches!(
        (kind, recorded),
        (DeclKind::Namespace, NodeKind::Namespace(_))
            | (DeclKind::Class | DeclKind::Struct, NodeKind::Type(_))
            | (DeclKind::Method, NodeKind::Method(_))
    )
}

fn describe(node: &EnvelopeNode) -> String {
    let what = match &node.kind {
        NodeKind::Namespace(ns) => format!("namespace {}", ns.name),
        NodeKind::Type(t) => format!("{} {}", t.kind.keyword(), t.name),
        NodeKind::Method(m) => describe_method(m),
    };
    format!("{what} at {:?}", node.span)
}

fn describe_method(method: &MatchedMethod) -> String {
    format!("method {}", method.signature.qualified_name())
}

fn skip_horizontal_space(source: &str, mut offset: usize) -> usize {
    let bytes = source.as_bytes();
    while offset < bytes.len() && (bytes[offset] == b' ' || bytes[offset] == b'\t') {
        offset += 1;
    }
    offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use anatomist::scan;
    use common::AttributeDescriptor;

    fn table() -> AttributeTable {
        AttributeTable::new(vec![
            AttributeDescriptor::new("Cache", 1, "Base"),
            AttributeDescriptor::new("Logger", 2, "Base"),
        ])
        .unwrap()
    }

    fn run(source: &str) -> RewriteOutcome {
        let tree = SourceTree::parse("Rewrite.cs", source.to_string()).unwrap();
        let table = table();
        let envelope = scan(&tree, &table).unwrap();
        rewrite(&tree, &table, &envelope).unwrap()
    }

    /// Drops the generated marker attributes, whose tokens are random.
    fn without_markers(source: &str) -> String {
        let mut out = String::new();
        let mut rest = source;
        let open = format!("[{}(", qualified_marker());
        while let Some(start) = rest.find(&open) {
            out.push_str(&rest[..start]);
            let after = &rest[start..];
            let end = after.find(")] ").map(|e| e + 3).unwrap_or(after.len());
            rest = &after[end..];
        }
        out.push_str(rest);
        out
    }

    #[test]
    fn test_no_match_returns_source_unchanged() {
        let source = "namespace App { class C { public int Foo() { return 1; } } }";
        let outcome = run(source);
        assert!(!outcome.changed);
        assert_eq!(outcome.source, source);
    }

    #[test]
    fn test_renames_with_sorted_needles() {
        let outcome = run(
            "namespace App { public class C { [Logger][Cache] public int Foo() { return 1; } } }",
        );
        assert!(outcome.changed);
        assert_eq!(
            without_markers(&outcome.source),
            "namespace App { public partial class C { [Logger][Cache] public int Foo__WrappedByCache__WrappedByLogger() { return 1; } } }"
        );
        assert_eq!(
            outcome.renamed,
            vec![("Foo".to_string(), "Foo__WrappedByCache__WrappedByLogger".to_string())]
        );
    }

    #[test]
    fn test_one_marker_per_attribute() {
        let outcome = run("class C { [Cache, Logger] public int Foo() { return 1; } }");
        let marker = format!("[{}(\"Cache\", \"", qualified_marker());
        assert_eq!(outcome.source.matches(&marker).count(), 1);
        let marker = format!("[{}(\"Logger\", \"", qualified_marker());
        assert_eq!(outcome.source.matches(&marker).count(), 1);
    }

    #[test]
    fn test_strips_conflicting_modifiers_and_interface_qualifier() {
        let outcome = run(
            r#"class C : Base, IRunner {
    [Cache] public sealed override int Run() { return 1; }
    [Cache] int IRunner.Go() { return 2; }
}"#,
        );
        let mirror = without_markers(&outcome.source);
        assert!(mirror.contains("[Cache] public int Run__WrappedByCache()"), "{mirror}");
        assert!(mirror.contains("[Cache] int Go__WrappedByCache()"), "{mirror}");
        assert!(!mirror.contains("override"));
        assert!(!mirror.contains("IRunner.Go"));
    }

    #[test]
    fn test_obsolete_arguments_removed_marker_kept() {
        let outcome = run(
            r#"class C { [Cache] [System.Obsolete("use Bar", true)] public int Foo() { return 1; } }"#,
        );
        let mirror = without_markers(&outcome.source);
        assert!(mirror.contains("[System.Obsolete] public int Foo__WrappedByCache()"), "{mirror}");
    }

    #[test]
    fn test_partial_added_once_and_nested_types() {
        let outcome = run(
            r#"namespace App {
    public partial class Outer {
        internal struct Inner { [Cache] public int A() { return 1; } }
    }
    public class Untouched { public int B() { return 2; } }
}"#,
        );
        let mirror = without_markers(&outcome.source);
        assert!(mirror.contains("public partial class Outer"));
        assert!(!mirror.contains("partial partial"));
        assert!(mirror.contains("internal partial struct Inner"));
        assert!(mirror.contains("public class Untouched"));
    }

    #[test]
    fn test_rewrite_is_idempotent_on_names() {
        let source = "class C { [Cache] public int Foo() { return 1; } }";
        let first = run(source);
        let second = run(&first.source);
        assert!(!second.changed);
        assert!(second.source.contains("Foo__WrappedByCache()"));
        assert!(!second.source.contains("__WrappedByCache__WrappedByCache"));
    }

    #[test]
    fn test_envelope_from_other_source_is_rejected() {
        let table = table();
        let original = SourceTree::parse(
            "A.cs",
            "class C { [Cache] public int Foo() { return 1; } }".to_string(),
        )
        .unwrap();
        let envelope = scan(&original, &table).unwrap();
        let shifted = SourceTree::parse(
            "A.cs",
            "class C {  [Cache] public int Foo() { return 1; } }".to_string(),
        )
        .unwrap();
        let err = rewrite(&shifted, &table, &envelope).unwrap_err();
        assert!(matches!(err, TailorError::IndexMismatch { .. }));
    }
}
