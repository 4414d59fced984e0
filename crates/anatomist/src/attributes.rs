//! Attribute matching on method declarations.
//!
//! Both the scanner and the rewriter call `method_attributes` on the node in front of
//! them, so matching is always recomputed from syntax and never shared between passes.

use std::collections::BTreeSet;

use common::{is_obsolete_attribute, AttributeTable};
use tracing::debug;
use tree_sitter::Node;

use crate::syntax::text;

/// A configured attribute found on a method.
#[derive(Debug, Clone)]
pub struct AttributeOccurrence<'t> {
    /// The `attribute` node.
    pub node: Node<'t>,
    /// Configured descriptor name the reference resolved to.
    pub name: String,
    /// Reference as written, e.g. `Aspects.CacheAttribute`.
    pub written: String,
    pub arguments: Option<Node<'t>>,
}

/// The obsolescence attribute found on a method.
#[derive(Debug, Clone)]
pub struct ObsoleteOccurrence<'t> {
    pub node: Node<'t>,
    pub arguments: Option<Node<'t>>,
}

/// Result of scanning a method's attribute lists once.
#[derive(Debug, Clone, Default)]
pub struct MethodAttributes<'t> {
    /// First occurrence of each configured attribute, in source order.
    pub matched: Vec<AttributeOccurrence<'t>>,
    pub obsolete: Option<ObsoleteOccurrence<'t>>,
}

impl MethodAttributes<'_> {
    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }

    pub fn names(&self) -> BTreeSet<&str> {
        self.matched.iter().map(|m| m.name.as_str()).collect()
    }
}

/// Scans every attribute list of `method` against `table`.
///
/// Lists with an explicit target (`[return: ...]`) do not apply to the method and are skipped.
pub fn method_attributes<'t>(
    method: Node<'t>,
    source: &str,
    table: &AttributeTable,
) -> MethodAttributes<'t> {
    let mut found = MethodAttributes::default();

    let mut cursor = method.walk();
    for list in method.named_children(&mut cursor) {
        if list.kind() != "attribute_list" || has_target_specifier(list) {
            continue;
        }
        let mut list_cursor = list.walk();
        for attribute in list.named_children(&mut list_cursor) {
            if attribute.kind() != "attribute" {
                continue;
            }
            let Some(name_node) = attribute.child_by_field_name("name") else {
                continue;
            };
            let written = text(name_node, source);
            let arguments = argument_list(attribute);

            if let Some(descriptor) = table.resolve(written) {
                if found.matched.iter().any(|m| m.name == descriptor.name) {
                    debug!(attribute = written, "repeated attribute on one method, keeping first");
                    continue;
                }
                found.matched.push(AttributeOccurrence {
                    node: attribute,
                    name: descriptor.name.clone(),
                    written: written.to_string(),
                    arguments,
                });
            } else if is_obsolete_attribute(written) && found.obsolete.is_none() {
                found.obsolete = Some(ObsoleteOccurrence {
                    node: attribute,
                    arguments,
                });
            }
        }
    }

    found
}

fn has_target_specifier(list: Node<'_>) -> bool {
    let mut cursor = list.walk();
    let found = list
        .named_children(&mut cursor)
        .any(|child| child.kind() == "attribute_target_specifier");
    found
}

fn argument_list(attribute: Node<'_>) -> Option<Node<'_>> {
    let mut cursor = attribute.walk();
    let found = attribute
        .named_children(&mut cursor)
        .find(|child| child.kind() == "attribute_argument_list");
    found
}

/// Splits an attribute argument list into constructor arguments and property initializers.
///
/// `Cache(10, region: "a", Sliding = true)` yields `["10", "region: \"a\""]` and
/// `["Sliding = true"]`.
pub fn split_arguments(arguments: Node<'_>, source: &str) -> (Vec<String>, Vec<String>) {
    let mut positional = Vec::new();
    let mut initializers = Vec::new();

    let mut cursor = arguments.walk();
    for argument in arguments.named_children(&mut cursor) {
        if argument.kind() != "attribute_argument" {
            continue;
        }
        let written = normalize_whitespace(text(argument, source));
        if is_property_initializer(argument) {
            initializers.push(written);
        } else {
            positional.push(written);
        }
    }

    (positional, initializers)
}

fn is_property_initializer(argument: Node<'_>) -> bool {
    let mut cursor = argument.walk();
    let found = argument
        .children(&mut cursor)
        .any(|child| child.kind() == "=" || child.kind() == "name_equals");
    found
}

/// Collapses runs of whitespace (including newlines) into single spaces.
///
/// String and char literals are copied as written.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    let mut rest = text;

    while let Some(c) = rest.chars().next() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            rest = &rest[c.len_utf8()..];
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        let len = literal_len(rest).unwrap_or(c.len_utf8());
        out.push_str(&rest[..len]);
        rest = &rest[len..];
    }
    out
}

/// Byte length of the literal starting at `text`, prefixes included, or `None`
/// when `text` does not start one.
fn literal_len(text: &str) -> Option<usize> {
    let prefix = text.bytes().take_while(|b| matches!(b, b'@' | b'$')).count();
    let verbatim = text[..prefix].contains('@');
    let body = &text[prefix..];
    let quote = body.chars().next()?;
    if quote == '\'' && prefix == 0 {
        return Some(quoted_len(body, '\'', false));
    }
    if quote != '"' {
        return None;
    }

    let quotes = body.bytes().take_while(|&b| b == b'"').count();
    if quotes >= 3 {
        let fence = &body[..quotes];
        let end = body[quotes..]
            .find(fence)
            .map_or(body.len(), |at| quotes + at + quotes);
        return Some(prefix + end);
    }
    Some(prefix + quoted_len(body, '"', verbatim))
}

/// Length of a literal opening with `quote`, up to and including its closing quote.
fn quoted_len(body: &str, quote: char, verbatim: bool) -> usize {
    let mut chars = body.char_indices().skip(1).peekable();
    while let Some((at, c)) = chars.next() {
        if c == '\\' && !verbatim {
            chars.next();
        } else if c == quote {
            if verbatim && chars.peek().is_some_and(|&(_, next)| next == quote) {
                chars.next();
                continue;
            }
            return at + c.len_utf8();
        }
    }
    body.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceTree;
    use common::AttributeDescriptor;

    fn table() -> AttributeTable {
        AttributeTable::new(vec![
            AttributeDescriptor::new("Cache", 1, "Base"),
            AttributeDescriptor::new("Logger", 2, "Base"),
        ])
        .unwrap()
    }

    fn first_method(tree: &SourceTree) -> Node<'_> {
        fn find<'t>(node: Node<'t>) -> Option<Node<'t>> {
            if node.kind() == "method_declaration" {
                return Some(node);
            }
            let mut cursor = node.walk();
            let children: Vec<_> = node.named_children(&mut cursor).collect();
            children.into_iter().find_map(find)
        }
        find(tree.root()).unwrap()
    }

    #[test]
    fn test_matches_bare_suffixed_and_qualified() {
        let tree = SourceTree::parse(
            "A.cs",
            r#"class C {
                [Aspects.CacheAttribute(5)]
                [Logger, Serializable]
                [System.Obsolete("old", true)]
                public int Foo() { return 1; }
            }"#
            .to_string(),
        )
        .unwrap();
        let method = first_method(&tree);
        let found = method_attributes(method, tree.source(), &table());

        let names: Vec<_> = found.names().into_iter().collect();
        assert_eq!(names, vec!["Cache", "Logger"]);
        assert_eq!(found.matched[0].written, "Aspects.CacheAttribute");
        assert!(found.matched[0].arguments.is_some());
        assert!(found.matched[1].arguments.is_none());

        let obsolete = found.obsolete.unwrap();
        assert_eq!(text(obsolete.arguments.unwrap(), tree.source()), "(\"old\", true)");
    }

    #[test]
    fn test_targeted_lists_are_ignored() {
        let tree = SourceTree::parse(
            "B.cs",
            "class C { [return: Cache] public int Foo() { return 1; } }".to_string(),
        )
        .unwrap();
        let method = first_method(&tree);
        assert!(method_attributes(method, tree.source(), &table()).is_empty());
    }

    #[test]
    fn test_split_arguments() {
        let tree = SourceTree::parse(
            "C.cs",
            r#"class C { [Cache(10, region: "a", Sliding = true)] public int Foo() { return 1; } }"#
                .to_string(),
        )
        .unwrap();
        let method = first_method(&tree);
        let found = method_attributes(method, tree.source(), &table());
        let (positional, initializers) =
            split_arguments(found.matched[0].arguments.unwrap(), tree.source());
        assert_eq!(positional, vec!["10".to_string(), "region: \"a\"".to_string()]);
        assert_eq!(initializers, vec!["Sliding = true".to_string()]);
    }

    #[test]
    fn test_normalize_whitespace_keeps_literals() {
        assert_eq!(normalize_whitespace("  Dictionary<string,\n   int>  "), "Dictionary<string, int>");
        assert_eq!(normalize_whitespace(r#"=   "x   y""#), r#"= "x   y""#);
        assert_eq!(normalize_whitespace(r#"Key = "a \"  q\"  b""#), r#"Key = "a \"  q\"  b""#);
        assert_eq!(normalize_whitespace(r#"@"a ""  b"   +   'c'"#), r#"@"a ""  b" + 'c'"#);
        assert_eq!(normalize_whitespace("$\"{x}   y\"   ,  ' '"), "$\"{x}   y\" , ' '");
        assert_eq!(normalize_whitespace("\"\"\"  raw \" text  \"\"\"  x"), "\"\"\"  raw \" text  \"\"\" x");
        assert_eq!(normalize_whitespace("@class   x"), "@class x");
    }
}
