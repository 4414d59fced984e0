//! Method signature extraction.
//!
//! Signatures are kept as normalized source text. Nothing downstream needs a typed
//! model of C# types; the builder re-emits them verbatim or runs the textual type
//! utilities in `forge::types` over them.

use tree_sitter::Node;

use crate::attributes::normalize_whitespace;
use crate::syntax::text;
use crate::AnatomistError;

/// One formal parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    /// Attribute lists as written, e.g. `[CallerMemberName]`.
    pub attributes: Vec<String>,
    /// Keywords in front of the type: `ref`, `out`, `in`, `params`, `this`, `scoped`.
    pub modifiers: Vec<String>,
    pub ty: String,
    pub name: String,
    /// Default value clause including the `=`, e.g. `= 10`.
    pub default: Option<String>,
}

impl Parameter {
    /// `ref`, `out` or `in` when the parameter is passed by reference.
    pub fn by_ref(&self) -> Option<&str> {
        self.modifiers
            .iter()
            .map(String::as_str)
            .find(|m| matches!(*m, "ref" | "out" | "in"))
    }

    pub fn is_out(&self) -> bool {
        self.by_ref() == Some("out")
    }

    /// Declaration text as it appears in a parameter list.
    pub fn declaration(&self) -> String {
        let mut parts: Vec<&str> = self.attributes.iter().map(String::as_str).collect();
        parts.extend(self.modifiers.iter().map(String::as_str));
        parts.push(&self.ty);
        parts.push(&self.name);
        let mut out = parts.join(" ");
        if let Some(default) = &self.default {
            out.push(' ');
            out.push_str(default);
        }
        out
    }

    /// Argument text when forwarding this parameter to another call.
    pub fn forwarding_argument(&self) -> String {
        match self.by_ref() {
            Some(mode) => format!("{mode} {}", self.name),
            None => self.name.clone(),
        }
    }
}

/// Normalized signature of a method declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub name: String,
    pub modifiers: Vec<String>,
    pub return_type: String,
    /// Interface qualifier without the trailing dot, e.g. `IDisposable`.
    pub explicit_interface: Option<String>,
    pub type_parameters: Vec<String>,
    /// Type parameter list as written, e.g. `<T, in U>`.
    pub type_parameter_list: Option<String>,
    pub parameters: Vec<Parameter>,
    /// `where` clauses as written.
    pub constraints: Vec<String>,
    pub has_body: bool,
}

impl MethodSignature {
    /// Extracts the signature of a `method_declaration` node.
    pub fn from_node(node: Node<'_>, source: &str) -> Result<Self, AnatomistError> {
        let name = node
            .child_by_field_name("name")
            .map(|n| text(n, source).to_string())
            .ok_or_else(|| malformed(node, "method without a name"))?;
        let return_type = node
            .child_by_field_name("returns")
            .or_else(|| node.child_by_field_name("type"))
            .map(|n| normalize_whitespace(text(n, source)))
            .ok_or_else(|| malformed(node, "method without a return type"))?;

        let mut modifiers = Vec::new();
        let mut explicit_interface = None;
        let mut type_parameter_list = None;
        let mut type_parameters = Vec::new();
        let mut parameters = Vec::new();
        let mut constraints = Vec::new();

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "modifier" => modifiers.push(text(child, source).trim().to_string()),
                "explicit_interface_specifier" => {
                    let qualifier = normalize_whitespace(text(child, source));
                    explicit_interface = Some(qualifier.trim_end_matches('.').trim().to_string());
                }
                "type_parameter_list" => {
                    type_parameter_list = Some(normalize_whitespace(text(child, source)));
                    type_parameters = type_parameter_names(child, source);
                }
                "parameter_list" => parameters = parameter_list(child, source)?,
                "type_parameter_constraints_clause" => {
                    constraints.push(normalize_whitespace(text(child, source)))
                }
                _ => {}
            }
        }

        Ok(Self {
            name,
            modifiers,
            return_type,
            explicit_interface,
            type_parameters,
            type_parameter_list,
            parameters,
            constraints,
            has_body: node.child_by_field_name("body").is_some(),
        })
    }

    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }

    pub fn is_static(&self) -> bool {
        self.has_modifier("static")
    }

    pub fn returns_void(&self) -> bool {
        self.return_type == "void"
    }

    /// `ref int Get()` and `ref readonly` returns.
    pub fn returns_by_ref(&self) -> bool {
        self.return_type.starts_with("ref ")
    }

    /// Declared `async`, or returning a `Task`/`ValueTask` shape.
    pub fn is_async(&self) -> bool {
        if self.has_modifier("async") {
            return true;
        }
        let head = self.return_type.split('<').next().unwrap_or("");
        let segment = head.rsplit('.').next().unwrap_or(head).trim();
        matches!(segment, "Task" | "ValueTask")
    }

    pub fn has_by_ref_parameters(&self) -> bool {
        self.parameters.iter().any(|p| p.by_ref().is_some())
    }

    /// Name including any explicit interface qualifier, e.g. `IShape.Area`.
    pub fn qualified_name(&self) -> String {
        match &self.explicit_interface {
            Some(interface) => format!("{interface}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// `<T, U>` built from the parameter names alone, for call sites. Empty when not generic.
    pub fn type_arguments(&self) -> String {
        if self.type_parameters.is_empty() {
            String::new()
        } else {
            format!("<{}>", self.type_parameters.join(", "))
        }
    }

    /// Parameter list text, e.g. `(int a, out string b)`.
    pub fn parameter_list(&self) -> String {
        let parameters: Vec<String> = self.parameters.iter().map(Parameter::declaration).collect();
        format!("({})", parameters.join(", "))
    }

    /// Parameter types joined with `,`, or `void` when the method takes none.
    pub fn parameter_fingerprint(&self) -> String {
        if self.parameters.is_empty() {
            return "void".to_string();
        }
        self.parameters
            .iter()
            .map(|p| match p.by_ref() {
                Some(mode) => format!("{mode} {}", p.ty),
                None => p.ty.clone(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn malformed(node: Node<'_>, what: &str) -> AnatomistError {
    let position = node.start_position();
    AnatomistError::Structure(format!("{what} at {}:{}", position.row + 1, position.column + 1))
}

pub(crate) fn type_parameter_names(list: Node<'_>, source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut cursor = list.walk();
    for parameter in list.named_children(&mut cursor) {
        if parameter.kind() != "type_parameter" {
            continue;
        }
        let name = parameter.child_by_field_name("name").or_else(|| {
            let mut inner = parameter.walk();
            let last = parameter
                .named_children(&mut inner)
                .filter(|n| n.kind() == "identifier")
                .last();
            last
        });
        if let Some(name) = name {
            names.push(text(name, source).to_string());
        }
    }
    names
}

fn parameter_list(list: Node<'_>, source: &str) -> Result<Vec<Parameter>, AnatomistError> {
    // A `params` array is not wrapped in its own node: its attribute lists, keyword,
    // type and name sit directly in the list, so parameters are split on commas.
    let mut groups: Vec<Vec<Node<'_>>> = vec![Vec::new()];
    let mut cursor = list.walk();
    for child in list.children(&mut cursor) {
        match child.kind() {
            "(" | ")" | "comment" => {}
            "," => groups.push(Vec::new()),
            _ => {
                if let Some(group) = groups.last_mut() {
                    group.push(child);
                }
            }
        }
    }

    groups
        .into_iter()
        .filter(|group| !group.is_empty())
        .map(|group| match group.as_slice() {
            [node] if matches!(node.kind(), "parameter" | "parameter_array") => parameter(*node, source),
            nodes => parameter_array(list, nodes, source),
        })
        .collect()
}

fn parameter(node: Node<'_>, source: &str) -> Result<Parameter, AnatomistError> {
    let name_node = node
        .child_by_field_name("name")
        .ok_or_else(|| malformed(node, "parameter without a name"))?;
    let type_node = node
        .child_by_field_name("type")
        .ok_or_else(|| malformed(node, "parameter without a type"))?;

    // Everything between the attribute lists and the type is a modifier keyword.
    let mut attributes = Vec::new();
    let mut modifiers = Vec::new();
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.start_byte() >= type_node.start_byte() {
            break;
        }
        match child.kind() {
            "attribute_list" => attributes.push(normalize_whitespace(text(child, source))),
            "comment" => {}
            _ => modifiers.extend(text(child, source).split_whitespace().map(str::to_string)),
        }
    }
    if node.kind() == "parameter_array" && !modifiers.iter().any(|m| m == "params") {
        modifiers.insert(0, "params".to_string());
    }

    let tail = source
        .get(name_node.end_byte()..node.end_byte())
        .unwrap_or("")
        .trim();
    let default = (!tail.is_empty()).then(|| normalize_whitespace(tail));

    Ok(Parameter {
        attributes,
        modifiers,
        ty: normalize_whitespace(text(type_node, source)),
        name: text(name_node, source).to_string(),
        default,
    })
}

/// `[attrs] params T[] name` spread over sibling nodes of the parameter list.
fn parameter_array(list: Node<'_>, nodes: &[Node<'_>], source: &str) -> Result<Parameter, AnatomistError> {
    let mut attributes = Vec::new();
    let mut modifiers = Vec::new();
    let mut ty = None;
    let mut name = None;
    for node in nodes {
        match node.kind() {
            "attribute_list" => attributes.push(normalize_whitespace(text(*node, source))),
            "params" => modifiers.push("params".to_string()),
            "identifier" if ty.is_some() => name = Some(text(*node, source).to_string()),
            _ if node.is_named() && ty.is_none() => ty = Some(normalize_whitespace(text(*node, source))),
            _ => {}
        }
    }

    let anchor = nodes.first().copied().unwrap_or(list);
    match (ty, name) {
        (Some(ty), Some(name)) if !modifiers.is_empty() => Ok(Parameter {
            attributes,
            modifiers,
            ty,
            name,
            default: None,
        }),
        _ => Err(malformed(anchor, "unrecognised parameter")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceTree;

    fn signature_of(source: &str) -> MethodSignature {
        let tree = SourceTree::parse("Sig.cs", source.to_string()).unwrap();
        assert!(tree.diagnostics().is_empty(), "{:?}", tree.diagnostics());
        let mut stack = vec![tree.root()];
        while let Some(node) = stack.pop() {
            if node.kind() == "method_declaration" {
                return MethodSignature::from_node(node, tree.source()).unwrap();
            }
            let mut cursor = node.walk();
            stack.extend(node.named_children(&mut cursor));
        }
        panic!("no method in source");
    }

    #[test]
    fn test_plain_method() {
        let sig = signature_of("class C { public static int Add(int a, int b = 2) { return a + b; } }");
        assert_eq!(sig.name, "Add");
        assert_eq!(sig.modifiers, vec!["public", "static"]);
        assert_eq!(sig.return_type, "int");
        assert!(sig.is_static());
        assert!(!sig.is_async());
        assert_eq!(sig.parameter_list(), "(int a, int b = 2)");
        assert_eq!(sig.parameter_fingerprint(), "int,int");
        assert!(sig.has_body);
    }

    #[test]
    fn test_generic_async_method() {
        let sig = signature_of(
            "class C { public async Task<List<T>> Load<T, U>(U key) where T : class { return null; } }",
        );
        assert_eq!(sig.return_type, "Task<List<T>>");
        assert_eq!(sig.type_parameters, vec!["T", "U"]);
        assert_eq!(sig.type_parameter_list.as_deref(), Some("<T, U>"));
        assert_eq!(sig.type_arguments(), "<T, U>");
        assert_eq!(sig.constraints, vec!["where T : class"]);
        assert!(sig.is_async());
    }

    #[test]
    fn test_by_ref_parameters() {
        let sig = signature_of(
            "class C { public bool TryGet(in int key, ref int hits, out string value) { value = null; return false; } }",
        );
        let modes: Vec<_> = sig.parameters.iter().map(|p| p.by_ref()).collect();
        assert_eq!(modes, vec![Some("in"), Some("ref"), Some("out")]);
        assert!(sig.has_by_ref_parameters());
        assert_eq!(sig.parameters[2].forwarding_argument(), "out value");
        assert!(sig.parameters[2].is_out());
        assert_eq!(sig.parameter_fingerprint(), "in int,ref int,out string");
    }

    #[test]
    fn test_explicit_interface_and_params() {
        let sig = signature_of(
            "class C : IFormatter { string IFormatter.Format(params object[] values) { return \"\"; } }",
        );
        assert_eq!(sig.explicit_interface.as_deref(), Some("IFormatter"));
        assert_eq!(sig.qualified_name(), "IFormatter.Format");
        assert_eq!(sig.parameters.len(), 1);
        assert_eq!(sig.parameters[0].modifiers, vec!["params"]);
        assert_eq!(sig.parameters[0].declaration(), "params object[] values");
    }

    #[test]
    fn test_params_after_regular_parameters() {
        let sig = signature_of(
            "class C { public int Sum(int first, [NotNull] params int[] rest) { return first; } }",
        );
        assert_eq!(sig.parameter_list(), "(int first, [NotNull] params int[] rest)");
        assert_eq!(sig.parameters[1].ty, "int[]");
        assert_eq!(sig.parameters[1].forwarding_argument(), "rest");
        assert_eq!(sig.parameter_fingerprint(), "int,int[]");
    }

    #[test]
    fn test_parameter_attributes_and_literal_defaults_kept() {
        let sig = signature_of(
            r#"class C { public int Log([CallerMemberName] string caller = "x   y", char sep = ' ') { return 0; } }"#,
        );
        assert_eq!(sig.parameters[0].attributes, vec!["[CallerMemberName]"]);
        assert!(sig.parameters[0].modifiers.is_empty());
        assert_eq!(
            sig.parameter_list(),
            r#"([CallerMemberName] string caller = "x   y", char sep = ' ')"#
        );
    }

    #[test]
    fn test_ref_return() {
        let sig = signature_of("class C { int[] items; public ref int First() { return ref items[0]; } }");
        assert_eq!(sig.return_type, "ref int");
        assert!(sig.returns_by_ref());
        assert!(!signature_of("class C { public int First() { return 0; } }").returns_by_ref());
    }

    #[test]
    fn test_extension_method_and_abstract() {
        let sig = signature_of("static class E { public static int Twice(this int x) => x * 2; }");
        assert_eq!(sig.parameters[0].modifiers, vec!["this"]);
        assert!(sig.has_body);

        let sig = signature_of("abstract class A { public abstract void Run(); }");
        assert!(!sig.has_body);
        assert!(sig.returns_void());
    }
}
