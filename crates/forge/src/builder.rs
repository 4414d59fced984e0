//! Companion file generation.
//!
//! The companion reopens every retained namespace and type as a `partial`
//! skeleton and adds, per matched method, the attribute accessors and a wrapper
//! with the original name that calls the renamed method inside the nested
//! interception brackets.

use anatomist::{Envelope, MatchedMethod, NodeId, NodeKind, TypeDecl, TypeKind, UsingDirective};
use common::renamed_identifier;
use tracing::{debug, info};

use crate::composition::CompositionConfig;
use crate::fragments::{CALLER_LOCAL, RESULT_LOCAL};
use crate::wrappers::{AccessorContext, FragmentContext};
use crate::writer::CodeWriter;
use crate::ForgeError;

const GENERATED_HEADER: &str = "// <auto-generated />";
const COMPILER_SERVICES: &str = "System.Runtime.CompilerServices";
const INLINING_ATTRIBUTE: &str = "[MethodImpl(MethodImplOptions.AggressiveInlining)]";

/// Generates the companion source for `envelope`.
///
/// Every matched method is validated before anything is emitted, so a
/// precondition violation never leaves partial output behind.
pub fn build(envelope: &Envelope, config: &CompositionConfig) -> Result<String, ForgeError> {
    validate(envelope, config)?;

    let mut w = CodeWriter::new();
    w.line(GENERATED_HEADER);
    w.line("#nullable enable");
    w.blank();
    for using in imports(envelope, config) {
        w.line(&format!("using {using};"));
    }
    w.blank();

    for &root in envelope.roots() {
        emit_node(&mut w, envelope, config, root, None)?;
        w.blank();
    }

    info!(
        origin = %envelope.origin().display(),
        methods = envelope.methods().count(),
        "Built companion"
    );
    Ok(w.finish())
}

fn validate(envelope: &Envelope, config: &CompositionConfig) -> Result<(), ForgeError> {
    for method in envelope.methods() {
        let names = method.matched_names();
        for name in &names {
            if config.get(name).is_none() {
                return Err(ForgeError::UnconfiguredAttribute {
                    file: envelope.origin().to_path_buf(),
                    method: method.signature.qualified_name(),
                    attribute: name.to_string(),
                });
            }
        }
        for (attribute, validators) in config.select_validators(&names) {
            for validator in validators {
                validator(&method.signature).map_err(|rule| ForgeError::PreconditionViolation {
                    file: envelope.origin().to_path_buf(),
                    method: method.signature.qualified_name(),
                    attribute: attribute.to_string(),
                    rule,
                })?;
            }
        }
    }
    Ok(())
}

/// Non-global directives of the source, then wrapper-kind imports, then the
/// inlining attribute's namespace. First occurrence wins.
fn imports(envelope: &Envelope, config: &CompositionConfig) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |body: &str| {
        if !out.iter().any(|existing| existing == body) {
            out.push(body.to_string());
        }
    };
    envelope
        .usings()
        .iter()
        .filter(|u| !u.global)
        .map(UsingDirective::key)
        .for_each(&mut push);
    for import in config.select_imports(envelope.attribute_names()) {
        push(import);
    }
    push(COMPILER_SERVICES);
    out
}

fn emit_node(
    w: &mut CodeWriter,
    envelope: &Envelope,
    config: &CompositionConfig,
    id: NodeId,
    container: Option<&TypeDecl>,
) -> Result<(), ForgeError> {
    let node = envelope.node(id);
    match &node.kind {
        NodeKind::Namespace(namespace) => {
            w.open(&format!("namespace {}", namespace.name));
            for &child in node.children() {
                emit_node(w, envelope, config, child, None)?;
                w.blank();
            }
            w.close();
        }
        NodeKind::Type(ty) => {
            w.open(&type_header(ty));
            let (methods, nested): (Vec<NodeId>, Vec<NodeId>) = node
                .children()
                .iter()
                .copied()
                .partition(|&child| matches!(envelope.node(child).kind, NodeKind::Method(_)));
            for child in methods.into_iter().chain(nested) {
                emit_node(w, envelope, config, child, Some(ty))?;
                w.blank();
            }
            w.close();
        }
        NodeKind::Method(method) => {
            // add_child guarantees methods hang under types.
            if let Some(container) = container {
                emit_method(w, config, method, container);
            }
        }
    }
    Ok(())
}

fn type_header(ty: &TypeDecl) -> String {
    let mut parts: Vec<&str> = ty
        .modifiers
        .iter()
        .map(String::as_str)
        .filter(|m| *m != "partial")
        .collect();
    parts.push("partial");
    parts.push(ty.kind.keyword());
    let list = ty.type_parameter_list.as_deref().unwrap_or("");
    format!("{} {}{list}", parts.join(" "), ty.name)
}

fn emit_method(w: &mut CodeWriter, config: &CompositionConfig, method: &MatchedMethod, container: &TypeDecl) {
    let signature = &method.signature;
    let names = method.matched_names();
    let renamed = renamed_identifier(&signature.name, names.iter().copied());
    let container_ref = container.reference();
    debug!(method = %signature.qualified_name(), renamed = %renamed, "Emitting wrapper");

    for (name, accessor) in config.select_accessors(&names) {
        // Matched names all come from the envelope; validate() checked them.
        let Some(attribute) = method.attribute(name) else {
            continue;
        };
        w.block(&accessor(&AccessorContext {
            attribute,
            method,
            container: &container_ref,
        }));
        w.blank();
    }

    w.line(INLINING_ATTRIBUTE);
    if let Some(obsolete) = &method.obsolete {
        w.line(&format!("[{}]", obsolete.attribute));
    }
    w.line(&wrapper_header(method));
    for constraint in &signature.constraints {
        w.line(constraint);
    }
    w.line("{");

    let returns_value = !signature.returns_void();
    for parameter in signature.parameters.iter().filter(|p| p.is_out()) {
        w.line(&format!("{} = default({});", parameter.name, parameter.ty));
    }
    if returns_value {
        w.line(&format!(
            "{ret} {RESULT_LOCAL} = default({ret});",
            ret = signature.return_type
        ));
    }

    let arguments: Vec<String> = signature
        .parameters
        .iter()
        .map(|p| p.forwarding_argument())
        .collect();
    let call = format!("{renamed}{}({})", signature.type_arguments(), arguments.join(", "));
    // Lambdas cannot capture by-ref parameters, nor `this` inside a struct.
    let inline = signature.has_by_ref_parameters()
        || (container.kind == TypeKind::Struct && !signature.is_static());
    if !inline {
        let delegate = if returns_value {
            format!("System.Func<{}>", signature.return_type)
        } else {
            "System.Action".to_string()
        };
        w.line(&format!("{delegate} {CALLER_LOCAL} = () => {call};"));
    }

    let ctx = FragmentContext {
        attribute: "",
        method,
        renamed: &renamed,
    };
    for (attribute, fragments) in config.select_pre(&names) {
        let ctx = FragmentContext { attribute, ..ctx };
        for fragment in fragments {
            w.block(&fragment(&ctx));
        }
    }

    let invocation = if inline { call } else { format!("{CALLER_LOCAL}()") };
    if returns_value {
        w.line(&format!("{RESULT_LOCAL} = {invocation};"));
    } else {
        w.line(&format!("{invocation};"));
    }

    for (attribute, fragments) in config.select_post(&names) {
        let ctx = FragmentContext { attribute, ..ctx };
        for fragment in fragments {
            w.block(&fragment(&ctx));
        }
    }

    if returns_value {
        w.line(&format!("return {RESULT_LOCAL};"));
    }
    w.line("}");
}

/// Original signature with `async` dropped: the wrapper returns the task itself.
fn wrapper_header(method: &MatchedMethod) -> String {
    let signature = &method.signature;
    let mut parts: Vec<String> = signature
        .modifiers
        .iter()
        .filter(|m| *m != "async")
        .cloned()
        .collect();
    parts.push(signature.return_type.clone());
    let interface = signature
        .explicit_interface
        .as_deref()
        .map(|i| format!("{i}."))
        .unwrap_or_default();
    parts.push(format!(
        "{interface}{}{}{}",
        signature.name,
        signature.type_parameter_list.as_deref().unwrap_or(""),
        signature.parameter_list()
    ));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use anatomist::{scan, SourceTree};
    use common::{AttributeDescriptor, AttributeTable};

    fn run(source: &str, descriptors: Vec<AttributeDescriptor>) -> Result<String, ForgeError> {
        let table = AttributeTable::new(descriptors).unwrap();
        let config = CompositionConfig::from_table(&table).unwrap();
        let tree = SourceTree::parse("Service.cs", source.to_string()).unwrap();
        let envelope = scan(&tree, &table).unwrap();
        build(&envelope, &config)
    }

    fn position(haystack: &str, needle: &str) -> usize {
        haystack
            .find(needle)
            .unwrap_or_else(|| panic!("{needle:?} not found in:\n{haystack}"))
    }

    #[test]
    fn test_end_to_end_nesting_cache_inside_logger() {
        let source = r#"
using System.Collections.Generic;

namespace App
{
    public class Service
    {
        [Cache]
        [Logger]
        public int Foo()
        {
            return 42;
        }
    }
}
"#;
        let out = run(
            source,
            vec![
                AttributeDescriptor::new("Cache", 1, "Base"),
                AttributeDescriptor::new("Logger", 2, "Base"),
            ],
        )
        .unwrap();

        assert!(out.starts_with("// <auto-generated />\n"));
        assert!(out.contains("using System.Collections.Generic;\nusing System;\nusing Loom.Abstractions;\nusing System.Runtime.CompilerServices;\n"));
        assert!(out.contains("namespace App\n{\n    public partial class Service\n    {\n"));
        assert!(out.contains("        [MethodImpl(MethodImplOptions.AggressiveInlining)]\n        public int Foo()\n        {\n"));
        assert!(out.contains("System.Func<int> __wrappedMethodCaller = () => Foo__WrappedByCache__WrappedByLogger();"));

        let logger_open = position(&out, "var __attributeLogger = ");
        let cache_open = position(&out, "var __attributeCache = ");
        let call = position(&out, "__result = __wrappedMethodCaller();");
        let cache_close = position(&out, "__attributeCache.HandleInterceptionResult");
        let logger_close = position(&out, "__attributeLogger.HandleInterceptionResult");
        assert!(logger_open < cache_open);
        assert!(cache_open < call);
        assert!(call < cache_close);
        assert!(cache_close < logger_close);

        // The call sits inside both try blocks.
        let depth = |needle: &str| {
            let line = out.lines().find(|l| l.contains(needle)).unwrap();
            line.len() - line.trim_start().len()
        };
        assert_eq!(depth("__result = __wrappedMethodCaller();"), 4 * 7);
        assert!(out.ends_with("    }\n}\n"));
        assert!(!out.ends_with("\n\n"));
    }

    #[test]
    fn test_ordering_invariant() {
        let source = "class C { [Cache][Logger] int Foo() { return 1; } }";
        let out = run(
            source,
            vec![
                AttributeDescriptor::new("Logger", 10, "Base"),
                AttributeDescriptor::new("Cache", 5, "Base"),
            ],
        )
        .unwrap();
        assert!(position(&out, "var __attributeLogger") < position(&out, "var __attributeCache"));
        assert!(
            position(&out, "__attributeCache.HandleInterceptionResult")
                < position(&out, "__attributeLogger.HandleInterceptionResult")
        );
    }

    #[test]
    fn test_must_return_value_rejects_void() {
        let source = "class C { [Logger] public void Foo() { } }";
        let err = run(source, vec![AttributeDescriptor::new("Logger", 1, "MustReturnValue")]).unwrap_err();
        match &err {
            ForgeError::PreconditionViolation { method, attribute, rule, .. } => {
                assert_eq!(method, "Foo");
                assert_eq!(attribute, "Logger");
                assert!(rule.contains("\"void\""));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("Service.cs"));
    }

    #[test]
    fn test_without_unbound_generics_rejects_generic_return() {
        let source = "class C { [Pick] public T First<T>(T[] items) { return items[0]; } }";
        let err = run(source, vec![AttributeDescriptor::new("Pick", 1, "WithoutUnboundGenerics")]).unwrap_err();
        assert!(matches!(err, ForgeError::PreconditionViolation { rule, .. } if rule.contains("\"T\"")));
    }

    #[test]
    fn test_by_ref_parameters_call_inline() {
        let source = "class C { [Cache] public bool TryGet(int key, out string value) { value = \"\"; return true; } }";
        let out = run(source, vec![AttributeDescriptor::new("Cache", 1, "Base")]).unwrap();
        assert!(out.contains("public bool TryGet(int key, out string value)"));
        assert!(out.contains("value = default(string);"));
        assert!(!out.contains("__wrappedMethodCaller"));
        assert!(out.contains("__result = TryGet__WrappedByCache(key, out value);"));
        assert!(out.contains("typeof(string).MakeByRefType()"));
        assert!(out.contains("Intercept(new object[] { key }, ref __result)"));
    }

    #[test]
    fn test_struct_instance_methods_call_inline() {
        let source = "struct Point { [Cache] public void Move() { } [Cache] public static void Reset() { } }";
        let out = run(source, vec![AttributeDescriptor::new("Cache", 1, "Base")]).unwrap();
        assert!(out.contains("partial struct Point"));
        assert!(out.contains("Move__WrappedByCache();"));
        assert!(out.contains("System.Action __wrappedMethodCaller = () => Reset__WrappedByCache();"));
        assert!(!out.contains("__result"));
    }

    #[test]
    fn test_async_and_explicit_interface_signatures() {
        let source = r#"
using System.Threading.Tasks;
interface IRunner { Task<int> Run(); }
public class Runner : IRunner
{
    [Cache, Obsolete("use RunFast", true)]
    async Task<int> IRunner.Run() { return await Task.FromResult(1); }
}
"#;
        let out = run(source, vec![AttributeDescriptor::new("Cache", 1, "Base")]).unwrap();
        assert!(out.contains("[Obsolete(\"use RunFast\", true)]\n    Task<int> IRunner.Run()"));
        assert!(out.contains("__attribute.Init(true, typeof(Runner), typeof(Task<int>), \"IRunner.Run\", new Type[] {  });"));
        assert!(out.contains("System.Func<Task<int>> __wrappedMethodCaller = () => Run__WrappedByCache();"));
        assert!(!out.contains("async"));
    }

    #[test]
    fn test_generic_types_and_methods() {
        let source = r#"
namespace Data;

public sealed class Repository<TEntity> where TEntity : class
{
    [Cache(60, Region = "users")]
    public List<T> Find<T>(T key, TEntity probe) where T : struct { return null; }
}
"#;
        let out = run(source, vec![AttributeDescriptor::new("Cache", 1, "Base")]).unwrap();
        assert!(out.contains("namespace Data\n{\n    public sealed partial class Repository<TEntity>\n    {"));
        assert!(out.contains("new CacheAttribute(60) { Region = \"users\" };"));
        assert!(out.contains(
            "typeof(Repository<TEntity>), typeof(List<>), \"Find\", new Type[] { typeof(GenericPlaceholder), typeof(TEntity) }"
        ));
        assert!(out.contains("public List<T> Find<T>(T key, TEntity probe)\n        where T : struct\n        {"));
        assert!(out.contains("() => Find__WrappedByCache<T>(key, probe);"));
    }

    #[test]
    fn test_params_parameter_forwarded() {
        let source = "class C { [Cache] public int Sum(int first, params int[] rest) { return first; } }";
        let out = run(source, vec![AttributeDescriptor::new("Cache", 1, "Base")]).unwrap();
        assert!(out.contains("public int Sum(int first, params int[] rest)"));
        assert!(out.contains("() => Sum__WrappedByCache(first, rest);"));
        assert!(out.contains("new Type[] { typeof(int), typeof(int[]) }"));
    }

    #[test]
    fn test_parameter_attributes_and_string_literals_copied() {
        let source = r#"
using System.Runtime.CompilerServices;
class C
{
    [Cache(Key = "a   b")]
    public int Log([CallerMemberName] string caller = "x   y") { return 0; }
}
"#;
        let out = run(source, vec![AttributeDescriptor::new("Cache", 1, "Base")]).unwrap();
        assert!(out.contains(r#"public int Log([CallerMemberName] string caller = "x   y")"#));
        assert!(out.contains(r#"new CacheAttribute() { Key = "a   b" };"#));
        assert_eq!(out.matches("using System.Runtime.CompilerServices;").count(), 1);
    }

    #[test]
    fn test_ref_returning_method_left_unwrapped() {
        let source = "class C { int[] items; [Cache] public ref int First() { return ref items[0]; } }";
        let out = run(source, vec![AttributeDescriptor::new("Cache", 1, "Base")]).unwrap();
        assert!(!out.contains("First"));
        assert!(!out.contains("__result"));
    }

    #[test]
    fn test_nested_types_follow_methods() {
        let source = r#"
class Outer
{
    class Inner { [Cache] int A() { return 1; } }
    [Cache] int B() { return 2; }
}
"#;
        let out = run(source, vec![AttributeDescriptor::new("Cache", 1, "Base")]).unwrap();
        assert!(position(&out, "int B()") < position(&out, "partial class Inner"));
        assert!(out.contains("typeof(Inner)"));
    }

    #[test]
    fn test_global_usings_not_repeated() {
        let source = "global using System.Linq;\nusing System;\nclass C { [Cache] int A() { return 1; } }";
        let out = run(source, vec![AttributeDescriptor::new("Cache", 1, "Base")]).unwrap();
        assert!(!out.contains("System.Linq"));
        assert_eq!(out.matches("using System;").count(), 1);
    }

    #[test]
    fn test_unconfigured_attribute_rejected() {
        let table = AttributeTable::new(vec![AttributeDescriptor::new("Cache", 1, "Base")]).unwrap();
        let tree = SourceTree::parse("A.cs", "class C { [Cache] int A() { return 1; } }".to_string()).unwrap();
        let envelope = scan(&tree, &table).unwrap();
        let config = CompositionConfig::default();
        assert!(matches!(
            build(&envelope, &config),
            Err(ForgeError::UnconfiguredAttribute { attribute, .. }) if attribute == "Cache"
        ));
    }
}
