//! Generators behind the registered wrapper kinds: validators, the interception
//! template and the memoised attribute accessor.
//!
//! Fragments are emitted as flat lines; `CodeWriter` re-indents them by brace depth.

use anatomist::{MethodSignature, Parameter};
use common::attributes::ATTRIBUTE_SUFFIX;
use common::runtime::BASE_ATTRIBUTE;
use common::trailing_segment;

use crate::types::{first_type_parameter, runtime_type};
use crate::wrappers::{AccessorContext, FragmentContext};

pub const RESULT_LOCAL: &str = "__result";
pub const CALLER_LOCAL: &str = "__wrappedMethodCaller";

const PROPERTY_INFIX: &str = "__PropertyForAttribute";
const HASH_LEN: usize = 16;

pub fn attribute_local(attribute: &str) -> String {
    format!("__attribute{attribute}")
}

pub fn interception_local(attribute: &str) -> String {
    format!("__interceptionResult{attribute}")
}

/// Name of the static field holding the attribute instance for one method.
///
/// The suffix hashes the qualified name, arity and parameter fingerprint, so overloads
/// and explicit implementations of same-named members get distinct fields.
pub fn property_name(signature: &MethodSignature, attribute: &str) -> String {
    let identity = format!(
        "{}`{}({})",
        signature.qualified_name(),
        signature.type_parameters.len(),
        signature.parameter_fingerprint()
    );
    let hash = blake3::hash(identity.as_bytes()).to_hex();
    format!(
        "{}{PROPERTY_INFIX}{attribute}__{}",
        signature.name,
        &hash.as_str()[..HASH_LEN]
    )
}

/// Class name to instantiate for a written attribute reference: `Aspects.Cache`
/// becomes `Aspects.CacheAttribute`, generic arguments kept.
pub fn attribute_class_name(written: &str) -> String {
    let written = written.trim();
    let (head, args) = match written.find('<') {
        Some(pos) => written.split_at(pos),
        None => (written, ""),
    };
    if trailing_segment(head).ends_with(ATTRIBUTE_SUFFIX) {
        written.to_string()
    } else {
        format!("{}{ATTRIBUTE_SUFFIX}{args}", head.trim_end())
    }
}

fn result_ref(signature: &MethodSignature) -> Option<String> {
    (!signature.returns_void()).then(|| format!("ref {RESULT_LOCAL}"))
}

fn intercepted_arguments(signature: &MethodSignature) -> String {
    signature
        .parameters
        .iter()
        .filter(|p| !p.is_out())
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Opens the interception bracket: resolve, `Intercept`, guard, `try`.
pub fn interception_open(ctx: &FragmentContext<'_>) -> String {
    let signature = ctx.signature();
    let attribute = attribute_local(ctx.attribute);
    let interception = interception_local(ctx.attribute);
    let property = property_name(signature, ctx.attribute);

    let mut intercept_args = vec![format!("new object[] {{ {} }}", intercepted_arguments(signature))];
    intercept_args.extend(result_ref(signature));

    format!(
        "var {attribute} = {property}.Value;\n\
         var {interception} = {attribute}.Intercept({});\n\
         if (!{interception}.IsIntercepted)\n\
         {{\n\
         try\n\
         {{",
        intercept_args.join(", ")
    )
}

/// Closes the bracket opened by [`interception_open`].
pub fn interception_close(ctx: &FragmentContext<'_>) -> String {
    let signature = ctx.signature();
    let attribute = attribute_local(ctx.attribute);
    let interception = interception_local(ctx.attribute);

    let mut handler_args: Vec<String> = result_ref(signature).into_iter().collect();
    handler_args.push(format!("ref {interception}"));
    let handler_args = handler_args.join(", ");

    format!(
        "}}\n\
         catch (Exception exception)\n\
         {{\n\
         if (!{attribute}.HandleException(exception, {handler_args}))\n\
         {{\n\
         throw;\n\
         }}\n\
         }}\n\
         }}\n\
         {attribute}.HandleInterceptionResult({handler_args});"
    )
}

fn parameter_type(parameter: &Parameter, type_parameters: &[String]) -> String {
    let ty = format!("typeof({})", runtime_type(&parameter.ty, type_parameters));
    match parameter.by_ref() {
        Some(_) => format!("{ty}.MakeByRefType()"),
        None => ty,
    }
}

/// Static, publication-only `Lazy` field that constructs the attribute instance
/// once and hands it the method's shape through `Init`.
pub fn lazy_accessor(ctx: &AccessorContext<'_>) -> String {
    let signature = &ctx.method.signature;
    let attribute = ctx.attribute;
    let property = property_name(signature, &attribute.name);

    let mut construction = format!(
        "new {}({})",
        attribute_class_name(&attribute.written),
        attribute.arguments.join(", ")
    );
    if !attribute.initializers.is_empty() {
        construction.push_str(&format!(" {{ {} }}", attribute.initializers.join(", ")));
    }

    let parameter_types = signature
        .parameters
        .iter()
        .map(|p| parameter_type(p, &signature.type_parameters))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "private static readonly Lazy<{BASE_ATTRIBUTE}> {property} = new Lazy<{BASE_ATTRIBUTE}>(() =>\n\
         {{\n\
         var __attribute = {construction};\n\
         __attribute.Init({}, typeof({}), typeof({}), \"{}\", new Type[] {{ {parameter_types} }});\n\
         return __attribute;\n\
         }}, System.Threading.LazyThreadSafetyMode.PublicationOnly);",
        signature.is_async(),
        ctx.container,
        runtime_type(&signature.return_type, &signature.type_parameters),
        signature.qualified_name(),
    )
}

const VALUE_RULE: &str = "but it was requested that it returns a value";

/// Rejects `void` and non-generic task return shapes.
pub fn must_return_value(signature: &MethodSignature) -> Result<(), String> {
    if signature.returns_void() {
        return Err(format!("it returns \"void\" {VALUE_RULE}"));
    }
    let segment = trailing_segment(&signature.return_type);
    let generic = signature.return_type.contains('<');
    if !generic && matches!(segment, "Task" | "ValueTask") {
        let shape = if signature.has_modifier("async") {
            format!("async {segment}")
        } else {
            segment.to_string()
        };
        return Err(format!("it returns \"{shape}\" {VALUE_RULE}"));
    }
    Ok(())
}

/// Rejects return types mentioning one of the method's own type parameters.
pub fn without_unbound_generics(signature: &MethodSignature) -> Result<(), String> {
    match first_type_parameter(&signature.return_type, &signature.type_parameters) {
        Some(parameter) => Err(format!(
            "its return type \"{}\" contains the unbound generic parameter \"{parameter}\"",
            signature.return_type
        )),
        None => Ok(()),
    }
}
