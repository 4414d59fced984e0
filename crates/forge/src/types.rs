//! Textual C# type utilities used when emitting `typeof(...)` expressions.
//!
//! Accessors live in static fields, where a method's own type parameters are not in
//! scope. Any type mentioning one is rewritten into something nameable there.

use common::runtime::GENERIC_PLACEHOLDER;

/// Predefined value types whose `?` form is a distinct runtime type (`Nullable<T>`).
const VALUE_KEYWORDS: &[&str] = &[
    "bool", "byte", "sbyte", "char", "decimal", "double", "float", "int", "uint", "long", "ulong",
    "short", "ushort", "nint", "nuint",
];

/// Identifier tokens of `ty` that are not member accesses (`A.T` does not yield `T`).
fn free_identifiers(ty: &str) -> Vec<(usize, usize)> {
    let bytes = ty.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_alphabetic() || c == b'_' || c == b'@' {
            let start = i;
            i += 1;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let qualified = ty[..start].trim_end().ends_with('.');
            if !qualified {
                spans.push((start, i));
            }
        } else {
            i += 1;
        }
    }
    spans
}

/// `true` when `ty` mentions any of `type_parameters`.
pub fn contains_type_parameter(ty: &str, type_parameters: &[String]) -> bool {
    first_type_parameter(ty, type_parameters).is_some()
}

/// The first of `type_parameters` that `ty` mentions.
pub fn first_type_parameter<'a>(ty: &str, type_parameters: &'a [String]) -> Option<&'a str> {
    free_identifiers(ty).into_iter().find_map(|(start, end)| {
        let token = &ty[start..end];
        type_parameters
            .iter()
            .find(|p| p.as_str() == token)
            .map(String::as_str)
    })
}

/// `true` when `ty` is exactly one of `type_parameters` (optionally nullable).
pub fn is_type_parameter(ty: &str, type_parameters: &[String]) -> bool {
    let bare = ty.trim().trim_end_matches('?').trim();
    type_parameters.iter().any(|p| p == bare)
}

/// Replaces every type argument list with its open form: `Dictionary<string, List<T>>`
/// becomes `Dictionary<,>`.
pub fn erase_type_arguments(ty: &str) -> String {
    let mut out = String::with_capacity(ty.len());
    let mut depth = 0usize;
    for c in ty.chars() {
        match c {
            '<' => {
                if depth == 0 {
                    out.push('<');
                }
                depth += 1;
            }
            '>' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    out.push('>');
                }
            }
            ',' if depth == 1 => out.push(','),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn substitute_type_parameters(ty: &str, type_parameters: &[String]) -> String {
    let mut out = String::with_capacity(ty.len());
    let mut last = 0;
    for (start, end) in free_identifiers(ty) {
        if type_parameters.iter().any(|p| p.as_str() == &ty[start..end]) {
            out.push_str(&ty[last..start]);
            out.push_str(GENERIC_PLACEHOLDER);
            last = end;
            // A nullable annotation on the placeholder would not be a valid typeof operand.
            if ty[end..].starts_with('?') {
                last += 1;
            }
        }
    }
    out.push_str(&ty[last..]);
    out
}

fn strip_reference_nullability(ty: &str) -> &str {
    match ty.strip_suffix('?') {
        Some(base) if !VALUE_KEYWORDS.contains(&base.trim()) => base.trim_end(),
        _ => ty,
    }
}

/// Operand of a `typeof(...)` expression emitted where `type_parameters` are out of scope.
///
/// - a bare type parameter becomes the placeholder type;
/// - a generic name mentioning one has its argument lists erased;
/// - anything else mentioning one (arrays, tuples) has the parameter substituted.
pub fn runtime_type(ty: &str, type_parameters: &[String]) -> String {
    let ty = ty.trim();
    if !contains_type_parameter(ty, type_parameters) {
        return strip_reference_nullability(ty).to_string();
    }
    if is_type_parameter(ty, type_parameters) {
        return GENERIC_PLACEHOLDER.to_string();
    }

    let base = strip_reference_nullability(ty);
    let is_generic_name = !base.starts_with('(') && base.ends_with('>');
    if is_generic_name {
        erase_type_arguments(base)
    } else {
        substitute_type_parameters(base, type_parameters)
    }
}
