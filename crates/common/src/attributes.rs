//! Attribute descriptors and the exact-match lookup table.

use crate::runtime::OBSOLETE_ATTRIBUTE;
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Conventional suffix that C# allows callers to omit when applying an attribute.
pub const ATTRIBUTE_SUFFIX: &str = "Attribute";

/// Prefix of the name fragment appended to a renamed method, one per matched attribute.
pub const NEEDLE_PREFIX: &str = "__WrappedBy";

/// One configured aspect.
///
/// `order` controls nesting: the lowest order sits innermost, nearest the wrapped call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    /// Attribute name without the `Attribute` suffix (e.g. `"Cache"`).
    pub name: String,
    pub order: i32,
    /// Wrapper kind name (`Base`, `MustReturnValue`, `WithoutUnboundGenerics`).
    #[serde(alias = "wrapperKind")]
    pub wrapper: String,
}

impl AttributeDescriptor {
    pub fn new(name: impl Into<String>, order: i32, wrapper: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order,
            wrapper: wrapper.into(),
        }
    }
}

/// Reduces a possibly qualified attribute reference to its last segment.
///
/// Handles `.` and `::` qualification and drops any generic argument list,
/// so `global::Aspects.Cache<int>` becomes `Cache`.
///
/// # Examples
/// ```
/// # use common::trailing_segment;
/// assert_eq!(trailing_segment("System.ObsoleteAttribute"), "ObsoleteAttribute");
/// assert_eq!(trailing_segment("global::Cache"), "Cache");
/// ```
pub fn trailing_segment(name: &str) -> &str {
    let name = name.trim();
    let without_args = match name.find('<') {
        Some(pos) => &name[..pos],
        None => name,
    };
    let after_colons = without_args
        .rsplit("::")
        .next()
        .unwrap_or(without_args);
    after_colons
        .rsplit('.')
        .next()
        .unwrap_or(after_colons)
        .trim()
}

/// `true` when the reference names the method obsolescence attribute.
pub fn is_obsolete_attribute(name: &str) -> bool {
    let segment = trailing_segment(name);
    segment == OBSOLETE_ATTRIBUTE
        || segment
            .strip_suffix(ATTRIBUTE_SUFFIX)
            .is_some_and(|stem| stem == OBSOLETE_ATTRIBUTE)
}

/// Name fragment appended to a method renamed because of `attribute_name`.
///
/// # Examples
/// ```
/// # use common::attribute_needle;
/// assert_eq!(attribute_needle("Cache"), "__WrappedByCache");
/// ```
pub fn attribute_needle(attribute_name: &str) -> String {
    format!("{NEEDLE_PREFIX}{}", trailing_segment(attribute_name))
}

/// Appends one needle per attribute to `current`, in sorted order.
///
/// Needles already present are stripped first, so applying the rename to its own
/// output changes nothing.
///
/// # Examples
/// ```
/// # use common::renamed_identifier;
/// let once = renamed_identifier("Foo", ["Logger", "Cache"]);
/// assert_eq!(once, "Foo__WrappedByCache__WrappedByLogger");
/// assert_eq!(renamed_identifier(&once, ["Logger", "Cache"]), once);
/// ```
pub fn renamed_identifier<'a>(
    current: &str,
    attribute_names: impl IntoIterator<Item = &'a str>,
) -> String {
    let mut needles: Vec<String> = attribute_names.into_iter().map(attribute_needle).collect();
    needles.sort();
    needles.dedup();

    // Longest first, so a needle that prefixes another cannot cut it in half.
    let mut by_length: Vec<&String> = needles.iter().collect();
    by_length.sort_by(|a, b| b.len().cmp(&a.len()));
    let mut base = current.to_string();
    for needle in by_length {
        base = base.replace(needle.as_str(), "");
    }

    base + &needles.concat()
}

/// Exact lookup table from written attribute names to configured descriptors.
///
/// Each descriptor is reachable under two keys: its bare name and its name with the
/// `Attribute` suffix. Keys must be unique across the whole table.
#[derive(Debug, Clone, Default)]
pub struct AttributeTable {
    descriptors: Vec<AttributeDescriptor>,
    by_written_name: HashMap<String, usize>,
}

impl AttributeTable {
    /// Builds the table, rejecting empty names and names that collide.
    pub fn new(descriptors: Vec<AttributeDescriptor>) -> Result<Self, ConfigError> {
        let mut by_written_name = HashMap::with_capacity(descriptors.len() * 2);

        for (position, descriptor) in descriptors.iter().enumerate() {
            let name = descriptor.name.trim();
            if name.is_empty() {
                return Err(ConfigError::EmptyName(position));
            }
            for key in [name.to_string(), format!("{name}{ATTRIBUTE_SUFFIX}")] {
                if by_written_name.insert(key, position).is_some() {
                    return Err(ConfigError::DuplicateAttribute(descriptor.name.clone()));
                }
            }
        }

        Ok(Self {
            descriptors,
            by_written_name,
        })
    }

    /// Resolves a written reference (possibly qualified) to its descriptor.
    pub fn resolve(&self, written: &str) -> Option<&AttributeDescriptor> {
        self.by_written_name
            .get(trailing_segment(written))
            .map(|&position| &self.descriptors[position])
    }

    /// Looks up a descriptor by its configured name.
    pub fn get(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    pub fn descriptors(&self) -> &[AttributeDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
