//! Composition config: configured attributes resolved against the wrapper registry.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use common::{AttributeDescriptor, AttributeTable, ConfigError};

use crate::wrappers::{self, Accessor, Fragment, Validator, WrapperKind};

/// A descriptor paired with its registered wrapper kind.
#[derive(Debug)]
pub struct ResolvedAttribute {
    pub descriptor: AttributeDescriptor,
    pub kind: &'static WrapperKind,
}

/// Per-attribute generators, queried by order for one method's matched names.
#[derive(Debug, Default)]
pub struct CompositionConfig {
    attributes: BTreeMap<String, ResolvedAttribute>,
}

impl CompositionConfig {
    /// Resolves every descriptor's wrapper kind.
    ///
    /// # Errors
    /// - `UnknownWrapperKind`: a descriptor names a kind outside the registry
    /// - `DuplicateAttribute`: two descriptors share a name
    pub fn new(descriptors: &[AttributeDescriptor]) -> Result<Self, ConfigError> {
        let mut attributes = BTreeMap::new();
        for descriptor in descriptors {
            let kind = wrappers::lookup(&descriptor.wrapper).ok_or_else(|| {
                ConfigError::UnknownWrapperKind {
                    attribute: descriptor.name.clone(),
                    kind: descriptor.wrapper.clone(),
                }
            })?;
            let resolved = ResolvedAttribute {
                descriptor: descriptor.clone(),
                kind,
            };
            if attributes.insert(descriptor.name.clone(), resolved).is_some() {
                return Err(ConfigError::DuplicateAttribute(descriptor.name.clone()));
            }
        }
        Ok(Self { attributes })
    }

    pub fn from_table(table: &AttributeTable) -> Result<Self, ConfigError> {
        Self::new(table.descriptors())
    }

    pub fn get(&self, name: &str) -> Option<&ResolvedAttribute> {
        self.attributes.get(name)
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Known attributes among `names`, highest order first. Ties go by name.
    fn outermost_first<I, S>(&self, names: I) -> Vec<&ResolvedAttribute>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut resolved: Vec<&ResolvedAttribute> = names
            .into_iter()
            .filter_map(|name| self.attributes.get(name.as_ref()))
            .collect();
        resolved.sort_by_key(|r| (Reverse(r.descriptor.order), r.descriptor.name.clone()));
        resolved.dedup_by(|a, b| a.descriptor.name == b.descriptor.name);
        resolved
    }

    /// Pre fragments, highest order (outermost) first.
    pub fn select_pre<I, S>(&self, names: I) -> Vec<(&str, Vec<Fragment>)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.outermost_first(names)
            .into_iter()
            .map(|r| (r.descriptor.name.as_str(), r.kind.pre()))
            .collect()
    }

    /// Post fragments, lowest order (innermost) first: exactly the reverse of
    /// [`select_pre`](Self::select_pre), so the brackets nest.
    pub fn select_post<I, S>(&self, names: I) -> Vec<(&str, Vec<Fragment>)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.outermost_first(names)
            .into_iter()
            .rev()
            .map(|r| (r.descriptor.name.as_str(), r.kind.post()))
            .collect()
    }

    pub fn select_validators<I, S>(&self, names: I) -> Vec<(&str, Vec<Validator>)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.outermost_first(names)
            .into_iter()
            .rev()
            .map(|r| (r.descriptor.name.as_str(), r.kind.validators()))
            .collect()
    }

    pub fn select_accessors<I, S>(&self, names: I) -> Vec<(&str, Accessor)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.outermost_first(names)
            .into_iter()
            .rev()
            .filter_map(|r| r.kind.accessor().map(|a| (r.descriptor.name.as_str(), a)))
            .collect()
    }

    /// Imports of every kind used by `names`, de-duplicated, first occurrence kept.
    pub fn select_imports<I, S>(&self, names: I) -> Vec<&'static str>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut imports: Vec<&'static str> = Vec::new();
        for resolved in self.outermost_first(names).into_iter().rev() {
            for import in resolved.kind.imports() {
                if !imports.contains(import) {
                    imports.push(import);
                }
            }
        }
        imports
    }
}
