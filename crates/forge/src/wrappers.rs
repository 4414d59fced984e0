//! Wrapper kinds: named capability lists assembled by a builder.
//!
//! A kind is an ordered list of validators and fragment generators. Composite kinds
//! include the capabilities of named base kinds, so `MustReturnValue` is literally
//! "its validator, then everything `Base` does".

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use anatomist::{MatchedAttribute, MatchedMethod, MethodSignature};
use common::runtime::RUNTIME_NAMESPACE;

use crate::fragments;

pub const BASE: &str = "Base";
pub const MUST_RETURN_VALUE: &str = "MustReturnValue";
pub const WITHOUT_UNBOUND_GENERICS: &str = "WithoutUnboundGenerics";

/// Inputs of a pre/post fragment generator.
#[derive(Debug, Clone, Copy)]
pub struct FragmentContext<'a> {
    /// Configured attribute name.
    pub attribute: &'a str,
    pub method: &'a MatchedMethod,
    /// Identifier of the renamed original method.
    pub renamed: &'a str,
}

impl FragmentContext<'_> {
    pub fn signature(&self) -> &MethodSignature {
        &self.method.signature
    }
}

/// Inputs of an accessor generator.
#[derive(Debug, Clone, Copy)]
pub struct AccessorContext<'a> {
    pub attribute: &'a MatchedAttribute,
    pub method: &'a MatchedMethod,
    /// Declaring type as referenced from inside itself, e.g. `Repository<T>`.
    pub container: &'a str,
}

/// Rejects a signature with a human-readable rule description.
pub type Validator = fn(&MethodSignature) -> Result<(), String>;
pub type Fragment = fn(&FragmentContext<'_>) -> String;
pub type Accessor = fn(&AccessorContext<'_>) -> String;

#[derive(Clone, Copy)]
pub enum Capability {
    Validate(Validator),
    EmitPre(Fragment),
    EmitPost(Fragment),
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validate(_) => f.write_str("Validate"),
            Self::EmitPre(_) => f.write_str("EmitPre"),
            Self::EmitPost(_) => f.write_str("EmitPost"),
        }
    }
}

/// A registered wrapper kind.
pub struct WrapperKind {
    name: &'static str,
    capabilities: Vec<Capability>,
    imports: Vec<&'static str>,
    accessor: Option<Accessor>,
}

impl fmt::Debug for WrapperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapperKind")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("imports", &self.imports)
            .field("accessor", &self.accessor.is_some())
            .finish()
    }
}

impl WrapperKind {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn validators(&self) -> Vec<Validator> {
        self.capabilities
            .iter()
            .filter_map(|c| match c {
                Capability::Validate(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    pub fn pre(&self) -> Vec<Fragment> {
        self.capabilities
            .iter()
            .filter_map(|c| match c {
                Capability::EmitPre(f) => Some(*f),
                _ => None,
            })
            .collect()
    }

    pub fn post(&self) -> Vec<Fragment> {
        self.capabilities
            .iter()
            .filter_map(|c| match c {
                Capability::EmitPost(f) => Some(*f),
                _ => None,
            })
            .collect()
    }

    pub fn imports(&self) -> &[&'static str] {
        &self.imports
    }

    pub fn accessor(&self) -> Option<Accessor> {
        self.accessor
    }
}

/// Assembles a [`WrapperKind`] from its own capabilities and those of included kinds.
pub struct WrapperKindBuilder {
    name: &'static str,
    capabilities: Vec<Capability>,
    imports: Vec<&'static str>,
    accessor: Option<Accessor>,
}

impl WrapperKindBuilder {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            capabilities: Vec::new(),
            imports: Vec::new(),
            accessor: None,
        }
    }

    /// Appends every capability and import of `base`. Its accessor is inherited
    /// unless one is already set.
    pub fn include(mut self, base: &WrapperKind) -> Self {
        self.capabilities.extend_from_slice(&base.capabilities);
        for import in &base.imports {
            self = self.import(import);
        }
        if self.accessor.is_none() {
            self.accessor = base.accessor;
        }
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.capabilities.push(Capability::Validate(validator));
        self
    }

    pub fn emit_pre(mut self, fragment: Fragment) -> Self {
        self.capabilities.push(Capability::EmitPre(fragment));
        self
    }

    pub fn emit_post(mut self, fragment: Fragment) -> Self {
        self.capabilities.push(Capability::EmitPost(fragment));
        self
    }

    pub fn import(mut self, namespace: &'static str) -> Self {
        if !self.imports.contains(&namespace) {
            self.imports.push(namespace);
        }
        self
    }

    pub fn accessor(mut self, accessor: Accessor) -> Self {
        self.accessor = Some(accessor);
        self
    }

    /// Validators run before any template fragment, in the order they were added.
    pub fn build(self) -> WrapperKind {
        let (mut capabilities, templates): (Vec<_>, Vec<_>) = self
            .capabilities
            .into_iter()
            .partition(|c| matches!(c, Capability::Validate(_)));
        capabilities.extend(templates);
        WrapperKind {
            name: self.name,
            capabilities,
            imports: self.imports,
            accessor: self.accessor,
        }
    }
}

static REGISTRY: OnceLock<BTreeMap<&'static str, WrapperKind>> = OnceLock::new();

fn build_registry() -> BTreeMap<&'static str, WrapperKind> {
    let base = WrapperKindBuilder::new(BASE)
        .import("System")
        .import(RUNTIME_NAMESPACE)
        .accessor(fragments::lazy_accessor)
        .emit_pre(fragments::interception_open)
        .emit_post(fragments::interception_close)
        .build();
    let must_return_value = WrapperKindBuilder::new(MUST_RETURN_VALUE)
        .validate(fragments::must_return_value)
        .include(&base)
        .build();
    let without_unbound_generics = WrapperKindBuilder::new(WITHOUT_UNBOUND_GENERICS)
        .validate(fragments::without_unbound_generics)
        .include(&must_return_value)
        .build();

    [base, must_return_value, without_unbound_generics]
        .into_iter()
        .map(|kind| (kind.name, kind))
        .collect()
}

/// The closed set of wrapper kinds, built on first use.
pub fn registry() -> &'static BTreeMap<&'static str, WrapperKind> {
    REGISTRY.get_or_init(build_registry)
}

pub fn lookup(name: &str) -> Option<&'static WrapperKind> {
    registry().get(name)
}
