//! # The Forge: Companion Generation
//!
//! **Role**: Turns an `Envelope` into the companion file: a `partial` skeleton of
//! every retained namespace and type, holding one memoised accessor per matched
//! attribute and a wrapper method that keeps the original name and signature.
//!
//! **Core Types**:
//! - `WrapperKind`: a named capability list (validate / emit-pre / emit-post) built
//!   with `WrapperKindBuilder`. The registry is closed: `Base`, `MustReturnValue`,
//!   `WithoutUnboundGenerics`.
//! - `CompositionConfig`: configured attributes resolved against the registry,
//!   queried by order when a method is woven.
//! - `CodeWriter`: brace-depth indentation for the emitted text.
//!
//! **Ordering contract**: pre fragments are emitted highest order first and post
//! fragments in exactly the reverse order, so the lowest-order attribute sits
//! innermost around the call and every bracket closes the one opened last.

pub mod builder;
pub mod composition;
pub mod fragments;
pub mod types;
pub mod wrappers;
pub mod writer;

pub use builder::build;
pub use composition::{CompositionConfig, ResolvedAttribute};
pub use wrappers::{
    lookup, registry, AccessorContext, Capability, FragmentContext, WrapperKind, WrapperKindBuilder,
};
pub use writer::CodeWriter;

use std::path::PathBuf;

/// Errors produced while building a companion file.
///
/// Either variant aborts the whole file: nothing is emitted.
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// A wrapper kind's validator rejected the method's signature.
    #[error("Method \"{method}\" in {} cannot be wrapped by \"{attribute}\": {rule}", file.display())]
    PreconditionViolation {
        file: PathBuf,
        method: String,
        attribute: String,
        rule: String,
    },

    /// The envelope was scanned with a table the composition config does not cover.
    #[error("Method \"{method}\" in {} carries \"{attribute}\", which has no wrapper configured", file.display())]
    UnconfiguredAttribute {
        file: PathBuf,
        method: String,
        attribute: String,
    },
}
