//! # The Anatomist: C# Parsing & Envelope Construction
//!
//! **Role**: Parses C# source with tree-sitter and reduces it to an `Envelope`: the
//! namespace/type/method skeleton of everything that carries a configured attribute.
//!
//! **Core Types**:
//! - `SourceTree`: one parsed compilation unit plus its error diagnostics.
//! - `NodeIndex` / `NodeCounter`: positional identity shared by every walk of a tree.
//! - `Envelope`: arena of retained declarations, pruned after the scan.
//! - `MatchedMethod`: a method carrying at least one configured attribute.
//!
//! **Design**:
//! - `walk::walk_declarations` is the single traversal routine; the scanner here and the
//!   rewriter in `tailor` both drive it, so their index assignments cannot drift.
//! - The scanner records an index → node table while it walks. Later stages cross-check
//!   against the table instead of trusting names.

pub mod attributes;
pub mod envelope;
pub mod scanner;
pub mod signature;
pub mod syntax;
pub mod walk;

pub use attributes::{method_attributes, MethodAttributes};
pub use envelope::{
    Envelope, EnvelopeNode, MatchedAttribute, MatchedMethod, NamespaceDecl, NodeId, NodeKind,
    ObsoleteMarker, TypeDecl, TypeKind, UsingDirective,
};
pub use scanner::scan;
pub use signature::{MethodSignature, Parameter};
pub use syntax::{Diagnostic, SourceTree};
pub use walk::{walk_declarations, DeclKind, DeclarationVisitor, NodeCounter, NodeIndex};

use std::path::PathBuf;

/// Errors produced by the Anatomist crate.
#[derive(Debug, thiserror::Error)]
pub enum AnatomistError {
    /// Grammar could not be loaded or tree-sitter produced no tree.
    #[error("Parse failure: {0}")]
    ParseFailure(String),

    /// The tree carries error-level diagnostics; nothing downstream may run.
    #[error("Syntax errors in {origin}: {}", summarize(.diagnostics))]
    SyntaxErrors {
        origin: PathBuf,
        diagnostics: Vec<Diagnostic>,
    },

    /// I/O error (file read).
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Source is not valid UTF-8: {0}")]
    NonUtf8(PathBuf),

    /// tree-sitter addresses bytes with `u32`.
    #[error("Byte range overflow: file size exceeds 4GB limit")]
    ByteRangeOverflow,

    /// An envelope operation violated the namespace > type > method nesting.
    #[error("Envelope structure violation: {0}")]
    Structure(String),
}

fn summarize(diagnostics: &[Diagnostic]) -> String {
    const SHOWN: usize = 3;
    let mut parts: Vec<String> = diagnostics.iter().take(SHOWN).map(|d| d.to_string()).collect();
    if diagnostics.len() > SHOWN {
        parts.push(format!("and {} more", diagnostics.len() - SHOWN));
    }
    parts.join("; ")
}
