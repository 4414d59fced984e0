//! # The Tailor: In-Place Rewriting of Matched Methods
//!
//! **Role**: Produces the mirror file. Re-walks the original tree with the shared
//! declaration walk and edits every declaration whose index survived the scan.
//!
//! **Edits**:
//! - types: `partial` inserted in front of the `class`/`struct` keyword when missing;
//! - methods: renamed with sorted attribute needles, `override`/`sealed` and the explicit
//!   interface qualifier removed, obsolescence arguments stripped, one marker attribute
//!   prepended per matched attribute.
//!
//! All edits are collected first and spliced bottom-to-top so byte offsets stay valid.

pub mod rewriter;
pub mod splice;

pub use rewriter::{renamed_identifier, rewrite, RewriteOutcome};
pub use splice::{apply_edits, Edit};

use anatomist::{AnatomistError, NodeIndex};

/// Errors from rewriting.
#[derive(Debug, thiserror::Error)]
pub enum TailorError {
    #[error(transparent)]
    Anatomist(#[from] AnatomistError),

    /// The rewrite walk reached a node the scan recorded differently.
    #[error("Node {index} disagrees with the scan: expected {expected}, found {found}")]
    IndexMismatch {
        index: NodeIndex,
        expected: String,
        found: String,
    },

    #[error("Overlapping edits at bytes {first:?} and {second:?}")]
    OverlappingEdits {
        first: std::ops::Range<usize>,
        second: std::ops::Range<usize>,
    },

    #[error("Edit range {0:?} is outside the source or splits a character")]
    InvalidRange(std::ops::Range<usize>),
}
