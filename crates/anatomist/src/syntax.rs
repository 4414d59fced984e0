//! Parsed compilation units.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::MmapOptions;
use tree_sitter::{Node, Parser, Tree};

use crate::AnatomistError;

/// Kind of an error-level diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Tokens the grammar could not place.
    Unexpected,
    /// A token the grammar required but did not find.
    Missing,
}

/// Location of one error node (1-indexed line and column).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub line: usize,
    pub column: usize,
    /// Grammar kind for missing nodes, offending text (truncated) for unexpected ones.
    pub detail: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DiagnosticKind::Missing => {
                write!(f, "{}:{}: missing {}", self.line, self.column, self.detail)
            }
            DiagnosticKind::Unexpected => {
                write!(f, "{}:{}: unexpected `{}`", self.line, self.column, self.detail)
            }
        }
    }
}

/// One parsed C# compilation unit.
///
/// Owns the source text so node byte ranges can be resolved without re-reading the file.
pub struct SourceTree {
    origin: PathBuf,
    source: String,
    tree: Tree,
}

impl SourceTree {
    /// Parses `source`. `origin` is used for error reporting only.
    ///
    /// # Errors
    /// - `ByteRangeOverflow`: source larger than 4GB (tree-sitter u32 limit)
    /// - `ParseFailure`: grammar load failed or tree-sitter returned no tree
    pub fn parse(origin: impl Into<PathBuf>, source: String) -> Result<Self, AnatomistError> {
        if source.len() as u64 > u32::MAX as u64 {
            return Err(AnatomistError::ByteRangeOverflow);
        }

        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_c_sharp::LANGUAGE.into())
            .map_err(|e| AnatomistError::ParseFailure(format!("Failed to load C# grammar: {e}")))?;

        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| AnatomistError::ParseFailure("tree-sitter returned no tree".to_string()))?;

        Ok(Self {
            origin: origin.into(),
            source,
            tree,
        })
    }

    /// Reads a file through a memory map and parses it.
    pub fn read(path: &Path) -> Result<Self, AnatomistError> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();

        if file_len > u32::MAX as u64 {
            return Err(AnatomistError::ByteRangeOverflow);
        }
        if file_len == 0 {
            return Self::parse(path, String::new());
        }

        // SAFETY: The file handle is held for the duration of the mmap lifetime.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        let text = std::str::from_utf8(&mmap[..])
            .map_err(|_| AnatomistError::NonUtf8(path.to_path_buf()))?;
        // A UTF-8 BOM would otherwise surface as an unexpected token.
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);

        Self::parse(path, text.to_string())
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Collects every error and missing node, in document order.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        let root = self.root();
        if root.has_error() {
            collect_errors(root, &self.source, &mut out);
        }
        out
    }

    /// Fails with `SyntaxErrors` when the tree carries any diagnostic.
    pub fn ensure_clean(&self) -> Result<(), AnatomistError> {
        let diagnostics = self.diagnostics();
        if diagnostics.is_empty() {
            Ok(())
        } else {
            Err(AnatomistError::SyntaxErrors {
                origin: self.origin.clone(),
                diagnostics,
            })
        }
    }
}

fn collect_errors(node: Node<'_>, source: &str, out: &mut Vec<Diagnostic>) {
    let position = node.start_position();
    if node.is_missing() {
        out.push(Diagnostic {
            kind: DiagnosticKind::Missing,
            line: position.row + 1,
            column: position.column + 1,
            detail: node.kind().to_string(),
        });
        return;
    }
    if node.is_error() {
        let snippet: String = text(node, source)
            .chars()
            .take(40)
            .map(|c| if c.is_whitespace() { ' ' } else { c })
            .collect();
        out.push(Diagnostic {
            kind: DiagnosticKind::Unexpected,
            line: position.row + 1,
            column: position.column + 1,
            detail: snippet,
        });
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() || child.is_missing() {
            collect_errors(child, source, out);
        }
    }
}

/// Source text covered by `node`. Empty if the range is not on a char boundary.
pub fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_source_has_no_diagnostics() {
        let tree = SourceTree::parse(
            "Clean.cs",
            "namespace App { public class Foo { public int Bar() { return 1; } } }".to_string(),
        )
        .unwrap();
        assert!(tree.diagnostics().is_empty());
        assert!(tree.ensure_clean().is_ok());
        assert_eq!(tree.root().kind(), "compilation_unit");
    }

    #[test]
    fn test_broken_source_reports_diagnostics() {
        let tree = SourceTree::parse(
            "Broken.cs",
            "namespace App { public class Foo { public int Bar( { return 1; } }".to_string(),
        )
        .unwrap();
        let diagnostics = tree.diagnostics();
        assert!(!diagnostics.is_empty());

        let err = tree.ensure_clean().unwrap_err();
        assert!(matches!(err, AnatomistError::SyntaxErrors { .. }));
        assert!(err.to_string().contains("Broken.cs"));
    }

    #[test]
    fn test_read_strips_bom() {
        let tmp = std::env::temp_dir().join("anatomist_syntax_bom");
        std::fs::create_dir_all(&tmp).unwrap();
        let file = tmp.join("Bom.cs");
        std::fs::write(&file, "\u{feff}class Foo { }").unwrap();

        let tree = SourceTree::read(&file).unwrap();
        assert!(tree.source().starts_with("class"));
        assert!(tree.diagnostics().is_empty());

        std::fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn test_read_empty_file() {
        let tmp = std::env::temp_dir().join("anatomist_syntax_empty");
        std::fs::create_dir_all(&tmp).unwrap();
        let file = tmp.join("Empty.cs");
        std::fs::write(&file, "").unwrap();

        let tree = SourceTree::read(&file).unwrap();
        assert!(tree.source().is_empty());

        std::fs::remove_dir_all(&tmp).ok();
    }
}
