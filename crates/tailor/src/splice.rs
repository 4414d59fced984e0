//! Byte-range edits applied bottom-to-top.

use std::ops::Range;

use crate::TailorError;

/// Replace `[start, end)` with `replacement`. An empty range inserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub replacement: String,
}

impl Edit {
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self {
            start: at,
            end: at,
            replacement: text.into(),
        }
    }

    pub fn delete(range: Range<usize>) -> Self {
        Self {
            start: range.start,
            end: range.end,
            replacement: String::new(),
        }
    }

    pub fn replace(range: Range<usize>, text: impl Into<String>) -> Self {
        Self {
            start: range.start,
            end: range.end,
            replacement: text.into(),
        }
    }

    fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Applies `edits` to `source`.
///
/// Edits are sorted by descending start (then descending end) and spliced from the
/// bottom of the buffer up, so each splice leaves the offsets of the remaining ones
/// untouched. Insertions at the same offset keep their relative input order.
///
/// # Errors
/// - `InvalidRange`: an edit falls outside the buffer or off a char boundary
/// - `OverlappingEdits`: two non-empty ranges intersect
pub fn apply_edits(source: &str, mut edits: Vec<Edit>) -> Result<String, TailorError> {
    for edit in &edits {
        if edit.start > edit.end
            || edit.end > source.len()
            || !source.is_char_boundary(edit.start)
            || !source.is_char_boundary(edit.end)
        {
            return Err(TailorError::InvalidRange(edit.range()));
        }
    }

    // Stable sort, reversed afterwards: equal-position inserts end up in input order.
    edits.sort_by(|a, b| a.start.cmp(&b.start).then(a.end.cmp(&b.end)));
    edits.reverse();

    let mut content = source.to_string();
    let mut floor = source.len();
    let mut previous: Option<Range<usize>> = None;
    let mut pending_inserts: Vec<Edit> = Vec::new();

    let mut iter = edits.into_iter().peekable();
    while let Some(edit) = iter.next() {
        if edit.end > floor {
            return Err(TailorError::OverlappingEdits {
                first: edit.range(),
                second: previous.unwrap_or(floor..floor),
            });
        }

        // Group inserts sharing one offset so they land in input order.
        if edit.start == edit.end {
            pending_inserts.push(edit);
            if iter
                .peek()
                .is_some_and(|next| next.start == next.end && next.start == pending_inserts[0].start)
            {
                continue;
            }
            let at = pending_inserts[0].start;
            let text: String = pending_inserts
                .drain(..)
                .rev()
                .map(|e| e.replacement)
                .collect();
            content.insert_str(at, &text);
            previous = Some(at..at);
            floor = at;
            continue;
        }

        content.replace_range(edit.range(), &edit.replacement);
        floor = edit.start;
        previous = Some(edit.range());
    }

    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edits_applied_regardless_of_input_order() {
        let source = "public override int Foo() { }";
        let edits = vec![
            Edit::replace(20..23, "Foo__WrappedByCache"),
            Edit::delete(7..16),
            Edit::insert(0, "[M] "),
        ];
        assert_eq!(
            apply_edits(source, edits).unwrap(),
            "[M] public int Foo__WrappedByCache() { }"
        );
    }

    #[test]
    fn test_same_offset_inserts_keep_input_order() {
        let edits = vec![Edit::insert(0, "a"), Edit::insert(0, "b"), Edit::insert(0, "c")];
        assert_eq!(apply_edits("x", edits).unwrap(), "abcx");
    }

    #[test]
    fn test_insert_at_end_of_deleted_range() {
        let edits = vec![Edit::delete(0..3), Edit::insert(3, "!")];
        assert_eq!(apply_edits("abcdef", edits).unwrap(), "!def");
    }

    #[test]
    fn test_overlap_rejected() {
        let edits = vec![Edit::delete(0..4), Edit::delete(2..6)];
        assert!(matches!(
            apply_edits("abcdefgh", edits),
            Err(TailorError::OverlappingEdits { .. })
        ));
    }

    #[test]
    fn test_invalid_range_rejected() {
        assert!(matches!(
            apply_edits("ab", vec![Edit::delete(1..5)]),
            Err(TailorError::InvalidRange(_))
        ));
        assert!(matches!(
            apply_edits("é", vec![Edit::insert(1, "x")]),
            Err(TailorError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_no_edits_returns_source() {
        assert_eq!(apply_edits("class C { }", Vec::new()).unwrap(), "class C { }");
    }
}
