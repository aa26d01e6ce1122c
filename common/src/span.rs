//! Source locations for diagnostics.
//!
//! The external Fluent parser hands back borrowed slices of the original
//! resource text rather than positions. [`LineIndex`] recovers one-based line
//! and column numbers from those slices so every diagnostic can point at the
//! offending file, line, and column.

use serde::Serialize;

/// Represents a location in source text using one-based line and column numbers.
///
/// Columns count Unicode scalar values, not bytes, so a location reads the way
/// an editor displays it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SourceLocation {
    line: usize,
    column: usize,
}

impl SourceLocation {
    /// Builds a new location.
    ///
    /// # Examples
    ///
    /// ```
    /// use common::span::SourceLocation;
    ///
    /// let location = SourceLocation::new(3, 5);
    /// assert_eq!(location.line(), 3);
    /// ```
    #[must_use]
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Returns the one-based line number.
    #[must_use]
    pub const fn line(self) -> usize {
        self.line
    }

    /// Returns the one-based column number.
    #[must_use]
    pub const fn column(self) -> usize {
        self.column
    }
}

/// Maps byte offsets within a source text to [`SourceLocation`]s.
#[derive(Clone, Debug)]
pub struct LineIndex<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    /// Indexes the line starts of `text`.
    ///
    /// # Examples
    ///
    /// ```
    /// use common::span::{LineIndex, SourceLocation};
    ///
    /// let index = LineIndex::new("a = 1\nb = 2\n");
    /// assert_eq!(index.location(6), SourceLocation::new(2, 1));
    /// ```
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(offset, _)| offset + 1))
            .collect();
        Self { text, line_starts }
    }

    /// Returns the indexed text.
    #[must_use]
    pub const fn text(&self) -> &'a str {
        self.text
    }

    /// Converts a byte offset into a location. Offsets past the end of the
    /// text clamp to the final position.
    #[must_use]
    pub fn location(&self, offset: usize) -> SourceLocation {
        let clamped = offset.min(self.text.len());
        let line = self
            .line_starts
            .partition_point(|start| *start <= clamped)
            .max(1);
        let line_start = self.line_starts.get(line - 1).copied().unwrap_or(0);
        let column = self
            .text
            .get(line_start..clamped)
            .map_or(0, |prefix| prefix.chars().count());
        SourceLocation::new(line, column + 1)
    }

    /// Locates a slice that was borrowed from the indexed text.
    ///
    /// Returns `None` when `fragment` does not point into the text, which is
    /// the case for owned strings produced after parsing.
    #[must_use]
    pub fn locate(&self, fragment: &str) -> Option<SourceLocation> {
        offset_within(self.text, fragment).map(|offset| self.location(offset))
    }
}

/// Returns the byte offset of `fragment` inside `source` when `fragment` is a
/// sub-slice of it.
///
/// # Examples
///
/// ```
/// use common::span::offset_within;
///
/// let source = "key = value";
/// assert_eq!(offset_within(source, &source[6..]), Some(6));
/// assert_eq!(offset_within(source, &String::from("value")), None);
/// ```
#[must_use]
pub fn offset_within(source: &str, fragment: &str) -> Option<usize> {
    let base = source.as_ptr().addr();
    let start = fragment.as_ptr().addr();
    let offset = start.checked_sub(base)?;
    (offset + fragment.len() <= source.len()).then_some(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1, 1)]
    #[case(4, 1, 5)]
    #[case(5, 2, 1)]
    #[case(8, 2, 4)]
    #[case(100, 3, 1)]
    fn maps_offsets_to_locations(
        #[case] offset: usize,
        #[case] line: usize,
        #[case] column: usize,
    ) {
        let index = LineIndex::new("abcd\nxyz\n");
        assert_eq!(index.location(offset), SourceLocation::new(line, column));
    }

    #[rstest]
    fn counts_columns_in_characters() {
        let text = "é = ü";
        let index = LineIndex::new(text);
        let fragment = text.get(text.len() - "ü".len()..).unwrap_or_default();
        assert_eq!(index.locate(fragment), Some(SourceLocation::new(1, 5)));
    }

    #[rstest]
    fn rejects_foreign_fragments() {
        let index = LineIndex::new("message = text");
        let foreign = String::from("text");
        assert!(index.locate(&foreign).is_none());
    }

    #[rstest]
    fn orders_locations_by_line_then_column() {
        let mut locations = vec![
            SourceLocation::new(2, 1),
            SourceLocation::new(1, 9),
            SourceLocation::new(1, 2),
        ];
        locations.sort();
        assert_eq!(
            locations,
            vec![
                SourceLocation::new(1, 2),
                SourceLocation::new(1, 9),
                SourceLocation::new(2, 1),
            ]
        );
    }
}
