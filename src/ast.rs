//! Owned, located Fluent syntax tree.
//!
//! The external parser produces a tree of borrowed slices without positions.
//! [`crate::ingest`] converts it into these owned types, stamping every node
//! with the [`SourceLocation`] it was read from so later phases can report
//! problems without the original text at hand.

use camino::Utf8PathBuf;
use common::locale::LocaleTag;
use common::span::SourceLocation;

/// CLDR plural categories accepted as variant keys.
pub const PLURAL_CATEGORIES: [&str; 6] = ["zero", "one", "two", "few", "many", "other"];

/// One parsed resource: a single `.ftl` file for one locale.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    /// Locale the resource belongs to.
    pub locale: LocaleTag,
    /// Path used when reporting diagnostics.
    pub origin: Utf8PathBuf,
    /// Locale-independent path grouping resources into bundles.
    pub stem: Utf8PathBuf,
    /// Top-level messages and terms in source order.
    pub entries: Vec<Entry>,
    /// Whether the parser rejected part of the text.
    pub parse_failed: bool,
}

/// Distinguishes messages from terms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntryKind {
    /// A callable message.
    Message,
    /// A reusable term, always inlined.
    Term,
}

/// A message or term definition.
#[derive(Clone, Debug, PartialEq)]
pub struct Entry {
    /// Whether the entry is a message or a term.
    pub kind: EntryKind,
    /// Identifier without the leading `-` of terms.
    pub id: String,
    /// Location of the identifier.
    pub location: SourceLocation,
    /// Optional value pattern.
    pub value: Option<Pattern>,
    /// Attributes in source order.
    pub attributes: Vec<Attribute>,
}

/// A named attribute pattern on an entry.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// Location of the attribute name.
    pub location: SourceLocation,
    /// Attribute value.
    pub value: Pattern,
}

/// Literal text interleaved with placeables.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pattern {
    /// Elements in source order.
    pub elements: Vec<Element>,
}

impl Pattern {
    /// Returns the pattern's text when it contains no runtime values.
    ///
    /// String literals and inlined patterns made only of text count as text,
    /// so `Foo { "bar" }` yields `Some("Foobar")`.
    #[must_use]
    pub fn plain_text(&self) -> Option<String> {
        let mut text = String::new();
        for element in &self.elements {
            match element {
                Element::Text { value, .. } => text.push_str(value),
                Element::Placeable(expression) => text.push_str(&expression.plain_text()?),
            }
        }
        Some(text)
    }
}

/// A pattern element.
#[derive(Clone, Debug, PartialEq)]
pub enum Element {
    /// Literal text.
    Text {
        /// The text as written, with indentation already removed.
        value: String,
        /// Location of the first character.
        location: SourceLocation,
    },
    /// An embedded expression.
    Placeable(Expression),
}

/// A placeable's expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    /// A single inline expression.
    Inline(Inline),
    /// A select expression.
    Select(Select),
}

impl Expression {
    /// Returns the location of the expression's head.
    #[must_use]
    pub const fn location(&self) -> SourceLocation {
        match self {
            Self::Inline(inline) => inline.location,
            Self::Select(select) => select.selector.location,
        }
    }

    fn plain_text(&self) -> Option<String> {
        match self {
            Self::Inline(inline) => match &inline.kind {
                InlineKind::String(value) => Some(value.clone()),
                InlineKind::Inlined(pattern) => pattern.plain_text(),
                InlineKind::Nested(inner) => inner.plain_text(),
                _ => None,
            },
            Self::Select(_) => None,
        }
    }
}

/// A select expression with its variants.
#[derive(Clone, Debug, PartialEq)]
pub struct Select {
    /// The value being matched.
    pub selector: Inline,
    /// Variants in source order.
    pub variants: Vec<Variant>,
}

impl Select {
    /// Returns the index of the default variant when exactly one is marked.
    #[must_use]
    pub fn default_index(&self) -> Option<usize> {
        let mut defaults = self
            .variants
            .iter()
            .enumerate()
            .filter(|(_, variant)| variant.default);
        match (defaults.next(), defaults.next()) {
            (Some((index, _)), None) => Some(index),
            _ => None,
        }
    }
}

/// One branch of a select expression.
#[derive(Clone, Debug, PartialEq)]
pub struct Variant {
    /// The key matched against the selector.
    pub key: VariantKey,
    /// The branch body.
    pub value: Pattern,
    /// Whether this is the `*[default]` variant.
    pub default: bool,
    /// Location of the key.
    pub location: SourceLocation,
}

/// A variant key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VariantKey {
    /// An identifier such as `male` or `one`.
    Identifier(String),
    /// A numeric literal such as `0` or `1.5`.
    Number(String),
}

impl VariantKey {
    /// Whether the key is a CLDR plural category.
    #[must_use]
    pub fn is_plural_category(&self) -> bool {
        matches!(self, Self::Identifier(name) if PLURAL_CATEGORIES.contains(&name.as_str()))
    }

    /// Returns the key text as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Identifier(name) => name,
            Self::Number(value) => value,
        }
    }

    /// Whether two keys select the same value: identical identifiers, or
    /// numbers that normalise to the same literal.
    #[must_use]
    pub fn same_key(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Identifier(left), Self::Identifier(right)) => left == right,
            (Self::Number(left), Self::Number(right)) => same_number(left, right),
            _ => false,
        }
    }
}

/// Normalises a Fluent numeric literal: `007` becomes `7`, `1.50` becomes
/// `1.5`.
#[must_use]
pub fn normalise_number(raw: &str) -> String {
    raw.parse::<i64>()
        .map(|value| value.to_string())
        .or_else(|_| raw.parse::<f64>().map(|value| value.to_string()))
        .unwrap_or_else(|_| raw.to_owned())
}

/// Compares two numeric literals by value, so `1` matches `1.0`.
#[must_use]
pub fn same_number(left: &str, right: &str) -> bool {
    normalise_number(left) == normalise_number(right)
}

/// An inline expression with its location.
#[derive(Clone, Debug, PartialEq)]
pub struct Inline {
    /// The expression.
    pub kind: InlineKind,
    /// Location of the expression's head.
    pub location: SourceLocation,
}

/// Inline expression variants.
#[derive(Clone, Debug, PartialEq)]
pub enum InlineKind {
    /// A string literal with escapes already decoded.
    String(String),
    /// A numeric literal as written.
    Number(String),
    /// `$name`.
    Variable(String),
    /// `message` or `message.attribute`.
    Message {
        /// Referenced message.
        id: String,
        /// Optional attribute.
        attribute: Option<String>,
    },
    /// `-term`, `-term.attribute`, or `-term(arg: "value")`.
    Term {
        /// Referenced term, without the leading `-`.
        id: String,
        /// Optional attribute.
        attribute: Option<String>,
        /// Call arguments, if parenthesised.
        arguments: Option<Arguments>,
    },
    /// `NUMBER(...)` or `DATETIME(...)`.
    Function {
        /// Function name.
        name: String,
        /// Call arguments.
        arguments: Arguments,
    },
    /// A parenthesised placeable nested inside another.
    Nested(Box<Expression>),
    /// A term body or folded select variant substituted in place.
    Inlined(Box<Pattern>),
    /// Stands in for an expression that failed to resolve.
    Invalid,
}

/// Call arguments.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Arguments {
    /// Positional arguments.
    pub positional: Vec<Inline>,
    /// Named arguments in source order.
    pub named: Vec<NamedArgument>,
}

/// A `name: value` call argument.
#[derive(Clone, Debug, PartialEq)]
pub struct NamedArgument {
    /// Argument name.
    pub name: String,
    /// Argument value.
    pub value: Inline,
    /// Location of the name.
    pub location: SourceLocation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn text(value: &str) -> Element {
        Element::Text {
            value: value.to_owned(),
            location: SourceLocation::new(1, 1),
        }
    }

    fn inline(kind: InlineKind) -> Element {
        Element::Placeable(Expression::Inline(Inline {
            kind,
            location: SourceLocation::new(1, 1),
        }))
    }

    #[rstest]
    fn plain_text_joins_literals() {
        let pattern = Pattern {
            elements: vec![text("Foo"), inline(InlineKind::String(String::from("bar")))],
        };
        assert_eq!(pattern.plain_text().as_deref(), Some("Foobar"));
    }

    #[rstest]
    fn plain_text_rejects_variables() {
        let pattern = Pattern {
            elements: vec![text("Hi "), inline(InlineKind::Variable(String::from("name")))],
        };
        assert!(pattern.plain_text().is_none());
    }

    #[rstest]
    #[case(VariantKey::Identifier(String::from("one")), true)]
    #[case(VariantKey::Identifier(String::from("other")), true)]
    #[case(VariantKey::Identifier(String::from("male")), false)]
    #[case(VariantKey::Number(String::from("1")), false)]
    fn classifies_plural_keys(#[case] key: VariantKey, #[case] expected: bool) {
        assert_eq!(key.is_plural_category(), expected);
    }

    #[rstest]
    #[case("1", "1.0", true)]
    #[case("1", "2", false)]
    #[case("-0.5", "-0.50", true)]
    fn compares_numbers_by_value(#[case] left: &str, #[case] right: &str, #[case] expected: bool) {
        assert_eq!(same_number(left, right), expected);
    }

    #[rstest]
    #[case(VariantKey::Number(String::from("1")), VariantKey::Number(String::from("1.0")), true)]
    #[case(VariantKey::Number(String::from("007")), VariantKey::Number(String::from("7")), true)]
    #[case(
        VariantKey::Identifier(String::from("few")),
        VariantKey::Identifier(String::from("few")),
        true
    )]
    #[case(VariantKey::Identifier(String::from("1")), VariantKey::Number(String::from("1")), false)]
    #[case(VariantKey::Number(String::from("1")), VariantKey::Number(String::from("1.5")), false)]
    fn compares_keys_after_normalising(
        #[case] left: VariantKey,
        #[case] right: VariantKey,
        #[case] expected: bool,
    ) {
        assert_eq!(left.same_key(&right), expected);
    }
}
