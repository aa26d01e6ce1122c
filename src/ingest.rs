//! Adapter from the external `fluent-syntax` parser to the located tree.
//!
//! Parsing never aborts a batch. When the parser reports errors it still
//! returns the entries it recovered; those are converted as usual, each error
//! becomes a `parse-error` diagnostic, and the resource is flagged so that it
//! is analysed but never emitted.

use camino::{Utf8Path, Utf8PathBuf};
use common::diagnostics::{DiagnosticCode, Diagnostics, Origin, diagnostic};
use common::locale::LocaleTag;
use common::span::{LineIndex, SourceLocation};
use fluent_syntax::ast as fluent;
use fluent_syntax::parser;
use fluent_syntax::unicode::unescape_unicode_to_string;
use log::{debug, warn};

use crate::ast::{
    Arguments, Attribute, Element, Entry, EntryKind, Expression, Inline, InlineKind,
    NamedArgument, Pattern, Resource, Select, Variant, VariantKey,
};

/// One input file of a compilation batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
    locale: String,
    stem: Utf8PathBuf,
    origin: Utf8PathBuf,
    text: String,
}

impl SourceFile {
    /// Describes `text` as the `stem` resource of `locale`.
    ///
    /// Diagnostics refer to the file as `{locale}/{stem}` unless
    /// [`Self::with_origin`] supplies the real path.
    ///
    /// # Examples
    ///
    /// ```
    /// use fluent_elm::SourceFile;
    ///
    /// let file = SourceFile::new("en", "main.ftl", "hello = Hello");
    /// assert_eq!(file.origin().as_str(), "en/main.ftl");
    /// ```
    #[must_use]
    pub fn new(
        locale: impl Into<String>,
        stem: impl Into<Utf8PathBuf>,
        text: impl Into<String>,
    ) -> Self {
        let tag: String = locale.into();
        let path: Utf8PathBuf = stem.into();
        Self {
            origin: Utf8PathBuf::from(tag.as_str()).join(&path),
            locale: tag,
            stem: path,
            text: text.into(),
        }
    }

    /// Overrides the path used in diagnostics.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<Utf8PathBuf>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Returns the locale as supplied.
    #[must_use]
    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Returns the bundle stem.
    #[must_use]
    pub fn stem(&self) -> &Utf8Path {
        &self.stem
    }

    /// Returns the diagnostic path.
    #[must_use]
    pub fn origin(&self) -> &Utf8Path {
        &self.origin
    }

    /// Returns the Fluent source text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Parses `file` and converts it into a located [`Resource`].
#[must_use]
pub fn ingest(file: &SourceFile, locale: LocaleTag, diagnostics: &Diagnostics) -> Resource {
    let index = LineIndex::new(file.text());
    let (parsed, errors) = match parser::parse(file.text()) {
        Ok(resource) => (resource, Vec::new()),
        Err((resource, errors)) => (resource, errors),
    };

    for error in &errors {
        let location = index.location(error.pos.start);
        diagnostics.push(
            diagnostic(
                DiagnosticCode::ParseError,
                Origin::new(file.origin(), location),
                error.kind.to_string(),
            )
            .note("messages from this file are checked but not emitted until it parses")
            .build(),
        );
    }
    if !errors.is_empty() {
        warn!(
            target: "fluent_elm::ingest",
            "{} has {} parse error(s); it will not be emitted",
            file.origin(),
            errors.len(),
        );
    }

    let converter = Converter { index: &index };
    let entries: Vec<Entry> = parsed
        .body
        .iter()
        .filter_map(|entry| converter.entry(entry))
        .collect();
    debug!(
        target: "fluent_elm::ingest",
        "{}: {} entries",
        file.origin(),
        entries.len(),
    );

    Resource {
        locale,
        origin: file.origin().to_owned(),
        stem: file.stem().to_owned(),
        entries,
        parse_failed: !errors.is_empty(),
    }
}

struct Converter<'i, 's> {
    index: &'i LineIndex<'s>,
}

impl Converter<'_, '_> {
    fn locate(&self, fragment: &str, fallback: SourceLocation) -> SourceLocation {
        self.index.locate(fragment).unwrap_or(fallback)
    }

    fn entry(&self, entry: &fluent::Entry<&str>) -> Option<Entry> {
        match entry {
            fluent::Entry::Message(message) => {
                let location = self.locate(message.id.name, SourceLocation::new(1, 1));
                Some(Entry {
                    kind: EntryKind::Message,
                    id: message.id.name.to_owned(),
                    location,
                    value: message
                        .value
                        .as_ref()
                        .map(|pattern| self.pattern(pattern, location)),
                    attributes: self.attributes(&message.attributes, location),
                })
            }
            fluent::Entry::Term(term) => {
                let location = self.locate(term.id.name, SourceLocation::new(1, 1));
                Some(Entry {
                    kind: EntryKind::Term,
                    id: term.id.name.to_owned(),
                    location,
                    value: Some(self.pattern(&term.value, location)),
                    attributes: self.attributes(&term.attributes, location),
                })
            }
            _ => None,
        }
    }

    fn attributes(
        &self,
        attributes: &[fluent::Attribute<&str>],
        fallback: SourceLocation,
    ) -> Vec<Attribute> {
        attributes
            .iter()
            .map(|attribute| {
                let location = self.locate(attribute.id.name, fallback);
                Attribute {
                    name: attribute.id.name.to_owned(),
                    location,
                    value: self.pattern(&attribute.value, location),
                }
            })
            .collect()
    }

    fn pattern(&self, pattern: &fluent::Pattern<&str>, fallback: SourceLocation) -> Pattern {
        let mut elements: Vec<Element> = Vec::with_capacity(pattern.elements.len());
        for element in &pattern.elements {
            match element {
                fluent::PatternElement::TextElement { value } => {
                    // The parser splits indented continuation lines into
                    // separate text elements.
                    if let Some(Element::Text { value: previous, .. }) = elements.last_mut() {
                        previous.push_str(value);
                    } else {
                        elements.push(Element::Text {
                            value: (*value).to_owned(),
                            location: self.locate(value, fallback),
                        });
                    }
                }
                fluent::PatternElement::Placeable { expression } => {
                    elements.push(Element::Placeable(self.expression(expression, fallback)));
                }
            }
        }
        Pattern { elements }
    }

    fn expression(
        &self,
        expression: &fluent::Expression<&str>,
        fallback: SourceLocation,
    ) -> Expression {
        match expression {
            fluent::Expression::Inline(inline) => Expression::Inline(self.inline(inline, fallback)),
            fluent::Expression::Select { selector, variants } => {
                let selector = self.inline(selector, fallback);
                let variants = variants
                    .iter()
                    .map(|variant| self.variant(variant, selector.location))
                    .collect();
                Expression::Select(Select { selector, variants })
            }
        }
    }

    fn variant(&self, variant: &fluent::Variant<&str>, fallback: SourceLocation) -> Variant {
        let (key, location) = match &variant.key {
            fluent::VariantKey::Identifier { name } => (
                VariantKey::Identifier((*name).to_owned()),
                self.locate(name, fallback),
            ),
            fluent::VariantKey::NumberLiteral { value } => (
                VariantKey::Number((*value).to_owned()),
                self.locate(value, fallback),
            ),
        };
        Variant {
            key,
            value: self.pattern(&variant.value, location),
            default: variant.default,
            location,
        }
    }

    fn inline(&self, inline: &fluent::InlineExpression<&str>, fallback: SourceLocation) -> Inline {
        match inline {
            fluent::InlineExpression::StringLiteral { value } => Inline {
                kind: InlineKind::String(unescape_unicode_to_string(value).into_owned()),
                location: self.locate(value, fallback),
            },
            fluent::InlineExpression::NumberLiteral { value } => Inline {
                kind: InlineKind::Number((*value).to_owned()),
                location: self.locate(value, fallback),
            },
            fluent::InlineExpression::VariableReference { id } => Inline {
                kind: InlineKind::Variable(id.name.to_owned()),
                location: self.locate(id.name, fallback),
            },
            fluent::InlineExpression::MessageReference { id, attribute } => Inline {
                kind: InlineKind::Message {
                    id: id.name.to_owned(),
                    attribute: attribute.as_ref().map(|name| name.name.to_owned()),
                },
                location: self.locate(id.name, fallback),
            },
            fluent::InlineExpression::TermReference {
                id,
                attribute,
                arguments,
            } => {
                let location = self.locate(id.name, fallback);
                Inline {
                    kind: InlineKind::Term {
                        id: id.name.to_owned(),
                        attribute: attribute.as_ref().map(|name| name.name.to_owned()),
                        arguments: arguments
                            .as_ref()
                            .map(|arguments| self.arguments(arguments, location)),
                    },
                    location,
                }
            }
            fluent::InlineExpression::FunctionReference { id, arguments } => {
                let location = self.locate(id.name, fallback);
                Inline {
                    kind: InlineKind::Function {
                        name: id.name.to_owned(),
                        arguments: self.arguments(arguments, location),
                    },
                    location,
                }
            }
            fluent::InlineExpression::Placeable { expression } => {
                let inner = self.expression(expression, fallback);
                Inline {
                    location: inner.location(),
                    kind: InlineKind::Nested(Box::new(inner)),
                }
            }
        }
    }

    fn arguments(
        &self,
        arguments: &fluent::CallArguments<&str>,
        fallback: SourceLocation,
    ) -> Arguments {
        Arguments {
            positional: arguments
                .positional
                .iter()
                .map(|argument| self.inline(argument, fallback))
                .collect(),
            named: arguments
                .named
                .iter()
                .map(|argument| NamedArgument {
                    name: argument.name.name.to_owned(),
                    value: self.inline(&argument.value, fallback),
                    location: self.locate(argument.name.name, fallback),
                })
                .collect(),
        }
    }
}
