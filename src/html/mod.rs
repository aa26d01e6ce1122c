//! Compilation of HTML-producing messages into node trees.
//!
//! A message whose identifier ends in `-html` (or `Html`) treats its literal
//! text as markup. The expanded pattern is flattened into a stream of
//! characters and placeables, parsed into a tree of [`HtmlNode`]s, and each
//! element is stamped with the [`Selector`]s that can address it.

mod parser;
mod selector;

use common::span::SourceLocation;
use log::debug;

use crate::ast::{Expression, Inline, VariantKey};
use crate::sink::Sink;

pub use selector::{Selector, SelectorError, select_attributes, selectors_for};

/// A compiled HTML message body.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HtmlFragment {
    /// Top-level nodes.
    pub children: Vec<HtmlNode>,
}

impl HtmlFragment {
    /// Iterates over every element in document order.
    #[must_use]
    pub fn elements(&self) -> impl Iterator<Item = &HtmlElement> {
        let mut pending: Vec<&HtmlNode> = self.children.iter().rev().collect();
        std::iter::from_fn(move || {
            while let Some(node) = pending.pop() {
                match node {
                    HtmlNode::Element(element) => {
                        pending.extend(element.children.iter().rev());
                        return Some(element);
                    }
                    HtmlNode::Select(select) => {
                        for variant in select.variants.iter().rev() {
                            pending.extend(variant.children.iter().rev());
                        }
                    }
                    HtmlNode::Text(_) | HtmlNode::Placeable(_) => {}
                }
            }
            None
        })
    }
}

/// A node of a compiled fragment.
#[derive(Clone, Debug, PartialEq)]
pub enum HtmlNode {
    /// Text with character references decoded.
    Text(String),
    /// A runtime value rendered in place.
    Placeable(Expression),
    /// An element.
    Element(HtmlElement),
    /// A runtime select whose variants are fragments of their own.
    Select(HtmlSelect),
}

/// An element with its frozen selector set.
#[derive(Clone, Debug, PartialEq)]
pub struct HtmlElement {
    /// Lower-cased tag name.
    pub tag: String,
    /// Attributes in source order.
    pub attributes: Vec<HtmlAttribute>,
    /// Child nodes.
    pub children: Vec<HtmlNode>,
    /// Every selector that addresses the element.
    pub selectors: Vec<Selector>,
    /// Location of the opening `<`.
    pub location: SourceLocation,
}

/// An element attribute.
#[derive(Clone, Debug, PartialEq)]
pub struct HtmlAttribute {
    /// Lower-cased attribute name.
    pub name: String,
    /// The value, or `None` when written without `=`.
    pub value: Option<Vec<AttributeValue>>,
}

/// Part of an attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    /// Literal text.
    Text(String),
    /// A runtime value rendered as text.
    Placeable(Expression),
}

/// A select expression inside markup.
#[derive(Clone, Debug, PartialEq)]
pub struct HtmlSelect {
    /// The selector.
    pub selector: Inline,
    /// Variants in source order.
    pub variants: Vec<HtmlVariant>,
}

/// One compiled select variant.
#[derive(Clone, Debug, PartialEq)]
pub struct HtmlVariant {
    /// The variant key.
    pub key: VariantKey,
    /// Whether this is the default variant.
    pub default: bool,
    /// The variant's nodes.
    pub children: Vec<HtmlNode>,
}

/// Result of compiling one message.
#[derive(Debug)]
pub struct Compiled {
    /// The node tree, with malformed parts recovered.
    pub fragment: HtmlFragment,
    /// Whether any error was reported.
    pub broken: bool,
}

/// Compiles an expanded HTML message pattern.
#[must_use]
pub fn compile(pattern: &crate::ast::Pattern, owner: &str, sink: Sink<'_>) -> Compiled {
    let mut reporter = parser::Reporter::new(owner, sink);
    let children = parser::parse_pattern(pattern, &mut reporter);
    let fragment = HtmlFragment { children };
    debug!(
        target: "fluent_elm::html",
        "{owner}: {} elements",
        fragment.elements().count(),
    );
    Compiled {
        fragment,
        broken: reporter.broken(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{SourceFile, ingest};
    use camino::Utf8Path;
    use common::diagnostics::{DiagnosticCode, Diagnostics, Report};
    use common::locale::LocaleTag;
    use rstest::rstest;

    fn compile_source(body: &str) -> (HtmlFragment, bool, Report) {
        let diagnostics = Diagnostics::new();
        let locale = LocaleTag::parse("en").unwrap_or_else(|error| panic!("{error}"));
        let source = format!("msg-html = {body}\n");
        let resource = ingest(&SourceFile::new("en", "main.ftl", source), locale, &diagnostics);
        let Some(pattern) = resource.entries.first().and_then(|entry| entry.value.clone()) else {
            panic!("message should have a value");
        };
        let compiled = compile(
            &pattern,
            "msg-html",
            Sink::new(&diagnostics, Utf8Path::new("en/main.ftl")),
        );
        (compiled.fragment, compiled.broken, diagnostics.into_report())
    }

    fn selector_sets(fragment: &HtmlFragment) -> Vec<Vec<String>> {
        fragment
            .elements()
            .map(|element| element.selectors.iter().map(ToString::to_string).collect())
            .collect()
    }

    #[rstest]
    fn sibling_links_have_disjoint_selectors() {
        let (fragment, broken, _) = compile_source("<a data-x>cancel</a> <a data-y>confirm</a>");
        assert!(!broken);
        assert_eq!(
            selector_sets(&fragment),
            vec![
                vec!["a", "[data-x]", "a[data-x]"],
                vec!["a", "[data-y]", "a[data-y]"],
            ]
        );
    }

    #[rstest]
    fn wraps_placeables_in_elements() {
        let (fragment, broken, _) = compile_source("Hello, <b>{ $name }</b>!");
        assert!(!broken);
        assert_eq!(fragment.children.len(), 3);
        assert_eq!(fragment.children[0], HtmlNode::Text(String::from("Hello, ")));
        let HtmlNode::Element(bold) = &fragment.children[1] else {
            panic!("expected an element");
        };
        assert_eq!(bold.tag, "b");
        assert_eq!(bold.selectors, vec![Selector::Element(String::from("b"))]);
        assert!(matches!(bold.children.as_slice(), [HtmlNode::Placeable(_)]));
        assert_eq!(bold.location, SourceLocation::new(1, 19));
    }

    #[rstest]
    #[case("<b>bold</i>")]
    #[case("<b><i>x</b></i>")]
    #[case("<b>open")]
    #[case("close</b>")]
    #[case("<b class=\"x\" class=\"y\">x</b>")]
    #[case("<b title=\"x>x</b>")]
    #[case("<{ $tag }>x")]
    #[case("<b { $attr }=\"x\">x</b>")]
    fn reports_structure_errors(#[case] body: &str) {
        let (_, broken, report) = compile_source(body);
        assert!(broken);
        assert!(report.with_code(DiagnosticCode::HtmlStructure).count() >= 1);
    }

    #[rstest]
    fn decodes_references_and_skips_comments() {
        let (fragment, broken, _) =
            compile_source("a &lt; b &amp;&#x41;&#66;&nbsp;<!-- note --><br/>c < d");
        assert!(!broken);
        assert_eq!(
            fragment.children,
            vec![
                HtmlNode::Text(String::from("a < b &AB\u{a0}")),
                HtmlNode::Element(HtmlElement {
                    tag: String::from("br"),
                    attributes: Vec::new(),
                    children: Vec::new(),
                    selectors: vec![Selector::Element(String::from("br"))],
                    location: SourceLocation::new(1, 56),
                }),
                HtmlNode::Text(String::from("c < d")),
            ]
        );
    }

    #[rstest]
    fn void_elements_need_no_end_tag() {
        let (fragment, broken, _) = compile_source("<p>a<br>b<img src=\"x.png\"></p>");
        assert!(!broken);
        let tags: Vec<&str> = fragment.elements().map(|element| element.tag.as_str()).collect();
        assert_eq!(tags, vec!["p", "br", "img"]);
    }

    #[rstest]
    fn attribute_values_keep_placeables() {
        let (fragment, broken, _) = compile_source("<a href=\"/u/{ $id }\" lang=en>x</a>");
        assert!(!broken);
        let Some(link) = fragment.elements().next() else {
            panic!("expected an element");
        };
        assert_eq!(link.attributes.len(), 2);
        assert!(matches!(
            link.attributes[0].value.as_deref(),
            Some([AttributeValue::Text(prefix), AttributeValue::Placeable(_)]) if prefix == "/u/"
        ));
        let rendered: Vec<String> = link.selectors.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["a", "[href]", "a[href]", "[lang]", "a[lang]", "[lang=\"en\"]", "a[lang=\"en\"]"]
        );
    }

    #[rstest]
    fn html_messages_are_rejected_inside_attribute_values() {
        let (_, broken, report) = compile_source("<b title=\"{ other-html }\">x</b>");
        assert!(broken);
        assert_eq!(report.with_code(DiagnosticCode::HtmlTypeMismatch).count(), 1);
    }

    #[rstest]
    fn runtime_selects_compile_each_variant() {
        let (fragment, broken, _) = compile_source(
            "{ $n ->\n    [one] <b>one</b>\n   *[other] <i>many</i>\n}",
        );
        assert!(!broken);
        let HtmlNode::Select(select) = &fragment.children[0] else {
            panic!("expected a select");
        };
        assert_eq!(select.variants.len(), 2);
        let tags: Vec<&str> = fragment.elements().map(|element| element.tag.as_str()).collect();
        assert_eq!(tags, vec!["b", "i"]);
    }
}
