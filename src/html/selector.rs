//! The CSS selector subset used to address compiled HTML nodes.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::{AttributeValue, HtmlAttribute};

/// A compile-time enumerable selector.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Selector {
    /// `b`
    Element(String),
    /// `.note`
    Class(String),
    /// `#intro`
    Id(String),
    /// `[data-x]`
    AttrPresent(String),
    /// `[lang="en"]`
    AttrValue(String, String),
    /// `b.note`
    ElementClass(String, String),
    /// `b#intro`
    ElementId(String, String),
    /// `a[data-x]`
    ElementAttrPresent(String, String),
    /// `a[lang="en"]`
    ElementAttrValue(String, String, String),
}

impl fmt::Display for Selector {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element(tag) => formatter.write_str(tag),
            Self::Class(class) => write!(formatter, ".{class}"),
            Self::Id(id) => write!(formatter, "#{id}"),
            Self::AttrPresent(name) => write!(formatter, "[{name}]"),
            Self::AttrValue(name, value) => write!(formatter, "[{name}=\"{value}\"]"),
            Self::ElementClass(tag, class) => write!(formatter, "{tag}.{class}"),
            Self::ElementId(tag, id) => write!(formatter, "{tag}#{id}"),
            Self::ElementAttrPresent(tag, name) => write!(formatter, "{tag}[{name}]"),
            Self::ElementAttrValue(tag, name, value) => {
                write!(formatter, "{tag}[{name}=\"{value}\"]")
            }
        }
    }
}

/// Error raised when text is not one of the supported selector forms.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectorError {
    /// The input was empty.
    #[error("selector is empty")]
    Empty,
    /// The input uses syntax outside the supported subset.
    #[error("`{0}` is not a supported selector")]
    Unsupported(String),
}

const fn is_name_char(character: char) -> bool {
    character.is_ascii_alphanumeric() || character == '-' || character == '_'
}

impl FromStr for Selector {
    type Err = SelectorError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(SelectorError::Empty);
        }
        let unsupported = || SelectorError::Unsupported(trimmed.to_owned());
        let split = trimmed.find(|character: char| !is_name_char(character));
        let (tag, rest) = trimmed.split_at(split.unwrap_or(trimmed.len()));
        let tag = (!tag.is_empty()).then(|| tag.to_ascii_lowercase());

        if rest.is_empty() {
            return tag.map(Self::Element).ok_or_else(unsupported);
        }
        let valid_name = |name: &str| !name.is_empty() && name.chars().all(is_name_char);

        if let Some(class) = rest.strip_prefix('.') {
            if !valid_name(class) {
                return Err(unsupported());
            }
            return Ok(tag.map_or_else(
                || Self::Class(class.to_owned()),
                |element| Self::ElementClass(element, class.to_owned()),
            ));
        }
        if let Some(id) = rest.strip_prefix('#') {
            if !valid_name(id) {
                return Err(unsupported());
            }
            return Ok(tag.map_or_else(
                || Self::Id(id.to_owned()),
                |element| Self::ElementId(element, id.to_owned()),
            ));
        }
        let inner = rest
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .ok_or_else(unsupported)?;
        match inner.split_once('=') {
            None if valid_name(inner) => {
                let name = inner.to_ascii_lowercase();
                Ok(tag.map_or_else(
                    || Self::AttrPresent(name.clone()),
                    |element| Self::ElementAttrPresent(element, name.clone()),
                ))
            }
            Some((name, quoted)) if valid_name(name) => {
                let value = quoted
                    .strip_prefix('"')
                    .and_then(|unquoted| unquoted.strip_suffix('"'))
                    .ok_or_else(unsupported)?;
                let lowered = name.to_ascii_lowercase();
                Ok(tag.map_or_else(
                    || Self::AttrValue(lowered.clone(), value.to_owned()),
                    |element| Self::ElementAttrValue(element, lowered.clone(), value.to_owned()),
                ))
            }
            _ => Err(unsupported()),
        }
    }
}

fn static_value(attribute: &HtmlAttribute) -> Option<String> {
    attribute.value.as_ref().and_then(|parts| {
        parts.iter().try_fold(String::new(), |mut text, part| match part {
            AttributeValue::Text(value) => {
                text.push_str(value);
                Some(text)
            }
            AttributeValue::Placeable(_) => None,
        })
    })
}

/// Computes every selector that can address an element.
///
/// The order is the tag, then class and id selectors, then the remaining
/// attributes by name. Dynamic classes and ids contribute nothing; other
/// dynamic or valueless attributes contribute presence selectors only.
#[must_use]
pub fn selectors_for(tag: &str, attributes: &[HtmlAttribute]) -> Vec<Selector> {
    let mut selectors = vec![Selector::Element(tag.to_owned())];
    let find = |name: &str| attributes.iter().find(|attribute| attribute.name == name);

    if let Some(classes) = find("class").and_then(static_value) {
        for class in classes.split_whitespace() {
            selectors.push(Selector::Class(class.to_owned()));
            selectors.push(Selector::ElementClass(tag.to_owned(), class.to_owned()));
        }
    }
    if let Some(id) = find("id").and_then(static_value) {
        selectors.push(Selector::Id(id.clone()));
        selectors.push(Selector::ElementId(tag.to_owned(), id));
    }

    let mut others: Vec<&HtmlAttribute> = attributes
        .iter()
        .filter(|attribute| attribute.name != "class" && attribute.name != "id")
        .collect();
    others.sort_by(|left, right| left.name.cmp(&right.name));
    for attribute in others {
        selectors.push(Selector::AttrPresent(attribute.name.clone()));
        selectors.push(Selector::ElementAttrPresent(
            tag.to_owned(),
            attribute.name.clone(),
        ));
        if let Some(value) = static_value(attribute) {
            selectors.push(Selector::AttrValue(attribute.name.clone(), value.clone()));
            selectors.push(Selector::ElementAttrValue(
                tag.to_owned(),
                attribute.name.clone(),
                value,
            ));
        }
    }

    let mut seen = HashSet::new();
    selectors.retain(|selector| seen.insert(selector.clone()));
    selectors
}

/// Returns, in supplied order, the attributes of every pair whose selector
/// addresses a node with `selectors`.
///
/// This is the boundary filter generated builders apply at runtime.
/// Unparseable selectors never match.
///
/// # Examples
///
/// ```
/// use fluent_elm::html::{Selector, select_attributes};
///
/// let node = vec![
///     Selector::Element(String::from("a")),
///     Selector::AttrPresent(String::from("data-x")),
/// ];
/// let supplied = vec![
///     ("[data-x]", vec!["onClick cancel"]),
///     ("[data-y]", vec!["onClick confirm"]),
///     ("a", vec!["class link"]),
/// ];
/// assert_eq!(
///     select_attributes(&node, &supplied),
///     vec![&"onClick cancel", &"class link"]
/// );
/// ```
#[must_use]
pub fn select_attributes<'a, S, A>(
    selectors: &[Selector],
    supplied: &'a [(S, Vec<A>)],
) -> Vec<&'a A>
where
    S: AsRef<str>,
{
    supplied
        .iter()
        .filter(|(selector, _)| {
            selector
                .as_ref()
                .parse::<Selector>()
                .is_ok_and(|parsed| selectors.contains(&parsed))
        })
        .flat_map(|(_, attributes)| attributes.iter())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expression, Inline, InlineKind};
    use common::span::SourceLocation;
    use rstest::rstest;

    fn attribute(name: &str, value: Option<&str>) -> HtmlAttribute {
        HtmlAttribute {
            name: name.to_owned(),
            value: value.map(|text| vec![AttributeValue::Text(text.to_owned())]),
        }
    }

    fn dynamic(name: &str) -> HtmlAttribute {
        HtmlAttribute {
            name: name.to_owned(),
            value: Some(vec![AttributeValue::Placeable(Expression::Inline(Inline {
                kind: InlineKind::Variable(String::from("v")),
                location: SourceLocation::new(1, 1),
            }))]),
        }
    }

    fn rendered(selectors: &[Selector]) -> Vec<String> {
        selectors.iter().map(ToString::to_string).collect()
    }

    #[rstest]
    #[case("b")]
    #[case(".note")]
    #[case("#intro")]
    #[case("[data-x]")]
    #[case("[lang=\"en\"]")]
    #[case("b.note")]
    #[case("b#intro")]
    #[case("a[data-x]")]
    #[case("a[lang=\"en\"]")]
    fn parses_and_displays_supported_forms(#[case] text: &str) {
        let parsed: Selector = text.parse().unwrap_or_else(|error| panic!("{error}"));
        assert_eq!(parsed.to_string(), text);
    }

    #[rstest]
    #[case("", SelectorError::Empty)]
    #[case("a b", SelectorError::Unsupported(String::from("a b")))]
    #[case("a > b", SelectorError::Unsupported(String::from("a > b")))]
    #[case("[lang=en]", SelectorError::Unsupported(String::from("[lang=en]")))]
    #[case(".", SelectorError::Unsupported(String::from(".")))]
    fn rejects_unsupported_forms(#[case] text: &str, #[case] expected: SelectorError) {
        assert_eq!(text.parse::<Selector>(), Err(expected));
    }

    #[rstest]
    fn valueless_attribute_yields_presence_selectors() {
        let selectors = selectors_for("a", &[attribute("data-x", None)]);
        assert_eq!(rendered(&selectors), vec!["a", "[data-x]", "a[data-x]"]);
    }

    #[rstest]
    fn enumerates_classes_ids_and_values() {
        let selectors = selectors_for(
            "b",
            &[
                attribute("title", Some("T")),
                attribute("class", Some("x  y")),
                attribute("id", Some("main")),
            ],
        );
        assert_eq!(
            rendered(&selectors),
            vec![
                "b",
                ".x",
                "b.x",
                ".y",
                "b.y",
                "#main",
                "b#main",
                "[title]",
                "b[title]",
                "[title=\"T\"]",
                "b[title=\"T\"]",
            ]
        );
    }

    #[rstest]
    fn dynamic_values_yield_presence_only() {
        let selectors = selectors_for("span", &[dynamic("title"), dynamic("class")]);
        assert_eq!(rendered(&selectors), vec!["span", "[title]", "span[title]"]);
    }

    #[rstest]
    fn filter_ignores_unparseable_selectors() {
        let node = vec![Selector::Element(String::from("b"))];
        let supplied = vec![("b >", vec![1]), ("B", vec![2])];
        assert_eq!(select_attributes(&node, &supplied), vec![&2]);
    }
}
