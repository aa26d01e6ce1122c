//! Tolerant markup parser over an expanded pattern.
//!
//! The pattern is flattened into a stream of located characters and
//! placeables first, so inlined term bodies take part in the markup of the
//! message that uses them. Malformed markup is reported and recovered from;
//! the parser never stops early.

use std::mem;

use common::diagnostics::DiagnosticCode;
use common::span::SourceLocation;

use super::{
    AttributeValue, HtmlAttribute, HtmlElement, HtmlNode, HtmlSelect, HtmlVariant, selectors_for,
};
use crate::ast::{Element, Expression, Inline, InlineKind, Pattern};
use crate::resolve::UnitKey;
use crate::sink::Sink;

const VOID_ELEMENTS: [&str; 13] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Reports markup problems on behalf of one message.
pub(super) struct Reporter<'a> {
    owner: &'a str,
    sink: Sink<'a>,
    broken: bool,
}

impl<'a> Reporter<'a> {
    pub(super) const fn new(owner: &'a str, sink: Sink<'a>) -> Self {
        Self {
            owner,
            sink,
            broken: false,
        }
    }

    pub(super) const fn broken(&self) -> bool {
        self.broken
    }

    fn error(&mut self, code: DiagnosticCode, location: SourceLocation, message: String) {
        self.broken = true;
        self.sink.push(
            self.sink
                .at(code, location, message)
                .message_id(self.owner)
                .build(),
        );
    }

    fn structure(&mut self, location: SourceLocation, message: String) {
        self.error(DiagnosticCode::HtmlStructure, location, message);
    }
}

#[derive(Clone, Copy)]
enum Piece<'p> {
    Char(char, SourceLocation),
    Expr(&'p Expression),
}

fn flatten<'p>(pattern: &'p Pattern, pieces: &mut Vec<Piece<'p>>) {
    for element in &pattern.elements {
        match element {
            Element::Text { value, location } => {
                let (mut line, mut column) = (location.line(), location.column());
                for character in value.chars() {
                    pieces.push(Piece::Char(character, SourceLocation::new(line, column)));
                    if character == '\n' {
                        line += 1;
                        column = 1;
                    } else {
                        column += 1;
                    }
                }
            }
            Element::Placeable(Expression::Inline(Inline {
                kind: InlineKind::Inlined(inner),
                ..
            })) => flatten(inner, pieces),
            Element::Placeable(expression) => pieces.push(Piece::Expr(expression)),
        }
    }
}

/// Parses `pattern` into nodes, reporting problems through `reporter`.
pub(super) fn parse_pattern(pattern: &Pattern, reporter: &mut Reporter<'_>) -> Vec<HtmlNode> {
    let mut pieces = Vec::new();
    flatten(pattern, &mut pieces);
    let parser = Parser {
        pieces,
        position: 0,
        reporter,
        builder: Builder::default(),
    };
    parser.document()
}

struct Open {
    tag: String,
    attributes: Vec<HtmlAttribute>,
    location: SourceLocation,
    children: Vec<HtmlNode>,
}

impl Open {
    fn into_element(self) -> HtmlElement {
        let selectors = selectors_for(&self.tag, &self.attributes);
        HtmlElement {
            tag: self.tag,
            attributes: self.attributes,
            children: self.children,
            selectors,
            location: self.location,
        }
    }
}

#[derive(Default)]
struct Builder {
    root: Vec<HtmlNode>,
    stack: Vec<Open>,
    text: String,
}

impl Builder {
    fn children(&mut self) -> &mut Vec<HtmlNode> {
        self.stack
            .last_mut()
            .map_or(&mut self.root, |open| &mut open.children)
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            let text = mem::take(&mut self.text);
            self.children().push(HtmlNode::Text(text));
        }
    }

    fn push(&mut self, node: HtmlNode) {
        self.flush_text();
        self.children().push(node);
    }

    fn open(&mut self, open: Open) {
        self.flush_text();
        self.stack.push(open);
    }

    fn close_top(&mut self) {
        self.flush_text();
        if let Some(open) = self.stack.pop() {
            let element = open.into_element();
            self.children().push(HtmlNode::Element(element));
        }
    }
}

struct Parser<'p, 'r, 'a> {
    pieces: Vec<Piece<'p>>,
    position: usize,
    reporter: &'r mut Reporter<'a>,
    builder: Builder,
}

impl<'p> Parser<'p, '_, '_> {
    fn peek(&self, offset: usize) -> Option<Piece<'p>> {
        self.pieces.get(self.position + offset).copied()
    }

    fn peek_char(&self, offset: usize) -> Option<char> {
        match self.peek(offset) {
            Some(Piece::Char(character, _)) => Some(character),
            _ => None,
        }
    }

    fn document(mut self) -> Vec<HtmlNode> {
        while let Some(piece) = self.peek(0) {
            match piece {
                Piece::Expr(expression) => {
                    self.position += 1;
                    let node = self.content(expression);
                    self.builder.push(node);
                }
                Piece::Char('<', location) => self.markup(location),
                Piece::Char('&', _) => {
                    let decoded = self.reference();
                    self.builder.text.push(decoded);
                }
                Piece::Char(character, _) => {
                    self.position += 1;
                    self.builder.text.push(character);
                }
            }
        }
        self.builder.flush_text();
        while let Some(open) = self.builder.stack.last() {
            let message = format!("`<{}>` is never closed", open.tag);
            let location = open.location;
            self.reporter.structure(location, message);
            self.builder.close_top();
        }
        self.builder.root
    }

    fn content(&mut self, expression: &Expression) -> HtmlNode {
        match expression {
            Expression::Select(select) => HtmlNode::Select(HtmlSelect {
                selector: select.selector.clone(),
                variants: select
                    .variants
                    .iter()
                    .map(|variant| HtmlVariant {
                        key: variant.key.clone(),
                        default: variant.default,
                        children: parse_pattern(&variant.value, self.reporter),
                    })
                    .collect(),
            }),
            Expression::Inline(_) => HtmlNode::Placeable(expression.clone()),
        }
    }

    fn markup(&mut self, location: SourceLocation) {
        match self.peek(1) {
            Some(Piece::Char(character, _)) if character.is_ascii_alphabetic() => {
                self.start_tag(location);
            }
            Some(Piece::Char('/', _)) => self.end_tag(location),
            Some(Piece::Char('!', _))
                if self.peek_char(2) == Some('-') && self.peek_char(3) == Some('-') =>
            {
                self.comment(location);
            }
            Some(Piece::Expr(_)) => {
                self.reporter.structure(
                    location,
                    String::from("element names cannot contain placeables"),
                );
                self.position += 1;
            }
            _ => {
                self.position += 1;
                self.builder.text.push('<');
            }
        }
    }

    fn name(&mut self) -> String {
        let mut name = String::new();
        while let Some(character) = self.peek_char(0) {
            if !(character.is_ascii_alphanumeric() || character == '-') {
                break;
            }
            name.push(character.to_ascii_lowercase());
            self.position += 1;
        }
        name
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char(0).is_some_and(char::is_whitespace) {
            self.position += 1;
        }
    }

    fn start_tag(&mut self, location: SourceLocation) {
        self.position += 1;
        let tag = self.name();
        let mut attributes: Vec<HtmlAttribute> = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek(0) {
                None => {
                    self.reporter
                        .structure(location, format!("`<{tag}` is not terminated"));
                    return;
                }
                Some(Piece::Char('>', _)) => {
                    self.position += 1;
                    let open = Open {
                        tag,
                        attributes,
                        location,
                        children: Vec::new(),
                    };
                    if VOID_ELEMENTS.contains(&open.tag.as_str()) {
                        self.builder.push(HtmlNode::Element(open.into_element()));
                    } else {
                        self.builder.open(open);
                    }
                    return;
                }
                Some(Piece::Char('/', _)) if self.peek_char(1) == Some('>') => {
                    self.position += 2;
                    let open = Open {
                        tag,
                        attributes,
                        location,
                        children: Vec::new(),
                    };
                    self.builder.push(HtmlNode::Element(open.into_element()));
                    return;
                }
                Some(Piece::Expr(expression)) => {
                    self.reporter.structure(
                        expression.location(),
                        format!("placeables are not allowed inside the `<{tag}>` tag"),
                    );
                    self.position += 1;
                }
                Some(Piece::Char(character, at)) if matches!(character, '/' | '=' | '"' | '\'') => {
                    self.reporter.structure(
                        at,
                        format!("unexpected `{character}` inside the `<{tag}>` tag"),
                    );
                    self.position += 1;
                }
                Some(Piece::Char(_, at)) => {
                    let Some(attribute) = self.attribute(&tag, location) else {
                        return;
                    };
                    if attributes.iter().any(|seen| seen.name == attribute.name) {
                        self.reporter.structure(
                            at,
                            format!(
                                "attribute `{}` appears more than once on `<{tag}>`",
                                attribute.name
                            ),
                        );
                    } else {
                        attributes.push(attribute);
                    }
                }
            }
        }
    }

    /// Reads one attribute, or returns `None` when the tag runs off the end.
    fn attribute(&mut self, tag: &str, tag_location: SourceLocation) -> Option<HtmlAttribute> {
        let mut name = String::new();
        while let Some(character) = self.peek_char(0) {
            if character.is_whitespace() || matches!(character, '=' | '>' | '/' | '"' | '\'') {
                break;
            }
            name.push(character.to_ascii_lowercase());
            self.position += 1;
        }
        self.skip_whitespace();
        if self.peek_char(0) != Some('=') {
            return Some(HtmlAttribute { name, value: None });
        }
        self.position += 1;
        self.skip_whitespace();

        let mut parts = Vec::new();
        match self.peek_char(0) {
            Some(quote @ ('"' | '\'')) => {
                self.position += 1;
                loop {
                    match self.peek(0) {
                        None => {
                            self.reporter.structure(
                                tag_location,
                                format!("the value of `{name}` on `<{tag}>` is not terminated"),
                            );
                            return None;
                        }
                        Some(Piece::Char(character, _)) if character == quote => {
                            self.position += 1;
                            break;
                        }
                        Some(piece) => self.value_piece(piece, &mut parts),
                    }
                }
            }
            _ => {
                while let Some(piece) = self.peek(0) {
                    let ends_value = matches!(
                        piece,
                        Piece::Char(character, _) if character.is_whitespace() || character == '>'
                    );
                    if ends_value {
                        break;
                    }
                    self.value_piece(piece, &mut parts);
                }
            }
        }
        Some(HtmlAttribute {
            name,
            value: Some(parts),
        })
    }

    fn value_piece(&mut self, piece: Piece<'p>, parts: &mut Vec<AttributeValue>) {
        let character = match piece {
            Piece::Expr(expression) => {
                self.position += 1;
                self.check_attribute_expression(expression);
                parts.push(AttributeValue::Placeable(expression.clone()));
                return;
            }
            Piece::Char('&', _) => self.reference(),
            Piece::Char(character, _) => {
                self.position += 1;
                character
            }
        };
        if let Some(AttributeValue::Text(text)) = parts.last_mut() {
            text.push(character);
        } else {
            parts.push(AttributeValue::Text(character.to_string()));
        }
    }

    fn check_attribute_expression(&mut self, expression: &Expression) {
        match expression {
            Expression::Inline(inline) => self.check_attribute_inline(inline),
            Expression::Select(select) => {
                self.check_attribute_inline(&select.selector);
                for variant in &select.variants {
                    self.check_attribute_pattern(&variant.value);
                }
            }
        }
    }

    fn check_attribute_pattern(&mut self, pattern: &Pattern) {
        for element in &pattern.elements {
            if let Element::Placeable(expression) = element {
                self.check_attribute_expression(expression);
            }
        }
    }

    fn check_attribute_inline(&mut self, inline: &Inline) {
        match &inline.kind {
            InlineKind::Message { id, attribute }
                if UnitKey::message(id, attribute.as_deref()).is_html() =>
            {
                self.reporter.error(
                    DiagnosticCode::HtmlTypeMismatch,
                    inline.location,
                    format!("cannot use HTML message `{id}` inside an attribute value"),
                );
            }
            InlineKind::Function { arguments, .. } | InlineKind::Term {
                arguments: Some(arguments),
                ..
            } => {
                for argument in &arguments.positional {
                    self.check_attribute_inline(argument);
                }
                for argument in &arguments.named {
                    self.check_attribute_inline(&argument.value);
                }
            }
            InlineKind::Nested(expression) => self.check_attribute_expression(expression),
            InlineKind::Inlined(pattern) => self.check_attribute_pattern(pattern),
            _ => {}
        }
    }

    fn end_tag(&mut self, location: SourceLocation) {
        self.position += 2;
        let tag = self.name();
        self.skip_whitespace();
        if self.peek_char(0) == Some('>') {
            self.position += 1;
        } else {
            self.reporter
                .structure(location, format!("`</{tag}` is not terminated"));
            while let Some(piece) = self.peek(0) {
                self.position += 1;
                if matches!(piece, Piece::Char('>', _)) {
                    break;
                }
            }
        }

        let Some(index) = self.builder.stack.iter().rposition(|open| open.tag == tag) else {
            self.reporter
                .structure(location, format!("`</{tag}>` has no matching start tag"));
            return;
        };
        while self.builder.stack.len() > index + 1 {
            if let Some(open) = self.builder.stack.last() {
                let message = format!(
                    "`<{}>` is closed by `</{tag}>` before its own end tag",
                    open.tag
                );
                let at = open.location;
                self.reporter.structure(at, message);
            }
            self.builder.close_top();
        }
        self.builder.close_top();
    }

    fn comment(&mut self, location: SourceLocation) {
        self.position += 4;
        while self.position < self.pieces.len() {
            if self.peek_char(0) == Some('-')
                && self.peek_char(1) == Some('-')
                && self.peek_char(2) == Some('>')
            {
                self.position += 3;
                return;
            }
            self.position += 1;
        }
        self.reporter
            .structure(location, String::from("comment is not terminated"));
    }

    /// Decodes a character reference at `&`, or yields `&` itself.
    fn reference(&mut self) -> char {
        let mut name = String::new();
        for offset in 1..=32 {
            match self.peek_char(offset) {
                Some(';') => {
                    if let Some(decoded) = decode_reference(&name) {
                        self.position += offset + 1;
                        return decoded;
                    }
                    break;
                }
                Some(character) if character.is_ascii_alphanumeric() || character == '#' => {
                    name.push(character);
                }
                _ => break,
            }
        }
        self.position += 1;
        '&'
    }
}

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::decode_reference;
    use rstest::rstest;

    #[rstest]
    #[case("amp", Some('&'))]
    #[case("#39", Some('\''))]
    #[case("#x2014", Some('\u{2014}'))]
    #[case("#xD800", None)]
    #[case("copy", None)]
    fn decodes_references(#[case] name: &str, #[case] expected: Option<char>) {
        assert_eq!(decode_reference(name), expected);
    }
}
