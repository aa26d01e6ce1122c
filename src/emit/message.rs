//! Lowering of one message body into an Elm function.

use std::collections::HashMap;

use crate::assemble::{Body, CanonicalMessage};
use crate::ast::{Element, Expression, Inline, InlineKind, Pattern, VariantKey, normalise_number};
use crate::html::{AttributeValue, HtmlAttribute, HtmlElement, HtmlNode};
use crate::infer::{ArgumentType, Builtin, FormatOption, OptionValue, Signature, check_call};
use crate::naming::{field_name, function_name};
use crate::resolve::UnitKey;

use super::EmitOptions;
use super::elm::{Expr, Function, Import, Imports, is_integer, quote};

const FSI: &str = "\u{2068}";
const PDI: &str = "\u{2069}";

const LOCALE: &str = "locale_";
const ARGS: &str = "args_";
const ATTRS: &str = "attrs_";

/// Elements `elm/html` exposes as functions of the same name.
const ELEMENTS: &[&str] = &[
    "a", "abbr", "address", "article", "aside", "audio", "b", "bdi", "bdo", "blockquote", "br",
    "button", "canvas", "caption", "cite", "code", "col", "colgroup", "datalist", "dd", "del",
    "details", "dfn", "div", "dl", "dt", "em", "embed", "fieldset", "figcaption", "figure",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "i", "iframe", "img",
    "input", "ins", "kbd", "label", "legend", "li", "mark", "menu", "menuitem", "meter", "nav",
    "object", "ol", "optgroup", "option", "output", "p", "param", "pre", "progress", "q", "rp",
    "rt", "ruby", "s", "samp", "section", "select", "small", "source", "span", "strong", "sub",
    "summary", "sup", "table", "tbody", "td", "textarea", "tfoot", "th", "thead", "time", "tr",
    "track", "u", "ul", "var", "video", "wbr",
];

/// Attributes `Html.Attributes` exposes as functions of the same name.
const ATTRIBUTES: &[&str] = &[
    "accept", "action", "align", "alt", "challenge", "charset", "cite", "class", "content",
    "contextmenu", "coords", "datetime", "dir", "draggable", "dropzone", "enctype", "for", "form",
    "formaction", "headers", "href", "hreflang", "id", "itemprop", "keytype", "kind", "lang",
    "language", "list", "manifest", "max", "media", "method", "min", "name", "pattern", "ping",
    "placeholder", "poster", "preload", "pubdate", "rel", "sandbox", "scope", "shape", "src",
    "srcdoc", "srclang", "step", "target", "title", "usemap", "value", "wrap",
];

/// Parameter names of a message function.
pub(super) fn params(html: bool) -> Vec<String> {
    let mut params = vec![LOCALE.to_owned(), ARGS.to_owned()];
    if html {
        params.push(ATTRS.to_owned());
    }
    params
}

/// Call arguments forwarding a function's own parameters.
pub(super) fn forwarded(html: bool) -> Vec<Expr> {
    params(html).into_iter().map(Expr::Raw).collect()
}

/// The type annotation shared by a message's locale functions and its
/// dispatcher.
pub(super) fn annotation(message: &CanonicalMessage, imports: &mut Imports) -> String {
    imports.add(Import::Locale);
    let record = record_type(&message.signature, imports);
    if message.html {
        imports.add(Import::Html);
        format!(
            "Locale.Locale -> {record} -> List ( String, List (Html.Attribute msg) ) \
             -> List (Html.Html msg)"
        )
    } else {
        format!("Locale.Locale -> {record} -> String")
    }
}

fn record_type(signature: &Signature, imports: &mut Imports) -> String {
    if signature.is_empty() {
        return String::from("a");
    }
    let mut fields: Vec<(String, &'static str)> = signature
        .fields()
        .map(|(name, field)| {
            let ty = match field.ty {
                ArgumentType::Number => {
                    imports.add(Import::Fluent);
                    "Fluent.FluentNumber number"
                }
                ArgumentType::Date => {
                    imports.add(Import::Fluent);
                    "Fluent.FluentDate"
                }
                ArgumentType::String | ArgumentType::Unknown => "String",
            };
            (field_name(name), ty)
        })
        .collect();
    fields.sort();
    let rendered: Vec<String> = fields
        .into_iter()
        .map(|(name, ty)| format!("{name} : {ty}"))
        .collect();
    format!("{{ a | {} }}", rendered.join(", "))
}

/// Builds the function implementing `message` with `body`.
pub(super) fn lower(
    message: &CanonicalMessage,
    body: &Body,
    options: &EmitOptions,
    imports: &mut Imports,
) -> Function {
    let annotation = annotation(message, imports);
    let mut builder = Builder {
        signature: &message.signature,
        options,
        imports,
        bindings: Vec::new(),
        counters: HashMap::new(),
    };
    let lowered = match body {
        Body::Text(pattern) => builder.pattern(pattern),
        Body::Html(fragment) => builder.nodes(&fragment.children),
    };
    Function {
        name: message.function.clone(),
        annotation,
        params: params(message.html),
        body: builder.finish(lowered),
    }
}

/// String pieces merged as they are collected.
#[derive(Default)]
struct Parts(Vec<Expr>);

impl Parts {
    fn text(&mut self, value: &str) {
        if value.is_empty() {
            return;
        }
        if let Some(Expr::Str(last)) = self.0.last_mut() {
            last.push_str(value);
        } else {
            self.0.push(Expr::string(value));
        }
    }

    fn push(&mut self, expr: Expr) {
        match expr {
            Expr::Str(text) => self.text(&text),
            other => self.0.push(other),
        }
    }

    fn extend(&mut self, other: Self) {
        for expr in other.0 {
            self.push(expr);
        }
    }

    fn concat(mut self) -> Expr {
        match self.0.len() {
            0 => Expr::string(""),
            1 => self.0.remove(0),
            _ => Expr::call("String.concat", [Expr::List(self.0)]),
        }
    }
}

/// Node lists joined with `List.concat` around spliced sub-lists.
#[derive(Default)]
struct Nodes {
    chunks: Vec<Expr>,
    pending: Vec<Expr>,
}

impl Nodes {
    fn node(&mut self, node: Expr) {
        self.pending.push(node);
    }

    fn splice(&mut self, list: Expr) {
        if !self.pending.is_empty() {
            self.chunks.push(Expr::List(std::mem::take(&mut self.pending)));
        }
        self.chunks.push(list);
    }

    fn finish(mut self) -> Expr {
        if self.chunks.is_empty() {
            return Expr::List(self.pending);
        }
        if !self.pending.is_empty() {
            self.chunks.push(Expr::List(self.pending));
        }
        if self.chunks.len() == 1 {
            return self.chunks.remove(0);
        }
        Expr::call("List.concat", [Expr::List(self.chunks)])
    }
}

/// A number on its way to being formatted.
enum Numeric {
    /// A bare literal.
    Literal(String),
    /// An expression of type `Fluent.FluentNumber`.
    Fluent(Expr),
}

struct Builder<'a> {
    signature: &'a Signature,
    options: &'a EmitOptions,
    imports: &'a mut Imports,
    bindings: Vec<(String, Expr)>,
    counters: HashMap<&'static str, usize>,
}

impl Builder<'_> {
    fn finish(self, body: Expr) -> Expr {
        if self.bindings.is_empty() {
            body
        } else {
            Expr::Let {
                bindings: self.bindings,
                body: Box::new(body),
            }
        }
    }

    /// Hoists `value` into the function's `let` under a name no other binding
    /// uses, since Elm forbids shadowing.
    fn bind(&mut self, base: &'static str, value: Expr) -> Expr {
        let count = self.counters.entry(base).or_insert(0);
        *count += 1;
        let name = if *count == 1 {
            format!("{base}_")
        } else {
            format!("{base}{count}_")
        };
        self.bindings.push((name.clone(), value));
        Expr::Raw(name)
    }

    fn argument(name: &str) -> Expr {
        Expr::raw(format!("{ARGS}.{}", field_name(name)))
    }

    fn pattern(&mut self, pattern: &Pattern) -> Expr {
        self.pattern_parts(pattern).concat()
    }

    fn pattern_parts(&mut self, pattern: &Pattern) -> Parts {
        let isolate = self.options.use_isolating && pattern.elements.len() > 1;
        let mut parts = Parts::default();
        for element in &pattern.elements {
            match element {
                Element::Text { value, .. } => parts.text(value),
                Element::Placeable(expression) => {
                    if isolate {
                        parts.text(FSI);
                    }
                    self.expression_parts(expression, &mut parts);
                    if isolate {
                        parts.text(PDI);
                    }
                }
            }
        }
        parts
    }

    fn expression_parts(&mut self, expression: &Expression, parts: &mut Parts) {
        match expression {
            Expression::Inline(Inline {
                kind: InlineKind::Inlined(pattern),
                ..
            }) => parts.extend(self.pattern_parts(pattern)),
            Expression::Inline(inline) => {
                let text = self.text(inline);
                parts.push(text);
            }
            Expression::Select(select) => {
                let text = self.select(
                    &select.selector,
                    &select.variants,
                    |variant| (&variant.key, variant.default),
                    |builder, variant| builder.pattern(&variant.value),
                );
                parts.push(text);
            }
        }
    }

    /// Renders an inline expression as a `String`.
    fn text(&mut self, inline: &Inline) -> Expr {
        match &inline.kind {
            InlineKind::String(value) => Expr::string(value.as_str()),
            InlineKind::Number(raw) => self.format_number(Numeric::Literal(raw.clone())),
            InlineKind::Variable(name) => match self.signature.type_of(name) {
                Some(ArgumentType::Number) => {
                    self.format_number(Numeric::Fluent(Self::argument(name)))
                }
                Some(ArgumentType::Date) => self.format_date(Self::argument(name)),
                _ => Self::argument(name),
            },
            InlineKind::Message { id, attribute } => Expr::call(
                function_name(id, attribute.as_deref()),
                forwarded(false),
            ),
            InlineKind::Function { name, arguments } => {
                let Ok(call) = check_call(name, arguments, inline.location) else {
                    return Expr::string("");
                };
                match call.builtin {
                    Builtin::Number => {
                        let number = self.number(call.argument, &call.options);
                        self.format_number(number)
                    }
                    Builtin::DateTime => {
                        let date = self.date(call.argument, &call.options);
                        self.format_date(date)
                    }
                }
            }
            InlineKind::Nested(expression) => {
                let mut parts = Parts::default();
                self.expression_parts(expression, &mut parts);
                parts.concat()
            }
            InlineKind::Inlined(pattern) => self.pattern(pattern),
            // Expansion replaces terms, and units with invalid references are
            // never emitted.
            InlineKind::Term { .. } | InlineKind::Invalid => Expr::string(""),
        }
    }

    fn format_number(&mut self, number: Numeric) -> Expr {
        match number {
            Numeric::Literal(raw) => {
                self.imports.add(Import::NumberFormat);
                Expr::call(
                    "NumberFormat.format",
                    [
                        Expr::call("NumberFormat.fromLocale", [Expr::raw(LOCALE)]),
                        Expr::Number(raw),
                    ],
                )
            }
            Numeric::Fluent(value) => {
                self.imports.add(Import::Fluent);
                Expr::call("Fluent.formatNumber", [Expr::raw(LOCALE), value])
            }
        }
    }

    fn format_date(&mut self, date: Expr) -> Expr {
        self.imports.add(Import::Fluent);
        Expr::call("Fluent.formatDate", [Expr::raw(LOCALE), date])
    }

    /// Resolves the argument of a `NUMBER` call, applying `options`.
    fn number(&mut self, argument: &Inline, options: &[FormatOption]) -> Numeric {
        let base = match &argument.kind {
            InlineKind::Variable(name) => Numeric::Fluent(Self::argument(name)),
            InlineKind::Number(raw) => Numeric::Literal(raw.clone()),
            InlineKind::Function { name, arguments } => {
                match check_call(name, arguments, argument.location) {
                    Ok(inner) => self.number(inner.argument, &inner.options),
                    Err(_) => Numeric::Literal(String::from("0")),
                }
            }
            _ => Numeric::Literal(String::from("0")),
        };
        if options.is_empty() {
            return base;
        }
        self.imports.add(Import::Fluent);
        let fields = self.option_fields(options, "NumberFormat");
        let formatted = match base {
            Numeric::Literal(raw) => {
                self.imports.add(Import::NumberFormat);
                let defaults = self.bind("defaults", Expr::raw("NumberFormat.defaults"));
                Expr::call(
                    "Fluent.formattedNumber",
                    [Self::update(&defaults, fields), Expr::Number(raw)],
                )
            }
            Numeric::Fluent(value) => {
                let initial = self.bind(
                    "initial_opts",
                    Expr::call("Fluent.numberFormattingOptions", [value.clone()]),
                );
                Expr::call(
                    "Fluent.reformattedNumber",
                    [Self::update(&initial, fields), value],
                )
            }
        };
        Numeric::Fluent(self.bind("fnum", formatted))
    }

    /// Resolves the argument of a `DATETIME` call, applying `options`.
    fn date(&mut self, argument: &Inline, options: &[FormatOption]) -> Expr {
        let base = match &argument.kind {
            InlineKind::Function { name, arguments } => {
                match check_call(name, arguments, argument.location) {
                    Ok(inner) => self.date(inner.argument, &inner.options),
                    Err(_) => Expr::raw(ARGS),
                }
            }
            InlineKind::Variable(name) => Self::argument(name),
            _ => Expr::raw(ARGS),
        };
        if options.is_empty() {
            return base;
        }
        self.imports.add(Import::Fluent);
        let fields = self.option_fields(options, "DateTimeFormat");
        let initial = self.bind(
            "initial_opts",
            Expr::call("Fluent.dateFormattingOptions", [base.clone()]),
        );
        self.bind(
            "fdate",
            Expr::call("Fluent.reformattedDate", [Self::update(&initial, fields), base]),
        )
    }

    fn update(base: &Expr, fields: Vec<(String, Expr)>) -> Expr {
        let record = match base {
            Expr::Raw(name) => Some(name.clone()),
            _ => None,
        };
        Expr::Record {
            base: record,
            fields,
        }
    }

    /// Record fields for `options`, with the locale, sorted by name.
    fn option_fields(&mut self, options: &[FormatOption], module: &str) -> Vec<(String, Expr)> {
        let mut fields = vec![(String::from("locale"), Expr::raw(LOCALE))];
        for option in options {
            let value = match &option.value {
                OptionValue::Int(raw) => Expr::Number(raw.clone()),
                OptionValue::Bool(flag) => Expr::raw(if *flag { "True" } else { "False" }),
                OptionValue::Constructor(name) => {
                    self.imports.add(if module == "NumberFormat" {
                        Import::NumberFormat
                    } else {
                        Import::DateTimeFormat
                    });
                    Expr::raw(format!("{module}.{name}"))
                }
            };
            let field = if option.optional {
                Expr::call("Just", [value])
            } else {
                value
            };
            fields.retain(|(name, _)| name != option.name);
            fields.push((option.name.to_owned(), field));
        }
        fields.sort_by(|left, right| left.0.cmp(&right.0));
        fields
    }

    /// Renders a selector as an Elm `number`.
    fn number_value(&mut self, selector: &Inline) -> Expr {
        match &selector.kind {
            InlineKind::Number(raw) => Expr::Number(raw.clone()),
            InlineKind::Nested(expression) => match expression.as_ref() {
                Expression::Inline(inner) => self.number_value(inner),
                Expression::Select(_) => Expr::Number(String::from("0")),
            },
            _ => {
                let number = match &selector.kind {
                    InlineKind::Function { name, arguments } => {
                        match check_call(name, arguments, selector.location) {
                            Ok(call) => self.number(call.argument, &call.options),
                            Err(_) => Numeric::Literal(String::from("0")),
                        }
                    }
                    InlineKind::Variable(name) => Numeric::Fluent(Self::argument(name)),
                    _ => Numeric::Literal(String::from("0")),
                };
                match number {
                    Numeric::Literal(raw) => Expr::Number(raw),
                    Numeric::Fluent(value) => {
                        self.imports.add(Import::Fluent);
                        Expr::call("Fluent.numberValue", [value])
                    }
                }
            }
        }
    }

    fn plural_category(&mut self, number: Expr) -> Expr {
        self.imports.add(Import::PluralRules);
        Expr::call(
            "PluralRules.select",
            [
                Expr::call("PluralRules.fromLocale", [Expr::raw(LOCALE)]),
                number,
            ],
        )
    }

    /// Builds the runtime match for a select expression.
    ///
    /// String keys compile to a `case` over the selector. Numeric keys and
    /// plural categories compile to a `case` when only one kind is present,
    /// and otherwise to an `if` chain that tests numeric keys first. The
    /// default variant is always the final branch.
    fn select<V>(
        &mut self,
        selector: &Inline,
        variants: &[V],
        key: impl Fn(&V) -> (&VariantKey, bool),
        mut branch: impl FnMut(&mut Self, &V) -> Expr,
    ) -> Expr {
        let numeric = variants
            .iter()
            .any(|variant| matches!(key(variant).0, VariantKey::Number(_)));
        let plural = variants
            .iter()
            .all(|variant| key(variant).0.is_plural_category());

        if !numeric && !plural {
            let subject = self.text(selector);
            let mut branches = Vec::new();
            let mut otherwise = None;
            for variant in variants {
                let (variant_key, default) = key(variant);
                let value = branch(self, variant);
                if default {
                    otherwise = Some(value);
                } else {
                    branches.push((quote(variant_key.as_str()), value));
                }
            }
            return Self::case(subject, branches, otherwise);
        }

        let tested = |wanted: fn(&VariantKey) -> bool| {
            variants.iter().any(|variant| {
                let (variant_key, default) = key(variant);
                !default && wanted(variant_key)
            })
        };
        let has_numbers = tested(|variant_key| matches!(variant_key, VariantKey::Number(_)));
        let has_categories = tested(VariantKey::is_plural_category);

        let mut number = self.number_value(selector);
        if has_numbers && has_categories && !matches!(number, Expr::Number(_)) {
            number = self.bind("val", number);
        }
        let plural = has_categories.then(|| self.plural_category(number.clone()));
        let category = match plural {
            Some(expr) if has_numbers => Some(self.bind("pl", expr)),
            other => other,
        };

        let mut numbers: Vec<(String, Expr)> = Vec::new();
        let mut categories: Vec<(String, Expr)> = Vec::new();
        let mut otherwise = None;
        for variant in variants {
            let (variant_key, default) = key(variant);
            let value = branch(self, variant);
            if default {
                otherwise = Some(value);
                continue;
            }
            match variant_key {
                VariantKey::Number(raw) => numbers.push((normalise_number(raw), value)),
                VariantKey::Identifier(name) if variant_key.is_plural_category() => {
                    categories.push((name.clone(), value));
                }
                // Plain strings never match a number.
                VariantKey::Identifier(_) => {}
            }
        }
        match category {
            Some(subject) if numbers.is_empty() => {
                let branches = categories
                    .into_iter()
                    .map(|(name, value)| (quote(&name), value))
                    .collect();
                Self::case(subject, branches, otherwise)
            }
            None if numbers.iter().all(|(raw, _)| is_integer(raw)) => {
                Self::case(number, numbers, otherwise)
            }
            mixed => {
                let mut branches: Vec<(Expr, Expr)> = numbers
                    .into_iter()
                    .map(|(raw, value)| {
                        (
                            Expr::Equals(Box::new(number.clone()), Box::new(Expr::Number(raw))),
                            value,
                        )
                    })
                    .collect();
                if let Some(subject) = mixed {
                    branches.extend(categories.into_iter().map(|(name, value)| {
                        (
                            Expr::Equals(Box::new(subject.clone()), Box::new(Expr::string(name))),
                            value,
                        )
                    }));
                }
                let fallback = otherwise
                    .or_else(|| branches.pop().map(|(_, last)| last))
                    .unwrap_or_else(|| Expr::string(""));
                Expr::If {
                    branches,
                    otherwise: Box::new(fallback),
                }
            }
        }
    }

    fn case(subject: Expr, mut branches: Vec<(String, Expr)>, otherwise: Option<Expr>) -> Expr {
        if branches.is_empty() {
            return otherwise.unwrap_or_else(|| Expr::string(""));
        }
        let Some(fallback) = otherwise.or_else(|| branches.pop().map(|(_, last)| last)) else {
            return Expr::string("");
        };
        branches.push((String::from("_"), fallback));
        Expr::Case {
            subject: Box::new(subject),
            branches,
        }
    }

    /// Renders nodes as an Elm `List (Html.Html msg)`.
    fn nodes(&mut self, nodes: &[HtmlNode]) -> Expr {
        let mut list = Nodes::default();
        for node in nodes {
            match node {
                HtmlNode::Text(text) => list.node(Self::html_text(Expr::string(text.as_str()))),
                HtmlNode::Placeable(expression) => self.html_placeable(expression, &mut list),
                HtmlNode::Element(element) => {
                    let element = self.element(element);
                    list.node(element);
                }
                HtmlNode::Select(select) => {
                    let spliced = self.select(
                        &select.selector,
                        &select.variants,
                        |variant| (&variant.key, variant.default),
                        |builder, variant| builder.nodes(&variant.children),
                    );
                    list.splice(spliced);
                }
            }
        }
        list.finish()
    }

    fn html_text(text: Expr) -> Expr {
        Expr::call("Html.text", [text])
    }

    fn html_placeable(&mut self, expression: &Expression, list: &mut Nodes) {
        match expression {
            Expression::Inline(Inline {
                kind: InlineKind::Message { id, attribute },
                ..
            }) if UnitKey::message(id, attribute.as_deref()).is_html() => {
                list.splice(Expr::call(
                    function_name(id, attribute.as_deref()),
                    forwarded(true),
                ));
            }
            Expression::Inline(Inline {
                kind: InlineKind::Nested(inner),
                ..
            }) => self.html_placeable(inner, list),
            other => {
                let mut parts = Parts::default();
                self.expression_parts(other, &mut parts);
                list.node(Self::html_text(parts.concat()));
            }
        }
    }

    fn element(&mut self, element: &HtmlElement) -> Expr {
        self.imports.add(Import::Html);
        let mut attributes: Vec<&HtmlAttribute> = element.attributes.iter().collect();
        attributes.sort_by(|left, right| left.name.cmp(&right.name));
        let statics: Vec<Expr> = attributes
            .into_iter()
            .map(|attribute| self.attribute(attribute))
            .collect();

        let attribute_list = if self.options.dynamic_html_attributes {
            self.imports.add(Import::Fluent);
            let selectors = element
                .selectors
                .iter()
                .map(|selector| Expr::string(selector.to_string()))
                .collect();
            let dynamic = Expr::call(
                "Fluent.selectAttributes",
                [Expr::raw(ATTRS), Expr::List(selectors)],
            );
            if statics.is_empty() {
                dynamic
            } else {
                Expr::call("List.concat", [Expr::List(vec![Expr::List(statics), dynamic])])
            }
        } else {
            Expr::List(statics)
        };

        let children = self.nodes(&element.children);
        if ELEMENTS.contains(&element.tag.as_str()) {
            Expr::call(format!("Html.{}", element.tag), [attribute_list, children])
        } else {
            Expr::call(
                "Html.node",
                [Expr::string(element.tag.as_str()), attribute_list, children],
            )
        }
    }

    fn attribute(&mut self, attribute: &HtmlAttribute) -> Expr {
        self.imports.add(Import::HtmlAttributes);
        let mut parts = Parts::default();
        for part in attribute.value.iter().flatten() {
            match part {
                AttributeValue::Text(text) => parts.text(text),
                AttributeValue::Placeable(expression) => {
                    self.expression_parts(expression, &mut parts);
                }
            }
        }
        let value = parts.concat();
        if ATTRIBUTES.contains(&attribute.name.as_str()) {
            Expr::call(format!("Attributes.{}", attribute.name), [value])
        } else {
            Expr::call(
                "Attributes.attribute",
                [Expr::string(attribute.name.as_str()), value],
            )
        }
    }
}
