//! A small Elm expression tree and its line-based layout.
//!
//! The layout follows `elm-format` closely enough that generated modules are
//! stable under reformatting: multi-line lists open with `[ ` and continue
//! with `, `, `case` branches are separated by blank lines, and multi-line
//! arguments are parenthesised on their own lines.

use std::collections::BTreeSet;

use crate::ast::normalise_number;

const LIST_WIDTH: usize = 80;

/// An Elm expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A string literal, escaped on output.
    Str(String),
    /// An identifier, constructor, or other atom written verbatim.
    Raw(String),
    /// A numeric literal as written in Fluent.
    Number(String),
    /// A function applied to arguments.
    Call(String, Vec<Expr>),
    /// A list literal.
    List(Vec<Expr>),
    /// A record literal or record update.
    Record {
        /// The updated record, if any.
        base: Option<String>,
        /// Fields in output order.
        fields: Vec<(String, Expr)>,
    },
    /// `left == right`.
    Equals(Box<Expr>, Box<Expr>),
    /// A `case` expression; patterns are written verbatim.
    Case {
        /// The scrutinee.
        subject: Box<Expr>,
        /// Pattern and body pairs.
        branches: Vec<(String, Expr)>,
    },
    /// An `if` chain.
    If {
        /// Condition and body pairs.
        branches: Vec<(Expr, Expr)>,
        /// The final `else` body.
        otherwise: Box<Expr>,
    },
    /// A `let` block.
    Let {
        /// Bindings in output order.
        bindings: Vec<(String, Expr)>,
        /// The `in` body.
        body: Box<Expr>,
    },
}

impl Expr {
    /// Applies `head` to `args`.
    #[must_use]
    pub fn call(head: impl Into<String>, args: impl IntoIterator<Item = Self>) -> Self {
        Self::Call(head.into(), args.into_iter().collect())
    }

    /// An atom written verbatim.
    #[must_use]
    pub fn raw(text: impl Into<String>) -> Self {
        Self::Raw(text.into())
    }

    /// A string literal.
    #[must_use]
    pub fn string(text: impl Into<String>) -> Self {
        Self::Str(text.into())
    }

    /// Renders the expression as lines without leading indentation.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        match self {
            Self::Str(text) => vec![quote(text)],
            Self::Raw(text) => vec![text.clone()],
            Self::Number(raw) => vec![number_literal(raw)],
            Self::Call(head, args) => call_lines(head, args),
            Self::List(items) => list_lines(items),
            Self::Record { base, fields } => record_lines(base.as_deref(), fields),
            Self::Equals(left, right) => {
                let left = left.argument_lines().join(" ");
                let right = right.argument_lines().join(" ");
                vec![format!("{left} == {right}")]
            }
            Self::Case { subject, branches } => case_lines(subject, branches),
            Self::If {
                branches,
                otherwise,
            } => if_lines(branches, otherwise),
            Self::Let { bindings, body } => let_lines(bindings, body),
        }
    }

    const fn is_block(&self) -> bool {
        matches!(self, Self::Case { .. } | Self::If { .. } | Self::Let { .. })
    }

    fn needs_parens(&self) -> bool {
        match self {
            Self::Call(_, args) => !args.is_empty(),
            Self::Equals(..) => true,
            other => other.is_block(),
        }
    }

    fn argument_lines(&self) -> Vec<String> {
        let lines = self.lines();
        if self.needs_parens() {
            parenthesise(lines)
        } else {
            lines
        }
    }

    fn item_lines(&self) -> Vec<String> {
        let lines = self.lines();
        if self.is_block() {
            parenthesise(lines)
        } else {
            lines
        }
    }
}

fn parenthesise(mut lines: Vec<String>) -> Vec<String> {
    if let [single] = lines.as_mut_slice() {
        *single = format!("({single})");
    } else if let Some(first) = lines.first_mut() {
        first.insert(0, '(');
        lines.push(String::from(")"));
    }
    lines
}

fn indent(lines: Vec<String>, width: usize) -> impl Iterator<Item = String> {
    let pad = " ".repeat(width);
    lines.into_iter().map(move |line| {
        if line.is_empty() {
            line
        } else {
            format!("{pad}{line}")
        }
    })
}

fn single_line(rendered: &[Vec<String>]) -> Option<Vec<&str>> {
    rendered
        .iter()
        .map(|lines| match lines.as_slice() {
            [line] => Some(line.as_str()),
            _ => None,
        })
        .collect()
}

fn call_lines(head: &str, args: &[Expr]) -> Vec<String> {
    let rendered: Vec<Vec<String>> = args.iter().map(Expr::argument_lines).collect();
    if let Some(parts) = single_line(&rendered) {
        let mut line = head.to_owned();
        for part in parts {
            line.push(' ');
            line.push_str(part);
        }
        return vec![line];
    }
    let mut lines = vec![head.to_owned()];
    for arg in rendered {
        lines.extend(indent(arg, 4));
    }
    lines
}

fn list_lines(items: &[Expr]) -> Vec<String> {
    if items.is_empty() {
        return vec![String::from("[]")];
    }
    let rendered: Vec<Vec<String>> = items.iter().map(Expr::item_lines).collect();
    if let Some(parts) = single_line(&rendered) {
        let line = format!("[ {} ]", parts.join(", "));
        if line.len() <= LIST_WIDTH {
            return vec![line];
        }
    }
    let mut lines = Vec::new();
    for (index, item) in rendered.into_iter().enumerate() {
        let lead = if index == 0 { "[ " } else { ", " };
        let mut item_lines = item.into_iter();
        if let Some(first) = item_lines.next() {
            lines.push(format!("{lead}{first}"));
        }
        lines.extend(indent(item_lines.collect(), 2));
    }
    lines.push(String::from("]"));
    lines
}

fn record_lines(base: Option<&str>, fields: &[(String, Expr)]) -> Vec<String> {
    if fields.is_empty() {
        return vec![base.map_or_else(|| String::from("{}"), str::to_owned)];
    }
    let rendered: Vec<Vec<String>> = fields.iter().map(|(_, value)| value.lines()).collect();
    if let Some(values) = single_line(&rendered) {
        let assignments: Vec<String> = fields
            .iter()
            .zip(values)
            .map(|((name, _), value)| format!("{name} = {value}"))
            .collect();
        let joined = assignments.join(", ");
        return vec![base.map_or_else(
            || format!("{{ {joined} }}"),
            |record| format!("{{ {record} | {joined} }}"),
        )];
    }

    let mut lines = Vec::new();
    let (first_lead, offset) = base.map_or(("{ ", 0), |record| {
        lines.push(format!("{{ {record}"));
        ("| ", 4)
    });
    for (index, ((name, _), value)) in fields.iter().zip(rendered).enumerate() {
        let lead = if index == 0 { first_lead } else { ", " };
        let mut value_lines = value.into_iter();
        let head = value_lines.next().unwrap_or_default();
        lines.push(format!("{}{lead}{name} = {head}", " ".repeat(offset)));
        lines.extend(indent(value_lines.collect(), offset + 4));
    }
    lines.push(String::from("}"));
    lines
}

fn case_lines(subject: &Expr, branches: &[(String, Expr)]) -> Vec<String> {
    let subject_lines = subject.lines();
    let mut lines = match subject_lines.as_slice() {
        [single] => vec![format!("case {single} of")],
        _ => {
            let mut head = vec![String::from("case")];
            head.extend(indent(subject_lines, 4));
            head.push(String::from("of"));
            head
        }
    };
    for (index, (pattern, body)) in branches.iter().enumerate() {
        if index > 0 {
            lines.push(String::new());
        }
        lines.push(format!("    {pattern} ->"));
        lines.extend(indent(body.lines(), 8));
    }
    lines
}

fn if_lines(branches: &[(Expr, Expr)], otherwise: &Expr) -> Vec<String> {
    let mut lines = Vec::new();
    for (index, (condition, body)) in branches.iter().enumerate() {
        let condition = condition.lines().join(" ");
        if index == 0 {
            lines.push(format!("if {condition} then"));
        } else {
            lines.push(String::new());
            lines.push(format!("else if {condition} then"));
        }
        lines.extend(indent(body.lines(), 4));
    }
    if branches.is_empty() {
        return otherwise.lines();
    }
    lines.push(String::new());
    lines.push(String::from("else"));
    lines.extend(indent(otherwise.lines(), 4));
    lines
}

fn let_lines(bindings: &[(String, Expr)], body: &Expr) -> Vec<String> {
    let mut lines = vec![String::from("let")];
    for (index, (name, value)) in bindings.iter().enumerate() {
        if index > 0 {
            lines.push(String::new());
        }
        lines.push(format!("    {name} ="));
        lines.extend(indent(value.lines(), 8));
    }
    lines.push(String::from("in"));
    lines.extend(body.lines());
    lines
}

/// Quotes `text` as an Elm string literal.
///
/// Bidi isolation marks and control characters are written as `\u{...}`
/// escapes so the generated source stays readable.
///
/// # Examples
///
/// ```
/// use fluent_elm::emit::quote;
///
/// assert_eq!(quote("say \"hi\"\n"), r#""say \"hi\"\n""#);
/// assert_eq!(quote("\u{2068}x\u{2069}"), r#""\u{2068}x\u{2069}""#);
/// ```
#[must_use]
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for character in text.chars() {
        match character {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            '\u{2068}' | '\u{2069}' => push_escape(&mut quoted, character),
            other if other.is_control() => push_escape(&mut quoted, other),
            other => quoted.push(other),
        }
    }
    quoted.push('"');
    quoted
}

fn push_escape(target: &mut String, character: char) {
    target.push_str(&format!("\\u{{{:04X}}}", u32::from(character)));
}

/// Whether a normalised literal can be an Elm `case` pattern.
#[must_use]
pub fn is_integer(raw: &str) -> bool {
    raw.parse::<i64>().is_ok()
}

fn number_literal(raw: &str) -> String {
    let normalised = normalise_number(raw);
    if normalised.starts_with('-') {
        format!("({normalised})")
    } else {
        normalised
    }
}

/// Modules a generated module may import.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Import {
    /// The Fluent runtime helpers.
    Fluent,
    /// `elm/html`.
    Html,
    /// `Html.Attributes`.
    HtmlAttributes,
    /// Date formatting.
    DateTimeFormat,
    /// Locale values.
    Locale,
    /// Number formatting.
    NumberFormat,
    /// Plural rules.
    PluralRules,
}

impl Import {
    const fn line(self) -> &'static str {
        match self {
            Self::Fluent => "import Fluent",
            Self::Html => "import Html",
            Self::HtmlAttributes => "import Html.Attributes as Attributes",
            Self::DateTimeFormat => "import Intl.DateTimeFormat as DateTimeFormat",
            Self::Locale => "import Intl.Locale as Locale",
            Self::NumberFormat => "import Intl.NumberFormat as NumberFormat",
            Self::PluralRules => "import Intl.PluralRules as PluralRules",
        }
    }
}

/// The imports a module actually uses.
#[derive(Clone, Debug, Default)]
pub struct Imports {
    lines: BTreeSet<String>,
}

impl Imports {
    /// Records a use of `import`.
    pub fn add(&mut self, import: Import) {
        self.lines.insert(import.line().to_owned());
    }

    /// Records a use of another generated module under `alias`.
    pub fn add_alias(&mut self, module: &str, alias: &str) {
        self.lines.insert(format!("import {module} as {alias}"));
    }

    /// The import lines, sorted.
    pub(super) fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }
}

/// A top-level function with its annotation.
#[derive(Clone, Debug)]
pub struct Function {
    /// The function name.
    pub name: String,
    /// The type annotation, without the name.
    pub annotation: String,
    /// Parameter names.
    pub params: Vec<String>,
    /// The body.
    pub body: Expr,
}

impl Function {
    fn render(&self, out: &mut String) {
        out.push_str(&format!("{} : {}\n", self.name, self.annotation));
        let mut head = self.name.clone();
        for param in &self.params {
            head.push(' ');
            head.push_str(param);
        }
        out.push_str(&head);
        out.push_str(" =\n");
        for line in indent(self.body.lines(), 4) {
            out.push_str(&line);
            out.push('\n');
        }
    }
}

/// A complete Elm module.
#[derive(Clone, Debug)]
pub struct Module {
    /// Dotted module name.
    pub name: String,
    /// Exposed names.
    pub exposing: Vec<String>,
    /// Imports in use.
    pub imports: Imports,
    /// Declarations in output order.
    pub functions: Vec<Function>,
}

impl Module {
    /// Renders the module source.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("module {} exposing ({})\n", self.name, self.exposing.join(", "));
        let mut imports = self.imports.iter().peekable();
        if imports.peek().is_some() {
            out.push('\n');
            for line in imports {
                out.push_str(line);
                out.push('\n');
            }
        }
        for function in &self.functions {
            out.push_str("\n\n");
            function.render(&mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn render(expr: &Expr) -> String {
        expr.lines().join("\n")
    }

    #[rstest]
    #[case("007", "7")]
    #[case("1.50", "1.5")]
    #[case("-3", "-3")]
    #[case("1.0", "1")]
    fn normalises_numbers(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalise_number(raw), expected);
    }

    #[rstest]
    fn parenthesises_negative_arguments() {
        let expr = Expr::call("f", [Expr::Number(String::from("-1")), Expr::raw("x")]);
        assert_eq!(render(&expr), "f (-1) x");
    }

    #[rstest]
    fn nests_calls_in_parentheses() {
        let expr = Expr::call(
            "NumberFormat.format",
            [
                Expr::call("NumberFormat.fromLocale", [Expr::raw("locale_")]),
                Expr::Number(String::from("123")),
            ],
        );
        assert_eq!(
            render(&expr),
            "NumberFormat.format (NumberFormat.fromLocale locale_) 123"
        );
    }

    #[rstest]
    fn breaks_long_lists() {
        let items: Vec<Expr> = (0..6)
            .map(|index| Expr::string(format!("item number {index}")))
            .collect();
        let expr = Expr::call("String.concat", [Expr::List(items)]);
        assert_eq!(
            render(&expr),
            [
                "String.concat",
                "    [ \"item number 0\"",
                "    , \"item number 1\"",
                "    , \"item number 2\"",
                "    , \"item number 3\"",
                "    , \"item number 4\"",
                "    , \"item number 5\"",
                "    ]",
            ]
            .join("\n")
        );
    }

    #[rstest]
    fn lays_out_case_and_let() {
        let expr = Expr::Let {
            bindings: vec![(String::from("val_"), Expr::raw("x"))],
            body: Box::new(Expr::Case {
                subject: Box::new(Expr::raw("val_")),
                branches: vec![
                    (String::from("1"), Expr::string("one")),
                    (String::from("_"), Expr::string("many")),
                ],
            }),
        };
        assert_eq!(
            render(&expr),
            [
                "let",
                "    val_ =",
                "        x",
                "in",
                "case val_ of",
                "    1 ->",
                "        \"one\"",
                "",
                "    _ ->",
                "        \"many\"",
            ]
            .join("\n")
        );
    }

    #[rstest]
    fn parenthesises_blocks_inside_lists() {
        let expr = Expr::List(vec![
            Expr::List(vec![Expr::string("a")]),
            Expr::Case {
                subject: Box::new(Expr::raw("x")),
                branches: vec![(String::from("_"), Expr::List(Vec::new()))],
            },
        ]);
        assert_eq!(
            render(&expr),
            ["[ [ \"a\" ]", ", (case x of", "      _ ->", "          []", "  )", "]"].join("\n")
        );
    }

    #[rstest]
    fn renders_if_chains() {
        let expr = Expr::If {
            branches: vec![(
                Expr::Equals(Box::new(Expr::raw("pl_")), Box::new(Expr::string("one"))),
                Expr::string("a"),
            )],
            otherwise: Box::new(Expr::string("b")),
        };
        assert_eq!(
            render(&expr),
            ["if pl_ == \"one\" then", "    \"a\"", "", "else", "    \"b\""].join("\n")
        );
    }

    #[rstest]
    fn renders_record_updates() {
        let expr = Expr::Record {
            base: Some(String::from("defaults_")),
            fields: vec![
                (String::from("locale"), Expr::raw("locale_")),
                (
                    String::from("minimumFractionDigits"),
                    Expr::call("Just", [Expr::Number(String::from("2"))]),
                ),
            ],
        };
        assert_eq!(
            render(&expr),
            "{ defaults_ | locale = locale_, minimumFractionDigits = Just 2 }"
        );
    }

    #[rstest]
    fn renders_modules_with_sorted_imports() {
        let mut imports = Imports::default();
        imports.add(Import::Locale);
        imports.add(Import::Fluent);
        let module = Module {
            name: String::from("Ftl.EN.Main"),
            exposing: vec![String::from("foo")],
            imports,
            functions: vec![Function {
                name: String::from("foo"),
                annotation: String::from("Locale.Locale -> a -> String"),
                params: vec![String::from("locale_"), String::from("args_")],
                body: Expr::string("Foo"),
            }],
        };
        assert_eq!(
            module.render(),
            "module Ftl.EN.Main exposing (foo)\n\nimport Fluent\nimport Intl.Locale as Locale\n\n\nfoo : Locale.Locale -> a -> String\nfoo locale_ args_ =\n    \"Foo\"\n"
        );
    }
}
