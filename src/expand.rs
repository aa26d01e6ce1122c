//! Term inlining and compile-time select folding.
//!
//! Each message unit is rewritten into a new owned [`Pattern`] in which every
//! term reference is replaced by the term's body (with call arguments
//! substituted for `$parameters`) and every select expression whose selector
//! is known at compile time is replaced by the matching variant. Later phases
//! only see message references, variables, function calls, and runtime
//! selects.
//!
//! Term inlining stops at [`MAX_TERM_DEPTH`] nested terms, so expanded
//! patterns stay shallow enough for the recursive walks of later phases.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use common::diagnostics::DiagnosticCode;
use common::span::SourceLocation;
use log::debug;

use crate::ast::{
    Arguments, Element, Expression, Inline, InlineKind, NamedArgument, Pattern, Select, Variant,
    VariantKey, same_number,
};
use crate::resolve::{Resolution, SymbolTable, UnitId, UnitKey};
use crate::sink::Sink;

/// How many term references may nest inside one message.
pub const MAX_TERM_DEPTH: usize = 64;

/// Expanded message patterns of one resource.
#[derive(Debug, Default)]
pub struct Expansion {
    /// Expanded pattern per message unit that was not excluded.
    pub patterns: BTreeMap<UnitId, Pattern>,
    /// Units whose expansion reported an error.
    pub broken: BTreeSet<UnitId>,
}

/// Expands every message unit outside `excluded`.
#[must_use]
pub fn expand(
    resolution: &Resolution<'_>,
    excluded: &BTreeSet<UnitId>,
    sink: Sink<'_>,
) -> Expansion {
    let mut expansion = Expansion::default();
    for (id, unit) in resolution.table.messages() {
        if excluded.contains(&id) {
            continue;
        }
        let mut expander = Expander {
            table: &resolution.table,
            sink,
            owner: &unit.key,
            html: unit.key.is_html(),
            broken: false,
            depth: 0,
            reported: HashSet::new(),
        };
        let pattern = expander.pattern(unit.pattern, &Scope::Message);
        if expander.broken {
            expansion.broken.insert(id);
        }
        expansion.patterns.insert(id, pattern);
    }
    debug!(
        target: "fluent_elm::resolve",
        "{}: expanded {} messages",
        sink.resource(),
        expansion.patterns.len(),
    );
    expansion
}

enum Scope<'s> {
    Message,
    Term {
        term: &'s UnitKey,
        params: &'s HashMap<String, Inline>,
        call_site: SourceLocation,
    },
}

struct Expander<'a, 'r> {
    table: &'a SymbolTable<'r>,
    sink: Sink<'a>,
    owner: &'a UnitKey,
    html: bool,
    broken: bool,
    depth: usize,
    reported: HashSet<(SourceLocation, String)>,
}

const fn invalid(location: SourceLocation) -> Inline {
    Inline {
        kind: InlineKind::Invalid,
        location,
    }
}

impl Expander<'_, '_> {
    fn error(&mut self, code: DiagnosticCode, location: SourceLocation, message: String) {
        self.broken = true;
        self.sink.push(
            self.sink
                .at(code, location, message)
                .message_id(self.owner.to_string())
                .build(),
        );
    }

    fn pattern(&mut self, pattern: &Pattern, scope: &Scope<'_>) -> Pattern {
        let elements = pattern
            .elements
            .iter()
            .map(|element| match element {
                Element::Text { .. } => element.clone(),
                Element::Placeable(expression) => {
                    Element::Placeable(self.expression(expression, scope))
                }
            })
            .collect();
        Pattern { elements }
    }

    fn expression(&mut self, expression: &Expression, scope: &Scope<'_>) -> Expression {
        match expression {
            Expression::Inline(inline) => Expression::Inline(self.inline(inline, scope)),
            Expression::Select(select) => self.select(select, scope),
        }
    }

    fn inline(&mut self, inline: &Inline, scope: &Scope<'_>) -> Inline {
        let location = inline.location;
        match &inline.kind {
            InlineKind::Variable(name) => self.variable(name, location, scope),
            InlineKind::Message { id, attribute } => {
                if !self.html && UnitKey::message(id, attribute.as_deref()).is_html() {
                    self.error(
                        DiagnosticCode::HtmlTypeMismatch,
                        location,
                        format!("cannot use HTML message `{id}` from a plain text message"),
                    );
                    return invalid(location);
                }
                inline.clone()
            }
            InlineKind::Term {
                id,
                attribute,
                arguments,
            } => self.term(
                &UnitKey::term(id, attribute.as_deref()),
                arguments.as_ref(),
                location,
                scope,
            ),
            InlineKind::Function { name, arguments } => Inline {
                kind: InlineKind::Function {
                    name: name.clone(),
                    arguments: self.arguments(arguments, scope),
                },
                location,
            },
            InlineKind::Nested(expression) => Inline {
                kind: InlineKind::Nested(Box::new(self.expression(expression, scope))),
                location,
            },
            InlineKind::Inlined(pattern) => Inline {
                kind: InlineKind::Inlined(Box::new(self.pattern(pattern, scope))),
                location,
            },
            InlineKind::String(_) | InlineKind::Number(_) | InlineKind::Invalid => inline.clone(),
        }
    }

    fn arguments(&mut self, arguments: &Arguments, scope: &Scope<'_>) -> Arguments {
        Arguments {
            positional: arguments
                .positional
                .iter()
                .map(|argument| self.inline(argument, scope))
                .collect(),
            named: arguments
                .named
                .iter()
                .map(|argument| NamedArgument {
                    name: argument.name.clone(),
                    value: self.inline(&argument.value, scope),
                    location: argument.location,
                })
                .collect(),
        }
    }

    fn variable(&mut self, name: &str, location: SourceLocation, scope: &Scope<'_>) -> Inline {
        match scope {
            Scope::Message => Inline {
                kind: InlineKind::Variable(name.to_owned()),
                location,
            },
            Scope::Term {
                term,
                params,
                call_site,
            } => {
                if let Some(value) = params.get(name) {
                    return Inline {
                        kind: value.kind.clone(),
                        location,
                    };
                }
                if self.reported.insert((*call_site, name.to_owned())) {
                    self.error(
                        DiagnosticCode::TermArgument,
                        *call_site,
                        format!("term `{term}` uses `${name}` but this call does not supply it"),
                    );
                }
                invalid(location)
            }
        }
    }

    fn term(
        &mut self,
        key: &UnitKey,
        arguments: Option<&Arguments>,
        location: SourceLocation,
        scope: &Scope<'_>,
    ) -> Inline {
        // Unresolved terms were reported by the resolver.
        let Some(target) = self.table.lookup(key) else {
            return invalid(location);
        };

        let mut params = HashMap::new();
        if let Some(arguments) = arguments {
            if let Some(first) = arguments.positional.first() {
                self.error(
                    DiagnosticCode::TermArgument,
                    first.location,
                    format!("term `{key}` accepts named arguments only"),
                );
            }
            for argument in &arguments.named {
                let value = self.inline(&argument.value, scope);
                params.insert(argument.name.clone(), value);
            }
        }

        let table = self.table;
        let Some(unit) = table.unit(target) else {
            return invalid(location);
        };
        if self.depth >= MAX_TERM_DEPTH {
            self.error(
                DiagnosticCode::TermDepth,
                location,
                format!("term `{key}` is nested more than {MAX_TERM_DEPTH} terms deep"),
            );
            return invalid(location);
        }
        let inner = Scope::Term {
            term: &unit.key,
            params: &params,
            call_site: location,
        };
        self.depth += 1;
        let body = self.pattern(unit.pattern, &inner);
        self.depth -= 1;
        Inline {
            kind: InlineKind::Inlined(Box::new(body)),
            location,
        }
    }

    fn select(&mut self, select: &Select, scope: &Scope<'_>) -> Expression {
        let location = select.selector.location;
        let Some(default) = select.default_index() else {
            self.error(
                DiagnosticCode::SelectDefault,
                location,
                String::from("select expression must have exactly one default variant"),
            );
            return Expression::Inline(invalid(location));
        };
        if self.repeated_keys(select) {
            return Expression::Inline(invalid(location));
        }

        if let (InlineKind::Variable(name), Scope::Term { params, .. }) =
            (&select.selector.kind, scope)
        {
            if !params.contains_key(name) {
                return self.fold(select, default, scope);
            }
        }

        let selector = self.inline(&select.selector, scope);
        match fold_target(&selector, &select.variants) {
            Fold::Variant(index) => self.fold(select, index, scope),
            Fold::Default => self.fold(select, default, scope),
            Fold::Runtime => Expression::Select(Select {
                selector,
                variants: select
                    .variants
                    .iter()
                    .map(|variant| Variant {
                        key: variant.key.clone(),
                        value: self.pattern(&variant.value, scope),
                        default: variant.default,
                        location: variant.location,
                    })
                    .collect(),
            }),
        }
    }

    /// Reports every variant whose key selects the same value as an earlier
    /// one, such as `[1.0]` after `[1]`.
    fn repeated_keys(&mut self, select: &Select) -> bool {
        let mut repeated = false;
        for (index, variant) in select.variants.iter().enumerate() {
            let Some(first) = select
                .variants
                .iter()
                .take(index)
                .find(|earlier| earlier.key.same_key(&variant.key))
            else {
                continue;
            };
            repeated = true;
            self.broken = true;
            self.sink.push(
                self.sink
                    .at(
                        DiagnosticCode::DuplicateIdentifier,
                        variant.location,
                        format!(
                            "variant `[{}]` selects the same value as `[{}]`",
                            variant.key.as_str(),
                            first.key.as_str()
                        ),
                    )
                    .message_id(self.owner.to_string())
                    .related(self.sink.origin(first.location), "first defined here")
                    .build(),
            );
        }
        repeated
    }

    fn fold(&mut self, select: &Select, index: usize, scope: &Scope<'_>) -> Expression {
        let Some(variant) = select.variants.get(index) else {
            return Expression::Inline(invalid(select.selector.location));
        };
        let body = self.pattern(&variant.value, scope);
        Expression::Inline(Inline {
            kind: InlineKind::Inlined(Box::new(body)),
            location: select.selector.location,
        })
    }
}

/// How a select expression compiles once its selector is expanded.
enum Fold {
    Variant(usize),
    Default,
    Runtime,
}

fn fold_target(selector: &Inline, variants: &[Variant]) -> Fold {
    let by_identifier = |text: &str| {
        variants
            .iter()
            .position(|variant| matches!(&variant.key, VariantKey::Identifier(key) if key == text))
            .map_or(Fold::Default, Fold::Variant)
    };
    match &selector.kind {
        InlineKind::String(text) => by_identifier(text),
        InlineKind::Inlined(pattern) => pattern
            .plain_text()
            .map_or(Fold::Runtime, |text| by_identifier(&text)),
        InlineKind::Number(value) => {
            let exact = variants.iter().position(|variant| {
                matches!(&variant.key, VariantKey::Number(key) if same_number(key, value))
            });
            match exact {
                Some(index) => Fold::Variant(index),
                // Plural categories depend on the runtime locale.
                None if variants.iter().any(|variant| variant.key.is_plural_category()) => {
                    Fold::Runtime
                }
                None => Fold::Default,
            }
        }
        InlineKind::Invalid => Fold::Default,
        _ => Fold::Runtime,
    }
}
