//! Argument type inference.
//!
//! Every expanded message pattern is walked for *evidence*: each use of a
//! variable contributes a type (often [`ArgumentType::Unknown`]) and a site.
//! Message references contribute the callee's signature at the reference
//! site, so a message's signature covers everything it transitively renders.
//! Messages are visited callees first, following the reference graph's
//! component order, so every callee signature is final before it is used.
//! Evidence for the same variable is unified; conflicting concrete types are
//! reported once and the variable degrades to `Unknown`. An untyped argument
//! of a callee is rendered as text there, so a caller cannot narrow it.

mod functions;
mod types;

use std::collections::{BTreeMap, BTreeSet};

use common::diagnostics::DiagnosticCode;
use common::span::SourceLocation;
use log::debug;

use crate::ast::{Arguments, Element, Expression, InlineKind, Pattern, Select, VariantKey};
use crate::expand::Expansion;
use crate::resolve::{Resolution, UnitId, UnitKey};
use crate::sink::Sink;

pub use functions::{
    Builtin, CallError, FormatOption, FunctionCall, OptionValue, check_call,
};
pub use types::{ArgumentType, Field, Incompatibility, Signature};

/// Signatures of one resource's messages.
#[derive(Debug, Default)]
pub struct Inference {
    /// Signature per expanded message unit.
    pub signatures: BTreeMap<UnitId, Signature>,
    /// Units with type conflicts or invalid function calls.
    pub broken: BTreeSet<UnitId>,
}

/// Infers a signature for every expanded message of a resource.
#[must_use]
pub fn infer(resolution: &Resolution<'_>, expansion: &Expansion, sink: Sink<'_>) -> Inference {
    let mut engine = Engine {
        resolution,
        expansion,
        sink,
        inference: Inference::default(),
    };
    for unit in resolution.graph.components().into_iter().flatten() {
        engine.infer_unit(unit);
    }
    debug!(
        target: "fluent_elm::infer",
        "{}: inferred {} signatures, {} with errors",
        sink.resource(),
        engine.inference.signatures.len(),
        engine.inference.broken.len(),
    );
    engine.inference
}

#[derive(Debug)]
struct Evidence {
    name: String,
    ty: ArgumentType,
    location: SourceLocation,
    via: Option<String>,
    /// Text rendered by a callee; it cannot be narrowed to a concrete type.
    rigid: bool,
}

#[derive(Default)]
struct Collected {
    evidence: Vec<Evidence>,
    broken: bool,
}

impl Collected {
    fn push(&mut self, name: &str, ty: ArgumentType, location: SourceLocation) {
        self.evidence.push(Evidence {
            name: name.to_owned(),
            ty,
            location,
            via: None,
            rigid: false,
        });
    }
}

struct Engine<'a, 'r> {
    resolution: &'a Resolution<'r>,
    expansion: &'a Expansion,
    sink: Sink<'a>,
    inference: Inference,
}

impl Engine<'_, '_> {
    fn infer_unit(&mut self, unit: UnitId) {
        let expansion = self.expansion;
        let (Some(pattern), Some(found)) = (
            expansion.patterns.get(&unit),
            self.resolution.table.unit(unit),
        ) else {
            return;
        };

        let owner = found.key.to_string();
        let mut collected = Collected::default();
        self.pattern(pattern, &owner, &mut collected);
        let (signature, conflicted) = self.unify(&owner, collected.evidence);

        if collected.broken || conflicted {
            self.inference.broken.insert(unit);
        }
        self.inference.signatures.insert(unit, signature);
    }

    fn error(&self, code: DiagnosticCode, location: SourceLocation, owner: &str, message: String) {
        self.sink.push(
            self.sink
                .at(code, location, message)
                .message_id(owner)
                .build(),
        );
    }

    fn pattern(&mut self, pattern: &Pattern, owner: &str, out: &mut Collected) {
        for element in &pattern.elements {
            if let Element::Placeable(expression) = element {
                self.expression(expression, owner, out);
            }
        }
    }

    fn expression(&mut self, expression: &Expression, owner: &str, out: &mut Collected) {
        match expression {
            Expression::Inline(inline) => self.inline(&inline.kind, inline.location, owner, out),
            Expression::Select(select) => self.select(select, owner, out),
        }
    }

    fn inline(
        &mut self,
        kind: &InlineKind,
        location: SourceLocation,
        owner: &str,
        out: &mut Collected,
    ) {
        match kind {
            InlineKind::Variable(name) => out.push(name, ArgumentType::Unknown, location),
            InlineKind::Function { name, arguments } => {
                self.call(name, arguments, location, owner, out);
            }
            InlineKind::Message { id, attribute } => {
                let key = UnitKey::message(id, attribute.as_deref());
                // Callees precede their callers, and excluded callees
                // exclude their callers.
                let Some(signature) = self
                    .resolution
                    .table
                    .lookup(&key)
                    .and_then(|callee| self.inference.signatures.get(&callee))
                else {
                    return;
                };
                for (name, field) in signature.fields() {
                    out.evidence.push(Evidence {
                        name: name.to_owned(),
                        ty: field.ty,
                        location,
                        via: Some(key.to_string()),
                        rigid: !field.ty.is_concrete(),
                    });
                }
            }
            InlineKind::Nested(expression) => self.expression(expression, owner, out),
            InlineKind::Inlined(pattern) => self.pattern(pattern, owner, out),
            InlineKind::String(_)
            | InlineKind::Number(_)
            | InlineKind::Term { .. }
            | InlineKind::Invalid => {}
        }
    }

    fn call(
        &mut self,
        name: &str,
        arguments: &Arguments,
        location: SourceLocation,
        owner: &str,
        out: &mut Collected,
    ) -> Option<Builtin> {
        match check_call(name, arguments, location) {
            Ok(call) => {
                match &call.argument.kind {
                    InlineKind::Variable(variable) => {
                        out.push(variable, call.builtin.argument_type(), location);
                    }
                    InlineKind::Function { name, arguments } => {
                        self.call(name, arguments, call.argument.location, owner, out);
                    }
                    _ => {}
                }
                Some(call.builtin)
            }
            Err(errors) => {
                out.broken = true;
                for error in errors {
                    self.error(error.code, error.location, owner, error.message);
                }
                for argument in &arguments.positional {
                    self.inline(&argument.kind, argument.location, owner, out);
                }
                None
            }
        }
    }

    fn select(&mut self, select: &Select, owner: &str, out: &mut Collected) {
        let selector = &select.selector;
        match &selector.kind {
            InlineKind::Variable(name) => {
                let numeric = select
                    .variants
                    .iter()
                    .find(|variant| matches!(variant.key, VariantKey::Number(_)));
                let textual = select.variants.iter().find(|variant| {
                    matches!(variant.key, VariantKey::Identifier(_))
                        && !variant.key.is_plural_category()
                });
                if let Some(variant) = numeric {
                    out.push(name, ArgumentType::Number, variant.location);
                }
                match textual {
                    Some(variant) => out.push(name, ArgumentType::String, variant.location),
                    // Only plural categories: the selector is a count.
                    None if numeric.is_none() => {
                        out.push(name, ArgumentType::Number, selector.location);
                    }
                    None => {}
                }
            }
            InlineKind::Function { name, arguments } => {
                let builtin = self.call(name, arguments, selector.location, owner, out);
                if builtin == Some(Builtin::DateTime) {
                    out.broken = true;
                    self.error(
                        DiagnosticCode::FunctionCall,
                        selector.location,
                        owner,
                        String::from("DATETIME cannot be used as a selector"),
                    );
                }
            }
            other => self.inline(other, selector.location, owner, out),
        }
        for variant in &select.variants {
            self.pattern(&variant.value, owner, out);
        }
    }

    fn unify(&self, owner: &str, evidence: Vec<Evidence>) -> (Signature, bool) {
        let mut grouped: BTreeMap<String, Vec<Evidence>> = BTreeMap::new();
        for item in evidence {
            grouped.entry(item.name.clone()).or_default().push(item);
        }

        let mut conflicted = false;
        let mut fields = Vec::with_capacity(grouped.len());
        for (name, uses) in grouped {
            let Some(first_use) = uses.first() else {
                continue;
            };
            let first_concrete = uses.iter().find(|item| item.ty.is_concrete());
            let clash = first_concrete.and_then(|first| {
                uses.iter()
                    .find(|item| item.rigid || first.ty.unify(item.ty).is_none())
                    .map(|other| (first, other))
            });
            let ty = clash.map_or_else(
                || first_concrete.map_or(ArgumentType::Unknown, |item| item.ty),
                |(first, other)| {
                    conflicted = true;
                    self.report_conflict(owner, &name, first, other);
                    ArgumentType::Unknown
                },
            );
            fields.push((
                name,
                Field {
                    ty,
                    location: first_use.location,
                },
            ));
        }
        (Signature::from_fields(fields), conflicted)
    }

    fn report_conflict(&self, owner: &str, name: &str, first: &Evidence, other: &Evidence) {
        let label = other.via.as_ref().map_or_else(
            || format!("used as {} here", other.ty.describe()),
            |callee| format!("used as {} through `{callee}` here", other.ty.describe()),
        );
        self.sink.push(
            self.sink
                .at(
                    DiagnosticCode::TypeConflict,
                    first.location,
                    format!(
                        "`${name}` is used as {} here and as {} elsewhere",
                        first.ty.describe(),
                        other.ty.describe()
                    ),
                )
                .message_id(owner)
                .related(self.sink.origin(other.location), label)
                .help("format every use of the argument with the same function, or pass two arguments")
                .build(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::expand;
    use crate::ingest::{SourceFile, ingest};
    use crate::resolve::resolve;
    use camino::Utf8Path;
    use common::diagnostics::{Diagnostics, Report};
    use common::locale::LocaleTag;
    use rstest::rstest;

    struct Outcome {
        signatures: BTreeMap<String, Signature>,
        broken: Vec<String>,
        report: Report,
    }

    impl Outcome {
        fn types(&self, id: &str) -> Vec<(String, ArgumentType)> {
            self.signatures
                .get(id)
                .map(|signature| {
                    signature
                        .fields()
                        .map(|(name, field)| (name.to_owned(), field.ty))
                        .collect()
                })
                .unwrap_or_default()
        }
    }

    fn run(source: &str) -> Outcome {
        let diagnostics = Diagnostics::new();
        let locale = LocaleTag::parse("en").unwrap_or_else(|error| panic!("{error}"));
        let resource = ingest(&SourceFile::new("en", "main.ftl", source), locale, &diagnostics);
        let sink = Sink::new(&diagnostics, Utf8Path::new("en/main.ftl"));
        let resolution = resolve(&resource, sink);
        let expansion = expand(&resolution, &resolution.excluded(), sink);
        let inference = infer(&resolution, &expansion, sink);
        let name = |id: &UnitId| match resolution.table.unit(*id) {
            Some(unit) => unit.key.to_string(),
            None => panic!("unit {id:?} should be in the table"),
        };
        Outcome {
            signatures: inference
                .signatures
                .iter()
                .map(|(id, signature)| (name(id), signature.clone()))
                .collect(),
            broken: inference.broken.iter().map(name).collect(),
            report: diagnostics.into_report(),
        }
    }

    fn typed(fields: &[(&str, ArgumentType)]) -> Vec<(String, ArgumentType)> {
        fields
            .iter()
            .map(|(name, ty)| ((*name).to_owned(), *ty))
            .collect()
    }

    #[rstest]
    #[case("msg = Hello { $name }\n", &[("name", ArgumentType::Unknown)])]
    #[case("msg = { NUMBER($count) } items\n", &[("count", ArgumentType::Number)])]
    #[case("msg = { DATETIME($when, month: \"long\") }\n", &[("when", ArgumentType::Date)])]
    #[case("msg = { NUMBER(NUMBER($n, useGrouping: 0)) }\n", &[("n", ArgumentType::Number)])]
    #[case(
        "msg = { $n ->\n    [one] One\n   *[other] { $n } things\n}\n",
        &[("n", ArgumentType::Number)]
    )]
    #[case(
        "msg = { $n ->\n    [0] None\n   *[other] Some\n}\n",
        &[("n", ArgumentType::Number)]
    )]
    #[case(
        "msg = { $gender ->\n    [male] He\n    [female] She\n   *[other] They\n}\n",
        &[("gender", ArgumentType::String)]
    )]
    #[case("msg = { \"x\" ->\n    [x] { $a }\n   *[y] Y\n}\n", &[("a", ArgumentType::Unknown)])]
    #[case("msg = { 7 }\n", &[])]
    fn infers_types(#[case] source: &str, #[case] expected: &[(&str, ArgumentType)]) {
        let outcome = run(source);
        assert!(outcome.report.success(), "{}", outcome.report.render_human());
        assert_eq!(outcome.types("msg"), typed(expected));
    }

    #[rstest]
    fn message_references_carry_callee_types() {
        let outcome = run("total = { NUMBER($n) }\nsummary = { total } for { $who }\n");
        assert_eq!(
            outcome.types("summary"),
            typed(&[("n", ArgumentType::Number), ("who", ArgumentType::Unknown)])
        );
    }

    #[rstest]
    fn long_reference_chains_propagate_to_the_head() {
        let depth = 5_000;
        let mut source: String = (0..depth)
            .map(|index| format!("m{index} = {{ m{} }}\n", index + 1))
            .collect();
        source.push_str(&format!("m{depth} = {{ NUMBER($n) }}\n"));

        let outcome = run(&source);
        assert!(outcome.report.success(), "{}", outcome.report.render_human());
        assert_eq!(outcome.signatures.len(), depth + 1);
        assert_eq!(outcome.types("m0"), typed(&[("n", ArgumentType::Number)]));
    }

    #[rstest]
    fn term_parameters_constrain_nothing_in_the_caller() {
        let outcome = run("-price = { NUMBER($amount) }\nmsg = { -price(amount: 3) } { $x }\n");
        assert!(outcome.report.success());
        assert_eq!(outcome.types("msg"), typed(&[("x", ArgumentType::Unknown)]));
    }

    #[rstest]
    fn conflict_is_reported_once_with_both_sites() {
        let outcome = run("msg = { NUMBER($x) } { DATETIME($x) } { $x }\n");
        let errors: Vec<_> = outcome.report.with_code(DiagnosticCode::TypeConflict).collect();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].origin().location(), SourceLocation::new(1, 9));
        assert_eq!(errors[0].related().len(), 1);
        assert_eq!(
            errors[0].related()[0].origin().location(),
            SourceLocation::new(1, 24)
        );
        assert_eq!(outcome.types("msg"), typed(&[("x", ArgumentType::Unknown)]));
        assert_eq!(outcome.broken, vec!["msg"]);
    }

    #[rstest]
    fn conflict_through_reference_names_callee() {
        let outcome = run("when = { DATETIME($x) }\nmsg = { NUMBER($x) } { when }\n");
        let errors: Vec<_> = outcome.report.with_code(DiagnosticCode::TypeConflict).collect();

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message_id(), Some("msg"));
        assert_eq!(errors[0].related()[0].label(), "used as a date through `when` here");
    }

    #[rstest]
    fn callee_text_cannot_be_narrowed() {
        let outcome = run("label = { $n }\nmsg = { label } { NUMBER($n) }\n");
        let errors: Vec<_> = outcome.report.with_code(DiagnosticCode::TypeConflict).collect();

        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].related()[0].label(),
            "used as untyped text through `label` here"
        );
        assert_eq!(outcome.types("label"), typed(&[("n", ArgumentType::Unknown)]));
    }

    #[rstest]
    fn numeric_and_string_keys_conflict() {
        let outcome = run("msg = { $n ->\n    [1] One\n    [lots] Lots\n   *[other] Other\n}\n");
        assert_eq!(outcome.report.with_code(DiagnosticCode::TypeConflict).count(), 1);
    }

    #[rstest]
    fn bad_calls_are_reported_and_mark_the_message() {
        let outcome = run("msg = { NUMBER($n, currency: \"EUR\") } { PLATFORM() }\n");
        assert_eq!(outcome.report.with_code(DiagnosticCode::FunctionCall).count(), 1);
        assert_eq!(outcome.report.with_code(DiagnosticCode::UndefinedReference).count(), 1);
        assert_eq!(outcome.broken, vec!["msg"]);
        assert_eq!(outcome.types("msg"), typed(&[("n", ArgumentType::Unknown)]));
    }

    #[rstest]
    fn datetime_selectors_are_rejected() {
        let outcome = run("msg = { DATETIME($d) ->\n   *[other] X\n}\n");
        assert_eq!(outcome.report.with_code(DiagnosticCode::FunctionCall).count(), 1);
    }
}
