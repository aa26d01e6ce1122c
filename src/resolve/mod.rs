//! Symbol tables and reference resolution for one resource.
//!
//! Every message value, term value, and attribute is a *unit*: the smallest
//! thing one placeable can reference. Units are addressed by [`UnitId`], an
//! index into the [`SymbolTable`] arena, so the reference graph can hold
//! cycles without owning anything.

mod graph;

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use common::diagnostics::DiagnosticCode;
use common::span::SourceLocation;
use log::debug;

use crate::ast::{Arguments, Element, EntryKind, Expression, Inline, InlineKind, Pattern, Resource};
use crate::naming::is_html_id;
use crate::sink::Sink;

pub use graph::{Edge, ReferenceGraph};

/// Index of a unit inside its [`SymbolTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(usize);

impl UnitId {
    /// Returns the arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }

    /// Rebuilds an id from its arena index.
    #[must_use]
    pub const fn from_index(index: usize) -> Self {
        Self(index)
    }
}

/// Identifies a referenceable unit.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitKey {
    /// Message or term.
    pub kind: EntryKind,
    /// Entry identifier.
    pub id: String,
    /// Attribute name, or `None` for the entry's value.
    pub attribute: Option<String>,
}

impl UnitKey {
    /// Builds a message unit key.
    #[must_use]
    pub fn message(id: &str, attribute: Option<&str>) -> Self {
        Self {
            kind: EntryKind::Message,
            id: id.to_owned(),
            attribute: attribute.map(str::to_owned),
        }
    }

    /// Builds a term unit key.
    #[must_use]
    pub fn term(id: &str, attribute: Option<&str>) -> Self {
        Self {
            kind: EntryKind::Term,
            id: id.to_owned(),
            attribute: attribute.map(str::to_owned),
        }
    }

    /// Whether the unit renders markup: the value of an HTML-named entry.
    #[must_use]
    pub fn is_html(&self) -> bool {
        self.attribute.is_none() && is_html_id(&self.id)
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == EntryKind::Term {
            formatter.write_str("-")?;
        }
        formatter.write_str(&self.id)?;
        if let Some(attribute) = &self.attribute {
            write!(formatter, ".{attribute}")?;
        }
        Ok(())
    }
}

/// A referenceable pattern borrowed from its resource.
#[derive(Clone, Debug)]
pub struct Unit<'r> {
    /// The unit's key.
    pub key: UnitKey,
    /// Location of the identifier or attribute name.
    pub location: SourceLocation,
    /// The unit's pattern.
    pub pattern: &'r Pattern,
}

/// Units of one resource, in source order, with duplicate definitions dropped.
#[derive(Debug, Default)]
pub struct SymbolTable<'r> {
    units: Vec<Unit<'r>>,
    index: HashMap<UnitKey, UnitId>,
    entries: HashMap<(EntryKind, String), SourceLocation>,
}

impl<'r> SymbolTable<'r> {
    /// Indexes `resource`, reporting duplicate identifiers and attributes.
    ///
    /// The first definition wins; later ones are reported and ignored.
    pub fn build(resource: &'r Resource, sink: Sink<'_>) -> Self {
        let mut table = Self::default();
        for entry in &resource.entries {
            let entry_key = (entry.kind, entry.id.clone());
            let display = UnitKey {
                kind: entry.kind,
                id: entry.id.clone(),
                attribute: None,
            };
            if let Some(first) = table.entries.get(&entry_key) {
                sink.push(
                    sink.at(
                        DiagnosticCode::DuplicateIdentifier,
                        entry.location,
                        format!("`{display}` is defined more than once"),
                    )
                    .message_id(display.to_string())
                    .related(sink.origin(*first), "first defined here")
                    .build(),
                );
                continue;
            }
            table.entries.insert(entry_key, entry.location);

            if let Some(value) = &entry.value {
                table.insert(display.clone(), entry.location, value);
            }
            let mut seen: HashMap<&str, SourceLocation> = HashMap::new();
            for attribute in &entry.attributes {
                if let Some(earlier) = seen.get(attribute.name.as_str()) {
                    sink.push(
                        sink.at(
                            DiagnosticCode::DuplicateIdentifier,
                            attribute.location,
                            format!("attribute `{}` is defined more than once", attribute.name),
                        )
                        .message_id(display.to_string())
                        .related(sink.origin(*earlier), "first defined here")
                        .build(),
                    );
                    continue;
                }
                seen.insert(&attribute.name, attribute.location);
                let key = UnitKey {
                    attribute: Some(attribute.name.clone()),
                    ..display.clone()
                };
                table.insert(key, attribute.location, &attribute.value);
            }
        }
        table
    }

    fn insert(&mut self, key: UnitKey, location: SourceLocation, pattern: &'r Pattern) {
        let id = UnitId(self.units.len());
        self.index.insert(key.clone(), id);
        self.units.push(Unit {
            key,
            location,
            pattern,
        });
    }

    /// Returns the unit stored at `id`, or `None` if `id` came from a
    /// different table.
    #[must_use]
    pub fn unit(&self, id: UnitId) -> Option<&Unit<'r>> {
        self.units.get(id.0)
    }

    /// Looks up a unit by key.
    #[must_use]
    pub fn lookup(&self, key: &UnitKey) -> Option<UnitId> {
        self.index.get(key).copied()
    }

    /// Iterates over units in source order.
    pub fn units(&self) -> impl Iterator<Item = (UnitId, &Unit<'r>)> {
        self.units
            .iter()
            .enumerate()
            .map(|(index, unit)| (UnitId(index), unit))
    }

    /// Iterates over message units in source order.
    pub fn messages(&self) -> impl Iterator<Item = (UnitId, &Unit<'r>)> {
        self.units()
            .filter(|(_, unit)| unit.key.kind == EntryKind::Message)
    }

    /// Returns the number of units.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the table holds no units.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Resolves a reference, explaining why it failed.
    ///
    /// # Errors
    ///
    /// Returns a description of the missing entry, value, or attribute.
    pub fn resolve(&self, key: &UnitKey) -> Result<UnitId, String> {
        if let Some(id) = self.lookup(key) {
            return Ok(id);
        }
        let entry = UnitKey {
            attribute: None,
            ..key.clone()
        };
        let noun = match key.kind {
            EntryKind::Message => "message",
            EntryKind::Term => "term",
        };
        if !self.entries.contains_key(&(key.kind, key.id.clone())) {
            return Err(format!("unknown {noun} `{entry}`"));
        }
        Err(key.attribute.as_ref().map_or_else(
            || format!("{noun} `{entry}` has no value"),
            |attribute| format!("{noun} `{entry}` has no attribute `{attribute}`"),
        ))
    }
}

/// The resolved reference structure of one resource.
#[derive(Debug)]
pub struct Resolution<'r> {
    /// Units of the resource.
    pub table: SymbolTable<'r>,
    /// Reference edges between units.
    pub graph: ReferenceGraph,
    /// Units that reference something undefined.
    pub broken: BTreeSet<UnitId>,
    /// Units that take part in a reference cycle.
    pub cyclic: BTreeSet<UnitId>,
}

impl Resolution<'_> {
    /// Units that cannot be compiled because of resolution failures, including
    /// everything that depends on them.
    #[must_use]
    pub fn excluded(&self) -> BTreeSet<UnitId> {
        self.graph
            .dependents_closure(self.broken.iter().chain(&self.cyclic).copied())
    }
}

/// Builds the symbol table and reference graph of `resource`, reporting
/// undefined references and cycles.
#[must_use]
pub fn resolve<'r>(resource: &'r Resource, sink: Sink<'_>) -> Resolution<'r> {
    let table = SymbolTable::build(resource, sink);
    let mut graph = ReferenceGraph::with_units(table.len());
    let mut broken = BTreeSet::new();

    for (id, unit) in table.units() {
        let mut collector = Collector {
            table: &table,
            source: id,
            graph: &mut graph,
            sink,
            broken: false,
            source_key: &unit.key,
        };
        collector.pattern(unit.pattern);
        if collector.broken {
            broken.insert(id);
        }
    }

    let cyclic = graph.report_cycles(&table, sink);
    debug!(
        target: "fluent_elm::resolve",
        "{}: {} units, {} broken, {} cyclic",
        sink.resource(),
        table.len(),
        broken.len(),
        cyclic.len(),
    );
    Resolution {
        table,
        graph,
        broken,
        cyclic,
    }
}

struct Collector<'a, 'r> {
    table: &'a SymbolTable<'r>,
    source: UnitId,
    source_key: &'a UnitKey,
    graph: &'a mut ReferenceGraph,
    sink: Sink<'a>,
    broken: bool,
}

impl Collector<'_, '_> {
    fn pattern(&mut self, pattern: &Pattern) {
        for element in &pattern.elements {
            if let Element::Placeable(expression) = element {
                self.expression(expression);
            }
        }
    }

    fn expression(&mut self, expression: &Expression) {
        match expression {
            Expression::Inline(inline) => self.inline(inline),
            Expression::Select(select) => {
                self.inline(&select.selector);
                for variant in &select.variants {
                    self.pattern(&variant.value);
                }
            }
        }
    }

    fn inline(&mut self, inline: &Inline) {
        match &inline.kind {
            InlineKind::Message { id, attribute } => {
                self.reference(UnitKey::message(id, attribute.as_deref()), inline.location);
            }
            InlineKind::Term {
                id,
                attribute,
                arguments,
            } => {
                self.reference(UnitKey::term(id, attribute.as_deref()), inline.location);
                if let Some(arguments) = arguments {
                    self.arguments(arguments);
                }
            }
            InlineKind::Function { arguments, .. } => self.arguments(arguments),
            InlineKind::Nested(expression) => self.expression(expression),
            InlineKind::Inlined(pattern) => self.pattern(pattern),
            InlineKind::String(_)
            | InlineKind::Number(_)
            | InlineKind::Variable(_)
            | InlineKind::Invalid => {}
        }
    }

    fn arguments(&mut self, arguments: &Arguments) {
        for argument in &arguments.positional {
            self.inline(argument);
        }
        for argument in &arguments.named {
            self.inline(&argument.value);
        }
    }

    fn reference(&mut self, key: UnitKey, location: SourceLocation) {
        match self.table.resolve(&key) {
            Ok(target) => self.graph.add_edge(self.source, target, location),
            Err(reason) => {
                self.broken = true;
                self.sink.push(
                    self.sink
                        .at(DiagnosticCode::UndefinedReference, location, reason)
                        .message_id(self.source_key.to_string())
                        .build(),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{SourceFile, ingest};
    use camino::Utf8Path;
    use common::diagnostics::{Diagnostics, Report};
    use common::locale::LocaleTag;
    use rstest::rstest;

    fn parse(source: &str) -> (Resource, Diagnostics) {
        let diagnostics = Diagnostics::new();
        let locale = LocaleTag::parse("en").unwrap_or_else(|error| panic!("{error}"));
        let resource = ingest(&SourceFile::new("en", "main.ftl", source), locale, &diagnostics);
        (resource, diagnostics)
    }

    fn run(source: &str) -> (Vec<String>, Vec<String>, Report) {
        let (resource, diagnostics) = parse(source);
        let resolution = resolve(&resource, Sink::new(&diagnostics, Utf8Path::new("en/main.ftl")));
        let name = |id: UnitId| match resolution.table.unit(id) {
            Some(unit) => unit.key.to_string(),
            None => panic!("unit {id:?} should be in the table"),
        };
        let excluded = resolution.excluded().into_iter().map(name).collect();
        let cyclic = resolution.cyclic.iter().copied().map(name).collect();
        (excluded, cyclic, diagnostics.into_report())
    }

    #[rstest]
    fn indexes_values_and_attributes() {
        let (resource, diagnostics) = parse("foo = Foo\n    .title = Title\n-brand = Brand\n");
        let table = SymbolTable::build(&resource, Sink::new(&diagnostics, Utf8Path::new("x")));

        assert_eq!(table.len(), 3);
        assert!(table.lookup(&UnitKey::message("foo", Some("title"))).is_some());
        assert!(table.lookup(&UnitKey::term("brand", None)).is_some());
        assert_eq!(table.messages().count(), 2);
    }

    #[rstest]
    #[case(UnitKey::message("nope", None), "unknown message `nope`")]
    #[case(UnitKey::term("nope", None), "unknown term `-nope`")]
    #[case(UnitKey::message("foo", Some("nope")), "message `foo` has no attribute `nope`")]
    #[case(UnitKey::message("bare", None), "message `bare` has no value")]
    fn explains_failed_lookups(#[case] key: UnitKey, #[case] expected: &str) {
        let (resource, diagnostics) = parse("foo = Foo\nbare =\n    .attr = Attr\n");
        let table = SymbolTable::build(&resource, Sink::new(&diagnostics, Utf8Path::new("x")));
        assert_eq!(table.resolve(&key), Err(expected.to_owned()));
    }

    #[rstest]
    fn reports_duplicates_and_keeps_first() {
        let (resource, diagnostics) = parse("foo = First\nfoo = Second\n");
        let table = SymbolTable::build(&resource, Sink::new(&diagnostics, Utf8Path::new("x")));
        let report = diagnostics.into_report();

        assert_eq!(report.with_code(DiagnosticCode::DuplicateIdentifier).count(), 1);
        let Some(id) = table.lookup(&UnitKey::message("foo", None)) else {
            panic!("foo should be indexed");
        };
        let Some(unit) = table.unit(id) else {
            panic!("foo should resolve to a unit");
        };
        assert_eq!(unit.pattern.plain_text().as_deref(), Some("First"));
    }

    #[rstest]
    fn undefined_reference_excludes_dependents() {
        let (excluded, _, report) = run("a = { missing }\nb = { a }\nc = C\n");

        assert_eq!(excluded, vec!["a", "b"]);
        let errors: Vec<_> = report.with_code(DiagnosticCode::UndefinedReference).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message_id(), Some("a"));
        assert_eq!(errors[0].origin().location(), SourceLocation::new(1, 7));
    }

    #[rstest]
    fn mutual_references_form_one_cycle() {
        let (excluded, cyclic, report) = run("a = { b }\nb = { a }\nc = { a }\nd = D\n");

        assert_eq!(cyclic, vec!["a", "b"]);
        assert_eq!(excluded, vec!["a", "b", "c"]);
        let errors: Vec<_> = report.with_code(DiagnosticCode::ReferenceCycle).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message(), "reference cycle: a -> b -> a");
    }

    #[rstest]
    fn cycle_report_names_every_member() {
        let (excluded, cyclic, report) = run("a = { b }\nb = { a } { c }\nc = { a }\nd = D\n");

        assert_eq!(cyclic, vec!["a", "b", "c"]);
        assert_eq!(excluded, vec!["a", "b", "c"]);
        let errors: Vec<_> = report.with_code(DiagnosticCode::ReferenceCycle).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message(),
            "reference cycle: a -> b -> a (also through c)"
        );
        let labels: Vec<&str> = errors[0].related().iter().map(|related| related.label()).collect();
        assert_eq!(
            labels,
            vec![
                "`b` references `a` here",
                "`b` references `c` here",
                "`c` references `a` here",
            ]
        );
    }

    #[rstest]
    fn self_reference_is_a_cycle() {
        let (_, cyclic, report) = run("a = { a }\n");
        assert_eq!(cyclic, vec!["a"]);
        assert_eq!(report.error_count(), 1);
    }

    #[rstest]
    fn terms_participate_in_the_graph() {
        let (_, cyclic, _) = run("-t = { m }\nm = { -t }\n");
        assert_eq!(cyclic, vec!["-t", "m"]);
    }

    #[rstest]
    #[case(UnitKey::message("foo", None), "foo")]
    #[case(UnitKey::message("foo", Some("bar")), "foo.bar")]
    #[case(UnitKey::term("brand", Some("gender")), "-brand.gender")]
    fn displays_keys(#[case] key: UnitKey, #[case] expected: &str) {
        assert_eq!(key.to_string(), expected);
    }
}
