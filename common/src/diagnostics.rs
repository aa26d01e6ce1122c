//! Diagnostics shared by every compiler phase.
//!
//! Phases never stop at the first problem. They push a [`Diagnostic`] into the
//! batch-scoped [`Diagnostics`] collector and carry on with a degraded value.
//! Once the batch completes the collector freezes into a [`Report`] whose
//! entries are sorted by source location, so the output does not depend on
//! the order in which worker threads finished.

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::Mutex;
use serde::Serialize;

use crate::span::SourceLocation;

/// Severity of a diagnostic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks emission for the affected message or locale and fails the batch.
    Error,
    /// Reported but never blocks emission.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => formatter.write_str("error"),
            Self::Warning => formatter.write_str("warning"),
        }
    }
}

/// Stable, machine-readable diagnostic codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticCode {
    /// The Fluent parser rejected part of a resource.
    ParseError,
    /// A message, term, attribute, or function does not exist.
    UndefinedReference,
    /// Messages or terms reference each other in a loop.
    ReferenceCycle,
    /// An identifier or attribute is defined twice.
    DuplicateIdentifier,
    /// A variable is used with incompatible types.
    TypeConflict,
    /// A translation diverges from the default locale's argument contract.
    SignatureIncompatibility,
    /// A message or resource is missing from the default locale.
    MissingDefaultLocaleMessage,
    /// Markup is malformed or uses dynamic names.
    HtmlStructure,
    /// Two identifiers map to the same target-language name.
    IdentifierCollision,
    /// A translation is missing and the default locale will be used instead.
    MissingTranslation,
    /// A builtin function is called with bad arguments or options.
    FunctionCall,
    /// A term is called with unsupported arguments.
    TermArgument,
    /// A markup-producing message is used where plain text is required.
    HtmlTypeMismatch,
    /// A select expression does not have exactly one default variant.
    SelectDefault,
    /// Term references nest deeper than the compiler inlines.
    TermDepth,
}

impl DiagnosticCode {
    /// Returns the kebab-case code string.
    ///
    /// # Examples
    ///
    /// ```
    /// use common::diagnostics::DiagnosticCode;
    ///
    /// assert_eq!(DiagnosticCode::ReferenceCycle.as_str(), "reference-cycle");
    /// ```
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ParseError => "parse-error",
            Self::UndefinedReference => "undefined-reference",
            Self::ReferenceCycle => "reference-cycle",
            Self::DuplicateIdentifier => "duplicate-identifier",
            Self::TypeConflict => "type-conflict",
            Self::SignatureIncompatibility => "signature-incompatibility",
            Self::MissingDefaultLocaleMessage => "missing-default-locale-message",
            Self::HtmlStructure => "html-structure",
            Self::IdentifierCollision => "identifier-collision",
            Self::MissingTranslation => "missing-translation",
            Self::FunctionCall => "function-call",
            Self::TermArgument => "term-argument",
            Self::HtmlTypeMismatch => "html-type-mismatch",
            Self::SelectDefault => "select-default",
            Self::TermDepth => "term-depth",
        }
    }

    /// Returns the severity the code carries unless a caller overrides it.
    #[must_use]
    pub const fn default_severity(self) -> Severity {
        match self {
            Self::MissingTranslation => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A resource path paired with a location inside it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Origin {
    resource: Utf8PathBuf,
    #[serde(flatten)]
    location: SourceLocation,
}

impl Origin {
    /// Builds an origin.
    ///
    /// # Examples
    ///
    /// ```
    /// use common::diagnostics::Origin;
    /// use common::span::SourceLocation;
    ///
    /// let origin = Origin::new("en/main.ftl", SourceLocation::new(2, 7));
    /// assert_eq!(origin.to_string(), "en/main.ftl:2:7");
    /// ```
    #[must_use]
    pub fn new(resource: impl Into<Utf8PathBuf>, location: SourceLocation) -> Self {
        Self {
            resource: resource.into(),
            location,
        }
    }

    /// Returns the resource path.
    #[must_use]
    pub fn resource(&self) -> &Utf8Path {
        &self.resource
    }

    /// Returns the location within the resource.
    #[must_use]
    pub const fn location(&self) -> SourceLocation {
        self.location
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            formatter,
            "{}:{}:{}",
            self.resource,
            self.location.line(),
            self.location.column()
        )
    }
}

/// A secondary site attached to a diagnostic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Related {
    #[serde(flatten)]
    origin: Origin,
    label: String,
}

impl Related {
    /// Returns the related origin.
    #[must_use]
    pub const fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Returns the label describing the related site.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// A located compiler diagnostic.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    severity: Severity,
    code: DiagnosticCode,
    #[serde(flatten)]
    origin: Origin,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    related: Vec<Related>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    notes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    helps: Vec<String>,
}

impl Diagnostic {
    /// Returns the severity.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the stable code.
    #[must_use]
    pub const fn code(&self) -> DiagnosticCode {
        self.code
    }

    /// Returns the primary origin.
    #[must_use]
    pub const fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Returns the primary message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the Fluent identifier the diagnostic concerns, if any.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// Returns secondary sites.
    #[must_use]
    pub fn related(&self) -> &[Related] {
        &self.related
    }

    /// Returns additional diagnostic notes.
    #[must_use]
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Returns help messages.
    #[must_use]
    pub fn helps(&self) -> &[String] {
        &self.helps
    }

    /// Whether the diagnostic is an error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    fn sort_key(
        &self,
    ) -> (&Utf8Path, SourceLocation, Severity, DiagnosticCode, Option<&str>, &str) {
        (
            self.origin.resource(),
            self.origin.location(),
            self.severity,
            self.code,
            self.message_id(),
            self.message(),
        )
    }
}

/// Builder for [`Diagnostic`] instances.
pub struct DiagnosticBuilder {
    diagnostic: Diagnostic,
}

impl DiagnosticBuilder {
    fn new(code: DiagnosticCode, origin: Origin, message: impl Into<String>) -> Self {
        Self {
            diagnostic: Diagnostic {
                severity: code.default_severity(),
                code,
                origin,
                message: message.into(),
                message_id: None,
                related: Vec::new(),
                notes: Vec::new(),
                helps: Vec::new(),
            },
        }
    }

    /// Overrides the severity implied by the code.
    #[must_use]
    pub const fn severity(mut self, severity: Severity) -> Self {
        self.diagnostic.severity = severity;
        self
    }

    /// Records the Fluent identifier the diagnostic concerns.
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.diagnostic.message_id = Some(id.into());
        self
    }

    /// Adds a secondary site.
    #[must_use]
    pub fn related(mut self, origin: Origin, label: impl Into<String>) -> Self {
        self.diagnostic.related.push(Related {
            origin,
            label: label.into(),
        });
        self
    }

    /// Adds a note to the diagnostic.
    #[must_use]
    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.diagnostic.notes.push(note.into());
        self
    }

    /// Adds a help message to the diagnostic.
    #[must_use]
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.diagnostic.helps.push(help.into());
        self
    }

    /// Completes the builder and returns the diagnostic.
    #[must_use]
    pub fn build(self) -> Diagnostic {
        self.diagnostic
    }
}

/// Starts building a diagnostic at `origin`.
///
/// # Examples
///
/// ```
/// use common::diagnostics::{DiagnosticCode, Origin, Severity, diagnostic};
/// use common::span::SourceLocation;
///
/// let origin = Origin::new("en/main.ftl", SourceLocation::new(1, 1));
/// let built = diagnostic(DiagnosticCode::MissingTranslation, origin, "missing")
///     .message_id("hello")
///     .build();
/// assert_eq!(built.severity(), Severity::Warning);
/// assert_eq!(built.message_id(), Some("hello"));
/// ```
#[must_use]
pub fn diagnostic(
    code: DiagnosticCode,
    origin: Origin,
    message: impl Into<String>,
) -> DiagnosticBuilder {
    DiagnosticBuilder::new(code, origin, message)
}

/// Append-only collector shared by the phases of one compilation batch.
///
/// Appends are serialised through a mutex so per-locale workers can report
/// concurrently.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Mutex<Vec<Diagnostic>>,
}

impl Diagnostics {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one diagnostic.
    pub fn push(&self, diagnostic: Diagnostic) {
        self.entries.lock().push(diagnostic);
    }

    /// Appends every diagnostic in `diagnostics`.
    pub fn extend<I>(&self, diagnostics: I)
    where
        I: IntoIterator<Item = Diagnostic>,
    {
        self.entries.lock().extend(diagnostics);
    }

    /// Returns the number of collected diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns the number of collected errors.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.is_error())
            .count()
    }

    /// Freezes the collector into a sorted [`Report`].
    #[must_use]
    pub fn into_report(self) -> Report {
        Report::new(self.entries.into_inner())
    }
}

/// The frozen, location-sorted diagnostics of a batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    diagnostics: Vec<Diagnostic>,
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    success: bool,
    errors: usize,
    warnings: usize,
    diagnostics: &'a [Diagnostic],
}

impl Report {
    /// Builds a report, sorting entries by resource, location, and code.
    #[must_use]
    pub fn new(mut diagnostics: Vec<Diagnostic>) -> Self {
        diagnostics.sort_by(|left, right| left.sort_key().cmp(&right.sort_key()));
        Self { diagnostics }
    }

    /// Returns every diagnostic in report order.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Iterates over errors.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|entry| entry.is_error())
    }

    /// Iterates over warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|entry| !entry.is_error())
    }

    /// Returns the diagnostics carrying `code`.
    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |entry| entry.code() == code)
    }

    /// Returns the number of errors.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// A batch succeeds when no errors were collected.
    #[must_use]
    pub fn success(&self) -> bool {
        self.error_count() == 0
    }

    /// Serialises the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns the serialiser error if encoding fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&ReportDocument {
            success: self.success(),
            errors: self.error_count(),
            warnings: self.warning_count(),
            diagnostics: &self.diagnostics,
        })
    }

    /// Renders the report for terminals.
    ///
    /// # Examples
    ///
    /// ```
    /// use common::diagnostics::{DiagnosticCode, Origin, Report, diagnostic};
    /// use common::span::SourceLocation;
    ///
    /// let origin = Origin::new("en/main.ftl", SourceLocation::new(3, 9));
    /// let report = Report::new(vec![
    ///     diagnostic(DiagnosticCode::UndefinedReference, origin, "unknown message `nope`")
    ///         .message_id("greeting")
    ///         .build(),
    /// ]);
    /// assert_eq!(
    ///     report.render_human(),
    ///     "en/main.ftl:3:9: error[undefined-reference]: In message 'greeting': unknown message `nope`\n",
    /// );
    /// ```
    #[must_use]
    pub fn render_human(&self) -> String {
        self.diagnostics.iter().map(ToString::to_string).collect()
    }
}

/// Renders one entry, with its related sites, notes, and help, each on its
/// own line.
impl fmt::Display for Diagnostic {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}: {}[{}]: ", self.origin, self.severity, self.code)?;
        if let Some(id) = self.message_id() {
            write!(formatter, "In message '{id}': ")?;
        }
        writeln!(formatter, "{}", self.message)?;
        for related in &self.related {
            writeln!(formatter, "  {}: {}", related.origin, related.label)?;
        }
        for note in &self.notes {
            writeln!(formatter, "  = note: {note}")?;
        }
        for help in &self.helps {
            writeln!(formatter, "  = help: {help}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn at(resource: &str, line: usize, column: usize) -> Origin {
        Origin::new(resource, SourceLocation::new(line, column))
    }

    #[fixture]
    fn unordered() -> Vec<Diagnostic> {
        vec![
            diagnostic(DiagnosticCode::TypeConflict, at("en/b.ftl", 1, 1), "b").build(),
            diagnostic(DiagnosticCode::MissingTranslation, at("en/a.ftl", 4, 2), "w").build(),
            diagnostic(DiagnosticCode::UndefinedReference, at("en/a.ftl", 2, 8), "u").build(),
        ]
    }

    #[rstest]
    fn builds_diagnostic() {
        let built = diagnostic(DiagnosticCode::TypeConflict, at("en/main.ftl", 2, 1), "Message")
            .message_id("total")
            .related(at("en/main.ftl", 3, 4), "other use")
            .note("Note")
            .help("Help")
            .build();

        assert_eq!(built.code(), DiagnosticCode::TypeConflict);
        assert_eq!(built.severity(), Severity::Error);
        assert_eq!(built.related().len(), 1);
        assert_eq!(built.notes(), &[String::from("Note")]);
        assert_eq!(built.helps(), &[String::from("Help")]);
    }

    #[rstest]
    #[case(DiagnosticCode::MissingTranslation, Severity::Warning)]
    #[case(DiagnosticCode::ParseError, Severity::Error)]
    #[case(DiagnosticCode::HtmlStructure, Severity::Error)]
    fn codes_carry_default_severity(#[case] code: DiagnosticCode, #[case] expected: Severity) {
        assert_eq!(code.default_severity(), expected);
    }

    #[rstest]
    fn severity_can_be_escalated() {
        let built = diagnostic(DiagnosticCode::MissingTranslation, at("de/main.ftl", 1, 1), "x")
            .severity(Severity::Error)
            .build();
        assert!(built.is_error());
    }

    #[rstest]
    fn report_sorts_by_resource_then_location(unordered: Vec<Diagnostic>) {
        let report = Report::new(unordered);
        let messages: Vec<&str> = report.diagnostics().iter().map(Diagnostic::message).collect();
        assert_eq!(messages, vec!["u", "w", "b"]);
    }

    #[rstest]
    fn report_order_is_independent_of_insertion(unordered: Vec<Diagnostic>) {
        let mut reversed = unordered.clone();
        reversed.reverse();
        assert_eq!(Report::new(unordered), Report::new(reversed));
    }

    #[rstest]
    fn collector_counts_errors(unordered: Vec<Diagnostic>) {
        let collector = Diagnostics::new();
        collector.extend(unordered);
        assert_eq!(collector.len(), 3);
        assert_eq!(collector.error_count(), 2);

        let report = collector.into_report();
        assert!(!report.success());
        assert_eq!(report.warning_count(), 1);
    }

    #[rstest]
    fn collector_accepts_concurrent_appends() {
        let collector = Diagnostics::new();
        std::thread::scope(|scope| {
            for line in 1..=4 {
                let shared = &collector;
                scope.spawn(move || {
                    shared.push(
                        diagnostic(DiagnosticCode::ParseError, at("en/main.ftl", line, 1), "p")
                            .build(),
                    );
                });
            }
        });
        assert_eq!(collector.len(), 4);
    }

    #[rstest]
    fn empty_report_succeeds() {
        assert!(Diagnostics::new().into_report().success());
    }

    #[rstest]
    fn json_flattens_origin(unordered: Vec<Diagnostic>) {
        let json = Report::new(unordered).to_json().unwrap_or_default();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap_or_default();

        assert_eq!(value["success"], serde_json::Value::Bool(false));
        assert_eq!(value["diagnostics"][0]["resource"], "en/a.ftl");
        assert_eq!(value["diagnostics"][0]["line"], 2);
        assert_eq!(value["diagnostics"][0]["column"], 8);
        assert_eq!(value["diagnostics"][0]["code"], "undefined-reference");
        assert_eq!(value["diagnostics"][1]["severity"], "warning");
    }

    #[rstest]
    fn renders_related_sites_and_help() {
        let report = Report::new(vec![
            diagnostic(DiagnosticCode::TypeConflict, at("en/main.ftl", 1, 5), "conflict")
                .related(at("en/main.ftl", 2, 5), "used as a date here")
                .help("use NUMBER()")
                .build(),
        ]);

        assert_eq!(
            report.render_human(),
            concat!(
                "en/main.ftl:1:5: error[type-conflict]: conflict\n",
                "  en/main.ftl:2:5: used as a date here\n",
                "  = help: use NUMBER()\n",
            )
        );
    }

    #[rstest]
    fn human_report_joins_entries_in_order(unordered: Vec<Diagnostic>) {
        let report = Report::new(unordered);
        let entries: Vec<String> = report.diagnostics().iter().map(ToString::to_string).collect();

        assert_eq!(entries.len(), report.diagnostics().len());
        assert!(entries.iter().all(|entry| entry.ends_with('\n')));
        assert_eq!(report.render_human(), entries.concat());
    }

    #[rstest]
    fn single_entries_render_notes_after_related_sites() {
        let entry = diagnostic(DiagnosticCode::ReferenceCycle, at("en/main.ftl", 1, 7), "cycle")
            .message_id("a")
            .related(at("en/main.ftl", 2, 7), "`b` references `a` here")
            .note("left out")
            .build();

        assert_eq!(
            entry.to_string(),
            concat!(
                "en/main.ftl:1:7: error[reference-cycle]: In message 'a': cycle\n",
                "  en/main.ftl:2:7: `b` references `a` here\n",
                "  = note: left out\n",
            )
        );
    }
}
