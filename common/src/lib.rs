//! Shared vocabulary for the fluent-elm compiler: source locations,
//! located diagnostics with a batch-scoped collector, and locale tag handling.

pub mod diagnostics;
pub mod locale;
pub mod span;

pub use diagnostics::{
    Diagnostic, DiagnosticBuilder, DiagnosticCode, Diagnostics, Origin, Related, Report, Severity,
    diagnostic,
};
pub use locale::{LocaleError, LocaleTag, fallback_chain, negotiate, normalise_locale, truncations};
pub use span::{LineIndex, SourceLocation, offset_within};
