//! Resource-scoped view onto the batch diagnostics collector.

use camino::Utf8Path;
use common::diagnostics::{
    Diagnostic, DiagnosticBuilder, DiagnosticCode, Diagnostics, Origin, diagnostic,
};
use common::span::SourceLocation;

/// Reports diagnostics against one resource.
#[derive(Clone, Copy)]
pub struct Sink<'a> {
    diagnostics: &'a Diagnostics,
    resource: &'a Utf8Path,
}

impl<'a> Sink<'a> {
    /// Binds `diagnostics` to `resource`.
    #[must_use]
    pub const fn new(diagnostics: &'a Diagnostics, resource: &'a Utf8Path) -> Self {
        Self {
            diagnostics,
            resource,
        }
    }

    /// Returns the resource path.
    #[must_use]
    pub const fn resource(&self) -> &'a Utf8Path {
        self.resource
    }

    /// Returns an origin inside the resource.
    #[must_use]
    pub fn origin(&self, location: SourceLocation) -> Origin {
        Origin::new(self.resource, location)
    }

    /// Starts a diagnostic at `location`.
    #[must_use]
    pub fn at(
        &self,
        code: DiagnosticCode,
        location: SourceLocation,
        message: impl Into<String>,
    ) -> DiagnosticBuilder {
        diagnostic(code, self.origin(location), message)
    }

    /// Records a finished diagnostic.
    pub fn push(&self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }
}
