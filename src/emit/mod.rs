//! Elm code generation for assembled bundles.
//!
//! Every locale that implements at least one message gets a module of typed
//! functions at `{prefix}/{LOCALE}/{Stem}.elm`. A dispatcher module at
//! `{prefix}/Translations/{Stem}.elm` exposes one function per canonical
//! message and routes each call to the right locale module at runtime.

mod elm;
mod message;
mod module;

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use log::debug;

use crate::assemble::Bundle;

pub use elm::quote;

/// Settings that shape generated code.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmitOptions {
    /// Wrap placeables in bidi isolation marks.
    pub use_isolating: bool,
    /// Let callers attach attributes to HTML nodes by selector.
    pub dynamic_html_attributes: bool,
    /// First segment of every generated module name.
    pub module_prefix: String,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            use_isolating: true,
            dynamic_html_attributes: true,
            module_prefix: String::from("Ftl"),
        }
    }
}

/// Renders the locale modules and dispatcher of `bundle`, keyed by relative
/// path.
#[must_use]
pub fn emit(bundle: &Bundle, options: &EmitOptions) -> BTreeMap<Utf8PathBuf, String> {
    let mut modules: BTreeMap<Utf8PathBuf, String> = bundle
        .locales
        .iter()
        .filter_map(|locale| module::locale_module(bundle, locale, options))
        .collect();
    if let Some((path, source)) = module::dispatcher_module(bundle, options) {
        modules.insert(path, source);
    }
    debug!(
        target: "fluent_elm::emit",
        "{}: rendered {} modules",
        bundle.stem,
        modules.len(),
    );
    modules
}
