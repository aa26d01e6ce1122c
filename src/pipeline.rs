//! Batch orchestration.
//!
//! A batch is grouped into bundles by stem. Within a stem every locale is
//! analysed independently on the rayon pool (ingest, resolve, expand, infer,
//! then HTML compilation) and the results are joined for assembly and
//! emission. All diagnostics land in one collector and come back as a sorted
//! [`Report`]; only malformed batch input is an `Err`.

use std::collections::{BTreeMap, BTreeSet};

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use common::diagnostics::{Diagnostics, Report};
use common::locale::{LocaleError, LocaleTag};
use log::{info, warn};
use rayon::prelude::*;
use thiserror::Error;

use crate::assemble::{AnalysedMessage, Body, LocaleResource, Policy, assemble};
use crate::config::CompilerConfig;
use crate::emit::emit;
use crate::expand::expand;
use crate::html;
use crate::infer::infer;
use crate::ingest::{SourceFile, ingest};
use crate::resolve::{UnitId, resolve};
use crate::sink::Sink;

/// Problems with the batch itself, as opposed to its contents.
#[derive(Debug, Error)]
pub enum BatchError {
    /// No source files were supplied.
    #[error("the batch contains no resources")]
    EmptyBatch,
    /// A file names a locale that is not a BCP 47 tag.
    #[error("`{path}`: {source}")]
    InvalidLocale {
        /// The diagnostic path of the file.
        path: Utf8PathBuf,
        /// Why the tag was rejected.
        source: LocaleError,
    },
    /// The configured default locale is not a BCP 47 tag.
    #[error("default locale: {0}")]
    InvalidDefaultLocale(#[source] LocaleError),
    /// A stem is absolute, escapes its root, or is not an `.ftl` file.
    #[error("`{path}` is not a relative `.ftl` path")]
    InvalidPath {
        /// The rejected stem.
        path: Utf8PathBuf,
    },
    /// Two files share a locale and stem.
    #[error("`{stem}` is supplied more than once for `{locale}`")]
    DuplicateResource {
        /// The repeated locale.
        locale: LocaleTag,
        /// The repeated stem.
        stem: Utf8PathBuf,
    },
    /// Nothing in the batch belongs to the default locale.
    #[error("no resources belong to the default locale `{locale}`")]
    MissingDefaultLocale {
        /// The configured default locale.
        locale: LocaleTag,
    },
}

/// Generated modules and the diagnostics of one batch.
#[derive(Debug)]
pub struct CompileOutput {
    /// Elm source keyed by path relative to the output root.
    pub modules: BTreeMap<Utf8PathBuf, String>,
    /// Every diagnostic the batch produced, sorted by location.
    pub report: Report,
}

impl CompileOutput {
    /// Whether the batch finished without errors.
    #[must_use]
    pub fn success(&self) -> bool {
        self.report.success()
    }
}

/// Validated batch input grouped by stem.
struct Plan<'f> {
    locales: Vec<LocaleTag>,
    stems: BTreeMap<Utf8PathBuf, Vec<(LocaleTag, &'f SourceFile)>>,
}

impl<'f> Plan<'f> {
    fn new(files: &'f [SourceFile], default_locale: &LocaleTag) -> Result<Self, BatchError> {
        if files.is_empty() {
            return Err(BatchError::EmptyBatch);
        }
        let mut locales = BTreeSet::new();
        let mut seen = BTreeSet::new();
        let mut stems: BTreeMap<Utf8PathBuf, Vec<(LocaleTag, &'f SourceFile)>> = BTreeMap::new();
        for file in files {
            let locale =
                LocaleTag::parse(file.locale()).map_err(|source| BatchError::InvalidLocale {
                    path: file.origin().to_owned(),
                    source,
                })?;
            if !is_resource_path(file.stem()) {
                return Err(BatchError::InvalidPath {
                    path: file.stem().to_owned(),
                });
            }
            if !seen.insert((locale.clone(), file.stem().to_owned())) {
                return Err(BatchError::DuplicateResource {
                    locale,
                    stem: file.stem().to_owned(),
                });
            }
            locales.insert(locale.clone());
            stems
                .entry(file.stem().to_owned())
                .or_default()
                .push((locale, file));
        }
        if !locales.contains(default_locale) {
            return Err(BatchError::MissingDefaultLocale {
                locale: default_locale.clone(),
            });
        }
        for inputs in stems.values_mut() {
            inputs.sort_by(|left, right| left.0.cmp(&right.0));
        }
        Ok(Self {
            locales: locales.into_iter().collect(),
            stems,
        })
    }
}

fn is_resource_path(path: &Utf8Path) -> bool {
    path.extension() == Some("ftl")
        && path
            .components()
            .all(|component| matches!(component, Utf8Component::Normal(_)))
}

/// Compiles a batch of Fluent resources into Elm modules.
///
/// Content problems never fail the call: they are collected in
/// [`CompileOutput::report`], and whatever could still be compiled is
/// emitted.
///
/// # Errors
///
/// Returns [`BatchError`] when the batch is empty, a locale tag or stem is
/// malformed, a (locale, stem) pair repeats, or no file belongs to the
/// default locale.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use fluent_elm::{CompilerConfig, SourceFile, compile_batch};
///
/// let files = [SourceFile::new("en", "main.ftl", "hello = Hello, { $name }!\n")];
/// let output = compile_batch(&files, &CompilerConfig::default())?;
/// assert!(output.success());
/// assert!(output.modules.contains_key(Utf8Path::new("Ftl/EN/Main.elm")));
/// assert!(output.modules.contains_key(Utf8Path::new("Ftl/Translations/Main.elm")));
/// # Ok::<(), fluent_elm::BatchError>(())
/// ```
pub fn compile_batch(
    files: &[SourceFile],
    config: &CompilerConfig,
) -> Result<CompileOutput, BatchError> {
    let default_locale =
        LocaleTag::parse(&config.default_locale).map_err(BatchError::InvalidDefaultLocale)?;
    let plan = Plan::new(files, &default_locale)?;
    let diagnostics = Diagnostics::new();
    let options = config.emit_options();
    let policy = Policy {
        default_locale: &default_locale,
        missing_translation: config.missing_translation.severity(),
    };

    let mut modules = BTreeMap::new();
    for (stem, inputs) in &plan.stems {
        let resources: Vec<LocaleResource> = inputs
            .par_iter()
            .map(|(locale, file)| analyse(file, locale.clone(), &diagnostics))
            .collect();
        if let Some(bundle) = assemble(stem, resources, &plan.locales, policy, &diagnostics) {
            modules.extend(emit(&bundle, &options));
        }
    }

    let report = diagnostics.into_report();
    info!(
        target: "fluent_elm::pipeline",
        "compiled {} resource(s) in {} bundle(s): {} error(s), {} warning(s), {} module(s)",
        files.len(),
        plan.stems.len(),
        report.error_count(),
        report.warning_count(),
        modules.len(),
    );
    Ok(CompileOutput { modules, report })
}

/// Runs every per-locale phase over one file.
fn analyse(file: &SourceFile, locale: LocaleTag, diagnostics: &Diagnostics) -> LocaleResource {
    let resource = ingest(file, locale, diagnostics);
    let sink = Sink::new(diagnostics, &resource.origin);
    let resolution = resolve(&resource, sink);
    let excluded = resolution.excluded();
    let expansion = expand(&resolution, &excluded, sink);
    let inference = infer(&resolution, &expansion, sink);

    let mut blocked: BTreeSet<UnitId> = excluded
        .iter()
        .chain(&expansion.broken)
        .chain(&inference.broken)
        .copied()
        .collect();
    let mut messages = BTreeMap::new();
    for (id, unit) in resolution.table.messages() {
        let body = expansion.patterns.get(&id).map(|pattern| {
            if unit.key.is_html() {
                let compiled = html::compile(pattern, &unit.key.to_string(), sink);
                if compiled.broken {
                    blocked.insert(id);
                }
                Body::Html(compiled.fragment)
            } else {
                Body::Text(pattern.clone())
            }
        });
        messages.insert(
            id,
            AnalysedMessage {
                key: unit.key.clone(),
                location: unit.location,
                body,
                signature: inference.signatures.get(&id).cloned().unwrap_or_default(),
            },
        );
    }
    if resource.parse_failed {
        blocked.extend(messages.keys().copied());
    }
    if !blocked.is_empty() {
        warn!(
            target: "fluent_elm::pipeline",
            "{}: {} unit(s) blocked from emission",
            resource.origin,
            blocked.len(),
        );
    }

    LocaleResource {
        locale: resource.locale.clone(),
        origin: resource.origin.clone(),
        graph: resolution.graph,
        messages,
        blocked,
    }
}
