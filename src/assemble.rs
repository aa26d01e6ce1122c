//! Locale fallback assembly.
//!
//! Each locale's analysis of a resource stem arrives as a [`LocaleResource`].
//! The default locale's messages define the surface: every one that survives
//! analysis and naming becomes a [`CanonicalMessage`] with a slot per locale
//! that can render it, plus the dispatch table that sends every batch locale
//! to the most specific implementation along its fallback chain. Errors
//! block a unit and everything that renders it, within its locale only.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use camino::{Utf8Path, Utf8PathBuf};
use common::diagnostics::{DiagnosticCode, Diagnostics, Origin, Severity};
use common::locale::{LocaleTag, fallback_chain};
use common::span::SourceLocation;
use log::{debug, warn};

use crate::ast::Pattern;
use crate::html::HtmlFragment;
use crate::infer::{ArgumentType, Signature};
use crate::naming::{NameClash, NameRegistry, field_name, function_name, is_keyword};
use crate::resolve::{ReferenceGraph, UnitId, UnitKey};
use crate::sink::Sink;

/// The compiled body of one message in one locale.
#[derive(Clone, Debug, PartialEq)]
pub enum Body {
    /// The expanded pattern of a text message.
    Text(Pattern),
    /// The node tree of an HTML message.
    Html(HtmlFragment),
}

/// One message unit after per-locale analysis.
#[derive(Clone, Debug)]
pub struct AnalysedMessage {
    /// The unit's key.
    pub key: UnitKey,
    /// Location of the identifier or attribute name.
    pub location: SourceLocation,
    /// The compiled body, or `None` when resolution excluded the unit.
    pub body: Option<Body>,
    /// The inferred signature.
    pub signature: Signature,
}

/// Everything assembly needs from one locale's resource.
#[derive(Debug)]
pub struct LocaleResource {
    /// The resource's locale.
    pub locale: LocaleTag,
    /// Path used in diagnostics.
    pub origin: Utf8PathBuf,
    /// References between all units, terms included.
    pub graph: ReferenceGraph,
    /// Message units by id.
    pub messages: BTreeMap<UnitId, AnalysedMessage>,
    /// Units that reported an error during analysis.
    pub blocked: BTreeSet<UnitId>,
}

impl LocaleResource {
    fn lookup(&self, key: &UnitKey) -> Option<UnitId> {
        self.messages
            .iter()
            .find(|(_, message)| &message.key == key)
            .map(|(id, _)| *id)
    }

    /// Message units reachable from `unit` through terms, with the location of
    /// the first reference on the way.
    fn message_references(&self, unit: UnitId) -> Vec<(UnitId, SourceLocation)> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        let mut pending: Vec<(UnitId, SourceLocation)> = self
            .graph
            .edges(unit)
            .iter()
            .map(|edge| (edge.target, edge.location))
            .collect();
        while let Some((target, location)) = pending.pop() {
            if !seen.insert(target) {
                continue;
            }
            if self.messages.contains_key(&target) {
                found.push((target, location));
            } else {
                pending.extend(
                    self.graph
                        .edges(target)
                        .iter()
                        .map(|edge| (edge.target, location)),
                );
            }
        }
        found
    }
}

/// A message of the default locale with its per-locale implementations.
#[derive(Clone, Debug)]
pub struct CanonicalMessage {
    /// The unit's key.
    pub key: UnitKey,
    /// The target-language function name.
    pub function: String,
    /// The argument contract, taken from the default locale.
    pub signature: Signature,
    /// Whether the message renders markup.
    pub html: bool,
    /// Implementations by locale.
    pub slots: BTreeMap<LocaleTag, Body>,
    /// For every batch locale, the locale whose implementation it uses.
    pub dispatch: BTreeMap<LocaleTag, LocaleTag>,
}

/// The canonical registry of one resource stem.
#[derive(Clone, Debug)]
pub struct Bundle {
    /// The stem shared by the merged resources.
    pub stem: Utf8PathBuf,
    /// The authoritative locale.
    pub default_locale: LocaleTag,
    /// Every locale of the batch, sorted.
    pub locales: Vec<LocaleTag>,
    /// Messages in default-locale source order.
    pub messages: Vec<CanonicalMessage>,
}

impl Bundle {
    /// Messages implemented in `locale`, in source order.
    #[must_use]
    pub fn implemented_in<'b>(
        &'b self,
        locale: &'b LocaleTag,
    ) -> impl Iterator<Item = (&'b CanonicalMessage, &'b Body)> {
        self.messages
            .iter()
            .filter_map(move |message| message.slots.get(locale).map(|body| (message, body)))
    }
}

/// How assembly treats gaps.
#[derive(Clone, Copy, Debug)]
pub struct Policy<'p> {
    /// The authoritative locale.
    pub default_locale: &'p LocaleTag,
    /// Severity of a missing translation.
    pub missing_translation: Severity,
}

/// Merges one stem's locale resources into a [`Bundle`].
///
/// Returns `None` when the default locale has no resource for the stem.
#[must_use]
pub fn assemble(
    stem: &Utf8Path,
    mut resources: Vec<LocaleResource>,
    locales: &[LocaleTag],
    policy: Policy<'_>,
    diagnostics: &Diagnostics,
) -> Option<Bundle> {
    let default_locale = policy.default_locale;
    let Some(position) = resources
        .iter()
        .position(|resource| &resource.locale == default_locale)
    else {
        if let Some(first) = resources.first() {
            let sink = Sink::new(diagnostics, &first.origin);
            sink.push(
                sink.at(
                    DiagnosticCode::MissingDefaultLocaleMessage,
                    SourceLocation::new(1, 1),
                    format!("`{stem}` has no `{default_locale}` resource"),
                )
                .note("the default locale defines every message a resource may contain")
                .build(),
            );
        }
        warn!(target: "fluent_elm::assemble", "{stem}: skipped, no default locale resource");
        return None;
    };
    let default = resources.swap_remove(position);
    let translations = resources;
    let default_sink = Sink::new(diagnostics, &default.origin);

    for locale in locales {
        if locale == default_locale
            || translations.iter().any(|resource| &resource.locale == locale)
        {
            continue;
        }
        default_sink.push(
            default_sink
                .at(
                    DiagnosticCode::MissingTranslation,
                    SourceLocation::new(1, 1),
                    format!("`{stem}` has no `{locale}` translation; `{default_locale}` text will be used"),
                )
                .severity(policy.missing_translation)
                .build(),
        );
    }

    let mut seeds = name_collisions(&default, default_sink);
    seeds.extend(default.blocked.iter().copied());
    let default_blocked = default.graph.dependents_closure(seeds);
    if !default_blocked.is_empty() {
        warn!(
            target: "fluent_elm::assemble",
            "{stem}: {} `{default_locale}` units blocked",
            default_blocked.len(),
        );
    }

    let surviving: BTreeMap<UnitKey, &AnalysedMessage> = default
        .messages
        .iter()
        .filter(|(id, message)| !default_blocked.contains(id) && message.body.is_some())
        .map(|(_, message)| (message.key.clone(), message))
        .collect();
    let defined: HashSet<&UnitKey> = default
        .messages
        .values()
        .map(|message| &message.key)
        .collect();

    let translation_blocked: Vec<BTreeSet<UnitId>> = translations
        .iter()
        .map(|translation| {
            check_translation(translation, &default, &defined, &surviving, diagnostics)
        })
        .collect();

    let mut messages = Vec::with_capacity(surviving.len());
    for (id, message) in &default.messages {
        if default_blocked.contains(id) {
            continue;
        }
        let Some(body) = &message.body else {
            continue;
        };
        let mut slots = BTreeMap::new();
        slots.insert(default_locale.clone(), body.clone());

        for (translation, blocked) in translations.iter().zip(&translation_blocked) {
            match translation.lookup(&message.key) {
                Some(unit) if !blocked.contains(&unit) => {
                    if let Some(translated) = translation
                        .messages
                        .get(&unit)
                        .and_then(|found| found.body.clone())
                    {
                        slots.insert(translation.locale.clone(), translated);
                    }
                }
                Some(_) => {}
                None => default_sink.push(
                    default_sink
                        .at(
                            DiagnosticCode::MissingTranslation,
                            message.location,
                            format!(
                                "`{}` has no `{}` translation; `{default_locale}` text will be used",
                                message.key, translation.locale
                            ),
                        )
                        .severity(policy.missing_translation)
                        .message_id(message.key.to_string())
                        .build(),
                ),
            }
        }

        let available: Vec<LocaleTag> = slots.keys().cloned().collect();
        let dispatch = locales
            .iter()
            .map(|locale| {
                let chain = fallback_chain(locale, locales, default_locale);
                let chosen = chain
                    .into_iter()
                    .find(|candidate| available.contains(candidate))
                    .unwrap_or_else(|| default_locale.clone());
                (locale.clone(), chosen)
            })
            .collect();

        messages.push(CanonicalMessage {
            key: message.key.clone(),
            function: function_name(&message.key.id, message.key.attribute.as_deref()),
            signature: message.signature.clone(),
            html: message.key.is_html(),
            slots,
            dispatch,
        });
    }

    debug!(
        target: "fluent_elm::assemble",
        "{stem}: {} canonical messages across {} locales",
        messages.len(),
        locales.len(),
    );
    Some(Bundle {
        stem: stem.to_owned(),
        default_locale: default_locale.clone(),
        locales: locales.to_vec(),
        messages,
    })
}

/// Reports function and field names that cannot be emitted.
fn name_collisions(default: &LocaleResource, sink: Sink<'_>) -> BTreeSet<UnitId> {
    let mut colliding = BTreeSet::new();
    let mut registry = NameRegistry::default();
    for (id, message) in &default.messages {
        let source = message.key.to_string();
        let name = function_name(&message.key.id, message.key.attribute.as_deref());
        let problem = match registry.claim(&name, &source) {
            Ok(()) => None,
            Err(NameClash::Reserved) => Some(format!(
                "`{source}` compiles to `{name}`, which is reserved in Elm"
            )),
            Err(NameClash::Taken(owner)) => Some(format!(
                "`{source}` and `{owner}` both compile to `{name}`"
            )),
        };
        if let Some(reason) = problem {
            colliding.insert(*id);
            sink.push(
                sink.at(DiagnosticCode::IdentifierCollision, message.location, reason)
                    .message_id(source.clone())
                    .help("choose another identifier")
                    .build(),
            );
        }

        let mut fields: BTreeMap<String, &str> = BTreeMap::new();
        for (variable, field) in message.signature.fields() {
            let target = field_name(variable);
            let clash = if is_keyword(&target) {
                Some(format!("`${variable}` compiles to the Elm keyword `{target}`"))
            } else if let Some(other) = fields.insert(target.clone(), variable) {
                Some(format!(
                    "`${variable}` and `${other}` both compile to the field `{target}`"
                ))
            } else {
                None
            };
            if let Some(reason) = clash {
                colliding.insert(*id);
                sink.push(
                    sink.at(DiagnosticCode::IdentifierCollision, field.location, reason)
                        .message_id(source.clone())
                        .build(),
                );
            }
        }
    }
    colliding
}

/// Whether two argument types render to the same target type.
fn same_rendering(left: ArgumentType, right: ArgumentType) -> bool {
    let text = |ty: ArgumentType| {
        if ty == ArgumentType::String {
            ArgumentType::Unknown
        } else {
            ty
        }
    };
    text(left) == text(right)
}

/// Checks a translation against the default locale and returns its blocked
/// units.
fn check_translation(
    translation: &LocaleResource,
    default: &LocaleResource,
    defined: &HashSet<&UnitKey>,
    surviving: &BTreeMap<UnitKey, &AnalysedMessage>,
    diagnostics: &Diagnostics,
) -> BTreeSet<UnitId> {
    let sink = Sink::new(diagnostics, &translation.origin);
    let default_locale = &default.locale;
    let mut seeds: BTreeSet<UnitId> = translation.blocked.clone();

    for (id, message) in &translation.messages {
        let source = message.key.to_string();
        if !defined.contains(&message.key) {
            seeds.insert(*id);
            sink.push(
                sink.at(
                    DiagnosticCode::MissingDefaultLocaleMessage,
                    message.location,
                    format!("`{source}` is not defined in the default locale `{default_locale}`"),
                )
                .message_id(source)
                .help("add the message to the default locale first")
                .build(),
            );
            continue;
        }
        let Some(canonical) = surviving.get(&message.key) else {
            // The default locale cannot render it, so neither can the dispatcher.
            seeds.insert(*id);
            continue;
        };

        let problems = message.signature.incompatibilities(&canonical.signature);
        if !problems.is_empty() {
            seeds.insert(*id);
        }
        for problem in problems {
            sink.push(
                sink.at(
                    DiagnosticCode::SignatureIncompatibility,
                    problem.location(),
                    problem.describe(),
                )
                .message_id(source.clone())
                .related(
                    Origin::new(&default.origin, canonical.location),
                    format!("`{source}` is defined here in `{default_locale}`"),
                )
                .build(),
            );
        }

        for (callee, location) in translation.message_references(*id) {
            let Some(callee) = translation
                .messages
                .get(&callee)
                .and_then(|callee| surviving.get(&callee.key))
            else {
                continue;
            };
            for (variable, field) in callee.signature.fields() {
                let received = canonical.signature.type_of(variable);
                if received.is_some_and(|ty| same_rendering(ty, field.ty)) {
                    continue;
                }
                seeds.insert(*id);
                let described = received.map_or("nothing", ArgumentType::describe);
                sink.push(
                    sink.at(
                        DiagnosticCode::SignatureIncompatibility,
                        location,
                        format!(
                            "`{}` takes `${variable}` as {} but `{source}` receives {described} for it in `{default_locale}`",
                            callee.key,
                            field.ty.describe(),
                        ),
                    )
                    .message_id(source.clone())
                    .build(),
                );
            }
        }
    }

    let blocked = translation.graph.dependents_closure(seeds);
    if !blocked.is_empty() {
        warn!(
            target: "fluent_elm::assemble",
            "{}: {} `{}` units blocked",
            translation.origin,
            blocked.len(),
            translation.locale,
        );
    }
    blocked
}
