//! Locale modules and the per-stem dispatcher.

use camino::Utf8PathBuf;
use common::locale::LocaleTag;

use crate::assemble::Bundle;
use crate::naming::module_stem;

use super::EmitOptions;
use super::elm::{Expr, Function, Import, Imports, Module, quote};
use super::message::{annotation, forwarded, lower};

const NEGOTIATE: &str = "negotiateTag_";

/// Dotted name and relative path of a generated module.
fn placement(options: &EmitOptions, segment: &str, bundle: &Bundle) -> (String, Utf8PathBuf) {
    let stem = module_stem(&bundle.stem);
    let name = format!("{}.{segment}.{stem}", options.module_prefix);
    let path = Utf8PathBuf::from(format!("{}.elm", name.replace('.', "/")));
    (name, path)
}

/// Renders the functions `locale` implements, or `None` when it has none.
pub(super) fn locale_module(
    bundle: &Bundle,
    locale: &LocaleTag,
    options: &EmitOptions,
) -> Option<(Utf8PathBuf, String)> {
    let mut imports = Imports::default();
    let functions: Vec<Function> = bundle
        .implemented_in(locale)
        .map(|(message, body)| lower(message, body, options, &mut imports))
        .collect();
    if functions.is_empty() {
        return None;
    }
    let (name, path) = placement(options, &locale.module_segment(), bundle);
    let module = Module {
        name,
        exposing: functions.iter().map(|function| function.name.clone()).collect(),
        imports,
        functions,
    };
    Some((path, module.render()))
}

/// Renders the dispatcher that picks a locale implementation at runtime.
///
/// Each function matches the negotiated tag against the locales whose
/// implementation differs from the default locale's; everything else falls
/// through to the default.
pub(super) fn dispatcher_module(
    bundle: &Bundle,
    options: &EmitOptions,
) -> Option<(Utf8PathBuf, String)> {
    if bundle.messages.is_empty() {
        return None;
    }
    let mut imports = Imports::default();
    let mut functions = Vec::with_capacity(bundle.messages.len() + 1);
    let mut negotiates = false;
    for message in &bundle.messages {
        let annotation = annotation(message, &mut imports);
        let call = |imports: &mut Imports, locale: &LocaleTag| {
            let (module, _) = placement(options, &locale.module_segment(), bundle);
            imports.add_alias(&module, &locale.module_segment());
            Expr::call(
                format!("{}.{}", locale.module_segment(), message.function),
                forwarded(message.html),
            )
        };
        let fallback = call(&mut imports, &bundle.default_locale);
        let branches: Vec<(String, Expr)> = bundle
            .locales
            .iter()
            .filter_map(|locale| {
                let chosen = message.dispatch.get(locale)?;
                (chosen != &bundle.default_locale)
                    .then(|| (quote(&locale.lowercase()), call(&mut imports, chosen)))
            })
            .collect();
        let body = if branches.is_empty() {
            fallback
        } else {
            negotiates = true;
            let mut cases = branches;
            cases.push((String::from("_"), fallback));
            Expr::Case {
                subject: Box::new(Expr::call(
                    NEGOTIATE,
                    [Expr::call(
                        "String.toLower",
                        [Expr::call("Locale.toLanguageTag", [Expr::raw("locale_")])],
                    )],
                )),
                branches: cases,
            }
        };
        functions.push(Function {
            name: message.function.clone(),
            annotation,
            params: super::message::params(message.html),
            body,
        });
    }
    if negotiates {
        imports.add(Import::Locale);
        functions.push(negotiate_function(bundle));
    }

    let (name, path) = placement(options, "Translations", bundle);
    let module = Module {
        name,
        exposing: bundle
            .messages
            .iter()
            .map(|message| message.function.clone())
            .collect(),
        imports,
        functions,
    };
    Some((path, module.render()))
}

/// Maps a lower-cased tag to the longest available prefix, or to the default
/// locale when none matches.
fn negotiate_function(bundle: &Bundle) -> Function {
    let mut branches: Vec<(String, Expr)> = bundle
        .locales
        .iter()
        .map(|locale| (quote(&locale.lowercase()), Expr::raw("tag_")))
        .collect();
    let shorter = Expr::call(
        NEGOTIATE,
        [Expr::call(
            "String.join",
            [
                Expr::string("-"),
                Expr::call("List.reverse", [Expr::raw("rest_")]),
            ],
        )],
    );
    branches.push((
        String::from("_"),
        Expr::Case {
            subject: Box::new(Expr::call(
                "List.reverse",
                [Expr::call("String.split", [Expr::string("-"), Expr::raw("tag_")])],
            )),
            branches: vec![
                (String::from("_ :: ((_ :: _) as rest_)"), shorter),
                (
                    String::from("_"),
                    Expr::string(bundle.default_locale.lowercase()),
                ),
            ],
        },
    ));
    Function {
        name: NEGOTIATE.to_owned(),
        annotation: String::from("String -> String"),
        params: vec![String::from("tag_")],
        body: Expr::Case {
            subject: Box::new(Expr::raw("tag_")),
            branches,
        },
    }
}
