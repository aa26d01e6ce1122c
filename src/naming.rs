//! Fluent identifier to Elm name transforms.
//!
//! * `hello-there` becomes `helloThere`.
//! * `hello.foo` becomes `hello_foo`.
//! * `hello-html.foo` becomes `helloHtml_foo`.
//!
//! The transform folds case inside hyphenated segments, so distinct Fluent
//! identifiers can meet at one Elm name. Callers detect that with
//! [`NameRegistry`] and report it instead of emitting clashing definitions.

use std::collections::BTreeMap;
use std::collections::HashSet;

use camino::Utf8Path;
use once_cell::sync::Lazy;

/// Elm reserved words.
static ELM_KEYWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "type", "alias", "port", "if", "then", "else", "case", "of", "let", "in", "infix",
        "module", "import", "exposing", "as", "where",
    ]
    .into_iter()
    .collect()
});

/// Lower-case names Elm brings into scope implicitly.
static ELM_DEFAULT_IMPORTS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "max", "min", "compare", "not", "xor", "rem", "negate", "abs", "sqrt", "clamp",
        "logBase", "e", "pi", "cos", "sin", "tan", "acos", "asin", "atan", "atan2", "round",
        "floor", "ceiling", "truncate", "toFloat", "degrees", "radians", "turns", "toPolar",
        "fromPolar", "isNaN", "isInfinite", "identity", "always", "never", "modBy",
        "remainderBy",
    ]
    .into_iter()
    .collect()
});

fn capitalise(part: &str) -> String {
    let mut chars = part.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
    })
}

fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_lowercase().chain(chars).collect()
    })
}

fn camel_section(section: &str) -> String {
    let trimmed = section.trim_end_matches(['_', '-']);
    trimmed
        .split('-')
        .enumerate()
        .map(|(index, part)| {
            if index == 0 {
                part.to_owned()
            } else {
                capitalise(part)
            }
        })
        .collect()
}

/// Returns the Elm function name for a message or message attribute.
///
/// # Examples
///
/// ```
/// use fluent_elm::naming::function_name;
///
/// assert_eq!(function_name("hello-there", None), "helloThere");
/// assert_eq!(function_name("hello-html", Some("foo")), "helloHtml_foo");
/// ```
#[must_use]
pub fn function_name(id: &str, attribute: Option<&str>) -> String {
    let mut name = lower_first(&camel_section(id));
    if let Some(suffix) = attribute {
        name.push('_');
        name.push_str(&camel_section(suffix));
    }
    name
}

/// Returns the record field name for a Fluent variable.
#[must_use]
pub fn field_name(variable: &str) -> String {
    lower_first(&camel_section(variable))
}

/// Whether the message value renders markup rather than text.
///
/// A message is markup-producing when its Elm name ends in `Html`, which
/// covers both `welcome-html` and `welcomeHtml`.
#[must_use]
pub fn is_html_id(id: &str) -> bool {
    function_name(id, None).ends_with("Html")
}

/// Whether `name` is an Elm keyword, which rules it out as a record field.
#[must_use]
pub fn is_keyword(name: &str) -> bool {
    ELM_KEYWORDS.contains(name)
}

/// Whether `name` cannot be used as an Elm value name.
#[must_use]
pub fn is_reserved(name: &str) -> bool {
    ELM_KEYWORDS.contains(name) || ELM_DEFAULT_IMPORTS.contains(name)
}

/// Returns the dotted module suffix for a resource stem.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use fluent_elm::naming::module_stem;
///
/// assert_eq!(module_stem(Utf8Path::new("foo/bar.ftl")), "Foo.Bar");
/// assert_eq!(module_stem(Utf8Path::new("user-profile.ftl")), "UserProfile");
/// ```
#[must_use]
pub fn module_stem(stem: &Utf8Path) -> String {
    stem.with_extension("")
        .components()
        .map(|component| {
            component
                .as_str()
                .split(['-', '_'])
                .map(capitalise)
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// Why a name could not be claimed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NameClash {
    /// The name is an Elm keyword or implicit import.
    Reserved,
    /// Another identifier already maps to the name.
    Taken(String),
}

/// Tracks claimed target names and the identifiers that claimed them.
#[derive(Clone, Debug, Default)]
pub struct NameRegistry {
    claimed: BTreeMap<String, String>,
}

impl NameRegistry {
    /// Claims `name` on behalf of `source`.
    ///
    /// # Errors
    ///
    /// Returns the [`NameClash`] when the name is reserved or already taken.
    pub fn claim(&mut self, name: &str, source: &str) -> Result<(), NameClash> {
        if is_reserved(name) {
            return Err(NameClash::Reserved);
        }
        if let Some(owner) = self.claimed.get(name) {
            return Err(NameClash::Taken(owner.clone()));
        }
        self.claimed.insert(name.to_owned(), source.to_owned());
        Ok(())
    }
}
