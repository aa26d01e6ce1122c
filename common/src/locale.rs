//! Locale tags, fallback chains, and runtime negotiation rules.
//!
//! Tags are validated with `unic-langid` and stored in canonical BCP 47 form
//! (`en-GB`, `zh-Hant-TW`). Negotiation mirrors the dispatcher that the
//! compiler emits: the requested tag is lower-cased and trimmed one subtag at
//! a time until it matches an available locale, with the default locale as the
//! final answer.

use std::fmt;
use std::str::FromStr;

use log::debug;
use thiserror::Error;
use unic_langid::LanguageIdentifier;

/// Error raised when a locale tag cannot be used.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocaleError {
    /// The tag was empty or whitespace.
    #[error("locale tag is empty")]
    Empty,
    /// The tag is not a valid BCP 47 language tag.
    #[error("`{tag}` is not a valid BCP 47 language tag")]
    Invalid {
        /// The rejected input.
        tag: String,
    },
}

/// A validated locale tag in canonical form.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocaleTag(String);

impl LocaleTag {
    /// Validates and canonicalises `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`LocaleError`] when the input is blank or not a BCP 47 tag.
    ///
    /// # Examples
    ///
    /// ```
    /// use common::locale::LocaleTag;
    ///
    /// let tag = LocaleTag::parse(" en-gb ").unwrap();
    /// assert_eq!(tag.as_str(), "en-GB");
    /// ```
    pub fn parse(raw: &str) -> Result<Self, LocaleError> {
        let candidate = normalise_locale(Some(raw)).ok_or(LocaleError::Empty)?;
        let identifier =
            LanguageIdentifier::from_str(candidate).map_err(|_| LocaleError::Invalid {
                tag: candidate.to_owned(),
            })?;
        Ok(Self(identifier.to_string()))
    }

    /// Returns the canonical tag.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the lower-cased tag used for runtime comparison.
    #[must_use]
    pub fn lowercase(&self) -> String {
        self.0.to_lowercase()
    }

    /// Returns the tag as a module name segment: `en-GB` becomes `ENGB`.
    #[must_use]
    pub fn module_segment(&self) -> String {
        self.0.replace('-', "").to_uppercase()
    }
}

impl FromStr for LocaleTag {
    type Err = LocaleError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl AsRef<str> for LocaleTag {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for LocaleTag {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Trim whitespace and discard empty locale candidates.
#[must_use]
pub fn normalise_locale(input: Option<&str>) -> Option<&str> {
    input
        .map(str::trim)
        .and_then(|value| if value.is_empty() { None } else { Some(value) })
}

/// Returns the lower-cased tag followed by each shorter prefix obtained by
/// dropping trailing subtags.
///
/// # Examples
///
/// ```
/// use common::locale::truncations;
///
/// assert_eq!(truncations("zh-Hant-TW"), vec!["zh-hant-tw", "zh-hant", "zh"]);
/// ```
#[must_use]
pub fn truncations(tag: &str) -> Vec<String> {
    let lowered = tag.trim().to_lowercase();
    let mut prefixes = Vec::new();
    let mut current = lowered.as_str();
    while !current.is_empty() {
        prefixes.push(current.to_owned());
        current = current.rsplit_once('-').map_or("", |(head, _)| head);
    }
    prefixes
}

/// Picks the available locale for a runtime tag using longest-prefix matching.
///
/// # Examples
///
/// ```
/// use common::locale::{LocaleTag, negotiate};
///
/// let en = LocaleTag::parse("en").unwrap();
/// let en_gb = LocaleTag::parse("en-GB").unwrap();
/// let available = [en.clone(), en_gb.clone()];
/// assert_eq!(negotiate("EN-gb-oxendict", &available, &en), &en_gb);
/// assert_eq!(negotiate("fr", &available, &en), &en);
/// ```
#[must_use]
pub fn negotiate<'a>(
    requested: &str,
    available: &'a [LocaleTag],
    default: &'a LocaleTag,
) -> &'a LocaleTag {
    truncations(requested)
        .iter()
        .find_map(|prefix| {
            available
                .iter()
                .find(|candidate| candidate.lowercase() == *prefix)
        })
        .unwrap_or(default)
}

/// Returns the compile-time resolution order for `locale`: the locale itself,
/// each less specific available locale, then the default locale.
///
/// # Examples
///
/// ```
/// use common::locale::{LocaleTag, fallback_chain};
///
/// let tags: Vec<LocaleTag> = ["en", "en-GB", "en-GB-scouse"]
///     .into_iter()
///     .filter_map(|raw| LocaleTag::parse(raw).ok())
///     .collect();
/// let chain = fallback_chain(&tags[2], &tags, &tags[0]);
/// let rendered: Vec<&str> = chain.iter().map(|tag| tag.as_str()).collect();
/// assert_eq!(rendered, vec!["en-GB-scouse", "en-GB", "en"]);
/// ```
#[must_use]
pub fn fallback_chain(
    locale: &LocaleTag,
    available: &[LocaleTag],
    default: &LocaleTag,
) -> Vec<LocaleTag> {
    let mut chain: Vec<LocaleTag> = Vec::new();
    for prefix in truncations(locale.as_str()) {
        let matched = available
            .iter()
            .find(|candidate| candidate.lowercase() == prefix);
        if let Some(tag) = matched {
            if !chain.contains(tag) {
                chain.push(tag.clone());
            }
        }
    }
    if !chain.contains(default) {
        chain.push(default.clone());
    }
    debug!(
        target: "common::locale",
        "fallback chain for `{locale}`: {}",
        chain.iter().map(LocaleTag::as_str).collect::<Vec<_>>().join(" -> "),
    );
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tag(raw: &str) -> LocaleTag {
        LocaleTag::parse(raw).unwrap_or_else(|error| panic!("valid tag `{raw}`: {error}"))
    }

    #[rstest]
    #[case("en", "en")]
    #[case("en-gb", "en-GB")]
    #[case("EN-GB", "en-GB")]
    #[case(" de ", "de")]
    #[case("zh-hant-tw", "zh-Hant-TW")]
    fn canonicalises_tags(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(tag(raw).as_str(), expected);
    }

    #[rstest]
    #[case("", LocaleError::Empty)]
    #[case("   ", LocaleError::Empty)]
    #[case("not a tag", LocaleError::Invalid { tag: String::from("not a tag") })]
    fn rejects_bad_tags(#[case] raw: &str, #[case] expected: LocaleError) {
        assert_eq!(LocaleTag::parse(raw), Err(expected));
    }

    #[rstest]
    #[case("en-GB", "ENGB")]
    #[case("de", "DE")]
    #[case("zh-Hant-TW", "ZHHANTTW")]
    fn builds_module_segments(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(tag(raw).module_segment(), expected);
    }

    #[rstest]
    #[case("en-GB", "en-GB")]
    #[case("en-gb", "en-GB")]
    #[case("en-US", "en")]
    #[case("en", "en")]
    #[case("fr-CA", "fr")]
    #[case("pt", "en")]
    #[case("", "en")]
    fn negotiates_longest_prefix(#[case] requested: &str, #[case] expected: &str) {
        let available = [tag("en"), tag("en-GB"), tag("fr")];
        let default = tag("en");
        assert_eq!(negotiate(requested, &available, &default).as_str(), expected);
    }

    #[rstest]
    fn default_locale_chain_is_itself() {
        let default = tag("en");
        let available = [default.clone(), tag("en-GB")];
        assert_eq!(fallback_chain(&default, &available, &default), vec![default]);
    }

    #[rstest]
    fn unrelated_locale_falls_back_to_default() {
        let default = tag("en");
        let available = [default.clone(), tag("de-AT")];
        let chain = fallback_chain(&tag("de-AT"), &available, &default);
        assert_eq!(chain, vec![tag("de-AT"), default]);
    }
}
