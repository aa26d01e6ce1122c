//! Compiler configuration loaded from TOML.
//!
//! Every field is optional: an empty file, or no file at all, yields
//! [`CompilerConfig::default`]. Unknown keys are rejected so typos surface
//! instead of silently falling back to defaults.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use common::diagnostics::Severity;
use serde::Deserialize;
use thiserror::Error;

use crate::emit::EmitOptions;

/// How a message missing from a non-default locale is reported.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MissingTranslationPolicy {
    /// Report a warning and fall back to the default locale.
    #[default]
    Warn,
    /// Report an error; the fallback is still emitted.
    Error,
}

impl MissingTranslationPolicy {
    /// The diagnostic severity the policy implies.
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::Warn => Severity::Warning,
            Self::Error => Severity::Error,
        }
    }
}

/// Settings for one compilation batch.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// The locale whose resources define every message and signature.
    pub default_locale: String,
    /// Wrap placeables in FSI/PDI marks when a pattern has more than one
    /// element.
    pub use_isolating: bool,
    /// Emit selector filtering on HTML nodes so callers can attach
    /// attributes.
    pub dynamic_html_attributes: bool,
    /// First segment of every generated module name.
    pub module_prefix: String,
    /// Severity of a missing translation.
    pub missing_translation: MissingTranslationPolicy,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            default_locale: String::from("en"),
            use_isolating: true,
            dynamic_html_attributes: true,
            module_prefix: String::from("Ftl"),
            missing_translation: MissingTranslationPolicy::Warn,
        }
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read `{path}`: {source}")]
    Io {
        /// The configuration file.
        path: Utf8PathBuf,
        /// The underlying failure.
        source: std::io::Error,
    },
    /// The text is not valid configuration.
    #[error("invalid configuration: {0}")]
    Parse(#[source] Box<toml::de::Error>),
}

impl CompilerConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML, unknown keys, or
    /// values of the wrong type.
    ///
    /// # Examples
    ///
    /// ```
    /// use fluent_elm::config::{CompilerConfig, MissingTranslationPolicy};
    ///
    /// let config = CompilerConfig::from_toml_str("default_locale = \"de\"\nmissing_translation = \"error\"\n")
    ///     .unwrap_or_default();
    /// assert_eq!(config.default_locale, "de");
    /// assert_eq!(config.missing_translation, MissingTranslationPolicy::Error);
    /// assert!(config.use_isolating);
    /// ```
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        toml::from_str(source).map_err(|error| ConfigError::Parse(Box::new(error)))
    }

    /// Reads and parses the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read and
    /// [`ConfigError::Parse`] when its contents are invalid.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// The code generation subset of the configuration.
    #[must_use]
    pub fn emit_options(&self) -> EmitOptions {
        EmitOptions {
            use_isolating: self.use_isolating,
            dynamic_html_attributes: self.dynamic_html_attributes,
            module_prefix: self.module_prefix.clone(),
        }
    }
}
