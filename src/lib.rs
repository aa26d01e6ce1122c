//! Compiles Fluent localisation resources into statically typed Elm modules.
//!
//! Each phase of the compiler lives in its own module and produces a frozen
//! value that the next phase reads:
//!
//! - [`ingest`] converts `fluent-syntax` output into the located [`ast`].
//! - [`resolve`] indexes messages and terms and checks every reference.
//! - [`expand`] inlines terms and folds selects on literal selectors.
//! - [`infer`] derives the typed argument record of every message.
//! - [`html`] parses the markup of HTML messages into addressable nodes.
//! - [`assemble`] merges locales into canonical messages with fallback.
//! - [`emit`] renders Elm modules and per-stem dispatchers.
//!
//! [`compile_batch`] runs them all and collects diagnostics into a
//! [`common::diagnostics::Report`].

pub mod assemble;
pub mod ast;
pub mod config;
pub mod emit;
pub mod expand;
pub mod html;
pub mod infer;
pub mod ingest;
pub mod naming;
pub mod pipeline;
pub mod resolve;
pub mod sink;

pub use config::{CompilerConfig, ConfigError, MissingTranslationPolicy};
pub use emit::EmitOptions;
pub use ingest::SourceFile;
pub use pipeline::{BatchError, CompileOutput, compile_batch};
