//! Behaviour-driven tests for compiler configuration loading.

use std::cell::RefCell;
use std::convert::Infallible;
use std::fs;
use std::str::FromStr;

use camino::Utf8PathBuf;
use fluent_elm::{CompilerConfig, SourceFile, compile_batch};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

/// A temporary directory holding the configuration file under test.
struct Workspace {
    _dir: TempDir,
    path: Utf8PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap_or_else(|error| panic!("tempdir: {error}"));
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .unwrap_or_else(|path| panic!("non UTF-8 temp path {}", path.display()));
        Self {
            _dir: dir,
            path: root.join("fluent-elm.toml"),
        }
    }

    fn write(&self, contents: &str) {
        fs::write(&self.path, contents).unwrap_or_else(|error| panic!("write config: {error}"));
    }
}

#[fixture]
fn workspace() -> Workspace {
    Workspace::new()
}

#[fixture]
fn load_result() -> RefCell<Option<Result<CompilerConfig, String>>> {
    RefCell::new(None)
}

#[fixture]
fn files() -> RefCell<Vec<SourceFile>> {
    RefCell::new(Vec::new())
}

#[fixture]
fn error_count() -> RefCell<Option<usize>> {
    RefCell::new(None)
}

#[derive(Debug)]
struct ErrorSnippet(String);

impl FromStr for ErrorSnippet {
    type Err = Infallible;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input
            .trim()
            .trim_matches(|candidate| matches!(candidate, '"' | '\''));

        Ok(Self(trimmed.to_owned()))
    }
}

fn loaded(load_result: &RefCell<Option<Result<CompilerConfig, String>>>) -> CompilerConfig {
    match load_result.borrow().as_ref() {
        Some(Ok(config)) => config.clone(),
        Some(Err(error)) => panic!("expected configuration loading to succeed: {error}"),
        None => panic!("configuration should be loaded"),
    }
}

#[given("a configuration file containing nothing")]
fn empty_file(workspace: &Workspace) {
    workspace.write("");
}

#[given("a configuration file setting the default locale to {locale}")]
fn default_locale_file(workspace: &Workspace, locale: String) {
    workspace.write(&format!("default_locale = \"{locale}\"\n"));
}

#[given("a configuration file with unknown keys")]
fn unknown_keys_file(workspace: &Workspace) {
    workspace.write("default_locale = \"en\"\nisolate = false\n");
}

#[given("no configuration file exists")]
fn no_file(workspace: &Workspace) {
    assert!(!workspace.path.exists());
}

#[given("a configuration file making missing translations errors")]
fn strict_file(workspace: &Workspace) {
    workspace.write("missing_translation = \"error\"\n");
}

#[given("the {locale} locale defines hello and bye")]
fn full_resource(files: &RefCell<Vec<SourceFile>>, locale: String) {
    files
        .borrow_mut()
        .push(SourceFile::new(locale, "main.ftl", "hello = Hello\nbye = Bye\n"));
}

#[given("the {locale} locale defines hello")]
fn partial_resource(files: &RefCell<Vec<SourceFile>>, locale: String) {
    files
        .borrow_mut()
        .push(SourceFile::new(locale, "main.ftl", "hello = Hallo\n"));
}

#[when("the configuration is loaded")]
fn load(workspace: &Workspace, load_result: &RefCell<Option<Result<CompilerConfig, String>>>) {
    let outcome = CompilerConfig::load(&workspace.path).map_err(|error| error.to_string());
    load_result.borrow_mut().replace(outcome);
}

#[when("the resources are compiled with it")]
fn compile(
    files: &RefCell<Vec<SourceFile>>,
    load_result: &RefCell<Option<Result<CompilerConfig, String>>>,
    error_count: &RefCell<Option<usize>>,
) {
    let config = loaded(load_result);
    let output = compile_batch(&files.borrow(), &config)
        .unwrap_or_else(|error| panic!("batch should be accepted: {error}"));
    error_count.borrow_mut().replace(output.report.error_count());
}

#[then("the default locale is {expected}")]
fn assert_default_locale(
    load_result: &RefCell<Option<Result<CompilerConfig, String>>>,
    expected: String,
) {
    assert_eq!(loaded(load_result).default_locale, expected);
}

#[then("placeables are isolated")]
fn assert_isolating(load_result: &RefCell<Option<Result<CompilerConfig, String>>>) {
    assert!(loaded(load_result).use_isolating);
}

#[then("the module prefix is {expected}")]
fn assert_prefix(load_result: &RefCell<Option<Result<CompilerConfig, String>>>, expected: String) {
    assert_eq!(loaded(load_result).module_prefix, expected);
}

#[then("a configuration error mentioning {snippet} is reported")]
fn assert_error_with_snippet(
    load_result: &RefCell<Option<Result<CompilerConfig, String>>>,
    snippet: ErrorSnippet,
) {
    let borrow = load_result.borrow();
    match borrow.as_ref() {
        Some(Err(error)) => {
            assert!(
                error.contains(snippet.0.as_str()),
                "expected error '{error}' to mention '{}'",
                snippet.0,
            );
        }
        Some(Ok(config)) => {
            panic!("expected configuration loading to fail but succeeded with {config:?}")
        }
        None => panic!("configuration should be loaded"),
    }
}

#[then("the batch fails with {expected} error")]
fn assert_batch_errors(error_count: &RefCell<Option<usize>>, expected: usize) {
    assert_eq!(*error_count.borrow(), Some(expected));
}

#[scenario("tests/features/config_loading.feature", index = 0)]
fn scenario_defaults(
    workspace: Workspace,
    load_result: RefCell<Option<Result<CompilerConfig, String>>>,
) {
    let _ = (workspace, load_result);
}

#[scenario("tests/features/config_loading.feature", index = 1)]
fn scenario_override(
    workspace: Workspace,
    load_result: RefCell<Option<Result<CompilerConfig, String>>>,
) {
    let _ = (workspace, load_result);
}

#[scenario("tests/features/config_loading.feature", index = 2)]
fn scenario_unknown_keys(
    workspace: Workspace,
    load_result: RefCell<Option<Result<CompilerConfig, String>>>,
) {
    let _ = (workspace, load_result);
}

#[scenario("tests/features/config_loading.feature", index = 3)]
fn scenario_missing_file(
    workspace: Workspace,
    load_result: RefCell<Option<Result<CompilerConfig, String>>>,
) {
    let _ = (workspace, load_result);
}

#[scenario("tests/features/config_loading.feature", index = 4)]
fn scenario_strict_missing_translations(
    workspace: Workspace,
    load_result: RefCell<Option<Result<CompilerConfig, String>>>,
    files: RefCell<Vec<SourceFile>>,
    error_count: RefCell<Option<usize>>,
) {
    let _ = (workspace, load_result, files, error_count);
}
