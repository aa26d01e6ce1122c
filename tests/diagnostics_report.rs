//! Behaviour-driven tests for the diagnostics report.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::str::FromStr;

use camino::Utf8Path;
use fluent_elm::{CompileOutput, CompilerConfig, SourceFile, compile_batch};
use logtest::Logger;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::Value;

const SEVERAL_ERRORS: &str = concat!(
    "a = { missing }\n",
    "b = B\n",
    "b = again\n",
    "c = { NUMBER($x, currency: \"EUR\") }\n",
    "d = Fine\n",
);

const UNDEFINED_REFERENCE: &str = "a = { missing }\nb = B\n";

/// Shared state of one scenario.
#[derive(Default)]
struct ReportWorld {
    files: RefCell<Vec<SourceFile>>,
    output: RefCell<Option<CompileOutput>>,
}

impl ReportWorld {
    fn provide(&self, source: &str) {
        self.files
            .borrow_mut()
            .push(SourceFile::new("en", "main.ftl", source));
    }

    fn compile(&self) {
        let output = compile_batch(&self.files.borrow(), &CompilerConfig::default())
            .unwrap_or_else(|error| panic!("batch should be accepted: {error}"));
        self.output.borrow_mut().replace(output);
    }

    fn with_output<T>(&self, check: impl FnOnce(&CompileOutput) -> T) -> T {
        let borrow = self.output.borrow();
        let Some(output) = borrow.as_ref() else {
            panic!("the batch should be compiled");
        };
        check(output)
    }
}

#[derive(Debug)]
struct Codes(BTreeSet<String>);

impl FromStr for Codes {
    type Err = Infallible;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Ok(Self(input.split(", ").map(str::to_owned).collect()))
    }
}

#[derive(Debug)]
struct Quoted(String);

impl FromStr for Quoted {
    type Err = Infallible;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Ok(Self(input.trim().trim_matches('"').to_owned()))
    }
}

#[fixture]
fn world() -> ReportWorld {
    ReportWorld::default()
}

#[given("the en resource with several errors")]
fn several_errors(world: &ReportWorld) {
    world.provide(SEVERAL_ERRORS);
}

#[given("the en resource with an undefined reference")]
fn undefined_reference(world: &ReportWorld) {
    world.provide(UNDEFINED_REFERENCE);
}

#[when("the batch is compiled")]
fn compile(world: &ReportWorld) {
    world.compile();
}

#[then("the batch fails")]
fn assert_failure(world: &ReportWorld) {
    world.with_output(|output| assert!(!output.success()));
}

#[then("the report holds the errors {codes}")]
fn assert_codes(world: &ReportWorld, codes: Codes) {
    world.with_output(|output| {
        let actual: BTreeSet<String> = output
            .report
            .errors()
            .map(|diagnostic| diagnostic.code().as_str().to_owned())
            .collect();
        assert_eq!(actual, codes.0, "{}", output.report.render_human());
    });
}

#[then("the message {message} is still emitted")]
fn assert_emitted(world: &ReportWorld, message: String) {
    world.with_output(|output| {
        let Some(source) = output.modules.get(Utf8Path::new("Ftl/EN/Main.elm")) else {
            panic!("the en module should be emitted");
        };
        assert!(source.contains(&format!("\n{message} locale_ args_ =\n")), "{source}");
    });
}

#[then("the JSON report has {count} error at line {line} column {column}")]
fn assert_json(world: &ReportWorld, count: u64, line: u64, column: u64) {
    world.with_output(|output| {
        let json = output
            .report
            .to_json()
            .unwrap_or_else(|error| panic!("report should serialise: {error}"));
        let document: Value =
            serde_json::from_str(&json).unwrap_or_else(|error| panic!("invalid JSON: {error}"));
        assert_eq!(document["success"], Value::Bool(false));
        assert_eq!(document["errors"], Value::from(count));
        let first = &document["diagnostics"][0];
        assert_eq!(first["severity"], "error");
        assert_eq!(first["code"], "undefined-reference");
        assert_eq!(first["resource"], "en/main.ftl");
        assert_eq!(first["line"], Value::from(line));
        assert_eq!(first["column"], Value::from(column));
        assert_eq!(first["message_id"], "a");
    });
}

#[then("the human report starts with {prefix}")]
fn assert_human(world: &ReportWorld, prefix: Quoted) {
    world.with_output(|output| {
        let rendered = output.report.render_human();
        assert!(rendered.starts_with(&prefix.0), "{rendered}");
    });
}

#[scenario("tests/features/diagnostics_report.feature", index = 0)]
fn scenario_collects_all_errors(world: ReportWorld) {
    let _ = world;
}

#[scenario("tests/features/diagnostics_report.feature", index = 1)]
fn scenario_json_report(world: ReportWorld) {
    let _ = world;
}

#[scenario("tests/features/diagnostics_report.feature", index = 2)]
fn scenario_human_report(world: ReportWorld) {
    let _ = world;
}

#[test]
fn blocked_resources_are_logged() {
    let mut logger = Logger::start();
    let world = ReportWorld::default();
    world.provide(UNDEFINED_REFERENCE);
    world.compile();

    let mut warned = false;
    let mut summarised = false;
    while let Some(record) = logger.pop() {
        let message = record.args().to_string();
        if record.target() == "fluent_elm::pipeline" && message.contains("blocked from emission") {
            warned = true;
        }
        if record.target() == "fluent_elm::pipeline" && message.contains("1 error(s)") {
            summarised = true;
        }
    }

    assert!(warned, "expected the blocked unit warning to be logged");
    assert!(summarised, "expected the batch summary to be logged");
}
