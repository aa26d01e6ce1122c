//! The builtin formatting functions and their option tables.

use common::diagnostics::DiagnosticCode;
use common::span::SourceLocation;

use super::ArgumentType;
use crate::ast::{Arguments, Inline, InlineKind};

/// A builtin Fluent function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Builtin {
    /// `NUMBER(value, ...)`.
    Number,
    /// `DATETIME(value, ...)`.
    DateTime,
}

impl Builtin {
    /// Looks up a function by its Fluent name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "NUMBER" => Some(Self::Number),
            "DATETIME" => Some(Self::DateTime),
            _ => None,
        }
    }

    /// Returns the Fluent name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Number => "NUMBER",
            Self::DateTime => "DATETIME",
        }
    }

    /// The type the function imposes on a variable argument.
    #[must_use]
    pub const fn argument_type(self) -> ArgumentType {
        match self {
            Self::Number => ArgumentType::Number,
            Self::DateTime => ArgumentType::Date,
        }
    }

    fn options(self) -> &'static [OptionRule] {
        match self {
            Self::Number => NUMBER_OPTIONS,
            Self::DateTime => DATETIME_OPTIONS,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum OptionKind {
    Int,
    Bool,
    Enum(&'static [(&'static str, &'static str)]),
}

#[derive(Debug)]
struct OptionRule {
    name: &'static str,
    kind: OptionKind,
    optional: bool,
}

const fn rule(name: &'static str, kind: OptionKind, optional: bool) -> OptionRule {
    OptionRule {
        name,
        kind,
        optional,
    }
}

const CURRENCY_DISPLAY: &[(&str, &str)] = &[
    ("symbol", "CurrencySymbol"),
    ("code", "CurrencyCode"),
    ("name", "CurrencyName"),
];
const NAME_STYLE: &[(&str, &str)] = &[
    ("narrow", "NarrowName"),
    ("short", "ShortName"),
    ("long", "LongName"),
];
const NUMBER_STYLE: &[(&str, &str)] = &[
    ("numeric", "NumericNumber"),
    ("2-digit", "TwoDigitNumber"),
];
const MONTH_STYLE: &[(&str, &str)] = &[
    ("narrow", "NarrowMonth"),
    ("short", "ShortMonth"),
    ("long", "LongMonth"),
    ("numeric", "NumericMonth"),
    ("2-digit", "TwoDigitMonth"),
];
const TIME_ZONE_STYLE: &[(&str, &str)] = &[("short", "ShortTimeZone"), ("long", "LongTimeZone")];

const NUMBER_OPTIONS: &[OptionRule] = &[
    rule("currencyDisplay", OptionKind::Enum(CURRENCY_DISPLAY), false),
    rule("useGrouping", OptionKind::Bool, false),
    rule("minimumIntegerDigits", OptionKind::Int, true),
    rule("minimumFractionDigits", OptionKind::Int, true),
    rule("maximumFractionDigits", OptionKind::Int, true),
    rule("minimumSignificantDigits", OptionKind::Int, true),
    rule("maximumSignificantDigits", OptionKind::Int, true),
];

const DATETIME_OPTIONS: &[OptionRule] = &[
    rule("hour12", OptionKind::Bool, true),
    rule("weekday", OptionKind::Enum(NAME_STYLE), false),
    rule("era", OptionKind::Enum(NAME_STYLE), false),
    rule("year", OptionKind::Enum(NUMBER_STYLE), false),
    rule("month", OptionKind::Enum(MONTH_STYLE), false),
    rule("day", OptionKind::Enum(NUMBER_STYLE), false),
    rule("hour", OptionKind::Enum(NUMBER_STYLE), false),
    rule("minute", OptionKind::Enum(NUMBER_STYLE), false),
    rule("second", OptionKind::Enum(NUMBER_STYLE), false),
    rule("timeZoneName", OptionKind::Enum(TIME_ZONE_STYLE), false),
];

/// A validated option value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OptionValue {
    /// An integer literal.
    Int(String),
    /// A flag written as `0` or `1`.
    Bool(bool),
    /// A constructor of the formatter's enumeration.
    Constructor(&'static str),
}

/// A validated named option.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormatOption {
    /// Option name, as written.
    pub name: &'static str,
    /// Option value.
    pub value: OptionValue,
    /// Whether the formatter's record field is a `Maybe`.
    pub optional: bool,
}

/// A checked builtin call.
#[derive(Clone, Debug)]
pub struct FunctionCall<'e> {
    /// The function.
    pub builtin: Builtin,
    /// The single positional argument.
    pub argument: &'e Inline,
    /// Named options in source order.
    pub options: Vec<FormatOption>,
}

/// A problem with a function call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallError {
    /// Diagnostic code.
    pub code: DiagnosticCode,
    /// Where the problem is.
    pub location: SourceLocation,
    /// What is wrong.
    pub message: String,
}

impl CallError {
    fn new(code: DiagnosticCode, location: SourceLocation, message: String) -> Self {
        Self {
            code,
            location,
            message,
        }
    }
}

/// Checks a call to `name` written at `location`.
///
/// # Errors
///
/// Returns every problem found: an unknown function, the wrong number or kind
/// of positional arguments, or unsupported options and values.
pub fn check_call<'e>(
    name: &str,
    arguments: &'e Arguments,
    location: SourceLocation,
) -> Result<FunctionCall<'e>, Vec<CallError>> {
    let Some(builtin) = Builtin::from_name(name) else {
        return Err(vec![CallError::new(
            DiagnosticCode::UndefinedReference,
            location,
            format!("unknown function `{name}`; expected NUMBER or DATETIME"),
        )]);
    };

    let mut errors = Vec::new();
    let argument = match arguments.positional.as_slice() {
        [argument] => {
            if !accepts_argument(builtin, argument) {
                errors.push(CallError::new(
                    DiagnosticCode::FunctionCall,
                    argument.location,
                    match builtin {
                        Builtin::Number => String::from(
                            "NUMBER accepts a variable, a number literal, or another NUMBER call",
                        ),
                        Builtin::DateTime => String::from(
                            "DATETIME accepts a variable or another DATETIME call",
                        ),
                    },
                ));
            }
            Some(argument)
        }
        other => {
            errors.push(CallError::new(
                DiagnosticCode::FunctionCall,
                location,
                format!(
                    "{} expects exactly one positional argument, found {}",
                    builtin.name(),
                    other.len()
                ),
            ));
            None
        }
    };

    let mut options = Vec::with_capacity(arguments.named.len());
    for named in &arguments.named {
        let Some(rule) = builtin
            .options()
            .iter()
            .find(|candidate| candidate.name == named.name)
        else {
            errors.push(CallError::new(
                DiagnosticCode::FunctionCall,
                named.location,
                format!("{} does not support the `{}` option", builtin.name(), named.name),
            ));
            continue;
        };
        match option_value(rule, &named.value) {
            Ok(value) => options.push(FormatOption {
                name: rule.name,
                value,
                optional: rule.optional,
            }),
            Err(message) => errors.push(CallError::new(
                DiagnosticCode::FunctionCall,
                named.value.location,
                message,
            )),
        }
    }

    match argument {
        Some(argument) if errors.is_empty() => Ok(FunctionCall {
            builtin,
            argument,
            options,
        }),
        _ => Err(errors),
    }
}

fn accepts_argument(builtin: Builtin, argument: &Inline) -> bool {
    match &argument.kind {
        InlineKind::Variable(_) | InlineKind::Invalid => true,
        InlineKind::Number(_) => builtin == Builtin::Number,
        InlineKind::Function { name, .. } => Builtin::from_name(name) == Some(builtin),
        _ => false,
    }
}

fn option_value(rule: &OptionRule, value: &Inline) -> Result<OptionValue, String> {
    match (rule.kind, &value.kind) {
        (OptionKind::Int, InlineKind::Number(number))
            if number.bytes().all(|byte| byte.is_ascii_digit()) =>
        {
            Ok(OptionValue::Int(number.clone()))
        }
        (OptionKind::Int, _) => Err(format!(
            "`{}` expects a non-negative integer",
            rule.name
        )),
        (OptionKind::Bool, InlineKind::Number(number)) if number == "0" || number == "1" => {
            Ok(OptionValue::Bool(number == "1"))
        }
        (OptionKind::Bool, _) => Err(format!("`{}` expects 0 or 1", rule.name)),
        (OptionKind::Enum(table), InlineKind::String(text)) => table
            .iter()
            .find(|(key, _)| *key == text.as_str())
            .map(|(_, constructor)| OptionValue::Constructor(*constructor))
            .ok_or_else(|| expected_one_of(rule.name, table)),
        (OptionKind::Enum(table), _) => Err(expected_one_of(rule.name, table)),
    }
}

fn expected_one_of(name: &str, table: &[(&str, &str)]) -> String {
    let choices: Vec<String> = table.iter().map(|(key, _)| format!("\"{key}\"")).collect();
    format!("`{name}` expects one of {}", choices.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NamedArgument;
    use rstest::rstest;

    fn at(column: usize) -> SourceLocation {
        SourceLocation::new(1, column)
    }

    fn inline(kind: InlineKind) -> Inline {
        Inline {
            kind,
            location: at(10),
        }
    }

    fn variable() -> Inline {
        inline(InlineKind::Variable(String::from("n")))
    }

    fn named(name: &str, value: InlineKind) -> NamedArgument {
        NamedArgument {
            name: name.to_owned(),
            value: inline(value),
            location: at(20),
        }
    }

    #[rstest]
    fn accepts_valid_number_call() {
        let arguments = Arguments {
            positional: vec![variable()],
            named: vec![
                named("minimumFractionDigits", InlineKind::Number(String::from("2"))),
                named("useGrouping", InlineKind::Number(String::from("0"))),
                named("currencyDisplay", InlineKind::String(String::from("code"))),
            ],
        };
        let call = check_call("NUMBER", &arguments, at(1)).unwrap_or_else(|errors| {
            panic!("unexpected errors: {errors:?}");
        });

        assert_eq!(call.builtin, Builtin::Number);
        assert_eq!(
            call.options,
            vec![
                FormatOption {
                    name: "minimumFractionDigits",
                    value: OptionValue::Int(String::from("2")),
                    optional: true,
                },
                FormatOption {
                    name: "useGrouping",
                    value: OptionValue::Bool(false),
                    optional: false,
                },
                FormatOption {
                    name: "currencyDisplay",
                    value: OptionValue::Constructor("CurrencyCode"),
                    optional: false,
                },
            ]
        );
    }

    #[rstest]
    fn rejects_unknown_functions() {
        let arguments = Arguments {
            positional: vec![variable()],
            named: Vec::new(),
        };
        let errors = check_call("PLATFORM", &arguments, at(1)).err().unwrap_or_default();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, DiagnosticCode::UndefinedReference);
    }

    #[rstest]
    #[case(Vec::new())]
    #[case(vec![variable(), variable()])]
    fn requires_one_positional_argument(#[case] positional: Vec<Inline>) {
        let arguments = Arguments {
            positional,
            named: Vec::new(),
        };
        let errors = check_call("DATETIME", &arguments, at(1)).err().unwrap_or_default();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, DiagnosticCode::FunctionCall);
        assert_eq!(errors[0].location, at(1));
    }

    #[rstest]
    #[case("DATETIME", InlineKind::Number(String::from("1")))]
    #[case("NUMBER", InlineKind::String(String::from("1")))]
    #[case(
        "NUMBER",
        InlineKind::Function {
            name: String::from("DATETIME"),
            arguments: Arguments::default(),
        }
    )]
    fn rejects_bad_argument_kinds(#[case] name: &str, #[case] kind: InlineKind) {
        let arguments = Arguments {
            positional: vec![inline(kind)],
            named: Vec::new(),
        };
        assert!(check_call(name, &arguments, at(1)).is_err());
    }

    #[rstest]
    #[case(
        "NUMBER",
        named("currency", InlineKind::String(String::from("EUR"))),
        "NUMBER does not support the `currency` option"
    )]
    #[case(
        "NUMBER",
        named("useGrouping", InlineKind::Number(String::from("2"))),
        "`useGrouping` expects 0 or 1"
    )]
    #[case(
        "NUMBER",
        named("minimumIntegerDigits", InlineKind::Number(String::from("1.5"))),
        "`minimumIntegerDigits` expects a non-negative integer"
    )]
    #[case(
        "DATETIME",
        named("month", InlineKind::String(String::from("full"))),
        "`month` expects one of \"narrow\", \"short\", \"long\", \"numeric\", \"2-digit\""
    )]
    fn rejects_bad_options(
        #[case] name: &str,
        #[case] option: NamedArgument,
        #[case] expected: &str,
    ) {
        let arguments = Arguments {
            positional: vec![variable()],
            named: vec![option],
        };
        let errors = check_call(name, &arguments, at(1)).err().unwrap_or_default();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, expected);
    }
}
