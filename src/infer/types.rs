//! Argument types and message signatures.

use std::collections::BTreeMap;
use std::fmt;

use common::span::SourceLocation;
use serde::Serialize;

/// The inferred type of a message argument.
///
/// `Unknown` is the bottom of the lattice and unifies with everything; the
/// concrete types are mutually incompatible.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    /// Used, but nothing constrains it. Rendered as text.
    #[default]
    Unknown,
    /// Matched against plain string keys.
    String,
    /// Formatted with `NUMBER` or selected on numerically.
    Number,
    /// Formatted with `DATETIME`.
    Date,
}

impl ArgumentType {
    /// Whether the type carries information.
    #[must_use]
    pub const fn is_concrete(self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Combines two constraints, or returns `None` when they conflict.
    ///
    /// # Examples
    ///
    /// ```
    /// use fluent_elm::infer::ArgumentType;
    ///
    /// assert_eq!(
    ///     ArgumentType::Unknown.unify(ArgumentType::Number),
    ///     Some(ArgumentType::Number)
    /// );
    /// assert_eq!(ArgumentType::Number.unify(ArgumentType::Date), None);
    /// ```
    #[must_use]
    pub fn unify(self, other: Self) -> Option<Self> {
        match (self, other) {
            (Self::Unknown, any) | (any, Self::Unknown) => Some(any),
            (left, right) if left == right => Some(left),
            _ => None,
        }
    }

    /// Describes the type for diagnostics.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Unknown => "untyped text",
            Self::String => "a string",
            Self::Number => "a number",
            Self::Date => "a date",
        }
    }
}

impl fmt::Display for ArgumentType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(match self {
            Self::Unknown => "Unknown",
            Self::String => "String",
            Self::Number => "Number",
            Self::Date => "Date",
        })
    }
}

/// One argument of a signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Field {
    /// The unified type.
    pub ty: ArgumentType,
    /// Where the argument is first used.
    pub location: SourceLocation,
}

/// The arguments a message requires, keyed by Fluent variable name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Signature {
    fields: BTreeMap<String, Field>,
}

impl Signature {
    /// Builds a signature from `(name, field)` pairs.
    #[must_use]
    pub fn from_fields(fields: impl IntoIterator<Item = (String, Field)>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    /// Returns the field for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Returns the type of `name`, if the message uses it.
    #[must_use]
    pub fn type_of(&self, name: &str) -> Option<ArgumentType> {
        self.fields.get(name).map(|field| field.ty)
    }

    /// Iterates over fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    /// Whether the message takes no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Lists the ways `self`, a translation's signature, breaks the contract
    /// set by `default`.
    ///
    /// A translation may use fewer arguments, and may leave an argument
    /// untyped, but it may not introduce arguments or change their type.
    #[must_use]
    pub fn incompatibilities(&self, default: &Self) -> Vec<Incompatibility> {
        self.fields()
            .filter_map(|(name, field)| match default.get(name) {
                None => Some(Incompatibility::Unexpected {
                    name: name.to_owned(),
                    location: field.location,
                }),
                Some(expected) if field.ty.is_concrete() && field.ty != expected.ty => {
                    Some(Incompatibility::Retyped {
                        name: name.to_owned(),
                        found: field.ty,
                        expected: expected.ty,
                        location: field.location,
                    })
                }
                Some(_) => None,
            })
            .collect()
    }
}

/// A translation argument that departs from the default locale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Incompatibility {
    /// The default locale's message does not take this argument.
    Unexpected {
        /// Variable name.
        name: String,
        /// First use in the translation.
        location: SourceLocation,
    },
    /// The translation uses the argument at a different type.
    Retyped {
        /// Variable name.
        name: String,
        /// Type in the translation.
        found: ArgumentType,
        /// Type in the default locale.
        expected: ArgumentType,
        /// First use in the translation.
        location: SourceLocation,
    },
}

impl Incompatibility {
    /// Where the translation diverges.
    #[must_use]
    pub const fn location(&self) -> SourceLocation {
        match self {
            Self::Unexpected { location, .. } | Self::Retyped { location, .. } => *location,
        }
    }

    /// Describes the divergence.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Unexpected { name, .. } => {
                format!("`${name}` is not an argument of the default locale's message")
            }
            Self::Retyped {
                name,
                found,
                expected,
                ..
            } => format!(
                "`${name}` is used as {} but the default locale uses it as {}",
                found.describe(),
                expected.describe()
            ),
        }
    }
}
