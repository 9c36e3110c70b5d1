//! Safe evaluation and typed materialization of data-literal configuration.
//!
//! Settings files written in a small data-literal dialect (nested maps,
//! arrays, strings, numbers and the `$true`/`$false`/`$null` keywords) arrive
//! here already parsed into [`SyntaxNode`] trees. This crate turns those trees
//! into your configuration structs without ever executing anything.
//!
//! ```ignore
//! #[derive(Deserialize)]
//! struct Settings {
//!     #[serde(rename = "Severity")]
//!     severity: Severity,
//!     #[serde(rename = "IncludeRules", default)]
//!     include_rules: Vec<String>,
//! }
//!
//! let settings: Settings = literal_config::materialize(&node)?;
//! ```
//!
//! # Two stages
//!
//! - **Evaluation** ([`evaluate_literal`]) walks a node and produces a
//!   [`DynamicValue`]: string, number, bool, null, list or a case-insensitive
//!   ordered map. Anything outside the closed grammar (commands, arithmetic,
//!   variables other than the three keywords, statements that are not a single
//!   expression) fails with [`LiteralError::UnsupportedLiteral`].
//!
//! - **Materialization** ([`materialize`], [`Materializer::materialize`])
//!   converts a node directly into any `T: Deserialize`. The target's serde
//!   impl is the type descriptor: the hint it asks for decides which
//!   conversion rule runs, and struct and enum derives supply member names and
//!   labels (after `#[serde(rename)]`).
//!
//! # Conversion rules
//!
//! | Target asks for | Accepted node |
//! |-----------------|---------------|
//! | `bool` | `$true` / `$false` only; a boolean constant is rejected |
//! | integers | a numeric constant, floats rounded half to even, range-checked |
//! | floats | a numeric constant |
//! | `String`, `char`, dates, paths | a string constant |
//! | `Option<T>` | `$null`, or whatever `T` accepts |
//! | enum | a string constant, matched case-insensitively to a label |
//! | `Vec<T>`, sets, arrays | an array literal or `@( ... )` array expression |
//! | maps | a map literal; keys and values converted through the map's types |
//! | struct | a map literal; keys matched case-insensitively to members |
//! | [`DynamicValue`] | anything evaluable |
//! | [`RawNode`] | the node itself, untouched |
//!
//! An `@( ... )` array whose statements are themselves arrays reads as one
//! flat sequence: `@( 1, 2 <newline> 3, 4 )` is `[1, 2, 3, 4]`.
//!
//! Types that need self-describing input (`#[serde(untagged)]`, internally
//! tagged enums, `#[serde(flatten)]`) are rejected with
//! [`LiteralError::ConversionMismatch`]; use [`DynamicValue`] for open-ended
//! members.
//!
//! # Closed schema
//!
//! Every key of a struct's map literal must bind to a member. Leftover keys
//! fail with [`LiteralError::UnknownMember`], naming all of them at once:
//!
//! ```text
//! Unknown member(s) 'Sevrity' of RuleSettings at line 5, column 12 in settings.psd1
//! ```
//!
//! Members without `Option` or `#[serde(default)]` are required and fail with
//! [`LiteralError::MissingRequiredMember`] when absent. Members the application
//! computes itself can be declared as [`ReadOnly<T>`]; configuring one fails
//! with [`LiteralError::MemberNotSettable`].
//!
//! # Shapes and precedence
//!
//! [`Materializer::classify`] reports the [`Shape`] a type is converted as.
//! Categories are checked in a fixed order, first match wins:
//! escape hatch, dynamic, custom converter, enum, nullable, primitive,
//! dictionary, enumerable, plain object ([`ShapeCategory::PRECEDENCE`]).
//! Classification results and enum label tables are cached for the life of
//! the process in concurrent maps.
//!
//! # Custom converters
//!
//! A [`Converter`] claims a named type (struct, enum or newtype name as serde
//! reports it) and rewrites its node before the built-in rules run, e.g. to
//! accept legacy numeric severity levels. Register converters on the
//! [`MaterializerBuilder`].
//!
//! # Error handling
//!
//! All fallible operations return [`LiteralError`]. Errors are meant for end
//! users: they carry the offending source text and its line, column and file.
//! Enable the `rich-errors` feature for `miette` diagnostics with codes and
//! help text.

pub mod error;
pub mod types;

mod builder;
mod converter;
mod de;
mod eval;
mod labels;
mod shape;
mod syntax;
mod value;

#[cfg(test)]
mod fixtures;

use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;

pub use builder::{Materializer, MaterializerBuilder};
pub use converter::{Converter, FnConverter};
pub use error::LiteralError;
pub use eval::DEFAULT_MAX_DEPTH;
pub use shape::{Constructor, PrimitiveKind, Shape, ShapeCategory};
pub use syntax::{Constant, Extent, Location, Number, Statement, SyntaxNode};
pub use types::{RawNode, ReadOnly};
pub use value::{DynamicValue, LiteralMap};

static DEFAULT: Lazy<Materializer> = Lazy::new(Materializer::default);

/// Safely evaluate `node` into a [`DynamicValue`] with the default settings.
pub fn evaluate_literal(node: &SyntaxNode) -> Result<DynamicValue, LiteralError> {
    eval::evaluate(node)
}

/// Materialize `node` as a `T` with the default settings (no converters).
pub fn materialize<T: DeserializeOwned + 'static>(node: &SyntaxNode) -> Result<T, LiteralError> {
    DEFAULT.materialize(node)
}
