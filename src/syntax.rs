//! The syntax node contract handed over by the external parser.
//!
//! Nodes are read-only input. The core never builds them from source text;
//! the constructors here exist for parser adapters and for tests. Every node
//! carries an [`Extent`] so errors can point back at the source.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::LiteralError;

/// A position in a source file. Line and column are 1-indexed; line 0 means
/// the position is unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: Option<PathBuf>,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(file: Option<PathBuf>, line: usize, column: usize) -> Self {
        Self { file, line, column }
    }

    pub fn is_known(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_known() {
            return f.write_str("unknown location");
        }
        write!(f, "line {}, column {}", self.line, self.column)?;
        if let Some(file) = &self.file {
            write!(f, " in {}", file.display())?;
        }
        Ok(())
    }
}

/// The source text a node was parsed from, plus where it starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    pub text: String,
    pub location: Location,
}

impl Extent {
    pub fn new(text: impl Into<String>, location: Location) -> Self {
        Self {
            text: text.into(),
            location,
        }
    }
}

/// A numeric literal, kept in the representation the parser produced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Number {
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(v) => write!(f, "{v}"),
            Number::UInt(v) => write!(f, "{v}"),
            Number::Float(v) => write!(f, "{v}"),
        }
    }
}

/// The primitive payload of a [`SyntaxNode::Constant`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    String(String),
    Number(Number),
    Bool(bool),
}

impl Constant {
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            Constant::String(_) => "string constant",
            Constant::Number(_) => "numeric constant",
            Constant::Bool(_) => "boolean constant",
        }
    }
}

/// One statement of an array expression or one map value.
///
/// Only a single pure expression is part of the grammar. Anything else the
/// parser recognised (pipelines, control flow, assignments) is carried as
/// `Unsupported` so it can be rejected with its location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Expression(SyntaxNode),
    Unsupported { kind: String, extent: Extent },
}

impl Statement {
    /// The statement's expression, or an error if it is not a single pure
    /// expression.
    pub fn expression(&self) -> Result<&SyntaxNode, LiteralError> {
        match self {
            Statement::Expression(expr) => Ok(expr),
            Statement::Unsupported { kind, extent } => Err(LiteralError::unsupported(
                format!("{kind} statement is not a single pure expression"),
                extent,
            )),
        }
    }

    pub fn extent(&self) -> &Extent {
        match self {
            Statement::Expression(node) => node.extent(),
            Statement::Unsupported { extent, .. } => extent,
        }
    }
}

/// A node of an already-parsed data literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyntaxNode {
    /// A string, number or boolean literal.
    Constant { value: Constant, extent: Extent },
    /// A variable reference. Only `true`, `false` and `null` are meaningful.
    Keyword { name: String, extent: Extent },
    /// The statement-block array form, `@( ... )`.
    ArrayExpression {
        statements: Vec<Statement>,
        extent: Extent,
    },
    /// The flat comma-separated list form, `a, b, c`.
    ArrayLiteral {
        elements: Vec<SyntaxNode>,
        extent: Extent,
    },
    /// An ordered map literal, `@{ key = value; ... }`.
    MapLiteral {
        pairs: Vec<(SyntaxNode, Statement)>,
        extent: Extent,
    },
    /// Any other expression the parser produced: commands, arithmetic,
    /// sub-expressions, member access and so on.
    Unsupported { kind: String, extent: Extent },
}

impl SyntaxNode {
    pub fn string(value: impl Into<String>, extent: Extent) -> Self {
        SyntaxNode::Constant {
            value: Constant::String(value.into()),
            extent,
        }
    }

    pub fn number(value: Number, extent: Extent) -> Self {
        SyntaxNode::Constant {
            value: Constant::Number(value),
            extent,
        }
    }

    pub fn keyword(name: impl Into<String>, extent: Extent) -> Self {
        SyntaxNode::Keyword {
            name: name.into(),
            extent,
        }
    }

    pub fn extent(&self) -> &Extent {
        match self {
            SyntaxNode::Constant { extent, .. }
            | SyntaxNode::Keyword { extent, .. }
            | SyntaxNode::ArrayExpression { extent, .. }
            | SyntaxNode::ArrayLiteral { extent, .. }
            | SyntaxNode::MapLiteral { extent, .. }
            | SyntaxNode::Unsupported { extent, .. } => extent,
        }
    }

    /// Short description used in mismatch messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            SyntaxNode::Constant { value, .. } => value.describe().to_string(),
            SyntaxNode::Keyword { name, .. } => format!("keyword ${name}"),
            SyntaxNode::ArrayExpression { .. } | SyntaxNode::ArrayLiteral { .. } => {
                "array".to_string()
            }
            SyntaxNode::MapLiteral { .. } => "map literal".to_string(),
            SyntaxNode::Unsupported { kind, .. } => kind.clone(),
        }
    }

    /// The reserved keyword this node names, if it is one.
    pub(crate) fn reserved_keyword(&self) -> Option<Reserved> {
        match self {
            SyntaxNode::Keyword { name, .. } => Reserved::parse(name),
            _ => None,
        }
    }
}

/// The three keyword literals of the grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reserved {
    True,
    False,
    Null,
}

impl Reserved {
    fn parse(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("true") {
            Some(Reserved::True)
        } else if name.eq_ignore_ascii_case("false") {
            Some(Reserved::False)
        } else if name.eq_ignore_ascii_case("null") {
            Some(Reserved::Null)
        } else {
            None
        }
    }
}

/// Flatten an array node into its items.
///
/// An `ArrayExpression` statement that is itself an array contributes its
/// items rather than a nested list, so a literal spanning several lines reads
/// as one sequence. `depth` is the node's own nesting level; every spliced
/// statement counts one level deeper, as it does for the evaluator.
pub(crate) fn array_items(
    node: &SyntaxNode,
    depth: usize,
    limit: usize,
) -> Option<Result<Vec<&SyntaxNode>, LiteralError>> {
    match node {
        SyntaxNode::ArrayLiteral { elements, .. } => Some(Ok(elements.iter().collect())),
        SyntaxNode::ArrayExpression { statements, .. } => Some(splice(statements, depth + 1, limit)),
        _ => None,
    }
}

fn splice(
    statements: &[Statement],
    depth: usize,
    limit: usize,
) -> Result<Vec<&SyntaxNode>, LiteralError> {
    let mut items = Vec::with_capacity(statements.len());
    for statement in statements {
        let expr = statement.expression()?;
        if depth > limit {
            return Err(LiteralError::DepthLimitExceeded {
                limit,
                location: expr.extent().location.clone(),
            });
        }
        match array_items(expr, depth, limit) {
            Some(inner) => items.extend(inner?),
            None => items.push(expr),
        }
    }
    Ok(items)
}
