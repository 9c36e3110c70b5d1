//! The safe literal evaluator: syntax node in, [`DynamicValue`] out.
//!
//! Evaluation is a pure walk over the closed grammar. Nothing outside it is
//! executed; any other node kind, keyword or statement is rejected with
//! [`LiteralError::UnsupportedLiteral`].

use crate::error::LiteralError;
use crate::syntax::{Constant, Reserved, Statement, SyntaxNode};
use crate::value::{DynamicValue, LiteralMap};

/// Nesting limit used when no materializer configuration is involved.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Evaluate `node` with the default nesting limit.
pub fn evaluate(node: &SyntaxNode) -> Result<DynamicValue, LiteralError> {
    Evaluator::new(DEFAULT_MAX_DEPTH).eval(node, 0)
}

#[cfg(test)]
thread_local! {
    /// Nodes evaluated on this thread.
    pub(crate) static EVALUATED: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

pub(crate) struct Evaluator {
    max_depth: usize,
}

impl Evaluator {
    pub(crate) fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub(crate) fn eval(&self, node: &SyntaxNode, depth: usize) -> Result<DynamicValue, LiteralError> {
        #[cfg(test)]
        EVALUATED.with(|n| n.set(n.get() + 1));

        if depth > self.max_depth {
            return Err(LiteralError::DepthLimitExceeded {
                limit: self.max_depth,
                location: node.extent().location.clone(),
            });
        }

        match node {
            SyntaxNode::Constant { value, .. } => Ok(match value {
                Constant::String(s) => DynamicValue::String(s.clone()),
                Constant::Number(n) => DynamicValue::Number(*n),
                Constant::Bool(b) => DynamicValue::Bool(*b),
            }),
            SyntaxNode::Keyword { name, extent } => match node.reserved_keyword() {
                Some(Reserved::True) => Ok(DynamicValue::Bool(true)),
                Some(Reserved::False) => Ok(DynamicValue::Bool(false)),
                Some(Reserved::Null) => Ok(DynamicValue::Null),
                None => Err(LiteralError::unsupported(
                    format!("variable ${name} is not allowed; only $true, $false and $null are"),
                    extent,
                )),
            },
            SyntaxNode::ArrayLiteral { elements, .. } => elements
                .iter()
                .map(|e| self.eval(e, depth + 1))
                .collect::<Result<Vec<_>, _>>()
                .map(DynamicValue::List),
            SyntaxNode::ArrayExpression { statements, .. } => {
                let mut items = Vec::with_capacity(statements.len());
                for statement in statements {
                    match self.eval_statement(statement, depth + 1)? {
                        DynamicValue::List(inner) => items.extend(inner),
                        other => items.push(other),
                    }
                }
                Ok(DynamicValue::List(items))
            }
            SyntaxNode::MapLiteral { pairs, .. } => {
                let mut map = LiteralMap::new();
                for (key, value) in pairs {
                    let key = self.eval_key(key, depth + 1)?;
                    let value = self.eval_statement(value, depth + 1)?;
                    map.insert(key, value);
                }
                Ok(DynamicValue::Map(map))
            }
            SyntaxNode::Unsupported { kind, extent } => Err(LiteralError::unsupported(
                format!("{kind} is not allowed in a data literal"),
                extent,
            )),
        }
    }

    pub(crate) fn eval_statement(
        &self,
        statement: &Statement,
        depth: usize,
    ) -> Result<DynamicValue, LiteralError> {
        self.eval(statement.expression()?, depth)
    }

    /// Evaluate a map key, which must produce a string.
    pub(crate) fn eval_key(&self, key: &SyntaxNode, depth: usize) -> Result<String, LiteralError> {
        match self.eval(key, depth)? {
            DynamicValue::String(s) => Ok(s),
            _ => Err(LiteralError::unsupported(
                format!("map key must be a string, found {}", key.describe()),
                key.extent(),
            )),
        }
    }
}
