//! Pluggable converters consulted before the built-in conversion rules.

use std::fmt;
use std::sync::Arc;

use crate::error::LiteralError;
use crate::syntax::SyntaxNode;

/// Rewrites the node for one named target type before built-in conversion.
///
/// The target is matched against the name serde reports for a struct, enum,
/// unit struct, tuple struct or newtype struct (its Rust name unless renamed
/// with `#[serde(rename)]` on the container). The returned node is converted
/// by the built-in rules and is not offered to converters again.
pub trait Converter: Send + Sync {
    fn target(&self) -> &str;

    fn convert(&self, node: &SyntaxNode) -> Result<SyntaxNode, LiteralError>;
}

/// A [`Converter`] backed by a closure.
pub struct FnConverter<F> {
    target: String,
    convert: F,
}

impl<F> FnConverter<F>
where
    F: Fn(&SyntaxNode) -> Result<SyntaxNode, LiteralError> + Send + Sync,
{
    pub fn new(target: impl Into<String>, convert: F) -> Self {
        Self {
            target: target.into(),
            convert,
        }
    }
}

impl<F> Converter for FnConverter<F>
where
    F: Fn(&SyntaxNode) -> Result<SyntaxNode, LiteralError> + Send + Sync,
{
    fn target(&self) -> &str {
        &self.target
    }

    fn convert(&self, node: &SyntaxNode) -> Result<SyntaxNode, LiteralError> {
        (self.convert)(node)
    }
}

/// Registered converters, in registration order. The first claim wins.
#[derive(Clone, Default)]
pub(crate) struct ConverterRegistry {
    converters: Vec<Arc<dyn Converter>>,
}

impl ConverterRegistry {
    pub(crate) fn register(&mut self, converter: Arc<dyn Converter>) {
        self.converters.push(converter);
    }

    pub(crate) fn find(&self, type_name: &str) -> Option<&dyn Converter> {
        self.converters
            .iter()
            .find(|c| c.target() == type_name)
            .map(|c| c.as_ref())
    }

    pub(crate) fn claims(&self, type_name: &str) -> bool {
        self.find(type_name).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.converters.len()
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.converters.iter().map(|c| c.target()))
            .finish()
    }
}
