use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{Level, debug};

use crate::converter::{Converter, ConverterRegistry};
use crate::de::NodeDeserializer;
use crate::error::LiteralError;
use crate::eval::{DEFAULT_MAX_DEPTH, Evaluator};
use crate::shape::{self, Shape};
use crate::syntax::SyntaxNode;
use crate::value::DynamicValue;

/// Converts syntax nodes into typed configuration values.
///
/// Cheap to share: a `Materializer` holds no per-call state, and the caches it
/// consults are process-wide and thread-safe.
#[derive(Debug, Clone)]
pub struct Materializer {
    converters: ConverterRegistry,
    max_depth: usize,
}

impl Default for Materializer {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Materializer {
    pub fn builder() -> MaterializerBuilder {
        MaterializerBuilder::new()
    }

    /// Materialize `node` as a `T`.
    ///
    /// Fails on the first node whose shape does not match what `T` asks for;
    /// no partially built value is ever returned.
    pub fn materialize<T: DeserializeOwned + 'static>(
        &self,
        node: &SyntaxNode,
    ) -> Result<T, LiteralError> {
        if tracing::enabled!(Level::DEBUG) {
            debug!(
                target_type = std::any::type_name::<T>(),
                shape = %self.classify::<T>().category(),
                "materializing"
            );
        }
        T::deserialize(NodeDeserializer::new(node, self))
    }

    /// Safely evaluate `node` into an untyped value.
    pub fn evaluate(&self, node: &SyntaxNode) -> Result<DynamicValue, LiteralError> {
        Evaluator::new(self.max_depth).eval(node, 0)
    }

    /// Classify `T` into its shape. First match wins, in the order of
    /// [`ShapeCategory::PRECEDENCE`](crate::ShapeCategory::PRECEDENCE).
    ///
    /// This reports; it does not dispatch. Materialization follows the hints
    /// `T`'s `Deserialize` impl asks for, which are the same hints the shape is
    /// read from. Two limits of reporting:
    ///
    /// - A dictionary whose key type cannot be given a placeholder (an enum
    ///   key, say) reports no value shape.
    /// - A self-describing type such as an untagged enum reports
    ///   [`Shape::Dynamic`], but materializing it fails with
    ///   [`LiteralError::ConversionMismatch`].
    pub fn classify<T: DeserializeOwned + 'static>(&self) -> Shape {
        let probed = shape::probe::<T>();
        if matches!(probed.shape, Shape::EscapeHatch | Shape::Dynamic) {
            return probed.shape;
        }
        match probed.name {
            Some(name) if self.converters.claims(name) => Shape::Custom {
                type_name: name.to_string(),
            },
            _ => probed.shape,
        }
    }

    /// Register a converter after construction. Converters registered earlier
    /// keep precedence.
    pub fn register_converter(&mut self, converter: impl Converter + 'static) {
        self.converters.register(Arc::new(converter));
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub(crate) fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }
}

/// Builder for a [`Materializer`].
pub struct MaterializerBuilder {
    converters: ConverterRegistry,
    max_depth: usize,
}

impl MaterializerBuilder {
    fn new() -> Self {
        Self {
            converters: ConverterRegistry::default(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Add a converter. Converters are consulted in the order they are added,
    /// before any built-in conversion rule.
    pub fn converter(mut self, converter: impl Converter + 'static) -> Self {
        self.converters.register(Arc::new(converter));
        self
    }

    /// Set the maximum nesting of arrays and maps (default: 64).
    /// Deeper input fails with [`LiteralError::DepthLimitExceeded`].
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn build(self) -> Materializer {
        Materializer {
            converters: self.converters,
            max_depth: self.max_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::FnConverter;
    use crate::fixtures::test::*;
    use crate::shape::ShapeCategory;
    use crate::syntax::{Constant, Number};

    /// Accepts the numeric severity levels older settings files used.
    fn numeric_severity(node: &SyntaxNode) -> Result<SyntaxNode, LiteralError> {
        let SyntaxNode::Constant {
            value: Constant::Number(Number::Int(level)),
            extent,
        } = node
        else {
            return Ok(node.clone());
        };
        let label = match level {
            0 => "Information",
            1 => "Warning",
            2 => "Error",
            _ => return Err(LiteralError::mismatch("unknown severity level", extent)),
        };
        Ok(SyntaxNode::string(label, extent.clone()))
    }

    #[test]
    fn default_builder_values() {
        let m = Materializer::default();
        assert_eq!(m.max_depth(), DEFAULT_MAX_DEPTH);
        assert_eq!(m.converters().len(), 0);
    }

    #[test]
    fn converter_runs_before_enum_rule() {
        let m = Materializer::builder()
            .converter(FnConverter::new("Severity", numeric_severity))
            .build();
        let value: Severity = m.materialize(&int(1)).unwrap();
        assert_eq!(value, Severity::Warning);

        // Converter output still goes through the built-in label lookup.
        let value: Severity = m.materialize(&s("error")).unwrap();
        assert_eq!(value, Severity::Error);
    }

    #[test]
    fn converter_applies_to_nested_members() {
        let m = Materializer::builder()
            .converter(FnConverter::new("Severity", numeric_severity))
            .build();
        let node = map(vec![
            ("Severity", int(2)),
            ("IncludeRules", list(vec![s("RuleA")])),
        ]);
        let selection: RuleSelection = m.materialize(&node).unwrap();
        assert_eq!(selection.severity, Severity::Error);
    }

    #[test]
    fn converter_errors_are_located() {
        let m = Materializer::builder()
            .converter(FnConverter::new("Severity", numeric_severity))
            .build();
        let err = m.materialize::<Severity>(&int(9)).unwrap_err();
        assert!(matches!(err, LiteralError::ConversionMismatch { .. }));
        assert_eq!(err.location().line, 1);
    }

    #[test]
    fn register_converter_after_build() {
        let mut m = Materializer::default();
        m.register_converter(FnConverter::new("Severity", numeric_severity));
        assert_eq!(m.materialize::<Severity>(&int(0)).unwrap(), Severity::Information);
    }

    #[test]
    fn classify_reports_custom_for_claimed_types() {
        let m = Materializer::builder()
            .converter(FnConverter::new("Severity", numeric_severity))
            .build();
        assert_eq!(
            m.classify::<Severity>(),
            Shape::Custom {
                type_name: "Severity".into()
            }
        );
        // Unclaimed materializers still see the enum.
        assert_eq!(
            Materializer::default().classify::<Severity>().category(),
            ShapeCategory::Enum
        );
    }

    #[test]
    fn escape_hatch_and_dynamic_outrank_converters() {
        let m = Materializer::builder()
            .converter(FnConverter::new("RawNode", |n: &SyntaxNode| Ok(n.clone())))
            .build();
        assert_eq!(m.classify::<crate::RawNode>(), Shape::EscapeHatch);
        assert_eq!(m.classify::<DynamicValue>(), Shape::Dynamic);
    }

    #[test]
    fn classification_matches_materialization() {
        let m = Materializer::default();

        assert_eq!(m.classify::<RuleSettings>().category(), ShapeCategory::PlainObject);
        let rule: RuleSettings = m.materialize(&map(vec![("Enable", kw("true"))])).unwrap();
        assert!(rule.enable);

        assert_eq!(m.classify::<Vec<Severity>>().category(), ShapeCategory::Enumerable);
        let severities: Vec<Severity> = m.materialize(&list(vec![s("error")])).unwrap();
        assert_eq!(severities, vec![Severity::Error]);

        assert_eq!(m.classify::<Option<u32>>().category(), ShapeCategory::Nullable);
        assert_eq!(m.materialize::<Option<u32>>(&kw("null")).unwrap(), None);

        assert_eq!(
            m.classify::<std::collections::HashMap<Severity, u8>>().category(),
            ShapeCategory::Dictionary
        );
        let counts: std::collections::HashMap<Severity, u8> =
            m.materialize(&map(vec![("warning", int(2))])).unwrap();
        assert_eq!(counts[&Severity::Warning], 2);

        assert!(matches!(
            m.classify::<Point>(),
            Shape::PlainObject { constructor: crate::Constructor::Positional(2), .. }
        ));
        assert!(matches!(
            m.materialize::<Point>(&map(vec![])).unwrap_err(),
            LiteralError::NoUsableConstructor { .. }
        ));
    }

    #[test]
    fn max_depth_limits_materialization() {
        let m = Materializer::builder().max_depth(2).build();
        let shallow = list(vec![list(vec![int(1)])]);
        let nested: Vec<Vec<u8>> = m.materialize(&shallow).unwrap();
        assert_eq!(nested, vec![vec![1]]);

        let deep = list(vec![list(vec![list(vec![list(vec![int(1)])])])]);
        let err = m.materialize::<Vec<Vec<Vec<Vec<u8>>>>>(&deep).unwrap_err();
        assert!(matches!(
            err,
            LiteralError::DepthLimitExceeded { limit: 2, .. }
        ));
    }

    #[test]
    fn max_depth_limits_evaluation() {
        let m = Materializer::builder().max_depth(1).build();
        let deep = list(vec![list(vec![list(vec![int(1)])])]);
        assert!(matches!(
            m.evaluate(&deep).unwrap_err(),
            LiteralError::DepthLimitExceeded { .. }
        ));
    }

    #[test]
    fn materializer_is_shareable_across_threads() {
        let m = Materializer::default();
        let node = map(vec![
            ("Severity", s("warning")),
            ("IncludeRules", list(vec![s("RuleA"), s("RuleB")])),
        ]);
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    let selection: RuleSelection = m.materialize(&node).unwrap();
                    assert_eq!(selection.severity, Severity::Warning);
                });
            }
        });
    }
}
