//! Shape classification of target types.
//!
//! A type's shape is read off its `Deserialize` impl: the type is run against
//! a probing deserializer that records which hint it asks for (and, for
//! options, sequences and maps, the hints of its inner types) and then stops.
//! Results are memoized per `TypeId` for the life of the process.

use std::any::TypeId;
use std::cell::RefCell;
use std::fmt;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use serde::de::{self, DeserializeOwned, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use serde::Deserializer;
use tracing::trace;

use crate::types::{DYNAMIC_TOKEN, RAW_NODE_TOKEN, READ_ONLY_TOKEN};

/// The conversion strategy for a target type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// The raw syntax node is handed over untouched ([`RawNode`](crate::RawNode)).
    EscapeHatch,
    /// Any value; the node is evaluated ([`DynamicValue`](crate::DynamicValue)).
    Dynamic,
    /// A registered converter claims the named type.
    Custom { type_name: String },
    /// A string label resolved against the enum's labels.
    Enum {
        name: &'static str,
        labels: &'static [&'static str],
    },
    /// `$null` or the inner shape.
    Nullable(Box<Shape>),
    Primitive(PrimitiveKind),
    /// A map literal converted entry by entry. `value` is absent when the key
    /// type cannot be probed without real input.
    Dictionary {
        key: Box<Shape>,
        value: Option<Box<Shape>>,
    },
    /// An array converted element by element.
    Enumerable { element: Box<Shape> },
    /// A map literal bound to named members.
    PlainObject {
        name: &'static str,
        constructor: Constructor,
        members: &'static [&'static str],
    },
}

/// How a plain object is brought into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constructor {
    /// Members are bound by name.
    Named,
    /// No arguments and no members.
    Unit,
    /// Only positional arguments; map keys cannot bind to them.
    Positional(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    I128,
    U8,
    U16,
    U32,
    U64,
    U128,
    F32,
    F64,
    Char,
    /// Strings and string-parsed values such as dates and paths.
    String,
    Unit,
}

/// Shape categories in first-match-wins order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ShapeCategory {
    EscapeHatch,
    Dynamic,
    Custom,
    Enum,
    Nullable,
    Primitive,
    Dictionary,
    Enumerable,
    PlainObject,
}

impl ShapeCategory {
    pub const PRECEDENCE: [ShapeCategory; 9] = [
        ShapeCategory::EscapeHatch,
        ShapeCategory::Dynamic,
        ShapeCategory::Custom,
        ShapeCategory::Enum,
        ShapeCategory::Nullable,
        ShapeCategory::Primitive,
        ShapeCategory::Dictionary,
        ShapeCategory::Enumerable,
        ShapeCategory::PlainObject,
    ];
}

impl fmt::Display for ShapeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShapeCategory::EscapeHatch => "escape-hatch",
            ShapeCategory::Dynamic => "dynamic",
            ShapeCategory::Custom => "custom",
            ShapeCategory::Enum => "enum",
            ShapeCategory::Nullable => "nullable",
            ShapeCategory::Primitive => "primitive",
            ShapeCategory::Dictionary => "dictionary",
            ShapeCategory::Enumerable => "enumerable",
            ShapeCategory::PlainObject => "object",
        };
        f.write_str(name)
    }
}

impl Shape {
    pub fn category(&self) -> ShapeCategory {
        match self {
            Shape::EscapeHatch => ShapeCategory::EscapeHatch,
            Shape::Dynamic => ShapeCategory::Dynamic,
            Shape::Custom { .. } => ShapeCategory::Custom,
            Shape::Enum { .. } => ShapeCategory::Enum,
            Shape::Nullable(_) => ShapeCategory::Nullable,
            Shape::Primitive(_) => ShapeCategory::Primitive,
            Shape::Dictionary { .. } => ShapeCategory::Dictionary,
            Shape::Enumerable { .. } => ShapeCategory::Enumerable,
            Shape::PlainObject { .. } => ShapeCategory::PlainObject,
        }
    }
}

/// What probing a type yields: its shape plus the outermost name serde
/// reported for it, which is what converters are matched against.
#[derive(Debug, Clone)]
pub(crate) struct Probed {
    pub(crate) shape: Shape,
    pub(crate) name: Option<&'static str>,
}

static SHAPES: Lazy<DashMap<TypeId, Probed>> = Lazy::new(DashMap::new);

/// Probe `T`, memoized. A race to populate the same entry computes the same
/// value twice; either write is correct.
pub(crate) fn probe<T: DeserializeOwned + 'static>() -> Probed {
    let id = TypeId::of::<T>();
    if let Some(hit) = SHAPES.get(&id) {
        return hit.clone();
    }

    let probed = probe_uncached(|p| T::deserialize(p).map(drop));
    trace!(
        target_type = std::any::type_name::<T>(),
        shape = %probed.shape.category(),
        "classified target type"
    );
    SHAPES.insert(id, probed.clone());
    probed
}

fn probe_uncached(run: impl FnOnce(Probe<'_>) -> Result<(), Stop>) -> Probed {
    let slot = Slot::default();
    let _ = run(Probe::new(&slot));
    slot.finish()
}

// -- Probe deserializer --------------------------------------------------------

#[derive(Debug)]
struct Stop;

impl fmt::Display for Stop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("probe finished")
    }
}

impl std::error::Error for Stop {}

impl de::Error for Stop {
    fn custom<T: fmt::Display>(_msg: T) -> Self {
        Stop
    }
}

#[derive(Default)]
struct Slot {
    shape: RefCell<Option<Shape>>,
    name: RefCell<Option<&'static str>>,
}

impl Slot {
    fn record(&self, shape: Shape) {
        let mut current = self.shape.borrow_mut();
        if current.is_none() {
            *current = Some(shape);
        }
    }

    fn name(&self, name: &'static str) {
        let mut current = self.name.borrow_mut();
        if current.is_none() {
            *current = Some(name);
        }
    }

    fn finish(self) -> Probed {
        Probed {
            // A type that never asks for anything accepts any input.
            shape: self.shape.into_inner().unwrap_or(Shape::Dynamic),
            name: self.name.into_inner(),
        }
    }
}

fn nested(run: impl FnOnce(Probe<'_>) -> Result<(), Stop>) -> Box<Shape> {
    Box::new(probe_uncached(run).shape)
}

/// Records the first hint it receives. In key position it then hands the
/// visitor a placeholder for scalar hints so the map's value can be probed
/// too.
struct Probe<'a> {
    slot: &'a Slot,
    placeholder: bool,
}

impl<'a> Probe<'a> {
    fn new(slot: &'a Slot) -> Self {
        Self {
            slot,
            placeholder: false,
        }
    }

    fn stop<T>(&self, shape: Shape) -> Result<T, Stop> {
        self.slot.record(shape);
        Err(Stop)
    }
}

macro_rules! probe_primitive {
    ($($method:ident => $kind:ident, $visit:ident($placeholder:expr);)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Stop> {
                self.slot.record(Shape::Primitive(PrimitiveKind::$kind));
                if self.placeholder {
                    visitor.$visit($placeholder)
                } else {
                    Err(Stop)
                }
            }
        )*
    };
}

impl<'de> Deserializer<'de> for Probe<'_> {
    type Error = Stop;

    probe_primitive! {
        deserialize_bool => Bool, visit_bool(false);
        deserialize_i8 => I8, visit_i8(0);
        deserialize_i16 => I16, visit_i16(0);
        deserialize_i32 => I32, visit_i32(0);
        deserialize_i64 => I64, visit_i64(0);
        deserialize_i128 => I128, visit_i128(0);
        deserialize_u8 => U8, visit_u8(0);
        deserialize_u16 => U16, visit_u16(0);
        deserialize_u32 => U32, visit_u32(0);
        deserialize_u64 => U64, visit_u64(0);
        deserialize_u128 => U128, visit_u128(0);
        deserialize_f32 => F32, visit_f32(0.0);
        deserialize_f64 => F64, visit_f64(0.0);
        deserialize_char => Char, visit_char('\0');
        deserialize_str => String, visit_str("");
        deserialize_string => String, visit_str("");
        deserialize_identifier => String, visit_str("");
    }

    // Self-describing types (untagged enums and the like) have no fixed
    // shape; materialization rejects them.
    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Stop> {
        self.stop(Shape::Dynamic)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Stop> {
        self.stop(Shape::Dynamic)
    }

    fn deserialize_unit<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Stop> {
        self.stop(Shape::Primitive(PrimitiveKind::Unit))
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Stop> {
        self.stop(Shape::Enumerable {
            element: Box::new(Shape::Primitive(PrimitiveKind::U8)),
        })
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Stop> {
        self.deserialize_bytes(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Stop> {
        let inner = nested(|p| visitor.visit_some(p).map(drop));
        self.stop(Shape::Nullable(inner))
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Stop> {
        let element = nested(|p| visitor.visit_seq(ProbeSeq { probe: Some(p) }).map(drop));
        self.stop(Shape::Enumerable { element })
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, Stop> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Stop> {
        let key = Slot::default();
        let value = Slot::default();
        let _ = visitor.visit_map(ProbeMap {
            key: &key,
            value: &value,
            done: false,
        });
        let value = value.shape.into_inner().map(Box::new);
        let key = Box::new(key.finish().shape);
        self.stop(Shape::Dictionary { key, value })
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Stop> {
        self.slot.name(name);
        self.stop(Shape::PlainObject {
            name,
            constructor: Constructor::Named,
            members: fields,
        })
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        _visitor: V,
    ) -> Result<V::Value, Stop> {
        self.slot.name(name);
        self.stop(Shape::PlainObject {
            name,
            constructor: Constructor::Unit,
            members: &[],
        })
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        len: usize,
        _visitor: V,
    ) -> Result<V::Value, Stop> {
        self.slot.name(name);
        self.stop(Shape::PlainObject {
            name,
            constructor: Constructor::Positional(len),
            members: &[],
        })
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Stop> {
        self.slot.name(name);
        self.stop(Shape::Enum {
            name,
            labels: variants,
        })
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Stop> {
        if name == RAW_NODE_TOKEN {
            return self.stop(Shape::EscapeHatch);
        }
        if name == DYNAMIC_TOKEN {
            return self.stop(Shape::Dynamic);
        }
        if name != READ_ONLY_TOKEN {
            self.slot.name(name);
        }
        // Newtypes are transparent: the inner type records into this slot.
        visitor.visit_newtype_struct(self)
    }
}

struct ProbeSeq<'a> {
    probe: Option<Probe<'a>>,
}

impl<'de> SeqAccess<'de> for ProbeSeq<'_> {
    type Error = Stop;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Stop> {
        match self.probe.take() {
            Some(probe) => seed.deserialize(probe).map(Some),
            None => Err(Stop),
        }
    }
}

struct ProbeMap<'a> {
    key: &'a Slot,
    value: &'a Slot,
    done: bool,
}

impl<'de> MapAccess<'de> for ProbeMap<'_> {
    type Error = Stop;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Stop> {
        if self.done {
            return Err(Stop);
        }
        self.done = true;
        seed.deserialize(Probe {
            slot: self.key,
            placeholder: true,
        })
        .map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Stop> {
        seed.deserialize(Probe::new(self.value))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use super::*;
    use crate::fixtures::test::*;
    use crate::types::{RawNode, ReadOnly};
    use crate::value::DynamicValue;

    fn shape<T: DeserializeOwned + 'static>() -> Shape {
        probe::<T>().shape
    }

    #[test]
    fn precedence_order_is_stable() {
        let mut sorted = ShapeCategory::PRECEDENCE;
        sorted.sort();
        assert_eq!(sorted, ShapeCategory::PRECEDENCE);
        assert_eq!(ShapeCategory::PRECEDENCE[0], ShapeCategory::EscapeHatch);
        assert_eq!(ShapeCategory::PRECEDENCE[8], ShapeCategory::PlainObject);
    }

    #[test]
    fn escape_hatch_and_dynamic() {
        assert_eq!(shape::<RawNode>(), Shape::EscapeHatch);
        assert_eq!(shape::<DynamicValue>(), Shape::Dynamic);
    }

    #[test]
    fn primitives() {
        assert_eq!(shape::<bool>(), Shape::Primitive(PrimitiveKind::Bool));
        assert_eq!(shape::<u16>(), Shape::Primitive(PrimitiveKind::U16));
        assert_eq!(shape::<f64>(), Shape::Primitive(PrimitiveKind::F64));
        assert_eq!(shape::<String>(), Shape::Primitive(PrimitiveKind::String));
        assert_eq!(
            shape::<std::path::PathBuf>(),
            Shape::Primitive(PrimitiveKind::String)
        );
    }

    #[test]
    fn date_times_are_string_primitives() {
        assert_eq!(
            shape::<chrono::DateTime<chrono::Utc>>(),
            Shape::Primitive(PrimitiveKind::String)
        );
    }

    #[test]
    fn enum_carries_labels_after_rename() {
        match shape::<Severity>() {
            Shape::Enum { name, labels } => {
                assert_eq!(name, "Severity");
                assert!(labels.contains(&"ParseError"));
                assert!(!labels.contains(&"Parse"));
            }
            other => panic!("Expected Enum, got: {other:?}"),
        }
    }

    #[test]
    fn nullable_wraps_inner_shape() {
        assert_eq!(
            shape::<Option<i32>>(),
            Shape::Nullable(Box::new(Shape::Primitive(PrimitiveKind::I32)))
        );
        assert!(matches!(
            shape::<Option<Severity>>(),
            Shape::Nullable(inner) if inner.category() == ShapeCategory::Enum
        ));
    }

    #[test]
    fn enumerable_element_shapes() {
        assert_eq!(
            shape::<Vec<String>>(),
            Shape::Enumerable {
                element: Box::new(Shape::Primitive(PrimitiveKind::String))
            }
        );
        assert_eq!(
            shape::<[u8; 3]>(),
            Shape::Enumerable {
                element: Box::new(Shape::Primitive(PrimitiveKind::U8))
            }
        );
    }

    #[test]
    fn dictionary_key_and_value_shapes() {
        assert_eq!(
            shape::<HashMap<String, u32>>(),
            Shape::Dictionary {
                key: Box::new(Shape::Primitive(PrimitiveKind::String)),
                value: Some(Box::new(Shape::Primitive(PrimitiveKind::U32))),
            }
        );
        match shape::<BTreeMap<String, RuleSettings>>() {
            Shape::Dictionary { value: Some(value), .. } => {
                assert_eq!(value.category(), ShapeCategory::PlainObject);
            }
            other => panic!("Expected Dictionary, got: {other:?}"),
        }
    }

    #[test]
    fn dictionary_with_enum_keys_has_unknown_value_shape() {
        match shape::<HashMap<Severity, u8>>() {
            Shape::Dictionary { key, value } => {
                assert_eq!(key.category(), ShapeCategory::Enum);
                assert_eq!(value, None);
            }
            other => panic!("Expected Dictionary, got: {other:?}"),
        }
    }

    #[test]
    fn plain_objects() {
        match shape::<RuleSettings>() {
            Shape::PlainObject {
                name,
                constructor,
                members,
            } => {
                assert_eq!(name, "RuleSettings");
                assert_eq!(constructor, Constructor::Named);
                assert_eq!(members, &["Enable", "MaxLength"]);
            }
            other => panic!("Expected PlainObject, got: {other:?}"),
        }
        assert!(matches!(
            shape::<Point>(),
            Shape::PlainObject {
                constructor: Constructor::Positional(2),
                ..
            }
        ));
        assert!(matches!(
            shape::<Marker>(),
            Shape::PlainObject {
                constructor: Constructor::Unit,
                ..
            }
        ));
    }

    #[test]
    fn read_only_is_transparent() {
        assert_eq!(
            shape::<ReadOnly<u8>>(),
            Shape::Primitive(PrimitiveKind::U8)
        );
        assert_eq!(probe::<ReadOnly<u8>>().name, None);
    }

    #[test]
    fn outermost_name_is_recorded() {
        assert_eq!(probe::<Severity>().name, Some("Severity"));
        assert_eq!(probe::<Vec<Severity>>().name, None);
    }

    #[test]
    fn concurrent_classification_agrees() {
        let shapes: Vec<Shape> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(shape::<AnalyzerSettings>))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(shapes.windows(2).all(|w| w[0] == w[1]));
    }
}
