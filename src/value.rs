//! Dynamic values produced by the evaluator.
//!
//! `DynamicValue` is also a `Deserializer`, so an evaluated value can drive any
//! serde visitor. Its `Deserialize` impl asks for a reserved newtype name, which
//! is how the node deserializer recognises the "any value" target; other
//! formats see a transparent newtype.

use std::fmt;

use indexmap::IndexMap;
use serde::de::{self, DeserializeSeed, IntoDeserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::LiteralError;
use crate::syntax::Number;
use crate::types::DYNAMIC_TOKEN;

/// An untyped value: the result of safely evaluating a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    List(Vec<DynamicValue>),
    Map(LiteralMap),
}

impl DynamicValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DynamicValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DynamicValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DynamicValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            DynamicValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[DynamicValue]> {
        match self {
            DynamicValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&LiteralMap> {
        match self {
            DynamicValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a key of a map value, ignoring case.
    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Convert to a JSON value, keeping map order and key spelling.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            DynamicValue::Null => Value::Null,
            DynamicValue::Bool(b) => Value::Bool(*b),
            DynamicValue::Number(Number::Int(v)) => Value::from(*v),
            DynamicValue::Number(Number::UInt(v)) => Value::from(*v),
            DynamicValue::Number(Number::Float(v)) => serde_json::Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            DynamicValue::String(s) => Value::String(s.clone()),
            DynamicValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            DynamicValue::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// An insertion-ordered map with case-insensitive string keys.
///
/// Re-inserting a key that differs only in case replaces the value and the
/// stored spelling but keeps the original position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiteralMap {
    entries: IndexMap<String, (String, DynamicValue)>,
}

fn fold(key: &str) -> String {
    key.to_lowercase()
}

impl LiteralMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: DynamicValue) -> Option<DynamicValue> {
        let key = key.into();
        self.entries
            .insert(fold(&key), (key, value))
            .map(|(_, old)| old)
    }

    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        self.entries.get(&fold(key)).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&fold(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order, with keys as last written.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DynamicValue)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|(k, _)| k.as_str())
    }
}

impl FromIterator<(String, DynamicValue)> for LiteralMap {
    fn from_iter<I: IntoIterator<Item = (String, DynamicValue)>>(iter: I) -> Self {
        let mut map = LiteralMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl IntoIterator for LiteralMap {
    type Item = (String, DynamicValue);
    type IntoIter = indexmap::map::IntoValues<String, (String, DynamicValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_values()
    }
}

// -- serde: Serialize ---------------------------------------------------------

impl Serialize for DynamicValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DynamicValue::Null => serializer.serialize_unit(),
            DynamicValue::Bool(b) => serializer.serialize_bool(*b),
            DynamicValue::Number(Number::Int(v)) => serializer.serialize_i64(*v),
            DynamicValue::Number(Number::UInt(v)) => serializer.serialize_u64(*v),
            DynamicValue::Number(Number::Float(v)) => serializer.serialize_f64(*v),
            DynamicValue::String(s) => serializer.serialize_str(s),
            DynamicValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            DynamicValue::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map.iter() {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

// -- serde: Deserialize (the "any value" target) ------------------------------

struct DynamicVisitor;

impl<'de> Visitor<'de> for DynamicVisitor {
    type Value = DynamicValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any literal value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Number(Number::Int(v)))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Number(Number::UInt(v)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Number(Number::Float(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<DynamicValue, E> {
        Ok(DynamicValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<DynamicValue, E> {
        Ok(DynamicValue::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<DynamicValue, E> {
        Ok(DynamicValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<DynamicValue, D::Error> {
        DynamicValue::deserialize(d)
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(self, d: D) -> Result<DynamicValue, D::Error> {
        d.deserialize_any(DynamicVisitor)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<DynamicValue, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(DynamicValue::List(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<DynamicValue, A::Error> {
        let mut map = LiteralMap::new();
        while let Some((k, v)) = access.next_entry::<String, DynamicValue>()? {
            map.insert(k, v);
        }
        Ok(DynamicValue::Map(map))
    }
}

impl<'de> Deserialize<'de> for DynamicValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_newtype_struct(DYNAMIC_TOKEN, DynamicVisitor)
    }
}

// -- serde: Deserializer (values driving visitors) ----------------------------

impl<'de> Deserializer<'de> for DynamicValue {
    type Error = LiteralError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, LiteralError> {
        match self {
            DynamicValue::Null => visitor.visit_unit(),
            DynamicValue::Bool(b) => visitor.visit_bool(b),
            DynamicValue::Number(Number::Int(v)) => visitor.visit_i64(v),
            DynamicValue::Number(Number::UInt(v)) => visitor.visit_u64(v),
            DynamicValue::Number(Number::Float(v)) => visitor.visit_f64(v),
            DynamicValue::String(s) => visitor.visit_string(s),
            DynamicValue::List(items) => visitor.visit_seq(ValueSeq {
                iter: items.into_iter(),
            }),
            DynamicValue::Map(map) => visitor.visit_map(ValueMap {
                iter: map.into_iter(),
                pending: None,
            }),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, LiteralError> {
        match self {
            DynamicValue::Null => visitor.visit_none(),
            other => visitor.visit_some(other),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, LiteralError> {
        match self {
            DynamicValue::String(label) => visitor.visit_enum(label.into_deserializer()),
            other => other.deserialize_any(visitor),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, LiteralError> {
        visitor.visit_newtype_struct(self)
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct
        identifier ignored_any
    }
}

impl<'de> IntoDeserializer<'de, LiteralError> for DynamicValue {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}

struct ValueSeq {
    iter: std::vec::IntoIter<DynamicValue>,
}

impl<'de> SeqAccess<'de> for ValueSeq {
    type Error = LiteralError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, LiteralError> {
        self.iter.next().map(|v| seed.deserialize(v)).transpose()
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct ValueMap<I> {
    iter: I,
    pending: Option<DynamicValue>,
}

impl<'de, I> MapAccess<'de> for ValueMap<I>
where
    I: Iterator<Item = (String, DynamicValue)>,
{
    type Error = LiteralError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, LiteralError> {
        let Some((key, value)) = self.iter.next() else {
            return Ok(None);
        };
        self.pending = Some(value);
        seed.deserialize(key.into_deserializer()).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(
        &mut self,
        seed: V,
    ) -> Result<V::Value, LiteralError> {
        let value = self
            .pending
            .take()
            .ok_or_else(|| {
                <LiteralError as de::Error>::custom("map value requested before its key")
            })?;
        seed.deserialize(value)
    }
}
