//! Custom serde Deserializer that materializes typed values straight from
//! syntax nodes.
//!
//! Each `deserialize_*` hint is one conversion rule. A node that does not have
//! the shape the hint implies fails immediately; nothing is defaulted or
//! coerced. Keywords other than `$true`/`$false`/`$null` and foreign node kinds
//! are rejected as unsupported before any rule looks at them.

use std::cell::RefCell;

use indexmap::IndexMap;
use serde::de::{self, DeserializeSeed, IntoDeserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserializer;
use tracing::debug;

use crate::builder::Materializer;
use crate::error::LiteralError;
use crate::eval::Evaluator;
use crate::labels;
use crate::syntax::{self, Constant, Extent, Number, Reserved, Statement, SyntaxNode};
use crate::types::{DYNAMIC_TOKEN, RAW_NODE_TOKEN, READ_ONLY_TOKEN};

type Result<T> = std::result::Result<T, LiteralError>;

/// The struct member a value is being converted for.
#[derive(Clone, Copy)]
struct Member<'a> {
    owner: &'static str,
    key: &'a str,
    ignored: &'a RefCell<Vec<String>>,
}

#[derive(Clone, Copy)]
pub(crate) struct NodeDeserializer<'a> {
    node: &'a SyntaxNode,
    settings: &'a Materializer,
    depth: usize,
    member: Option<Member<'a>>,
    /// The node is a converter's output and is not offered to converters again.
    converted: bool,
}

impl<'a> NodeDeserializer<'a> {
    pub(crate) fn new(node: &'a SyntaxNode, settings: &'a Materializer) -> Self {
        Self {
            node,
            settings,
            depth: 0,
            member: None,
            converted: false,
        }
    }

    fn child<'b>(&self, node: &'b SyntaxNode) -> NodeDeserializer<'b>
    where
        'a: 'b,
    {
        NodeDeserializer {
            node,
            settings: self.settings,
            depth: self.depth + 1,
            member: None,
            converted: false,
        }
    }

    fn rewritten<'b>(&self, node: &'b SyntaxNode) -> NodeDeserializer<'b>
    where
        'a: 'b,
    {
        NodeDeserializer {
            node,
            settings: self.settings,
            depth: self.depth,
            member: self.member,
            converted: true,
        }
    }

    fn extent(&self) -> &'a Extent {
        self.node.extent()
    }

    fn evaluator(&self) -> Evaluator {
        Evaluator::new(self.settings.max_depth())
    }

    fn mismatch(&self, expected: &str) -> LiteralError {
        LiteralError::mismatch(
            format!("expected {expected}, found {}", self.node.describe()),
            self.extent(),
        )
    }

    fn locate<T>(&self, result: Result<T>) -> Result<T> {
        result.map_err(|e| e.located(self.extent()))
    }

    /// Reject anything outside the grammar before a rule inspects the node.
    fn admit(&self) -> Result<()> {
        match self.node {
            SyntaxNode::Unsupported { .. } | SyntaxNode::Keyword { .. }
                if self.node.reserved_keyword().is_none() =>
            {
                self.evaluator().eval(self.node, self.depth).map(drop)
            }
            _ => Ok(()),
        }
    }

    /// Guard entry into a container.
    fn enter(&self) -> Result<()> {
        let limit = self.settings.max_depth();
        if self.depth > limit {
            return Err(LiteralError::DepthLimitExceeded {
                limit,
                location: self.extent().location.clone(),
            });
        }
        Ok(())
    }

    /// Run the converter registered for `type_name`, if any.
    fn custom(&self, type_name: &str) -> Result<Option<SyntaxNode>> {
        if self.converted {
            return Ok(None);
        }
        let Some(converter) = self.settings.converters().find(type_name) else {
            return Ok(None);
        };
        debug!(type_name, "custom converter claimed target");
        converter.convert(self.node).map(Some).map_err(|e| e.located(self.extent()))
    }

    fn number(&self) -> Result<Number> {
        self.admit()?;
        match self.node {
            SyntaxNode::Constant {
                value: Constant::Number(number),
                ..
            } => Ok(*number),
            _ => Err(self.mismatch("a number")),
        }
    }

    fn visit_float<'de, V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.locate(match self.number()? {
            Number::Int(v) => visitor.visit_i64(v),
            Number::UInt(v) => visitor.visit_u64(v),
            Number::Float(v) => visitor.visit_f64(v),
        })
    }

    /// Integer targets take floats too, rounded half to even. The target's
    /// own visitor range-checks the result.
    fn visit_integer<'de, V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.locate(match self.number()? {
            Number::Int(v) => visitor.visit_i64(v),
            Number::UInt(v) => visitor.visit_u64(v),
            Number::Float(v) => {
                let rounded = v.round_ties_even();
                if !rounded.is_finite() {
                    return Err(self.mismatch("a finite number"));
                } else if rounded >= i64::MIN as f64 && rounded < i64::MAX as f64 {
                    visitor.visit_i64(rounded as i64)
                } else if rounded >= 0.0 && rounded < u64::MAX as f64 {
                    visitor.visit_u64(rounded as u64)
                } else {
                    return Err(LiteralError::mismatch(
                        format!("{v} is out of range for an integer"),
                        self.extent(),
                    ));
                }
            }
        })
    }

    fn visit_string<'de, V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.admit()?;
        let SyntaxNode::Constant {
            value: Constant::String(s),
            ..
        } = self.node
        else {
            return Err(self.mismatch("a string"));
        };
        self.locate(visitor.visit_str(s))
    }
}

macro_rules! numeric_rules {
    ($($method:ident => $visit:ident)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                self.$visit(visitor)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for NodeDeserializer<'_> {
    type Error = LiteralError;

    /// Self-describing input is never handed out: untagged, internally
    /// tagged and flattened shapes would buffer the value and bypass the
    /// member rules. The dynamic target comes in through its newtype name.
    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value> {
        self.admit()?;
        Err(self.mismatch(
            "a target with a fixed shape (untagged, internally tagged and flattened types are \
             not supported)",
        ))
    }

    /// Booleans only come from the `$true`/`$false` keywords.
    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.admit()?;
        match self.node.reserved_keyword() {
            Some(Reserved::True) => self.locate(visitor.visit_bool(true)),
            Some(Reserved::False) => self.locate(visitor.visit_bool(false)),
            _ => Err(self.mismatch("$true or $false")),
        }
    }

    numeric_rules! {
        deserialize_i8 => visit_integer
        deserialize_i16 => visit_integer
        deserialize_i32 => visit_integer
        deserialize_i64 => visit_integer
        deserialize_i128 => visit_integer
        deserialize_u8 => visit_integer
        deserialize_u16 => visit_integer
        deserialize_u32 => visit_integer
        deserialize_u64 => visit_integer
        deserialize_u128 => visit_integer
        deserialize_f32 => visit_float
        deserialize_f64 => visit_float
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.visit_string(visitor)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.visit_string(visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.visit_string(visitor)
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.visit_string(visitor)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.node.reserved_keyword() {
            Some(Reserved::Null) => self.locate(visitor.visit_none()),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.admit()?;
        match self.node.reserved_keyword() {
            Some(Reserved::Null) => self.locate(visitor.visit_unit()),
            _ => Err(self.mismatch("$null")),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        if let Some(replaced) = self.custom(name)? {
            return self.rewritten(&replaced).deserialize_unit_struct(name, visitor);
        }
        self.admit()?;
        let SyntaxNode::MapLiteral { pairs, .. } = self.node else {
            return Err(self.mismatch(&format!("a map literal for {name}")));
        };
        if !pairs.is_empty() {
            let evaluator = self.evaluator();
            let keys = pairs
                .iter()
                .map(|(key, _)| evaluator.eval_key(key, self.depth + 1))
                .collect::<Result<Vec<_>>>()?;
            return Err(LiteralError::UnknownMember {
                type_name: name.to_string(),
                keys,
                location: self.extent().location.clone(),
            });
        }
        self.locate(visitor.visit_unit())
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        if name == RAW_NODE_TOKEN {
            let raw = serde_json::to_value(self.node)
                .map_err(|e| LiteralError::mismatch(e.to_string(), self.extent()))?;
            return visitor
                .visit_newtype_struct(raw)
                .map_err(|e| LiteralError::mismatch(e.to_string(), self.extent()));
        }
        if name == DYNAMIC_TOKEN {
            let value = self.evaluator().eval(self.node, self.depth)?;
            return self.locate(visitor.visit_newtype_struct(value));
        }
        if name == READ_ONLY_TOKEN {
            let (owner, member) = self
                .member
                .map(|m| (m.owner.to_string(), m.key.to_string()))
                .unwrap_or_default();
            return Err(LiteralError::MemberNotSettable {
                type_name: owner,
                member,
                text: self.extent().text.clone(),
                location: self.extent().location.clone(),
            });
        }
        if let Some(replaced) = self.custom(name)? {
            return self.rewritten(&replaced).deserialize_newtype_struct(name, visitor);
        }
        visitor.visit_newtype_struct(self)
    }

    /// Arrays: either list form, with statement arrays spliced flat.
    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.admit()?;
        self.enter()?;
        let Some(items) = syntax::array_items(self.node, self.depth, self.settings.max_depth())
        else {
            return Err(self.mismatch("an array"));
        };
        let items = items?;
        let mut seq = NodeSeq {
            items: items.into_iter(),
            consumed: 0,
            parent: self,
        };
        let value = self.locate(visitor.visit_seq(&mut seq))?;
        let remaining = seq.items.len();
        if remaining > 0 {
            return Err(LiteralError::mismatch(
                format!(
                    "expected {} element(s), found {}",
                    seq.consumed,
                    seq.consumed + remaining
                ),
                self.extent(),
            ));
        }
        Ok(value)
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        if let Some(replaced) = self.custom(name)? {
            return self
                .rewritten(&replaced)
                .deserialize_tuple_struct(name, len, visitor);
        }
        self.admit()?;
        Err(LiteralError::NoUsableConstructor {
            type_name: name.to_string(),
            reason: format!(
                "only a positional constructor with {len} argument(s), which map keys cannot bind to"
            ),
            location: self.extent().location.clone(),
        })
    }

    /// Dictionaries: every pair converted through the key and value types.
    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.admit()?;
        let SyntaxNode::MapLiteral { pairs, .. } = self.node else {
            return Err(self.mismatch("a map literal"));
        };
        self.enter()?;
        self.locate(visitor.visit_map(NodeMap {
            pairs: pairs.iter(),
            pending: None,
            parent: self,
        }))
    }

    /// Plain objects: keys bound case-insensitively to members, and every key
    /// must be consumed.
    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        if let Some(replaced) = self.custom(name)? {
            return self
                .rewritten(&replaced)
                .deserialize_struct(name, fields, visitor);
        }
        self.admit()?;
        let SyntaxNode::MapLiteral { pairs, .. } = self.node else {
            return Err(self.mismatch(&format!("a map literal for {name}")));
        };
        self.enter()?;

        let evaluator = self.evaluator();
        let mut pending: IndexMap<String, (String, &SyntaxNode)> = IndexMap::new();
        for (key, value) in pairs {
            let key = evaluator.eval_key(key, self.depth + 1)?;
            let value = value.expression()?;
            pending.insert(key.to_lowercase(), (key, value));
        }

        let entries = pending
            .into_iter()
            .map(|(folded, (raw, value))| {
                let presented = fields
                    .iter()
                    .find(|f| f.to_lowercase() == folded)
                    .map(|f| f.to_string())
                    .unwrap_or_else(|| raw.clone());
                (presented, raw, value)
            })
            .collect::<Vec<_>>();

        let unmatched: Vec<String> = entries
            .iter()
            .filter(|(presented, _, _)| !fields.contains(&presented.as_str()))
            .map(|(_, raw, _)| raw.clone())
            .collect();

        let ignored = RefCell::new(Vec::new());
        let value = visitor
            .visit_map(MemberAccess {
                entries: entries.into_iter(),
                pending: None,
                owner: name,
                ignored: &ignored,
                parent: self,
            })
            .map_err(|e| match e {
                // `deny_unknown_fields` stops at the first unknown key.
                LiteralError::UnknownMember {
                    type_name,
                    keys,
                    location,
                } if type_name.is_empty() && keys.iter().all(|k| unmatched.contains(k)) => {
                    LiteralError::UnknownMember {
                        type_name,
                        keys: unmatched.clone(),
                        location,
                    }
                }
                other => other,
            })
            .map_err(|e| e.located(self.extent()).owned_by(name))?;

        let leftover = ignored.into_inner();
        if !leftover.is_empty() {
            return Err(LiteralError::UnknownMember {
                type_name: name.to_string(),
                keys: leftover,
                location: self.extent().location.clone(),
            });
        }
        Ok(value)
    }

    /// Enums: a string label matched case-insensitively against the labels.
    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        if let Some(replaced) = self.custom(name)? {
            return self
                .rewritten(&replaced)
                .deserialize_enum(name, variants, visitor);
        }
        self.admit()?;
        let SyntaxNode::Constant {
            value: Constant::String(label),
            ..
        } = self.node
        else {
            return Err(self.mismatch(&format!("a string label of {name}")));
        };

        // Unresolved labels go through as written so aliases and catch-all
        // variants still get their chance.
        let table = labels::table_for(name, variants);
        let resolved = table.resolve(label).unwrap_or(label.as_str());
        let access: de::value::StringDeserializer<LiteralError> =
            resolved.to_string().into_deserializer();
        visitor
            .visit_enum(access)
            .map_err(|e| e.located(self.extent()).owned_by(name))
    }

    /// Unknown struct members end up here; record them instead of failing
    /// on the first one.
    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if let Some(member) = self.member {
            member.ignored.borrow_mut().push(member.key.to_string());
        }
        visitor.visit_unit()
    }
}

struct NodeSeq<'a> {
    items: std::vec::IntoIter<&'a SyntaxNode>,
    consumed: usize,
    parent: NodeDeserializer<'a>,
}

impl<'de> SeqAccess<'de> for NodeSeq<'_> {
    type Error = LiteralError;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>> {
        match self.items.next() {
            Some(item) => {
                self.consumed += 1;
                seed.deserialize(self.parent.child(item)).map(Some)
            }
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

struct NodeMap<'a> {
    pairs: std::slice::Iter<'a, (SyntaxNode, Statement)>,
    pending: Option<&'a Statement>,
    parent: NodeDeserializer<'a>,
}

impl<'de> MapAccess<'de> for NodeMap<'_> {
    type Error = LiteralError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        let Some((key, value)) = self.pairs.next() else {
            return Ok(None);
        };
        self.pending = Some(value);
        seed.deserialize(self.parent.child(key)).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let statement = self
            .pending
            .take()
            .ok_or_else(|| {
                <LiteralError as de::Error>::custom("map value requested before its key")
            })?;
        let expr = statement.expression()?;
        seed.deserialize(self.parent.child(expr))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.pairs.len())
    }
}

struct MemberAccess<'a> {
    /// (key presented to the visitor, key as written, value node)
    entries: std::vec::IntoIter<(String, String, &'a SyntaxNode)>,
    pending: Option<(String, &'a SyntaxNode)>,
    owner: &'static str,
    ignored: &'a RefCell<Vec<String>>,
    parent: NodeDeserializer<'a>,
}

impl<'de> MapAccess<'de> for MemberAccess<'_> {
    type Error = LiteralError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        let Some((presented, raw, value)) = self.entries.next() else {
            return Ok(None);
        };
        self.pending = Some((raw, value));
        seed.deserialize(presented.into_deserializer()).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        let (raw, value) = self
            .pending
            .take()
            .ok_or_else(|| {
                <LiteralError as de::Error>::custom("member value requested before its key")
            })?;
        let mut de = self.parent.child(value);
        de.member = Some(Member {
            owner: self.owner,
            key: &raw,
            ignored: self.ignored,
        });
        seed.deserialize(de)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.entries.len())
    }
}
