use std::fmt;
use std::ops::Deref;

use serde::de::{Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::syntax::SyntaxNode;

/// Reserved newtype names the node deserializer recognises. They cannot clash
/// with a Rust type name.
pub(crate) const RAW_NODE_TOKEN: &str = "$literal_config::RawNode";
pub(crate) const READ_ONLY_TOKEN: &str = "$literal_config::ReadOnly";
pub(crate) const DYNAMIC_TOKEN: &str = "$literal_config::DynamicValue";

/// Escape hatch: a member of this type receives the untouched syntax node
/// instead of a converted value.
#[derive(Debug, Clone, PartialEq)]
pub struct RawNode(pub SyntaxNode);

impl RawNode {
    pub fn into_inner(self) -> SyntaxNode {
        self.0
    }
}

impl<'de> Deserialize<'de> for RawNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RawNodeVisitor;

        impl<'de> Visitor<'de> for RawNodeVisitor {
            type Value = RawNode;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a raw syntax node")
            }

            fn visit_newtype_struct<D: Deserializer<'de>>(
                self,
                deserializer: D,
            ) -> Result<RawNode, D::Error> {
                SyntaxNode::deserialize(deserializer).map(RawNode)
            }
        }

        deserializer.deserialize_newtype_struct(RAW_NODE_TOKEN, RawNodeVisitor)
    }
}

/// A member the application computes and configuration must not set.
///
/// Declare it with `#[serde(default)]`. When the key is absent the member gets
/// `T::default()`; when present, materialization fails with
/// [`MemberNotSettable`](crate::LiteralError::MemberNotSettable). Other serde
/// formats see a transparent wrapper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ReadOnly<T>(T);

impl<T> ReadOnly<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for ReadOnly<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: Serialize> Serialize for ReadOnly<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for ReadOnly<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ReadOnlyVisitor<T>(std::marker::PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for ReadOnlyVisitor<T> {
            type Value = ReadOnly<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a read-only member")
            }

            fn visit_newtype_struct<D: Deserializer<'de>>(
                self,
                deserializer: D,
            ) -> Result<ReadOnly<T>, D::Error> {
                T::deserialize(deserializer).map(ReadOnly)
            }
        }

        deserializer.deserialize_newtype_struct(
            READ_ONLY_TOKEN,
            ReadOnlyVisitor(std::marker::PhantomData),
        )
    }
}
