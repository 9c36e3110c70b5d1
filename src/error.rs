use std::fmt;

use serde::de;
use thiserror::Error;

use crate::syntax::{Extent, Location};

/// Every failure of evaluation or materialization.
///
/// Variants carry the offending node's source text and location. Errors raised
/// inside serde visitors start without them; the nearest node that sees the
/// error fills them in.
#[derive(Debug, Error)]
#[cfg_attr(feature = "rich-errors", derive(miette::Diagnostic))]
pub enum LiteralError {
    #[error("Unsupported literal '{text}' at {location}: {reason}")]
    #[cfg_attr(
        feature = "rich-errors",
        diagnostic(
            code(literal_config::unsupported_literal),
            help("only strings, numbers, arrays, maps, $true, $false and $null are allowed")
        )
    )]
    UnsupportedLiteral {
        reason: String,
        text: String,
        location: Location,
    },

    #[error("Cannot convert '{text}' at {location}: {reason}")]
    #[cfg_attr(
        feature = "rich-errors",
        diagnostic(code(literal_config::conversion_mismatch))
    )]
    ConversionMismatch {
        reason: String,
        text: String,
        location: Location,
    },

    #[error("Unknown member '{label}' of enum {enum_name} at {location} (expected one of: {})", .expected.join(", "))]
    #[cfg_attr(
        feature = "rich-errors",
        diagnostic(code(literal_config::unknown_enum_member))
    )]
    UnknownEnumMember {
        enum_name: String,
        label: String,
        expected: Vec<String>,
        location: Location,
    },

    #[error("Type {type_name} has no usable constructor: {reason}")]
    #[cfg_attr(
        feature = "rich-errors",
        diagnostic(code(literal_config::no_usable_constructor))
    )]
    NoUsableConstructor {
        type_name: String,
        reason: String,
        location: Location,
    },

    #[error("Missing required member '{member}' of {type_name} in '{text}' at {location}")]
    #[cfg_attr(
        feature = "rich-errors",
        diagnostic(code(literal_config::missing_required_member))
    )]
    MissingRequiredMember {
        type_name: String,
        member: String,
        text: String,
        location: Location,
    },

    #[error("Member '{member}' of {type_name} cannot be set from configuration ('{text}' at {location})")]
    #[cfg_attr(
        feature = "rich-errors",
        diagnostic(
            code(literal_config::member_not_settable),
            help("remove the key; this value is computed by the application")
        )
    )]
    MemberNotSettable {
        type_name: String,
        member: String,
        text: String,
        location: Location,
    },

    #[error("Unknown member(s) {} of {type_name} at {location}", .keys.iter().map(|k| format!("'{k}'")).collect::<Vec<_>>().join(", "))]
    #[cfg_attr(
        feature = "rich-errors",
        diagnostic(
            code(literal_config::unknown_member),
            help("check the key for typos")
        )
    )]
    UnknownMember {
        type_name: String,
        keys: Vec<String>,
        location: Location,
    },

    #[error("Nesting deeper than {limit} levels at {location}")]
    #[cfg_attr(
        feature = "rich-errors",
        diagnostic(code(literal_config::depth_limit_exceeded))
    )]
    DepthLimitExceeded { limit: usize, location: Location },
}

impl LiteralError {
    pub(crate) fn unsupported(reason: impl Into<String>, extent: &Extent) -> Self {
        LiteralError::UnsupportedLiteral {
            reason: reason.into(),
            text: extent.text.clone(),
            location: extent.location.clone(),
        }
    }

    pub(crate) fn mismatch(reason: impl Into<String>, extent: &Extent) -> Self {
        LiteralError::ConversionMismatch {
            reason: reason.into(),
            text: extent.text.clone(),
            location: extent.location.clone(),
        }
    }

    fn detached_mismatch(reason: String) -> Self {
        LiteralError::ConversionMismatch {
            reason,
            text: String::new(),
            location: Location::default(),
        }
    }

    /// The source location the error points at.
    pub fn location(&self) -> &Location {
        match self {
            LiteralError::UnsupportedLiteral { location, .. }
            | LiteralError::ConversionMismatch { location, .. }
            | LiteralError::UnknownEnumMember { location, .. }
            | LiteralError::NoUsableConstructor { location, .. }
            | LiteralError::MissingRequiredMember { location, .. }
            | LiteralError::MemberNotSettable { location, .. }
            | LiteralError::UnknownMember { location, .. }
            | LiteralError::DepthLimitExceeded { location, .. } => location,
        }
    }

    /// Fill in the source text and location from `extent` where still empty.
    pub(crate) fn located(mut self, extent: &Extent) -> Self {
        match &mut self {
            LiteralError::UnsupportedLiteral { text, location, .. }
            | LiteralError::ConversionMismatch { text, location, .. }
            | LiteralError::MissingRequiredMember { text, location, .. }
            | LiteralError::MemberNotSettable { text, location, .. } => {
                if text.is_empty() {
                    text.clone_from(&extent.text);
                }
                if !location.is_known() {
                    location.clone_from(&extent.location);
                }
            }
            LiteralError::UnknownEnumMember { location, .. }
            | LiteralError::NoUsableConstructor { location, .. }
            | LiteralError::UnknownMember { location, .. }
            | LiteralError::DepthLimitExceeded { location, .. } => {
                if !location.is_known() {
                    location.clone_from(&extent.location);
                }
            }
        }
        self
    }

    /// Fill in the owning type name where still empty.
    pub(crate) fn owned_by(mut self, owner: &str) -> Self {
        match &mut self {
            LiteralError::UnknownEnumMember {
                enum_name: type_name,
                ..
            }
            | LiteralError::NoUsableConstructor { type_name, .. }
            | LiteralError::MissingRequiredMember { type_name, .. }
            | LiteralError::MemberNotSettable { type_name, .. }
            | LiteralError::UnknownMember { type_name, .. } => {
                if type_name.is_empty() {
                    *type_name = owner.to_string();
                }
            }
            _ => {}
        }
        self
    }
}

impl de::Error for LiteralError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        LiteralError::detached_mismatch(msg.to_string())
    }

    fn invalid_type(unexp: de::Unexpected<'_>, exp: &dyn de::Expected) -> Self {
        LiteralError::detached_mismatch(format!("expected {exp}, found {unexp}"))
    }

    fn invalid_value(unexp: de::Unexpected<'_>, exp: &dyn de::Expected) -> Self {
        LiteralError::detached_mismatch(format!("invalid value {unexp}, expected {exp}"))
    }

    fn invalid_length(len: usize, exp: &dyn de::Expected) -> Self {
        LiteralError::detached_mismatch(format!("expected {exp}, found {len} element(s)"))
    }

    fn unknown_variant(variant: &str, expected: &'static [&'static str]) -> Self {
        LiteralError::UnknownEnumMember {
            enum_name: String::new(),
            label: variant.to_string(),
            expected: expected.iter().map(|s| s.to_string()).collect(),
            location: Location::default(),
        }
    }

    fn unknown_field(field: &str, _expected: &'static [&'static str]) -> Self {
        LiteralError::UnknownMember {
            type_name: String::new(),
            keys: vec![field.to_string()],
            location: Location::default(),
        }
    }

    fn missing_field(field: &'static str) -> Self {
        LiteralError::MissingRequiredMember {
            type_name: String::new(),
            member: field.to_string(),
            text: String::new(),
            location: Location::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::de::Error as _;

    fn extent() -> Extent {
        Extent::new("@{ Foo = 1 }", Location::new(Some("/cfg/a.psd1".into()), 4, 9))
    }

    #[test]
    fn unsupported_literal_formats_correctly() {
        let err = LiteralError::unsupported("command invocation", &extent());
        let msg = err.to_string();
        assert!(msg.contains("@{ Foo = 1 }"));
        assert!(msg.contains("line 4, column 9 in /cfg/a.psd1"));
        assert!(msg.contains("command invocation"));
    }

    #[test]
    fn unknown_member_lists_every_key() {
        let err = LiteralError::UnknownMember {
            type_name: "RuleSettings".into(),
            keys: vec!["Sevrity".into(), "Enabel".into()],
            location: Location::default(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'Sevrity'"));
        assert!(msg.contains("'Enabel'"));
        assert!(msg.contains("RuleSettings"));
    }

    #[test]
    fn missing_field_gets_context_later() {
        let err = LiteralError::missing_field("Severity")
            .located(&extent())
            .owned_by("RuleSettings");
        match err {
            LiteralError::MissingRequiredMember {
                type_name,
                member,
                text,
                location,
            } => {
                assert_eq!(type_name, "RuleSettings");
                assert_eq!(member, "Severity");
                assert_eq!(text, "@{ Foo = 1 }");
                assert_eq!(location.line, 4);
            }
            other => panic!("Expected MissingRequiredMember, got: {other:?}"),
        }
    }

    #[test]
    fn innermost_location_wins() {
        let inner = Extent::new("1", Location::new(None, 2, 3));
        let err = LiteralError::custom("bad").located(&inner).located(&extent());
        assert_eq!(err.location().line, 2);
    }

    #[test]
    fn owner_does_not_overwrite() {
        let err = LiteralError::missing_field("x")
            .owned_by("Inner")
            .owned_by("Outer");
        assert!(err.to_string().contains("Inner"));
    }

    #[test]
    fn invalid_type_is_a_conversion_mismatch() {
        let err = LiteralError::invalid_type(de::Unexpected::Str("x"), &"u32");
        assert!(matches!(err, LiteralError::ConversionMismatch { .. }));
    }
}
