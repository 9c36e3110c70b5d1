#[cfg(test)]
pub mod test {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};

    use crate::syntax::{Constant, Extent, Location, Number, Statement, SyntaxNode};
    use crate::types::ReadOnly;

    // -- Node builders -----------------------------------------------------------

    pub fn ext(text: &str) -> Extent {
        ext_at(text, 1, 1)
    }

    pub fn ext_at(text: &str, line: usize, column: usize) -> Extent {
        Extent::new(
            text,
            Location::new(Some("/test/settings.psd1".into()), line, column),
        )
    }

    pub fn s(value: &str) -> SyntaxNode {
        SyntaxNode::string(value, ext(&format!("'{value}'")))
    }

    pub fn s_at(value: &str, line: usize, column: usize) -> SyntaxNode {
        SyntaxNode::string(value, ext_at(&format!("'{value}'"), line, column))
    }

    pub fn int(value: i64) -> SyntaxNode {
        SyntaxNode::number(Number::Int(value), ext(&value.to_string()))
    }

    pub fn uint(value: u64) -> SyntaxNode {
        SyntaxNode::number(Number::UInt(value), ext(&value.to_string()))
    }

    pub fn float(value: f64) -> SyntaxNode {
        SyntaxNode::number(Number::Float(value), ext(&value.to_string()))
    }

    /// A boolean *constant*, as opposed to the `$true`/`$false` keywords.
    pub fn boolean(value: bool) -> SyntaxNode {
        SyntaxNode::Constant {
            value: Constant::Bool(value),
            extent: ext(&value.to_string()),
        }
    }

    pub fn kw(name: &str) -> SyntaxNode {
        SyntaxNode::keyword(name, ext(&format!("${name}")))
    }

    pub fn kw_at(name: &str, line: usize, column: usize) -> SyntaxNode {
        SyntaxNode::keyword(name, ext_at(&format!("${name}"), line, column))
    }

    pub fn list(elements: Vec<SyntaxNode>) -> SyntaxNode {
        let text = elements
            .iter()
            .map(|e| e.extent().text.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        SyntaxNode::ArrayLiteral {
            elements,
            extent: ext(&text),
        }
    }

    pub fn stmt_array(statements: Vec<SyntaxNode>) -> SyntaxNode {
        let text = statements
            .iter()
            .map(|e| e.extent().text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        SyntaxNode::ArrayExpression {
            statements: statements.into_iter().map(Statement::Expression).collect(),
            extent: ext(&format!("@({text})")),
        }
    }

    pub fn map(pairs: Vec<(&str, SyntaxNode)>) -> SyntaxNode {
        map_nodes(pairs.into_iter().map(|(k, v)| (s(k), v)).collect())
    }

    pub fn map_nodes(pairs: Vec<(SyntaxNode, SyntaxNode)>) -> SyntaxNode {
        let text = pairs
            .iter()
            .map(|(k, v)| format!("{} = {}", k.extent().text, v.extent().text))
            .collect::<Vec<_>>()
            .join("; ");
        SyntaxNode::MapLiteral {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k, Statement::Expression(v)))
                .collect(),
            extent: ext(&format!("@{{ {text} }}")),
        }
    }

    pub fn unsupported(kind: &str) -> SyntaxNode {
        SyntaxNode::Unsupported {
            kind: kind.to_string(),
            extent: ext(&format!("<{kind}>")),
        }
    }

    pub fn unsupported_stmt(kind: &str) -> Statement {
        Statement::Unsupported {
            kind: kind.to_string(),
            extent: ext(&format!("<{kind}>")),
        }
    }

    // -- Config fixtures ---------------------------------------------------------

    #[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Severity {
        Information,
        Warning,
        Error,
        #[serde(rename = "ParseError")]
        Parse,
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    pub struct AnalyzerSettings {
        #[serde(rename = "Severity")]
        pub severity: Option<Vec<Severity>>,

        #[serde(rename = "IncludeRules", default)]
        pub include_rules: Vec<String>,

        #[serde(rename = "ExcludeRules", default)]
        pub exclude_rules: Vec<String>,

        #[serde(rename = "IncludeDefaultRules", default)]
        pub include_default_rules: bool,

        #[serde(rename = "Rules", default)]
        pub rules: HashMap<String, RuleSettings>,
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    pub struct RuleSettings {
        #[serde(rename = "Enable")]
        pub enable: bool,

        #[serde(rename = "MaxLength")]
        pub max_length: Option<u32>,
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    pub struct RuleSelection {
        #[serde(rename = "Severity")]
        pub severity: Severity,

        #[serde(rename = "IncludeRules")]
        pub include_rules: Vec<String>,
    }

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    pub struct Toggles {
        #[serde(rename = "Foo")]
        pub foo: bool,

        #[serde(rename = "Bar")]
        pub bar: i32,
    }

    #[derive(Deserialize, Debug, PartialEq)]
    pub struct WithComputed {
        #[serde(rename = "Name")]
        pub name: String,

        #[serde(rename = "RuleCount", default)]
        pub rule_count: ReadOnly<usize>,
    }

    #[derive(Deserialize, Debug, PartialEq)]
    pub struct Point(pub i32, pub i32);

    #[derive(Deserialize, Debug, PartialEq)]
    pub struct Marker;
}
