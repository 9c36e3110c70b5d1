//! Case-insensitive label tables for enum targets, built once per enum.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::trace;

type EnumKey = (&'static str, &'static [&'static str]);

static TABLES: Lazy<DashMap<EnumKey, Arc<LabelTable>>> = Lazy::new(DashMap::new);

/// Maps a folded label to the label serde expects. Labels already reflect
/// `#[serde(rename)]` overrides.
#[derive(Debug)]
pub(crate) struct LabelTable {
    by_label: HashMap<String, &'static str>,
}

impl LabelTable {
    fn build(labels: &'static [&'static str]) -> Self {
        Self {
            by_label: labels.iter().map(|l| (l.to_lowercase(), *l)).collect(),
        }
    }

    pub(crate) fn resolve(&self, label: &str) -> Option<&'static str> {
        self.by_label.get(&label.to_lowercase()).copied()
    }
}

pub(crate) fn table_for(name: &'static str, labels: &'static [&'static str]) -> Arc<LabelTable> {
    TABLES
        .entry((name, labels))
        .or_insert_with(|| {
            trace!(enum_name = name, labels = labels.len(), "built label table");
            Arc::new(LabelTable::build(labels))
        })
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    static LABELS: &[&str] = &["Information", "Warning", "ParseError"];

    #[test]
    fn resolves_any_case() {
        let table = table_for("Severity", LABELS);
        assert_eq!(table.resolve("information"), Some("Information"));
        assert_eq!(table.resolve("INFORMATION"), Some("Information"));
        assert_eq!(table.resolve("parseerror"), Some("ParseError"));
    }

    #[test]
    fn unknown_label_is_none() {
        let table = table_for("Severity", LABELS);
        assert_eq!(table.resolve("Info"), None);
    }

    #[test]
    fn table_is_built_once() {
        let a = table_for("Cached", LABELS);
        let b = table_for("Cached", LABELS);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
