//! Localized label tables.
//!
//! Labels are kept canonical (English) everywhere inside the pipeline and
//! only translated when a response is built. A requested language with no
//! table, or a label missing from a table, falls back to the canonical text.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Placeholder shown while no classification is available.
pub const WAITING_LABEL: &str = "Waiting for hands...";

/// Translations for one language.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelTable {
    /// Canonical label to localized label
    pub labels: BTreeMap<String, String>,
    /// Localized waiting placeholder
    pub waiting: Option<String>,
}

impl LabelTable {
    fn localize<'a>(&'a self, label: &'a str) -> &'a str {
        if label == WAITING_LABEL {
            return self.waiting.as_deref().unwrap_or(label);
        }
        self.labels.get(label).map(String::as_str).unwrap_or(label)
    }

    fn canonical<'a>(&'a self, display: &'a str) -> &'a str {
        if self.waiting.as_deref() == Some(display) {
            return WAITING_LABEL;
        }
        self.labels
            .iter()
            .find(|(_, localized)| localized.as_str() == display)
            .map(|(canonical, _)| canonical.as_str())
            .unwrap_or(display)
    }
}

/// Label tables keyed by lowercase language name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocaleTable {
    languages: BTreeMap<String, LabelTable>,
}

impl LocaleTable {
    pub fn new() -> Self {
        Self {
            languages: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, language: &str, table: LabelTable) {
        self.languages.insert(language.to_lowercase(), table);
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.languages.keys().map(String::as_str)
    }

    fn table(&self, language: Option<&str>) -> Option<&LabelTable> {
        language.and_then(|lang| self.languages.get(&lang.to_lowercase()))
    }

    /// Display form of a canonical label.
    pub fn localize(&self, label: &str, language: Option<&str>) -> String {
        match self.table(language) {
            Some(table) => table.localize(label).to_string(),
            None => label.to_string(),
        }
    }

    /// Canonical label for a display label.
    pub fn canonical(&self, display: &str, language: Option<&str>) -> String {
        match self.table(language) {
            Some(table) => table.canonical(display).to_string(),
            None => display.to_string(),
        }
    }

    /// Localize a sentence element-wise.
    pub fn localize_all<'a, I>(&self, labels: I, language: Option<&str>) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        labels
            .into_iter()
            .map(|label| self.localize(label, language))
            .collect()
    }
}

impl Default for LocaleTable {
    fn default() -> Self {
        let mut table = Self::new();
        table.insert(
            "tagalog",
            LabelTable {
                labels: [
                    ("hello", "kamusta"),
                    ("thanks", "salamat"),
                    ("iloveyou", "mahal kita"),
                ]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
                waiting: Some("Naghihintay ng kamay...".to_string()),
            },
        );
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_localize_tagalog() {
        let locales = LocaleTable::default();
        assert_eq!(locales.localize("iloveyou", Some("tagalog")), "mahal kita");
        assert_eq!(locales.localize("hello", Some("Tagalog")), "kamusta");
        assert_eq!(
            locales.localize(WAITING_LABEL, Some("tagalog")),
            "Naghihintay ng kamay..."
        );
    }

    #[test]
    fn test_fallback_to_canonical() {
        let locales = LocaleTable::default();
        assert_eq!(locales.localize("thanks", None), "thanks");
        assert_eq!(locales.localize("thanks", Some("english")), "thanks");
        assert_eq!(locales.localize("unknown", Some("tagalog")), "unknown");
    }

    #[test]
    fn test_reverse_lookup() {
        let locales = LocaleTable::default();
        assert_eq!(locales.canonical("salamat", Some("tagalog")), "thanks");
        assert_eq!(
            locales.canonical("Naghihintay ng kamay...", Some("tagalog")),
            WAITING_LABEL
        );
        assert_eq!(locales.canonical("hello", None), "hello");
    }

    #[test]
    fn test_localize_sentence() {
        let locales = LocaleTable::default();
        let sentence = vec!["hello".to_string(), "iloveyou".to_string()];
        assert_eq!(
            locales.localize_all(&sentence, Some("tagalog")),
            vec!["kamusta", "mahal kita"]
        );
    }

    #[test]
    fn test_serde_round_trip() {
        let json = serde_json::to_string(&LocaleTable::default()).unwrap();
        assert!(json.contains("\"tagalog\""));
        let parsed: LocaleTable = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, LocaleTable::default());
        assert_eq!(parsed.languages().collect::<Vec<_>>(), vec!["tagalog"]);
    }
}
