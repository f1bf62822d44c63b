// Address Fact Extraction - pluggable entity recognizer
// The resolver only depends on the AddrExtractor trait; the built-in
// MarkerExtractor is a deterministic rules-as-data implementation.

use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

// ============================================================================
// CORE TYPES
// ============================================================================

/// AddressFact - one typed extraction from an address string
///
/// `category` is a lower-case Russian label ("область", "город", "улица", ...).
/// A missing category means "unrecognized" and the fact is skipped downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressFact {
    pub category: Option<String>,
    pub value: String,
}

impl AddressFact {
    pub fn new(category: &str, value: &str) -> Self {
        AddressFact {
            category: Some(category.to_string()),
            value: value.to_string(),
        }
    }

    /// A fact the recognizer could not categorize
    pub fn unrecognized(value: &str) -> Self {
        AddressFact {
            category: None,
            value: value.to_string(),
        }
    }
}

/// AddrExtractor - capability interface for the entity recognizer
///
/// Implementations must return facts in order of appearance in the text;
/// that order is the only tie-breaking signal the resolver has.
pub trait AddrExtractor {
    fn extract(&self, text: &str) -> Result<Vec<AddressFact>>;
}

// ============================================================================
// MARKER EXTRACTOR - rules as data
// ============================================================================

/// One marker rule: a pattern applied to a comma-separated segment of the
/// address, and the category label emitted on match. Capture group 1 is the
/// extracted value; with no group the whole match is the value.
struct MarkerRule {
    pattern: &'static str,
    category: &'static str,
}

/// Ordered marker table. First matching rule wins per segment, so more
/// specific shapes (house numbers) come before letter-name shapes that share
/// an abbreviation ("д. 3" is a house, "д. Сырково" is a village).
const MARKER_RULES: &[MarkerRule] = &[
    MarkerRule { pattern: r"^\d{6}$", category: "индекс" },
    MarkerRule { pattern: r"(?i)^(?:обл\.|область)\s*(.+)$", category: "область" },
    MarkerRule { pattern: r"(?i)^(.+?)\s+область$", category: "область" },
    MarkerRule { pattern: r"(?i)^(.+?)\s+край$", category: "край" },
    MarkerRule { pattern: r"(?i)^(?:респ\.|республика)\s+(.+)$", category: "республика" },
    MarkerRule { pattern: r"(?i)^([А-Яа-яЁё\-]+)\s+район$", category: "район" },
    MarkerRule { pattern: r"(?i)^г\.\s*(.+)$", category: "город" },
    MarkerRule { pattern: r"(?i)^(?:д\.|дом)\s*(\d+\s*[а-яА-Я]?(?:\s*/\s*\d+)?)$", category: "дом" },
    MarkerRule { pattern: r"(?i)^(?:д\.|дер\.|деревня)\s+([А-Яа-яЁё\- ]+)$", category: "деревня" },
    MarkerRule { pattern: r"(?i)^(?:с\.|село)\s+([А-Яа-яЁё\- ]+)$", category: "село" },
    MarkerRule { pattern: r"(?i)^(?:ст\.|станица)\s+([А-Яа-яЁё\- ]+)$", category: "станица" },
    MarkerRule { pattern: r"(?i)^(?:пос\.|поселок|посёлок)\s+(.+)$", category: "поселок" },
    MarkerRule { pattern: r"(?i)^(?:ул\.|улица)\s*(.+)$", category: "улица" },
    MarkerRule { pattern: r"(?i)^(?:просп\.|пр-т|проспект)\s*(.+)$", category: "проспект" },
    MarkerRule { pattern: r"(?i)^(?:пер\.|переулок)\s*(.+)$", category: "переулок" },
    MarkerRule { pattern: r"(?i)^(?:ш\.|шоссе)\s*(.+)$", category: "шоссе" },
    MarkerRule { pattern: r"(?i)^(?:пл\.|площадь)\s*(.+)$", category: "площадь" },
    MarkerRule { pattern: r"(?i)^кв\.?\s*(\S+)$", category: "квартира" },
    // Recognized but bound to no output slot; the category map drops them.
    MarkerRule { pattern: r"(?i)^(?:корп\.|корпус)\s*(\S+)$", category: "корпус" },
    MarkerRule { pattern: r"(?i)^(?:стр\.|строение)\s*(\S+)$", category: "строение" },
];

static COMPILED_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    MARKER_RULES
        .iter()
        .map(|rule| (Regex::new(rule.pattern).unwrap(), rule.category))
        .collect()
});

/// MarkerExtractor - recognizes address components by their marker
/// abbreviations, one comma-separated segment at a time.
///
/// Stateless; safe to share across threads.
#[derive(Debug, Default)]
pub struct MarkerExtractor;

impl MarkerExtractor {
    pub fn new() -> Self {
        MarkerExtractor
    }
}

impl AddrExtractor for MarkerExtractor {
    fn extract(&self, text: &str) -> Result<Vec<AddressFact>> {
        let mut facts = Vec::new();

        for segment in text.split(',') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }

            for (re, category) in COMPILED_RULES.iter() {
                if let Some(caps) = re.captures(segment) {
                    let value = match caps.get(1) {
                        Some(m) => m.as_str(),
                        None => caps.get(0).map_or("", |m| m.as_str()),
                    }
                    .trim()
                    .to_string();
                    if !value.is_empty() {
                        facts.push(AddressFact {
                            category: Some(category.to_string()),
                            value,
                        });
                    }
                    break;
                }
            }
        }

        Ok(facts)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::field_for_category;

    fn extract(text: &str) -> Vec<AddressFact> {
        MarkerExtractor::new().extract(text).unwrap()
    }

    #[test]
    fn test_basic_city_street_house() {
        let facts = extract("г. Москва, ул. Ленина, д. 5, кв. 12");

        assert_eq!(
            facts,
            vec![
                AddressFact::new("город", "Москва"),
                AddressFact::new("улица", "Ленина"),
                AddressFact::new("дом", "5"),
                AddressFact::new("квартира", "12"),
            ]
        );
    }

    #[test]
    fn test_postal_code_segment() {
        let facts = extract("170100, обл. Тверская");

        assert_eq!(facts[0], AddressFact::new("индекс", "170100"));
        assert_eq!(facts[1], AddressFact::new("область", "Тверская"));
    }

    #[test]
    fn test_region_suffix_form() {
        let facts = extract("Тверская область, Бежецкий район");

        assert_eq!(facts[0], AddressFact::new("область", "Тверская"));
        assert_eq!(facts[1], AddressFact::new("район", "Бежецкий"));
    }

    #[test]
    fn test_village_vs_house_share_abbreviation() {
        let facts = extract("д. Сырково, д. 3");

        assert_eq!(facts[0], AddressFact::new("деревня", "Сырково"));
        assert_eq!(facts[1], AddressFact::new("дом", "3"));
    }

    #[test]
    fn test_facts_preserve_text_order() {
        let facts = extract("ул. Мира, г. Орёл");

        assert_eq!(facts[0].category.as_deref(), Some("улица"));
        assert_eq!(facts[1].category.as_deref(), Some("город"));
    }

    #[test]
    fn test_unmarked_segments_produce_no_facts() {
        assert!(extract("просто текст без маркеров").is_empty());
        assert!(extract("").is_empty());
        assert!(extract(",,,").is_empty());
    }

    #[test]
    fn test_all_emitted_slot_categories_are_mapped() {
        // корпус/строение are recognized on purpose without a slot
        for rule in MARKER_RULES {
            if rule.category == "корпус" || rule.category == "строение" {
                assert!(field_for_category(rule.category).is_none());
            } else {
                assert!(
                    field_for_category(rule.category).is_some(),
                    "unmapped category: {}",
                    rule.category
                );
            }
        }
    }
}
