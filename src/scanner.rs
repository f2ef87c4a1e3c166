//! Finds catalog items in stock announcement embeds.
//!
//! Only embed field *values* are inspected.  Titles and descriptions of stock bots tend to repeat
//! item names from unrelated sections ("last seen", "coming soon"), so they are ignored.

use crate::catalog::{Keyword, CATALOG};
use serenity::all::Embed;

/// Labels found in one message, in embed-then-field-then-catalog order.  Duplicates are kept.
pub type MatchReport = Vec<&'static str>;

/// Scan every field value of every embed against the full catalog.
pub fn scan_embeds(embeds: &[Embed]) -> MatchReport {
    scan_values(
        embeds
            .iter()
            .flat_map(|embed| embed.fields.iter())
            .map(|field| field.value.as_str()),
    )
}

/// Scan field values in order against the full catalog.
pub fn scan_values<'a>(values: impl IntoIterator<Item = &'a str>) -> MatchReport {
    scan_values_with(CATALOG, values)
}

pub fn scan_values_with<'a>(
    catalog: &[Keyword],
    values: impl IntoIterator<Item = &'a str>,
) -> MatchReport {
    let mut report = Vec::new();
    for value in values {
        let value = value.to_lowercase();
        // No early exit: one field may announce several items.
        for entry in catalog {
            if value.contains(entry.keyword) {
                report.push(entry.label);
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn embed(values: &[&str]) -> Embed {
        let fields: Vec<_> = values
            .iter()
            .map(|v| json!({ "name": "Gear", "value": v, "inline": false }))
            .collect();
        serde_json::from_value(json!({ "title": "Stock", "fields": fields }))
            .expect("valid embed json")
    }

    #[test]
    fn matches_case_insensitively() {
        assert_eq!(
            scan_values(["Master Sprinkler just restocked!"]),
            vec!["MASTER SPRINKLER"]
        );
        assert_eq!(scan_values(["x2 EMBER LILY"]), vec!["EMBER LILY"]);
    }

    #[test]
    fn unrelated_fields_add_nothing() {
        assert!(scan_values(["Carrot x5", "Basic Sprinkler", ""]).is_empty());
    }

    #[test]
    fn one_field_can_contribute_several_labels_in_catalog_order() {
        assert_eq!(
            scan_values(["Nectar Staff, Bug Egg and a Beanstalk"]),
            vec!["BUG EGG", "BEANSTALK", "NECTAR STAFF"]
        );
    }

    #[test]
    fn duplicates_across_fields_are_kept_in_field_order() {
        assert_eq!(
            scan_values(["bee egg", "honey sprinkler", "Bee Egg x3"]),
            vec!["BEE EGG", "HONEY SPRINKLER", "BEE EGG"]
        );
    }

    #[test]
    fn walks_embeds_then_fields() {
        let embeds = [
            embed(&["Mythical Egg"]),
            embed(&["nothing here", "Hive Fruit Seed"]),
        ];
        assert_eq!(
            scan_embeds(&embeds),
            vec!["MYTHICAL EGG", "HIVE FRUIT SEED"]
        );
    }

    #[test]
    fn titles_and_descriptions_are_ignored() {
        let embed: Embed = serde_json::from_value(json!({
            "title": "Master Sprinkler",
            "description": "Ember Lily",
            "fields": [],
        }))
        .expect("valid embed json");
        assert!(scan_embeds(&[embed]).is_empty());
    }

    #[test]
    fn no_embeds_means_empty_report() {
        assert!(scan_embeds(&[]).is_empty());
    }

    #[test]
    fn custom_catalog() {
        let catalog = [Keyword {
            keyword: "golden carrot",
            label: "GOLDEN CARROT",
        }];
        assert_eq!(
            scan_values_with(&catalog, ["A Golden Carrot appeared", "master sprinkler"]),
            vec!["GOLDEN CARROT"]
        );
    }
}
