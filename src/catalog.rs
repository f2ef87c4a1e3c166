//! Rare items worth alerting about

/// A rare item as it appears in stock announcements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keyword {
    /// Lowercase text to look for in field values
    pub keyword: &'static str,
    /// Uppercase name used in alerts
    pub label: &'static str,
}

macro_rules! catalog {
    ($($keyword:literal => $label:literal),* $(,)?) => {
        &[$(Keyword { keyword: $keyword, label: $label }),*]
    };
}

/// Scanned in this order; report order follows it within a field.
pub const CATALOG: &[Keyword] = catalog![
    "master sprinkler" => "MASTER SPRINKLER",
    "ember lily" => "EMBER LILY",
    "bug egg" => "BUG EGG",
    "mythical egg" => "MYTHICAL EGG",
    "beanstalk" => "BEANSTALK",
    "bee egg" => "BEE EGG",
    "hive fruit seed" => "HIVE FRUIT SEED",
    "honey sprinkler" => "HONEY SPRINKLER",
    "nectar staff" => "NECTAR STAFF",
];

/// Comma separated keywords, for logging.
pub fn describe() -> String {
    CATALOG
        .iter()
        .map(|k| k.keyword)
        .collect::<Vec<_>>()
        .join(", ")
}
