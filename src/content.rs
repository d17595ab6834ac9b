use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::text::EmoteStripper;

/// Emote token prefixes recognized when no override file is supplied. Each
/// appears in messages with a numeric suffix (`cheer100`).
const DEFAULT_EMOTE_TOKENS: &[&str] = &[
    "cheer",
    "biblethump",
    "cheerwhal",
    "corgo",
    "uni",
    "showlove",
    "party",
    "seemsgood",
    "pride",
    "kappa",
    "frankerz",
    "heyguys",
    "dansgame",
    "elegiggle",
    "trihard",
    "kreygasm",
    "4head",
    "swiftrage",
    "notlikethis",
    "failfish",
    "vohiyo",
    "pjsalt",
    "mrdestructoid",
    "bday",
    "ripcheer",
    "shamrock",
];

/// Static content resolved once at startup and read-only afterwards: the
/// emote token set (plus its compiled stripper), the subscription plan
/// lookup table, and the placeholder thumbnail.
pub struct ContentStore {
    stripper: EmoteStripper,
    sub_plans: HashMap<String, String>,
    placeholder_thumbnail_url: String,
}

impl ContentStore {
    pub fn load(cfg: &Config) -> Result<Self> {
        let emote_tokens = match &cfg.emote_file {
            Some(path) => load_token_file(path)?,
            None => DEFAULT_EMOTE_TOKENS.iter().map(|s| s.to_string()).collect(),
        };
        let stripper = EmoteStripper::new(&emote_tokens);

        let sub_plans: HashMap<String, String> = [
            ("prime", "Prime"),
            ("1000", "Tier 1"),
            ("2000", "Tier 2"),
            ("3000", "Tier 3"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        info!(
            emote_tokens = emote_tokens.len(),
            sub_plans = sub_plans.len(),
            "content loaded"
        );

        Ok(ContentStore {
            stripper,
            sub_plans,
            placeholder_thumbnail_url: cfg.placeholder_thumbnail_url.clone(),
        })
    }

    pub fn stripper(&self) -> &EmoteStripper {
        &self.stripper
    }

    /// Human label for a raw subscription plan id, case-insensitive.
    pub fn plan_label(&self, raw: &str) -> Option<&str> {
        self.sub_plans
            .get(raw.trim().to_lowercase().as_str())
            .map(|s| s.as_str())
    }

    pub fn placeholder_thumbnail_url(&self) -> &str {
        &self.placeholder_thumbnail_url
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        let stripper = EmoteStripper::new(DEFAULT_EMOTE_TOKENS);
        ContentStore {
            stripper,
            sub_plans: [
                ("prime", "Prime"),
                ("1000", "Tier 1"),
                ("2000", "Tier 2"),
                ("3000", "Tier 3"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
            placeholder_thumbnail_url: "https://thumbs.example/placeholder.png".to_string(),
        }
    }
}

/// One token per line; `#` lines are comments.
fn load_token_file(path: &str) -> Result<Vec<String>> {
    let data = std::fs::read_to_string(Path::new(path))?;
    Ok(data
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.to_lowercase())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_labels_are_case_insensitive() {
        let content = ContentStore::for_tests();
        assert_eq!(content.plan_label("prime"), Some("Prime"));
        assert_eq!(content.plan_label("Prime"), Some("Prime"));
        assert_eq!(content.plan_label("1000"), Some("Tier 1"));
        assert_eq!(content.plan_label("9999"), None);
    }

    #[test]
    fn default_token_set_strips_cheers() {
        let content = ContentStore::for_tests();
        assert_eq!(content.stripper().strip("cheer100 gg"), " gg");
    }
}
