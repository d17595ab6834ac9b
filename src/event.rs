use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::content::ContentStore;
use crate::error::Result;
use crate::extract::{
    classify_alert_playing_kind, classify_event_kind, classify_media_share_kind, find_by_key,
    find_by_key_or, find_by_parent_and_key, find_by_parent_and_key_or,
};
use crate::text::{clean_message, sanitize_markdown};

/// Classified category of an inbound alert. Classification is total: an
/// unrecognized or absent discriminator is `Unknown`, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AlertPlaying,
    Donation,
    BitDonation,
    Subscription,
    ReSubscription,
    SubscriptionGift,
    Follow,
    Raid,
    Host,
    MediaShare,
    RecentEvents,
    SessionReset,
    Unknown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AlertPlaying => "alert_playing",
            EventKind::Donation => "donation",
            EventKind::BitDonation => "bit_donation",
            EventKind::Subscription => "subscription",
            EventKind::ReSubscription => "resubscription",
            EventKind::SubscriptionGift => "subscription_gift",
            EventKind::Follow => "follow",
            EventKind::Raid => "raid",
            EventKind::Host => "host",
            EventKind::MediaShare => "media_share",
            EventKind::RecentEvents => "recent_events",
            EventKind::SessionReset => "session_reset",
            EventKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaShareKind {
    Play,
    Pause,
    Next,
    Previous,
    Replay,
    Seek,
    Pop,
    Show,
    Hide,
    Move,
    Accept,
    Decline,
    Ban,
    NewMaster,
    NewPendingMedia,
    NewStreamerMedia,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertPlayingKind {
    Donation,
    BitDonation,
    Subscription,
    SubscriptionGift,
    Pledge,
    Raid,
    Unknown,
}

/// Normalized, immutable view of one raw feed payload.
///
/// Construction never fails on malformed or missing fields: every field
/// degrades to `None` rather than erroring. Only the top-level JSON parse
/// in [`EventRecord::from_frame`] can fail. User-visible text fields are
/// already sanitized for markdown.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub kind: EventKind,
    pub media_share_kind: Option<MediaShareKind>,
    pub alert_playing_kind: Option<AlertPlayingKind>,

    pub from_user: Option<String>,
    pub from_user_id: Option<String>,
    pub message: Option<String>,
    pub message_sanitized: Option<String>,

    pub amount: Option<Decimal>,
    pub amount_formatted: Option<String>,
    pub currency: Option<String>,

    pub months: Option<i64>,
    pub sub_plan_label: Option<String>,
    pub is_gift: bool,
    pub gifter: Option<String>,

    pub raiders: Option<i64>,
    pub viewers: Option<i64>,

    pub media_id: Option<String>,
    pub media_title: Option<String>,
    pub media_channel_id: Option<String>,
    pub media_channel_title: Option<String>,
    pub media_thumbnail_url: Option<String>,
    /// 0 when the payload names no offset.
    pub media_start_seconds: i64,
    pub media_view_count: Option<i64>,

    pub event_log_id: Option<String>,
    pub event_log_underscore_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,

    /// Original payload, retained for audit logging.
    pub raw: Value,
}

impl EventRecord {
    /// Build a record from one raw text frame. Fails only when the frame is
    /// not parseable JSON.
    pub fn from_frame(raw_text: &str, content: &ContentStore) -> Result<EventRecord> {
        let doc: Value = serde_json::from_str(raw_text)?;
        Ok(Self::from_value(doc, content))
    }

    pub fn from_value(doc: Value, content: &ContentStore) -> EventRecord {
        let kind = classify_event_kind(&find_string(&doc, &["type"]).unwrap_or_default());

        let media_share_kind = match kind {
            EventKind::MediaShare => Some(classify_media_share_kind(
                &find_string(&doc, &["action"]).unwrap_or_default(),
            )),
            _ => None,
        };
        let alert_playing_kind = match kind {
            EventKind::AlertPlaying => Some(classify_alert_playing_kind(
                &find_string(&doc, &["alert_type"]).unwrap_or_default(),
            )),
            _ => None,
        };

        let from_user =
            find_string(&doc, &["from", "display_name", "name"]).map(|s| sanitize_markdown(&s));
        let from_user_id = find_string(&doc, &["from_user_id", "user_id"]);

        let message = find_string(&doc, &["message"]);
        let message_sanitized = message
            .as_deref()
            .map(|m| clean_message(m, content.stripper()));

        let amount: Option<Decimal> = find_by_key(&doc, "amount");
        let amount_formatted = find_string(&doc, &["formattedAmount", "formatted_amount"])
            .map(|s| sanitize_markdown(&s));
        let currency = find_string(&doc, &["currency"]);

        let months: Option<i64> = find_by_key(&doc, "months");
        let sub_plan_label = find_string(&doc, &["sub_plan"])
            .and_then(|p| content.plan_label(&p).map(|l| l.to_string()));
        let is_gift = find_by_key_or(&doc, "gifted", false);
        let gifter = find_string(&doc, &["gifter_display_name"]).map(|s| sanitize_markdown(&s));

        let raiders: Option<i64> = find_by_key(&doc, "raiders");
        let viewers: Option<i64> = find_by_key(&doc, "viewers");

        let media_id = non_empty(find_by_parent_and_key(&doc, "media", "id"));
        let media_title = non_empty(find_by_parent_and_key(&doc, "media", "title"))
            .map(|s: String| sanitize_markdown(&s));
        let media_start_seconds = find_by_parent_and_key_or::<i64>(&doc, "media", "start_time", 0);
        let media_channel_id = non_empty(find_by_parent_and_key(&doc, "snippet", "channelId"));
        let media_channel_title = non_empty(find_by_parent_and_key(&doc, "snippet", "channelTitle"))
            .map(|s: String| sanitize_markdown(&s));
        let media_view_count: Option<i64> = find_by_parent_and_key(&doc, "statistics", "viewCount");

        let media_thumbnail_url = if media_id.is_some() {
            Some(resolve_thumbnail(&doc, content))
        } else {
            None
        };

        let event_log_id = find_string(&doc, &["id"]);
        let event_log_underscore_id = find_string(&doc, &["_id"]);
        let created_at = find_string(&doc, &["created_at"])
            .as_deref()
            .and_then(parse_timestamp);

        EventRecord {
            kind,
            media_share_kind,
            alert_playing_kind,
            from_user,
            from_user_id,
            message,
            message_sanitized,
            amount,
            amount_formatted,
            currency,
            months,
            sub_plan_label,
            is_gift,
            gifter,
            raiders,
            viewers,
            media_id,
            media_title,
            media_channel_id,
            media_channel_title,
            media_thumbnail_url,
            media_start_seconds,
            media_view_count,
            event_log_id,
            event_log_underscore_id,
            created_at,
            raw: doc,
        }
    }

    pub fn contains_media(&self) -> bool {
        self.media_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// Watch URL for the shared media, with start-time offset when present.
    pub fn media_url(&self) -> Option<String> {
        let id = self.media_id.as_deref()?;
        Some(if self.media_start_seconds > 0 {
            format!(
                "https://www.youtube.com/watch?v={}&t={}",
                id, self.media_start_seconds
            )
        } else {
            format!("https://www.youtube.com/watch?v={}", id)
        })
    }

    pub fn media_channel_url(&self) -> Option<String> {
        self.media_channel_id
            .as_deref()
            .map(|id| format!("https://www.youtube.com/channel/{}", id))
    }

    /// Formatted amount when the payload provides one, otherwise the raw
    /// amount with its currency code.
    pub fn amount_display(&self) -> String {
        if let Some(formatted) = self.amount_formatted.as_deref() {
            return formatted.to_string();
        }
        match (self.amount, self.currency.as_deref()) {
            (Some(amount), Some(code)) => format!("{} {}", amount, code),
            (Some(amount), None) => amount.to_string(),
            _ => String::new(),
        }
    }

    /// Sanitized message wrapped in a markdown code block, or empty when
    /// there is no message. Appended directly after the headline text.
    pub fn message_block(&self) -> String {
        match self.message_sanitized.as_deref() {
            Some(m) if !m.is_empty() => format!("```{}```", m),
            _ => String::new(),
        }
    }

    pub fn from_user_or_default(&self) -> &str {
        self.from_user.as_deref().unwrap_or("")
    }

    pub fn message_or_default(&self) -> &str {
        self.message_sanitized.as_deref().unwrap_or("")
    }

    pub fn amount_or_zero(&self) -> Decimal {
        self.amount.unwrap_or(Decimal::ZERO)
    }
}

/// First non-empty string among `keys`, in order. Mirrors the extractor's
/// key-list probing: each key is searched depth-first across the whole
/// document before the next key is tried.
fn find_string(doc: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| non_empty(find_by_key::<String>(doc, key)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Best available thumbnail: resolution keys in descending quality order,
/// each nested under a `url` field; first non-empty wins, otherwise the
/// configured placeholder.
fn resolve_thumbnail(doc: &Value, content: &ContentStore) -> String {
    for resolution in ["maxres", "standard", "high", "medium", "default"] {
        if let Some(url) = non_empty(find_by_parent_and_key(doc, resolution, "url")) {
            return url;
        }
    }
    content.placeholder_thumbnail_url().to_string()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // The feed also emits "YYYY-MM-DD HH:MM:SS" without an offset; treat as UTC.
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn content() -> ContentStore {
        ContentStore::for_tests()
    }

    #[test]
    fn bits_frame_normalizes_flat_fields() {
        let content = content();
        let record = EventRecord::from_frame(
            r#"{"type":"bits","display_name":"alice","amount":500,"message":"gg"}"#,
            &content,
        )
        .unwrap();
        assert_eq!(record.kind, EventKind::BitDonation);
        assert_eq!(record.from_user.as_deref(), Some("alice"));
        assert_eq!(record.amount, Some(Decimal::from(500)));
        assert_eq!(record.message_sanitized.as_deref(), Some("gg"));
    }

    #[test]
    fn invalid_json_is_the_only_failure() {
        let content = content();
        assert!(EventRecord::from_frame("{not json", &content).is_err());
        // Arbitrary valid JSON always constructs, with every field defaulted.
        let record = EventRecord::from_frame(r#"{"weird":[1,2,3]}"#, &content).unwrap();
        assert_eq!(record.kind, EventKind::Unknown);
        assert_eq!(record.from_user, None);
        assert_eq!(record.amount, None);
        assert!(!record.is_gift);
    }

    #[test]
    fn from_user_is_sanitized_and_probes_keys_in_order() {
        let content = content();
        let record = EventRecord::from_frame(
            r#"{"type":"donation","from":"bad_actor","display_name":"ignored"}"#,
            &content,
        )
        .unwrap();
        assert_eq!(record.from_user.as_deref(), Some("bad\\_actor"));
    }

    #[test]
    fn message_is_stripped_and_escaped_at_construction() {
        let content = content();
        let record = EventRecord::from_frame(
            r#"{"type":"bits","display_name":"bob","amount":100,"message":"cheer100 nice*play"}"#,
            &content,
        )
        .unwrap();
        assert_eq!(record.message.as_deref(), Some("cheer100 nice*play"));
        assert_eq!(record.message_sanitized.as_deref(), Some("nice\\*play"));
        assert_eq!(record.message_block(), "```nice\\*play```");
    }

    #[test]
    fn thumbnail_falls_back_through_resolutions() {
        let content = content();
        let record = EventRecord::from_value(
            json!({
                "type": "mediaShareEvent",
                "action": "newPendingMedia",
                "media": {"id": "dQw4w9WgXcQ"},
                "thumbnails": {
                    "medium": {"url": "https://thumbs.example/medium.jpg"},
                    "default": {"url": "https://thumbs.example/default.jpg"}
                }
            }),
            &content,
        );
        assert_eq!(
            record.media_thumbnail_url.as_deref(),
            Some("https://thumbs.example/medium.jpg")
        );
    }

    #[test]
    fn thumbnail_placeholder_when_none_populated() {
        let content = content();
        let record = EventRecord::from_value(
            json!({
                "type": "mediaShareEvent",
                "action": "newPendingMedia",
                "media": {"id": "dQw4w9WgXcQ"}
            }),
            &content,
        );
        assert_eq!(
            record.media_thumbnail_url.as_deref(),
            Some("https://thumbs.example/placeholder.png")
        );
    }

    #[test]
    fn media_urls_include_start_offset_when_positive() {
        let content = content();
        let record = EventRecord::from_value(
            json!({
                "type": "mediaShareEvent",
                "action": "play",
                "media": {"id": "abc123", "start_time": "42", "title": "A Song"},
                "snippet": {"channelId": "UC99", "channelTitle": "Some Channel"}
            }),
            &content,
        );
        assert!(record.contains_media());
        assert_eq!(
            record.media_url().as_deref(),
            Some("https://www.youtube.com/watch?v=abc123&t=42")
        );
        assert_eq!(
            record.media_channel_url().as_deref(),
            Some("https://www.youtube.com/channel/UC99")
        );
        assert_eq!(record.media_share_kind, Some(MediaShareKind::Play));
    }

    #[test]
    fn subscription_fields_and_plan_label() {
        let content = content();
        let record = EventRecord::from_value(
            json!({
                "type": "resub",
                "name": "carol",
                "months": 14,
                "sub_plan": "2000",
                "message": "hi"
            }),
            &content,
        );
        assert_eq!(record.kind, EventKind::ReSubscription);
        assert_eq!(record.months, Some(14));
        assert_eq!(record.sub_plan_label.as_deref(), Some("Tier 2"));
        assert!(!record.is_gift);
    }

    #[test]
    fn gift_flag_and_gifter_are_detected() {
        let content = content();
        let record = EventRecord::from_value(
            json!({
                "type": "subscription",
                "name": "dave",
                "gifted": true,
                "gifter_display_name": "eve_giver"
            }),
            &content,
        );
        assert!(record.is_gift);
        assert_eq!(record.gifter.as_deref(), Some("eve\\_giver"));
    }

    #[test]
    fn amount_display_falls_back_to_amount_and_currency() {
        let content = content();
        let with_formatted = EventRecord::from_value(
            json!({"type":"donation","amount":"5.00","formattedAmount":"$5.00"}),
            &content,
        );
        assert_eq!(with_formatted.amount_display(), "$5.00");

        let with_currency = EventRecord::from_value(
            json!({"type":"donation","amount":"12.50","currency":"EUR"}),
            &content,
        );
        assert_eq!(with_currency.amount_display(), "12.50 EUR");

        let bare = EventRecord::from_value(json!({"type":"donation"}), &content);
        assert_eq!(bare.amount_display(), "");
    }

    #[test]
    fn created_at_parses_both_feed_formats() {
        assert!(parse_timestamp("2024-07-01T12:30:00Z").is_some());
        assert!(parse_timestamp("2024-07-01 12:30:00").is_some());
        assert!(parse_timestamp("whenever").is_none());
    }

    #[test]
    fn log_ids_are_found_anywhere_in_the_document() {
        let content = content();
        let record = EventRecord::from_value(
            json!({
                "type": "donation",
                "message": [{"id": "77001", "_id": "aa99ff", "from": "frank"}]
            }),
            &content,
        );
        assert_eq!(record.event_log_id.as_deref(), Some("77001"));
        assert_eq!(record.event_log_underscore_id.as_deref(), Some("aa99ff"));
        assert_eq!(record.from_user.as_deref(), Some("frank"));
    }
}
