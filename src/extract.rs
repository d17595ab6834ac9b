use rust_decimal::Decimal;
use serde_json::Value;

use crate::event::{AlertPlayingKind, EventKind, MediaShareKind};

/// Conversion from a JSON value, tolerant of the feed's loose typing
/// (numbers arriving as strings and vice versa).
pub trait FromValue: Sized {
    fn from_value(v: &Value) -> Option<Self>;
}

impl FromValue for String {
    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl FromValue for i64 {
    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for u64 {
    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for i32 {
    fn from_value(v: &Value) -> Option<Self> {
        i64::from_value(v).and_then(|n| i32::try_from(n).ok())
    }
}

impl FromValue for f64 {
    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl FromValue for bool {
    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::Bool(b) => Some(*b),
            // The feed encodes some flags as 0/1.
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            Value::String(s) => match s.trim() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl FromValue for Decimal {
    fn from_value(v: &Value) -> Option<Self> {
        match v {
            Value::String(s) => s.trim().parse().ok(),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Decimal::from(i))
                } else {
                    n.as_f64().and_then(Decimal::from_f64_retain)
                }
            }
            _ => None,
        }
    }
}

/// Find the value of `key` on the first object encountered in a depth-first,
/// document-order walk of `doc` (the root object counts; arrays are walked
/// element by element). Returns `None` when no object carries the key or the
/// value does not convert to `T`.
pub fn find_by_key<T: FromValue>(doc: &Value, key: &str) -> Option<T> {
    find_key_node(doc, key).and_then(T::from_value)
}

/// Like [`find_by_key`] but with an explicit fallback, distinguishing a true
/// zero value present in the document from an absent key.
pub fn find_by_key_or<T: FromValue>(doc: &Value, key: &str, default: T) -> T {
    find_by_key(doc, key).unwrap_or(default)
}

/// Find the first object carrying `parent`, then look `key` up within that
/// nested value only. The search does not continue past the first matching
/// parent: a later `parent` object is never consulted.
pub fn find_by_parent_and_key<T: FromValue>(doc: &Value, parent: &str, key: &str) -> Option<T> {
    let nested = find_key_node(doc, parent)?;
    match nested {
        Value::Object(map) => map.get(key).and_then(T::from_value),
        _ => None,
    }
}

pub fn find_by_parent_and_key_or<T: FromValue>(
    doc: &Value,
    parent: &str,
    key: &str,
    default: T,
) -> T {
    find_by_parent_and_key(doc, parent, key).unwrap_or(default)
}

fn find_key_node<'a>(node: &'a Value, key: &str) -> Option<&'a Value> {
    match node {
        Value::Object(map) => {
            if let Some(v) = map.get(key) {
                return Some(v);
            }
            map.values().find_map(|child| find_key_node(child, key))
        }
        Value::Array(items) => items.iter().find_map(|child| find_key_node(child, key)),
        _ => None,
    }
}

/// Classify the payload discriminator. Total: empty or unrecognized input
/// yields [`EventKind::Unknown`], never an error.
pub fn classify_event_kind(discriminator: &str) -> EventKind {
    match discriminator.to_ascii_lowercase().as_str() {
        "alertplaying" => EventKind::AlertPlaying,
        "donation" => EventKind::Donation,
        "bits" => EventKind::BitDonation,
        "subscription" => EventKind::Subscription,
        "resub" => EventKind::ReSubscription,
        "submysterygift" => EventKind::SubscriptionGift,
        "follow" => EventKind::Follow,
        "raid" => EventKind::Raid,
        "host" => EventKind::Host,
        "mediashareevent" => EventKind::MediaShare,
        "recenteventsevent" => EventKind::RecentEvents,
        "sessionreset" => EventKind::SessionReset,
        _ => EventKind::Unknown,
    }
}

pub fn classify_media_share_kind(discriminator: &str) -> MediaShareKind {
    match discriminator.to_ascii_lowercase().as_str() {
        "play" => MediaShareKind::Play,
        "pause" => MediaShareKind::Pause,
        "next" => MediaShareKind::Next,
        "previous" => MediaShareKind::Previous,
        "replay" => MediaShareKind::Replay,
        "seek" => MediaShareKind::Seek,
        "pop" => MediaShareKind::Pop,
        "show" => MediaShareKind::Show,
        "hide" => MediaShareKind::Hide,
        "move" => MediaShareKind::Move,
        "accept" => MediaShareKind::Accept,
        "decline" => MediaShareKind::Decline,
        "ban" => MediaShareKind::Ban,
        "newmaster" => MediaShareKind::NewMaster,
        "newpendingmedia" => MediaShareKind::NewPendingMedia,
        "newstreamermedia" => MediaShareKind::NewStreamerMedia,
        _ => MediaShareKind::Unknown,
    }
}

pub fn classify_alert_playing_kind(discriminator: &str) -> AlertPlayingKind {
    match discriminator.to_ascii_lowercase().as_str() {
        "donation" => AlertPlayingKind::Donation,
        "bits" => AlertPlayingKind::BitDonation,
        "subscription" => AlertPlayingKind::Subscription,
        "submysterygift" => AlertPlayingKind::SubscriptionGift,
        "pledge" => AlertPlayingKind::Pledge,
        "raid" => AlertPlayingKind::Raid,
        _ => AlertPlayingKind::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_key_returns_none_and_default() {
        let doc = json!({"a": 1});
        assert_eq!(find_by_key::<String>(&doc, "missing"), None);
        assert_eq!(find_by_key_or::<i64>(&doc, "missing", 7), 7);
    }

    #[test]
    fn present_zero_is_distinct_from_absent() {
        let doc = json!({"count": 0});
        assert_eq!(find_by_key::<i64>(&doc, "count"), Some(0));
        assert_eq!(find_by_key_or::<i64>(&doc, "count", 7), 0);
    }

    #[test]
    fn depth_first_document_order_wins() {
        // "name" sits deep under the first member and shallow under a later
        // one; depth-first document order surfaces the deep occurrence.
        let doc = json!({
            "a": {"b": {"name": "deepest"}},
            "c": {"name": "shallower"}
        });
        assert_eq!(
            find_by_key::<String>(&doc, "name"),
            Some("deepest".to_string())
        );
    }

    #[test]
    fn root_object_is_searched_first() {
        let doc = json!({"type": "bits", "amount": 500});
        assert_eq!(
            find_by_key::<String>(&doc, "type"),
            Some("bits".to_string())
        );
        assert_eq!(find_by_key::<i64>(&doc, "amount"), Some(500));

        // The root is the first object encountered, so its key beats any
        // nested occurrence.
        let doc = json!({"name": "root", "nested": {"name": "inner"}});
        assert_eq!(
            find_by_key::<String>(&doc, "name"),
            Some("root".to_string())
        );
    }

    #[test]
    fn arrays_are_walked_in_order() {
        let doc = json!({"message": [{"amount": 12}, {"amount": 99}]});
        assert_eq!(find_by_key::<i64>(&doc, "amount"), Some(12));
    }

    #[test]
    fn parent_and_key_stops_at_first_parent() {
        let doc = json!({
            "media": {"title": "wanted"},
            "later": {"media": {"title": "ignored", "id": "xyz"}}
        });
        assert_eq!(
            find_by_parent_and_key::<String>(&doc, "media", "title"),
            Some("wanted".to_string())
        );
        // First "media" object has no "id"; the later one is never consulted.
        assert_eq!(find_by_parent_and_key::<String>(&doc, "media", "id"), None);
    }

    #[test]
    fn loose_typing_converts_strings_and_numbers() {
        let doc = json!({"amount": "25.50", "months": "6", "gifted": 1});
        assert_eq!(
            find_by_key::<Decimal>(&doc, "amount"),
            Some("25.50".parse().unwrap())
        );
        assert_eq!(find_by_key::<i64>(&doc, "months"), Some(6));
        assert_eq!(find_by_key::<bool>(&doc, "gifted"), Some(true));
    }

    #[test]
    fn unknown_discriminators_classify_to_unknown() {
        assert_eq!(classify_event_kind(""), EventKind::Unknown);
        assert_eq!(classify_event_kind("mystery"), EventKind::Unknown);
        assert_eq!(classify_media_share_kind("warble"), MediaShareKind::Unknown);
        assert_eq!(
            classify_alert_playing_kind(""),
            AlertPlayingKind::Unknown
        );
    }

    #[test]
    fn known_discriminators_are_case_insensitive() {
        assert_eq!(classify_event_kind("Donation"), EventKind::Donation);
        assert_eq!(classify_event_kind("BITS"), EventKind::BitDonation);
        assert_eq!(
            classify_event_kind("mediaShareEvent"),
            EventKind::MediaShare
        );
        assert_eq!(classify_media_share_kind("Play"), MediaShareKind::Play);
    }
}
