use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use crate::dispatch::EventHandler;
use crate::error::Result;
use crate::event::EventRecord;
use crate::sink::{ColorTag, RichMessage};

use super::{format_count, or_placeholder, send_event_log, send_media_share, HandlerCx};

pub struct MediaShareHandler;

#[async_trait]
impl EventHandler for MediaShareHandler {
    async fn handle(&self, record: &EventRecord, cx: &HandlerCx) -> Result<()> {
        // Queue moderation and player-control events carry no media payload;
        // only actual shares produce an outbound message.
        if !record.contains_media() {
            debug!(
                target: "relay_dispatch",
                action = ?record.media_share_kind,
                "media control event"
            );
            return Ok(());
        }

        let from = record.from_user_or_default();
        let message = record.message_or_default();
        let amount = record.amount_display();

        let mut fields = vec![(
            "Donor / Amount".to_string(),
            format!("[{}](https://www.twitch.tv/{}) / {}", from, from, amount),
            true,
        )];
        if let Some(views) = record.media_view_count {
            fields.push(("Views".to_string(), format_count(views), true));
        }
        if !message.is_empty() {
            fields.push(("Message".to_string(), message.to_string(), false));
        }

        let rich = RichMessage {
            title: record.media_title.clone(),
            url: record.media_url(),
            author_name: record.media_channel_title.clone(),
            author_url: record.media_channel_url(),
            image_url: record.media_thumbnail_url.clone(),
            fields,
            footer: record
                .created_at
                .map(|at| format!("Donated {} ago", humanize_since(at))),
            color: ColorTag::Media,
        };

        send_media_share(cx, from, message, &amount, &rich).await?;

        let media_title = record.media_title.as_deref().unwrap_or("");
        let media_url = record.media_url().unwrap_or_default();
        send_event_log(
            cx,
            "Feed Donation",
            &[
                from.to_string(),
                amount.clone(),
                or_placeholder(message, "<no message>").to_string(),
                String::new(),
                media_title.to_string(),
                media_url,
                String::new(),
                format!(" id {}", record.event_log_id.as_deref().unwrap_or("")),
                format!("_id {}", record.event_log_underscore_id.as_deref().unwrap_or("")),
            ],
        )
        .await
    }
}

/// Coarse "time ago" wording for the embed footer.
fn humanize_since(at: chrono::DateTime<Utc>) -> String {
    let elapsed = Utc::now().signed_duration_since(at);
    let secs = elapsed.num_seconds().max(0);
    if secs < 60 {
        format!("{} seconds", secs)
    } else if secs < 3600 {
        let mins = secs / 60;
        format!("{} minute{}", mins, if mins == 1 { "" } else { "s" })
    } else if secs < 86400 {
        let hours = secs / 3600;
        format!("{} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else {
        let days = secs / 86400;
        format!("{} day{}", days, if days == 1 { "" } else { "s" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentStore;
    use crate::handlers::testing;
    use crate::sink::testing::{RecordingSink, SentMessage};
    use serde_json::json;
    use std::sync::Arc;

    fn share() -> EventRecord {
        EventRecord::from_value(
            json!({
                "type": "mediaShareEvent",
                "action": "newPendingMedia",
                "from": "alice",
                "message": [{
                    "amount": 10,
                    "formattedAmount": "$10.00",
                    "media": {"id": "abc123", "title": "A Song", "start_time": "30"},
                    "snippet": {"channelId": "UC7", "channelTitle": "Some Channel"},
                    "statistics": {"viewCount": "1234567"},
                    "thumbnails": {"medium": {"url": "https://thumbs.example/m.jpg"}}
                }]
            }),
            &ContentStore::for_tests(),
        )
    }

    fn control() -> EventRecord {
        EventRecord::from_value(
            json!({"type": "mediaShareEvent", "action": "pause"}),
            &ContentStore::for_tests(),
        )
    }

    #[tokio::test]
    async fn share_produces_rich_message_and_event_log() {
        let sink = Arc::new(RecordingSink::default());
        let cx = testing::cx(sink.clone());
        MediaShareHandler.handle(&share(), &cx).await.unwrap();

        let sent = sink.sent();
        assert_eq!(sent.len(), 2);
        let SentMessage::Rich { channel, message } = &sent[0] else {
            panic!("expected a rich message first");
        };
        assert_eq!(*channel, 20);
        assert_eq!(message.title.as_deref(), Some("A Song"));
        assert_eq!(
            message.url.as_deref(),
            Some("https://www.youtube.com/watch?v=abc123&t=30")
        );
        assert_eq!(message.image_url.as_deref(), Some("https://thumbs.example/m.jpg"));
        assert_eq!(message.fields[1].1, "1,234,567");
        assert_eq!(message.color, ColorTag::Media);
    }

    #[tokio::test]
    async fn control_event_without_media_sends_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let cx = testing::cx(sink.clone());
        MediaShareHandler.handle(&control(), &cx).await.unwrap();
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn repeated_share_is_suppressed_by_the_outbound_guard() {
        let sink = Arc::new(RecordingSink::default());
        let cx = testing::cx(sink.clone());
        MediaShareHandler.handle(&share(), &cx).await.unwrap();
        MediaShareHandler.handle(&share(), &cx).await.unwrap();
        // Rich + event log once; the second pass is fully suppressed.
        assert_eq!(sink.sent().len(), 2);
    }

    #[test]
    fn humanize_rounds_to_the_largest_unit() {
        let now = Utc::now();
        assert_eq!(humanize_since(now - chrono::Duration::seconds(30)), "30 seconds");
        assert_eq!(humanize_since(now - chrono::Duration::minutes(5)), "5 minutes");
        assert_eq!(humanize_since(now - chrono::Duration::hours(1)), "1 hour");
        assert_eq!(humanize_since(now - chrono::Duration::days(3)), "3 days");
    }
}
