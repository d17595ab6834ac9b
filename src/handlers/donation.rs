use async_trait::async_trait;

use crate::dispatch::EventHandler;
use crate::error::Result;
use crate::event::EventRecord;

use super::{or_placeholder, send_event_log, send_sub_or_donation, HandlerCx};

pub struct DonationHandler;

#[async_trait]
impl EventHandler for DonationHandler {
    async fn handle(&self, record: &EventRecord, cx: &HandlerCx) -> Result<()> {
        let icon = if record.amount_or_zero() >= cx.thresholds.large_donation {
            ":small_blue_diamond: "
        } else {
            ""
        };
        let amount = record.amount_display();

        send_sub_or_donation(
            cx,
            &format!(
                "{}**{}** donated **{}**{}",
                icon,
                record.from_user_or_default(),
                amount,
                record.message_block()
            ),
        )
        .await?;

        let media_title = record.media_title.as_deref().unwrap_or("");
        let media_url = record.media_url().unwrap_or_default();
        send_event_log(
            cx,
            "Feed Donation",
            &[
                format!(
                    "{} ({})",
                    record.from_user_or_default(),
                    record.from_user_id.as_deref().unwrap_or("")
                ),
                amount.clone(),
                or_placeholder(record.message_or_default(), "<no message>").to_string(),
                String::new(),
                or_placeholder(media_title, "<no media>").to_string(),
                or_placeholder(&media_url, "<no media>").to_string(),
                String::new(),
                format!(" id {}", record.event_log_id.as_deref().unwrap_or("")),
                format!("_id {}", record.event_log_underscore_id.as_deref().unwrap_or("")),
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentStore;
    use crate::handlers::testing;
    use crate::sink::testing::RecordingSink;
    use serde_json::json;
    use std::sync::Arc;

    fn donation(amount: i64, message: &str) -> EventRecord {
        EventRecord::from_value(
            json!({
                "type": "donation",
                "from": "alice",
                "from_user_id": "401",
                "amount": amount,
                "formattedAmount": format!("${}.00", amount),
                "message": message,
                "id": "9001",
                "_id": "fe12aa"
            }),
            &ContentStore::for_tests(),
        )
    }

    #[tokio::test]
    async fn small_donation_has_no_icon() {
        let sink = Arc::new(RecordingSink::default());
        let cx = testing::cx(sink.clone());
        DonationHandler.handle(&donation(5, "hello"), &cx).await.unwrap();

        let texts = sink.plain_texts();
        assert_eq!(texts.len(), 2);
        assert_eq!(texts[0], "**alice** donated **$5.00**```hello```");
        assert!(texts[1].starts_with("● Feed Donation```"));
        assert!(texts[1].contains("alice (401)"));
        assert!(texts[1].contains("<no media>"));
        assert!(texts[1].contains(" id 9001"));
        assert!(texts[1].contains("_id fe12aa"));
    }

    #[tokio::test]
    async fn large_donation_gets_the_icon() {
        let sink = Arc::new(RecordingSink::default());
        let cx = testing::cx(sink.clone());
        DonationHandler.handle(&donation(50, ""), &cx).await.unwrap();

        let texts = sink.plain_texts();
        assert!(texts[0].starts_with(":small_blue_diamond: **alice** donated"));
        // No message: headline carries no code block, log shows placeholder.
        assert!(!texts[0].contains("```"));
        assert!(texts[1].contains("<no message>"));
    }
}
