use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::dispatch::EventHandler;
use crate::error::Result;
use crate::event::EventRecord;

use super::{send_event_log, send_sub_or_donation, HandlerCx};

pub struct SubscriptionGiftHandler;

#[async_trait]
impl EventHandler for SubscriptionGiftHandler {
    async fn handle(&self, record: &EventRecord, cx: &HandlerCx) -> Result<()> {
        let gifter = record
            .gifter
            .as_deref()
            .unwrap_or_else(|| record.from_user_or_default());
        let count = record.amount_or_zero();

        let icon = if count >= Decimal::from(cx.thresholds.large_sub_gift) {
            ":small_orange_diamond: "
        } else {
            ""
        };
        let sub_word = if count > Decimal::ONE { "subs" } else { "sub" };
        let plan = record
            .sub_plan_label
            .as_deref()
            .map(|label| format!(" ({})", label))
            .unwrap_or_default();

        // Gift events are spammed by the feed several times per gift; key an
        // extra pass on the gifter and the payload's underscore id.
        let underscore_id = record.event_log_underscore_id.as_deref().unwrap_or("");
        if !cx
            .outbound
            .first_send_keyed("subgift", gifter, underscore_id, "")
        {
            return Ok(());
        }

        send_sub_or_donation(
            cx,
            &format!("{}**{}** gifted **{} {}**{}", icon, gifter, count, sub_word, plan),
        )
        .await?;

        send_event_log(
            cx,
            "Subscription Gift",
            &[
                gifter.to_string(),
                format!("{} {}", count, sub_word),
                String::new(),
                format!(" id {}", record.event_log_id.as_deref().unwrap_or("")),
                format!("_id {}", underscore_id),
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

    fn gift(amount: &str, underscore_id: &str) -> EventRecord {
        EventRecord::from_value(
            json!({
                "type": "submysterygift",
                "gifter_display_name": "generous_gal",
                "amount": amount,
                "sub_plan": "1000",
                "id": "55",
                "_id": underscore_id
            }),
            &ContentStore::for_tests(),
        )
    }

    #[tokio::test]
    async fn formats_gift_with_plan_and_icon() {
        let sink = Arc::new(RecordingSink::default());
        let cx = testing::cx(sink.clone());
        SubscriptionGiftHandler.handle(&gift("20", "aa01"), &cx).await.unwrap();

        let texts = sink.plain_texts();
        assert_eq!(
            texts[0],
            ":small_orange_diamond: **generous\\_gal** gifted **20 subs** (Tier 1)"
        );
    }

    #[tokio::test]
    async fn repeated_gift_payloads_collapse_on_underscore_id() {
        let sink = Arc::new(RecordingSink::default());
        let cx = testing::cx(sink.clone());

        SubscriptionGiftHandler.handle(&gift("1", "aa02"), &cx).await.unwrap();
        SubscriptionGiftHandler.handle(&gift("1", "aa02"), &cx).await.unwrap();
        // Two sends total (headline + event log), not four.
        assert_eq!(sink.sent().len(), 2);

        // A different gift id goes through.
        SubscriptionGiftHandler.handle(&gift("1", "aa03"), &cx).await.unwrap();
        assert_eq!(sink.sent().len(), 4);
    }

    #[tokio::test]
    async fn single_sub_is_singular() {
        let sink = Arc::new(RecordingSink::default());
        let cx = testing::cx(sink.clone());
        SubscriptionGiftHandler.handle(&gift("1", "aa04"), &cx).await.unwrap();
        assert!(sink.plain_texts()[0].contains("**1 sub** (Tier 1)"));
    }
}
