use async_trait::async_trait;

use crate::dispatch::EventHandler;
use crate::error::Result;
use crate::event::EventRecord;

use super::{or_placeholder, send_event_log, send_sub_or_donation, HandlerCx};

/// Handles both first-time subscriptions and resubs; the payloads differ
/// only in their discriminator.
pub struct SubscriptionHandler;

#[async_trait]
impl EventHandler for SubscriptionHandler {
    async fn handle(&self, record: &EventRecord, cx: &HandlerCx) -> Result<()> {
        // Gifted subs arrive a second time through the gift event; the gift
        // handler owns those.
        if record.is_gift {
            return Ok(());
        }

        let months = record.months.unwrap_or(0);
        let icon = if months >= cx.thresholds.long_sub_months {
            ":small_orange_diamond: "
        } else {
            ""
        };
        let month_word = if months > 1 { "months" } else { "month" };
        let plan = record
            .sub_plan_label
            .as_deref()
            .map(|label| format!(" ({})", label))
            .unwrap_or_default();

        send_sub_or_donation(
            cx,
            &format!(
                "{}**{}** subscribed for **{} {}**{}{}",
                icon,
                record.from_user_or_default(),
                months,
                month_word,
                plan,
                record.message_block()
            ),
        )
        .await?;

        send_event_log(
            cx,
            "Subscription",
            &[
                record.from_user_or_default().to_string(),
                format!("{} {}", months, month_word),
                or_placeholder(record.message_or_default(), "<no message>").to_string(),
                String::new(),
                format!("_id {}", record.event_log_underscore_id.as_deref().unwrap_or("")),
            ],
        )
        .await
    }
}
