use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::dispatch::EventHandler;
use crate::error::Result;
use crate::event::EventRecord;

use super::{or_placeholder, send_event_log, send_sub_or_donation, HandlerCx};

pub struct BitDonationHandler;

#[async_trait]
impl EventHandler for BitDonationHandler {
    async fn handle(&self, record: &EventRecord, cx: &HandlerCx) -> Result<()> {
        let amount = record.amount_or_zero();
        let icon = if amount >= Decimal::from(cx.thresholds.large_bits) {
            ":small_blue_diamond: "
        } else {
            ""
        };
        let bit_word = if amount > Decimal::ONE { "bits" } else { "bit" };

        send_sub_or_donation(
            cx,
            &format!(
                "{}**{}** donated **{} {}**{}",
                icon,
                record.from_user_or_default(),
                amount,
                bit_word,
                record.message_block()
            ),
        )
        .await?;

        send_event_log(
            cx,
            "Bits Donation",
            &[
                record.from_user_or_default().to_string(),
                format!("{} {}", amount, bit_word),
                or_placeholder(record.message_or_default(), "<no message>").to_string(),
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
    use std::sync::Arc;

    fn bits(amount: i64, message: &str) -> EventRecord {
        EventRecord::from_frame(
            &format!(
                r#"{{"type":"bits","display_name":"alice","amount":{},"message":"{}"}}"#,
                amount, message
            ),
            &ContentStore::for_tests(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn pluralizes_and_applies_threshold() {
        let sink = Arc::new(RecordingSink::default());
        let cx = testing::cx(sink.clone());

        BitDonationHandler.handle(&bits(1, "hi"), &cx).await.unwrap();
        BitDonationHandler.handle(&bits(5000, "big"), &cx).await.unwrap();

        let texts = sink.plain_texts();
        assert_eq!(texts[0], "**alice** donated **1 bit**```hi```");
        assert_eq!(
            texts[2],
            ":small_blue_diamond: **alice** donated **5000 bits**```big```"
        );
    }
}
