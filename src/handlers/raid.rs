use async_trait::async_trait;

use crate::dispatch::EventHandler;
use crate::error::Result;
use crate::event::EventRecord;

use super::{send_sub_or_donation, HandlerCx};

pub struct RaidHandler;

#[async_trait]
impl EventHandler for RaidHandler {
    async fn handle(&self, record: &EventRecord, cx: &HandlerCx) -> Result<()> {
        let raiders = record.raiders.unwrap_or(0);
        let icon = if raiders >= cx.thresholds.large_raid {
            ":bell: "
        } else {
            ""
        };
        send_sub_or_donation(
            cx,
            &format!(
                "{}**{}** raided with **{}** viewers",
                icon,
                record.from_user_or_default(),
                raiders
            ),
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

    fn raid(raiders: i64) -> EventRecord {
        EventRecord::from_value(
            json!({"type": "raid", "name": "warboss", "raiders": raiders}),
            &ContentStore::for_tests(),
        )
    }

    #[tokio::test]
    async fn large_raid_rings_the_bell() {
        let sink = Arc::new(RecordingSink::default());
        let cx = testing::cx(sink.clone());

        RaidHandler.handle(&raid(12), &cx).await.unwrap();
        RaidHandler.handle(&raid(120), &cx).await.unwrap();

        let texts = sink.plain_texts();
        assert_eq!(texts[0], "**warboss** raided with **12** viewers");
        assert_eq!(texts[1], ":bell: **warboss** raided with **120** viewers");
    }
}
