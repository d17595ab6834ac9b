use async_trait::async_trait;

use crate::dispatch::EventHandler;
use crate::error::Result;
use crate::event::EventRecord;

use super::{send_sub_or_donation, HandlerCx};

pub struct HostHandler;

#[async_trait]
impl EventHandler for HostHandler {
    async fn handle(&self, record: &EventRecord, cx: &HandlerCx) -> Result<()> {
        let viewers = record.viewers.unwrap_or(0);
        send_sub_or_donation(
            cx,
            &format!(
                "**{}** hosted with **{}** viewers",
                record.from_user_or_default(),
                viewers
            ),
        )
        .await
    }
}
