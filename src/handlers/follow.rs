use async_trait::async_trait;

use crate::dispatch::EventHandler;
use crate::error::Result;
use crate::event::EventRecord;

use super::{send_event_log, HandlerCx};

/// Follows are low-value notices; they go to the event log only.
pub struct FollowHandler;

#[async_trait]
impl EventHandler for FollowHandler {
    async fn handle(&self, record: &EventRecord, cx: &HandlerCx) -> Result<()> {
        send_event_log(
            cx,
            "Follow",
            &[format!("{} followed", record.from_user_or_default())],
        )
        .await
    }
}
