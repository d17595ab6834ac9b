use async_trait::async_trait;
use tracing::debug;

use crate::dispatch::EventHandler;
use crate::error::Result;
use crate::event::EventRecord;

use super::HandlerCx;

/// Feed housekeeping events (recent-events snapshots, session resets) carry
/// nothing to relay; they are acknowledged at debug level.
pub struct SystemEventHandler;

#[async_trait]
impl EventHandler for SystemEventHandler {
    async fn handle(&self, record: &EventRecord, _cx: &HandlerCx) -> Result<()> {
        debug!(target: "relay_dispatch", kind = record.kind.as_str(), "system event");
        Ok(())
    }
}
