use async_trait::async_trait;
use tracing::debug;

use crate::dispatch::EventHandler;
use crate::error::Result;
use crate::event::{AlertPlayingKind, EventRecord};

use super::HandlerCx;

/// On-screen alert notifications mirror events already relayed through their
/// own kinds; they are observed for diagnostics only.
pub struct AlertPlayingHandler;

#[async_trait]
impl EventHandler for AlertPlayingHandler {
    async fn handle(&self, record: &EventRecord, _cx: &HandlerCx) -> Result<()> {
        let alert = record
            .alert_playing_kind
            .unwrap_or(AlertPlayingKind::Unknown);
        debug!(
            target: "relay_dispatch",
            alert = ?alert,
            from = record.from_user_or_default(),
            "alert playing"
        );
        Ok(())
    }
}
