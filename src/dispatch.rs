use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::error::Result;
use crate::event::{EventKind, EventRecord};
use crate::handlers::HandlerCx;

/// Per-kind formatting/delivery logic. Handlers must be idempotent-safe:
/// the dedup layer gates entry, and the outbound guard gates each send, but
/// a handler may still be invoked for an event it has partially processed
/// on a previous delivery attempt.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, record: &EventRecord, cx: &HandlerCx) -> Result<()>;
}

/// Routes a classified record to its handler. Registration happens once at
/// startup; dispatch awaits the handler and contains its failures so one bad
/// event never stops the pipeline.
pub struct EventDispatcher {
    cx: HandlerCx,
    handlers: HashMap<EventKind, Box<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new(cx: HandlerCx) -> Self {
        EventDispatcher {
            cx,
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: EventKind, handler: Box<dyn EventHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub async fn dispatch(&self, record: &EventRecord) {
        // Audit logging, guarded to avoid serializing payloads when disabled.
        if tracing::event_enabled!(target: "relay_events", tracing::Level::DEBUG) {
            debug!(
                target: "relay_events",
                kind = record.kind.as_str(),
                from = record.from_user_or_default(),
                message = record.message.as_deref().unwrap_or(""),
                payload = %record.raw,
                "event"
            );
        }

        let Some(handler) = self.handlers.get(&record.kind) else {
            debug!(target: "relay_dispatch", kind = record.kind.as_str(), "no handler, dropped");
            self.cx.metrics.inc_unhandled();
            return;
        };
        match handler.handle(record, &self.cx).await {
            Ok(()) => self.cx.metrics.inc_dispatched(),
            Err(err) => {
                error!(
                    target: "relay_dispatch",
                    kind = record.kind.as_str(),
                    error = %err,
                    "handler failed"
                );
                self.cx.metrics.inc_handler_error();
            }
        }
    }
}
