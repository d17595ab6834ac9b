use std::sync::Arc;

use rust_decimal::Decimal;

use crate::config::Config;
use crate::dedup::OutboundGuard;
use crate::dispatch::EventDispatcher;
use crate::error::Result;
use crate::event::EventKind;
use crate::metrics::Metrics;
use crate::sink::{ChannelId, NotificationSink, RichMessage};

mod alert_playing;
mod bits;
mod donation;
mod follow;
mod host;
mod media_share;
mod raid;
mod sub_gift;
mod subscription;
mod system;

pub use alert_playing::AlertPlayingHandler;
pub use bits::BitDonationHandler;
pub use donation::DonationHandler;
pub use follow::FollowHandler;
pub use host::HostHandler;
pub use media_share::MediaShareHandler;
pub use raid::RaidHandler;
pub use sub_gift::SubscriptionGiftHandler;
pub use subscription::SubscriptionHandler;
pub use system::SystemEventHandler;

/// "Equal to or greater than" notification thresholds.
pub struct Thresholds {
    pub large_donation: Decimal,
    pub large_bits: i64,
    pub large_sub_gift: i64,
    pub long_sub_months: i64,
    pub large_raid: i64,
}

/// Destination channel per category; 0 disables the category.
pub struct Channels {
    pub event_log: ChannelId,
    pub media_share: ChannelId,
    pub subs_donations: ChannelId,
}

/// Shared state handed to every handler invocation.
pub struct HandlerCx {
    pub sink: Arc<dyn NotificationSink>,
    pub channels: Channels,
    pub thresholds: Thresholds,
    pub outbound: OutboundGuard,
    pub metrics: Metrics,
}

/// Build the startup registry: one handler per classified kind. Kinds
/// without an entry (and `Unknown`) are dropped by the dispatcher.
pub fn build_dispatcher(cx: HandlerCx) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new(cx);
    dispatcher.register(EventKind::Donation, Box::new(DonationHandler));
    dispatcher.register(EventKind::BitDonation, Box::new(BitDonationHandler));
    dispatcher.register(EventKind::Subscription, Box::new(SubscriptionHandler));
    dispatcher.register(EventKind::ReSubscription, Box::new(SubscriptionHandler));
    dispatcher.register(EventKind::SubscriptionGift, Box::new(SubscriptionGiftHandler));
    dispatcher.register(EventKind::Follow, Box::new(FollowHandler));
    dispatcher.register(EventKind::Raid, Box::new(RaidHandler));
    dispatcher.register(EventKind::Host, Box::new(HostHandler));
    dispatcher.register(EventKind::MediaShare, Box::new(MediaShareHandler));
    dispatcher.register(EventKind::AlertPlaying, Box::new(AlertPlayingHandler));
    dispatcher.register(EventKind::RecentEvents, Box::new(SystemEventHandler));
    dispatcher.register(EventKind::SessionReset, Box::new(SystemEventHandler));
    dispatcher
}

pub fn cx_from_config(
    cfg: &Config,
    sink: Arc<dyn NotificationSink>,
    outbound: OutboundGuard,
    metrics: Metrics,
) -> HandlerCx {
    HandlerCx {
        sink,
        channels: Channels {
            event_log: cfg.event_log_channel,
            media_share: cfg.media_share_channel,
            subs_donations: cfg.subs_donations_channel,
        },
        thresholds: Thresholds {
            large_donation: Decimal::from(cfg.large_donation),
            large_bits: cfg.large_bits,
            large_sub_gift: cfg.large_sub_gift,
            long_sub_months: cfg.long_sub_months,
            large_raid: cfg.large_raid,
        },
        outbound,
        metrics,
    }
}

/// Send to the subs-and-donations channel, unless the category is disabled
/// or the exact text already went out within the window.
pub(crate) async fn send_sub_or_donation(cx: &HandlerCx, text: &str) -> Result<()> {
    if cx.channels.subs_donations == 0 {
        return Ok(());
    }
    if !cx.outbound.first_send(text) {
        return Ok(());
    }
    cx.sink.send_plain(cx.channels.subs_donations, text).await?;
    cx.metrics.inc_sent();
    Ok(())
}

/// Send a detail block to the event log channel. Lines are joined and
/// wrapped in a code block under a bullet title.
pub(crate) async fn send_event_log(cx: &HandlerCx, title: &str, lines: &[String]) -> Result<()> {
    if cx.channels.event_log == 0 {
        return Ok(());
    }
    let body = lines.join("\n");
    if !cx.outbound.first_send(&format!("{} {}", title, body)) {
        return Ok(());
    }
    let text = format!("● {}```\n{}```", title, body);
    cx.sink.send_plain(cx.channels.event_log, &text).await?;
    cx.metrics.inc_sent();
    Ok(())
}

/// Send a rich message to the media share channel, deduplicated on the
/// (donor, message, amount) triple rather than the rendered embed.
pub(crate) async fn send_media_share(
    cx: &HandlerCx,
    from: &str,
    message: &str,
    amount: &str,
    rich: &RichMessage,
) -> Result<()> {
    if cx.channels.media_share == 0 {
        return Ok(());
    }
    if !cx.outbound.first_send_parts(from, message, amount) {
        return Ok(());
    }
    cx.sink.send_rich(cx.channels.media_share, rich).await?;
    cx.metrics.inc_sent();
    Ok(())
}

/// Format a count with thousands separators ("1234567" -> "1,234,567").
pub(crate) fn format_count(n: i64) -> String {
    let digits = n.abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    let offset = digits.len() % 3;
    for (i, c) in digits.chars().enumerate() {
        if i != 0 && (i + 3 - offset) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// "<no message>" style placeholder used in event log blocks.
pub(crate) fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.is_empty() {
        placeholder
    } else {
        value
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::RecordingSink;

    #[test]
    fn counts_gain_thousands_separators() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1000), "1,000");
        assert_eq!(format_count(1234567), "1,234,567");
        assert_eq!(format_count(-45678), "-45,678");
    }

    #[tokio::test]
    async fn disabled_category_sends_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let cx = testing::cx_disabled(sink.clone());
        send_sub_or_donation(&cx, "**alice** donated").await.unwrap();
        send_event_log(&cx, "Title", &["line".to_string()]).await.unwrap();
        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn repeated_outbound_text_is_suppressed() {
        let sink = Arc::new(RecordingSink::default());
        let cx = testing::cx(sink.clone());
        send_sub_or_donation(&cx, "**alice** donated").await.unwrap();
        send_sub_or_donation(&cx, "**alice** donated").await.unwrap();
        assert_eq!(sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn event_log_wraps_lines_in_code_block() {
        let sink = Arc::new(RecordingSink::default());
        let cx = testing::cx(sink.clone());
        send_event_log(&cx, "Feed Donation", &["alice".to_string(), "$5.00".to_string()])
            .await
            .unwrap();
        let texts = sink.plain_texts();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0], "● Feed Donation```\nalice\n$5.00```");
    }
}
