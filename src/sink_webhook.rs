use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{RelayError, Result};
use crate::sink::{ChannelId, MessageId, NotificationSink, RichMessage};

/// Delivers messages over per-channel webhook URLs. Each send is a JSON POST;
/// the response id is returned when the endpoint reports one.
pub struct WebhookSink {
    client: reqwest::Client,
    routes: HashMap<ChannelId, String>,
}

impl WebhookSink {
    pub fn new(routes: Vec<(ChannelId, String)>) -> Result<Self> {
        if routes.is_empty() {
            return Err(RelayError::config(
                "webhook sink selected but WEBHOOK_ROUTES is empty",
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RelayError::sink(format!("building http client: {}", e)))?;
        Ok(WebhookSink {
            client,
            routes: routes.into_iter().collect(),
        })
    }

    fn route(&self, channel: ChannelId) -> Result<&str> {
        self.routes
            .get(&channel)
            .map(|s| s.as_str())
            .ok_or_else(|| RelayError::sink(format!("no webhook route for channel {}", channel)))
    }

    async fn post(&self, url: &str, body: Value) -> Result<MessageId> {
        let response = self
            .client
            .post(url)
            .query(&[("wait", "true")])
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::sink(format!("webhook send: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::sink(format!(
                "webhook returned {}",
                status.as_u16()
            )));
        }

        let message_id = response
            .json::<Value>()
            .await
            .ok()
            .as_ref()
            .and_then(|v| v.get("id"))
            .and_then(|id| id.as_str().and_then(|s| s.parse().ok()).or_else(|| id.as_u64()))
            .unwrap_or(0);
        debug!(target: "relay_sink", message_id, "webhook delivered");
        Ok(message_id)
    }
}

pub fn render_embed(message: &RichMessage) -> Value {
    let (r, g, b) = message.color.rgb();
    let mut embed = serde_json::Map::new();
    embed.insert(
        "color".to_string(),
        json!(((r as u32) << 16) | ((g as u32) << 8) | b as u32),
    );
    if let Some(title) = &message.title {
        embed.insert("title".to_string(), json!(title));
    }
    if let Some(url) = &message.url {
        embed.insert("url".to_string(), json!(url));
    }
    if message.author_name.is_some() || message.author_url.is_some() {
        embed.insert(
            "author".to_string(),
            json!({
                "name": message.author_name.as_deref().unwrap_or(""),
                "url": message.author_url,
            }),
        );
    }
    if let Some(image_url) = &message.image_url {
        embed.insert("image".to_string(), json!({ "url": image_url }));
    }
    if !message.fields.is_empty() {
        let fields: Vec<Value> = message
            .fields
            .iter()
            .map(|(name, value, inline)| json!({"name": name, "value": value, "inline": inline}))
            .collect();
        embed.insert("fields".to_string(), json!(fields));
    }
    if let Some(footer) = &message.footer {
        embed.insert("footer".to_string(), json!({ "text": footer }));
    }
    Value::Object(embed)
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send_plain(&self, channel: ChannelId, text: &str) -> Result<MessageId> {
        let url = self.route(channel)?;
        self.post(url, json!({ "content": text })).await
    }

    async fn send_rich(&self, channel: ChannelId, message: &RichMessage) -> Result<MessageId> {
        let url = self.route(channel)?;
        self.post(url, json!({ "embeds": [render_embed(message)] }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ColorTag;

    #[test]
    fn missing_route_is_a_sink_error() {
        let sink = WebhookSink::new(vec![(1, "https://hooks.example/a".to_string())]).unwrap();
        assert!(sink.route(1).is_ok());
        assert!(sink.route(2).is_err());
    }

    #[test]
    fn empty_route_table_is_rejected_up_front() {
        assert!(WebhookSink::new(Vec::new()).is_err());
    }

    #[test]
    fn embed_rendering_packs_color_and_fields() {
        let message = RichMessage {
            title: Some("A Song".to_string()),
            url: Some("https://www.youtube.com/watch?v=abc".to_string()),
            author_name: Some("Some Channel".to_string()),
            author_url: None,
            image_url: Some("https://thumbs.example/t.jpg".to_string()),
            fields: vec![("Views".to_string(), "1,234".to_string(), true)],
            footer: Some("Donated 5 minutes ago".to_string()),
            color: ColorTag::Media,
        };
        let embed = render_embed(&message);
        assert_eq!(embed["color"], 0xFF0000);
        assert_eq!(embed["title"], "A Song");
        assert_eq!(embed["image"]["url"], "https://thumbs.example/t.jpg");
        assert_eq!(embed["fields"][0]["name"], "Views");
        assert_eq!(embed["fields"][0]["inline"], true);
        assert_eq!(embed["footer"]["text"], "Donated 5 minutes ago");
    }
}
