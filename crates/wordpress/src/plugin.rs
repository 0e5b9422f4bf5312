use {
    async_trait::async_trait,
    hookgate_channels::{
        Error, InboundMessage, Platform, PluginConfig, Result, WebhookPlugin, error::Context,
    },
    hookgate_common::time::now_ms,
    serde::Deserialize,
    serde_json::Value,
    tracing::debug,
};

/// Body posted by the site widget.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetMessage {
    pub message: Option<String>,
    pub visitor_id: Option<String>,
    pub visitor_name: Option<String>,
    pub session_id: Option<String>,
    pub site_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WordPressSettings {
    /// Claim only messages from this site.
    pub site_url: Option<String>,
}

pub struct WordPressPlugin {
    config: PluginConfig,
    site_url: Option<String>,
}

impl WordPressPlugin {
    pub fn new(config: PluginConfig) -> Result<Self> {
        if config.platform != Platform::WordPress {
            return Err(Error::invalid_input(format!(
                "wordpress plugin cannot serve platform {}",
                config.platform
            )));
        }
        let settings: WordPressSettings = if config.settings.is_null() {
            WordPressSettings::default()
        } else {
            serde_json::from_value(config.settings.clone())?
        };
        Ok(Self {
            site_url: settings.site_url.as_deref().map(normalize_site_url),
            config,
        })
    }
}

/// Lowercase, without scheme, `www.` or trailing slash, so
/// `https://www.Example.com/` and `http://example.com` compare equal.
pub fn normalize_site_url(url: &str) -> String {
    let url = url.trim().to_ascii_lowercase();
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(&url);
    url.strip_prefix("www.")
        .unwrap_or(url)
        .trim_end_matches('/')
        .to_string()
}

#[async_trait]
impl WebhookPlugin for WordPressPlugin {
    fn config(&self) -> &PluginConfig {
        &self.config
    }

    async fn handle_webhook(&self, payload: &Value) -> Result<Option<InboundMessage>> {
        let body: WidgetMessage = serde_json::from_value(payload.clone())
            .context("malformed widget message")?;

        if let Some(expected) = &self.site_url {
            let received = body.site_url.as_deref().map(normalize_site_url);
            if received.as_deref() != Some(expected.as_str()) {
                debug!(plugin_id = %self.config.id, site_url = ?body.site_url, "message from another site");
                return Ok(None);
            }
        }
        let Some(text) = body.message.filter(|m| !m.trim().is_empty()) else {
            return Ok(None);
        };
        let sender_id = body
            .visitor_id
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "anonymous".into());

        Ok(Some(InboundMessage {
            platform: Platform::WordPress,
            plugin_id: self.config.id.clone(),
            conversation_id: body.session_id.or_else(|| Some(sender_id.clone())),
            sender_id,
            sender_name: body.visitor_name,
            text,
            received_at: now_ms(),
            raw: payload.clone(),
        }))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        hookgate_channels::{Credentials, PluginStatus},
        rstest::rstest,
        serde_json::json,
    };

    fn plugin(settings: Value) -> WordPressPlugin {
        WordPressPlugin::new(PluginConfig {
            id: "wp".into(),
            user_id: "u1".into(),
            platform: Platform::WordPress,
            name: "blog".into(),
            credentials: Credentials::default(),
            status: PluginStatus::Connected,
            settings,
            created_at: 0,
            updated_at: 0,
        })
        .unwrap()
    }

    #[rstest]
    #[case("https://www.Example.com/", "example.com")]
    #[case("http://example.com", "example.com")]
    #[case("example.com/shop/", "example.com/shop")]
    fn normalizes(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_site_url(input), expected);
    }

    #[tokio::test]
    async fn claims_visitor_message() {
        let msg = plugin(json!({}))
            .handle_webhook(&json!({
                "message": "Do you ship to Canada?",
                "visitorId": "v-1",
                "siteUrl": "https://shop.test",
                "platform": "wordpress"
            }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.text, "Do you ship to Canada?");
        assert_eq!(msg.sender_id, "v-1");
        assert_eq!(msg.conversation_id.as_deref(), Some("v-1"));
    }

    #[tokio::test]
    async fn site_filter() {
        let p = plugin(json!({"siteUrl": "https://shop.test/"}));
        let other = json!({"message": "hi", "siteUrl": "https://other.test"});
        let same = json!({"message": "hi", "siteUrl": "http://www.shop.test"});
        let missing = json!({"message": "hi"});
        assert!(p.handle_webhook(&other).await.unwrap().is_none());
        assert!(p.handle_webhook(&missing).await.unwrap().is_none());
        assert!(p.handle_webhook(&same).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_message_is_not_claimed() {
        let p = plugin(json!({}));
        assert!(p.handle_webhook(&json!({"message": ""})).await.unwrap().is_none());
        let anon = p.handle_webhook(&json!({"message": "yo"})).await.unwrap().unwrap();
        assert_eq!(anon.sender_id, "anonymous");
    }

    #[tokio::test]
    async fn non_object_payload_errors() {
        assert!(plugin(json!({})).handle_webhook(&json!("just text")).await.is_err());
    }
}
