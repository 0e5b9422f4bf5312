use {
    serde::Deserialize,
    serde_json::Value,
};

/// Interaction kinds Discord posts to the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionType {
    Ping,
    ApplicationCommand,
    MessageComponent,
    Autocomplete,
    ModalSubmit,
    Unknown(u8),
}

impl From<u8> for InteractionType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Ping,
            2 => Self::ApplicationCommand,
            3 => Self::MessageComponent,
            4 => Self::Autocomplete,
            5 => Self::ModalSubmit,
            other => Self::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Interaction {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub application_id: Option<String>,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    pub data: Option<InteractionData>,
    /// Set for interactions inside a guild.
    pub member: Option<Member>,
    /// Set for interactions in DMs.
    pub user: Option<User>,
}

impl Interaction {
    pub fn interaction_type(&self) -> InteractionType {
        self.kind.into()
    }

    pub fn author(&self) -> Option<&User> {
        self.member
            .as_ref()
            .and_then(|m| m.user.as_ref())
            .or(self.user.as_ref())
    }

    /// Text form of the interaction: `/name opt opt` for commands, the
    /// custom ID for components, submitted values for modals.
    pub fn text(&self) -> Option<String> {
        let data = self.data.as_ref()?;
        let text = match self.interaction_type() {
            InteractionType::ApplicationCommand => {
                let mut parts = vec![format!("/{}", data.name.as_deref()?)];
                collect_option_values(&data.options, &mut parts);
                parts.join(" ")
            },
            InteractionType::MessageComponent => data.custom_id.clone()?,
            InteractionType::ModalSubmit => data
                .components
                .iter()
                .flat_map(|row| row.components.iter())
                .filter_map(|c| c.value.clone())
                .collect::<Vec<_>>()
                .join("\n"),
            _ => return None,
        };
        (!text.trim().is_empty()).then_some(text)
    }
}

fn collect_option_values(options: &[CommandOption], out: &mut Vec<String>) {
    for option in options {
        match &option.value {
            Some(Value::String(s)) => out.push(s.clone()),
            Some(other) => out.push(other.to_string()),
            None => {
                // subcommand or group
                out.push(option.name.clone());
                collect_option_values(&option.options, out);
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InteractionData {
    pub name: Option<String>,
    #[serde(default)]
    pub options: Vec<CommandOption>,
    pub custom_id: Option<String>,
    #[serde(default)]
    pub components: Vec<ActionRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandOption {
    pub name: String,
    pub value: Option<Value>,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionRow {
    #[serde(default)]
    pub components: Vec<ModalComponent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModalComponent {
    pub value: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Member {
    pub user: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
    pub global_name: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.global_name.as_deref().unwrap_or(&self.username)
    }
}

/// Whether a raw payload is Discord's endpoint-validation PING.
pub fn is_ping(payload: &Value) -> bool {
    payload.get("type").and_then(Value::as_u64) == Some(1)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, serde_json::json};

    fn parse(v: Value) -> Interaction {
        serde_json::from_value(v).unwrap()
    }

    #[rstest]
    #[case(json!({"type": 1}), true)]
    #[case(json!({"type": 2}), false)]
    #[case(json!({"type": "1"}), false)]
    #[case(json!({}), false)]
    fn ping_detection(#[case] payload: Value, #[case] expected: bool) {
        assert_eq!(is_ping(&payload), expected);
    }

    #[test]
    fn command_text_with_nested_options() {
        let i = parse(json!({
            "type": 2,
            "data": {"name": "ask", "options": [
                {"name": "topic", "options": [{"name": "q", "value": "refund policy"}]},
                {"name": "n", "value": 3}
            ]}
        }));
        assert_eq!(i.text().unwrap(), "/ask topic refund policy 3");
    }

    #[test]
    fn component_and_modal_text() {
        let component = parse(json!({"type": 3, "data": {"custom_id": "btn_yes"}}));
        assert_eq!(component.text().unwrap(), "btn_yes");

        let modal = parse(json!({"type": 5, "data": {"components": [
            {"components": [{"value": "first"}]},
            {"components": [{"value": "second"}]}
        ]}}));
        assert_eq!(modal.text().unwrap(), "first\nsecond");
    }

    #[test]
    fn author_prefers_member() {
        let i = parse(json!({
            "type": 2,
            "member": {"user": {"id": "1", "username": "guild"}},
            "user": {"id": "2", "username": "dm"}
        }));
        assert_eq!(i.author().unwrap().id, "1");
    }
}
