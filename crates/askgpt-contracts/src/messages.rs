use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One typed fragment of a message body.
///
/// Serializes to the chat-completions wire shape:
/// `{"type": "text", "text": ...}` or
/// `{"type": "image_url", "image_url": {"url": ...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl From<&str> for MessageContent {
    fn from(value: &str) -> Self {
        MessageContent::Text(value.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(value: String) -> Self {
        MessageContent::Text(value)
    }
}

impl From<Vec<ContentPart>> for MessageContent {
    fn from(value: Vec<ContentPart>) -> Self {
        MessageContent::Parts(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Concatenated text of the message, ignoring image parts.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| match part {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<&str>>()
                .join("\n"),
        }
    }

    pub fn image_count(&self) -> usize {
        match &self.content {
            MessageContent::Text(_) => 0,
            MessageContent::Parts(parts) => parts
                .iter()
                .filter(|part| matches!(part, ContentPart::ImageUrl { .. }))
                .count(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    JsonObject,
}

impl ResponseFormat {
    /// `"text"` selects free text; any other tag selects the JSON contract.
    pub fn from_tag(tag: &str) -> Self {
        if tag == "text" {
            ResponseFormat::Text
        } else {
            ResponseFormat::JsonObject
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseFormat::Text => "text",
            ResponseFormat::JsonObject => "json_object",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

impl ChatRequest {
    /// Bare request: model and messages only, everything else left to the
    /// service defaults.
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            response_format: None,
            temperature: None,
            stream: None,
        }
    }

    /// Request for the configurable call. A missing or empty history starts a
    /// new conversation, seeded with the system message when one is given;
    /// the user message always goes last.
    pub fn configured(options: &ChatOptions) -> Self {
        let mut messages = match &options.messages {
            Some(history) if !history.is_empty() => history.clone(),
            _ => {
                let mut fresh = Vec::new();
                if let Some(system) = options
                    .system_message
                    .as_deref()
                    .filter(|value| !value.is_empty())
                {
                    fresh.push(ChatMessage::system(system));
                }
                fresh
            }
        };
        messages.push(ChatMessage::user(options.message.clone()));

        Self {
            model: options.model.clone(),
            messages,
            response_format: Some(options.response_format),
            temperature: Some(options.temperature),
            stream: Some(options.stream),
        }
    }

    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    pub fn last_user_message(&self) -> Option<&ChatMessage> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == Role::User)
    }
}

/// Arguments of the configurable chat call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    pub model: String,
    pub message: MessageContent,
    #[serde(default)]
    pub response_format: ResponseFormat,
    pub system_message: Option<String>,
    pub messages: Option<Vec<ChatMessage>>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub temperature: f64,
}

impl ChatOptions {
    pub fn new(model: impl Into<String>, message: impl Into<MessageContent>) -> Self {
        Self {
            model: model.into(),
            message: message.into(),
            response_format: ResponseFormat::Text,
            system_message: None,
            messages: None,
            stream: false,
            temperature: 0.0,
        }
    }

    pub fn with_response_format(mut self, response_format: ResponseFormat) -> Self {
        self.response_format = response_format;
        self
    }

    pub fn with_system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = Some(system_message.into());
        self
    }

    pub fn with_history(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Rejects options the wire format cannot carry faithfully: JSON has no
    /// NaN or infinity, so those temperatures would all serialize as `null`.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.temperature.is_finite() {
            anyhow::bail!("temperature must be a finite number (got {})", self.temperature);
        }
        Ok(())
    }
}

/// Raw response body from the chat service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatResponse {
    body: Value,
}

impl ChatResponse {
    pub fn new(body: Value) -> Self {
        Self { body }
    }

    /// Completion-shaped body holding a single assistant answer.
    pub fn from_assistant_text(model: &str, text: &str) -> Self {
        Self::new(json!({
            "object": "chat.completion",
            "model": model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop",
            }],
        }))
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn first_choice_text(&self) -> anyhow::Result<String> {
        self.body
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("chat response has no choices[0].message.content"))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn content_parts_serialize_to_wire_shape() -> anyhow::Result<()> {
        let message = ChatMessage::user(vec![
            ContentPart::image_url("data:image/png;base64,AAAA"),
            ContentPart::text("Describe"),
        ]);
        assert_eq!(
            serde_json::to_value(&message)?,
            json!({
                "role": "user",
                "content": [
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}},
                    {"type": "text", "text": "Describe"},
                ]
            })
        );
        Ok(())
    }

    #[test]
    fn bare_request_omits_optional_fields() -> anyhow::Result<()> {
        let request = ChatRequest::new("gpt-4-turbo", vec![ChatMessage::user("hi")]);
        assert_eq!(
            serde_json::to_value(&request)?,
            json!({
                "model": "gpt-4-turbo",
                "messages": [{"role": "user", "content": "hi"}],
            })
        );
        Ok(())
    }

    #[test]
    fn configured_request_seeds_system_message() -> anyhow::Result<()> {
        let options = ChatOptions::new("gpt-4o", "List three colors")
            .with_system_message("Answer in JSON")
            .with_response_format(ResponseFormat::from_tag("json"));
        let request = ChatRequest::configured(&options);
        assert_eq!(
            serde_json::to_value(&request)?,
            json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "Answer in JSON"},
                    {"role": "user", "content": "List three colors"},
                ],
                "response_format": {"type": "json_object"},
                "temperature": 0.0,
                "stream": false,
            })
        );
        Ok(())
    }

    #[test]
    fn configured_request_appends_to_history_and_skips_system_message() {
        let history = vec![
            ChatMessage::system("be terse"),
            ChatMessage::user("first"),
            ChatMessage::assistant("reply"),
        ];
        let options = ChatOptions::new("gpt-4o", "second")
            .with_system_message("ignored")
            .with_history(history.clone());
        let request = ChatRequest::configured(&options);
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[..3], history[..]);
        assert_eq!(request.messages[3], ChatMessage::user("second"));
    }

    #[test]
    fn configured_request_treats_empty_history_as_new_conversation() {
        let options = ChatOptions::new("gpt-4o", "hello").with_history(Vec::new());
        let request = ChatRequest::configured(&options);
        assert_eq!(request.messages, vec![ChatMessage::user("hello")]);
        assert_eq!(request.response_format, Some(ResponseFormat::Text));
    }

    #[test]
    fn options_reject_non_finite_temperature() {
        assert!(ChatOptions::new("m", "hi").with_temperature(0.7).validate().is_ok());
        for temperature in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let options = ChatOptions::new("m", "hi").with_temperature(temperature);
            assert!(options.validate().is_err());
        }
    }

    #[test]
    fn first_choice_text_reads_message_content() -> anyhow::Result<()> {
        let response = ChatResponse::from_assistant_text("m", "4");
        assert_eq!(response.first_choice_text()?, "4");

        let empty = ChatResponse::new(json!({"choices": []}));
        assert!(empty.first_choice_text().is_err());
        Ok(())
    }

    #[test]
    fn message_text_skips_image_parts() {
        let message = ChatMessage::user(vec![
            ContentPart::image_url("data:image/jpeg;base64,AA"),
            ContentPart::text("what is this"),
        ]);
        assert_eq!(message.text(), "what is this");
        assert_eq!(message.image_count(), 1);
    }
}
