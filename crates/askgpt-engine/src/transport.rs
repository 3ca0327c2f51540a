use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Result};
use askgpt_contracts::messages::{ChatRequest, ChatResponse, ResponseFormat};
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{json, Value};

use crate::config::ClientConfig;

/// Sends one chat request and returns the raw response.
pub trait ChatTransport: Send + Sync {
    fn name(&self) -> &str;
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

#[derive(Default)]
pub struct TransportRegistry {
    transports: BTreeMap<String, Box<dyn ChatTransport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: ChatTransport + 'static>(&mut self, transport: T) {
        self.transports
            .insert(transport.name().to_string(), Box::new(transport));
    }

    pub fn get(&self, name: &str) -> Option<&dyn ChatTransport> {
        self.transports.get(name).map(|transport| transport.as_ref())
    }

    pub fn take(&mut self, name: &str) -> Option<Box<dyn ChatTransport>> {
        self.transports.remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.transports.keys().cloned().collect()
    }
}

pub fn default_transport_registry(config: &ClientConfig) -> Result<TransportRegistry> {
    let mut registry = TransportRegistry::new();
    registry.register(DryrunTransport);
    registry.register(OpenAiTransport::new(config.clone())?);
    Ok(registry)
}

/// Offline transport: answers deterministically from the last user message.
pub struct DryrunTransport;

impl ChatTransport for DryrunTransport {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let (question, images) = request
            .last_user_message()
            .map(|message| (message.text(), message.image_count()))
            .unwrap_or_default();
        let answer = match images {
            0 => format!("[dryrun {}] {}", request.model, question),
            n => format!("[dryrun {}] {} ({n} image(s))", request.model, question),
        };
        let content = match request.response_format {
            Some(ResponseFormat::JsonObject) => json!({ "answer": answer }).to_string(),
            _ => answer,
        };
        Ok(ChatResponse::from_assistant_text(&request.model, &content))
    }
}

pub struct OpenAiTransport {
    api_base: String,
    api_key: Option<String>,
    http: HttpClient,
}

impl OpenAiTransport {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let mut builder = HttpClient::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("failed to build HTTP client")?;
        Ok(Self {
            api_base: config.api_base,
            api_key: config.api_key,
            http,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }
}

impl ChatTransport for OpenAiTransport {
    fn name(&self) -> &str {
        "openai"
    }

    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("OPENAI_API_KEY is not set"))?;
        let endpoint = self.endpoint();
        let mut builder = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .header(CONTENT_TYPE, "application/json")
            .json(request);
        if request.is_stream() {
            builder = builder.header(ACCEPT, "text/event-stream");
        }
        let response = builder
            .send()
            .with_context(|| format!("OpenAI request failed ({endpoint})"))?;
        let body = response_text_or_error("OpenAI", response)?;
        if request.is_stream() {
            return aggregate_event_stream(&request.model, &body);
        }
        let parsed: Value =
            serde_json::from_str(&body).context("OpenAI returned invalid JSON payload")?;
        Ok(ChatResponse::new(parsed))
    }
}

fn response_text_or_error(provider: &str, response: HttpResponse) -> Result<String> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    Ok(body)
}

/// Folds a `text/event-stream` body into one completion-shaped response.
pub fn aggregate_event_stream(model: &str, body: &str) -> Result<ChatResponse> {
    let mut content = String::new();
    let mut chunks = 0u64;
    let mut id: Option<Value> = None;
    let mut finish_reason = Value::Null;

    for line in body.lines() {
        let Some(data) = line.trim().strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data == "[DONE]" {
            break;
        }
        let chunk: Value = serde_json::from_str(data)
            .with_context(|| format!("invalid stream chunk: {}", truncate_text(data, 120)))?;
        chunks += 1;
        if id.is_none() {
            id = chunk.get("id").cloned();
        }
        if let Some(delta) = chunk
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
        {
            content.push_str(delta);
        }
        if let Some(reason) = chunk
            .pointer("/choices/0/finish_reason")
            .filter(|value| !value.is_null())
        {
            finish_reason = reason.clone();
        }
    }

    if chunks == 0 {
        bail!("stream ended without any chunks");
    }

    Ok(ChatResponse::new(json!({
        "id": id.unwrap_or(Value::Null),
        "object": "chat.completion",
        "model": model,
        "streamed": true,
        "chunks": chunks,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": finish_reason,
        }],
    })))
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
