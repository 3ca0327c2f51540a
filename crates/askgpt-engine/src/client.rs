use anyhow::Result;
use askgpt_contracts::memo::{stable_key, CacheStats, Memoized};
use askgpt_contracts::messages::{ChatMessage, ChatOptions, ChatRequest, ChatResponse};

use crate::transport::ChatTransport;

/// Chat calls through an injected transport. Each call is memoized by its
/// arguments for the lifetime of the client, so repeating a call does not
/// reach the network again.
pub struct ChatClient {
    transport: Box<dyn ChatTransport>,
    simple_calls: Memoized<ChatRequest, ChatResponse>,
    configured_calls: Memoized<ChatOptions, ChatResponse>,
}

impl ChatClient {
    pub fn new(transport: Box<dyn ChatTransport>) -> Self {
        Self {
            transport,
            simple_calls: Memoized::new("chat", |request| stable_key(request)),
            configured_calls: Memoized::new("chat_with", |options: &ChatOptions| {
                options.validate()?;
                stable_key(options)
            }),
        }
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Whether `chat(model, messages)` would be answered from the cache.
    pub fn is_cached(&self, model: &str, messages: &[ChatMessage]) -> bool {
        self.simple_calls.contains(&ChatRequest::new(model, messages.to_vec()))
    }

    /// Model plus messages, nothing else. Errors propagate untouched.
    pub fn chat(&mut self, model: &str, messages: &[ChatMessage]) -> Result<ChatResponse> {
        let request = ChatRequest::new(model, messages.to_vec());
        let transport = &self.transport;
        self.simple_calls.call(&request, |request| {
            log::debug!(
                "sending chat request to {} ({} message(s))",
                transport.name(),
                request.messages.len()
            );
            transport.complete(request)
        })
    }

    /// System message, history, response format, streaming and temperature
    /// under caller control.
    pub fn chat_with(&mut self, options: &ChatOptions) -> Result<ChatResponse> {
        let transport = &self.transport;
        self.configured_calls.call(options, |options| {
            let request = ChatRequest::configured(options);
            log::debug!(
                "sending configured chat request to {} (format={}, stream={})",
                transport.name(),
                options.response_format.as_str(),
                options.stream
            );
            transport.complete(&request)
        })
    }

    pub fn stats(&self) -> CacheStats {
        let simple = self.simple_calls.stats();
        let configured = self.configured_calls.stats();
        CacheStats {
            hits: simple.hits + configured.hits,
            misses: simple.misses + configured.misses,
        }
    }
}
