use std::collections::HashSet;
use std::path::PathBuf;

use anyhow::Result;
use askgpt_contracts::events::{EventKind, EventPayload, EventWriter};
use askgpt_contracts::images::{image_data_url, MimeLabeling, UploadedImage};
use askgpt_contracts::memo::{bytes_key, stable_key, CacheKey, CacheStats, Memoized};
use askgpt_contracts::messages::{ChatMessage, ChatOptions, ChatResponse};
use askgpt_contracts::payload::messages_from_data_urls;
use askgpt_contracts::qa_log::{
    archive_file_name, DiskWrite, QaLog, WriteMode, DEFAULT_QA_DIR,
};
use serde_json::{json, Value};

use crate::client::ChatClient;
use crate::transport::ChatTransport;

pub const DEFAULT_MODEL: &str = "gpt-4-turbo";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Processing,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub model: String,
    pub qa_dir: PathBuf,
    pub labeling: MimeLabeling,
    pub archive_images: bool,
    pub events_path: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            qa_dir: PathBuf::from(DEFAULT_QA_DIR),
            labeling: MimeLabeling::default(),
            archive_images: false,
            events_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
    pub log_path: PathBuf,
    pub archived: Vec<PathBuf>,
}

type PayloadArgs = (String, Vec<String>);

/// One user's question/answer session.
///
/// `submit` runs build -> call -> display -> log in order, blocking on each
/// step. Every step is memoized for the life of the session.
pub struct AskSession {
    client: ChatClient,
    log: QaLog,
    model: String,
    labeling: MimeLabeling,
    archive_images: bool,
    state: SessionState,
    events: Option<EventWriter>,
    encoded_images: Memoized<UploadedImage, String>,
    payloads: Memoized<PayloadArgs, Vec<ChatMessage>>,
    archive_names: Memoized<UploadedImage, String>,
    archive_taken: HashSet<String>,
    writes: Memoized<DiskWrite, ()>,
}

impl AskSession {
    pub fn new(transport: Box<dyn ChatTransport>, options: SessionOptions) -> Result<Self> {
        let events = options.events_path.as_ref().map(|path| {
            EventWriter::new(path.clone(), uuid::Uuid::new_v4().to_string())
        });
        let session = Self {
            client: ChatClient::new(transport),
            log: QaLog::new(options.qa_dir),
            model: options.model,
            labeling: options.labeling,
            archive_images: options.archive_images,
            state: SessionState::Idle,
            events,
            encoded_images: Memoized::new("encode_image", |image: &UploadedImage| {
                Ok(bytes_key(&image.bytes))
            }),
            payloads: Memoized::new("make_messages", |args| stable_key(args)),
            archive_names: Memoized::new("archive_file_name", upload_key),
            archive_taken: HashSet::new(),
            writes: Memoized::new("write_to_disk", |write: &DiskWrite| Ok(write.cache_key())),
        };
        session.emit(
            EventKind::SessionStarted,
            json!({
                "model": session.model,
                "transport": session.client.transport_name(),
                "qa_dir": session.log.dir().to_string_lossy(),
            }),
        )?;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn qa_log(&self) -> &QaLog {
        &self.log
    }

    pub fn cache_stats(&self) -> CacheStats {
        let mut total = self.client.stats();
        for stats in [
            self.encoded_images.stats(),
            self.payloads.stats(),
            self.archive_names.stats(),
            self.writes.stats(),
        ] {
            total.hits += stats.hits;
            total.misses += stats.misses;
        }
        total
    }

    pub fn submit(&mut self, question: &str, images: &[UploadedImage]) -> Result<Answer> {
        self.submit_with(question, images, |_| {})
    }

    /// Like [`submit`](Self::submit), calling `display` with the answer
    /// before it is logged. The session is back to `Idle` when this returns,
    /// whether or not a step failed.
    pub fn submit_with(
        &mut self,
        question: &str,
        images: &[UploadedImage],
        display: impl FnOnce(&str),
    ) -> Result<Answer> {
        self.state = SessionState::Processing;
        let result = self.process(question, images, display);
        self.state = SessionState::Idle;

        if let Err(err) = &result {
            let payload = json!({"error": format!("{err:#}"), "model": self.model});
            if let Err(emit_err) = self.emit(EventKind::RequestFailed, payload) {
                log::warn!("failed to record request failure: {emit_err:#}");
            }
        }
        result
    }

    /// The configurable call, for callers outside the interactive flow.
    pub fn ask_with(&mut self, options: &ChatOptions) -> Result<ChatResponse> {
        self.client.chat_with(options)
    }

    fn process(
        &mut self,
        question: &str,
        images: &[UploadedImage],
        display: impl FnOnce(&str),
    ) -> Result<Answer> {
        log::info!(
            "submitting question ({} chars, {} image(s)) to {}",
            question.chars().count(),
            images.len(),
            self.model
        );
        let messages = self.build_payload(question, images)?;
        let model = self.model.clone();
        let cached = self.client.is_cached(&model, &messages);
        if !cached {
            self.emit(
                EventKind::RequestSent,
                json!({
                    "model": model,
                    "images": images.len(),
                    "question_chars": question.chars().count(),
                }),
            )?;
        }
        let response = self.client.chat(&model, &messages)?;
        let text = response.first_choice_text()?;
        self.emit(
            EventKind::ResponseReceived,
            json!({
                "model": model,
                "response_id": response.body().get("id").cloned().unwrap_or(Value::Null),
                "answer_chars": text.chars().count(),
                "cached": cached,
            }),
        )?;
        display(&text);

        let log_path = self.write_log(question, &text)?;
        let archived = if self.archive_images {
            self.archive(images)?
        } else {
            Vec::new()
        };

        Ok(Answer {
            text,
            log_path,
            archived,
        })
    }

    fn build_payload(
        &mut self,
        question: &str,
        images: &[UploadedImage],
    ) -> Result<Vec<ChatMessage>> {
        let labeling = self.labeling;
        let mut urls = Vec::with_capacity(images.len());
        for image in images {
            let url = self
                .encoded_images
                .call(image, |image| Ok::<_, anyhow::Error>(image_data_url(image, labeling)))?;
            urls.push(url);
        }
        self.payloads
            .call(&(question.to_string(), urls), |(question, urls)| {
                Ok(messages_from_data_urls(question, urls))
            })
    }

    fn write_log(&mut self, question: &str, answer: &str) -> Result<PathBuf> {
        let record = self.log.record_for(question, answer);
        self.writes.call(&record.to_write(), DiskWrite::apply)?;
        log::info!("wrote {}", record.path.display());
        self.emit(
            EventKind::QaLogged,
            json!({"path": record.path.to_string_lossy()}),
        )?;
        Ok(record.path)
    }

    /// Copies each image to a timestamped file in the log directory. Names
    /// are unique per session, so uploads sharing a file name never collide.
    fn archive(&mut self, images: &[UploadedImage]) -> Result<Vec<PathBuf>> {
        let mut archived = Vec::with_capacity(images.len());
        for image in images {
            let taken = &mut self.archive_taken;
            let name = self.archive_names.call(image, |image| {
                let mut now = chrono::Local::now();
                let mut name = archive_file_name(&image.name, now);
                while taken.contains(&name) {
                    now += chrono::Duration::microseconds(1);
                    name = archive_file_name(&image.name, now);
                }
                taken.insert(name.clone());
                Ok(name)
            })?;
            let copy = DiskWrite {
                path: self.log.dir().join(name),
                mode: WriteMode::Truncate,
                data: image.bytes.clone(),
            };
            self.writes.call(&copy, DiskWrite::apply)?;
            archived.push(copy.path);
        }
        Ok(archived)
    }

    fn emit(&self, kind: EventKind, payload: Value) -> Result<()> {
        let Some(events) = &self.events else {
            return Ok(());
        };
        let payload: EventPayload = payload.as_object().cloned().unwrap_or_default();
        events.emit(kind, payload)?;
        Ok(())
    }
}

/// Upload name plus content, so same-named uploads keep separate archives.
fn upload_key(image: &UploadedImage) -> Result<CacheKey> {
    let name = image.name.as_bytes();
    let mut raw = Vec::with_capacity(8 + name.len() + image.bytes.len());
    raw.extend_from_slice(&(name.len() as u64).to_le_bytes());
    raw.extend_from_slice(name);
    raw.extend_from_slice(&image.bytes);
    Ok(bytes_key(&raw))
}
