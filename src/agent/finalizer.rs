//! Terminal answer post-processing.
//!
//! Memory always holds the native-language text of a turn. Translation only
//! changes what the caller sees, and it is best effort: any failure falls
//! back to the untranslated text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::memory::{ConversationMemory, MemoryError};
use crate::llm::{LlmClient, Message, ModelReply};

/// Language marker meaning "no translation".
pub const NATIVE_LANGUAGE_MARKER: &str = "native";

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, target_language: &str) -> anyhow::Result<String>;
}

/// Translation through a one-shot, tool-free model call.
pub struct LlmTranslator {
    llm: Arc<dyn LlmClient>,
    timeout: Option<Duration>,
}

impl LlmTranslator {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Option<Duration>) -> Self {
        Self { llm, timeout }
    }
}

#[async_trait]
impl Translator for LlmTranslator {
    async fn translate(&self, text: &str, target_language: &str) -> anyhow::Result<String> {
        let messages = [
            Message::system(format!(
                "You are a professional translator. Translate the user's text into {}. \
                 Reply with the translation only.",
                target_language
            )),
            Message::user(text),
        ];

        let call = self.llm.complete(&messages, &[]);
        let reply = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| anyhow::anyhow!("translation timed out after {:?}", limit))??,
            None => call.await?,
        };

        match reply {
            ModelReply::Final(translated) if !translated.trim().is_empty() => Ok(translated),
            ModelReply::Final(_) => Err(anyhow::anyhow!("translation came back empty")),
            ModelReply::ToolRequests { .. } => Err(anyhow::anyhow!("translator requested tool calls")),
        }
    }
}

/// Translates inbound questions and outbound answers, and commits turns.
pub struct ResponseFinalizer {
    translator: Option<Arc<dyn Translator>>,
    native_language: String,
}

impl ResponseFinalizer {
    pub fn new(translator: Option<Arc<dyn Translator>>, native_language: impl Into<String>) -> Self {
        Self {
            translator,
            native_language: native_language.into(),
        }
    }

    pub fn native_language(&self) -> &str {
        &self.native_language
    }

    /// Whether `language` asks for something other than the native language.
    pub fn needs_translation(&self, language: &str) -> bool {
        let language = language.trim();
        !(language.is_empty()
            || language.eq_ignore_ascii_case(NATIVE_LANGUAGE_MARKER)
            || language.eq_ignore_ascii_case(&self.native_language))
    }

    /// Bring a question into the native language. Falls back to the original.
    pub async fn translate_inbound(&self, question: &str, language: &str) -> String {
        if !self.needs_translation(language) {
            return question.to_string();
        }
        self.translate_or_keep(question, &self.native_language).await
    }

    /// Translate the answer for the caller, then commit the turn.
    ///
    /// `turn` holds the question and scratch messages; the untranslated
    /// answer is appended after them. Returns the caller-visible answer.
    pub async fn finalize(
        &self,
        memory: &dyn ConversationMemory,
        session_id: &str,
        mut turn: Vec<Message>,
        answer: String,
        language: &str,
    ) -> Result<String, MemoryError> {
        let visible = if self.needs_translation(language) {
            self.translate_or_keep(&answer, language).await
        } else {
            answer.clone()
        };

        turn.push(Message::assistant(answer));
        memory.append_many(session_id, turn).await?;
        Ok(visible)
    }

    async fn translate_or_keep(&self, text: &str, target_language: &str) -> String {
        let Some(translator) = &self.translator else {
            tracing::warn!("Translation to {} requested but no translator is configured", target_language);
            return text.to_string();
        };
        match translator.translate(text, target_language).await {
            Ok(translated) => translated,
            Err(e) => {
                tracing::warn!("Translation to {} failed, keeping original: {:#}", target_language, e);
                text.to_string()
            }
        }
    }
}
