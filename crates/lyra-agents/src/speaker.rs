//! Speaker backends: how an agent turns a prompt into a response.

use crate::error::AgentError;
use crate::shell::HistoryEntry;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// Context handed to a speaker alongside the prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeakContext<'a> {
    /// The agent's system prompt, if configured.
    pub system_prompt: Option<&'a str>,
    /// Conversation history so far, oldest first.
    pub history: &'a [HistoryEntry],
}

/// Produces a response for a prompt.
///
/// Implementations are the only place where agent "intelligence" lives;
/// everything else in the runtime treats responses as opaque text.
#[async_trait]
pub trait Speaker: Send + Sync {
    /// Generates a response to `prompt`.
    async fn speak(&self, prompt: &str, context: SpeakContext<'_>) -> Result<String, AgentError>;
}

/// Request body sent to an inference endpoint.
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
}

/// Response body from an inference endpoint.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Default request timeout against the inference endpoint.
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Speaker backed by an HTTP inference endpoint.
///
/// Posts `{model, prompt, system, stream: false}` to
/// `{endpoint}/api/generate` and returns the `response` field.
pub struct HttpSpeaker {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl HttpSpeaker {
    /// Creates a speaker for the given endpoint and model.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Result<Self, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl Speaker for HttpSpeaker {
    async fn speak(&self, prompt: &str, context: SpeakContext<'_>) -> Result<String, AgentError> {
        let url = format!("{}/api/generate", self.endpoint);
        debug!(url = %url, model = %self.model, "sending generate request");

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            system: context.system_prompt,
            stream: false,
        };

        let response = self.client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(AgentError::Backend(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AgentError::MalformedReply(e.to_string()))?;
        Ok(body.response)
    }
}

/// Deterministic speaker for tests and simulated runs.
///
/// Replies from a scripted queue when one is set, otherwise with a themed
/// line derived from the agent's name and specialty. Delay and failure are
/// configurable so scheduler timeout paths can be exercised.
pub struct MockSpeaker {
    name: String,
    specialty: Option<String>,
    delay: Duration,
    fail: bool,
    script: Mutex<VecDeque<String>>,
}

impl MockSpeaker {
    /// Creates a mock speaker replying as `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            specialty: None,
            delay: Duration::ZERO,
            fail: false,
            script: Mutex::new(VecDeque::new()),
        }
    }

    /// Sets the specialty referenced in themed replies.
    #[must_use]
    pub fn with_specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialty = Some(specialty.into());
        self
    }

    /// Adds a fixed delay before every reply.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes every call fail with a backend error.
    #[must_use]
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Queues scripted replies, consumed in order before themed ones.
    #[must_use]
    pub fn with_script<I, S>(self, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script
            .lock()
            .extend(replies.into_iter().map(Into::into));
        self
    }

    fn themed_reply(&self, prompt: &str) -> String {
        let tail: Vec<&str> = prompt.split_whitespace().rev().take(6).collect();
        let reference: String = tail
            .into_iter()
            .rev()
            .collect::<Vec<_>>()
            .join(" ");
        match &self.specialty {
            Some(specialty) => format!(
                "As {}, drawing on {}, here is my take on \"{}\".",
                self.name, specialty, reference
            ),
            None => format!("As {}, here is my take on \"{}\".", self.name, reference),
        }
    }
}

#[async_trait]
impl Speaker for MockSpeaker {
    async fn speak(&self, prompt: &str, _context: SpeakContext<'_>) -> Result<String, AgentError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(AgentError::Backend("simulated backend failure".to_string()));
        }
        if let Some(scripted) = self.script.lock().pop_front() {
            return Ok(scripted);
        }
        Ok(self.themed_reply(prompt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_themed_reply_references_prompt() {
        let speaker = MockSpeaker::new("lens").with_specialty("pattern_recognition");
        let reply = speaker
            .speak("please analyze the quarterly numbers", SpeakContext::default())
            .await
            .unwrap();
        assert!(reply.contains("lens"));
        assert!(reply.contains("pattern_recognition"));
        assert!(reply.contains("quarterly numbers"));
    }

    #[tokio::test]
    async fn mock_script_takes_precedence() {
        let speaker = MockSpeaker::new("otto").with_script(["first", "second"]);
        assert_eq!(
            speaker.speak("x", SpeakContext::default()).await.unwrap(),
            "first"
        );
        assert_eq!(
            speaker.speak("x", SpeakContext::default()).await.unwrap(),
            "second"
        );
        // Script exhausted: falls back to themed replies.
        assert!(speaker
            .speak("x", SpeakContext::default())
            .await
            .unwrap()
            .contains("otto"));
    }

    #[tokio::test]
    async fn mock_failure() {
        let speaker = MockSpeaker::new("core").failing();
        let err = speaker.speak("x", SpeakContext::default()).await.unwrap_err();
        assert!(matches!(err, AgentError::Backend(_)));
    }
}
