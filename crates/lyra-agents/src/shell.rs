//! Per-agent runtime state.

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::speaker::{SpeakContext, Speaker};
use lyra_core::{AgentId, Timestamp};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Who produced a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    /// Prompt fed to the agent.
    User,
    /// The agent's own response.
    Assistant,
}

/// One conversation-history entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Who produced the content.
    pub role: HistoryRole,
    /// The text.
    pub content: String,
    /// When it was recorded.
    pub timestamp: Timestamp,
}

/// Runtime shell around one agent.
///
/// Holds the mutable per-agent state the scheduler reads and writes:
/// reputation in `[0, 1]` (default 1.0), response-time samples, and the
/// conversation history. The text production itself is delegated to the
/// boxed [`Speaker`].
pub struct AgentShell {
    config: AgentConfig,
    speaker: Box<dyn Speaker>,
    reputation: RwLock<f64>,
    response_times: Mutex<Vec<f64>>,
    history: Mutex<Vec<HistoryEntry>>,
}

impl AgentShell {
    /// Creates a shell with full reputation.
    #[must_use]
    pub fn new(config: AgentConfig, speaker: Box<dyn Speaker>) -> Self {
        Self {
            config,
            speaker,
            reputation: RwLock::new(1.0),
            response_times: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// The agent's stable identity.
    #[must_use]
    pub fn id(&self) -> &AgentId {
        &self.config.id
    }

    /// The agent's static configuration.
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Current reputation in `[0, 1]`.
    #[must_use]
    pub fn reputation(&self) -> f64 {
        *self.reputation.read()
    }

    /// Adjusts reputation by `delta`, clamping to `[0, 1]`. Returns the new
    /// value.
    pub fn adjust_reputation(&self, delta: f64) -> f64 {
        let mut reputation = self.reputation.write();
        *reputation = (*reputation + delta).clamp(0.0, 1.0);
        debug!(agent_id = %self.config.id, reputation = *reputation, "adjusted reputation");
        *reputation
    }

    /// Produces a response to `prompt`, recording history and the response
    /// time.
    ///
    /// # Errors
    ///
    /// Propagates the speaker's failure; the caller decides how it affects
    /// reputation.
    pub async fn speak(&self, prompt: &str) -> Result<String, AgentError> {
        let started = Instant::now();

        let result = {
            let history = self.history.lock().clone();
            let context = SpeakContext {
                system_prompt: self.config.system_prompt.as_deref(),
                history: &history,
            };
            self.speaker.speak(prompt, context).await
        };

        self.response_times
            .lock()
            .push(started.elapsed().as_secs_f64());

        let response = result?;
        {
            let mut history = self.history.lock();
            history.push(HistoryEntry {
                role: HistoryRole::User,
                content: prompt.to_string(),
                timestamp: Timestamp::now(),
            });
            history.push(HistoryEntry {
                role: HistoryRole::Assistant,
                content: response.clone(),
                timestamp: Timestamp::now(),
            });
        }
        Ok(response)
    }

    /// Recorded response times in seconds, oldest first.
    #[must_use]
    pub fn response_times(&self) -> Vec<f64> {
        self.response_times.lock().clone()
    }

    /// Conversation history snapshot, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.lock().clone()
    }

    /// Interrupt priority for a prompt this shell wants to preempt on:
    /// the configured threshold base, raised for urgency language and
    /// capped at 100.
    #[must_use]
    pub fn interrupt_priority(&self, prompt: &str) -> f64 {
        let mut priority = f64::from(self.config.interrupt_threshold);
        let lowered = prompt.to_lowercase();
        if ["urgent", "critical", "emergency"]
            .iter()
            .any(|kw| lowered.contains(kw))
        {
            priority += 10.0;
        }
        priority.min(100.0)
    }
}

impl std::fmt::Debug for AgentShell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentShell")
            .field("id", &self.config.id)
            .field("reputation", &self.reputation())
            .finish_non_exhaustive()
    }
}
