//! Static agent configuration.

use lyra_core::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default interrupt-threshold base when the bootstrap record omits one.
pub const DEFAULT_INTERRUPT_THRESHOLD: u8 = 80;

/// Static configuration of an agent, resolved from the bootstrap record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Stable identity.
    pub id: AgentId,
    /// Model the agent's worker runs.
    pub model: String,
    /// Role tag, e.g. `orchestrator` or `legal`.
    #[serde(default)]
    pub role: Option<String>,
    /// Specialty tag, e.g. `task_routing`.
    #[serde(default)]
    pub specialty: Option<String>,
    /// System prompt prepended to the agent's turns.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Specialty keywords that let this agent self-preempt.
    #[serde(default)]
    pub interrupt_keywords: Vec<String>,
    /// Base interrupt priority (0-100).
    #[serde(default = "default_interrupt_threshold")]
    pub interrupt_threshold: u8,
    /// Whether boot waits for this agent's READY.
    #[serde(default = "default_required")]
    pub required: bool,
    /// Inference endpoint for the network-backed speaker.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Extra bootstrap-record fields, preserved verbatim.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_interrupt_threshold() -> u8 {
    DEFAULT_INTERRUPT_THRESHOLD
}

fn default_required() -> bool {
    true
}

impl AgentConfig {
    /// Creates a minimal configuration with defaults for everything but
    /// identity and model.
    #[must_use]
    pub fn new(id: impl Into<AgentId>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            role: None,
            specialty: None,
            system_prompt: None,
            interrupt_keywords: Vec::new(),
            interrupt_threshold: DEFAULT_INTERRUPT_THRESHOLD,
            required: true,
            endpoint: None,
            metadata: HashMap::new(),
        }
    }

    /// Sets the role tag.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Sets the specialty tag.
    #[must_use]
    pub fn with_specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialty = Some(specialty.into());
        self
    }

    /// Sets the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the specialty interrupt keywords.
    #[must_use]
    pub fn with_interrupt_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interrupt_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Returns true if the prompt contains one of this agent's specialty
    /// keywords (case-insensitive).
    #[must_use]
    pub fn matches_specialty(&self, prompt: &str) -> bool {
        let lowered = prompt.to_lowercase();
        self.interrupt_keywords
            .iter()
            .any(|kw| lowered.contains(&kw.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn config_defaults() {
        let config = AgentConfig::new("lyra", "llama3");
        assert_eq!(config.interrupt_threshold, DEFAULT_INTERRUPT_THRESHOLD);
        assert!(config.required);
        assert!(config.interrupt_keywords.is_empty());
    }

    #[test]
    fn config_from_yaml_entry() {
        let yaml = r"
id: sentinel
model: llama3
role: security
specialty: safety_protocols
interrupt_threshold: 90
interrupt_keywords: [breach, threat]
required: false
";
        let config: AgentConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.id, "sentinel");
        assert_eq!(config.interrupt_threshold, 90);
        assert!(!config.required);
        assert_eq!(config.interrupt_keywords.len(), 2);
    }

    #[test]
    fn specialty_matching_is_case_insensitive() {
        let config =
            AgentConfig::new("sentinel", "llama3").with_interrupt_keywords(["Breach", "threat"]);
        assert!(config.matches_specialty("possible BREACH detected"));
        assert!(config.matches_specialty("new threat surface"));
        assert!(!config.matches_specialty("routine status report"));
    }
}
