//! Agent personas.

use serde::{Deserialize, Serialize};

/// A persona that executes jobs.
///
/// The persona contributes the system prompt and decides which backend
/// configuration (and optional fallback) its jobs run against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Display name
    pub name: String,

    /// Role title
    pub role: String,

    /// What the agent is trying to achieve
    #[serde(default)]
    pub goal: String,

    /// Background / expertise
    #[serde(default)]
    pub background: String,

    /// Key of the primary backend config
    pub backend: String,

    /// Key of the fallback backend config
    #[serde(default)]
    pub fallback_backend: Option<String>,
}

impl AgentProfile {
    /// Render the persona as a system prompt.
    pub fn system_prompt(&self) -> String {
        let mut prompt = format!("You are {}, {}.", self.name, self.role);
        if !self.goal.is_empty() {
            prompt.push_str(&format!("\nGoal: {}", self.goal));
        }
        if !self.background.is_empty() {
            prompt.push_str(&format!("\n\n{}", self.background.trim()));
        }
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_skips_empty_sections() {
        let agent = AgentProfile {
            name: "Use Case Analyst".to_string(),
            role: "Senior Business Analyst".to_string(),
            goal: String::new(),
            background: String::new(),
            backend: "primary".to_string(),
            fallback_backend: None,
        };

        assert_eq!(
            agent.system_prompt(),
            "You are Use Case Analyst, Senior Business Analyst."
        );
    }

    #[test]
    fn test_system_prompt_includes_goal_and_background() {
        let agent = AgentProfile {
            name: "Writer".to_string(),
            role: "Technical Writer".to_string(),
            goal: "Document the system".to_string(),
            background: "  Ten years of API docs.  ".to_string(),
            backend: "primary".to_string(),
            fallback_backend: Some("flash".to_string()),
        };

        let prompt = agent.system_prompt();
        assert!(prompt.contains("Goal: Document the system"));
        assert!(prompt.ends_with("Ten years of API docs."));
    }
}
