//! Table-driven handler used by the replay command.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use crate::core::QuizHandler;
use crate::protocol::{Assessment, Question};

/// Placeholder replaced by the team name in scripted answers.
pub const TEAM_PLACEHOLDER: &str = "{team}";

/// Answers file layout:
///
/// ```yaml
/// answers:
///   team-registration: "{team}"
///   ping: pong
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnswerScript {
    #[serde(default)]
    pub answers: HashMap<String, String>,
}

impl AnswerScript {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read answers file {}", path.display()))?;
        let script = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse answers file {}", path.display()))?;
        Ok(script)
    }
}

/// Answers questions by category; unknown categories are declined.
#[derive(Debug, Clone)]
pub struct ScriptedHandler {
    team_name: String,
    script: AnswerScript,
}

impl ScriptedHandler {
    pub fn new(team_name: impl Into<String>, script: AnswerScript) -> Self {
        Self {
            team_name: team_name.into(),
            script,
        }
    }
}

#[async_trait]
impl QuizHandler for ScriptedHandler {
    async fn handle_question(&self, question: &Question) -> Result<Option<String>> {
        Ok(self
            .script
            .answers
            .get(&question.category)
            .map(|answer| answer.replace(TEAM_PLACEHOLDER, &self.team_name)))
    }

    async fn handle_assessment(&self, assessment: &Assessment) -> Result<()> {
        if assessment.status.is_correct() {
            tracing::info!("Answer {} in '{}' was correct", assessment.answer_id, assessment.category);
        } else {
            tracing::warn!("Answer {} in '{}' was wrong", assessment.answer_id, assessment.category);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(category: &str) -> Question {
        Question {
            id: "Q1".to_string(),
            category: category.to_string(),
            question: "?".to_string(),
            answer_format: None,
            documentation: None,
        }
    }

    #[tokio::test]
    async fn test_scripted_answers() {
        let script: AnswerScript =
            serde_yaml::from_str("answers:\n  team-registration: \"{team}\"\n  ping: pong\n").unwrap();
        let handler = ScriptedHandler::new("blue", script);

        let registration = handler.handle_question(&question("team-registration")).await.unwrap();
        assert_eq!(registration.as_deref(), Some("blue"));
        assert_eq!(handler.handle_question(&question("ping")).await.unwrap().as_deref(), Some("pong"));
        assert!(handler.handle_question(&question("history")).await.unwrap().is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AnswerScript::load(&dir.path().join("nope.yaml")).is_err());
    }
}
