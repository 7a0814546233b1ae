//! Guided missions: an ordered terminal script the learner works through.
//!
//! ```yaml
//! id: first-airdrop
//! title: Fund a devnet wallet
//! steps:
//!   - id: keygen
//!     command: solana-keygen new
//!     expect_stdout: "pubkey:"
//!   - id: airdrop
//!     command: solana airdrop
//!     expect_exit_code: 0
//! ```
//!
//! Steps complete strictly in order. A line completes the current step when
//! its folded argv starts with the step's command, the exit code matches and
//! stdout contains the expected substring.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::commands::fold_prefix;
use crate::effects::{CommandResult, EXIT_OK};
use crate::tokenizer::tokenize;

/// Errors loading a mission script.
#[derive(Debug, thiserror::Error)]
pub enum MissionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid mission: {0}")]
    Invalid(String),
}

/// A mission script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mission {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub steps: Vec<ScriptStep>,
}

/// One objective inside a mission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStep {
    pub id: String,
    /// Command prefix the learner must type
    pub command: String,
    #[serde(default)]
    pub hint: Option<String>,
    /// Substring stdout must contain
    #[serde(default)]
    pub expect_stdout: Option<String>,
    #[serde(default = "default_exit_code")]
    pub expect_exit_code: i32,
}

fn default_exit_code() -> i32 {
    EXIT_OK
}

impl Mission {
    /// Parse a mission from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, MissionError> {
        let mission: Mission = serde_yaml::from_str(yaml)?;
        mission.validate()?;
        Ok(mission)
    }

    /// Load a mission file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MissionError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    fn validate(&self) -> Result<(), MissionError> {
        if self.steps.is_empty() {
            return Err(MissionError::Invalid(format!("mission {} has no steps", self.id)));
        }
        if let Some(step) = self.steps.iter().find(|s| s.command.trim().is_empty()) {
            return Err(MissionError::Invalid(format!("step {} has no command", step.id)));
        }
        Ok(())
    }
}

impl ScriptStep {
    /// Whether an executed line satisfies this step.
    pub fn matches(&self, line: &str, result: &CommandResult) -> bool {
        let typed = fold_prefix(&tokenize(line)).argv;
        let wanted = fold_prefix(&tokenize(&self.command)).argv;

        typed.starts_with(&wanted)
            && result.exit_code == self.expect_exit_code
            && self
                .expect_stdout
                .as_deref()
                .map(|needle| result.stdout.contains(needle))
                .unwrap_or(true)
    }
}

/// Event for collaborators tracking learner progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveCompleted {
    pub mission_id: String,
    pub step_id: String,
    /// Zero-based step index
    pub index: usize,
    pub mission_complete: bool,
}

/// Walks a mission as commands execute.
#[derive(Debug, Clone)]
pub struct MissionTracker {
    mission: Mission,
    next: usize,
}

impl MissionTracker {
    pub fn new(mission: Mission) -> Self {
        Self { mission, next: 0 }
    }

    pub fn mission(&self) -> &Mission {
        &self.mission
    }

    /// The step waiting to be completed.
    pub fn current(&self) -> Option<&ScriptStep> {
        self.mission.steps.get(self.next)
    }

    /// `(completed, total)`
    pub fn progress(&self) -> (usize, usize) {
        (self.next, self.mission.steps.len())
    }

    pub fn is_complete(&self) -> bool {
        self.next >= self.mission.steps.len()
    }

    /// Feed one executed line; returns the event when it completes the
    /// current step.
    pub fn observe(&mut self, line: &str, result: &CommandResult) -> Option<ObjectiveCompleted> {
        let step = self.current()?;
        if !step.matches(line, result) {
            return None;
        }

        let event = ObjectiveCompleted {
            mission_id: self.mission.id.clone(),
            step_id: step.id.clone(),
            index: self.next,
            mission_complete: self.next + 1 == self.mission.steps.len(),
        };
        self.next += 1;
        info!(mission = %event.mission_id, step = %event.step_id, "Objective completed");
        Some(event)
    }
}
