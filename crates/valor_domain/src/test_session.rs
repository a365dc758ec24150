use chrono::{DateTime, Utc};
use derive_more::derive::Display;
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use strum_macros::EnumString;
use uuid::Uuid;

use crate::{Conversation, Error, Result, ResultFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestId(Uuid);

impl TestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: impl ToString) -> Result<Self> {
        Ok(Self(Uuid::parse_str(&value.to_string())?))
    }

    pub fn into_string(&self) -> String {
        self.0.to_string()
    }

    /// Name of the working folder this test writes its outputs under, both
    /// in the execution environment and in the local cache.
    pub fn folder_name(&self) -> String {
        format!("test_{}", self.0)
    }
}

/// Lifecycle states of a test. `Generating` and `Executing` only exist on
/// the in-flight working copy; persisted sessions are always `Draft`,
/// `Completed` or `Failed`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TestStatus {
    #[default]
    Draft,
    Generating,
    Executing,
    Completed,
    Failed,
}

impl TestStatus {
    /// Legal transitions: draft -> generating -> executing -> completed,
    /// executing -> failed, and completed|failed -> generating for
    /// follow-up or retry rounds.
    pub fn can_transition_to(self, next: TestStatus) -> bool {
        matches!(
            (self, next),
            (TestStatus::Draft, TestStatus::Generating)
                | (TestStatus::Generating, TestStatus::Executing)
                | (TestStatus::Generating, TestStatus::Failed)
                | (TestStatus::Executing, TestStatus::Completed)
                | (TestStatus::Executing, TestStatus::Failed)
                | (TestStatus::Completed, TestStatus::Generating)
                | (TestStatus::Failed, TestStatus::Generating)
        )
    }

    pub fn is_in_flight(self) -> bool {
        matches!(self, TestStatus::Generating | TestStatus::Executing)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TestStatus::Completed | TestStatus::Failed)
    }
}

/// One LLM-generated-and-executed check against the model artifacts, with
/// its own conversation and result history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into, strip_option)]
pub struct TestSession {
    pub id: TestId,
    pub title: String,
    pub description: String,
    /// Code of the last successful execution. A failed round does not
    /// overwrite it; the attempted code stays reviewable in `conversation`.
    #[serde(default)]
    pub generated_code: Option<String>,
    #[serde(default)]
    pub conversation: Conversation,
    /// Results of the last successful execution.
    #[serde(default)]
    pub results: Vec<ResultFile>,
    #[serde(default)]
    pub status: TestStatus,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TestSession {
    pub fn new(title: impl ToString, description: impl ToString) -> Self {
        let now = Utc::now();
        Self {
            id: TestId::generate(),
            title: title.to_string(),
            description: description.to_string(),
            generated_code: None,
            conversation: Conversation::new(),
            results: Vec::new(),
            status: TestStatus::Draft,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, next: TestStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Commits a successful round: code and results now reflect this
    /// execution, any previous error is cleared.
    pub fn record_success(&mut self, code: impl ToString, results: Vec<ResultFile>) {
        self.generated_code = Some(code.to_string());
        self.results = results;
        self.error = None;
        self.status = TestStatus::Completed;
        self.touch();
    }

    /// Commits a failed round: the previous successful code and results are
    /// preserved, only the status and error message change.
    pub fn record_failure(&mut self, message: impl ToString) {
        self.error = Some(message.to_string());
        self.status = TestStatus::Failed;
        self.touch();
    }

    /// A test accepts an initial submission only before its first round.
    pub fn can_submit(&self) -> bool {
        self.status == TestStatus::Draft
    }

    /// Follow-up refinement re-enters the cycle from either terminal state.
    pub fn can_follow_up(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn can_delete(&self) -> bool {
        !self.status.is_in_flight()
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
