use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use valor_domain::{
    ArtifactKind, Message, ResultFile, Role, TestSession, TestStatus, ValidationSession,
};

/// One uploaded artifact in a create-validation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactPayload {
    pub kind: ArtifactKind,
    pub file_name: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateValidationRequest {
    pub artifacts: Vec<ArtifactPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateValidationResponse {
    pub validation_id: String,
    pub execution_id: Option<String>,
}

/// Stored artifact references of a loaded validation, keyed by artifact
/// kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationView {
    pub validation_id: String,
    pub execution_id: Option<String>,
    pub files: BTreeMap<String, String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&ValidationSession> for ValidationView {
    fn from(validation: &ValidationSession) -> Self {
        Self {
            validation_id: validation.id.into_string(),
            execution_id: validation
                .execution_id()
                .map(|execution_id| execution_id.as_str().to_string()),
            files: validation
                .artifacts
                .iter()
                .map(|(kind, artifact)| (kind.to_string(), artifact.file_name.clone()))
                .collect(),
            created_at: validation.created_at.to_rfc3339(),
            updated_at: validation.updated_at.to_rfc3339(),
        }
    }
}

/// One test as seen by the client: its authored fields, the rendered
/// generation prompt, and the state of the last round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestView {
    pub test_id: String,
    pub title: String,
    pub description: String,
    pub prompt: String,
    pub results: Vec<ResultFile>,
    pub code: Option<String>,
    pub conversation: Vec<Message>,
    pub status: TestStatus,
    pub error: Option<String>,
}

impl From<&TestSession> for TestView {
    fn from(test: &TestSession) -> Self {
        let prompt = test
            .conversation
            .messages
            .iter()
            .find(|message| message.role == Role::User)
            .map(|message| message.content.clone())
            .unwrap_or_default();

        Self {
            test_id: test.id.into_string(),
            title: test.title.clone(),
            description: test.description.clone(),
            prompt,
            results: test.results.clone(),
            code: test.generated_code.clone(),
            conversation: test.conversation.messages.clone(),
            status: test.status,
            error: test.error.clone(),
        }
    }
}

/// Submit/execute request. `test_id` absent means initial generation
/// (description required); present with `follow_up_message` means a
/// refinement round.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitTestRequest {
    pub validation_id: String,
    #[serde(default)]
    pub test_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub follow_up_message: Option<String>,
}
