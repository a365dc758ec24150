use std::path::PathBuf;

use valor_domain::{
    ArtifactKind, ArtifactSet, ArtifactUpload, Conversation, ExecutionId, ExecutionOutcome,
    Result, SandboxEnvironment, TestId, ValidationId, ValidationSession,
};

/// Sends a conversation to the configured LLM provider and returns the next
/// assistant message as plain text. Stateless — the full history is passed
/// on every call.
#[async_trait::async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, conversation: &Conversation) -> Result<String>;
}

/// Boundary to the isolated execution service. Each validation gets one
/// environment holding its artifacts; each test execution runs against a
/// fresh interpreter in that environment, with no state leaking between
/// executions.
#[async_trait::async_trait]
pub trait SandboxService: Send + Sync {
    /// Creates an environment and uploads the given artifacts into its
    /// working directory.
    async fn create_environment(
        &self,
        artifacts: Vec<ArtifactUpload>,
    ) -> Result<SandboxEnvironment>;

    /// Runs the code and returns captured output plus a manifest of the
    /// files produced under `output_folder` (markdown content inlined).
    async fn execute(
        &self,
        execution_id: &ExecutionId,
        code: &str,
        output_folder: &str,
    ) -> Result<ExecutionOutcome>;

    /// Retrieves a file produced by an execution, for local caching.
    async fn fetch_file(&self, execution_id: &ExecutionId, path: &str) -> Result<Vec<u8>>;
}

/// Persistence boundary for validations, their artifact files and cached
/// test outputs. Sessions are written whole — callers commit a complete
/// snapshot, never a partial update.
#[async_trait::async_trait]
pub trait ValidationRepository: Send + Sync {
    async fn save(&self, validation: &ValidationSession) -> Result<()>;

    /// Fails with `ValidationNotFound` if the id is unknown.
    async fn load(&self, id: ValidationId) -> Result<ValidationSession>;

    /// Writes uploaded artifact bytes into the validation's folder and
    /// returns the stored references.
    async fn store_artifacts(
        &self,
        id: ValidationId,
        uploads: &[ArtifactUpload],
    ) -> Result<ArtifactSet>;

    /// Reads a text artifact (documentation, training script) back for
    /// prompt substitution. Absent artifacts read as `None`.
    async fn read_artifact_text(
        &self,
        validation: &ValidationSession,
        kind: ArtifactKind,
    ) -> Result<Option<String>>;

    /// Caches one file under the test's local folder and returns its path.
    async fn cache_test_file(
        &self,
        id: ValidationId,
        test_id: TestId,
        filename: &str,
        content: &[u8],
    ) -> Result<PathBuf>;

    /// Removes the test's cached folder. Missing folders are not an error.
    async fn remove_test_files(&self, id: ValidationId, test_id: TestId) -> Result<()>;
}
