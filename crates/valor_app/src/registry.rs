use std::sync::Arc;

use tracing::info;
use valor_domain::{
    extract_single_block, ArtifactKind, ArtifactSet, ArtifactUpload, Conversation, Error,
    ReportSnapshot, Result, TestId, TestSession, TestSuggestion, ValidationId, ValidationSession,
};

use crate::{
    CompletionService, PromptTemplates, SandboxService, TestListVars, SessionLocks,
    ValidationRepository, TEST_LIST_GENERATION,
};

/// Owns the set of artifacts and tests belonging to one validation run:
/// creation, loading, test management and report aggregation. Artifacts are
/// immutable once created — there is deliberately no operation that changes
/// them.
pub struct ValidationRegistry<C, S, R> {
    completion: Arc<C>,
    sandbox: Arc<S>,
    repository: Arc<R>,
    templates: Arc<PromptTemplates>,
    locks: Arc<SessionLocks>,
}

impl<C, S, R> ValidationRegistry<C, S, R>
where
    C: CompletionService,
    S: SandboxService,
    R: ValidationRepository,
{
    pub fn new(
        completion: Arc<C>,
        sandbox: Arc<S>,
        repository: Arc<R>,
        templates: Arc<PromptTemplates>,
        locks: Arc<SessionLocks>,
    ) -> Self {
        Self {
            completion,
            sandbox,
            repository,
            templates,
            locks,
        }
    }

    /// Creates a validation from the uploaded artifacts: stores the files,
    /// provisions the execution environment with the binary inputs, and
    /// persists the session.
    pub async fn create(&self, uploads: Vec<ArtifactUpload>) -> Result<ValidationSession> {
        let mut validation = ValidationSession::new(ArtifactSet::new());
        info!(validation = %validation.id, artifacts = uploads.len(), "Creating validation");

        validation.artifacts = self
            .repository
            .store_artifacts(validation.id, &uploads)
            .await?;

        let execution_inputs: Vec<ArtifactUpload> = uploads
            .into_iter()
            .filter(|upload| upload.kind.is_execution_input())
            .collect();
        let environment = self.sandbox.create_environment(execution_inputs).await?;
        validation.sandbox = Some(environment);

        self.repository.save(&validation).await?;
        Ok(validation)
    }

    pub async fn load(&self, id: ValidationId) -> Result<ValidationSession> {
        self.repository.load(id).await
    }

    /// Registers a draft test. Generation starts only on submission.
    pub async fn add_test(
        &self,
        id: ValidationId,
        title: impl ToString,
        description: impl ToString,
    ) -> Result<TestSession> {
        let description = description.to_string();
        if description.trim().is_empty() {
            return Err(Error::InvalidInput(
                "description is required for a new test".to_string(),
            ));
        }

        let _commit = self.locks.lock_validation(id).await;
        let mut validation = self.repository.load(id).await?;
        let test = TestSession::new(title, description);
        validation.add_test(test.clone());
        self.repository.save(&validation).await?;
        Ok(test)
    }

    /// Deletes a test and its cached files. Rejected while the test has a
    /// transition in flight; siblings are unaffected.
    pub async fn delete_test(&self, id: ValidationId, test_id: TestId) -> Result<()> {
        let guard = self.locks.try_acquire_test(test_id)?;

        let _commit = self.locks.lock_validation(id).await;
        let mut validation = self.repository.load(id).await?;
        let removed = validation.remove_test(test_id)?;
        info!(validation = %id, test = %test_id, title = %removed.title, "Deleting test");

        self.repository.remove_test_files(id, test_id).await?;
        self.repository.save(&validation).await?;

        drop(guard);
        self.locks.release_test(test_id);
        Ok(())
    }

    pub async fn list_tests(&self, id: ValidationId) -> Result<Vec<TestSession>> {
        let validation = self.repository.load(id).await?;
        Ok(validation.list_tests().into_iter().cloned().collect())
    }

    /// Pure read over current stored state; never triggers generation or
    /// execution.
    pub async fn aggregate_for_report(&self, id: ValidationId) -> Result<ReportSnapshot> {
        let validation = self.repository.load(id).await?;
        Ok(ReportSnapshot::from(&validation))
    }

    /// Asks the LLM for candidate tests based on the documentation and
    /// training code.
    pub async fn generate_test_list(&self, id: ValidationId) -> Result<Vec<TestSuggestion>> {
        let validation = self.repository.load(id).await?;

        let documentation = self
            .repository
            .read_artifact_text(&validation, ArtifactKind::Documentation)
            .await?
            .unwrap_or_default();
        let code = self
            .repository
            .read_artifact_text(&validation, ArtifactKind::TrainingScript)
            .await?
            .unwrap_or_default();

        let prompt = self
            .templates
            .render(TEST_LIST_GENERATION, &TestListVars { documentation, code })?;

        let mut conversation = Conversation::new();
        conversation.add_user(prompt);
        let response = self.completion.complete(&conversation).await?;

        parse_suggestions(&response)
    }
}

/// The prompt asks for a bare JSON array, but models regularly wrap it in a
/// fence anyway; accept both before giving up.
fn parse_suggestions(response: &str) -> Result<Vec<TestSuggestion>> {
    if let Ok(suggestions) = serde_json::from_str(response) {
        return Ok(suggestions);
    }

    if let Ok(block) = extract_single_block(response)
        && let Ok(suggestions) = serde_json::from_str(&block.code)
    {
        return Ok(suggestions);
    }

    Err(Error::MalformedResponse(
        "test list is not a JSON array of suggestions".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use valor_domain::ExecutionOutcome;

    use super::*;
    use crate::test_support::{Harness, ASSISTANT_REPLY};
    use crate::SubmitTest;

    fn fixture_uploads() -> Vec<ArtifactUpload> {
        vec![
            ArtifactUpload::new(
                ArtifactKind::Documentation,
                "doc.md",
                "predicts default risk".as_bytes(),
            ),
            ArtifactUpload::new(ArtifactKind::TrainedModel, "model.pkl", vec![1, 2, 3]),
        ]
    }

    #[tokio::test]
    async fn test_create_provisions_environment_and_persists() {
        let harness = Harness::new();

        let actual = harness.registry().create(fixture_uploads()).await.unwrap();

        assert_eq!(actual.artifacts.len(), 2);
        assert!(actual.sandbox.is_some());

        let stored = harness.repository.load(actual.id).await.unwrap();
        assert_eq!(stored, actual);
    }

    #[tokio::test]
    async fn test_load_twice_returns_identical_snapshots() {
        let harness = Harness::new();
        let validation = harness.create_validation(fixture_uploads()).await;

        let registry = harness.registry();
        let first = registry.load(validation.id).await.unwrap();
        let second = registry.load(validation.id).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_load_unknown_validation_is_not_found() {
        let harness = Harness::new();

        let actual = harness.registry().load(ValidationId::generate()).await;
        assert!(matches!(actual, Err(Error::ValidationNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_removes_test_and_cached_files_only() {
        let harness = Harness::new();
        let validation = harness.create_validation(fixture_uploads()).await;
        let registry = harness.registry();

        let doomed = registry
            .add_test(validation.id, "Backtest", "backtest the model")
            .await
            .unwrap();
        let sibling = registry
            .add_test(validation.id, "Stability", "check PSI")
            .await
            .unwrap();

        registry.delete_test(validation.id, doomed.id).await.unwrap();

        let remaining = registry.list_tests(validation.id).await.unwrap();
        let actual: Vec<TestId> = remaining.iter().map(|test| test.id).collect();
        assert_eq!(actual, vec![sibling.id]);
        assert_eq!(harness.repository.removed_tests(), vec![doomed.id]);

        let snapshot = registry.aggregate_for_report(validation.id).await.unwrap();
        assert_eq!(snapshot.tests.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_test_is_not_found() {
        let harness = Harness::new();
        let validation = harness.create_validation(fixture_uploads()).await;

        let actual = harness
            .registry()
            .delete_test(validation.id, TestId::generate())
            .await;
        assert!(matches!(actual, Err(Error::TestNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_in_flight_test_is_busy() {
        let harness = Harness::new();
        let validation = harness.create_validation(fixture_uploads()).await;
        let test = harness
            .registry()
            .add_test(validation.id, "Backtest", "backtest the model")
            .await
            .unwrap();

        let _held = harness.locks.try_acquire_test(test.id).unwrap();

        let actual = harness.registry().delete_test(validation.id, test.id).await;
        assert!(matches!(actual, Err(Error::TestBusy(_))));
    }

    #[tokio::test]
    async fn test_aggregate_for_report_has_no_side_effects() {
        let harness = Harness::new();
        let validation = harness.create_validation(fixture_uploads()).await;
        harness
            .registry()
            .add_test(validation.id, "Backtest", "backtest the model")
            .await
            .unwrap();

        let snapshot = harness
            .registry()
            .aggregate_for_report(validation.id)
            .await
            .unwrap();

        assert_eq!(snapshot.tests.len(), 1);
        assert_eq!(harness.completion.call_count(), 0);
        assert_eq!(harness.sandbox.executed_folders().len(), 0);
    }

    #[tokio::test]
    async fn test_generate_test_list_accepts_fenced_json() {
        let harness = Harness::new();
        let validation = harness.create_validation(fixture_uploads()).await;
        harness.completion.push_reply(Ok(
            "```json\n[{\"title\":\"Backtest\",\"area\":\"performance\",\"description\":\"compare to history\"}]\n```"
                .to_string(),
        ));

        let actual = harness
            .registry()
            .generate_test_list(validation.id)
            .await
            .unwrap();

        assert_eq!(actual.len(), 1);
        assert_eq!(actual[0].title, "Backtest");
        assert_eq!(actual[0].area, "performance");
    }

    #[tokio::test]
    async fn test_generate_test_list_rejects_prose() {
        let harness = Harness::new();
        let validation = harness.create_validation(fixture_uploads()).await;
        harness
            .completion
            .push_reply(Ok("Sure! Here are some ideas.".to_string()));

        let actual = harness.registry().generate_test_list(validation.id).await;
        assert!(matches!(actual, Err(Error::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn test_failed_sibling_does_not_touch_other_tests() {
        let harness = Harness::new();
        let validation = harness.create_validation(fixture_uploads()).await;

        harness.completion.push_reply(Ok(ASSISTANT_REPLY.to_string()));
        harness.sandbox.push_outcome(Ok(ExecutionOutcome {
            files: vec![valor_domain::ResultFile::new("report.md", "# ok")],
            ..Default::default()
        }));
        let mut request = SubmitTest::new(validation.id);
        request.description = Some("first test".to_string());
        let healthy = harness.orchestrator().submit(request).await.unwrap();

        harness.completion.push_reply(Ok(ASSISTANT_REPLY.to_string()));
        harness.sandbox.push_outcome(Ok(ExecutionOutcome {
            exit_code: 1,
            stderr: "boom".to_string(),
            ..Default::default()
        }));
        let mut request = SubmitTest::new(validation.id);
        request.description = Some("second test".to_string());
        let actual = harness.orchestrator().submit(request).await;
        assert!(actual.is_err());

        let stored = harness.repository.load(validation.id).await.unwrap();
        let untouched = stored.test(healthy.id).unwrap();
        assert_eq!(untouched.status, valor_domain::TestStatus::Completed);
        assert_eq!(untouched.results, healthy.results);
    }
}
