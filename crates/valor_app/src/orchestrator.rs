use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};
use valor_domain::{
    extract_single_block, ArtifactKind, Error, ExecutionOutcome, Result, SandboxEnvironment,
    TestId, TestSession, TestStatus, ValidationId, ValidationSession,
};

use crate::{
    markdown, CompletionService, PromptTemplates, SandboxService, SessionLocks, SingleTestVars,
    ValidationRepository, SINGLE_TEST_GENERATION,
};

/// One submit/execute request. An absent `test_id` asks for a new test built
/// from `description`; a present `test_id` with `follow_up_message` asks for
/// a refinement round on the existing conversation.
#[derive(Debug, Clone)]
pub struct SubmitTest {
    pub validation_id: ValidationId,
    pub test_id: Option<TestId>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub follow_up_message: Option<String>,
}

impl SubmitTest {
    pub fn new(validation_id: ValidationId) -> Self {
        Self {
            validation_id,
            test_id: None,
            title: None,
            description: None,
            follow_up_message: None,
        }
    }
}

/// Drives the lifecycle of a single test:
/// draft -> generating -> executing -> completed, with executing -> failed
/// on errors and terminal -> generating re-entry for follow-up rounds.
///
/// A round commits atomically: either the success snapshot (code, results,
/// conversation) or the failure snapshot (conversation and error message,
/// previous results and code untouched). Nothing is persisted mid-round.
pub struct TestOrchestrator<C, S, R> {
    completion: Arc<C>,
    sandbox: Arc<S>,
    repository: Arc<R>,
    templates: Arc<PromptTemplates>,
    locks: Arc<SessionLocks>,
}

impl<C, S, R> TestOrchestrator<C, S, R>
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

    pub async fn submit(&self, request: SubmitTest) -> Result<TestSession> {
        let mut validation = self.repository.load(request.validation_id).await?;
        let environment = validation.sandbox.clone().ok_or_else(|| {
            Error::InvalidInput("validation has no execution environment".to_string())
        })?;

        let test_id = self.resolve_test(&mut validation, &request)?;

        // Single flight per test: a concurrent submit or follow-up on the
        // same test is rejected, siblings proceed independently.
        let _guard = self.locks.try_acquire_test(test_id)?;
        let mut test = validation.test(test_id)?.clone();

        let user_message = if let Some(follow_up) = &request.follow_up_message {
            if !test.can_follow_up() {
                return Err(Error::InvalidTransition {
                    from: test.status,
                    to: TestStatus::Generating,
                });
            }
            follow_up.clone()
        } else if test.can_submit() {
            self.generation_prompt(&validation, &environment, &test)
                .await?
        } else {
            return Err(Error::InvalidInput(
                "follow_up_message is required for an existing test".to_string(),
            ));
        };

        test.transition(TestStatus::Generating)?;
        test.conversation.add_user(user_message);

        let round = self.run_round(&validation, &environment, &mut test).await;

        if let Err(error) = &round {
            warn!(test = %test.id, %error, "Test round failed");
            test.record_failure(error.to_string());
        }

        // Commit against a fresh load so a sibling's concurrent commit is
        // never overwritten by this round's stale working copy. The lock
        // covers only this read-modify-write, not the provider or sandbox
        // calls above.
        let commit_guard = self.locks.lock_validation(validation.id).await;
        let mut fresh = self.repository.load(validation.id).await?;
        fresh.commit_test(test.clone());
        self.repository.save(&fresh).await?;
        drop(commit_guard);

        match round {
            Ok(()) => Ok(test),
            Err(error) => Err(error),
        }
    }

    /// Returns the id of the test this request addresses, creating a draft
    /// session when none is given.
    fn resolve_test(
        &self,
        validation: &mut ValidationSession,
        request: &SubmitTest,
    ) -> Result<TestId> {
        match request.test_id {
            Some(id) => {
                validation.test(id)?;
                if request.follow_up_message.is_none() && request.description.is_none() {
                    return Err(Error::InvalidInput(
                        "follow_up_message is required for an existing test".to_string(),
                    ));
                }
                Ok(id)
            }
            None => {
                let description = request
                    .description
                    .clone()
                    .filter(|description| !description.trim().is_empty())
                    .ok_or_else(|| {
                        Error::InvalidInput("description is required for a new test".to_string())
                    })?;
                let title = request
                    .title
                    .clone()
                    .filter(|title| !title.trim().is_empty())
                    .unwrap_or_else(|| default_title(&description));
                Ok(validation.add_test(TestSession::new(title, description)))
            }
        }
    }

    /// Runs generation and execution on the working copy. On success the
    /// copy carries the committed snapshot; any error leaves the caller to
    /// record the failure.
    async fn run_round(
        &self,
        validation: &ValidationSession,
        environment: &SandboxEnvironment,
        test: &mut TestSession,
    ) -> Result<()> {
        let response = self.completion.complete(&test.conversation).await?;
        test.conversation.add_assistant(&response);

        let block = extract_single_block(&response)?;
        test.transition(TestStatus::Executing)?;

        info!(test = %test.id, "Dispatching generated code to execution service");
        let outcome = self
            .sandbox
            .execute(&environment.execution_id, &block.code, &test.id.folder_name())
            .await?;

        if !outcome.succeeded() {
            return Err(Error::ExecutionCrashed(crash_message(&outcome)));
        }

        let results = self
            .collect_results(validation, environment, test.id, &outcome)
            .await;
        test.record_success(block.code, results);
        Ok(())
    }

    async fn generation_prompt(
        &self,
        validation: &ValidationSession,
        environment: &SandboxEnvironment,
        test: &TestSession,
    ) -> Result<String> {
        let documentation = self
            .repository
            .read_artifact_text(validation, ArtifactKind::Documentation)
            .await?
            .unwrap_or_default();
        let code = self
            .repository
            .read_artifact_text(validation, ArtifactKind::TrainingScript)
            .await?
            .unwrap_or_default();

        let artifact_path = |kind: ArtifactKind| {
            validation
                .artifacts
                .get(kind)
                .map(|artifact| {
                    environment
                        .directory
                        .join(&artifact.file_name)
                        .display()
                        .to_string()
                })
                .unwrap_or_default()
        };

        let vars = SingleTestVars {
            documentation,
            code,
            train_path: artifact_path(ArtifactKind::TrainingDataset),
            test_path: artifact_path(ArtifactKind::TestDataset),
            model_path: artifact_path(ArtifactKind::TrainedModel),
            output_folder: environment
                .directory
                .join(test.id.folder_name())
                .display()
                .to_string(),
            test_title: test.title.clone(),
            test_description: test.description.clone(),
        };

        self.templates.render(SINGLE_TEST_GENERATION, &vars)
    }

    /// Builds the result set from the execution's markdown files, caching
    /// each file and any referenced images locally. Caching problems are
    /// logged and skipped — they never fail a successful execution.
    async fn collect_results(
        &self,
        validation: &ValidationSession,
        environment: &SandboxEnvironment,
        test_id: TestId,
        outcome: &ExecutionOutcome,
    ) -> Vec<valor_domain::ResultFile> {
        let mut results = Vec::new();

        for file in outcome.markdown_files() {
            let content = self
                .localize_images(validation, environment, test_id, &file.content)
                .await;

            if let Err(error) = self
                .repository
                .cache_test_file(validation.id, test_id, &file.filename, content.as_bytes())
                .await
            {
                warn!(%error, filename = %file.filename, "Failed to cache result file");
            }

            results.push(valor_domain::ResultFile::new(&file.filename, content));
        }

        results
    }

    /// Fetches non-external images referenced by a markdown result from the
    /// execution service, caches them beside the test, and rewrites the
    /// references to the cached location. A failed fetch leaves the original
    /// reference in place.
    async fn localize_images(
        &self,
        validation: &ValidationSession,
        environment: &SandboxEnvironment,
        test_id: TestId,
        content: &str,
    ) -> String {
        let mut mapping = HashMap::new();

        for image in markdown::image_references(content) {
            if image.is_external() || mapping.contains_key(&image.path) {
                continue;
            }

            let remote = format!("{}/{}", test_id.folder_name(), image.path);
            let bytes = match self
                .sandbox
                .fetch_file(&environment.execution_id, &remote)
                .await
            {
                Ok(bytes) => bytes,
                Err(error) => {
                    warn!(%error, image = %image.path, "Failed to fetch image from execution service");
                    continue;
                }
            };

            let cached_name = format!("images/{}", image.path);
            match self
                .repository
                .cache_test_file(validation.id, test_id, &cached_name, &bytes)
                .await
            {
                Ok(_) => {
                    mapping.insert(
                        image.path.clone(),
                        format!(
                            "/test-images/{}/{}/images/{}",
                            validation.id,
                            test_id.folder_name(),
                            image.path
                        ),
                    );
                }
                Err(error) => {
                    warn!(%error, image = %image.path, "Failed to cache image");
                }
            }
        }

        markdown::rewrite_image_references(content, &mapping)
    }
}

fn default_title(description: &str) -> String {
    let first_line = description.lines().next().unwrap_or_default();
    first_line.chars().take(80).collect()
}

fn crash_message(outcome: &ExecutionOutcome) -> String {
    let stderr = outcome.stderr.trim();
    if stderr.is_empty() {
        format!("execution exited with code {}", outcome.exit_code)
    } else {
        stderr.to_string()
    }
}
