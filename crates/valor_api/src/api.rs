use std::sync::Arc;

use tracing::info;
use valor_app::{
    render_report_markdown, CompletionService, PromptTemplates, SandboxService, SubmitTest,
    SessionLocks, TestOrchestrator, ValidationRegistry, ValidationRepository,
};
use valor_domain::{
    ArtifactUpload, Environment, ReportSnapshot, Result, TestId, TestSuggestion, ValidationId,
};
use valor_infra::{
    FileValidationRepository, HttpSandboxService, ProviderCompletionService,
};

use crate::{
    CreateValidationRequest, CreateValidationResponse, SubmitTestRequest, TestView, ValidationView,
};

/// Facade over the orchestration pipeline, exposing the boundary operations
/// consumed by the web layer. One instance serves all validations; per-test
/// single-flight is enforced internally.
pub struct ValorApi<C, S, R> {
    registry: ValidationRegistry<C, S, R>,
    orchestrator: TestOrchestrator<C, S, R>,
    environment: Environment,
}

/// The production wiring: configured LLM provider, HTTP execution service,
/// file-backed store.
pub type LocalValorApi =
    ValorApi<ProviderCompletionService, HttpSandboxService, FileValidationRepository>;

impl LocalValorApi {
    /// Bootstraps from `.env` / process environment configuration.
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = valor_infra::load_environment()?;
        Ok(Self::from_environment(environment)?)
    }

    pub fn from_environment(environment: Environment) -> Result<Self> {
        let completion = Arc::new(ProviderCompletionService::new(
            environment.provider.clone(),
            environment.retry.clone(),
        )?);
        let sandbox = Arc::new(HttpSandboxService::new(
            environment.sandbox_url.clone(),
            environment.execution_timeout_secs,
        )?);
        let repository = Arc::new(FileValidationRepository::new(
            environment.base_upload_folder.clone(),
        ));

        Ok(Self::with_services(
            completion,
            sandbox,
            repository,
            environment,
        ))
    }
}

impl<C, S, R> ValorApi<C, S, R>
where
    C: CompletionService,
    S: SandboxService,
    R: ValidationRepository,
{
    pub fn with_services(
        completion: Arc<C>,
        sandbox: Arc<S>,
        repository: Arc<R>,
        environment: Environment,
    ) -> Self {
        let templates = Arc::new(PromptTemplates::new());
        let locks = Arc::new(SessionLocks::new());

        let registry = ValidationRegistry::new(
            completion.clone(),
            sandbox.clone(),
            repository.clone(),
            templates.clone(),
            locks.clone(),
        );
        let orchestrator =
            TestOrchestrator::new(completion, sandbox, repository, templates, locks);

        Self {
            registry,
            orchestrator,
            environment,
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub async fn create_validation(
        &self,
        request: CreateValidationRequest,
    ) -> Result<CreateValidationResponse> {
        let uploads: Vec<ArtifactUpload> = request
            .artifacts
            .into_iter()
            .map(|artifact| ArtifactUpload::new(artifact.kind, artifact.file_name, artifact.content))
            .collect();

        let validation = self.registry.create(uploads).await?;
        info!(validation = %validation.id, "Validation created");

        Ok(CreateValidationResponse {
            validation_id: validation.id.into_string(),
            execution_id: validation
                .execution_id()
                .map(|execution_id| execution_id.as_str().to_string()),
        })
    }

    pub async fn load_validation(&self, validation_id: &str) -> Result<ValidationView> {
        let validation = self.registry.load(ValidationId::parse(validation_id)?).await?;
        Ok(ValidationView::from(&validation))
    }

    pub async fn load_tests(&self, validation_id: &str) -> Result<Vec<TestView>> {
        let tests = self
            .registry
            .list_tests(ValidationId::parse(validation_id)?)
            .await?;
        Ok(tests.iter().map(TestView::from).collect())
    }

    /// Runs one generation/execution round — initial or follow-up — and
    /// returns the committed test state. On failure the session is left in
    /// `failed` with its last successful results intact, and the error is
    /// surfaced to the caller.
    pub async fn submit_test(&self, request: SubmitTestRequest) -> Result<TestView> {
        let mut submit = SubmitTest::new(ValidationId::parse(&request.validation_id)?);
        submit.test_id = request
            .test_id
            .as_deref()
            .map(TestId::parse)
            .transpose()?;
        submit.title = request.title;
        submit.description = request.description;
        submit.follow_up_message = request.follow_up_message;

        let test = self.orchestrator.submit(submit).await?;
        Ok(TestView::from(&test))
    }

    pub async fn delete_test(&self, validation_id: &str, test_id: &str) -> Result<()> {
        self.registry
            .delete_test(ValidationId::parse(validation_id)?, TestId::parse(test_id)?)
            .await
    }

    pub async fn generate_test_list(&self, validation_id: &str) -> Result<Vec<TestSuggestion>> {
        self.registry
            .generate_test_list(ValidationId::parse(validation_id)?)
            .await
    }

    /// Read-only snapshot for the external report generator; never triggers
    /// generation or execution.
    pub async fn aggregate_for_report(&self, validation_id: &str) -> Result<ReportSnapshot> {
        self.registry
            .aggregate_for_report(ValidationId::parse(validation_id)?)
            .await
    }

    /// Assembles the report document from current stored state and returns
    /// its bytes; conversion to the delivery format happens downstream.
    pub async fn generate_report(&self, validation_id: &str) -> Result<Vec<u8>> {
        let snapshot = self.aggregate_for_report(validation_id).await?;
        Ok(render_report_markdown(&snapshot).into_bytes())
    }
}
