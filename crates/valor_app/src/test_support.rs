use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use valor_domain::{
    ArtifactKind, ArtifactRef, ArtifactSet, ArtifactUpload, Conversation, Error, ExecutionId,
    ExecutionOutcome, Result, SandboxEnvironment, TestId, ValidationId, ValidationSession,
};

use crate::{
    CompletionService, PromptTemplates, SandboxService, SessionLocks, TestOrchestrator,
    ValidationRegistry, ValidationRepository,
};

pub const ASSISTANT_REPLY: &str =
    "Here is the test:\n```python\nprint('backtest')\n```\nDone.";

/// Completion double that pops scripted replies and records what it was
/// sent.
#[derive(Default)]
pub struct StaticCompletion {
    replies: Mutex<VecDeque<Result<String>>>,
    conversations: Mutex<Vec<Conversation>>,
}

impl StaticCompletion {
    pub fn push_reply(&self, reply: Result<String>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn last_conversation(&self) -> Option<Conversation> {
        self.conversations.lock().unwrap().last().cloned()
    }

    pub fn call_count(&self) -> usize {
        self.conversations.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl CompletionService for StaticCompletion {
    async fn complete(&self, conversation: &Conversation) -> Result<String> {
        self.conversations.lock().unwrap().push(conversation.clone());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::ProviderUnavailable("no scripted reply".to_string())))
    }
}

/// Sandbox double with scripted execution outcomes; file fetches succeed
/// with placeholder bytes.
#[derive(Default)]
pub struct ScriptedSandbox {
    outcomes: Mutex<VecDeque<Result<ExecutionOutcome>>>,
    executions: Mutex<Vec<(String, String)>>,
}

impl ScriptedSandbox {
    pub fn push_outcome(&self, outcome: Result<ExecutionOutcome>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn executed_folders(&self) -> Vec<String> {
        self.executions
            .lock()
            .unwrap()
            .iter()
            .map(|(_, folder)| folder.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl SandboxService for ScriptedSandbox {
    async fn create_environment(
        &self,
        _artifacts: Vec<ArtifactUpload>,
    ) -> Result<SandboxEnvironment> {
        Ok(SandboxEnvironment {
            execution_id: ExecutionId::new("exec-1"),
            directory: PathBuf::from("/sandbox/exec-1"),
        })
    }

    async fn execute(
        &self,
        _execution_id: &ExecutionId,
        code: &str,
        output_folder: &str,
    ) -> Result<ExecutionOutcome> {
        self.executions
            .lock()
            .unwrap()
            .push((code.to_string(), output_folder.to_string()));
        self.outcomes.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(Error::ExecutionServiceUnavailable(
                "no scripted outcome".to_string(),
            ))
        })
    }

    async fn fetch_file(&self, _execution_id: &ExecutionId, _path: &str) -> Result<Vec<u8>> {
        Ok(b"\x89PNG".to_vec())
    }
}

/// Repository double backed by in-memory maps.
#[derive(Default)]
pub struct InMemoryRepository {
    sessions: DashMap<ValidationId, ValidationSession>,
    artifact_text: DashMap<(ValidationId, ArtifactKind), String>,
    cached_files: Mutex<Vec<(ValidationId, TestId, String)>>,
    removed_tests: Mutex<Vec<(ValidationId, TestId)>>,
}

impl InMemoryRepository {
    pub fn cached_files(&self) -> Vec<String> {
        self.cached_files
            .lock()
            .unwrap()
            .iter()
            .map(|(_, _, filename)| filename.clone())
            .collect()
    }

    pub fn removed_tests(&self) -> Vec<TestId> {
        self.removed_tests
            .lock()
            .unwrap()
            .iter()
            .map(|(_, test_id)| *test_id)
            .collect()
    }
}

#[async_trait::async_trait]
impl ValidationRepository for InMemoryRepository {
    async fn save(&self, validation: &ValidationSession) -> Result<()> {
        self.sessions.insert(validation.id, validation.clone());
        Ok(())
    }

    async fn load(&self, id: ValidationId) -> Result<ValidationSession> {
        self.sessions
            .get(&id)
            .map(|entry| entry.clone())
            .ok_or(Error::ValidationNotFound(id))
    }

    async fn store_artifacts(
        &self,
        id: ValidationId,
        uploads: &[ArtifactUpload],
    ) -> Result<ArtifactSet> {
        let mut artifacts = ArtifactSet::new();
        for upload in uploads {
            if upload.kind.is_prompt_content() {
                let text = String::from_utf8_lossy(&upload.content).into_owned();
                self.artifact_text.insert((id, upload.kind), text);
            }
            artifacts.insert(
                upload.kind,
                ArtifactRef::new(&upload.file_name, format!("/store/{}", upload.file_name)),
            );
        }
        Ok(artifacts)
    }

    async fn read_artifact_text(
        &self,
        validation: &ValidationSession,
        kind: ArtifactKind,
    ) -> Result<Option<String>> {
        Ok(self
            .artifact_text
            .get(&(validation.id, kind))
            .map(|entry| entry.clone()))
    }

    async fn cache_test_file(
        &self,
        id: ValidationId,
        test_id: TestId,
        filename: &str,
        _content: &[u8],
    ) -> Result<PathBuf> {
        self.cached_files
            .lock()
            .unwrap()
            .push((id, test_id, filename.to_string()));
        Ok(PathBuf::from(format!(
            "/cache/{}/{}/{}",
            id,
            test_id.folder_name(),
            filename
        )))
    }

    async fn remove_test_files(&self, id: ValidationId, test_id: TestId) -> Result<()> {
        self.removed_tests.lock().unwrap().push((id, test_id));
        Ok(())
    }
}

/// Wires the doubles into an orchestrator and registry sharing one lock
/// registry, the way the api crate wires the real services.
pub struct Harness {
    pub completion: Arc<StaticCompletion>,
    pub sandbox: Arc<ScriptedSandbox>,
    pub repository: Arc<InMemoryRepository>,
    pub templates: Arc<PromptTemplates>,
    pub locks: Arc<SessionLocks>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            completion: Arc::new(StaticCompletion::default()),
            sandbox: Arc::new(ScriptedSandbox::default()),
            repository: Arc::new(InMemoryRepository::default()),
            templates: Arc::new(PromptTemplates::new()),
            locks: Arc::new(SessionLocks::new()),
        }
    }

    pub fn orchestrator(
        &self,
    ) -> TestOrchestrator<StaticCompletion, ScriptedSandbox, InMemoryRepository> {
        TestOrchestrator::new(
            self.completion.clone(),
            self.sandbox.clone(),
            self.repository.clone(),
            self.templates.clone(),
            self.locks.clone(),
        )
    }

    pub fn registry(
        &self,
    ) -> ValidationRegistry<StaticCompletion, ScriptedSandbox, InMemoryRepository> {
        ValidationRegistry::new(
            self.completion.clone(),
            self.sandbox.clone(),
            self.repository.clone(),
            self.templates.clone(),
            self.locks.clone(),
        )
    }

    pub async fn create_validation(&self, uploads: Vec<ArtifactUpload>) -> ValidationSession {
        self.registry().create(uploads).await.unwrap()
    }
}
