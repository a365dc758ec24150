use chrono::{DateTime, Utc};
use derive_more::derive::Display;
use derive_setters::Setters;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ArtifactSet, Error, ExecutionId, Result, SandboxEnvironment, TestId, TestSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationId(Uuid);

impl ValidationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(value: impl ToString) -> Result<Self> {
        Ok(Self(Uuid::parse_str(&value.to_string())?))
    }

    pub fn into_string(&self) -> String {
        self.0.to_string()
    }
}

/// One end-to-end assessment effort over a set of artifacts. Owns its tests
/// by composition; artifact references are weak pointers into the upload
/// store. Never explicitly destroyed — retained for audit and reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into, strip_option)]
pub struct ValidationSession {
    pub id: ValidationId,
    /// Execution environment created from the artifacts at validation
    /// creation time.
    #[serde(default)]
    pub sandbox: Option<SandboxEnvironment>,
    #[serde(default)]
    pub artifacts: ArtifactSet,
    /// Tests in creation order, keyed by id.
    #[serde(default)]
    pub tests: IndexMap<TestId, TestSession>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ValidationSession {
    pub fn new(artifacts: ArtifactSet) -> Self {
        let now = Utc::now();
        Self {
            id: ValidationId::generate(),
            sandbox: None,
            artifacts,
            tests: IndexMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn execution_id(&self) -> Option<&ExecutionId> {
        self.sandbox.as_ref().map(|sandbox| &sandbox.execution_id)
    }

    pub fn add_test(&mut self, test: TestSession) -> TestId {
        let id = test.id;
        self.tests.insert(id, test);
        self.touch();
        id
    }

    pub fn test(&self, id: TestId) -> Result<&TestSession> {
        self.tests.get(&id).ok_or(Error::TestNotFound(id))
    }

    pub fn test_mut(&mut self, id: TestId) -> Result<&mut TestSession> {
        self.tests.get_mut(&id).ok_or(Error::TestNotFound(id))
    }

    /// Removes the test, leaving siblings untouched.
    pub fn remove_test(&mut self, id: TestId) -> Result<TestSession> {
        let removed = self
            .tests
            .shift_remove(&id)
            .ok_or(Error::TestNotFound(id))?;
        self.touch();
        Ok(removed)
    }

    /// Replaces a test with its committed working copy.
    pub fn commit_test(&mut self, test: TestSession) {
        self.tests.insert(test.id, test);
        self.touch();
    }

    pub fn list_tests(&self) -> Vec<&TestSession> {
        self.tests.values().collect()
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
