use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ArtifactSet, ResultFile, TestId, TestSession, TestStatus, ValidationId, ValidationSession};

/// A candidate test proposed by the LLM from the model documentation and
/// training code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSuggestion {
    pub title: String,
    pub area: String,
    pub description: String,
}

/// Read-only snapshot of one test, as consumed by the report generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestSnapshot {
    pub test_id: TestId,
    pub title: String,
    pub description: String,
    pub status: TestStatus,
    pub code: Option<String>,
    pub results: Vec<ResultFile>,
    pub error: Option<String>,
}

impl From<&TestSession> for TestSnapshot {
    fn from(test: &TestSession) -> Self {
        Self {
            test_id: test.id,
            title: test.title.clone(),
            description: test.description.clone(),
            status: test.status,
            code: test.generated_code.clone(),
            results: test.results.clone(),
            error: test.error.clone(),
        }
    }
}

/// Read-only aggregate over one validation's current stored state. Building
/// it never triggers generation or execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSnapshot {
    pub validation_id: ValidationId,
    pub artifacts: ArtifactSet,
    pub tests: Vec<TestSnapshot>,
    pub generated_at: DateTime<Utc>,
}

impl From<&ValidationSession> for ReportSnapshot {
    fn from(validation: &ValidationSession) -> Self {
        Self {
            validation_id: validation.id,
            artifacts: validation.artifacts.clone(),
            tests: validation.tests.values().map(TestSnapshot::from).collect(),
            generated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ArtifactSet;

    #[test]
    fn test_snapshot_lists_tests_in_creation_order() {
        let mut fixture = ValidationSession::new(ArtifactSet::new());
        fixture.add_test(TestSession::new("Backtest", "backtest"));
        fixture.add_test(TestSession::new("Stability", "psi"));

        let actual = ReportSnapshot::from(&fixture);

        let titles: Vec<&str> = actual.tests.iter().map(|test| test.title.as_str()).collect();
        assert_eq!(titles, vec!["Backtest", "Stability"]);
    }
}
