use std::path::Path;

use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;
use valor_api::{
    ArtifactPayload, CreateValidationRequest, CreateValidationResponse, LocalValorApi,
    SubmitTestRequest,
};
use valor_domain::{
    ArtifactKind, Environment, Error, ProviderConfig, ResultFile, RetryConfig, TestStatus,
};

fn fixture_environment(server_url: &str, upload_dir: &Path) -> Environment {
    valor_infra::init_tracing();

    let mut provider = ProviderConfig::anthropic("test-key", "claude-3-5-sonnet-20241022");
    provider.url = Url::parse(server_url).unwrap();

    Environment {
        base_upload_folder: upload_dir.to_path_buf(),
        sandbox_url: Url::parse(server_url).unwrap(),
        execution_timeout_secs: 5,
        provider,
        retry: RetryConfig {
            max_retry_attempts: 1,
            min_delay_ms: 1,
            backoff_factor: 2,
        },
    }
}

fn fixture_create_request() -> CreateValidationRequest {
    CreateValidationRequest {
        artifacts: vec![
            ArtifactPayload {
                kind: ArtifactKind::Documentation,
                file_name: "doc.md".to_string(),
                content: b"predicts default risk".to_vec(),
            },
            ArtifactPayload {
                kind: ArtifactKind::TrainingScript,
                file_name: "train.py".to_string(),
                content: b"model.fit(X, y)".to_vec(),
            },
            ArtifactPayload {
                kind: ArtifactKind::TrainedModel,
                file_name: "model.pkl".to_string(),
                content: vec![1, 2, 3],
            },
        ],
    }
}

async fn mock_environment_creation(server: &mut mockito::ServerGuard) {
    server
        .mock("POST", "/create-execution")
        .with_status(200)
        .with_body(
            json!({"execution_id": "exec-1", "directory": "/sandbox/exec-1"}).to_string(),
        )
        .create_async()
        .await;
}

async fn mock_generation(server: &mut mockito::ServerGuard, code: &str) {
    server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_body(
            json!({
                "content": [{
                    "type": "text",
                    "text": format!("Here is the test:\n```python\n{code}\n```")
                }]
            })
            .to_string(),
        )
        .create_async()
        .await;
}

async fn create_validation(
    api: &LocalValorApi,
) -> CreateValidationResponse {
    api.create_validation(fixture_create_request()).await.unwrap()
}

#[tokio::test]
async fn test_end_to_end_submission_reaches_completed() {
    let mut server = mockito::Server::new_async().await;
    mock_environment_creation(&mut server).await;
    mock_generation(&mut server, "print('backtest')").await;
    server
        .mock("POST", "/execute")
        .with_status(200)
        .with_body(
            json!({
                "stdout": "",
                "stderr": "",
                "exit_code": 0,
                "files": [{"filename": "report.md", "content": "# Backtest\nAUC=0.82"}]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let upload_dir = tempfile::tempdir().unwrap();
    let api =
        LocalValorApi::from_environment(fixture_environment(&server.url(), upload_dir.path()))
            .unwrap();

    let created = create_validation(&api).await;
    assert_eq!(created.execution_id.as_deref(), Some("exec-1"));

    let actual = api
        .submit_test(SubmitTestRequest {
            validation_id: created.validation_id.clone(),
            title: Some("Backtest".to_string()),
            description: Some("Compare predictions to historical defaults".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(actual.status, TestStatus::Completed);
    assert_eq!(
        actual.results,
        vec![ResultFile::new("report.md", "# Backtest\nAUC=0.82")]
    );
    assert_eq!(actual.code.as_deref(), Some("print('backtest')"));
    assert_eq!(actual.conversation.len(), 2);
    assert!(actual.prompt.contains("predicts default risk"));
    assert!(actual.prompt.contains("model.fit(X, y)"));
    assert!(actual.prompt.contains("/sandbox/exec-1/model.pkl"));

    // Loading twice returns identical snapshots.
    let first = api.load_tests(&created.validation_id).await.unwrap();
    let second = api.load_tests(&created.validation_id).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].results, second[0].results);
    assert_eq!(first[0].conversation.len(), second[0].conversation.len());

    let report = api.generate_report(&created.validation_id).await.unwrap();
    let report = String::from_utf8(report).unwrap();
    assert!(report.contains("## Backtest"));
    assert!(report.contains("AUC=0.82"));
}

#[tokio::test]
async fn test_end_to_end_execution_crash_leaves_failed_session() {
    let mut server = mockito::Server::new_async().await;
    mock_environment_creation(&mut server).await;
    mock_generation(&mut server, "raise SystemExit(1)").await;
    server
        .mock("POST", "/execute")
        .with_status(200)
        .with_body(
            json!({
                "stdout": "",
                "stderr": "Traceback (most recent call last): SystemExit",
                "exit_code": 1,
                "files": []
            })
            .to_string(),
        )
        .create_async()
        .await;

    let upload_dir = tempfile::tempdir().unwrap();
    let api =
        LocalValorApi::from_environment(fixture_environment(&server.url(), upload_dir.path()))
            .unwrap();

    let created = create_validation(&api).await;
    let actual = api
        .submit_test(SubmitTestRequest {
            validation_id: created.validation_id.clone(),
            description: Some("Compare predictions to historical defaults".to_string()),
            ..Default::default()
        })
        .await;

    assert!(matches!(actual, Err(Error::ExecutionCrashed(_))));

    let tests = api.load_tests(&created.validation_id).await.unwrap();
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].status, TestStatus::Failed);
    assert_eq!(tests[0].results, vec![]);
    assert!(tests[0].error.as_deref().unwrap().contains("Traceback"));
}

#[tokio::test]
async fn test_provider_outage_surfaces_and_session_is_retriable() {
    let mut server = mockito::Server::new_async().await;
    mock_environment_creation(&mut server).await;
    server
        .mock("POST", "/v1/messages")
        .with_status(503)
        .with_body(r#"{"error":{"message":"overloaded"}}"#)
        .create_async()
        .await;

    let upload_dir = tempfile::tempdir().unwrap();
    let api =
        LocalValorApi::from_environment(fixture_environment(&server.url(), upload_dir.path()))
            .unwrap();

    let created = create_validation(&api).await;
    let actual = api
        .submit_test(SubmitTestRequest {
            validation_id: created.validation_id.clone(),
            description: Some("Compare predictions".to_string()),
            ..Default::default()
        })
        .await;

    assert!(matches!(actual, Err(Error::ProviderUnavailable(_))));

    let tests = api.load_tests(&created.validation_id).await.unwrap();
    assert_eq!(tests[0].status, TestStatus::Failed);
    assert!(tests[0].error.is_some());
    // The failed round kept the conversation so a follow-up can retry.
    assert_eq!(tests[0].conversation.len(), 1);
}

#[tokio::test]
async fn test_delete_removes_test_from_listing_and_report() {
    let mut server = mockito::Server::new_async().await;
    mock_environment_creation(&mut server).await;
    mock_generation(&mut server, "print('ok')").await;
    server
        .mock("POST", "/execute")
        .with_status(200)
        .with_body(
            json!({
                "stdout": "", "stderr": "", "exit_code": 0,
                "files": [{"filename": "report.md", "content": "# ok"}]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let upload_dir = tempfile::tempdir().unwrap();
    let api =
        LocalValorApi::from_environment(fixture_environment(&server.url(), upload_dir.path()))
            .unwrap();

    let created = create_validation(&api).await;
    let submitted = api
        .submit_test(SubmitTestRequest {
            validation_id: created.validation_id.clone(),
            description: Some("Compare predictions".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    api.delete_test(&created.validation_id, &submitted.test_id)
        .await
        .unwrap();

    let tests = api.load_tests(&created.validation_id).await.unwrap();
    assert_eq!(tests.len(), 0);

    let snapshot = api
        .aggregate_for_report(&created.validation_id)
        .await
        .unwrap();
    assert_eq!(snapshot.tests.len(), 0);
}

#[tokio::test]
async fn test_unknown_validation_is_not_found() {
    let mut server = mockito::Server::new_async().await;
    let upload_dir = tempfile::tempdir().unwrap();
    let api =
        LocalValorApi::from_environment(fixture_environment(&server.url(), upload_dir.path()))
            .unwrap();

    let actual = api
        .load_validation("00000000-0000-0000-0000-000000000000")
        .await;

    assert!(matches!(actual, Err(Error::ValidationNotFound(_))));
}
