use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;
use valor_app::SandboxService;
use valor_domain::{
    ArtifactUpload, Error, ExecutionId, ExecutionOutcome, Result, SandboxEnvironment,
};

#[derive(Serialize)]
struct CreateExecutionRequest {
    files: Vec<UploadedFile>,
}

#[derive(Serialize)]
struct UploadedFile {
    filename: String,
    /// Base64-encoded bytes; datasets and trained models are binary.
    content: String,
}

#[derive(Deserialize)]
struct CreateExecutionResponse {
    execution_id: String,
    directory: String,
}

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    execution_id: &'a str,
    code: &'a str,
    output_folder: &'a str,
}

/// Client for the isolated code-execution service. One environment per
/// validation holds the artifacts; every `execute` call runs in a fresh
/// interpreter, so no state leaks between tests.
pub struct HttpSandboxService {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpSandboxService {
    pub fn new(base_url: Url, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|error| Error::ExecutionServiceUnavailable(error.to_string()))?;

        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|error| Error::ExecutionServiceUnavailable(error.to_string()))
    }
}

fn transport_error(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::ExecutionTimeout
    } else {
        Error::ExecutionServiceUnavailable(error.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::GATEWAY_TIMEOUT
    {
        Err(Error::ExecutionTimeout)
    } else {
        Err(Error::ExecutionServiceUnavailable(format!("{status}: {body}")))
    }
}

#[async_trait::async_trait]
impl SandboxService for HttpSandboxService {
    async fn create_environment(
        &self,
        artifacts: Vec<ArtifactUpload>,
    ) -> Result<SandboxEnvironment> {
        let engine = base64::engine::general_purpose::STANDARD;
        let request = CreateExecutionRequest {
            files: artifacts
                .iter()
                .map(|artifact| UploadedFile {
                    filename: artifact.file_name.clone(),
                    content: engine.encode(&artifact.content),
                })
                .collect(),
        };

        info!(files = request.files.len(), "Creating execution environment");
        let response = self
            .http
            .post(self.url("create-execution")?)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let response: CreateExecutionResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|error| Error::ExecutionServiceUnavailable(error.to_string()))?;

        Ok(SandboxEnvironment {
            execution_id: ExecutionId::new(response.execution_id),
            directory: response.directory.into(),
        })
    }

    async fn execute(
        &self,
        execution_id: &ExecutionId,
        code: &str,
        output_folder: &str,
    ) -> Result<ExecutionOutcome> {
        debug!(execution = %execution_id, output_folder, "Executing generated code");
        let response = self
            .http
            .post(self.url("execute")?)
            .json(&ExecuteRequest {
                execution_id: execution_id.as_str(),
                code,
                output_folder,
            })
            .send()
            .await
            .map_err(transport_error)?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|error| Error::ExecutionServiceUnavailable(error.to_string()))
    }

    async fn fetch_file(&self, execution_id: &ExecutionId, path: &str) -> Result<Vec<u8>> {
        let url = self.url(&format!("files/{}/{}", execution_id.as_str(), path))?;
        let response = self.http.get(url).send().await.map_err(transport_error)?;

        let bytes = check_status(response)
            .await?
            .bytes()
            .await
            .map_err(transport_error)?;
        Ok(bytes.to_vec())
    }
}
