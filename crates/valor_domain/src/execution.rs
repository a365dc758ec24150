use std::path::PathBuf;

use derive_more::derive::Display;
use serde::{Deserialize, Serialize};

/// Identifier of an execution environment, assigned by the execution service
/// when the validation's artifacts are uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn new(id: impl ToString) -> Self {
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Handle to the remote environment holding the validation's artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxEnvironment {
    pub execution_id: ExecutionId,
    /// Absolute working directory on the execution service, used to build
    /// artifact paths inside generated code.
    pub directory: PathBuf,
}

/// One file produced by a test run: a markdown report, or a reference to a
/// generated image resolved against the execution's output folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultFile {
    pub filename: String,
    pub content: String,
}

impl ResultFile {
    pub fn new(filename: impl ToString, content: impl ToString) -> Self {
        Self {
            filename: filename.to_string(),
            content: content.to_string(),
        }
    }

    pub fn is_markdown(&self) -> bool {
        self.filename.ends_with(".md")
    }
}

/// Captured output of one sandbox execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_code: i32,
    /// Files produced under the designated output folder. Markdown content
    /// is inlined; binary files carry their name with empty content and are
    /// fetched separately.
    #[serde(default)]
    pub files: Vec<ResultFile>,
}

impl ExecutionOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }

    pub fn markdown_files(&self) -> impl Iterator<Item = &ResultFile> {
        self.files.iter().filter(|file| file.is_markdown())
    }
}
