use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use valor_app::ValidationRepository;
use valor_domain::{
    ArtifactKind, ArtifactRef, ArtifactSet, ArtifactUpload, Error, Result, TestId, ValidationId,
    ValidationSession,
};

const METADATA_FILE_NAME: &str = "metadata.json";

/// File-backed validation store: one folder per validation under the base
/// upload folder, with the whole session serialized into `metadata.json`,
/// artifact bytes beside it, and cached test outputs under
/// `tests/test_<id>/`. Sessions are written whole on every save.
pub struct FileValidationRepository {
    base_dir: PathBuf,
}

impl FileValidationRepository {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn validation_dir(&self, id: ValidationId) -> PathBuf {
        self.base_dir.join(id.into_string())
    }

    fn metadata_path(&self, id: ValidationId) -> PathBuf {
        self.validation_dir(id).join(METADATA_FILE_NAME)
    }

    fn test_dir(&self, id: ValidationId, test_id: TestId) -> PathBuf {
        self.validation_dir(id)
            .join("tests")
            .join(test_id.folder_name())
    }
}

/// Uploaded file names are caller-controlled; keep only the final path
/// component so they cannot escape the validation folder.
fn sanitize_file_name(file_name: &str) -> String {
    Path::new(file_name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("artifact")
        .to_string()
}

#[async_trait::async_trait]
impl ValidationRepository for FileValidationRepository {
    async fn save(&self, validation: &ValidationSession) -> Result<()> {
        let dir = self.validation_dir(validation.id);
        tokio::fs::create_dir_all(&dir).await?;

        let json = serde_json::to_string_pretty(validation)
            .map_err(|error| Error::Storage(error.to_string()))?;
        tokio::fs::write(self.metadata_path(validation.id), json).await?;

        debug!(validation = %validation.id, "Saved validation metadata");
        Ok(())
    }

    async fn load(&self, id: ValidationId) -> Result<ValidationSession> {
        let path = self.metadata_path(id);
        if !path.exists() {
            return Err(Error::ValidationNotFound(id));
        }

        let content = tokio::fs::read_to_string(path).await?;
        serde_json::from_str(&content).map_err(|error| Error::Storage(error.to_string()))
    }

    async fn store_artifacts(
        &self,
        id: ValidationId,
        uploads: &[ArtifactUpload],
    ) -> Result<ArtifactSet> {
        let dir = self.validation_dir(id);
        tokio::fs::create_dir_all(&dir).await?;

        let mut artifacts = ArtifactSet::new();
        for upload in uploads {
            let file_name = sanitize_file_name(&upload.file_name);
            let path = dir.join(&file_name);
            tokio::fs::write(&path, &upload.content).await?;
            artifacts.insert(upload.kind, ArtifactRef::new(file_name, path));
        }

        Ok(artifacts)
    }

    async fn read_artifact_text(
        &self,
        validation: &ValidationSession,
        kind: ArtifactKind,
    ) -> Result<Option<String>> {
        let Some(artifact) = validation.artifacts.get(kind) else {
            return Ok(None);
        };

        match tokio::fs::read_to_string(&artifact.path).await {
            Ok(content) => Ok(Some(content)),
            Err(error) => {
                warn!(%error, kind = %kind, path = %artifact.path.display(), "Artifact file unreadable");
                Ok(None)
            }
        }
    }

    async fn cache_test_file(
        &self,
        id: ValidationId,
        test_id: TestId,
        filename: &str,
        content: &[u8],
    ) -> Result<PathBuf> {
        let path = self.test_dir(id, test_id).join(filename);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(path)
    }

    async fn remove_test_files(&self, id: ValidationId, test_id: TestId) -> Result<()> {
        let dir = self.test_dir(id, test_id);
        if dir.exists() {
            tokio::fs::remove_dir_all(dir).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use valor_domain::TestSession;

    use super::*;

    fn fixture_repository() -> (FileValidationRepository, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (FileValidationRepository::new(dir.path()), dir)
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let (repository, _dir) = fixture_repository();
        let mut fixture = ValidationSession::new(ArtifactSet::new());
        fixture.add_test(TestSession::new("Backtest", "backtest the model"));
        repository.save(&fixture).await.unwrap();

        let actual = repository.load(fixture.id).await.unwrap();

        assert_eq!(actual, fixture);
    }

    #[tokio::test]
    async fn test_load_unknown_id_is_not_found() {
        let (repository, _dir) = fixture_repository();

        let actual = repository.load(ValidationId::generate()).await;
        assert!(matches!(actual, Err(Error::ValidationNotFound(_))));
    }

    #[tokio::test]
    async fn test_artifacts_are_stored_and_read_back() {
        let (repository, _dir) = fixture_repository();
        let mut fixture = ValidationSession::new(ArtifactSet::new());
        let uploads = vec![ArtifactUpload::new(
            ArtifactKind::Documentation,
            "doc.md",
            "predicts default risk".as_bytes(),
        )];

        fixture.artifacts = repository.store_artifacts(fixture.id, &uploads).await.unwrap();

        let actual = repository
            .read_artifact_text(&fixture, ArtifactKind::Documentation)
            .await
            .unwrap();
        assert_eq!(actual.as_deref(), Some("predicts default risk"));

        let missing = repository
            .read_artifact_text(&fixture, ArtifactKind::TrainingScript)
            .await
            .unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn test_upload_file_names_cannot_escape_the_folder() {
        let (repository, dir) = fixture_repository();
        let fixture = ValidationSession::new(ArtifactSet::new());
        let uploads = vec![ArtifactUpload::new(
            ArtifactKind::TrainingScript,
            "../../etc/train.py",
            "model.fit(X, y)".as_bytes(),
        )];

        let artifacts = repository.store_artifacts(fixture.id, &uploads).await.unwrap();

        let stored = artifacts.get(ArtifactKind::TrainingScript).unwrap();
        assert_eq!(stored.file_name, "train.py");
        assert!(stored.path.starts_with(dir.path()));
    }

    #[tokio::test]
    async fn test_cached_files_are_removed_with_the_test() {
        let (repository, _dir) = fixture_repository();
        let id = ValidationId::generate();
        let test_id = TestId::generate();

        let path = repository
            .cache_test_file(id, test_id, "images/roc.png", b"\x89PNG")
            .await
            .unwrap();
        assert!(path.exists());

        repository.remove_test_files(id, test_id).await.unwrap();
        assert!(!path.exists());
    }
}
