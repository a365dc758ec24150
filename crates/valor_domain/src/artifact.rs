use std::path::PathBuf;

use derive_setters::Setters;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// The artifact slots a validation accepts. Serialized names match the
/// upload form fields of the client.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ArtifactKind {
    Documentation,
    TrainingScript,
    TrainedModel,
    TrainingDataset,
    TestDataset,
}

impl ArtifactKind {
    /// Artifacts whose bytes are shipped into the execution environment.
    pub fn is_execution_input(&self) -> bool {
        matches!(
            self,
            Self::TrainedModel | Self::TrainingDataset | Self::TestDataset
        )
    }

    /// Artifacts whose text content is substituted into prompts.
    pub fn is_prompt_content(&self) -> bool {
        matches!(self, Self::Documentation | Self::TrainingScript)
    }
}

/// Weak reference to a stored artifact file. The registry owns the mapping,
/// not the bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Setters)]
#[setters(into)]
pub struct ArtifactRef {
    pub file_name: String,
    pub path: PathBuf,
}

impl ArtifactRef {
    pub fn new(file_name: impl ToString, path: impl Into<PathBuf>) -> Self {
        Self {
            file_name: file_name.to_string(),
            path: path.into(),
        }
    }
}

/// Mapping from artifact kind to its stored file. Read-only once the
/// validation is created; insertion order is preserved for display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactSet(IndexMap<ArtifactKind, ArtifactRef>);

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: ArtifactKind, artifact: ArtifactRef) -> &mut Self {
        self.0.insert(kind, artifact);
        self
    }

    pub fn get(&self, kind: ArtifactKind) -> Option<&ArtifactRef> {
        self.0.get(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArtifactKind, &ArtifactRef)> {
        self.0.iter().map(|(kind, artifact)| (*kind, artifact))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// File names of the artifacts that must be present inside the execution
    /// environment.
    pub fn execution_inputs(&self) -> Vec<&ArtifactRef> {
        self.iter()
            .filter(|(kind, _)| kind.is_execution_input())
            .map(|(_, artifact)| artifact)
            .collect()
    }
}

impl FromIterator<(ArtifactKind, ArtifactRef)> for ArtifactSet {
    fn from_iter<I: IntoIterator<Item = (ArtifactKind, ArtifactRef)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// An artifact as received at creation time, before it is written to the
/// upload store.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactUpload {
    pub kind: ArtifactKind,
    pub file_name: String,
    pub content: Vec<u8>,
}

impl ArtifactUpload {
    pub fn new(kind: ArtifactKind, file_name: impl ToString, content: impl Into<Vec<u8>>) -> Self {
        Self {
            kind,
            file_name: file_name.to_string(),
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_artifact_kind_serializes_as_form_field_name() {
        let actual = serde_json::to_string(&ArtifactKind::TrainedModel).unwrap();
        assert_eq!(actual, "\"trainedModel\"");
    }

    #[test]
    fn test_artifact_set_preserves_insertion_order() {
        let mut fixture = ArtifactSet::new();
        fixture.insert(
            ArtifactKind::TestDataset,
            ArtifactRef::new("test.csv", "/tmp/test.csv"),
        );
        fixture.insert(
            ArtifactKind::Documentation,
            ArtifactRef::new("doc.md", "/tmp/doc.md"),
        );

        let actual: Vec<ArtifactKind> = fixture.iter().map(|(kind, _)| kind).collect();
        assert_eq!(
            actual,
            vec![ArtifactKind::TestDataset, ArtifactKind::Documentation]
        );
    }

    #[test]
    fn test_execution_inputs_excludes_prompt_content() {
        let fixture: ArtifactSet = [
            (
                ArtifactKind::Documentation,
                ArtifactRef::new("doc.md", "/tmp/doc.md"),
            ),
            (
                ArtifactKind::TrainedModel,
                ArtifactRef::new("model.pkl", "/tmp/model.pkl"),
            ),
        ]
        .into_iter()
        .collect();

        let actual: Vec<&str> = fixture
            .execution_inputs()
            .iter()
            .map(|artifact| artifact.file_name.as_str())
            .collect();
        assert_eq!(actual, vec!["model.pkl"]);
    }
}
