use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize, Serializer};

/// A CI job's pipeline as registered on the MQM server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: i64,
    pub name: String,
    /// Whether this is the root pipeline of the job
    pub root: bool,
    pub workspace_id: i64,
    pub release_id: Option<i64>,
    pub taxonomies: Vec<Taxonomy>,
    pub fields: Vec<Field>,
}

/// A classification node, optionally linked to its parent category.
///
/// The parent chain is shallow and acyclic: categories have no parent of their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Always serialized; `null` marks a root node
    #[serde(default)]
    pub parent: Option<Box<Taxonomy>>,
}

impl Taxonomy {
    pub fn new(id: Option<i64>, name: Option<String>, parent: Option<Taxonomy>) -> Self {
        Self {
            id,
            name,
            parent: parent.map(Box::new),
        }
    }

    /// Depth of the parent chain (0 for a root node).
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut current = self.parent.as_deref();
        while let Some(parent) = current {
            depth += 1;
            current = parent.parent.as_deref();
        }
        depth
    }
}

/// A list value attached to a pipeline (the server calls these tags).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: i64,
    pub name: String,
    pub parent_id: i64,
    pub parent_name: String,
    pub parent_logical_name: String,
}

/// Describes one list that pipeline fields can be picked from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMetadata {
    pub id: i64,
    pub name: String,
    pub logical_name: String,
    pub open_list: bool,
    #[serde(rename = "multiValueList")]
    pub multi_value: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    pub id: i64,
    pub name: String,
}

/// One page of a server-side entity query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedList<T> {
    pub items: Vec<T>,
    pub offset: usize,
    pub total_count: usize,
}

/// Processing state of a previously posted test result payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResultStatus {
    pub status: String,
    pub until: Option<DateTime<FixedOffset>>,
}

impl TestResultStatus {
    const FINAL_STATES: [&'static str; 3] = ["success", "failed", "warning"];

    /// Whether the server has stopped processing the payload.
    pub fn is_final(&self) -> bool {
        Self::FINAL_STATES
            .iter()
            .any(|state| self.status.eq_ignore_ascii_case(state))
    }
}

/// Pipelines registered for a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobConfiguration {
    pub pipelines: Vec<Pipeline>,
}

/// Requested change to a pipeline's release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReleaseUpdate {
    /// Leave the release as it is (field omitted)
    #[default]
    Unchanged,
    /// Detach the pipeline from any release (explicit `null`)
    Clear,
    Set(i64),
}

impl ReleaseUpdate {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }
}

impl From<Option<i64>> for ReleaseUpdate {
    fn from(value: Option<i64>) -> Self {
        match value {
            None => Self::Unchanged,
            Some(-1) => Self::Clear,
            Some(id) => Self::Set(id),
        }
    }
}

impl Serialize for ReleaseUpdate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Set(id) => serializer.serialize_i64(*id),
            Self::Unchanged | Self::Clear => serializer.serialize_none(),
        }
    }
}

/// Partial pipeline update. Only the parts that are set end up in the request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineUpdate {
    pub id: i64,
    pub workspace_id: i64,
    pub name: Option<String>,
    pub release: ReleaseUpdate,
    pub taxonomies: Option<Vec<Taxonomy>>,
    pub fields: Option<Vec<Field>>,
}

impl PipelineUpdate {
    pub fn new(id: i64, workspace_id: i64) -> Self {
        Self {
            id,
            workspace_id,
            ..Self::default()
        }
    }
}

/// Request to register a new root pipeline for a job.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPipeline {
    pub name: String,
    pub workspace_id: i64,
    pub release_id: Option<i64>,
    /// Job structure as produced by the CI server
    pub structure: serde_json::Value,
    /// CI server descriptor
    pub server: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_release_update_from_legacy_sentinel() {
        assert_eq!(ReleaseUpdate::from(None), ReleaseUpdate::Unchanged);
        assert_eq!(ReleaseUpdate::from(Some(-1)), ReleaseUpdate::Clear);
        assert_eq!(ReleaseUpdate::from(Some(1001)), ReleaseUpdate::Set(1001));
    }

    #[test]
    fn test_taxonomy_serializes_explicit_null_parent() {
        let category = Taxonomy::new(Some(10), Some("OS".to_string()), None);
        let item = Taxonomy::new(None, Some("Linux".to_string()), Some(category));

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "Linux",
                "parent": { "id": 10, "name": "OS", "parent": null }
            })
        );
        assert_eq!(item.depth(), 1);
    }

    #[test]
    fn test_test_result_status_is_final() {
        let running = TestResultStatus {
            status: "running".to_string(),
            until: None,
        };
        let done = TestResultStatus {
            status: "SUCCESS".to_string(),
            until: None,
        };

        assert!(!running.is_final());
        assert!(done.is_final());
    }

    #[test]
    fn test_field_metadata_wire_names() {
        let metadata: FieldMetadata = serde_json::from_value(json!({
            "id": 5,
            "name": "Framework",
            "logicalName": "hp.qc.list.framework",
            "openList": true,
            "multiValueList": false
        }))
        .unwrap();

        assert_eq!(metadata.logical_name, "hp.qc.list.framework");
        assert!(metadata.open_list);
        assert!(!metadata.multi_value);
    }
}
