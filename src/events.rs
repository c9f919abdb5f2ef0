//! Build lifecycle events pushed to the MQM server.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CiEventType {
    Queued,
    Started,
    Finished,
    Scm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CiBuildResult {
    Success,
    Failure,
    Unstable,
    Aborted,
    Unavailable,
}

/// Why a build was started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiEventCause {
    #[serde(rename = "type")]
    pub cause_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_ci_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiEvent {
    pub event_type: CiEventType,
    pub build_ci_id: String,
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    /// Milliseconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CiBuildResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<CiEventCause>,
}

impl CiEvent {
    pub fn new(event_type: CiEventType, project: impl Into<String>, build: impl ToString) -> Self {
        let build = build.to_string();
        Self {
            event_type,
            build_ci_id: build.clone(),
            project: project.into(),
            project_display_name: None,
            number: Some(build),
            start_time: None,
            estimated_duration: None,
            duration: None,
            result: None,
            causes: Vec::new(),
        }
    }
}

/// Describes the CI server that emits the events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CiServerInfo {
    #[serde(rename = "type")]
    pub server_type: String,
    pub version: String,
    pub url: String,
    pub instance_id: String,
    /// Milliseconds since the epoch
    pub sending_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiEventsList {
    pub server: CiServerInfo,
    pub events: Vec<CiEvent>,
}
