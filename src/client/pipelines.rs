use log::{debug, info, warn};
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::core::{data_array, expect_status, read_json, MqmClient};
use crate::error::{MqmError, Result};
use crate::types::{
    Field, FieldMetadata, JobConfiguration, NewPipeline, Pipeline, PipelineUpdate, ReleaseUpdate,
    Taxonomy,
};

const URI_JOB_CONFIGURATION: &str = "analytics/ci/servers/{0}/jobs/{1}/configuration";
const URI_FIELDS_METADATA: &str = "analytics/ci/pipelines/metadata";

const PIPELINE_CONTEXT: &str = "pipeline";

/// Pipeline as it appears in job configuration responses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PipelineEntity {
    context_entity_id: i64,
    context_entity_name: String,
    pipeline_root: bool,
    workspace_id: i64,
    #[serde(default)]
    release_id: Option<i64>,
    #[serde(default)]
    taxonomies: Vec<Taxonomy>,
    #[serde(default, rename = "tags")]
    fields: Vec<Field>,
}

impl From<PipelineEntity> for Pipeline {
    fn from(entity: PipelineEntity) -> Self {
        Self {
            id: entity.context_entity_id,
            name: entity.context_entity_name,
            root: entity.pipeline_root,
            workspace_id: entity.workspace_id,
            release_id: entity.release_id,
            taxonomies: entity.taxonomies,
            fields: entity.fields,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PipelineUpdateEntity<'a> {
    context_entity_type: &'static str,
    context_entity_id: i64,
    workspace_id: i64,
    #[serde(rename = "contextEntityName", skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "ReleaseUpdate::is_unchanged")]
    release_id: ReleaseUpdate,
    #[serde(skip_serializing_if = "Option::is_none")]
    taxonomies: Option<&'a [Taxonomy]>,
    #[serde(rename = "tags", skip_serializing_if = "Option::is_none")]
    fields: Option<&'a [Field]>,
}

#[derive(Debug, Deserialize)]
struct FieldsMetadataResponse {
    #[serde(default)]
    lists: Vec<FieldMetadata>,
}

impl MqmClient {
    /// Lists the pipelines registered for a job on a CI server.
    ///
    /// Entries with a context type other than `pipeline` are skipped.
    pub async fn get_job_configuration(
        &self,
        server_identity: &str,
        job_name: &str,
    ) -> Result<JobConfiguration> {
        let uri = self.config.shared_space_internal_api_uri(
            URI_JOB_CONFIGURATION,
            &[server_identity, job_name],
        )?;
        debug!("GET {uri}");

        let response = self
            .execute(self.http.get(uri), "Cannot retrieve job configuration from MQM")
            .await?;
        let response =
            expect_status(response, StatusCode::OK, "Job configuration retrieval failed").await?;

        let json = read_json(response, "Failed to obtain job configuration").await?;
        parse_job_configuration(&json)
    }

    /// Registers a new root pipeline for a job and returns it as stored.
    pub async fn create_pipeline(
        &self,
        server_identity: &str,
        project_name: &str,
        pipeline: &NewPipeline,
    ) -> Result<Pipeline> {
        let uri = self.config.shared_space_internal_api_uri(
            URI_JOB_CONFIGURATION,
            &[server_identity, project_name],
        )?;
        debug!("POST {uri}");

        let mut entity = json!({
            "contextEntityType": PIPELINE_CONTEXT,
            "contextEntityName": pipeline.name,
            "workspaceId": pipeline.workspace_id,
            "server": pipeline.server,
            "structure": pipeline.structure,
        });
        if let Some(release_id) = pipeline.release_id {
            entity["releaseId"] = json!(release_id);
        }

        let request = self
            .http
            .post(uri)
            .header(ACCEPT, "application/json")
            .json(&entity);
        let response = self
            .execute(request, "Cannot create pipeline in MQM")
            .await?;
        let response = expect_status(response, StatusCode::CREATED, "Pipeline creation failed").await?;

        let json = read_json(response, "Failed to obtain pipeline").await?;
        let created = find_root_pipeline(&json, &pipeline.name, pipeline.workspace_id)?;

        info!(
            "Created pipeline '{}' (id {}) in workspace {}",
            created.name, created.id, created.workspace_id
        );
        Ok(created)
    }

    /// Applies a partial update to a pipeline and returns it as stored.
    pub async fn update_pipeline(
        &self,
        server_identity: &str,
        job_name: &str,
        update: &PipelineUpdate,
    ) -> Result<Pipeline> {
        let uri = self.config.shared_space_internal_api_uri(
            URI_JOB_CONFIGURATION,
            &[server_identity, job_name],
        )?;
        debug!("PUT {uri}");

        let request = self
            .http
            .put(uri)
            .header(ACCEPT, "application/json")
            .json(&update_payload(update));
        let response = self.execute(request, "Cannot update pipeline").await?;
        let response = expect_status(response, StatusCode::OK, "Pipeline update failed").await?;

        let json = read_json(response, "Failed to obtain pipeline").await?;
        let updated = find_pipeline_by_id(&json, update.id)?;

        info!("Updated pipeline '{}' (id {})", updated.name, updated.id);
        Ok(updated)
    }

    /// Renames a pipeline and/or changes its release.
    pub async fn update_pipeline_metadata(
        &self,
        server_identity: &str,
        job_name: &str,
        pipeline_id: i64,
        name: Option<String>,
        workspace_id: i64,
        release: ReleaseUpdate,
    ) -> Result<Pipeline> {
        let update = PipelineUpdate {
            name,
            release,
            ..PipelineUpdate::new(pipeline_id, workspace_id)
        };
        self.update_pipeline(server_identity, job_name, &update).await
    }

    /// Replaces a pipeline's taxonomies and fields.
    pub async fn update_pipeline_tags(
        &self,
        server_identity: &str,
        job_name: &str,
        pipeline_id: i64,
        workspace_id: i64,
        taxonomies: Vec<Taxonomy>,
        fields: Vec<Field>,
    ) -> Result<Pipeline> {
        let update = PipelineUpdate {
            taxonomies: Some(taxonomies),
            fields: Some(fields),
            ..PipelineUpdate::new(pipeline_id, workspace_id)
        };
        self.update_pipeline(server_identity, job_name, &update).await
    }

    /// Lists that pipeline fields can be chosen from.
    pub async fn get_fields_metadata(&self, workspace_id: i64) -> Result<Vec<FieldMetadata>> {
        let uri = self
            .config
            .workspace_api_uri(workspace_id, URI_FIELDS_METADATA, &[])?;
        debug!("GET {uri}");

        let response = self
            .execute(self.http.get(uri), "Cannot retrieve fields metadata")
            .await?;
        let response =
            expect_status(response, StatusCode::OK, "Fields metadata retrieval failed").await?;

        let json = read_json(response, "Failed to obtain fields metadata").await?;
        let metadata: FieldsMetadataResponse = serde_json::from_value(json)
            .map_err(|e| MqmError::invalid_response("Failed to obtain fields metadata", e))?;
        Ok(metadata.lists)
    }
}

/// Request body for a partial pipeline update.
pub(crate) fn update_payload(update: &PipelineUpdate) -> Value {
    let entity = PipelineUpdateEntity {
        context_entity_type: PIPELINE_CONTEXT,
        context_entity_id: update.id,
        workspace_id: update.workspace_id,
        name: update.name.as_deref(),
        release_id: update.release,
        taxonomies: update.taxonomies.as_deref(),
        fields: update.fields.as_deref(),
    };
    json!({ "data": [entity] })
}

fn parse_job_configuration(json: &Value) -> Result<JobConfiguration> {
    let mut pipelines = Vec::new();
    for item in data_array(json, "Failed to obtain job configuration")? {
        let context_type = item.get("contextEntityType").and_then(Value::as_str);
        if context_type == Some(PIPELINE_CONTEXT) {
            pipelines.push(to_pipeline(item, "Failed to obtain job configuration")?);
        } else {
            warn!(
                "Context type '{}' is not supported",
                context_type.unwrap_or("<missing>")
            );
        }
    }
    Ok(JobConfiguration { pipelines })
}

fn pipeline_entities(json: &Value) -> Result<Vec<PipelineEntity>> {
    data_array(json, "Failed to obtain pipeline")?
        .iter()
        .filter(|item| item.get("contextEntityType").and_then(Value::as_str) == Some(PIPELINE_CONTEXT))
        .map(|item| {
            PipelineEntity::deserialize(item)
                .map_err(|e| MqmError::invalid_response("Failed to obtain pipeline", e))
        })
        .collect()
}

fn find_root_pipeline(json: &Value, name: &str, workspace_id: i64) -> Result<Pipeline> {
    pipeline_entities(json)?
        .into_iter()
        .find(|p| p.pipeline_root && p.context_entity_name == name && p.workspace_id == workspace_id)
        .map(Pipeline::from)
        .ok_or_else(|| MqmError::invalid_response("Failed to obtain pipeline", "item not found"))
}

fn find_pipeline_by_id(json: &Value, pipeline_id: i64) -> Result<Pipeline> {
    pipeline_entities(json)?
        .into_iter()
        .find(|p| p.context_entity_id == pipeline_id)
        .map(Pipeline::from)
        .ok_or_else(|| MqmError::invalid_response("Failed to obtain pipeline", "item not found"))
}

fn to_pipeline(item: &Value, context: &str) -> Result<Pipeline> {
    PipelineEntity::deserialize(item)
        .map(Pipeline::from)
        .map_err(|e| MqmError::invalid_response(context, e))
}
