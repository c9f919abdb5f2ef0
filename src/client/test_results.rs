use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use log::{debug, info};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Body, StatusCode};
use serde_json::Value;

use super::core::{expect_status, read_json, MqmClient};
use crate::error::{MqmError, Result};
use crate::types::TestResultStatus;

const URI_TEST_RESULT_PUSH: &str = "analytics/ci/test-results";
const URI_TEST_RESULT_STATUS: &str = "analytics/ci/test-results/{0}";

/// Timestamp layout used by the server, e.g. `2015-03-10T14:05:00+0100`.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Test result report to upload.
#[derive(Debug, Clone)]
pub enum TestResultSource {
    /// Streamed from disk
    File(PathBuf),
    Bytes(Vec<u8>),
}

impl MqmClient {
    /// Uploads a test result report and returns the id of the processing job.
    ///
    /// # Errors
    ///
    /// - `NotFound` if a file source does not exist locally
    /// - `Request` if the server answers anything other than 202
    /// - `Transport` on connection failures or when the file cannot be read
    pub async fn post_test_result(&self, source: TestResultSource, skip_errors: bool) -> Result<i64> {
        let body = match source {
            TestResultSource::File(path) => match tokio::fs::File::open(&path).await {
                Ok(file) => Body::from(file),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(MqmError::NotFound {
                        context: "Cannot find test result file".to_string(),
                        path,
                        source: e,
                    });
                }
                Err(e) => return Err(MqmError::transport("Cannot post test results to MQM", e)),
            },
            TestResultSource::Bytes(bytes) => Body::from(bytes),
        };

        let mut uri = self
            .config
            .shared_space_internal_api_uri(URI_TEST_RESULT_PUSH, &[])?;
        uri.query_pairs_mut()
            .append_pair("skip-errors", if skip_errors { "true" } else { "false" });
        debug!("POST {uri}");

        let request = self
            .http
            .post(uri)
            .header(CONTENT_TYPE, "application/xml")
            .body(body);
        let response = self
            .execute(request, "Cannot post test results to MQM")
            .await?;
        let response = expect_status(response, StatusCode::ACCEPTED, "Test result post failed").await?;

        let json = read_json(response, "Test result post failed").await?;
        let id = json
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| MqmError::invalid_response("Test result post failed", "missing 'id'"))?;

        info!("Test results accepted for processing with id {id}");
        Ok(id)
    }

    /// Fetches the processing status of a previously posted test result.
    pub async fn get_test_result_status(&self, id: i64) -> Result<TestResultStatus> {
        let uri = self
            .config
            .shared_space_internal_api_uri(URI_TEST_RESULT_STATUS, &[&id.to_string()])?;
        debug!("GET {uri}");

        let response = self
            .execute(self.http.get(uri), "Cannot obtain status")
            .await?;
        let response = expect_status(response, StatusCode::OK, "Result status retrieval failed").await?;

        let json = read_json(response, "Cannot obtain status").await?;
        parse_test_result_status(&json)
    }
}

fn parse_test_result_status(json: &Value) -> Result<TestResultStatus> {
    let status = json
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| MqmError::invalid_response("Cannot obtain status", "missing 'status'"))?
        .to_string();

    let until = match json.get("until") {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => Some(parse_datetime(raw)?),
        Some(other) => {
            return Err(MqmError::invalid_response(
                "Cannot obtain status",
                format!("unexpected 'until' value: {other}"),
            ))
        }
    };

    Ok(TestResultStatus { status, until })
}

/// Parses a server timestamp, also accepting RFC 3339 (`Z` or `+01:00` offsets).
pub(crate) fn parse_datetime(raw: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_str(raw, DATETIME_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map_err(|e| MqmError::invalid_response("Cannot obtain status", format!("'{raw}': {e}")))
}
