use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{redirect, Client, RequestBuilder, Response, StatusCode};
use url::Url;

use super::naming::job_url_path;
use super::processor::{BuildCause, BuildParameter, BuildRun, BuildScheduler, HostJob};
use crate::auth::Secret;
use crate::error::{MqmError, Result};

/// [`BuildScheduler`] backed by the Jenkins remote access API.
#[derive(Debug, Clone)]
pub struct JenkinsScheduler {
    http: Client,
    url: Url,
    credentials: Option<(String, Secret)>,
}

impl JenkinsScheduler {
    /// # Errors
    ///
    /// Returns an error if `url` is not a valid base URL or the HTTP client
    /// cannot be built.
    pub fn new(url: &str) -> Result<Self> {
        let mut url = Url::parse(url.trim())
            .map_err(|e| MqmError::Config(format!("Invalid Jenkins URL: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(MqmError::Config(format!("Invalid Jenkins URL: {url}")));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        // Jenkins answers 302 on queued/stopped builds; follow-ups are not needed.
        let http = Client::builder()
            .user_agent(concat!("mqm-bridge/", env!("CARGO_PKG_VERSION")))
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| MqmError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            url,
            credentials: None,
        })
    }

    /// Authenticates with a user name and API token.
    pub fn with_credentials(mut self, username: impl Into<String>, token: Secret) -> Self {
        self.credentials = Some((username.into(), token));
        self
    }

    fn job_uri(&self, job_full_name: &str, action: &str) -> Result<Url> {
        let path = format!("job/{}/{action}", job_url_path(job_full_name));
        self.url
            .join(&path)
            .map_err(|e| MqmError::Config(format!("Invalid job path '{job_full_name}': {e}")))
    }

    async fn send(&self, request: RequestBuilder, context: &str) -> Result<()> {
        let request = match &self.credentials {
            Some((username, token)) => request.basic_auth(username, Some(token.as_str())),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|e| MqmError::transport(context, e))?;

        if accepted(response.status()) {
            Ok(())
        } else {
            Err(rejected(context, response))
        }
    }
}

#[async_trait]
impl BuildScheduler for JenkinsScheduler {
    async fn schedule(
        &self,
        job: &HostJob,
        delay: Duration,
        cause: &BuildCause,
        parameters: &[BuildParameter],
    ) -> Result<()> {
        let action = if parameters.is_empty() {
            "build"
        } else {
            "buildWithParameters"
        };
        let mut uri = self.job_uri(&job.full_name, action)?;
        uri.query_pairs_mut()
            .append_pair("delay", &format!("{}sec", delay.as_secs()));
        debug!("POST {uri}");

        let mut form: Vec<(&str, &str)> = parameters
            .iter()
            .map(|p| (p.name.as_str(), p.value.as_str()))
            .collect();
        form.push(("cause", cause.description.as_str()));

        self.send(self.http.post(uri).form(&form), "Failed to schedule build")
            .await?;
        info!("Scheduled build of {}", job.full_name);
        Ok(())
    }

    async fn stop(&self, run: &BuildRun) -> Result<()> {
        let uri = self.job_uri(&run.job_full_name, &format!("{}/stop", run.number))?;
        debug!("POST {uri}");

        self.send(self.http.post(uri), "Failed to stop build").await
    }
}

fn accepted(status: StatusCode) -> bool {
    status.is_success() || status == StatusCode::FOUND
}

fn rejected(context: &str, response: Response) -> MqmError {
    let status = response.status();
    MqmError::Request {
        context: context.to_string(),
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or_default().to_string(),
        description: String::new(),
    }
}
