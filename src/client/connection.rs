use std::time::Duration;

use url::Url;

use crate::auth::Credentials;
use crate::error::{MqmError, Result};

pub const DEFAULT_CLIENT_TYPE: &str = "HPE_CI_CLIENT";

/// Where and as whom to connect to the MQM server.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    location: Url,
    shared_space: String,
    client_type: String,
    credentials: Option<Credentials>,
    timeout: Option<Duration>,
}

impl ConnectionConfig {
    /// Creates a configuration for the given server location and shared space.
    ///
    /// # Errors
    ///
    /// Returns an error if the location is not a valid base URL or the shared
    /// space is empty.
    pub fn new(location: &str, shared_space: &str) -> Result<Self> {
        let mut location = Url::parse(location.trim())
            .map_err(|e| MqmError::Config(format!("Invalid server location: {e}")))?;
        if location.cannot_be_a_base() {
            return Err(MqmError::Config(format!(
                "Server location cannot be used as a base URL: {location}"
            )));
        }
        if !location.path().ends_with('/') {
            let path = format!("{}/", location.path());
            location.set_path(&path);
        }

        let shared_space = shared_space.trim();
        if shared_space.is_empty() {
            return Err(MqmError::Config("Shared space must not be empty".into()));
        }

        Ok(Self {
            location,
            shared_space: shared_space.to_string(),
            client_type: DEFAULT_CLIENT_TYPE.to_string(),
            credentials: None,
            timeout: None,
        })
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_client_type(mut self, client_type: impl Into<String>) -> Self {
        self.client_type = client_type.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn shared_space(&self) -> &str {
        &self.shared_space
    }

    pub fn client_type(&self) -> &str {
        &self.client_type
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn sign_in_uri(&self) -> Result<Url> {
        self.join("authentication/sign_in")
    }

    /// `{location}/internal-api/shared_spaces/{sharedSpace}/{template}`
    pub(crate) fn shared_space_internal_api_uri(
        &self,
        template: &str,
        params: &[&str],
    ) -> Result<Url> {
        self.join(&format!(
            "internal-api/shared_spaces/{}/{}",
            urlencoding::encode(&self.shared_space),
            expand_template(template, params)
        ))
    }

    /// `{location}/api/shared_spaces/{sharedSpace}/workspaces/{workspaceId}/{template}`
    pub(crate) fn workspace_api_uri(
        &self,
        workspace_id: i64,
        template: &str,
        params: &[&str],
    ) -> Result<Url> {
        self.join(&format!(
            "api/shared_spaces/{}/workspaces/{workspace_id}/{}",
            urlencoding::encode(&self.shared_space),
            expand_template(template, params)
        ))
    }

    fn join(&self, path: &str) -> Result<Url> {
        self.location
            .join(path)
            .map_err(|e| MqmError::Config(format!("Invalid request URI '{path}': {e}")))
    }
}

/// Substitutes `{0}`, `{1}`, ... with percent-encoded path segments.
pub(crate) fn expand_template(template: &str, params: &[&str]) -> String {
    params
        .iter()
        .enumerate()
        .fold(template.to_string(), |uri, (index, param)| {
            uri.replace(&format!("{{{index}}}"), &urlencoding::encode(param))
        })
}
