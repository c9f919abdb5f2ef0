use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mqm_bridge::auth::{Credentials, Secret};
use mqm_bridge::client::{ConnectionConfig, DEFAULT_CLIENT_TYPE};
use mqm_bridge::jenkins::JenkinsScheduler;

const CONFIG_NAME: &str = "mqm-bridge";

/// Configuration file structure for mqm-bridge.
///
/// Holds the MQM server connection, the Jenkins instance used for build
/// triggers, and output preferences. Command line flags and environment
/// variables take precedence over values read from the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub jenkins: JenkinsConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// MQM server base URL
    pub location: Option<String>,

    pub shared_space: Option<String>,

    /// Default workspace for pipeline and entity operations
    pub workspace: Option<i64>,

    /// Identity of this CI server as registered in MQM
    pub server_identity: Option<String>,

    #[serde(default = "default_client_type")]
    pub client_type: String,

    pub user: Option<String>,
    pub password: Option<String>,

    /// API access key
    pub client_id: Option<String>,
    pub client_secret: Option<String>,

    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JenkinsConfig {
    pub url: Option<String>,
    pub username: Option<String>,
    /// Jenkins API token
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Table,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            location: None,
            shared_space: None,
            workspace: None,
            server_identity: None,
            client_type: default_client_type(),
            user: None,
            password: None,
            client_id: None,
            client_secret: None,
            timeout_secs: None,
        }
    }
}

fn default_client_type() -> String {
    DEFAULT_CLIENT_TYPE.to_string()
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./mqm-bridge.toml
    /// 3. ./mqm-bridge.json
    /// 4. ./mqm-bridge.yaml
    /// 5. ./mqm-bridge.yml
    /// 6. `<user config dir>/mqm-bridge/config.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = ["toml", "json", "yaml", "yml"]
            .iter()
            .map(|ext| PathBuf::from(format!("{CONFIG_NAME}.{ext}")))
            .chain(user_config_path());

        for candidate in candidates {
            if candidate.exists() {
                return Self::load_from_path(&candidate);
            }
        }

        Ok(Self::default())
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let parsed = match ConfigFormat::of(path) {
            Some(format) => format.parse(&contents),
            None => [ConfigFormat::Toml, ConfigFormat::Json, ConfigFormat::Yaml]
                .iter()
                .find_map(|format| format.parse(&contents).ok())
                .context("no supported format matched"),
        };
        parsed.with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Builds the MQM connection settings.
    ///
    /// An API key takes precedence over user credentials; with neither, the
    /// connection is anonymous.
    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        let server = &self.server;
        let location = server
            .location
            .as_deref()
            .context("MQM server location is not configured (server.location or MQM_LOCATION)")?;
        let shared_space = server
            .shared_space
            .as_deref()
            .context("MQM shared space is not configured (server.shared-space or MQM_SHARED_SPACE)")?;

        let mut config = ConnectionConfig::new(location, shared_space)?
            .with_client_type(server.client_type.clone());

        let credentials = match (&server.client_id, &server.client_secret, &server.user, &server.password) {
            (Some(client_id), Some(secret), _, _) => Some(Credentials::ApiKey {
                client_id: client_id.clone(),
                client_secret: Secret::from(secret.as_str()),
            }),
            (_, _, Some(user), Some(password)) => Some(Credentials::User {
                user: user.clone(),
                password: Secret::from(password.as_str()),
            }),
            _ => None,
        };
        if let Some(credentials) = credentials {
            config = config.with_credentials(credentials);
        }
        if let Some(secs) = server.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }

        Ok(config)
    }

    pub fn workspace(&self) -> Result<i64> {
        self.server
            .workspace
            .context("MQM workspace is not configured (server.workspace or MQM_WORKSPACE)")
    }

    pub fn server_identity(&self) -> Result<&str> {
        self.server
            .server_identity
            .as_deref()
            .context("CI server identity is not configured (server.server-identity or MQM_SERVER_IDENTITY)")
    }

    pub fn jenkins_scheduler(&self) -> Result<JenkinsScheduler> {
        let jenkins = &self.jenkins;
        let url = jenkins
            .url
            .as_deref()
            .context("Jenkins URL is not configured (jenkins.url or JENKINS_URL)")?;

        let scheduler = JenkinsScheduler::new(url)?;
        Ok(match (&jenkins.username, &jenkins.token) {
            (Some(username), Some(token)) => {
                scheduler.with_credentials(username.clone(), Secret::from(token.as_str()))
            }
            _ => scheduler,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Json,
    Yaml,
}

impl ConfigFormat {
    /// Format named by the file extension; `None` when it must be guessed.
    fn of(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }

    fn parse(self, contents: &str) -> Result<Config> {
        Ok(match self {
            Self::Toml => toml::from_str(contents)?,
            Self::Json => serde_json::from_str(contents)?,
            Self::Yaml => serde_yaml::from_str(contents)?,
        })
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_NAME).join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.client_type, "HPE_CI_CLIENT");
        assert!(config.server.location.is_none());
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(!config.output.pretty);
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[server]
location = "https://mqm.example.com"
shared-space = "1001"
workspace = 1002
client-id = "ci_key"
client-secret = "secret"
timeout-secs = 30

[jenkins]
url = "https://jenkins.example.com"
username = "ci"
token = "api-token"

[output]
format = "table"
pretty = true
"#;
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.server.location.as_deref(), Some("https://mqm.example.com"));
        assert_eq!(config.server.workspace, Some(1002));
        assert_eq!(config.server.client_type, "HPE_CI_CLIENT");
        assert_eq!(config.jenkins.username.as_deref(), Some("ci"));
        assert_eq!(config.output.format, OutputFormat::Table);
        assert!(config.output.pretty);
    }

    #[test]
    fn test_load_json_config() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        let json_content = r#"{
  "server": {
    "location": "http://localhost:8080",
    "shared-space": "2002",
    "client-type": "CUSTOM"
  }
}"#;
        write!(temp_file, "{}", json_content).unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.server.shared_space.as_deref(), Some("2002"));
        assert_eq!(config.server.client_type, "CUSTOM");
        assert_eq!(config.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_load_unknown_extension_falls_back_to_yaml() {
        let mut temp_file = NamedTempFile::with_suffix(".conf").unwrap();
        write!(temp_file, "server:\n  location: http://yaml.example.com\n  workspace: 7\n").unwrap();

        let config = Config::load_from_path(temp_file.path()).unwrap();
        assert_eq!(config.server.location.as_deref(), Some("http://yaml.example.com"));
        assert_eq!(config.server.workspace, Some(7));
    }

    #[test]
    fn test_config_format_from_extension() {
        assert_eq!(ConfigFormat::of(Path::new("a.yml")), Some(ConfigFormat::Yaml));
        assert_eq!(ConfigFormat::of(Path::new("a.toml")), Some(ConfigFormat::Toml));
        assert_eq!(ConfigFormat::of(Path::new("a.conf")), None);
        assert_eq!(ConfigFormat::of(Path::new("noext")), None);
    }

    #[test]
    fn test_load_malformed_json_fails() {
        let mut temp_file = NamedTempFile::with_suffix(".json").unwrap();
        write!(temp_file, "{{ not json").unwrap();

        let err = Config::load_from_path(temp_file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        assert!(Config::load(Some(Path::new("/nonexistent/mqm-bridge.toml"))).is_err());
    }

    #[test]
    fn test_connection_config_prefers_api_key() {
        let mut config = Config::default();
        config.server.location = Some("https://mqm.example.com".to_string());
        config.server.shared_space = Some("1001".to_string());
        config.server.client_id = Some("ci_key".to_string());
        config.server.client_secret = Some("secret".to_string());
        config.server.user = Some("admin".to_string());
        config.server.password = Some("pass".to_string());
        config.server.timeout_secs = Some(15);

        let connection = config.connection_config().unwrap();
        assert_eq!(connection.credentials().map(|c| c.principal()), Some("ci_key"));
        assert_eq!(connection.timeout(), Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_connection_config_requires_location() {
        let mut config = Config::default();
        config.server.shared_space = Some("1001".to_string());

        let err = config.connection_config().unwrap_err();
        assert!(err.to_string().contains("location"));
    }

    #[test]
    fn test_workspace_missing() {
        assert!(Config::default().workspace().is_err());
    }
}
