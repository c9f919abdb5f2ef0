use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

use mqm_bridge::client::{MqmClient, TestResultSource};
use mqm_bridge::events::{CiBuildResult, CiEvent, CiEventType, CiEventsList, CiServerInfo};
use mqm_bridge::jenkins::{
    BuildCause, BuildParameter, BuildRun, HostJob, JobParent, WorkflowJobProcessor,
};
use mqm_bridge::types::{NewPipeline, ReleaseUpdate, TestResultStatus};

use crate::config::{Config, OutputFormat};
use crate::output::{TableView, WaitProgress};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "mqm-bridge")]
#[command(author, version, about = "MQM CI integration bridge", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    #[arg(short, long, global = true, default_value_t = false)]
    pretty: bool,

    #[arg(short, long, global = true, value_enum)]
    format: Option<OutputFormat>,

    #[command(flatten)]
    mqm: MqmArgs,

    #[command(flatten)]
    ci: JenkinsArgs,
}

#[derive(Args)]
struct MqmArgs {
    /// MQM server URL
    #[arg(long, global = true, env = "MQM_LOCATION")]
    location: Option<String>,

    #[arg(long, global = true, env = "MQM_SHARED_SPACE")]
    shared_space: Option<String>,

    #[arg(short, long, global = true, env = "MQM_WORKSPACE")]
    workspace: Option<i64>,

    /// Identity of this CI server in MQM
    #[arg(long, global = true, env = "MQM_SERVER_IDENTITY")]
    server_identity: Option<String>,

    #[arg(long, global = true, env = "MQM_CLIENT_ID")]
    client_id: Option<String>,

    #[arg(long, global = true, env = "MQM_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    #[arg(long, global = true, env = "MQM_USER")]
    user: Option<String>,

    #[arg(long, global = true, env = "MQM_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

#[derive(Args)]
struct JenkinsArgs {
    #[arg(long, global = true, env = "JENKINS_URL")]
    jenkins_url: Option<String>,

    #[arg(long, global = true, env = "JENKINS_USER")]
    jenkins_user: Option<String>,

    #[arg(long, global = true, env = "JENKINS_TOKEN", hide_env_values = true)]
    jenkins_token: Option<String>,
}

#[derive(Args)]
struct PageArgs {
    /// Substring to match against entity names
    #[arg(short, long)]
    name: Option<String>,

    #[arg(long, default_value_t = 0)]
    offset: usize,

    #[arg(short, long, default_value_t = 100)]
    limit: usize,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a test result report
    PushResults {
        file: PathBuf,

        /// Let the server skip unknown tests instead of rejecting the report
        #[arg(long)]
        skip_errors: bool,

        /// Wait until the server has processed the report
        #[arg(long)]
        wait: bool,
    },

    /// Show the processing status of an uploaded report
    ResultStatus { id: i64 },

    /// List the pipelines registered for a job
    JobConfig {
        #[arg(long)]
        server: Option<String>,

        #[arg(short, long)]
        job: String,
    },

    /// Register a job as a new root pipeline
    CreatePipeline {
        #[arg(long)]
        server: Option<String>,

        #[arg(short, long)]
        job: String,

        #[arg(short, long)]
        name: String,

        #[arg(long)]
        release: Option<i64>,

        /// JSON file describing the job structure
        #[arg(long)]
        structure: PathBuf,
    },

    /// Rename a pipeline or change its release
    UpdatePipeline {
        #[arg(long)]
        server: Option<String>,

        #[arg(short, long)]
        job: String,

        #[arg(long)]
        pipeline: i64,

        #[arg(short, long)]
        name: Option<String>,

        #[arg(long, conflicts_with = "clear_release")]
        release: Option<i64>,

        /// Detach the pipeline from its release
        #[arg(long)]
        clear_release: bool,
    },

    Releases {
        #[command(flatten)]
        page: PageArgs,
    },

    /// Taxonomy items and categories matching a name
    Taxonomies {
        #[command(flatten)]
        page: PageArgs,
    },

    TaxonomyItems {
        /// Restrict to one taxonomy category
        #[arg(long)]
        category: Option<i64>,

        #[command(flatten)]
        page: PageArgs,
    },

    TaxonomyCategories {
        #[command(flatten)]
        page: PageArgs,
    },

    ListItems {
        #[arg(long)]
        list: i64,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Lists that pipeline fields can be picked from
    FieldsMetadata,

    /// Deliver a JSON events payload as is
    SendEvent { file: PathBuf },

    /// Deliver a single build lifecycle event
    BuildEvent {
        #[arg(long = "type", value_enum)]
        event_type: EventKind,

        #[arg(short, long)]
        job: String,

        #[arg(short, long)]
        build: u64,

        #[arg(long, value_enum)]
        result: Option<ResultKind>,

        /// Build duration in milliseconds
        #[arg(long)]
        duration: Option<i64>,
    },

    /// Schedule a Jenkins build
    Trigger {
        #[arg(short, long)]
        job: String,

        /// Build parameter as NAME=VALUE, repeatable
        #[arg(long = "param")]
        params: Vec<BuildParameter>,

        #[arg(long)]
        cause: Option<String>,

        /// The job is a branch of a multi-branch pipeline
        #[arg(long)]
        multi_branch: bool,

        /// Seconds to wait before the build starts
        #[arg(long, default_value_t = 0)]
        quiet_period: u64,
    },

    /// Abort a running Jenkins build
    Stop {
        #[arg(short, long)]
        job: String,

        #[arg(short, long)]
        build: u64,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EventKind {
    Queued,
    Started,
    Finished,
    Scm,
}

impl From<EventKind> for CiEventType {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Queued => Self::Queued,
            EventKind::Started => Self::Started,
            EventKind::Finished => Self::Finished,
            EventKind::Scm => Self::Scm,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResultKind {
    Success,
    Failure,
    Unstable,
    Aborted,
    Unavailable,
}

impl From<ResultKind> for CiBuildResult {
    fn from(kind: ResultKind) -> Self {
        match kind {
            ResultKind::Success => Self::Success,
            ResultKind::Failure => Self::Failure,
            ResultKind::Unstable => Self::Unstable,
            ResultKind::Aborted => Self::Aborted,
            ResultKind::Unavailable => Self::Unavailable,
        }
    }
}

impl Cli {
    /// Loads the configuration file and applies flag and environment overrides.
    fn resolve_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        let server = &mut config.server;
        override_with(&mut server.location, &self.mqm.location);
        override_with(&mut server.shared_space, &self.mqm.shared_space);
        override_with(&mut server.workspace, &self.mqm.workspace);
        override_with(&mut server.server_identity, &self.mqm.server_identity);
        override_with(&mut server.client_id, &self.mqm.client_id);
        override_with(&mut server.client_secret, &self.mqm.client_secret);
        override_with(&mut server.user, &self.mqm.user);
        override_with(&mut server.password, &self.mqm.password);

        let jenkins = &mut config.jenkins;
        override_with(&mut jenkins.url, &self.ci.jenkins_url);
        override_with(&mut jenkins.username, &self.ci.jenkins_user);
        override_with(&mut jenkins.token, &self.ci.jenkins_token);

        if let Some(format) = self.format {
            config.output.format = format;
        }
        if self.pretty {
            config.output.pretty = true;
        }

        Ok(config)
    }

    fn emit<T: Serialize + TableView>(&self, config: &Config, value: &T) -> Result<()> {
        let rendered = match config.output.format {
            OutputFormat::Json if config.output.pretty => serde_json::to_string_pretty(value)?,
            OutputFormat::Json => serde_json::to_string(value)?,
            OutputFormat::Table => value.render_table(),
        };

        if let Some(output_path) = &self.output {
            std::fs::write(output_path, rendered)
                .with_context(|| format!("Failed to write output: {}", output_path.display()))?;
            info!("Output written to: {}", output_path.display());
        } else {
            println!("{}", rendered);
        }

        Ok(())
    }

    async fn execute_push_results(
        &self,
        config: &Config,
        file: &Path,
        skip_errors: bool,
        wait: bool,
    ) -> Result<()> {
        let client = connect(config).await?;
        let id = client
            .post_test_result(TestResultSource::File(file.to_path_buf()), skip_errors)
            .await?;

        if !wait {
            return self.emit(config, &json!({ "id": id }));
        }

        let status = wait_for_status(&client, id).await?;
        self.emit(
            config,
            &json!({ "id": id, "status": status.status, "until": status.until }),
        )?;
        if status.status.eq_ignore_ascii_case("failed") {
            bail!("Test result {id} was rejected by the server");
        }
        Ok(())
    }

    async fn execute_build_event(
        &self,
        config: &Config,
        kind: EventKind,
        job: &str,
        build: u64,
        result: Option<ResultKind>,
        duration: Option<i64>,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut event = CiEvent::new(kind.into(), job, build);
        match kind {
            EventKind::Started => event.start_time = Some(now),
            EventKind::Finished => {
                event.result = result.map(Into::into);
                event.duration = duration;
            }
            EventKind::Queued | EventKind::Scm => {}
        }

        let events = CiEventsList {
            server: CiServerInfo {
                server_type: "jenkins".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                url: config.jenkins.url.clone().unwrap_or_default(),
                instance_id: config.server_identity()?.to_string(),
                sending_time: now,
            },
            events: vec![event],
        };

        let client = connect(config).await?;
        if !client.put_events_list(&events).await {
            bail!("Event delivery to MQM failed");
        }
        self.emit(config, &json!({ "delivered": true, "events": events.events.len() }))
    }

    pub async fn execute(&self) -> Result<()> {
        let config = self.resolve_config()?;

        match &self.command {
            Commands::PushResults {
                file,
                skip_errors,
                wait,
            } => {
                self.execute_push_results(&config, file, *skip_errors, *wait)
                    .await
            }
            Commands::ResultStatus { id } => {
                let client = connect(&config).await?;
                self.emit(&config, &client.get_test_result_status(*id).await?)
            }
            Commands::JobConfig { server, job } => {
                let server = server_identity(server, &config)?;
                let client = connect(&config).await?;
                self.emit(&config, &client.get_job_configuration(server, job).await?)
            }
            Commands::CreatePipeline {
                server,
                job,
                name,
                release,
                structure,
            } => {
                let server = server_identity(server, &config)?;
                let structure = read_json_file(structure)?;
                let pipeline = NewPipeline {
                    name: name.clone(),
                    workspace_id: config.workspace()?,
                    release_id: *release,
                    structure,
                    server: json!({
                        "type": "jenkins",
                        "instanceId": server,
                        "url": config.jenkins.url,
                    }),
                };
                let client = connect(&config).await?;
                self.emit(&config, &client.create_pipeline(server, job, &pipeline).await?)
            }
            Commands::UpdatePipeline {
                server,
                job,
                pipeline,
                name,
                release,
                clear_release,
            } => {
                let server = server_identity(server, &config)?;
                let release = if *clear_release {
                    ReleaseUpdate::Clear
                } else {
                    ReleaseUpdate::from(*release)
                };
                let client = connect(&config).await?;
                let updated = client
                    .update_pipeline_metadata(
                        server,
                        job,
                        *pipeline,
                        name.clone(),
                        config.workspace()?,
                        release,
                    )
                    .await?;
                self.emit(&config, &updated)
            }
            Commands::Releases { page } => {
                let client = connect(&config).await?;
                let releases = client
                    .query_releases(page.name.as_deref(), config.workspace()?, page.offset, page.limit)
                    .await?;
                self.emit(&config, &releases)
            }
            Commands::Taxonomies { page } => {
                let client = connect(&config).await?;
                let taxonomies = client
                    .query_taxonomies(page.name.as_deref(), config.workspace()?, page.offset, page.limit)
                    .await?;
                self.emit(&config, &taxonomies)
            }
            Commands::TaxonomyItems { category, page } => {
                let client = connect(&config).await?;
                let items = client
                    .query_taxonomy_items(
                        *category,
                        page.name.as_deref(),
                        config.workspace()?,
                        page.offset,
                        page.limit,
                    )
                    .await?;
                self.emit(&config, &items)
            }
            Commands::TaxonomyCategories { page } => {
                let client = connect(&config).await?;
                let categories = client
                    .query_taxonomy_categories(
                        page.name.as_deref(),
                        config.workspace()?,
                        page.offset,
                        page.limit,
                    )
                    .await?;
                self.emit(&config, &categories)
            }
            Commands::ListItems { list, page } => {
                let client = connect(&config).await?;
                let items = client
                    .query_list_items(
                        *list,
                        page.name.as_deref(),
                        config.workspace()?,
                        page.offset,
                        page.limit,
                    )
                    .await?;
                self.emit(&config, &items)
            }
            Commands::FieldsMetadata => {
                let client = connect(&config).await?;
                self.emit(&config, &client.get_fields_metadata(config.workspace()?).await?)
            }
            Commands::SendEvent { file } => {
                let payload = read_json_file(file)?;
                let client = connect(&config).await?;
                if !client.put_events(&payload.to_string()).await {
                    bail!("Event delivery to MQM failed");
                }
                self.emit(&config, &json!({ "delivered": true }))
            }
            Commands::BuildEvent {
                event_type,
                job,
                build,
                result,
                duration,
            } => {
                self.execute_build_event(&config, *event_type, job, *build, *result, *duration)
                    .await
            }
            Commands::Trigger {
                job,
                params,
                cause,
                multi_branch,
                quiet_period,
            } => {
                let job = HostJob::new(job.as_str(), job_parent(job, *multi_branch))
                    .with_quiet_period(Duration::from_secs(*quiet_period));
                let processor = WorkflowJobProcessor::new(job, config.jenkins_scheduler()?);
                let cause = cause.as_deref().map(BuildCause::new).unwrap_or_default();

                processor.schedule_build(cause, params.clone()).await?;
                self.emit(
                    &config,
                    &json!({ "job": processor.translated_job_name(), "scheduled": true }),
                )
            }
            Commands::Stop { job, build } => {
                let host_job = HostJob::new(job.as_str(), job_parent(job, false));
                let processor = WorkflowJobProcessor::new(host_job, config.jenkins_scheduler()?);

                processor.stop_build(&BuildRun::new(job.as_str(), *build)).await;
                self.emit(&config, &json!({ "job": job, "build": build, "stopRequested": true }))
            }
        }
    }
}

async fn connect(config: &Config) -> Result<MqmClient> {
    Ok(MqmClient::connect(config.connection_config()?).await?)
}

/// Polls until the server reports a final state.
async fn wait_for_status(client: &MqmClient, id: i64) -> Result<TestResultStatus> {
    let progress = WaitProgress::start(id);
    loop {
        let status = match client.get_test_result_status(id).await {
            Ok(status) => status,
            Err(e) => {
                progress.abandon();
                return Err(e.into());
            }
        };
        if status.is_final() {
            progress.finish(&status);
            return Ok(status);
        }
        progress.update(&status);
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn server_identity<'a>(explicit: &'a Option<String>, config: &'a Config) -> Result<&'a str> {
    match explicit {
        Some(server) => Ok(server),
        None => config.server_identity(),
    }
}

fn job_parent(full_name: &str, multi_branch: bool) -> JobParent {
    if multi_branch {
        JobParent::MultiBranch
    } else if full_name.contains('/') {
        JobParent::Folder
    } else {
        JobParent::Root
    }
}

fn read_json_file(path: &Path) -> Result<Value> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn override_with<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        target.clone_from(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_trigger_with_params() {
        let cli = Cli::try_parse_from([
            "mqm-bridge",
            "trigger",
            "--job",
            "team/app",
            "--param",
            "BRANCH=main",
            "--param",
            "DEPLOY=true",
        ])
        .unwrap();

        match cli.command {
            Commands::Trigger { job, params, .. } => {
                assert_eq!(job, "team/app");
                assert_eq!(
                    params,
                    vec![
                        BuildParameter::new("BRANCH", "main"),
                        BuildParameter::new("DEPLOY", "true")
                    ]
                );
            }
            _ => panic!("expected trigger command"),
        }
    }

    #[test]
    fn test_parse_rejects_malformed_param() {
        assert!(Cli::try_parse_from(["mqm-bridge", "trigger", "--job", "app", "--param", "oops"]).is_err());
    }

    #[test]
    fn test_release_flags_conflict() {
        let result = Cli::try_parse_from([
            "mqm-bridge",
            "update-pipeline",
            "--job",
            "app",
            "--pipeline",
            "5",
            "--release",
            "3",
            "--clear-release",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let file = tempfile::NamedTempFile::with_suffix(".toml").unwrap();
        std::fs::write(
            file.path(),
            "[server]\nlocation = \"http://from-file\"\nshared-space = \"1\"\nworkspace = 2\n",
        )
        .unwrap();
        let config_path = file.path().to_str().unwrap();

        let cli = Cli::try_parse_from([
            "mqm-bridge",
            "--config",
            config_path,
            "--location",
            "http://from-flag",
            "--format",
            "table",
            "fields-metadata",
        ])
        .unwrap();
        let config = cli.resolve_config().unwrap();

        assert_eq!(config.server.location.as_deref(), Some("http://from-flag"));
        assert_eq!(config.server.shared_space.as_deref(), Some("1"));
        assert_eq!(config.server.workspace, Some(2));
        assert_eq!(config.output.format, OutputFormat::Table);
    }

    #[test]
    fn test_job_parent_detection() {
        assert_eq!(job_parent("app", false), JobParent::Root);
        assert_eq!(job_parent("team/app", false), JobParent::Folder);
        assert_eq!(job_parent("repo/main", true), JobParent::MultiBranch);
    }
}
