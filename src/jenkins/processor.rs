use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use serde::Serialize;

use super::naming::translate_folder_job_name;
use crate::error::{MqmError, Result};

/// Kind of item that contains a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobParent {
    #[default]
    Root,
    Folder,
    /// Multi-branch pipeline; each branch is a child job.
    MultiBranch,
}

/// A job as known to the CI host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostJob {
    pub name: String,
    /// Slash separated path including enclosing folders
    pub full_name: String,
    pub parent: JobParent,
    pub quiet_period: Duration,
}

impl HostJob {
    /// A job identified by its full name, without a quiet period.
    pub fn new(full_name: impl Into<String>, parent: JobParent) -> Self {
        let full_name = full_name.into();
        let name = full_name
            .rsplit('/')
            .next()
            .unwrap_or(full_name.as_str())
            .to_string();
        Self {
            name,
            full_name,
            parent,
            quiet_period: Duration::ZERO,
        }
    }

    pub fn with_quiet_period(mut self, quiet_period: Duration) -> Self {
        self.quiet_period = quiet_period;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildCause {
    pub description: String,
}

impl BuildCause {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }
}

impl Default for BuildCause {
    fn default() -> Self {
        Self::new("Triggered by MQM")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildParameter {
    pub name: String,
    pub value: String,
}

impl BuildParameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Parses `name=value`; the value may itself contain `=`.
impl FromStr for BuildParameter {
    type Err = MqmError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => Ok(Self::new(name.trim(), value)),
            _ => Err(MqmError::Config(format!(
                "Invalid build parameter '{raw}', expected NAME=VALUE"
            ))),
        }
    }
}

/// A single build of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildRun {
    pub job_full_name: String,
    pub number: u64,
    pub display_name: String,
}

impl BuildRun {
    pub fn new(job_full_name: impl Into<String>, number: u64) -> Self {
        Self {
            job_full_name: job_full_name.into(),
            number,
            display_name: format!("#{number}"),
        }
    }
}

impl fmt::Display for BuildRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.job_full_name, self.display_name)
    }
}

/// Build lifecycle operations owned by the CI host.
#[async_trait]
pub trait BuildScheduler: Send + Sync {
    /// Enqueues a build of `job` to start after `delay`.
    async fn schedule(
        &self,
        job: &HostJob,
        delay: Duration,
        cause: &BuildCause,
        parameters: &[BuildParameter],
    ) -> Result<()>;

    /// Aborts a running build.
    async fn stop(&self, run: &BuildRun) -> Result<()>;
}

/// Processor for pipeline (workflow) jobs.
#[derive(Debug)]
pub struct WorkflowJobProcessor<S> {
    job: HostJob,
    scheduler: S,
}

impl<S: BuildScheduler> WorkflowJobProcessor<S> {
    pub fn new(job: HostJob, scheduler: S) -> Self {
        Self { job, scheduler }
    }

    pub fn job(&self) -> &HostJob {
        &self.job
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Asks the host to build the job once its quiet period has elapsed.
    pub async fn schedule_build(&self, cause: BuildCause, parameters: Vec<BuildParameter>) -> Result<()> {
        self.scheduler
            .schedule(&self.job, self.job.quiet_period, &cause, &parameters)
            .await
    }

    /// Stops a build. Failures are logged and otherwise ignored.
    pub async fn stop_build(&self, run: &BuildRun) {
        match self.scheduler.stop(run).await {
            Ok(()) => info!("Build is stopped: {run}"),
            Err(e) => warn!("Failed to stop build '{}': {e}", run.display_name),
        }
    }

    /// Job name as MQM refers to it.
    pub fn translated_job_name(&self) -> String {
        match self.job.parent {
            JobParent::MultiBranch | JobParent::Folder => {
                translate_folder_job_name(&self.job.full_name)
            }
            JobParent::Root => self.job.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Scheduled {
        job: String,
        delay: Duration,
        cause: String,
        parameters: Vec<BuildParameter>,
    }

    #[derive(Default)]
    struct RecordingScheduler {
        scheduled: Mutex<Vec<Scheduled>>,
        stopped: Mutex<Vec<u64>>,
        reject_stop: bool,
    }

    #[async_trait]
    impl BuildScheduler for RecordingScheduler {
        async fn schedule(
            &self,
            job: &HostJob,
            delay: Duration,
            cause: &BuildCause,
            parameters: &[BuildParameter],
        ) -> Result<()> {
            self.scheduled.lock().unwrap().push(Scheduled {
                job: job.full_name.clone(),
                delay,
                cause: cause.description.clone(),
                parameters: parameters.to_vec(),
            });
            Ok(())
        }

        async fn stop(&self, run: &BuildRun) -> Result<()> {
            if self.reject_stop {
                return Err(MqmError::Config("build already finished".into()));
            }
            self.stopped.lock().unwrap().push(run.number);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_schedule_build_uses_quiet_period() {
        let job = HostJob::new("team/nightly", JobParent::Folder)
            .with_quiet_period(Duration::from_secs(5));
        let processor = WorkflowJobProcessor::new(job, RecordingScheduler::default());

        processor
            .schedule_build(
                BuildCause::new("Started from MQM"),
                vec![BuildParameter::new("BRANCH", "main")],
            )
            .await
            .unwrap();

        let scheduled = processor.scheduler().scheduled.lock().unwrap().clone();
        assert_eq!(
            scheduled,
            vec![Scheduled {
                job: "team/nightly".to_string(),
                delay: Duration::from_secs(5),
                cause: "Started from MQM".to_string(),
                parameters: vec![BuildParameter::new("BRANCH", "main")],
            }]
        );
    }

    #[tokio::test]
    async fn test_stop_build_delegates() {
        let processor = WorkflowJobProcessor::new(
            HostJob::new("app", JobParent::Root),
            RecordingScheduler::default(),
        );

        processor.stop_build(&BuildRun::new("app", 12)).await;

        assert_eq!(*processor.scheduler().stopped.lock().unwrap(), vec![12]);
    }

    #[tokio::test]
    async fn test_stop_build_swallows_failure() {
        let scheduler = RecordingScheduler {
            reject_stop: true,
            ..Default::default()
        };
        let processor = WorkflowJobProcessor::new(HostJob::new("app", JobParent::Root), scheduler);

        processor.stop_build(&BuildRun::new("app", 3)).await;

        assert!(processor.scheduler().stopped.lock().unwrap().is_empty());
    }

    #[test]
    fn test_translated_job_name() {
        let branch = WorkflowJobProcessor::new(
            HostJob::new("repo/feature/login", JobParent::MultiBranch),
            RecordingScheduler::default(),
        );
        assert_eq!(branch.translated_job_name(), "repo/job/feature/job/login");

        let foldered = WorkflowJobProcessor::new(
            HostJob::new("team/nightly", JobParent::Folder),
            RecordingScheduler::default(),
        );
        assert_eq!(foldered.translated_job_name(), "team/job/nightly");

        let root = WorkflowJobProcessor::new(
            HostJob::new("nightly", JobParent::Root),
            RecordingScheduler::default(),
        );
        assert_eq!(root.translated_job_name(), "nightly");
    }

    #[test]
    fn test_host_job_name_is_last_segment() {
        let job = HostJob::new("a/b/c", JobParent::Folder);
        assert_eq!(job.name, "c");
        assert_eq!(job.quiet_period, Duration::ZERO);
    }

    #[test]
    fn test_build_parameter_from_str() {
        assert_eq!(
            "URL=http://x?a=b".parse::<BuildParameter>().unwrap(),
            BuildParameter::new("URL", "http://x?a=b")
        );
        assert_eq!(
            "EMPTY=".parse::<BuildParameter>().unwrap(),
            BuildParameter::new("EMPTY", "")
        );
        assert!("novalue".parse::<BuildParameter>().is_err());
        assert!("=x".parse::<BuildParameter>().is_err());
    }
}
