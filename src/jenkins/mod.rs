//! Adapter between Jenkins jobs and the build lifecycle operations MQM asks for.

mod naming;
mod processor;
mod scheduler;

pub use naming::translate_folder_job_name;
pub use processor::{
    BuildCause, BuildParameter, BuildRun, BuildScheduler, HostJob, JobParent,
    WorkflowJobProcessor,
};
pub use scheduler::JenkinsScheduler;
