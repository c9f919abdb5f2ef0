use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use mqm_bridge::types::TestResultStatus;

use super::styling::{paint, status_tone, Tone};

const TICK: Duration = Duration::from_millis(120);

/// Spinner shown on stderr while the server processes uploaded test results.
pub struct WaitProgress {
    pb: ProgressBar,
    id: i64,
}

impl WaitProgress {
    pub fn start(id: i64) -> Self {
        let pb = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        if let Ok(template) = ProgressStyle::with_template("  {spinner} {msg} {elapsed:.dim}") {
            pb.set_style(template);
        }
        pb.enable_steady_tick(TICK);

        let progress = Self { pb, id };
        progress.show("queued", Tone::Pending);
        progress
    }

    pub fn update(&self, status: &TestResultStatus) {
        self.show(&status.status, Tone::Pending);
    }

    pub fn finish(self, status: &TestResultStatus) {
        let text = format!("Test results {}: {}", self.id, status.status);
        self.pb
            .finish_with_message(paint(text, status_tone(&status.status)).to_string());
    }

    pub fn abandon(self) {
        self.pb.abandon();
    }

    fn show(&self, status: &str, tone: Tone) {
        self.pb
            .set_message(paint(format!("Test results {}: {status}", self.id), tone).to_string());
    }
}
