mod progress;
mod styling;
mod tables;

pub use progress::WaitProgress;
use styling::{paint, Tone};
pub use tables::TableView;

/// Prints the mqm-bridge banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        paint("mqm-bridge", Tone::Title),
        paint(env!("CARGO_PKG_VERSION"), Tone::Muted),
        paint("MQM CI integration bridge", Tone::Muted)
    );
}
