//! Terminal progress rendering for the CLI (C9, ambient).

mod progress;

pub use progress::ProgressReporter;
