//! Progress reporting: renders the runner's `ProgressEvent` stream with a
//! spinner for scanning and a byte-aware bar for copying, the same two-bar
//! shape the teacher crate's `ProgressReporter` used for its own scan and
//! transfer phases.

use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

use crate::runner::{Phase, ProgressEvent};

pub struct ProgressReporter {
    scan_bar: ProgressBar,
    transfer_bar: ProgressBar,
    transfer_started: bool,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let scan_bar = ProgressBar::new_spinner();
        scan_bar.enable_steady_tick(std::time::Duration::from_millis(120));
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            scan_bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
        }

        let transfer_bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template("{bar:30.cyan/blue} {pos}/{len} files | {msg}") {
            transfer_bar.set_style(style.progress_chars("=>-"));
        }

        Self {
            scan_bar,
            transfer_bar,
            transfer_started: false,
        }
    }

    pub fn start_scan(&self, label: &str) {
        self.scan_bar.set_message(format!("Scanning {}...", label));
    }

    pub fn finish_scan(&self, label: &str, files: usize, bytes: u64) {
        self.scan_bar.finish_with_message(format!("Scanned {}: {} candidates | {}", label, files, HumanBytes(bytes)));
    }

    /// Feed one `ProgressEvent` from the runner into the bar.
    pub fn on_event(&mut self, event: &ProgressEvent) {
        if !self.transfer_started && matches!(event.phase, Phase::Copying | Phase::Retrying | Phase::Failed) {
            self.transfer_bar.set_length(event.total as u64);
            self.transfer_started = true;
        }

        match event.phase {
            Phase::Copying => {
                self.transfer_bar.set_position(event.completed as u64);
                let path = event.target_relative_path.as_ref().map(|p| p.display().to_string()).unwrap_or_default();
                self.transfer_bar.set_message(format!("{} | {}/s", path, HumanBytes(event.throughput_bps as u64)));
            }
            Phase::Retrying => {
                let path = event.target_relative_path.as_ref().map(|p| p.display().to_string()).unwrap_or_default();
                self.transfer_bar.set_message(format!("retry {} for {}", event.retry_attempt, path));
            }
            Phase::Paused => {
                self.transfer_bar.set_message(if event.is_paused { "paused".to_string() } else { "resumed".to_string() });
            }
            Phase::Failed => {
                self.transfer_bar.set_position(event.completed as u64);
                let path = event.target_relative_path.as_ref().map(|p| p.display().to_string()).unwrap_or_default();
                let message = event.message.as_deref().unwrap_or("unknown error");
                self.transfer_bar.println(format!("ERROR {}: {}", path, message));
            }
            Phase::Complete => {
                self.transfer_bar.finish_with_message(format!(
                    "{} succeeded, {} failed | {} | {}/s",
                    event.completed,
                    event.failed_count,
                    HumanBytes(event.bytes_transferred),
                    HumanBytes(event.throughput_bps as u64)
                ));
            }
            Phase::Scanning | Phase::Planning | Phase::CreatingDirectories => {}
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
