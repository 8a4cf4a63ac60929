//! CLI presenter for output formatting

use std::time::Duration;

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

use crate::domain::transcription::TranscriptionStatus;

/// Presenter for CLI output formatting
pub struct Presenter {
    spinner: Option<ProgressBar>,
}

impl Presenter {
    /// Create a new presenter
    pub fn new() -> Self {
        Self { spinner: None }
    }

    /// Start a spinner with message
    pub fn start_spinner(&mut self, message: &str) {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(80));
        self.spinner = Some(spinner);
    }

    /// Update spinner message
    pub fn update_spinner(&self, message: &str) {
        if let Some(ref spinner) = self.spinner {
            spinner.set_message(message.to_string());
        }
    }

    /// Print a line above the spinner without disturbing it
    pub fn spinner_println(&self, message: &str) {
        match self.spinner {
            Some(ref spinner) => spinner.println(message),
            None => eprintln!("{}", message),
        }
    }

    /// Mark spinner as success and finish
    pub fn spinner_success(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_with_message(format!("{} {}", "✓".green(), message));
        }
    }

    /// Mark spinner as failed and finish
    pub fn spinner_fail(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_with_message(format!("{} {}", "✗".red(), message));
        }
    }

    /// Print info message to stderr
    pub fn info(&self, message: &str) {
        eprintln!("{} {}", "ℹ".cyan(), message);
    }

    /// Print success message to stderr
    pub fn success(&self, message: &str) {
        eprintln!("{} {}", "✓".green(), message);
    }

    /// Print warning message to stderr
    pub fn warn(&self, message: &str) {
        eprintln!("{} {}", "⚠".yellow(), message);
    }

    /// Print error message to stderr
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Output text to stdout (transcripts, ids, URLs)
    pub fn output(&self, text: &str) {
        println!("{}", text);
    }

    /// Print a key-value pair (for config list and status)
    pub fn key_value(&self, key: &str, value: &str) {
        println!("{}: {}", key.cyan(), value);
    }

    /// Status word colored by outcome
    pub fn status_label(&self, status: TranscriptionStatus) -> ColoredString {
        let label = status.as_str();
        match status {
            TranscriptionStatus::Pending => label.yellow(),
            TranscriptionStatus::Processing => label.cyan(),
            TranscriptionStatus::Completed => label.green(),
            TranscriptionStatus::Error => label.red(),
        }
    }

    /// One-line summary of queue progress for the spinner
    pub fn format_progress(&self, done: usize, failed: usize, total: usize) -> String {
        let mut line = format!("Transcribing... {}/{} done", done, total);
        if failed > 0 {
            line.push_str(&format!(", {} failed", failed));
        }
        line
    }
}

impl Default for Presenter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_progress_without_failures() {
        let presenter = Presenter::new();
        assert_eq!(presenter.format_progress(1, 0, 3), "Transcribing... 1/3 done");
    }

    #[test]
    fn format_progress_with_failures() {
        let presenter = Presenter::new();
        let line = presenter.format_progress(2, 1, 3);
        assert!(line.contains("2/3 done"));
        assert!(line.contains("1 failed"));
    }

    #[test]
    fn status_label_uses_wire_name() {
        let presenter = Presenter::new();
        let label = presenter.status_label(TranscriptionStatus::Processing);
        assert_eq!(&*label, "processing");
    }
}
