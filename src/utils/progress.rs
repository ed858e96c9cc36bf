//! Progress spinner helpers using indicatif

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::Stage;
use crate::pipeline::RunObserver;

/// Create a spinner for indeterminate progress
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("    {spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Finish a progress bar with a success message
pub fn finish_with_success(pb: &ProgressBar, message: &str) {
    pb.finish_with_message(format!("✅ {}", message));
}

fn stage_verb(stage: Stage) -> &'static str {
    match stage {
        Stage::Config => "Reading config",
        Stage::Loader => "Loading",
        Stage::Cleaner => "Cleaning",
        Stage::Deriver => "Deriving columns for",
        Stage::Reshaper => "Reshaping",
        Stage::Aggregator => "Aggregating",
        Stage::Modeler => "Fitting model on",
        Stage::Reporter => "Reporting",
    }
}

/// Drives one spinner per pipeline stage.
#[derive(Default)]
pub struct SpinnerObserver {
    current: Option<ProgressBar>,
    hidden: bool,
}

impl SpinnerObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observer that draws nothing (used with --quiet)
    pub fn hidden() -> Self {
        Self {
            current: None,
            hidden: true,
        }
    }

    /// Clear a spinner left running by a failed stage.
    pub fn abandon(&mut self) {
        if let Some(pb) = self.current.take() {
            pb.abandon();
        }
    }
}

impl RunObserver for SpinnerObserver {
    fn stage_started(&mut self, dataset: &str, stage: Stage) {
        if self.hidden {
            return;
        }
        self.abandon();
        self.current = Some(create_spinner(&format!("{} {}...", stage_verb(stage), dataset)));
    }

    fn stage_finished(&mut self, dataset: &str, stage: Stage, shape: (usize, usize)) {
        if let Some(pb) = self.current.take() {
            finish_with_success(
                &pb,
                &format!("{} {} ({} × {})", stage, dataset, shape.0, shape.1),
            );
        }
    }
}
