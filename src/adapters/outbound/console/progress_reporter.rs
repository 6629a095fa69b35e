use crate::ports::outbound::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard};

const STAGE_TEMPLATE: &str = "   {spinner:.green} [{bar:30.cyan/blue}] stage {pos}/{len} {msg}";

/// Writes `score` progress to stderr, keeping stdout free for JSON reports.
///
/// Stage progress is drawn as an indicatif bar. Plain messages printed while
/// the bar is live go through the bar so the two never interleave.
pub struct StderrProgressReporter {
    stage_bar: Mutex<Option<ProgressBar>>,
}

impl StderrProgressReporter {
    pub fn new() -> Self {
        Self {
            stage_bar: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.stage_bar
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn print(&self, message: &str) {
        match self.slot().as_ref() {
            Some(bar) => bar.println(message),
            None => eprintln!("{message}"),
        }
    }

    fn clear_bar(&self) {
        if let Some(bar) = self.slot().take() {
            bar.finish_and_clear();
        }
    }
}

impl Default for StderrProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for StderrProgressReporter {
    fn report(&self, message: &str) {
        self.print(message);
    }

    fn report_progress(&self, current: usize, total: usize, message: Option<&str>) {
        let mut slot = self.slot();
        let bar = slot.get_or_insert_with(|| {
            let style = ProgressStyle::default_bar()
                .template(STAGE_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-");
            ProgressBar::new(total as u64).with_style(style)
        });
        bar.set_length(total as u64);
        bar.set_position(current as u64);
        if let Some(stage) = message {
            bar.set_message(stage.to_string());
        }
    }

    fn report_error(&self, message: &str) {
        self.print(message);
    }

    fn report_completion(&self, message: &str) {
        self.clear_bar();
        eprintln!("\n{message}");
    }
}
