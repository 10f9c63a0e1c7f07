use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::flow::{FlowEvent, FlowState, FlowStep};
use crate::submission::SubmissionState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    disable_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, disable_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            disable_pretty,
        }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool, disable_pretty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty, disable_pretty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.disable_pretty,
                UiMode::Plain => false,
            }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }

    /// Step header, e.g. `[2/4] Selfie`.
    pub fn step_banner(&self, step: FlowStep) -> String {
        format!("[{}/{}] {}", step.number(), FlowStep::ALL.len(), step.label())
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }

    pub fn set_message(&self, message: &str) {
        match &self.spinner {
            Some(spinner) => spinner.set_message(message.to_string()),
            None => eprintln!("    {}", message),
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

/// Turns the controller's event stream into terminal output.
pub struct EventRenderer {
    ui: Ui,
    stage: Option<StageGuard>,
}

impl EventRenderer {
    pub fn new(ui: Ui) -> Self {
        Self { ui, stage: None }
    }

    pub fn handle(&mut self, event: &FlowEvent) {
        match event {
            FlowEvent::StateChanged(FlowState::Submitting) => {
                self.stage = Some(self.ui.stage("Submitting"));
            }
            FlowEvent::StateChanged(state) => {
                eprintln!("{}", self.ui.step_banner(state.step()));
            }
            FlowEvent::Status(message) => {
                if let Some(stage) = &self.stage {
                    stage.set_message(message);
                }
            }
            FlowEvent::Notice(message) => eprintln!("! {}", message),
            FlowEvent::Resolved(outcome) => {
                self.stage = None;
                println!("{}", outcome_line(outcome));
            }
        }
    }
}

fn outcome_line(outcome: &SubmissionState) -> String {
    outcome.message().unwrap_or("(no outcome)").to_string()
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_mode_never_uses_spinner() {
        let ui = Ui::from_args(Some("plain"), true, false);
        assert!(!ui.use_pretty());
        let ui = Ui::from_args(Some("pretty"), false, false);
        assert!(!ui.use_pretty());
        let ui = Ui::from_args(None, true, true);
        assert!(!ui.use_pretty());
        let ui = Ui::from_args(None, true, false);
        assert!(ui.use_pretty());
    }

    #[test]
    fn banner_counts_steps() {
        let ui = Ui::new(UiMode::Plain, false, false);
        assert_eq!(ui.step_banner(FlowStep::Selfie), "[2/4] Selfie");
    }

    #[test]
    fn durations_switch_units() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
