//! Progress reporting for conversation turns

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;
use toolchat_application::TurnProgress;
use toolchat_domain::ToolCallRequest;
use toolchat_domain::util::preview;

/// Shows a spinner while the model is thinking and one line per tool call.
///
/// Everything is drawn on stderr so stdout carries only the conversation.
pub struct TurnProgressReporter {
    spinner: Mutex<Option<ProgressBar>>,
}

impl TurnProgressReporter {
    pub fn new() -> Self {
        Self {
            spinner: Mutex::new(None),
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn start_spinner(&self, message: String) {
        let Ok(mut slot) = self.spinner.lock() else {
            return;
        };
        if let Some(old) = slot.take() {
            old.finish_and_clear();
        }
        let pb = ProgressBar::new_spinner();
        pb.set_style(Self::spinner_style());
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        *slot = Some(pb);
    }

    fn stop_spinner(&self) {
        if let Ok(mut slot) = self.spinner.lock()
            && let Some(pb) = slot.take()
        {
            pb.finish_and_clear();
        }
    }

    fn tool_line(call: &ToolCallRequest, success: bool) -> String {
        let mark = if success { "v".green() } else { "x".red() };
        format!(
            "  {} {} {}",
            mark,
            call.tool_name.bold(),
            preview(&call.arguments, 60).dimmed()
        )
    }
}

impl Default for TurnProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnProgress for TurnProgressReporter {
    fn on_completion_started(&self, round: usize) {
        let message = if round <= 1 {
            "Thinking...".to_string()
        } else {
            format!("Thinking... (round {})", round)
        };
        self.start_spinner(message);
    }

    fn on_completion_finished(&self) {
        self.stop_spinner();
    }

    fn on_tool_call_started(&self, call: &ToolCallRequest) {
        self.start_spinner(format!("Running {}", call.tool_name.cyan()));
    }

    fn on_tool_call_finished(&self, call: &ToolCallRequest, success: bool) {
        self.stop_spinner();
        eprintln!("{}", Self::tool_line(call, success));
    }
}
