//! Console output formatter for conversation turns

use colored::Colorize;
use toolchat_application::TurnOutcome;
use toolchat_domain::FunctionSpec;
use toolchat_domain::util::preview;

/// Formats conversation output for console display
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    /// Banner printed once the session is up
    pub fn welcome(model: &str, tool_count: usize) -> String {
        let mut output = String::new();
        output.push_str(&Self::header("toolchat"));
        output.push_str(&format!("{} {}\n", "Model:".cyan().bold(), model));
        output.push_str(&format!("{} {}\n", "Tools:".cyan().bold(), tool_count));
        output.push_str(&format!(
            "{}\n",
            "Type /help for commands, Ctrl-D or /quit to exit.".dimmed()
        ));
        output
    }

    /// What the user sees at the end of a turn
    pub fn format_outcome(outcome: &TurnOutcome) -> String {
        match outcome {
            TurnOutcome::Answered { text, .. } => text.clone(),
            TurnOutcome::RoundLimitReached { text, tool_rounds } => format!(
                "{}\n{}",
                text,
                format!("(stopped after {} tool rounds)", tool_rounds).yellow()
            ),
            TurnOutcome::Abandoned { apology, error } => format!(
                "{}\n{}",
                apology.red(),
                format!("An error occurred: {}", preview(error, 200)).dimmed()
            ),
        }
    }

    /// `/tools` listing
    pub fn format_tools(functions: &[FunctionSpec]) -> String {
        if functions.is_empty() {
            return "No tools available.".dimmed().to_string();
        }

        let width = functions.iter().map(|f| f.name.len()).max().unwrap_or(0);
        let mut output = format!("{} ({})\n", "Tools".cyan().bold(), functions.len());
        for function in functions {
            output.push_str(&format!(
                "  {:<width$}  {}\n",
                function.name.green(),
                preview(&function.description, 80),
                width = width
            ));
        }
        output
    }

    pub fn help() -> String {
        let mut output = format!("{}\n", "Commands:".cyan().bold());
        output.push_str("  /tools            - List available tools\n");
        output.push_str("  /clear            - Start a new conversation\n");
        output.push_str("  /help, /h, /?     - Show this help\n");
        output.push_str("  /quit, /exit, /q  - Exit chat\n");
        output
    }

    fn header(title: &str) -> String {
        let line = "=".repeat(50);
        format!("{}\n{}\n{}\n", line.blue(), title.bold(), line.blue())
    }
}
