//! REPL (Read-Eval-Print Loop) for interactive chat

use crate::ConsoleFormatter;
use std::io::{IsTerminal, Write};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use toolchat_application::ConversationOrchestrator;
use tracing::{debug, info};

/// Slash commands understood by the REPL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Tools,
    Clear,
    Help,
    Quit,
    Unknown(String),
}

impl ReplCommand {
    /// Parse a trimmed input line. `None` means the line is chat input.
    pub fn parse(line: &str) -> Option<Self> {
        if !line.starts_with('/') {
            return None;
        }
        let command = match line {
            "/tools" => ReplCommand::Tools,
            "/clear" => ReplCommand::Clear,
            "/help" | "/h" | "/?" => ReplCommand::Help,
            "/quit" | "/exit" | "/q" => ReplCommand::Quit,
            other => ReplCommand::Unknown(other.to_string()),
        };
        Some(command)
    }
}

/// Interactive chat REPL
pub struct ChatRepl {
    orchestrator: ConversationOrchestrator,
    model: String,
    cancellation: CancellationToken,
}

impl ChatRepl {
    /// Create a new ChatRepl
    pub fn new(orchestrator: ConversationOrchestrator, model: impl Into<String>) -> Self {
        Self {
            orchestrator,
            model: model.into(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Stop reading (and abandon any turn in flight) once `token` fires
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn orchestrator(&self) -> &ConversationOrchestrator {
        &self.orchestrator
    }

    /// Run the REPL on the process stdin/stdout.
    ///
    /// The banner and prompt are only shown when stdin is a terminal.
    pub async fn run(&mut self) -> std::io::Result<()> {
        let interactive = std::io::stdin().is_terminal();
        let stdin = BufReader::new(tokio::io::stdin());
        self.run_with(stdin, std::io::stdout(), interactive).await
    }

    /// Run the REPL until end of input, `/quit` or cancellation.
    pub async fn run_with<R, W>(
        &mut self,
        input: R,
        mut output: W,
        interactive: bool,
    ) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();

        if interactive {
            writeln!(
                output,
                "{}",
                ConsoleFormatter::welcome(&self.model, self.orchestrator.functions().len())
            )?;
        }

        loop {
            if interactive {
                write!(output, "> ")?;
                output.flush()?;
            }

            let line = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => {
                    info!("Interrupted, leaving chat");
                    break;
                }
                line = lines.next_line() => line?,
            };

            let Some(line) = line else {
                debug!("End of input");
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(command) = ReplCommand::parse(line) {
                if self.handle_command(command, &mut output)? {
                    break;
                }
                continue;
            }

            let outcome = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => {
                    info!("Interrupted during a turn, leaving chat");
                    break;
                }
                outcome = self.orchestrator.run_turn(line) => outcome,
            };

            writeln!(output, "{}", ConsoleFormatter::format_outcome(&outcome))?;
            if interactive {
                writeln!(output)?;
            }
        }

        if interactive {
            writeln!(output, "Bye!")?;
        }
        output.flush()
    }

    /// Handle slash commands. Returns true if should exit.
    fn handle_command<W: Write>(
        &mut self,
        command: ReplCommand,
        output: &mut W,
    ) -> std::io::Result<bool> {
        match command {
            ReplCommand::Quit => return Ok(true),
            ReplCommand::Tools => {
                write!(
                    output,
                    "{}",
                    ConsoleFormatter::format_tools(self.orchestrator.functions())
                )?;
            }
            ReplCommand::Clear => {
                self.orchestrator.reset();
                writeln!(output, "Conversation cleared.")?;
            }
            ReplCommand::Help => write!(output, "{}", ConsoleFormatter::help())?,
            ReplCommand::Unknown(cmd) => {
                writeln!(output, "Unknown command: {}", cmd)?;
                writeln!(output, "Type /help for available commands")?;
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{Map, Value, json};
    use std::sync::{Arc, Mutex};
    use toolchat_application::{
        BackendError, CompletionGateway, ExecutionParams, GatewayError, ToolBackend,
    };
    use toolchat_domain::{BackendState, FunctionSpec, Message, ToolDescriptor, ToolResult};

    /// Answers every request with the number of messages it was sent.
    struct CountingGateway {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl CompletionGateway for CountingGateway {
        async fn complete(
            &self,
            history: &[Message],
            _functions: &[FunctionSpec],
        ) -> Result<Message, GatewayError> {
            *self.calls.lock().unwrap() += 1;
            Ok(Message::assistant(format!("seen {}", history.len())))
        }
    }

    struct IdleBackend;

    #[async_trait]
    impl ToolBackend for IdleBackend {
        fn state(&self) -> BackendState {
            BackendState::Ready
        }

        async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BackendError> {
            Ok(vec![])
        }

        async fn call_tool(
            &self,
            name: &str,
            _arguments: Map<String, Value>,
        ) -> Result<ToolResult, BackendError> {
            Ok(ToolResult::success(name, ""))
        }

        async fn close(&self) {}
    }

    fn repl() -> (ChatRepl, Arc<CountingGateway>) {
        colored::control::set_override(false);
        let gateway = Arc::new(CountingGateway {
            calls: Mutex::new(0),
        });
        let functions = vec![FunctionSpec {
            name: "echo".to_string(),
            description: "echoes input".to_string(),
            parameters: json!({"type": "object"}),
        }];
        let orchestrator = ConversationOrchestrator::new(
            gateway.clone(),
            Arc::new(IdleBackend),
            functions,
            ExecutionParams::default(),
        );
        (ChatRepl::new(orchestrator, "gpt-4o"), gateway)
    }

    async fn run(repl: &mut ChatRepl, input: &str) -> String {
        let mut output = Vec::new();
        repl.run_with(input.as_bytes(), &mut output, false)
            .await
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ReplCommand::parse("hello"), None);
        assert_eq!(ReplCommand::parse("/tools"), Some(ReplCommand::Tools));
        assert_eq!(ReplCommand::parse("/q"), Some(ReplCommand::Quit));
        assert_eq!(ReplCommand::parse("/?"), Some(ReplCommand::Help));
        assert_eq!(
            ReplCommand::parse("/nope"),
            Some(ReplCommand::Unknown("/nope".to_string()))
        );
    }

    #[tokio::test]
    async fn test_each_line_is_one_turn_until_eof() {
        let (mut repl, gateway) = repl();

        let output = run(&mut repl, "hello\n\n   \nagain\n").await;

        assert_eq!(*gateway.calls.lock().unwrap(), 2);
        assert_eq!(output, "seen 1\nseen 3\n");
        assert_eq!(repl.orchestrator().history().len(), 4);
    }

    #[tokio::test]
    async fn test_quit_stops_reading() {
        let (mut repl, gateway) = repl();

        run(&mut repl, "/quit\nhello\n").await;

        assert_eq!(*gateway.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_forgets_history() {
        let (mut repl, _) = repl();

        let output = run(&mut repl, "hello\n/clear\nagain\n").await;

        assert!(output.contains("Conversation cleared."));
        assert!(output.ends_with("seen 1\n"));
        assert_eq!(repl.orchestrator().history().len(), 2);
    }

    #[tokio::test]
    async fn test_tools_and_unknown_commands() {
        let (mut repl, gateway) = repl();

        let output = run(&mut repl, "/tools\n/bogus\n").await;

        assert!(output.contains("echo  echoes input"));
        assert!(output.contains("Unknown command: /bogus"));
        assert_eq!(*gateway.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_repl_reads_nothing() {
        let (repl, gateway) = repl();
        let token = CancellationToken::new();
        token.cancel();
        let mut repl = repl.with_cancellation(token);

        run(&mut repl, "hello\n").await;

        assert_eq!(*gateway.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_interactive_mode_prints_banner_and_prompt() {
        let (mut repl, _) = repl();
        let mut output = Vec::new();

        repl.run_with("hi\n".as_bytes(), &mut output, true)
            .await
            .unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("Model: gpt-4o"));
        assert!(output.contains("> seen 1"));
        assert!(output.ends_with("Bye!\n"));
    }
}
