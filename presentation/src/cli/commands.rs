//! CLI command definitions

use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for toolchat
#[derive(Parser, Debug)]
#[command(name = "toolchat")]
#[command(author, version, about = "Chat with an Azure OpenAI model that can call MCP tools")]
#[command(long_about = r#"
toolchat starts an MCP tool server, hands its tools to an Azure OpenAI
deployment and relays a line-based conversation on stdin/stdout. Whenever
the model asks for a tool, the call is forwarded to the tool server and
the result is fed back to the model.

Required settings (environment, .env or config file):
  AZURE_OPENAI_ENDPOINT   e.g. https://my-resource.openai.azure.com
  AZURE_OPENAI_MODEL      deployment name

Configuration files are loaded from (in priority order):
1. --config <path>     Explicit config file
2. ./toolchat.toml     Project-level config
3. ~/.config/toolchat/config.toml   Global config

Chat commands:
  /tools   list the tools offered by the server
  /clear   start a fresh conversation
  /quit    exit

Example:
  AZURE_OPENAI_ENDPOINT=https://res.openai.azure.com AZURE_OPENAI_MODEL=gpt-4o toolchat
  toolchat --config ./toolchat.toml -v
"#)]
pub struct Cli {
    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress indicators
    #[arg(short, long)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long)]
    pub no_config: bool,

    /// Show configuration sources and the effective configuration, then exit
    #[arg(long)]
    pub show_config: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    /// Default log filter for the requested verbosity.
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_arguments() {
        let cli = Cli::try_parse_from(["toolchat"]).unwrap();
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
        assert!(cli.config.is_none());
        assert_eq!(cli.log_level(), "warn");
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "toolchat",
            "-vv",
            "--quiet",
            "--config",
            "custom.toml",
            "--log-file",
            "chat.log",
        ])
        .unwrap();
        assert_eq!(cli.log_level(), "debug");
        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert_eq!(cli.log_file, Some(PathBuf::from("chat.log")));
    }

    #[test]
    fn test_positional_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["toolchat", "hello"]).is_err());
    }
}
