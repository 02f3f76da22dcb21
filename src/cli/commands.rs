use crate::llm::ProviderKind;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// LLM-backed debugging assistant
#[derive(Parser, Debug)]
#[command(
    name = "debuglens",
    about = "LLM-backed debugging assistant",
    version,
    long_about = "debuglens sends an error message, code snippet, problem description and/or \
                  log excerpt through staged LLM analysis (error, code, root cause, solution) \
                  and reports the merged findings. Supports OpenAI, Azure OpenAI and Anthropic."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Analyze a bug",
        long_about = "Runs the applicable analysis stages and prints the combined result.\n\
                      At least one of --error, --code, --description or --log is required.\n\n\
                      Examples:\n  \
                      debuglens analyze --error trace.txt\n  \
                      debuglens analyze --error trace.txt --code handler.py --format human\n  \
                      debuglens analyze --description issue.md --provider anthropic --no-kb"
    )]
    Analyze(AnalyzeArgs),

    #[command(about = "Show the resolved configuration (credentials masked)")]
    Config(ConfigArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct AnalyzeArgs {
    #[arg(short = 'e', long = "error", value_name = "FILE", help = "File holding the error message or stack trace")]
    pub error_file: Option<PathBuf>,

    #[arg(long = "code", value_name = "FILE", help = "File holding the relevant code")]
    pub code_file: Option<PathBuf>,

    #[arg(short = 'd', long = "description", value_name = "FILE", help = "File describing the problem")]
    pub description_file: Option<PathBuf>,

    #[arg(short = 'l', long = "log", value_name = "FILE", help = "Log excerpt")]
    pub log_file: Option<PathBuf>,

    #[arg(short = 'p', long, value_parser = parse_provider, help = "LLM provider (openai, azure, anthropic)")]
    pub provider: Option<ProviderKind>,

    #[arg(short = 'm', long, value_name = "MODEL", help = "Model name (Azure: ignored, the deployment decides)")]
    pub model: Option<String>,

    #[arg(short = 'c', long, value_name = "FILE", help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Skip the native SDK and call the provider's HTTP API directly")]
    pub http_only: bool,

    #[arg(long, help = "Do not query the knowledge base for similar bugs")]
    pub no_kb: bool,

    #[arg(
        long,
        value_name = "SECONDS",
        help = "Overall deadline; unfinished stages are reported as cancelled"
    )]
    pub deadline: Option<u64>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "json",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(short = 'c', long, value_name = "FILE", help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

fn parse_provider(s: &str) -> Result<ProviderKind, String> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_verify() {
        CliArgs::command().debug_assert();
    }

    #[test]
    fn test_default_analyze_args() {
        let args = CliArgs::parse_from(["debuglens", "analyze", "--error", "trace.txt"]);
        match args.command {
            Commands::Analyze(analyze) => {
                assert_eq!(analyze.error_file, Some(PathBuf::from("trace.txt")));
                assert_eq!(analyze.format, OutputFormatArg::Json);
                assert!(analyze.provider.is_none());
                assert!(analyze.deadline.is_none());
                assert!(!analyze.http_only);
                assert!(!analyze.no_kb);
            }
            _ => panic!("Expected Analyze command"),
        }
    }

    #[test]
    fn test_analyze_with_options() {
        let args = CliArgs::parse_from([
            "debuglens",
            "analyze",
            "--code",
            "main.py",
            "--description",
            "issue.md",
            "--provider",
            "claude",
            "--model",
            "claude-3-haiku-20240307",
            "--http-only",
            "--no-kb",
            "--deadline",
            "90",
            "--format",
            "yaml",
        ]);

        match args.command {
            Commands::Analyze(analyze) => {
                assert_eq!(analyze.code_file, Some(PathBuf::from("main.py")));
                assert_eq!(analyze.provider, Some(ProviderKind::Anthropic));
                assert_eq!(analyze.model.as_deref(), Some("claude-3-haiku-20240307"));
                assert!(analyze.http_only);
                assert!(analyze.no_kb);
                assert_eq!(analyze.deadline, Some(90));
                assert_eq!(analyze.format, OutputFormatArg::Yaml);
            }
            _ => panic!("Expected Analyze command"),
        }
    }

    #[test]
    fn test_invalid_provider_rejected() {
        let result = CliArgs::try_parse_from(["debuglens", "analyze", "--provider", "gemini"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_config_command() {
        let args = CliArgs::parse_from(["debuglens", "config", "--config", "debuglens.toml"]);
        match args.command {
            Commands::Config(config) => {
                assert_eq!(config.config, Some(PathBuf::from("debuglens.toml")));
                assert_eq!(config.format, OutputFormatArg::Human);
            }
            _ => panic!("Expected Config command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let args = CliArgs::parse_from(["debuglens", "-v", "config"]);
        assert!(args.verbose);
        assert!(!args.quiet);

        let args = CliArgs::parse_from(["debuglens", "--log-level", "debug", "config"]);
        assert_eq!(args.log_level, Some("debug".to_string()));
    }
}
