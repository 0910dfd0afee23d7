//! `bulkq` - run one SQL script against many databases

mod commands;
mod logging;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "bulkq", version, about = "Run one SQL script against many databases")]
struct Cli {
    /// Settings file to use instead of the default location
    #[arg(long, global = true, env = "BULKQ_CONFIG")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also write JSON logs to a daily rolling file in this directory
    #[arg(long, global = true, env = "BULKQ_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Write JSON logs to the default log directory
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a script against the selected databases
    Run(RunArgs),
    /// Manage configured servers
    #[command(subcommand)]
    Servers(ServersCommand),
    /// Choose which databases of a server take part in runs
    Select {
        server: String,
        databases: Vec<String>,
    },
    /// List the databases on a server
    Databases { server: String },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Read the script from a file ("-" for stdin)
    #[arg(short, long, conflicts_with = "query", required_unless_present = "query")]
    file: Option<PathBuf>,

    /// Script text
    #[arg(short, long)]
    query: Option<String>,

    /// Restrict the run to these servers (repeatable)
    #[arg(short, long = "server")]
    servers: Vec<String>,

    /// Per-statement timeout in seconds, 0 to disable [default: from settings]
    #[arg(short, long)]
    timeout: Option<u64>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

#[derive(Debug, Subcommand)]
enum ServersCommand {
    /// List configured servers and their selected databases
    List,
    /// Add a server
    Add(AddServerArgs),
    /// Remove a server
    Remove { name: String },
}

#[derive(Debug, Args)]
struct AddServerArgs {
    /// Display name
    name: String,

    #[arg(long, default_value = "mssql")]
    driver: String,

    #[arg(long, default_value = "localhost")]
    host: String,

    #[arg(long)]
    port: Option<u16>,

    #[arg(short, long)]
    user: Option<String>,

    #[arg(long, env = "BULKQ_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Trust the server certificate without validation
    #[arg(long)]
    trust_cert: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_dir = cli
        .log_dir
        .clone()
        .or_else(|| cli.log_file.then(logging::log_directory));
    let _log_guard = match logging::init(logging::LoggingConfig::from_verbosity(
        cli.verbose,
        log_dir,
    )) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("warning: failed to initialize logging: {e:#}");
            None
        }
    };

    match commands::dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
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
    fn test_run_requires_a_script() {
        assert!(Cli::try_parse_from(["bulkq", "run"]).is_err());
        assert!(Cli::try_parse_from(["bulkq", "run", "-f", "a.sql", "-q", "SELECT 1"]).is_err());

        let cli = Cli::try_parse_from([
            "bulkq", "run", "-q", "SELECT 1", "-s", "east", "-s", "west", "--format", "csv",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.servers, vec!["east", "west"]);
        assert_eq!(args.format, OutputFormat::Csv);
        assert_eq!(args.timeout, None);
    }
}
