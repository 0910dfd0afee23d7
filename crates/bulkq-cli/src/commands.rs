//! Subcommand implementations

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use bulkq_core::ConnectionConfig;
use bulkq_drivers::DriverRegistry;
use bulkq_query::BulkQueryEngine;
use bulkq_settings::{BulkqSettings, ServerDefinition};
use comfy_table::{Table, presets::UTF8_FULL};

use crate::output::{self, OutputFormat};
use crate::{AddServerArgs, Cli, Command, RunArgs, ServersCommand};

/// Exit code when the run completed but some targets reported messages
const EXIT_PARTIAL: u8 = 2;

pub async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let settings_path = match cli.config {
        Some(path) => path,
        None => BulkqSettings::settings_path()?,
    };
    tracing::debug!(path = %settings_path.display(), "using settings file");

    match cli.command {
        Command::Run(args) => run(&settings_path, args).await,
        Command::Servers(ServersCommand::List) => list_servers(&settings_path),
        Command::Servers(ServersCommand::Add(args)) => add_server(&settings_path, args),
        Command::Servers(ServersCommand::Remove { name }) => remove_server(&settings_path, &name),
        Command::Select { server, databases } => select(&settings_path, &server, &databases),
        Command::Databases { server } => databases(&settings_path, &server).await,
    }
}

fn read_script(file: Option<&Path>, query: Option<String>) -> Result<String> {
    match (file, query) {
        (_, Some(query)) => Ok(query),
        (Some(path), None) if path == Path::new("-") => {
            std::io::read_to_string(std::io::stdin()).context("Failed to read script from stdin")
        }
        (Some(path), None) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script from {:?}", path)),
        (None, None) => bail!("No script given; use --file or --query"),
    }
}

async fn run(settings_path: &Path, args: RunArgs) -> Result<ExitCode> {
    let settings = BulkqSettings::load_from(settings_path)?;
    let script = read_script(args.file.as_deref(), args.query)?;
    let targets = settings.targets(&args.servers)?;
    let timeout_secs = args.timeout.unwrap_or(settings.sql_timeout_secs);

    if targets.is_empty() {
        eprintln!("No databases selected; use `bulkq select <server> <database>...`");
    }

    let engine = BulkQueryEngine::new(Arc::new(DriverRegistry::with_defaults()));
    let aggregate = engine.bulk_query(&targets, &script, timeout_secs).await;

    let mut stdout = std::io::stdout().lock();
    output::render(&aggregate, args.format, &mut stdout)?;
    stdout.flush()?;

    if args.format != OutputFormat::Json {
        for message in &aggregate.messages {
            eprintln!("{message}");
        }
    }

    Ok(if aggregate.is_clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_PARTIAL)
    })
}

fn list_servers(settings_path: &Path) -> Result<ExitCode> {
    let settings = BulkqSettings::load_from(settings_path)?;
    if settings.servers.is_empty() {
        println!("No servers configured; use `bulkq servers add <name>`");
        return Ok(ExitCode::SUCCESS);
    }

    let registry = DriverRegistry::with_defaults();
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Server", "Driver", "Address", "Selected databases"]);
    for server in &settings.servers {
        let config = &server.connection;
        let address = if config.port > 0 {
            format!("{}:{}", config.host, config.port)
        } else {
            config.host.clone()
        };
        table.add_row(vec![
            server.display_name.clone(),
            registry
                .get(&config.driver)
                .map_or_else(|| config.driver.clone(), |d| d.display_name().to_string()),
            address,
            server.selected_databases.join(", "),
        ]);
    }
    println!("{table}");
    Ok(ExitCode::SUCCESS)
}

fn server_config(args: &AddServerArgs, registry: &DriverRegistry) -> Result<ConnectionConfig> {
    let Some(driver) = registry.get(&args.driver) else {
        bail!(
            "Unknown driver '{}'; available: {}",
            args.driver,
            registry.list().join(", ")
        );
    };

    let mut config = ConnectionConfig::new(&args.driver);
    config.host = args.host.clone();
    config.port = args.port.or(driver.default_port()).unwrap_or(0);
    config.username = args.user.clone();
    config.password = args.password.clone();
    if args.trust_cert {
        config = config.with_param("trust_cert", true);
    }
    Ok(config)
}

fn add_server(settings_path: &Path, args: AddServerArgs) -> Result<ExitCode> {
    let mut settings = BulkqSettings::load_from(settings_path)?;
    let config = server_config(&args, &DriverRegistry::with_defaults())?;

    settings.add_server(ServerDefinition::new(&args.name, config))?;
    settings.save_to(settings_path)?;
    tracing::info!(server = %args.name, driver = %args.driver, "server added");
    println!("Added server '{}'", args.name);
    Ok(ExitCode::SUCCESS)
}

fn remove_server(settings_path: &Path, name: &str) -> Result<ExitCode> {
    let mut settings = BulkqSettings::load_from(settings_path)?;
    if settings.remove_server(name).is_none() {
        bail!("Unknown server '{}'", name);
    }
    settings.save_to(settings_path)?;
    println!("Removed server '{}'", name);
    Ok(ExitCode::SUCCESS)
}

fn select(settings_path: &Path, server: &str, databases: &[String]) -> Result<ExitCode> {
    let mut settings = BulkqSettings::load_from(settings_path)?;
    settings.select_databases(server, databases)?;
    settings.save_to(settings_path)?;

    let hidden: Vec<&String> = databases
        .iter()
        .filter(|db| settings.hide_system_databases && bulkq_settings::is_system_database(db))
        .collect();
    if !hidden.is_empty() {
        eprintln!(
            "Note: system databases are hidden and will be skipped: {}",
            hidden
                .iter()
                .map(|db| db.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    println!(
        "Selected {} database(s) on '{}'",
        settings
            .server(server)
            .map_or(0, |s| s.selected_databases.len()),
        server
    );
    Ok(ExitCode::SUCCESS)
}

async fn databases(settings_path: &Path, server: &str) -> Result<ExitCode> {
    let settings = BulkqSettings::load_from(settings_path)?;
    let definition = settings
        .server(server)
        .with_context(|| format!("Unknown server '{}'", server))?;

    let registry = DriverRegistry::with_defaults();
    let names = bulkq_query::list_databases(&registry, &definition.connection)
        .await
        .with_context(|| format!("Failed to list databases on '{}'", server))?;

    for name in settings.visible_databases(names) {
        let marker = if definition.selected_databases.contains(&name) {
            "*"
        } else {
            " "
        };
        println!("{marker} {name}");
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn add_args(driver: &str) -> AddServerArgs {
        AddServerArgs {
            name: "east".into(),
            driver: driver.into(),
            host: "east.corp".into(),
            port: None,
            user: Some("ops".into()),
            password: Some("pw".into()),
            trust_cert: true,
        }
    }

    #[test]
    fn test_server_config_uses_driver_default_port() {
        let config = server_config(&add_args("mssql"), &DriverRegistry::with_defaults()).unwrap();

        assert_eq!(config.port, 1433);
        assert_eq!(config.username.as_deref(), Some("ops"));
        assert!(config.get_bool("trust_cert"));
    }

    #[test]
    fn test_server_config_rejects_unknown_driver() {
        let err = server_config(&add_args("oracle"), &DriverRegistry::with_defaults()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unknown driver 'oracle'; available: mssql, sqlite"
        );
    }

    #[test]
    fn test_read_script_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script.sql");
        std::fs::write(&path, "SELECT 1\nGO\n").unwrap();

        assert_eq!(read_script(Some(&path), None).unwrap(), "SELECT 1\nGO\n");
        assert_eq!(read_script(None, Some("SELECT 2".into())).unwrap(), "SELECT 2");
        assert!(read_script(Some(&dir.path().join("missing.sql")), None).is_err());
    }

    #[tokio::test]
    async fn test_run_over_sqlite_exit_codes() {
        let dir = tempfile::tempdir().unwrap();
        let settings_path = dir.path().join("settings.json");
        let db = dir.path().join("a.db");

        let mut settings = BulkqSettings::default();
        settings
            .add_server(ServerDefinition::new("local", ConnectionConfig::new("sqlite")))
            .unwrap();
        settings
            .select_databases("local", &[db.to_string_lossy().to_string()])
            .unwrap();
        settings.save_to(&settings_path).unwrap();

        let ok = RunArgs {
            file: None,
            query: Some("SELECT 1 AS one".into()),
            servers: vec![],
            timeout: Some(5),
            format: OutputFormat::Csv,
        };
        assert_eq!(run(&settings_path, ok).await.unwrap(), ExitCode::SUCCESS);

        let blank = RunArgs {
            file: None,
            query: Some("GO\n\nGO\n".into()),
            servers: vec![],
            timeout: None,
            format: OutputFormat::Table,
        };
        assert_eq!(run(&settings_path, blank).await.unwrap(), ExitCode::SUCCESS);

        let failing = RunArgs {
            file: None,
            query: Some("SELECT * FROM nowhere".into()),
            servers: vec!["local".into()],
            timeout: None,
            format: OutputFormat::Json,
        };
        assert_eq!(
            run(&settings_path, failing).await.unwrap(),
            ExitCode::from(EXIT_PARTIAL)
        );
    }

    #[test]
    fn test_server_management_persists() {
        let dir = tempfile::tempdir().unwrap();
        let settings_path = dir.path().join("settings.json");

        add_server(&settings_path, add_args("mssql")).unwrap();
        assert!(add_server(&settings_path, add_args("mssql")).is_err());
        select(&settings_path, "east", &["Sales".into(), "master".into()]).unwrap();

        let settings = BulkqSettings::load_from(&settings_path).unwrap();
        assert_eq!(
            settings.server("east").unwrap().selected_databases,
            vec!["Sales", "master"]
        );

        remove_server(&settings_path, "east").unwrap();
        assert!(remove_server(&settings_path, "east").is_err());
        assert!(
            BulkqSettings::load_from(&settings_path)
                .unwrap()
                .servers
                .is_empty()
        );
    }
}
