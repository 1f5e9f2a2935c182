//! ircon-ctl - drive an ircon controller from the command line
//!
//! Each command builds an engine from the configuration, performs one
//! open/operate/close cycle against the device and prints the result.

mod simulate;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use common::logging::{self, LogConfig};
use ircon_bridge::{
    Attribute, BridgeConfig, ColumnDef, IrconEngine, IrconError, Row, TableSchema, Value,
};
use tracing::debug;

const DEFAULT_LISTEN: &str = "127.0.0.1:7070";

#[derive(Parser)]
#[command(name = "ircon-ctl")]
#[command(about = "Drive an ircon controller through the device bridge")]
#[command(long_about = "Drive an ircon controller through the device bridge

Commands:
  resolve     Show the address a table identifier resolves to
  write       Set attributes on the device
  delete      Reset every attribute on the device
  scan        Read the attribute row the bridge reports
  simulate    Run a local device that prints what it receives

Examples:
  ircon-ctl resolve 10.0.0.5:7070
  ircon-ctl write 10.0.0.5 --set mode=cool --set temperature=22
  ircon-ctl scan 10.0.0.5 --columns mode,power
  ircon-ctl simulate --listen 127.0.0.1:7070")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Bridge configuration file (YAML, TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the address a table identifier resolves to
    Resolve {
        /// Table identifier, `host[:port]`
        identifier: String,
    },

    /// Open the device, write one row and close
    Write {
        identifier: String,

        /// Attribute assignment, `name=value`; an empty value keeps the cached one
        #[arg(short, long = "set", value_name = "NAME=VALUE", required = true)]
        set: Vec<String>,
    },

    /// Open the device, reset every attribute and close
    Delete { identifier: String },

    /// Open the device, run one scan and print the row
    Scan {
        identifier: String,

        /// Columns to project, comma separated
        #[arg(long, value_delimiter = ',', default_value = "mode,temperature,power,angle")]
        columns: Vec<String>,
    },

    /// Run a local device simulator until interrupted
    Simulate {
        /// Listen address (env: IRCON_SIM_LISTEN)
        #[arg(short, long)]
        listen: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let result = run(cli).await;
    if let Err(e) = &result {
        report_error(e);
    }
    result
}

/// Print the bridge error code ahead of anyhow's error chain
fn report_error(e: &anyhow::Error) {
    if let Some(err) = e.downcast_ref::<IrconError>() {
        let hint = if err.is_retryable() {
            " (retryable)"
        } else {
            ""
        };
        eprintln!("{} [{}]{}", "ERROR".red(), err.error_code(), hint);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path =
        common::get_optional_string(cli.config.map(|p| p.display().to_string()), "IRCON_CONFIG")
            .map(PathBuf::from);
    let config = BridgeConfig::load(config_path.as_deref())
        .with_context(|| "Failed to load bridge configuration")?;

    init_logging(&config, cli.verbose)?;
    debug!("Configuration: {:?}", config);

    match cli.command {
        Commands::Resolve { identifier } => {
            let address = config.resolver().parse(&identifier)?;
            println!(
                "{} {} -> {}",
                "Resolved".bright_green(),
                identifier,
                address.to_string().bold()
            );
        },
        Commands::Write { identifier, set } => {
            let engine = IrconEngine::new(config)?;
            write(&engine, &identifier, &set).await?;
        },
        Commands::Delete { identifier } => {
            let engine = IrconEngine::new(config)?;
            delete(&engine, &identifier).await?;
        },
        Commands::Scan {
            identifier,
            columns,
        } => {
            let engine = IrconEngine::new(config)?;
            scan(&engine, &identifier, &columns).await?;
        },
        Commands::Simulate { listen } => {
            let fallback: SocketAddr = DEFAULT_LISTEN.parse()?;
            let addr = common::get_config_value(listen, "IRCON_SIM_LISTEN", fallback);
            simulate::run(addr).await?;
        },
    }

    Ok(())
}

fn init_logging(config: &BridgeConfig, verbose: bool) -> Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        config.logging.level()?
    };
    logging::init_with_config(LogConfig {
        service_name: "ircon-ctl".to_string(),
        log_dir: logging::get_log_root(config.logging.log_dir.as_deref()),
        level,
        enable_file: config.logging.file,
        enable_json: config.logging.json,
    })
    .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

/// Split `name=value` assignments into a text schema and a matching row
fn parse_assignments(assignments: &[String]) -> Result<(TableSchema, Row)> {
    let mut columns = Vec::with_capacity(assignments.len());
    let mut values = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let Some((name, value)) = assignment.split_once('=') else {
            bail!("Expected NAME=VALUE, got {:?}", assignment);
        };
        if Attribute::from_column(name).is_none() {
            println!(
                "{} {} is not a device attribute and will not be sent",
                "WARN".yellow(),
                name
            );
        }
        columns.push(ColumnDef::text(name));
        values.push(Value::from(value));
    }
    Ok((TableSchema::new("ircon", columns), Row::new(values)))
}

async fn write(engine: &IrconEngine, identifier: &str, assignments: &[String]) -> Result<()> {
    let (schema, row) = parse_assignments(assignments)?;
    let mut table = engine.create_handler(schema);
    table.open(identifier).await?;

    let result = table.write_row(&row).await;
    table.close().await?;
    result?;

    println!("{} Wrote to {}", "OK".bright_green(), identifier);
    if let Some(share) = engine.registry().get(identifier) {
        print_cache(&share.snapshot().await);
    }
    Ok(())
}

async fn delete(engine: &IrconEngine, identifier: &str) -> Result<()> {
    let mut table = engine.create_handler(TableSchema::new("ircon", Vec::new()));
    table.open(identifier).await?;

    let result = table.delete_row().await;
    table.close().await?;
    result?;

    println!("{} Reset {}", "OK".bright_green(), identifier);
    Ok(())
}

async fn scan(engine: &IrconEngine, identifier: &str, columns: &[String]) -> Result<()> {
    let schema = TableSchema::new("ircon", columns.iter().map(ColumnDef::text).collect());
    let mut table = engine.create_handler(schema);
    table.open(identifier).await?;

    table.scan_begin()?;
    let row = table.scan_next().await;
    table.scan_end();
    table.close().await?;
    let row = row?;

    for (idx, column) in table.schema().column_names().enumerate() {
        println!("{:>12}  {}", column.bright_cyan(), row.get(idx));
    }
    Ok(())
}

fn print_cache(cache: &ircon_bridge::AttributeCache) {
    for (attr, value) in cache.iter() {
        println!("{:>12}  {}", attr.as_str().bright_cyan(), value);
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignments() {
        let (schema, row) =
            parse_assignments(&["mode=cool".to_string(), "power=".to_string()]).unwrap();
        assert_eq!(schema.column_names().collect::<Vec<_>>(), vec!["mode", "power"]);
        assert_eq!(row.get(0), &Value::from("cool"));
        assert_eq!(row.get(1), &Value::from(""));
    }

    #[test]
    fn test_parse_assignments_rejects_missing_equals() {
        assert!(parse_assignments(&["mode".to_string()]).is_err());
    }

    #[test]
    fn test_init_logging_rejects_bad_level() {
        let mut config = BridgeConfig::default();
        config.logging.level = "loud".to_string();
        let err = init_logging(&config, false).unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_cli_parses_scan_columns() {
        let cli = Cli::parse_from(["ircon-ctl", "scan", "host", "--columns", "mode,angle"]);
        match cli.command {
            Commands::Scan { columns, .. } => assert_eq!(columns, vec!["mode", "angle"]),
            _ => panic!("expected scan"),
        }
    }
}
