//! sqlbridge CLI - inspect connection definitions and run SQL scripts.

use clap::{Parser, Subcommand};
use serde_json::json;
use sqlbridge::core::credentials::ObfuscatedPasswords;
use sqlbridge::{
    split, ColumnMeta, ConnectionConfig, ConnectionsConfig, DbError, DialectDescriptor,
    DriverCatalog, KeyColumns, PartitionRouter, RowSchema, Session, SessionContext, ValueType,
    Variables,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "sqlbridge")]
#[command(about = "Connection definitions, dialect rules and SQL scripts for ETL databases")]
#[command(version)]
struct Cli {
    /// Path to YAML connection definitions
    #[arg(short, long, default_value = "connections.yaml")]
    config: PathBuf,

    /// Output JSON to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "warn")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the built-in dialects
    Dialects,

    /// Print the connection URL of a definition
    Url {
        /// Connection name
        connection: String,

        /// Partition id of a clustered definition
        #[arg(long)]
        partition: Option<String>,
    },

    /// List the partitions of a clustered definition
    Partitions {
        /// Connection name
        connection: String,
    },

    /// Split a SQL script into statements ("-" reads stdin)
    Split {
        file: PathBuf,
    },

    /// Render CREATE TABLE for a dialect
    Ddl {
        /// Dialect plugin id
        #[arg(long)]
        dialect: String,

        #[arg(long)]
        schema: Option<String>,

        /// Table name
        table: String,

        /// Column as name:type[:length[:precision]]
        #[arg(long = "column", required = true)]
        columns: Vec<String>,

        /// Technical key column
        #[arg(long)]
        key: Option<String>,

        /// Render the key as auto-increment where supported
        #[arg(long)]
        autoinc: bool,
    },

    /// Run a SQL script against a connection
    Exec {
        /// Connection name
        connection: String,

        /// Script file ("-" reads stdin)
        file: PathBuf,

        /// Partition id of a clustered definition
        #[arg(long)]
        partition: Option<String>,
    },

    /// Obfuscate a password for use in a definition file
    Encrypt {
        password: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), DbError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(DbError::Config)?;

    match &cli.command {
        Commands::Dialects => list_dialects(cli.output_json),

        Commands::Split { file } => {
            let script = read_script(file)?;
            let statements = split(&script);
            if cli.output_json {
                let out: Vec<_> = statements
                    .iter()
                    .map(|s| json!({ "text": s.text, "query": s.is_query }))
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                for statement in &statements {
                    println!("{};", statement.text);
                }
            }
            Ok(())
        }

        Commands::Ddl {
            dialect,
            schema,
            table,
            columns,
            key,
            autoinc,
        } => {
            let catalog = DriverCatalog::with_builtins();
            let config = ConnectionConfig::new("ddl", dialect.as_str());
            let descriptor = DialectDescriptor::from_catalog(&catalog, &config)?;

            let fields = columns
                .iter()
                .map(|c| parse_column(c))
                .collect::<Result<RowSchema, _>>()?;
            let keys = match key {
                Some(k) => KeyColumns::technical(k, *autoinc),
                None => KeyColumns::default(),
            };
            print!(
                "{}",
                descriptor.create_table_statement(schema.as_deref(), table, &fields, &keys, true)
            );
            Ok(())
        }

        Commands::Encrypt { password } => {
            println!("{}", ObfuscatedPasswords.encode(password));
            Ok(())
        }

        Commands::Url {
            connection,
            partition,
        } => {
            let definitions = ConnectionsConfig::load(&cli.config)?;
            info!("Loaded connection definitions from {:?}", cli.config);
            let config = definitions.require(connection)?;
            let ctx = context();

            let router = PartitionRouter::new(config, ctx.credentials());
            let endpoint = router.endpoint(partition.as_deref())?;
            let descriptor = DialectDescriptor::from_catalog(ctx.catalog(), config)?;
            let url = descriptor.build_url(
                &endpoint.host,
                &endpoint.port,
                &endpoint.database,
                ctx.variables(),
            )?;

            if cli.output_json {
                let out = json!({
                    "connection": config.name,
                    "partition": endpoint.partition_id,
                    "url": url,
                    "properties": descriptor.driver_properties(ctx.variables()),
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("{}", url);
            }
            Ok(())
        }

        Commands::Partitions { connection } => {
            let definitions = ConnectionsConfig::load(&cli.config)?;
            let config = definitions.require(connection)?;
            let ctx = context();
            let router = PartitionRouter::new(config, ctx.credentials());

            let mut listed = Vec::new();
            for id in router.partition_ids() {
                let p = router.resolve(id)?;
                listed.push(json!({
                    "id": id,
                    "host": p.host,
                    "port": p.port,
                    "database": p.database,
                    "username": p.username,
                }));
            }

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&listed)?);
            } else if listed.is_empty() {
                println!("{} is not partitioned", config.name);
            } else {
                for p in &listed {
                    println!(
                        "{}\t{}:{}/{}",
                        p["id"].as_str().unwrap_or_default(),
                        p["host"].as_str().unwrap_or_default(),
                        p["port"].as_str().unwrap_or_default(),
                        p["database"].as_str().unwrap_or_default()
                    );
                }
            }
            Ok(())
        }

        Commands::Exec {
            connection,
            file,
            partition,
        } => {
            let definitions = ConnectionsConfig::load(&cli.config)?;
            let config = definitions.require(connection)?.clone();
            let script = read_script(file)?;

            let ctx = context();
            let mut session = ctx.session(config)?;
            session.connect(None, partition.as_deref()).await?;

            let canceller = session.canceller();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("\nReceived Ctrl-C. Cancelling running statement...");
                    if let Err(e) = canceller.cancel().await {
                        warn!("Cancel failed: {}", e);
                    }
                }
            });

            let outcome = exec_script(&mut session, &script, cli.output_json).await;
            interrupt.abort();

            match outcome {
                Ok(()) => {
                    session.commit(true).await?;
                    session.disconnect().await
                }
                Err(e) => {
                    if let Err(rollback) = session.rollback(true).await {
                        warn!("Rollback on {} failed: {}", session.name(), rollback);
                    }
                    session.disconnect().await?;
                    Err(e)
                }
            }
        }
    }
}

/// Built-in catalog with environment variables and obfuscated passwords.
fn context() -> Arc<SessionContext> {
    SessionContext::builder(DriverCatalog::with_builtins())
        .variables(Variables::from_environment())
        .credentials(ObfuscatedPasswords)
        .build()
}

fn list_dialects(output_json: bool) -> Result<(), DbError> {
    let catalog = DriverCatalog::with_builtins();
    let drivers = catalog.driver_names();

    let mut listed = Vec::new();
    for name in catalog.dialect_names() {
        let dialect = catalog.require_dialect(name)?;
        listed.push(json!({
            "id": dialect.plugin_id(),
            "name": dialect.display_name(),
            "default_port": dialect.default_port(),
            "native_driver": drivers.contains(&name),
        }));
    }

    if output_json {
        println!("{}", serde_json::to_string_pretty(&listed)?);
    } else {
        for d in &listed {
            println!(
                "{:<12} {:<24} {}",
                d["id"].as_str().unwrap_or_default(),
                d["name"].as_str().unwrap_or_default(),
                if d["native_driver"].as_bool() == Some(true) { "driver" } else { "" }
            );
        }
    }
    Ok(())
}

async fn exec_script(session: &mut Session, script: &str, output_json: bool) -> Result<(), DbError> {
    for statement in split(script) {
        if statement.is_query {
            let rows = session.get_rows(&statement.text, None).await?;
            if output_json {
                let rows: Vec<Vec<String>> = rows
                    .iter()
                    .map(|row| row.iter().map(ToString::to_string).collect())
                    .collect();
                println!("{}", serde_json::to_string(&rows)?);
            } else {
                for row in &rows {
                    let cells: Vec<String> = row.iter().map(ToString::to_string).collect();
                    println!("{}", cells.join("\t"));
                }
            }
        } else {
            let result = session.exec_statement(&statement.text, &[]).await?;
            info!(
                "{}: output={} updated={} deleted={}",
                session.name(),
                result.lines_output,
                result.lines_updated,
                result.lines_deleted
            );
        }
    }
    Ok(())
}

fn read_script(file: &Path) -> Result<String, DbError> {
    if file == Path::new("-") {
        Ok(std::io::read_to_string(std::io::stdin())?)
    } else {
        Ok(std::fs::read_to_string(file)?)
    }
}

/// Parse `name:type[:length[:precision]]`.
fn parse_column(text: &str) -> Result<ColumnMeta, DbError> {
    let mut parts = text.split(':');
    let name = parts.next().filter(|n| !n.is_empty());
    let type_name = parts.next();
    let (Some(name), Some(type_name)) = (name, type_name) else {
        return Err(DbError::Config(format!(
            "column '{}' must be name:type[:length[:precision]]",
            text
        )));
    };

    let value_type = match type_name.to_ascii_lowercase().as_str() {
        "string" => ValueType::String,
        "integer" => ValueType::Integer,
        "number" => ValueType::Number,
        "bignumber" => ValueType::BigNumber,
        "date" => ValueType::Date,
        "timestamp" => ValueType::Timestamp,
        "boolean" => ValueType::Boolean,
        "binary" => ValueType::Binary,
        other => {
            return Err(DbError::Config(format!("unknown column type '{}'", other)));
        }
    };

    let mut number = |what: &str| -> Result<i32, DbError> {
        match parts.next() {
            Some(digits) => digits
                .parse()
                .map_err(|_| DbError::Config(format!("invalid {} in column '{}'", what, text))),
            None => Ok(-1),
        }
    };
    let length = number("length")?;
    let precision = number("precision")?;

    Ok(ColumnMeta::new(name, value_type).with_length(length, precision))
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown verbosity '{}'", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}'", other)),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_column() {
        let c = parse_column("amount:number:12:2").unwrap();
        assert_eq!(c.name, "amount");
        assert_eq!(c.value_type, ValueType::Number);
        assert_eq!((c.length, c.precision), (12, 2));

        let c = parse_column("id:INTEGER").unwrap();
        assert_eq!((c.length, c.precision), (-1, -1));
    }

    #[test]
    fn test_parse_column_rejects_bad_input() {
        assert!(parse_column("id").is_err());
        assert!(parse_column(":integer").is_err());
        assert!(parse_column("id:money").is_err());
        assert!(parse_column("id:string:wide").is_err());
    }

    #[test]
    fn test_cli_parses_ddl() {
        let cli = Cli::try_parse_from([
            "sqlbridge", "ddl", "--dialect", "mysql", "t", "--column", "id:integer", "--column",
            "name:string:50",
        ])
        .unwrap();
        match cli.command {
            Commands::Ddl { columns, .. } => assert_eq!(columns.len(), 2),
            _ => panic!("expected ddl"),
        }
    }
}
