//! The czar executable.

use chunk_meta::{CssAccess, MemKvInterface, MemRegionIndex};
use clap::Parser;
use dispatch::TcpConnector;
use observability_deps::tracing::{error, info};
use shardq::{Czar, CzarConfig, CzarDeps, QueryStatus, SqlSecondaryIndex};
use shardq_time::SystemProvider;
use sql_client::MySqlConnection;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[clap(
    name = "shardq",
    about = "Coordinator of the sharded analytic SQL engine"
)]
struct Cli {
    /// Path to the czar configuration file (key = value lines).
    #[clap(long, env = "SHARDQ_CONFIG")]
    config: PathBuf,

    /// Czar name registered in the metadata database.
    #[clap(long, env = "SHARDQ_CZAR_NAME", default_value = "czar")]
    name: String,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Parser)]
enum Command {
    /// Run a single query and print the result table name.
    Query {
        /// Default database for unqualified table names.
        #[clap(long, default_value = "")]
        db: String,

        /// The SELECT statement to run.
        sql: String,
    },
}

fn init_logging() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    observability_deps::tracing::subscriber::set_global_default(subscriber)
        .expect("logging init");
}

fn load_css(config: &CzarConfig) -> Result<CssAccess, String> {
    if config.css_technology != "mem" {
        return Err(format!(
            "unsupported css technology '{}'",
            config.css_technology
        ));
    }
    let text = std::fs::read_to_string(&config.css_connection)
        .map_err(|e| format!("cannot read css snapshot {}: {}", config.css_connection, e))?;
    let kv = MemKvInterface::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once(char::is_whitespace) {
            kv.set(key.trim(), value.trim());
        }
    }
    Ok(CssAccess::with_empty_chunk_path(
        Arc::new(kv),
        &config.empty_chunk_path,
    ))
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();

    let config_text = match std::fs::read_to_string(&cli.config) {
        Ok(text) => text,
        Err(e) => {
            error!(path = %cli.config.display(), error = %e, "cannot read configuration");
            std::process::exit(1);
        }
    };
    let config_map = shardq::ConfigMap::from_lines(&config_text);
    let config = match CzarConfig::from_map(&config_map) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "bad configuration");
            std::process::exit(1);
        }
    };

    let css = match load_css(&config) {
        Ok(css) => css,
        Err(message) => {
            error!(%message, "cannot load metadata snapshot");
            std::process::exit(1);
        }
    };

    let connector = Arc::new(TcpConnector::new());
    for worker in css.workers() {
        match css.worker_address(&worker) {
            Ok(address) => connector.set_address(&worker, address),
            Err(e) => error!(%worker, error = %e, "worker has no address"),
        }
    }

    let result_conn = Arc::new(MySqlConnection::new(&config.result_db));
    let qmeta_conn = Arc::new(MySqlConnection::new(&config.qmeta));
    let secondary = Arc::new(SqlSecondaryIndex::new(
        Arc::<MySqlConnection>::clone(&qmeta_conn),
        config.qmeta.db.clone(),
    ));

    let deps = CzarDeps {
        css,
        secondary,
        region: Arc::new(MemRegionIndex::new()),
        connector,
        result_conn,
        qmeta_conn,
        time_provider: Arc::new(SystemProvider::new()),
        metrics: Arc::new(metric::Registry::new()),
    };

    let czar = match Czar::new(cli.name, config, deps).await {
        Ok(czar) => czar,
        Err(e) => {
            error!(error = %e, "czar startup failed");
            std::process::exit(1);
        }
    };

    match cli.command {
        Command::Query { db, sql } => {
            let status = run_query(&czar, &db, &sql).await;
            match status {
                Ok(QueryStatus::Success { result_table }) => {
                    info!(%result_table, "query complete");
                    println!("{}", result_table);
                }
                Ok(QueryStatus::Failed { message, errors }) => {
                    error!(%message, "query failed");
                    for cause in errors {
                        error!(chunk = cause.chunk_id, code = cause.code, "{}", cause.message);
                    }
                    std::process::exit(2);
                }
                Ok(QueryStatus::Cancelled) => {
                    error!("query cancelled");
                    std::process::exit(2);
                }
                Err(e) => {
                    error!(error = %e, "query rejected");
                    std::process::exit(2);
                }
            }
        }
    }
}

async fn run_query(
    czar: &Czar,
    db: &str,
    sql: &str,
) -> Result<QueryStatus, shardq::Error> {
    let (session_id, proxy_order_by) = czar.new_user_query(sql, db, "")?;
    if !proxy_order_by.is_empty() {
        info!(%proxy_order_by, "proxy applies ordering after merge");
    }
    czar.submit(session_id).await?;
    czar.join(session_id).await
}
