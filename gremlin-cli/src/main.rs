//! gremlin-cli - Command-line console for Gremlin servers
//!
//! Provides both a REPL and one-shot query execution.

mod commands;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use gremlin_client::{ConnectionConfig, Dialer, TlsClientConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gremlin-cli")]
#[command(about = "Command-line console for Gremlin graph servers")]
#[command(version)]
struct Cli {
    /// Server WebSocket URL
    #[arg(short, long, env = "GREMLIN_URL", default_value = "ws://localhost:8182/gremlin")]
    url: String,

    /// Username for SASL PLAIN authentication
    #[arg(long, env = "GREMLIN_USER")]
    user: Option<String>,

    /// Password for SASL PLAIN authentication
    #[arg(long, env = "GREMLIN_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    // ===== TLS Options =====
    /// Path to CA certificate for server verification
    #[arg(long, env = "GREMLIN_CA_CERT")]
    ca_cert: Option<PathBuf>,

    /// Path to client certificate (for mTLS)
    #[arg(long, env = "GREMLIN_CLIENT_CERT")]
    client_cert: Option<PathBuf>,

    /// Path to client private key (for mTLS)
    #[arg(long, env = "GREMLIN_CLIENT_KEY")]
    client_key: Option<PathBuf>,

    /// Skip server certificate verification (INSECURE)
    #[arg(long, short = 'k')]
    insecure: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start interactive REPL
    Repl,

    /// Evaluate a single Gremlin query
    Eval {
        /// Gremlin script
        query: String,

        /// Bindings JSON object (or @file.json to read from file)
        #[arg(short, long)]
        bindings: Option<String>,
    },
}

impl Cli {
    fn connection_config(&self) -> ConnectionConfig {
        let mut config = ConnectionConfig::new();

        if let Some(ref user) = self.user {
            config = config.with_credentials(user, self.password.clone().unwrap_or_default());
        }
        if let Some(secs) = self.timeout {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }

        if self.ca_cert.is_some() || self.client_cert.is_some() || self.insecure {
            let mut tls = TlsClientConfig::new();
            tls.enabled = true;
            tls.ca_cert_path = self.ca_cert.clone();
            tls.client_cert_path = self.client_cert.clone();
            tls.client_key_path = self.client_key.clone();
            tls.insecure = self.insecure;
            config = config.with_tls(tls);
        }

        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    if cli.client_cert.is_some() != cli.client_key.is_some() {
        eprintln!(
            "{}: --client-cert and --client-key must be used together",
            "Error".red()
        );
        std::process::exit(1);
    }

    let dialer = Dialer::new(cli.connection_config());
    let conn = match dialer.dial(&cli.url).await {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("{}: {}", "Connection failed".red(), e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(&conn, &cli.url).await?;
        }
        Some(Commands::Eval { query, bindings }) => {
            let result = commands::eval(&conn, &query, bindings.as_deref()).await;
            conn.close().await?;

            match result {
                Ok(rsp) if !rsp.is_err() => println!("{}", commands::format_response(&rsp)),
                Ok(rsp) => {
                    eprintln!("{}", commands::format_response(&rsp));
                    std::process::exit(1);
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
