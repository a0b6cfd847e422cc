use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod bootstrap;
mod driver;

use bootstrap::ServerOptions;

#[derive(Parser, Debug)]
#[command(name = "foundry-apiserver", version, about = "Foundry demo API server (demo.k8s.io)")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Serve Prometheus metrics on host:port
    #[arg(long = "metrics-addr", env = "FOUNDRY_METRICS_ADDR", global = true)]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json, Yaml }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve line-delimited JSON requests on stdin
    Serve(ServerOptions),
    /// Print the served resources
    Resources(ServerOptions),
    /// Print the admission plugins that can be enabled
    Plugins,
}

fn init_tracing() {
    let env = std::env::var("FOUNDRY_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // stdout carries replies
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics(addr: Option<&str>) {
    let Some(addr) = addr else { return };
    match addr.parse::<std::net::SocketAddr>() {
        Ok(sock) => match metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(sock).install() {
            Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
            Err(e) => warn!(error = %e, "failed to install metrics exporter"),
        },
        Err(_) => warn!(addr = %addr, "invalid FOUNDRY_METRICS_ADDR; expected host:port"),
    }
}

fn print<T: serde::Serialize>(output: Output, value: &T, human: impl FnOnce()) -> Result<()> {
    match output {
        Output::Human => human(),
        Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
        Output::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    init_metrics(cli.metrics_addr.as_deref());

    match cli.command {
        Commands::Serve(opts) => {
            let server = Arc::new(bootstrap::build_server(&opts)?);
            let shutdown = CancellationToken::new();
            tokio::spawn({
                let shutdown = shutdown.clone();
                async move {
                    if signal::ctrl_c().await.is_ok() {
                        info!("ctrl-c received; shutting down");
                    }
                    shutdown.cancel();
                }
            });
            driver::run(server, shutdown).await?;
        }
        Commands::Resources(opts) => {
            let server = bootstrap::build_server(&opts)?;
            let lists = server.discovery();
            print(cli.output, &lists, || {
                println!("{:<24} {:<10} {:<8} NAMESPACED", "GROUPVERSION", "NAME", "KIND");
                for list in &lists {
                    for r in &list.resources {
                        println!("{:<24} {:<10} {:<8} {}", list.group_version, r.name, r.kind, r.namespaced);
                    }
                }
            })?;
        }
        Commands::Plugins => {
            let names = bootstrap::admission_plugins()?.registered_names();
            print(cli.output, &names, || names.iter().for_each(|n| println!("{n}")))?;
        }
    }
    Ok(())
}
