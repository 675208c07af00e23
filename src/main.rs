//! kube-ingress-proxy - manage proxy routes stored as Kubernetes resources

use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kube_ingress_proxy::config::ProxyConfig;
use kube_ingress_proxy::{safe_name, KubeIngressProxy};

/// kube-ingress-proxy - proxy routes as Endpoints, Services and Ingresses
#[derive(Parser, Debug)]
#[command(name = "kube-ingress-proxy", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    config: ProxyConfig,

    /// Log as JSON lines instead of human-readable text
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Add or update a route and wait until it is live
    Add {
        /// Routespec, e.g. `/user/alice/` or `hub.example.com/user/alice/`
        routespec: String,
        /// Backend URL, e.g. `http://10.0.0.1:8888`
        target: String,
        /// JSON data stored with the route
        #[arg(long, default_value = "{}")]
        data: String,
    },

    /// Delete a route (no error if it does not exist)
    Delete {
        /// Routespec of the route to delete
        routespec: String,
    },

    /// Print the route table as JSON
    List,

    /// Print the resource name a routespec maps to
    Name {
        /// Routespec to map
        routespec: String,
    },

    /// Keep the route caches running and log the route table periodically
    Watch {
        /// Seconds between route table dumps
        #[arg(long, default_value = "30")]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install crypto provider - FIPS-validated aws-lc-rs
    if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
        eprintln!(
            "CRITICAL: Failed to install crypto provider: {:?}. \
             TLS connections to the Kubernetes API cannot be made.",
            e
        );
        std::process::exit(1);
    }

    let cli = Cli::parse();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,tower=warn,hyper=warn"));
    let (json_layer, text_layer) = if cli.log_json {
        (
            Some(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            ),
            None,
        )
    } else {
        (None, Some(fmt::layer().with_writer(std::io::stderr)))
    };
    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .init();

    match cli.command {
        Commands::Name { routespec } => {
            println!("{}", safe_name(&routespec));
        }
        Commands::Add {
            routespec,
            target,
            data,
        } => {
            let data: serde_json::Value = serde_json::from_str(&data)
                .map_err(|e| anyhow::anyhow!("--data is not valid JSON: {}", e))?;
            let proxy = KubeIngressProxy::initialize(&cli.config).await?;
            proxy.add_route(&routespec, &target, &data).await?;
        }
        Commands::Delete { routespec } => {
            let proxy = KubeIngressProxy::initialize(&cli.config).await?;
            proxy.delete_route(&routespec).await?;
        }
        Commands::List => {
            let proxy = KubeIngressProxy::initialize(&cli.config).await?;
            let routes = proxy.get_all_routes();
            println!("{}", serde_json::to_string_pretty(&routes)?);
        }
        Commands::Watch { interval_secs } => {
            let proxy = KubeIngressProxy::initialize(&cli.config).await?;
            watch(&proxy, Duration::from_secs(interval_secs.max(1))).await;
        }
    }

    Ok(())
}

/// Log the route table every `period` until Ctrl-C
async fn watch(proxy: &KubeIngressProxy, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
            _ = interval.tick() => {
                let routes = proxy.get_all_routes();
                info!(
                    namespace = %proxy.namespace(),
                    count = routes.len(),
                    routes = ?routes.keys().collect::<Vec<_>>(),
                    "route table"
                );
            }
        }
    }
}
