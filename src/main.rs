//! Specialist router - command line entry point

use clap::{Parser, Subcommand};
use futures::StreamExt;
use specialist_router::observability::init_default_logging;
use specialist_router::registry::{DiscoverFilter, RegistryEvent};
use specialist_router::routing::RouteRequest;
use specialist_router::transport::MessageOptions;
use specialist_router::{ControlPlane, FleetConfig, FleetError, FleetResult};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Control plane for a fleet of AI specialists
#[derive(Parser)]
#[command(name = "specialist-router")]
#[command(about = "Registry, health monitor and router for AI specialist processes")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "SPECIALIST_ROUTER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor the fleet and serve the status endpoint until interrupted
    Run,
    /// Probe every specialist once and print the registry
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Route a message and optionally send it
    Route {
        message: String,
        /// Preferred specialist id
        #[arg(long)]
        prefer: Option<String>,
        /// Required capability (repeatable)
        #[arg(long = "require", value_name = "CAPABILITY")]
        required: Vec<String>,
        /// Send the message to the selected specialist
        #[arg(long)]
        send: bool,
        /// Stream the reply (implies --send)
        #[arg(long)]
        stream: bool,
        /// Reply timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Select a team of specialists
    Team {
        message: String,
        #[arg(long, default_value_t = 3)]
        size: usize,
        /// Favour capability coverage over raw performance
        #[arg(long)]
        diverse: bool,
    },
    /// Ping one specialist
    Ping { specialist_id: String },
    /// Print registry events as they happen
    Watch,
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_default_logging();

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(e.exit_code());
        }
    };

    let result = match cli.command {
        Commands::Run => run(config).await,
        Commands::Status { json } => status(config, json).await,
        Commands::Route {
            message,
            prefer,
            required,
            send,
            stream,
            timeout,
        } => {
            let mut request = RouteRequest::new(message).require(required);
            if let Some(prefer) = prefer {
                request = request.prefer(prefer);
            }
            let options = MessageOptions {
                timeout: timeout.map(Duration::from_secs),
                ..Default::default()
            };
            route(config, request, options, send || stream, stream).await
        }
        Commands::Team {
            message,
            size,
            diverse,
        } => team(config, &message, size, diverse).await,
        Commands::Ping { specialist_id } => ping(config, &specialist_id).await,
        Commands::Watch => watch(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(e.exit_code());
    }
}

fn load_configuration(config_path: &Option<PathBuf>) -> FleetResult<FleetConfig> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(FleetConfig::load_from_file(path)?);
    }

    for path_str in ["fleet.toml", "config/fleet.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(FleetConfig::load_from_file(&path)?);
        }
    }

    info!("No configuration file found, using the built-in fleet");
    Ok(FleetConfig::default())
}

async fn run(config: FleetConfig) -> FleetResult<()> {
    let plane = ControlPlane::from_config(config)?;
    let summary = plane.start().await?;
    info!(
        probed = summary.probed,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "Initial probe round complete"
    );

    let shutdown = CancellationToken::new();
    let server_task = match plane.status_server()? {
        Some(server) => {
            let token = shutdown.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = server.run(token).await {
                    error!("Status server error: {}", e);
                }
            }))
        }
        None => None,
    };

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .map_err(|e| FleetError::invalid_input(format!("cannot install SIGINT handler: {e}")))?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .map_err(|e| FleetError::invalid_input(format!("cannot install SIGTERM handler: {e}")))?;

    info!("Control plane running");
    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }

    shutdown.cancel();
    plane.stop().await;
    if let Some(task) = server_task {
        if let Err(e) = task.await {
            warn!("Status server task ended abnormally: {}", e);
        }
    }
    info!("Shutdown complete");
    Ok(())
}

/// Register and probe once without leaving a monitor running
async fn probed_plane(config: FleetConfig) -> FleetResult<ControlPlane> {
    let plane = ControlPlane::from_config(config)?;
    plane.start().await?;
    plane.stop().await;
    Ok(plane)
}

async fn status(config: FleetConfig, json: bool) -> FleetResult<()> {
    let plane = probed_plane(config).await?;
    let specialists = plane.registry().discover(&DiscoverFilter::new()).await;
    let stats = plane.registry().get_statistics().await;

    if json {
        let body = serde_json::json!({ "statistics": stats, "specialists": specialists });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!(
        "{:<16} {:<22} {:<13} {:>8} {:>10}",
        "ID", "ADDRESS", "STATUS", "RATE", "AVG MS"
    );
    for s in &specialists {
        println!(
            "{:<16} {:<22} {:<13} {:>8.2} {:>10.1}",
            s.id,
            s.address(),
            s.status,
            s.success_rate(),
            s.avg_response_secs * 1000.0
        );
    }
    println!(
        "\n{} specialists, {} available",
        stats.total_specialists,
        stats.available()
    );
    Ok(())
}

async fn route(
    config: FleetConfig,
    request: RouteRequest,
    options: MessageOptions,
    send: bool,
    stream: bool,
) -> FleetResult<()> {
    let plane = probed_plane(config).await?;

    if stream {
        let (route, mut chunks) = plane.dispatch_stream(&request, &options).await?;
        info!(specialist_id = %route.specialist.id, reason = %route.reason, "Streaming reply");
        while let Some(chunk) = chunks.next().await {
            print!("{}", chunk?.content);
        }
        println!();
        return Ok(());
    }

    if send {
        let reply = plane.dispatch(&request, &options).await?;
        println!(
            "[{} after {} attempt(s)] {}",
            reply.route.specialist.id, reply.attempts, reply.reply.content
        );
        return Ok(());
    }

    let route = plane.route(&request).await?;
    println!(
        "{} (rule: {}, fallback level {}): {}",
        route.specialist.id,
        route.rule_used.as_deref().unwrap_or("-"),
        route.fallback_level,
        route.reason
    );
    Ok(())
}

async fn team(config: FleetConfig, message: &str, size: usize, diverse: bool) -> FleetResult<()> {
    let plane = probed_plane(config).await?;
    let members = plane.engine().route_to_team(message, size, diverse).await?;
    for member in members {
        println!("{}: {}", member.specialist.id, member.reason);
    }
    Ok(())
}

async fn ping(config: FleetConfig, specialist_id: &str) -> FleetResult<()> {
    let fleet = config.fleet_definition()?;
    let plane = ControlPlane::from_config(config)?;
    plane.registry().register_fleet(fleet).await?;
    let elapsed = plane.ping(specialist_id).await?;
    println!("{specialist_id}: pong in {} ms", elapsed.as_millis());
    Ok(())
}

async fn watch(config: FleetConfig) -> FleetResult<()> {
    let plane = ControlPlane::from_config(config)?;
    let mut events = plane.registry().subscribe();
    plane.start().await?;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed = missed, "Event watcher lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = signal::ctrl_c() => break,
        }
    }

    plane.stop().await;
    Ok(())
}

fn print_event(event: &RegistryEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!("Could not encode event: {}", e),
    }
}

fn handle_config_command(config: &FleetConfig, show: bool) -> FleetResult<()> {
    if show {
        let text = config
            .to_toml_string()
            .map_err(|e| FleetError::invalid_input(format!("cannot render configuration: {e}")))?;
        println!("{text}");
    }
    info!("Configuration validation complete");
    Ok(())
}
