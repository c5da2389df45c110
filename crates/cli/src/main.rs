mod app;
mod config_commands;
mod debug_commands;

use std::{path::PathBuf, sync::Arc};

use {
    anyhow::{Context, bail},
    clap::{Parser, Subcommand},
    replywatch_config::{ReplywatchConfig, Severity},
    replywatch_cron::{CronSchedule, ScanFn, ScanScheduler},
    replywatch_gateway::GatewayState,
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(
    name = "replywatch",
    version,
    about = "Daily digest of CRM conversations left without a reply"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (default: discover replywatch.{toml,yaml,yml,json}).
    #[arg(long, global = true, env = "REPLYWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind to (overrides config value).
    #[arg(long, global = true)]
    bind: Option<String>,
    /// Port to listen on (overrides config value).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API and the daily scan (default when no subcommand is provided).
    Serve,
    /// Run one scan now and deliver the digest.
    Scan {
        /// Print the digest instead of sending it.
        #[arg(long)]
        dry_run: bool,
    },
    /// Inspect CRM data used by detection.
    Debug {
        #[command(subcommand)]
        action: debug_commands::DebugAction,
    },
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Log every diagnostic; refuse to start on errors.
fn ensure_valid(config: &ReplywatchConfig) -> anyhow::Result<()> {
    let result = replywatch_config::validate(config);
    for d in &result.diagnostics {
        match d.severity {
            Severity::Error => error!(path = %d.path, "{}", d.message),
            Severity::Warning => warn!(path = %d.path, "{}", d.message),
        }
    }
    if result.has_errors() {
        bail!(
            "configuration has {} error(s); run `replywatch config check`",
            result.count(Severity::Error)
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

async fn serve(cli: Cli, config: ReplywatchConfig) -> anyhow::Result<()> {
    ensure_valid(&config)?;

    #[cfg(feature = "metrics")]
    let metrics_handle =
        replywatch_metrics::init_metrics(replywatch_metrics::MetricsRecorderConfig {
            enabled: config.metrics.enabled,
            global_labels: Vec::new(),
        })?;

    let services = app::build_services(&config, false)?;
    let timezone: chrono_tz::Tz = config
        .schedule
        .timezone
        .parse()
        .map_err(|_| anyhow::anyhow!("unknown timezone: {}", config.schedule.timezone))?;

    let mut state = GatewayState::new(
        Arc::clone(&services.scan),
        Arc::clone(&services.inspector),
        timezone,
    )
    .with_version(env!("CARGO_PKG_VERSION"));

    #[cfg(feature = "prometheus")]
    if config.metrics.prometheus_endpoint {
        state = state.with_metrics(metrics_handle);
    }
    #[cfg(all(feature = "metrics", not(feature = "prometheus")))]
    let _ = metrics_handle;

    let scheduler = if config.schedule.enabled {
        let scan = Arc::clone(&services.scan);
        let on_scan: ScanFn = Arc::new(move || {
            let scan = Arc::clone(&scan);
            Box::pin(async move {
                let report = scan.run_and_report().await?;
                Ok(report.alerts.len())
            })
        });
        let scheduler = ScanScheduler::new(CronSchedule::from_config(&config.schedule), on_scan)
            .context("invalid schedule")?;
        scheduler.start().await?;
        state = state.with_scheduler(Arc::clone(&scheduler));
        Some(scheduler)
    } else {
        info!("scheduled scans are disabled");
        None
    };

    let bind = cli.bind.unwrap_or(config.server.bind);
    let port = cli.port.unwrap_or(config.server.port);
    let result =
        replywatch_gateway::start_gateway(&bind, port, Arc::new(state), shutdown_signal()).await;

    if let Some(scheduler) = scheduler {
        scheduler.stop().await;
    }
    result
}

async fn scan_once(config: ReplywatchConfig, dry_run: bool) -> anyhow::Result<()> {
    ensure_valid(&config)?;
    let services = app::build_services(&config, dry_run)?;
    let report = if dry_run {
        services.scan.run().await?
    } else {
        services.scan.run_and_report().await?
    };
    info!(
        alerts = report.alerts.len(),
        sent = report.sent,
        "scan complete"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "replywatch starting");

    match cli.command {
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action, cli.config.as_deref())
        },
        Some(Commands::Debug { action }) => {
            let config = app::load_config(cli.config.as_deref())?;
            debug_commands::handle_debug(action, &config).await
        },
        Some(Commands::Scan { dry_run }) => {
            let config = app::load_config(cli.config.as_deref())?;
            scan_once(config, dry_run).await
        },
        // Default: serve when no subcommand is provided
        None | Some(Commands::Serve) => {
            let config = app::load_config(cli.config.as_deref())?;
            serve(cli, config).await
        },
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, clap::CommandFactory};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["replywatch", "--port", "9000"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.port, Some(9000));
    }

    #[test]
    fn scan_dry_run_flag() {
        let cli = Cli::try_parse_from(["replywatch", "scan", "--dry-run"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Scan { dry_run: true })));
    }

    #[test]
    fn debug_limits_are_range_checked() {
        assert!(
            Cli::try_parse_from(["replywatch", "debug", "last-incomings", "--limit", "501"])
                .is_err()
        );
        assert!(
            Cli::try_parse_from([
                "replywatch",
                "debug",
                "providers-summary",
                "--limit",
                "99"
            ])
            .is_err()
        );
        assert!(
            Cli::try_parse_from([
                "replywatch",
                "debug",
                "activities-by-entity",
                "--owner-type-id",
                "2",
                "--owner-id",
                "15",
            ])
            .is_ok()
        );
    }

    #[test]
    fn invalid_config_refuses_to_start() {
        let mut config = ReplywatchConfig::default();
        config.schedule.hour = 25;
        assert!(ensure_valid(&config).is_err());
    }
}
