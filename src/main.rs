use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ipv6_proxy_harvest::{
    config::DEFAULT_OUTPUT,
    output::save_candidates,
    Aggregator, CheckerConfig, HarvestConfig, ProxyChecker, ResultFile, RunStatus, Runner,
    Sentinel, SourceFetcher, SourceParser,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

/// Harvests public IPv6 proxies and keeps the ones that work
#[derive(Parser)]
#[command(name = "ipv6-proxy-harvest")]
#[command(about = "Harvests public IPv6 proxies and keeps the ones that work")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (TOML); built-in sources are used without one
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, test and write working proxies (default)
    Run {
        /// Result file, overwritten on every run
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Timeout in seconds for each proxy test
        #[arg(long)]
        timeout: Option<u64>,
        /// Latency ceiling in milliseconds (defaults to the timeout)
        #[arg(long)]
        max_latency: Option<u64>,
        /// Maximum number of candidates to test
        #[arg(long)]
        cap: Option<usize>,
        /// Pause between tests in milliseconds
        #[arg(long)]
        delay: Option<u64>,
    },
    /// Fetch candidates from all sources without testing them
    Fetch {
        /// Output file for candidates
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Test candidates listed in a file
    Check {
        /// Input file with one candidate per line
        input: PathBuf,
        /// Output file for working proxies
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Timeout in seconds for each proxy test
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// List configured sources
    Sources,
    /// Write the default configuration to a file
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

async fn execute(cli: Cli) -> Result<u8> {
    let config_path = cli.config.as_deref();

    let command = cli.command.unwrap_or(Commands::Run {
        output: None,
        timeout: None,
        max_latency: None,
        cap: None,
        delay: None,
    });

    match command {
        Commands::Run {
            output,
            timeout,
            max_latency,
            cap,
            delay,
        } => {
            let mut config = match load_config(config_path) {
                Ok(config) => config,
                Err(e) => {
                    // The result file must not keep a previous run's proxies
                    let path = output.unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
                    ResultFile::new(path).write_sentinel(Sentinel::Failed)?;
                    return Err(e);
                }
            };
            if let Some(output) = output {
                config.output = output;
            }
            if let Some(timeout) = timeout {
                config.test_timeout_secs = timeout;
            }
            if max_latency.is_some() {
                config.max_latency_ms = max_latency;
            }
            if let Some(cap) = cap {
                config.cap = cap;
            }
            if let Some(delay) = delay {
                config.test_delay_ms = delay;
            }
            run(config).await
        }
        Commands::Fetch { output } => {
            let config = load_config(config_path)?;
            config.validate()?;

            let cancel = spawn_signal_watcher();
            let fetcher = SourceFetcher::new(&config, cancel)?;
            let candidates = Aggregator::new(&config, fetcher).collect().await?;

            println!("Total unique IPv6 candidates: {}", candidates.len());
            match output {
                Some(path) => {
                    save_candidates(&candidates, &path)?;
                    println!("Saved candidates to {:?}", path);
                }
                None => {
                    for candidate in &candidates {
                        println!("{}", candidate);
                    }
                }
            }
            Ok(0)
        }
        Commands::Check {
            input,
            output,
            timeout,
        } => {
            let config = load_config(config_path)?;
            let candidates = SourceParser::parse_candidates_file(&input)
                .with_context(|| format!("reading {:?}", input))?;
            println!("Loaded {} candidates from {:?}", candidates.len(), input);

            let mut checker_config = CheckerConfig::from_harvest(&config);
            if let Some(timeout) = timeout {
                checker_config = checker_config
                    .with_timeout(Duration::from_secs(timeout))
                    .with_max_latency(Duration::from_secs(timeout));
            }
            let checker = ProxyChecker::with_config(checker_config, spawn_signal_watcher());
            let outcomes = checker.check_all(&candidates).await?;

            let working: Vec<_> = outcomes
                .iter()
                .filter(|o| o.is_working())
                .map(|o| o.candidate.clone())
                .collect();
            println!(
                "Results: {} good, {} bad",
                working.len(),
                outcomes.len() - working.len()
            );

            match output {
                Some(path) => {
                    ResultFile::new(&path).write_candidates(&working)?;
                    println!("Saved {} working proxies to {:?}", working.len(), path);
                }
                None => {
                    for outcome in outcomes.iter().filter(|o| o.is_working()) {
                        println!(
                            "  {} ({}ms)",
                            outcome.candidate,
                            outcome.latency.as_millis()
                        );
                    }
                }
            }
            Ok(0)
        }
        Commands::Sources => {
            let config = load_config(config_path)?;
            for source in &config.sources {
                println!(
                    "{:<28} {:<22} {:<5} {:<7} {}",
                    source.name,
                    source.format.to_string(),
                    source.kind.to_string(),
                    source.protocol.to_string(),
                    source.url
                );
            }
            println!("Countries: {}", config.countries.join(", "));
            Ok(0)
        }
        Commands::InitConfig { path } => {
            HarvestConfig::default().save_to_file(&path)?;
            println!("Wrote default configuration to {:?}", path);
            Ok(0)
        }
    }
}

async fn run(config: HarvestConfig) -> Result<u8> {
    let cancel = spawn_signal_watcher();
    let report = Runner::new(config, cancel).run().await;

    if report.status == RunStatus::Completed {
        println!(
            "Working IPv6 proxies: {} | country stats: {:?}",
            report.working.len(),
            report.stats.per_country
        );
    }
    Ok(report.exit_code())
}

fn load_config(path: Option<&Path>) -> Result<HarvestConfig> {
    match path {
        Some(path) => HarvestConfig::from_file(path)
            .with_context(|| format!("loading configuration from {:?}", path)),
        None => Ok(HarvestConfig::default()),
    }
}

/// Cancel the returned token on Ctrl-C or SIGTERM
fn spawn_signal_watcher() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Received interrupt signal, finishing with a sentinel");
        token.cancel();
    });
    cancel
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
