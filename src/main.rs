use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use scrape_dispatch::alert::manager::format_duration;
use scrape_dispatch::config::ConfigLoader;
use scrape_dispatch::proxy::{self, ProxyScorer};
use scrape_dispatch::{AlertManager, Dispatcher, DispatcherState, Registry, StatsSnapshot, storage};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "scrape-dispatch")]
#[command(version = "0.1.0")]
#[command(about = "Scheduled scraping dispatcher with proxy rotation and alerting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the dispatcher from a config file
    Run {
        /// Path to the configuration file (JSON/YAML/TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Run a single cycle and exit
        #[arg(long, default_value_t = false)]
        once: bool,

        /// Show a progress spinner (stderr)
        #[arg(short, long, default_value_t = false)]
        progress: bool,
    },
    /// Validate a configuration file
    Check {
        /// Path to the configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Print a persisted proxy score table, best first
    Scores {
        /// Path to the score table
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "info"); }
    }
    let cli = Cli::parse();
    let logger = env_logger::Builder::from_default_env().build();
    let level = logger.filter();
    let multi = Arc::new(indicatif::MultiProgress::new());

    match cli.command {
        Commands::Run { config, once, progress } => {
            if progress {
                indicatif_log_bridge::LogWrapper::new((*multi).clone(), logger).try_init()?;
            } else {
                log::set_boxed_logger(Box::new(logger))?;
            }
            log::set_max_level(level);

            log::info!("Loading config from {:?}", config);
            let mut config_data = ConfigLoader::load(&config)?;
            if once {
                config_data.single_run = true;
            }

            let alerts = Arc::new(AlertManager::from_config(&config_data.alerts)?);
            let storage = storage::from_config(&config_data.storage, progress.then(|| multi.clone()));
            let proxy_source = proxy::pool::from_config(&config_data.proxy.source)?;
            let mut registry = Registry::new();
            registry.register_pages(&config_data);

            let mut dispatcher = Dispatcher::new(config_data, registry, alerts, storage, proxy_source);

            let signal = dispatcher.shutdown_signal();
            tokio::spawn(async move {
                let name = wait_for_signal().await;
                signal.request(&format!("received {}", name));
            });

            let mut progress_bar: Option<ProgressBar> = None;
            let mut _progress_task = None;
            if progress {
                let pb = multi.add(ProgressBar::new_spinner());
                pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
                pb.enable_steady_tick(Duration::from_millis(120));

                let mut stats_rx = dispatcher.watch_stats();
                let state_rx = dispatcher.watch_state();
                let pb_clone = pb.clone();
                progress_bar = Some(pb);
                _progress_task = Some(tokio::spawn(async move {
                    while stats_rx.changed().await.is_ok() {
                        let snapshot: StatsSnapshot = stats_rx.borrow().clone();
                        let state: DispatcherState = *state_rx.borrow();
                        pb_clone.set_message(format!(
                            "{:?} | Cycles: {} | Items: {} | Errors: {}",
                            state, snapshot.cycles_completed, snapshot.total_items, snapshot.total_errors
                        ));
                    }
                }));
            }

            let result = dispatcher.run().await;

            if let Some(task) = _progress_task {
                task.abort();
            }
            if let Some(pb) = progress_bar {
                pb.finish_and_clear();
            }

            let final_stats = dispatcher.stats();
            println!("\n✅ Dispatcher stopped:");
            println!("   Cycles: {}", final_stats.cycles_completed);
            for category in &final_stats.categories {
                println!(
                    "   {}: {} items, {} errors ({} runs)",
                    category.name, category.items_scraped, category.errors, category.runs
                );
            }
            println!("   Total Items: {}", final_stats.total_items);
            println!("   Total Errors: {}", final_stats.total_errors);
            println!(
                "   Runtime: {}",
                format_duration(Duration::from_secs_f64(final_stats.elapsed_seconds))
            );

            result?;
        }
        Commands::Check { config } => {
            match ConfigLoader::load(&config) {
                Ok(cfg) => {
                    println!("✅ Config is valid:");
                    println!("   Categories: {}", cfg.category_names().join(", "));
                    for category in &cfg.categories {
                        println!(
                            "     {}: timeout {}, stagger {}, {} page sites",
                            category.name,
                            format_duration(cfg.timeout_for(&category.name)),
                            format_duration(cfg.stagger_for(&category.name)),
                            category.pages.len()
                        );
                    }
                    println!("   Single run: {}", cfg.single_run);
                    println!("   Alerts enabled: {}", cfg.alerts.enabled);
                }
                Err(e) => {
                    eprintln!("❌ Config error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Scores { file } => {
            if !file.exists() {
                anyhow::bail!("score table {} does not exist", file.display());
            }
            let scorer = ProxyScorer::load(&file);
            let mut proxies: Vec<String> = scorer.records().keys().cloned().collect();
            proxies.sort();

            println!("{:<28} {:>6} {:>6} {:>6} {:>8} {:>8}", "proxy", "score", "ok", "fail", "blocked", "latency");
            for (proxy, score) in scorer.rank(&proxies) {
                if let Some(record) = scorer.get(proxy) {
                    println!(
                        "{:<28} {:>6.1} {:>6} {:>6} {:>8} {:>7.2}s",
                        proxy,
                        score,
                        record.success,
                        record.fail,
                        record.blocked,
                        record.avg_latency().unwrap_or(0.0)
                    );
                }
            }
        }
    }

    Ok(())
}

async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT",
                _ = term.recv() => "SIGTERM",
            },
            Err(e) => {
                log::warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT"
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl-C"
    }
}
