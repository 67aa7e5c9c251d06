mod config;
mod display;
mod pipeline;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use drawwatch_fetch::WebFetcher;
use drawwatch_store::{AlertSink, AlertStore, DocumentQuery, ResultStore, StoreHandle};

use crate::config::Config;
use crate::pipeline::{Pipeline, Source};

#[derive(Parser)]
#[command(name = "drawwatch", version, about = "Lottery draw scraper and completeness monitor")]
struct Cli {
    /// Configuration file.
    #[arg(long, env = "DRAWWATCH_CONFIG", default_value = "drawwatch.toml")]
    config: PathBuf,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one scrape cycle for all or selected sources.
    Run {
        /// Source id to run; repeat for several. Default: all sources.
        #[arg(long = "source")]
        sources: Vec<String>,
        /// Day to scrape and validate. Default: today in each source's time zone.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Run cycles on a fixed interval until interrupted.
    Watch {
        /// Seconds between cycle starts.
        #[arg(long, default_value_t = 300)]
        every: u64,
        #[arg(long = "source")]
        sources: Vec<String>,
    },
    /// Check stored draws for one source against its schedule.
    Check {
        #[arg(long)]
        source: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Print stored result documents.
    Results {
        /// Source id pattern, SQL LIKE syntax (e.g. `us/%`).
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Per-source coverage table instead of full documents.
        #[arg(long)]
        summary: bool,
    },
    /// Print active alerts, or dismiss one.
    Alerts {
        #[arg(long)]
        dismiss: Option<i64>,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Loaded configuration plus the store handle every command shares.
struct App {
    config: Config,
    handle: Arc<StoreHandle>,
}

impl App {
    fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let config = Config::load(path).with_context(|| format!("loading {}", path.display()))?;
        let handle = Arc::new(StoreHandle::new(config.store.path.clone()));
        Ok(Self { config, handle })
    }

    fn sources(&self, ids: &[String]) -> anyhow::Result<Vec<Source>> {
        for id in ids {
            if self.config.source(id).is_none() {
                bail!("unknown source {id:?}");
            }
        }
        self.config
            .sources
            .iter()
            .filter(|s| ids.is_empty() || ids.contains(&s.id))
            .map(|s| Source::new(s.clone()).with_context(|| format!("source {}", s.id)))
            .collect()
    }

    fn pipeline(&self) -> anyhow::Result<Pipeline> {
        let fetch = &self.config.fetch;
        let fetcher = WebFetcher::new(
            &fetch.user_agent,
            fetch.timeout(),
            fetch.render_service.clone(),
        )
        .context("building HTTP client")?;
        let store_timeout = self.config.store.timeout();
        Ok(Pipeline::new(
            Arc::new(fetcher),
            fetch.retry_policy(),
            self.handle.clone(),
            AlertSink::new(self.handle.clone(), store_timeout),
            store_timeout,
        ))
    }
}

async fn run(app: &App, ids: &[String], date: Option<NaiveDate>) -> anyhow::Result<()> {
    let sources = app.sources(ids)?;
    if sources.is_empty() {
        warn!("no sources configured");
        return Ok(());
    }
    let pipeline = app.pipeline()?;
    let reports = pipeline.run_all(&sources, date, Utc::now()).await;
    display::print_reports(&reports);
    Ok(())
}

async fn watch(app: &App, ids: &[String], every: u64) -> anyhow::Result<()> {
    if every == 0 {
        bail!("--every must be at least 1 second");
    }
    let sources = app.sources(ids)?;
    let pipeline = app.pipeline()?;
    let mut ticker = tokio::time::interval(Duration::from_secs(every));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(sources = sources.len(), every, "watching");
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }
        tokio::select! {
            _ = &mut shutdown => {
                warn!("interrupted during a cycle");
                break;
            }
            reports = pipeline.run_all(&sources, None, Utc::now()) => {
                display::print_reports(&reports);
            }
        }
    }
    info!("stopped");
    Ok(())
}

async fn check(app: &App, id: &str, date: Option<NaiveDate>) -> anyhow::Result<()> {
    let source = app
        .sources(&[id.to_string()])?
        .into_iter()
        .next()
        .context("source not found")?;
    let now = Utc::now();
    let date = date.unwrap_or_else(|| source.today(now));
    let status = app
        .pipeline()?
        .day_status(&source, date, now)
        .await
        .context("reading stored draws")?;
    match status {
        Some(status) => println!("{id} {date}: {}", display::status_line(&Some(status))),
        None => println!("{id} {date}: no schedule configured"),
    }
    Ok(())
}

async fn results(app: &App, query: DocumentQuery, summary: bool) -> anyhow::Result<()> {
    if summary {
        let store = app.handle.get().await?;
        let batches = tokio::task::spawn_blocking(move || store.coverage(&query)).await??;
        return display::print_batches(&batches);
    }
    let docs = app.handle.query(&query).await?;
    if docs.is_empty() {
        println!("No stored results.");
    }
    for doc in &docs {
        display::print_document(doc);
    }
    Ok(())
}

async fn alerts(app: &App, dismiss: Option<i64>) -> anyhow::Result<()> {
    if let Some(id) = dismiss {
        let store = app.handle.get().await?;
        let changed = tokio::task::spawn_blocking(move || store.dismiss_alert(id)).await??;
        if changed {
            println!("Alert #{id} dismissed.");
        } else {
            println!("No active alert #{id}.");
        }
        return Ok(());
    }
    let active = app.handle.active_alerts().await?;
    display::print_alerts(&active);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    info!("drawwatch v{}", env!("CARGO_PKG_VERSION"));

    let app = App::load(&cli.config)?;
    match cli.command {
        Command::Run { sources, date } => run(&app, &sources, date).await,
        Command::Watch { every, sources } => watch(&app, &sources, every).await,
        Command::Check { source, date } => check(&app, &source, date).await,
        Command::Results {
            source,
            from,
            to,
            summary,
        } => {
            let query = DocumentQuery {
                source_pattern: source,
                from,
                to,
            };
            results(&app, query, summary).await
        }
        Command::Alerts { dismiss } => alerts(&app, dismiss).await,
    }
}
