use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use event_ingestor::providers::EventSource;
use event_ingestor::providers::http_feed::HttpFeedProvider;
use event_ingestor::providers::memory::MemoryEventSource;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use visit_map::clustrmaps::summary::{export_summary, load_summary, summarize};
use visit_map::config::{Config, load_config};
use visit_map::cursor::CursorStore;
use visit_map::cursor::file::FileCursorStore;
use visit_map::geocode::Geocoder;
use visit_map::geocode::geonames::GeoNamesDataset;
use visit_map::ingest::{EventIngestOptions, ingest_dump, ingest_events};
use visit_map::ledger::TsvLedger;
use visit_map::hotspot::export_hotspots_json;
use visit_map::pipeline::build_hotspots;
use visit_map::render::{LandPolygons, RenderMeta, render_all};
use visit_map::tz::to_rfc3339;

/// Written next to the SVGs on every render.
const HOTSPOTS_JSON: &str = "hotspots.json";

#[derive(Parser)]
#[command(version, about = "Visitor hotspot maps")]
struct Cli {
    /// Config file. Falls back to $VISIT_MAP_CONFIG, then to built-in defaults.
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level. RUST_LOG overrides.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Append new analytics events to the ledger.
    IngestEvents {
        /// Replay events from a JSON array instead of calling the feed.
        #[arg(long, value_name = "FILE")]
        from_file: Option<PathBuf>,
        /// Cursor key; defaults to analytics.source_id.
        #[arg(long)]
        source: Option<String>,
    },
    /// Import a Clustrmaps dump.
    IngestDump {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        /// Cursor key; defaults to dump.source_id.
        #[arg(long)]
        source: Option<String>,
    },
    /// Write per-location totals of a dump as CSV.
    ExportSummary {
        #[arg(long, value_name = "FILE")]
        file: PathBuf,
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
    /// Draw one SVG per configured scale.
    Render {
        /// Date in the title; today (UTC) by default.
        #[arg(long, value_name = "YYYY-MM-DD")]
        as_of: Option<NaiveDate>,
    },
    Cursor(CursorCmd),
}

#[derive(Args)]
struct CursorCmd {
    #[command(subcommand)]
    sub: CursorSub,
}

#[derive(Subcommand)]
enum CursorSub {
    /// Print every stored cursor.
    Show,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let cfg = load_config(cli.config)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("build tokio runtime")?;

    match cli.cmd {
        Cmd::IngestEvents { from_file, source } => {
            runtime.block_on(run_ingest_events(&cfg, from_file, source))
        }
        Cmd::IngestDump { file, source } => run_ingest_dump(&cfg, file, source),
        Cmd::ExportSummary { file, out } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("read dump {}", file.display()))?;
            let summary = summarize(&text, cfg.dump.parser_options()?);
            let rows = export_summary(&summary, &out)?;
            info!(rows, out = %out.display(), "wrote summary");
            Ok(())
        }
        Cmd::Render { as_of } => runtime.block_on(run_render(&cfg, as_of)),
        Cmd::Cursor(CursorCmd {
            sub: CursorSub::Show,
        }) => {
            let cursors = FileCursorStore::open(&cfg.cursor.path)?;
            for (source, ts) in cursors.all()? {
                println!("{source}\t{}", to_rfc3339(ts));
            }
            Ok(())
        }
    }
}

async fn run_ingest_events(
    cfg: &Config,
    from_file: Option<PathBuf>,
    source: Option<String>,
) -> Result<()> {
    let analytics = cfg.analytics.as_ref();
    let feed: Box<dyn EventSource> = match (&from_file, analytics) {
        (Some(path), _) => Box::new(
            MemoryEventSource::from_json_path(path)
                .with_context(|| format!("load events from {}", path.display()))?,
        ),
        (None, Some(a)) => Box::new(HttpFeedProvider::new(a.feed_config()).context("build analytics feed")?),
        (None, None) => bail!("no [analytics] section in the config and no --from-file given"),
    };

    let mut opts = EventIngestOptions::new(
        source
            .or_else(|| analytics.map(|a| a.source_id.clone()))
            .unwrap_or_else(|| "analytics".to_string()),
    );
    if let Some(a) = analytics {
        opts.timeout = a.timeout();
        opts.page_size = a.page_size;
    }

    let mut ledger = TsvLedger::open(&cfg.ledger.path)?;
    let mut cursors = FileCursorStore::open(&cfg.cursor.path)?;
    match ingest_events(feed.as_ref(), &mut ledger, &mut cursors, &opts).await {
        Ok(report) => {
            println!("{}", serde_json::to_string(&report)?);
            Ok(())
        }
        Err(e) if e.is_retryable() => {
            warn!(error = %e, "ingestion stopped early; rerun to resume");
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn run_ingest_dump(cfg: &Config, file: PathBuf, source: Option<String>) -> Result<()> {
    let text =
        std::fs::read_to_string(&file).with_context(|| format!("read dump {}", file.display()))?;
    let mut options = cfg.dump.parser_options()?;
    if let Some(source) = source {
        let source = source.trim();
        if source.is_empty() {
            bail!("--source cannot be empty");
        }
        options.source = source.to_string();
    }

    let mut ledger = TsvLedger::open(&cfg.ledger.path)?;
    let mut cursors = FileCursorStore::open(&cfg.cursor.path)?;
    let report = ingest_dump(&text, options, &mut ledger, &mut cursors)?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

async fn run_render(cfg: &Config, as_of: Option<NaiveDate>) -> Result<()> {
    let geo = cfg
        .geocoder
        .as_ref()
        .context("rendering needs a [geocoder] section in the config")?;
    let dataset = GeoNamesDataset::load_with_timeout(
        geo.cities_path.clone(),
        geo.countries_path.clone(),
        geo.timeout(),
    )
    .await?;
    let mut geocoder = Geocoder::new(Box::new(dataset));

    let renderer = &cfg.renderer;
    let overlay = match &renderer.overlay_path {
        Some(path) => load_summary(path)?,
        None => Vec::new(),
    };

    let ledger = TsvLedger::open_read(&cfg.ledger.path);
    let inputs = build_hotspots(&ledger, &overlay, renderer.most_recent_visits, &mut geocoder)?;
    let land = renderer
        .land_path
        .as_deref()
        .map(LandPolygons::load)
        .transpose()?;
    let meta = RenderMeta {
        as_of: as_of.unwrap_or_else(|| Utc::now().date_naive()),
        background_href: renderer.background_href.clone(),
        land,
    };
    let written = render_all(
        &inputs.all,
        inputs.recent.as_ref(),
        &renderer.scales,
        &renderer.theme,
        &meta,
        &renderer.output_dir,
    )?;
    let json = renderer.output_dir.join(HOTSPOTS_JSON);
    export_hotspots_json(&inputs.all, &json)
        .with_context(|| format!("write {}", json.display()))?;
    for path in written.iter().chain([&json]) {
        println!("{}", path.display());
    }
    Ok(())
}
