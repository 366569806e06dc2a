//! ChartLink CLI: headless chart sessions, catalog, indicator fetch, preferences.
//!
//! Commands:
//! - `demo`: run a headless session (main pane + indicator panes) and report the result
//! - `indicators`: list the built-in indicator catalog
//! - `fetch`: compute one indicator and print a summary or export it as CSV
//! - `prefs show` / `prefs clear`: inspect or reset saved indicator preferences
//! - `config show` / `config init`: print the effective config or write a default file

use anyhow::{anyhow, bail, Context, Result};
use chartlink_core::backend::{Backend, HttpBackend, SyntheticBackend};
use chartlink_core::config::{BackendKind, EngineConfig};
use chartlink_core::domain::{Interval, LogicalRange, SeriesPayload, Symbol};
use chartlink_core::engine::{ChartEngine, EngineEvent, EventOutcome};
use chartlink_core::fetch::QueueDispatcher;
use chartlink_core::indicators::{NewIndicator, PlotTarget, BUILTINS};
use chartlink_core::panes::{MemorySurfaceFactory, PaneRole};
use chartlink_core::persistence::{JsonFilePreferences, MemoryPreferences, PreferenceStore};
use chartlink_core::sync::ViewportHandle;
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "chartlink",
    about = "ChartLink CLI: synchronized multi-pane charts with indicator overlays"
)]
struct Cli {
    /// Config file. Defaults to <config dir>/chartlink/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured backend.
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    Http,
    Synthetic,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a headless chart session and print panes, series and notices.
    Demo {
        /// Symbol to chart. Defaults to the configured symbol.
        #[arg(long)]
        symbol: Option<String>,

        /// Interval (1m, 5m, 15m, 30m, 1h, 4h, 1d, 1w, 1mo).
        #[arg(long)]
        interval: Option<String>,

        /// Indicator to add: NAME[:key=value,...][@overlay|@separate]. Repeatable.
        #[arg(long = "add", value_name = "SPEC")]
        add: Vec<String>,

        /// Custom indicator as NAME=PATH to a source file. Repeatable.
        #[arg(long = "custom", value_name = "NAME=PATH")]
        custom: Vec<String>,

        /// Keep preferences in memory only.
        #[arg(long, default_value_t = false)]
        no_persist: bool,
    },
    /// List built-in indicators with their parameters.
    Indicators,
    /// Compute one indicator and print or export it.
    Fetch {
        /// Symbol (e.g., AAPL).
        symbol: String,

        /// Built-in indicator name (SMA, EMA, RSI, MACD, BB).
        name: String,

        /// Interval. Defaults to 1d.
        #[arg(long, default_value = "1d")]
        interval: String,

        /// Parameter override as key=value. Repeatable.
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Write the series to this CSV file instead of printing a summary.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Saved indicator preferences.
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },
    /// Engine configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum PrefsAction {
    /// Print saved indicators.
    Show,
    /// Delete the preferences file.
    Clear,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Write a default config file (refuses to overwrite without --force).
    Init {
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = match cli.config {
        Some(path) => path,
        None => default_dir()?.join("config.toml"),
    };
    let mut config = EngineConfig::load_or_default(&config_path)?;
    if let Some(kind) = cli.backend {
        config.backend.kind = match kind {
            BackendArg::Http => BackendKind::Http,
            BackendArg::Synthetic => BackendKind::Synthetic,
        };
    }

    match cli.command {
        Commands::Demo {
            symbol,
            interval,
            add,
            custom,
            no_persist,
        } => run_demo(config, symbol, interval, &add, &custom, no_persist),
        Commands::Indicators => {
            print_catalog();
            Ok(())
        }
        Commands::Fetch {
            symbol,
            name,
            interval,
            params,
            out,
        } => run_fetch(&config, &symbol, &name, &interval, &params, out.as_deref()),
        Commands::Prefs { action } => {
            let prefs = JsonFilePreferences::new(preferences_path(&config)?);
            match action {
                PrefsAction::Show => show_prefs(&prefs),
                PrefsAction::Clear => {
                    prefs.clear()?;
                    println!("Cleared: {}", prefs.path().display());
                    Ok(())
                }
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("# {}", config_path.display());
                print!("{}", config.to_toml()?);
                Ok(())
            }
            ConfigAction::Init { force } => init_config(&config_path, force),
        },
    }
}

fn default_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("chartlink"))
        .ok_or_else(|| anyhow!("no config directory on this platform; pass --config"))
}

fn preferences_path(config: &EngineConfig) -> Result<PathBuf> {
    match &config.preferences_path {
        Some(path) => Ok(path.clone()),
        None => Ok(default_dir()?.join("indicators.json")),
    }
}

fn make_backend(config: &EngineConfig) -> Result<Box<dyn Backend>> {
    let backend: Box<dyn Backend> = match config.backend.kind {
        BackendKind::Synthetic => Box::new(SyntheticBackend::new(config.backend.seed)),
        BackendKind::Http => Box::new(HttpBackend::new(&config.backend.base_url, config.backend.timeout())?),
    };
    Ok(backend)
}

// ── demo ─────────────────────────────────────────────────────────────

fn run_demo(
    mut config: EngineConfig,
    symbol: Option<String>,
    interval: Option<String>,
    add: &[String],
    custom: &[String],
    no_persist: bool,
) -> Result<()> {
    if let Some(symbol) = symbol {
        config.symbol = symbol;
    }
    if let Some(interval) = interval {
        config.interval = interval;
    }
    config.validate()?;

    let preferences: Box<dyn PreferenceStore> = if no_persist {
        Box::new(MemoryPreferences::new())
    } else {
        Box::new(JsonFilePreferences::new(preferences_path(&config)?))
    };
    let backend = make_backend(&config)?;
    let mut engine = ChartEngine::new(
        &config,
        MemorySurfaceFactory::new(),
        QueueDispatcher::new(),
        preferences,
    )?;

    for spec in add {
        let new = parse_indicator_spec(spec)?;
        if let EventOutcome::Added(id) = engine.handle(EngineEvent::AddIndicator(new))? {
            tracing::debug!(indicator = %id, spec = %spec, "added from command line");
        }
    }
    for entry in custom {
        let (name, path) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("expected NAME=PATH, got '{entry}'"))?;
        let code = std::fs::read_to_string(path).with_context(|| format!("read {path}"))?;
        engine.handle(EngineEvent::AddIndicator(NewIndicator::custom(name, code)))?;
    }

    let handled = engine.run_pending(backend.as_ref())?;
    tracing::info!(handled, backend = backend.name(), "fetches completed");

    // Zoom to the last 60 bars and put the crosshair on the last one.
    let candles = engine.candles().to_vec();
    let main = engine.main_pane();
    if let Some(last) = candles.last() {
        let bars = candles.len() as f64;
        let surface = engine
            .surface_mut(main)
            .ok_or_else(|| anyhow!("main pane is missing"))?;
        let zoom = surface.user_zoom(LogicalRange::new((bars - 60.0).max(0.0), bars - 1.0));
        let crosshair = surface.user_move_crosshair(last.time, 0.0, last.close);
        engine.handle(EngineEvent::PaneViewportChanged { pane: main, patch: zoom })?;
        engine.handle(EngineEvent::PaneViewportChanged { pane: main, patch: crosshair })?;
    }

    print_session(&engine, &candles);
    Ok(())
}

/// `NAME[:key=value,...][@overlay|@separate]`
fn parse_indicator_spec(spec: &str) -> Result<NewIndicator> {
    let (body, target) = match spec.rsplit_once('@') {
        Some((body, "overlay")) => (body, Some(PlotTarget::Overlay)),
        Some((body, "separate")) => (body, Some(PlotTarget::Separate)),
        Some((_, other)) => bail!("unknown plot target '{other}' (overlay or separate)"),
        None => (spec, None),
    };
    let (name, params) = match body.split_once(':') {
        Some((name, params)) => (name, parse_params(params.split(','))?),
        None => (body, BTreeMap::new()),
    };
    let mut new = NewIndicator::builtin(name);
    for (key, value) in params {
        new = new.param(key, value);
    }
    if let Some(target) = target {
        new = new.target(target);
    }
    Ok(new)
}

fn parse_params<'a>(pairs: impl IntoIterator<Item = &'a str>) -> Result<BTreeMap<String, f64>> {
    pairs
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("expected key=value, got '{pair}'"))?;
            let value: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("parameter '{key}' is not a number"))?;
            Ok((key.trim().to_string(), value))
        })
        .collect()
}

fn print_session<D>(engine: &ChartEngine<MemorySurfaceFactory, D>, candles: &[chartlink_core::domain::Candle])
where
    D: chartlink_core::fetch::FetchDispatcher,
{
    println!();
    println!("=== Chart Session ===");
    println!("Context:        {}", engine.context());
    println!("Candles:        {}", candles.len());
    if let (Some(first), Some(last)) = (candles.first(), candles.last()) {
        println!("Range:          {} to {}", format_time(first.time), format_time(last.time));
        println!("Last close:     {:.2}", last.close);
    }
    println!("Panes:          {}", engine.registry().len());
    println!();

    println!("{:<6} {:<8} {:<10} {:<10} {:<8} {}", "Id", "Status", "Target", "Enabled", "Color", "Label");
    println!("{}", "-".repeat(72));
    for inst in engine.store().list() {
        println!(
            "{:<6} {:<8} {:<10} {:<10} {:<8} {}",
            inst.id.to_string(),
            format!("{:?}", inst.status).to_lowercase(),
            target_name(inst.plot_target),
            inst.enabled,
            inst.color,
            inst.label(),
        );
    }

    for pane in engine.registry().iter() {
        let role = match pane.role {
            PaneRole::Main => "main".to_string(),
            PaneRole::Indicator(id) => format!("indicator {id}"),
        };
        println!();
        println!("--- {} ({role}) ---", pane.id);
        for series in pane.surface.series() {
            println!("  {:<48} {:>6} points", series.style.title, series.points.len());
        }
        let viewport = pane.surface.viewport();
        if let Some(range) = viewport.logical_range {
            println!("  bars {:.0}..{:.0}", range.from, range.to);
        }
        if let Some(crosshair) = viewport.crosshair {
            for (title, price) in &crosshair.series_prices {
                println!("  @ {} {title} = {price:.4}", format_time(crosshair.time));
            }
        }
    }

    if !engine.notices().is_empty() {
        println!();
        for notice in engine.notices() {
            println!("WARNING [{:?}]: {}", notice.kind, notice.message);
        }
    }
    println!();
}

fn target_name(target: PlotTarget) -> &'static str {
    match target {
        PlotTarget::Overlay => "overlay",
        PlotTarget::Separate => "separate",
    }
}

fn format_time(time: i64) -> String {
    match chrono::DateTime::from_timestamp(time, 0) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        None => time.to_string(),
    }
}

// ── indicators ───────────────────────────────────────────────────────

fn print_catalog() {
    println!("{:<6} {:<40} {:<10} {}", "Name", "Description", "Target", "Parameters");
    println!("{}", "-".repeat(90));
    for spec in BUILTINS {
        let params: Vec<String> = spec
            .params
            .iter()
            .map(|p| format!("{}={} (min {})", p.name, p.default, p.min))
            .collect();
        println!(
            "{:<6} {:<40} {:<10} {}",
            spec.name,
            spec.description,
            target_name(spec.default_target),
            params.join(", ")
        );
    }
}

// ── fetch ────────────────────────────────────────────────────────────

fn run_fetch(
    config: &EngineConfig,
    symbol: &str,
    name: &str,
    interval: &str,
    params: &[String],
    out: Option<&Path>,
) -> Result<()> {
    let symbol = Symbol::parse(symbol)?;
    let interval: Interval = interval.parse()?;
    let spec = chartlink_core::indicators::lookup(name)
        .ok_or_else(|| anyhow!("unknown indicator '{name}'. Valid: SMA, EMA, RSI, MACD, BB"))?;
    let parameters = spec.resolve_parameters(&parse_params(params.iter().map(String::as_str))?)?;

    let backend = make_backend(config)?;
    let payload = backend
        .compute_indicator(&symbol, interval, spec.name, &parameters)?
        .sanitize()
        .map_err(|e| anyhow!("backend returned a malformed series: {e}"))?;

    match out {
        Some(path) => {
            let rows = write_csv(path, &payload)?;
            println!("Wrote {rows} rows to {}", path.display());
        }
        None => print_payload_summary(&symbol, interval, spec.name, &parameters, &payload),
    }
    Ok(())
}

/// One row per timestamp, one column per line; gaps are left empty.
fn write_csv(path: &Path, payload: &SeriesPayload) -> Result<usize> {
    let lines = payload.lines();
    let mut rows: BTreeMap<i64, Vec<Option<f64>>> = BTreeMap::new();
    for (col, (_, points)) in lines.iter().enumerate() {
        for p in points.iter() {
            rows.entry(p.time).or_insert_with(|| vec![None; lines.len()])[col] = Some(p.value);
        }
    }

    let mut writer = csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    let mut header = vec!["time".to_string(), "date".to_string()];
    header.extend(lines.iter().map(|(key, _)| key.to_string()));
    writer.write_record(&header)?;
    for (time, values) in &rows {
        let mut record = vec![time.to_string(), format_time(*time)];
        record.extend(values.iter().map(|v| v.map(|x| x.to_string()).unwrap_or_default()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(rows.len())
}

fn print_payload_summary(
    symbol: &Symbol,
    interval: Interval,
    name: &str,
    parameters: &BTreeMap<String, f64>,
    payload: &SeriesPayload,
) {
    println!();
    println!("=== {name} {symbol} {interval} ===");
    let params: Vec<String> = parameters.iter().map(|(k, v)| format!("{k}={v}")).collect();
    println!("Parameters:     {}", params.join(", "));
    for (key, points) in payload.lines() {
        match (points.first(), points.last()) {
            (Some(first), Some(last)) => println!(
                "{key:<10} {:>6} points  {} .. {}  last {:.4}",
                points.len(),
                format_time(first.time),
                format_time(last.time),
                last.value
            ),
            _ => println!("{key:<10} (no points)"),
        }
    }
    println!();
}

// ── prefs / config ───────────────────────────────────────────────────

fn show_prefs(prefs: &JsonFilePreferences) -> Result<()> {
    let saved = prefs.load();
    println!("Preferences: {}", prefs.path().display());
    if saved.is_empty() {
        println!("(no saved indicators)");
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&saved)?);
    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (pass --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::write(path, EngineConfig::default().to_toml()?)
        .with_context(|| format!("write {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
