use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tyre_strategy::stint::summaries_for_driver;
use tyre_strategy::{
    build_compound_models, clean, compare, ensure_all_compounds, evaluate_accuracy, load_laps,
    segment, summarize, AnalysisConfig, Compound, CompoundModels, SegmentedLap,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Tyre stint and pit strategy analysis", long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarise each driver's stints
    Stints(StintsArgs),
    /// Fit per-compound degradation models
    Models(ModelsArgs),
    /// Simulate and rank strategies
    Compare(CompareArgs),
}

#[derive(Args, Debug)]
struct LapsArg {
    /// Lap export CSV (Driver, LapNumber, LapTime, Compound, PitInTime, PitOutTime)
    #[arg(long, value_hint = ValueHint::FilePath)]
    laps: PathBuf,
}

#[derive(Args, Debug)]
struct StintsArgs {
    #[command(flatten)]
    input: LapsArg,

    /// Only show this driver
    #[arg(long)]
    driver: Option<String>,

    /// Emit JSON instead of a table
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Args, Debug)]
struct ModelsArgs {
    #[command(flatten)]
    input: LapsArg,

    /// Minimum pooled laps before a compound gets its own model
    #[arg(long)]
    min_laps: Option<usize>,

    /// Analysis config JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

#[derive(Args, Debug)]
struct CompareArgs {
    #[command(flatten)]
    input: LapsArg,

    /// Analysis config JSON with strategies
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Seconds lost per pit stop
    #[arg(long)]
    pit_loss: Option<f64>,

    #[arg(long)]
    min_laps: Option<usize>,

    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Stints(args) => run_stints(args),
        Command::Models(args) => run_models(args),
        Command::Compare(args) => run_compare(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_segmented(path: &Path) -> Result<Vec<SegmentedLap>> {
    let laps = load_laps(path)
        .with_context(|| format!("failed to load laps from {}", path.display()))?;
    let cleaned = clean(&laps);
    info!(raw = laps.len(), cleaned = cleaned.len(), "loaded session laps");
    Ok(segment(&cleaned))
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => AnalysisConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(AnalysisConfig::default()),
    }
}

fn print_json<T: Serialize>(rows: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(rows)?);
    Ok(())
}

fn run_stints(args: StintsArgs) -> Result<()> {
    let segmented = load_segmented(&args.input.laps)?;
    let summaries = summarize(&segmented);
    let rows: Vec<_> = match args.driver.as_deref() {
        Some(driver) => summaries_for_driver(&summaries, driver).cloned().collect(),
        None => summaries,
    };

    if args.json {
        return print_json(&rows);
    }
    println!(
        "{:<8} {:>5} {:<12} {:>5} {:>5} {:>5} {:>9}",
        "Driver", "Stint", "Compound", "Start", "End", "Laps", "Avg (s)"
    );
    for s in &rows {
        println!(
            "{:<8} {:>5} {:<12} {:>5} {:>5} {:>5} {:>9}",
            s.driver_id,
            s.stint_id,
            s.compound.map_or("-", |c| c.as_str()),
            s.start_lap,
            s.end_lap,
            s.lap_count,
            s.avg_lap_time
                .map_or_else(|| "-".to_string(), |t| format!("{:.3}", t.as_secs_f64())),
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct ModelRow {
    compound: Compound,
    base_time: f64,
    slope: f64,
    sample_count: usize,
    /// Set when the compound had no fit of its own.
    proxy_for: Option<Compound>,
    mean_abs_error_seconds: Option<f64>,
}

// which fitted compound a substituted entry borrows its model from
fn proxy_source(
    fitted: &CompoundModels,
    compound: Compound,
    models: &CompoundModels,
) -> Option<Compound> {
    if fitted.contains_key(&compound) {
        return None;
    }
    let model = models.get(&compound)?;
    fitted
        .iter()
        .find(|(_, m)| Arc::ptr_eq(m, model))
        .map(|(c, _)| *c)
}

fn run_models(args: ModelsArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let min_laps = args.min_laps.unwrap_or(config.min_laps_per_compound);

    let segmented = load_segmented(&args.input.laps)?;
    let fitted = build_compound_models(&segmented, min_laps)?;
    let models = ensure_all_compounds(fitted.clone());
    let accuracy = evaluate_accuracy(&fitted, &segmented);

    let rows: Vec<ModelRow> = models
        .iter()
        .map(|(compound, model)| ModelRow {
            compound: *compound,
            base_time: model.base_time(),
            slope: model.slope(),
            sample_count: model.sample_count(),
            proxy_for: proxy_source(&fitted, *compound, &models),
            mean_abs_error_seconds: accuracy
                .iter()
                .find(|a| a.compound == *compound)
                .map(|a| a.mean_abs_error_seconds),
        })
        .collect();

    if args.json {
        return print_json(&rows);
    }
    println!(
        "{:<12} {:>9} {:>9} {:>6} {:>8}  Source",
        "Compound", "Base (s)", "Slope", "Laps", "MAE (s)"
    );
    for r in &rows {
        println!(
            "{:<12} {:>9.3} {:>9.4} {:>6} {:>8}  {}",
            r.compound.as_str(),
            r.base_time,
            r.slope,
            r.sample_count,
            r.mean_abs_error_seconds
                .map_or_else(|| "-".to_string(), |e| format!("{e:.3}")),
            r.proxy_for
                .map_or_else(|| "fitted".to_string(), |c| format!("proxy of {c}")),
        );
    }
    Ok(())
}

fn run_compare(args: CompareArgs) -> Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(pit_loss) = args.pit_loss {
        config.pit_loss_seconds = pit_loss;
    }
    if let Some(min_laps) = args.min_laps {
        config.min_laps_per_compound = min_laps;
    }
    config.validate()?;

    let segmented = load_segmented(&args.input.laps)?;
    let models = ensure_all_compounds(build_compound_models(
        &segmented,
        config.min_laps_per_compound,
    )?);
    let results = compare(&config.strategies, &models, config.pit_loss_seconds)
        .context("strategy comparison failed")?;

    if args.json {
        return print_json(&results);
    }
    println!(
        "--- Strategies (Pit Loss: {}s) ---",
        config.pit_loss_seconds
    );
    for r in &results {
        let stops = config
            .strategies
            .get(&r.strategy_name)
            .map_or(0, |p| p.pit_stops());
        println!(
            "- {:16} : {:9.2}s  +{:7.2}s ({} stops)",
            r.strategy_name, r.total_time_seconds, r.delta_to_best_seconds, stops
        );
    }
    Ok(())
}
