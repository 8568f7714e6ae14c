//! Offline job: train a churn model on the recent window and publish it.

use std::path::PathBuf;

use churn_risk::cli;
use churn_risk::ml::ModelKind;
use churn_risk::training::{TrainingOptions, TrainingPipeline, TrainingWindow};
use time::Date;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, Default)]
struct Options {
    config: Option<PathBuf>,
    source: Option<PathBuf>,
    days: Option<u32>,
    end: Option<Date>,
    kind: Option<ModelKind>,
    seed: Option<u64>,
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        println!("{}", help_text());
        return Ok(());
    };
    cli::init_logging("churn-train");
    let context = cli::load_context(options.config.as_deref())?;
    let settings = &context.config.training;
    let source = cli::snapshot_source(settings, options.source.as_deref())?;

    let days = options.days.unwrap_or(settings.window_days);
    if days == 0 {
        return Err("--days must be at least 1".to_string());
    }
    let window = TrainingWindow::ending(options.end.unwrap_or_else(cli::today_utc), days);
    let training = TrainingOptions {
        kind: options.kind.unwrap_or(settings.model_kind),
        default_region: context.config.scoring.default_region.clone(),
        validation_fraction: settings.validation_fraction,
        split_seed: options.seed.unwrap_or(settings.split_seed),
        calibration: settings.calibration(),
        version_prefix: settings.version_prefix.clone(),
        ..TrainingOptions::default()
    };

    println!(
        "Training {} on {} .. {} from {}",
        training.kind.version_tag(),
        window.start,
        window.end,
        source.describe()
    );
    let report = TrainingPipeline::new(source.as_ref(), &context.registry, training)
        .run(&window)
        .map_err(|err| cli::describe_training_error(&err))?;

    println!("Published {}", report.version);
    println!("  artifact: {}", report.model_path.display());
    println!(
        "  samples: {} total, {} train ({} weeks), {} validation ({} weeks)",
        report.training_samples,
        report.train_rows,
        report.train_groups.len(),
        report.validation_samples,
        report.validation_groups.len()
    );
    println!(
        "  validation: auc_roc={:.4} auc_pr={:.4} brier={:.4}",
        report.metrics.auc_roc, report.metrics.auc_pr, report.metrics.brier
    );
    println!(
        "  thresholds: med={:.4} high={:.4}",
        report.thresholds.med, report.thresholds.high
    );
    println!(
        "  validation tiers: low={} med={} high={}",
        report.validation_tiers.low, report.validation_tiers.med, report.validation_tiers.high
    );
    if report.low_confidence {
        println!("  warning: validation split had a single label class; artifact flagged low confidence");
    }
    Ok(())
}

/// `Ok(None)` means help was requested.
fn parse_args(args: Vec<String>) -> Result<Option<Options>, String> {
    let mut options = Options::default();
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "--config" => {
                options.config = Some(PathBuf::from(cli::take_value(&args, &mut idx, "--config")?));
            }
            "--source" => {
                options.source = Some(PathBuf::from(cli::take_value(&args, &mut idx, "--source")?));
            }
            "--days" => {
                let value = cli::take_value(&args, &mut idx, "--days")?;
                options.days = Some(cli::parse_flag(value, "--days")?);
            }
            "--end" => {
                let value = cli::take_value(&args, &mut idx, "--end")?;
                options.end = Some(cli::parse_date(value)?);
            }
            "--kind" => {
                let value = cli::take_value(&args, &mut idx, "--kind")?;
                options.kind = Some(cli::parse_model_kind(value)?);
            }
            "--seed" => {
                let value = cli::take_value(&args, &mut idx, "--seed")?;
                options.seed = Some(cli::parse_flag(value, "--seed")?);
            }
            "-h" | "--help" => return Ok(None),
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }
    Ok(Some(options))
}

fn help_text() -> String {
    [
        "churn-train",
        "",
        "Fetch labeled snapshots, train a churn model and publish it to the model store.",
        "",
        "Usage:",
        "  churn-train [--days <n>] [--end <YYYY-MM-DD>] [--source <file>] [--kind gbdt|logreg]",
        "",
        "Options:",
        "  --config <path>   Config file (default: churn-risk.toml in the app directory).",
        "  --source <file>   Read snapshots from a JSON/JSONL file instead of the export API.",
        "  --days <n>        Window length in days, inclusive (default from config, 90).",
        "  --end <date>      Last day of the window (default: today, UTC).",
        "  --kind <kind>     Model family (default from config, gbdt).",
        "  --seed <n>        Group split seed (default from config, 42).",
    ]
    .join("\n")
}
