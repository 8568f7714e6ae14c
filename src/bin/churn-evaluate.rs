//! Evaluate a published model on a recent holdout window.

use std::path::PathBuf;

use churn_risk::cli;
use churn_risk::evaluation::{evaluate_artifact, save_report};
use churn_risk::scoring::ScoringService;
use churn_risk::training::TrainingWindow;
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
    version: Option<String>,
    days: Option<u32>,
    end: Option<Date>,
    save_report: bool,
    report_dir: Option<PathBuf>,
    json: bool,
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        println!("{}", help_text());
        return Ok(());
    };
    cli::init_logging("churn-evaluate");
    let context = cli::load_context(options.config.as_deref())?;
    let version = options
        .version
        .as_deref()
        .or_else(|| context.config.registry.requested_version());
    let service = ScoringService::from_registry(
        &context.registry,
        version,
        context.config.scoring.service_options(),
    )
    .map_err(|err| cli::describe_registry_error(&err))?;

    let days = options.days.unwrap_or(context.config.evaluation.window_days);
    if days == 0 {
        return Err("--days must be at least 1".to_string());
    }
    let window = TrainingWindow::ending(options.end.unwrap_or_else(cli::today_utc), days);
    let source = cli::snapshot_source(&context.config.training, options.source.as_deref())?;
    let rows = source
        .fetch(&window)
        .map_err(|err| format!("{err}\nHint: check the snapshot source and window."))?;
    if rows.is_empty() {
        return Err(format!(
            "No labeled snapshots between {} and {}\nHint: widen the window with --days or --end.",
            window.start, window.end
        ));
    }

    let report = evaluate_artifact(
        &service,
        &rows,
        &window,
        &context.config.training.calibration(),
    );

    if options.json {
        let text = serde_json::to_string_pretty(&report).map_err(|err| err.to_string())?;
        println!("{text}");
    } else {
        let metrics = &report.performance.metrics;
        println!("Model {} on {} .. {}", report.model_version, window.start, window.end);
        println!(
            "  samples: {} ({} unscorable)",
            report.data_quality.total_samples, report.performance.unscorable_rows
        );
        println!(
            "  auc_roc={:.4} auc_pr={:.4} brier={:.4}",
            metrics.auc_roc, metrics.auc_pr, metrics.brier
        );
        println!(
            "  tiers: low={} med={} high={}",
            report.tier_distribution.low, report.tier_distribution.med, report.tier_distribution.high
        );
        println!(
            "  reason rules: {}/{} passed",
            report.business_rules.rules_passed, report.business_rules.rules_tested
        );
        println!(
            "  top features: {}",
            report.feature_analysis.top_5_features.join(", ")
        );
        println!(
            "  grades: performance={} data_quality={} business_rules={}",
            report.overall_status.performance,
            report.overall_status.data_quality,
            report.overall_status.business_rules
        );
    }

    if options.save_report {
        let dir = cli::report_dir(&context.config, options.report_dir)?;
        let path = save_report(&report, &dir)
            .map_err(|err| format!("Failed to save report to {}: {err}", dir.display()))?;
        println!("Report saved to {}", path.display());
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
            "--version" => {
                options.version = Some(cli::take_value(&args, &mut idx, "--version")?.to_string());
            }
            "--days" => {
                let value = cli::take_value(&args, &mut idx, "--days")?;
                options.days = Some(cli::parse_flag(value, "--days")?);
            }
            "--end" => {
                let value = cli::take_value(&args, &mut idx, "--end")?;
                options.end = Some(cli::parse_date(value)?);
            }
            "--save-report" => {
                options.save_report = true;
                if let Some(dir) = args.get(idx + 1).filter(|next| !next.starts_with("--")) {
                    options.report_dir = Some(PathBuf::from(dir));
                    idx += 1;
                }
            }
            "--json" => options.json = true,
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
        "churn-evaluate",
        "",
        "Score a holdout window with a published model and grade the results.",
        "",
        "Usage:",
        "  churn-evaluate [--version <v>] [--days <n>] [--end <YYYY-MM-DD>] [--source <file>]",
        "                 [--save-report [dir]] [--json]",
        "",
        "Options:",
        "  --config <path>      Config file (default: churn-risk.toml in the app directory).",
        "  --version <v>        Model version (default from config, latest).",
        "  --source <file>      Read snapshots from a JSON/JSONL file instead of the export API.",
        "  --days <n>           Window length in days, inclusive (default from config, 30).",
        "  --end <date>         Last day of the window (default: today, UTC).",
        "  --save-report [dir]  Write test_report_<timestamp>.json (default dir from config).",
        "  --json               Print the full report as JSON.",
    ]
    .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn save_report_takes_optional_dir() {
        let options = parse_args(args(&["--save-report", "out", "--json"]))
            .unwrap()
            .unwrap();
        assert!(options.save_report);
        assert_eq!(options.report_dir, Some(PathBuf::from("out")));
        assert!(options.json);

        let options = parse_args(args(&["--save-report", "--days", "7"]))
            .unwrap()
            .unwrap();
        assert!(options.save_report);
        assert_eq!(options.report_dir, None);
        assert_eq!(options.days, Some(7));
    }
}
