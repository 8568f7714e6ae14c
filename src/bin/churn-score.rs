//! Score one customer against a published model and print the JSON response.

use std::io::Read;
use std::path::{Path, PathBuf};

use churn_risk::cli;
use churn_risk::features::FeatureSnapshot;
use churn_risk::scoring::{ScoreRequest, ScoringService};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug)]
enum Input {
    Inline { user_id: String, features: String },
    /// Path to a request body; `-` reads stdin.
    Request(PathBuf),
    Health,
}

#[derive(Debug)]
struct Options {
    config: Option<PathBuf>,
    version: Option<String>,
    input: Input,
}

fn run() -> Result<(), String> {
    let Some(options) = parse_args(std::env::args().skip(1).collect())? else {
        println!("{}", help_text());
        return Ok(());
    };
    cli::init_logging("churn-score");
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

    let output = match options.input {
        Input::Health => serde_json::to_string(&service.health()),
        Input::Inline { user_id, features } => {
            let features: FeatureSnapshot = serde_json::from_str(&features)
                .map_err(|err| format!("--features is not a JSON object of features: {err}"))?;
            let response = service
                .score(&user_id, &features)
                .map_err(|err| err.to_string())?;
            serde_json::to_string(&response)
        }
        Input::Request(path) => {
            let body = read_body(&path)?;
            let request: ScoreRequest = serde_json::from_str(&body)
                .map_err(|err| format!("Invalid score request: {err}"))?;
            let response = service
                .score_request(&request)
                .map_err(|err| err.to_string())?;
            serde_json::to_string(&response)
        }
    }
    .map_err(|err| err.to_string())?;
    println!("{output}");
    Ok(())
}

fn read_body(path: &Path) -> Result<String, String> {
    if path.as_os_str() == "-" {
        let mut body = String::new();
        std::io::stdin()
            .read_to_string(&mut body)
            .map_err(|err| format!("Failed to read request from stdin: {err}"))?;
        return Ok(body);
    }
    std::fs::read_to_string(path)
        .map_err(|err| format!("Failed to read request {}: {err}", path.display()))
}

/// `Ok(None)` means help was requested.
fn parse_args(args: Vec<String>) -> Result<Option<Options>, String> {
    let mut config = None;
    let mut version = None;
    let mut user_id = None;
    let mut features = None;
    let mut request = None;
    let mut health = false;
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "--config" => {
                config = Some(PathBuf::from(cli::take_value(&args, &mut idx, "--config")?));
            }
            "--version" => {
                version = Some(cli::take_value(&args, &mut idx, "--version")?.to_string());
            }
            "--user-id" => {
                user_id = Some(cli::take_value(&args, &mut idx, "--user-id")?.to_string());
            }
            "--features" => {
                features = Some(cli::take_value(&args, &mut idx, "--features")?.to_string());
            }
            "--request" => {
                request = Some(PathBuf::from(cli::take_value(&args, &mut idx, "--request")?));
            }
            "--health" => health = true,
            "-h" | "--help" => return Ok(None),
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }

    let input = match (health, request, features) {
        (true, None, None) => Input::Health,
        (false, Some(path), None) => Input::Request(path),
        (false, None, Some(features)) => Input::Inline {
            user_id: user_id.unwrap_or_default(),
            features,
        },
        (false, None, None) => {
            return Err(format!(
                "Provide --features, --request or --health\n\n{}",
                help_text()
            ));
        }
        _ => return Err("--features, --request and --health are mutually exclusive".to_string()),
    };
    Ok(Some(Options {
        config,
        version,
        input,
    }))
}

fn help_text() -> String {
    [
        "churn-score",
        "",
        "Score a customer snapshot with a published churn model.",
        "",
        "Usage:",
        "  churn-score --user-id <id> --features '<json object>'",
        "  churn-score --request <file|->",
        "  churn-score --health",
        "",
        "Options:",
        "  --config <path>   Config file (default: churn-risk.toml in the app directory).",
        "  --version <v>     Model version (default from config, latest).",
        "  --request <file>  Request body {\"userId\": ..., \"features\": {...}}; `-` reads stdin.",
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
    fn inline_features_keep_user_id() {
        let options = parse_args(args(&["--user-id", "u1", "--features", "{\"activity_7d\": 2}"]))
            .unwrap()
            .unwrap();
        match options.input {
            Input::Inline { user_id, features } => {
                assert_eq!(user_id, "u1");
                assert!(features.contains("activity_7d"));
            }
            other => panic!("unexpected input: {other:?}"),
        }
    }

    #[test]
    fn inputs_are_exclusive() {
        assert!(parse_args(args(&["--health", "--request", "-"])).is_err());
        assert!(parse_args(args(&["--user-id", "u1"])).is_err());
        assert!(matches!(
            parse_args(args(&["--health"])).unwrap().unwrap().input,
            Input::Health
        ));
    }
}
