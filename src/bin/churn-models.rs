//! Operator utility to list published models and pin the served version.

use std::path::PathBuf;

use churn_risk::cli;
use churn_risk::config::{self, LATEST};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[derive(Debug, PartialEq)]
enum Command {
    List,
    Show { version: Option<String> },
    Set { mode: SetMode },
}

#[derive(Debug, PartialEq)]
enum SetMode {
    Version(String),
    Latest,
}

fn run() -> Result<(), String> {
    let Some((config_path, command)) = parse_args(std::env::args().skip(1).collect())? else {
        println!("{}", help_text());
        return Ok(());
    };
    let context = cli::load_context(config_path.as_deref())?;
    match command {
        Command::List => list_models(&context),
        Command::Show { version } => show_model(&context, version.as_deref()),
        Command::Set { mode } => set_served(context, config_path, mode),
    }
}

fn list_models(context: &cli::ToolContext) -> Result<(), String> {
    let registry = &context.registry;
    let versions = registry
        .list_versions()
        .map_err(|err| cli::describe_registry_error(&err))?;
    println!("Store: {}", registry.root().display());
    println!("Served version: {}", context.config.registry.model_version);
    if versions.is_empty() {
        println!("No models published yet. Train one with `churn-train`.");
        return Ok(());
    }
    println!();
    println!("Models:");
    for version in versions.iter().rev() {
        match registry.load_metadata(version) {
            Ok(meta) => println!(
                "- {version} | samples={} | auc_roc={:.4} | med={:.4} high={:.4}{}",
                meta.training_samples,
                meta.metrics.auc_roc,
                meta.thresholds.med,
                meta.thresholds.high,
                if meta.low_confidence { " | low confidence" } else { "" }
            ),
            Err(err) => println!("- {version} | unreadable: {err}"),
        }
    }
    Ok(())
}

fn show_model(context: &cli::ToolContext, version: Option<&str>) -> Result<(), String> {
    let artifact = context
        .registry
        .load(version)
        .map_err(|err| cli::describe_registry_error(&err))?;
    let text = serde_json::to_string_pretty(&artifact.metadata).map_err(|err| err.to_string())?;
    println!("{text}");
    Ok(())
}

fn set_served(
    mut context: cli::ToolContext,
    config_path: Option<PathBuf>,
    mode: SetMode,
) -> Result<(), String> {
    let version = match mode {
        SetMode::Version(version) => {
            context
                .registry
                .load_metadata(&version)
                .map_err(|err| cli::describe_registry_error(&err))?;
            version
        }
        SetMode::Latest => LATEST.to_string(),
    };
    let path = match config_path {
        Some(path) => path,
        None => config::config_path().map_err(|err| err.to_string())?,
    };
    context.config.registry.model_version = version.clone();
    config::save_to(&context.config, &path).map_err(|err| err.to_string())?;
    println!("Served version set to {version} in {}", path.display());
    Ok(())
}

type Parsed = Option<(Option<PathBuf>, Command)>;

/// `Ok(None)` means help was requested.
fn parse_args(args: Vec<String>) -> Result<Parsed, String> {
    let mut config_path = None;
    let mut command_name = None;
    let mut version = None;
    let mut latest = false;
    let mut idx = 0usize;
    while idx < args.len() {
        match args[idx].as_str() {
            "--config" => {
                config_path = Some(PathBuf::from(cli::take_value(&args, &mut idx, "--config")?));
            }
            "--version" => {
                version = Some(cli::take_value(&args, &mut idx, "--version")?.to_string());
            }
            "--latest" => latest = true,
            "-h" | "--help" => return Ok(None),
            name @ ("list" | "show" | "set") if command_name.is_none() => {
                command_name = Some(name.to_string());
            }
            unknown => {
                return Err(format!("Unknown argument: {unknown}\n\n{}", help_text()));
            }
        }
        idx += 1;
    }

    let command = match command_name.as_deref().unwrap_or("list") {
        "list" => Command::List,
        "show" => Command::Show { version },
        _ => match (version, latest) {
            (Some(version), false) => Command::Set {
                mode: SetMode::Version(version),
            },
            (None, true) => Command::Set {
                mode: SetMode::Latest,
            },
            _ => return Err("set requires exactly one of --version <v> or --latest".to_string()),
        },
    };
    Ok(Some((config_path, command)))
}

fn help_text() -> String {
    [
        "churn-models",
        "",
        "Inspect the model store and choose which version is served.",
        "",
        "Usage:",
        "  churn-models [list]",
        "  churn-models show [--version <v>]",
        "  churn-models set (--version <v> | --latest)",
        "",
        "Options:",
        "  --config <path>   Config file (default: churn-risk.toml in the app directory).",
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
    fn defaults_to_list() {
        let (config, command) = parse_args(Vec::new()).unwrap().unwrap();
        assert_eq!(config, None);
        assert_eq!(command, Command::List);
    }

    #[test]
    fn set_needs_a_single_target() {
        let (_, command) = parse_args(args(&["set", "--version", "risk-2024-04-01-083000-gbdt"]))
            .unwrap()
            .unwrap();
        assert_eq!(
            command,
            Command::Set {
                mode: SetMode::Version("risk-2024-04-01-083000-gbdt".to_string())
            }
        );
        assert!(parse_args(args(&["set"])).is_err());
        assert!(parse_args(args(&["set", "--latest", "--version", "v"])).is_err());
    }
}
