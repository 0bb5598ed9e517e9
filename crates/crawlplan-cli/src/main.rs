//! Crawl plan arbitration CLI
//!
//! The `crawlplan` command runs the arbitration engine against plans stored
//! as JSON files.
//!
//! ## Commands
//!
//! - `arbitrate`: Validate, score and arbitrate a request, then print the result
//! - `validate`: Check a single plan against the safety policy
//! - `experiment`: Replay recorded arbitrations through threshold arms
//! - `config`: Print the effective configuration as TOML

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crawlplan_meta::{
    init_tracing, ArbitrationCase, CrawlPlan, Experiment, ExperimentArm, ExperimentManager,
    ExperimentReport, LogFormat, MetaPlanCoordinator, MetaPlannerConfig, PlanningContext,
    ProcessRequest, ProcessResult, RiskScorer, SafetyFirstFusion, SafetyPlanValidator,
    ValidationResult, Validator, METRICS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "crawlplan")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Crawl plan arbitration engine", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines (also CRAWLPLAN_LOG_FORMAT=json)
    #[arg(long, global = true)]
    json: bool,

    /// Engine configuration file (.toml or .json)
    #[arg(short, long, global = true, env = "CRAWLPLAN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Arbitrate one request and print the full result as JSON
    Arbitrate {
        /// Request file: blueprint, context, microprolog plan, alternatives
        request: PathBuf,

        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a single plan against the safety policy
    Validate {
        /// Plan file (JSON)
        plan: PathBuf,

        /// Domain being planned (default: the plan's own domain)
        #[arg(short, long)]
        domain: Option<String>,
    },

    /// Replay recorded arbitrations through every arm of an experiment
    Experiment {
        /// Experiment file: name, control arm, variant arms
        #[arg(short, long)]
        experiment: PathBuf,

        /// Recorded arbitration cases (JSON array)
        #[arg(long)]
        cases: PathBuf,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// On-disk experiment definition; id and creation time are assigned on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExperimentFile {
    name: String,
    control: ExperimentArm,
    #[serde(default)]
    variants: Vec<ExperimentArm>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let format = if cli.json {
        LogFormat::Json
    } else {
        LogFormat::from_env()
    };
    init_tracing(format, level);

    let config = load_config(cli.config.as_deref())?;

    let outcome = match cli.command {
        Commands::Arbitrate { request, pretty } => cmd_arbitrate(&config, &request, pretty).await,
        Commands::Validate { plan, domain } => cmd_validate(&config, &plan, domain.as_deref()),
        Commands::Experiment { experiment, cases } => {
            cmd_experiment(&config, &experiment, &cases)
        }
        Commands::Config => cmd_config(&config),
    };

    METRICS.flush();
    outcome
}

fn load_config(path: Option<&Path>) -> Result<MetaPlannerConfig> {
    match path {
        Some(path) => MetaPlannerConfig::load(path)
            .with_context(|| format!("Failed to load config: {:?}", path)),
        None => Ok(MetaPlannerConfig::default()),
    }
}

async fn cmd_arbitrate(config: &MetaPlannerConfig, request: &Path, pretty: bool) -> Result<()> {
    let result = arbitrate(config, request).await?;
    info!(
        outcome = %result.decision.outcome,
        confidence = result.decision.confidence,
        "Arbitration complete"
    );
    println!("{}", to_json(&result, pretty)?);
    Ok(())
}

async fn arbitrate(config: &MetaPlannerConfig, request: &Path) -> Result<ProcessResult> {
    let request: ProcessRequest = read_json_file(request)?;
    let coordinator =
        MetaPlanCoordinator::from_config(config).context("Invalid engine configuration")?;
    coordinator
        .process(request)
        .await
        .context("Arbitration failed")
}

fn cmd_validate(config: &MetaPlannerConfig, plan: &Path, domain: Option<&str>) -> Result<()> {
    let result = validate(config, plan, domain)?;
    if result.valid {
        info!(risk = result.metrics.overall_risk, "Plan is valid");
    } else {
        for issue in result.issue_messages() {
            eprintln!("  - {}", issue);
        }
    }
    println!("{}", to_json(&result, true)?);
    Ok(())
}

fn validate(config: &MetaPlannerConfig, plan: &Path, domain: Option<&str>) -> Result<ValidationResult> {
    let plan: CrawlPlan = read_json_file(plan)?;
    let context = PlanningContext::for_domain(domain.unwrap_or(plan.domain.as_str()));
    let validator =
        SafetyPlanValidator::new(config.safety.clone(), RiskScorer::new(config.risk));
    Ok(validator.validate(&plan, &context))
}

fn cmd_experiment(config: &MetaPlannerConfig, experiment: &Path, cases: &Path) -> Result<()> {
    let report = experiment_report(config, experiment, cases)?;
    for arm in &report.arms {
        info!(
            arm = %arm.arm,
            agreement = arm.agreement_with_control,
            mean_confidence = arm.mean_confidence,
            "Arm summary"
        );
    }
    println!("{}", to_json(&report, true)?);
    Ok(())
}

fn experiment_report(
    config: &MetaPlannerConfig,
    experiment: &Path,
    cases: &Path,
) -> Result<ExperimentReport> {
    let file: ExperimentFile = read_json_file(experiment)?;
    let cases: Vec<ArbitrationCase> = read_json_file(cases)?;

    let fusion = SafetyFirstFusion::new(RiskScorer::new(config.risk));
    let manager = ExperimentManager::new(Arc::new(fusion));
    let id = manager
        .register(Experiment::new(&file.name, file.control, file.variants))
        .context("Invalid experiment")?;
    manager.run(id, &cases).context("Experiment run failed")
}

fn cmd_config(config: &MetaPlannerConfig) -> Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use crawlplan_meta::{
        ArbitrationThresholds, CrawlBudget, OutcomeKind, PlanOrigin, PlanTarget,
    };

    fn blueprint() -> CrawlPlan {
        CrawlPlan::new("bp", "example.com", PlanOrigin::Blueprint, CrawlBudget::default())
            .with_target(PlanTarget::new("hub:/world", "^/world/", 0.8, 0.6).with_rationale("hub"))
    }

    fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_arbitrate_with_global_flags() {
        let cli = Cli::try_parse_from([
            "crawlplan",
            "arbitrate",
            "request.json",
            "--pretty",
            "--config",
            "engine.toml",
            "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("engine.toml")));
        assert!(matches!(
            cli.command,
            Commands::Arbitrate { pretty: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_arbitrate_request_file() {
        let dir = tempfile::tempdir().unwrap();
        let request = ProcessRequest::new(blueprint(), PlanningContext::for_domain("example.com"));
        let path = write_json(dir.path(), "request.json", &request);

        let result = arbitrate(&MetaPlannerConfig::default(), &path).await.unwrap();
        assert_eq!(result.decision.outcome, OutcomeKind::AcceptAlternative);
        assert_eq!(result.decision.chosen_plan_id(), Some("bp"));
    }

    #[tokio::test]
    async fn test_arbitrate_rejects_malformed_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("request.json");
        std::fs::write(&path, "{\"blueprint\": 3}").unwrap();

        let err = arbitrate(&MetaPlannerConfig::default(), &path)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }

    #[test]
    fn test_validate_flags_domain_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_json(dir.path(), "plan.json", &blueprint());

        let config = MetaPlannerConfig::default();
        assert!(validate(&config, &path, None).unwrap().valid);
        assert!(!validate(&config, &path, Some("other.org")).unwrap().valid);
    }

    #[test]
    fn test_experiment_file_without_cases() {
        let dir = tempfile::tempdir().unwrap();
        let file = ExperimentFile {
            name: "strict".into(),
            control: ExperimentArm::new("control", ArbitrationThresholds::default()),
            variants: vec![ExperimentArm::new(
                "strict",
                ArbitrationThresholds::default().with_accept_score(0.9),
            )],
        };
        let experiment = write_json(dir.path(), "experiment.json", &file);
        let cases = write_json(dir.path(), "cases.json", &Vec::<ArbitrationCase>::new());

        let report =
            experiment_report(&MetaPlannerConfig::default(), &experiment, &cases).unwrap();
        assert_eq!(report.experiment_name, "strict");
        assert_eq!(report.arms.len(), 2);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/crawlplan.toml"))).is_err());
        assert_eq!(load_config(None).unwrap(), MetaPlannerConfig::default());
    }
}
