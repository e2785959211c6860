// iot-scenarios driver
// Loads accounts, labels and scenario sheets from JSON, runs the baseline and
// every scenario, writes one JSON report

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use circular_iot::iot_balance::row_sums;
use circular_iot::iot_policy::InterventionRecord;
use circular_iot::iot_results::{delta_q, delta_y, ResultSelector, SelectedResult, Side};
use circular_iot::{
    AnalysisRow, EngineConfig, IotLabels, IotTable, ScenarioEngine, ScenarioSpec,
    SupplyUseAccounts, TechnologyAssumption,
};

#[derive(Parser)]
#[command(name = "iot-scenarios")]
#[command(about = "Supply-use to input-output tables with circular-economy policy scenarios")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Supply-use accounts (JSON)
    #[arg(long, global = true, default_value = "accounts.json")]
    accounts: PathBuf,

    /// Axis labels (JSON)
    #[arg(long, global = true, default_value = "labels.json")]
    labels: PathBuf,

    /// Engine configuration (JSON); defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured technology assumption
    #[arg(long, global = true)]
    method: Option<Method>,
}

#[derive(Subcommand)]
enum Commands {
    /// Derive and write the baseline table only
    Baseline {
        /// Output JSON file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Run every scenario sheet against the baseline
    Run {
        /// Scenario sheets (JSON array)
        #[arg(short, long)]
        scenarios: PathBuf,

        /// Analysis rows (JSON array); writes selected results instead of tables
        #[arg(short, long)]
        analysis: Option<PathBuf>,

        /// Output JSON file
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Method {
    /// Transformation coefficients
    Tc,
    /// Market-share coefficients
    Msc,
}

impl From<Method> for TechnologyAssumption {
    fn from(m: Method) -> Self {
        match m {
            Method::Tc => TechnologyAssumption::TransformationCoefficient,
            Method::Msc => TechnologyAssumption::MarketShareCoefficient,
        }
    }
}

// ---
// Report layout
// ---

#[derive(Serialize)]
struct RunMetadata {
    generated_at: DateTime<Utc>,
    method: &'static str,
    regions: Vec<String>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum TableReport {
    Full {
        table: IotTable,
        #[serde(skip_serializing_if = "Option::is_none")]
        differences: Option<Differences>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        interventions: Vec<InterventionRecord>,
    },
    Selected {
        results: Vec<SelectedResult>,
    },
}

#[derive(Serialize)]
struct Differences {
    /// Scenario Y minus baseline Y
    delta_y: ndarray::Array2<f64>,
    /// (L_scenario - L_baseline) yi_baseline
    delta_q: ndarray::Array1<f64>,
}

#[derive(Serialize)]
struct Report {
    metadata: RunMetadata,
    baseline: TableReport,
    scenarios: BTreeMap<String, TableReport>,
    failures: BTreeMap<String, String>,
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} from {}", what, path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Malformed {} in {}", what, path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let raw = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    fs::write(path, raw).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Report written to {}", path.display());
    Ok(())
}

fn metadata(config: &EngineConfig) -> RunMetadata {
    RunMetadata {
        generated_at: Utc::now(),
        method: config.method.label(),
        regions: config.regions.as_slice().to_vec(),
    }
}

fn differences(base: &IotTable, scenario: &IotTable) -> Result<Differences> {
    let yi = row_sums(&base.y.view());
    Ok(Differences {
        delta_y: delta_y(&scenario.y, &base.y)?,
        delta_q: delta_q(&scenario.l, &base.l, &yi)?,
    })
}

fn build_engine(cli: &Cli) -> Result<ScenarioEngine> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(method) = cli.method {
        config = config.with_method(method.into());
    }

    let accounts: SupplyUseAccounts = read_json(&cli.accounts, "supply-use accounts")?;
    let labels: IotLabels = read_json(&cli.labels, "axis labels")?;
    ScenarioEngine::new(&accounts, labels, config).context("Failed to build the baseline")
}

fn run(
    engine: &ScenarioEngine,
    scenarios: &Path,
    analysis: Option<&Path>,
) -> Result<Report> {
    let specs: Vec<ScenarioSpec> = read_json(scenarios, "scenario sheets")?;
    let analysis: Option<Vec<AnalysisRow>> = analysis
        .map(|path| read_json(path, "analysis rows"))
        .transpose()?;
    info!("Running {} scenarios", specs.len());

    let config = engine.config();
    let selector = ResultSelector::new(engine.labels(), &config.regions);
    let base = engine.baseline();

    let baseline = match &analysis {
        Some(rows) => TableReport::Selected {
            results: selector.gather(base, rows, Side::Baseline)?,
        },
        None => TableReport::Full {
            table: base.clone(),
            differences: None,
            interventions: Vec::new(),
        },
    };

    let mut report = Report {
        metadata: metadata(config),
        baseline,
        scenarios: BTreeMap::new(),
        failures: BTreeMap::new(),
    };

    for (name, result) in engine.run_batch(&specs) {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                report.failures.insert(name, e.to_string());
                continue;
            }
        };
        let entry = match &analysis {
            Some(rows) => TableReport::Selected {
                results: selector.gather(&outcome.table, rows, Side::Scenario)?,
            },
            None => TableReport::Full {
                differences: Some(differences(base, &outcome.table)?),
                table: outcome.table,
                interventions: outcome.interventions,
            },
        };
        report.scenarios.insert(outcome.name, entry);
    }

    if !report.failures.is_empty() {
        warn!("{} of {} scenarios failed", report.failures.len(), specs.len());
    }
    Ok(report)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let engine = build_engine(&cli)?;

    match &cli.command {
        Commands::Baseline { output } => {
            let report = Report {
                metadata: metadata(engine.config()),
                baseline: TableReport::Full {
                    table: engine.baseline().clone(),
                    differences: None,
                    interventions: Vec::new(),
                },
                scenarios: BTreeMap::new(),
                failures: BTreeMap::new(),
            };
            write_json(output, &report)
        }
        Commands::Run {
            scenarios,
            analysis,
            output,
        } => {
            let report = run(&engine, scenarios, analysis.as_deref())?;
            write_json(output, &report)
        }
    }
}
