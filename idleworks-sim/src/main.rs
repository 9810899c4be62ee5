mod clock;
mod plan;
mod reports;
mod scenarios;
mod tester;
mod util;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use colored::Colorize;
use idleworks_engine::ProductionEngine;
use idleworks_engine::memory::MemoryWorld;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clock::{RealtimeOptions, RealtimeSummary};
use scenarios::{get_scenario, list_scenarios};
use tester::{ScenarioResult, ScenarioRunner};
use util::{SimAssets, resolve_seeds, split_csv};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClockMode {
    /// Scripted scenarios on a virtual clock (fast, deterministic)
    Virtual,
    /// Drive a demo world on the wall clock with tokio timers
    Realtime,
}

#[derive(Debug, Parser)]
#[command(name = "idleworks-sim", version)]
#[command(about = "Headless scenario harness for the idleworks production engine")]
struct Args {
    /// Clock driving the engine
    #[arg(long, value_enum, default_value_t = ClockMode::Virtual)]
    clock: ClockMode,

    /// Scenarios to run (comma-separated, or "all")
    #[arg(long, default_value = "all")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Seeds to run (comma-separated, decimal or 0x hex)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Number of iterations per scenario and seed
    #[arg(long, default_value_t = 1)]
    iterations: usize,

    /// How long a realtime run lasts, in seconds
    #[arg(long, default_value_t = 10)]
    duration_secs: u64,

    /// Engine configuration JSON (defaults to the bundled file)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Producer catalog JSON (defaults to the bundled catalog)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Output report format
    #[arg(long, default_value = "console")]
    #[arg(value_parser = ["json", "markdown", "console"])]
    report: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let assets = SimAssets::load(args.config.as_deref(), args.catalog.as_deref())?;

    match args.clock {
        ClockMode::Virtual => {
            let seeds = resolve_seeds(&split_csv(&args.seeds))?;
            let scenarios = expand_scenarios(&args.scenarios);
            let results = run_virtual_scenarios(&args, &assets, &scenarios, &seeds);
            write_reports(&args, &results, start_time)?;
            if results.is_empty() || results.iter().any(|r| !r.passed) {
                std::process::exit(1);
            }
        }
        ClockMode::Realtime => {
            let summary = run_realtime(&args, &assets).await?;
            let mut output_target = OutputTarget::new(args.output.clone())?;
            reports::generate_realtime_report(&mut output_target, &summary, &args.report)?;
            output_target.flush_inner()?;
        }
    }

    Ok(())
}

fn maybe_list_scenarios(args: &Args) -> Result<bool> {
    if !args.list_scenarios {
        return Ok(false);
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    writeln!(output_target.writer(), "Available scenarios:")?;
    for (key, description) in list_scenarios() {
        writeln!(output_target.writer(), "  {key:25} - {description}")?;
    }
    output_target.flush_inner()?;
    Ok(true)
}

fn announce_banner() {
    println!("{}", "⛏️  Idleworks Simulation Harness".bright_cyan().bold());
    println!("{}", "================================".cyan());
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s.eq_ignore_ascii_case("all")) {
        scenarios.retain(|s| !s.eq_ignore_ascii_case("all"));
        for (key, _) in list_scenarios() {
            if !scenarios.iter().any(|s| s == key) {
                scenarios.push(key.to_string());
            }
        }
    }
    scenarios
}

fn run_virtual_scenarios(
    args: &Args,
    assets: &SimAssets,
    scenarios: &[String],
    seeds: &[u64],
) -> Vec<ScenarioResult> {
    println!("{}", "🧪 Running Scenarios".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let runner = ScenarioRunner::new(assets.config.clone(), Arc::clone(&assets.catalog), args.verbose);
    let mut results = Vec::new();
    for scenario_name in scenarios {
        if let Some(scenario) = get_scenario(scenario_name) {
            results.extend(runner.run_scenario(&scenario, seeds, args.iterations));
        } else {
            eprintln!("⚠️  Unknown scenario: {}", scenario_name.yellow());
        }
    }
    results
}

async fn run_realtime(args: &Args, assets: &SimAssets) -> Result<RealtimeSummary> {
    println!("{}", "⏱️  Running Realtime Drivers".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let world = MemoryWorld::new();
    let engine = Arc::new(
        ProductionEngine::new(
            assets.config.clone(),
            Arc::clone(&assets.catalog),
            world.collaborators(),
        )
        .context("building realtime engine")?,
    );
    let placed = clock::populate_demo(&engine, &world).context("placing demo producers")?;
    if args.verbose {
        println!("  🧱 Placed {placed} producers for two owners");
    }
    let options = RealtimeOptions::from_config(&assets.config, Duration::from_secs(args.duration_secs));
    clock::run_realtime(engine, options).await
}

fn write_reports(args: &Args, results: &[ScenarioResult], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => {
            if results.is_empty() {
                writeln!(&mut output_target, "[]")?;
            } else {
                reports::generate_json_report(&mut output_target, results)?;
            }
        }
        "markdown" => {
            if results.is_empty() {
                writeln!(
                    &mut output_target,
                    "# Idleworks Scenario Results\n\n_No scenarios executed._"
                )?;
            } else {
                reports::generate_markdown_report(&mut output_target, results)?;
            }
        }
        _ => {
            if results.is_empty() {
                writeln!(&mut output_target, "No scenarios executed.")?;
            } else {
                reports::generate_console_report(&mut output_target, results, start_time.elapsed())?;
            }
        }
    }

    let duration = start_time.elapsed();
    writeln!(&mut output_target)?;
    writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
    output_target.flush_inner()?;
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args {
            clock: ClockMode::Virtual,
            scenarios: "steady-tick".to_string(),
            list_scenarios: false,
            seeds: "1337".to_string(),
            iterations: 1,
            duration_secs: 1,
            config: None,
            catalog: None,
            report: "json".to_string(),
            verbose: false,
            output: None,
        }
    }

    fn temp_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "idleworks-sim-{label}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    fn sample_result(passed: bool) -> ScenarioResult {
        ScenarioResult {
            scenario_name: "Steady Online Ticking".to_string(),
            seed: 1337,
            passed,
            iterations_run: 3,
            successful_iterations: if passed { 3 } else { 2 },
            failures: if passed {
                Vec::new()
            } else {
                vec!["failure".to_string()]
            },
            average_duration: Duration::from_millis(10),
            performance_data: vec![Duration::from_millis(10)],
        }
    }

    #[test]
    fn expands_all_scenarios_keyword() {
        let expanded = expand_scenarios("steady-tick,all");
        assert_eq!(expanded[0], "steady-tick");
        assert_eq!(expanded.len(), list_scenarios().len());
        assert!(expanded.contains(&"mixed-owners".to_string()));
    }

    #[test]
    fn expand_scenarios_without_all_preserves_order() {
        let expanded = expand_scenarios("offline-cap,steady-tick");
        assert_eq!(expanded, vec!["offline-cap".to_string(), "steady-tick".to_string()]);
    }

    #[test]
    fn run_virtual_scenarios_skips_unknown_names() {
        let args = base_args();
        let assets = SimAssets::load_default();
        let names = vec!["steady-tick".to_string(), "not-a-scenario".to_string()];
        let results = run_virtual_scenarios(&args, &assets, &names, &[1, 2]);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.passed));
    }

    #[test]
    fn write_reports_emits_json_output() {
        let temp = temp_path("report.json");
        let args = Args {
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, &[sample_result(true)], Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("\"scenario_name\": \"Steady Online Ticking\""));
        assert!(content.contains("🏁 Total time"));
    }

    #[test]
    fn write_reports_handles_empty_markdown() {
        let temp = temp_path("report.md");
        let args = Args {
            report: "markdown".to_string(),
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, &[], Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("_No scenarios executed._"));
    }

    #[test]
    fn write_reports_console_mentions_failures() {
        colored::control::set_override(false);
        let temp = temp_path("report.txt");
        let args = Args {
            report: "console".to_string(),
            output: Some(temp.clone()),
            ..base_args()
        };
        write_reports(&args, &[sample_result(false)], Instant::now()).unwrap();
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.contains("❌ FAIL"));
        assert!(content.contains("• failure"));
    }

    #[test]
    fn maybe_list_scenarios_writes_output() {
        let temp = temp_path("scenarios.txt");
        let args = Args {
            list_scenarios: true,
            output: Some(temp.clone()),
            ..base_args()
        };
        assert!(maybe_list_scenarios(&args).unwrap());
        let content = std::fs::read_to_string(temp).unwrap();
        assert!(content.starts_with("Available scenarios:"));
        assert!(content.contains("reconnect-settlement"));
    }

    #[test]
    fn maybe_list_scenarios_is_noop_without_flag() {
        assert!(!maybe_list_scenarios(&base_args()).unwrap());
    }

    #[test]
    fn args_parse_clock_and_defaults() {
        let args = Args::try_parse_from(["idleworks-sim", "--clock", "realtime"]).unwrap();
        assert_eq!(args.clock, ClockMode::Realtime);
        assert_eq!(args.scenarios, "all");
        assert_eq!(args.seeds, "1337");
        assert_eq!(args.duration_secs, 10);
        assert!(Args::try_parse_from(["idleworks-sim", "--report", "csv"]).is_err());
    }
}
