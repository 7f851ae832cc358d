mod common;
mod logic;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::scenario::{TestScenario, catalog_scenarios, find_scenario, list_scenarios};
use common::split_csv;
use logic::{LogicTester, OptionPolicy, ScenarioResult, resolve_seed_inputs};
use teller_game::{CommandErrorPolicy, DialogueProgram};

#[derive(Debug, Parser)]
#[command(name = "teller-tester", version)]
#[command(about = "Headless play-through tester for the Teller day scheduler and dialogue engine")]
struct Args {
    /// Scenarios to run (comma-separated, `all` for every scenario)
    #[arg(long, default_value = "smoke")]
    scenarios: String,

    /// List all available scenarios and exit
    #[arg(long)]
    list_scenarios: bool,

    /// Seeds to run (comma-separated, decimal or 0x hex)
    #[arg(long, default_value = "1337")]
    seeds: String,

    /// Number of iterations per scenario and seed
    #[arg(long, default_value_t = 3)]
    iterations: usize,

    /// Override the day length in seconds
    #[arg(long)]
    day_length: Option<u64>,

    /// Override the typewriter speed
    #[arg(long)]
    chars_per_frame: Option<usize>,

    /// Override how options are picked
    #[arg(long, value_enum)]
    policy: Option<OptionPolicy>,

    /// Keep running a node when a script command fails
    #[arg(long)]
    continue_on_command_error: bool,

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

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if maybe_list_scenarios(&args)? {
        return Ok(());
    }

    announce_banner();

    let start_time = Instant::now();
    let scenarios = expand_scenarios(&args.scenarios);
    let seeds = resolve_seed_inputs(&split_csv(&args.seeds))?;
    let program = Arc::new(DialogueProgram::load_default().context("loading bundled dialogue")?);
    log::debug!("running {} scenarios over {} seeds", scenarios.len(), seeds.len());

    let results = run_logic_scenarios(&args, &scenarios, &seeds, &program);
    write_reports(&args, &results, start_time)?;

    if results.iter().any(|r| !r.passed) {
        std::process::exit(1);
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
    println!("{}", "🏦 Teller Dialogue Tester".bright_cyan().bold());
    println!("{}", "=========================".cyan());
}

fn expand_scenarios(scenarios_arg: &str) -> Vec<String> {
    let mut scenarios = split_csv(scenarios_arg);
    if scenarios.iter().any(|s| s == "all") {
        scenarios.retain(|s| s != "all");
        for scenario in catalog_scenarios() {
            if !scenarios.iter().any(|s| s == scenario.key) {
                scenarios.push(scenario.key.to_string());
            }
        }
    }
    scenarios
}

/// Apply command-line overrides to a catalog scenario's plan.
fn apply_overrides(args: &Args, mut scenario: TestScenario) -> TestScenario {
    if let Some(secs) = args.day_length {
        scenario.plan = scenario.plan.with_day_length(Duration::from_secs(secs));
    }
    if let Some(chars) = args.chars_per_frame {
        scenario.plan = scenario.plan.with_chars_per_frame(chars);
    }
    if let Some(policy) = args.policy {
        scenario.plan = scenario.plan.with_policy(policy);
    }
    if args.continue_on_command_error {
        scenario.plan.command_errors = CommandErrorPolicy::Continue;
    }
    scenario
}

fn run_logic_scenarios(
    args: &Args,
    scenarios: &[String],
    seeds: &[u64],
    program: &Arc<DialogueProgram>,
) -> Vec<ScenarioResult> {
    println!("{}", "🧠 Running Dialogue Scenarios".bright_yellow().bold());
    println!("{}", "-".repeat(30).yellow());

    let tester = LogicTester::new(Arc::clone(program), args.verbose);
    let mut results = Vec::new();
    for scenario_name in scenarios {
        let Some(scenario) = find_scenario(scenario_name) else {
            eprintln!("⚠️  Unknown scenario: {}", scenario_name.yellow());
            continue;
        };
        let scenario = apply_overrides(args, scenario);
        results.extend(tester.run_scenario(&scenario, seeds, args.iterations));
    }
    results
}

fn write_reports(args: &Args, results: &[ScenarioResult], start_time: Instant) -> Result<()> {
    let mut output_target = OutputTarget::new(args.output.clone())?;

    match args.report.as_str() {
        "json" => logic::reports::generate_json_report(&mut output_target, results)?,
        "markdown" => {
            if results.is_empty() {
                writeln!(
                    &mut output_target,
                    "# Teller Dialogue Test Results\n\n_No scenarios executed._"
                )?;
            } else {
                logic::reports::generate_markdown_report(&mut output_target, results)?;
            }
        }
        _ => {
            let duration = start_time.elapsed();
            if results.is_empty() {
                writeln!(&mut output_target, "No scenarios executed.")?;
            } else {
                logic::reports::generate_console_report(&mut output_target, results, duration)?;
            }
            writeln!(&mut output_target)?;
            writeln!(&mut output_target, "🏁 Total time: {duration:?}")?;
        }
    }

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
            scenarios: "smoke".to_string(),
            list_scenarios: false,
            seeds: "1337".to_string(),
            iterations: 1,
            day_length: None,
            chars_per_frame: None,
            policy: None,
            continue_on_command_error: false,
            report: "json".to_string(),
            verbose: false,
            output: None,
        }
    }

    #[test]
    fn all_expands_to_every_catalog_key_once() {
        let scenarios = expand_scenarios("replay,all");
        assert_eq!(scenarios[0], "replay");
        assert_eq!(scenarios.len(), catalog_scenarios().len());
        assert!(scenarios.iter().any(|s| s == "smoke"));
    }

    #[test]
    fn overrides_reach_the_plan() {
        let mut args = base_args();
        args.day_length = Some(30);
        args.chars_per_frame = Some(6);
        args.policy = Some(OptionPolicy::Random);
        args.continue_on_command_error = true;
        let scenario = apply_overrides(&args, find_scenario("smoke").unwrap());
        assert_eq!(scenario.plan.day_length, Some(Duration::from_secs(30)));
        assert_eq!(scenario.plan.chars_per_frame, 6);
        assert_eq!(scenario.plan.option_policy, OptionPolicy::Random);
        assert_eq!(scenario.plan.command_errors, CommandErrorPolicy::Continue);
    }

    #[test]
    fn no_overrides_keep_catalog_plan() {
        let scenario = find_scenario("grumpy-teller").unwrap();
        let expected = scenario.plan.clone();
        let scenario = apply_overrides(&base_args(), scenario);
        assert_eq!(scenario.plan, expected);
    }

    #[test]
    fn list_writes_to_file() {
        let path = std::env::temp_dir().join(format!("teller-list-{}", std::process::id()));
        let mut args = base_args();
        args.list_scenarios = true;
        args.output = Some(path.clone());
        assert!(maybe_list_scenarios(&args).unwrap());
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Available scenarios:"));
        assert!(content.contains("grumpy-teller"));
        let _ = std::fs::remove_file(path);
    }
}
