use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use codelab::agents::AgentContext;
use codelab::agents::forecast::forecast_failures;
use codelab::core::naming::preview;
use codelab::core::types::{AgentSelection, Patch, RoundRecord, TestRoundRecord};
use codelab::exit_codes;
use codelab::io::completion::ChatCompletionClient;
use codelab::io::config::{DEFAULT_CONFIG_FILE, LabConfig, load_config, write_config};
use codelab::io::prompt::PromptEngine;
use codelab::io::sandbox::PistonRunner;
use codelab::io::test_runner::CommandTestRunner;
use codelab::io::workspace::WorkingFiles;
use codelab::logging;
use codelab::pipeline::{AnalysisPlan, AnalysisReport, PipelineEvent, Services, run_analysis};

/// Characters of error text and code shown per round.
const PREVIEW_CHARS: usize = 500;

#[derive(Parser)]
#[command(
    name = "codelab",
    version,
    about = "Run, debug, critique and test a source file with LLM agents"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Forecast, run and repair, clean, and test a file in place.
    Run {
        file: PathBuf,
        /// Guidance passed to every agent.
        #[arg(long)]
        prompt: Option<String>,
        /// Override `max_rounds` from the config.
        #[arg(long)]
        max_rounds: Option<u32>,
        /// Run once without asking the debug agent for fixes.
        #[arg(long)]
        no_debug: bool,
        #[arg(long)]
        skip_forecast: bool,
        #[arg(long)]
        skip_clean: bool,
        #[arg(long)]
        skip_tests: bool,
        /// Print the report as JSON instead of narrating rounds.
        #[arg(long)]
        json: bool,
    },
    /// Print a failure forecast for a file without running it.
    Forecast {
        file: PathBuf,
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Write the default config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            file,
            prompt,
            max_rounds,
            no_debug,
            skip_forecast,
            skip_clean,
            skip_tests,
            json,
        } => {
            let agents = AgentSelection {
                run: true,
                debug: !no_debug,
                clean: !skip_clean,
                forecast: !skip_forecast,
                tests: !skip_tests,
            };
            cmd_run(&cli.config, &file, agents, prompt, max_rounds, json)
        }
        Command::Forecast { file, prompt } => cmd_forecast(&cli.config, &file, prompt.as_deref()),
        Command::InitConfig { force } => cmd_init_config(&cli.config, force),
    }
}

fn load(config_path: &Path, max_rounds: Option<u32>) -> Result<LabConfig> {
    let mut config = load_config(config_path)?;
    if let Some(max_rounds) = max_rounds {
        config.max_rounds = max_rounds;
        config.validate()?;
    }
    Ok(config)
}

fn working_files(file: &Path) -> Result<WorkingFiles> {
    if !file.is_file() {
        bail!("source file {} not found", file.display());
    }
    WorkingFiles::for_path(file)
}

fn cmd_run(
    config_path: &Path,
    file: &Path,
    agents: AgentSelection,
    user_prompt: Option<String>,
    max_rounds: Option<u32>,
    json: bool,
) -> Result<i32> {
    let config = load(config_path, max_rounds)?;
    let files = working_files(file)?;
    let runner = PistonRunner::new(&config.sandbox)?;
    let completer = ChatCompletionClient::from_env(&config.completion)?;
    let test_runner = CommandTestRunner::new(&config.tests);
    let services = Services {
        runner: &runner,
        completer: &completer,
        test_runner: &test_runner,
    };
    let plan = AnalysisPlan {
        agents,
        user_prompt,
        session_id: None,
    };
    info!(file = %file.display(), max_rounds = config.max_rounds, "starting analysis");

    let report = run_analysis(&services, &config, &files, &plan, |event| {
        if !json {
            narrate(event);
        }
    })?;

    if json {
        let rendered = serde_json::to_string_pretty(&report).context("serialize report")?;
        println!("{rendered}");
    } else {
        summarize(&report, &files);
    }
    Ok(exit_codes::for_outcome(report.first_failure()))
}

fn cmd_forecast(config_path: &Path, file: &Path, user_prompt: Option<&str>) -> Result<i32> {
    let config = load(config_path, None)?;
    let files = working_files(file)?;
    let completer = ChatCompletionClient::from_env(&config.completion)?;
    let prompts = PromptEngine::new()?;
    let ctx = AgentContext::new(&prompts, config.completion.temperature, user_prompt);

    let forecast = forecast_failures(&completer, &ctx, &files.read_source()?)?;
    println!("{forecast}");
    Ok(exit_codes::OK)
}

fn cmd_init_config(config_path: &Path, force: bool) -> Result<i32> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    write_config(config_path, &LabConfig::default())?;
    println!("config: wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn narrate(event: PipelineEvent<'_>) {
    match event {
        PipelineEvent::Forecast(report) => {
            println!("forecast:");
            println!("{report}");
        }
        PipelineEvent::RepairRound(record) => narrate_round("run", record),
        PipelineEvent::Critique(critique) => {
            println!("\nclean: reasoning");
            println!("{}", critique.reasoning);
            if critique.improved_code.is_none() {
                println!("clean: no improved version provided");
            }
        }
        PipelineEvent::CriticRound(record) => narrate_round("clean", record),
        PipelineEvent::TestsGenerated { test_file, .. } => {
            println!("\ntests: wrote {test_file}");
        }
        PipelineEvent::TestRound(record) => narrate_test_round(record),
        PipelineEvent::Skipped { stage, reason } => println!("\n{stage}: {reason}"),
    }
}

fn narrate_round(stage: &str, record: &RoundRecord) {
    println!("\n=== {stage} round {} ===", record.round);
    if record.execution.is_clean() {
        println!("{stage}: ran cleanly");
        if !record.execution.stdout.is_empty() {
            println!("{}", record.execution.stdout);
        }
        return;
    }
    println!("{stage}: error");
    println!("{}", preview(&record.execution.stderr, PREVIEW_CHARS));
    if let Some(patch) = &record.patch {
        narrate_patch(stage, patch);
    }
}

fn narrate_test_round(record: &TestRoundRecord) {
    println!("\n=== tests round {} ===", record.round);
    println!("{}", record.output);
    if record.passed {
        println!("tests: passed");
        return;
    }
    println!("tests: failed");
    if let Some(patch) = &record.patch {
        narrate_patch("tests", patch);
    }
}

fn narrate_patch(stage: &str, patch: &Patch) {
    println!("{stage}: debugger reasoning");
    println!("{}", patch.reasoning.as_deref().unwrap_or("(No reasoning)"));
    match &patch.fixed_code {
        Some(code) => {
            println!("{stage}: fixed code preview");
            println!("{}", preview(code, PREVIEW_CHARS));
        }
        None => println!("{stage}: no fix provided"),
    }
}

fn summarize(report: &AnalysisReport, files: &WorkingFiles) {
    println!();
    if let Some(repair) = &report.repair {
        println!("summary: repair {:?}", repair.outcome);
    }
    if let Some(clean) = &report.clean {
        if let Some(cleaned) = &clean.cleaned_file {
            println!("summary: cleaned version saved to {cleaned}");
        }
        if let Some(error) = &clean.error_in_critic {
            println!("summary: critic version failed: {}", preview(error, 120));
        }
    }
    if let Some(tests) = &report.tests {
        match (&tests.outcome, &tests.note) {
            (Some(outcome), _) => println!("summary: tests {outcome:?}"),
            (None, Some(note)) => println!("summary: tests {note}"),
            (None, None) => {}
        }
    }
    println!("summary: report {}", files.report_path.display());
}
