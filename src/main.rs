use std::collections::HashMap;

use clap::Parser;
use colored::*;
use tracing::info;

use guessing_game::cli::{Args, Command};
use guessing_game::config::GameConfig;
use guessing_game::ledger::Ledger;
use guessing_game::stages::{parse_guess, GUESS_PARAMETER};
use guessing_game::store::open_store;
use guessing_game::{
    logging, BuildStatus, CancelToken, CompletionListener, Generator, GuessStep, ProjectStatistics,
    Recorder,
};

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn main() -> CliResult {
    let args = Args::parse();
    let mut config = GameConfig::load(args.config.as_deref())?;
    args.apply_to(&mut config);
    logging::init(&config.logging.level);

    match &args.command {
        Command::Check { .. } => check(&config),
        Command::Run {
            project,
            steps,
            guess,
            ..
        } => run(&config, project, *steps, guess.clone()),
        Command::Stats { project } => stats(&config, project),
    }
}

fn check(config: &GameConfig) -> CliResult {
    match config.bounds.resolve() {
        Ok(bounds) => {
            println!(
                "{} bounds [{}, {}]",
                "OK".green().bold(),
                bounds.lower(),
                bounds.upper()
            );
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "ERROR".red().bold(), e);
            Err(e.into())
        }
    }
}

fn run(config: &GameConfig, project: &str, steps: u32, guess: Option<String>) -> CliResult {
    let bounds = config.bounds.resolve()?;
    if let Some(raw) = guess.as_deref() {
        parse_guess(raw)?;
    }
    let store = open_store(&config.store)?;
    let mut ledger = Ledger::open(&config.ledger.path)?;

    let parameters: HashMap<String, String> = guess
        .map(|g| HashMap::from([(GUESS_PARAMETER.to_string(), g)]))
        .unwrap_or_default();
    let mut build = ledger.begin(project, parameters)?.echo(true);
    info!(project, build = build.number(), steps, "build started");

    let step = GuessStep::new(bounds.lower(), bounds.upper());
    let mut generator = Generator::new();
    for _ in 0..steps {
        if let Err(e) = step.perform(&mut build, &mut generator) {
            ledger.fail(&build)?;
            println!("Build #{} of {}: {}", build.number(), project, "FAILED".red().bold());
            return Err(e.into());
        }
    }
    Recorder.perform(&mut build);
    ledger.complete(&build)?;

    let listener = CompletionListener::new(store);
    let report = listener.on_completed(&mut build, &CancelToken::new());
    if !report.is_complete() {
        println!("{}", "Guesses were not stored in the durable store".yellow());
    }

    let status = match build.status() {
        BuildStatus::Success => "SUCCESS".green().bold(),
        BuildStatus::Unstable => "UNSTABLE".yellow().bold(),
    };
    println!("Build #{} of {}: {}", build.number(), project, status);
    Ok(())
}

fn stats(config: &GameConfig, project: &str) -> CliResult {
    let store = open_store(&config.store)?;
    let ledger = Ledger::open(&config.ledger.path)?;
    let history = ledger.project(project);
    let statistics = ProjectStatistics::new(&history, store.as_ref());

    let local = statistics.local()?;
    println!("{}", format!("Guessing game statistics for {project}").bold());
    println!(
        "  local:  {} correct, {} incorrect",
        local.correct.to_string().green(),
        local.incorrect.to_string().red()
    );
    match statistics.last_record()? {
        Some(last) => println!("  last:   {last}"),
        None => println!("  last:   no guesses yet"),
    }

    match statistics.global(&CancelToken::new()) {
        Ok(global) => {
            println!(
                "  global: {} correct, {} incorrect",
                global.correct.to_string().green(),
                global.incorrect.to_string().red()
            );
            Ok(())
        }
        Err(e) => {
            println!("  global: {} ({})", "unavailable".red(), e);
            Err(e.into())
        }
    }
}
