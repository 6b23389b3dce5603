//! `machine`: stream constrained text from a language model.
//!
//! `run` streams a text while enforcing a writing constraint, `check`
//! validates an existing text, `constraints` lists the catalog and `init`
//! writes a default `machine.toml`.

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use machine_runner::check::check_text;
use machine_runner::core::catalog;
use machine_runner::core::constraint::Constraint;
use machine_runner::core::types::{Difficulty, Lang, RollbackMode, RunStatus, VersusGoal};
use machine_runner::events::{RunEvent, RunObserver};
use machine_runner::exit_codes;
use machine_runner::io::config::{DEFAULT_CONFIG_PATH, RunnerConfig, load_config, write_config};
use machine_runner::io::openai::OpenAiGenerator;
use machine_runner::io::transcript::Transcript;
use machine_runner::logging;
use machine_runner::runner::{RunRequest, Runner};

#[derive(Parser)]
#[command(
    name = "machine",
    version,
    about = "Constraint-enforcing streaming text runner"
)]
struct Cli {
    /// More diagnostics on stderr (-v progress, -vv per chunk).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file if missing.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Stream a text from the model while enforcing a constraint.
    Run(RunArgs),
    /// Validate a finished text against a constraint.
    Check {
        #[arg(long)]
        constraint: String,
        #[arg(long, default_value = "")]
        param: String,
        /// Language of the reported reason.
        #[arg(long, default_value = "fr")]
        lang: Lang,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
        /// Text to check. Reads stdin when omitted or `-`.
        text: Option<String>,
    },
    /// List the built-in constraints and their parameters.
    Constraints,
}

#[derive(Args)]
struct RunArgs {
    /// Constraint id (see `machine constraints`).
    #[arg(long)]
    constraint: String,
    #[arg(long, default_value = "")]
    param: String,
    #[arg(long, default_value = "normal")]
    difficulty: Difficulty,
    #[arg(long, default_value = "fr")]
    lang: Lang,
    /// Overrides `rollback_mode` from the config.
    #[arg(long)]
    rollback: Option<RollbackMode>,
    /// Free-form theme for the text.
    #[arg(long)]
    steering: Option<String>,
    /// Ask for a text longer than this many characters.
    #[arg(long, conflicts_with = "min_words")]
    min_chars: Option<usize>,
    /// Ask for at least this many words.
    #[arg(long)]
    min_words: Option<usize>,
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Write every run event to this JSONL file.
    #[arg(long)]
    transcript: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force, config } => cmd_init(&config, force),
        Command::Run(args) => cmd_run(args).await,
        Command::Check {
            constraint,
            param,
            lang,
            json,
            text,
        } => cmd_check(&constraint, &param, lang, json, text.as_deref()),
        Command::Constraints => cmd_constraints(),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        println!("{} already exists", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &RunnerConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

async fn cmd_run(args: RunArgs) -> Result<i32> {
    let config = load_config(&args.config)?;
    let constraint = lookup(&args.constraint, &args.param)?;
    let generator = OpenAiGenerator::from_config(&config.generator)?;

    let goal = match (args.min_chars, args.min_words) {
        (Some(chars), _) => Some(VersusGoal::Chars(chars)),
        (None, Some(words)) => Some(VersusGoal::Words(words)),
        (None, None) => None,
    };
    let request = RunRequest {
        constraint,
        param: &args.param,
        difficulty: args.difficulty,
        lang: args.lang,
        rollback_mode: args.rollback.unwrap_or(config.rollback_mode),
        steering: args.steering.as_deref(),
        goal,
    };

    let mut transcript = args
        .transcript
        .as_deref()
        .map(Transcript::create)
        .transpose()?;
    let mut console = ConsoleObserver::default();
    let mut runner = Runner::new(generator, config);

    let stop = runner.stop_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.stop();
        }
    });

    let mut observer = |event: &RunEvent| {
        console.on_event(event);
        if let Some(transcript) = transcript.as_mut() {
            transcript.on_event(event);
        }
    };
    let snapshot = runner.run(&request, &mut observer).await;
    ctrl_c.abort();
    println!();

    if let Some(transcript) = transcript {
        let path = transcript.finish(&snapshot)?;
        eprintln!("transcript: {}", path.display());
    }

    let summary = snapshot.summary();
    eprintln!(
        "{}: {} letters, {} words",
        summary.status, summary.letters, summary.words
    );
    if let Some(err) = &summary.last_error {
        eprintln!("error: {err}");
    }
    Ok(match summary.status {
        RunStatus::Failed => exit_codes::FAILED,
        _ => exit_codes::OK,
    })
}

fn cmd_check(
    constraint: &str,
    param: &str,
    lang: Lang,
    json: bool,
    text: Option<&str>,
) -> Result<i32> {
    let constraint = lookup(constraint, param)?;
    let text = match text {
        None | Some("-") => read_stdin()?,
        Some(text) => text.to_string(),
    };
    let report = check_text(constraint, param, &text, lang);

    if json {
        let payload = serde_json::to_string_pretty(&report).context("serialize report")?;
        println!("{payload}");
    } else if report.valid {
        println!("valid: {} letters, {} words", report.letters, report.words);
        if let Some(note) = &report.note {
            println!("note: {note}");
        }
    } else {
        println!("invalid: {}", report.reason.as_deref().unwrap_or_default());
        if let Some(span) = report.highlight.clone() {
            println!("offending: {:?}", &text[span]);
            println!("valid prefix: {:?}", report.valid_prefix);
        }
    }

    Ok(if report.valid {
        exit_codes::OK
    } else {
        exit_codes::FAILED
    })
}

fn cmd_constraints() -> Result<i32> {
    let mut out = io::stdout().lock();
    for constraint in catalog::all() {
        writeln!(
            out,
            "{:<14} {:<24} {}",
            constraint.id(),
            constraint.name(Lang::En),
            constraint.param_spec().describe()
        )
        .context("write constraint list")?;
    }
    Ok(exit_codes::OK)
}

/// Resolve a constraint id and check that `param` fits it.
fn lookup(id: &str, param: &str) -> Result<&'static dyn Constraint> {
    let Some(constraint) = catalog::by_id(id) else {
        let known: Vec<&str> = catalog::all().iter().map(|c| c.id()).collect();
        bail!("unknown constraint {id:?} (known: {})", known.join(", "));
    };
    let spec = constraint.param_spec();
    if !spec.accepts(param) {
        bail!("constraint {} needs --param: {}", constraint.id(), spec.describe());
    }
    Ok(constraint)
}

fn read_stdin() -> Result<String> {
    let mut text = String::new();
    io::stdin()
        .read_to_string(&mut text)
        .context("read text from stdin")?;
    let trimmed = text.trim_end_matches(['\r', '\n']).len();
    text.truncate(trimmed);
    Ok(text)
}

/// Prints the growing text to stdout and run notices to stderr.
#[derive(Default)]
struct ConsoleObserver {
    shown: String,
}

impl RunObserver for ConsoleObserver {
    fn on_event(&mut self, event: &RunEvent) {
        match event {
            RunEvent::Text(text) => {
                let mut out = io::stdout().lock();
                let written = match text.strip_prefix(self.shown.as_str()) {
                    Some(delta) => write!(out, "{delta}"),
                    None => write!(out, "\n[rollback] {text}"),
                };
                if written.and_then(|()| out.flush()).is_err() {
                    return;
                }
                self.shown.clone_from(text);
            }
            RunEvent::Attempt(Some(info)) if info.retrying => {
                eprintln!("\n[attempt {}/{}]", info.attempt, info.max);
            }
            RunEvent::Violation(report) => {
                eprintln!(
                    "\n[violation] {} (at {:?})",
                    report.reason,
                    report.highlighted()
                );
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn lookup_rejects_missing_param() {
        let err = lookup("lipogram", "").err().expect("needs a letter");
        assert!(err.to_string().contains("needs --param"));
        assert!(lookup("LIPOGRAM", "e").is_ok());
    }

    #[test]
    fn lookup_lists_known_ids_on_typo() {
        let err = lookup("lipogramme", "e").err().expect("unknown");
        assert!(err.to_string().contains("tautogram"));
    }

    #[test]
    fn console_tracks_shown_text() {
        let mut console = ConsoleObserver::default();
        console.on_event(&RunEvent::Text("Un chat".into()));
        console.on_event(&RunEvent::Text("Un chat gris".into()));
        assert_eq!(console.shown, "Un chat gris");
    }
}
