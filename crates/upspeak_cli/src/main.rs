//! Upspeak command-line entry point.
//!
//! `run` reads one command envelope per stdin line, routes it through the
//! bus, and prints every domain event as one JSON line on stdout.

use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use upspeak_core::{
    default_log_level, init_logging, CoreConfig, Event, Message, NodeId, Repository, Runtime,
    OUTBOUND_WILDCARD,
};

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "upspeak")]
#[command(version, about = "Event-driven knowledge repository", long_about = None)]
struct Cli {
    /// JSON config file; defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured repositories
    Repos,

    /// Apply command envelopes read from stdin, one JSON object per line
    Run {
        /// Repository name or id (defaults to `default`)
        #[arg(short, long)]
        repo: Option<String>,
    },

    /// Print one stored entity as JSON
    Get {
        kind: EntityKind,
        id: String,
        /// Repository name or id (defaults to `default`)
        #[arg(short, long)]
        repo: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum EntityKind {
    Node,
    Edge,
    Thread,
    Annotation,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("upspeak: {err}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> CliResult<()> {
    let config = match &cli.config {
        Some(path) => CoreConfig::from_json_file(path)?,
        None => CoreConfig::default(),
    };
    if let Some(log_dir) = &config.log_dir {
        let level = config.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir)?;
    }

    let runtime = Runtime::start(&config)?;
    let outcome = match cli.command {
        Commands::Repos => list_repos(&runtime),
        Commands::Run { repo } => run_commands(&runtime, repo.as_deref()),
        Commands::Get { kind, id, repo } => print_entity(&runtime, repo.as_deref(), kind, &id),
    };
    runtime.shutdown()?;
    outcome
}

fn list_repos(runtime: &Runtime) -> CliResult<()> {
    for repository in runtime.registry().iter() {
        println!("{}\t{}", repository.id(), repository.name());
    }
    Ok(())
}

fn run_commands(runtime: &Runtime, selector: Option<&str>) -> CliResult<()> {
    let repository = select_repo(runtime, selector)?;
    let printer = runtime.bus().subscribe(OUTBOUND_WILDCARD, |message| {
        write_event_line(&mut io::stdout().lock(), message);
    })?;
    info!(
        "event=cli_run module=cli status=start repo_id={} name={}",
        repository.id(),
        repository.name()
    );

    for (index, line) in io::stdin().lock().lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let command = match Event::from_slice(line.as_bytes()) {
            Ok(command) => command,
            Err(err) => {
                eprintln!("line {}: {err}", index + 1);
                continue;
            }
        };
        runtime.submit(repository.id(), &command)?;
    }

    runtime.bus().unsubscribe(printer)?;
    Ok(())
}

fn print_entity(
    runtime: &Runtime,
    selector: Option<&str>,
    kind: EntityKind,
    raw_id: &str,
) -> CliResult<()> {
    let repository = select_repo(runtime, selector)?;
    let id = parse_id(raw_id)?;
    let value = match kind {
        EntityKind::Node => serde_json::to_value(repository.get_node(id)?)?,
        EntityKind::Edge => serde_json::to_value(repository.get_edge(id)?)?,
        EntityKind::Thread => serde_json::to_value(repository.get_thread(id)?)?,
        EntityKind::Annotation => serde_json::to_value(repository.get_annotation(id)?)?,
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Writes one outbound event per line. A failed write is logged, not fatal.
fn write_event_line(out: &mut impl Write, message: &Message) -> bool {
    match out
        .write_all(&message.data)
        .and_then(|()| out.write_all(b"\n"))
    {
        Ok(()) => true,
        Err(err) => {
            warn!(
                "event=cli_output module=cli status=error subject={} error={err}",
                message.subject
            );
            false
        }
    }
}

/// Matches by name or id; without a selector prefers `default`, then the
/// lowest id.
fn select_repo(runtime: &Runtime, selector: Option<&str>) -> CliResult<Arc<Repository>> {
    let registry = runtime.registry();
    let wanted = selector.unwrap_or("default");
    let found = registry
        .iter()
        .find(|repo| repo.name() == wanted || repo.id().to_string() == wanted)
        .or_else(|| selector.is_none().then(|| registry.iter().next()).flatten());
    found
        .cloned()
        .ok_or_else(|| format!("no repository matches {wanted:?}").into())
}

fn parse_id(raw: &str) -> CliResult<NodeId> {
    raw.trim()
        .parse::<NodeId>()
        .map_err(|err| format!("invalid id {raw:?}: {err}").into())
}
