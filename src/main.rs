mod capture;
mod controller;
mod conversation;
mod extract;
mod knowledge_base;
mod notify;
mod preferences;
mod session;
mod ticket;
mod types;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use knowledge_base::LocalKnowledgeBase;
use preferences::{ConversationSource, Preferences, resolve_path};
use session::Session;
use std::fs;
use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;
use types::{Reply, SessionInput, SessionOutput};

#[derive(Parser)]
#[command(name = "helpx", version, about = "Resolve IT support tickets and escalate the rest")]
struct Cli {
    /// Directory holding helpx.toml, the knowledge base and the escalation outbox.
    #[arg(long, global = true, default_value = ".helpx")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Read JSON events from stdin, one per line, and answer each on stdout.
    Serve,
    /// Print the solution summary of the transcript on stdin.
    Extract,
    /// Print a fresh escalation ticket id.
    Ticket {
        #[arg(long, default_value = ticket::DEFAULT_PREFIX)]
        prefix: String,
        #[arg(long, default_value_t = ticket::DEFAULT_LENGTH)]
        length: usize,
    },
    /// Write default settings and a sample knowledge base.
    Init,
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("HELPX_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    Ok(buffer)
}

fn serve(dir: &Path) -> Result<()> {
    let mut session = Session::open(dir)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in io::stdin().lock().lines() {
        let line = line.context("reading event from stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let output = match serde_json::from_str::<SessionInput>(&line) {
            Ok(input) => session.handle(&input),
            Err(err) => SessionOutput {
                reply: Reply::Error {
                    message: format!("invalid event: {err}"),
                },
                phase: session.controller().state().phase(),
            },
        };
        let json = serde_json::to_string(&output).context("serializing reply")?;
        writeln!(out, "{json}").context("writing reply")?;
        out.flush().context("flushing reply")?;
    }
    Ok(())
}

fn init(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let prefs = Preferences::load(dir)?;
    if let ConversationSource::KnowledgeBase(file) = &prefs.conversation {
        let path = resolve_path(dir, file);
        if !path.exists() {
            let toml = LocalKnowledgeBase::sample().to_toml()?;
            fs::write(&path, toml).with_context(|| format!("writing {}", path.display()))?;
        }
    }
    println!("initialized {}", dir.display());
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cli.data_dir),
        Command::Extract => {
            let text = read_stdin().context("reading transcript from stdin")?;
            println!("{}", extract::extract_solutions(Some(&text)));
            Ok(())
        }
        Command::Ticket { prefix, length } => {
            println!("{}", ticket::new_ticket_id(&prefix, length));
            Ok(())
        }
        Command::Init => init(&cli.data_dir),
    }
}

fn main() {
    init_logging();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("helpx: {err:#}");
        process::exit(2);
    }
}
