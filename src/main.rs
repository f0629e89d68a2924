//! Tally node binary.
//!
//! Service mode (`-s`) keeps a file journal, serves it over `tcp://`,
//! and opens an interactive prompt. Without `-s` the binary forwards a
//! single command to a running service and exits non-zero on failure.

use clap::Parser;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tally::{
    command::{self, Command},
    format_sources, ledger,
    types::{parse_id, random_id},
    BrokerRef, BrokerStore, Connection, Endpoint, INVALID_SOURCE, SELF_SOURCE,
};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tally", version, about = "Conflict-free replicated ledger node")]
struct Args {
    /// Serve a journal and open the interactive prompt
    #[arg(short, long)]
    service: bool,

    /// Endpoint hostname
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    hostname: String,

    /// Endpoint port
    #[arg(short, long, default_value_t = 54321)]
    port: u16,

    /// Actor id as lowercase hex; random when omitted
    #[arg(short, long)]
    id: Option<String>,

    /// Journal directory; a temporary one when omitted
    #[arg(short, long)]
    db_path: Option<PathBuf>,

    /// Command forwarded to the service endpoint (REPL grammar)
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("tally=info".parse().expect("static directive")),
        )
        .init();

    let args = Args::parse();
    if args.service {
        run_service(&args)
    } else {
        run_command(&args)
    }
}

/// One-shot mode: a single command against a running service.
fn run_command(args: &Args) -> ExitCode {
    let line = args.command.join(" ");
    let command = match command::parse(&line) {
        Ok(Some(command)) => command,
        Ok(None) => {
            eprintln!("usage: tally [-s] [-H <hostname>] [-p <port>] [-i <id>] [<command>...]");
            eprint!("{}", command::help());
            return ExitCode::FAILURE;
        }
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let store = BrokerStore::new();
    let target = match store.get_or_create(&format!("tcp://{}:{}", args.hostname, args.port)) {
        Ok(target) => target,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    match command {
        Command::Add { data } | Command::Relay { data } => {
            if !target.relay(data, SELF_SOURCE).valid() {
                return ExitCode::FAILURE;
            }
        }
        Command::Connect { url } => {
            let peer = match store.get_or_create(&format!("tcp://{url}")) {
                Ok(peer) => peer,
                Err(err) => {
                    eprintln!("{err}");
                    return ExitCode::FAILURE;
                }
            };
            if !target.connect(Connection::new(peer)).valid() {
                return ExitCode::FAILURE;
            }
        }
        Command::Disconnect { source } => {
            if target.disconnect(source) == INVALID_SOURCE {
                return ExitCode::FAILURE;
            }
        }
        Command::Sources => println!("{}", format_sources(&target.sources(SELF_SOURCE))),
        Command::List => print!("{}", command::help()),
        Command::Quit => {}
    }
    ExitCode::SUCCESS
}

/// Service mode: file journal + endpoint + REPL.
fn run_service(args: &Args) -> ExitCode {
    let id = match &args.id {
        Some(text) => match parse_id(text) {
            Ok(id) => id,
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        },
        None => random_id(),
    };

    let dir = match journal_dir(args.db_path.clone()) {
        Ok(dir) => dir,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let store = BrokerStore::new();
    let url = format!("file://{:x}@{}:{}{}", id, args.hostname, args.port, dir.display());
    let journal = match store.get_or_create(&url) {
        Ok(journal) => journal,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let endpoint = match Endpoint::serve(
        store.clone(),
        journal.clone(),
        &format!("{}:{}", args.hostname, args.port),
    ) {
        Ok(endpoint) => endpoint,
        Err(err) => {
            error!(%err, "cannot bind endpoint");
            return ExitCode::FAILURE;
        }
    };

    let hex_id = format!("{id:x}");
    info!(id = %hex_id, dir = %dir.display(), "journal ready");
    let code = repl(&store, &journal);
    endpoint.stop();
    code
}

fn repl(store: &Arc<BrokerStore>, journal: &BrokerRef) -> ExitCode {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    loop {
        let prompt = format!("{}:{} > ", journal.clock(), ledger::balance(&journal.entries()));
        let line = match editor.readline(&prompt) {
            Ok(line) => line,
            Err(_) => break,
        };
        if !line.trim().is_empty() {
            let _ = editor.add_history_entry(line.as_str());
        }

        match command::parse(&line) {
            Err(err) => println!("{err}"),
            Ok(None) => {}
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => execute(store, journal, command),
        }
    }
    println!("bye!");
    ExitCode::SUCCESS
}

fn execute(store: &Arc<BrokerStore>, journal: &BrokerRef, command: Command) {
    match command {
        Command::Connect { url } => {
            let target = if url.contains("://") { url } else { format!("tcp://{url}") };
            match store.get_or_create(&target) {
                Ok(peer) => {
                    if !journal.connect(Connection::new(peer)).valid() {
                        println!("connect: failed");
                    }
                }
                Err(err) => println!("{err}"),
            }
        }
        Command::Disconnect { source } => {
            if journal.disconnect(source) == INVALID_SOURCE {
                println!("disconnect: no such source");
            }
        }
        Command::Add { mut data } => {
            data.id = journal.id();
            if !journal.append_data(data) {
                println!("add: failed");
            }
        }
        Command::Relay { data } => {
            if !journal.relay(data, SELF_SOURCE).valid() {
                println!("relay: failed");
            }
        }
        Command::Sources => println!("{}", format_sources(&journal.sources(SELF_SOURCE))),
        Command::List => print!("{}", command::help()),
        Command::Quit => {}
    }
}

/// The configured journal directory, or a fresh one under the system
/// temp dir. Always absolute so it survives into the journal URL path.
fn journal_dir(configured: Option<PathBuf>) -> std::io::Result<PathBuf> {
    let dir = match configured {
        Some(dir) => dir,
        None => std::env::temp_dir().join(format!("tally-{:016x}", random_id())),
    };
    std::fs::create_dir_all(&dir)?;
    dir.canonicalize()
}
