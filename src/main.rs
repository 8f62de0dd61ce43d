//! pipectl CLI entry point.

use clap::Parser;
use pipectl::cli::commands;
use pipectl::cli::{Cli, Commands};
use pipectl::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let db = cli.db.as_ref();
    let actor = cli.actor.as_deref();
    let workspace = cli.workspace.as_deref();

    match &cli.command {
        Commands::Init {
            force,
            default_workspace,
        } => commands::init::execute(db, *force, default_workspace.as_deref(), json),
        Commands::Version => commands::version::execute(json),

        Commands::Project { command } => {
            commands::project::execute(command, db, actor, workspace, json)
        }
        Commands::Issue { command } => commands::issue::execute(command, db, actor, workspace, json),
        Commands::Step { command } => commands::step::execute(command, db, actor, workspace, json),

        // Progression
        Commands::Pipeline { command } => {
            commands::pipeline::execute(command, db, actor, workspace, json)
        }
        Commands::Gate { command } => commands::gate::execute(command, db, actor, workspace, json),

        // Shell completions
        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}
