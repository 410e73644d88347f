//! issuecrawl CLI entry point.

use clap::Parser;
use issuecrawl::cli::commands;
use issuecrawl::cli::{Cli, Commands};
use issuecrawl::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            if cli.json {
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
            2 => EnvFilter::new("debug,rusqlite=info,reqwest=info,hyper=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli) -> Result<u8, Error> {
    let json = cli.json;
    match &cli.command {
        Commands::Crawl { trackers } => commands::crawl::execute(
            trackers,
            cli.db.as_ref(),
            cli.config.as_ref(),
            json,
            cli.quiet,
        ),
        Commands::Status => {
            commands::status::execute(cli.db.as_ref(), cli.config.as_ref(), json).map(|()| 0)
        }
        Commands::CheckConfig => {
            commands::check_config::execute(cli.db.as_ref(), cli.config.as_ref(), json).map(|()| 0)
        }
        Commands::Version => commands::version::execute(json).map(|()| 0),
        Commands::Completions { shell } => commands::completions::execute(shell).map(|()| 0),
    }
}
