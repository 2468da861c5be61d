use clap::Parser;
use std::{io, process::exit};
use touchstone_compare::{cli::Args, config::CompareConfig, execute, CompareError};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };

    // RUST_LOG wins over -v flags, logs go to stderr to keep stdout parseable
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(args: &Args) -> Result<(), CompareError> {
    let config = match args.config {
        Some(ref path) => CompareConfig::load(path)?,
        None => CompareConfig::default(),
    };

    let stdout = io::stdout();
    execute(args, &config, &mut stdout.lock())
}

fn main() {
    let args = Args::parse();
    setup_logging(args.verbose);

    match run(&args) {
        Ok(()) => info!("Comparison finished"),
        Err(error) => {
            error!(error = ?error, "Comparison failed: {error}");
            eprintln!("touchstone: {error}");
            exit(1);
        }
    }
}
