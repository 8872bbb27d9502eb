use clap::Parser;
use drive_export::args::{Args, Command};
use drive_export::{commands, Config, Mode, Result};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Variables that are already set take precedence over the .env file.
    let dotenv = dotenvy::dotenv();
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());
    match dotenv {
        Ok(path) => debug!("Loaded settings from {}", path.display()),
        Err(e) if e.not_found() => trace!("No .env file found"),
        Err(e) => error!("Unable to load the .env file: {e}"),
    }

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");

    // This allows for running the program without hitting the Google APIs. When
    // DRIVE_EXPORT_IN_TEST_MODE is set and non-zero in length, then the mode will be Mode::Testing,
    // otherwise it will be Mode::Google.
    let mode = Mode::from_env();

    let _: () = match args.command() {
        Command::Run(run_args) => {
            let config = Config::load(args.common().settings())?;
            commands::run(config, mode, run_args).await?.print()
        }
        Command::Window(window_args) => commands::window(window_args)?.print(),
        Command::Auth => {
            let config = Config::load(args.common().settings())?;
            commands::auth(&config, mode).await?.print()
        }
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_CRATE_NAME"),
                level,
                env!("CARGO_BIN_NAME"),
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
