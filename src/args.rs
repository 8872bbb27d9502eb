//! These structs provide the CLI interface for the drive-export CLI.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;

/// drive-export: exports a month of database records to a spreadsheet in Google Drive.
///
/// Each run computes the window from one month ago until today, runs the SQL in QUERY_FILE with
/// the two dates bound to $1 and $2, writes the rows to planilha<start>a<end>.xlsx and uploads that
/// file to the Google Drive folder GOOGLE_DRIVE_FOLDER_ID. The local file is deleted once Google
/// Drive confirms the upload.
///
/// Every setting can be given as a flag or through the environment. A .env file in the working
/// directory is loaded first.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Query, render and upload the spreadsheet for the current window.
    ///
    /// Exits with 0 on success and also when the query returns no rows. Failures exit with
    /// 2 (configuration), 3 (database connection), 4 (query), 5 (spreadsheet) or 6 (upload).
    Run(RunArgs),
    /// Print the date window and file name that `run` would use.
    Window(WindowArgs),
    /// Check that GOOGLE_KEY_FILE can be exchanged for an access token.
    Auth,
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    #[clap(flatten)]
    settings: Settings,
}

impl Common {
    pub fn new(log_level: LevelFilter, settings: Settings) -> Self {
        Self {
            log_level,
            settings,
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

/// The raw settings as given on the command line or in the environment. Nothing is defaulted here;
/// see `Config` for how they are resolved.
#[derive(Debug, Default, Parser, Clone)]
pub struct Settings {
    /// PostgreSQL host.
    #[arg(long, env = "DB_HOST")]
    db_host: Option<String>,

    /// PostgreSQL port.
    #[arg(long, env = "DB_PORT")]
    db_port: Option<u16>,

    /// PostgreSQL user.
    #[arg(long, env = "DB_USER")]
    db_user: Option<String>,

    /// PostgreSQL password.
    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    db_password: Option<String>,

    /// PostgreSQL database name.
    #[arg(long, env = "DB_DATABASE")]
    db_database: Option<String>,

    /// File holding the SQL statement to run. Relative paths are resolved against the base
    /// directory.
    #[arg(long, env = "QUERY_FILE")]
    query_file: Option<PathBuf>,

    /// Google credential JSON file, either a service account key or an authorized user file.
    #[arg(long, env = "GOOGLE_KEY_FILE")]
    google_key_file: Option<PathBuf>,

    /// ID of the Google Drive folder that receives the spreadsheet.
    #[arg(long, env = "GOOGLE_DRIVE_FOLDER_ID")]
    google_drive_folder_id: Option<String>,

    /// Directory the spreadsheet is written to before upload. Relative paths are resolved against
    /// the base directory. Defaults to the base directory.
    #[arg(long, env = "OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Directory that relative QUERY_FILE and OUTPUT_DIR paths are resolved against. Defaults to
    /// the directory that holds the drive-export executable.
    #[arg(long, env = "EXPORT_BASE_DIR")]
    base_dir: Option<PathBuf>,
}

impl Settings {
    pub fn db_host(&self) -> Option<&str> {
        self.db_host.as_deref()
    }

    pub fn db_port(&self) -> Option<u16> {
        self.db_port
    }

    pub fn db_user(&self) -> Option<&str> {
        self.db_user.as_deref()
    }

    pub fn db_password(&self) -> Option<&str> {
        self.db_password.as_deref()
    }

    pub fn db_database(&self) -> Option<&str> {
        self.db_database.as_deref()
    }

    pub fn query_file(&self) -> Option<&Path> {
        self.query_file.as_deref()
    }

    pub fn google_key_file(&self) -> Option<&Path> {
        self.google_key_file.as_deref()
    }

    pub fn google_drive_folder_id(&self) -> Option<&str> {
        self.google_drive_folder_id.as_deref()
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }

    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    pub fn with_db(
        mut self,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        self.db_host = Some(host.into());
        self.db_port = Some(port);
        self.db_user = Some(user.into());
        self.db_password = Some(password.into());
        self.db_database = Some(database.into());
        self
    }

    pub fn with_query_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.query_file = Some(path.into());
        self
    }

    pub fn with_google(
        mut self,
        key_file: impl Into<PathBuf>,
        folder_id: impl Into<String>,
    ) -> Self {
        self.google_key_file = Some(key_file.into());
        self.google_drive_folder_id = Some(folder_id.into());
        self
    }

    pub fn with_output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    pub fn with_base_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(path.into());
        self
    }
}

/// (Not shown): Args for the `drive-export run` command.
#[derive(Debug, Default, Parser, Clone)]
pub struct RunArgs {
    /// Export the window that ends on this date (YYYY-MM-DD) instead of today. Useful to re-run a
    /// missed period.
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Write the spreadsheet but do not upload it. The local file is kept.
    #[arg(long)]
    no_upload: bool,
}

impl RunArgs {
    pub fn new(date: Option<NaiveDate>, no_upload: bool) -> Self {
        Self { date, no_upload }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn no_upload(&self) -> bool {
        self.no_upload
    }
}

/// (Not shown): Args for the `drive-export window` command.
#[derive(Debug, Default, Parser, Clone)]
pub struct WindowArgs {
    /// Compute the window that ends on this date (YYYY-MM-DD) instead of today.
    #[arg(long)]
    date: Option<NaiveDate>,
}

impl WindowArgs {
    pub fn new(date: Option<NaiveDate>) -> Self {
        Self { date }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let args = Args::try_parse_from([
            "drive-export",
            "--db-host",
            "localhost",
            "--db-port",
            "5433",
            "--google-drive-folder-id",
            "folder123",
            "run",
            "--date",
            "2024-02-01",
            "--no-upload",
        ])
        .unwrap();
        let settings = args.common().settings();
        assert_eq!(Some("localhost"), settings.db_host());
        assert_eq!(Some(5433), settings.db_port());
        assert_eq!(Some("folder123"), settings.google_drive_folder_id());
        match args.command() {
            Command::Run(run) => {
                assert_eq!(NaiveDate::from_ymd_opt(2024, 2, 1), run.date());
                assert!(run.no_upload());
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_log_level() {
        let args = Args::try_parse_from(["drive-export", "--log-level", "debug", "auth"]).unwrap();
        assert_eq!(LevelFilter::DEBUG, args.common().log_level());
        assert!(matches!(args.command(), Command::Auth));
    }

    #[test]
    fn test_parse_bad_date() {
        let result = Args::try_parse_from(["drive-export", "window", "--date", "2024-02-30"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Args::try_parse_from(["drive-export"]).is_err());
    }
}
