//! Configuration for drive-export.
//!
//! The settings come from `Settings` (flags or environment variables). `Config` resolves the
//! relative paths against the base directory and otherwise keeps every setting as it was given. A
//! missing setting is not replaced by a default; it is reported by `Config::missing` and fails the
//! stage that needs it.

use crate::args::Settings;
use crate::error::{ErrorType, IntoResult, Res};
use crate::Result;
use anyhow::Context;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};

/// Environment variable names, used in log and error messages about missing settings.
pub(crate) const DB_HOST: &str = "DB_HOST";
pub(crate) const DB_PORT: &str = "DB_PORT";
pub(crate) const DB_USER: &str = "DB_USER";
pub(crate) const DB_PASSWORD: &str = "DB_PASSWORD";
pub(crate) const DB_DATABASE: &str = "DB_DATABASE";
pub(crate) const QUERY_FILE: &str = "QUERY_FILE";
pub(crate) const GOOGLE_KEY_FILE: &str = "GOOGLE_KEY_FILE";
pub(crate) const GOOGLE_DRIVE_FOLDER_ID: &str = "GOOGLE_DRIVE_FOLDER_ID";

/// The `Config` object represents the resolved configuration of a run. It is created once, before
/// any stage runs, and is not modified afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    base_dir: PathBuf,
    db: DbConfig,
    query_file: Option<PathBuf>,
    key_file: Option<PathBuf>,
    folder_id: Option<String>,
    output_dir: PathBuf,
}

impl Config {
    /// Resolves `settings` into a `Config`.
    ///
    /// # Errors
    /// - Returns a `Config` error if no base directory was given and the location of the running
    ///   executable cannot be determined.
    pub fn load(settings: &Settings) -> Result<Self> {
        let base_dir = match settings.base_dir() {
            Some(dir) => dir.to_path_buf(),
            None => executable_dir().pub_result(ErrorType::Config)?,
        };
        let resolve_path = |p: &Path| resolve(&base_dir, p);

        let db = DbConfig::new(
            settings.db_host().map(str::to_string),
            settings.db_port(),
            settings.db_user().map(str::to_string),
            settings.db_password().map(str::to_string),
            settings.db_database().map(str::to_string),
        );

        Ok(Self {
            db,
            query_file: settings.query_file().map(resolve_path),
            key_file: settings.google_key_file().map(Path::to_path_buf),
            folder_id: settings
                .google_drive_folder_id()
                .filter(|id| !id.trim().is_empty())
                .map(str::to_string),
            output_dir: settings
                .output_dir()
                .map(resolve_path)
                .unwrap_or_else(|| base_dir.clone()),
            base_dir,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub(crate) fn db(&self) -> &DbConfig {
        &self.db
    }

    pub fn query_file(&self) -> Option<&Path> {
        self.query_file.as_deref()
    }

    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref()
    }

    pub fn folder_id(&self) -> Option<&str> {
        self.folder_id.as_deref()
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The names of the settings that were not provided.
    pub fn missing(&self) -> Vec<&'static str> {
        let checks = [
            (DB_HOST, self.db.host.is_none()),
            (DB_PORT, self.db.port.is_none()),
            (DB_USER, self.db.user.is_none()),
            (DB_PASSWORD, self.db.password.is_none()),
            (DB_DATABASE, self.db.database.is_none()),
            (QUERY_FILE, self.query_file.is_none()),
            (GOOGLE_KEY_FILE, self.key_file.is_none()),
            (GOOGLE_DRIVE_FOLDER_ID, self.folder_id.is_none()),
        ];
        checks
            .into_iter()
            .filter(|(_, missing)| *missing)
            .map(|(name, _)| name)
            .collect()
    }
}

/// The database connection settings. The password is redacted from `Debug` output.
#[derive(Default, Clone, Eq, PartialEq)]
pub(crate) struct DbConfig {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
}

impl DbConfig {
    pub(crate) fn new(
        host: Option<String>,
        port: Option<u16>,
        user: Option<String>,
        password: Option<String>,
        database: Option<String>,
    ) -> Self {
        Self {
            host,
            port,
            user,
            password,
            database,
        }
    }

    pub(crate) fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub(crate) fn port(&self) -> Option<u16> {
        self.port
    }

    pub(crate) fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub(crate) fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub(crate) fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }
}

impl Debug for DbConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .finish()
    }
}

/// Returns `p` if it is absolute, otherwise `p` joined onto `base`.
fn resolve(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        return p.to_path_buf();
    }
    base.join(p)
}

/// The directory that holds the running executable.
fn executable_dir() -> Res<PathBuf> {
    let exe = std::env::current_exe().context("Unable to locate the running executable")?;
    exe.parent()
        .map(Path::to_path_buf)
        .with_context(|| format!("The executable path {} has no parent", exe.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relative_paths_resolve_against_base_dir() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::default()
            .with_base_dir(dir.path())
            .with_query_file("queries/report.sql")
            .with_output_dir("out");
        let config = Config::load(&settings).unwrap();
        assert_eq!(dir.path().join("queries/report.sql"), config.query_file().unwrap());
        assert_eq!(dir.path().join("out"), config.output_dir());
    }

    #[test]
    fn test_absolute_paths_are_kept() {
        let dir = TempDir::new().unwrap();
        let query = dir.path().join("report.sql");
        let settings = Settings::default()
            .with_base_dir("/somewhere/else")
            .with_query_file(&query);
        let config = Config::load(&settings).unwrap();
        assert_eq!(query.as_path(), config.query_file().unwrap());
    }

    #[test]
    fn test_output_dir_defaults_to_base_dir() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::default().with_base_dir(dir.path());
        let config = Config::load(&settings).unwrap();
        assert_eq!(dir.path(), config.output_dir());
        assert_eq!(dir.path(), config.base_dir());
    }

    #[test]
    fn test_base_dir_defaults_to_executable_dir() {
        let config = Config::load(&Settings::default()).unwrap();
        let exe = std::env::current_exe().unwrap();
        assert_eq!(exe.parent().unwrap(), config.base_dir());
    }

    #[test]
    fn test_missing_settings_are_reported() {
        let config = Config::load(&Settings::default().with_base_dir("/tmp")).unwrap();
        assert_eq!(
            vec![
                DB_HOST,
                DB_PORT,
                DB_USER,
                DB_PASSWORD,
                DB_DATABASE,
                QUERY_FILE,
                GOOGLE_KEY_FILE,
                GOOGLE_DRIVE_FOLDER_ID
            ],
            config.missing()
        );

        let settings = Settings::default()
            .with_base_dir("/tmp")
            .with_db("localhost", 5432, "app", "secret", "sales")
            .with_query_file("q.sql")
            .with_google("key.json", "folder");
        let config = Config::load(&settings).unwrap();
        assert!(config.missing().is_empty());
    }

    #[test]
    fn test_blank_folder_id_is_missing() {
        let settings = Settings::default()
            .with_base_dir("/tmp")
            .with_google("key.json", "  ");
        let config = Config::load(&settings).unwrap();
        assert_eq!(None, config.folder_id());
        assert!(config.missing().contains(&GOOGLE_DRIVE_FOLDER_ID));
    }

    #[test]
    fn test_password_is_redacted() {
        let db = DbConfig::new(None, None, None, Some("hunter2".into()), None);
        let debug = format!("{db:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
