//! The `run` command: query the window, write the spreadsheet, upload it and clean up.

use crate::api::{self, Drive, Mode, Upload};
use crate::args::RunArgs;
use crate::commands::Out;
use crate::config::{GOOGLE_DRIVE_FOLDER_ID, GOOGLE_KEY_FILE, QUERY_FILE};
use crate::db::{PostgresSource, Source};
use crate::error::{Error, ErrorType, IntoResult, Res};
use crate::model::ResultSet;
use crate::window::DateWindow;
use crate::{utils, xlsx, Config, Result};
use anyhow::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The query returned no rows; nothing was written or uploaded.
    Empty { window: DateWindow },

    /// The spreadsheet was written and, because uploading was disabled, kept.
    Rendered {
        window: DateWindow,
        path: PathBuf,
        rows: usize,
    },

    /// The spreadsheet was uploaded. `local_file_deleted` is false if the cleanup failed.
    Uploaded {
        window: DateWindow,
        file_id: String,
        file_name: String,
        rows: usize,
        local_file_deleted: bool,
    },
}

/// Runs the export for the window that ends on `--date`, or today.
///
/// # Errors
/// Each stage fails with its own `ErrorType`: `Connection`, `Query`, `Render` or `Upload`. A query
/// that returns no rows is not an error.
pub async fn run(config: Config, mode: Mode, args: &RunArgs) -> Result<Out<Outcome>> {
    for name in config.missing() {
        warn!("{name} is not set");
    }
    let window = match args.date() {
        Some(end) => DateWindow::trailing_month(end),
        None => DateWindow::current(),
    };
    let mut source = PostgresSource::new(config.db().clone());
    export(
        &config,
        window,
        &mut source,
        |key_file| api::drive(mode, key_file),
        args.no_upload(),
    )
    .await
}

/// The pipeline behind `run`, with the database and Drive supplied by the caller.
pub(crate) async fn export<F>(
    config: &Config,
    window: DateWindow,
    source: &mut (dyn Source + Send),
    make_drive: F,
    no_upload: bool,
) -> Result<Out<Outcome>>
where
    F: FnOnce(&Path) -> Box<dyn Drive + Send>,
{
    info!("Exporting {window}");
    let result_set = execute_query(config, source, &window).await?;
    if result_set.is_empty() {
        return Ok(Out::new(
            format!("No data for the window {window}"),
            Outcome::Empty { window },
        ));
    }
    let rows = result_set.len();
    if let Some(first) = result_set.records().first() {
        trace!(record = ?first, "First record");
    }

    let file_name = window.file_name();
    let path = config.output_dir().join(&file_name);
    xlsx::render(&result_set, &path)
        .await
        .pub_result(ErrorType::Render)?;
    info!("Spreadsheet saved to {}", path.display());

    if no_upload {
        return Ok(Out::new(
            format!("Spreadsheet saved to {} (upload skipped)", path.display()),
            Outcome::Rendered { window, path, rows },
        ));
    }

    let file_id = upload(config, &path, &file_name, make_drive)
        .await
        .pub_result(ErrorType::Upload)?;
    info!("Spreadsheet uploaded to Google Drive with ID: {file_id}");

    let local_file_deleted = match utils::remove(&path).await {
        Ok(()) => {
            info!("Deleted local file {}", path.display());
            true
        }
        Err(e) => {
            warn!("Unable to delete local file {}: {e:#}", path.display());
            false
        }
    };

    Ok(Out::new(
        format!("Uploaded {file_name} to Google Drive with ID: {file_id}"),
        Outcome::Uploaded {
            window,
            file_id,
            file_name,
            rows,
            local_file_deleted,
        },
    ))
}

/// Connects, runs the query and closes the connection, whatever happened in between.
async fn execute_query(
    config: &Config,
    source: &mut (dyn Source + Send),
    window: &DateWindow,
) -> Result<ResultSet> {
    let result = match source.connect().await {
        Ok(()) => {
            info!("Connected to database {}", source.name());
            query(config, source, window).await
        }
        Err(e) => Err(Error::new(ErrorType::Connection, e)),
    };
    if let Err(e) = source.close().await {
        warn!("Unable to close the database connection: {e:#}");
    }
    result
}

async fn query(
    config: &Config,
    source: &mut (dyn Source + Send),
    window: &DateWindow,
) -> Result<ResultSet> {
    let query_file = config
        .query_file()
        .with_context(|| format!("{QUERY_FILE} is not set"))
        .pub_result(ErrorType::Query)?;
    let sql = utils::read(query_file)
        .await
        .pub_result(ErrorType::Query)?;
    let result_set = source
        .query(&sql, window)
        .await
        .pub_result(ErrorType::Query)?;
    debug!("The query returned {} records", result_set.len());
    Ok(result_set)
}

/// Uploads the file at `path` and returns the id that Drive assigned to it.
async fn upload<F>(config: &Config, path: &Path, file_name: &str, make_drive: F) -> Res<String>
where
    F: FnOnce(&Path) -> Box<dyn Drive + Send>,
{
    let key_file = config
        .key_file()
        .with_context(|| format!("{GOOGLE_KEY_FILE} is not set"))?;
    let folder_id = config
        .folder_id()
        .with_context(|| format!("{GOOGLE_DRIVE_FOLDER_ID} is not set"))?;
    let content = utils::read_bytes(path).await?;

    let mut drive = make_drive(key_file);
    let file = drive
        .create_file(Upload {
            name: file_name.to_string(),
            folder_id: folder_id.to_string(),
            mime_type: xlsx::MIME_TYPE.to_string(),
            content,
        })
        .await?;

    file.id
        .filter(|id| !id.is_empty())
        .context("Google Drive did not return an ID for the uploaded file")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{DriveFile, TestDrive, TestResponse};
    use crate::args::Settings;
    use crate::test::{date, two_rows, TestEnv, TestSource, FOLDER_ID, QUERY};
    use std::io::{Cursor, Read};

    fn window() -> DateWindow {
        DateWindow::trailing_month(date(2024, 2, 1))
    }

    async fn export_with(
        env: &TestEnv,
        source: &mut TestSource,
        drive: &TestDrive,
        no_upload: bool,
    ) -> Result<Out<Outcome>> {
        let drive = drive.clone();
        export(
            &env.config(),
            window(),
            source,
            move |_| -> Box<dyn Drive + Send> { Box::new(drive) },
            no_upload,
        )
        .await
    }

    #[tokio::test]
    async fn test_export_uploads_and_deletes() {
        let env = TestEnv::new();
        let mut source = TestSource::new(two_rows());
        let drive = TestDrive::new([TestResponse::Id("abc123".into())]);

        let out = export_with(&env, &mut source, &drive, false).await.unwrap();

        assert!(out.message().contains("abc123"));
        assert_eq!(
            Some(&Outcome::Uploaded {
                window: window(),
                file_id: "abc123".into(),
                file_name: "planilha2024-01-01a2024-02-01.xlsx".into(),
                rows: 2,
                local_file_deleted: true,
            }),
            out.structure()
        );

        let uploads = drive.uploads();
        assert_eq!(1, uploads.len());
        assert_eq!("planilha2024-01-01a2024-02-01.xlsx", uploads[0].name);
        assert_eq!(FOLDER_ID, uploads[0].folder_id);
        assert_eq!(xlsx::MIME_TYPE, uploads[0].mime_type);

        let mut archive = zip::ZipArchive::new(Cursor::new(uploads[0].content.as_slice())).unwrap();
        let mut sheet = String::new();
        archive
            .by_name("xl/worksheets/sheet1.xml")
            .unwrap()
            .read_to_string(&mut sheet)
            .unwrap();
        assert_eq!(3, sheet.matches("<row ").count());
        assert!(sheet.contains(">id<") && sheet.contains(">name<"));

        assert!(!env.files().iter().any(|f| f.ends_with(".xlsx")));
        assert_eq!(
            vec![
                "connect".to_string(),
                format!("query {QUERY} [2024-01-01, 2024-02-01]"),
                "close".to_string(),
            ],
            source.calls()
        );
    }

    /// A `Drive` that takes the local file away while uploading it, so the cleanup afterwards
    /// cannot delete it.
    struct TakingDrive {
        path: PathBuf,
    }

    #[async_trait::async_trait]
    impl Drive for TakingDrive {
        async fn create_file(&mut self, upload: Upload) -> Res<DriveFile> {
            std::fs::remove_file(&self.path)?;
            Ok(DriveFile {
                id: Some("abc123".into()),
                name: Some(upload.name),
            })
        }
    }

    #[tokio::test]
    async fn test_failed_cleanup_still_succeeds() {
        let env = TestEnv::new();
        let mut source = TestSource::new(two_rows());
        let path = env.dir().join("planilha2024-01-01a2024-02-01.xlsx");
        let drive = TakingDrive { path: path.clone() };

        let out = export(
            &env.config(),
            window(),
            &mut source,
            move |_| -> Box<dyn Drive + Send> { Box::new(drive) },
            false,
        )
        .await
        .unwrap();

        assert_eq!(
            Some(&Outcome::Uploaded {
                window: window(),
                file_id: "abc123".into(),
                file_name: "planilha2024-01-01a2024-02-01.xlsx".into(),
                rows: 2,
                local_file_deleted: false,
            }),
            out.structure()
        );
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_export_with_trace_logging() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);
        let env = TestEnv::new();
        let mut source = TestSource::new(two_rows());
        let drive = TestDrive::default();

        let out = export_with(&env, &mut source, &drive, true).await.unwrap();
        assert!(matches!(out.structure(), Some(Outcome::Rendered { rows: 2, .. })));
    }

    #[tokio::test]
    async fn test_empty_result_writes_nothing() {
        let env = TestEnv::new();
        let mut source = TestSource::new(Vec::new());
        let drive = TestDrive::default();

        let out = export_with(&env, &mut source, &drive, false).await.unwrap();

        assert_eq!(Some(&Outcome::Empty { window: window() }), out.structure());
        assert!(drive.uploads().is_empty());
        assert_eq!(vec!["key.json", "query.sql"], env.files());
        assert_eq!(Some("close"), source.calls().last().map(String::as_str));
    }

    #[tokio::test]
    async fn test_missing_id_keeps_file() {
        let env = TestEnv::new();
        let mut source = TestSource::new(two_rows());
        let drive = TestDrive::new([TestResponse::MissingId]);

        let err = export_with(&env, &mut source, &drive, false)
            .await
            .unwrap_err();

        assert_eq!(ErrorType::Upload, err.error_type());
        assert!(err.to_string().contains("did not return an ID"));
        assert!(env.dir().join("planilha2024-01-01a2024-02-01.xlsx").is_file());
    }

    #[tokio::test]
    async fn test_empty_id_is_not_a_confirmation() {
        let env = TestEnv::new();
        let mut source = TestSource::new(two_rows());
        let drive = TestDrive::new([TestResponse::Id(String::new())]);

        let err = export_with(&env, &mut source, &drive, false)
            .await
            .unwrap_err();
        assert_eq!(ErrorType::Upload, err.error_type());
    }

    #[tokio::test]
    async fn test_upload_failure_keeps_file() {
        let env = TestEnv::new();
        let mut source = TestSource::new(two_rows());
        let drive = TestDrive::new([TestResponse::Fail("status 403 Forbidden".into())]);

        let err = export_with(&env, &mut source, &drive, false)
            .await
            .unwrap_err();

        assert_eq!(6, err.exit_code());
        assert!(err.to_string().contains("403"));
        assert!(env.dir().join("planilha2024-01-01a2024-02-01.xlsx").is_file());
    }

    #[tokio::test]
    async fn test_missing_folder_id_fails_upload() {
        let env = TestEnv::new().with_settings(|s| s.with_google("key.json", ""));
        let mut source = TestSource::new(two_rows());
        let drive = TestDrive::default();

        let err = export_with(&env, &mut source, &drive, false)
            .await
            .unwrap_err();

        assert_eq!(ErrorType::Upload, err.error_type());
        assert!(err.to_string().contains(GOOGLE_DRIVE_FOLDER_ID));
        assert!(drive.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_no_upload_keeps_file() {
        let env = TestEnv::new();
        let mut source = TestSource::new(two_rows());
        let drive = TestDrive::default();

        let out = export_with(&env, &mut source, &drive, true).await.unwrap();

        let path = env.dir().join("planilha2024-01-01a2024-02-01.xlsx");
        assert_eq!(
            Some(&Outcome::Rendered {
                window: window(),
                path: path.clone(),
                rows: 2
            }),
            out.structure()
        );
        assert!(path.is_file());
        assert!(drive.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_connection_failure() {
        let env = TestEnv::new();
        let mut source = TestSource::failing_connect("connection refused");
        let drive = TestDrive::default();

        let err = export_with(&env, &mut source, &drive, false)
            .await
            .unwrap_err();

        assert_eq!(ErrorType::Connection, err.error_type());
        assert_eq!(vec!["connect", "close"], source.calls());
        assert!(drive.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_query_failure_closes_connection() {
        let env = TestEnv::new();
        let mut source = TestSource::failing_query("relation \"sales\" does not exist");
        let drive = TestDrive::default();

        let err = export_with(&env, &mut source, &drive, false)
            .await
            .unwrap_err();

        assert_eq!(ErrorType::Query, err.error_type());
        assert_eq!(Some("close"), source.calls().last().map(String::as_str));
        assert_eq!(vec!["key.json", "query.sql"], env.files());
    }

    #[tokio::test]
    async fn test_missing_query_file_setting() {
        let env = TestEnv::new();
        let base_dir = env.dir().to_path_buf();
        let env = env.with_settings(|_| Settings::default().with_base_dir(base_dir));
        let mut source = TestSource::new(two_rows());
        let drive = TestDrive::default();

        let err = export_with(&env, &mut source, &drive, false)
            .await
            .unwrap_err();
        assert_eq!(ErrorType::Query, err.error_type());
        assert!(err.to_string().contains(QUERY_FILE));
        assert_eq!(vec!["connect", "close"], source.calls());
    }

    #[tokio::test]
    async fn test_unreadable_query_file() {
        let env = TestEnv::new().with_settings(|s| s.with_query_file("missing.sql"));
        let mut source = TestSource::new(two_rows());
        let drive = TestDrive::default();

        let err = export_with(&env, &mut source, &drive, false)
            .await
            .unwrap_err();
        assert_eq!(4, err.exit_code());
        assert!(err.to_string().contains("missing.sql"));
    }

    #[tokio::test]
    async fn test_render_failure() {
        let env = TestEnv::new().with_settings(|s| s.with_output_dir("does/not/exist"));
        let mut source = TestSource::new(two_rows());
        let drive = TestDrive::default();

        let err = export_with(&env, &mut source, &drive, false)
            .await
            .unwrap_err();
        assert_eq!(ErrorType::Render, err.error_type());
        assert!(drive.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_rerun_same_window_overwrites() {
        let env = TestEnv::new();
        let drive = TestDrive::default();
        for _ in 0..2 {
            let mut source = TestSource::new(two_rows());
            export_with(&env, &mut source, &drive, true).await.unwrap();
        }
        assert_eq!(
            vec!["key.json", "planilha2024-01-01a2024-02-01.xlsx", "query.sql"],
            env.files()
        );
    }
}
