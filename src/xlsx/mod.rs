//! Renders a `ResultSet` as a single-sheet `.xlsx` workbook.
//!
//! The workbook is assembled in memory as a ZIP archive of SpreadsheetML parts, written next to
//! its destination under a temporary name and then renamed into place. The destination path
//! therefore either holds the previous file, or the complete new one.

mod cell;
mod parts;

use crate::error::Res;
use crate::model::{ResultSet, Value};
use crate::utils;
use anyhow::{bail, Context};
use std::ffi::OsString;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// The content type of an `.xlsx` file.
pub(crate) const MIME_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// The name of the worksheet that holds the exported rows.
pub(crate) const SHEET_NAME: &str = "Data";

/// Suffix of the temporary file that a workbook is written to before it is renamed into place.
const PARTIAL_SUFFIX: &str = ".partial";

/// One worksheet: a header row of column names followed by the data rows.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Worksheet {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Worksheet {
    /// Lays out `result_set` as a worksheet. The columns are the field names of the first record,
    /// in order. Each record becomes one row in input order; a record whose fields differ from the
    /// first record's is matched by column name, and its missing fields are left empty.
    pub(crate) fn from_result_set(name: &str, result_set: &ResultSet) -> Res<Self> {
        if result_set.is_empty() {
            bail!("There are no records to render");
        }
        let columns: Vec<String> = result_set
            .columns()
            .into_iter()
            .map(str::to_string)
            .collect();
        if columns.len() > cell::MAX_COLUMNS {
            bail!(
                "The result has {} columns but a worksheet holds at most {}",
                columns.len(),
                cell::MAX_COLUMNS
            );
        }
        if result_set.len() + 1 > cell::MAX_ROWS {
            bail!(
                "The result has {} rows but a worksheet holds at most {} below the header",
                result_set.len(),
                cell::MAX_ROWS - 1
            );
        }

        let rows = result_set
            .records()
            .iter()
            .map(|record| {
                if record.field_names().eq(columns.iter().map(String::as_str)) {
                    (0..columns.len())
                        .map(|i| record.value_at(i).cloned().unwrap_or(Value::Null))
                        .collect()
                } else {
                    columns
                        .iter()
                        .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                        .collect()
                }
            })
            .collect();

        Ok(Self {
            name: name.to_string(),
            columns,
            rows,
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(crate) fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }
}

/// A workbook with a single worksheet.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Workbook {
    sheet: Worksheet,
}

impl Workbook {
    pub(crate) fn new(sheet: Worksheet) -> Self {
        Self { sheet }
    }

    /// Serializes the workbook to the bytes of an `.xlsx` file.
    pub(crate) fn to_bytes(&self) -> Res<Vec<u8>> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let entries: [(&str, Vec<u8>); 6] = [
            (parts::CONTENT_TYPES_PATH, parts::CONTENT_TYPES.as_bytes().to_vec()),
            (parts::ROOT_RELS_PATH, parts::ROOT_RELS.as_bytes().to_vec()),
            (parts::WORKBOOK_PATH, parts::workbook(self.sheet.name())?),
            (parts::WORKBOOK_RELS_PATH, parts::WORKBOOK_RELS.as_bytes().to_vec()),
            (parts::STYLES_PATH, parts::STYLES.as_bytes().to_vec()),
            (parts::SHEET_PATH, parts::worksheet(&self.sheet)?),
        ];
        for (name, data) in entries {
            zip.start_file(name, options)
                .with_context(|| format!("Unable to add {name} to the workbook"))?;
            zip.write_all(&data)
                .with_context(|| format!("Unable to write {name} into the workbook"))?;
        }

        let cursor = zip.finish().context("Unable to finish the workbook archive")?;
        Ok(cursor.into_inner())
    }

    /// Writes the workbook to `path`, replacing any existing file.
    ///
    /// The bytes go to `<path>.partial` first, which is then renamed to `path`. If anything fails
    /// the temporary file is removed and `path` is left as it was.
    pub(crate) async fn save(&self, path: &Path) -> Res<()> {
        let bytes = self.to_bytes()?;
        let partial = partial_path(path);
        debug!("Writing {} bytes to {}", bytes.len(), partial.display());

        let result = match utils::write(&partial, &bytes).await {
            Ok(()) => utils::rename(&partial, path).await,
            Err(e) => Err(e),
        };
        if result.is_err() && partial.exists() {
            if let Err(e) = utils::remove(&partial).await {
                warn!("Unable to clean up the partial file: {e:#}");
            }
        }
        result
    }
}

/// Renders `result_set` into a workbook with one worksheet named `SHEET_NAME` and saves it at
/// `path`.
pub(crate) async fn render(result_set: &ResultSet, path: &Path) -> Res<()> {
    let sheet = Worksheet::from_result_set(SHEET_NAME, result_set)?;
    Workbook::new(sheet)
        .save(path)
        .await
        .with_context(|| format!("Unable to save the spreadsheet to {}", path.display()))
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}
