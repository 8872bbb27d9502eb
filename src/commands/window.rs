use crate::args::WindowArgs;
use crate::commands::Out;
use crate::window::DateWindow;
use crate::Result;
use chrono::NaiveDate;
use serde::Serialize;

/// The window and file name that a `run` on the same date would use.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowInfo {
    start: NaiveDate,
    end: NaiveDate,
    file_name: String,
}

/// Handles `drive-export window`. Nothing is read or written.
pub fn window(args: &WindowArgs) -> Result<Out<WindowInfo>> {
    let window = match args.date() {
        Some(end) => DateWindow::trailing_month(end),
        None => DateWindow::current(),
    };
    let info = WindowInfo {
        start: window.start(),
        end: window.end(),
        file_name: window.file_name(),
    };
    Ok(Out::new(format!("{window}: {}", info.file_name), info))
}
