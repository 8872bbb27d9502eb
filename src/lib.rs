mod api;
pub mod args;
pub mod commands;
mod config;
mod db;
mod error;
mod model;
mod utils;
mod window;
mod xlsx;


pub use api::{Mode, TEST_MODE_ENV};
pub use config::Config;
pub use error::{Error, ErrorType, Result};
pub use window::DateWindow;
