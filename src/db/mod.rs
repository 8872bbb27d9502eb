//! This module is responsible for connecting to the database and running the export query.
//!
//! The `Source` trait is the seam between the pipeline and the database so that the pipeline can
//! be exercised without a server. `PostgresSource` is the real implementation.

mod decode;

use crate::config::DbConfig;
use crate::error::Res;
use crate::model::ResultSet;
use crate::window::DateWindow;
use anyhow::Context;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tracing::{debug, trace};

/// A database that the export query runs against.
///
/// The pipeline calls `connect`, then `query` at most once, then always `close`.
#[async_trait::async_trait]
pub(crate) trait Source {
    /// A human-readable name of the database for log messages.
    fn name(&self) -> String;

    /// Opens the connection.
    async fn connect(&mut self) -> Res<()>;

    /// Runs `sql` with the window's start and end bound to the first and second positional
    /// parameters and returns every row.
    async fn query(&mut self, sql: &str, window: &DateWindow) -> Res<ResultSet>;

    /// Releases the connection. Calling this when there is no open connection is a no-op.
    async fn close(&mut self) -> Res<()>;
}

/// A `Source` backed by a single PostgreSQL connection.
pub(crate) struct PostgresSource {
    config: DbConfig,
    connection: Option<PgConnection>,
}

impl PostgresSource {
    pub(crate) fn new(config: DbConfig) -> Self {
        Self {
            config,
            connection: None,
        }
    }

    /// Builds the connection options. Only settings that were provided are applied; anything else
    /// is left to the driver's own defaults.
    fn connect_options(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new();
        if let Some(host) = self.config.host() {
            options = options.host(host);
        }
        if let Some(port) = self.config.port() {
            options = options.port(port);
        }
        if let Some(user) = self.config.user() {
            options = options.username(user);
        }
        if let Some(password) = self.config.password() {
            options = options.password(password);
        }
        if let Some(database) = self.config.database() {
            options = options.database(database);
        }
        options
    }
}

#[async_trait::async_trait]
impl Source for PostgresSource {
    fn name(&self) -> String {
        self.config.database().unwrap_or("(default)").to_string()
    }

    async fn connect(&mut self) -> Res<()> {
        let options = self.connect_options();
        debug!(
            "Connecting to {}:{} as {}",
            options.get_host(),
            options.get_port(),
            options.get_username()
        );
        let connection = PgConnection::connect_with(&options)
            .await
            .with_context(|| {
                format!(
                    "Unable to connect to PostgreSQL at {}:{}",
                    options.get_host(),
                    options.get_port()
                )
            })?;
        self.connection = Some(connection);
        Ok(())
    }

    async fn query(&mut self, sql: &str, window: &DateWindow) -> Res<ResultSet> {
        let connection = self
            .connection
            .as_mut()
            .context("There is no open database connection")?;
        trace!("Executing query:\n{sql}");
        let rows = sqlx::query(sql)
            .bind(window.start())
            .bind(window.end())
            .fetch_all(connection)
            .await
            .with_context(|| format!("Query failed for the window {window}"))?;
        debug!("Query returned {} rows", rows.len());
        let records = rows
            .iter()
            .map(decode::record)
            .collect::<Res<Vec<_>>>()?;
        Ok(ResultSet::new(records))
    }

    async fn close(&mut self) -> Res<()> {
        if let Some(connection) = self.connection.take() {
            connection
                .close()
                .await
                .context("Failed to close the database connection")?;
            debug!("Database connection closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_options_use_provided_settings() {
        let config = DbConfig::new(
            Some("db.internal".into()),
            Some(6543),
            Some("reporter".into()),
            Some("hunter2".into()),
            Some("sales".into()),
        );
        let source = PostgresSource::new(config);
        let options = source.connect_options();
        assert_eq!("db.internal", options.get_host());
        assert_eq!(6543, options.get_port());
        assert_eq!("reporter", options.get_username());
        assert_eq!(Some("sales"), options.get_database());
        assert_eq!("sales", source.name());
    }

    #[tokio::test]
    async fn test_close_without_connection_is_noop() {
        let mut source = PostgresSource::new(DbConfig::default());
        source.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_query_without_connection_fails() {
        let mut source = PostgresSource::new(DbConfig::default());
        let window = DateWindow::trailing_month(chrono::NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        let err = source.query("SELECT 1", &window).await.unwrap_err();
        assert!(err.to_string().contains("no open database connection"));
    }
}
