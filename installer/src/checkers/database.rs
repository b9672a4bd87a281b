// Database connectivity check
//
// Opens a real connection with the credentials from the database step and runs
// a sanity query. PostgreSQL goes through sqlx, SQL Server through tiberius on
// a tokio TcpStream.

use super::{CheckFailure, DatabaseChecker};
use crate::models::settings::DatabaseSettings;
use crate::utils::logging::mask_sensitive;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tiberius::{AuthMethod, Client, Config};
use tokio::net::TcpStream;
use tokio_util::compat::TokioAsyncWriteCompatExt;

const CONNECT_FAILED: &str = "Unable to connect. Verify host, credentials, and network access.";

/// Production checker that actually connects to the database server.
#[derive(Debug, Default, Clone)]
pub struct ConnectionDatabaseChecker;

impl ConnectionDatabaseChecker {
    pub fn new() -> Self {
        Self
    }
}

/// Human-readable target for logs: `engine://u***r@host:port/name`, no password.
pub fn describe_target(settings: &DatabaseSettings) -> String {
    format!(
        "{}://{}@{}:{}/{}",
        settings.engine(),
        mask_sensitive(settings.user.trim()),
        settings.host.trim(),
        settings.port_or_default(),
        settings.name.trim()
    )
}

async fn connect_postgres(settings: &DatabaseSettings) -> Result<()> {
    let options = PgConnectOptions::new()
        .host(settings.host.trim())
        .port(settings.port_or_default())
        .username(settings.user.trim())
        .password(&settings.password)
        .database(settings.name.trim());

    let mut conn = PgConnection::connect_with(&options)
        .await
        .context("PostgreSQL connection failed")?;
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(&mut conn)
        .await
        .context("PostgreSQL sanity query failed")?;
    conn.close().await.context("PostgreSQL close failed")?;
    Ok(())
}

async fn connect_sql_server(settings: &DatabaseSettings) -> Result<()> {
    let mut config = Config::new();
    config.host(settings.host.trim());
    config.port(settings.port_or_default());
    config.database(settings.name.trim());
    config.authentication(AuthMethod::sql_server(
        settings.user.trim(),
        &settings.password,
    ));
    config.trust_cert();

    let tcp = TcpStream::connect(config.get_addr())
        .await
        .context("SQL Server TCP connect failed")?;
    tcp.set_nodelay(true)?;

    // tiberius expects a futures::io::AsyncWrite
    let mut client = Client::connect(config, tcp.compat_write())
        .await
        .context("SQL Server login failed")?;
    client
        .simple_query("SELECT 1")
        .await
        .context("SQL Server sanity query failed")?
        .into_results()
        .await
        .context("SQL Server sanity query failed")?;
    client.close().await.context("SQL Server close failed")?;
    Ok(())
}

#[async_trait]
impl DatabaseChecker for ConnectionDatabaseChecker {
    async fn connect_to_database(&self, settings: &DatabaseSettings) -> Result<(), CheckFailure> {
        let target = describe_target(settings);
        info!(
            "[PHASE: wizard] [STEP: database_check] Connecting (target={})",
            target
        );

        let result = match settings.engine() {
            "postgres" => connect_postgres(settings).await,
            "sqlserver" => connect_sql_server(settings).await,
            other => {
                return Err(CheckFailure::new(
                    format!("Unsupported database driver '{}'.", other),
                    format!("unsupported driver (target={})", target),
                ));
            }
        };

        match result {
            Ok(()) => {
                info!(
                    "[PHASE: wizard] [STEP: database_check] Connection succeeded (target={})",
                    target
                );
                Ok(())
            }
            Err(e) => {
                // Driver errors can echo the connection parameters; never pass them to the UI.
                let mut details = format!("{:#} (target={})", e, target);
                if !settings.password.is_empty() {
                    details = details.replace(&settings.password, "***");
                }
                warn!(
                    "[PHASE: wizard] [STEP: database_check] Connection failed: {}",
                    details
                );
                Err(CheckFailure::new(CONNECT_FAILED, details))
            }
        }
    }
}
