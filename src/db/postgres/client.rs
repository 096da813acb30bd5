use std::time::Duration;

use anyhow::Context;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use log::{info, warn};
use tokio_postgres::NoTls;

use crate::config::PostgresSettings;

const CONNECT_ATTEMPTS: u32 = 3;

/// Split SQL into statements, respecting dollar-quoted strings.
/// `DO $$ ... $$` blocks in the schema contain semicolons of their own.
pub(crate) fn split_sql_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut in_dollar_quote = false;
    let bytes = sql.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'$' && bytes.get(i + 1) == Some(&b'$') {
            in_dollar_quote = !in_dollar_quote;
            i += 2;
            continue;
        }

        if bytes[i] == b';' && !in_dollar_quote {
            let stmt = &sql[start..i];
            if !stmt.trim().is_empty() {
                statements.push(stmt);
            }
            start = i + 1;
        }
        i += 1;
    }

    if start < sql.len() {
        let stmt = &sql[start..];
        if !stmt.trim().is_empty() {
            statements.push(stmt);
        }
    }

    statements
}

/// PostgreSQL client with connection pooling.
///
/// Holds deployments, trades, wallet labels and scan checkpoints. Queries
/// live in `ops.rs`.
#[derive(Clone)]
pub struct PostgresClient {
    pub pool: Pool,
    schema_path: String,
}

impl PostgresClient {
    pub async fn new(settings: PostgresSettings) -> anyhow::Result<Self> {
        info!(
            "Connecting to PostgreSQL at {}:{}/{}",
            settings.host, settings.port, settings.database
        );

        let mut last_error = None;

        for attempt in 1..=CONNECT_ATTEMPTS {
            let mut pg_config = tokio_postgres::Config::new();
            pg_config
                .host(&settings.host)
                .port(settings.port)
                .user(&settings.user)
                .password(&settings.password)
                .dbname(&settings.database);

            let mgr_config = ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            };

            let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
            let pool = Pool::builder(mgr)
                .max_size(settings.pool_size)
                .build()
                .context("Failed to create PostgreSQL connection pool")?;

            match pool.get().await {
                Ok(_conn) => {
                    info!("Successfully connected to PostgreSQL");
                    return Ok(Self {
                        pool,
                        schema_path: settings.schema_path.clone(),
                    });
                },
                Err(e) => {
                    last_error = Some(e.to_string());

                    if attempt == CONNECT_ATTEMPTS {
                        break;
                    }

                    let delay = Duration::from_millis(100 * 2_u64.pow(attempt));
                    warn!(
                        "Failed to connect to PostgreSQL (attempt {}/{}), retrying in {:?}...",
                        attempt, CONNECT_ATTEMPTS, delay
                    );
                    tokio::time::sleep(delay).await;
                },
            }
        }

        Err(anyhow::anyhow!(
            "Failed to connect to PostgreSQL after {} attempts: {}",
            CONNECT_ATTEMPTS,
            last_error.unwrap_or_else(|| "Unknown error".to_string())
        ))
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        info!("Applying PostgreSQL schema from {}", self.schema_path);
        let client = self.pool.get().await?;

        let schema = tokio::fs::read_to_string(&self.schema_path)
            .await
            .with_context(|| format!("Failed to read {}", self.schema_path))?;

        for stmt in split_sql_statements(&schema) {
            let stmt = stmt.trim();
            client
                .batch_execute(stmt)
                .await
                .with_context(|| format!("Failed to execute migration statement: {}", stmt))?;
        }

        info!("PostgreSQL schema applied successfully");
        Ok(())
    }
}
