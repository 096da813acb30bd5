use async_trait::async_trait;
use log::error;
use tokio_postgres::types::ToSql;

use crate::db::models::{
    BondingCandidate, BondingUpdate, IndexerStatus, RouterTrade, ScanCheckpoint, TargetTokenRow,
    TokenDeployment, WalletLabel,
};
use crate::db::postgres::PostgresClient;
use crate::db::store::{BondingStore, CheckpointStore, DeploymentStore, TradeStore};
use crate::utils::u256_to_numeric;

/// Sanitize a string for PostgreSQL by removing null bytes (0x00)
/// which are invalid in UTF-8 text columns
fn sanitize_string(s: &str) -> String {
    s.replace('\0', "")
}

/// Build `($1, $2::TEXT::NUMERIC, ...), (...)` for a multi-row insert.
/// `casts[i]` is appended to the placeholder of column `i`.
fn values_clause(rows: usize, casts: &[&str]) -> String {
    let cols = casts.len();
    (0..rows)
        .map(|row| {
            let placeholders: Vec<String> = casts
                .iter()
                .enumerate()
                .map(|(col, cast)| format!("${}{}", row * cols + col + 1, cast))
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

const NUMERIC: &str = "::TEXT::NUMERIC";

impl PostgresClient {
    // ==================== CHECKPOINTS ====================

    pub async fn get_scan_checkpoints(&self) -> anyhow::Result<Vec<ScanCheckpoint>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT scanner, last_block, updated_at FROM arena.scan_checkpoints ORDER BY scanner",
                &[],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| ScanCheckpoint {
                scanner: r.get("scanner"),
                last_block: r.get::<_, i64>("last_block").max(0) as u64,
                updated_at: r.get("updated_at"),
            })
            .collect())
    }

    // ==================== TRADES ====================

    /// Batch insert router trades (multi-row VALUES). Existing
    /// `(tx_hash, log_index)` pairs are left untouched.
    pub async fn insert_router_trades(&self, trades: &[RouterTrade]) -> anyhow::Result<u64> {
        if trades.is_empty() {
            return Ok(0);
        }

        const CASTS: [&str; 12] = ["", "", "", "", "", "", "", "", "", NUMERIC, "", ""];
        const BATCH_SIZE: usize = 1000;

        let client = self.pool.get().await?;
        let mut inserted = 0;

        for chunk in trades.chunks(BATCH_SIZE) {
            let query = format!(
                r#"
                INSERT INTO arena.router_trades (
                    tx_hash, log_index, block_number, token_address, real_user,
                    counterparty, from_address, to_address, router_address,
                    amount, amount_adjusted, trade_type
                ) VALUES {}
                ON CONFLICT (tx_hash, log_index) DO NOTHING
                "#,
                values_clause(chunk.len(), &CASTS)
            );

            let numbers: Vec<(i64, i64, String)> = chunk
                .iter()
                .map(|t| {
                    (
                        t.log_index as i64,
                        t.block_number as i64,
                        u256_to_numeric(t.amount),
                    )
                })
                .collect();

            let mut params: Vec<&(dyn ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * CASTS.len());

            for (i, trade) in chunk.iter().enumerate() {
                params.push(&trade.tx_hash);
                params.push(&numbers[i].0);
                params.push(&numbers[i].1);
                params.push(&trade.token_address);
                params.push(&trade.real_user);
                params.push(&trade.counterparty);
                params.push(&trade.from_address);
                params.push(&trade.to_address);
                params.push(&trade.router_address);
                params.push(&numbers[i].2);
                params.push(&trade.amount_adjusted);
                params.push(&trade.side);
            }

            inserted += client.execute(&query, &params).await.map_err(|e| {
                error!("Failed to batch insert {} router trades: {:?}", chunk.len(), e);
                e
            })?;
        }

        Ok(inserted)
    }

    /// Recompute router buy/sell counts and volume per deployment.
    /// Returns the number of deployments whose counters changed.
    pub async fn refresh_trade_stats(&self) -> anyhow::Result<u64> {
        let client = self.pool.get().await?;
        let query = r#"
            UPDATE arena.token_deployments d SET
                router_buys = s.buys,
                router_sells = s.sells,
                router_volume = s.volume,
                updated_at = NOW()
            FROM (
                SELECT
                    token_address,
                    COUNT(*) FILTER (WHERE trade_type = 'BUY') AS buys,
                    COUNT(*) FILTER (WHERE trade_type = 'SELL') AS sells,
                    COALESCE(SUM(amount_adjusted), 0) AS volume
                FROM arena.router_trades
                GROUP BY token_address
            ) s
            WHERE d.token_address = s.token_address
              AND (d.router_buys, d.router_sells, d.router_volume)
                  IS DISTINCT FROM (s.buys, s.sells, s.volume)
        "#;

        Ok(client.execute(query, &[]).await?)
    }

    // ==================== DEPLOYMENTS ====================

    /// Batch insert deployments and update deployer statistics in one
    /// statement. Only rows actually inserted count toward the deployer.
    pub async fn insert_token_deployments(
        &self,
        deployments: &[TokenDeployment],
    ) -> anyhow::Result<u64> {
        if deployments.is_empty() {
            return Ok(0);
        }

        const CASTS: [&str; 12] = ["", NUMERIC, "", "", "", "", "", "", "", "", NUMERIC, ""];
        const BATCH_SIZE: usize = 500;

        let client = self.pool.get().await?;
        let mut inserted = 0;

        for chunk in deployments.chunks(BATCH_SIZE) {
            let query = format!(
                r#"
                WITH inserted AS (
                    INSERT INTO arena.token_deployments (
                        token_address, token_id, creator, deployer_wallet, tx_hash,
                        block_number, deployed_at, name, symbol, decimals,
                        total_supply, deployment_value
                    ) VALUES {}
                    ON CONFLICT DO NOTHING
                    RETURNING deployer_wallet, deployed_at
                ), per_wallet AS (
                    SELECT
                        deployer_wallet,
                        MIN(deployed_at) AS first_seen,
                        MAX(deployed_at) AS last_seen,
                        COUNT(*) AS deployments
                    FROM inserted
                    GROUP BY deployer_wallet
                ), wallets AS (
                    INSERT INTO arena.deployer_wallets AS w (
                        wallet_address, first_seen_at, total_deployments, last_deployment_at
                    )
                    SELECT deployer_wallet, first_seen, deployments, last_seen FROM per_wallet
                    ON CONFLICT (wallet_address) DO UPDATE SET
                        total_deployments = w.total_deployments + EXCLUDED.total_deployments,
                        first_seen_at = LEAST(w.first_seen_at, EXCLUDED.first_seen_at),
                        last_deployment_at = GREATEST(w.last_deployment_at, EXCLUDED.last_deployment_at)
                )
                SELECT COUNT(*) FROM inserted
                "#,
                values_clause(chunk.len(), &CASTS)
            );

            let owned: Vec<(String, i64, String, String, i16, String)> = chunk
                .iter()
                .map(|d| {
                    (
                        u256_to_numeric(d.token_id),
                        d.block_number as i64,
                        sanitize_string(&d.name),
                        sanitize_string(&d.symbol),
                        d.decimals as i16,
                        u256_to_numeric(d.total_supply),
                    )
                })
                .collect();

            let mut params: Vec<&(dyn ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * CASTS.len());

            for (i, deployment) in chunk.iter().enumerate() {
                params.push(&deployment.token_address);
                params.push(&owned[i].0);
                params.push(&deployment.creator);
                params.push(&deployment.deployer_wallet);
                params.push(&deployment.tx_hash);
                params.push(&owned[i].1);
                params.push(&deployment.deployed_at);
                params.push(&owned[i].2);
                params.push(&owned[i].3);
                params.push(&owned[i].4);
                params.push(&owned[i].5);
                params.push(&deployment.deployment_value);
            }

            let row = client.query_one(&query, &params).await.map_err(|e| {
                error!("Failed to batch insert {} deployments: {:?}", chunk.len(), e);
                e
            })?;
            inserted += row.get::<_, i64>(0).max(0) as u64;
        }

        Ok(inserted)
    }

    pub async fn get_target_tokens(&self) -> anyhow::Result<Vec<TargetTokenRow>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT token_address, decimals FROM arena.token_deployments",
                &[],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|r| TargetTokenRow {
                token_address: r.get("token_address"),
                decimals: r.get("decimals"),
            })
            .collect())
    }

    // ==================== BONDING ====================

    pub async fn get_bonding_candidates(
        &self,
        hours_back: i64,
    ) -> anyhow::Result<Vec<BondingCandidate>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT token_address, block_number
            FROM arena.token_deployments
            WHERE lp_deployed = FALSE
              AND bonding_error IS NULL
              AND deployed_at > NOW() - make_interval(hours => $1::INT)
            ORDER BY block_number ASC
        "#;

        let hours = hours_back.clamp(0, i32::MAX as i64) as i32;
        let rows = client.query(query, &[&hours]).await?;

        Ok(rows
            .iter()
            .map(|r| BondingCandidate {
                token_address: r.get("token_address"),
                block_number: r.get::<_, i64>("block_number").max(0) as u64,
            })
            .collect())
    }

    pub async fn set_bonded(&self, update: &BondingUpdate) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let query = r#"
            UPDATE arena.token_deployments SET
                lp_deployed = TRUE,
                pair_address = $2,
                bonded_at = $3,
                bonded_block_number = $4,
                bonding_error = $5,
                migration_status = 'MIGRATED',
                updated_at = NOW()
            WHERE token_address = $1 AND lp_deployed = FALSE
        "#;

        let bonded_block = update.bonded_block.map(|b| b as i64);
        let updated = client
            .execute(
                query,
                &[
                    &update.token_address,
                    &update.pair_address,
                    &update.bonded_at,
                    &bonded_block,
                    &update.bonding_error,
                ],
            )
            .await
            .map_err(|e| {
                error!("Failed to mark {} bonded: {:?}", update.token_address, e);
                e
            })?;

        Ok(updated > 0)
    }

    pub async fn set_bonding_error(
        &self,
        token_address: &str,
        message: &str,
    ) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        client
            .execute(
                r#"
                UPDATE arena.token_deployments
                SET bonding_error = $2, updated_at = NOW()
                WHERE token_address = $1
                "#,
                &[&token_address, &message],
            )
            .await?;
        Ok(())
    }

    // ==================== WALLET LABELS ====================

    /// Batch upsert wallet labels. Callers must de-duplicate addresses
    /// within one call.
    pub async fn upsert_wallet_labels(&self, labels: &[WalletLabel]) -> anyhow::Result<u64> {
        if labels.is_empty() {
            return Ok(0);
        }

        const CASTS: [&str; 5] = [""; 5];
        const BATCH_SIZE: usize = 1000;

        let client = self.pool.get().await?;
        let mut written = 0;

        for chunk in labels.chunks(BATCH_SIZE) {
            let query = format!(
                r#"
                INSERT INTO arena.wallet_labels (address, label, label_type, risk_level, tags)
                VALUES {}
                ON CONFLICT (address) DO UPDATE SET
                    label = EXCLUDED.label,
                    label_type = EXCLUDED.label_type,
                    risk_level = EXCLUDED.risk_level,
                    tags = EXCLUDED.tags,
                    updated_at = NOW()
                "#,
                values_clause(chunk.len(), &CASTS)
            );

            let mut params: Vec<&(dyn ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * CASTS.len());
            for label in chunk {
                params.push(&label.address);
                params.push(&label.label);
                params.push(&label.label_type);
                params.push(&label.risk_level);
                params.push(&label.tags);
            }

            written += client.execute(&query, &params).await.map_err(|e| {
                error!("Failed to upsert {} wallet labels: {:?}", chunk.len(), e);
                e
            })?;
        }

        Ok(written)
    }

    // ==================== STATUS ====================

    pub async fn get_status(&self) -> anyhow::Result<IndexerStatus> {
        let checkpoints = self.get_scan_checkpoints().await?;

        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                SELECT
                    (SELECT COUNT(*) FROM arena.token_deployments) AS deployments,
                    (SELECT COUNT(*) FROM arena.token_deployments WHERE lp_deployed) AS bonded,
                    (SELECT COUNT(*) FROM arena.deployer_wallets) AS deployer_wallets,
                    (SELECT COUNT(*) FROM arena.router_trades) AS router_trades,
                    (SELECT COUNT(*) FROM arena.wallet_labels) AS wallet_labels
                "#,
                &[],
            )
            .await?;

        Ok(IndexerStatus {
            checkpoints,
            deployments: row.get("deployments"),
            bonded: row.get("bonded"),
            deployer_wallets: row.get("deployer_wallets"),
            router_trades: row.get("router_trades"),
            wallet_labels: row.get("wallet_labels"),
        })
    }
}

#[async_trait]
impl CheckpointStore for PostgresClient {
    async fn get_checkpoint(&self, scanner: &str) -> anyhow::Result<Option<u64>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT last_block FROM arena.scan_checkpoints WHERE scanner = $1",
                &[&scanner],
            )
            .await?;

        Ok(row.map(|r| r.get::<_, i64>("last_block").max(0) as u64))
    }

    async fn set_checkpoint(&self, scanner: &str, block: u64) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO arena.scan_checkpoints AS c (scanner, last_block, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (scanner) DO UPDATE SET
                last_block = GREATEST(c.last_block, EXCLUDED.last_block),
                updated_at = NOW()
        "#;

        let block = block as i64;
        client
            .execute(query, &[&scanner, &block])
            .await
            .map_err(|e| {
                error!("Failed to save checkpoint {} at {}: {:?}", scanner, block, e);
                e
            })?;

        Ok(())
    }
}

#[async_trait]
impl TradeStore for PostgresClient {
    async fn load_target_tokens(&self) -> anyhow::Result<Vec<TargetTokenRow>> {
        self.get_target_tokens().await
    }

    async fn insert_trades(&self, trades: &[RouterTrade]) -> anyhow::Result<u64> {
        self.insert_router_trades(trades).await
    }
}

#[async_trait]
impl DeploymentStore for PostgresClient {
    async fn insert_deployments(&self, deployments: &[TokenDeployment]) -> anyhow::Result<u64> {
        self.insert_token_deployments(deployments).await
    }
}

#[async_trait]
impl BondingStore for PostgresClient {
    async fn bonding_candidates(&self, hours_back: i64) -> anyhow::Result<Vec<BondingCandidate>> {
        self.get_bonding_candidates(hours_back).await
    }

    async fn mark_bonded(&self, update: &BondingUpdate) -> anyhow::Result<bool> {
        self.set_bonded(update).await
    }

    async fn record_bonding_error(&self, token_address: &str, error: &str) -> anyhow::Result<()> {
        self.set_bonding_error(token_address, error).await
    }
}
