//! Background reconciliation worker.
//!
//! Two duties share one timer: re-polling settlements whose outcome the
//! inline claim path never learned, and refreshing each faucet's local
//! supply mirror from the external ledger. A failed pass is logged and
//! retried on the next tick; only shutdown stops the loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::ColumnTrait;
use sea_orm::DatabaseConnection;
use sea_orm::EntityTrait;
use sea_orm::QueryFilter;
use sea_orm::QueryOrder;
use sea_orm::QuerySelect;
use sea_orm::Select;
use sea_orm::sea_query::Expr;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::engine::{Engine, SettlementResolution};
use crate::entities::claim_settlement::{self, STATUS_SUBMITTED};
use crate::entities::faucet;
use crate::wallet::format_mon;

pub struct SupplySyncWorker {
    database: Arc<DatabaseConnection>,
    engine: Engine,
    config: SyncConfig,
    last_sync_unix: Arc<AtomicU64>,
}

impl SupplySyncWorker {
    pub fn new(
        database: Arc<DatabaseConnection>,
        engine: Engine,
        config: SyncConfig,
        last_sync_unix: Arc<AtomicU64>,
    ) -> Self {
        assert!(config.batch_size > 0, "Sync batch size must be positive");
        assert!(
            Arc::strong_count(&last_sync_unix) >= 1,
            "Sync state must be shared"
        );
        Self {
            database,
            engine,
            config,
            last_sync_unix,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!("Starting supply sync loop");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    match changed {
                        Ok(_) => {
                            if *shutdown.borrow() {
                                info!("Supply sync shutdown signal received");
                                break;
                            }
                        }
                        Err(_) => {
                            warn!("Shutdown channel closed unexpectedly. Exiting sync loop");
                            break;
                        }
                    }
                }
                _ = sleep(self.config.poll_interval()) => {
                    if let Err(err) = self.tick().await {
                        warn!("Supply sync pass failed: {err:#}");
                    }
                }
            }
        }

        Ok(())
    }

    async fn tick(&self) -> Result<()> {
        self.resolve_stale_settlements().await?;
        self.refresh_supplies().await?;
        self.last_sync_unix
            .store(Utc::now().timestamp().max(0) as u64, AtomicOrdering::SeqCst);
        Ok(())
    }

    /// Re-poll `submitted` settlements past the grace window. Each row is
    /// either settled, marked rejected, or left for the next pass with one
    /// poll of its budget consumed.
    async fn resolve_stale_settlements(&self) -> Result<()> {
        let grace = chrono::Duration::from_std(self.config.settlement_grace())
            .context("Settlement grace out of range")?;
        let cutoff = Utc::now().fixed_offset() - grace;

        let stale = stale_settlement_scan(
            cutoff,
            self.config.settlement_max_polls,
            self.config.batch_size,
        )
        .all(self.database.as_ref())
        .await
        .context("Failed to scan unresolved settlements")?;
        if stale.is_empty() {
            return Ok(());
        }

        info!("Re-polling {} unresolved settlement(s)", stale.len());
        for row in &stale {
            match self.engine.resolve_settlement(row).await {
                Ok(SettlementResolution::Settled(receipt)) => {
                    info!(
                        "Recovered settlement {}: {} credited to {}",
                        row.claim_ref,
                        format_mon(receipt.claimed_amount),
                        row.user_address
                    );
                }
                Ok(SettlementResolution::Rejected) => {
                    info!("Settlement {} resolved as rejected", row.claim_ref);
                }
                Ok(SettlementResolution::StillPending) => {
                    debug!("Settlement {} still pending on the ledger", row.claim_ref);
                    self.count_poll_attempt(row).await?;
                }
                Err(err) => {
                    // An unreachable ledger charges no poll budget.
                    warn!("Could not resolve settlement {}: {err}", row.claim_ref);
                }
            }
        }
        Ok(())
    }

    /// Count a re-poll that produced no verdict. A row that reaches the poll
    /// cap is parked: it stays `submitted` but leaves the scan, so one
    /// unresolvable claim cannot occupy the batch forever.
    async fn count_poll_attempt(&self, row: &claim_settlement::Model) -> Result<()> {
        claim_settlement::Entity::update_many()
            .col_expr(
                claim_settlement::Column::PollAttempts,
                Expr::col(claim_settlement::Column::PollAttempts).add(1),
            )
            .filter(claim_settlement::Column::ClaimRef.eq(row.claim_ref.as_str()))
            .exec(self.database.as_ref())
            .await
            .context("Failed to count a settlement poll attempt")?;

        let attempts = row.poll_attempts.saturating_add(1);
        if attempts >= self.config.settlement_max_polls as i32 {
            warn!(
                "Settlement {} has no verdict after {attempts} polls; parking it for manual reconciliation",
                row.claim_ref
            );
        }
        Ok(())
    }

    /// Refresh supply mirrors for bound faucets. Syncing bumps `updated_at`,
    /// so ordering by it round-robins the fleet across passes.
    async fn refresh_supplies(&self) -> Result<()> {
        let sites = faucet::Entity::find()
            .filter(faucet::Column::Disabled.eq(false))
            .order_by_asc(faucet::Column::UpdatedAt)
            .limit(self.config.batch_size)
            .all(self.database.as_ref())
            .await
            .context("Failed to scan faucets for supply refresh")?;

        let mut refreshed = 0usize;
        for site in &sites {
            match self.engine.sync_faucet_supply(site).await {
                Ok(Some(report)) => {
                    refreshed += 1;
                    if !report.is_active {
                        debug!(
                            "Faucet {} inactive after refresh ({} coins left)",
                            site.id, report.remaining_coins
                        );
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    warn!("Supply refresh failed for faucet {}: {err}", site.id);
                }
            }
        }
        if refreshed > 0 {
            debug!("Refreshed supply for {refreshed} faucet(s)");
        }
        Ok(())
    }
}

/// Scan for `submitted` rows past the grace cutoff that still have poll
/// budget, oldest first.
fn stale_settlement_scan(
    cutoff: DateTime<FixedOffset>,
    max_polls: u32,
    batch: u64,
) -> Select<claim_settlement::Entity> {
    claim_settlement::Entity::find()
        .filter(claim_settlement::Column::Status.eq(STATUS_SUBMITTED))
        .filter(claim_settlement::Column::CreatedAt.lt(cutoff))
        .filter(claim_settlement::Column::PollAttempts.lt(max_polls as i32))
        .order_by_asc(claim_settlement::Column::CreatedAt)
        .limit(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, QueryTrait};

    #[test]
    fn stale_scan_skips_parked_rows() {
        let cutoff = Utc::now().fixed_offset();
        let sql = stale_settlement_scan(cutoff, 20, 32)
            .build(DbBackend::Postgres)
            .to_string();

        assert!(
            sql.contains(r#""status" = 'submitted'"#),
            "Scan must target unresolved rows: {sql}"
        );
        assert!(
            sql.contains(r#""poll_attempts" < 20"#),
            "Rows at the poll cap must leave the scan: {sql}"
        );
        assert!(
            sql.contains(r#"ORDER BY "claim_settlements"."created_at" ASC"#),
            "Oldest rows go first: {sql}"
        );
        assert!(sql.contains("LIMIT 32"), "Scan must be batched: {sql}");
    }
}
