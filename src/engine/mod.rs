//! Mine/claim reconciliation engine.
//!
//! The engine owns the claim lifecycle for every `(faucet, player)` pair:
//! admission of mine grants against the local supply mirror, settlement of
//! accrued value against the external ledger, and the bookkeeping that keeps
//! the two honest about each other. Admission is optimistic and local;
//! settlement is pessimistic and keyed by a server-generated claim reference
//! so that a lost response never orphans real value. One engine instance is
//! shared by the HTTP handlers and the background worker.

use std::sync::Arc;

use chrono::Utc;
use jsonrpsee::core::ClientError;
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, QueryFilter, QuerySelect, Select, TransactionTrait,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{ChainConfig, GameConfig};
use crate::entities::claim_settlement::{
    self, STATUS_REJECTED, STATUS_SETTLED, STATUS_SUBMITTED,
};
use crate::entities::faucet;
use crate::entities::player;
use crate::geo;
use crate::ledger::{pending, supply};
use crate::rpc::{
    ClaimOutcome, ContractBinding, OUTCOME_CONFIRMED, OUTCOME_PENDING, OUTCOME_REJECTED, RpcClient,
};
use crate::state::ApiCache;
use crate::wallet::{format_mon, sanitize_contract_address, sanitize_player_address};

const MAX_REASON_CHARS: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),
    #[error("{0}")]
    Validation(String),
    #[error("faucet {0} does not exist")]
    FaucetNotFound(i64),
    #[error("admission denied: {0}")]
    AdmissionDenied(String),
    #[error("external ledger unavailable: {0}")]
    LedgerUnavailable(String),
    #[error("claim rejected by the external ledger: {0}")]
    ClaimRejected(String),
    #[error(
        "settlement outcome unknown for claim {claim_ref}; pending value is untouched and the claim will be resolved in the background"
    )]
    SettlementUnknown { claim_ref: String },
}

/// Successful mine admission.
#[derive(Debug, Clone)]
pub struct MineGrant {
    pub pending_amount: u64,
}

/// Successful settlement of a claim.
#[derive(Debug, Clone)]
pub struct ClaimReceipt {
    pub claim_ref: String,
    pub tx_hash: Option<String>,
    pub claimed_amount: u64,
    pub remaining_coins: i64,
    pub total_collected: u64,
    pub total_mines: u64,
}

/// Result of a supply sync against ground truth.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub remaining_coins: i64,
    pub total_coins: i64,
    pub contract_balance: u64,
    pub is_active: bool,
}

/// What one re-poll of an unresolved settlement produced.
#[derive(Debug)]
pub enum SettlementResolution {
    Settled(ClaimReceipt),
    Rejected,
    StillPending,
}

#[derive(Clone)]
pub struct Engine {
    database: Arc<DatabaseConnection>,
    rpc: RpcClient,
    cache: Arc<ApiCache>,
    game: GameConfig,
    chain: ChainConfig,
}

impl Engine {
    pub fn new(
        database: Arc<DatabaseConnection>,
        rpc: RpcClient,
        cache: Arc<ApiCache>,
        game: GameConfig,
        chain: ChainConfig,
    ) -> Self {
        assert!(
            game.default_mine_unit_value > 0,
            "Default mine unit must be positive"
        );
        assert!(!chain.rpc_url.is_empty(), "Ledger RPC URL must be provided");
        Self {
            database,
            rpc,
            cache,
            game,
            chain,
        }
    }

    pub fn game(&self) -> &GameConfig {
        &self.game
    }

    /// Admit a mine grant and atomically add it to the pending ledger.
    ///
    /// Checks run in order: input shape, faucet existence and binding,
    /// admissibility, geofence, supply cover. Each denial names its reason.
    pub async fn mine(
        &self,
        faucet_id: i64,
        user_address: &str,
        amount: u64,
        player_lat: f64,
        player_lng: f64,
    ) -> Result<MineGrant, EngineError> {
        let account = sanitize_player_address(user_address)
            .map_err(|err| EngineError::Validation(err.to_string()))?;
        if amount == 0 {
            return Err(EngineError::Validation(
                "mine amount must be positive".to_string(),
            ));
        }
        if amount > self.game.max_mine_amount {
            return Err(EngineError::Validation(format!(
                "mine amount exceeds the {} per-grant limit",
                format_mon(self.game.max_mine_amount)
            )));
        }
        if !geo::valid_coordinates(player_lat, player_lng) {
            return Err(EngineError::Validation(
                "player coordinates are out of range".to_string(),
            ));
        }

        let site = self.load_faucet(faucet_id).await?;
        let binding = self.binding_for(&site).ok_or_else(|| {
            EngineError::AdmissionDenied(format!(
                "faucet '{}' has no funded contract binding",
                site.name
            ))
        })?;
        if site.disabled {
            return Err(EngineError::AdmissionDenied(format!(
                "faucet '{}' is disabled",
                site.name
            )));
        }
        if site.remaining_coins <= 0 {
            return Err(EngineError::AdmissionDenied(format!(
                "faucet '{}' has exhausted its supply",
                site.name
            )));
        }

        let radius = self.game.mining_radius_meters;
        if !geo::within_radius(player_lat, player_lng, site.lat, site.lng, radius) {
            let distance = geo::haversine_distance_meters(player_lat, player_lng, site.lat, site.lng);
            let shown = if distance.is_finite() {
                format!("{distance:.1}m")
            } else {
                "an unmeasurable distance".to_string()
            };
            return Err(EngineError::AdmissionDenied(format!(
                "player is {shown} from '{}', outside the {radius:.0}m mining radius",
                site.name
            )));
        }

        let unit = self.mine_unit_value(&binding).await;
        let already_pending = pending::read_amount(self.database.as_ref(), site.id, &account).await?;
        let capacity = supply_capacity(site.remaining_coins, unit);
        if !grant_covered(capacity, already_pending, amount) {
            let external = match self.rpc.read_balance(&binding).await {
                Ok(balance) => format_mon(balance),
                Err(_) => "unavailable".to_string(),
            };
            return Err(EngineError::AdmissionDenied(format!(
                "supply cannot cover the grant: {} pending + {} requested exceeds {} coverable \
                 ({} coins at {} each); external balance {}",
                format_mon(already_pending),
                format_mon(amount),
                format_mon(capacity),
                site.remaining_coins,
                format_mon(unit),
                external
            )));
        }

        let new_pending =
            pending::increment(self.database.as_ref(), site.id, &account, amount).await?;
        info!(
            "Mine grant: {} for {} at faucet {} (pending {})",
            format_mon(amount),
            account,
            site.id,
            format_mon(new_pending)
        );
        Ok(MineGrant {
            pending_amount: new_pending,
        })
    }

    /// Current pending amount for one `(faucet, player)` pair.
    pub async fn pending(&self, faucet_id: i64, user_address: &str) -> Result<u64, EngineError> {
        let account = sanitize_player_address(user_address)
            .map_err(|err| EngineError::Validation(err.to_string()))?;
        let site = self.load_faucet(faucet_id).await?;
        Ok(pending::read_amount(self.database.as_ref(), site.id, &account).await?)
    }

    /// Abandon accrued value. Idempotent; clearing nothing succeeds.
    pub async fn clear_pending(
        &self,
        faucet_id: i64,
        user_address: &str,
    ) -> Result<(), EngineError> {
        let account = sanitize_player_address(user_address)
            .map_err(|err| EngineError::Validation(err.to_string()))?;
        if faucet_id <= 0 {
            return Err(EngineError::Validation(
                "faucet id must be positive".to_string(),
            ));
        }
        pending::clear(self.database.as_ref(), faucet_id, &account).await?;
        info!("Pending cleared for {account} at faucet {faucet_id}");
        Ok(())
    }

    /// Settle the pending balance against the external ledger.
    ///
    /// The caller's amount is advisory; the freshly-read pending balance is
    /// what gets submitted. A zero pending balance is rejected before any
    /// external write.
    pub async fn claim(
        &self,
        faucet_id: i64,
        user_address: &str,
        declared_amount: u64,
    ) -> Result<ClaimReceipt, EngineError> {
        let account = sanitize_player_address(user_address)
            .map_err(|err| EngineError::Validation(err.to_string()))?;
        if declared_amount == 0 {
            return Err(EngineError::Validation(
                "claim amount must be positive".to_string(),
            ));
        }

        let site = self.load_faucet(faucet_id).await?;
        let binding = self.binding_for(&site).ok_or_else(|| {
            EngineError::AdmissionDenied(format!(
                "faucet '{}' has no funded contract binding",
                site.name
            ))
        })?;

        let amount = pending::read_amount(self.database.as_ref(), site.id, &account).await?;
        if amount == 0 {
            return Err(EngineError::Validation(
                "no pending balance to claim".to_string(),
            ));
        }
        if declared_amount != amount {
            warn!(
                "Claim for {account} at faucet {} declared {} but {} is pending; settling the pending amount",
                site.id,
                format_mon(declared_amount),
                format_mon(amount)
            );
        }

        if site.disabled {
            return Err(EngineError::AdmissionDenied(format!(
                "faucet '{}' is disabled",
                site.name
            )));
        }
        let unit = self.mine_unit_value(&binding).await;
        if supply_capacity(site.remaining_coins, unit) < amount {
            return Err(EngineError::AdmissionDenied(format!(
                "supply no longer covers the pending {}; sync faucet '{}' and retry",
                format_mon(amount),
                site.name
            )));
        }

        match self.rpc.read_cooldown(&binding, &account).await {
            Ok(cooldown) if !cooldown.can_claim => {
                return Err(EngineError::AdmissionDenied(format!(
                    "claim cooldown active; retry in {}s",
                    cooldown.seconds_remaining
                )));
            }
            Ok(_) => {}
            Err(err) => {
                // The ledger enforces its own cooldown at settlement.
                warn!("Cooldown read failed for {account}: {err}");
            }
        }

        let claim_ref = Uuid::new_v4().to_string();
        self.record_submission(&claim_ref, site.id, &account, amount)
            .await?;

        let submitted = match self
            .rpc
            .submit_claim(&binding, &account, amount, &claim_ref)
            .await
        {
            Ok(submitted) => submitted,
            Err(err) => return self.handle_submit_failure(claim_ref, err).await,
        };
        self.record_tx_hash(&claim_ref, &submitted.tx_hash).await;

        let outcome = match self
            .rpc
            .await_confirmation(
                &claim_ref,
                self.chain.confirmation_poll(),
                self.chain.confirmation_timeout(),
            )
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("Confirmation polling failed for claim {claim_ref}: {err}");
                return Err(EngineError::SettlementUnknown { claim_ref });
            }
        };

        self.apply_outcome(&claim_ref, &binding, outcome).await
    }

    /// Recompute a faucet's supply from ground truth on explicit request.
    /// Unlike the mine path there is no degradation here: an unreachable
    /// ledger fails the sync and mutates nothing.
    pub async fn force_sync(
        &self,
        faucet_id: i64,
        contract_address: &str,
    ) -> Result<SyncReport, EngineError> {
        let submitted = sanitize_contract_address(contract_address)
            .map_err(|err| EngineError::Validation(err.to_string()))?;
        let site = self.load_faucet(faucet_id).await?;
        let binding = self.binding_for(&site).ok_or_else(|| {
            EngineError::Validation(format!(
                "faucet '{}' has no contract binding to sync against",
                site.name
            ))
        })?;
        if !binding.address().eq_ignore_ascii_case(&submitted) {
            return Err(EngineError::Validation(format!(
                "contract address does not match the one registered for faucet '{}'",
                site.name
            )));
        }
        self.sync_with_binding(&site, &binding).await
    }

    /// Re-sync one faucet if it has a binding. Used by the background worker.
    pub async fn sync_faucet_supply(
        &self,
        site: &faucet::Model,
    ) -> Result<Option<SyncReport>, EngineError> {
        match self.binding_for(site) {
            Some(binding) => self.sync_with_binding(site, &binding).await.map(Some),
            None => Ok(None),
        }
    }

    /// Poll one unresolved settlement once and apply whatever the ledger
    /// reports, exactly as the inline claim path would have.
    pub async fn resolve_settlement(
        &self,
        row: &claim_settlement::Model,
    ) -> Result<SettlementResolution, EngineError> {
        assert_eq!(
            row.status, STATUS_SUBMITTED,
            "Only submitted rows can be resolved"
        );
        let site = self.load_faucet(row.faucet_id).await?;
        let binding = self.binding_for(&site).ok_or_else(|| {
            EngineError::LedgerUnavailable(format!(
                "faucet {} lost its contract binding with a settlement in flight",
                site.id
            ))
        })?;

        let outcome = match self.rpc.claim_outcome(&row.claim_ref).await {
            Ok(outcome) => outcome,
            Err(err) => {
                // An error reply is an answer: the node is reachable but has
                // no verdict for this reference. Only transport silence means
                // the ledger is unavailable.
                if let Some(ClientError::Call(call)) = err.downcast_ref::<ClientError>() {
                    warn!(
                        "Outcome poll for claim {} answered with an error: {call}",
                        row.claim_ref
                    );
                    return Ok(SettlementResolution::StillPending);
                }
                return Err(EngineError::LedgerUnavailable(err.to_string()));
            }
        };
        match outcome.status.as_str() {
            OUTCOME_CONFIRMED => {
                let receipt = self
                    .settle_confirmed(&row.claim_ref, &binding, outcome.amount, outcome.tx_hash)
                    .await?;
                Ok(SettlementResolution::Settled(receipt))
            }
            OUTCOME_REJECTED => {
                let reason = outcome
                    .reason
                    .unwrap_or_else(|| "no reason reported".to_string());
                self.mark_rejected(&row.claim_ref, &reason).await?;
                Ok(SettlementResolution::Rejected)
            }
            status => {
                if status != OUTCOME_PENDING {
                    warn!(
                        "Unrecognized outcome status '{status}' for claim {}; treating as pending",
                        row.claim_ref
                    );
                }
                Ok(SettlementResolution::StillPending)
            }
        }
    }

    async fn apply_outcome(
        &self,
        claim_ref: &str,
        binding: &ContractBinding,
        outcome: ClaimOutcome,
    ) -> Result<ClaimReceipt, EngineError> {
        match outcome.status.as_str() {
            OUTCOME_CONFIRMED => {
                self.settle_confirmed(claim_ref, binding, outcome.amount, outcome.tx_hash)
                    .await
            }
            OUTCOME_REJECTED => {
                let reason = outcome
                    .reason
                    .unwrap_or_else(|| "no reason reported".to_string());
                self.mark_rejected(claim_ref, &reason).await?;
                Err(EngineError::ClaimRejected(reason))
            }
            status => {
                if status != OUTCOME_PENDING {
                    warn!("Unrecognized outcome status '{status}' for claim {claim_ref}");
                }
                Err(EngineError::SettlementUnknown {
                    claim_ref: claim_ref.to_string(),
                })
            }
        }
    }

    /// Idempotent settlement of a confirmed claim, keyed by `claim_ref`.
    ///
    /// Under a row lock: credit the player, clear pending, flip the row to
    /// settled, adjust supply. A row already settled commits nothing twice
    /// and reports the recorded receipt.
    async fn settle_confirmed(
        &self,
        claim_ref: &str,
        binding: &ContractBinding,
        reported_amount: Option<u64>,
        tx_hash: Option<String>,
    ) -> Result<ClaimReceipt, EngineError> {
        // Ground-truth figures are read before opening the transaction so the
        // row lock is never held across a network call.
        let fresh = match self.rpc.read_balance(binding).await {
            Ok(balance) => match self.rpc.read_mine_unit_value(binding).await {
                Ok(unit) => Some((balance, unit)),
                Err(err) => {
                    warn!("Post-settlement unit read failed for {claim_ref}: {err}");
                    None
                }
            },
            Err(err) => {
                warn!("Post-settlement balance read failed for {claim_ref}: {err}");
                None
            }
        };
        let fallback_unit = self.cached_or_default_unit(binding).await;

        let txn = self.database.begin().await?;
        let row = settlement_for_update(claim_ref)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                EngineError::Validation(format!("settlement record {claim_ref} does not exist"))
            })?;

        if row.status == STATUS_SETTLED {
            txn.commit().await?;
            return self.recorded_receipt(row).await;
        }

        let (amount, source) = resolve_settled_amount(reported_amount, row.requested_amount);
        match source {
            AmountSource::Reported => {}
            AmountSource::Snapshot => warn!(
                "Settlement {claim_ref} confirmed without a reported amount; crediting the {} submit snapshot",
                format_mon(amount)
            ),
            AmountSource::Zero => error!(
                "Settlement {claim_ref} confirmed with no usable amount; credited zero, manual reconciliation required"
            ),
        }

        let stats = credit_player(&txn, &row.user_address, amount).await?;
        pending::clear(&txn, row.faucet_id, &row.user_address).await?;

        let site = faucet_for_update(row.faucet_id)
            .one(&txn)
            .await?
            .ok_or(EngineError::FaucetNotFound(row.faucet_id))?;
        let updated_site = match fresh {
            Some((balance, unit)) => supply::apply_sync(&txn, &site, balance, unit).await?,
            None => {
                let coins = supply::coins_to_cover(amount, fallback_unit);
                supply::deduct_coins(&txn, &site, coins).await?
            }
        };

        let mut record = row.clone().into_active_model();
        record.status = Set(STATUS_SETTLED.to_string());
        record.settled_amount = Set(Some(amount as i64));
        if tx_hash.is_some() {
            record.tx_hash = Set(tx_hash.clone());
        }
        record.settled_at = Set(Some(Utc::now().fixed_offset()));
        record.update(&txn).await?;
        txn.commit().await?;

        info!(
            "Claim {claim_ref} settled: {} to {} (faucet {} has {} coins left)",
            format_mon(amount),
            row.user_address,
            row.faucet_id,
            updated_site.remaining_coins
        );
        Ok(ClaimReceipt {
            claim_ref: row.claim_ref,
            tx_hash: tx_hash.or(row.tx_hash),
            claimed_amount: amount,
            remaining_coins: updated_site.remaining_coins,
            total_collected: stats.total_collected.max(0) as u64,
            total_mines: stats.total_mines.max(0) as u64,
        })
    }

    /// Receipt for a settlement that already happened.
    async fn recorded_receipt(
        &self,
        row: claim_settlement::Model,
    ) -> Result<ClaimReceipt, EngineError> {
        let site = self.load_faucet(row.faucet_id).await?;
        let found = player::Entity::find_by_id(row.user_address.clone())
            .one(self.database.as_ref())
            .await?;
        let (total_collected, total_mines) = found.map_or((0, 0), |p| {
            (p.total_collected.max(0) as u64, p.total_mines.max(0) as u64)
        });
        Ok(ClaimReceipt {
            claimed_amount: row.settled_amount.unwrap_or(0).max(0) as u64,
            claim_ref: row.claim_ref,
            tx_hash: row.tx_hash,
            remaining_coins: site.remaining_coins,
            total_collected,
            total_mines,
        })
    }

    async fn handle_submit_failure(
        &self,
        claim_ref: String,
        err: anyhow::Error,
    ) -> Result<ClaimReceipt, EngineError> {
        // A JSON-RPC error reply proves the node received and refused the
        // claim; anything else leaves the outcome unknown.
        if let Some(ClientError::Call(call)) = err.downcast_ref::<ClientError>() {
            let reason = call.to_string();
            self.mark_rejected(&claim_ref, &reason).await?;
            return Err(EngineError::ClaimRejected(reason));
        }
        warn!("Claim submit unacknowledged for {claim_ref}: {err}");
        Err(EngineError::SettlementUnknown { claim_ref })
    }

    /// Flip a settlement row to rejected. Pending stays untouched so the
    /// player can retry.
    async fn mark_rejected(&self, claim_ref: &str, reason: &str) -> Result<(), EngineError> {
        let row = claim_settlement::Entity::find()
            .filter(claim_settlement::Column::ClaimRef.eq(claim_ref))
            .one(self.database.as_ref())
            .await?;
        let Some(row) = row else {
            warn!("Rejection reported for unknown settlement {claim_ref}");
            return Ok(());
        };
        if row.status == STATUS_SETTLED {
            warn!("Rejection reported for already settled claim {claim_ref}; keeping the settlement");
            return Ok(());
        }

        let mut record = row.into_active_model();
        record.status = Set(STATUS_REJECTED.to_string());
        record.reason = Set(Some(reason.chars().take(MAX_REASON_CHARS).collect()));
        record.update(self.database.as_ref()).await?;
        info!("Claim {claim_ref} rejected by the ledger: {reason}");
        Ok(())
    }

    async fn record_submission(
        &self,
        claim_ref: &str,
        faucet_id: i64,
        account: &str,
        amount: u64,
    ) -> Result<(), EngineError> {
        assert!(amount > 0, "Submission amount must be positive");
        assert!(
            amount <= i64::MAX as u64,
            "Submission amount exceeds storage bounds"
        );
        let record = claim_settlement::ActiveModel {
            id: sea_orm::ActiveValue::NotSet,
            claim_ref: Set(claim_ref.to_string()),
            tx_hash: Set(None),
            faucet_id: Set(faucet_id),
            user_address: Set(account.to_string()),
            requested_amount: Set(amount as i64),
            settled_amount: Set(None),
            status: Set(STATUS_SUBMITTED.to_string()),
            reason: Set(None),
            poll_attempts: Set(0),
            created_at: Set(Utc::now().fixed_offset()),
            settled_at: Set(None),
        };
        claim_settlement::Entity::insert(record)
            .exec(self.database.as_ref())
            .await?;
        Ok(())
    }

    /// Best effort: the row is still resolvable by claim_ref without it.
    async fn record_tx_hash(&self, claim_ref: &str, tx_hash: &str) {
        let result = claim_settlement::Entity::update_many()
            .col_expr(claim_settlement::Column::TxHash, Expr::value(tx_hash))
            .filter(claim_settlement::Column::ClaimRef.eq(claim_ref))
            .exec(self.database.as_ref())
            .await;
        if let Err(err) = result {
            warn!("Failed to record tx hash for {claim_ref}: {err}");
        }
    }

    async fn sync_with_binding(
        &self,
        site: &faucet::Model,
        binding: &ContractBinding,
    ) -> Result<SyncReport, EngineError> {
        let balance = self
            .rpc
            .read_balance(binding)
            .await
            .map_err(|err| EngineError::LedgerUnavailable(err.to_string()))?;
        let unit = self
            .rpc
            .read_mine_unit_value(binding)
            .await
            .map_err(|err| EngineError::LedgerUnavailable(err.to_string()))?;
        self.cache.unit_values.insert(binding.cache_key(), unit).await;

        let updated = supply::apply_sync(self.database.as_ref(), site, balance, unit).await?;
        info!(
            "Supply sync for faucet {}: {} -> {} coins (balance {})",
            site.id,
            site.remaining_coins,
            updated.remaining_coins,
            format_mon(balance)
        );
        Ok(SyncReport {
            remaining_coins: updated.remaining_coins,
            total_coins: updated.total_coins,
            contract_balance: balance,
            is_active: updated.is_active,
        })
    }

    async fn load_faucet(&self, faucet_id: i64) -> Result<faucet::Model, EngineError> {
        if faucet_id <= 0 {
            return Err(EngineError::Validation(
                "faucet id must be positive".to_string(),
            ));
        }
        faucet::Entity::find_by_id(faucet_id)
            .one(self.database.as_ref())
            .await?
            .ok_or(EngineError::FaucetNotFound(faucet_id))
    }

    fn binding_for(&self, site: &faucet::Model) -> Option<ContractBinding> {
        if let Some(address) = &site.contract_address {
            return Some(ContractBinding::Direct {
                contract_address: address.clone(),
            });
        }
        self.chain
            .manager_address
            .as_ref()
            .map(|manager| ContractBinding::Managed {
                manager_address: manager.clone(),
                faucet_key: site.id.to_string(),
            })
    }

    /// Unit value with graceful degradation: live read, else last cached
    /// value, else the configured default. Admission never hard-fails on a
    /// unit read alone.
    async fn mine_unit_value(&self, binding: &ContractBinding) -> u64 {
        let key = binding.cache_key();
        match self.rpc.read_mine_unit_value(binding).await {
            Ok(unit) => {
                self.cache.unit_values.insert(key, unit).await;
                unit
            }
            Err(err) => match self.cache.unit_values.get(&key).await {
                Some(cached) => {
                    warn!("Mine unit read failed for {key}; using the cached value: {err}");
                    cached
                }
                None => {
                    warn!("Mine unit read failed for {key}; using the configured default: {err}");
                    self.game.default_mine_unit_value
                }
            },
        }
    }

    async fn cached_or_default_unit(&self, binding: &ContractBinding) -> u64 {
        self.cache
            .unit_values
            .get(&binding.cache_key())
            .await
            .unwrap_or(self.game.default_mine_unit_value)
    }
}

/// Base units the remaining supply can still settle.
fn supply_capacity(remaining_coins: i64, unit: u64) -> u64 {
    if remaining_coins <= 0 {
        return 0;
    }
    (remaining_coins as u64).saturating_mul(unit)
}

/// Whether an extra `delta` of pending value still fits under `capacity`.
fn grant_covered(capacity: u64, already_pending: u64, delta: u64) -> bool {
    match already_pending.checked_add(delta) {
        Some(required) => required <= capacity,
        None => false,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum AmountSource {
    Reported,
    Snapshot,
    Zero,
}

/// Pick the amount a confirmed settlement credits: the ledger-reported
/// figure when positive, else the submit-time snapshot, else zero. Never
/// invent value.
fn resolve_settled_amount(reported: Option<u64>, snapshot: i64) -> (u64, AmountSource) {
    if let Some(amount) = reported {
        if amount > 0 {
            return (amount, AmountSource::Reported);
        }
    }
    if snapshot > 0 {
        return (snapshot as u64, AmountSource::Snapshot);
    }
    (0, AmountSource::Zero)
}

/// Exclusive-locked settlement read. The idempotence check and the flip to
/// `settled` must happen under the same lock.
fn settlement_for_update(claim_ref: &str) -> Select<claim_settlement::Entity> {
    claim_settlement::Entity::find()
        .filter(claim_settlement::Column::ClaimRef.eq(claim_ref))
        .lock_exclusive()
}

/// Exclusive-locked faucet read. The deduct fallback is read-modify-write on
/// this row, so concurrent settlements must serialize on it.
fn faucet_for_update(faucet_id: i64) -> Select<faucet::Entity> {
    faucet::Entity::find_by_id(faucet_id).lock_exclusive()
}

/// Atomically add a settled amount to the player's lifetime totals,
/// creating the account on first settlement.
async fn credit_player<C>(db: &C, address: &str, amount: u64) -> Result<player::Model, DbErr>
where
    C: ConnectionTrait,
{
    assert!(!address.is_empty(), "Player address cannot be empty");
    assert!(
        amount <= i64::MAX as u64,
        "Credit amount exceeds storage bounds"
    );

    let now = Utc::now().fixed_offset();
    let record = player::ActiveModel {
        address: Set(address.to_string()),
        total_collected: Set(amount as i64),
        total_mines: Set(1),
        first_connected_at: Set(now),
        last_seen_at: Set(now),
    };
    player::Entity::insert(record)
        .on_conflict(
            OnConflict::column(player::Column::Address)
                .value(
                    player::Column::TotalCollected,
                    Expr::col(player::Column::TotalCollected).add(amount as i64),
                )
                .value(
                    player::Column::TotalMines,
                    Expr::col(player::Column::TotalMines).add(1),
                )
                .value(player::Column::LastSeenAt, now)
                .to_owned(),
        )
        .exec_with_returning(db)
        .await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use jsonrpsee::types::ErrorObject;
    use sea_orm::{DbBackend, MockDatabase, QueryTrait};

    use super::*;
    use crate::config::CacheConfig;

    fn test_engine(database: Arc<DatabaseConnection>) -> Engine {
        let rpc = RpcClient::new("http://127.0.0.1:1", Duration::from_millis(200))
            .expect("test client must build");
        let cache = Arc::new(ApiCache::new(&CacheConfig {
            leaderboards_max_capacity: 16,
            leaderboards_ttl_seconds: 5,
            activity_max_capacity: 16,
            activity_ttl_seconds: 5,
            unit_values_max_capacity: 16,
            unit_values_ttl_seconds: 5,
        }));
        let game = GameConfig {
            mining_radius_meters: 50.0,
            default_mine_unit_value: 10_000_000,
            max_mine_amount: 1_000_000_000,
            default_faucet_coins: 100,
        };
        let chain = ChainConfig {
            rpc_url: "http://127.0.0.1:1".to_string(),
            request_timeout_ms: Some(200),
            manager_address: None,
            confirmation_timeout_ms: Some(1_000),
            confirmation_poll_ms: Some(100),
        };
        Engine::new(database, rpc, cache, game, chain)
    }

    #[test]
    fn capacity_is_remaining_times_unit() {
        assert_eq!(supply_capacity(1, 10_000_000), 10_000_000);
        assert_eq!(supply_capacity(5, 10_000_000), 50_000_000);
        assert_eq!(supply_capacity(0, 10_000_000), 0);
        assert_eq!(supply_capacity(-3, 10_000_000), 0);
        assert_eq!(supply_capacity(i64::MAX, u64::MAX), u64::MAX);
    }

    #[test]
    fn grants_never_exceed_coverable_supply() {
        // One coin left at 0.01 MON: 0.005 pending admits another 0.005
        // exactly, but not 0.01 more.
        let capacity = supply_capacity(1, 10_000_000);
        assert!(grant_covered(capacity, 5_000_000, 5_000_000));
        assert!(!grant_covered(capacity, 5_000_000, 10_000_000));
        assert!(grant_covered(capacity, 0, 10_000_000));
        assert!(!grant_covered(capacity, 10_000_000, 1));
    }

    #[test]
    fn grant_cover_rejects_overflow() {
        assert!(!grant_covered(u64::MAX, u64::MAX, 1));
        assert!(grant_covered(u64::MAX, u64::MAX - 1, 1));
    }

    #[test]
    fn settled_amount_prefers_ledger_report() {
        assert_eq!(
            resolve_settled_amount(Some(7_000_000), 10_000_000),
            (7_000_000, AmountSource::Reported)
        );
    }

    #[test]
    fn settled_amount_falls_back_to_snapshot() {
        assert_eq!(
            resolve_settled_amount(None, 10_000_000),
            (10_000_000, AmountSource::Snapshot)
        );
        assert_eq!(
            resolve_settled_amount(Some(0), 10_000_000),
            (10_000_000, AmountSource::Snapshot)
        );
    }

    #[test]
    fn settled_amount_never_invents_value() {
        assert_eq!(resolve_settled_amount(None, 0), (0, AmountSource::Zero));
        assert_eq!(resolve_settled_amount(Some(0), -5), (0, AmountSource::Zero));
    }

    #[test]
    fn submit_refusal_is_distinguishable_from_silence() {
        let refused = anyhow::Error::new(ClientError::Call(ErrorObject::owned(
            -32000,
            "cooldown active",
            None::<()>,
        )));
        assert!(matches!(
            refused.downcast_ref::<ClientError>(),
            Some(ClientError::Call(_))
        ));

        let silent = anyhow::Error::new(ClientError::RequestTimeout);
        assert!(!matches!(
            silent.downcast_ref::<ClientError>(),
            Some(ClientError::Call(_))
        ));
    }

    #[test]
    fn settlement_locks_both_rows_it_writes() {
        let claim = settlement_for_update("b0955323-bd6a-4f61-870a-64c9e34f21cf")
            .build(DbBackend::Postgres)
            .to_string();
        assert!(
            claim.contains(r#"FROM "claim_settlements""#),
            "Lock must target the settlement row: {claim}"
        );
        assert!(
            claim.contains("FOR UPDATE"),
            "Settlement read must take a row lock: {claim}"
        );

        let site = faucet_for_update(3).build(DbBackend::Postgres).to_string();
        assert!(
            site.contains(r#"FROM "faucets""#),
            "Lock must target the faucet row: {site}"
        );
        assert!(
            site.contains("FOR UPDATE"),
            "Faucet read must take a row lock: {site}"
        );
    }

    #[tokio::test]
    async fn resettling_a_settled_claim_credits_nothing() {
        let now = Utc::now().fixed_offset();
        let recorded = claim_settlement::Model {
            id: 11,
            claim_ref: "b0955323-bd6a-4f61-870a-64c9e34f21cf".to_string(),
            tx_hash: Some("0x5e11".to_string()),
            faucet_id: 3,
            user_address: "0x8c6f2d4e9a1b0c3d5e7f8a9b0c1d2e3f4a5b6c7d".to_string(),
            requested_amount: 30_000_000,
            settled_amount: Some(30_000_000),
            status: STATUS_SETTLED.to_string(),
            reason: None,
            poll_attempts: 0,
            created_at: now,
            settled_at: Some(now),
        };
        let site = faucet::Model {
            id: 3,
            name: "Fountain Plaza".to_string(),
            lat: 40.4168,
            lng: -3.7038,
            total_coins: 100,
            remaining_coins: 97,
            is_active: true,
            disabled: false,
            contract_address: Some("0x52f8b1d04f11e1bef9cd8a3b9d1e60d6c93b2a41".to_string()),
            created_at: now,
            updated_at: now,
        };
        let miner = player::Model {
            address: recorded.user_address.clone(),
            total_collected: 30_000_000,
            total_mines: 3,
            first_connected_at: now,
            last_seen_at: now,
        };

        let db = Arc::new(
            MockDatabase::new(DbBackend::Postgres)
                .append_query_results([vec![recorded.clone()]])
                .append_query_results([vec![site]])
                .append_query_results([vec![miner]])
                .into_connection(),
        );
        let engine = test_engine(db.clone());
        let binding = ContractBinding::Direct {
            contract_address: "0x52f8b1d04f11e1bef9cd8a3b9d1e60d6c93b2a41".to_string(),
        };

        // A late confirmed report for an already settled claim, carrying a
        // different amount and hash than the recorded settlement.
        let receipt = engine
            .settle_confirmed(
                &recorded.claim_ref,
                &binding,
                Some(99_000_000),
                Some("0x9a55".to_string()),
            )
            .await
            .expect("a settled claim must resolve to its recorded receipt");

        assert_eq!(
            receipt.claimed_amount, 30_000_000,
            "Receipt must echo the recorded settled amount, not the late report"
        );
        assert_eq!(
            receipt.tx_hash.as_deref(),
            Some("0x5e11"),
            "Receipt must carry the recorded transaction hash"
        );
        assert_eq!(
            receipt.remaining_coins, 97,
            "Supply must stay untouched on a repeat settlement"
        );
        assert_eq!(receipt.total_mines, 3, "Stats must come from the stored row");

        drop(engine);
        let issued = format!(
            "{:?}",
            Arc::try_unwrap(db)
                .expect("the engine held the only other connection handle")
                .into_transaction_log()
        );
        assert!(
            !issued.contains(r#"sql: "INSERT"#),
            "A settled claim must not credit the player again: {issued}"
        );
        assert!(
            !issued.contains(r#"sql: "UPDATE"#),
            "A settled claim must not be rewritten: {issued}"
        );
        assert!(
            !issued.contains(r#"sql: "DELETE"#),
            "A settled claim must not clear pending again: {issued}"
        );
    }
}
