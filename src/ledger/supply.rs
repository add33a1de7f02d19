//! Faucet supply accounting.
//!
//! `remaining_coins` is a local mirror of what the external ledger can still
//! settle, denominated in whole coins (1 coin = one mine unit). A sync from
//! ground truth always overwrites it; the local deduction path exists only
//! for the window where ground truth is unreachable.

use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DbErr, IntoActiveModel};

use crate::entities::faucet;

/// Coins coverable by `balance` at `unit` per coin, clamped to the funded
/// total. Floor semantics: a partial unit settles nothing.
pub fn recompute_remaining(balance: u64, unit: u64, total_coins: i64) -> i64 {
    assert!(unit > 0, "Mine unit value must be positive");
    let by_balance = (balance / unit).min(i64::MAX as u64) as i64;
    by_balance.clamp(0, total_coins.max(0))
}

/// Coins needed to cover `amount` at `unit` per coin. Ceiling semantics: a
/// partial unit still consumes a whole coin.
pub fn coins_to_cover(amount: u64, unit: u64) -> i64 {
    assert!(unit > 0, "Mine unit value must be positive");
    amount.div_ceil(unit).min(i64::MAX as u64) as i64
}

/// A faucet admits mining only while it has supply and nobody disabled it.
pub fn derive_active(remaining_coins: i64, disabled: bool) -> bool {
    remaining_coins > 0 && !disabled
}

/// Overwrite the supply mirror from a fresh ledger read.
pub async fn apply_sync<C>(
    db: &C,
    site: &faucet::Model,
    balance: u64,
    unit: u64,
) -> Result<faucet::Model, DbErr>
where
    C: ConnectionTrait,
{
    assert!(unit > 0, "Mine unit value must be positive");

    let remaining = recompute_remaining(balance, unit, site.total_coins);
    let active = derive_active(remaining, site.disabled);

    let mut record = site.clone().into_active_model();
    record.remaining_coins = Set(remaining);
    record.is_active = Set(active);
    record.updated_at = Set(Utc::now().fixed_offset());
    record.update(db).await
}

/// Subtract settled coins locally, floored at zero. The next successful sync
/// overwrites any drift this introduces.
pub async fn deduct_coins<C>(db: &C, site: &faucet::Model, coins: i64) -> Result<faucet::Model, DbErr>
where
    C: ConnectionTrait,
{
    assert!(coins >= 0, "Deduction cannot be negative");

    let remaining = site.remaining_coins.saturating_sub(coins).max(0);
    let active = derive_active(remaining, site.disabled);

    let mut record = site.clone().into_active_model();
    record.remaining_coins = Set(remaining);
    record.is_active = Set(active);
    record.updated_at = Set(Utc::now().fixed_offset());
    record.update(db).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_uses_floor() {
        // 0.05 MON of balance at 0.01 MON per coin covers exactly 5 coins.
        assert_eq!(recompute_remaining(50_000_000, 10_000_000, 100), 5);
        // A partial unit settles nothing.
        assert_eq!(recompute_remaining(9_999_999, 10_000_000, 100), 0);
        assert_eq!(recompute_remaining(19_999_999, 10_000_000, 100), 1);
        assert_eq!(recompute_remaining(0, 10_000_000, 100), 0);
    }

    #[test]
    fn remaining_clamps_to_funded_total() {
        assert_eq!(recompute_remaining(u64::MAX, 1, 10), 10);
        assert_eq!(recompute_remaining(50_000_000, 10_000_000, 3), 3);
        // Corrupt totals never produce a negative or inflated mirror.
        assert_eq!(recompute_remaining(50_000_000, 10_000_000, -5), 0);
    }

    #[test]
    fn cover_uses_ceiling() {
        assert_eq!(coins_to_cover(20_000_000, 10_000_000), 2);
        assert_eq!(coins_to_cover(20_000_001, 10_000_000), 3);
        assert_eq!(coins_to_cover(1, 10_000_000), 1);
        assert_eq!(coins_to_cover(0, 10_000_000), 0);
    }

    #[test]
    fn active_requires_supply_and_no_disable() {
        assert!(derive_active(1, false));
        assert!(!derive_active(0, false));
        assert!(!derive_active(5, true));
        assert!(!derive_active(-1, false));
    }
}
