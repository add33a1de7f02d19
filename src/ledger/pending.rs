//! Pending-claim ledger keyed by `(faucet_id, user_address)`.
//!
//! The increment is a single `INSERT .. ON CONFLICT .. DO UPDATE` statement,
//! so concurrent mines never lose an update and the returned total is the
//! post-increment value of exactly this statement.

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::ActiveValue::Set;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ConnectionTrait, DbErr, EntityTrait, Insert};

use crate::entities::pending_claim;

/// Current pending amount in base units; zero when no record exists.
pub async fn read_amount<C>(db: &C, faucet_id: i64, user_address: &str) -> Result<u64, DbErr>
where
    C: ConnectionTrait,
{
    assert!(faucet_id > 0, "Faucet id must be positive");
    assert!(!user_address.is_empty(), "User address cannot be empty");

    let record = pending_claim::Entity::find_by_id((faucet_id, user_address.to_string()))
        .one(db)
        .await?;
    Ok(record.map_or(0, |r| r.pending_amount.max(0) as u64))
}

/// Atomically add `delta` to the pending amount, creating the record when
/// absent, and return the new total.
pub async fn increment<C>(
    db: &C,
    faucet_id: i64,
    user_address: &str,
    delta: u64,
) -> Result<u64, DbErr>
where
    C: ConnectionTrait,
{
    assert!(faucet_id > 0, "Faucet id must be positive");
    assert!(!user_address.is_empty(), "User address cannot be empty");
    assert!(delta > 0, "Increment delta must be positive");
    assert!(
        delta <= i64::MAX as u64,
        "Increment delta exceeds storage bounds"
    );

    let updated = upsert_statement(faucet_id, user_address, delta, Utc::now().fixed_offset())
        .exec_with_returning(db)
        .await?;

    assert!(
        updated.pending_amount >= delta as i64,
        "Pending total regressed below the increment"
    );
    Ok(updated.pending_amount as u64)
}

/// The increment as one `INSERT .. ON CONFLICT .. DO UPDATE` statement. The
/// addition happens on the server against the stored column, never against a
/// value this process read earlier.
fn upsert_statement(
    faucet_id: i64,
    user_address: &str,
    delta: u64,
    now: DateTime<FixedOffset>,
) -> Insert<pending_claim::ActiveModel> {
    let record = pending_claim::ActiveModel {
        faucet_id: Set(faucet_id),
        user_address: Set(user_address.to_string()),
        pending_amount: Set(delta as i64),
        updated_at: Set(now),
    };
    pending_claim::Entity::insert(record).on_conflict(
        OnConflict::columns([
            pending_claim::Column::FaucetId,
            pending_claim::Column::UserAddress,
        ])
        .value(
            pending_claim::Column::PendingAmount,
            Expr::col(pending_claim::Column::PendingAmount).add(delta as i64),
        )
        .value(pending_claim::Column::UpdatedAt, now)
        .to_owned(),
    )
}

/// Idempotently delete the record; clearing an absent record succeeds.
pub async fn clear<C>(db: &C, faucet_id: i64, user_address: &str) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    assert!(faucet_id > 0, "Faucet id must be positive");
    assert!(!user_address.is_empty(), "User address cannot be empty");

    let result = pending_claim::Entity::delete_by_id((faucet_id, user_address.to_string()))
        .exec(db)
        .await?;
    assert!(
        result.rows_affected <= 1,
        "Pending clear touched multiple rows"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DbBackend, QueryTrait};

    #[test]
    fn increment_is_one_conflict_statement() {
        let now = Utc::now().fixed_offset();
        let sql = upsert_statement(
            7,
            "0x8c6f2d4e9a1b0c3d5e7f8a9b0c1d2e3f4a5b6c7d",
            10_000_000,
            now,
        )
        .build(DbBackend::Postgres)
        .to_string();

        assert!(
            sql.starts_with(r#"INSERT INTO "pending_claims""#),
            "Increment must insert the first grant: {sql}"
        );
        assert!(
            sql.contains(
                r#"ON CONFLICT ("faucet_id", "user_address") DO UPDATE SET "pending_amount" = "pending_amount" + 10000000"#
            ),
            "Increment must add to the stored column on conflict: {sql}"
        );
        assert!(
            sql.contains(r#""updated_at""#),
            "Conflict update must refresh the timestamp: {sql}"
        );
    }
}
