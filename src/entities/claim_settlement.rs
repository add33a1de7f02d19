//! Claim settlement audit record.
//!
//! One row per claim that reached the external ledger. Rows stay in
//! `submitted` until the outcome is known; the background worker re-polls
//! anything that outlives the grace period.

use sea_orm::entity::prelude::*;

/// Row states. Stored as plain strings so operators can query them directly.
pub const STATUS_SUBMITTED: &str = "submitted";
pub const STATUS_SETTLED: &str = "settled";
pub const STATUS_REJECTED: &str = "rejected";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "claim_settlements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Server-generated settlement identity, passed to the ledger on submit
    #[sea_orm(column_type = "String(StringLen::N(64))", unique)]
    pub claim_ref: String,
    /// Transaction hash returned by the ledger, absent if the response was lost
    #[sea_orm(column_type = "String(StringLen::N(128))", nullable)]
    pub tx_hash: Option<String>,
    pub faucet_id: i64,
    pub user_address: String,
    /// Pending snapshot at submit time, in base units
    pub requested_amount: i64,
    /// Amount actually credited once settled
    pub settled_amount: Option<i64>,
    #[sea_orm(column_type = "String(StringLen::N(16))")]
    pub status: String,
    /// Rejection reason reported by the ledger
    #[sea_orm(column_type = "String(StringLen::N(256))", nullable)]
    pub reason: Option<String>,
    /// Worker re-polls that produced no verdict; rows at the cap are parked
    pub poll_attempts: i32,
    pub created_at: DateTimeWithTimeZone,
    pub settled_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::faucet::Entity",
        from = "Column::FaucetId",
        to = "super::faucet::Column::Id"
    )]
    Faucet,
}

impl Related<super::faucet::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Faucet.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
