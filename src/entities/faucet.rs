//! Faucet entity: a mapped mining site with a local supply mirror.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "faucets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name shown on the map
    #[sea_orm(column_type = "String(StringLen::N(128))")]
    pub name: String,
    /// Site latitude in degrees
    pub lat: f64,
    /// Site longitude in degrees
    pub lng: f64,
    /// Funded capacity in whole coins (1 coin = one mine unit)
    pub total_coins: i64,
    /// Local mirror of remaining capacity, overwritten by supply syncs
    pub remaining_coins: i64,
    /// Derived admission flag: `remaining_coins > 0 && !disabled`
    pub is_active: bool,
    /// Manual kill switch set by administrators; survives supply syncs
    pub disabled: bool,
    /// External-ledger contract backing this faucet, if funded
    #[sea_orm(column_type = "String(StringLen::N(64))", nullable)]
    pub contract_address: Option<String>,
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::pending_claim::Entity")]
    PendingClaim,
    #[sea_orm(has_many = "super::claim_settlement::Entity")]
    ClaimSettlement,
}

impl Related<super::pending_claim::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PendingClaim.def()
    }
}

impl Related<super::claim_settlement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ClaimSettlement.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
