use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "pending_claims")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub faucet_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_address: String,
    /// Accrued-but-unclaimed value in base units; only grows between clears
    pub pending_amount: i64,
    pub updated_at: DateTimeWithTimeZone,
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
