use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "players")]
pub struct Model {
    /// Lowercased wallet address
    #[sea_orm(primary_key, auto_increment = false)]
    pub address: String,
    /// Lifetime settled winnings in base units
    pub total_collected: i64,
    /// Count of settled claims
    pub total_mines: i64,
    pub first_connected_at: DateTimeWithTimeZone,
    pub last_seen_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
