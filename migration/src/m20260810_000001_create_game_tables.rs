use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::Expr;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Mapped mining sites. Never hard-deleted, only disabled.
        manager
            .create_table(
                Table::create()
                    .table(Faucets::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Faucets::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Faucets::Name).string_len(128).not_null())
                    .col(ColumnDef::new(Faucets::Lat).double().not_null())
                    .col(ColumnDef::new(Faucets::Lng).double().not_null())
                    .col(
                        ColumnDef::new(Faucets::TotalCoins)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Faucets::RemainingCoins)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Faucets::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Faucets::Disabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Faucets::ContractAddress)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Faucets::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Faucets::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index for bounding-box discovery queries
        manager
            .create_index(
                Index::create()
                    .name("idx_faucets_position")
                    .table(Faucets::Table)
                    .col(Faucets::Lat)
                    .col(Faucets::Lng)
                    .to_owned(),
            )
            .await?;

        // Index for the active-faucet listing
        manager
            .create_index(
                Index::create()
                    .name("idx_faucets_active")
                    .table(Faucets::Table)
                    .col(Faucets::IsActive)
                    .to_owned(),
            )
            .await?;

        // Player accounts keyed by lowercased wallet address.
        manager
            .create_table(
                Table::create()
                    .table(Players::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Players::Address)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Players::TotalCollected)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Players::TotalMines)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Players::FirstConnectedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Players::LastSeenAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_players_total_collected")
                    .table(Players::Table)
                    .col(Players::TotalCollected)
                    .to_owned(),
            )
            .await?;

        // Accrued-but-unclaimed value per (faucet, player).
        manager
            .create_table(
                Table::create()
                    .table(PendingClaims::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PendingClaims::FaucetId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PendingClaims::UserAddress)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PendingClaims::PendingAmount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PendingClaims::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk_pending_claims")
                            .col(PendingClaims::FaucetId)
                            .col(PendingClaims::UserAddress),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_pending_claims_faucet")
                            .from(PendingClaims::Table, PendingClaims::FaucetId)
                            .to(Faucets::Table, Faucets::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pending_claims_user")
                    .table(PendingClaims::Table)
                    .col(PendingClaims::UserAddress)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PendingClaims::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Players::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Faucets::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Faucets {
    Table,
    Id,
    Name,
    Lat,
    Lng,
    TotalCoins,
    RemainingCoins,
    IsActive,
    Disabled,
    ContractAddress,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Players {
    Table,
    Address,
    TotalCollected,
    TotalMines,
    FirstConnectedAt,
    LastSeenAt,
}

#[derive(DeriveIden)]
enum PendingClaims {
    Table,
    FaucetId,
    UserAddress,
    PendingAmount,
    UpdatedAt,
}
