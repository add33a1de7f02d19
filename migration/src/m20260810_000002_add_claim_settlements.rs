use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::Expr;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Audit trail of every claim that reached the external ledger.
        // Rows in `submitted` are unresolved and get re-polled by the worker.
        manager
            .create_table(
                Table::create()
                    .table(ClaimSettlements::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ClaimSettlements::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ClaimSettlements::ClaimRef)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(ClaimSettlements::TxHash)
                            .string_len(128)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ClaimSettlements::FaucetId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClaimSettlements::UserAddress)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClaimSettlements::RequestedAmount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClaimSettlements::SettledAmount)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ClaimSettlements::Status)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ClaimSettlements::Reason)
                            .string_len(256)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ClaimSettlements::PollAttempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ClaimSettlements::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ClaimSettlements::SettledAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_claim_settlements_faucet")
                            .from(ClaimSettlements::Table, ClaimSettlements::FaucetId)
                            .to(Faucets::Table, Faucets::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Index for the worker's stale-settlement scan
        manager
            .create_index(
                Index::create()
                    .name("idx_claim_settlements_status_time")
                    .table(ClaimSettlements::Table)
                    .col(ClaimSettlements::Status)
                    .col(ClaimSettlements::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // Index for the activity feed
        manager
            .create_index(
                Index::create()
                    .name("idx_claim_settlements_settled_at")
                    .table(ClaimSettlements::Table)
                    .col(ClaimSettlements::SettledAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ClaimSettlements::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ClaimSettlements {
    Table,
    Id,
    ClaimRef,
    TxHash,
    FaucetId,
    UserAddress,
    RequestedAmount,
    SettledAmount,
    Status,
    Reason,
    PollAttempts,
    CreatedAt,
    SettledAt,
}

#[derive(DeriveIden)]
enum Faucets {
    Table,
    Id,
}
