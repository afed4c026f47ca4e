use sea_orm_migration::prelude::*;

use super::m20250301_000001_create_subscribers::Subscribers;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(AuthorizedUsers::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(AuthorizedUsers::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(
            ColumnDef::new(AuthorizedUsers::TelegramId)
              .big_integer()
              .not_null()
              .unique_key(),
          )
          .col(
            ColumnDef::new(AuthorizedUsers::SubscriberId).integer().not_null(),
          )
          .col(
            ColumnDef::new(AuthorizedUsers::Authorized)
              .boolean()
              .not_null()
              .default(false),
          )
          .col(
            ColumnDef::new(AuthorizedUsers::AuthorizedAt)
              .date_time()
              .not_null(),
          )
          .foreign_key(
            ForeignKey::create()
              .name("fk_authorized_users_subscriber")
              .from(AuthorizedUsers::Table, AuthorizedUsers::SubscriberId)
              .to(Subscribers::Table, Subscribers::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_authorized_users_subscriber")
          .table(AuthorizedUsers::Table)
          .col(AuthorizedUsers::SubscriberId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(AuthorizedUsers::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum AuthorizedUsers {
  Table,
  Id,
  TelegramId,
  SubscriberId,
  Authorized,
  AuthorizedAt,
}
