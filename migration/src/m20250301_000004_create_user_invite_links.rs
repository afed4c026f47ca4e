use sea_orm_migration::prelude::*;

use super::m20250301_000002_create_channels::Channels;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(UserInviteLinks::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(UserInviteLinks::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(
            ColumnDef::new(UserInviteLinks::TelegramId).big_integer().not_null(),
          )
          .col(ColumnDef::new(UserInviteLinks::ChannelId).integer().not_null())
          .col(ColumnDef::new(UserInviteLinks::Link).text().not_null())
          .col(ColumnDef::new(UserInviteLinks::ExpireAt).date_time().not_null())
          .col(
            ColumnDef::new(UserInviteLinks::CreatedAt).date_time().not_null(),
          )
          .col(ColumnDef::new(UserInviteLinks::RevokedAt).date_time().null())
          .foreign_key(
            ForeignKey::create()
              .name("fk_user_invite_links_channel")
              .from(UserInviteLinks::Table, UserInviteLinks::ChannelId)
              .to(Channels::Table, Channels::Id)
              .on_delete(ForeignKeyAction::Cascade),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_user_invite_links_telegram")
          .table(UserInviteLinks::Table)
          .col(UserInviteLinks::TelegramId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(UserInviteLinks::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum UserInviteLinks {
  Table,
  Id,
  TelegramId,
  ChannelId,
  Link,
  ExpireAt,
  CreatedAt,
  RevokedAt,
}
