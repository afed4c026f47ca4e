use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
  async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .create_table(
        Table::create()
          .table(AuthorizationLogs::Table)
          .if_not_exists()
          .col(
            ColumnDef::new(AuthorizationLogs::Id)
              .integer()
              .not_null()
              .auto_increment()
              .primary_key(),
          )
          .col(ColumnDef::new(AuthorizationLogs::TelegramId).big_integer().null())
          .col(ColumnDef::new(AuthorizationLogs::SubscriberId).integer().null())
          .col(ColumnDef::new(AuthorizationLogs::Action).string().not_null())
          .col(ColumnDef::new(AuthorizationLogs::Context).text().null())
          .col(
            ColumnDef::new(AuthorizationLogs::Timestamp).date_time().not_null(),
          )
          .to_owned(),
      )
      .await?;

    manager
      .create_index(
        Index::create()
          .name("idx_authorization_logs_subscriber")
          .table(AuthorizationLogs::Table)
          .col(AuthorizationLogs::SubscriberId)
          .to_owned(),
      )
      .await
  }

  async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
    manager
      .drop_table(Table::drop().table(AuthorizationLogs::Table).to_owned())
      .await
  }
}

#[derive(DeriveIden)]
pub enum AuthorizationLogs {
  Table,
  Id,
  TelegramId,
  SubscriberId,
  Action,
  Context,
  Timestamp,
}
