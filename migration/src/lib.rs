pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_subscribers;
mod m20250301_000002_create_channels;
mod m20250301_000003_create_authorized_users;
mod m20250301_000004_create_user_invite_links;
mod m20250301_000005_create_authorization_logs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
  fn migrations() -> Vec<Box<dyn MigrationTrait>> {
    vec![
      Box::new(m20250301_000001_create_subscribers::Migration),
      Box::new(m20250301_000002_create_channels::Migration),
      Box::new(m20250301_000003_create_authorized_users::Migration),
      Box::new(m20250301_000004_create_user_invite_links::Migration),
      Box::new(m20250301_000005_create_authorization_logs::Migration),
    ]
  }
}
