pub mod cron;
pub mod server;
pub mod telegram;

use std::sync::Arc;

use futures::future;

use crate::state::AppState;

#[async_trait::async_trait]
pub trait Plugin: Send + Sync {
  fn name(&self) -> &'static str {
    std::any::type_name::<Self>()
  }

  async fn start(&self, app: Arc<AppState>) -> anyhow::Result<()>;
}

pub struct App {
  plugins: Vec<Box<dyn Plugin>>,
}

impl App {
  pub fn new() -> Self {
    Self { plugins: Vec::new() }
  }

  pub fn register<P: Plugin + 'static>(mut self, plugin: P) -> Self {
    self.plugins.push(Box::new(plugin));
    self
  }

  /// Runs every plugin concurrently until all of them return.
  pub async fn run(self, app: Arc<AppState>) {
    let tasks = self.plugins.into_iter().map(|plugin| {
      let app = app.clone();
      tokio::spawn(async move {
        let name = plugin.name();
        tracing::info!("init `{name}`");

        match plugin.start(app).await {
          Ok(()) => tracing::info!("`{name}` stopped"),
          Err(err) => tracing::error!("failed `{name}`: {err:#}"),
        }
      })
    });

    for joined in future::join_all(tasks).await {
      if let Err(err) = joined {
        tracing::error!("plugin task panicked: {err}");
      }
    }
  }
}
