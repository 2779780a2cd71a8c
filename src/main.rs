use std::sync::Arc;

use anyhow::Result;
use campus_assistant::shell::{self, terminal_notifier};
use campus_assistant::{
    ChatSession, Clock, CompanyDirectory, Config, FileStorage, QueryClient, RateLimiter,
    SystemClock,
};
use tracing_subscriber::EnvFilter;

fn load_dotenv() {
    // A missing .env is fine; the defaults point at the hosted endpoint.
    if let Err(err) = dotenvy::dotenv() {
        tracing::debug!("no .env loaded: {err}");
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("campus_assistant=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    load_dotenv();
    init_tracing();

    let config = Config::from_env()?;
    tracing::info!(endpoint = %config.endpoint, data_dir = %config.data_dir.display(), "starting");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let storage = Arc::new(FileStorage::new(config.data_dir.clone()));
    let limiter = RateLimiter::new(storage, clock.clone());
    let client = Arc::new(QueryClient::from_config(&config, clock));
    let session = ChatSession::new(limiter, client, terminal_notifier());

    shell::run(session, CompanyDirectory::default()).await
}
