use bson::doc;
use futures::future::BoxFuture;
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::config::{redact_url, Config};

pub const APP_NAME: &str = "mongo-provision";

/// Upper bound for a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(5);

pub async fn retry_with_backoff<F, T, E>(mut f: F, max_retries: u32) -> Result<T, E>
where
    F: FnMut() -> BoxFuture<'static, Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = Duration::from_millis(100);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt >= max_retries.max(1) => return Err(e),
            Err(e) => {
                warn!(attempt, error = %e, "attempt failed, retrying in {:?}", delay);
                sleep(delay).await;
                delay = (delay * 2).min(MAX_BACKOFF); // exponential backoff, capped
            }
        }
    }
}

/// Opens a client and waits until the server answers `ping`.
///
/// Only the readiness probe is retried; schema steps never are.
pub async fn connect(cfg: &Config) -> mongodb::error::Result<Database> {
    let mut options = ClientOptions::parse(&cfg.mongo_url).await?;
    options.app_name = Some(APP_NAME.to_string());
    options.max_pool_size = Some(cfg.max_connections);
    options.min_pool_size = Some(cfg.min_connections);

    let client = Client::with_options(options)?;
    let admin = client.database("admin");

    retry_with_backoff(
        || {
            let admin = admin.clone();
            Box::pin(async move { admin.run_command(doc! { "ping": 1 }).await })
        },
        cfg.connect_retries,
    )
    .await?;

    info!(url = %redact_url(&cfg.mongo_url), db = %cfg.mongo_db, "connected to MongoDB");
    Ok(client.database(&cfg.mongo_db))
}
