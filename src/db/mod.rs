pub mod from_row;
pub mod queries;
mod schema;

pub use schema::init_db;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::payments::ProviderApi;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state passed to the webhook handlers.
///
/// The provider handle is injected here (constructed once per process start)
/// rather than reached for as a global, so tests can substitute a fake.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    /// Stripe API handle for the two synchronous lookups (subscription
    /// snapshot, payment-intent charge id).
    pub provider: Arc<dyn ProviderApi>,
    /// Webhook signing secret. None means the deployment is misconfigured;
    /// inbound webhooks get a 500 until an operator fixes it.
    pub webhook_secret: Option<String>,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(10).build(manager)
}
