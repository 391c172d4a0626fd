//! Environment configuration store
//!
//! The platform serves deployment-wide configuration (billing public key,
//! free-tier thresholds) from a single endpoint. This store fetches it once,
//! lazily; concurrent callers share the same in-flight fetch instead of
//! issuing their own.

use async_trait::async_trait;
use fieldform_shared::EnvironmentConfig;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::BillingResult;

/// Source of the environment payload.
#[async_trait]
pub trait EnvironmentSource: Send + Sync {
    async fn fetch_environment(&self) -> BillingResult<EnvironmentConfig>;
}

/// Caches the environment configuration after the first successful fetch.
pub struct EnvironmentStore<S> {
    source: S,
    cell: OnceCell<EnvironmentConfig>,
}

impl<S: EnvironmentSource> EnvironmentStore<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cell: OnceCell::new(),
        }
    }

    /// The environment configuration, fetched on first use. A failed fetch
    /// is returned to every waiting caller and retried by the next one.
    pub async fn config(&self) -> BillingResult<&EnvironmentConfig> {
        self.cell
            .get_or_try_init(|| async {
                debug!("fetching environment configuration");
                self.source.fetch_environment().await
            })
            .await
    }

    pub fn is_ready(&self) -> bool {
        self.cell.initialized()
    }
}
