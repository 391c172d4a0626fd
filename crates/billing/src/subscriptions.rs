//! Subscription store
//!
//! Holds the account's current subscription state, split into plans and
//! recurring add-ons. Initialization is lazy and de-duplicated: the first
//! caller triggers the fetch, everyone else awaits the same result.

use async_trait::async_trait;
use fieldform_shared::Subscription;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::BillingResult;

/// Source of the account's subscription list.
#[async_trait]
pub trait SubscriptionSource: Send + Sync {
    async fn fetch_subscriptions(&self) -> BillingResult<Vec<Subscription>>;
}

/// Subscription state split into plans and recurring add-ons.
#[derive(Debug, Clone, Default)]
pub struct BillingState {
    pub plans: Vec<Subscription>,
    pub addons: Vec<Subscription>,
}

impl BillingState {
    /// Split a raw subscription list on the add-on product marker.
    fn from_subscriptions(subscriptions: Vec<Subscription>) -> Self {
        let (addons, plans): (Vec<_>, Vec<_>) =
            subscriptions.into_iter().partition(Subscription::is_addon);
        Self { plans, addons }
    }

    /// Plans whose status is in the active allow-list.
    pub fn active_plans(&self) -> impl Iterator<Item = &Subscription> {
        self.plans.iter().filter(|sub| sub.is_active())
    }

    /// Add-ons whose status is in the active allow-list.
    pub fn active_addons(&self) -> impl Iterator<Item = &Subscription> {
        self.addons.iter().filter(|sub| sub.is_active())
    }
}

/// Caches the account's billing state after the first successful fetch.
pub struct SubscriptionStore<S> {
    source: S,
    cell: OnceCell<BillingState>,
}

impl<S: SubscriptionSource> SubscriptionStore<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cell: OnceCell::new(),
        }
    }

    /// The current billing state, fetched on first use. Concurrent callers
    /// share one underlying fetch; a failed fetch is reported to all of them
    /// and retried by the next caller.
    pub async fn state(&self) -> BillingResult<&BillingState> {
        self.cell
            .get_or_try_init(|| async {
                debug!("initialising subscription store");
                let subscriptions = self.source.fetch_subscriptions().await?;
                Ok(BillingState::from_subscriptions(subscriptions))
            })
            .await
    }

    pub fn is_initialised(&self) -> bool {
        self.cell.initialized()
    }
}
