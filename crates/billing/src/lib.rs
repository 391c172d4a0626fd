//! Fieldform Billing
//!
//! Client-side integration with the platform's billing provider API. The
//! crate exposes the REST client, the lazily-initialized environment and
//! subscription stores, and the account limits resolver that merges plan
//! metadata, free-tier thresholds, and recurring add-ons into the effective
//! limits for an account.

pub mod client;
pub mod environment;
pub mod error;
pub mod limits;
pub mod subscriptions;

pub use client::{BillingApiClient, BillingApiConfig};
pub use environment::{EnvironmentSource, EnvironmentStore};
pub use error::{BillingError, BillingResult};
pub use limits::{LimitsResolver, ProductCatalog};
pub use subscriptions::{BillingState, SubscriptionSource, SubscriptionStore};
