//! Account limits resolution
//!
//! Answers the question: "what resource limits does this account have right
//! now?" Resolution is deterministic over the supplied billing state, in
//! descending order of priority:
//!
//! 1. recurring add-ons (free-tier accounts only, raise-only)
//! 2. environment free-tier thresholds (free-tier accounts only)
//! 3. subscription or free-plan product/price metadata
//! 4. the all-unlimited default

use std::collections::HashMap;

use async_trait::async_trait;
use fieldform_shared::{
    AccountLimit, FreeTierThresholds, LimitAmount, LimitField, Price, Product, RecurringInterval,
};
use tracing::warn;

use crate::environment::{EnvironmentSource, EnvironmentStore};
use crate::error::BillingResult;
use crate::subscriptions::{SubscriptionSource, SubscriptionStore};

/// Source of the billable products listing.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn fetch_products(&self) -> BillingResult<Vec<Product>>;
}

/// Resolves effective account limits from injected billing collaborators.
pub struct LimitsResolver<'a, E, S, P> {
    environment: &'a EnvironmentStore<E>,
    subscriptions: &'a SubscriptionStore<S>,
    catalog: &'a P,
}

impl<'a, E, S, P> LimitsResolver<'a, E, S, P>
where
    E: EnvironmentSource,
    S: SubscriptionSource,
    P: ProductCatalog,
{
    pub fn new(
        environment: &'a EnvironmentStore<E>,
        subscriptions: &'a SubscriptionStore<S>,
        catalog: &'a P,
    ) -> Self {
        Self {
            environment,
            subscriptions,
            catalog,
        }
    }

    /// Compute the complete account limits for the current account.
    ///
    /// Accounts with an active subscription get that plan's metadata as-is.
    /// Everyone else starts from the zero-cost monthly plan's metadata, then
    /// the free-tier threshold overrides, then any active recurring add-ons
    /// (which may only ever raise a limit, never lower one).
    pub async fn resolve_effective_limits(&self) -> BillingResult<AccountLimit> {
        let environment = self.environment.config().await?;
        if !environment.billing_enabled() {
            // deployment without a billing provider: nothing to cap
            return Ok(AccountLimit::default());
        }

        let state = self.subscriptions.state().await?;
        let (metadata, has_free_tier) = match state.active_plans().next() {
            Some(plan) => (plan.merged_metadata(), false),
            None => (self.free_plan_metadata().await, true),
        };

        let mut limits = AccountLimit::default();
        apply_metadata(&mut limits, &metadata, false);

        if has_free_tier {
            apply_thresholds(&mut limits, &environment.free_tier_thresholds);
            for addon in state.active_addons() {
                apply_metadata(&mut limits, &addon.merged_metadata(), true);
            }
        }

        Ok(limits)
    }

    /// Billing interval of the account's first active subscription. Free-tier
    /// accounts and deployments without billing are treated as monthly.
    pub async fn subscription_interval(&self) -> BillingResult<RecurringInterval> {
        let environment = self.environment.config().await?;
        if !environment.billing_enabled() {
            return Ok(RecurringInterval::Month);
        }

        let state = self.subscriptions.state().await?;
        let interval = state
            .active_plans()
            .next()
            .and_then(|sub| sub.items.first())
            .and_then(|item| item.price.recurring)
            .map(|recurring| recurring.interval)
            .unwrap_or_default();
        Ok(interval)
    }

    /// Metadata of the free plan: the first catalog product carrying a
    /// zero-cost monthly price, its product metadata merged with its first
    /// price's metadata. A failed fetch or an empty match is not an error,
    /// only a degraded result; free-tier thresholds still apply.
    async fn free_plan_metadata(&self) -> HashMap<String, String> {
        let products = match self.catalog.fetch_products().await {
            Ok(products) => products,
            Err(err) => {
                warn!(error = %err, "products fetch failed, continuing with free-tier thresholds only");
                return HashMap::new();
            }
        };

        let free_product = products
            .iter()
            .find(|product| product.prices.iter().any(Price::is_free_monthly));
        let Some(free_product) = free_product else {
            warn!("no zero-cost monthly product in catalog, continuing with free-tier thresholds only");
            return HashMap::new();
        };

        let mut metadata = free_product.metadata.clone();
        if let Some(price) = free_product.prices.first() {
            metadata.extend(price.metadata.clone());
        }
        metadata
    }
}

/// Copy limit values out of product/price metadata onto `limits`. Keys that
/// match no limit field are dropped. With `only_raise`, a value is applied
/// only if it is unlimited or strictly greater than the current one (the
/// add-on merge rule: raise the ceiling, never lower it).
fn apply_metadata(limits: &mut AccountLimit, metadata: &HashMap<String, String>, only_raise: bool) {
    for (key, value) in metadata {
        let Some(field) = LimitField::from_metadata_key(key) else {
            continue;
        };
        let parsed: LimitAmount = match value.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(%key, %value, "skipping unparsable limit metadata");
                continue;
            }
        };
        if only_raise && parsed <= limits.get(field) {
            continue;
        }
        limits.set(field, parsed);
    }
}

/// Overwrite limits with whichever free-tier thresholds are configured;
/// unconfigured thresholds leave the prior value untouched.
fn apply_thresholds(limits: &mut AccountLimit, thresholds: &FreeTierThresholds) {
    if let Some(storage) = thresholds.storage_bytes() {
        limits.storage_bytes_limit = LimitAmount::Finite(storage);
    }
    if let Some(submissions) = thresholds.submissions() {
        limits.submission_limit = LimitAmount::Finite(submissions);
    }
    if let Some(chars) = thresholds.translation_chars() {
        limits.nlp_character_limit = LimitAmount::Finite(chars);
    }
    if let Some(seconds) = thresholds.transcription_seconds() {
        limits.nlp_seconds_limit = LimitAmount::Finite(seconds);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use fieldform_shared::{
        EnvironmentConfig, ProductInfo, Recurring, Subscription, SubscriptionItem,
        SubscriptionPrice, SubscriptionStatus, PRODUCT_TYPE_KEY,
    };

    use crate::error::BillingError;

    use super::*;

    struct StaticEnvironment(EnvironmentConfig);

    #[async_trait]
    impl EnvironmentSource for StaticEnvironment {
        async fn fetch_environment(&self) -> BillingResult<EnvironmentConfig> {
            Ok(self.0.clone())
        }
    }

    struct StaticSubscriptions(Vec<Subscription>);

    #[async_trait]
    impl SubscriptionSource for StaticSubscriptions {
        async fn fetch_subscriptions(&self) -> BillingResult<Vec<Subscription>> {
            Ok(self.0.clone())
        }
    }

    struct StaticCatalog(Vec<Product>);

    #[async_trait]
    impl ProductCatalog for StaticCatalog {
        async fn fetch_products(&self) -> BillingResult<Vec<Product>> {
            Ok(self.0.clone())
        }
    }

    struct FailingCatalog;

    #[async_trait]
    impl ProductCatalog for FailingCatalog {
        async fn fetch_products(&self) -> BillingResult<Vec<Product>> {
            Err(BillingError::Api("connection refused".to_string()))
        }
    }

    fn metadata(entries: &[(&str, &str)]) -> HashMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn billing_environment(thresholds: FreeTierThresholds) -> EnvironmentConfig {
        EnvironmentConfig {
            stripe_public_key: Some("pk_test_123".to_string()),
            free_tier_thresholds: thresholds,
        }
    }

    fn subscription(
        status: SubscriptionStatus,
        product_type: &str,
        product_metadata: &[(&str, &str)],
        price_metadata: &[(&str, &str)],
    ) -> Subscription {
        let mut product_metadata = metadata(product_metadata);
        product_metadata.insert(PRODUCT_TYPE_KEY.to_string(), product_type.to_string());
        Subscription {
            id: "sub_1".to_string(),
            status,
            items: vec![SubscriptionItem {
                price: SubscriptionPrice {
                    id: "price_1".to_string(),
                    product: ProductInfo {
                        id: "prod_1".to_string(),
                        name: "Professional".to_string(),
                        metadata: product_metadata,
                    },
                    recurring: Some(Recurring {
                        interval: RecurringInterval::Month,
                    }),
                    metadata: metadata(price_metadata),
                },
            }],
        }
    }

    fn free_product(product_metadata: &[(&str, &str)], price_metadata: &[(&str, &str)]) -> Product {
        Product {
            id: "prod_free".to_string(),
            name: "Community".to_string(),
            metadata: metadata(product_metadata),
            prices: vec![Price {
                id: "price_free".to_string(),
                unit_amount: Some(0),
                recurring: Some(Recurring {
                    interval: RecurringInterval::Month,
                }),
                metadata: metadata(price_metadata),
            }],
        }
    }

    async fn resolve(
        environment: EnvironmentConfig,
        subscriptions: Vec<Subscription>,
        catalog: impl ProductCatalog,
    ) -> AccountLimit {
        let environment = EnvironmentStore::new(StaticEnvironment(environment));
        let subscriptions = SubscriptionStore::new(StaticSubscriptions(subscriptions));
        let resolver = LimitsResolver::new(&environment, &subscriptions, &catalog);
        resolver.resolve_effective_limits().await.unwrap()
    }

    #[tokio::test]
    async fn subscription_metadata_overrides_defaults() {
        let limits = resolve(
            billing_environment(FreeTierThresholds::default()),
            vec![subscription(
                SubscriptionStatus::Active,
                "plan",
                &[("submission_limit", "100")],
                &[],
            )],
            FailingCatalog,
        )
        .await;
        assert_eq!(limits.submission_limit, LimitAmount::Finite(100));
        assert_eq!(limits.storage_bytes_limit, LimitAmount::Unlimited);
    }

    #[tokio::test]
    async fn price_metadata_wins_over_product_metadata() {
        let limits = resolve(
            billing_environment(FreeTierThresholds::default()),
            vec![subscription(
                SubscriptionStatus::Trialing,
                "plan",
                &[("nlp_character_limit", "1000")],
                &[("nlp_character_limit", "5000")],
            )],
            FailingCatalog,
        )
        .await;
        assert_eq!(limits.nlp_character_limit, LimitAmount::Finite(5000));
    }

    #[tokio::test]
    async fn no_subscription_and_no_free_product_leaves_thresholds_only() {
        let limits = resolve(
            billing_environment(FreeTierThresholds {
                data: Some(250),
                ..FreeTierThresholds::default()
            }),
            vec![],
            FailingCatalog,
        )
        .await;
        assert_eq!(limits.submission_limit, LimitAmount::Finite(250));
        assert_eq!(limits.nlp_seconds_limit, LimitAmount::Unlimited);
        assert_eq!(limits.nlp_character_limit, LimitAmount::Unlimited);
        assert_eq!(limits.storage_bytes_limit, LimitAmount::Unlimited);
    }

    #[tokio::test]
    async fn canceled_subscription_falls_back_to_free_plan() {
        let limits = resolve(
            billing_environment(FreeTierThresholds::default()),
            vec![subscription(
                SubscriptionStatus::Canceled,
                "plan",
                &[("submission_limit", "100000")],
                &[],
            )],
            StaticCatalog(vec![free_product(&[("submission_limit", "500")], &[])]),
        )
        .await;
        assert_eq!(limits.submission_limit, LimitAmount::Finite(500));
    }

    #[tokio::test]
    async fn transcription_threshold_is_applied_in_seconds() {
        let limits = resolve(
            billing_environment(FreeTierThresholds {
                transcription_minutes: Some(10),
                ..FreeTierThresholds::default()
            }),
            vec![],
            StaticCatalog(vec![free_product(&[("nlp_seconds_limit", "120")], &[])]),
        )
        .await;
        assert_eq!(limits.nlp_seconds_limit, LimitAmount::Finite(600));
    }

    #[tokio::test]
    async fn addons_raise_but_never_lower_free_tier_limits() {
        let thresholds = FreeTierThresholds {
            storage: Some(500),
            ..FreeTierThresholds::default()
        };

        let lowering = resolve(
            billing_environment(thresholds.clone()),
            vec![subscription(
                SubscriptionStatus::Active,
                "addon",
                &[],
                &[("storage_bytes_limit", "300")],
            )],
            FailingCatalog,
        )
        .await;
        assert_eq!(lowering.storage_bytes_limit, LimitAmount::Finite(500));

        let raising = resolve(
            billing_environment(thresholds),
            vec![subscription(
                SubscriptionStatus::Active,
                "addon",
                &[],
                &[("storage_bytes_limit", "1000")],
            )],
            FailingCatalog,
        )
        .await;
        assert_eq!(raising.storage_bytes_limit, LimitAmount::Finite(1000));
    }

    #[tokio::test]
    async fn addon_ties_do_not_overwrite() {
        let limits = resolve(
            billing_environment(FreeTierThresholds {
                data: Some(100),
                ..FreeTierThresholds::default()
            }),
            vec![subscription(
                SubscriptionStatus::Active,
                "addon",
                &[],
                &[("submission_limit", "100")],
            )],
            FailingCatalog,
        )
        .await;
        assert_eq!(limits.submission_limit, LimitAmount::Finite(100));
    }

    #[tokio::test]
    async fn unlimited_addon_beats_any_finite_limit() {
        let limits = resolve(
            billing_environment(FreeTierThresholds {
                translation_chars: Some(20_000),
                ..FreeTierThresholds::default()
            }),
            vec![subscription(
                SubscriptionStatus::Active,
                "addon",
                &[],
                &[("nlp_character_limit", "unlimited")],
            )],
            FailingCatalog,
        )
        .await;
        assert_eq!(limits.nlp_character_limit, LimitAmount::Unlimited);
    }

    #[tokio::test]
    async fn addons_never_apply_to_paid_plans() {
        let limits = resolve(
            billing_environment(FreeTierThresholds::default()),
            vec![
                subscription(
                    SubscriptionStatus::Active,
                    "plan",
                    &[],
                    &[("storage_bytes_limit", "500")],
                ),
                subscription(
                    SubscriptionStatus::Active,
                    "addon",
                    &[],
                    &[("storage_bytes_limit", "100000")],
                ),
            ],
            FailingCatalog,
        )
        .await;
        assert_eq!(limits.storage_bytes_limit, LimitAmount::Finite(500));
    }

    #[tokio::test]
    async fn inactive_addons_are_ignored() {
        let limits = resolve(
            billing_environment(FreeTierThresholds {
                storage: Some(500),
                ..FreeTierThresholds::default()
            }),
            vec![subscription(
                SubscriptionStatus::Canceled,
                "addon",
                &[],
                &[("storage_bytes_limit", "100000")],
            )],
            FailingCatalog,
        )
        .await;
        assert_eq!(limits.storage_bytes_limit, LimitAmount::Finite(500));
    }

    #[tokio::test]
    async fn unknown_and_unparsable_metadata_is_dropped() {
        let limits = resolve(
            billing_environment(FreeTierThresholds::default()),
            vec![subscription(
                SubscriptionStatus::Active,
                "plan",
                &[("plan_name", "Professional"), ("submission_limit", "lots")],
                &[],
            )],
            FailingCatalog,
        )
        .await;
        assert_eq!(limits, AccountLimit::default());
    }

    #[tokio::test]
    async fn billing_disabled_short_circuits_to_defaults() {
        struct PanickingSubscriptions;

        #[async_trait]
        impl SubscriptionSource for PanickingSubscriptions {
            async fn fetch_subscriptions(&self) -> BillingResult<Vec<Subscription>> {
                panic!("subscription store must not be touched when billing is disabled");
            }
        }

        let environment = EnvironmentStore::new(StaticEnvironment(EnvironmentConfig::default()));
        let subscriptions = SubscriptionStore::new(PanickingSubscriptions);
        let resolver = LimitsResolver::new(&environment, &subscriptions, &FailingCatalog);
        let limits = resolver.resolve_effective_limits().await.unwrap();
        assert_eq!(limits, AccountLimit::default());
    }

    #[tokio::test]
    async fn interval_comes_from_active_plan_or_defaults_to_month() {
        let mut yearly = subscription(SubscriptionStatus::Active, "plan", &[], &[]);
        yearly.items[0].price.recurring = Some(Recurring {
            interval: RecurringInterval::Year,
        });

        let environment = EnvironmentStore::new(StaticEnvironment(billing_environment(
            FreeTierThresholds::default(),
        )));
        let subscriptions = SubscriptionStore::new(StaticSubscriptions(vec![yearly]));
        let catalog = StaticCatalog(vec![]);
        let resolver = LimitsResolver::new(&environment, &subscriptions, &catalog);
        assert_eq!(
            resolver.subscription_interval().await.unwrap(),
            RecurringInterval::Year
        );

        let no_subscriptions = SubscriptionStore::new(StaticSubscriptions(vec![]));
        let resolver = LimitsResolver::new(&environment, &no_subscriptions, &catalog);
        assert_eq!(
            resolver.subscription_interval().await.unwrap(),
            RecurringInterval::Month
        );
    }
}
