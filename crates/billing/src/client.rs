//! Billing API client configuration
//!
//! Thin `reqwest` wrapper over the platform's billing endpoints. Everything
//! here returns already-parsed structured data; callers decide what a failed
//! fetch means for them.

use async_trait::async_trait;
use fieldform_shared::{
    ChangePlan, Checkout, EnvironmentConfig, PaginatedResponse, Product, Subscription,
};
use serde::de::DeserializeOwned;

use crate::environment::EnvironmentSource;
use crate::error::{BillingError, BillingResult};
use crate::limits::ProductCatalog;
use crate::subscriptions::SubscriptionSource;

mod endpoints {
    pub const ENVIRONMENT: &str = "/environment/";
    pub const PRODUCTS: &str = "/api/v2/stripe/products/";
    pub const SUBSCRIPTIONS: &str = "/api/v2/stripe/subscriptions/";
    pub const CHECKOUT: &str = "/api/v2/stripe/checkout-link/";
    pub const PORTAL: &str = "/api/v2/stripe/customer-portal/";
    pub const CHANGE_PLAN: &str = "/api/v2/stripe/change-plan/";
}

/// Configuration for the billing API client
#[derive(Debug, Clone)]
pub struct BillingApiConfig {
    /// Base URL of the platform API, e.g. `https://app.fieldform.org`
    pub base_url: String,
    /// Session token sent as `Authorization: Token <value>`
    pub auth_token: Option<String>,
}

impl BillingApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: None,
        }
    }

    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            base_url: std::env::var("FIELDFORM_API_URL")
                .map_err(|_| BillingError::Config("FIELDFORM_API_URL not set".to_string()))?,
            auth_token: std::env::var("FIELDFORM_API_TOKEN").ok(),
        })
    }
}

/// Billing API client
#[derive(Clone)]
pub struct BillingApiClient {
    http: reqwest::Client,
    config: BillingApiConfig,
}

impl BillingApiClient {
    /// Create a new client from config
    pub fn new(config: BillingApiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Create a new client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = BillingApiConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the config
    pub fn config(&self) -> &BillingApiConfig {
        &self.config
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.header("Authorization", format!("Token {token}")),
            None => request,
        }
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> BillingResult<T> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BillingError::UnexpectedStatus {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.json().await?)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> BillingResult<T> {
        let request = self.http.get(self.url(endpoint)).query(query);
        self.send_json(endpoint, request).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> BillingResult<T> {
        let request = self.http.post(self.url(endpoint)).query(query);
        self.send_json(endpoint, request).await
    }

    /// Fetch the platform environment payload (billing public key presence,
    /// free-tier thresholds).
    pub async fn environment(&self) -> BillingResult<EnvironmentConfig> {
        self.get_json(endpoints::ENVIRONMENT, &[]).await
    }

    /// Fetch all billable products with their prices.
    pub async fn products(&self) -> BillingResult<PaginatedResponse<Product>> {
        self.get_json(endpoints::PRODUCTS, &[]).await
    }

    /// Fetch the account's subscriptions (plans and recurring add-ons).
    pub async fn subscriptions(&self) -> BillingResult<PaginatedResponse<Subscription>> {
        self.get_json(endpoints::SUBSCRIPTIONS, &[]).await
    }

    /// Start a checkout session for the given price and organization.
    /// Response contains the checkout URL.
    pub async fn checkout(&self, price_id: &str, organization_id: &str) -> BillingResult<Checkout> {
        self.post_json(
            endpoints::CHECKOUT,
            &[("price_id", price_id), ("organization_id", organization_id)],
        )
        .await
    }

    /// Get the URL of the billing provider's customer portal for an
    /// organization.
    pub async fn customer_portal(&self, organization_id: &str) -> BillingResult<Checkout> {
        self.post_json(endpoints::PORTAL, &[("organization_id", organization_id)])
            .await
    }

    /// Move an existing subscription to a different price.
    pub async fn change_plan(
        &self,
        price_id: &str,
        subscription_id: &str,
    ) -> BillingResult<ChangePlan> {
        self.get_json(
            endpoints::CHANGE_PLAN,
            &[("price_id", price_id), ("subscription_id", subscription_id)],
        )
        .await
    }
}

#[async_trait]
impl EnvironmentSource for BillingApiClient {
    async fn fetch_environment(&self) -> BillingResult<EnvironmentConfig> {
        self.environment().await
    }
}

#[async_trait]
impl SubscriptionSource for BillingApiClient {
    async fn fetch_subscriptions(&self) -> BillingResult<Vec<Subscription>> {
        Ok(self.subscriptions().await?.results)
    }
}

#[async_trait]
impl ProductCatalog for BillingApiClient {
    async fn fetch_products(&self) -> BillingResult<Vec<Product>> {
        Ok(self.products().await?.results)
    }
}
